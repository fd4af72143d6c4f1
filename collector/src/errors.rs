#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("invalid collector configuration: {0}")]
    InvalidConfiguration(String),
}

/// Failure reported by a capture source. Inside the collector these are
/// logged and the capture attempt skipped; they are never fatal to the
/// collector's lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture source unavailable: {0}")]
    Unavailable(String),
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}
