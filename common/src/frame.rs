/// A retained screenshot: an immutable encoded image buffer (PNG or JPEG,
/// whatever the capture source produced) tagged with its capture time and
/// acceptance order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    /// Raw encoded image bytes, exactly as returned by the capture source.
    pub data: Vec<u8>,
    /// Capture wall-clock time, Unix millis.
    pub captured_at_ms: i64,
    /// Monotonic acceptance sequence number within one collector.
    pub seq: u64,
}

impl Screenshot {
    pub fn new(data: Vec<u8>, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            data,
            captured_at_ms,
            seq,
        }
    }

    /// Size of the encoded image in bytes.
    pub fn payload_size(&self) -> usize {
        self.data.len()
    }

    /// Generate a date-partitioned file name for writing this frame out,
    /// e.g. `lapse/2026-08-25/20260825T101530123Z_000007.png`.
    pub fn file_name(&self, prefix: &str) -> String {
        let dt = chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
            .unwrap_or_else(chrono::Utc::now);
        let date = dt.format("%Y-%m-%d");
        let ts = dt.format("%Y%m%dT%H%M%S%3fZ");
        format!("{prefix}{date}/{ts}_{seq:06}.png", seq = self.seq)
    }
}
