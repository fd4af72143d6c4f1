use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::CaptureError;

/// The single operation the collector consumes from the automation layer:
/// capture the current visual state as raw encoded image bytes.
///
/// The acquisition call may block or fail; timeout policy belongs to the
/// implementation, not the collector.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn capture(&self) -> Result<Vec<u8>, CaptureError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// A page navigation, as reported by whatever drives the browser.
#[derive(Debug, Clone)]
pub struct NavigationEvent {
    pub url: String,
    pub occurred_at_ms: i64,
}

/// Optional navigation-event feed. The collector subscribes on `start()`
/// when `capture_on_navigation` is enabled; dropping the receiver is the
/// unsubscribe, which `stop()` guarantees by joining the listener task.
pub trait NavigationSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<NavigationEvent>;
}
