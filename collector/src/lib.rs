pub mod collector;
pub mod errors;
pub mod filter;
pub mod source;

pub use collector::ScreenshotCollector;
pub use errors::{CaptureError, CollectorError};
pub use source::{CaptureSource, NavigationEvent, NavigationSource};
