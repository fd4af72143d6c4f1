pub mod dedup;
pub mod similarity;
pub mod traits;

pub use dedup::NearDuplicateFilter;
pub use traits::FrameFilter;
