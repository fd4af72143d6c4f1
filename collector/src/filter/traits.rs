/// Filter interface for frame near-duplicate suppression.
///
/// Implementations receive raw encoded image bytes and decide whether the
/// frame differs enough from the previously accepted one to be retained.
pub trait FrameFilter: Send {
    /// Returns `true` if this frame should be retained (visibly changed).
    /// Returns `false` to discard it as a near-duplicate. The last-compared
    /// frame is updated only on acceptance.
    fn should_store(&mut self, image_data: &[u8]) -> bool;

    /// Forget the last-compared frame, so the next candidate is accepted
    /// unconditionally.
    fn reset(&mut self);

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
