use image::{GrayImage, ImageReader, RgbImage};
use std::io::Cursor;
use tracing::{debug, warn};

use super::similarity::{mse, ssim};
use super::traits::FrameFilter;

/// One decoded candidate, kept in both colorspaces so each accepted frame
/// is decoded exactly once.
struct DecodedFrame {
    rgb: RgbImage,
    gray: GrayImage,
}

/// MSE + SSIM near-duplicate filter.
///
/// A candidate is discarded only when it is both very close in raw pixel
/// error (MSE below threshold) and very similar in structure (SSIM above
/// threshold) to the last accepted frame. Frames of differing dimensions
/// are treated as maximally dissimilar and accepted outright; they are
/// never resized or cropped to force a comparison.
pub struct NearDuplicateFilter {
    mse_threshold: f64,
    ssim_threshold: f64,
    last: Option<DecodedFrame>,
}

impl NearDuplicateFilter {
    pub fn new(mse_threshold: f64, ssim_threshold: f64) -> Self {
        Self {
            mse_threshold,
            ssim_threshold,
            last: None,
        }
    }

    fn decode(image_data: &[u8]) -> Option<DecodedFrame> {
        let img = ImageReader::new(Cursor::new(image_data))
            .with_guessed_format()
            .ok()?
            .decode()
            .ok()?;
        Some(DecodedFrame {
            rgb: img.to_rgb8(),
            gray: img.to_luma8(),
        })
    }
}

impl FrameFilter for NearDuplicateFilter {
    fn should_store(&mut self, image_data: &[u8]) -> bool {
        let frame = match Self::decode(image_data) {
            Some(f) => f,
            None => {
                warn!("failed to decode candidate frame, skipping");
                return false;
            }
        };

        match &self.last {
            None => {
                debug!("first frame, accepting unconditionally");
                self.last = Some(frame);
                true
            }
            Some(prev) => {
                if prev.rgb.dimensions() != frame.rgb.dimensions() {
                    debug!(
                        prev_dims = ?prev.rgb.dimensions(),
                        dims = ?frame.rgb.dimensions(),
                        "dimensions changed, accepting"
                    );
                    self.last = Some(frame);
                    return true;
                }

                let error = mse(&prev.rgb, &frame.rgb);
                let structure = ssim(&prev.gray, &frame.gray);
                let duplicate = error < self.mse_threshold && structure > self.ssim_threshold;
                debug!(
                    mse = format!("{:.3}", error),
                    ssim = format!("{:.4}", structure),
                    duplicate,
                    "similarity comparison"
                );
                if duplicate {
                    false
                } else {
                    self.last = Some(frame);
                    true
                }
            }
        }
    }

    fn reset(&mut self) {
        self.last = None;
    }

    fn name(&self) -> &str {
        "near-duplicate"
    }
}
