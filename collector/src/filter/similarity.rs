use image::{GrayImage, RgbImage};

/// SSIM stabilizing constants for 8-bit dynamic range:
/// C1 = (0.01 * 255)^2, C2 = (0.03 * 255)^2.
const C1: f64 = 6.5025;
const C2: f64 = 58.5225;

const SSIM_WINDOW: u32 = 8;

/// Mean squared error over RGB channel samples, on the 0..255 range.
/// 0.0 for identical images; lower means more similar.
///
/// Both images must have the same dimensions.
pub fn mse(a: &RgbImage, b: &RgbImage) -> f64 {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let samples_a = a.as_raw();
    let samples_b = b.as_raw();
    if samples_a.is_empty() {
        return 0.0;
    }

    let mut sum = 0.0;
    for (&pa, &pb) in samples_a.iter().zip(samples_b.iter()) {
        let diff = pa as f64 - pb as f64;
        sum += diff * diff;
    }
    sum / samples_a.len() as f64
}

/// Structural similarity over luminance, averaged across non-overlapping
/// 8x8 windows (edge windows are clipped, not padded). 1.0 for identical
/// images; higher means more similar.
///
/// Both images must have the same dimensions.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> f64 {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (width, height) = a.dimensions();
    if width == 0 || height == 0 {
        return 1.0;
    }

    let mut total = 0.0;
    let mut windows = 0u64;
    let mut y = 0;
    while y < height {
        let win_h = SSIM_WINDOW.min(height - y);
        let mut x = 0;
        while x < width {
            let win_w = SSIM_WINDOW.min(width - x);
            total += window_ssim(a, b, x, y, win_w, win_h);
            windows += 1;
            x += SSIM_WINDOW;
        }
        y += SSIM_WINDOW;
    }
    total / windows as f64
}

/// Standard SSIM formula over a single window: luminance means, variances
/// and covariance combined as ((2*ua*ub + C1)(2*cov + C2)) /
/// ((ua^2 + ub^2 + C1)(va + vb + C2)).
fn window_ssim(a: &GrayImage, b: &GrayImage, x0: u32, y0: u32, w: u32, h: u32) -> f64 {
    let n = (w * h) as f64;
    let mut sum_a = 0.0;
    let mut sum_b = 0.0;
    let mut sum_aa = 0.0;
    let mut sum_bb = 0.0;
    let mut sum_ab = 0.0;

    for y in y0..y0 + h {
        for x in x0..x0 + w {
            let pa = a.get_pixel(x, y).0[0] as f64;
            let pb = b.get_pixel(x, y).0[0] as f64;
            sum_a += pa;
            sum_b += pb;
            sum_aa += pa * pa;
            sum_bb += pb * pb;
            sum_ab += pa * pb;
        }
    }

    let mean_a = sum_a / n;
    let mean_b = sum_b / n;
    // Sample statistics can go fractionally negative from rounding.
    let var_a = (sum_aa / n - mean_a * mean_a).max(0.0);
    let var_b = (sum_bb / n - mean_b * mean_b).max(0.0);
    let cov = sum_ab / n - mean_a * mean_b;

    ((2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2))
        / ((mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2))
}
