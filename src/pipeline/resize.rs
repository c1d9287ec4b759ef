//! Resize-only branch for images with no (Chinese) text.

use image::RgbImage;
use image::imageops::FilterType;

/// Fixed output width for long images on the no-text branch.
pub const LONG_NO_TEXT_WIDTH: u32 = 864;

/// Resize a no-text image to its delivery size: short images square-fit
/// the fixed canvas, long images keep their aspect ratio at a fixed
/// width.
pub fn resize_no_text(image: &RgbImage, is_long: bool, short_canvas: (u32, u32)) -> RgbImage {
    let (source_w, source_h) = image.dimensions();
    let (target_w, target_h) = if is_long {
        let scale = LONG_NO_TEXT_WIDTH as f32 / source_w.max(1) as f32;
        (
            LONG_NO_TEXT_WIDTH,
            ((source_h as f32 * scale) as u32).max(1),
        )
    } else {
        short_canvas
    };
    image::imageops::resize(image, target_w, target_h, FilterType::Triangle)
}
