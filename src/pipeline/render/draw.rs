//! Glyph rasterization and rotated text compositing.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont, point};
use image::{Rgb, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};

/// Padding around the intermediate text canvas so rasterized and rotated
/// glyphs are never clipped.
const CANVAS_PADDING: u32 = 10;

/// The loaded face. One handle serves every size; scaling happens per
/// call, so there is nothing to cache per size.
pub struct FontHandle {
    font: FontVec,
}

impl FontHandle {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("failed to read font {}: {}", path, e))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("failed to parse font {}: {}", path, e))?;
        Ok(Self { font })
    }

    /// Width of one line at `px`, advances plus kerning.
    pub fn measure_line(&self, line: &str, px: f32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let mut width = 0.0f32;
        let mut previous = None;
        for character in line.chars() {
            let glyph_id = scaled.glyph_id(character);
            if let Some(previous_id) = previous {
                width += scaled.kern(previous_id, glyph_id);
            }
            width += scaled.h_advance(glyph_id);
            previous = Some(glyph_id);
        }
        width
    }

    /// Line height at `px` (ascent to descent).
    pub fn line_height(&self, px: f32) -> f32 {
        let scaled = self.font.as_scaled(PxScale::from(px));
        scaled.ascent() - scaled.descent()
    }

    /// (widest line, total height) of a possibly multi-line block.
    pub fn measure_block(&self, text: &str, px: f32) -> (f32, f32) {
        let line_height = self.line_height(px);
        let mut width = 0.0f32;
        let mut lines = 0u32;
        for line in text.split('\n') {
            width = width.max(self.measure_line(line, px));
            lines += 1;
        }
        (width, line_height * lines as f32)
    }

    fn rasterize_line(&self, canvas: &mut RgbaImage, line: &str, px: f32, x: f32, baseline_y: f32, color: Rgb<u8>) {
        let scaled = self.font.as_scaled(PxScale::from(px));
        let mut cursor = x;
        let mut previous = None;
        for character in line.chars() {
            let glyph_id = scaled.glyph_id(character);
            if let Some(previous_id) = previous {
                cursor += scaled.kern(previous_id, glyph_id);
            }
            let glyph = glyph_id.with_scale_and_position(PxScale::from(px), point(cursor, baseline_y));
            if let Some(outlined) = self.font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|gx, gy, coverage| {
                    let px_x = bounds.min.x as i32 + gx as i32;
                    let px_y = bounds.min.y as i32 + gy as i32;
                    if px_x < 0
                        || px_y < 0
                        || px_x >= canvas.width() as i32
                        || px_y >= canvas.height() as i32
                    {
                        return;
                    }
                    let alpha = (coverage * 255.0) as u8;
                    let pixel = canvas.get_pixel_mut(px_x as u32, px_y as u32);
                    if alpha > pixel[3] {
                        *pixel = Rgba([color[0], color[1], color[2], alpha]);
                    }
                });
            }
            cursor += scaled.h_advance(glyph_id);
            previous = Some(glyph_id);
        }
    }
}

/// Draw a translated text block onto `canvas`, centered on `center` and
/// rotated by `angle_degrees`.
///
/// The block is rasterized on a transparent canvas (lines individually
/// centered), rotated with expansion, and alpha-blended in place.
pub fn draw_text(
    canvas: &mut RgbaImage,
    font: &FontHandle,
    text: &str,
    center: (f32, f32),
    px: f32,
    angle_degrees: f32,
    color: Rgb<u8>,
) {
    let lines: Vec<&str> = text.split('\n').collect();
    let (block_width, block_height) = font.measure_block(text, px);
    if block_width <= 0.0 || block_height <= 0.0 {
        return;
    }

    let text_canvas_w = block_width.ceil() as u32 + CANVAS_PADDING * 2;
    let text_canvas_h = block_height.ceil() as u32 + CANVAS_PADDING * 2;
    let mut text_canvas = RgbaImage::new(text_canvas_w, text_canvas_h);

    let line_height = font.line_height(px);
    let ascent = {
        let scaled = font.font.as_scaled(PxScale::from(px));
        scaled.ascent()
    };
    let mut current_y = CANVAS_PADDING as f32;
    for line in &lines {
        let line_width = font.measure_line(line, px);
        let line_x = (text_canvas_w as f32 - line_width) / 2.0;
        font.rasterize_line(&mut text_canvas, line, px, line_x, current_y + ascent, color);
        current_y += line_height;
    }

    let stamped = if angle_degrees != 0.0 {
        // Embed in a square large enough for any rotation, then rotate.
        let diagonal = ((text_canvas_w.pow(2) + text_canvas_h.pow(2)) as f32)
            .sqrt()
            .ceil() as u32;
        let mut square = RgbaImage::new(diagonal, diagonal);
        image::imageops::replace(
            &mut square,
            &text_canvas,
            ((diagonal - text_canvas_w) / 2) as i64,
            ((diagonal - text_canvas_h) / 2) as i64,
        );
        rotate_about_center(
            &square,
            -angle_degrees.to_radians(),
            Interpolation::Bilinear,
            Rgba([0, 0, 0, 0]),
        )
    } else {
        text_canvas
    };

    let paste_x = (center.0 - stamped.width() as f32 / 2.0).round() as i64;
    let paste_y = (center.1 - stamped.height() as f32 / 2.0).round() as i64;
    image::imageops::overlay(canvas, &stamped, paste_x, paste_y);
}
