//! Final-image rendering: canvas sizing, local color correction,
//! compositing, and translated-text drawing.

pub mod color;
pub mod draw;
pub mod layout;

use crate::domain::jobs::RenderJob;
use crate::domain::text_box::TranslatedItem;
use draw::FontHandle;
use image::imageops::FilterType;
use image::{GrayImage, Luma, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use imageproc::point::Point;

/// Fixed output width for long images.
const LONG_TARGET_WIDTH: u32 = 860;

pub struct Renderer {
    font: FontHandle,
    mask_padding: i32,
    short_canvas: (u32, u32),
}

impl Renderer {
    pub fn new(
        font_path: &str,
        mask_padding: i32,
        short_canvas: (u32, u32),
    ) -> anyhow::Result<Self> {
        Ok(Self {
            font: FontHandle::load(font_path)?,
            mask_padding,
            short_canvas,
        })
    }

    /// Render one joined request into the final output image.
    ///
    /// Pure CPU; the dispatcher runs it on the blocking pool.
    pub fn render(&self, job: RenderJob) -> anyhow::Result<RgbImage> {
        let RenderJob {
            request_id,
            is_long,
            original_image,
            inpainted_image,
            translated_items,
            ..
        } = job;
        let request_id = request_id.as_str();

        let (source_w, source_h) = original_image.dimensions();
        if source_w == 0 || source_h == 0 {
            anyhow::bail!("source image has zero dimension");
        }

        // Short images go to a fixed canvas with independent axis scales;
        // long images keep their aspect ratio under one isotropic scale.
        let (target_w, target_h, width_scale, height_scale) = if is_long {
            let scale = LONG_TARGET_WIDTH as f32 / source_w as f32;
            let target_h = (source_h as f32 * scale).round() as u32;
            (LONG_TARGET_WIDTH, target_h, scale, scale)
        } else {
            let (target_w, target_h) = self.short_canvas;
            (
                target_w,
                target_h,
                target_w as f32 / source_w as f32,
                target_h as f32 / source_h as f32,
            )
        };
        if target_h == 0 {
            anyhow::bail!("computed zero target height for {}x{}", source_w, source_h);
        }

        let resized_original =
            image::imageops::resize(&original_image, target_w, target_h, FilterType::Triangle);
        let resized_inpainted =
            image::imageops::resize(&inpainted_image, target_w, target_h, FilterType::Triangle);

        let items = scale_items(&translated_items, width_scale, height_scale, target_w, target_h);

        // Local color correction of the inpainted regions, then composite
        // them over the crisp resized original.
        let corrected = color::correct_colors(
            &resized_original,
            &resized_inpainted,
            &items,
            self.mask_padding,
            request_id,
        );
        let mut canvas = resized_original.clone();
        let paste_mask = dilated_union_mask(&items, target_w, target_h, self.mask_padding + 1);
        for (x, y, pixel) in canvas.enumerate_pixels_mut() {
            if paste_mask.get_pixel(x, y)[0] > 0 {
                *pixel = *corrected.get_pixel(x, y);
            }
        }

        // Font sizes and colors are decided against the text-free
        // composited background, before anything is drawn.
        let mut placements = Vec::new();
        for item in items.iter().filter(|item| !item.translated_text.trim().is_empty()) {
            let metrics = layout::box_metrics(&item.polygon);
            if metrics.width <= 0.0 || metrics.height <= 0.0 {
                tracing::warn!(request_id, "Degenerate box skipped during rendering");
                continue;
            }
            let font_size = layout::fit_font_size(
                &self.font,
                &item.translated_text,
                metrics.width,
                metrics.height,
            );
            let text_color =
                color::select_text_color(request_id, &canvas, &resized_original, &item.polygon);
            placements.push((item, metrics, font_size, text_color));
        }

        let mut overlay = image::DynamicImage::ImageRgb8(canvas).to_rgba8();
        for (item, metrics, font_size, text_color) in placements {
            draw::draw_text(
                &mut overlay,
                &self.font,
                &item.translated_text,
                polygon_center(&item.polygon),
                font_size as f32,
                metrics.angle_degrees,
                text_color,
            );
        }

        Ok(image::DynamicImage::ImageRgba8(overlay).to_rgb8())
    }
}

/// Scale polygons into canvas space, clamping vertices to the canvas.
fn scale_items(
    items: &[TranslatedItem],
    width_scale: f32,
    height_scale: f32,
    target_w: u32,
    target_h: u32,
) -> Vec<TranslatedItem> {
    let max_x = target_w as f32 - 1.0;
    let max_y = target_h as f32 - 1.0;
    items
        .iter()
        .map(|item| TranslatedItem {
            polygon: item
                .polygon
                .iter()
                .map(|&[x, y]| {
                    [
                        (x * width_scale).clamp(0.0, max_x),
                        (y * height_scale).clamp(0.0, max_y),
                    ]
                })
                .collect(),
            translated_text: item.translated_text.clone(),
            original_char_count: item.original_char_count,
        })
        .collect()
}

/// Union of all boxes, dilated by `padding`.
pub(crate) fn dilated_union_mask(
    items: &[TranslatedItem],
    width: u32,
    height: u32,
    padding: i32,
) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for item in items {
        let mut points: Vec<Point<i32>> = item
            .polygon
            .iter()
            .map(|&[x, y]| Point::new(x.round() as i32, y.round() as i32))
            .collect();
        points.dedup();
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        if points.len() < 3 {
            continue;
        }
        draw_polygon_mut(&mut mask, &points, Luma([255u8]));
    }
    if padding > 0 {
        mask = dilate(&mask, Norm::LInf, padding.min(u8::MAX as i32) as u8);
    }
    mask
}

fn polygon_center(polygon: &[[f32; 2]]) -> (f32, f32) {
    let count = polygon.len().max(1) as f32;
    let sum = polygon
        .iter()
        .fold((0.0f32, 0.0f32), |acc, &[x, y]| (acc.0 + x, acc.1 + y));
    (sum.0 / count, sum.1 / count)
}
