//! Binary mask synthesis from filtered text boxes.

use crate::domain::text_box::TextBox;
use image::{GrayImage, Luma, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

/// Decode the source bytes and rasterize the inpainting mask.
///
/// The mask matches the source dimensions exactly; pixel 255 marks text to
/// inpaint. Callers pass boxes that already survived the Chinese filter.
pub fn synthesize(
    image_bytes: &[u8],
    boxes: &[TextBox],
    padding: i32,
) -> anyhow::Result<(RgbImage, GrayImage)> {
    let image = image::load_from_memory(image_bytes)
        .map_err(|e| anyhow::anyhow!("failed to decode image: {}", e))?
        .to_rgb8();
    let (width, height) = image.dimensions();

    let mut mask = GrayImage::new(width, height);
    for text_box in boxes {
        let polygon = pad_polygon(&text_box.polygon, padding, width, height);
        rasterize(&mut mask, &polygon);
    }
    Ok((image, mask))
}

/// Grow a quadrilateral outward by `padding`, clamped to image bounds.
///
/// Corners move diagonally away from the box: top-left shrinks both
/// coordinates, bottom-right grows both, and so on in TL/TR/BR/BL reading
/// order. Polygons that are not quadrilaterals are left untouched.
pub fn pad_polygon(polygon: &[[f32; 2]], padding: i32, width: u32, height: u32) -> Vec<[f32; 2]> {
    let max_x = width as f32 - 1.0;
    let max_y = height as f32 - 1.0;

    if polygon.len() != 4 {
        return polygon
            .iter()
            .map(|&[x, y]| [x.clamp(0.0, max_x), y.clamp(0.0, max_y)])
            .collect();
    }

    let pad = padding as f32;
    let signs = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
    polygon
        .iter()
        .zip(signs)
        .map(|(&[x, y], [sx, sy])| {
            [
                (x + sx * pad).clamp(0.0, max_x),
                (y + sy * pad).clamp(0.0, max_y),
            ]
        })
        .collect()
}

fn rasterize(mask: &mut GrayImage, polygon: &[[f32; 2]]) {
    let mut points: Vec<Point<i32>> = polygon
        .iter()
        .map(|&[x, y]| Point::new(x.round() as i32, y.round() as i32))
        .collect();
    points.dedup();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return;
    }
    draw_polygon_mut(mask, &points, Luma([255u8]));
}
