use image::{Rgb, RgbImage};
use image_translate_worker::domain::text_box::TextBox;
use image_translate_worker::pipeline::mask::{pad_polygon, synthesize};
use std::io::Cursor;

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 200, 200]));
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn chinese_box(polygon: Vec<[f32; 2]>) -> TextBox {
    TextBox::new(polygon, "你好", 0.9)
}

#[test]
fn mask_matches_source_dimensions_and_is_binary() {
    let bytes = png_bytes(64, 48);
    let boxes = vec![chinese_box(vec![
        [10.0, 10.0],
        [30.0, 10.0],
        [30.0, 20.0],
        [10.0, 20.0],
    ])];
    let (image, mask) = synthesize(&bytes, &boxes, 3).unwrap();
    assert_eq!(image.dimensions(), (64, 48));
    assert_eq!(mask.dimensions(), (64, 48));
    assert!(mask.pixels().all(|pixel| pixel[0] == 0 || pixel[0] == 255));
    assert!(mask.pixels().any(|pixel| pixel[0] == 255));
}

#[test]
fn zero_padding_rasterizes_the_polygon_exactly() {
    let bytes = png_bytes(64, 64);
    let polygon = vec![[10.0, 10.0], [30.0, 10.0], [30.0, 20.0], [10.0, 20.0]];
    let (_, mask) = synthesize(&bytes, &[chinese_box(polygon)], 0).unwrap();

    // Interior is masked, well outside is not.
    assert_eq!(mask.get_pixel(20, 15)[0], 255);
    assert_eq!(mask.get_pixel(5, 5)[0], 0);
    assert_eq!(mask.get_pixel(40, 15)[0], 0);
}

#[test]
fn padding_grows_corners_diagonally_with_clamping() {
    let polygon = vec![[10.0, 10.0], [30.0, 10.0], [30.0, 20.0], [10.0, 20.0]];
    let padded = pad_polygon(&polygon, 5, 64, 64);
    assert_eq!(padded[0], [5.0, 5.0]);
    assert_eq!(padded[1], [35.0, 5.0]);
    assert_eq!(padded[2], [35.0, 25.0]);
    assert_eq!(padded[3], [5.0, 25.0]);

    // Near the origin the padding clamps to the image bounds.
    let edge = vec![[2.0, 2.0], [62.0, 2.0], [62.0, 62.0], [2.0, 62.0]];
    let clamped = pad_polygon(&edge, 5, 64, 64);
    assert_eq!(clamped[0], [0.0, 0.0]);
    assert_eq!(clamped[2], [63.0, 63.0]);
}

#[test]
fn non_quadrilaterals_are_not_padded() {
    let triangle = vec![[10.0, 10.0], [30.0, 10.0], [20.0, 30.0]];
    let padded = pad_polygon(&triangle, 5, 64, 64);
    assert_eq!(padded, triangle);
}

#[test]
fn mask_covers_padded_region() {
    let bytes = png_bytes(64, 64);
    let polygon = vec![[20.0, 20.0], [40.0, 20.0], [40.0, 30.0], [20.0, 30.0]];
    let (_, unpadded) = synthesize(&bytes, &[chinese_box(polygon.clone())], 0).unwrap();
    let (_, padded) = synthesize(&bytes, &[chinese_box(polygon)], 4).unwrap();

    // The padded mask strictly contains the unpadded one.
    for (x, y, pixel) in unpadded.enumerate_pixels() {
        if pixel[0] == 255 {
            assert_eq!(padded.get_pixel(x, y)[0], 255);
        }
    }
    assert_eq!(padded.get_pixel(17, 25)[0], 255);
    assert_eq!(unpadded.get_pixel(17, 25)[0], 0);
}

#[test]
fn undecodable_bytes_error() {
    let boxes = vec![chinese_box(vec![
        [0.0, 0.0],
        [1.0, 0.0],
        [1.0, 1.0],
        [0.0, 1.0],
    ])];
    assert!(synthesize(b"not an image", &boxes, 0).is_err());
}
