use image::{GrayImage, Luma, Rgb, RgbImage};
use image_translate_worker::pipeline::preprocess::{MODEL_RESOLUTION, preprocess};

#[test]
fn small_images_are_padded_without_scaling() {
    let image = RgbImage::from_pixel(200, 100, Rgb([50, 60, 70]));
    let mask = GrayImage::new(200, 100);
    let prepared = preprocess(&image, &mask).unwrap();

    assert_eq!(prepared.scale_factor, 1);
    assert_eq!(prepared.size_before_padding, (200, 100));
    assert_eq!(
        prepared.image.dimensions(),
        (MODEL_RESOLUTION, MODEL_RESOLUTION)
    );
    assert_eq!(
        prepared.mask.dimensions(),
        (MODEL_RESOLUTION, MODEL_RESOLUTION)
    );
}

#[test]
fn oversized_images_get_integer_ceil_scale() {
    // max dim 640 -> ceil(640/512) = 2.
    let image = RgbImage::from_pixel(640, 480, Rgb([50, 60, 70]));
    let mask = GrayImage::new(640, 480);
    let prepared = preprocess(&image, &mask).unwrap();

    assert_eq!(prepared.scale_factor, 2);
    assert_eq!(prepared.size_before_padding, (320, 240));
    assert_eq!(
        prepared.image.dimensions(),
        (MODEL_RESOLUTION, MODEL_RESOLUTION)
    );
}

#[test]
fn very_large_images_scale_harder() {
    // max dim 2200 -> ceil(2200/512) = 5.
    let image = RgbImage::from_pixel(2200, 1100, Rgb([0, 0, 0]));
    let mask = GrayImage::new(2200, 1100);
    let prepared = preprocess(&image, &mask).unwrap();
    assert_eq!(prepared.scale_factor, 5);
    assert_eq!(prepared.size_before_padding, (440, 220));
}

#[test]
fn mask_stays_binary_through_preprocessing() {
    let image = RgbImage::from_pixel(640, 480, Rgb([90, 90, 90]));
    let mut mask = GrayImage::new(640, 480);
    for y in 100..200 {
        for x in 100..300 {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    let prepared = preprocess(&image, &mask).unwrap();
    assert!(
        prepared
            .mask
            .pixels()
            .all(|pixel| pixel[0] == 0 || pixel[0] == 255)
    );
    assert!(prepared.mask.pixels().any(|pixel| pixel[0] == 255));
}

#[test]
fn padding_is_centered() {
    let image = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
    let mask = GrayImage::new(200, 100);
    let prepared = preprocess(&image, &mask).unwrap();

    let left = (MODEL_RESOLUTION - 200) / 2;
    let top = (MODEL_RESOLUTION - 100) / 2;
    // Content region is red-ish (denoise preserves a uniform field).
    assert_eq!(prepared.image.get_pixel(left + 10, top + 10)[0], 255);
    // Padding is zeros.
    assert_eq!(prepared.image.get_pixel(0, 0), &Rgb([0, 0, 0]));
    assert_eq!(
        prepared.image.get_pixel(MODEL_RESOLUTION - 1, 0),
        &Rgb([0, 0, 0])
    );
}

#[test]
fn mismatched_mask_dimensions_error() {
    let image = RgbImage::new(100, 100);
    let mask = GrayImage::new(50, 50);
    assert!(preprocess(&image, &mask).is_err());
}
