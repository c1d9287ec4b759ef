use async_trait::async_trait;
use image::imageops::FilterType;
use image::{GrayImage, Rgb, RgbImage};
use image_translate_worker::infrastructure::ml::traits::UpscaleModel;
use image_translate_worker::pipeline::postprocess::{crop_center, reflect_pad, restore};
use image_translate_worker::pipeline::preprocess::preprocess;
use std::sync::Arc;

struct NearestUpscaler;

#[async_trait]
impl UpscaleModel for NearestUpscaler {
    fn factor(&self) -> u32 {
        2
    }

    async fn upscale(&self, image: &RgbImage) -> anyhow::Result<RgbImage> {
        let (width, height) = image.dimensions();
        Ok(image::imageops::resize(
            image,
            width * 2,
            height * 2,
            FilterType::Nearest,
        ))
    }
}

struct BrokenUpscaler;

#[async_trait]
impl UpscaleModel for BrokenUpscaler {
    fn factor(&self) -> u32 {
        2
    }

    async fn upscale(&self, _image: &RgbImage) -> anyhow::Result<RgbImage> {
        anyhow::bail!("upscaler exploded")
    }
}

#[test]
fn crop_center_undoes_center_padding() {
    let mut padded = RgbImage::from_pixel(512, 512, Rgb([0, 0, 0]));
    let content = RgbImage::from_pixel(320, 240, Rgb([10, 200, 30]));
    let left = (512 - 320) / 2;
    let top = (512 - 240) / 2;
    image::imageops::replace(&mut padded, &content, left as i64, top as i64);

    let cropped = crop_center(&padded, (320, 240));
    assert_eq!(cropped.dimensions(), (320, 240));
    assert!(cropped.pixels().all(|pixel| *pixel == Rgb([10, 200, 30])));
}

#[test]
fn reflect_pad_mirrors_edges() {
    let mut image = RgbImage::new(4, 3);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        *pixel = Rgb([(x * 10) as u8, (y * 10) as u8, 0]);
    }
    let padded = reflect_pad(&image, 2, 1);
    assert_eq!(padded.dimensions(), (6, 4));
    // First padded column mirrors column width-2.
    assert_eq!(padded.get_pixel(4, 0), image.get_pixel(2, 0));
    assert_eq!(padded.get_pixel(5, 0), image.get_pixel(1, 0));
    // First padded row mirrors row height-2.
    assert_eq!(padded.get_pixel(0, 3), image.get_pixel(0, 1));
}

#[tokio::test]
async fn preprocess_then_restore_round_trips_dimensions() {
    for (width, height) in [(640u32, 480u32), (200, 100), (1500, 700), (513, 513)] {
        let image = RgbImage::from_pixel(width, height, Rgb([120, 130, 140]));
        let mask = GrayImage::new(width, height);
        let prepared = preprocess(&image, &mask).unwrap();

        let restored = restore(
            prepared.image.clone(),
            prepared.size_before_padding,
            prepared.scale_factor,
            (width, height),
            Arc::new(NearestUpscaler),
            "round-trip".to_string(),
        )
        .await
        .unwrap();
        assert_eq!(restored.dimensions(), (width, height));
    }
}

#[tokio::test]
async fn upscaler_failure_falls_back_to_plain_resize() {
    let image = RgbImage::from_pixel(640, 480, Rgb([9, 9, 9]));
    let mask = GrayImage::new(640, 480);
    let prepared = preprocess(&image, &mask).unwrap();
    assert!(prepared.scale_factor > 1);

    let restored = restore(
        prepared.image.clone(),
        prepared.size_before_padding,
        prepared.scale_factor,
        (640, 480),
        Arc::new(BrokenUpscaler),
        "fallback".to_string(),
    )
    .await
    .unwrap();
    assert_eq!(restored.dimensions(), (640, 480));
}
