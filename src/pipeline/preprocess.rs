//! Per-job preprocessing for the inpaint batcher.
//!
//! Every job leaves here at exactly the model resolution: denoised,
//! integer-downscaled so the longest side fits, and center-padded with
//! zeros. The mask gets the same geometry so pixel correspondence holds.

use image::imageops::FilterType;
use image::{GrayImage, RgbImage};
use imageproc::filter::bilateral_filter;

/// Side length of the square model input.
pub const MODEL_RESOLUTION: u32 = 512;

const BILATERAL_WINDOW: u32 = 9;
const BILATERAL_SIGMA: f32 = 50.0;

#[derive(Debug)]
pub struct Preprocessed {
    pub image: RgbImage,
    pub mask: GrayImage,
    /// (width, height) after scaling, before center padding.
    pub size_before_padding: (u32, u32),
    /// Integer downscale factor (1 = no downscale).
    pub scale_factor: u32,
}

/// Preprocess one source image + mask pair down to the model resolution.
pub fn preprocess(image: &RgbImage, mask: &GrayImage) -> anyhow::Result<Preprocessed> {
    let (width, height) = image.dimensions();
    if mask.dimensions() != (width, height) {
        anyhow::bail!(
            "mask {}x{} does not match image {}x{}",
            mask.width(),
            mask.height(),
            width,
            height
        );
    }

    let denoised = denoise(image);

    let max_dim = width.max(height);
    let scale_factor = max_dim.div_ceil(MODEL_RESOLUTION).max(1);

    let (scaled_image, scaled_mask) = if scale_factor > 1 {
        let new_w = (width / scale_factor).max(1);
        let new_h = (height / scale_factor).max(1);
        (
            image::imageops::resize(&denoised, new_w, new_h, FilterType::Nearest),
            image::imageops::resize(mask, new_w, new_h, FilterType::Nearest),
        )
    } else {
        (denoised, mask.clone())
    };

    let size_before_padding = scaled_image.dimensions();
    Ok(Preprocessed {
        image: pad_to_square(&scaled_image),
        mask: pad_mask_to_square(&scaled_mask),
        size_before_padding,
        scale_factor,
    })
}

/// Edge-preserving denoise ahead of inpainting, applied per channel.
fn denoise(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut channels = Vec::with_capacity(3);
    for channel in 0..3 {
        let plane = GrayImage::from_fn(width, height, |x, y| {
            image::Luma([image.get_pixel(x, y)[channel]])
        });
        channels.push(bilateral_filter(
            &plane,
            BILATERAL_WINDOW,
            BILATERAL_SIGMA,
            BILATERAL_SIGMA,
        ));
    }
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            channels[0].get_pixel(x, y)[0],
            channels[1].get_pixel(x, y)[0],
            channels[2].get_pixel(x, y)[0],
        ])
    })
}

fn pad_to_square(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut canvas = RgbImage::new(MODEL_RESOLUTION, MODEL_RESOLUTION);
    let left = (MODEL_RESOLUTION - width) / 2;
    let top = (MODEL_RESOLUTION - height) / 2;
    image::imageops::replace(&mut canvas, image, left as i64, top as i64);
    canvas
}

fn pad_mask_to_square(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut canvas = GrayImage::new(MODEL_RESOLUTION, MODEL_RESOLUTION);
    let left = (MODEL_RESOLUTION - width) / 2;
    let top = (MODEL_RESOLUTION - height) / 2;
    image::imageops::replace(&mut canvas, mask, left as i64, top as i64);
    canvas
}
