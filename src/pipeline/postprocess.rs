//! Per-result postprocessing: undo the batcher's padding and scaling.

use crate::infrastructure::ml::traits::UpscaleModel;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::sync::Arc;

/// Undo center padding: crop the central `size_before_padding` region.
pub fn crop_center(image: &RgbImage, size_before_padding: (u32, u32)) -> RgbImage {
    let (content_w, content_h) = size_before_padding;
    let left = (image.width() - content_w) / 2;
    let top = (image.height() - content_h) / 2;
    image::imageops::crop_imm(image, left, top, content_w, content_h).to_image()
}

/// Restore an inpainted model-resolution image to the source dimensions.
///
/// At scale 1 this is a crop. At larger scales the cropped image is
/// reflect-padded up to 64-multiples, run through the upscaler, cropped
/// back, and cubic-resized for any residual factor; if the upscaler fails
/// the whole factor is recovered with a cubic resize. Either way the
/// result matches `original_size` exactly. Pixel work runs on the
/// blocking pool.
pub async fn restore(
    inpainted: RgbImage,
    size_before_padding: (u32, u32),
    scale_factor: u32,
    original_size: (u32, u32),
    upscaler: Arc<dyn UpscaleModel>,
    request_id: String,
) -> anyhow::Result<RgbImage> {
    let request_id = request_id.as_str();
    let cropped =
        tokio::task::spawn_blocking(move || crop_center(&inpainted, size_before_padding)).await?;
    if scale_factor <= 1 {
        return Ok(resize_to_exact_blocking(cropped, original_size).await?);
    }

    let (w, h) = cropped.dimensions();
    let upscaled = match upscale_whole(cropped.clone(), upscaler).await {
        Ok(image) => image,
        Err(e) => {
            tracing::warn!(
                request_id,
                "Upscaling failed: {}. Falling back to cubic resize.",
                e
            );
            tokio::task::spawn_blocking(move || {
                image::imageops::resize(
                    &cropped,
                    w * scale_factor,
                    h * scale_factor,
                    FilterType::CatmullRom,
                )
            })
            .await?
        }
    };

    // Residual factor beyond the upscaler's fixed ratio.
    let target = (w * scale_factor, h * scale_factor);
    let resized = if upscaled.dimensions() != target {
        tokio::task::spawn_blocking(move || {
            image::imageops::resize(&upscaled, target.0, target.1, FilterType::CatmullRom)
        })
        .await?
    } else {
        upscaled
    };

    Ok(resize_to_exact_blocking(resized, original_size).await?)
}

async fn upscale_whole(
    image: RgbImage,
    upscaler: Arc<dyn UpscaleModel>,
) -> anyhow::Result<RgbImage> {
    let (width, height) = image.dimensions();
    let padded_w = width.div_ceil(64) * 64;
    let padded_h = height.div_ceil(64) * 64;

    let padded = if (padded_w, padded_h) != (width, height) {
        tokio::task::spawn_blocking(move || {
            reflect_pad(&image, padded_w - width, padded_h - height)
        })
        .await?
    } else {
        image
    };

    let upscaled = upscaler.upscale(&padded).await?;
    let factor = upscaler.factor();
    Ok(
        tokio::task::spawn_blocking(move || {
            image::imageops::crop_imm(&upscaled, 0, 0, width * factor, height * factor).to_image()
        })
        .await?,
    )
}

/// Pad on the right and bottom by mirroring edge content.
pub fn reflect_pad(image: &RgbImage, pad_right: u32, pad_bottom: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    RgbImage::from_fn(width + pad_right, height + pad_bottom, |x, y| {
        let src_x = if x < width {
            x
        } else {
            // Mirror without repeating the edge pixel.
            width.saturating_sub(2 + (x - width)).min(width - 1)
        };
        let src_y = if y < height {
            y
        } else {
            height.saturating_sub(2 + (y - height)).min(height - 1)
        };
        Rgb(image.get_pixel(src_x, src_y).0)
    })
}

async fn resize_to_exact_blocking(
    image: RgbImage,
    target: (u32, u32),
) -> Result<RgbImage, tokio::task::JoinError> {
    if image.dimensions() == target {
        return Ok(image);
    }
    tokio::task::spawn_blocking(move || {
        image::imageops::resize(&image, target.0, target.1, FilterType::CatmullRom)
    })
    .await
}
