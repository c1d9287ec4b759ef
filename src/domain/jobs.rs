//! Pipeline job payloads.
//!
//! Images are owned by the job that carries them and move between stages
//! over channels; nothing here is shared or reference-counted.

use crate::domain::text_box::TranslatedItem;
use image::{GrayImage, RgbImage};

/// A preprocessed inpainting job as accepted by the batcher.
///
/// Created by the dispatcher after mask synthesis, consumed by the
/// batcher, destroyed when the postprocessed result is sent back.
#[derive(Debug)]
pub struct InpaintJob {
    pub request_id: String,
    pub image_id: String,
    pub is_long: bool,
    /// Denoised, scaled and zero-padded to the model resolution.
    pub preprocessed_image: RgbImage,
    /// Scaled and zero-padded with the same geometry as the image.
    pub preprocessed_mask: GrayImage,
    /// (width, height) after scaling, before center padding.
    pub size_before_padding: (u32, u32),
    /// Integer downscale factor applied during preprocessing (1 = none).
    pub scale_factor: u32,
    /// (width, height) of the decoded source image.
    pub original_size: (u32, u32),
}

/// A complete render job, emitted by the join coordinator exactly once per
/// request when both the translation and the inpainting results are in.
#[derive(Debug)]
pub struct RenderJob {
    pub request_id: String,
    pub image_id: String,
    pub is_long: bool,
    pub original_image: RgbImage,
    pub inpainted_image: RgbImage,
    pub translated_items: Vec<TranslatedItem>,
}
