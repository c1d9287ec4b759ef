use crate::domain::text_box::TextBox;
use async_trait::async_trait;
use image::{GrayImage, RgbImage};

/// Text detection + recognition over raw image bytes.
///
/// The adapter owns decoding and the color order the model expects; it
/// exposes nothing but the canonical box list.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Run one throwaway inference so the first real request does not pay
    /// the session warm-up cost.
    async fn warm_up(&self) -> anyhow::Result<()>;

    async fn detect(&self, image_bytes: &[u8]) -> anyhow::Result<Vec<TextBox>>;
}

/// Batched inpainting at a fixed model resolution.
///
/// Images and masks arrive preprocessed to identical dimensions; the
/// result batch preserves input order.
#[async_trait]
pub trait InpaintModel: Send + Sync {
    async fn inpaint_batch(
        &self,
        images: &[RgbImage],
        masks: &[GrayImage],
    ) -> anyhow::Result<Vec<RgbImage>>;
}

/// Fixed-factor image upscaling.
#[async_trait]
pub trait UpscaleModel: Send + Sync {
    /// The model's built-in scale factor.
    fn factor(&self) -> u32;

    async fn upscale(&self, image: &RgbImage) -> anyhow::Result<RgbImage>;
}
