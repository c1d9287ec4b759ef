//! Encode-and-upload stage in front of the object store.

use crate::domain::envelope::object_key;
use crate::infrastructure::storage::traits::StorageService;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use std::io::Cursor;
use std::sync::Arc;

pub struct Uploader {
    storage: Arc<dyn StorageService>,
    jpeg_quality: u8,
}

impl Uploader {
    pub fn new(storage: Arc<dyn StorageService>, jpeg_quality: u8) -> Self {
        Self {
            storage,
            jpeg_quality,
        }
    }

    /// Encode `image` as JPEG and upload it under the dated result key.
    /// Returns the public URL.
    pub async fn upload_image(
        &self,
        image: RgbImage,
        image_id: &str,
        request_id: &str,
        upload_type: &str,
    ) -> anyhow::Result<String> {
        let quality = self.jpeg_quality;
        let encoded =
            tokio::task::spawn_blocking(move || encode_jpeg(&image, quality)).await??;

        let key = object_key(image_id, request_id, chrono::Local::now().date_naive());
        let metadata = [
            ("request_id", request_id.to_string()),
            ("image_id", image_id.to_string()),
            ("type", upload_type.to_string()),
        ];
        let url = self
            .storage
            .upload(&key, encoded, "image/jpeg", &metadata)
            .await?;
        tracing::info!(request_id, "Uploaded {} -> {}", key, url);
        Ok(url)
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> anyhow::Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| anyhow::anyhow!("JPEG encoding failed: {}", e))?;
    Ok(buffer.into_inner())
}
