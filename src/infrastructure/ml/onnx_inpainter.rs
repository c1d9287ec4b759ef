//! Batched LaMa-style inpainting over a single ONNX session.

use super::session::build_session;
use super::traits::InpaintModel;
use async_trait::async_trait;
use image::{GrayImage, Rgb, RgbImage};
use ndarray::{Array, IxDyn};
use ort::session::Session;
use ort::value::Value;
use std::sync::Mutex;

pub struct OnnxInpainter {
    // The session is the GPU slot: the lock serializes inference.
    session: Mutex<Session>,
}

impl OnnxInpainter {
    pub fn new(model_path: &str, use_cuda: bool) -> anyhow::Result<Self> {
        Ok(Self {
            session: Mutex::new(build_session(model_path, use_cuda)?),
        })
    }
}

#[async_trait]
impl InpaintModel for OnnxInpainter {
    async fn inpaint_batch(
        &self,
        images: &[RgbImage],
        masks: &[GrayImage],
    ) -> anyhow::Result<Vec<RgbImage>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }
        if images.len() != masks.len() {
            anyhow::bail!(
                "batch mismatch: {} images, {} masks",
                images.len(),
                masks.len()
            );
        }
        let (width, height) = images[0].dimensions();
        for (image, mask) in images.iter().zip(masks) {
            if image.dimensions() != (width, height) || mask.dimensions() != (width, height) {
                anyhow::bail!("all batch members must share the model resolution");
            }
        }

        let batch = images.len();
        let mut image_input =
            Array::zeros(IxDyn(&[batch, 3, height as usize, width as usize]));
        let mut mask_input = Array::zeros(IxDyn(&[batch, 1, height as usize, width as usize]));
        for (index, (image, mask)) in images.iter().zip(masks).enumerate() {
            for y in 0..height {
                for x in 0..width {
                    let pixel = image.get_pixel(x, y);
                    for channel in 0..3 {
                        image_input[[index, channel, y as usize, x as usize]] =
                            pixel[channel] as f32 / 255.0;
                    }
                    mask_input[[index, 0, y as usize, x as usize]] =
                        (mask.get_pixel(x, y)[0] > 127) as u8 as f32;
                }
            }
        }

        let image_shape: Vec<i64> = image_input.shape().iter().map(|&d| d as i64).collect();
        let image_value = Value::from_array((image_shape, image_input.into_raw_vec()))?;
        let mask_shape: Vec<i64> = mask_input.shape().iter().map(|&d| d as i64).collect();
        let mask_value = Value::from_array((mask_shape, mask_input.into_raw_vec()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire session lock"))?;
        let outputs = session.run(ort::inputs![image_value, mask_value])?;
        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;

        let shape: Vec<usize> = output_shape.iter().map(|&d| d as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape), output_data.to_vec())?;

        // The exported model emits 0..255 floats; clamp and cast.
        let mut results = Vec::with_capacity(batch);
        for index in 0..batch {
            let mut image = RgbImage::new(width, height);
            for y in 0..height {
                for x in 0..width {
                    let mut pixel = [0u8; 3];
                    for channel in 0..3 {
                        pixel[channel] = output[[index, channel, y as usize, x as usize]]
                            .clamp(0.0, 255.0) as u8;
                    }
                    image.put_pixel(x, y, Rgb(pixel));
                }
            }
            results.push(image);
        }
        Ok(results)
    }
}
