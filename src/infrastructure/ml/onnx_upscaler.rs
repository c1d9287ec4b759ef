//! Fixed 2x ONNX upscaler used after inpainting at reduced scale.

use super::session::build_session;
use super::traits::UpscaleModel;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use ndarray::{Array, IxDyn};
use ort::session::Session;
use ort::value::Value;
use std::sync::Mutex;

const UPSCALE_FACTOR: u32 = 2;

pub struct OnnxUpscaler {
    session: Mutex<Session>,
}

impl OnnxUpscaler {
    pub fn new(model_path: &str, use_cuda: bool) -> anyhow::Result<Self> {
        Ok(Self {
            session: Mutex::new(build_session(model_path, use_cuda)?),
        })
    }
}

#[async_trait]
impl UpscaleModel for OnnxUpscaler {
    fn factor(&self) -> u32 {
        UPSCALE_FACTOR
    }

    async fn upscale(&self, image: &RgbImage) -> anyhow::Result<RgbImage> {
        let (width, height) = image.dimensions();
        let mut input = Array::zeros(IxDyn(&[1, 3, height as usize, width as usize]));
        for y in 0..height {
            for x in 0..width {
                let pixel = image.get_pixel(x, y);
                for channel in 0..3 {
                    input[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
                }
            }
        }

        let input_shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let input_value = Value::from_array((input_shape, input.into_raw_vec()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire session lock"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;

        let shape: Vec<usize> = output_shape.iter().map(|&d| d as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape), output_data.to_vec())?;
        let (out_h, out_w) = (shape[2], shape[3]);
        if out_w != (width * UPSCALE_FACTOR) as usize || out_h != (height * UPSCALE_FACTOR) as usize
        {
            anyhow::bail!(
                "upscaler returned {}x{} for {}x{} input",
                out_w,
                out_h,
                width,
                height
            );
        }

        let mut result = RgbImage::new(out_w as u32, out_h as u32);
        for y in 0..out_h {
            for x in 0..out_w {
                let mut pixel = [0u8; 3];
                for channel in 0..3 {
                    pixel[channel] =
                        (output[[0, channel, y, x]] * 255.0).clamp(0.0, 255.0) as u8;
                }
                result.put_pixel(x as u32, y as u32, Rgb(pixel));
            }
        }
        Ok(result)
    }
}
