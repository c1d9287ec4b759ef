//! Detection + recognition OCR over a pair of ONNX sessions.
//!
//! Detection is a DB-style segmentation model: the probability map is
//! thresholded, connected components become axis-aligned boxes, and each
//! box is grown by the standard DB unclip offset. Recognition crops every
//! box, resizes it to the model's line height, and CTC-decodes the logits
//! against the charset file. Both models consume BGR channel order.

use super::session::build_session;
use super::traits::OcrService;
use crate::domain::text_box::TextBox;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{Connectivity, connected_components};
use ndarray::{Array, IxDyn};
use ort::session::Session;
use ort::value::Value;
use std::sync::Mutex;

/// Longest image side fed to the detection model.
const DET_MAX_SIDE: u32 = 960;
/// Pixel-level binarization threshold on the probability map.
const DET_THRESH: f32 = 0.3;
/// Minimum mean probability for a candidate box to survive.
const DET_BOX_THRESH: f32 = 0.5;
/// DB unclip ratio used to grow detected regions.
const DET_UNCLIP_RATIO: f32 = 1.5;
/// Components smaller than this many pixels are noise.
const MIN_COMPONENT_AREA: u32 = 10;

/// Recognition input line height.
const REC_HEIGHT: u32 = 48;
/// Recognition input max line width.
const REC_MAX_WIDTH: u32 = 320;
/// Recognized lines scoring below this are dropped.
const REC_DROP_SCORE: f32 = 0.5;

pub struct OnnxOcrService {
    // Sessions need &mut to run; Mutex serializes inference on the OCR's
    // own GPU slot.
    det_session: Mutex<Session>,
    rec_session: Mutex<Session>,
    charset: Vec<String>,
}

impl OnnxOcrService {
    pub fn new(
        det_model_path: &str,
        rec_model_path: &str,
        dict_path: &str,
        use_cuda: bool,
    ) -> anyhow::Result<Self> {
        let charset = std::fs::read_to_string(dict_path)
            .map_err(|e| anyhow::anyhow!("failed to read OCR charset {}: {}", dict_path, e))?
            .lines()
            .map(str::to_string)
            .collect::<Vec<_>>();
        if charset.is_empty() {
            anyhow::bail!("OCR charset {} is empty", dict_path);
        }

        Ok(Self {
            det_session: Mutex::new(build_session(det_model_path, use_cuda)?),
            rec_session: Mutex::new(build_session(rec_model_path, use_cuda)?),
            charset,
        })
    }

    /// Run the detection model and return axis-aligned candidate boxes in
    /// source-image coordinates.
    fn detect_boxes(&self, image: &RgbImage) -> anyhow::Result<Vec<[f32; 4]>> {
        let (src_w, src_h) = image.dimensions();

        // Resize so the longest side fits the model, dimensions snapped
        // down to multiples of 32 as the backbone requires.
        let scale = (DET_MAX_SIDE as f32 / src_w.max(src_h) as f32).min(1.0);
        let det_w = (((src_w as f32 * scale) as u32) / 32).max(1) * 32;
        let det_h = (((src_h as f32 * scale) as u32) / 32).max(1) * 32;
        let resized = image::imageops::resize(image, det_w, det_h, FilterType::Triangle);

        let mut input = Array::zeros(IxDyn(&[1, 3, det_h as usize, det_w as usize]));
        let mean = [0.485f32, 0.456, 0.406];
        let std = [0.229f32, 0.224, 0.225];
        for y in 0..det_h {
            for x in 0..det_w {
                let pixel = resized.get_pixel(x, y);
                // BGR order: channel 0 takes the blue component.
                for (channel, rgb_index) in [2usize, 1, 0].into_iter().enumerate() {
                    let value = pixel[rgb_index] as f32 / 255.0;
                    input[[0, channel, y as usize, x as usize]] =
                        (value - mean[channel]) / std[channel];
                }
            }
        }

        let probability_map = self.run(&self.det_session, input)?;
        let shape = probability_map.shape().to_vec();
        let (map_h, map_w) = (shape[shape.len() - 2], shape[shape.len() - 1]);

        // Binarize and label connected regions of text probability.
        let mut binary = GrayImage::new(map_w as u32, map_h as u32);
        for y in 0..map_h {
            for x in 0..map_w {
                let probability = probability_map[IxDyn(&[0, 0, y, x])];
                binary.put_pixel(x as u32, y as u32, Luma([(probability > DET_THRESH) as u8]));
            }
        }
        let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

        let mut extents: std::collections::HashMap<u32, (u32, u32, u32, u32, u32)> =
            std::collections::HashMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            if label[0] == 0 {
                continue;
            }
            let entry = extents
                .entry(label[0])
                .or_insert((u32::MAX, u32::MAX, 0, 0, 0));
            entry.0 = entry.0.min(x);
            entry.1 = entry.1.min(y);
            entry.2 = entry.2.max(x);
            entry.3 = entry.3.max(y);
            entry.4 += 1;
        }

        let width_ratio = src_w as f32 / map_w as f32;
        let height_ratio = src_h as f32 / map_h as f32;
        let mut boxes = Vec::new();
        for (_, (min_x, min_y, max_x, max_y, area)) in extents {
            if area < MIN_COMPONENT_AREA {
                continue;
            }
            let box_w = (max_x - min_x + 1) as f32;
            let box_h = (max_y - min_y + 1) as f32;

            let mut probability_sum = 0.0f32;
            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    probability_sum += probability_map[IxDyn(&[0, 0, y as usize, x as usize])];
                }
            }
            if probability_sum / (box_w * box_h) < DET_BOX_THRESH {
                continue;
            }

            // Vatti-style offset: pad = area * ratio / perimeter.
            let pad = box_w * box_h * DET_UNCLIP_RATIO / (2.0 * (box_w + box_h));
            let x0 = ((min_x as f32 - pad) * width_ratio).max(0.0);
            let y0 = ((min_y as f32 - pad) * height_ratio).max(0.0);
            let x1 = ((max_x as f32 + pad) * width_ratio).min(src_w as f32 - 1.0);
            let y1 = ((max_y as f32 + pad) * height_ratio).min(src_h as f32 - 1.0);
            boxes.push([x0, y0, x1, y1]);
        }

        // Reading order: top to bottom, left to right.
        boxes.sort_by(|a, b| (a[1], a[0]).partial_cmp(&(b[1], b[0])).unwrap());
        Ok(boxes)
    }

    /// Crop one detected region and CTC-decode it.
    fn recognize_box(&self, image: &RgbImage, bbox: &[f32; 4]) -> anyhow::Result<(String, f32)> {
        let [x0, y0, x1, y1] = *bbox;
        let crop_w = ((x1 - x0) as u32).max(1);
        let crop_h = ((y1 - y0) as u32).max(1);
        let crop =
            image::imageops::crop_imm(image, x0 as u32, y0 as u32, crop_w, crop_h).to_image();

        let target_w = ((crop_w as f32 * REC_HEIGHT as f32 / crop_h as f32) as u32)
            .clamp(1, REC_MAX_WIDTH);
        let line = image::imageops::resize(&crop, target_w, REC_HEIGHT, FilterType::Triangle);

        // Pad to the fixed width with zeros; normalize to [-1, 1].
        let mut input = Array::zeros(IxDyn(&[
            1,
            3,
            REC_HEIGHT as usize,
            REC_MAX_WIDTH as usize,
        ]));
        for y in 0..REC_HEIGHT {
            for x in 0..target_w {
                let pixel = line.get_pixel(x, y);
                for (channel, rgb_index) in [2usize, 1, 0].into_iter().enumerate() {
                    input[[0, channel, y as usize, x as usize]] =
                        pixel[rgb_index] as f32 / 127.5 - 1.0;
                }
            }
        }

        let logits = self.run(&self.rec_session, input)?;
        let shape = logits.shape().to_vec();
        let (steps, classes) = (shape[1], shape[2]);

        // Greedy CTC: argmax per step, collapse repeats, skip blank (0).
        let mut text = String::new();
        let mut scores = Vec::new();
        let mut previous_class = 0usize;
        for step in 0..steps {
            let mut best_class = 0usize;
            let mut best_probability = f32::MIN;
            for class in 0..classes {
                let probability = logits[IxDyn(&[0, step, class])];
                if probability > best_probability {
                    best_probability = probability;
                    best_class = class;
                }
            }
            if best_class != 0 && best_class != previous_class {
                if let Some(entry) = self.charset.get(best_class - 1) {
                    text.push_str(entry);
                    scores.push(best_probability);
                }
            }
            previous_class = best_class;
        }

        let score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f32>() / scores.len() as f32
        };
        Ok((text, score))
    }

    fn run(
        &self,
        session: &Mutex<Session>,
        input: Array<f32, IxDyn>,
    ) -> anyhow::Result<Array<f32, IxDyn>> {
        // Manual conversion (shape + data) to avoid version mismatch errors
        let input_shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let input_value = Value::from_array((input_shape, input.into_raw_vec()))?;

        let mut session = session
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire session lock"))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;

        let shape: Vec<usize> = output_shape.iter().map(|&d| d as usize).collect();
        Ok(Array::from_shape_vec(IxDyn(&shape), output_data.to_vec())?)
    }
}

#[async_trait]
impl OcrService for OnnxOcrService {
    async fn warm_up(&self) -> anyhow::Result<()> {
        let blank = RgbImage::new(64, 64);
        let boxes = self.detect_boxes(&blank)?;
        let _ = self.recognize_box(&blank, &[0.0, 0.0, 32.0, 16.0])?;
        tracing::info!("OCR warm-up complete ({} boxes on blank input)", boxes.len());
        Ok(())
    }

    async fn detect(&self, image_bytes: &[u8]) -> anyhow::Result<Vec<TextBox>> {
        let image = image::load_from_memory(image_bytes)?.to_rgb8();

        let mut result = Vec::new();
        for bbox in self.detect_boxes(&image)? {
            let (text, score) = self.recognize_box(&image, &bbox)?;
            if text.is_empty() || score < REC_DROP_SCORE {
                continue;
            }
            let [x0, y0, x1, y1] = bbox;
            result.push(TextBox::new(
                vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
                text,
                score,
            ));
        }
        Ok(result)
    }
}
