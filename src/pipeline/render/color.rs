//! Local color correction and text-color selection.

use crate::domain::text_box::TranslatedItem;
use image::{Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use palette::{IntoColor, Lab, Srgb};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Seed for every k-means run; renders must be reproducible.
const KMEANS_SEED: u64 = 0;
/// Fraction of region pixels sampled before clustering.
const SAMPLE_RATIO: f32 = 0.5;
/// Regions at or below this pixel count are clustered whole.
const MIN_PIXELS_FOR_SAMPLING: usize = 20;
/// Minimum clean ring pixels for a box to be corrected.
const MIN_CLEAN_PIXELS: usize = 50;
/// Sampling ring geometry relative to the mask padding.
const SAMPLING_RING_OFFSET: i32 = 4;
const SAMPLING_RING_THICKNESS: i32 = 25;
/// Contrast below this forces black or white text.
const MIN_CONTRAST_RATIO: f64 = 2.0;

/// Correct the inpainted image's color cast around every text box.
///
/// For each box, channel statistics are taken in LAB space over a
/// sampling ring known to be clean of every box's inpainting, on both the
/// original and the inpainted image; the inpainted patch is remapped with
/// `(x - μ_inp) · σ_orig/σ_inp + μ_orig`. Boxes with too few clean pixels
/// are left untouched.
pub fn correct_colors(
    original: &RgbImage,
    inpainted: &RgbImage,
    items: &[TranslatedItem],
    mask_padding: i32,
    request_id: &str,
) -> RgbImage {
    let (width, height) = original.dimensions();
    let global_mask =
        super::dilated_union_mask(items, width, height, mask_padding + 3);

    let original_lab = to_lab_planes(original);
    let mut inpainted_lab = to_lab_planes(inpainted);

    for item in items {
        let box_mask = super::dilated_union_mask(
            std::slice::from_ref(item),
            width,
            height,
            0,
        );
        let correction_area = dilate(&box_mask, Norm::LInf, clamp_radius(mask_padding + 1));

        let inner_offset = mask_padding + SAMPLING_RING_OFFSET;
        let inner_ring = dilate(&box_mask, Norm::LInf, clamp_radius(inner_offset));
        let outer_ring = dilate(
            &box_mask,
            Norm::LInf,
            clamp_radius(inner_offset + SAMPLING_RING_THICKNESS),
        );

        // Ring minus every inpainted region = clean sampling area.
        let mut clean_indices = Vec::new();
        for y in 0..height {
            for x in 0..width {
                if outer_ring.get_pixel(x, y)[0] > 0
                    && inner_ring.get_pixel(x, y)[0] == 0
                    && global_mask.get_pixel(x, y)[0] == 0
                {
                    clean_indices.push((y * width + x) as usize);
                }
            }
        }
        if clean_indices.len() < MIN_CLEAN_PIXELS {
            tracing::warn!(
                request_id,
                "Only {} clean sampling pixels; skipping color correction for a box",
                clean_indices.len()
            );
            continue;
        }

        let original_stats = channel_stats(&original_lab, &clean_indices);
        let inpainted_stats = channel_stats(&inpainted_lab, &clean_indices);

        for y in 0..height {
            for x in 0..width {
                if correction_area.get_pixel(x, y)[0] == 0 {
                    continue;
                }
                let index = (y * width + x) as usize;
                for channel in 0..3 {
                    let (mean_orig, std_orig) = original_stats[channel];
                    let (mean_inp, std_inp) = inpainted_stats[channel];
                    let value = inpainted_lab[channel][index];
                    let mapped = (value - mean_inp) * (std_orig / std_inp.max(1e-6)) + mean_orig;
                    inpainted_lab[channel][index] = clamp_lab(channel, mapped);
                }
            }
        }
    }

    from_lab_planes(&inpainted_lab, width, height)
}

/// Pick the text color for one box: the original-image candidate with the
/// best WCAG contrast against the composited background, forced to black
/// or white when even the best contrast is too low.
pub fn select_text_color(
    request_id: &str,
    composited_background: &RgbImage,
    original: &RgbImage,
    polygon: &[[f32; 2]],
) -> Rgb<u8> {
    let background = dominant_colors(composited_background, polygon, 1)
        .first()
        .copied()
        .unwrap_or(Rgb([255, 255, 255]));

    let candidates = dominant_colors(original, polygon, 2);
    let chosen = candidates
        .iter()
        .copied()
        .max_by(|a, b| {
            contrast_ratio(*a, background)
                .partial_cmp(&contrast_ratio(*b, background))
                .unwrap()
        })
        .unwrap_or(Rgb([0, 0, 0]));

    if contrast_ratio(chosen, background) < MIN_CONTRAST_RATIO {
        let forced = if relative_luminance(background) > 0.5 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        };
        tracing::debug!(
            request_id,
            "Contrast below {}; forcing {:?} text",
            MIN_CONTRAST_RATIO,
            forced
        );
        forced
    } else {
        chosen
    }
}

/// Dominant colors inside a polygon's bounding box via seeded mini-batch
/// k-means over a pixel sample.
pub fn dominant_colors(image: &RgbImage, polygon: &[[f32; 2]], k: usize) -> Vec<Rgb<u8>> {
    let (width, height) = image.dimensions();
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for &[x, y] in polygon {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    let x0 = (min_x.max(0.0)) as u32;
    let y0 = (min_y.max(0.0)) as u32;
    let x1 = (max_x.min(width as f32 - 1.0)) as u32;
    let y1 = (max_y.min(height as f32 - 1.0)) as u32;
    if x1 <= x0 || y1 <= y0 {
        return Vec::new();
    }

    let mut pixels: Vec<[f32; 3]> = Vec::with_capacity(((x1 - x0) * (y1 - y0)) as usize);
    for y in y0..y1 {
        for x in x0..x1 {
            let pixel = image.get_pixel(x, y);
            pixels.push([pixel[0] as f32, pixel[1] as f32, pixel[2] as f32]);
        }
    }
    if pixels.len() < k {
        return Vec::new();
    }

    let mut rng = SmallRng::seed_from_u64(KMEANS_SEED);
    let sample: Vec<[f32; 3]> = if pixels.len() > MIN_PIXELS_FOR_SAMPLING {
        let sample_size = ((pixels.len() as f32 * SAMPLE_RATIO) as usize).max(k);
        pixels.shuffle(&mut rng);
        pixels.truncate(sample_size);
        pixels
    } else {
        pixels
    };

    kmeans(&sample, k)
        .into_iter()
        .map(|[r, g, b]| {
            Rgb([
                r.round().clamp(0.0, 255.0) as u8,
                g.round().clamp(0.0, 255.0) as u8,
                b.round().clamp(0.0, 255.0) as u8,
            ])
        })
        .collect()
}

fn kmeans(points: &[[f32; 3]], k: usize) -> Vec<[f32; 3]> {
    // Deterministic init: evenly spaced points of the (shuffled) sample.
    let mut centers: Vec<[f32; 3]> = (0..k)
        .map(|index| points[index * points.len() / k])
        .collect();

    let mut assignment = vec![0usize; points.len()];
    for _ in 0..10 {
        let mut changed = false;
        for (point_index, point) in points.iter().enumerate() {
            let nearest = centers
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    distance_sq(point, a).partial_cmp(&distance_sq(point, b)).unwrap()
                })
                .map(|(center_index, _)| center_index)
                .unwrap_or(0);
            if assignment[point_index] != nearest {
                assignment[point_index] = nearest;
                changed = true;
            }
        }

        let mut sums = vec![[0.0f64; 3]; k];
        let mut counts = vec![0usize; k];
        for (point, &center_index) in points.iter().zip(&assignment) {
            for channel in 0..3 {
                sums[center_index][channel] += point[channel] as f64;
            }
            counts[center_index] += 1;
        }
        for center_index in 0..k {
            if counts[center_index] > 0 {
                for channel in 0..3 {
                    centers[center_index][channel] =
                        (sums[center_index][channel] / counts[center_index] as f64) as f32;
                }
            }
        }
        if !changed {
            break;
        }
    }
    centers
}

fn distance_sq(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// WCAG relative luminance of an sRGB color.
pub fn relative_luminance(color: Rgb<u8>) -> f64 {
    let linear = |channel: u8| {
        let value = channel as f64 / 255.0;
        if value <= 0.04045 {
            value / 12.92
        } else {
            ((value + 0.055) / 1.055).powf(2.4)
        }
    };
    0.2126 * linear(color[0]) + 0.7152 * linear(color[1]) + 0.0722 * linear(color[2])
}

/// WCAG contrast ratio between two colors, in [1, 21].
pub fn contrast_ratio(a: Rgb<u8>, b: Rgb<u8>) -> f64 {
    let lum_a = relative_luminance(a) + 0.05;
    let lum_b = relative_luminance(b) + 0.05;
    if lum_a > lum_b { lum_a / lum_b } else { lum_b / lum_a }
}

type LabPlanes = [Vec<f32>; 3];

fn to_lab_planes(image: &RgbImage) -> LabPlanes {
    let pixel_count = (image.width() * image.height()) as usize;
    let mut planes: LabPlanes = [
        Vec::with_capacity(pixel_count),
        Vec::with_capacity(pixel_count),
        Vec::with_capacity(pixel_count),
    ];
    for pixel in image.pixels() {
        let srgb = Srgb::new(
            pixel[0] as f32 / 255.0,
            pixel[1] as f32 / 255.0,
            pixel[2] as f32 / 255.0,
        );
        let lab: Lab = srgb.into_color();
        planes[0].push(lab.l);
        planes[1].push(lab.a);
        planes[2].push(lab.b);
    }
    planes
}

fn from_lab_planes(planes: &LabPlanes, width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let index = (y * width + x) as usize;
        let lab = Lab::new(planes[0][index], planes[1][index], planes[2][index]);
        let srgb: Srgb = lab.into_color();
        let (r, g, b) = srgb.into_format::<u8>().into_components();
        Rgb([r, g, b])
    })
}

fn channel_stats(planes: &LabPlanes, indices: &[usize]) -> [(f32, f32); 3] {
    let mut stats = [(0.0f32, 0.0f32); 3];
    for channel in 0..3 {
        let mean = indices
            .iter()
            .map(|&index| planes[channel][index] as f64)
            .sum::<f64>()
            / indices.len() as f64;
        let variance = indices
            .iter()
            .map(|&index| (planes[channel][index] as f64 - mean).powi(2))
            .sum::<f64>()
            / indices.len() as f64;
        stats[channel] = (mean as f32, variance.sqrt() as f32);
    }
    stats
}

fn clamp_lab(channel: usize, value: f32) -> f32 {
    if channel == 0 {
        value.clamp(0.0, 100.0)
    } else {
        value.clamp(-128.0, 127.0)
    }
}

fn clamp_radius(radius: i32) -> u8 {
    radius.clamp(0, u8::MAX as i32) as u8
}
