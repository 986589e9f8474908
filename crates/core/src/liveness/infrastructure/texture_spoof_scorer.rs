use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array3;

use crate::liveness::domain::spoof_scorer::SpoofScorer;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::TEXTURE_PATCH_SIZE;
use crate::shared::frame::Frame;

const MIN_CROP_SIDE: usize = 3;

/// Flatness-based spoof scorer.
///
/// Printed photos and screens lose fine skin texture and have a narrow
/// chroma spread. Two cues are measured on the face crop:
///
/// - texture: variance of the Sobel gradient magnitude over a 64x64 grey
///   resample of the crop
/// - colour: `std(Cr) + std(Cb)` of the crop in YCrCb
///
/// Each is mapped to `clamp(1 - value / reference, 0, 1)` and the score is
/// their mean. Single-channel frames are scored on texture alone.
pub struct TextureSpoofScorer {
    texture_reference: f64,
    color_reference: f64,
}

impl TextureSpoofScorer {
    pub fn new(texture_reference: f64, color_reference: f64) -> Self {
        Self {
            texture_reference,
            color_reference,
        }
    }
}

impl SpoofScorer for TextureSpoofScorer {
    fn score(&self, frame: &Frame, bbox: &BoundingBox) -> Option<f64> {
        let crop = frame.crop(bbox)?;
        let (h, w, _) = crop.dim();
        if h < MIN_CROP_SIDE || w < MIN_CROP_SIDE {
            return None;
        }

        let patch = grey_patch(&crop)?;
        let texture = flatness(gradient_variance(&patch), self.texture_reference);
        match chroma_spread(&crop) {
            Some(spread) => Some((texture + flatness(spread, self.color_reference)) / 2.0),
            None => Some(texture),
        }
    }
}

fn flatness(value: f64, reference: f64) -> f64 {
    (1.0 - value / reference).clamp(0.0, 1.0)
}

fn luma(r: f64, g: f64, b: f64) -> f64 {
    0.299 * r + 0.587 * g + 0.114 * b
}

fn grey_patch(crop: &Array3<u8>) -> Option<GrayImage> {
    let (h, w, c) = crop.dim();
    let mut grey = Vec::with_capacity(h * w);
    for y in 0..h {
        for x in 0..w {
            let v = if c >= 3 {
                luma(
                    crop[[y, x, 0]] as f64,
                    crop[[y, x, 1]] as f64,
                    crop[[y, x, 2]] as f64,
                )
            } else {
                crop[[y, x, 0]] as f64
            };
            grey.push(v.round().clamp(0.0, 255.0) as u8);
        }
    }
    let img = GrayImage::from_raw(w as u32, h as u32, grey)?;
    let side = TEXTURE_PATCH_SIZE as u32;
    Some(imageops::resize(&img, side, side, FilterType::Triangle))
}

/// Variance of the 3x3 Sobel gradient magnitude over interior pixels.
fn gradient_variance(img: &GrayImage) -> f64 {
    let (w, h) = img.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let px = |x: u32, y: u32| img.get_pixel(x, y).0[0] as f64;

    let mut magnitudes = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let gy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            magnitudes.push((gx * gx + gy * gy).sqrt());
        }
    }
    variance(&magnitudes)
}

/// `std(Cr) + std(Cb)`, or `None` for frames without colour.
fn chroma_spread(crop: &Array3<u8>) -> Option<f64> {
    let (h, w, c) = crop.dim();
    if c < 3 {
        return None;
    }
    let mut cr = Vec::with_capacity(h * w);
    let mut cb = Vec::with_capacity(h * w);
    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = (
                crop[[y, x, 0]] as f64,
                crop[[y, x, 1]] as f64,
                crop[[y, x, 2]] as f64,
            );
            let yv = luma(r, g, b);
            cr.push((r - yv) * 0.713 + 128.0);
            cb.push((b - yv) * 0.564 + 128.0);
        }
    }
    Some(variance(&cr).sqrt() + variance(&cb).sqrt())
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
