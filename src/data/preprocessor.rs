// ============================================================
// Layer 4 — Image / Mask Preprocessor
// ============================================================
// Turns decoded rasters into training-ready buffers.
//
// Images:
//   1. Resize by `scale` (floor of each side, bicubic filter)
//   2. Lay out channel-first (CHW)
//   3. Divide by 255 when any value is above 1
//
// Masks:
//   1. Resize by `scale` with nearest-neighbour (no new values)
//   2. Replace each pixel value by its index in `mask_values`
//
// Grayscale masks produce one-byte values, colour masks
// three-byte values; alpha channels are ignored.

use image::{imageops::FilterType, DynamicImage, GenericImageView};
use std::collections::BTreeSet;

use crate::data::error::{DatasetError, DatasetResult};
use crate::domain::sample::MaskValue;

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    scale: f64,
}

impl Preprocessor {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    /// Size after scaling; both sides must stay positive.
    pub fn target_size(&self, width: u32, height: u32) -> DatasetResult<(u32, u32)> {
        let new_w = (self.scale * width as f64).floor();
        let new_h = (self.scale * height as f64).floor();
        if !(new_w >= 1.0 && new_h >= 1.0) {
            return Err(DatasetError::InvalidScale { scale: self.scale, width, height });
        }
        Ok((new_w as u32, new_h as u32))
    }

    /// Returns (CHW values, channels, height, width).
    pub fn image(&self, img: &DynamicImage) -> DatasetResult<(Vec<f32>, usize, usize, usize)> {
        let img = self.resize(img, FilterType::CatmullRom)?;
        let (width, height) = img.dimensions();
        let (interleaved, channels) = interleaved_pixels(&img);

        let plane = (width * height) as usize;
        let mut chw = vec![0f32; plane * channels];
        for (i, px) in interleaved.chunks_exact(channels).enumerate() {
            for (c, &v) in px.iter().enumerate() {
                chw[c * plane + i] = v as f32;
            }
        }

        if chw.iter().any(|&v| v > 1.0) {
            chw.iter_mut().for_each(|v| *v /= 255.0);
        }

        Ok((chw, channels, height as usize, width as usize))
    }

    /// Returns (HW labels, height, width).
    pub fn mask(
        &self,
        img:         &DynamicImage,
        mask_values: &[MaskValue],
    ) -> DatasetResult<(Vec<i64>, usize, usize)> {
        let img = self.resize(img, FilterType::Nearest)?;
        let (width, height) = img.dimensions();
        let (pixels, channels) = mask_pixels(&img);
        let labels = remap_labels(&pixels, channels, mask_values);
        Ok((labels, height as usize, width as usize))
    }

    fn resize(&self, img: &DynamicImage, filter: FilterType) -> DatasetResult<DynamicImage> {
        let (w, h) = img.dimensions();
        let (new_w, new_h) = self.target_size(w, h)?;
        if (new_w, new_h) == (w, h) {
            return Ok(img.clone());
        }
        Ok(img.resize_exact(new_w, new_h, filter))
    }
}

/// Interleaved 8-bit pixels keeping the image's own channel count.
fn interleaved_pixels(img: &DynamicImage) -> (Vec<u8>, usize) {
    match img.color().channel_count() {
        1 => (img.to_luma8().into_raw(), 1),
        2 => (img.to_luma_alpha8().into_raw(), 2),
        3 => (img.to_rgb8().into_raw(), 3),
        _ => (img.to_rgba8().into_raw(), 4),
    }
}

/// Mask pixels as (interleaved bytes, channels per value).
pub fn mask_pixels(img: &DynamicImage) -> (Vec<u8>, usize) {
    match img.color().channel_count() {
        1 | 2 => (img.to_luma8().into_raw(), 1),
        _ => (img.to_rgb8().into_raw(), 3),
    }
}

/// Distinct pixel values of a mask.
pub fn unique_mask_values(img: &DynamicImage) -> BTreeSet<MaskValue> {
    let (pixels, channels) = mask_pixels(img);
    pixels.chunks_exact(channels).map(|px| px.to_vec()).collect()
}

/// Map each pixel to the index of its value in the sorted `mask_values`.
/// Values missing from the table map to label 0.
pub fn remap_labels(pixels: &[u8], channels: usize, mask_values: &[MaskValue]) -> Vec<i64> {
    pixels
        .chunks_exact(channels)
        .map(|px| {
            mask_values
                .binary_search_by(|v| v.as_slice().cmp(px))
                .map(|i| i as i64)
                .unwrap_or(0)
        })
        .collect()
}
