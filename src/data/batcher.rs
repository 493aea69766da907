// ============================================================
// Layer 4 — Segmentation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<Sample> into
// device tensors:
//
//   Input:  N samples, each C×H×W image + H×W label mask
//   Output: images [N, C, H, W] float, masks [N, H, W] int
//
// Samples are flattened in order and reshaped once. Every
// sample in a batch must share (C, H, W); a mixed batch is
// reported as an error rather than silently padded.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::error::{DatasetError, DatasetResult};
use crate::domain::sample::Sample;

// ─── SegmentationBatch ────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// Shape: [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,

    /// Shape: [batch_size, height, width], values in 0..n_classes
    pub masks: Tensor<B, 3, Int>,

    /// Sample keys, in batch order
    pub keys: Vec<String>,
}

impl<B: Backend> SegmentationBatch<B> {
    /// Channel count of the images in this batch.
    pub fn channels(&self) -> usize {
        self.images.dims()[1]
    }
}

// ─── SegmentationBatcher ──────────────────────────────────────────────────────
/// Holds the target device so tensors land on the selected GPU/CPU.
#[derive(Clone, Debug)]
pub struct SegmentationBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SegmentationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn try_batch(&self, items: Vec<Sample>) -> DatasetResult<SegmentationBatch<B>> {
        let first = items
            .first()
            .ok_or_else(|| DatasetError::BatchShape("empty batch".into()))?;
        let (channels, height, width) = (first.channels, first.height, first.width);

        if let Some(odd) = items
            .iter()
            .find(|s| (s.channels, s.height, s.width) != (channels, height, width) || !s.is_consistent())
        {
            return Err(DatasetError::BatchShape(format!(
                "sample '{}' is {}x{}x{}, batch is {}x{}x{}",
                odd.key, odd.channels, odd.height, odd.width, channels, height, width,
            )));
        }

        let batch_size = items.len();
        let mut image_flat = Vec::with_capacity(batch_size * channels * height * width);
        let mut mask_flat  = Vec::with_capacity(batch_size * height * width);
        let mut keys       = Vec::with_capacity(batch_size);
        for sample in items {
            image_flat.extend_from_slice(&sample.image);
            mask_flat.extend_from_slice(&sample.mask);
            keys.push(sample.key);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(image_flat, [batch_size, channels, height, width]),
            &self.device,
        );
        let masks = Tensor::<B, 3, Int>::from_data(
            TensorData::new(mask_flat, [batch_size, height, width]),
            &self.device,
        );

        Ok(SegmentationBatch { images, masks, keys })
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
// The output is fallible: a malformed batch surfaces as a DatasetError
// at the loader instead of a panic inside tensor construction.
impl<B: Backend> Batcher<Sample, DatasetResult<SegmentationBatch<B>>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<Sample>) -> DatasetResult<SegmentationBatch<B>> {
        self.try_batch(items)
    }
}
