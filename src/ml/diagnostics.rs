// ============================================================
// Layer 5 — Validation-Time Diagnostics
// ============================================================
// Turns model state into plain LogRecord payloads:
//   - one histogram per parameter tensor ("Weights/…") and per
//     gradient ("Gradients/…"); NaN/Inf tensors are skipped
//   - an input image, its true mask and the predicted mask
//
// Burn's module visitor exposes parameters by id, in a stable
// traversal order; keys combine that position with the id.

use burn::{
    module::{AutodiffModule, Module, ModuleVisitor, ParamId},
    optim::GradientsParams,
    prelude::*,
    tensor::{activation::sigmoid, backend::AutodiffBackend},
};
use std::{collections::BTreeMap, marker::PhantomData};

use crate::domain::record::{Histogram, ImageRecord};

pub const HISTOGRAM_BINS: usize = 64;

fn to_f32<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Option<Vec<f32>> {
    tensor.to_data().convert::<f32>().to_vec::<f32>().ok()
}

fn param_key(prefix: &str, index: usize, id: &ParamId) -> String {
    format!("{prefix}/{index:03}-{id}")
}

// ─── Weight histograms ────────────────────────────────────────────────────────
struct WeightHistograms<B: Backend> {
    index:    usize,
    out:      BTreeMap<String, Histogram>,
    _backend: PhantomData<B>,
}

impl<B: Backend> ModuleVisitor<B> for WeightHistograms<B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        if let Some(h) = to_f32(tensor).and_then(|v| Histogram::from_values(&v, HISTOGRAM_BINS)) {
            self.out.insert(param_key("Weights", self.index, &id), h);
        }
        self.index += 1;
    }
}

/// Histogram of every float parameter of `module`.
pub fn weight_histograms<B: Backend, M: Module<B>>(module: &M) -> BTreeMap<String, Histogram> {
    let mut visitor = WeightHistograms::<B> { index: 0, out: BTreeMap::new(), _backend: PhantomData };
    module.visit(&mut visitor);
    visitor.out
}

// ─── Gradient histograms ──────────────────────────────────────────────────────
struct GradientHistograms<'a, B: AutodiffBackend> {
    grads:    &'a GradientsParams,
    index:    usize,
    out:      BTreeMap<String, Histogram>,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for GradientHistograms<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, _tensor: &Tensor<B, D>) {
        let hist = self
            .grads
            .get::<B::InnerBackend, D>(id)
            .and_then(|g| to_f32(&g))
            .and_then(|v| Histogram::from_values(&v, HISTOGRAM_BINS));
        if let Some(h) = hist {
            self.out.insert(param_key("Gradients", self.index, &id), h);
        }
        self.index += 1;
    }
}

/// Histogram of every gradient in `grads` that belongs to `module`.
pub fn gradient_histograms<B, M>(module: &M, grads: &GradientsParams) -> BTreeMap<String, Histogram>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let mut visitor = GradientHistograms::<B> {
        grads,
        index: 0,
        out: BTreeMap::new(),
        _backend: PhantomData,
    };
    module.visit(&mut visitor);
    visitor.out
}

// ─── Sample images ────────────────────────────────────────────────────────────
fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// First image of a [N, C, H, W] batch as 8-bit gray or RGB.
pub fn input_image<B: Backend>(images: Tensor<B, 4>) -> Option<ImageRecord> {
    let [_, c, h, w] = images.dims();
    let channels = if c >= 3 { 3 } else { 1 };
    let first: Tensor<B, 3> = images.slice([0..1, 0..channels, 0..h, 0..w]).squeeze(0);
    // CHW → HWC
    let hwc = first.permute([1, 2, 0]);
    let pixels = to_f32(&hwc)?.into_iter().map(to_u8).collect();
    Some(ImageRecord {
        width:    w as u32,
        height:   h as u32,
        channels: channels as u8,
        pixels,
    })
}

/// First label map of a [N, H, W] batch, spread over 0..=255.
pub fn label_image<B: Backend>(labels: Tensor<B, 3, Int>, n_classes: usize) -> Option<ImageRecord> {
    let [_, h, w] = labels.dims();
    let first: Tensor<B, 2> = labels.slice([0..1, 0..h, 0..w]).squeeze::<2>(0).float();
    let top = n_classes.saturating_sub(1).max(1) as f32;
    let pixels = to_f32(&first)?.into_iter().map(|l| to_u8(l / top)).collect();
    Some(ImageRecord { width: w as u32, height: h as u32, channels: 1, pixels })
}

/// Predicted labels [N, H, W] from logits [N, C, H, W].
pub fn predicted_labels<B: Backend>(logits: Tensor<B, 4>) -> Tensor<B, 3, Int> {
    if logits.dims()[1] == 1 {
        sigmoid(logits.squeeze::<3>(1)).greater_elem(0.5).int()
    } else {
        logits.argmax(1).squeeze::<3>(1)
    }
}

/// (input, true mask, predicted mask) records for the first sample of a batch.
pub fn sample_images<B: Backend>(
    images: Tensor<B, 4>,
    masks:  Tensor<B, 3, Int>,
    logits: Tensor<B, 4>,
) -> Vec<(String, ImageRecord)> {
    let n_classes = logits.dims()[1].max(2);
    let mut out = Vec::with_capacity(3);
    if let Some(img) = input_image(images) {
        out.push(("images".to_string(), img));
    }
    if let Some(img) = label_image(masks, n_classes) {
        out.push(("masks/true".to_string(), img));
    }
    if let Some(img) = label_image(predicted_labels(logits), n_classes) {
        out.push(("masks/pred".to_string(), img));
    }
    out
}
