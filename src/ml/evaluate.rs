// ============================================================
// Layer 5 — Validation Dice
// ============================================================
// Mean Dice score of a model over validation batches:
//
//   binary:      sigmoid(logits) > 0.5 vs the label map
//   multi-class: one_hot(argmax) vs one_hot(labels), with the
//                background class (0) left out
//
// Each batch contributes the mean of its per-image scores; the
// result is the sum over batches divided by max(batches, 1).
// Runs on the inner (non-autodiff) backend.

use burn::{prelude::*, tensor::activation::sigmoid};

use crate::data::{batcher::SegmentationBatch, error::DatasetResult};
use crate::ml::{
    error::TrainResult,
    loss::{dice_coeff, multiclass_dice_coeff, one_hot},
    model::UNet,
};

/// Dice of a single batch, averaged over its images.
pub fn batch_dice<B: Backend>(model: &UNet<B>, batch: SegmentationBatch<B>) -> f64 {
    let logits = model.forward(batch.images);
    batch_dice_from_logits(logits, batch.masks)
}

pub fn batch_dice_from_logits<B: Backend>(logits: Tensor<B, 4>, masks: Tensor<B, 3, Int>) -> f64 {
    let [n, c, h, w] = logits.dims();

    let score = if c == 1 {
        let pred = sigmoid(logits.squeeze::<3>(1)).greater_elem(0.5).float();
        dice_coeff(pred, masks.float(), false)
    } else {
        let pred  = one_hot(logits.argmax(1).squeeze::<3>(1), c);
        let truth = one_hot(masks, c);
        multiclass_dice_coeff(
            pred.slice([0..n, 1..c, 0..h, 0..w]),
            truth.slice([0..n, 1..c, 0..h, 0..w]),
            false,
        )
    };

    score.into_scalar().elem::<f64>()
}

/// Mean validation Dice over `batches`.
pub fn evaluate<B, I>(model: &UNet<B>, batches: I) -> TrainResult<f64>
where
    B: Backend,
    I: IntoIterator<Item = DatasetResult<SegmentationBatch<B>>>,
{
    let mut total        = 0.0f64;
    let mut batches_seen = 0usize;

    for batch in batches {
        total += batch_dice(model, batch?);
        batches_seen += 1;
    }

    let score = total / batches_seen.max(1) as f64;
    tracing::debug!("Validation over {} batches: dice={:.4}", batches_seen, score);
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::UNetConfig;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    fn labels(values: Vec<i64>, shape: [usize; 3]) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn logits(values: Vec<f32>, shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn test_binary_threshold_at_half() {
        // sigmoid(1) > 0.5, sigmoid(-1) < 0.5
        let score = batch_dice_from_logits(
            logits(vec![1.0, -1.0, 1.0, -1.0], [1, 1, 2, 2]),
            labels(vec![1, 0, 1, 0], [1, 2, 2]),
        );
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_multiclass_ignores_background() {
        // argmax picks class 1 only at pixel 0, matching the labels.
        let score = batch_dice_from_logits(
            logits(vec![0.0, 5.0, 5.0, 5.0, 9.0, 0.0, 0.0, 0.0], [1, 2, 2, 2]),
            labels(vec![1, 0, 0, 0], [1, 2, 2]),
        );
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_with_no_batches_is_zero() {
        let model = UNetConfig::new(3, 2)
            .with_base_channels(2)
            .init::<TestBackend>(&Default::default());
        let score = evaluate(&model, Vec::<DatasetResult<SegmentationBatch<TestBackend>>>::new()).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_evaluate_averages_over_batches() {
        let model = UNetConfig::new(1, 1)
            .with_base_channels(2)
            .init::<TestBackend>(&Default::default());
        let batch = || SegmentationBatch {
            images: Tensor::<TestBackend, 4>::zeros([2, 1, 16, 16], &Default::default()),
            masks:  Tensor::<TestBackend, 3, Int>::zeros([2, 16, 16], &Default::default()),
            keys:   vec!["a".into(), "b".into()],
        };
        let score = evaluate(&model, vec![Ok(batch()), Ok(batch())]).unwrap();
        assert!((0.0..=1.0).contains(&score));
    }
}
