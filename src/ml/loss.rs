// ============================================================
// Layer 5 — Segmentation Loss and Dice
// ============================================================
// Training minimises
//
//   loss = classification(logits, labels) + (1 - dice)
//
//   binary (1 output channel):
//     classification = BCE-with-logits on [N, H, W]
//     dice           = Dice(sigmoid(logits), labels)
//   multi-class:
//     classification = cross-entropy over the class axis
//     dice           = Dice(softmax(logits), one_hot(labels))
//
// Dice of prediction p and target t:
//
//   inter = 2 · Σ p·t
//   sets  = Σ p + Σ t      (replaced by inter when it is 0)
//   dice  = (inter + ε) / (sets + ε),  ε = 1e-6
//
// so two empty sets score exactly 1. The loss sums over the
// whole batch at once; evaluation scores every image on its own
// and averages.

use burn::{
    nn::loss::{BinaryCrossEntropyLossConfig, CrossEntropyLossConfig},
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};

pub const DICE_EPS: f64 = 1e-6;

/// Mean Dice over [N, H, W] maps; one score per image unless
/// `reduce_batch_first`, which treats the batch as one volume.
pub fn dice_coeff<B: Backend>(
    input:              Tensor<B, 3>,
    target:             Tensor<B, 3>,
    reduce_batch_first: bool,
) -> Tensor<B, 1> {
    let [n, h, w] = input.dims();

    let (inter, sets) = if reduce_batch_first {
        let inter = (input.clone() * target.clone()).sum().mul_scalar(2.0);
        (inter, input.sum() + target.sum())
    } else {
        let per_image = |t: Tensor<B, 3>| t.reshape([n, h * w]).sum_dim(1).reshape([n]);
        let inter = per_image(input.clone() * target.clone()).mul_scalar(2.0);
        (inter, per_image(input) + per_image(target))
    };

    let empty = sets.clone().equal_elem(0.0);
    let sets  = sets.mask_where(empty, inter.clone());
    (inter.add_scalar(DICE_EPS) / sets.add_scalar(DICE_EPS)).mean()
}

/// Dice averaged over every (image, class) plane of [N, C, H, W] maps.
pub fn multiclass_dice_coeff<B: Backend>(
    input:              Tensor<B, 4>,
    target:             Tensor<B, 4>,
    reduce_batch_first: bool,
) -> Tensor<B, 1> {
    dice_coeff(input.flatten(0, 1), target.flatten(0, 1), reduce_batch_first)
}

/// `1 - dice` over the whole batch.
pub fn dice_loss<B: Backend>(input: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    multiclass_dice_coeff(input, target, true).neg().add_scalar(1.0)
}

/// Labels [N, H, W] → one-hot [N, n_classes, H, W].
pub fn one_hot<B: Backend>(labels: Tensor<B, 3, Int>, n_classes: usize) -> Tensor<B, 4> {
    let planes: Vec<Tensor<B, 3>> = (0..n_classes)
        .map(|c| labels.clone().equal_elem(c as i64).float())
        .collect();
    Tensor::stack(planes, 1)
}

/// The two terms of the training loss.
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    pub classification: Tensor<B, 1>,
    pub dice:           Tensor<B, 1>,
}

impl<B: Backend> LossTerms<B> {
    /// Unweighted sum of both terms.
    pub fn total(self) -> Tensor<B, 1> {
        self.classification + self.dice
    }
}

/// logits: [N, n_classes, H, W], masks: [N, H, W] labels.
pub fn segmentation_loss<B: Backend>(logits: Tensor<B, 4>, masks: Tensor<B, 3, Int>) -> LossTerms<B> {
    let [n, c, h, w] = logits.dims();
    let device = logits.device();

    if c == 1 {
        let logits = logits.squeeze::<3>(1);
        let classification = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&device)
            .forward(logits.clone(), masks.clone());
        let probs = sigmoid(logits).unsqueeze_dim::<4>(1);
        let dice  = dice_loss(probs, masks.float().unsqueeze_dim::<4>(1));
        LossTerms { classification, dice }
    } else {
        let flat_logits = logits.clone().permute([0, 2, 3, 1]).reshape([n * h * w, c]);
        let classification = CrossEntropyLossConfig::new()
            .init(&device)
            .forward(flat_logits, masks.clone().reshape([n * h * w]));
        let dice = dice_loss(softmax(logits, 1), one_hot(masks, c));
        LossTerms { classification, dice }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    fn map(values: Vec<f32>, shape: [usize; 3]) -> Tensor<TestBackend, 3> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    fn labels(values: Vec<i64>, shape: [usize; 3]) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_data(TensorData::new(values, shape), &Default::default())
    }

    #[test]
    fn test_perfect_prediction_scores_one() {
        let t = map(vec![1.0, 0.0, 1.0, 1.0], [1, 2, 2]);
        assert!((scalar(dice_coeff(t.clone(), t, true)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_disjoint_prediction_scores_near_zero() {
        let p = map(vec![1.0, 1.0, 0.0, 0.0], [1, 2, 2]);
        let t = map(vec![0.0, 0.0, 1.0, 1.0], [1, 2, 2]);
        assert!(scalar(dice_coeff(p, t, true)) < 1e-5);
    }

    #[test]
    fn test_empty_sets_score_one() {
        let z = map(vec![0.0; 8], [2, 2, 2]);
        assert!((scalar(dice_coeff(z.clone(), z.clone(), true)) - 1.0).abs() < 1e-9);
        assert!((scalar(dice_coeff(z.clone(), z, false)) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_image_scores_are_averaged() {
        // image 0 perfect, image 1 disjoint
        let p = map(vec![1.0, 0.0, 1.0, 0.0], [2, 1, 2]);
        let t = map(vec![1.0, 0.0, 0.0, 1.0], [2, 1, 2]);
        assert!((scalar(dice_coeff(p, t, false)) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_partial_overlap_value() {
        // Σp = 2, Σt = 1, Σp·t = 1 → 2/3
        let p = map(vec![1.0, 1.0, 0.0, 0.0], [1, 2, 2]);
        let t = map(vec![1.0, 0.0, 0.0, 0.0], [1, 2, 2]);
        assert!((scalar(dice_coeff(p, t, true)) - 2.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_one_hot_layout() {
        let oh = one_hot(labels(vec![0, 2, 1, 0], [1, 2, 2]), 3);
        assert_eq!(oh.dims(), [1, 3, 2, 2]);
        let v: Vec<f32> = oh.into_data().to_vec().unwrap();
        assert_eq!(
            v,
            vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_binary_loss_is_unweighted_sum() {
        let logits = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![2.0f32, -1.0, 0.5, -3.0], [1, 1, 2, 2]),
            &Default::default(),
        );
        let masks = labels(vec![1, 0, 1, 0], [1, 2, 2]);
        let terms = segmentation_loss(logits.clone(), masks.clone());

        let bce = BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&Default::default())
            .forward(logits.clone().squeeze::<3>(1), masks.clone());
        let dice = 1.0
            - scalar(dice_coeff(sigmoid(logits.squeeze::<3>(1)), masks.float(), true));

        let classification = scalar(terms.classification.clone());
        let dice_term = scalar(terms.dice.clone());
        assert!((classification - scalar(bce)).abs() < 1e-6);
        assert!((dice_term - dice).abs() < 1e-6);
        assert!((scalar(terms.total()) - (classification + dice_term)).abs() < 1e-6);
    }

    #[test]
    fn test_multiclass_loss_uses_softmax_dice() {
        let logits = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(
                vec![3.0f32, -2.0, 0.0, 1.0, -1.0, 4.0, 0.5, 0.0],
                [1, 2, 2, 2],
            ),
            &Default::default(),
        );
        let masks = labels(vec![0, 1, 0, 0], [1, 2, 2]);
        let terms = segmentation_loss(logits.clone(), masks.clone());

        let expected_dice = 1.0
            - scalar(multiclass_dice_coeff(softmax(logits, 1), one_hot(masks, 2), true));
        assert!((scalar(terms.dice.clone()) - expected_dice).abs() < 1e-6);
        assert!(scalar(terms.classification) > 0.0);
    }
}
