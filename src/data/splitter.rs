// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Deterministically partitions a dataset into a training and a
// validation subset:
//
//   n_val   = floor(len * val_fraction)
//   n_train = len - n_val
//
// Burn's ShuffledDataset permutes the indices with a seeded
// StdRng; two PartialDataset windows over the one shuffled view
// take the first n_train positions for training and the rest
// for validation. Same data + same seed → same membership on
// every run.

use burn::data::dataset::{
    transform::{PartialDataset, ShuffledDataset},
    Dataset,
};
use std::sync::Arc;

/// Seed used by the trainer for the train/validation split.
pub const SPLIT_SEED: u64 = 0;

/// One side of a split: a window over the shared shuffled dataset.
pub type SplitView<D, I> = PartialDataset<Arc<ShuffledDataset<D, I>>, I>;

/// Number of validation samples for a dataset of `len` items.
/// `val_fraction` is clamped to [0, 1].
pub fn validation_count(len: usize, val_fraction: f64) -> usize {
    let fraction = if val_fraction.is_finite() { val_fraction.clamp(0.0, 1.0) } else { 0.0 };
    ((len as f64 * fraction).floor() as usize).min(len)
}

/// Split `dataset` into (train, validation) views.
pub fn split_train_val<D, I>(
    dataset:      D,
    val_fraction: f64,
    seed:         u64,
) -> (SplitView<D, I>, SplitView<D, I>)
where
    D: Dataset<I>,
    I: Clone + Send + Sync,
{
    let len     = dataset.len();
    let n_val   = validation_count(len, val_fraction);
    let n_train = len - n_val;
    tracing::debug!("Dataset split: {} training, {} validation", n_train, n_val);

    let shuffled = Arc::new(ShuffledDataset::with_seed(dataset, seed));
    (
        PartialDataset::new(shuffled.clone(), 0, n_train),
        PartialDataset::new(shuffled, n_train, len),
    )
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::InMemDataset;
    use std::collections::BTreeSet;

    fn numbers(len: usize) -> InMemDataset<usize> {
        InMemDataset::new((0..len).collect())
    }

    fn members<D: Dataset<usize>>(view: &D) -> BTreeSet<usize> {
        view.iter().collect()
    }

    #[test]
    fn test_correct_split_sizes() {
        let (train, val) = split_train_val(numbers(100), 0.1, SPLIT_SEED);
        assert_eq!(train.len(), 90);
        assert_eq!(val.len(), 10);
    }

    #[test]
    fn test_sizes_follow_floor_rule() {
        for len in [0usize, 1, 7, 19, 33, 250] {
            for fraction in [0.0, 0.05, 0.1, 0.25, 0.5, 0.99] {
                let (train, val) = split_train_val(numbers(len), fraction, SPLIT_SEED);
                let n_val = (len as f64 * fraction).floor() as usize;
                assert_eq!(val.len(), n_val, "len={len} fraction={fraction}");
                assert_eq!(train.len() + val.len(), len);
            }
        }
    }

    #[test]
    fn test_out_of_range_fraction_is_clamped() {
        assert_eq!(validation_count(10, -0.5), 0);
        assert_eq!(validation_count(10, 1.5), 10);
        assert_eq!(validation_count(10, f64::NAN), 0);
    }

    #[test]
    fn test_membership_is_reproducible() {
        let (a_train, a_val) = split_train_val(numbers(57), 0.2, SPLIT_SEED);
        let (b_train, b_val) = split_train_val(numbers(57), 0.2, SPLIT_SEED);
        assert_eq!(members(&a_train), members(&b_train));
        assert_eq!(members(&a_val), members(&b_val));
        assert_eq!(a_val.iter().collect::<Vec<_>>(), b_val.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let (train, val) = split_train_val(numbers(40), 0.3, SPLIT_SEED);
        let (train, val) = (members(&train), members(&val));
        assert!(train.is_disjoint(&val));
        assert_eq!(train.union(&val).count(), 40);
    }

    #[test]
    fn test_split_is_shuffled() {
        let (train, _) = split_train_val(numbers(100), 0.1, SPLIT_SEED);
        let order: Vec<usize> = train.iter().collect();
        assert_ne!(order, (0..90).collect::<Vec<_>>());
    }

    #[test]
    fn test_different_seed_changes_membership() {
        let (_, a) = split_train_val(numbers(100), 0.1, 0);
        let (_, b) = split_train_val(numbers(100), 0.1, 1);
        assert_ne!(members(&a), members(&b));
    }
}
