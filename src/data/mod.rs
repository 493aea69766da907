// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from image/mask files on disk to tensor batches
// on the selected device.
//
//   imgs/ + masks/
//       │
//       ▼
//   DatasetAssembler  → indexes pairs, tries Carvana then Basic
//       │
//       ▼
//   SegmentationDataset → Burn Dataset, decodes + preprocesses lazily
//       │
//       ▼
//   split_train_val   → seeded, disjoint train / validation views
//       │
//       ▼
//   BatchLoader       → parallel decode, bounded ordered prefetch
//       │
//       ▼
//   SegmentationBatcher → stacks samples into tensors
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Errors reported by the data pipeline
pub mod error;

/// Pair indexing and dataset variant fallback
pub mod loader;

/// Resizing, normalisation and mask label remapping
pub mod preprocessor;

/// Burn Dataset over indexed pairs, plus subset views
pub mod dataset;

/// Seeded train/validation split
pub mod splitter;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Worker-pool batch loader with prefetch
pub mod batch_loader;
