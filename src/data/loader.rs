// ============================================================
// Layer 4 — Dataset Assembler
// ============================================================
// Indexes an image directory against a mask directory and
// builds a SegmentationDataset.
//
// Two layouts are supported, tried in a fixed order:
//   Carvana → masks named `<key>_mask.<ext>`
//   Basic   → masks named `<key>.<ext>`
//
// The first variant that builds wins. A variant fails when the
// index is empty, a mask is missing or ambiguous, an image and
// its mask disagree in size, or a file cannot be decoded; only
// when every variant fails is the error returned.
//
// Keys are sorted so that the index order (and therefore the
// seeded split) is identical across runs and platforms.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::data::dataset::{PairEntry, SegmentationDataset};
use crate::data::error::{DatasetError, DatasetResult};
use crate::data::preprocessor::Preprocessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetVariant {
    Carvana,
    Basic,
}

impl DatasetVariant {
    /// Order in which the assembler tries the layouts.
    pub const FALLBACK_ORDER: [DatasetVariant; 2] = [DatasetVariant::Carvana, DatasetVariant::Basic];

    pub fn mask_suffix(self) -> &'static str {
        match self {
            DatasetVariant::Carvana => "_mask",
            DatasetVariant::Basic => "",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DatasetVariant::Carvana => "carvana",
            DatasetVariant::Basic => "basic",
        }
    }
}

pub struct DatasetAssembler {
    images_dir: PathBuf,
    masks_dir:  PathBuf,
    scale:      f64,
}

impl DatasetAssembler {
    pub fn new(images_dir: impl Into<PathBuf>, masks_dir: impl Into<PathBuf>, scale: f64) -> Self {
        Self {
            images_dir: images_dir.into(),
            masks_dir:  masks_dir.into(),
            scale,
        }
    }

    /// Try each variant in order; the first success wins.
    pub fn assemble(
        &self,
        variants: &[DatasetVariant],
    ) -> DatasetResult<(SegmentationDataset, DatasetVariant)> {
        let mut failures = Vec::new();

        for &variant in variants {
            match self.build(variant) {
                Ok(dataset) => {
                    tracing::info!(
                        "Creating {} dataset with {} examples",
                        variant.name(),
                        burn::data::dataset::Dataset::len(&dataset)
                    );
                    return Ok((dataset, variant));
                }
                Err(e) => {
                    tracing::info!("{} dataset unavailable: {}", variant.name(), e);
                    failures.push(format!("{}: {}", variant.name(), e));
                }
            }
        }

        Err(DatasetError::NoVariant(failures.join("; ")))
    }

    /// Build the dataset for a single layout.
    pub fn build(&self, variant: DatasetVariant) -> DatasetResult<SegmentationDataset> {
        let entries = self.index(variant)?;
        SegmentationDataset::build(entries, Preprocessor::new(self.scale))
    }

    /// Pair every image key with its unique mask file.
    pub fn index(&self, variant: DatasetVariant) -> DatasetResult<Vec<PairEntry>> {
        let images = list_files(&self.images_dir)?;

        let mut keys: Vec<(String, PathBuf)> = Vec::with_capacity(images.len());
        for path in images {
            let Some(key) = stem(&path) else { continue };
            if keys.last().map(|(k, _)| k == &key).unwrap_or(false) {
                tracing::warn!("Skipping duplicate image key '{}' ({})", key, path.display());
                continue;
            }
            keys.push((key, path));
        }
        if keys.is_empty() {
            return Err(DatasetError::EmptyIndex(self.images_dir.clone()));
        }

        let mut masks: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for path in list_files(&self.masks_dir)? {
            if let Some(s) = stem(&path) {
                masks.entry(s).or_default().push(path);
            }
        }

        keys.into_iter()
            .map(|(key, image)| {
                let pattern = format!("{}{}", key, variant.mask_suffix());
                match masks.get(&pattern).map(Vec::as_slice) {
                    Some([mask]) => Ok(PairEntry { key, image, mask: mask.clone() }),
                    other => Err(DatasetError::MissingMask {
                        key,
                        pattern,
                        found: other.map(<[PathBuf]>::len).unwrap_or(0),
                    }),
                }
            })
            .collect()
    }
}

/// Regular, non-hidden files of `dir`, sorted by name.
fn list_files(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    let io_err = |source| DatasetError::Io { path: dir.to_path_buf(), source };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(true);
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}
