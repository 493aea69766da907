// ============================================================
// Layer 4 — Segmentation Dataset
// ============================================================
// Implements Burn's Dataset trait over indexed image/mask
// pairs. Construction scans every mask once (in parallel) to
// collect the distinct mask values; samples are decoded lazily
// on `get`, so only the index lives in memory.

use burn::data::dataset::Dataset;
use rayon::prelude::*;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use crate::data::error::{DatasetError, DatasetResult};
use crate::data::preprocessor::{unique_mask_values, Preprocessor};
use crate::domain::sample::{MaskValue, Sample};

/// One indexed (image, mask) file pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairEntry {
    pub key:   String,
    pub image: PathBuf,
    pub mask:  PathBuf,
}

pub struct SegmentationDataset {
    entries:      Vec<PairEntry>,
    mask_values:  Vec<MaskValue>,
    preprocessor: Preprocessor,
}

impl SegmentationDataset {
    /// Validate every pair and collect the distinct mask values.
    pub fn build(entries: Vec<PairEntry>, preprocessor: Preprocessor) -> DatasetResult<Self> {
        let per_mask: Vec<BTreeSet<MaskValue>> = entries
            .par_iter()
            .map(|entry| scan_pair(entry, &preprocessor))
            .collect::<DatasetResult<_>>()?;

        let mask_values: Vec<MaskValue> = per_mask
            .into_iter()
            .flatten()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        tracing::info!("Unique mask values: {:?}", mask_values);
        Ok(Self { entries, mask_values, preprocessor })
    }

    /// Sorted distinct raw mask values; label `i` stands for `mask_values[i]`.
    pub fn mask_values(&self) -> &[MaskValue] {
        &self.mask_values
    }

    pub fn entries(&self) -> &[PairEntry] {
        &self.entries
    }

    /// Decode and preprocess one sample.
    pub fn load(&self, index: usize) -> DatasetResult<Sample> {
        let entry = self
            .entries
            .get(index)
            .ok_or(DatasetError::SampleUnavailable(index))?;

        let image = open_image(&entry.image)?;
        let mask  = open_image(&entry.mask)?;
        if image.width() != mask.width() || image.height() != mask.height() {
            return Err(DatasetError::ShapeMismatch {
                key:   entry.key.clone(),
                image: (image.width(), image.height()),
                mask:  (mask.width(), mask.height()),
            });
        }

        let (image, channels, height, width) = self.preprocessor.image(&image)?;
        let (mask, _, _) = self.preprocessor.mask(&mask, &self.mask_values)?;

        Ok(Sample {
            key: entry.key.clone(),
            image,
            mask,
            channels,
            height,
            width,
        })
    }
}

impl Dataset<Sample> for SegmentationDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        match self.load(index) {
            Ok(sample) => Some(sample),
            Err(e) => {
                tracing::error!("Failed to load sample {}: {}", index, e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn open_image(path: &Path) -> DatasetResult<image::DynamicImage> {
    image::open(path).map_err(|source| DatasetError::Image { path: path.to_path_buf(), source })
}

/// Check sizes and the scale for one pair, returning the mask's values.
fn scan_pair(entry: &PairEntry, preprocessor: &Preprocessor) -> DatasetResult<BTreeSet<MaskValue>> {
    let image_dims = image::image_dimensions(&entry.image)
        .map_err(|source| DatasetError::Image { path: entry.image.clone(), source })?;
    let mask = open_image(&entry.mask)?;
    let mask_dims = (mask.width(), mask.height());

    if image_dims != mask_dims {
        return Err(DatasetError::ShapeMismatch {
            key:   entry.key.clone(),
            image: image_dims,
            mask:  mask_dims,
        });
    }
    preprocessor.target_size(image_dims.0, image_dims.1)?;

    Ok(unique_mask_values(&mask))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};
    /// Write `count` RGB images with binary masks into `<root>/imgs` and `<root>/masks`.
    pub(crate) fn write_pairs(root: &Path, count: usize, size: u32, mask_suffix: &str) {
        let imgs  = root.join("imgs");
        let masks = root.join("masks");
        std::fs::create_dir_all(&imgs).unwrap();
        std::fs::create_dir_all(&masks).unwrap();
        for i in 0..count {
            let img = RgbImage::from_fn(size, size, |x, y| {
                image::Rgb([(x * 10 + i as u32) as u8, (y * 10) as u8, 128])
            });
            img.save(imgs.join(format!("s{i:03}.png"))).unwrap();
            let mask = GrayImage::from_fn(size, size, |x, _| {
                if x < size / 2 { Luma([0]) } else { Luma([255]) }
            });
            mask.save(masks.join(format!("s{i:03}{mask_suffix}.png"))).unwrap();
        }
    }

    fn entries(root: &Path, count: usize, suffix: &str) -> Vec<PairEntry> {
        (0..count)
            .map(|i| PairEntry {
                key:   format!("s{i:03}"),
                image: root.join("imgs").join(format!("s{i:03}.png")),
                mask:  root.join("masks").join(format!("s{i:03}{suffix}.png")),
            })
            .collect()
    }

    #[test]
    fn test_build_collects_mask_values() {
        let dir = tempfile::tempdir().unwrap();
        write_pairs(dir.path(), 3, 8, "");
        let ds = SegmentationDataset::build(entries(dir.path(), 3, ""), Preprocessor::new(1.0))
            .unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.mask_values(), &[vec![0u8], vec![255u8]]);
    }

    #[test]
    fn test_load_produces_scaled_sample() {
        let dir = tempfile::tempdir().unwrap();
        write_pairs(dir.path(), 1, 8, "");
        let ds = SegmentationDataset::build(entries(dir.path(), 1, ""), Preprocessor::new(0.5))
            .unwrap();
        let sample = ds.get(0).unwrap();
        assert_eq!(sample.key, "s000");
        assert_eq!((sample.channels, sample.height, sample.width), (3, 4, 4));
        assert!(sample.is_consistent());
        assert!(sample.mask.iter().all(|&l| l == 0 || l == 1));
        assert!(ds.get(5).is_none());
    }

    #[test]
    fn test_build_rejects_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_pairs(dir.path(), 1, 8, "");
        GrayImage::new(4, 4)
            .save(dir.path().join("masks").join("s000.png"))
            .unwrap();
        let err = SegmentationDataset::build(entries(dir.path(), 1, ""), Preprocessor::new(1.0))
            .err()
            .unwrap();
        assert!(matches!(err, DatasetError::ShapeMismatch { .. }));
    }
}
