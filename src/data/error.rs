// ============================================================
// Layer 4 — Data Errors
// ============================================================
// Every failure the data pipeline can report. Dataset
// construction returns these so the assembler can decide
// whether to fall back to the next dataset variant.

use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no input file found in {0}, make sure you put your images there")]
    EmptyIndex(PathBuf),
    #[error("expected exactly one mask named '{pattern}.*' for key '{key}', found {found}")]
    MissingMask {
        key:     String,
        pattern: String,
        found:   usize,
    },
    #[error("image and mask '{key}' should be the same size, but are {image:?} and {mask:?}")]
    ShapeMismatch {
        key:   String,
        image: (u32, u32),
        mask:  (u32, u32),
    },
    #[error("scale {scale} is too small, resized images would have no pixels ({width}x{height})")]
    InvalidScale { scale: f64, width: u32, height: u32 },
    #[error("sample {0} could not be loaded")]
    SampleUnavailable(usize),
    #[error("cannot stack batch: {0}")]
    BatchShape(String),
    #[error("loader worker pool failed: {0}")]
    Worker(String),
    #[error("no dataset variant could be built: {0}")]
    NoVariant(String),
}
