// ============================================================
// Layer 5 — Training Errors
// ============================================================

use std::any::Any;
use thiserror::Error;

use crate::data::error::DatasetError;

pub type TrainResult<T> = Result<T, TrainError>;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(
        "network has been defined with {expected} input channels, but loaded images have \
         {found} channels; please check that the images are loaded correctly"
    )]
    ChannelMismatch { expected: usize, found: usize },

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// A panic raised inside the backend, caught at the attempt boundary.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl TrainError {
    /// True when the failure is (or reads like) device memory exhaustion.
    pub fn is_out_of_memory(&self) -> bool {
        match self {
            TrainError::OutOfMemory(_) => true,
            other => other.to_string().to_lowercase().contains("out of memory"),
        }
    }

    /// Wrap a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        TrainError::Backend(panic_message(payload.as_ref()))
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_oom_is_detected() {
        assert!(TrainError::OutOfMemory("cuda".into()).is_out_of_memory());
    }

    #[test]
    fn test_backend_message_oom_is_detected() {
        let err = TrainError::Backend("wgpu: Out Of Memory while allocating buffer".into());
        assert!(err.is_out_of_memory());
    }

    #[test]
    fn test_other_errors_are_not_oom() {
        let err = TrainError::ChannelMismatch { expected: 3, found: 1 };
        assert!(!err.is_out_of_memory());
        assert!(!TrainError::Backend("index out of bounds".into()).is_out_of_memory());
    }

    #[test]
    fn test_panic_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("out of memory");
        assert!(TrainError::from_panic(payload).is_out_of_memory());
        let payload: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
