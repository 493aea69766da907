// ============================================================
// Layer 3 — Sample Domain Type
// ============================================================
// One preprocessed training example: an image raster in
// channel-first order and a per-pixel label map.
//
// Labels are indices into the dataset's `mask_values`, not
// raw pixel values. A mask whose pixels are {0, 255} becomes
// labels {0, 1}; an RGB palette mask becomes one label per
// distinct colour.

/// Raw pixel value of a mask, one byte per mask channel.
/// Grayscale masks have length 1, colour masks length 3.
pub type MaskValue = Vec<u8>;

/// A preprocessed (image, mask) pair identified by its file key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// File stem shared by the image and its mask
    pub key: String,

    /// Image values, CHW order, normalised to [0, 1]
    pub image: Vec<f32>,

    /// Per-pixel class labels, HW order
    pub mask: Vec<i64>,

    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl Sample {
    /// Spatial size as (height, width)
    pub fn spatial(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// True when the image and mask buffers agree with the declared shape.
    pub fn is_consistent(&self) -> bool {
        self.image.len() == self.channels * self.height * self.width
            && self.mask.len() == self.height * self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(channels: usize, h: usize, w: usize) -> Sample {
        Sample {
            key:   "a".into(),
            image: vec![0.0; channels * h * w],
            mask:  vec![0; h * w],
            channels,
            height: h,
            width:  w,
        }
    }

    #[test]
    fn test_consistent_sample() {
        assert!(sample(3, 4, 5).is_consistent());
        assert_eq!(sample(3, 4, 5).spatial(), (4, 5));
    }

    #[test]
    fn test_inconsistent_mask_length() {
        let mut s = sample(1, 2, 2);
        s.mask.pop();
        assert!(!s.is_consistent());
    }
}
