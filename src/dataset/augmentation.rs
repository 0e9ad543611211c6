//! Training-time augmentation
//!
//! Works on decoded, normalized CHW buffers as they are batched, so the
//! images on disk and the validation set are never altered.

use rand::Rng;

use crate::model::InputShape;

/// Random horizontal flips applied to training batches
pub struct Augmenter {
    shape: InputShape,
    flip_probability: f64,
}

impl Augmenter {
    pub fn new(shape: InputShape) -> Self {
        Self {
            shape,
            flip_probability: 0.5,
        }
    }

    /// Mirror one image left to right in place
    pub fn flip(&self, pixels: &mut [f32]) {
        for row in pixels.chunks_exact_mut(self.shape.width) {
            row.reverse();
        }
    }

    /// Flip each image of a batch buffer with probability one half.
    /// Returns how many images were flipped.
    pub fn apply<R: Rng>(&self, batch: &mut [f32], rng: &mut R) -> usize {
        let mut flipped = 0;
        for image in batch.chunks_exact_mut(self.shape.len()) {
            if rng.gen_bool(self.flip_probability) {
                self.flip(image);
                flipped += 1;
            }
        }
        flipped
    }
}
