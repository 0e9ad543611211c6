//! Image loading: decode, resize and normalize samples into model-ready buffers
//!
//! Decoding runs on the rayon pool; results keep the order of the input
//! samples. A sample that fails to decode is skipped with a warning.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use rayon::prelude::*;
use tracing::{info, warn};

use super::sample::{Label, Sample};
use crate::model::{InputShape, Normalization};
use crate::utils::error::{PipelineError, Result};
use crate::utils::logging::progress_bar;

/// One decoded, normalized image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageItem {
    /// CHW pixel buffer of length `shape.len()`
    pub pixels: Vec<f32>,
    pub label: Label,
    pub path: PathBuf,
}

/// Decoded images sharing one input shape
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSet {
    pub shape: InputShape,
    pub items: Vec<ImageItem>,
    /// Samples dropped because they failed to decode
    pub skipped: usize,
}

impl ImageSet {
    pub fn new(shape: InputShape, items: Vec<ImageItem>) -> Self {
        Self {
            shape,
            items,
            skipped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.items.iter().map(|i| i.label).collect()
    }
}

/// Loads samples at a fixed input shape
#[derive(Debug, Clone, Copy)]
pub struct ImageLoader {
    shape: InputShape,
}

impl ImageLoader {
    pub fn new(shape: InputShape) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> InputShape {
        self.shape
    }

    /// Decode and normalize a single image
    pub fn load_pixels(&self, path: &Path, normalization: Normalization) -> Result<Vec<f32>> {
        let img = image::open(path)
            .map_err(|e| PipelineError::ImageDecode(path.to_path_buf(), e.to_string()))?;
        let resized = img.resize_exact(
            self.shape.width as u32,
            self.shape.height as u32,
            FilterType::Triangle,
        );
        Ok(normalization.apply(&resized.to_rgb8()))
    }

    /// Load every sample, skipping the ones that fail to decode
    pub fn load(&self, samples: &[Sample], normalization: Normalization, what: &str) -> ImageSet {
        let pb = progress_bar(samples.len(), what);

        let results: Vec<Option<ImageItem>> = samples
            .par_iter()
            .map(|sample| {
                let item = match self.load_pixels(&sample.path, normalization) {
                    Ok(pixels) => Some(ImageItem {
                        pixels,
                        label: sample.label,
                        path: sample.path.clone(),
                    }),
                    Err(e) => {
                        warn!("Skipping sample: {}", e);
                        None
                    }
                };
                pb.inc(1);
                item
            })
            .collect();
        pb.finish_and_clear();

        let items: Vec<ImageItem> = results.into_iter().flatten().collect();
        let skipped = samples.len() - items.len();
        info!(
            "Loaded {} {} images ({} skipped)",
            items.len(),
            what,
            skipped
        );

        ImageSet {
            shape: self.shape,
            items,
            skipped,
        }
    }
}
