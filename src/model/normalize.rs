//! Per-architecture pixel normalization
//!
//! Each model factory owns exactly one [`Normalization`]; the orchestrator and
//! the evaluation harness both ask the factory for it, so training and
//! evaluation inputs cannot drift apart.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// ImageNet normalization constants (RGB)
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Pixels scaled to [0, 1]
    UnitScale,
    /// Pixels scaled to [0, 1] then standardized with ImageNet mean/std
    ImageNet,
}

impl Normalization {
    /// Convert an RGB image to a CHW float buffer
    pub fn apply(self, image: &RgbImage) -> Vec<f32> {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let plane = width * height;
        let mut tensor = vec![0.0f32; 3 * plane];

        for (x, y, pixel) in image.enumerate_pixels() {
            let offset = y as usize * width + x as usize;
            for c in 0..3 {
                tensor[c * plane + offset] = self.channel(c, pixel[c]);
            }
        }
        tensor
    }

    fn channel(self, c: usize, value: u8) -> f32 {
        let unit = value as f32 / 255.0;
        match self {
            Normalization::UnitScale => unit,
            Normalization::ImageNet => (unit - IMAGENET_MEAN[c]) / IMAGENET_STD[c],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_unit_scale_chw_layout() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 51]));

        let t = Normalization::UnitScale.apply(&img);
        assert_eq!(t.len(), 6);
        // R plane, then G plane, then B plane
        assert_eq!(&t[0..2], &[1.0, 0.0]);
        assert_eq!(&t[2..4], &[0.0, 1.0]);
        assert!((t[5] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_imagenet_standardization() {
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, Rgb([255, 255, 255]));

        let t = Normalization::ImageNet.apply(&img);
        for c in 0..3 {
            let expected = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert!((t[c] - expected).abs() < 1e-5);
        }
    }
}
