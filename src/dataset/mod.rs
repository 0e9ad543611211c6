//! Dataset module
//!
//! - `sample`: labels, provenance and the canonical label/class-index mapping
//! - `catalog`: raw directory scanning
//! - `split`: stratified, leakage-free train/val/test partitioning
//! - `persist`: processed directory layout and split manifest
//! - `loader`: decoding images into normalized buffers
//! - `augmentation`: random flips for training batches

pub mod augmentation;
pub mod catalog;
pub mod loader;
pub mod persist;
pub mod sample;
pub mod split;

pub use augmentation::Augmenter;
pub use catalog::{Catalog, CatalogStats, ImageCatalog};
pub use loader::{ImageItem, ImageLoader, ImageSet};
pub use persist::{PartitionWriter, ProcessedDataset, SplitManifest, MANIFEST_FILE};
pub use sample::{Label, LabelScheme, Provenance, Sample, SplitName};
pub use split::{DatasetPartitioner, Partition, PartitionStats, Partitions, SplitConfig};
