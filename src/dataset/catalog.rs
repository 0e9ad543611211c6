//! Image catalog
//!
//! Walks a raw dataset tree laid out as:
//!
//! ```text
//! raw/
//! ├── Original Dataset/
//! │   ├── Cancer/
//! │   └── Non-Cancer/
//! └── Augmented Dataset/
//!     ├── Cancer/
//!     └── Non-Cancer/
//! ```
//!
//! Each image's label comes from its immediate parent directory and its
//! provenance from the top-level subtree it sits under.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::sample::{Label, LabelScheme, Provenance, Sample};
use crate::utils::error::{PipelineError, Result};

/// Recognized image extensions (compared lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff"];

/// Whether `path` has a recognized image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Ordered sequence of discovered samples, in traversal order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub samples: Vec<Sample>,
}

impl Catalog {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn original(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| s.provenance == Provenance::Original)
    }

    pub fn augmented(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| s.provenance == Provenance::Augmented)
    }

    /// Samples per label, both provenances
    pub fn label_counts(&self) -> BTreeMap<Label, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label).or_insert(0) += 1;
        }
        counts
    }

    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats::default();
        for sample in &self.samples {
            let bucket = match sample.provenance {
                Provenance::Original => &mut stats.original,
                Provenance::Augmented => &mut stats.augmented,
            };
            *bucket.entry(sample.label).or_insert(0) += 1;
        }
        stats
    }
}

/// Per-provenance label counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub original: BTreeMap<Label, usize>,
    pub augmented: BTreeMap<Label, usize>,
}

impl CatalogStats {
    pub fn count(&self, provenance: Provenance, label: Label) -> usize {
        let bucket = match provenance {
            Provenance::Original => &self.original,
            Provenance::Augmented => &self.augmented,
        };
        bucket.get(&label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.original.values().sum::<usize>() + self.augmented.values().sum::<usize>()
    }

    /// Majority / minority count over the original images, `None` when a class is absent
    pub fn imbalance_ratio(&self) -> Option<f64> {
        let pos = self.count(Provenance::Original, Label::Positive);
        let neg = self.count(Provenance::Original, Label::Negative);
        let (lo, hi) = (pos.min(neg), pos.max(neg));
        (lo > 0).then(|| hi as f64 / lo as f64)
    }
}

impl fmt::Display for CatalogStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Catalog Statistics:")?;
        for provenance in [Provenance::Original, Provenance::Augmented] {
            writeln!(
                f,
                "  {:<10} positive: {:>6}  negative: {:>6}",
                provenance.to_string(),
                self.count(provenance, Label::Positive),
                self.count(provenance, Label::Negative)
            )?;
        }
        writeln!(f, "  Total:     {}", self.total())?;
        match self.imbalance_ratio() {
            Some(r) => write!(f, "  Imbalance (original): {:.2}:1", r),
            None => write!(f, "  Imbalance (original): undefined, a class is empty"),
        }
    }
}

/// Directory scanner producing a [`Catalog`]
#[derive(Debug, Clone, Default)]
pub struct ImageCatalog {
    scheme: LabelScheme,
}

impl ImageCatalog {
    pub fn new(scheme: LabelScheme) -> Self {
        Self { scheme }
    }

    /// Scan `root` recursively.
    ///
    /// Unreadable entries, files outside an Original/Augmented subtree and
    /// files in unknown label directories are skipped with a warning.
    pub fn scan(&self, root: &Path) -> Result<Catalog> {
        if !root.is_dir() {
            return Err(PipelineError::PathNotFound(root.to_path_buf()));
        }
        info!("Scanning image catalog at {:?}", root);

        let mut samples = Vec::new();
        let mut skipped = 0usize;

        for entry in WalkDir::new(root).min_depth(1).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    skipped += 1;
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || !is_image_file(path) {
                continue;
            }

            match self.classify(root, path) {
                Some((label, provenance)) => samples.push(Sample::new(path, label, provenance)),
                None => {
                    warn!("Skipping {:?}: not under a known provenance/label directory", path);
                    skipped += 1;
                }
            }
        }

        let catalog = Catalog::new(samples);
        info!(
            "Catalog: {} images ({} original, {} augmented), {} skipped",
            catalog.len(),
            catalog.original().count(),
            catalog.augmented().count(),
            skipped
        );
        debug!("{}", catalog.stats());
        Ok(catalog)
    }

    fn classify(&self, root: &Path, path: &Path) -> Option<(Label, Provenance)> {
        let relative = path.strip_prefix(root).ok()?;
        let top = relative.components().next()?.as_os_str().to_str()?;
        let provenance = Provenance::from_subtree(top)?;

        let parent = path.parent()?;
        if parent == root.join(top) {
            // file directly inside the provenance directory, no label level
            return None;
        }
        let label_dir = parent.file_name()?.to_str()?;
        let label = self.scheme.label_for_dir(label_dir)?;
        Some((label, provenance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"not decoded during scan").unwrap();
    }

    #[test]
    fn test_scan_missing_root() {
        let err = ImageCatalog::default()
            .scan(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::PathNotFound(_)));
    }

    #[test]
    fn test_scan_labels_and_provenance() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "Original Dataset/Cancer/a.png");
        touch(root, "Original Dataset/Non-Cancer/b.JPG");
        touch(root, "Original Dataset/Non-Cancer/nested/ignored_label.png");
        touch(root, "Augmented Dataset/Cancer/a_rot90.png");
        touch(root, "Augmented Dataset/Cancer/notes.txt");
        touch(root, "Other/Cancer/c.png");
        touch(root, "Original Dataset/loose.png");

        let catalog = ImageCatalog::default().scan(root).unwrap();
        assert_eq!(catalog.len(), 3);

        let stats = catalog.stats();
        assert_eq!(stats.count(Provenance::Original, Label::Positive), 1);
        assert_eq!(stats.count(Provenance::Original, Label::Negative), 1);
        assert_eq!(stats.count(Provenance::Augmented, Label::Positive), 1);
        assert_eq!(stats.count(Provenance::Augmented, Label::Negative), 0);
        assert_eq!(catalog.label_counts()[&Label::Positive], 2);
    }

    #[test]
    fn test_custom_label_scheme() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "original/malignant/x.png");
        touch(dir.path(), "original/benign/y.png");

        let scheme = LabelScheme::new("malignant", "benign").unwrap();
        let catalog = ImageCatalog::new(scheme).scan(dir.path()).unwrap();
        let labels: Vec<Label> = catalog.iter().map(|s| s.label).collect();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(&Label::Positive));
        assert!(labels.contains(&Label::Negative));
    }

    #[test]
    fn test_imbalance_ratio() {
        let mut stats = CatalogStats::default();
        stats.original.insert(Label::Negative, 80);
        stats.original.insert(Label::Positive, 20);
        assert_eq!(stats.imbalance_ratio(), Some(4.0));

        stats.original.remove(&Label::Positive);
        assert_eq!(stats.imbalance_ratio(), None);
    }
}
