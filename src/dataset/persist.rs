//! Persisted partitions
//!
//! Materializes partitions as `processed/{train,val,test}/{label}/{filename}`
//! with every image resized to a fixed resolution, and records what was written
//! in `split_manifest.json` next to the split directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use image::imageops::FilterType;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::catalog::is_image_file;
use super::sample::{Label, LabelScheme, Provenance, Sample, SplitName};
use super::split::{Partition, PartitionStats, Partitions, SplitConfig};
use crate::utils::error::{PipelineError, Result, ResultExt};
use crate::utils::logging::progress_bar;
use crate::utils::write_atomic;

/// Manifest file name inside the processed directory
pub const MANIFEST_FILE: &str = "split_manifest.json";

/// One written image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub split: SplitName,
    pub label: Label,
    pub provenance: Provenance,
    /// Source image in the raw tree
    pub source: PathBuf,
    /// Destination relative to the processed directory
    pub file: PathBuf,
}

/// Record of one partition materialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub created_at: String,
    pub split: SplitConfig,
    pub image_size: u32,
    pub labels: LabelScheme,
    pub stats: PartitionStats,
    pub skipped: usize,
    pub entries: Vec<ManifestEntry>,
}

impl SplitManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).at_path(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Rebuild partitions whose sample paths point into `processed_dir`
    pub fn partitions(&self, processed_dir: &Path) -> Partitions {
        let collect = |split: SplitName| {
            let samples = self
                .entries
                .iter()
                .filter(|e| e.split == split)
                .map(|e| Sample::new(processed_dir.join(&e.file), e.label, e.provenance))
                .collect();
            Partition::new(split, samples)
        };
        Partitions {
            train: collect(SplitName::Train),
            val: collect(SplitName::Val),
            test: collect(SplitName::Test),
        }
    }
}

struct WriteJob<'a> {
    split: SplitName,
    sample: &'a Sample,
    relative: PathBuf,
}

/// Writes partitions into the processed directory layout
#[derive(Debug, Clone)]
pub struct PartitionWriter {
    scheme: LabelScheme,
    image_size: u32,
}

impl PartitionWriter {
    pub fn new(scheme: LabelScheme, image_size: u32) -> Result<Self> {
        if image_size == 0 {
            return Err(PipelineError::Configuration(
                "image size must be positive".to_string(),
            ));
        }
        scheme.validate()?;
        Ok(Self { scheme, image_size })
    }

    /// Resize and write every sample; unreadable sources are skipped with a warning.
    ///
    /// Split directories and the manifest left by an earlier run are removed
    /// first, so the on-disk layout only ever holds the current partitions.
    pub fn write(
        &self,
        partitions: &Partitions,
        split: SplitConfig,
        processed_dir: &Path,
    ) -> Result<SplitManifest> {
        clear_previous(processed_dir)?;
        for name in SplitName::ALL {
            for label in Label::ALL {
                std::fs::create_dir_all(
                    processed_dir
                        .join(name.as_str())
                        .join(self.scheme.dir_name(label)),
                )?;
            }
        }

        let jobs = self.plan(partitions);
        let pb = progress_bar(jobs.len(), "writing partitions");
        let size = self.image_size;

        let written: Vec<Option<ManifestEntry>> = jobs
            .par_iter()
            .map(|job| {
                let dest = processed_dir.join(&job.relative);
                let result = image::open(&job.sample.path)
                    .map(|img| img.resize_exact(size, size, FilterType::Lanczos3))
                    .and_then(|img| img.to_rgb8().save(&dest));
                pb.inc(1);
                match result {
                    Ok(()) => Some(ManifestEntry {
                        split: job.split,
                        label: job.sample.label,
                        provenance: job.sample.provenance,
                        source: job.sample.path.clone(),
                        file: job.relative.clone(),
                    }),
                    Err(e) => {
                        warn!("Skipping {:?}: {}", job.sample.path, e);
                        None
                    }
                }
            })
            .collect();
        pb.finish_and_clear();

        let entries: Vec<ManifestEntry> = written.into_iter().flatten().collect();
        let skipped = jobs.len() - entries.len();

        let mut manifest = SplitManifest {
            created_at: Utc::now().to_rfc3339(),
            split,
            image_size: self.image_size,
            labels: self.scheme.clone(),
            stats: PartitionStats::default(),
            skipped,
            entries,
        };
        manifest.stats = manifest.partitions(processed_dir).stats();

        let manifest_path = processed_dir.join(MANIFEST_FILE);
        write_atomic(&manifest_path, serde_json::to_string_pretty(&manifest)?.as_bytes())?;

        info!(
            "Wrote {} images to {:?} ({} skipped), manifest at {:?}",
            manifest.entries.len(),
            processed_dir,
            skipped,
            manifest_path
        );
        Ok(manifest)
    }

    /// Destination names, assigned sequentially so collisions resolve the same
    /// way on every run.
    fn plan<'a>(&self, partitions: &'a Partitions) -> Vec<WriteJob<'a>> {
        let mut used: HashSet<PathBuf> = HashSet::new();
        let mut jobs = Vec::new();

        for partition in partitions.iter() {
            for sample in &partition.samples {
                let dir = Path::new(partition.split.as_str()).join(self.scheme.dir_name(sample.label));
                let relative = unique_name(&dir, &sample.path, &mut used);
                jobs.push(WriteJob {
                    split: partition.split,
                    sample,
                    relative,
                });
            }
        }
        jobs
    }
}

fn clear_previous(processed_dir: &Path) -> Result<()> {
    for name in SplitName::ALL {
        let dir = processed_dir.join(name.as_str());
        if dir.is_dir() {
            warn!("Removing previous split directory {:?}", dir);
            std::fs::remove_dir_all(&dir)?;
        }
    }
    let manifest = processed_dir.join(MANIFEST_FILE);
    if manifest.is_file() {
        std::fs::remove_file(&manifest)?;
    }
    Ok(())
}

fn unique_name(dir: &Path, source: &Path, used: &mut HashSet<PathBuf>) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let ext = source
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "png".to_string());

    let mut candidate = dir.join(format!("{}.{}", stem, ext));
    let mut n = 1;
    while used.contains(&candidate) {
        candidate = dir.join(format!("{}_{}.{}", stem, n, ext));
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Reads persisted partitions back from the processed directory
pub struct ProcessedDataset;

impl ProcessedDataset {
    /// Use the manifest when present, otherwise scan the directory layout.
    ///
    /// Without a manifest every sample is treated as original.
    pub fn open(processed_dir: &Path, scheme: &LabelScheme) -> Result<Partitions> {
        if !processed_dir.is_dir() {
            return Err(PipelineError::PathNotFound(processed_dir.to_path_buf()));
        }

        let manifest_path = processed_dir.join(MANIFEST_FILE);
        let partitions = if manifest_path.is_file() {
            let manifest = SplitManifest::load(&manifest_path)?;
            if &manifest.labels != scheme {
                return Err(PipelineError::Configuration(format!(
                    "processed data uses labels {:?}/{:?}, configuration expects {:?}/{:?}",
                    manifest.labels.positive,
                    manifest.labels.negative,
                    scheme.positive,
                    scheme.negative
                )));
            }
            manifest.partitions(processed_dir)
        } else {
            warn!("No {} in {:?}, scanning directories", MANIFEST_FILE, processed_dir);
            Partitions {
                train: scan_split(processed_dir, SplitName::Train, scheme)?,
                val: scan_split(processed_dir, SplitName::Val, scheme)?,
                test: scan_split(processed_dir, SplitName::Test, scheme)?,
            }
        };

        partitions.verify()?;
        info!(
            "Opened processed dataset {:?}: train={} val={} test={}",
            processed_dir,
            partitions.train.len(),
            partitions.val.len(),
            partitions.test.len()
        );
        Ok(partitions)
    }
}

fn scan_split(processed_dir: &Path, split: SplitName, scheme: &LabelScheme) -> Result<Partition> {
    let mut samples = Vec::new();
    for label in Label::ALL {
        let dir = processed_dir.join(split.as_str()).join(scheme.dir_name(label));
        if !dir.is_dir() {
            warn!("Missing directory {:?}", dir);
            continue;
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_image_file(p))
            .collect();
        files.sort();
        samples.extend(
            files
                .into_iter()
                .map(|p| Sample::new(p, label, Provenance::Original)),
        );
    }
    Ok(Partition::new(split, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetPartitioner, ImageCatalog};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_png(path: &Path, shade: u8) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(20, 10, Rgb([shade, shade, shade]))
            .save(path)
            .unwrap();
    }

    fn raw_tree(root: &Path) {
        for i in 0..6 {
            write_png(&root.join(format!("Original Dataset/Cancer/c{}.png", i)), 200);
            write_png(&root.join(format!("Original Dataset/Non-Cancer/n{}.png", i)), 20);
        }
        // same file name as an original, different subtree
        write_png(&root.join("Augmented Dataset/Cancer/c0.png"), 210);
        write_png(&root.join("Augmented Dataset/Cancer/c0_flip.png"), 190);
        std::fs::write(root.join("Augmented Dataset/Cancer/broken.png"), b"junk").unwrap();
    }

    #[test]
    fn test_write_and_reopen() {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        raw_tree(raw.path());

        let scheme = LabelScheme::default();
        let catalog = ImageCatalog::new(scheme.clone()).scan(raw.path()).unwrap();
        let split = SplitConfig::new(0.2, 0.2, 42).unwrap();
        let parts = DatasetPartitioner::new(split).unwrap().partition(&catalog).unwrap();

        let manifest = PartitionWriter::new(scheme.clone(), 8)
            .unwrap()
            .write(&parts, split, out.path())
            .unwrap();

        assert_eq!(manifest.skipped, 1);
        assert_eq!(manifest.entries.len(), 14);
        assert!(out.path().join(MANIFEST_FILE).is_file());
        for name in SplitName::ALL {
            assert!(out.path().join(name.as_str()).join("Cancer").is_dir());
            assert!(out.path().join(name.as_str()).join("Non-Cancer").is_dir());
        }

        let first = out.path().join(&manifest.entries[0].file);
        let img = image::open(&first).unwrap();
        assert_eq!((img.width(), img.height()), (8, 8));

        let reopened = ProcessedDataset::open(out.path(), &scheme).unwrap();
        assert_eq!(reopened.test.len(), parts.test.len());
        assert_eq!(reopened.val.len(), parts.val.len());
        assert_eq!(reopened.train.len(), parts.train.len() - 1);
        assert_eq!(reopened.train.augmented_count(), 2);
        assert_eq!(reopened.stats(), manifest.stats);
    }

    #[test]
    fn test_rewrite_with_new_seed_replaces_previous_layout() {
        let raw = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        for i in 0..20 {
            write_png(&raw.path().join(format!("Original Dataset/Cancer/c{:02}.png", i)), 200);
            write_png(&raw.path().join(format!("Original Dataset/Non-Cancer/n{:02}.png", i)), 20);
        }
        let scheme = LabelScheme::default();
        let catalog = ImageCatalog::new(scheme.clone()).scan(raw.path()).unwrap();
        let writer = PartitionWriter::new(scheme.clone(), 8).unwrap();

        let mut last = None;
        for seed in [1, 2] {
            let split = SplitConfig::new(0.2, 0.2, seed).unwrap();
            let parts = DatasetPartitioner::new(split).unwrap().partition(&catalog).unwrap();
            writer.write(&parts, split, out.path()).unwrap();
            last = Some(parts);
        }
        let last = last.unwrap();

        let names_in = |split: &str| -> HashSet<String> {
            walkdir::WalkDir::new(out.path().join(split))
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        };
        let train = names_in("train");
        let val = names_in("val");
        let test = names_in("test");
        assert_eq!(train.intersection(&test).count(), 0);
        assert_eq!(train.intersection(&val).count(), 0);
        assert_eq!(val.intersection(&test).count(), 0);

        std::fs::remove_file(out.path().join(MANIFEST_FILE)).unwrap();
        let reopened = ProcessedDataset::open(out.path(), &scheme).unwrap();
        for name in SplitName::ALL {
            assert_eq!(reopened.get(name).len(), last.get(name).len());
        }
    }

    #[test]
    fn test_colliding_names_are_disambiguated() {
        let mut used = HashSet::new();
        let dir = Path::new("train/Cancer");
        let a = unique_name(dir, Path::new("/raw/Original/Cancer/x.PNG"), &mut used);
        let b = unique_name(dir, Path::new("/raw/Augmented/Cancer/x.png"), &mut used);
        let c = unique_name(dir, Path::new("/raw/Augmented/Cancer/x.png"), &mut used);
        assert_eq!(a, Path::new("train/Cancer/x.png"));
        assert_eq!(b, Path::new("train/Cancer/x_1.png"));
        assert_eq!(c, Path::new("train/Cancer/x_2.png"));
    }

    #[test]
    fn test_open_without_manifest_scans_layout() {
        let out = TempDir::new().unwrap();
        write_png(&out.path().join("train/Cancer/a.png"), 1);
        write_png(&out.path().join("train/Non-Cancer/b.png"), 2);
        write_png(&out.path().join("val/Cancer/c.png"), 3);
        write_png(&out.path().join("test/Non-Cancer/d.png"), 4);

        let parts = ProcessedDataset::open(out.path(), &LabelScheme::default()).unwrap();
        assert_eq!(parts.train.len(), 2);
        assert_eq!(parts.val.labels(), vec![Label::Positive]);
        assert_eq!(parts.test.labels(), vec![Label::Negative]);
    }

    #[test]
    fn test_open_missing_dir() {
        let err = ProcessedDataset::open(Path::new("/no/such/processed"), &LabelScheme::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::PathNotFound(_)));
    }
}
