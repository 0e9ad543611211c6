//! Stratified train/val/test partitioning with augmented-data isolation
//!
//! ## Split Strategy
//!
//! 1. Original and augmented images are separated by provenance.
//! 2. **Test set** - `test_fraction` of the original images, stratified by label.
//! 3. **Validation set** - `val_fraction` of the original images, drawn from the
//!    remainder with the corrected fraction `val / (1 - test)`.
//! 4. **Training set** - the rest of the original images followed by every
//!    augmented image. Augmented copies never reach val or test.
//!
//! Each label group is sorted by path before the seeded shuffle, so the result
//! depends only on the set of samples and the seed, never on traversal order.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::catalog::Catalog;
use super::sample::{Label, Provenance, Sample, SplitName};
use crate::utils::error::{PipelineError, Result};

/// Configuration for dataset splitting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of the original images held out for testing
    pub test_fraction: f64,
    /// Fraction of the original images used for validation
    pub val_fraction: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.15,
            val_fraction: 0.15,
            seed: 42,
        }
    }
}

impl SplitConfig {
    pub fn new(test_fraction: f64, val_fraction: f64, seed: u64) -> Result<Self> {
        let config = Self {
            test_fraction,
            val_fraction,
            seed,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("test_fraction", self.test_fraction),
            ("val_fraction", self.val_fraction),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(PipelineError::Configuration(format!(
                    "{} must lie in (0, 1), got {}",
                    name, value
                )));
            }
        }
        if self.test_fraction + self.val_fraction >= 1.0 {
            return Err(PipelineError::Configuration(format!(
                "test_fraction + val_fraction must be below 1.0, got {} + {}",
                self.test_fraction, self.val_fraction
            )));
        }
        Ok(())
    }

    /// Fraction of the post-test remainder that yields `val_fraction` of the whole
    pub fn effective_val_fraction(&self) -> f64 {
        self.val_fraction / (1.0 - self.test_fraction)
    }
}

/// One named partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub split: SplitName,
    pub samples: Vec<Sample>,
}

impl Partition {
    pub fn new(split: SplitName, samples: Vec<Sample>) -> Self {
        Self { split, samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.samples.iter().map(|s| s.label).collect()
    }

    pub fn label_counts(&self) -> BTreeMap<Label, usize> {
        let mut counts = BTreeMap::new();
        for sample in &self.samples {
            *counts.entry(sample.label).or_insert(0) += 1;
        }
        counts
    }

    pub fn count(&self, label: Label) -> usize {
        self.samples.iter().filter(|s| s.label == label).count()
    }

    pub fn augmented_count(&self) -> usize {
        self.samples
            .iter()
            .filter(|s| s.provenance == Provenance::Augmented)
            .count()
    }
}

/// Train/val/test partitions of one catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partitions {
    pub train: Partition,
    pub val: Partition,
    pub test: Partition,
}

impl Partitions {
    pub fn get(&self, split: SplitName) -> &Partition {
        match split {
            SplitName::Train => &self.train,
            SplitName::Val => &self.val,
            SplitName::Test => &self.test,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        [&self.train, &self.val, &self.test].into_iter()
    }

    /// Check the leakage invariants: no path in two partitions and no
    /// augmented sample outside train.
    pub fn verify(&self) -> Result<()> {
        for held_out in [&self.val, &self.test] {
            if held_out.augmented_count() > 0 {
                return Err(PipelineError::DegenerateDataset(format!(
                    "{} augmented sample(s) leaked into the {} partition",
                    held_out.augmented_count(),
                    held_out.split
                )));
            }
        }

        let mut seen: HashSet<&PathBuf> = HashSet::new();
        for partition in self.iter() {
            for sample in &partition.samples {
                if !seen.insert(&sample.path) {
                    return Err(PipelineError::DegenerateDataset(format!(
                        "{:?} appears in more than one partition",
                        sample.path
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> PartitionStats {
        let row = |p: &Partition| SplitCounts {
            positive: p.count(Label::Positive),
            negative: p.count(Label::Negative),
            augmented: p.augmented_count(),
        };
        PartitionStats {
            train: row(&self.train),
            val: row(&self.val),
            test: row(&self.test),
        }
    }
}

/// Label and provenance counts for one partition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCounts {
    pub positive: usize,
    pub negative: usize,
    pub augmented: usize,
}

impl SplitCounts {
    pub fn total(&self) -> usize {
        self.positive + self.negative
    }
}

/// Counts for all three partitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub train: SplitCounts,
    pub val: SplitCounts,
    pub test: SplitCounts,
}

impl fmt::Display for PartitionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Partition Statistics:")?;
        for (name, row) in [("train", self.train), ("val", self.val), ("test", self.test)] {
            writeln!(
                f,
                "  {:<6} {:>6} total | positive: {:>6} | negative: {:>6} | augmented: {:>6}",
                name,
                row.total(),
                row.positive,
                row.negative,
                row.augmented
            )?;
        }
        Ok(())
    }
}

/// Splits a catalog into leakage-free stratified partitions
#[derive(Debug, Clone)]
pub struct DatasetPartitioner {
    config: SplitConfig,
}

impl DatasetPartitioner {
    pub fn new(config: SplitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    pub fn partition(&self, catalog: &Catalog) -> Result<Partitions> {
        let mut by_label: BTreeMap<Label, Vec<Sample>> = BTreeMap::new();
        for sample in catalog.original() {
            by_label.entry(sample.label).or_default().push(sample.clone());
        }
        let n_original: usize = by_label.values().map(Vec::len).sum();
        if n_original == 0 {
            return Err(PipelineError::DegenerateDataset(
                "catalog contains no original images to partition".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        for group in by_label.values_mut() {
            group.sort_by(|a, b| a.path.cmp(&b.path));
            group.shuffle(&mut rng);
        }

        let test = take_stratified(&mut by_label, self.config.test_fraction);
        let val = take_stratified(&mut by_label, self.config.effective_val_fraction());

        let mut train: Vec<Sample> = by_label.into_values().flatten().collect();
        let mut augmented: Vec<Sample> = catalog.augmented().cloned().collect();
        augmented.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            "Adding {} augmented samples to {} original training samples",
            augmented.len(),
            train.len()
        );
        train.extend(augmented);

        let partitions = Partitions {
            train: Partition::new(SplitName::Train, train),
            val: Partition::new(SplitName::Val, val),
            test: Partition::new(SplitName::Test, test),
        };
        partitions.verify()?;

        info!(
            "Partitioned {} original images (seed {}): train={} val={} test={}",
            n_original,
            self.config.seed,
            partitions.train.len(),
            partitions.val.len(),
            partitions.test.len()
        );
        Ok(partitions)
    }
}

/// Remove `round(fraction * n)` samples from the front of the (shuffled) label
/// groups, apportioned across labels by largest remainder.
fn take_stratified(groups: &mut BTreeMap<Label, Vec<Sample>>, fraction: f64) -> Vec<Sample> {
    let sizes: Vec<(Label, usize)> = groups.iter().map(|(l, g)| (*l, g.len())).collect();
    let quotas = apportion(&sizes, fraction);

    let mut taken = Vec::new();
    for (label, quota) in quotas {
        if let Some(group) = groups.get_mut(&label) {
            let quota = quota.min(group.len());
            taken.extend(group.drain(..quota));
        }
    }
    taken
}

/// Largest-remainder apportionment: the quotas sum to `round(fraction * total)`
/// and each is within one unit of `fraction * size`.
fn apportion(sizes: &[(Label, usize)], fraction: f64) -> Vec<(Label, usize)> {
    let total: usize = sizes.iter().map(|(_, n)| n).sum();
    let target = ((total as f64) * fraction).round() as usize;

    let mut quotas: Vec<(Label, usize, f64)> = sizes
        .iter()
        .map(|&(label, n)| {
            let exact = n as f64 * fraction;
            let floor = (exact.floor() as usize).min(n);
            (label, floor, exact - floor as f64)
        })
        .collect();

    let assigned: usize = quotas.iter().map(|q| q.1).sum();
    let mut extra = target.saturating_sub(assigned);

    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|&a, &b| {
        quotas[b]
            .2
            .partial_cmp(&quotas[a].2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(quotas[a].0.cmp(&quotas[b].0))
    });
    for idx in order {
        if extra == 0 {
            break;
        }
        let capacity = sizes[idx].1;
        if quotas[idx].1 < capacity {
            quotas[idx].1 += 1;
            extra -= 1;
        }
    }

    quotas.into_iter().map(|(label, q, _)| (label, q)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(pos: usize, neg: usize, aug_pos: usize, aug_neg: usize) -> Catalog {
        let mut samples = Vec::new();
        for i in 0..pos {
            samples.push(Sample::new(
                format!("raw/Original/Cancer/img_{:04}.png", i),
                Label::Positive,
                Provenance::Original,
            ));
        }
        for i in 0..neg {
            samples.push(Sample::new(
                format!("raw/Original/Non-Cancer/img_{:04}.png", i),
                Label::Negative,
                Provenance::Original,
            ));
        }
        for i in 0..aug_pos {
            samples.push(Sample::new(
                format!("raw/Augmented/Cancer/aug_{:04}.png", i),
                Label::Positive,
                Provenance::Augmented,
            ));
        }
        for i in 0..aug_neg {
            samples.push(Sample::new(
                format!("raw/Augmented/Non-Cancer/aug_{:04}.png", i),
                Label::Negative,
                Provenance::Augmented,
            ));
        }
        Catalog::new(samples)
    }

    fn partitioner(test: f64, val: f64, seed: u64) -> DatasetPartitioner {
        DatasetPartitioner::new(SplitConfig::new(test, val, seed).unwrap()).unwrap()
    }

    fn paths(p: &Partition) -> Vec<PathBuf> {
        p.samples.iter().map(|s| s.path.clone()).collect()
    }

    #[test]
    fn test_split_config_validation() {
        assert!(SplitConfig::new(0.15, 0.15, 42).is_ok());
        assert!(SplitConfig::new(0.5, 0.5, 42).is_err());
        assert!(SplitConfig::new(0.0, 0.2, 42).is_err());
        assert!(SplitConfig::new(0.2, 1.0, 42).is_err());
        assert!(SplitConfig::new(-0.1, 0.2, 42).is_err());
        assert!(SplitConfig::new(f64::NAN, 0.2, 42).is_err());
        assert!(matches!(
            SplitConfig::new(0.6, 0.4, 1),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_effective_val_fraction() {
        let config = SplitConfig::new(0.2, 0.2, 0).unwrap();
        assert!((config.effective_val_fraction() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_reference_catalog_counts() {
        // 60 positive / 40 negative originals plus 50 augmented positives
        let parts = partitioner(0.15, 0.15, 42)
            .partition(&catalog(60, 40, 50, 0))
            .unwrap();

        assert_eq!(parts.test.len(), 15);
        assert_eq!(parts.test.count(Label::Positive), 9);
        assert_eq!(parts.test.count(Label::Negative), 6);

        assert_eq!(parts.val.len(), 15);
        assert_eq!(parts.val.count(Label::Positive), 9);
        assert_eq!(parts.val.count(Label::Negative), 6);

        assert_eq!(parts.train.len(), 120);
        assert_eq!(parts.train.augmented_count(), 50);
        assert_eq!(parts.train.len() - parts.train.augmented_count(), 70);
        assert_eq!(parts.val.augmented_count(), 0);
        assert_eq!(parts.test.augmented_count(), 0);
    }

    #[test]
    fn test_same_seed_same_membership() {
        let cat = catalog(37, 91, 20, 5);
        let a = partitioner(0.2, 0.1, 7).partition(&cat).unwrap();
        let b = partitioner(0.2, 0.1, 7).partition(&cat).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_traversal_order_does_not_matter() {
        let cat = catalog(30, 50, 10, 0);
        let mut reversed = cat.clone();
        reversed.samples.reverse();

        let p = partitioner(0.15, 0.15, 3);
        let a = p.partition(&cat).unwrap();
        let b = p.partition(&reversed).unwrap();
        assert_eq!(paths(&a.test), paths(&b.test));
        assert_eq!(paths(&a.val), paths(&b.val));
    }

    #[test]
    fn test_different_seed_different_membership() {
        let cat = catalog(100, 100, 0, 0);
        let a = partitioner(0.2, 0.2, 1).partition(&cat).unwrap();
        let b = partitioner(0.2, 0.2, 2).partition(&cat).unwrap();
        assert_ne!(paths(&a.test), paths(&b.test));
    }

    #[test]
    fn test_partitions_cover_originals_exactly_once() {
        for (pos, neg, test, val) in [(13, 7, 0.3, 0.2), (1, 1, 0.1, 0.1), (250, 3, 0.15, 0.15)] {
            let cat = catalog(pos, neg, 4, 4);
            let parts = partitioner(test, val, 11).partition(&cat).unwrap();
            parts.verify().unwrap();

            let mut all: Vec<PathBuf> = parts
                .iter()
                .flat_map(|p| p.samples.iter())
                .filter(|s| s.is_original())
                .map(|s| s.path.clone())
                .collect();
            all.sort();
            let mut expected: Vec<PathBuf> = cat.original().map(|s| s.path.clone()).collect();
            expected.sort();
            assert_eq!(all, expected);
        }
    }

    #[test]
    fn test_fractions_within_rounding() {
        let cat = catalog(123, 456, 0, 0);
        let n = 579.0;
        let parts = partitioner(0.1, 0.25, 5).partition(&cat).unwrap();
        assert!((parts.test.len() as f64 - 0.1 * n).abs() <= 1.0);
        assert!((parts.val.len() as f64 - 0.25 * n).abs() <= 1.0);
    }

    #[test]
    fn test_stratification_within_one_unit() {
        let (pos, neg) = (47usize, 153usize);
        let parts = partitioner(0.15, 0.15, 9)
            .partition(&catalog(pos, neg, 0, 0))
            .unwrap();
        let share = pos as f64 / (pos + neg) as f64;

        for p in parts.iter() {
            let expected = share * p.len() as f64;
            let actual = p.count(Label::Positive) as f64;
            assert!(
                (actual - expected).abs() <= 1.0,
                "{}: {} positives, expected about {:.2}",
                p.split,
                actual,
                expected
            );
        }
    }

    #[test]
    fn test_augmented_only_catalog_is_degenerate() {
        let err = partitioner(0.15, 0.15, 42)
            .partition(&catalog(0, 0, 10, 10))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DegenerateDataset(_)));
    }

    #[test]
    fn test_verify_detects_leakage() {
        let mut parts = partitioner(0.15, 0.15, 42)
            .partition(&catalog(20, 20, 5, 0))
            .unwrap();
        let leaked = parts.train.samples.last().cloned().unwrap();
        assert_eq!(leaked.provenance, Provenance::Augmented);
        parts.test.samples.push(leaked);
        assert!(parts.verify().is_err());
    }

    #[test]
    fn test_apportion_sums_to_target() {
        let sizes = [(Label::Negative, 51), (Label::Positive, 34)];
        let quotas = apportion(&sizes, 0.15 / 0.85);
        let total: usize = quotas.iter().map(|q| q.1).sum();
        assert_eq!(total, 15);
        assert_eq!(quotas, vec![(Label::Negative, 9), (Label::Positive, 6)]);
    }
}
