//! Sample, label and provenance types shared by every pipeline stage

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::error::{PipelineError, Result};

/// Binary ground-truth label.
///
/// `class_index` is the one mapping between labels and model targets:
/// Negative is class 0 and Positive is class 1, so a model score is the
/// probability of the positive class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    Negative,
    Positive,
}

impl Label {
    /// Both labels in class-index order
    pub const ALL: [Label; 2] = [Label::Negative, Label::Positive];

    pub fn class_index(self) -> usize {
        match self {
            Label::Negative => 0,
            Label::Positive => 1,
        }
    }

    pub fn from_class_index(index: usize) -> Option<Label> {
        match index {
            0 => Some(Label::Negative),
            1 => Some(Label::Positive),
            _ => None,
        }
    }

    /// Training target for binary cross-entropy
    pub fn target(self) -> f32 {
        self.class_index() as f32
    }

    /// Binarize a positive-class score: strictly above the threshold is Positive
    pub fn from_score(score: f32, threshold: f64) -> Label {
        if f64::from(score) > threshold {
            Label::Positive
        } else {
            Label::Negative
        }
    }
}

/// Directory names that carry each label on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelScheme {
    pub positive: String,
    pub negative: String,
}

impl Default for LabelScheme {
    fn default() -> Self {
        Self {
            positive: "Cancer".to_string(),
            negative: "Non-Cancer".to_string(),
        }
    }
}

impl LabelScheme {
    pub fn new(positive: impl Into<String>, negative: impl Into<String>) -> Result<Self> {
        let scheme = Self {
            positive: positive.into(),
            negative: negative.into(),
        };
        scheme.validate()?;
        Ok(scheme)
    }

    pub fn validate(&self) -> Result<()> {
        if self.positive.trim().is_empty() || self.negative.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "label directory names must not be empty".to_string(),
            ));
        }
        if self.positive == self.negative {
            return Err(PipelineError::Configuration(format!(
                "positive and negative labels share the directory name '{}'",
                self.positive
            )));
        }
        Ok(())
    }

    /// Label for a directory name, exact match
    pub fn label_for_dir(&self, name: &str) -> Option<Label> {
        if name == self.positive {
            Some(Label::Positive)
        } else if name == self.negative {
            Some(Label::Negative)
        } else {
            None
        }
    }

    pub fn dir_name(&self, label: Label) -> &str {
        match label {
            Label::Positive => &self.positive,
            Label::Negative => &self.negative,
        }
    }
}

/// Whether an image was captured or synthesized from a captured one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    Original,
    Augmented,
}

impl Provenance {
    /// Provenance of a top-level subtree name ("Original Dataset", "augmented_v2", ...)
    pub fn from_subtree(name: &str) -> Option<Provenance> {
        let lower = name.to_lowercase();
        if lower.starts_with("original") {
            Some(Provenance::Original)
        } else if lower.starts_with("augmented") {
            Some(Provenance::Augmented)
        } else {
            None
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Original => write!(f, "original"),
            Provenance::Augmented => write!(f, "augmented"),
        }
    }
}

/// One discovered image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    pub label: Label,
    pub provenance: Provenance,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>, label: Label, provenance: Provenance) -> Self {
        Self {
            path: path.into(),
            label,
            provenance,
        }
    }

    pub fn is_original(&self) -> bool {
        self.provenance == Provenance::Original
    }
}

/// Partition names, also the directory names of the persisted layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitName {
    Train,
    Val,
    Test,
}

impl SplitName {
    pub const ALL: [SplitName; 3] = [SplitName::Train, SplitName::Val, SplitName::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::Val => "val",
            SplitName::Test => "test",
        }
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
