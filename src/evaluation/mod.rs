//! Evaluation: checkpoint scoring, reports and champion selection

pub mod champion;
pub mod harness;
pub mod report;

pub use champion::{select_champion, Candidate, ChampionRecord};
pub use harness::{EvaluationHarness, EvaluationRequest, Prediction};
pub use report::{ClassificationReport, EvaluationReport, SamplePrediction};
