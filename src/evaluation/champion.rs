//! Champion selection over evaluation reports
//!
//! Ranks candidates by positive-class recall, then positive-class F1, then
//! report path. An optional precision floor removes candidates first.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::report::EvaluationReport;
use crate::model::ModelKind;
use crate::utils::error::{PipelineError, Result};
use crate::utils::write_atomic;

/// Ranking view of one report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub report_path: PathBuf,
    pub model_path: String,
    pub model_name: ModelKind,
    pub threshold: f64,
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
}

impl Candidate {
    pub fn from_report(report_path: &Path, report: &EvaluationReport) -> Self {
        let positive = report.positive();
        Self {
            report_path: report_path.to_path_buf(),
            model_path: report.model_path.clone(),
            model_name: report.model_name,
            threshold: report.threshold,
            recall: positive.recall,
            precision: positive.precision,
            f1: positive.f1,
        }
    }

    fn rank(&self, other: &Self) -> Ordering {
        other
            .recall
            .total_cmp(&self.recall)
            .then_with(|| other.f1.total_cmp(&self.f1))
            .then_with(|| self.report_path.cmp(&other.report_path))
    }
}

/// The promotion decision, written as `champion.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionRecord {
    pub champion: Candidate,
    pub min_precision: Option<f64>,
    /// Every eligible candidate, best first
    pub ranking: Vec<Candidate>,
    /// Reports removed by the precision floor
    pub rejected: Vec<Candidate>,
    pub selected_at: String,
}

impl ChampionRecord {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())?;
        info!("Champion record saved to {:?}", path);
        Ok(())
    }
}

/// Pick the champion among `(report path, report)` pairs
pub fn select_champion(
    reports: &[(PathBuf, EvaluationReport)],
    min_precision: Option<f64>,
) -> Result<ChampionRecord> {
    if reports.is_empty() {
        return Err(PipelineError::Configuration(
            "no evaluation reports to choose from".to_string(),
        ));
    }
    if let Some(floor) = min_precision {
        if !(0.0..=1.0).contains(&floor) {
            return Err(PipelineError::Configuration(format!(
                "min_precision must lie in [0, 1], got {}",
                floor
            )));
        }
    }

    let (mut ranking, rejected): (Vec<Candidate>, Vec<Candidate>) = reports
        .iter()
        .map(|(path, report)| Candidate::from_report(path, report))
        .partition(|c| min_precision.map_or(true, |floor| c.precision >= floor));
    ranking.sort_by(Candidate::rank);

    let champion = ranking.first().cloned().ok_or_else(|| {
        PipelineError::Configuration(format!(
            "none of {} reports reaches a positive precision of {:.3}",
            reports.len(),
            min_precision.unwrap_or(0.0)
        ))
    })?;

    info!(
        "Champion: {} ({}) at threshold {:.3}, recall {:.4}, precision {:.4}",
        champion.model_path, champion.model_name, champion.threshold, champion.recall, champion.precision
    );
    Ok(ChampionRecord {
        champion,
        min_precision,
        ranking,
        rejected,
        selected_at: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Label, LabelScheme};

    use Label::{Negative as N, Positive as P};

    fn report(name: &str, truth: &[Label], scores: &[f32]) -> (PathBuf, EvaluationReport) {
        let samples = truth
            .iter()
            .enumerate()
            .map(|(i, &l)| (PathBuf::from(format!("{i}.png")), l))
            .collect();
        let report = EvaluationReport::from_scores(
            Path::new(&format!("models/{name}.bin")),
            ModelKind::Baseline,
            0.5,
            &LabelScheme::default(),
            samples,
            scores,
            0,
        );
        (PathBuf::from(format!("reports/{name}.json")), report)
    }

    #[test]
    fn test_highest_recall_wins() {
        let truth = [P, P, N, N];
        let reports = vec![
            report("cautious", &truth, &[0.9, 0.1, 0.1, 0.1]),
            report("eager", &truth, &[0.9, 0.8, 0.7, 0.1]),
        ];
        let record = select_champion(&reports, None).unwrap();
        assert_eq!(record.champion.model_path, "models/eager.bin");
        assert_eq!(record.ranking.len(), 2);
    }

    #[test]
    fn test_tie_broken_by_f1_then_path() {
        let truth = [P, P, N, N];
        let reports = vec![
            // recall 1.0, precision 0.5
            report("b", &truth, &[0.9, 0.9, 0.9, 0.9]),
            // recall 1.0, precision 1.0
            report("c", &truth, &[0.9, 0.9, 0.1, 0.1]),
            report("a", &truth, &[0.9, 0.9, 0.1, 0.1]),
        ];
        let record = select_champion(&reports, None).unwrap();
        assert_eq!(record.champion.report_path, PathBuf::from("reports/a.json"));
        assert_eq!(record.ranking[1].report_path, PathBuf::from("reports/c.json"));
    }

    #[test]
    fn test_precision_floor() {
        let truth = [P, P, N, N];
        let reports = vec![
            report("eager", &truth, &[0.9, 0.9, 0.9, 0.9]),
            report("cautious", &truth, &[0.9, 0.1, 0.1, 0.1]),
        ];
        let record = select_champion(&reports, Some(0.9)).unwrap();
        assert_eq!(record.champion.model_path, "models/cautious.bin");
        assert_eq!(record.rejected.len(), 1);

        let err = select_champion(&reports[..1], Some(0.9)).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_no_reports() {
        assert!(select_champion(&[], None).is_err());
    }
}
