//! Structured training report
//!
//! Everything a run computes is collected here. The report renders to the
//! console through `Display`, serializes to JSON for tooling, and is what
//! tests assert on.

use chrono::{DateTime, Utc};
use pronounce_ai_core::CLASS_NAMES;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::dataset::NonFiniteCounts;
use crate::errors::{Stage, TrainerError};
use crate::metrics::{AveragedMetrics, ClassMetrics, Evaluation};
use crate::pipeline::BalancingStrategy;
use crate::quality::QualityPolicy;
use crate::trainer::ForestConfig;
use crate::verify::VerificationSummary;

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub source: Option<PathBuf>,
    pub rows: usize,
    pub class_counts: Vec<usize>,
    pub quality_policy: QualityPolicy,
    pub non_finite: NonFiniteCounts,
    /// Non-finite values replaced by 0.0 before training
    pub replaced_non_finite: usize,
    pub value_range: Option<(f32, f32)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub test_ratio: f64,
    pub seed: u64,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_class_counts: Vec<usize>,
    pub test_class_counts: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalancingSummary {
    pub strategy: BalancingStrategy,
    pub class_counts_before: Vec<usize>,
    pub class_counts_after: Vec<usize>,
    pub synthetic_rows: usize,
    pub class_weights: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForestSummary {
    pub config: ForestConfig,
    pub trees: usize,
    pub total_nodes: usize,
    pub deepest_tree: usize,
    pub oob_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub rank: usize,
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub path: PathBuf,
    pub graph_hash: String,
}

/// Outcome of one training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub generated_at: DateTime<Utc>,
    pub trainer_version: String,
    pub stages: Vec<Stage>,
    pub dataset: DatasetSummary,
    pub split: SplitSummary,
    pub balancing: BalancingSummary,
    pub forest: ForestSummary,
    pub evaluation: Evaluation,
    pub top_features: Vec<FeatureImportance>,
    pub importance_sum: f64,
    pub artifact: Option<ArtifactSummary>,
    pub verification: Option<VerificationSummary>,
}

impl TrainingReport {
    /// Overall test accuracy in percent
    pub fn accuracy_percent(&self) -> f64 {
        self.evaluation.accuracy_percent()
    }

    pub fn to_json(&self) -> Result<String, TrainerError> {
        serde_json::to_string_pretty(self)
            .map_err(|err| TrainerError::Export(format!("cannot serialize report: {err}")))
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<(), TrainerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn rule(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    let line = "=".repeat(60);
    writeln!(f, "\n{line}\n{title}\n{line}")
}

const NAME_WIDTH: usize = 17;

fn metrics_row(f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>w$} {:>9.3} {:>9.3} {:>9.3} {:>9}",
        name,
        m.precision,
        m.recall,
        m.f1,
        m.support,
        w = NAME_WIDTH
    )
}

fn average_row(f: &mut fmt::Formatter<'_>, name: &str, m: &AveragedMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>w$} {:>9.3} {:>9.3} {:>9.3} {:>9}",
        name,
        m.precision,
        m.recall,
        m.f1,
        m.support,
        w = NAME_WIDTH
    )
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.dataset;
        rule(f, &format!("Training Random Forest ({})", self.balancing.strategy))?;

        writeln!(f, "\nOriginal dataset:")?;
        writeln!(f, "  Total: {}", d.rows)?;
        for (class, &count) in d.class_counts.iter().enumerate() {
            let name = CLASS_NAMES.get(class).copied().unwrap_or("?");
            writeln!(f, "  {}: {} ({:.1}%)", name, count, percent(count, d.rows))?;
        }
        if let Some((lo, hi)) = d.value_range {
            writeln!(f, "  Feature range: [{lo:.2}, {hi:.2}]")?;
        }
        if !d.non_finite.is_clean() {
            writeln!(
                f,
                "  WARNING: {} NaN and {} Inf values ({} replaced)",
                d.non_finite.nan, d.non_finite.inf, d.replaced_non_finite
            )?;
        }

        let s = &self.split;
        writeln!(
            f,
            "\nSplit ({:.0}% train, {:.0}% test, seed {}):",
            (1.0 - s.test_ratio) * 100.0,
            s.test_ratio * 100.0,
            s.seed
        )?;
        writeln!(f, "  Train: {} samples {:?}", s.train_rows, s.train_class_counts)?;
        writeln!(f, "  Test: {} samples {:?}", s.test_rows, s.test_class_counts)?;

        let b = &self.balancing;
        match b.strategy {
            BalancingStrategy::Smote { .. } => {
                writeln!(f, "\nAfter SMOTE:")?;
                let counts: Vec<String> = b
                    .class_counts_after
                    .iter()
                    .enumerate()
                    .map(|(c, n)| format!("Class {c}: {n}"))
                    .collect();
                writeln!(f, "  Train - {}", counts.join(", "))?;
                writeln!(f, "  Synthetic rows: {}", b.synthetic_rows)?;
            }
            BalancingStrategy::ClassWeight => {
                let weights: Vec<String> = b
                    .class_weights
                    .iter()
                    .enumerate()
                    .map(|(c, w)| format!("{c}: {w:.3}"))
                    .collect();
                writeln!(f, "\nClass weights: {}", weights.join(", "))?;
            }
        }

        let forest = &self.forest;
        write!(
            f,
            "\nForest: {} trees, {} nodes, deepest tree {}",
            forest.trees, forest.total_nodes, forest.deepest_tree
        )?;
        match forest.oob_score {
            Some(score) => writeln!(f, ", out-of-bag accuracy {:.2}%", score * 100.0)?,
            None => writeln!(f)?,
        }

        let e = &self.evaluation;
        rule(f, "EVALUATION ON TEST SET")?;
        writeln!(f, "\nOverall Accuracy: {:.2}%", e.accuracy_percent())?;

        writeln!(f, "\nClassification Report:")?;
        writeln!(
            f,
            "{:>w$} {:>9} {:>9} {:>9} {:>9}\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            w = NAME_WIDTH
        )?;
        for (class, m) in e.per_class.iter().enumerate() {
            metrics_row(f, CLASS_NAMES.get(class).copied().unwrap_or("?"), m)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>w$} {:>9} {:>9} {:>9.3} {:>9}",
            "accuracy",
            "",
            "",
            e.accuracy,
            e.confusion.total(),
            w = NAME_WIDTH
        )?;
        average_row(f, "macro avg", &e.macro_avg)?;
        average_row(f, "weighted avg", &e.weighted_avg)?;

        if e.confusion.n_classes == 2 {
            let c = &e.confusion;
            writeln!(f, "\nConfusion Matrix:")?;
            writeln!(f, "                 Predicted")?;
            writeln!(f, "                 0      1")?;
            writeln!(f, "Actual 0 (Mis)  {:3}   {:3}", c.get(0, 0), c.get(0, 1))?;
            writeln!(f, "Actual 1 (Cor)  {:3}   {:3}", c.get(1, 0), c.get(1, 1))?;
        }

        writeln!(f, "\nPer-class accuracy:")?;
        for (class, acc) in e.per_class_accuracy().iter().enumerate() {
            let name = CLASS_NAMES.get(class).copied().unwrap_or("?");
            writeln!(f, "  {name}: {acc:.1}%")?;
        }

        writeln!(f, "\nTop {} most important features:", self.top_features.len())?;
        for feat in &self.top_features {
            writeln!(f, "  {}. {}: {:.4}", feat.rank, feat.feature, feat.importance)?;
        }

        if let Some(artifact) = &self.artifact {
            rule(f, "EXPORT")?;
            writeln!(f, "\nModel saved: {}", artifact.path.display())?;
            writeln!(f, "Graph hash: {}", artifact.graph_hash)?;
        }
        if let Some(v) = &self.verification {
            writeln!(f, "\nExported predictions:  {:?}", v.exported)?;
            writeln!(f, "In-memory predictions: {:?}", v.expected)?;
            writeln!(f, "Match: {}", v.exported == v.expected)?;
        }

        Ok(())
    }
}
