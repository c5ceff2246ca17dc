use pronounce_ai_core::CoreError;
use std::fmt;
use thiserror::Error;

/// Errors returned by the trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("data load error: {0}")]
    DataLoad(String),

    #[error("data quality error: {nan} NaN and {inf} Inf values in the feature matrix")]
    DataQuality { nan: usize, inf: usize },

    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    #[error("split error: {0}")]
    Split(String),

    #[error("oversampling error: class {class} has {available} samples, need at least {required} for k={k_neighbors}")]
    Oversampling {
        class: usize,
        available: usize,
        required: usize,
        k_neighbors: usize,
    },

    #[error("export verification failed: {mismatches} of {checked} predictions differ (exported {exported:?}, in-memory {expected:?})")]
    ExportVerification {
        checked: usize,
        mismatches: usize,
        exported: Vec<i64>,
        expected: Vec<i64>,
    },

    #[error("training error: {0}")]
    Training(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stages of a training run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loaded,
    Split,
    Balanced,
    Trained,
    Evaluated,
    Exported,
    Verified,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loaded => "load",
            Stage::Split => "split",
            Stage::Balanced => "balance",
            Stage::Trained => "train",
            Stage::Evaluated => "evaluate",
            Stage::Exported => "export",
            Stage::Verified => "verify",
        };
        f.write_str(name)
    }
}

/// A pipeline failure tagged with the stage that produced it.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: TrainerError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: TrainerError) -> Self {
        Self { stage, source }
    }
}
