//! Pronunciation classifier trainer
//!
//! Offline tooling that turns labelled acoustic feature CSVs into a verified
//! Random Forest artifact for the on-device scorer, plus the min/max bounds
//! report used for feature normalization.

pub mod cart;
pub mod config;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod export;
pub mod metrics;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod smote;
pub mod split;
pub mod stats;
pub mod trainer;
pub mod verify;

pub use config::{FileConfig, StrategyKind, TrainOverrides};
pub use dataset::{Dataset, NonFiniteCounts, Sample};
pub use deterministic::{derive_seed, SplitTieBreaker};
pub use errors::{PipelineError, Stage, TrainerError};
pub use export::{build_artifact, StagedArtifact};
pub use metrics::{ConfusionMatrix, Evaluation};
pub use pipeline::{BalancingStrategy, PipelineConfig, Preset, TrainingOutcome, TrainingPipeline};
pub use quality::QualityPolicy;
pub use report::TrainingReport;
pub use smote::{SampleOrigin, Smote};
pub use split::{stratified_split, TrainTestSplit};
pub use stats::MinMaxReport;
pub use trainer::{ClassWeighting, ForestConfig, RandomForest, RandomForestTrainer};
pub use verify::{verify_export, VerificationSummary};

/// Run the full train/export/verify pipeline on the configured input.
pub fn run_pipeline(config: PipelineConfig) -> Result<TrainingOutcome, PipelineError> {
    TrainingPipeline::new(config).run()
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
