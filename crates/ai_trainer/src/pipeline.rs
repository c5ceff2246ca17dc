//! Train/export/verify pipeline
//!
//! One parameterized run covers both the SMOTE-balanced and the
//! class-weighted trainer:
//!
//! ```text
//! Loaded -> Split -> (Balanced) -> Trained -> Evaluated -> Exported -> Verified
//! ```
//!
//! The split always happens before any oversampling, so synthetic rows never
//! reach the test side. A failure stops the run and is reported with the
//! stage it happened in. The artifact only appears at its destination once
//! verification has passed.

use chrono::Utc;
use pronounce_ai_core::{feature_name, CLASS_COUNT, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::dataset::{class_counts, Dataset};
use crate::errors::{PipelineError, Stage, TrainerError};
use crate::export::{build_artifact, StagedArtifact};
use crate::metrics::Evaluation;
use crate::quality::{self, QualityPolicy};
use crate::report::{
    ArtifactSummary, BalancingSummary, DatasetSummary, FeatureImportance, ForestSummary,
    SplitSummary, TrainingReport,
};
use crate::smote::{SampleOrigin, Smote};
use crate::split::{stratified_split, TrainTestSplit};
use crate::trainer::{ClassWeighting, ForestConfig, RandomForest, RandomForestTrainer};
use crate::verify::{verify_export, VerificationSummary};

/// How class imbalance is compensated on the training split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BalancingStrategy {
    /// Oversample minority classes with SMOTE
    Smote { k_neighbors: usize },
    /// Weight samples inversely to their class frequency
    ClassWeight,
}

impl fmt::Display for BalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalancingStrategy::Smote { k_neighbors } => write!(f, "smote, k={k_neighbors}"),
            BalancingStrategy::ClassWeight => f.write_str("class-weight"),
        }
    }
}

/// Named parameter sets
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// SMOTE, 200 trees of depth 15
    #[default]
    Balanced,
    /// Class weighting, 100 trees of depth 10
    Baseline,
}

/// Everything a training run needs besides the data
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    pub test_ratio: f64,
    pub seed: u64,
    pub strategy: BalancingStrategy,
    pub forest: ForestConfig,
    pub quality_policy: QualityPolicy,
    /// Leading test rows re-scored through the exported artifact
    pub verify_rows: usize,
    pub top_features: usize,
}

impl PipelineConfig {
    pub fn from_preset(preset: Preset, output: impl Into<PathBuf>) -> Self {
        match preset {
            Preset::Balanced => Self::balanced(output),
            Preset::Baseline => Self::baseline(output),
        }
    }

    /// SMOTE k=5; 200 trees, depth 15, split 5, leaf 2
    pub fn balanced(output: impl Into<PathBuf>) -> Self {
        Self {
            input: None,
            output: output.into(),
            test_ratio: 0.2,
            seed: 42,
            strategy: BalancingStrategy::Smote { k_neighbors: 5 },
            forest: ForestConfig {
                n_trees: 200,
                max_depth: 15,
                min_samples_split: 5,
                min_samples_leaf: 2,
                max_features: None,
                class_weighting: ClassWeighting::Uniform,
                n_jobs: None,
                seed: 42,
            },
            quality_policy: QualityPolicy::default(),
            verify_rows: 10,
            top_features: 10,
        }
    }

    /// Balanced class weights; 100 trees, depth 10, split 5, leaf 2
    pub fn baseline(output: impl Into<PathBuf>) -> Self {
        Self {
            strategy: BalancingStrategy::ClassWeight,
            forest: ForestConfig {
                n_trees: 100,
                max_depth: 10,
                class_weighting: ClassWeighting::Balanced,
                ..Self::balanced(PathBuf::new()).forest
            },
            ..Self::balanced(output)
        }
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Reject parameter combinations no run could satisfy
    pub fn validate(&self) -> Result<(), TrainerError> {
        let fail = |msg: String| Err(TrainerError::Config(msg));
        if !(self.test_ratio > 0.0 && self.test_ratio < 1.0) {
            return fail(format!("test_ratio must be in (0, 1), got {}", self.test_ratio));
        }
        if self.forest.n_trees == 0 {
            return fail("n_trees must be at least 1".to_string());
        }
        if self.forest.max_depth == 0 {
            return fail("max_depth must be at least 1".to_string());
        }
        if self.forest.min_samples_split < 2 {
            return fail("min_samples_split must be at least 2".to_string());
        }
        if self.forest.min_samples_leaf == 0 {
            return fail("min_samples_leaf must be at least 1".to_string());
        }
        if self.forest.n_jobs == Some(0) {
            return fail("jobs must be at least 1".to_string());
        }
        if let BalancingStrategy::Smote { k_neighbors: 0 } = self.strategy {
            return fail("k_neighbors must be at least 1".to_string());
        }
        if self.verify_rows == 0 {
            return fail("verify_rows must be at least 1".to_string());
        }
        Ok(())
    }

    /// Forest settings with the class weighting the strategy implies
    fn effective_forest(&self) -> ForestConfig {
        let class_weighting = match self.strategy {
            BalancingStrategy::Smote { .. } => ClassWeighting::Uniform,
            BalancingStrategy::ClassWeight => ClassWeighting::Balanced,
        };
        ForestConfig {
            class_weighting,
            seed: self.seed,
            ..self.forest.clone()
        }
    }
}

/// Products of a successful run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub report: TrainingReport,
    pub forest: RandomForest,
    pub split: TrainTestSplit,
    /// Provenance of every training row, as dataset row ids
    pub training_origins: Vec<SampleOrigin>,
    pub artifact_path: PathBuf,
}

/// Parameterized training run with an explicit stage record
pub struct TrainingPipeline {
    config: PipelineConfig,
    completed: Vec<Stage>,
}

fn at<T>(stage: Stage, result: Result<T, TrainerError>) -> Result<T, PipelineError> {
    result.map_err(|source| PipelineError::new(stage, source))
}

/// Verify a staged artifact and move it onto its destination
///
/// On a verification failure the staged file is dropped and the destination
/// is left untouched.
fn publish_verified<R: AsRef<[f32]>>(
    staged: StagedArtifact,
    forest: &RandomForest,
    rows: &[R],
) -> Result<(VerificationSummary, PathBuf), TrainerError> {
    let verification = verify_export(staged.path(), forest, rows)?;
    debug!(destination = %staged.destination().display(), "Publishing verified artifact");
    let path = staged.persist()?;
    Ok((verification, path))
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            completed: Vec::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stages finished so far, in order
    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    fn advance(&mut self, stage: Stage) {
        info!(stage = %stage, "Stage complete");
        self.completed.push(stage);
    }

    /// Load the configured input file and run every stage
    pub fn run(&mut self) -> Result<TrainingOutcome, PipelineError> {
        let input = at(
            Stage::Loaded,
            self.config
                .input
                .clone()
                .ok_or_else(|| TrainerError::Config("no input path configured".to_string())),
        )?;
        info!(path = %input.display(), "Loading dataset");
        let dataset = at(Stage::Loaded, Dataset::from_csv(&input))?;
        self.run_on(dataset)
    }

    /// Run every stage on an already loaded dataset
    pub fn run_on(&mut self, mut dataset: Dataset) -> Result<TrainingOutcome, PipelineError> {
        self.completed.clear();
        let config = self.config.clone();
        at(Stage::Loaded, config.validate())?;

        // Loaded
        if dataset.feature_count != FEATURE_COUNT {
            return Err(PipelineError::new(
                Stage::Loaded,
                TrainerError::DataLoad(format!(
                    "dataset has {} features, expected {}",
                    dataset.feature_count, FEATURE_COUNT
                )),
            ));
        }
        let non_finite = at(Stage::Loaded, quality::check(&dataset, config.quality_policy))?;
        let value_range = dataset.value_range();
        let replaced_non_finite = if non_finite.is_clean() {
            0
        } else {
            let replaced = dataset.replace_non_finite(0.0);
            warn!(replaced, "Replaced non-finite feature values with 0.0");
            replaced
        };
        let labels = dataset.labels();
        let dataset_summary = DatasetSummary {
            source: config.input.clone(),
            rows: dataset.len(),
            class_counts: dataset.class_counts(),
            quality_policy: config.quality_policy,
            non_finite,
            replaced_non_finite,
            value_range,
        };
        self.advance(Stage::Loaded);

        // Split
        let split = at(
            Stage::Split,
            stratified_split(&labels, CLASS_COUNT, config.test_ratio, config.seed),
        )?;
        let train_features = dataset.feature_rows(&split.train);
        let train_labels: Vec<usize> = split.train.iter().map(|&r| labels[r]).collect();
        let test_features = dataset.feature_rows(&split.test);
        let test_labels: Vec<usize> = split.test.iter().map(|&r| labels[r]).collect();
        let train_counts = class_counts(train_labels.iter().copied(), CLASS_COUNT);
        let split_summary = SplitSummary {
            test_ratio: config.test_ratio,
            seed: config.seed,
            train_rows: split.train_len(),
            test_rows: split.test_len(),
            train_class_counts: train_counts.clone(),
            test_class_counts: class_counts(test_labels.iter().copied(), CLASS_COUNT),
        };
        self.advance(Stage::Split);

        // Balanced
        let (fit_features, fit_labels, origin) = match config.strategy {
            BalancingStrategy::Smote { k_neighbors } => {
                let resampled = at(
                    Stage::Balanced,
                    Smote::new(k_neighbors, config.seed).fit_resample(
                        &train_features,
                        &train_labels,
                        CLASS_COUNT,
                    ),
                )?;
                self.advance(Stage::Balanced);
                (resampled.features, resampled.labels, resampled.origin)
            }
            BalancingStrategy::ClassWeight => {
                let origin = (0..train_labels.len()).map(SampleOrigin::Original).collect();
                (train_features, train_labels, origin)
            }
        };
        let training_origins: Vec<SampleOrigin> = origin
            .iter()
            .map(|o| match *o {
                SampleOrigin::Original(i) => SampleOrigin::Original(split.train[i]),
                SampleOrigin::Synthetic { base, neighbor } => SampleOrigin::Synthetic {
                    base: split.train[base],
                    neighbor: split.train[neighbor],
                },
            })
            .collect();
        let synthetic_rows = training_origins
            .iter()
            .filter(|o| matches!(o, SampleOrigin::Synthetic { .. }))
            .count();
        let counts_after = class_counts(fit_labels.iter().copied(), CLASS_COUNT);

        // Trained
        let forest_config = config.effective_forest();
        let forest = at(
            Stage::Trained,
            RandomForestTrainer::new(forest_config.clone()).train(
                &fit_features,
                &fit_labels,
                CLASS_COUNT,
            ),
        )?;
        self.advance(Stage::Trained);

        // Evaluated
        let evaluation = at(
            Stage::Evaluated,
            forest
                .predict_batch(&test_features)
                .and_then(|predicted| Evaluation::compute(&test_labels, &predicted, CLASS_COUNT)),
        )?;
        let top_features: Vec<FeatureImportance> = forest
            .ranked_importances(config.top_features)
            .into_iter()
            .enumerate()
            .map(|(i, (feature, importance))| FeatureImportance {
                rank: i + 1,
                feature: feature_name(feature),
                importance,
            })
            .collect();
        let importance_sum: f64 = forest.feature_importances().iter().sum();
        info!(
            accuracy = %format!("{:.2}%", evaluation.accuracy_percent()),
            "Evaluated on test split"
        );
        self.advance(Stage::Evaluated);

        // Exported
        let metadata = self.artifact_metadata(&forest_config, fit_labels.len());
        let staged = at(
            Stage::Exported,
            build_artifact(&forest, metadata)
                .and_then(|artifact| StagedArtifact::stage(&artifact, &config.output)),
        )?;
        self.advance(Stage::Exported);

        // Verified
        let check_rows = config.verify_rows.min(test_features.len());
        let graph_hash = staged.graph_hash().to_string();
        let (verification, artifact_path) = at(
            Stage::Verified,
            publish_verified(staged, &forest, &test_features[..check_rows]),
        )?;
        self.advance(Stage::Verified);

        let report = TrainingReport {
            generated_at: Utc::now(),
            trainer_version: crate::VERSION.to_string(),
            stages: self.completed.clone(),
            dataset: dataset_summary,
            split: split_summary,
            balancing: BalancingSummary {
                strategy: config.strategy,
                class_counts_before: train_counts,
                class_counts_after: counts_after,
                synthetic_rows,
                class_weights: forest.class_weights().to_vec(),
            },
            forest: ForestSummary {
                config: forest_config,
                trees: forest.n_trees(),
                total_nodes: forest.ensemble().total_nodes(),
                deepest_tree: forest
                    .ensemble()
                    .trees
                    .iter()
                    .map(|t| t.depth())
                    .max()
                    .unwrap_or(0),
                oob_score: forest.oob_score(),
            },
            evaluation,
            top_features,
            importance_sum,
            artifact: Some(ArtifactSummary {
                path: artifact_path.clone(),
                graph_hash,
            }),
            verification: Some(verification),
        };

        Ok(TrainingOutcome {
            report,
            forest,
            split,
            training_origins,
            artifact_path,
        })
    }

    fn artifact_metadata(&self, forest: &ForestConfig, train_rows: usize) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("strategy".to_string(), self.config.strategy.to_string());
        metadata.insert("seed".to_string(), self.config.seed.to_string());
        metadata.insert("n_trees".to_string(), forest.n_trees.to_string());
        metadata.insert("max_depth".to_string(), forest.max_depth.to_string());
        metadata.insert("test_ratio".to_string(), self.config.test_ratio.to_string());
        metadata.insert("train_rows".to_string(), train_rows.to_string());
        metadata.insert("feature_count".to_string(), FEATURE_COUNT.to_string());
        metadata.insert("trained_at".to_string(), Utc::now().to_rfc3339());
        metadata
    }
}
