//! Training configuration from TOML files and command-line overrides
//!
//! Values resolve in three layers: the preset, then the optional TOML file,
//! then command-line flags.
//!
//! ```toml
//! preset = "baseline"
//!
//! [data]
//! input = "data/features.csv"
//! quality_policy = "warn"
//!
//! [split]
//! test_ratio = 0.2
//! seed = 42
//!
//! [forest]
//! n_trees = 100
//! max_depth = 10
//! jobs = 4
//!
//! [balancing]
//! strategy = "smote"
//! k_neighbors = 5
//!
//! [export]
//! output = "models/random_forest.json"
//! report = "models/report.json"
//! verify_rows = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::TrainerError;
use crate::pipeline::{BalancingStrategy, PipelineConfig, Preset};
use crate::quality::QualityPolicy;

/// Default SMOTE neighbour count when a strategy switch does not name one
pub const DEFAULT_K_NEIGHBORS: usize = 5;

/// Balancing strategy selector without parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Smote,
    ClassWeight,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSection {
    pub input: Option<PathBuf>,
    pub quality_policy: Option<QualityPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitSection {
    pub test_ratio: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForestSection {
    pub n_trees: Option<usize>,
    pub max_depth: Option<usize>,
    pub min_samples_split: Option<usize>,
    pub min_samples_leaf: Option<usize>,
    pub max_features: Option<usize>,
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalancingSection {
    pub strategy: Option<StrategyKind>,
    pub k_neighbors: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportSection {
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub verify_rows: Option<usize>,
    pub top_features: Option<usize>,
}

/// Contents of a training TOML file; every key is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub preset: Option<Preset>,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub split: SplitSection,
    #[serde(default)]
    pub forest: ForestSection,
    #[serde(default)]
    pub balancing: BalancingSection,
    #[serde(default)]
    pub export: ExportSection,
}

impl FileConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TrainerError> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            TrainerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, TrainerError> {
        toml::from_str(content)
            .map_err(|e| TrainerError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// One layer of optional training settings
///
/// Doubles as the `train` subcommand's flags.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct TrainOverrides {
    /// Input CSV dataset path
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Destination path of the exported artifact
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Parameter preset
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Class-imbalance strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyKind>,

    /// Fraction of rows held out for testing
    #[arg(long)]
    pub test_ratio: Option<f64>,

    /// Random seed for split, oversampling and bootstrap
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of trees
    #[arg(long)]
    pub trees: Option<usize>,

    /// Maximum tree depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Minimum rows to split a node
    #[arg(long)]
    pub min_samples_split: Option<usize>,

    /// Minimum rows per leaf
    #[arg(long)]
    pub min_samples_leaf: Option<usize>,

    /// Features examined per split (default: sqrt of feature count)
    #[arg(long)]
    pub max_features: Option<usize>,

    /// SMOTE neighbour count
    #[arg(long)]
    pub k_neighbors: Option<usize>,

    /// Worker threads for tree fitting (default: all cores)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Test rows re-scored through the exported artifact
    #[arg(long)]
    pub verify_rows: Option<usize>,

    /// Number of features listed in the importance ranking
    #[arg(long)]
    pub top_features: Option<usize>,

    /// Handling of NaN and infinite feature values
    #[arg(long, value_enum)]
    pub quality_policy: Option<QualityPolicy>,

    /// Write the training report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl From<FileConfig> for TrainOverrides {
    fn from(file: FileConfig) -> Self {
        Self {
            input: file.data.input,
            output: file.export.output,
            preset: file.preset,
            strategy: file.balancing.strategy,
            test_ratio: file.split.test_ratio,
            seed: file.split.seed,
            trees: file.forest.n_trees,
            max_depth: file.forest.max_depth,
            min_samples_split: file.forest.min_samples_split,
            min_samples_leaf: file.forest.min_samples_leaf,
            max_features: file.forest.max_features,
            k_neighbors: file.balancing.k_neighbors,
            jobs: file.forest.jobs,
            verify_rows: file.export.verify_rows,
            top_features: file.export.top_features,
            quality_policy: file.data.quality_policy,
            report: file.export.report,
        }
    }
}

impl TrainOverrides {
    /// Apply every set value of this layer onto `config`
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(input) = &self.input {
            config.input = Some(input.clone());
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(ratio) = self.test_ratio {
            config.test_ratio = ratio;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(trees) = self.trees {
            config.forest.n_trees = trees;
        }
        if let Some(depth) = self.max_depth {
            config.forest.max_depth = depth;
        }
        if let Some(split) = self.min_samples_split {
            config.forest.min_samples_split = split;
        }
        if let Some(leaf) = self.min_samples_leaf {
            config.forest.min_samples_leaf = leaf;
        }
        if let Some(max_features) = self.max_features {
            config.forest.max_features = Some(max_features);
        }
        if let Some(jobs) = self.jobs {
            config.forest.n_jobs = Some(jobs);
        }
        if let Some(rows) = self.verify_rows {
            config.verify_rows = rows;
        }
        if let Some(top) = self.top_features {
            config.top_features = top;
        }
        if let Some(policy) = self.quality_policy {
            config.quality_policy = policy;
        }

        let current_k = match config.strategy {
            BalancingStrategy::Smote { k_neighbors } => Some(k_neighbors),
            BalancingStrategy::ClassWeight => None,
        };
        config.strategy = match (self.strategy, self.k_neighbors) {
            (Some(StrategyKind::ClassWeight), _) => BalancingStrategy::ClassWeight,
            (Some(StrategyKind::Smote), k) => BalancingStrategy::Smote {
                k_neighbors: k.or(current_k).unwrap_or(DEFAULT_K_NEIGHBORS),
            },
            (None, Some(k)) if current_k.is_some() => BalancingStrategy::Smote { k_neighbors: k },
            (None, Some(_)) => {
                warn!("k_neighbors has no effect with the class-weight strategy");
                config.strategy
            }
            (None, None) => config.strategy,
        };
    }
}

/// A fully resolved `train` invocation
#[derive(Debug, Clone)]
pub struct ResolvedTrain {
    pub pipeline: PipelineConfig,
    pub report: Option<PathBuf>,
}

/// Merge preset, file and command-line layers into one configuration
pub fn resolve(file: Option<FileConfig>, cli: &TrainOverrides) -> Result<ResolvedTrain, TrainerError> {
    let file = file.map(TrainOverrides::from).unwrap_or_default();

    let preset = cli.preset.or(file.preset).unwrap_or_default();
    let output = cli
        .output
        .clone()
        .or_else(|| file.output.clone())
        .ok_or_else(|| TrainerError::Config("no output path given".to_string()))?;

    let mut pipeline = PipelineConfig::from_preset(preset, output);
    file.apply(&mut pipeline);
    cli.apply(&mut pipeline);
    pipeline.validate()?;

    if pipeline.input.is_none() {
        return Err(TrainerError::Config("no input path given".to_string()));
    }

    Ok(ResolvedTrain {
        pipeline,
        report: cli.report.clone().or(file.report),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::ClassWeighting;

    const SAMPLE: &str = r#"
preset = "baseline"

[data]
input = "data/features.csv"
quality_policy = "warn"

[split]
seed = 7

[forest]
n_trees = 50

[export]
output = "out/model.json"
report = "out/report.json"
"#;

    #[test]
    fn test_parse_sections() {
        let file = FileConfig::parse(SAMPLE).unwrap();
        assert_eq!(file.preset, Some(Preset::Baseline));
        assert_eq!(file.data.quality_policy, Some(QualityPolicy::Warn));
        assert_eq!(file.split.seed, Some(7));
        assert_eq!(file.forest.n_trees, Some(50));
        assert!(file.balancing.strategy.is_none());
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = FileConfig::parse("[forest]\ntrees = 3\n").unwrap_err();
        assert!(matches!(err, TrainerError::Config(_)));
    }

    #[test]
    fn test_cli_overrides_file_overrides_preset() {
        let file = FileConfig::parse(SAMPLE).unwrap();
        let cli = TrainOverrides {
            seed: Some(99),
            max_depth: Some(4),
            ..TrainOverrides::default()
        };
        let resolved = resolve(Some(file), &cli).unwrap();
        let p = &resolved.pipeline;

        assert_eq!(p.seed, 99);
        assert_eq!(p.forest.n_trees, 50);
        assert_eq!(p.forest.max_depth, 4);
        assert_eq!(p.forest.min_samples_leaf, 2);
        assert_eq!(p.strategy, BalancingStrategy::ClassWeight);
        assert_eq!(p.forest.class_weighting, ClassWeighting::Balanced);
        assert_eq!(p.quality_policy, QualityPolicy::Warn);
        assert_eq!(p.input, Some(PathBuf::from("data/features.csv")));
        assert_eq!(resolved.report, Some(PathBuf::from("out/report.json")));
    }

    #[test]
    fn test_strategy_switch_keeps_or_defaults_k() {
        let mut config = PipelineConfig::baseline("m.json");
        TrainOverrides {
            strategy: Some(StrategyKind::Smote),
            ..TrainOverrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.strategy, BalancingStrategy::Smote { k_neighbors: 5 });

        TrainOverrides {
            k_neighbors: Some(3),
            ..TrainOverrides::default()
        }
        .apply(&mut config);
        assert_eq!(config.strategy, BalancingStrategy::Smote { k_neighbors: 3 });
    }

    #[test]
    fn test_missing_paths() {
        let cli = TrainOverrides {
            input: Some("a.csv".into()),
            ..TrainOverrides::default()
        };
        assert!(matches!(resolve(None, &cli), Err(TrainerError::Config(_))));

        let cli = TrainOverrides {
            output: Some("m.json".into()),
            ..TrainOverrides::default()
        };
        assert!(matches!(resolve(None, &cli), Err(TrainerError::Config(_))));
    }
}
