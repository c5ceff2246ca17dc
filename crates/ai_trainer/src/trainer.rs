//! Random forest trainer
//!
//! Fits independent CART trees on bootstrap samples in parallel. Each tree
//! draws from its own RNG stream derived from the forest seed and the tree
//! index, so the fitted forest does not depend on thread scheduling.

use pronounce_ai_core::forest::argmax;
use pronounce_ai_core::TreeEnsemble;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cart::{CartBuilder, FittedTree, TreeConfig};
use crate::dataset::class_counts;
use crate::deterministic::derive_seed;
use crate::errors::TrainerError;

/// Per-class sample weighting applied during tree fitting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeighting {
    #[default]
    Uniform,
    /// `n_samples / (n_classes * count(class))`
    Balanced,
}

/// Random forest training configuration
#[derive(Clone, Debug, Serialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features per split; `None` means `floor(sqrt(n_features))`
    pub max_features: Option<usize>,
    pub class_weighting: ClassWeighting,
    /// Worker threads; `None` uses the global rayon pool
    pub n_jobs: Option<usize>,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            class_weighting: ClassWeighting::Uniform,
            n_jobs: None,
            seed: 42,
        }
    }
}

/// Random forest trainer
pub struct RandomForestTrainer {
    config: ForestConfig,
}

/// One fitted tree and the rows its bootstrap drew
struct TreeFit {
    fitted: FittedTree,
    in_bag: Vec<bool>,
}

impl RandomForestTrainer {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Train a forest on row-major `features` with class indices `labels`
    pub fn train(
        &self,
        features: &[Vec<f32>],
        labels: &[usize],
        n_classes: usize,
    ) -> Result<RandomForest, TrainerError> {
        let n_samples = labels.len();
        if n_samples == 0 {
            return Err(TrainerError::EmptyDataset(
                "no training rows".to_string(),
            ));
        }
        if features.len() != n_samples {
            return Err(TrainerError::Training(format!(
                "{} feature rows but {} labels",
                features.len(),
                n_samples
            )));
        }
        if self.config.n_trees == 0 {
            return Err(TrainerError::Config("n_trees must be at least 1".to_string()));
        }

        let n_features = features[0].len();
        if let Some(row) = features.iter().position(|r| r.len() != n_features) {
            return Err(TrainerError::Training(format!(
                "row {row} has {} features, expected {n_features}",
                features[row].len()
            )));
        }

        let counts = class_counts(labels.iter().copied(), n_classes);
        if let Some(missing) = counts.iter().position(|&c| c == 0) {
            return Err(TrainerError::Training(format!(
                "class {missing} has no training rows"
            )));
        }
        let class_weights = self.class_weights(&counts, n_samples);

        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: Some(
                self.config
                    .max_features
                    .unwrap_or_else(|| default_max_features(n_features)),
            ),
        };

        info!(
            trees = self.config.n_trees,
            samples = n_samples,
            features = n_features,
            weighting = ?self.config.class_weighting,
            "Training random forest"
        );

        let fit_all = || -> Vec<TreeFit> {
            (0..self.config.n_trees)
                .into_par_iter()
                .map(|tree_idx| {
                    self.fit_tree(
                        tree_idx,
                        features,
                        labels,
                        n_classes,
                        &class_weights,
                        &tree_config,
                    )
                })
                .collect()
        };

        let fits = match self.config.n_jobs {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|err| TrainerError::Training(format!("thread pool: {err}")))?
                .install(fit_all),
            None => fit_all(),
        };

        let oob_score = out_of_bag_score(&fits, features, labels, n_classes);
        let importances = mean_importances(&fits, n_features);
        let trees = fits.into_iter().map(|fit| fit.fitted.tree).collect();
        let ensemble = TreeEnsemble::new(trees, n_features, n_classes);
        ensemble.validate()?;

        info!(
            trees = ensemble.num_trees(),
            nodes = ensemble.total_nodes(),
            oob_score = ?oob_score,
            "Training complete"
        );

        Ok(RandomForest {
            ensemble,
            importances,
            oob_score,
            class_weights,
        })
    }

    fn class_weights(&self, counts: &[usize], n_samples: usize) -> Vec<f64> {
        match self.config.class_weighting {
            ClassWeighting::Uniform => vec![1.0; counts.len()],
            ClassWeighting::Balanced => counts
                .iter()
                .map(|&c| n_samples as f64 / (counts.len() as f64 * c as f64))
                .collect(),
        }
    }

    fn fit_tree(
        &self,
        tree_idx: usize,
        features: &[Vec<f32>],
        labels: &[usize],
        n_classes: usize,
        class_weights: &[f64],
        tree_config: &TreeConfig,
    ) -> TreeFit {
        debug!("Training tree {}/{}", tree_idx + 1, self.config.n_trees);

        let n = labels.len();
        let mut rng = StdRng::seed_from_u64(derive_seed(self.config.seed, tree_idx as u64));

        // Bootstrap multiplicities become sample weights
        let mut draws = vec![0u32; n];
        for _ in 0..n {
            draws[rng.gen_range(0..n)] += 1;
        }
        let weights: Vec<f64> = draws
            .iter()
            .zip(labels)
            .map(|(&count, &label)| f64::from(count) * class_weights[label])
            .collect();

        let fitted = CartBuilder::new(features, labels, &weights, n_classes, tree_config.clone())
            .build(&mut rng);

        TreeFit {
            fitted,
            in_bag: draws.iter().map(|&c| c > 0).collect(),
        }
    }
}

/// `max(1, floor(sqrt(n_features)))`
pub fn default_max_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).max(1)
}

/// Mean of per-tree importances, renormalized to sum to one
fn mean_importances(fits: &[TreeFit], n_features: usize) -> Vec<f64> {
    let mut sum = vec![0.0f64; n_features];
    for fit in fits {
        for (acc, value) in sum.iter_mut().zip(&fit.fitted.importances) {
            *acc += value;
        }
    }
    let total: f64 = sum.iter().sum();
    if total > 0.0 {
        for value in &mut sum {
            *value /= total;
        }
    }
    sum
}

/// Accuracy of each row scored only by trees that did not draw it
fn out_of_bag_score(
    fits: &[TreeFit],
    features: &[Vec<f32>],
    labels: &[usize],
    n_classes: usize,
) -> Option<f64> {
    let (scored, correct) = (0..labels.len())
        .into_par_iter()
        .map(|row| {
            let mut votes = vec![0i64; n_classes];
            let mut voters = 0usize;
            for fit in fits.iter().filter(|fit| !fit.in_bag[row]) {
                if let Some(leaf) = fit.fitted.tree.evaluate(&features[row]) {
                    for (acc, &v) in votes.iter_mut().zip(leaf) {
                        *acc += v;
                    }
                    voters += 1;
                }
            }
            if voters == 0 {
                (0usize, 0usize)
            } else {
                (1, usize::from(argmax(&votes) == labels[row]))
            }
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    (scored > 0).then(|| correct as f64 / scored as f64)
}

/// A trained forest with its training-time diagnostics
#[derive(Debug, Clone)]
pub struct RandomForest {
    ensemble: TreeEnsemble,
    importances: Vec<f64>,
    oob_score: Option<f64>,
    class_weights: Vec<f64>,
}

impl RandomForest {
    pub fn predict(&self, features: &[f32]) -> Result<usize, TrainerError> {
        Ok(self.ensemble.predict(features)?)
    }

    pub fn predict_batch<R: AsRef<[f32]>>(&self, rows: &[R]) -> Result<Vec<usize>, TrainerError> {
        Ok(self.ensemble.predict_batch(rows)?)
    }

    pub fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>, TrainerError> {
        Ok(self.ensemble.predict_proba(features)?)
    }

    /// Normalized impurity-decrease importance per feature
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    /// The `top` most important features, highest first, lower index on ties
    pub fn ranked_importances(&self, top: usize) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> = self.importances.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(top);
        ranked
    }

    pub fn ensemble(&self) -> &TreeEnsemble {
        &self.ensemble
    }

    pub fn oob_score(&self) -> Option<f64> {
        self.oob_score
    }

    /// Weight applied to each class during fitting
    pub fn class_weights(&self) -> &[f64] {
        &self.class_weights
    }

    pub fn n_trees(&self) -> usize {
        self.ensemble.num_trees()
    }

    pub fn n_features(&self) -> usize {
        self.ensemble.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> (Vec<Vec<f32>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let label = i % 2;
            let base = if label == 0 { -5.0 } else { 5.0 };
            features.push(vec![base + (i % 7) as f32 * 0.1, (i % 3) as f32, i as f32 * 0.01]);
            labels.push(label);
        }
        (features, labels)
    }

    fn config(n_trees: usize) -> ForestConfig {
        ForestConfig {
            n_trees,
            max_depth: 5,
            max_features: Some(3),
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_learns_separable_data() {
        let (features, labels) = separable(60);
        let forest = RandomForestTrainer::new(config(15))
            .train(&features, &labels, 2)
            .unwrap();

        assert_eq!(forest.n_trees(), 15);
        assert_eq!(forest.predict_batch(&features).unwrap(), labels);
        assert!(forest.oob_score().unwrap() > 0.9);
    }

    #[test]
    fn test_importances_sum_to_one() {
        let (features, labels) = separable(40);
        let forest = RandomForestTrainer::new(config(10))
            .train(&features, &labels, 2)
            .unwrap();

        let sum: f64 = forest.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(forest.ranked_importances(1)[0].0, 0);
    }

    #[test]
    fn test_same_seed_same_forest_across_pools() {
        let (features, labels) = separable(50);
        let a = RandomForestTrainer::new(config(8))
            .train(&features, &labels, 2)
            .unwrap();
        let b = RandomForestTrainer::new(ForestConfig {
            n_jobs: Some(1),
            ..config(8)
        })
        .train(&features, &labels, 2)
        .unwrap();

        assert_eq!(a.ensemble(), b.ensemble());
        assert_eq!(a.feature_importances(), b.feature_importances());
    }

    #[test]
    fn test_balanced_class_weights() {
        let features = vec![vec![0.0]; 5];
        let labels = vec![0, 1, 1, 1, 1];
        let forest = RandomForestTrainer::new(ForestConfig {
            class_weighting: ClassWeighting::Balanced,
            ..config(2)
        })
        .train(&features, &labels, 2)
        .unwrap();

        assert_eq!(forest.class_weights(), &[2.5, 0.625]);
    }

    #[test]
    fn test_missing_class_is_rejected() {
        let features = vec![vec![0.0]; 3];
        let err = RandomForestTrainer::new(config(2))
            .train(&features, &[1, 1, 1], 2)
            .unwrap_err();
        assert!(matches!(err, TrainerError::Training(_)));
    }

    #[test]
    fn test_default_max_features() {
        assert_eq!(default_max_features(39), 6);
        assert_eq!(default_max_features(1), 1);
        assert_eq!(default_max_features(0), 1);
    }
}
