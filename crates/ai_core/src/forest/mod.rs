//! Random forest ensemble with integer vote aggregation
//!
//! Each tree contributes the class distribution of the leaf a sample lands
//! in. Distributions are fixed-point integers, so the summed votes (and the
//! predicted label) are identical in every runtime that loads the ensemble:
//!
//! - Tree traversal uses `x <= threshold` on `f32` values
//! - Aggregation is an integer sum over trees in stored order
//! - The predicted class is the arg-max of the sum, lowest index on ties

pub mod tree;

pub use tree::{Node, Tree, SCALE};

use crate::errors::{CoreError, Result};
use crate::features::check_feature_count;
use serde::{Deserialize, Serialize};

/// Ensemble of classification trees over a fixed-width feature vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeEnsemble {
    /// Number of input features every row must carry
    pub n_features: usize,

    /// Number of output classes
    pub n_classes: usize,

    /// Fixed-point scale of leaf distributions
    pub scale: i64,

    /// Trees in the ensemble
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn new(trees: Vec<Tree>, n_features: usize, n_classes: usize) -> Self {
        Self {
            n_features,
            n_classes,
            scale: SCALE,
            trees,
        }
    }

    /// Validate ensemble structure
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(CoreError::ValidationFailed(
                "Ensemble has no trees".to_string(),
            ));
        }
        if self.n_classes < 2 {
            return Err(CoreError::ValidationFailed(format!(
                "Ensemble needs at least 2 classes, got {}",
                self.n_classes
            )));
        }
        if self.scale <= 0 {
            return Err(CoreError::ValidationFailed(format!(
                "Invalid scale: {}",
                self.scale
            )));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.n_classes).map_err(|e| {
                CoreError::ValidationFailed(format!("Tree {} validation failed: {}", i, e))
            })?;
        }

        Ok(())
    }

    /// Sum of leaf distributions across all trees for one row
    pub fn votes(&self, features: &[f32]) -> Result<Vec<i64>> {
        check_feature_count(self.n_features, features.len())?;

        let mut sum = vec![0i64; self.n_classes];
        for (i, tree) in self.trees.iter().enumerate() {
            let leaf = tree.evaluate(features).ok_or_else(|| {
                CoreError::ValidationFailed(format!("Tree {i} has a broken traversal path"))
            })?;
            for (acc, &weight) in sum.iter_mut().zip(leaf) {
                *acc = acc.saturating_add(weight);
            }
        }

        Ok(sum)
    }

    /// Predicted class index for one row
    pub fn predict(&self, features: &[f32]) -> Result<usize> {
        Ok(argmax(&self.votes(features)?))
    }

    /// Class probabilities for one row (mean of leaf distributions)
    pub fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        let votes = self.votes(features)?;
        let total: i64 = votes.iter().sum();
        if total <= 0 {
            return Ok(vec![0.0; self.n_classes]);
        }
        Ok(votes
            .iter()
            .map(|&v| (v as f64 / total as f64) as f32)
            .collect())
    }

    /// Predicted class index for every row of a batch
    pub fn predict_batch<R: AsRef<[f32]>>(&self, rows: &[R]) -> Result<Vec<usize>> {
        rows.iter().map(|row| self.predict(row.as_ref())).collect()
    }

    /// Number of trees in the ensemble
    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Total node count across all trees
    pub fn total_nodes(&self) -> usize {
        self.trees.iter().map(|t| t.nodes.len()).sum()
    }
}

/// Index of the largest vote; the lowest index wins ties
pub fn argmax(votes: &[i64]) -> usize {
    let mut best = 0usize;
    for (idx, &value) in votes.iter().enumerate().skip(1) {
        if value > votes[best] {
            best = idx;
        }
    }
    best
}
