//! Inference runtime for exported graph artifacts
//!
//! A [`Session`] is the consumer side of the export contract: it loads an
//! artifact from disk, verifies it, and executes the graph on batches of
//! float32 rows without any knowledge of how the forest was trained.

use crate::errors::{CoreError, Result};
use crate::features::check_feature_count;
use crate::forest::argmax;
use crate::graph::{Artifact, Operator, TensorSpec, LABEL_OUTPUT, PROBABILITIES_OUTPUT};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Outputs of one [`Session::run`] call, one entry per input row
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutput {
    pub labels: Vec<i64>,
    pub probabilities: Vec<Vec<f32>>,
}

/// Loaded, verified artifact ready for inference
#[derive(Debug, Clone)]
pub struct Session {
    artifact: Artifact,
    width: usize,
}

impl Session {
    /// Load and verify an artifact from `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let artifact = Artifact::load(path)?;
        debug!(
            path = %path.display(),
            hash = %artifact.graph_hash,
            "Loaded graph artifact"
        );
        Self::from_artifact(artifact)
    }

    /// Build a session from an in-memory artifact
    pub fn from_artifact(artifact: Artifact) -> Result<Self> {
        artifact.verify()?;
        let width = artifact.graph.input_width()?;
        Ok(Self { artifact, width })
    }

    /// Declared input tensor
    pub fn input(&self) -> &TensorSpec {
        &self.artifact.graph.inputs[0]
    }

    /// Declared output tensors
    pub fn outputs(&self) -> &[TensorSpec] {
        &self.artifact.graph.outputs
    }

    /// Number of features every input row must carry
    pub fn input_width(&self) -> usize {
        self.width
    }

    /// Hash of the loaded graph
    pub fn graph_hash(&self) -> &str {
        &self.artifact.graph_hash
    }

    /// The underlying artifact
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Execute the graph on a batch of shape `[rows.len(), width]`
    pub fn run<R: AsRef<[f32]>>(&self, rows: &[R]) -> Result<SessionOutput> {
        for row in rows {
            check_feature_count(self.width, row.as_ref().len())?;
        }

        let mut labels: HashMap<&str, Vec<i64>> = HashMap::new();
        let mut probabilities: HashMap<&str, Vec<Vec<f32>>> = HashMap::new();

        for node in &self.artifact.graph.nodes {
            match &node.op {
                Operator::TreeEnsembleClassifier(op) => {
                    let mut node_labels = Vec::with_capacity(rows.len());
                    let mut node_proba = Vec::with_capacity(rows.len());
                    for row in rows {
                        let votes = op.ensemble.votes(row.as_ref())?;
                        node_labels.push(op.class_labels[argmax(&votes)]);
                        node_proba.push(normalize_votes(&votes));
                    }
                    labels.insert(node.outputs[0].as_str(), node_labels);
                    probabilities.insert(node.outputs[1].as_str(), node_proba);
                }
            }
        }

        let labels = labels.remove(LABEL_OUTPUT).ok_or_else(|| {
            CoreError::ValidationFailed(format!("Graph did not produce '{LABEL_OUTPUT}'"))
        })?;
        let probabilities = probabilities.remove(PROBABILITIES_OUTPUT).ok_or_else(|| {
            CoreError::ValidationFailed(format!("Graph did not produce '{PROBABILITIES_OUTPUT}'"))
        })?;

        Ok(SessionOutput {
            labels,
            probabilities,
        })
    }
}

fn normalize_votes(votes: &[i64]) -> Vec<f32> {
    let total: i64 = votes.iter().sum();
    if total <= 0 {
        return vec![0.0; votes.len()];
    }
    votes
        .iter()
        .map(|&v| (v as f64 / total as f64) as f32)
        .collect()
}
