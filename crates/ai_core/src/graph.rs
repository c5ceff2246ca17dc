//! Portable computation-graph artifact
//!
//! A trained forest is exported as a small, self-describing graph: one
//! float32 input tensor of shape `[None, n_features]`, a single
//! `TreeEnsembleClassifier` node, and two outputs (`label` as int64 and
//! `probabilities` as float32). The file on disk is an [`Artifact`]
//! envelope holding the graph, free-form metadata and a BLAKE3 hash of the
//! graph's canonical JSON.
//!
//! ```json
//! {
//!   "format": "pronounce-graph",
//!   "format_version": 1,
//!   "graph": {
//!     "inputs": [{"dtype": "float32", "name": "float_input", "shape": [null, 39]}],
//!     "nodes": [{"op": {"op_type": "TreeEnsembleClassifier", "...": "..."}}],
//!     "opset_version": 1,
//!     "outputs": ["..."]
//!   },
//!   "graph_hash": "5f1c...",
//!   "metadata": {"strategy": "smote"}
//! }
//! ```

use crate::errors::{CoreError, Result};
use crate::forest::TreeEnsemble;
use crate::serde_canon::{hash_canonical_hex, to_canonical_json_pretty};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Format identifier written into every artifact
pub const FORMAT_NAME: &str = "pronounce-graph";

/// Envelope version understood by this runtime
pub const FORMAT_VERSION: u32 = 1;

/// Operator set version understood by this runtime
pub const OPSET_VERSION: u32 = 1;

/// Default name of the input tensor
pub const INPUT_NAME: &str = "float_input";

/// Name of the predicted-label output tensor
pub const LABEL_OUTPUT: &str = "label";

/// Name of the class-probability output tensor
pub const PROBABILITIES_OUTPUT: &str = "probabilities";

/// Element type of a tensor
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float32,
    Int64,
}

/// Declared graph input or output
///
/// `None` in `shape` marks a dynamic dimension (the batch axis).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: String,
    pub dtype: DataType,
    pub shape: Vec<Option<usize>>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, dtype: DataType, shape: Vec<Option<usize>>) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape,
        }
    }
}

/// Tool that produced the graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Producer {
    pub name: String,
    pub version: String,
}

/// Attributes of a tree ensemble classifier node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeEnsembleClassifier {
    /// Label emitted for each class index
    pub class_labels: Vec<i64>,

    /// The trees and their aggregation parameters
    pub ensemble: TreeEnsemble,
}

/// Operator executed by a graph node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op_type")]
pub enum Operator {
    TreeEnsembleClassifier(TreeEnsembleClassifier),
}

/// A node of the computation graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub op: Operator,
}

/// Computation graph body; this is what [`Artifact::graph_hash`] covers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Graph {
    pub name: String,
    pub producer: Producer,
    pub opset_version: u32,
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
    pub nodes: Vec<GraphNode>,
}

impl Graph {
    /// Build the standard single-node classifier graph for an ensemble
    pub fn tree_ensemble_classifier(
        name: impl Into<String>,
        producer: Producer,
        ensemble: TreeEnsemble,
        class_labels: Vec<i64>,
    ) -> Self {
        let n_features = ensemble.n_features;
        let n_classes = ensemble.n_classes;

        Self {
            name: name.into(),
            producer,
            opset_version: OPSET_VERSION,
            inputs: vec![TensorSpec::new(
                INPUT_NAME,
                DataType::Float32,
                vec![None, Some(n_features)],
            )],
            outputs: vec![
                TensorSpec::new(LABEL_OUTPUT, DataType::Int64, vec![None]),
                TensorSpec::new(
                    PROBABILITIES_OUTPUT,
                    DataType::Float32,
                    vec![None, Some(n_classes)],
                ),
            ],
            nodes: vec![GraphNode {
                name: "TreeEnsembleClassifier".to_string(),
                inputs: vec![INPUT_NAME.to_string()],
                outputs: vec![LABEL_OUTPUT.to_string(), PROBABILITIES_OUTPUT.to_string()],
                op: Operator::TreeEnsembleClassifier(TreeEnsembleClassifier {
                    class_labels,
                    ensemble,
                }),
            }],
        }
    }

    /// The single float32 input tensor
    pub fn input(&self) -> Result<&TensorSpec> {
        match self.inputs.as_slice() {
            [input] => Ok(input),
            other => Err(CoreError::ValidationFailed(format!(
                "Graph must declare exactly one input, found {}",
                other.len()
            ))),
        }
    }

    /// Declared feature width of the input tensor
    pub fn input_width(&self) -> Result<usize> {
        let input = self.input()?;
        match input.shape.as_slice() {
            [None, Some(width)] => Ok(*width),
            _ => Err(CoreError::ValidationFailed(format!(
                "Input '{}' must have shape [None, n_features], found {:?}",
                input.name, input.shape
            ))),
        }
    }

    /// Validate graph wiring, declared shapes and every operator
    pub fn validate(&self) -> Result<()> {
        if self.opset_version != OPSET_VERSION {
            return Err(CoreError::UnsupportedFormat(format!(
                "opset version {} (runtime supports {})",
                self.opset_version, OPSET_VERSION
            )));
        }

        let input = self.input()?;
        if input.dtype != DataType::Float32 {
            return Err(CoreError::ValidationFailed(format!(
                "Input '{}' must be float32",
                input.name
            )));
        }
        let width = self.input_width()?;

        if self.nodes.is_empty() {
            return Err(CoreError::ValidationFailed("Graph has no nodes".to_string()));
        }

        let mut available: Vec<&str> = vec![input.name.as_str()];
        for node in &self.nodes {
            for name in &node.inputs {
                if !available.contains(&name.as_str()) {
                    return Err(CoreError::ValidationFailed(format!(
                        "Node '{}' reads undefined tensor '{}'",
                        node.name, name
                    )));
                }
            }

            match &node.op {
                Operator::TreeEnsembleClassifier(op) => {
                    op.ensemble.validate()?;
                    if op.ensemble.n_features != width {
                        return Err(CoreError::ShapeMismatch {
                            expected: width,
                            actual: op.ensemble.n_features,
                        });
                    }
                    if op.class_labels.len() != op.ensemble.n_classes {
                        return Err(CoreError::ValidationFailed(format!(
                            "Node '{}' has {} class labels for {} classes",
                            node.name,
                            op.class_labels.len(),
                            op.ensemble.n_classes
                        )));
                    }
                    if node.outputs.len() != 2 {
                        return Err(CoreError::ValidationFailed(format!(
                            "Node '{}' must produce label and probabilities",
                            node.name
                        )));
                    }
                }
            }

            available.extend(node.outputs.iter().map(String::as_str));
        }

        for output in &self.outputs {
            if !available.contains(&output.name.as_str()) {
                return Err(CoreError::ValidationFailed(format!(
                    "Graph output '{}' is never produced",
                    output.name
                )));
            }
        }

        Ok(())
    }

    /// BLAKE3 hash of the canonical JSON graph body
    pub fn hash_hex(&self) -> Result<String> {
        Ok(hash_canonical_hex(self)?)
    }
}

/// On-disk envelope around a graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub format: String,
    pub format_version: u32,
    pub graph: Graph,
    pub graph_hash: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Artifact {
    /// Wrap a validated graph and compute its hash
    pub fn new(graph: Graph, metadata: BTreeMap<String, String>) -> Result<Self> {
        graph.validate()?;
        let graph_hash = graph.hash_hex()?;
        Ok(Self {
            format: FORMAT_NAME.to_string(),
            format_version: FORMAT_VERSION,
            graph,
            graph_hash,
            metadata,
        })
    }

    /// Check the envelope, recompute the hash and validate the graph
    pub fn verify(&self) -> Result<()> {
        if self.format != FORMAT_NAME {
            return Err(CoreError::UnsupportedFormat(format!(
                "format '{}' (expected '{}')",
                self.format, FORMAT_NAME
            )));
        }
        if self.format_version != FORMAT_VERSION {
            return Err(CoreError::UnsupportedFormat(format!(
                "format version {} (runtime supports {})",
                self.format_version, FORMAT_VERSION
            )));
        }

        let computed = self.graph.hash_hex()?;
        if computed != self.graph_hash {
            return Err(CoreError::HashMismatch {
                stored: self.graph_hash.clone(),
                computed,
            });
        }

        self.graph.validate()
    }

    /// Serialize to pretty canonical JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(to_canonical_json_pretty(self)?)
    }

    /// Parse and verify an artifact from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let artifact: Artifact = serde_json::from_str(json)?;
        artifact.verify()?;
        Ok(artifact)
    }

    /// Write the artifact to any writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(self.to_json()?.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Atomically write the artifact to `path`
    ///
    /// The bytes go to a temporary file in the same directory which is then
    /// renamed over `path`, so a reader never observes a partial artifact.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        self.write_to(staged.as_file_mut())?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|err| CoreError::Io(err.error))?;
        Ok(())
    }

    /// Load and verify an artifact from `path`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
