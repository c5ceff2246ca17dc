//! Decision tree structures for random forest inference
//!
//! Thresholds are `f32` to match the float32 input tensor. Leaf class
//! distributions are fixed-point integers at [`SCALE`] precision.

use serde::{Deserialize, Serialize};

/// Fixed-point scale of leaf class distributions (probability × 1e6)
pub const SCALE: i64 = 1_000_000;

/// A decision tree node (internal or leaf)
///
/// For internal nodes:
/// - `feature_idx >= 0`: index into feature vector
/// - `left` and `right` point to child node indices
/// - `leaf` is `None`
///
/// For leaf nodes:
/// - `feature_idx == -1`
/// - `leaf` holds the class distribution at [`SCALE`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node ID (for reference, not used in traversal)
    pub id: i32,

    /// Left child index (-1 for leaf nodes)
    pub left: i32,

    /// Right child index (-1 for leaf nodes)
    pub right: i32,

    /// Feature index to split on (-1 for leaf nodes)
    #[serde(rename = "feature_idx", alias = "feature")]
    pub feature_idx: i32,

    /// Split threshold; samples with `x <= threshold` go left
    pub threshold: f32,

    /// Class distribution for leaf nodes
    pub leaf: Option<Vec<i64>>,
}

impl Node {
    /// Create a new internal (split) node
    pub fn internal(id: i32, feature_idx: i32, threshold: f32, left: i32, right: i32) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            leaf: None,
        }
    }

    /// Create a new leaf node
    pub fn leaf(id: i32, distribution: Vec<i64>) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0.0,
            leaf: Some(distribution),
        }
    }

    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }

    /// Get the class distribution if this is a leaf node
    pub fn leaf_value(&self) -> Option<&[i64]> {
        self.leaf.as_deref()
    }
}

/// A single classification tree, stored in pre-order (node 0 is the root)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Traverse the tree and return the reached leaf's class distribution
    ///
    /// Returns `None` when the structure is broken; call [`Tree::validate`]
    /// before serving a tree to rule that out. NaN feature values compare
    /// false and therefore go right.
    pub fn evaluate(&self, features: &[f32]) -> Option<&[i64]> {
        let mut idx = 0usize;

        // Children always sit after their parent, so a valid walk is bounded
        for _ in 0..self.nodes.len() {
            let node = self.nodes.get(idx)?;
            if node.is_leaf() {
                return node.leaf_value();
            }

            let value = *features.get(usize::try_from(node.feature_idx).ok()?)?;
            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            idx = usize::try_from(next).ok()?;
        }

        None
    }

    /// Validate tree structure against the model's feature and class counts
    pub fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("Tree has no nodes".to_string());
        }

        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                let Some(distribution) = node.leaf.as_ref() else {
                    return Err(format!("Leaf node {i} has no class distribution"));
                };
                if distribution.len() != n_classes {
                    return Err(format!(
                        "Leaf node {} has {} class weights, expected {}",
                        i,
                        distribution.len(),
                        n_classes
                    ));
                }
                if distribution.iter().any(|&w| w < 0) {
                    return Err(format!("Leaf node {i} has a negative class weight"));
                }
                continue;
            }

            for (side, child) in [("left", node.left), ("right", node.right)] {
                if child <= i as i32 || child as usize >= len {
                    return Err(format!("Node {i} has invalid {side} child: {child}"));
                }
            }

            if node.feature_idx < 0 || node.feature_idx as usize >= n_features {
                return Err(format!(
                    "Internal node {} has invalid feature index: {}",
                    i, node.feature_idx
                ));
            }

            if !node.threshold.is_finite() {
                return Err(format!("Internal node {i} has a non-finite threshold"));
            }
        }

        Ok(())
    }

    /// Depth of the deepest leaf (a single leaf has depth 0)
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(idx) else {
                continue;
            };
            max_depth = max_depth.max(depth);
            if !node.is_leaf() {
                stack.push((node.left as usize, depth + 1));
                stack.push((node.right as usize, depth + 1));
            }
        }
        max_depth
    }

    /// Number of leaf nodes
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }
}
