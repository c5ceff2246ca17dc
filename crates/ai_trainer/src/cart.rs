//! CART (Classification and Regression Tree) builder
//!
//! Implements weighted Gini classification trees with deterministic
//! exact-greedy split search. Sample weights carry both bootstrap
//! multiplicities and class weights; row-count limits use distinct rows.

use pronounce_ai_core::{Node, Tree, SCALE};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::deterministic::SplitTieBreaker;

/// Gains closer than this are treated as equal and fall to the tie-breaker
const GAIN_EPSILON: f64 = 1e-12;

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split before settling; `None` means all
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 15,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// A tree plus its normalized impurity-decrease importances
#[derive(Clone, Debug)]
pub struct FittedTree {
    pub tree: Tree,
    pub importances: Vec<f64>,
}

/// Split candidate with gain and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f32,
    gain: f64,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, threshold: f32, gain: f64) -> Self {
        Self {
            feature_idx,
            threshold,
            gain,
            tie_breaker: SplitTieBreaker::new(feature_idx, threshold),
        }
    }

    fn beats(&self, other: &SplitCandidate) -> bool {
        self.gain > other.gain + GAIN_EPSILON
            || ((self.gain - other.gain).abs() <= GAIN_EPSILON
                && self.tie_breaker < other.tie_breaker)
    }
}

/// Build a classification tree using exact-greedy CART
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f32>],
    labels: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
    feature_count: usize,
    importances: Vec<f64>,
}

impl<'a> CartBuilder<'a> {
    /// `weights[i] == 0` excludes row `i` from the tree entirely
    pub fn new(
        features: &'a [Vec<f32>],
        labels: &'a [usize],
        weights: &'a [f64],
        n_classes: usize,
        config: TreeConfig,
    ) -> Self {
        let feature_count = features.first().map_or(0, Vec::len);
        Self {
            config,
            features,
            labels,
            weights,
            n_classes,
            feature_count,
            importances: vec![0.0; feature_count],
        }
    }

    /// Build tree and return it with per-feature importances
    pub fn build(mut self, rng: &mut StdRng) -> FittedTree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..self.labels.len())
            .filter(|&i| self.weights[i] > 0.0)
            .collect();

        self.build_node(&indices, 0, &mut nodes, rng);

        let total: f64 = self.importances.iter().sum();
        if total > 0.0 {
            for value in &mut self.importances {
                *value /= total;
            }
        }

        FittedTree {
            tree: Tree::new(nodes),
            importances: self.importances,
        }
    }

    /// Recursively build tree nodes in pre-order
    fn build_node(
        &mut self,
        indices: &[usize],
        depth: usize,
        nodes: &mut Vec<Node>,
        rng: &mut StdRng,
    ) -> i32 {
        let current_idx = nodes.len() as i32;
        let class_weights = self.class_weights(indices);

        // Check stopping conditions
        if depth >= self.config.max_depth
            || indices.len() < self.config.min_samples_split
            || indices.len() < 2 * self.config.min_samples_leaf
            || is_pure(&class_weights)
        {
            nodes.push(Node::leaf(current_idx, leaf_distribution(&class_weights)));
            return current_idx;
        }

        // Find best split
        let split = match self.find_best_split(indices, &class_weights, rng) {
            Some(s) => s,
            None => {
                // No valid split, create leaf
                nodes.push(Node::leaf(current_idx, leaf_distribution(&class_weights)));
                return current_idx;
            }
        };

        let (left_indices, right_indices) =
            self.split_samples(indices, split.feature_idx, split.threshold);
        self.importances[split.feature_idx] += split.gain;

        // Reserve space for current node
        nodes.push(Node::internal(
            current_idx,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
        ));

        let left_idx = self.build_node(&left_indices, depth + 1, nodes, rng);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes, rng);

        let node = &mut nodes[current_idx as usize];
        node.left = left_idx;
        node.right = right_idx;

        current_idx
    }

    /// Search features in random order for the best weighted Gini split
    ///
    /// After `max_features` features the search stops as soon as a valid
    /// split has been seen; otherwise it keeps going through the rest.
    fn find_best_split(
        &self,
        indices: &[usize],
        parent: &[f64],
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let mut order: Vec<usize> = (0..self.feature_count).collect();
        order.shuffle(rng);
        let budget = self
            .config
            .max_features
            .unwrap_or(self.feature_count)
            .clamp(1, self.feature_count.max(1));

        let parent_total: f64 = parent.iter().sum();
        let parent_impurity = parent_total * gini(parent);

        let mut best_split: Option<SplitCandidate> = None;
        for (visited, &feature_idx) in order.iter().enumerate() {
            if visited >= budget && best_split.is_some() {
                break;
            }

            let Some(candidate) = self.best_split_on(indices, feature_idx, parent, parent_impurity)
            else {
                continue;
            };

            best_split = match best_split {
                None => Some(candidate),
                Some(current) => {
                    // Deterministic tie-breaking
                    if candidate.beats(&current) {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        best_split
    }

    /// Best midpoint threshold on one feature
    fn best_split_on(
        &self,
        indices: &[usize],
        feature_idx: usize,
        parent: &[f64],
        parent_impurity: f64,
    ) -> Option<SplitCandidate> {
        let mut sorted: Vec<(f32, usize)> = indices
            .iter()
            .map(|&i| (self.features[i][feature_idx], i))
            .collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut left = vec![0.0f64; self.n_classes];
        let mut best: Option<SplitCandidate> = None;

        for pos in 0..sorted.len().saturating_sub(1) {
            let (value, row) = sorted[pos];
            left[self.labels[row]] += self.weights[row];

            let left_rows = pos + 1;
            let right_rows = sorted.len() - left_rows;
            if left_rows < min_leaf || right_rows < min_leaf {
                continue;
            }

            let next = sorted[pos + 1].0;
            if !(value < next) {
                continue;
            }
            let threshold = midpoint(value, next);

            let right: Vec<f64> = parent.iter().zip(&left).map(|(p, l)| p - l).collect();
            let left_total: f64 = left.iter().sum();
            let right_total: f64 = right.iter().sum();
            let gain = parent_impurity - left_total * gini(&left) - right_total * gini(&right);

            let candidate = SplitCandidate::new(feature_idx, threshold, gain);
            best = match best {
                Some(current) if !candidate.beats(&current) => Some(current),
                _ => Some(candidate),
            };
        }

        best
    }

    /// Split samples based on threshold
    fn split_samples(
        &self,
        indices: &[usize],
        feature_idx: usize,
        threshold: f32,
    ) -> (Vec<usize>, Vec<usize>) {
        indices
            .iter()
            .partition(|&&idx| self.features[idx][feature_idx] <= threshold)
    }

    /// Total sample weight per class
    fn class_weights(&self, indices: &[usize]) -> Vec<f64> {
        let mut totals = vec![0.0f64; self.n_classes];
        for &idx in indices {
            totals[self.labels[idx]] += self.weights[idx];
        }
        totals
    }
}

/// Gini impurity of a weighted class histogram
pub fn gini(class_weights: &[f64]) -> f64 {
    let total: f64 = class_weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - class_weights
        .iter()
        .map(|w| {
            let p = w / total;
            p * p
        })
        .sum::<f64>()
}

fn is_pure(class_weights: &[f64]) -> bool {
    class_weights.iter().filter(|&&w| w > 0.0).count() <= 1
}

/// Class distribution as fixed-point integers at [`SCALE`]
fn leaf_distribution(class_weights: &[f64]) -> Vec<i64> {
    let total: f64 = class_weights.iter().sum();
    if total <= 0.0 {
        return vec![0; class_weights.len()];
    }
    class_weights
        .iter()
        .map(|w| (w / total * SCALE as f64).round() as i64)
        .collect()
}

/// Threshold `t` with `a <= t < b` for consecutive distinct values
fn midpoint(a: f32, b: f32) -> f32 {
    let mid = ((f64::from(a) + f64::from(b)) / 2.0) as f32;
    if mid >= b || mid < a {
        a
    } else {
        mid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn fit(features: &[Vec<f32>], labels: &[usize], config: TreeConfig) -> FittedTree {
        let weights = vec![1.0; labels.len()];
        let mut rng = StdRng::seed_from_u64(42);
        CartBuilder::new(features, labels, &weights, 2, config).build(&mut rng)
    }

    #[test]
    fn test_simple_tree() {
        let features = vec![
            vec![1.0, 20.0],
            vec![2.0, 30.0],
            vec![3.0, 40.0],
            vec![4.0, 50.0],
        ];
        let labels = vec![0, 0, 1, 1];

        let config = TreeConfig {
            max_depth: 2,
            ..TreeConfig::default()
        };
        let fitted = fit(&features, &labels, config);

        assert_eq!(fitted.tree.nodes.len(), 3);
        assert!(fitted.tree.validate(2, 2).is_ok());
        for (row, &label) in features.iter().zip(&labels) {
            let leaf = fitted.tree.evaluate(row).unwrap();
            assert_eq!(leaf[label], SCALE);
        }
    }

    #[test]
    fn test_tie_prefers_lowest_feature() {
        // Both features separate the classes perfectly
        let features = vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0], vec![4.0, 4.0]];
        let labels = vec![0, 0, 1, 1];
        let fitted = fit(&features, &labels, TreeConfig::default());

        let root = &fitted.tree.nodes[0];
        assert_eq!(root.feature_idx, 0);
        assert_eq!(root.threshold, 2.5);
        assert_eq!(fitted.importances, vec![1.0, 0.0]);
    }

    #[test]
    fn test_leaf_only_tree() {
        let features = vec![vec![1.0], vec![2.0]];
        let labels = vec![1, 1];
        let fitted = fit(&features, &labels, TreeConfig::default());

        assert_eq!(fitted.tree.nodes.len(), 1);
        assert_eq!(fitted.tree.nodes[0].leaf_value(), Some(&[0, SCALE][..]));
        assert_eq!(fitted.importances, vec![0.0]);
    }

    #[test]
    fn test_min_samples_leaf_blocks_split() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![0, 1, 1];
        let config = TreeConfig {
            min_samples_leaf: 2,
            ..TreeConfig::default()
        };
        let fitted = fit(&features, &labels, config);
        assert_eq!(fitted.tree.nodes.len(), 1);
    }

    #[test]
    fn test_zero_weight_rows_are_excluded() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let labels = vec![0, 1, 0, 1];
        let weights = vec![1.0, 0.0, 2.0, 0.0];
        let mut rng = StdRng::seed_from_u64(0);
        let fitted =
            CartBuilder::new(&features, &labels, &weights, 2, TreeConfig::default()).build(&mut rng);

        assert_eq!(fitted.tree.nodes.len(), 1);
        assert_eq!(fitted.tree.nodes[0].leaf_value(), Some(&[SCALE, 0][..]));
    }

    #[test]
    fn test_weights_shift_leaf_distribution() {
        let features = vec![vec![1.0], vec![1.0], vec![1.0]];
        let labels = vec![0, 1, 1];
        let weights = vec![2.0, 1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(0);
        let fitted =
            CartBuilder::new(&features, &labels, &weights, 2, TreeConfig::default()).build(&mut rng);

        assert_eq!(
            fitted.tree.nodes[0].leaf_value(),
            Some(&[SCALE / 2, SCALE / 2][..])
        );
    }

    #[test]
    fn test_midpoint_stays_below_upper_value() {
        let a = 1.0f32;
        let b = f32::from_bits(a.to_bits() + 1);
        let t = midpoint(a, b);
        assert!(a <= t && t < b);
        assert_eq!(midpoint(-1.0, 3.0), 1.0);
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[5.0, 0.0]), 0.0);
        assert!((gini(&[1.0, 1.0]) - 0.5).abs() < 1e-12);
        assert_eq!(gini(&[0.0, 0.0]), 0.0);
    }
}
