//! Min-max normalization bounds frozen into the mobile scorer
//!
//! Bounds are computed once from a full dataset snapshot. Any re-collection
//! of training data invalidates previously deployed bounds unless both are
//! regenerated and shipped together.

use crate::errors::{CoreError, Result};
use crate::features::check_feature_count;
use serde::{Deserialize, Serialize};

/// Per-feature minimum and maximum, in contract order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizationBounds {
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

impl NormalizationBounds {
    pub fn new(min: Vec<f32>, max: Vec<f32>) -> Result<Self> {
        check_feature_count(min.len(), max.len())?;
        for (i, (lo, hi)) in min.iter().zip(&max).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(CoreError::ValidationFailed(format!(
                    "Feature {i} has invalid bounds [{lo}, {hi}]"
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// Number of features covered
    pub fn len(&self) -> usize {
        self.min.len()
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_empty()
    }

    /// `max - min` for every feature
    pub fn ranges(&self) -> Vec<f32> {
        self.min.iter().zip(&self.max).map(|(lo, hi)| hi - lo).collect()
    }

    /// True when every value lies within its feature's bounds
    pub fn contains(&self, features: &[f32]) -> bool {
        features.len() == self.len()
            && features
                .iter()
                .zip(self.min.iter().zip(&self.max))
                .all(|(x, (lo, hi))| lo <= x && x <= hi)
    }

    /// Scale a row to `[0, 1]` per feature; constant features map to 0
    ///
    /// Values outside the bounds are not clamped, matching the on-device
    /// scorer.
    pub fn normalize(&self, features: &[f32]) -> Result<Vec<f32>> {
        check_feature_count(self.len(), features.len())?;
        Ok(features
            .iter()
            .zip(self.min.iter().zip(&self.max))
            .map(|(x, (lo, hi))| {
                let range = hi - lo;
                if range == 0.0 {
                    0.0
                } else {
                    (x - lo) / range
                }
            })
            .collect())
    }
}
