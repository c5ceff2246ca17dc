//! SMOTE minority oversampling
//!
//! Synthetic rows are interpolated between a real row and one of its `k`
//! nearest same-class neighbours until every class matches the majority
//! count. Only ever applied to the training side of a split.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

use crate::dataset::class_counts;
use crate::errors::TrainerError;

/// Where a resampled row came from, as positions in the input batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrigin {
    Original(usize),
    Synthetic { base: usize, neighbor: usize },
}

/// Output of [`Smote::fit_resample`]; original rows come first
#[derive(Debug, Clone)]
pub struct Resampled {
    pub features: Vec<Vec<f32>>,
    pub labels: Vec<usize>,
    pub origin: Vec<SampleOrigin>,
}

impl Resampled {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn synthetic_count(&self) -> usize {
        self.origin
            .iter()
            .filter(|o| matches!(o, SampleOrigin::Synthetic { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Smote {
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Smote {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    /// Oversample every non-majority class up to the majority count
    pub fn fit_resample(
        &self,
        features: &[Vec<f32>],
        labels: &[usize],
        n_classes: usize,
    ) -> Result<Resampled, TrainerError> {
        if features.len() != labels.len() {
            return Err(TrainerError::Training(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if self.k_neighbors == 0 {
            return Err(TrainerError::Config(
                "SMOTE needs k_neighbors >= 1".to_string(),
            ));
        }

        let counts = class_counts(labels.iter().copied(), n_classes);
        let target = counts.iter().copied().max().unwrap_or(0);

        let mut out = Resampled {
            features: features.to_vec(),
            labels: labels.to_vec(),
            origin: (0..labels.len()).map(SampleOrigin::Original).collect(),
        };

        let mut rng = StdRng::seed_from_u64(self.seed);
        for (class, &count) in counts.iter().enumerate() {
            let needed = target - count;
            if needed == 0 {
                continue;
            }
            if count < self.k_neighbors + 1 {
                return Err(TrainerError::Oversampling {
                    class,
                    available: count,
                    required: self.k_neighbors + 1,
                    k_neighbors: self.k_neighbors,
                });
            }

            let members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, label)| **label == class)
                .map(|(row, _)| row)
                .collect();
            let neighbours = nearest_neighbours(features, &members, self.k_neighbors);

            for _ in 0..needed {
                let pick = rng.gen_range(0..members.len() * self.k_neighbors);
                let base = members[pick / self.k_neighbors];
                let neighbor = neighbours[pick / self.k_neighbors][pick % self.k_neighbors];
                let gap: f32 = rng.gen();

                out.features
                    .push(interpolate(&features[base], &features[neighbor], gap));
                out.labels.push(class);
                out.origin.push(SampleOrigin::Synthetic { base, neighbor });
            }

            debug!(class, original = count, synthetic = needed, "Oversampled class");
        }

        info!(
            before = labels.len(),
            after = out.len(),
            synthetic = out.synthetic_count(),
            "SMOTE resampling complete"
        );
        Ok(out)
    }
}

/// `base + gap * (neighbor - base)`, elementwise
pub fn interpolate(base: &[f32], neighbor: &[f32], gap: f32) -> Vec<f32> {
    base.iter()
        .zip(neighbor)
        .map(|(&x, &n)| x + gap * (n - x))
        .collect()
}

fn squared_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = f64::from(x) - f64::from(y);
            d * d
        })
        .sum()
}

/// For each member, the `k` closest other members (row ids), nearest first
///
/// Distance ties resolve to the lower row id.
fn nearest_neighbours(features: &[Vec<f32>], members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .par_iter()
        .map(|&row| {
            let mut candidates: Vec<(f64, usize)> = members
                .iter()
                .filter(|&&other| other != row)
                .map(|&other| (squared_distance(&features[row], &features[other]), other))
                .collect();
            candidates.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then(a.1.cmp(&b.1))
            });
            candidates.into_iter().take(k).map(|(_, other)| other).collect()
        })
        .collect()
}
