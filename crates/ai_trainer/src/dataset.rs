//! CSV dataset loading
//!
//! Reads the feature export of the mobile app: two metadata columns
//! (`filename`, `word`), the 39 acoustic features `f0..f38` and a `label`
//! column. Every row must carry exactly [`FEATURE_COUNT`] features; any
//! layout deviation is a load error rather than something to coerce.

use pronounce_ai_core::{
    CLASS_COUNT, FEATURE_COUNT, LABEL_COLUMN, LABEL_CORRECT, LABEL_MISPRONOUNCED, METADATA_COLUMNS,
};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

use crate::errors::TrainerError;

/// One labeled recording of a spoken word attempt
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub identifier: String,
    pub word: String,
    pub features: Vec<f32>,
    pub label: usize,
}

/// Count of non-finite values in a feature matrix
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct NonFiniteCounts {
    pub nan: usize,
    pub inf: usize,
}

impl NonFiniteCounts {
    pub fn total(&self) -> usize {
        self.nan + self.inf
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Labeled samples; row identity is the zero-based position in the file
#[derive(Clone, Debug)]
pub struct Dataset {
    pub samples: Vec<Sample>,
    pub feature_count: usize,
}

impl Dataset {
    /// Load dataset from CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, TrainerError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|err| {
            TrainerError::DataLoad(format!("cannot open {}: {}", path.display(), err))
        })?;
        Self::from_reader(file)
    }

    /// Load dataset from any CSV source with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TrainerError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|err| TrainerError::DataLoad(format!("cannot read header: {err}")))?
            .clone();

        let label_idx = headers
            .iter()
            .position(|h| h == LABEL_COLUMN)
            .ok_or_else(|| {
                TrainerError::DataLoad(format!("missing '{LABEL_COLUMN}' column"))
            })?;
        if label_idx < METADATA_COLUMNS {
            return Err(TrainerError::DataLoad(format!(
                "'{LABEL_COLUMN}' column overlaps the {METADATA_COLUMNS} metadata columns"
            )));
        }

        let feature_columns: Vec<usize> = (METADATA_COLUMNS..headers.len())
            .filter(|&idx| idx != label_idx)
            .collect();
        if feature_columns.len() != FEATURE_COUNT {
            return Err(TrainerError::DataLoad(format!(
                "expected {} feature columns, found {}",
                FEATURE_COUNT,
                feature_columns.len()
            )));
        }

        let mut samples = Vec::new();
        for (row_idx, record) in csv_reader.records().enumerate() {
            // Header is line 1
            let line = row_idx + 2;
            let record = record
                .map_err(|err| TrainerError::DataLoad(format!("line {line}: {err}")))?;

            let mut features = Vec::with_capacity(FEATURE_COUNT);
            for &col in &feature_columns {
                features.push(parse_feature(&record[col]).map_err(|_| {
                    TrainerError::DataLoad(format!(
                        "line {}, column '{}': invalid number '{}'",
                        line, &headers[col], &record[col]
                    ))
                })?);
            }

            let label = parse_label(&record[label_idx]).ok_or_else(|| {
                TrainerError::DataLoad(format!(
                    "line {}: invalid label '{}' (expected 0 or 1)",
                    line, &record[label_idx]
                ))
            })?;

            samples.push(Sample {
                identifier: record[0].to_string(),
                word: record[1].to_string(),
                features,
                label,
            });
        }

        Self::from_samples(samples)
    }

    /// Build a dataset from in-memory samples, enforcing the feature contract
    pub fn from_samples(samples: Vec<Sample>) -> Result<Self, TrainerError> {
        if samples.is_empty() {
            return Err(TrainerError::EmptyDataset(
                "no rows after load".to_string(),
            ));
        }

        for (idx, sample) in samples.iter().enumerate() {
            if sample.features.len() != FEATURE_COUNT {
                return Err(TrainerError::DataLoad(format!(
                    "row {}: expected {} features, got {}",
                    idx,
                    FEATURE_COUNT,
                    sample.features.len()
                )));
            }
            if sample.label >= CLASS_COUNT {
                return Err(TrainerError::DataLoad(format!(
                    "row {}: label {} is not binary",
                    idx, sample.label
                )));
            }
        }

        Ok(Self {
            samples,
            feature_count: FEATURE_COUNT,
        })
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Labels in row order
    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Feature rows for the given row ids
    pub fn feature_rows(&self, rows: &[usize]) -> Vec<Vec<f32>> {
        rows.iter()
            .map(|&idx| self.samples[idx].features.clone())
            .collect()
    }

    /// Number of samples per class index
    pub fn class_counts(&self) -> Vec<usize> {
        class_counts(self.samples.iter().map(|s| s.label), CLASS_COUNT)
    }

    /// Count NaN and infinite feature values
    pub fn non_finite(&self) -> NonFiniteCounts {
        let mut counts = NonFiniteCounts::default();
        for value in self.samples.iter().flat_map(|s| s.features.iter()) {
            if value.is_nan() {
                counts.nan += 1;
            } else if value.is_infinite() {
                counts.inf += 1;
            }
        }
        counts
    }

    /// Replace every non-finite feature value, returning how many changed
    pub fn replace_non_finite(&mut self, replacement: f32) -> usize {
        let mut replaced = 0;
        for value in self.samples.iter_mut().flat_map(|s| s.features.iter_mut()) {
            if !value.is_finite() {
                *value = replacement;
                replaced += 1;
            }
        }
        replaced
    }

    /// Smallest and largest finite value across the whole matrix
    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.samples
            .iter()
            .flat_map(|s| s.features.iter().copied())
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Histogram of class indices
pub fn class_counts<I: IntoIterator<Item = usize>>(labels: I, n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for label in labels {
        if label < n_classes {
            counts[label] += 1;
        }
    }
    counts
}

/// Empty cells are missing values, as in the app's exporter
fn parse_feature(raw: &str) -> Result<f32, std::num::ParseFloatError> {
    if raw.is_empty() {
        return Ok(f32::NAN);
    }
    raw.parse::<f32>()
}

fn parse_label(raw: &str) -> Option<usize> {
    match raw.parse::<f64>().ok()? {
        v if v == 0.0 => Some(LABEL_MISPRONOUNCED),
        v if v == 1.0 => Some(LABEL_CORRECT),
        _ => None,
    }
}
