//! Feature contract shared by the collector, the trainer and the mobile scorer
//!
//! The on-device DSP extractor emits 39 acoustic measurements per recording,
//! named `f0..f38`. Training data, exported artifacts and normalization
//! bounds all use this ordering; a count mismatch anywhere is a fault.

use crate::errors::{CoreError, Result};

/// Number of acoustic features per sample
pub const FEATURE_COUNT: usize = 39;

/// Number of leading metadata columns (`filename`, `word`) in the feature CSV
pub const METADATA_COLUMNS: usize = 2;

/// Header name of the label column in the feature CSV
pub const LABEL_COLUMN: &str = "label";

/// Label of a mispronounced attempt
pub const LABEL_MISPRONOUNCED: usize = 0;

/// Label of a correctly pronounced attempt
pub const LABEL_CORRECT: usize = 1;

/// Number of output classes
pub const CLASS_COUNT: usize = 2;

/// Display names by class index
pub const CLASS_NAMES: [&str; CLASS_COUNT] = ["Mispronounced (0)", "Correct (1)"];

/// Column name of feature `index`
pub fn feature_name(index: usize) -> String {
    format!("f{index}")
}

/// Column names of all features, in contract order
pub fn feature_names() -> Vec<String> {
    (0..FEATURE_COUNT).map(feature_name).collect()
}

/// Ensure a row or declared shape carries exactly `expected` features
pub fn check_feature_count(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(CoreError::ShapeMismatch { expected, actual });
    }
    Ok(())
}
