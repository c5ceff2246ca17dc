//! Round-trip verification of exported artifacts
//!
//! The exported file is loaded through the inference runtime, independent of
//! the trainer's in-memory forest, and both are asked to label the same rows.
//! Any disagreement is fatal.

use pronounce_ai_core::{Session, FEATURE_COUNT};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::errors::TrainerError;
use crate::trainer::RandomForest;

/// Result of a successful verification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationSummary {
    pub checked: usize,
    pub exported: Vec<i64>,
    pub expected: Vec<i64>,
    pub graph_hash: String,
}

/// Compare artifact predictions at `path` with `forest` on `rows`
pub fn verify_export<R: AsRef<[f32]>>(
    path: &Path,
    forest: &RandomForest,
    rows: &[R],
) -> Result<VerificationSummary, TrainerError> {
    if rows.is_empty() {
        return Err(TrainerError::Export(
            "no rows available for verification".to_string(),
        ));
    }

    let session = Session::load(path)?;
    if session.input_width() != FEATURE_COUNT {
        return Err(TrainerError::Export(format!(
            "artifact input width {} does not match the {} feature contract",
            session.input_width(),
            FEATURE_COUNT
        )));
    }

    let exported = session.run(rows)?.labels;
    let expected: Vec<i64> = forest
        .predict_batch(rows)?
        .into_iter()
        .map(|label| label as i64)
        .collect();

    let mismatches = exported
        .iter()
        .zip(&expected)
        .filter(|(a, b)| a != b)
        .count();
    debug!(?exported, ?expected, "Verification predictions");

    if mismatches > 0 || exported.len() != expected.len() {
        return Err(TrainerError::ExportVerification {
            checked: rows.len(),
            mismatches,
            exported,
            expected,
        });
    }

    info!(checked = rows.len(), "Exported predictions match in-memory model");
    Ok(VerificationSummary {
        checked: rows.len(),
        exported,
        expected,
        graph_hash: session.graph_hash().to_string(),
    })
}
