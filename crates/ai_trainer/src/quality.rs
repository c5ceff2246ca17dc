//! Data-quality policy for non-finite feature values

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dataset::{Dataset, NonFiniteCounts};
use crate::errors::TrainerError;

/// What to do when the feature matrix holds NaN or infinite values
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum QualityPolicy {
    /// Log the counts and continue
    Warn,
    /// Reject the dataset
    #[default]
    FailFast,
}

/// Apply `policy` to the counts found in `dataset`
///
/// Returns the counts so callers can report them. Under [`QualityPolicy::Warn`]
/// the dataset is left untouched; callers decide how to treat the values.
pub fn check(dataset: &Dataset, policy: QualityPolicy) -> Result<NonFiniteCounts, TrainerError> {
    let counts = dataset.non_finite();
    if counts.is_clean() {
        return Ok(counts);
    }

    match policy {
        QualityPolicy::FailFast => Err(TrainerError::DataQuality {
            nan: counts.nan,
            inf: counts.inf,
        }),
        QualityPolicy::Warn => {
            warn!(
                nan = counts.nan,
                inf = counts.inf,
                "Feature matrix contains non-finite values"
            );
            Ok(counts)
        }
    }
}
