//! Per-feature min/max reporter
//!
//! Produces the normalization bounds baked into the mobile scorer as two
//! `float[]` constants, plus a human-readable range table.

use pronounce_ai_core::{feature_name, NormalizationBounds};
use std::fmt::{self, Write as _};
use tracing::{debug, info};

use crate::dataset::{Dataset, NonFiniteCounts};
use crate::errors::TrainerError;
use crate::quality::{self, QualityPolicy};

/// Values per line in the rendered constant arrays
pub const VALUES_PER_LINE: usize = 7;

pub const MIN_ARRAY_NAME: &str = "TRAINING_MIN_VALS";
pub const MAX_ARRAY_NAME: &str = "TRAINING_MAX_VALS";

/// Bounds computed from a dataset snapshot, ready to render
#[derive(Debug, Clone)]
pub struct MinMaxReport {
    pub rows: usize,
    pub bounds: NormalizationBounds,
    pub non_finite: NonFiniteCounts,
}

impl MinMaxReport {
    /// Check data quality and compute bounds over every row
    pub fn compute(dataset: &Dataset, policy: QualityPolicy) -> Result<Self, TrainerError> {
        let non_finite = quality::check(dataset, policy)?;
        let bounds = compute_bounds(dataset)?;
        info!(
            rows = dataset.len(),
            features = bounds.len(),
            "Computed normalization bounds"
        );
        Ok(Self {
            rows: dataset.len(),
            bounds,
            non_finite,
        })
    }

    /// Both constant arrays, separated by a blank line
    pub fn constant_arrays(&self) -> String {
        format!(
            "{}\n{}",
            render_constant_array(MIN_ARRAY_NAME, &self.bounds.min),
            render_constant_array(MAX_ARRAY_NAME, &self.bounds.max)
        )
    }

    pub fn range_table(&self) -> String {
        render_range_table(&self.bounds)
    }
}

impl fmt::Display for MinMaxReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "Min/Max over {} samples", self.rows)?;
        writeln!(f, "{rule}")?;
        if !self.non_finite.is_clean() {
            writeln!(
                f,
                "Skipped {} NaN and {} Inf values",
                self.non_finite.nan, self.non_finite.inf
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.constant_arrays())?;
        writeln!(f, "{rule}")?;
        writeln!(f, "FEATURE RANGES")?;
        writeln!(f, "{rule}")?;
        write!(f, "{}", self.range_table())
    }
}

/// Per-feature minimum and maximum over all rows
///
/// Non-finite values are skipped. A feature without a single finite value
/// has no defined bounds and is rejected.
pub fn compute_bounds(dataset: &Dataset) -> Result<NormalizationBounds, TrainerError> {
    if dataset.is_empty() {
        return Err(TrainerError::EmptyDataset(
            "cannot compute bounds of an empty dataset".to_string(),
        ));
    }

    let width = dataset.feature_count;
    let mut min = vec![f32::INFINITY; width];
    let mut max = vec![f32::NEG_INFINITY; width];
    let mut seen = vec![false; width];

    for sample in &dataset.samples {
        for (i, &value) in sample.features.iter().enumerate() {
            if !value.is_finite() {
                continue;
            }
            seen[i] = true;
            min[i] = min[i].min(value);
            max[i] = max[i].max(value);
        }
    }

    if let Some(missing) = seen.iter().position(|s| !s) {
        debug!(feature = missing, "Feature has no finite values");
        let counts = dataset.non_finite();
        return Err(TrainerError::DataQuality {
            nan: counts.nan,
            inf: counts.inf,
        });
    }

    Ok(NormalizationBounds::new(min, max)?)
}

/// Render a `private static final float[]` literal, seven values per line
pub fn render_constant_array(name: &str, values: &[f32]) -> String {
    let mut out = format!("private static final float[] {name} = {{\n");
    let chunks: Vec<&[f32]> = values.chunks(VALUES_PER_LINE).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let line = chunk
            .iter()
            .map(|v| format!("{v:.6}f"))
            .collect::<Vec<_>>()
            .join(", ");
        let sep = if i + 1 < chunks.len() { "," } else { "" };
        let _ = writeln!(out, "    {line}{sep}");
    }
    out.push_str("};\n");
    out
}

/// Render the `Feature / Min / Max / Range` table at two decimals
pub fn render_range_table(bounds: &NormalizationBounds) -> String {
    let mut out = format!(
        "{:<10} {:>12} {:>12} {:>12}\n{}\n",
        "Feature",
        "Min",
        "Max",
        "Range",
        "-".repeat(50)
    );
    for (i, ((lo, hi), range)) in bounds
        .min
        .iter()
        .zip(&bounds.max)
        .zip(bounds.ranges())
        .enumerate()
    {
        let _ = writeln!(
            out,
            "{:<10} {:>12.2} {:>12.2} {:>12.2}",
            feature_name(i),
            lo,
            hi,
            range
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Sample;
    use pronounce_ai_core::FEATURE_COUNT;
    use proptest::prelude::*;

    fn dataset(rows: Vec<Vec<f32>>) -> Dataset {
        let samples = rows
            .into_iter()
            .enumerate()
            .map(|(i, features)| Sample {
                identifier: format!("{i}.wav"),
                word: "dog".into(),
                features,
                label: i % 2,
            })
            .collect();
        Dataset::from_samples(samples).unwrap()
    }

    #[test]
    fn test_bounds_over_rows() {
        let a: Vec<f32> = (0..FEATURE_COUNT).map(|i| i as f32).collect();
        let b: Vec<f32> = (0..FEATURE_COUNT).map(|i| -(i as f32)).collect();
        let bounds = compute_bounds(&dataset(vec![a, b])).unwrap();
        assert_eq!(bounds.min[5], -5.0);
        assert_eq!(bounds.max[5], 5.0);
        assert_eq!(bounds.min[0], 0.0);
        assert_eq!(bounds.max[0], 0.0);
    }

    #[test]
    fn test_empty_dataset_is_rejected() {
        let empty = Dataset {
            samples: Vec::new(),
            feature_count: FEATURE_COUNT,
        };
        assert!(matches!(
            compute_bounds(&empty),
            Err(TrainerError::EmptyDataset(_))
        ));
    }

    #[test]
    fn test_non_finite_values_are_skipped_under_warn() {
        let mut a = vec![1.0; FEATURE_COUNT];
        a[2] = f32::NAN;
        let b = vec![3.0; FEATURE_COUNT];
        let data = dataset(vec![a, b]);

        let report = MinMaxReport::compute(&data, QualityPolicy::Warn).unwrap();
        assert_eq!(report.bounds.min[2], 3.0);
        assert_eq!(report.bounds.min[1], 1.0);
        assert_eq!(report.non_finite.nan, 1);

        assert!(matches!(
            MinMaxReport::compute(&data, QualityPolicy::FailFast),
            Err(TrainerError::DataQuality { nan: 1, inf: 0 })
        ));
    }

    #[test]
    fn test_all_non_finite_feature_has_no_bounds() {
        let mut a = vec![1.0; FEATURE_COUNT];
        a[7] = f32::INFINITY;
        let err = compute_bounds(&dataset(vec![a])).unwrap_err();
        assert!(matches!(err, TrainerError::DataQuality { nan: 0, inf: 1 }));
    }

    #[test]
    fn test_constant_array_layout() {
        let values: Vec<f32> = (0..FEATURE_COUNT).map(|i| i as f32 * 0.5).collect();
        let text = render_constant_array(MIN_ARRAY_NAME, &values);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "private static final float[] TRAINING_MIN_VALS = {");
        // 39 values: five full lines and one with four
        assert_eq!(lines.len(), 8);
        assert_eq!(
            lines[1],
            "    0.000000f, 0.500000f, 1.000000f, 1.500000f, 2.000000f, 2.500000f, 3.000000f,"
        );
        assert_eq!(lines[6], "    17.500000f, 18.000000f, 18.500000f, 19.000000f");
        assert_eq!(lines[7], "};");
    }

    #[test]
    fn test_range_table_layout() {
        let bounds = NormalizationBounds::new(vec![-1.5, 0.0], vec![2.25, 10.0]).unwrap();
        let table = render_range_table(&bounds);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "Feature             Min          Max        Range");
        assert_eq!(lines[1], "-".repeat(50));
        assert_eq!(lines[2], "f0                -1.50         2.25         3.75");
        assert_eq!(lines[3], "f1                 0.00        10.00        10.00");
    }

    proptest! {
        #[test]
        fn prop_bounds_contain_every_row(
            rows in prop::collection::vec(
                prop::collection::vec(-50.0f32..50.0, FEATURE_COUNT),
                1..20,
            )
        ) {
            let data = dataset(rows.clone());
            let bounds = compute_bounds(&data).unwrap();
            for row in &rows {
                prop_assert!(bounds.contains(row));
            }
        }
    }
}
