//! End-to-end tests for the train/export/verify pipeline
//!
//! Every run here goes through a real CSV file and a real artifact on disk.

use anyhow::Result;
use pronounce_ai_core::{Session, FEATURE_COUNT};
use pronounce_ai_trainer::config::{self, FileConfig, TrainOverrides};
use pronounce_ai_trainer::{
    run_pipeline, BalancingStrategy, Dataset, MinMaxReport, PipelineConfig, QualityPolicy,
    SampleOrigin, Stage, TrainerError, TrainingPipeline,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

fn header(features: usize) -> String {
    let names: Vec<String> = (0..features).map(|i| format!("f{i}")).collect();
    format!("filename,word,{},label", names.join(","))
}

/// `minority` mispronounced rows among `rows`, features in [-50, 50]
///
/// Mispronounced rows lean negative on `f0` and `f1` so the classes overlap
/// but remain learnable.
fn write_dataset(rows: usize, minority: usize, seed: u64) -> Result<NamedTempFile> {
    let mut rng = StdRng::seed_from_u64(seed);
    let stride = rows / minority;
    let mut file = NamedTempFile::new()?;
    writeln!(file, "{}", header(FEATURE_COUNT))?;

    let mut written_minority = 0;
    for i in 0..rows {
        let label = if i % stride == 0 && written_minority < minority {
            written_minority += 1;
            0
        } else {
            1
        };
        let values: Vec<String> = (0..FEATURE_COUNT)
            .map(|j| {
                let v: f32 = match (j, label) {
                    (0 | 1, 0) => rng.gen_range(-50.0..-5.0),
                    (0 | 1, _) => rng.gen_range(-15.0..50.0),
                    _ => rng.gen_range(-50.0..50.0),
                };
                format!("{v:.4}")
            })
            .collect();
        writeln!(file, "clip_{i}.wav,word{},{},{label}", i % 7, values.join(","))?;
    }
    file.flush()?;
    Ok(file)
}

fn small_balanced(input: &Path, output: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::balanced(output).with_input(input);
    config.forest.n_trees = 12;
    config.forest.max_depth = 8;
    config
}

fn small_baseline(input: &Path, output: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::baseline(output).with_input(input);
    config.forest.n_trees = 12;
    config.forest.max_depth = 6;
    config
}

#[test]
fn test_balanced_run_on_imbalanced_dataset() -> Result<()> {
    let data = write_dataset(500, 100, 7)?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("model.json");

    let mut pipeline = TrainingPipeline::new(small_balanced(data.path(), &output));
    let outcome = pipeline.run()?;
    let report = &outcome.report;

    assert_eq!(report.dataset.rows, 500);
    assert_eq!(report.dataset.class_counts, vec![100, 400]);
    assert_eq!(report.split.test_rows, 100);
    assert_eq!(report.split.test_class_counts, vec![20, 80]);
    assert_eq!(report.balancing.class_counts_before, vec![80, 320]);
    assert_eq!(report.balancing.class_counts_after, vec![320, 320]);
    assert_eq!(report.balancing.synthetic_rows, 240);

    let accuracy = report.accuracy_percent();
    assert!((0.0..=100.0).contains(&accuracy));

    let verification = report.verification.as_ref().expect("verification ran");
    assert_eq!(verification.checked, 10);
    assert_eq!(verification.exported, verification.expected);
    assert_eq!(
        pipeline.completed(),
        &[
            Stage::Loaded,
            Stage::Split,
            Stage::Balanced,
            Stage::Trained,
            Stage::Evaluated,
            Stage::Exported,
            Stage::Verified,
        ]
    );
    assert!(output.exists());
    Ok(())
}

#[test]
fn test_exported_artifact_agrees_on_whole_test_split() -> Result<()> {
    let data = write_dataset(300, 60, 11)?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("model.json");

    let outcome = TrainingPipeline::new(small_balanced(data.path(), &output)).run()?;

    let dataset = Dataset::from_csv(data.path())?;
    let test_rows = dataset.feature_rows(&outcome.split.test);
    let session = Session::load(&output)?;
    let exported = session.run(&test_rows)?.labels;
    let in_memory: Vec<i64> = outcome
        .forest
        .predict_batch(&test_rows)?
        .into_iter()
        .map(|l| l as i64)
        .collect();

    assert_eq!(exported, in_memory);
    assert_eq!(session.input_width(), FEATURE_COUNT);
    Ok(())
}

#[test]
fn test_oversampling_never_touches_test_rows() -> Result<()> {
    let data = write_dataset(500, 100, 3)?;
    let dir = tempfile::tempdir()?;
    let outcome =
        TrainingPipeline::new(small_balanced(data.path(), &dir.path().join("m.json"))).run()?;

    let test: HashSet<usize> = outcome.split.test.iter().copied().collect();
    for origin in &outcome.training_origins {
        match *origin {
            SampleOrigin::Original(row) => assert!(!test.contains(&row)),
            SampleOrigin::Synthetic { base, neighbor } => {
                assert!(!test.contains(&base));
                assert!(!test.contains(&neighbor));
            }
        }
    }
    assert_eq!(outcome.training_origins.len(), 640);
    Ok(())
}

#[test]
fn test_same_seed_same_model() -> Result<()> {
    let data = write_dataset(200, 50, 5)?;
    let dir = tempfile::tempdir()?;

    let first = run_pipeline(small_balanced(data.path(), &dir.path().join("a.json")))?;
    let second = run_pipeline(small_balanced(data.path(), &dir.path().join("b.json")))?;

    let dataset = Dataset::from_csv(data.path())?;
    let all: Vec<usize> = (0..dataset.len()).collect();
    let rows = dataset.feature_rows(&all);
    assert_eq!(first.forest.predict_batch(&rows)?, second.forest.predict_batch(&rows)?);
    assert_eq!(first.split, second.split);

    let hash = |o: &pronounce_ai_trainer::TrainingOutcome| {
        o.report.artifact.as_ref().map(|a| a.graph_hash.clone())
    };
    assert_eq!(hash(&first), hash(&second));
    Ok(())
}

#[test]
fn test_importances_sum_to_one() -> Result<()> {
    let data = write_dataset(200, 50, 9)?;
    let dir = tempfile::tempdir()?;
    let outcome =
        TrainingPipeline::new(small_baseline(data.path(), &dir.path().join("m.json"))).run()?;

    assert!((outcome.report.importance_sum - 1.0).abs() < 1e-6);
    let ranked = &outcome.report.top_features;
    assert_eq!(ranked.len(), 10);
    assert_eq!(ranked[0].rank, 1);
    assert!(ranked.windows(2).all(|w| w[0].importance >= w[1].importance));
    Ok(())
}

#[test]
fn test_baseline_run() -> Result<()> {
    let data = write_dataset(500, 100, 13)?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("baseline.json");

    let outcome = run_pipeline(small_baseline(data.path(), &output))?;
    let report = &outcome.report;

    assert_eq!(report.balancing.strategy, BalancingStrategy::ClassWeight);
    assert_eq!(report.balancing.synthetic_rows, 0);
    assert_eq!(report.balancing.class_counts_after, vec![80, 320]);
    // Minority weight is the larger one
    assert!(report.balancing.class_weights[0] > report.balancing.class_weights[1]);
    assert!(!report.stages.contains(&Stage::Balanced));
    assert_eq!(report.verification.as_ref().map(|v| v.checked), Some(10));
    assert!(output.exists());
    Ok(())
}

#[test]
fn test_small_minority_fails_at_balance_stage() -> Result<()> {
    // 6 of 60 rows mispronounced leaves 5 in training, below k + 1
    let data = write_dataset(60, 6, 1)?;
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("model.json");

    let mut pipeline = TrainingPipeline::new(small_balanced(data.path(), &output));
    let err = pipeline.run().unwrap_err();

    assert_eq!(err.stage, Stage::Balanced);
    match err.source {
        TrainerError::Oversampling {
            class,
            available,
            k_neighbors,
            ..
        } => {
            assert_eq!(class, 0);
            assert_eq!(available, 5);
            assert_eq!(k_neighbors, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pipeline.completed(), &[Stage::Loaded, Stage::Split]);
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

fn dataset_with_nan() -> Result<NamedTempFile> {
    let source = write_dataset(100, 25, 21)?;
    let content = std::fs::read_to_string(source.path())?;
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut cells: Vec<String> = lines[3].split(',').map(str::to_string).collect();
    cells[5] = "nan".to_string();
    lines[3] = cells.join(",");

    let mut file = NamedTempFile::new()?;
    writeln!(file, "{}", lines.join("\n"))?;
    file.flush()?;
    Ok(file)
}

#[test]
fn test_non_finite_values_fail_fast_by_default() -> Result<()> {
    let data = dataset_with_nan()?;
    let dir = tempfile::tempdir()?;

    let err = TrainingPipeline::new(small_baseline(data.path(), &dir.path().join("m.json")))
        .run()
        .unwrap_err();

    assert_eq!(err.stage, Stage::Loaded);
    assert!(matches!(err.source, TrainerError::DataQuality { nan: 1, inf: 0 }));
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    Ok(())
}

#[test]
fn test_warn_policy_replaces_non_finite_values() -> Result<()> {
    let data = dataset_with_nan()?;
    let dir = tempfile::tempdir()?;
    let mut config = small_baseline(data.path(), &dir.path().join("m.json"));
    config.quality_policy = QualityPolicy::Warn;

    let outcome = TrainingPipeline::new(config).run()?;
    assert_eq!(outcome.report.dataset.non_finite.nan, 1);
    assert_eq!(outcome.report.dataset.replaced_non_finite, 1);
    Ok(())
}

#[test]
fn test_wrong_column_count_fails_at_load() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "{}", header(FEATURE_COUNT - 1))?;
    let values = vec!["1.0"; FEATURE_COUNT - 1].join(",");
    writeln!(file, "a.wav,hi,{values},1")?;
    writeln!(file, "b.wav,hi,{values},0")?;
    file.flush()?;

    let dir = tempfile::tempdir()?;
    let err = TrainingPipeline::new(small_baseline(file.path(), &dir.path().join("m.json")))
        .run()
        .unwrap_err();
    assert_eq!(err.stage, Stage::Loaded);
    assert!(matches!(err.source, TrainerError::DataLoad(_)));
    Ok(())
}

#[test]
fn test_report_json_and_console_output() -> Result<()> {
    let data = write_dataset(200, 40, 17)?;
    let dir = tempfile::tempdir()?;
    let outcome =
        TrainingPipeline::new(small_balanced(data.path(), &dir.path().join("m.json"))).run()?;

    let report_path = dir.path().join("reports").join("run.json");
    outcome.report.write_json(&report_path)?;
    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&report_path)?)?;

    assert_eq!(value["stages"][0], "loaded");
    assert_eq!(value["stages"][6], "verified");
    assert_eq!(value["balancing"]["strategy"]["kind"], "smote");
    assert_eq!(value["dataset"]["quality_policy"], "fail-fast");
    assert!(value["evaluation"]["accuracy"].is_number());

    let console = outcome.report.to_string();
    assert!(console.contains("Overall Accuracy"));
    assert!(console.contains("Confusion Matrix"));
    assert!(console.contains("Match: true"));
    Ok(())
}

#[test]
fn test_toml_config_drives_a_run() -> Result<()> {
    let data = write_dataset(200, 50, 23)?;
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join("train.toml");
    let output = dir.path().join("out").join("model.json");
    std::fs::write(
        &config_path,
        format!(
            "preset = \"baseline\"\n\n[data]\ninput = {:?}\n\n[forest]\nn_trees = 8\njobs = 2\n\n[export]\noutput = {:?}\n",
            data.path().display().to_string(),
            output.display().to_string()
        ),
    )?;

    let file = FileConfig::load(&config_path)?;
    let cli = TrainOverrides {
        max_depth: Some(5),
        ..TrainOverrides::default()
    };
    let resolved = config::resolve(Some(file), &cli)?;
    assert_eq!(resolved.pipeline.forest.n_trees, 8);
    assert_eq!(resolved.pipeline.forest.n_jobs, Some(2));

    let outcome = TrainingPipeline::new(resolved.pipeline).run()?;
    assert_eq!(outcome.forest.n_trees(), 8);
    assert!(outcome.report.forest.deepest_tree <= 5);
    assert_eq!(outcome.artifact_path, output);
    Ok(())
}

#[test]
fn test_minmax_bounds_cover_dataset() -> Result<()> {
    let data = write_dataset(120, 30, 29)?;
    let dataset = Dataset::from_csv(data.path())?;
    let report = MinMaxReport::compute(&dataset, QualityPolicy::FailFast)?;

    assert_eq!(report.rows, 120);
    for sample in &dataset.samples {
        assert!(report.bounds.contains(&sample.features));
    }
    assert!(report.bounds.min.iter().all(|&v| v >= -50.0));
    assert!(report.bounds.max.iter().all(|&v| v <= 50.0));

    let arrays = report.constant_arrays();
    assert!(arrays.contains("TRAINING_MIN_VALS"));
    assert!(arrays.contains("TRAINING_MAX_VALS"));
    Ok(())
}
