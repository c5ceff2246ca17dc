//! Pronunciation trainer CLI
//!
//! Computes normalization bounds, trains and exports the Random Forest
//! artifact, and inspects exported artifacts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pronounce_ai_core::{Session, CLASS_COUNT};
use pronounce_ai_trainer::config::{self, FileConfig, TrainOverrides};
use pronounce_ai_trainer::{Dataset, Evaluation, MinMaxReport, QualityPolicy, TrainingPipeline};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "pronounce-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Random forest trainer for on-device pronunciation scoring", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print per-feature min/max bounds as constant arrays and a range table
    Minmax {
        /// Input CSV dataset path
        #[arg(short, long)]
        input: PathBuf,

        /// Also write the bounds as JSON to this path
        #[arg(long)]
        json: Option<PathBuf>,

        /// Handling of NaN and infinite feature values
        #[arg(long, value_enum, default_value_t = QualityPolicy::FailFast)]
        quality_policy: QualityPolicy,
    },

    /// Train, export and verify a Random Forest artifact
    Train {
        /// TOML configuration file; flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: TrainOverrides,
    },

    /// Load an exported artifact and optionally score a CSV with it
    Inspect {
        /// Exported artifact path
        #[arg(short, long)]
        model: PathBuf,

        /// Labelled CSV to score
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {err}");
    }

    if let Err(err) = run(cli.command) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Minmax {
            input,
            json,
            quality_policy,
        } => minmax(input, json, quality_policy),
        Command::Train { config, overrides } => train(config, overrides),
        Command::Inspect { model, input } => inspect(model, input),
    }
}

fn minmax(input: PathBuf, json: Option<PathBuf>, policy: QualityPolicy) -> Result<()> {
    info!("Loading dataset from: {}", input.display());
    let dataset = Dataset::from_csv(&input).context("Failed to load dataset")?;
    let report = MinMaxReport::compute(&dataset, policy).context("Failed to compute bounds")?;

    println!("{report}");

    if let Some(path) = json {
        let body = serde_json::to_string_pretty(&report.bounds)
            .context("Failed to serialize bounds")?;
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Bounds written to: {}", path.display());
    }
    Ok(())
}

fn train(config_path: Option<PathBuf>, overrides: TrainOverrides) -> Result<()> {
    let file = config_path
        .map(FileConfig::load)
        .transpose()
        .context("Failed to load configuration")?;
    let resolved = config::resolve(file, &overrides).context("Invalid training configuration")?;

    let pipeline_config = &resolved.pipeline;
    info!("Pronunciation Random Forest Trainer v{}", env!("CARGO_PKG_VERSION"));
    info!("Training configuration:");
    info!("  Strategy: {}", pipeline_config.strategy);
    info!("  Trees: {}", pipeline_config.forest.n_trees);
    info!("  Max depth: {}", pipeline_config.forest.max_depth);
    info!(
        "  Min samples split/leaf: {}/{}",
        pipeline_config.forest.min_samples_split,
        pipeline_config.forest.min_samples_leaf
    );
    info!("  Test ratio: {}", pipeline_config.test_ratio);
    info!("  Seed: {}", pipeline_config.seed);

    let mut pipeline = TrainingPipeline::new(resolved.pipeline);
    let outcome = pipeline.run().context("Training failed")?;

    println!("{}", outcome.report);

    if let Some(path) = resolved.report {
        outcome
            .report
            .write_json(&path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to: {}", path.display());
    }

    info!("✓ Training completed successfully");
    info!("  Model: {}", outcome.artifact_path.display());
    Ok(())
}

fn inspect(model: PathBuf, input: Option<PathBuf>) -> Result<()> {
    let session = Session::load(&model)
        .with_context(|| format!("Failed to load artifact {}", model.display()))?;
    let artifact = session.artifact();

    println!("Artifact: {}", model.display());
    println!("  Format: {} v{}", artifact.format, artifact.format_version);
    println!("  Graph: {}", artifact.graph.name);
    println!(
        "  Producer: {} {}",
        artifact.graph.producer.name, artifact.graph.producer.version
    );
    println!("  Graph hash: {}", session.graph_hash());
    println!("  Input: {} x {}", session.input().name, session.input_width());
    for (key, value) in &artifact.metadata {
        println!("  {key}: {value}");
    }

    if let Some(input) = input {
        let dataset = Dataset::from_csv(&input).context("Failed to load dataset")?;
        let rows: Vec<&[f32]> = dataset.samples.iter().map(|s| s.features.as_slice()).collect();
        let output = session.run(&rows).context("Inference failed")?;
        let predicted: Vec<usize> = output.labels.iter().map(|&l| l as usize).collect();
        let evaluation = Evaluation::compute(&dataset.labels(), &predicted, CLASS_COUNT)
            .context("Failed to evaluate predictions")?;

        println!("\nScored {} rows from {}", dataset.len(), input.display());
        println!("  Accuracy: {:.2}%", evaluation.accuracy_percent());
        for (class, acc) in evaluation.per_class_accuracy().iter().enumerate() {
            println!("  Class {class}: {acc:.1}%");
        }
    }
    Ok(())
}
