//! CSVision training CLI
//!
//! Trains one model from a CSV file and writes the result plus its digest.

use anyhow::{Context, Result};
use clap::Parser;
use csvision_pipeline::serialization::{digest_hex, stable_json_string};
use csvision_pipeline::{train_from_path, ModelKind, PipelineConfig, TrainingRequest, UNSEEDED};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "csvision-train")]
#[command(author = "CSVision Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and evaluate a model from a CSV file", long_about = None)]
struct Args {
    /// Input CSV dataset path (first line is the header)
    #[arg(short, long)]
    input: PathBuf,

    /// Model type, e.g. LinearRegression or LogisticRegression
    #[arg(short, long)]
    model: ModelKind,

    /// Target column name
    #[arg(short, long)]
    target: String,

    /// Feature columns; defaults to every column except the target
    #[arg(short, long, value_delimiter = ',')]
    features: Vec<String>,

    /// Seed for the train/test split; -1 draws a random one
    #[arg(long, default_value_t = UNSEEDED, allow_hyphen_values = true)]
    seed: i64,

    /// Compute a confusion matrix for classifiers
    #[arg(long)]
    confusion_matrix: bool,

    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for result.json and result.hash
    #[arg(short, long, default_value = "results")]
    output: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("CSVision trainer v{}", csvision_pipeline::VERSION);

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path).context("Failed to load configuration")?,
        None => PipelineConfig::default(),
    };
    config.apply_env().context("Invalid environment override")?;

    let mut request = TrainingRequest::new(args.model, args.target.clone())
        .with_seed(args.seed)
        .with_confusion_matrix(args.confusion_matrix);
    if !args.features.is_empty() {
        request = request.with_features(args.features.iter().map(|f| f.trim().to_string()));
    }

    info!("Training {} on {}", args.model.display_name(), args.input.display());
    let result = train_from_path(&args.input, &request, &config)
        .with_context(|| format!("Training failed for {}", args.input.display()))?;

    for (name, value) in result.metrics().iter() {
        info!("  {}: {:.4}", name, value);
    }

    std::fs::create_dir_all(&args.output).context("Failed to create output directory")?;

    let json = stable_json_string(&result).context("Failed to serialize result")?;
    let result_path = args.output.join("result.json");
    std::fs::write(&result_path, &json).context("Failed to write result file")?;

    let hash_hex = digest_hex(json.as_bytes());
    let hash_path = args.output.join("result.hash");
    std::fs::write(&hash_path, &hash_hex).context("Failed to write hash file")?;

    info!("Result: {}", result_path.display());
    info!("Hash: {} ({})", hash_path.display(), hash_hex);

    Ok(())
}
