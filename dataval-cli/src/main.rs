//! Dataval CLI: run data valuation experiments from a layered configuration.

mod commands;

use clap::Parser;
use dataval_core::config::LoggingConfig;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Dataval: score training examples by their contribution to model performance
#[derive(Parser, Debug)]
#[command(name = "dataval", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Set up the environment, compute data values and save them
    Run(RunArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List registered datasets
    Datasets,
    /// List evaluator kinds
    Evaluators,
    /// Grid search over training parameters
    Sweep(SweepArgs),
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Registered dataset name
    #[arg(short, long)]
    dataset: Option<String>,

    /// Output directory for result tables
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Global random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Prediction model name
    #[arg(short, long)]
    model: Option<String>,

    /// Evaluation metric name
    #[arg(long)]
    metric: Option<String>,

    /// Experiment method to run after saving values (repeatable)
    #[arg(short, long = "experiment")]
    experiments: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct SweepArgs {
    /// Epoch counts to try
    #[arg(long, value_delimiter = ',')]
    epochs: Vec<usize>,

    /// Batch sizes to try
    #[arg(long, value_delimiter = ',')]
    batch_size: Vec<usize>,

    /// Learning rates to try
    #[arg(long, value_delimiter = ',')]
    learning_rate: Vec<f64>,

    /// Models trained per combination
    #[arg(long, default_value = "3")]
    samples: usize,

    /// Registered dataset name
    #[arg(short, long)]
    dataset: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default workspace configuration file
    Init,
    /// Print the merged configuration
    Show,
}

/// Stderr layer at the verbosity level, plus an optional JSON daily file.
fn init_logging(cli: &Cli, logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = match cli.verbose {
        0 if cli.quiet => "error".to_string(),
        0 => std::env::var("RUST_LOG").unwrap_or_else(|_| logging.level.clone()),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let (json_layer, guard) = if logging.file {
        let log_dir = logging.resolved_directory();
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "dataval.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new("debug"));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    // Logging settings come from the file layers; a broken config still gets
    // default logging so the error below is reported.
    let logging = dataval_core::load_config(Some(&workspace), cli.config.as_deref(), None)
        .map(|c| c.logging)
        .unwrap_or_default();
    let _guard = init_logging(&cli, &logging);

    let ctx = commands::CliContext {
        workspace,
        config_file: cli.config.clone(),
    };
    commands::handle_command(cli.command, &ctx).await
}
