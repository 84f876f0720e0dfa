//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::RunArgs;
use crate::SweepArgs;
use dataval_core::config::{ExperimentOverrides, OutputOverrides, workspace_config_path};
use dataval_core::experiment::{ParamGrid, SweepResult};
use dataval_core::{
    ConfigOverrides, DataFetcher, DatavalConfig, EvaluatorSpec, ExperimentMediator,
    ExperimentMethod, Metric, ParamSweep, load_config,
};
use std::path::{Path, PathBuf};

/// Global options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub workspace: PathBuf,
    pub config_file: Option<PathBuf>,
}

impl CliContext {
    fn load(&self, overrides: Option<&ConfigOverrides>) -> anyhow::Result<DatavalConfig> {
        load_config(
            Some(&self.workspace),
            self.config_file.as_deref(),
            overrides,
        )
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }
}

/// What a finished `run` produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub baseline_metric: f64,
    pub rows: usize,
    pub outputs: Vec<String>,
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, ctx: &CliContext) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => {
            let summary = run(args, ctx).await?;
            println!(
                "Saved {} rows to {} (baseline {:.4})",
                summary.rows,
                summary.output_dir.display(),
                summary.baseline_metric
            );
            for output in &summary.outputs {
                println!("  {output}");
            }
            Ok(())
        }
        Commands::Config { action } => handle_config(action, ctx),
        Commands::Datasets => handle_datasets(ctx),
        Commands::Evaluators => {
            handle_evaluators();
            Ok(())
        }
        Commands::Sweep(args) => {
            let results = sweep(args, ctx).await?;
            println!("{:<48} {:>8} {:>8} {:>10}", "params", "mean", "std", "avg_time");
            for result in &results {
                let params = serde_json::to_string(&result.params)?;
                println!(
                    "{:<48} {:>8.4} {:>8.4} {:>9.3}s",
                    params, result.score.mean, result.score.std, result.score.avg_time
                );
            }
            Ok(())
        }
    }
}

fn run_overrides(args: &RunArgs) -> ConfigOverrides {
    ConfigOverrides {
        experiment: ExperimentOverrides {
            dataset: args.dataset.clone(),
            model: args.model.clone(),
            metric: args.metric.clone(),
            seed: args.seed,
        },
        output: OutputOverrides {
            directory: args.output.clone(),
            experiments: (!args.experiments.is_empty()).then(|| args.experiments.clone()),
        },
    }
}

/// Setup, value computation and persistence, then the configured experiments.
pub async fn run(args: RunArgs, ctx: &CliContext) -> anyhow::Result<RunSummary> {
    let config = ctx.load(Some(&run_overrides(&args)))?;
    let problems = config.validate();
    if !problems.is_empty() {
        anyhow::bail!("Invalid configuration:\n  {}", problems.join("\n  "));
    }
    let methods = config
        .output
        .experiments
        .iter()
        .map(|name| ExperimentMethod::from_name(name))
        .collect::<Result<Vec<_>, _>>()?;

    let registry = config.dataset_registry(&ctx.workspace)?;
    let mut mediator = ExperimentMediator::setup(&config.experiment, &registry)
        .await?
        .compute_data_values(&config.evaluators)?;

    let output_dir = ctx.resolve(&config.output.directory);
    mediator.set_output_directory(&output_dir);
    let table = mediator.save_data_values()?;
    let mut outputs = vec![format!("{}.csv", ExperimentMethod::SaveDataval.name())];

    for method in &methods {
        mediator.evaluate(method, true)?;
        outputs.push(format!("{}.csv", method.name()));
    }

    if config.output.manifest {
        let path = mediator.write_manifest(&config, outputs.clone())?;
        tracing::info!(path = %path.display(), "Wrote run manifest");
        outputs.push(dataval_core::RunManifest::FILE_NAME.to_string());
    }

    Ok(RunSummary {
        output_dir,
        baseline_metric: mediator.baseline_metric(),
        rows: table.len(),
        outputs,
    })
}

fn handle_config(action: ConfigAction, ctx: &CliContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(&ctx.workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&config_path, DatavalConfig::default().to_toml()?)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = ctx.load(None)?;
            println!("{}", config.to_toml()?);
            for problem in config.validate() {
                eprintln!("warning: {problem}");
            }
            Ok(())
        }
    }
}

fn handle_datasets(ctx: &CliContext) -> anyhow::Result<()> {
    let config = ctx.load(None)?;
    let registry = config.dataset_registry(&ctx.workspace)?;
    for entry in registry.list() {
        let marker = if entry.cacheable { " [cached]" } else { "" };
        println!("{:<32} {}{}", entry.name, entry.source.describe(), marker);
    }
    Ok(())
}

fn handle_evaluators() {
    for kind in EvaluatorSpec::KINDS {
        println!(
            "{:<22} {}",
            kind,
            EvaluatorSpec::describe(kind).unwrap_or_default()
        );
    }
}

fn sweep_grid(args: &SweepArgs) -> ParamGrid {
    let mut grid = ParamGrid::new();
    if !args.epochs.is_empty() {
        grid.insert(
            "epochs".into(),
            args.epochs.iter().map(|&v| v.into()).collect(),
        );
    }
    if !args.batch_size.is_empty() {
        grid.insert(
            "batch_size".into(),
            args.batch_size.iter().map(|&v| v.into()).collect(),
        );
    }
    if !args.learning_rate.is_empty() {
        grid.insert(
            "learning_rate".into(),
            args.learning_rate.iter().map(|&v| v.into()).collect(),
        );
    }
    grid
}

/// Score every grid combination on the validation split of the configured data.
pub async fn sweep(args: SweepArgs, ctx: &CliContext) -> anyhow::Result<Vec<SweepResult>> {
    let overrides = ConfigOverrides {
        experiment: ExperimentOverrides {
            dataset: args.dataset.clone(),
            ..ExperimentOverrides::default()
        },
        ..ConfigOverrides::default()
    };
    let config = ctx.load(Some(&overrides))?;
    let exp = &config.experiment;
    let registry = config.dataset_registry(&ctx.workspace)?;
    let fetcher = DataFetcher::setup(
        &registry,
        &exp.dataset,
        &exp.resolved_cache_dir(),
        exp.force_download,
        exp.seed,
    )
    .await?
    .split_dataset_by_count(exp.train_count, exp.valid_count, exp.test_count)?
    .noisify(&exp.noise)?;

    let metric = Metric::from_name(&exp.metric)?;
    let sweep = ParamSweep::new(
        &fetcher,
        &exp.model,
        metric,
        exp.train_kwargs.clone(),
        args.samples,
        exp.seed,
    )?;
    Ok(sweep.sweep(&sweep_grid(&args))?)
}
