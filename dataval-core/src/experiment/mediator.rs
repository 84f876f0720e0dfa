//! The experiment context: environment setup, value computation, persistence.

use crate::config::ExperimentConfig;
use crate::data::{DataFetcher, DatasetRegistry};
use crate::error::DatavalError;
use crate::evaluator::{DataEvaluator, EvaluatorSpec, ValuationContext};
use crate::experiment::manifest::{EvaluatorTiming, RunManifest};
use crate::experiment::methods::{ExperimentContext, ExperimentMethod};
use crate::experiment::table::ResultTable;
use crate::metrics::Metric;
use crate::model::{Device, Model, ModelFactory, TrainKwargs};
use crate::reproducibility::{EnvironmentSnapshot, SeedManager};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

struct ComputedEvaluator {
    evaluator: Box<dyn DataEvaluator>,
    values: Vec<f64>,
    elapsed: Duration,
}

/// Loaded data, model prototype, metric and the evaluators computed on them.
pub struct ExperimentMediator {
    fetcher: DataFetcher,
    model: Box<dyn Model>,
    metric: Metric,
    train_kwargs: TrainKwargs,
    seeds: SeedManager,
    output_dir: Option<PathBuf>,
    computed: Vec<ComputedEvaluator>,
    baseline_metric: f64,
    run_id: String,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for ExperimentMediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentMediator")
            .field("run_id", &self.run_id)
            .field("dataset", &self.fetcher.dataset_name)
            .field("model", &self.model.name())
            .field("metric", &self.metric)
            .field("evaluators", &self.evaluator_names())
            .field("baseline_metric", &self.baseline_metric)
            .finish()
    }
}

impl ExperimentMediator {
    /// Load, split and noisify the dataset, build the model, score the baseline.
    pub async fn setup(
        config: &ExperimentConfig,
        registry: &DatasetRegistry,
    ) -> Result<Self, DatavalError> {
        let seeds = SeedManager::new(config.seed);
        let device = Device::parse(&config.device)?;
        let metric = Metric::from_name(&config.metric)?;
        config.train_kwargs.validate()?;
        config.noise.validate()?;

        let cache_dir = config.resolved_cache_dir();
        let fetcher = DataFetcher::setup(
            registry,
            &config.dataset,
            &cache_dir,
            config.force_download,
            config.seed,
        )
        .await?
        .split_dataset_by_count(config.train_count, config.valid_count, config.test_count)?
        .noisify(&config.noise)?;

        tracing::info!(
            dataset = %config.dataset,
            train = fetcher.train.len(),
            valid = fetcher.valid.len(),
            test = fetcher.test.len(),
            noisy = fetcher.noisy_indices.len(),
            "Dataset prepared"
        );

        Self::from_fetcher(
            fetcher,
            &config.model,
            device,
            metric,
            config.train_kwargs.clone(),
            seeds,
        )
    }

    /// Build the context around an already prepared fetcher.
    pub fn from_fetcher(
        fetcher: DataFetcher,
        model_name: &str,
        device: Device,
        metric: Metric,
        train_kwargs: TrainKwargs,
        mut seeds: SeedManager,
    ) -> Result<Self, DatavalError> {
        let model = ModelFactory::build(
            model_name,
            fetcher.covar_dim(),
            fetcher.num_classes(),
            device,
            seeds.get_seed("model"),
        )?;

        let mut mediator = Self {
            fetcher,
            model,
            metric,
            train_kwargs,
            seeds,
            output_dir: None,
            computed: Vec::new(),
            baseline_metric: 0.0,
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        };
        mediator.baseline_metric = mediator.score_baseline()?;
        tracing::info!(
            model = mediator.model.name(),
            metric = %mediator.metric,
            baseline = mediator.baseline_metric,
            "Baseline model scored on test split"
        );
        Ok(mediator)
    }

    fn score_baseline(&self) -> Result<f64, DatavalError> {
        if self.fetcher.test.is_empty() {
            tracing::warn!("Test split is empty; baseline metric is 0");
        }
        let mut model = self.model.clone_untrained();
        let train = &self.fetcher.train;
        model.fit(&train.x, &train.y, &self.train_kwargs)?;
        let y_hat = model.predict(&self.fetcher.test.x)?;
        Ok(self.metric.evaluate(&self.fetcher.test.y, &y_hat))
    }

    /// Build and train every evaluator in order. The first failure aborts.
    ///
    /// Identities must be unique across the run; a duplicate is rejected
    /// before any evaluator is trained.
    pub fn compute_data_values(mut self, specs: &[EvaluatorSpec]) -> Result<Self, DatavalError> {
        if specs.is_empty() {
            tracing::warn!("No evaluators configured");
        }
        let evaluators = specs
            .iter()
            .map(EvaluatorSpec::build)
            .collect::<Result<Vec<_>, _>>()?;
        let mut names = self.evaluator_names();
        for evaluator in &evaluators {
            let name = evaluator.name();
            if names.contains(&name) {
                return Err(duplicate_identity(&name));
            }
            names.push(name);
        }
        for evaluator in evaluators {
            self.add_evaluator(evaluator)?;
        }
        Ok(self)
    }

    /// Train one evaluator and keep its values. Returns the elapsed time.
    pub fn add_evaluator(
        &mut self,
        mut evaluator: Box<dyn DataEvaluator>,
    ) -> Result<Duration, DatavalError> {
        let name = evaluator.name();
        if self.computed.iter().any(|c| c.evaluator.name() == name) {
            return Err(duplicate_identity(&name));
        }
        let seed = self.seeds.get_seed(&format!("evaluator/{name}"));
        let ctx = ValuationContext {
            x_train: &self.fetcher.train.x,
            y_train: &self.fetcher.train.y,
            x_valid: &self.fetcher.valid.x,
            y_valid: &self.fetcher.valid.y,
            model: self.model.as_ref(),
            metric: self.metric,
            train_kwargs: &self.train_kwargs,
            seed,
        };

        tracing::info!(evaluator = %name, seed, "Computing data values");
        let start = Instant::now();
        evaluator.train_data_values(&ctx)?;
        let elapsed = start.elapsed();

        let values = evaluator.evaluate_data_values()?;
        if values.len() != self.fetcher.train.len() {
            return Err(DatavalError::evaluator(format!(
                "{name} returned {} values for {} training points",
                values.len(),
                self.fetcher.train.len()
            )));
        }
        tracing::info!(
            evaluator = %name,
            elapsed_secs = elapsed.as_secs_f64(),
            "Data values computed"
        );
        self.computed.push(ComputedEvaluator {
            evaluator,
            values,
            elapsed,
        });
        Ok(elapsed)
    }

    pub fn set_output_directory(&mut self, path: impl Into<PathBuf>) {
        self.output_dir = Some(path.into());
    }

    pub fn output_directory(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn baseline_metric(&self) -> f64 {
        self.baseline_metric
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn fetcher(&self) -> &DataFetcher {
        &self.fetcher
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn evaluator_names(&self) -> Vec<String> {
        self.computed.iter().map(|c| c.evaluator.name()).collect()
    }

    /// Values of the evaluator with the given identity.
    pub fn data_values(&self, identity: &str) -> Option<&[f64]> {
        self.computed
            .iter()
            .find(|c| c.evaluator.name() == identity)
            .map(|c| c.values.as_slice())
    }

    pub fn timings(&self) -> Vec<EvaluatorTiming> {
        self.computed
            .iter()
            .map(|c| EvaluatorTiming {
                evaluator: c.evaluator.name(),
                elapsed_secs: c.elapsed.as_secs_f64(),
            })
            .collect()
    }

    /// Run `method` for every computed evaluator and stack the outputs.
    ///
    /// With `save_output`, the table is also written to `<method>.csv` in the
    /// output directory, which must be set.
    pub fn evaluate(
        &self,
        method: &ExperimentMethod,
        save_output: bool,
    ) -> Result<ResultTable, DatavalError> {
        let ctx = ExperimentContext {
            fetcher: &self.fetcher,
            model: self.model.as_ref(),
            metric: self.metric,
            train_kwargs: &self.train_kwargs,
            seed: self.seeds.global_seed,
        };
        let mut table = ResultTable::new();
        for computed in &self.computed {
            let name = computed.evaluator.name();
            let output = method.run(&computed.values, &ctx)?;
            tracing::debug!(evaluator = %name, method = method.name(), "Experiment finished");
            table.append(&name, &output)?;
        }

        if save_output {
            let path = self.output_path(&format!("{}.csv", method.name()))?;
            table.write_csv(&path)?;
            tracing::info!(path = %path.display(), rows = table.len(), "Saved experiment output");
        }
        Ok(table)
    }

    /// Persist every evaluator's values to `save_dataval.csv`.
    pub fn save_data_values(&self) -> Result<ResultTable, DatavalError> {
        self.evaluate(&ExperimentMethod::SaveDataval, true)
    }

    fn output_path(&self, file_name: &str) -> Result<PathBuf, DatavalError> {
        self.output_dir
            .as_ref()
            .map(|dir| dir.join(file_name))
            .ok_or_else(|| DatavalError::config("output directory is not set"))
    }

    pub fn manifest(
        &self,
        config: &impl Serialize,
        outputs: Vec<String>,
    ) -> Result<RunManifest, DatavalError> {
        Ok(RunManifest {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            dataset: self.fetcher.dataset_name.clone(),
            seed: self.seeds.global_seed,
            metric: self.metric.name().to_string(),
            baseline_metric: self.baseline_metric,
            num_train: self.fetcher.train.len(),
            noisy_points: self.fetcher.noisy_indices.len(),
            timings: self.timings(),
            outputs,
            config: serde_json::to_value(config)?,
            environment: EnvironmentSnapshot::capture(),
        })
    }

    /// Write `run.json` into the output directory.
    pub fn write_manifest(
        &self,
        config: &impl Serialize,
        outputs: Vec<String>,
    ) -> Result<PathBuf, DatavalError> {
        let dir = self
            .output_dir
            .as_deref()
            .ok_or_else(|| DatavalError::config("output directory is not set"))?;
        self.manifest(config, outputs)?.write(dir)
    }
}

fn duplicate_identity(name: &str) -> DatavalError {
    DatavalError::AlreadyExists(format!(
        "evaluator {name} is configured twice, identities must be unique"
    ))
}
