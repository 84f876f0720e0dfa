//! Configuration system for Dataval.
//!
//! Uses `figment` for layered configuration: defaults -> user file -> workspace
//! file -> explicit file -> environment -> CLI overrides. Files are looked up at
//! `~/.config/dataval/config.toml` and `<workspace>/.dataval/config.toml`.

use crate::data::{CovarTransform, CsvSource, DatasetRegistry, NoiseSpec, RegisteredDataset};
use crate::error::DatavalError;
use crate::evaluator::EvaluatorSpec;
use crate::model::TrainKwargs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory under the workspace holding the workspace config.
pub const WORKSPACE_DIR: &str = ".dataval";
pub const CONFIG_FILE: &str = "config.toml";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("dev", "dataval", "dataval")
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatavalConfig {
    #[serde(default)]
    pub experiment: ExperimentConfig,
    /// Evaluators to run, in order.
    #[serde(default = "EvaluatorSpec::defaults")]
    pub evaluators: Vec<EvaluatorSpec>,
    /// Extra CSV datasets registered next to the built-ins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<CsvDatasetConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DatavalConfig {
    fn default() -> Self {
        Self {
            experiment: ExperimentConfig::default(),
            evaluators: EvaluatorSpec::defaults(),
            datasets: Vec::new(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Everything environment setup needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_dataset")]
    pub dataset: String,
    /// Download cache; defaults to the platform cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub force_download: bool,
    #[serde(default = "default_train_count")]
    pub train_count: usize,
    #[serde(default = "default_valid_count")]
    pub valid_count: usize,
    #[serde(default = "default_test_count")]
    pub test_count: usize,
    #[serde(default)]
    pub noise: NoiseSpec,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default)]
    pub train_kwargs: TrainKwargs,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            cache_dir: None,
            force_download: false,
            train_count: default_train_count(),
            valid_count: default_valid_count(),
            test_count: default_test_count(),
            noise: NoiseSpec::default(),
            model: default_model(),
            device: default_device(),
            metric: default_metric(),
            train_kwargs: TrainKwargs::default(),
            seed: default_seed(),
        }
    }
}

impl ExperimentConfig {
    /// Configured cache directory, else the platform cache, else `.dataval/cache`.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        project_dirs()
            .map(|dirs| dirs.cache_dir().join("datasets"))
            .unwrap_or_else(|| PathBuf::from(WORKSPACE_DIR).join("cache"))
    }
}

fn default_dataset() -> String {
    "gaussian_classifier".to_string()
}

fn default_train_count() -> usize {
    1000
}

fn default_valid_count() -> usize {
    100
}

fn default_test_count() -> usize {
    500
}

fn default_model() -> String {
    "logisticregression".to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_metric() -> String {
    "accuracy".to_string()
}

fn default_seed() -> u64 {
    42
}

/// A user CSV dataset (`[[datasets]]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvDatasetConfig {
    pub name: String,
    /// Relative paths resolve against the workspace.
    pub path: PathBuf,
    /// Column name, or a position; negative positions count from the end.
    #[serde(default = "default_label_column")]
    pub label_column: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default)]
    pub minmax_scale: bool,
}

fn default_label_column() -> String {
    "-1".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_true() -> bool {
    true
}

/// Where and what to write after values are computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    /// Experiment methods to run after saving values, by name.
    #[serde(default)]
    pub experiments: Vec<String>,
    /// Write `run.json` next to the tables.
    #[serde(default = "default_true")]
    pub manifest: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            experiments: Vec::new(),
            manifest: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when neither `RUST_LOG` nor `-v`/`-q` is given.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write JSON logs to a daily rolling file.
    #[serde(default = "default_true")]
    pub file: bool,
    /// Log directory; defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: true,
            directory: None,
        }
    }
}

impl LoggingConfig {
    pub fn resolved_directory(&self) -> PathBuf {
        if let Some(dir) = &self.directory {
            return dir.clone();
        }
        project_dirs()
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from(WORKSPACE_DIR).join("logs"))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DatavalConfig {
    /// Problems that would make a run fail, as readable messages.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let exp = &self.experiment;
        if exp.train_count == 0 || exp.valid_count == 0 {
            problems.push("experiment.train_count and valid_count must be positive".to_string());
        }
        if let Err(e) = exp.noise.validate() {
            problems.push(e.to_string());
        }
        if let Err(e) = exp.train_kwargs.validate() {
            problems.push(e.to_string());
        }
        if self.evaluators.is_empty() {
            problems.push("no evaluators configured".to_string());
        }
        for (i, spec) in self.evaluators.iter().enumerate() {
            if let Err(e) = spec.build() {
                problems.push(format!("evaluators[{i}]: {e}"));
            }
        }
        for dataset in &self.datasets {
            if dataset.name.trim().is_empty() {
                problems.push("datasets: empty dataset name".to_string());
            }
        }
        problems
    }

    /// Built-in datasets plus the configured CSV datasets.
    pub fn dataset_registry(&self, workspace: &Path) -> Result<DatasetRegistry, DatavalError> {
        let mut registry = DatasetRegistry::with_builtins();
        for dataset in &self.datasets {
            let path = if dataset.path.is_absolute() {
                dataset.path.clone()
            } else {
                workspace.join(&dataset.path)
            };
            let mut entry = RegisteredDataset::new(
                &dataset.name,
                CsvSource {
                    path,
                    label_column: dataset.label_column.clone(),
                    delimiter: dataset.delimiter,
                    has_header: dataset.has_header,
                },
            );
            if dataset.minmax_scale {
                entry = entry.with_covar_transform(CovarTransform::MinMaxScale);
            }
            registry.register(entry)?;
        }
        Ok(registry)
    }

    /// Pretty TOML, as written by `dataval config init`.
    pub fn to_toml(&self) -> Result<String, DatavalError> {
        toml::to_string_pretty(self).map_err(|e| DatavalError::config(e.to_string()))
    }
}

/// Command-line overrides; unset fields leave lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "ExperimentOverrides::is_empty")]
    pub experiment: ExperimentOverrides,
    #[serde(skip_serializing_if = "OutputOverrides::is_empty")]
    pub output: OutputOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExperimentOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl ExperimentOverrides {
    fn is_empty(&self) -> bool {
        self.dataset.is_none() && self.model.is_none() && self.metric.is_none() && self.seed.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiments: Option<Vec<String>>,
}

impl OutputOverrides {
    fn is_empty(&self) -> bool {
        self.directory.is_none() && self.experiments.is_none()
    }
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_DIR).join(CONFIG_FILE)
}

/// Path of the user-level config file, when a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides
/// 2. Environment variables (`DATAVAL_EXPERIMENT__SEED=7`, ...)
/// 3. Explicit config file (`--config`)
/// 4. Workspace config (`.dataval/config.toml`)
/// 5. User config (`~/.config/dataval/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<DatavalConfig, DatavalError> {
    let mut figment = Figment::from(Serialized::defaults(DatavalConfig::default()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(ws_config));
        }
    }

    if let Some(file) = config_file {
        if !file.exists() {
            return Err(DatavalError::not_found(format!(
                "config file {}",
                file.display()
            )));
        }
        figment = figment.merge(Toml::file(file));
    }

    figment = figment.merge(Env::prefixed("DATAVAL_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| DatavalError::from(Box::new(e)))
}

/// Whether a user-level or workspace-level config file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
