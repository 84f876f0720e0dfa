//! # dataval-core: data valuation experiments
//!
//! Scores every training example by its contribution to model performance.
//! A run goes through four stages:
//!
//! 1. **Environment setup**: load a registered dataset, split it, inject
//!    noise, build the model and score a baseline ([`ExperimentMediator::setup`]).
//! 2. **Evaluator selection**: an ordered list of [`EvaluatorSpec`]s.
//! 3. **Value computation**: each evaluator is trained in turn and timed
//!    ([`ExperimentMediator::compute_data_values`]).
//! 4. **Persistence**: values are flattened into a [`ResultTable`] and written
//!    as `save_dataval.csv` ([`ExperimentMediator::save_data_values`]).

pub mod config;
pub mod data;
pub mod error;
pub mod evaluator;
pub mod experiment;
pub mod metrics;
pub mod model;
pub mod persistence;
pub mod reproducibility;

pub use config::{ConfigOverrides, DatavalConfig, ExperimentConfig, config_exists, load_config};
pub use data::{DataFetcher, Dataset, DatasetRegistry, Matrix, NoiseSpec};
pub use error::DatavalError;
pub use evaluator::{DataEvaluator, EvaluatorSpec, ValuationContext};
pub use experiment::{
    ExperimentMediator, ExperimentMethod, ParamSweep, ResultTable, RunManifest,
    load_mediator_output,
};
pub use metrics::Metric;
pub use model::{Device, Model, ModelFactory, TrainKwargs};
pub use reproducibility::{EnvironmentSnapshot, SeedManager};
