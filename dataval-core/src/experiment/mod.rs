//! Experiment orchestration: the mediator, experiment methods, result tables,
//! run manifests and parameter sweeps.

pub mod manifest;
pub mod mediator;
pub mod methods;
pub mod sweep;
pub mod table;

pub use manifest::{EvaluatorTiming, RunManifest};
pub use mediator::ExperimentMediator;
pub use methods::{ExperimentContext, ExperimentMethod, RemovalOrder};
pub use sweep::{MeanStdTime, ParamGrid, ParamSweep, SweepResult};
pub use table::{ExperimentOutput, ResultRow, ResultTable, load_mediator_output};
