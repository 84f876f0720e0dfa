//! `run.json`: what ran, with which settings, on which host, and how long it took.

use crate::error::DatavalError;
use crate::persistence::{atomic_write_json, load_json};
use crate::reproducibility::EnvironmentSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Wall-clock time one evaluator spent in `train_data_values`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorTiming {
    pub evaluator: String,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dataset: String,
    pub seed: u64,
    pub metric: String,
    pub baseline_metric: f64,
    pub num_train: usize,
    pub noisy_points: usize,
    pub timings: Vec<EvaluatorTiming>,
    /// Files written into the output directory, by name.
    pub outputs: Vec<String>,
    /// The resolved configuration the run was started with.
    pub config: serde_json::Value,
    pub environment: EnvironmentSnapshot,
}

impl RunManifest {
    pub const FILE_NAME: &'static str = "run.json";

    pub fn total_elapsed_secs(&self) -> f64 {
        self.timings.iter().map(|t| t.elapsed_secs).sum()
    }

    /// Write into `dir`, returning the file path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, DatavalError> {
        let path = dir.join(Self::FILE_NAME);
        atomic_write_json(&path, self)?;
        Ok(path)
    }

    pub fn load(dir: &Path) -> Result<Option<Self>, DatavalError> {
        load_json(&dir.join(Self::FILE_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let manifest = RunManifest {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            dataset: "gaussian_classifier".into(),
            seed: 42,
            metric: "accuracy".into(),
            baseline_metric: 0.8,
            num_train: 100,
            noisy_points: 10,
            timings: vec![
                EvaluatorTiming {
                    evaluator: "RandomEvaluator".into(),
                    elapsed_secs: 0.5,
                },
                EvaluatorTiming {
                    evaluator: "DataOob(num_models=10,proportion=1)".into(),
                    elapsed_secs: 1.5,
                },
            ],
            outputs: vec!["save_dataval.csv".into()],
            config: serde_json::json!({ "experiment": { "seed": 42 } }),
            environment: EnvironmentSnapshot::capture(),
        };
        let path = manifest.write(dir.path()).unwrap();
        assert!(path.ends_with("run.json"));

        let loaded = RunManifest::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.run_id, manifest.run_id);
        assert_eq!(loaded.timings, manifest.timings);
        assert!((loaded.total_elapsed_secs() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_manifest_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(RunManifest::load(dir.path()).unwrap().is_none());
    }
}
