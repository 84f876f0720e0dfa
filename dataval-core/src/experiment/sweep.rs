//! Grid sweep over training keyword arguments.
//!
//! Every combination trains `samples` models on the train split (each with its
//! own seed) and reports the validation metric as mean, sample standard
//! deviation and mean fit time.

use crate::data::DataFetcher;
use crate::error::DatavalError;
use crate::metrics::Metric;
use crate::model::{Device, ModelFactory, TrainKwargs};
use crate::reproducibility::SeedManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Parameter name → candidate values; names are `TrainKwargs` fields.
pub type ParamGrid = BTreeMap<String, Vec<serde_json::Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeanStdTime {
    pub mean: f64,
    /// Sample standard deviation (n - 1 denominator); 0 for a single sample.
    pub std: f64,
    /// Mean seconds per fit.
    pub avg_time: f64,
}

impl MeanStdTime {
    pub fn from_samples(scores: &[f64], seconds: &[f64]) -> Self {
        let n = scores.len();
        let mean = if n == 0 {
            0.0
        } else {
            scores.iter().sum::<f64>() / n as f64
        };
        let std = if n < 2 {
            0.0
        } else {
            (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        };
        let avg_time = if seconds.is_empty() {
            0.0
        } else {
            seconds.iter().sum::<f64>() / seconds.len() as f64
        };
        Self {
            mean,
            std,
            avg_time,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub params: BTreeMap<String, serde_json::Value>,
    pub train_kwargs: TrainKwargs,
    pub score: MeanStdTime,
}

pub struct ParamSweep<'a> {
    fetcher: &'a DataFetcher,
    model_name: String,
    metric: Metric,
    base: TrainKwargs,
    samples: usize,
    seed: u64,
}

impl<'a> ParamSweep<'a> {
    pub fn new(
        fetcher: &'a DataFetcher,
        model_name: &str,
        metric: Metric,
        base: TrainKwargs,
        samples: usize,
        seed: u64,
    ) -> Result<Self, DatavalError> {
        if samples == 0 {
            return Err(DatavalError::invalid_input("samples must be at least 1"));
        }
        if fetcher.train.is_empty() {
            return Err(DatavalError::invalid_input(
                "parameter sweep needs a non-empty training split",
            ));
        }
        Ok(Self {
            fetcher,
            model_name: model_name.to_string(),
            metric,
            base,
            samples,
            seed,
        })
    }

    /// Cartesian product of the grid, in key order.
    pub fn combinations(grid: &ParamGrid) -> Vec<BTreeMap<String, serde_json::Value>> {
        let mut configs = vec![BTreeMap::new()];
        for (key, values) in grid {
            let mut next = Vec::with_capacity(configs.len() * values.len());
            for config in &configs {
                for value in values {
                    let mut c = config.clone();
                    c.insert(key.clone(), value.clone());
                    next.push(c);
                }
            }
            configs = next;
        }
        configs
    }

    /// Base kwargs with the given fields replaced.
    pub fn apply(
        base: &TrainKwargs,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<TrainKwargs, DatavalError> {
        let mut value = serde_json::to_value(base)?;
        let fields = value
            .as_object_mut()
            .ok_or_else(|| DatavalError::invalid_input("train kwargs must serialize to a map"))?;
        for (key, v) in params {
            if !fields.contains_key(key) {
                return Err(DatavalError::invalid_input(format!(
                    "unknown training parameter '{key}'"
                )));
            }
            fields.insert(key.clone(), v.clone());
        }
        let kwargs: TrainKwargs = serde_json::from_value(value)?;
        kwargs.validate()?;
        Ok(kwargs)
    }

    pub fn sweep(&self, grid: &ParamGrid) -> Result<Vec<SweepResult>, DatavalError> {
        let mut seeds = SeedManager::new(self.seed);
        let (train, valid) = (&self.fetcher.train, &self.fetcher.valid);
        let mut results = Vec::new();

        for params in Self::combinations(grid) {
            let kwargs = Self::apply(&self.base, &params)?;
            let mut scores = Vec::with_capacity(self.samples);
            let mut seconds = Vec::with_capacity(self.samples);
            for sample in 0..self.samples {
                let mut model = ModelFactory::build(
                    &self.model_name,
                    self.fetcher.covar_dim(),
                    self.fetcher.num_classes(),
                    Device::Cpu,
                    seeds.get_seed(&format!("sweep/{sample}")),
                )?;
                let start = Instant::now();
                model.fit(&train.x, &train.y, &kwargs)?;
                seconds.push(start.elapsed().as_secs_f64());
                scores.push(self.metric.evaluate(&valid.y, &model.predict(&valid.x)?));
            }
            let score = MeanStdTime::from_samples(&scores, &seconds);
            tracing::info!(
                params = %serde_json::Value::from(serde_json::Map::from_iter(params.clone())),
                mean = score.mean,
                std = score.std,
                avg_time = score.avg_time,
                "Sweep combination scored"
            );
            results.push(SweepResult {
                params,
                train_kwargs: kwargs,
                score,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, Matrix};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_mean_std_time() {
        let s = MeanStdTime::from_samples(&[1.0, 2.0, 3.0], &[0.5, 0.5, 1.1]);
        assert!((s.mean - 2.0).abs() < 1e-12);
        assert!((s.std - 1.0).abs() < 1e-12);
        assert!((s.avg_time - 0.7).abs() < 1e-12);
        assert_eq!(MeanStdTime::from_samples(&[4.0], &[1.0]).std, 0.0);
    }

    #[test]
    fn test_grid_combinations() {
        let mut grid = ParamGrid::new();
        grid.insert("epochs".into(), vec![json!(1), json!(5)]);
        grid.insert("batch_size".into(), vec![json!(16), json!(32), json!(64)]);
        let combos = ParamSweep::combinations(&grid);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0]["batch_size"], json!(16));
        assert_eq!(combos[0]["epochs"], json!(1));
        assert_eq!(ParamSweep::combinations(&ParamGrid::new()).len(), 1);
    }

    #[test]
    fn test_apply_rejects_unknown_and_invalid() {
        let base = TrainKwargs::default();
        let mut params = BTreeMap::new();
        params.insert("epochs".to_string(), json!(9));
        assert_eq!(ParamSweep::apply(&base, &params).unwrap().epochs, 9);

        params.insert("momentum".to_string(), json!(0.9));
        assert!(ParamSweep::apply(&base, &params).is_err());

        let mut zero = BTreeMap::new();
        zero.insert("batch_size".to_string(), json!(0));
        assert!(ParamSweep::apply(&base, &zero).is_err());
    }

    #[test]
    fn test_sweep_scores_each_combination() {
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![if i % 2 == 0 { 1.0 } else { -1.0 }, (i as f64).sin()])
            .collect();
        let labels = (0..60).map(|i| i % 2).collect();
        let dataset = Dataset::new(Matrix::from_rows(&rows).unwrap(), labels).unwrap();
        let fetcher = DataFetcher::from_dataset("toy", dataset, 1)
            .split_dataset_by_count(40, 10, 10)
            .unwrap();

        let sweep = ParamSweep::new(
            &fetcher,
            "logisticregression",
            Metric::Accuracy,
            TrainKwargs::default(),
            3,
            0,
        )
        .unwrap();
        let mut grid = ParamGrid::new();
        grid.insert("epochs".into(), vec![json!(1), json!(3)]);
        let results = sweep.sweep(&grid).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].train_kwargs.epochs, 3);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score.mean)));
    }
}
