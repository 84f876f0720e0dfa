//! Data evaluators: algorithms that assign one value to every training point.
//!
//! Every evaluator follows the same two-step contract: `train_data_values`
//! consumes a [`ValuationContext`] and does the expensive work, after which
//! `evaluate_data_values` returns one value per training row, in training order.

pub mod ame;
pub mod banzhaf;
pub mod influence;
pub mod knn_shapley;
pub mod lasso;
pub mod loo;
pub mod oob;
pub mod random;
pub mod shapley;
pub mod spec;

pub use ame::Ame;
pub use banzhaf::DataBanzhaf;
pub use influence::InfluenceSubsample;
pub use knn_shapley::KnnShapley;
pub use loo::LeaveOneOut;
pub use oob::DataOob;
pub use random::RandomEvaluator;
pub use shapley::{BetaShapley, DataShapley, ShapleySampler};
pub use spec::EvaluatorSpec;

use crate::data::Matrix;
use crate::error::DatavalError;
use crate::metrics::Metric;
use crate::model::{Model, TrainKwargs};

/// Everything an evaluator may read while computing values.
pub struct ValuationContext<'a> {
    pub x_train: &'a Matrix,
    pub y_train: &'a [usize],
    pub x_valid: &'a Matrix,
    pub y_valid: &'a [usize],
    /// Untrained prototype; evaluators train clones of it.
    pub model: &'a dyn Model,
    pub metric: Metric,
    pub train_kwargs: &'a TrainKwargs,
    pub seed: u64,
}

impl ValuationContext<'_> {
    pub fn num_points(&self) -> usize {
        self.y_train.len()
    }

    /// Train a fresh model on the given training positions and return it.
    pub fn train_on(&self, subset: &[usize]) -> Result<Box<dyn Model>, DatavalError> {
        let mut model = self.model.clone_untrained();
        let x = self.x_train.select_rows(subset);
        let y: Vec<usize> = subset.iter().map(|&i| self.y_train[i]).collect();
        model.fit(&x, &y, self.train_kwargs)?;
        Ok(model)
    }

    /// Validation metric of a model trained on `subset`.
    pub fn utility(&self, subset: &[usize]) -> Result<f64, DatavalError> {
        let model = self.train_on(subset)?;
        let y_hat = model.predict(self.x_valid)?;
        Ok(self.metric.evaluate(self.y_valid, &y_hat))
    }

    pub(crate) fn ensure_non_empty(&self, evaluator: &str) -> Result<(), DatavalError> {
        if self.num_points() == 0 {
            return Err(DatavalError::evaluator(format!(
                "{evaluator}: training split is empty"
            )));
        }
        if self.x_train.rows() != self.y_train.len() || self.x_valid.rows() != self.y_valid.len()
        {
            return Err(DatavalError::evaluator(format!(
                "{evaluator}: covariate and label counts differ"
            )));
        }
        Ok(())
    }
}

/// A data valuation algorithm.
pub trait DataEvaluator: Send + Sync {
    /// Identity: algorithm name plus constructor arguments, e.g. `DataOob(num_models=10,proportion=1)`.
    fn name(&self) -> String;

    /// Compute the data values. May train many models.
    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError>;

    /// One value per training point, in training order.
    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError>;
}

pub(crate) fn trained_values(
    name: impl FnOnce() -> String,
    values: &Option<Vec<f64>>,
) -> Result<Vec<f64>, DatavalError> {
    values.clone().ok_or_else(|| {
        DatavalError::evaluator(format!(
            "{}: data values requested before train_data_values",
            name()
        ))
    })
}

pub(crate) fn require_positive(evaluator: &str, field: &str, value: usize) -> Result<(), DatavalError> {
    if value == 0 {
        return Err(DatavalError::invalid_input(format!(
            "{evaluator}: {field} must be at least 1"
        )));
    }
    Ok(())
}

pub(crate) fn require_proportion(
    evaluator: &str,
    field: &str,
    value: f64,
) -> Result<(), DatavalError> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(DatavalError::invalid_input(format!(
            "{evaluator}: {field} must be in (0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Running per-point utility sums split by whether the point was in the subset.
#[derive(Debug, Clone)]
pub(crate) struct InOutAccumulator {
    sum_in: Vec<f64>,
    count_in: Vec<usize>,
    sum_out: Vec<f64>,
    count_out: Vec<usize>,
}

impl InOutAccumulator {
    pub fn new(n: usize) -> Self {
        Self {
            sum_in: vec![0.0; n],
            count_in: vec![0; n],
            sum_out: vec![0.0; n],
            count_out: vec![0; n],
        }
    }

    pub fn record(&mut self, mask: &[bool], utility: f64) {
        for (i, &inside) in mask.iter().enumerate() {
            if inside {
                self.sum_in[i] += utility;
                self.count_in[i] += 1;
            } else {
                self.sum_out[i] += utility;
                self.count_out[i] += 1;
            }
        }
    }

    /// Mean utility with the point minus mean utility without it; 0 when either side is unseen.
    pub fn differences(&self) -> Vec<f64> {
        (0..self.sum_in.len())
            .map(|i| {
                if self.count_in[i] == 0 || self.count_out[i] == 0 {
                    0.0
                } else {
                    self.sum_in[i] / self.count_in[i] as f64
                        - self.sum_out[i] / self.count_out[i] as f64
                }
            })
            .collect()
    }
}

pub(crate) fn mask_to_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::model::LogisticRegression;

    /// Small, noisy binary problem: the first `noisy` rows have flipped labels.
    pub struct Fixture {
        pub x_train: Matrix,
        pub y_train: Vec<usize>,
        pub x_valid: Matrix,
        pub y_valid: Vec<usize>,
        pub model: LogisticRegression,
        pub kwargs: TrainKwargs,
    }

    impl Fixture {
        pub fn new(n_train: usize, noisy: usize) -> Self {
            let make = |n: usize, offset: usize| {
                let mut rows = Vec::new();
                let mut labels = Vec::new();
                for i in 0..n {
                    let t = ((i + offset) as f64 * 0.7).sin();
                    let label = (i + offset) % 2;
                    let sign = if label == 0 { 1.0 } else { -1.0 };
                    rows.push(vec![sign * (1.0 + 0.3 * t), 0.5 * t]);
                    labels.push(label);
                }
                (Matrix::from_rows(&rows).unwrap(), labels)
            };
            let (x_train, mut y_train) = make(n_train, 0);
            for label in y_train.iter_mut().take(noisy) {
                *label = 1 - *label;
            }
            let (x_valid, y_valid) = make(40, 1000);
            Self {
                x_train,
                y_train,
                x_valid,
                y_valid,
                model: LogisticRegression::new(2, 2, 0),
                kwargs: TrainKwargs {
                    epochs: 3,
                    batch_size: 8,
                    learning_rate: 0.5,
                },
            }
        }

        pub fn ctx(&self, seed: u64) -> ValuationContext<'_> {
            ValuationContext {
                x_train: &self.x_train,
                y_train: &self.y_train,
                x_valid: &self.x_valid,
                y_valid: &self.y_valid,
                model: &self.model,
                metric: Metric::Accuracy,
                train_kwargs: &self.kwargs,
                seed,
            }
        }
    }

    pub fn mean(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_out_accumulator() {
        let mut acc = InOutAccumulator::new(3);
        acc.record(&[true, false, true], 1.0);
        acc.record(&[false, false, true], 0.5);
        let d = acc.differences();
        assert!((d[0] - 0.5).abs() < 1e-12);
        // never inside
        assert_eq!(d[1], 0.0);
        // never outside
        assert_eq!(d[2], 0.0);
    }

    #[test]
    fn test_utility_of_full_set_beats_empty() {
        let fx = test_support::Fixture::new(40, 0);
        let ctx = fx.ctx(0);
        let all: Vec<usize> = (0..40).collect();
        assert!(ctx.utility(&all).unwrap() > ctx.utility(&[]).unwrap());
    }

    #[test]
    fn test_mask_to_indices() {
        assert_eq!(mask_to_indices(&[false, true, true, false]), vec![1, 2]);
    }
}
