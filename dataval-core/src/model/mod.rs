//! Prediction models: the pluggable learner that evaluators train repeatedly.

pub mod logistic;
pub mod mlp;

pub use logistic::LogisticRegression;
pub use mlp::ClassifierMlp;

use crate::data::Matrix;
use crate::error::DatavalError;
use crate::metrics::TrainingMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Training keyword arguments passed to every `fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainKwargs {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

impl Default for TrainKwargs {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
        }
    }
}

impl TrainKwargs {
    pub fn validate(&self) -> Result<(), DatavalError> {
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(DatavalError::invalid_input(
                "epochs and batch_size must be positive",
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(DatavalError::invalid_input(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

fn default_epochs() -> usize {
    5
}

fn default_batch_size() -> usize {
    32
}

fn default_learning_rate() -> f64 {
    0.1
}

/// Compute device selector. Only the CPU backend is built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
}

impl Device {
    pub fn parse(selector: &str) -> Result<Self, DatavalError> {
        match selector.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            other if other.starts_with("cuda") || other == "mps" => Err(DatavalError::config(
                format!("device '{other}' is not available, only 'cpu' is supported"),
            )),
            other => Err(DatavalError::config(format!("unknown device '{other}'"))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
        }
    }
}

/// A classifier that outputs class probabilities.
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    /// Train from scratch on `(x, y)`, discarding previous weights.
    ///
    /// Fitting on zero rows leaves the model untrained; it then predicts
    /// uniform probabilities.
    fn fit(
        &mut self,
        x: &Matrix,
        y: &[usize],
        kwargs: &TrainKwargs,
    ) -> Result<TrainingMetrics, DatavalError>;

    /// Class probabilities, one row per input row.
    fn predict(&self, x: &Matrix) -> Result<Matrix, DatavalError>;

    /// A fresh, untrained model with the same architecture and seed.
    fn clone_untrained(&self) -> Box<dyn Model>;
}

/// Builds models from their registered names.
pub struct ModelFactory;

impl ModelFactory {
    pub const NAMES: [&'static str; 2] = ["logisticregression", "classifiermlp"];

    pub fn build(
        name: &str,
        input_dim: usize,
        num_classes: usize,
        device: Device,
        seed: u64,
    ) -> Result<Box<dyn Model>, DatavalError> {
        if input_dim == 0 || num_classes == 0 {
            return Err(DatavalError::model(format!(
                "cannot build '{name}' with input_dim={input_dim}, num_classes={num_classes}"
            )));
        }
        tracing::debug!(model = name, input_dim, num_classes, %device, "Building model");
        match name.to_ascii_lowercase().as_str() {
            "logisticregression" | "logistic_regression" => Ok(Box::new(LogisticRegression::new(
                input_dim,
                num_classes,
                seed,
            ))),
            "classifiermlp" | "classifier_mlp" => Ok(Box::new(ClassifierMlp::new(
                input_dim,
                ClassifierMlp::DEFAULT_HIDDEN,
                num_classes,
                seed,
            ))),
            other => Err(DatavalError::model(format!("unknown model '{other}'"))),
        }
    }
}

pub(crate) fn check_fit_inputs(
    model: &str,
    x: &Matrix,
    y: &[usize],
    input_dim: usize,
    num_classes: usize,
) -> Result<(), DatavalError> {
    if x.rows() != y.len() {
        return Err(DatavalError::training(format!(
            "{model}: {} rows but {} labels",
            x.rows(),
            y.len()
        )));
    }
    check_predict_input(model, x, input_dim)?;
    if let Some(bad) = y.iter().find(|&&l| l >= num_classes) {
        return Err(DatavalError::training(format!(
            "{model}: label {bad} out of range for {num_classes} classes"
        )));
    }
    Ok(())
}

pub(crate) fn check_predict_input(
    model: &str,
    x: &Matrix,
    input_dim: usize,
) -> Result<(), DatavalError> {
    if x.cols() != input_dim && !x.is_empty() {
        return Err(DatavalError::model(format!(
            "{model}: expected {input_dim} features, got {}",
            x.cols()
        )));
    }
    Ok(())
}

/// Numerically stable in-place softmax.
pub(crate) fn softmax_in_place(logits: &mut [f64]) {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in logits.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in logits.iter_mut() {
        *v /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parse() {
        assert_eq!(Device::parse("CPU").unwrap(), Device::Cpu);
        assert!(matches!(Device::parse("cuda:0"), Err(DatavalError::Config(_))));
        assert!(Device::parse("tpu").is_err());
    }

    #[test]
    fn test_factory_names() {
        for name in ModelFactory::NAMES {
            let model = ModelFactory::build(name, 3, 2, Device::Cpu, 0).unwrap();
            assert!(!model.name().is_empty());
        }
        assert!(ModelFactory::build("LogisticRegression", 3, 2, Device::Cpu, 0).is_ok());
        assert!(ModelFactory::build("resnet", 3, 2, Device::Cpu, 0).is_err());
    }

    #[test]
    fn test_train_kwargs_validate() {
        assert!(TrainKwargs::default().validate().is_ok());
        let bad = TrainKwargs {
            batch_size: 0,
            ..TrainKwargs::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut v = vec![1000.0, 1001.0, 999.0];
        softmax_in_place(&mut v);
        assert!((v.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(v[1] > v[0] && v[0] > v[2]);
    }
}
