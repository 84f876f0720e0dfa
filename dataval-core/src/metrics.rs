//! Performance metrics and training-loss tracking.

use crate::data::Matrix;
use crate::error::DatavalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar performance metric. Higher is always better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    NegLogLoss,
    MacroF1,
}

impl Metric {
    pub fn from_name(name: &str) -> Result<Self, DatavalError> {
        match name.to_ascii_lowercase().as_str() {
            "accuracy" => Ok(Self::Accuracy),
            "neg_log_loss" | "neg_cross_entropy" => Ok(Self::NegLogLoss),
            "macro_f1" | "f1" => Ok(Self::MacroF1),
            other => Err(DatavalError::metric(format!("unknown metric '{other}'"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::NegLogLoss => "neg_log_loss",
            Self::MacroF1 => "macro_f1",
        }
    }

    /// Score predicted class probabilities against true labels.
    ///
    /// An empty evaluation set scores 0.
    pub fn evaluate(&self, y_true: &[usize], y_prob: &Matrix) -> f64 {
        if y_true.is_empty() {
            return 0.0;
        }
        debug_assert_eq!(y_true.len(), y_prob.rows());
        match self {
            Self::Accuracy => accuracy(y_true, &y_prob.argmax_rows()),
            Self::NegLogLoss => {
                let total: f64 = y_true
                    .iter()
                    .enumerate()
                    .map(|(i, &y)| {
                        let p = if y < y_prob.cols() { y_prob.get(i, y) } else { 0.0 };
                        p.clamp(1e-12, 1.0).ln()
                    })
                    .sum();
                total / y_true.len() as f64
            }
            Self::MacroF1 => {
                let classes = y_prob.cols().max(y_true.iter().max().map_or(0, |m| m + 1));
                ClassificationMetrics::compute(y_true, &y_prob.argmax_rows(), classes).f1_score
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fraction of positions where prediction equals label.
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    correct as f64 / y_true.len() as f64
}

/// F1 score of boolean labels, `true` being the positive class.
pub fn binary_f1(y_true: &[bool], y_pred: &[bool]) -> f64 {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t, p) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    let denom = 2 * tp + fp + fn_;
    if denom == 0 {
        0.0
    } else {
        2.0 * tp as f64 / denom as f64
    }
}

/// Classification metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// Macro-averaged over classes that appear in labels or predictions.
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl ClassificationMetrics {
    pub fn compute(y_true: &[usize], y_pred: &[usize], num_classes: usize) -> Self {
        let mut confusion = vec![vec![0usize; num_classes]; num_classes];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t < num_classes && p < num_classes {
                confusion[t][p] += 1;
            }
        }

        let mut precision = 0.0;
        let mut recall = 0.0;
        let mut f1 = 0.0;
        let mut present = 0usize;
        for c in 0..num_classes {
            let tp = confusion[c][c] as f64;
            let predicted: usize = (0..num_classes).map(|r| confusion[r][c]).sum();
            let actual: usize = confusion[c].iter().sum();
            if predicted == 0 && actual == 0 {
                continue;
            }
            present += 1;
            let p = if predicted > 0 { tp / predicted as f64 } else { 0.0 };
            let r = if actual > 0 { tp / actual as f64 } else { 0.0 };
            precision += p;
            recall += r;
            f1 += if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        }
        let present = present.max(1) as f64;

        Self {
            accuracy: accuracy(y_true, y_pred),
            precision: precision / present,
            recall: recall / present,
            f1_score: f1 / present,
            confusion_matrix: confusion,
        }
    }
}

/// Loss history of one model fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub loss_history: Vec<f64>,
    pub best_epoch: Option<usize>,
    pub best_loss: Option<f64>,
}

impl TrainingMetrics {
    pub fn record_epoch(&mut self, loss: f64) {
        self.loss_history.push(loss);
        self.epochs_completed += 1;
        if self.best_loss.is_none_or(|best| loss < best) {
            self.best_loss = Some(loss);
            self.best_epoch = Some(self.epochs_completed);
        }
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss_history.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probs(rows: &[[f64; 2]]) -> Matrix {
        Matrix::from_rows(&rows.iter().map(|r| r.to_vec()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_metric_from_name() {
        assert_eq!(Metric::from_name("Accuracy").unwrap(), Metric::Accuracy);
        assert_eq!(Metric::from_name("neg_log_loss").unwrap(), Metric::NegLogLoss);
        assert!(Metric::from_name("auc_pr").is_err());
    }

    #[test]
    fn test_accuracy_metric() {
        let p = probs(&[[0.9, 0.1], [0.2, 0.8], [0.6, 0.4], [0.3, 0.7]]);
        let score = Metric::Accuracy.evaluate(&[0, 1, 1, 1], &p);
        assert!((score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_neg_log_loss_perfect_is_zero() {
        let p = probs(&[[1.0, 0.0], [0.0, 1.0]]);
        assert!(Metric::NegLogLoss.evaluate(&[0, 1], &p).abs() < 1e-9);
        assert!(Metric::NegLogLoss.evaluate(&[1, 0], &p) < -20.0);
    }

    #[test]
    fn test_empty_labels_score_zero() {
        assert_eq!(Metric::Accuracy.evaluate(&[], &Matrix::zeros(0, 2)), 0.0);
    }

    #[test]
    fn test_binary_f1() {
        let truth = [true, true, false, false];
        let pred = [true, false, true, false];
        assert!((binary_f1(&truth, &pred) - 0.5).abs() < 1e-12);
        assert_eq!(binary_f1(&[false], &[false]), 0.0);
    }

    #[test]
    fn test_classification_metrics_confusion() {
        let m = ClassificationMetrics::compute(&[0, 0, 1, 1], &[0, 1, 1, 1], 2);
        assert_eq!(m.confusion_matrix, vec![vec![1, 1], vec![0, 2]]);
        assert!((m.accuracy - 0.75).abs() < 1e-12);
        // class 0: p=1, r=.5 ; class 1: p=2/3, r=1
        assert!((m.precision - (1.0 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_training_metrics_best_epoch() {
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(0.5);
        metrics.record_epoch(0.3);
        metrics.record_epoch(0.4);
        assert_eq!(metrics.epochs_completed, 3);
        assert_eq!(metrics.best_epoch, Some(2));
        assert_eq!(metrics.best_loss, Some(0.3));
        assert_eq!(metrics.final_loss(), Some(0.4));
    }
}
