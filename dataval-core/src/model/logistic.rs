//! Multinomial logistic regression trained with mini-batch SGD.

use crate::data::Matrix;
use crate::error::DatavalError;
use crate::metrics::TrainingMetrics;
use crate::model::{Model, TrainKwargs, check_fit_inputs, check_predict_input, softmax_in_place};
use crate::reproducibility::seeded_rng;
use rand::seq::SliceRandom;

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    input_dim: usize,
    num_classes: usize,
    seed: u64,
    /// `input_dim x num_classes`, row-major.
    weights: Vec<f64>,
    bias: Vec<f64>,
}

impl LogisticRegression {
    pub fn new(input_dim: usize, num_classes: usize, seed: u64) -> Self {
        Self {
            input_dim,
            num_classes,
            seed,
            weights: vec![0.0; input_dim * num_classes],
            bias: vec![0.0; num_classes],
        }
    }

    fn logits(&self, row: &[f64], out: &mut [f64]) {
        out.copy_from_slice(&self.bias);
        for (j, &xj) in row.iter().enumerate() {
            if xj == 0.0 {
                continue;
            }
            let w = &self.weights[j * self.num_classes..(j + 1) * self.num_classes];
            for (o, wk) in out.iter_mut().zip(w) {
                *o += xj * wk;
            }
        }
    }
}

impl Model for LogisticRegression {
    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn fit(
        &mut self,
        x: &Matrix,
        y: &[usize],
        kwargs: &TrainKwargs,
    ) -> Result<TrainingMetrics, DatavalError> {
        check_fit_inputs(self.name(), x, y, self.input_dim, self.num_classes)?;
        kwargs.validate()?;
        self.weights.iter_mut().for_each(|w| *w = 0.0);
        self.bias.iter_mut().for_each(|b| *b = 0.0);

        let mut metrics = TrainingMetrics::default();
        if y.is_empty() {
            return Ok(metrics);
        }

        let k = self.num_classes;
        let mut rng = seeded_rng(self.seed);
        let mut order: Vec<usize> = (0..y.len()).collect();
        let mut probs = vec![0.0; k];
        let mut grad_w = vec![0.0; self.weights.len()];
        let mut grad_b = vec![0.0; k];

        for _ in 0..kwargs.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(kwargs.batch_size) {
                grad_w.iter_mut().for_each(|g| *g = 0.0);
                grad_b.iter_mut().for_each(|g| *g = 0.0);

                for &i in batch {
                    let row = x.row(i);
                    self.logits(row, &mut probs);
                    softmax_in_place(&mut probs);
                    epoch_loss -= probs[y[i]].max(1e-12).ln();

                    // d(CE)/d(logit) = p - onehot(y)
                    probs[y[i]] -= 1.0;
                    for (j, &xj) in row.iter().enumerate() {
                        if xj == 0.0 {
                            continue;
                        }
                        let g = &mut grad_w[j * k..(j + 1) * k];
                        for (gk, pk) in g.iter_mut().zip(&probs) {
                            *gk += xj * pk;
                        }
                    }
                    for (gb, pk) in grad_b.iter_mut().zip(&probs) {
                        *gb += pk;
                    }
                }

                let step = kwargs.learning_rate / batch.len() as f64;
                for (w, g) in self.weights.iter_mut().zip(&grad_w) {
                    *w -= step * g;
                }
                for (b, g) in self.bias.iter_mut().zip(&grad_b) {
                    *b -= step * g;
                }
            }

            metrics.record_epoch(epoch_loss / y.len() as f64);
        }

        Ok(metrics)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, DatavalError> {
        check_predict_input(self.name(), x, self.input_dim)?;
        let mut out = Matrix::zeros(x.rows(), self.num_classes);
        for i in 0..x.rows() {
            let row = out.row_mut(i);
            self.logits(x.row(i), row);
            softmax_in_place(row);
        }
        Ok(out)
    }

    fn clone_untrained(&self) -> Box<dyn Model> {
        Box::new(Self::new(self.input_dim, self.num_classes, self.seed))
    }
}
