//! One-hidden-layer ReLU classifier.

use crate::data::Matrix;
use crate::error::DatavalError;
use crate::metrics::TrainingMetrics;
use crate::model::{Model, TrainKwargs, check_fit_inputs, check_predict_input, softmax_in_place};
use crate::reproducibility::{seeded_rng, standard_normal};
use rand::seq::SliceRandom;

#[derive(Debug, Clone)]
pub struct ClassifierMlp {
    input_dim: usize,
    hidden_dim: usize,
    num_classes: usize,
    seed: u64,
    /// `input_dim x hidden_dim`
    w1: Vec<f64>,
    b1: Vec<f64>,
    /// `hidden_dim x num_classes`
    w2: Vec<f64>,
    b2: Vec<f64>,
}

impl ClassifierMlp {
    pub const DEFAULT_HIDDEN: usize = 32;

    pub fn new(input_dim: usize, hidden_dim: usize, num_classes: usize, seed: u64) -> Self {
        let mut model = Self {
            input_dim,
            hidden_dim,
            num_classes,
            seed,
            w1: Vec::new(),
            b1: Vec::new(),
            w2: Vec::new(),
            b2: Vec::new(),
        };
        model.reset();
        model
    }

    /// He initialisation from the model seed.
    fn reset(&mut self) {
        let mut rng = seeded_rng(self.seed ^ 0x5eed);
        let s1 = (2.0 / self.input_dim as f64).sqrt();
        let s2 = (2.0 / self.hidden_dim as f64).sqrt();
        self.w1 = (0..self.input_dim * self.hidden_dim)
            .map(|_| s1 * standard_normal(&mut rng))
            .collect();
        self.b1 = vec![0.0; self.hidden_dim];
        self.w2 = (0..self.hidden_dim * self.num_classes)
            .map(|_| s2 * standard_normal(&mut rng))
            .collect();
        self.b2 = vec![0.0; self.num_classes];
    }

    fn forward(&self, row: &[f64], hidden: &mut [f64], out: &mut [f64]) {
        hidden.copy_from_slice(&self.b1);
        for (j, &xj) in row.iter().enumerate() {
            let w = &self.w1[j * self.hidden_dim..(j + 1) * self.hidden_dim];
            for (h, wh) in hidden.iter_mut().zip(w) {
                *h += xj * wh;
            }
        }
        hidden.iter_mut().for_each(|h| *h = h.max(0.0));

        out.copy_from_slice(&self.b2);
        for (h_idx, &h) in hidden.iter().enumerate() {
            if h == 0.0 {
                continue;
            }
            let w = &self.w2[h_idx * self.num_classes..(h_idx + 1) * self.num_classes];
            for (o, wo) in out.iter_mut().zip(w) {
                *o += h * wo;
            }
        }
        softmax_in_place(out);
    }
}

impl Model for ClassifierMlp {
    fn name(&self) -> &str {
        "ClassifierMLP"
    }

    fn fit(
        &mut self,
        x: &Matrix,
        y: &[usize],
        kwargs: &TrainKwargs,
    ) -> Result<TrainingMetrics, DatavalError> {
        check_fit_inputs(self.name(), x, y, self.input_dim, self.num_classes)?;
        kwargs.validate()?;
        self.reset();

        let mut metrics = TrainingMetrics::default();
        if y.is_empty() {
            // Untrained output layer would not be uniform; zero it.
            self.w2.iter_mut().for_each(|w| *w = 0.0);
            return Ok(metrics);
        }

        let (d, h, k) = (self.input_dim, self.hidden_dim, self.num_classes);
        let mut rng = seeded_rng(self.seed);
        let mut order: Vec<usize> = (0..y.len()).collect();
        let mut hidden = vec![0.0; h];
        let mut probs = vec![0.0; k];
        let mut delta_h = vec![0.0; h];
        let mut g_w1 = vec![0.0; d * h];
        let mut g_b1 = vec![0.0; h];
        let mut g_w2 = vec![0.0; h * k];
        let mut g_b2 = vec![0.0; k];

        for _ in 0..kwargs.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(kwargs.batch_size) {
                for g in [&mut g_w1, &mut g_b1, &mut g_w2, &mut g_b2] {
                    g.iter_mut().for_each(|v| *v = 0.0);
                }

                for &i in batch {
                    let row = x.row(i);
                    self.forward(row, &mut hidden, &mut probs);
                    epoch_loss -= probs[y[i]].max(1e-12).ln();
                    probs[y[i]] -= 1.0;

                    for (hi, &hv) in hidden.iter().enumerate() {
                        let w = &self.w2[hi * k..(hi + 1) * k];
                        let back: f64 = w.iter().zip(&probs).map(|(a, b)| a * b).sum();
                        delta_h[hi] = if hv > 0.0 { back } else { 0.0 };
                        let g = &mut g_w2[hi * k..(hi + 1) * k];
                        for (gk, pk) in g.iter_mut().zip(&probs) {
                            *gk += hv * pk;
                        }
                    }
                    for (gb, pk) in g_b2.iter_mut().zip(&probs) {
                        *gb += pk;
                    }
                    for (j, &xj) in row.iter().enumerate() {
                        if xj == 0.0 {
                            continue;
                        }
                        let g = &mut g_w1[j * h..(j + 1) * h];
                        for (gh, dh) in g.iter_mut().zip(&delta_h) {
                            *gh += xj * dh;
                        }
                    }
                    for (gb, dh) in g_b1.iter_mut().zip(&delta_h) {
                        *gb += dh;
                    }
                }

                let step = kwargs.learning_rate / batch.len() as f64;
                for (param, grad) in [
                    (&mut self.w1, &g_w1),
                    (&mut self.b1, &g_b1),
                    (&mut self.w2, &g_w2),
                    (&mut self.b2, &g_b2),
                ] {
                    for (p, g) in param.iter_mut().zip(grad.iter()) {
                        *p -= step * g;
                    }
                }
            }

            metrics.record_epoch(epoch_loss / y.len() as f64);
        }

        Ok(metrics)
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, DatavalError> {
        check_predict_input(self.name(), x, self.input_dim)?;
        let mut hidden = vec![0.0; self.hidden_dim];
        let mut out = Matrix::zeros(x.rows(), self.num_classes);
        for i in 0..x.rows() {
            self.forward(x.row(i), &mut hidden, out.row_mut(i));
        }
        Ok(out)
    }

    fn clone_untrained(&self) -> Box<dyn Model> {
        Box::new(Self::new(
            self.input_dim,
            self.hidden_dim,
            self.num_classes,
            self.seed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metric;

    #[test]
    fn test_learns_xor_like_quadrants() {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..200 {
            let a = if i % 2 == 0 { 1.0 } else { -1.0 };
            let b = if (i / 2) % 2 == 0 { 1.0 } else { -1.0 };
            let jitter = (i as f64 * 0.37).sin() * 0.1;
            rows.push(vec![a + jitter, b - jitter]);
            labels.push(usize::from(a * b > 0.0));
        }
        let x = Matrix::from_rows(&rows).unwrap();
        let mut model = ClassifierMlp::new(2, 32, 2, 3);
        let kwargs = TrainKwargs {
            epochs: 300,
            batch_size: 16,
            learning_rate: 0.1,
        };
        model.fit(&x, &labels, &kwargs).unwrap();
        let acc = Metric::Accuracy.evaluate(&labels, &model.predict(&x).unwrap());
        assert!(acc > 0.9, "accuracy {acc}");
    }

    #[test]
    fn test_empty_fit_predicts_uniform() {
        let mut model = ClassifierMlp::new(3, 8, 2, 0);
        model
            .fit(&Matrix::zeros(0, 3), &[], &TrainKwargs::default())
            .unwrap();
        let p = model.predict(&Matrix::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap()).unwrap();
        assert!((p.get(0, 0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_refit_is_reproducible() {
        let x = Matrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();
        let y = [0, 1, 1];
        let mut model = ClassifierMlp::new(2, 4, 2, 1);
        model.fit(&x, &y, &TrainKwargs::default()).unwrap();
        let first = model.predict(&x).unwrap();
        model.fit(&x, &y, &TrainKwargs::default()).unwrap();
        assert_eq!(first, model.predict(&x).unwrap());
    }
}
