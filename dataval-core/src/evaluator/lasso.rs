//! L1-regularised least squares by cyclic coordinate descent, with the
//! regularisation strength picked by k-fold cross-validation.
//!
//! Objective: `(1 / 2m) ||y - Xw||² + alpha ||w||₁`. Inputs are expected to be
//! centred; no intercept is fitted.

use crate::data::Matrix;

const MAX_ITER: usize = 1_000;
const TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct LassoFit {
    pub alpha: f64,
    pub coef: Vec<f64>,
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// Columns of `x` restricted to `rows`, with the matching targets.
struct Design {
    columns: Vec<Vec<f64>>,
    col_sq: Vec<f64>,
    y: Vec<f64>,
}

impl Design {
    fn new(x: &Matrix, y: &[f64], rows: &[usize]) -> Self {
        let m = rows.len().max(1) as f64;
        let columns: Vec<Vec<f64>> = (0..x.cols())
            .map(|j| rows.iter().map(|&r| x.get(r, j)).collect())
            .collect();
        let col_sq = columns
            .iter()
            .map(|c| c.iter().map(|v| v * v).sum::<f64>() / m)
            .collect();
        Self {
            columns,
            col_sq,
            y: rows.iter().map(|&r| y[r]).collect(),
        }
    }

    /// Cyclic coordinate descent from the current `coef` (warm start).
    fn descend(&self, alpha: f64, coef: &mut [f64]) {
        let m = self.y.len();
        if m == 0 {
            return;
        }
        let m_f = m as f64;
        let mut residual = self.y.clone();
        for (column, &c) in self.columns.iter().zip(coef.iter()) {
            if c != 0.0 {
                for (r, v) in residual.iter_mut().zip(column) {
                    *r -= v * c;
                }
            }
        }

        for _ in 0..MAX_ITER {
            let mut max_change: f64 = 0.0;
            for (j, column) in self.columns.iter().enumerate() {
                if self.col_sq[j] == 0.0 {
                    continue;
                }
                let old = coef[j];
                let rho = column
                    .iter()
                    .zip(&residual)
                    .map(|(v, r)| v * (r + v * old))
                    .sum::<f64>()
                    / m_f;
                let new = soft_threshold(rho, alpha) / self.col_sq[j];
                if new != old {
                    let delta = new - old;
                    for (r, v) in residual.iter_mut().zip(column) {
                        *r -= v * delta;
                    }
                    coef[j] = new;
                    max_change = max_change.max(delta.abs());
                }
            }
            if max_change < TOLERANCE {
                break;
            }
        }
    }

    fn squared_error(&self, coef: &[f64]) -> f64 {
        self.y
            .iter()
            .enumerate()
            .map(|(i, y)| {
                let pred: f64 = self.columns.iter().zip(coef).map(|(c, w)| c[i] * w).sum();
                (y - pred).powi(2)
            })
            .sum()
    }
}

/// Coordinate descent on the rows `rows` of `(x, y)`, from zero.
pub fn lasso(x: &Matrix, y: &[f64], rows: &[usize], alpha: f64) -> Vec<f64> {
    let mut coef = vec![0.0; x.cols()];
    Design::new(x, y, rows).descend(alpha, &mut coef);
    coef
}

/// Smallest alpha at which every coefficient is zero.
pub fn alpha_max(x: &Matrix, y: &[f64]) -> f64 {
    let m = x.rows().max(1) as f64;
    (0..x.cols())
        .map(|j| (0..x.rows()).map(|i| x.get(i, j) * y[i]).sum::<f64>().abs() / m)
        .fold(0.0, f64::max)
}

/// Fit over a log-spaced alpha grid from `alpha_max` down to `alpha_max * 1e-3`,
/// choose the alpha with the lowest mean held-out squared error, refit on all rows.
///
/// Each fold walks the grid from the largest alpha down, warm-starting every
/// fit from the previous solution.
pub fn lasso_cv(x: &Matrix, y: &[f64], n_alphas: usize, folds: usize) -> LassoFit {
    let m = x.rows();
    let top = alpha_max(x, y);
    if top == 0.0 || m < 2 {
        return LassoFit {
            alpha: top,
            coef: vec![0.0; x.cols()],
        };
    }

    let n_alphas = n_alphas.max(2);
    let grid: Vec<f64> = (0..n_alphas)
        .map(|k| top * 10f64.powf(-3.0 * k as f64 / (n_alphas - 1) as f64))
        .collect();
    let folds = folds.clamp(2, m);

    let mut errors = vec![0.0; grid.len()];
    for fold in 0..folds {
        let (held, fit): (Vec<usize>, Vec<usize>) = (0..m).partition(|&i| i % folds == fold);
        let train = Design::new(x, y, &fit);
        let test = Design::new(x, y, &held);
        let mut coef = vec![0.0; x.cols()];
        for (k, &alpha) in grid.iter().enumerate() {
            train.descend(alpha, &mut coef);
            errors[k] += test.squared_error(&coef);
        }
    }

    let best = errors
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(k, _)| k);

    let all: Vec<usize> = (0..m).collect();
    let design = Design::new(x, y, &all);
    let mut coef = vec![0.0; x.cols()];
    for &alpha in &grid[..=best] {
        design.descend(alpha, &mut coef);
    }

    tracing::debug!(
        alpha = grid[best],
        cv_mse = errors[best] / m as f64,
        "Lasso alpha selected"
    );
    LassoFit {
        alpha: grid[best],
        coef,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design() -> (Matrix, Vec<f64>) {
        // y = 2 * x0, x1 is noise-free distraction
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let a = (i as f64 * 0.9).sin();
                let b = (i as f64 * 2.3).cos();
                vec![a, b]
            })
            .collect();
        let y = rows.iter().map(|r| 2.0 * r[0]).collect();
        (Matrix::from_rows(&rows).unwrap(), y)
    }

    #[test]
    fn test_soft_threshold() {
        assert_eq!(soft_threshold(3.0, 1.0), 2.0);
        assert_eq!(soft_threshold(-3.0, 1.0), -2.0);
        assert_eq!(soft_threshold(0.5, 1.0), 0.0);
    }

    #[test]
    fn test_small_alpha_recovers_signal() {
        let (x, y) = design();
        let rows: Vec<usize> = (0..40).collect();
        let coef = lasso(&x, &y, &rows, 1e-6);
        assert!((coef[0] - 2.0).abs() < 0.05, "{coef:?}");
        assert!(coef[1].abs() < 0.05);
    }

    #[test]
    fn test_alpha_max_zeroes_everything() {
        let (x, y) = design();
        let rows: Vec<usize> = (0..40).collect();
        let coef = lasso(&x, &y, &rows, alpha_max(&x, &y) * 1.01);
        assert!(coef.iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_cv_prefers_weak_penalty_for_clean_signal() {
        let (x, y) = design();
        let fit = lasso_cv(&x, &y, 10, 5);
        assert!(fit.coef[0] > 1.5);
    }
}
