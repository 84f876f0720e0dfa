//! Average Marginal Effect: subsets drawn at several inclusion probabilities,
//! then a cross-validated Lasso of subset utility on centred inclusion
//! indicators. The coefficient of point `i` is its value.

use crate::data::Matrix;
use crate::error::DatavalError;
use crate::evaluator::lasso::lasso_cv;
use crate::evaluator::{
    DataEvaluator, ValuationContext, mask_to_indices, require_positive, trained_values,
};
use crate::reproducibility::seeded_rng;
use rand::Rng;

const INCLUSION_PROBABILITIES: [f64; 4] = [0.2, 0.4, 0.6, 0.8];
const LASSO_ALPHAS: usize = 20;
const LASSO_FOLDS: usize = 5;

#[derive(Debug, Clone)]
pub struct Ame {
    num_models: usize,
    values: Option<Vec<f64>>,
}

impl Ame {
    /// `num_models` subsets are drawn per inclusion probability.
    pub fn new(num_models: usize) -> Result<Self, DatavalError> {
        require_positive("AME", "num_models", num_models)?;
        Ok(Self {
            num_models,
            values: None,
        })
    }
}

impl DataEvaluator for Ame {
    fn name(&self) -> String {
        format!("AME(num_models={})", self.num_models)
    }

    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError> {
        ctx.ensure_non_empty("AME")?;
        let n = ctx.num_points();
        let total = INCLUSION_PROBABILITIES.len() * self.num_models;
        let mut rng = seeded_rng(ctx.seed);
        let mut indicators = Matrix::zeros(total, n);
        let mut utilities = Vec::with_capacity(total);

        for (b, p) in INCLUSION_PROBABILITIES
            .iter()
            .flat_map(|&p| std::iter::repeat_n(p, self.num_models))
            .enumerate()
        {
            let mask: Vec<bool> = (0..n).map(|_| rng.gen_bool(p)).collect();
            for (j, &inside) in mask.iter().enumerate() {
                if inside {
                    indicators.set(b, j, 1.0);
                }
            }
            utilities.push(ctx.utility(&mask_to_indices(&mask))?);
        }

        center_columns(&mut indicators);
        let mean_utility = utilities.iter().sum::<f64>() / total as f64;
        utilities.iter_mut().for_each(|u| *u -= mean_utility);

        let fit = lasso_cv(&indicators, &utilities, LASSO_ALPHAS, LASSO_FOLDS);
        tracing::debug!(
            alpha = fit.alpha,
            nonzero = fit.coef.iter().filter(|c| **c != 0.0).count(),
            "AME regression fitted"
        );
        self.values = Some(fit.coef);
        Ok(())
    }

    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError> {
        trained_values(|| self.name(), &self.values)
    }
}

fn center_columns(x: &mut Matrix) {
    let rows = x.rows();
    if rows == 0 {
        return;
    }
    for j in 0..x.cols() {
        let mean = (0..rows).map(|i| x.get(i, j)).sum::<f64>() / rows as f64;
        for i in 0..rows {
            x.set(i, j, x.get(i, j) - mean);
        }
    }
}
