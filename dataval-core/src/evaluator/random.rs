//! Random baseline: every point gets an independent uniform value.

use crate::error::DatavalError;
use crate::evaluator::{DataEvaluator, ValuationContext, trained_values};
use crate::reproducibility::seeded_rng;
use rand::Rng;

#[derive(Debug, Clone, Default)]
pub struct RandomEvaluator {
    values: Option<Vec<f64>>,
}

impl RandomEvaluator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataEvaluator for RandomEvaluator {
    fn name(&self) -> String {
        "RandomEvaluator".to_string()
    }

    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError> {
        let mut rng = seeded_rng(ctx.seed);
        self.values = Some((0..ctx.num_points()).map(|_| rng.r#gen::<f64>()).collect());
        Ok(())
    }

    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError> {
        trained_values(|| self.name(), &self.values)
    }
}
