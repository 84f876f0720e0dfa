//! Subsample influence (Feldman & Zhang): train on random subsets of a fixed
//! size and compare validation utility with and without each point.

use crate::error::DatavalError;
use crate::evaluator::{
    DataEvaluator, InOutAccumulator, ValuationContext, require_positive, require_proportion,
    trained_values,
};
use crate::reproducibility::{choose_distinct, seeded_rng};

#[derive(Debug, Clone)]
pub struct InfluenceSubsample {
    num_models: usize,
    proportion: f64,
    values: Option<Vec<f64>>,
}

impl InfluenceSubsample {
    pub const DEFAULT_PROPORTION: f64 = 0.7;

    pub fn new(num_models: usize, proportion: f64) -> Result<Self, DatavalError> {
        require_positive("InfluenceSubsample", "num_models", num_models)?;
        require_proportion("InfluenceSubsample", "proportion", proportion)?;
        Ok(Self {
            num_models,
            proportion,
            values: None,
        })
    }
}

impl DataEvaluator for InfluenceSubsample {
    fn name(&self) -> String {
        format!(
            "InfluenceSubsample(num_models={},proportion={})",
            self.num_models, self.proportion
        )
    }

    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError> {
        ctx.ensure_non_empty("InfluenceSubsample")?;
        let n = ctx.num_points();
        let size = ((n as f64 * self.proportion).round() as usize).clamp(1, n);
        let mut rng = seeded_rng(ctx.seed);
        let mut acc = InOutAccumulator::new(n);
        let mut mask = vec![false; n];

        for _ in 0..self.num_models {
            let subset = choose_distinct(&mut rng, n, size);
            mask.iter_mut().for_each(|m| *m = false);
            for &i in &subset {
                mask[i] = true;
            }
            acc.record(&mask, ctx.utility(&subset)?);
        }

        self.values = Some(acc.differences());
        Ok(())
    }

    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError> {
        trained_values(|| self.name(), &self.values)
    }
}
