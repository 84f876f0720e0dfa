//! Data Banzhaf: utilities of uniformly random subsets (each point included
//! with probability 1/2), valued as mean utility with the point minus without.

use crate::error::DatavalError;
use crate::evaluator::{
    DataEvaluator, InOutAccumulator, ValuationContext, mask_to_indices, require_positive,
    trained_values,
};
use crate::reproducibility::seeded_rng;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct DataBanzhaf {
    num_models: usize,
    values: Option<Vec<f64>>,
}

impl DataBanzhaf {
    pub fn new(num_models: usize) -> Result<Self, DatavalError> {
        require_positive("DataBanzhaf", "num_models", num_models)?;
        Ok(Self {
            num_models,
            values: None,
        })
    }
}

impl DataEvaluator for DataBanzhaf {
    fn name(&self) -> String {
        format!("DataBanzhaf(num_models={})", self.num_models)
    }

    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError> {
        ctx.ensure_non_empty("DataBanzhaf")?;
        let n = ctx.num_points();
        let mut rng = seeded_rng(ctx.seed);
        let mut acc = InOutAccumulator::new(n);

        for model in 0..self.num_models {
            let mask: Vec<bool> = (0..n).map(|_| rng.gen_bool(0.5)).collect();
            let utility = ctx.utility(&mask_to_indices(&mask))?;
            acc.record(&mask, utility);
            tracing::trace!(model, utility, "DataBanzhaf subset");
        }

        self.values = Some(acc.differences());
        Ok(())
    }

    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError> {
        trained_values(|| self.name(), &self.values)
    }
}
