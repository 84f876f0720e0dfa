//! Data-OOB: bootstrap bagging, where each point is valued by how often the
//! models that never saw it classify it correctly.

use crate::error::DatavalError;
use crate::evaluator::{
    DataEvaluator, ValuationContext, require_positive, require_proportion, trained_values,
};
use crate::reproducibility::seeded_rng;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct DataOob {
    num_models: usize,
    proportion: f64,
    values: Option<Vec<f64>>,
}

impl DataOob {
    pub const DEFAULT_PROPORTION: f64 = 1.0;

    pub fn new(num_models: usize, proportion: f64) -> Result<Self, DatavalError> {
        require_positive("DataOob", "num_models", num_models)?;
        require_proportion("DataOob", "proportion", proportion)?;
        Ok(Self {
            num_models,
            proportion,
            values: None,
        })
    }
}

impl DataEvaluator for DataOob {
    fn name(&self) -> String {
        format!(
            "DataOob(num_models={},proportion={})",
            self.num_models, self.proportion
        )
    }

    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError> {
        ctx.ensure_non_empty("DataOob")?;
        let n = ctx.num_points();
        let bag_size = ((n as f64 * self.proportion).round() as usize).max(1);
        let mut rng = seeded_rng(ctx.seed);
        let mut correct = vec![0usize; n];
        let mut seen_oob = vec![0usize; n];
        let mut in_bag = vec![false; n];

        for _ in 0..self.num_models {
            in_bag.iter_mut().for_each(|b| *b = false);
            let bag: Vec<usize> = (0..bag_size).map(|_| rng.gen_range(0..n)).collect();
            for &i in &bag {
                in_bag[i] = true;
            }
            let oob: Vec<usize> = (0..n).filter(|&i| !in_bag[i]).collect();
            if oob.is_empty() {
                continue;
            }

            let model = ctx.train_on(&bag)?;
            let predicted = model.predict(&ctx.x_train.select_rows(&oob))?.argmax_rows();
            for (&i, &label) in oob.iter().zip(&predicted) {
                seen_oob[i] += 1;
                if label == ctx.y_train[i] {
                    correct[i] += 1;
                }
            }
        }

        let scored: Vec<f64> = (0..n)
            .filter(|&i| seen_oob[i] > 0)
            .map(|i| correct[i] as f64 / seen_oob[i] as f64)
            .collect();
        // Points never out of bag get the mean of the scored ones.
        let fallback = if scored.is_empty() {
            0.0
        } else {
            scored.iter().sum::<f64>() / scored.len() as f64
        };
        let never = seen_oob.iter().filter(|&&c| c == 0).count();
        if never > 0 {
            tracing::debug!(points = never, fallback, "DataOob points never out of bag");
        }

        self.values = Some(
            (0..n)
                .map(|i| {
                    if seen_oob[i] > 0 {
                        correct[i] as f64 / seen_oob[i] as f64
                    } else {
                        fallback
                    }
                })
                .collect(),
        );
        Ok(())
    }

    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError> {
        trained_values(|| self.name(), &self.values)
    }
}
