//! Leave-one-out: the drop in utility when a single point is removed.

use crate::error::DatavalError;
use crate::evaluator::{DataEvaluator, ValuationContext, trained_values};

#[derive(Debug, Clone, Default)]
pub struct LeaveOneOut {
    values: Option<Vec<f64>>,
}

impl LeaveOneOut {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataEvaluator for LeaveOneOut {
    fn name(&self) -> String {
        "LeaveOneOut".to_string()
    }

    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError> {
        ctx.ensure_non_empty("LeaveOneOut")?;
        let n = ctx.num_points();
        let all: Vec<usize> = (0..n).collect();
        let full = ctx.utility(&all)?;

        let mut values = Vec::with_capacity(n);
        let mut subset = Vec::with_capacity(n.saturating_sub(1));
        for i in 0..n {
            subset.clear();
            subset.extend(all.iter().copied().filter(|&j| j != i));
            values.push(full - ctx.utility(&subset)?);
            if (i + 1) % 100 == 0 {
                tracing::debug!(done = i + 1, total = n, "LeaveOneOut progress");
            }
        }
        self.values = Some(values);
        Ok(())
    }

    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError> {
        trained_values(|| self.name(), &self.values)
    }
}
