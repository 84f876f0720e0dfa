//! Exact Shapley values of an unweighted K-nearest-neighbour classifier
//! (Jia et al. 2019), computed by the sorted recursion. No model is trained.

use crate::error::DatavalError;
use crate::evaluator::{DataEvaluator, ValuationContext, require_positive, trained_values};

#[derive(Debug, Clone)]
pub struct KnnShapley {
    k_neighbors: usize,
    values: Option<Vec<f64>>,
}

impl KnnShapley {
    pub const DEFAULT_K: usize = 10;

    pub fn new(k_neighbors: usize) -> Result<Self, DatavalError> {
        require_positive("KNNShapley", "k_neighbors", k_neighbors)?;
        Ok(Self {
            k_neighbors,
            values: None,
        })
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

impl DataEvaluator for KnnShapley {
    fn name(&self) -> String {
        format!("KNNShapley(k_neighbors={})", self.k_neighbors)
    }

    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError> {
        ctx.ensure_non_empty("KNNShapley")?;
        let n = ctx.num_points();
        let k = self.k_neighbors as f64;
        let mut totals = vec![0.0; n];
        let mut order: Vec<usize> = (0..n).collect();
        let mut distances = vec![0.0; n];
        let mut shapley = vec![0.0; n];

        for (v, &y_valid) in ctx.y_valid.iter().enumerate() {
            let query = ctx.x_valid.row(v);
            for (i, d) in distances.iter_mut().enumerate() {
                *d = squared_distance(ctx.x_train.row(i), query);
            }
            order.sort_by(|&a, &b| distances[a].total_cmp(&distances[b]).then(a.cmp(&b)));

            let matches = |rank: usize| f64::from(u8::from(ctx.y_train[order[rank]] == y_valid));
            shapley[n - 1] = matches(n - 1) / n as f64;
            for rank in (0..n - 1).rev() {
                let position = (rank + 1) as f64;
                shapley[rank] = shapley[rank + 1]
                    + (matches(rank) - matches(rank + 1)) / k * k.min(position) / position;
            }
            for (rank, &i) in order.iter().enumerate() {
                totals[i] += shapley[rank];
            }
        }

        let m = ctx.y_valid.len().max(1) as f64;
        self.values = Some(totals.into_iter().map(|t| t / m).collect());
        Ok(())
    }

    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError> {
        trained_values(|| self.name(), &self.values)
    }
}
