//! Experiment methods: ways of judging a vector of data values against the
//! known noise and against retrained-model performance.
//!
//! Every method returns an [`ExperimentOutput`] of equal-length columns.

use crate::data::DataFetcher;
use crate::error::DatavalError;
use crate::experiment::table::ExperimentOutput;
use crate::metrics::{Metric, binary_f1};
use crate::model::{Model, TrainKwargs};
use crate::reproducibility::seeded_rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Minimum number of points in one removal/inspection bin.
const MIN_BIN: usize = 5;

/// What retraining experiments need besides the data values.
pub struct ExperimentContext<'a> {
    pub fetcher: &'a DataFetcher,
    pub model: &'a dyn Model,
    pub metric: Metric,
    pub train_kwargs: &'a TrainKwargs,
    pub seed: u64,
}

impl ExperimentContext<'_> {
    /// Train on the given training positions, score on the test split.
    fn test_score(&self, subset: &[usize]) -> Result<f64, DatavalError> {
        let train = &self.fetcher.train;
        let mut model = self.model.clone_untrained();
        let y: Vec<usize> = subset.iter().map(|&i| train.y[i]).collect();
        model.fit(&train.x.select_rows(subset), &y, self.train_kwargs)?;
        let y_hat = model.predict(&self.fetcher.test.x)?;
        Ok(self.metric.evaluate(&self.fetcher.test.y, &y_hat))
    }
}

/// Order in which `point_removal` drops points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalOrder {
    Ascending,
    Descending,
    Random,
}

impl RemovalOrder {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
            Self::Random => "random",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ExperimentMethod {
    NoisyDetection,
    DiscoverCorruptedSample {
        #[serde(default = "default_percentile")]
        percentile: f64,
    },
    RemoveHighLow {
        #[serde(default = "default_percentile")]
        percentile: f64,
    },
    PointRemoval {
        #[serde(default = "default_order")]
        order: RemovalOrder,
        #[serde(default = "default_percentile")]
        percentile: f64,
    },
    IncreasingBinRemoval {
        #[serde(default = "default_bin_size")]
        bin_size: usize,
    },
    SaveDataval,
}

fn default_percentile() -> f64 {
    0.05
}

fn default_order() -> RemovalOrder {
    RemovalOrder::Random
}

fn default_bin_size() -> usize {
    20
}

impl ExperimentMethod {
    pub const NAMES: [&'static str; 6] = [
        "noisy_detection",
        "discover_corrupted_sample",
        "remove_high_low",
        "point_removal",
        "increasing_bin_removal",
        "save_dataval",
    ];

    /// Method with default parameters, by name.
    pub fn from_name(name: &str) -> Result<Self, DatavalError> {
        Ok(match name {
            "noisy_detection" => Self::NoisyDetection,
            "discover_corrupted_sample" => Self::DiscoverCorruptedSample {
                percentile: default_percentile(),
            },
            "remove_high_low" => Self::RemoveHighLow {
                percentile: default_percentile(),
            },
            "point_removal" => Self::PointRemoval {
                order: default_order(),
                percentile: default_percentile(),
            },
            "increasing_bin_removal" => Self::IncreasingBinRemoval {
                bin_size: default_bin_size(),
            },
            "save_dataval" => Self::SaveDataval,
            other => {
                return Err(DatavalError::not_found(format!(
                    "experiment method '{other}'"
                )));
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoisyDetection => "noisy_detection",
            Self::DiscoverCorruptedSample { .. } => "discover_corrupted_sample",
            Self::RemoveHighLow { .. } => "remove_high_low",
            Self::PointRemoval { .. } => "point_removal",
            Self::IncreasingBinRemoval { .. } => "increasing_bin_removal",
            Self::SaveDataval => "save_dataval",
        }
    }

    pub fn run(
        &self,
        data_values: &[f64],
        ctx: &ExperimentContext<'_>,
    ) -> Result<ExperimentOutput, DatavalError> {
        if data_values.len() != ctx.fetcher.train.len() {
            return Err(DatavalError::invalid_input(format!(
                "{} data values for {} training points",
                data_values.len(),
                ctx.fetcher.train.len()
            )));
        }
        match *self {
            Self::NoisyDetection => Ok(noisy_detection(data_values, &ctx.fetcher.noisy_indices)),
            Self::DiscoverCorruptedSample { percentile } => {
                discover_corrupted_sample(data_values, &ctx.fetcher.noisy_indices, percentile)
            }
            Self::RemoveHighLow { percentile } => remove_high_low(data_values, ctx, percentile),
            Self::PointRemoval { order, percentile } => {
                point_removal(data_values, ctx, order, percentile)
            }
            Self::IncreasingBinRemoval { bin_size } => {
                increasing_bin_removal(data_values, ctx, bin_size)
            }
            Self::SaveDataval => Ok(save_dataval(data_values, &ctx.fetcher.train_indices)),
        }
    }
}

/// Points per bin: `max(round(n · percentile), 5)`.
pub fn bin_width(num_points: usize, percentile: f64) -> Result<usize, DatavalError> {
    if !(percentile > 0.0 && percentile <= 1.0) {
        return Err(DatavalError::invalid_input(format!(
            "percentile must be in (0, 1], got {percentile}"
        )));
    }
    Ok(((num_points as f64 * percentile).round() as usize).max(MIN_BIN))
}

/// Positions sorted by ascending value; ties keep position order.
fn ascending(data_values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..data_values.len()).collect();
    order.sort_by(|&a, &b| data_values[a].total_cmp(&data_values[b]));
    order
}

/// Two-means clustering of scalars. Returns `true` for members of the
/// cluster with the lower centre.
pub fn two_means_low_cluster(values: &[f64]) -> Vec<bool> {
    let (Some(lo), Some(hi)) = (
        values.iter().copied().reduce(f64::min),
        values.iter().copied().reduce(f64::max),
    ) else {
        return Vec::new();
    };
    let (mut low, mut high) = (lo, hi);
    let mut assignment: Vec<bool> = values.iter().map(|_| true).collect();

    for _ in 0..100 {
        let next: Vec<bool> = values
            .iter()
            .map(|v| (v - low).abs() <= (v - high).abs())
            .collect();
        let changed = next != assignment;
        assignment = next;

        let centre = |flag: bool| {
            let (sum, count) = values
                .iter()
                .zip(&assignment)
                .filter(|(_, a)| **a == flag)
                .fold((0.0, 0usize), |(s, c), (v, _)| (s + v, c + 1));
            (count > 0).then(|| sum / count as f64)
        };
        low = centre(true).unwrap_or(low);
        high = centre(false).unwrap_or(high);
        if !changed {
            break;
        }
    }
    assignment
}

/// F1 of "low-value cluster" against the known noisy positions → `kmeans_f1`.
pub fn noisy_detection(data_values: &[f64], noisy_indices: &[usize]) -> ExperimentOutput {
    let predicted = two_means_low_cluster(data_values);
    let mut truth = vec![false; data_values.len()];
    for &i in noisy_indices {
        if let Some(t) = truth.get_mut(i) {
            *t = true;
        }
    }
    ExperimentOutput::new().with_column("kmeans_f1", vec![binary_f1(&truth, &predicted)])
}

/// Fraction of noisy points found when inspecting points from lowest value up.
pub fn discover_corrupted_sample(
    data_values: &[f64],
    noisy_indices: &[usize],
    percentile: f64,
) -> Result<ExperimentOutput, DatavalError> {
    let n = data_values.len();
    let width = bin_width(n, percentile)?;
    let order = ascending(data_values);
    let mut is_noisy = vec![false; n];
    for &i in noisy_indices {
        if let Some(flag) = is_noisy.get_mut(i) {
            *flag = true;
        }
    }
    let total_noisy = is_noisy.iter().filter(|f| **f).count();
    let noise_rate = total_noisy as f64 / n.max(1) as f64;

    let mut found = Vec::new();
    let mut axis = Vec::new();
    let mut optimal = Vec::new();
    for bin in 0..=n.div_ceil(width) {
        let inspected = (bin * width).min(n);
        let hits = order[..inspected].iter().filter(|&&i| is_noisy[i]).count();
        let fraction = inspected as f64 / n.max(1) as f64;
        found.push(if total_noisy == 0 {
            0.0
        } else {
            hits as f64 / total_noisy as f64
        });
        optimal.push(if noise_rate > 0.0 {
            (fraction / noise_rate).min(1.0)
        } else {
            0.0
        });
        axis.push(fraction);
    }

    Ok(ExperimentOutput::new()
        .with_column("corrupt_found", found)
        .with_column("axis", axis.clone())
        .with_column("optimal", optimal)
        .with_column("random", axis))
}

/// Retrain after dropping the most (or least) valuable bins, score on test.
pub fn remove_high_low(
    data_values: &[f64],
    ctx: &ExperimentContext<'_>,
    percentile: f64,
) -> Result<ExperimentOutput, DatavalError> {
    let n = data_values.len();
    let width = bin_width(n, percentile)?;
    let bins = n.div_ceil(width);
    let order = ascending(data_values);
    let metric = ctx.metric.name();

    let mut least_removed = Vec::with_capacity(bins);
    let mut most_removed = Vec::with_capacity(bins);
    let mut axis = Vec::with_capacity(bins);
    for bin in 0..bins {
        let cut = bin * width;
        least_removed.push(ctx.test_score(&order[cut..])?);
        most_removed.push(ctx.test_score(&order[..n - cut])?);
        axis.push(cut as f64 / n as f64);
        tracing::trace!(bin, bins, "remove_high_low");
    }

    Ok(ExperimentOutput::new()
        .with_column(format!("remove_mostval_{metric}"), most_removed)
        .with_column(format!("remove_leastval_{metric}"), least_removed)
        .with_column("axis", axis))
}

/// Retrain after removing a growing prefix of points in the given order.
pub fn point_removal(
    data_values: &[f64],
    ctx: &ExperimentContext<'_>,
    order: RemovalOrder,
    percentile: f64,
) -> Result<ExperimentOutput, DatavalError> {
    let n = data_values.len();
    let width = bin_width(n, percentile)?;
    let mut sequence = ascending(data_values);
    match order {
        RemovalOrder::Ascending => {}
        RemovalOrder::Descending => sequence.reverse(),
        RemovalOrder::Random => sequence.shuffle(&mut seeded_rng(ctx.seed)),
    }

    let mut scores = Vec::new();
    let mut axis = Vec::new();
    for bin in 0..=n.div_ceil(width) {
        let removed = (bin * width).min(n);
        scores.push(ctx.test_score(&sequence[removed..])?);
        axis.push(removed as f64 / n.max(1) as f64);
    }

    Ok(ExperimentOutput::new()
        .with_column(format!("{}_add_{}", order.name(), ctx.metric.name()), scores)
        .with_column("axis", axis))
}

/// For rising value thresholds, keep only points valued at or below the
/// threshold and score a retrained model.
pub fn increasing_bin_removal(
    data_values: &[f64],
    ctx: &ExperimentContext<'_>,
    bin_size: usize,
) -> Result<ExperimentOutput, DatavalError> {
    if bin_size == 0 {
        return Err(DatavalError::invalid_input("bin_size must be at least 1"));
    }
    let n = data_values.len();
    if n == 0 {
        return Ok(ExperimentOutput::new()
            .with_column("frac_datapoints_explored", Vec::new())
            .with_column(format!("{}_at_datavalues", ctx.metric.name()), Vec::new())
            .with_column("axis", Vec::new()));
    }
    let mut sorted = data_values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mut ends: Vec<usize> = (MIN_BIN.min(n - 1)..n - 1).step_by(bin_size).collect();
    ends.push(n - 1);

    let mut explored = Vec::with_capacity(ends.len());
    let mut scores = Vec::with_capacity(ends.len());
    let mut axis = Vec::with_capacity(ends.len());
    for end in ends {
        let threshold = sorted[end];
        let kept: Vec<usize> = (0..n).filter(|&i| data_values[i] <= threshold).collect();
        explored.push(kept.len() as f64 / n as f64);
        scores.push(ctx.test_score(&kept)?);
        axis.push(threshold);
    }

    Ok(ExperimentOutput::new()
        .with_column("frac_datapoints_explored", explored)
        .with_column(format!("{}_at_datavalues", ctx.metric.name()), scores)
        .with_column("axis", axis))
}

/// Data values alongside the original dataset index of each training point.
pub fn save_dataval(data_values: &[f64], train_indices: &[usize]) -> ExperimentOutput {
    ExperimentOutput::new()
        .with_column(
            "indices",
            train_indices.iter().map(|&i| i as f64).collect(),
        )
        .with_column("data_values", data_values.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, Matrix};
    use crate::model::LogisticRegression;
    use pretty_assertions::assert_eq;

    fn fetcher(n: usize) -> DataFetcher {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                vec![sign * (1.0 + (i as f64 * 0.3).sin() * 0.2)]
            })
            .collect();
        let labels = (0..n).map(|i| i % 2).collect();
        let dataset = Dataset::new(Matrix::from_rows(&rows).unwrap(), labels).unwrap();
        DataFetcher::from_dataset("toy", dataset, 0)
            .split_dataset_by_count(n / 2, n / 4, n / 4)
            .unwrap()
    }

    #[test]
    fn test_bin_width_has_floor() {
        assert_eq!(bin_width(1000, 0.05).unwrap(), 50);
        assert_eq!(bin_width(40, 0.05).unwrap(), 5);
        assert!(bin_width(10, 0.0).is_err());
    }

    #[test]
    fn test_two_means_separates_groups() {
        let values = [0.01, 0.02, 0.9, 0.95, 0.03, 1.0];
        assert_eq!(
            two_means_low_cluster(&values),
            vec![true, true, false, false, true, false]
        );
        assert!(two_means_low_cluster(&[]).is_empty());
    }

    #[test]
    fn test_noisy_detection_perfect_separation() {
        let values = [-1.0, 0.9, -0.8, 1.0, 0.95];
        let out = noisy_detection(&values, &[0, 2]);
        assert_eq!(out.column("kmeans_f1"), Some(&[1.0][..]));
    }

    #[test]
    fn test_discover_corrupted_sample_curve() {
        // 10 points, noisy ones have the lowest values.
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let out = discover_corrupted_sample(&values, &[0, 1], 0.5).unwrap();
        assert_eq!(out.column("axis"), Some(&[0.0, 0.5, 1.0][..]));
        assert_eq!(out.column("corrupt_found"), Some(&[0.0, 1.0, 1.0][..]));
        assert_eq!(out.column("optimal"), Some(&[0.0, 1.0, 1.0][..]));
        assert_eq!(out.len().unwrap(), 3);
    }

    #[test]
    fn test_discover_inspects_trailing_partial_bin() {
        // Width 5 does not divide 12; the only noisy point sits in the last two.
        let values: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let out = discover_corrupted_sample(&values, &[11], 0.05).unwrap();
        assert_eq!(
            out.column("axis"),
            Some(&[0.0, 5.0 / 12.0, 10.0 / 12.0, 1.0][..])
        );
        assert_eq!(out.column("corrupt_found"), Some(&[0.0, 0.0, 0.0, 1.0][..]));
    }

    #[test]
    fn test_remove_high_low_counts_partial_bin() {
        let fetcher = fetcher(24);
        let model = LogisticRegression::new(1, 2, 0);
        let kwargs = TrainKwargs::default();
        let ctx = ExperimentContext {
            fetcher: &fetcher,
            model: &model,
            metric: Metric::Accuracy,
            train_kwargs: &kwargs,
            seed: 0,
        };
        let values: Vec<f64> = (0..fetcher.train.len()).map(|i| i as f64).collect();
        assert_eq!(values.len(), 12);

        let out = remove_high_low(&values, &ctx, 0.05).unwrap();
        assert_eq!(
            out.column("axis"),
            Some(&[0.0, 5.0 / 12.0, 10.0 / 12.0][..])
        );
    }

    #[test]
    fn test_save_dataval_columns() {
        let out = save_dataval(&[0.5, 0.25], &[7, 3]);
        assert_eq!(out.column_names(), vec!["indices", "data_values"]);
        assert_eq!(out.column("indices"), Some(&[7.0, 3.0][..]));
    }

    #[test]
    fn test_retraining_methods_shapes() {
        let fetcher = fetcher(80);
        let model = LogisticRegression::new(1, 2, 0);
        let kwargs = TrainKwargs::default();
        let ctx = ExperimentContext {
            fetcher: &fetcher,
            model: &model,
            metric: Metric::Accuracy,
            train_kwargs: &kwargs,
            seed: 0,
        };
        let values: Vec<f64> = (0..fetcher.train.len()).map(|i| i as f64).collect();

        let out = ExperimentMethod::RemoveHighLow { percentile: 0.25 }
            .run(&values, &ctx)
            .unwrap();
        assert_eq!(
            out.column_names(),
            vec!["remove_mostval_accuracy", "remove_leastval_accuracy", "axis"]
        );
        assert_eq!(out.len().unwrap(), 4);
        // Nothing removed in the first bin: both curves start equal.
        let most = out.column("remove_mostval_accuracy").unwrap();
        let least = out.column("remove_leastval_accuracy").unwrap();
        assert_eq!(most[0], least[0]);

        let out = ExperimentMethod::PointRemoval {
            order: RemovalOrder::Descending,
            percentile: 0.25,
        }
        .run(&values, &ctx)
        .unwrap();
        assert_eq!(out.column_names(), vec!["descending_add_accuracy", "axis"]);
        assert_eq!(out.column("axis").unwrap().last(), Some(&1.0));

        let out = ExperimentMethod::IncreasingBinRemoval { bin_size: 10 }
            .run(&values, &ctx)
            .unwrap();
        let explored = out.column("frac_datapoints_explored").unwrap();
        assert_eq!(explored.last(), Some(&1.0));
        assert!(explored.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_value_count_mismatch_rejected() {
        let fetcher = fetcher(40);
        let model = LogisticRegression::new(1, 2, 0);
        let kwargs = TrainKwargs::default();
        let ctx = ExperimentContext {
            fetcher: &fetcher,
            model: &model,
            metric: Metric::Accuracy,
            train_kwargs: &kwargs,
            seed: 0,
        };
        assert!(ExperimentMethod::SaveDataval.run(&[1.0], &ctx).is_err());
    }

    #[test]
    fn test_method_names_resolve() {
        for name in ExperimentMethod::NAMES {
            assert_eq!(ExperimentMethod::from_name(name).unwrap().name(), name);
        }
        assert!(ExperimentMethod::from_name("plot").is_err());
    }
}
