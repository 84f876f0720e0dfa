//! Truncated Monte-Carlo marginal contribution sampling and the semivalues
//! built on it: Data Shapley (uniform cardinality weights) and Beta Shapley.

use crate::error::DatavalError;
use crate::evaluator::{DataEvaluator, ValuationContext, require_positive, trained_values};
use crate::reproducibility::seeded_rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

/// Number of chains the permutation history is split into for Gelman-Rubin.
const GR_CHAINS: usize = 10;

/// Samples marginal contributions `u(S ∪ {i}) - u(S)` along random permutations.
///
/// Sampling stops after `mc_epochs` permutations, or earlier once at least
/// `min_samples` permutations have been drawn and the Gelman-Rubin statistic
/// of every point falls below `gr_threshold`. Within a permutation, once the
/// prefix utility is within `truncation_tolerance` (relative) of the full-data
/// utility, remaining contributions are recorded as zero without training.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapleySampler {
    pub mc_epochs: usize,
    pub min_samples: usize,
    pub gr_threshold: f64,
    pub truncation_tolerance: f64,
}

impl Default for ShapleySampler {
    fn default() -> Self {
        Self {
            mc_epochs: 100,
            min_samples: 20,
            gr_threshold: 1.05,
            truncation_tolerance: 1e-3,
        }
    }
}

/// Per-point sums of sampled marginal contributions, keyed by the
/// cardinalities actually observed.
///
/// Each permutation adds one cell per point, so a point holds at most
/// `min(n, permutations)` cells.
#[derive(Debug, Clone)]
pub struct MarginalTable {
    cells: Vec<BTreeMap<usize, (f64, usize)>>,
    permutations: usize,
}

impl MarginalTable {
    fn new(n: usize) -> Self {
        Self {
            cells: vec![BTreeMap::new(); n],
            permutations: 0,
        }
    }

    fn add(&mut self, point: usize, cardinality: usize, marginal: f64) {
        let (sum, count) = self.cells[point].entry(cardinality).or_insert((0.0, 0));
        *sum += marginal;
        *count += 1;
    }

    pub fn permutations(&self) -> usize {
        self.permutations
    }

    /// Weighted semivalue per point: `Σ_j w_j · mean_marginal(i, j)`,
    /// renormalised over the cardinalities actually observed for `i`.
    pub fn semivalues(&self, weights: &[f64]) -> Vec<f64> {
        debug_assert_eq!(weights.len(), self.cells.len());
        self.cells
            .iter()
            .map(|cells| {
                let mut value = 0.0;
                let mut mass = 0.0;
                for (&j, &(sum, count)) in cells {
                    let w = weights.get(j).copied().unwrap_or(0.0);
                    value += w * sum / count as f64;
                    mass += w;
                }
                if mass > 0.0 { value / mass } else { 0.0 }
            })
            .collect()
    }
}

impl ShapleySampler {
    /// Constructor arguments as they appear in evaluator identities.
    pub fn describe(&self) -> String {
        format!(
            "mc_epochs={},min_samples={},gr_threshold={},truncation_tolerance={}",
            self.mc_epochs, self.min_samples, self.gr_threshold, self.truncation_tolerance
        )
    }

    pub fn validate(&self, evaluator: &str) -> Result<(), DatavalError> {
        require_positive(evaluator, "mc_epochs", self.mc_epochs)?;
        if !(self.gr_threshold >= 1.0) {
            return Err(DatavalError::invalid_input(format!(
                "{evaluator}: gr_threshold must be >= 1, got {}",
                self.gr_threshold
            )));
        }
        if !(self.truncation_tolerance >= 0.0) {
            return Err(DatavalError::invalid_input(format!(
                "{evaluator}: truncation_tolerance must be >= 0"
            )));
        }
        Ok(())
    }

    pub fn sample(&self, ctx: &ValuationContext<'_>) -> Result<MarginalTable, DatavalError> {
        let n = ctx.num_points();
        let mut rng = seeded_rng(ctx.seed);
        let mut table = MarginalTable::new(n);
        let mut order: Vec<usize> = (0..n).collect();
        let full = ctx.utility(&order)?;
        let empty = ctx.utility(&[])?;
        let mut history: Vec<Vec<f64>> = Vec::new();

        for epoch in 0..self.mc_epochs {
            order.shuffle(&mut rng);
            let mut marginals = vec![0.0; n];
            let mut prev = empty;
            let mut truncated = false;

            for card in 0..n {
                let point = order[card];
                let marginal = if truncated {
                    0.0
                } else {
                    let curr = ctx.utility(&order[..=card])?;
                    let m = curr - prev;
                    prev = curr;
                    truncated = (full - curr).abs() <= self.truncation_tolerance * full.abs();
                    m
                };
                table.add(point, card, marginal);
                marginals[point] = marginal;
            }
            history.push(marginals);
            table.permutations = epoch + 1;

            if epoch + 1 >= self.min_samples.max(2 * GR_CHAINS) {
                let r_hat = gelman_rubin(&history, GR_CHAINS);
                tracing::debug!(permutations = epoch + 1, r_hat, "Marginal sampling");
                if r_hat < self.gr_threshold {
                    break;
                }
            }
        }

        tracing::debug!(
            permutations = table.permutations,
            full_utility = full,
            "Marginal sampling finished"
        );
        Ok(table)
    }
}

/// Largest potential scale reduction factor over all points.
///
/// `history[t][i]` is the marginal of point `i` in permutation `t`; the
/// permutations are split into `chains` contiguous chains of equal length.
/// Returns infinity while a chain holds fewer than two samples.
pub fn gelman_rubin(history: &[Vec<f64>], chains: usize) -> f64 {
    let per_chain = if chains == 0 { 0 } else { history.len() / chains };
    if per_chain < 2 {
        return f64::INFINITY;
    }
    let n_points = history.first().map_or(0, Vec::len);
    let len = per_chain as f64;

    let mut worst: f64 = 1.0;
    for i in 0..n_points {
        let mut chain_means = Vec::with_capacity(chains);
        let mut within = 0.0;
        for c in 0..chains {
            let samples = &history[c * per_chain..(c + 1) * per_chain];
            let mean = samples.iter().map(|s| s[i]).sum::<f64>() / len;
            let var = samples.iter().map(|s| (s[i] - mean).powi(2)).sum::<f64>() / (len - 1.0);
            chain_means.push(mean);
            within += var;
        }
        within /= chains as f64;
        if within <= f64::EPSILON {
            continue;
        }
        let grand = chain_means.iter().sum::<f64>() / chains as f64;
        let between = len
            * chain_means.iter().map(|m| (m - grand).powi(2)).sum::<f64>()
            / (chains as f64 - 1.0);
        let pooled = (len - 1.0) / len * within + between / len;
        worst = worst.max((pooled / within).sqrt());
    }
    worst
}

/// TMC Data Shapley.
#[derive(Debug, Clone, Default)]
pub struct DataShapley {
    sampler: ShapleySampler,
    values: Option<Vec<f64>>,
}

impl DataShapley {
    pub fn new(sampler: ShapleySampler) -> Result<Self, DatavalError> {
        sampler.validate("DataShapley")?;
        Ok(Self {
            sampler,
            values: None,
        })
    }
}

impl DataEvaluator for DataShapley {
    fn name(&self) -> String {
        format!("DataShapley({})", self.sampler.describe())
    }

    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError> {
        ctx.ensure_non_empty("DataShapley")?;
        let table = self.sampler.sample(ctx)?;
        let n = ctx.num_points();
        self.values = Some(table.semivalues(&vec![1.0 / n as f64; n]));
        Ok(())
    }

    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError> {
        trained_values(|| self.name(), &self.values)
    }
}

/// Beta Shapley: marginals at cardinality `j` weighted by the Beta(α, β)
/// beta-binomial mass. `α > β` emphasises small subsets.
#[derive(Debug, Clone)]
pub struct BetaShapley {
    alpha: f64,
    beta: f64,
    sampler: ShapleySampler,
    values: Option<Vec<f64>>,
}

impl BetaShapley {
    pub const DEFAULT_ALPHA: f64 = 4.0;
    pub const DEFAULT_BETA: f64 = 1.0;

    pub fn new(alpha: f64, beta: f64, sampler: ShapleySampler) -> Result<Self, DatavalError> {
        if !(alpha > 0.0 && beta > 0.0) {
            return Err(DatavalError::invalid_input(format!(
                "BetaShapley: alpha and beta must be positive, got ({alpha}, {beta})"
            )));
        }
        sampler.validate("BetaShapley")?;
        Ok(Self {
            alpha,
            beta,
            sampler,
            values: None,
        })
    }

    /// `w_j = C(n-1, j) · B(j + β, n - 1 - j + α) / B(α, β)` for `j` in `0..n`.
    pub fn weights(&self, n: usize) -> Vec<f64> {
        let m = n.saturating_sub(1) as f64;
        let norm = ln_beta(self.alpha, self.beta);
        (0..n)
            .map(|j| {
                let j = j as f64;
                let ln_choose = ln_gamma(m + 1.0) - ln_gamma(j + 1.0) - ln_gamma(m - j + 1.0);
                (ln_choose + ln_beta(j + self.beta, m - j + self.alpha) - norm).exp()
            })
            .collect()
    }
}

impl DataEvaluator for BetaShapley {
    fn name(&self) -> String {
        format!(
            "BetaShapley(alpha={},beta={},{})",
            self.alpha,
            self.beta,
            self.sampler.describe()
        )
    }

    fn train_data_values(&mut self, ctx: &ValuationContext<'_>) -> Result<(), DatavalError> {
        ctx.ensure_non_empty("BetaShapley")?;
        let table = self.sampler.sample(ctx)?;
        self.values = Some(table.semivalues(&self.weights(ctx.num_points())));
        Ok(())
    }

    fn evaluate_data_values(&self) -> Result<Vec<f64>, DatavalError> {
        trained_values(|| self.name(), &self.values)
    }
}

fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// Lanczos approximation (g = 7, n = 9) of `ln Γ(x)` for `x > 0`.
fn ln_gamma(x: f64) -> f64 {
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = COEF[0];
    let t = x + 7.5;
    for (i, &c) in COEF.iter().enumerate().skip(1) {
        acc += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::test_support::{Fixture, mean};

    fn quick() -> ShapleySampler {
        ShapleySampler {
            mc_epochs: 25,
            min_samples: 20,
            ..ShapleySampler::default()
        }
    }

    #[test]
    fn test_ln_gamma_matches_factorials() {
        assert!(ln_gamma(1.0).abs() < 1e-10);
        assert!((ln_gamma(5.0) - 24f64.ln()).abs() < 1e-10);
        assert!((ln_gamma(0.5) - std::f64::consts::PI.sqrt().ln()).abs() < 1e-10);
    }

    #[test]
    fn test_beta_weights_sum_to_one_and_favor_small_sets() {
        let beta = BetaShapley::new(4.0, 1.0, quick()).unwrap();
        let w = beta.weights(30);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(w.windows(2).all(|p| p[0] >= p[1]));
    }

    #[test]
    fn test_beta_one_one_is_uniform() {
        let beta = BetaShapley::new(1.0, 1.0, quick()).unwrap();
        assert!(beta.weights(8).iter().all(|w| (w - 0.125).abs() < 1e-9));
    }

    #[test]
    fn test_gelman_rubin_identical_chains_converge() {
        let history: Vec<Vec<f64>> = (0..40).map(|t| vec![(t % 2) as f64, 1.0]).collect();
        let r = gelman_rubin(&history, 10);
        assert!(r < 1.05, "r_hat {r}");
        assert!(gelman_rubin(&history[..10], 10).is_infinite());
    }

    #[test]
    fn test_data_shapley_penalises_flipped_labels() {
        let fx = Fixture::new(12, 3);
        let mut shapley = DataShapley::new(quick()).unwrap();
        shapley.train_data_values(&fx.ctx(1)).unwrap();
        let values = shapley.evaluate_data_values().unwrap();
        assert_eq!(values.len(), 12);
        assert!(mean(&values[..3]) < mean(&values[3..]));
    }

    #[test]
    fn test_identity_strings() {
        assert_eq!(
            DataShapley::new(ShapleySampler::default()).unwrap().name(),
            "DataShapley(mc_epochs=100,min_samples=20,gr_threshold=1.05,truncation_tolerance=0.001)"
        );
        assert_eq!(
            BetaShapley::new(16.0, 1.0, ShapleySampler::default())
                .unwrap()
                .name(),
            "BetaShapley(alpha=16,beta=1,mc_epochs=100,min_samples=20,gr_threshold=1.05,truncation_tolerance=0.001)"
        );
        let shorter = ShapleySampler {
            min_samples: 30,
            ..ShapleySampler::default()
        };
        assert_ne!(
            DataShapley::new(shorter).unwrap().name(),
            DataShapley::new(ShapleySampler::default()).unwrap().name()
        );
    }

    #[test]
    fn test_marginal_table_keeps_only_observed_cardinalities() {
        // A dense n x n table at this size would not fit in memory.
        let mut table = MarginalTable::new(1_000_000);
        table.add(7, 999_999, 2.0);
        table.add(7, 3, 1.0);
        table.add(7, 3, 3.0);
        let mut weights = vec![0.0; 1_000_000];
        weights[3] = 1.0;
        weights[999_999] = 1.0;
        let values = table.semivalues(&weights);
        assert!((values[7] - 2.0).abs() < 1e-12);
        assert_eq!(values[0], 0.0);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(BetaShapley::new(0.0, 1.0, quick()).is_err());
        let sampler = ShapleySampler {
            mc_epochs: 0,
            ..quick()
        };
        assert!(DataShapley::new(sampler).is_err());
    }
}
