//! Noise injection on the training split.

use crate::data::matrix::Matrix;
use crate::error::DatavalError;
use crate::reproducibility::{choose_distinct, standard_normal};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which corruption to apply, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoiseSpec {
    None,
    /// Relabel `noise_rate` of the training rows with a different class.
    MixLabels { noise_rate: f64 },
    /// Add N(mu, sigma) to every feature of `noise_rate` of the training rows.
    AddGaussNoise {
        noise_rate: f64,
        #[serde(default)]
        mu: f64,
        #[serde(default = "default_sigma")]
        sigma: f64,
    },
}

fn default_sigma() -> f64 {
    1.0
}

impl Default for NoiseSpec {
    fn default() -> Self {
        Self::MixLabels { noise_rate: 0.1 }
    }
}

impl NoiseSpec {
    pub fn noise_rate(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::MixLabels { noise_rate } | Self::AddGaussNoise { noise_rate, .. } => *noise_rate,
        }
    }

    pub fn validate(&self) -> Result<(), DatavalError> {
        let rate = self.noise_rate();
        if !(0.0..=1.0).contains(&rate) {
            return Err(DatavalError::invalid_input(format!(
                "noise_rate must be in [0, 1], got {rate}"
            )));
        }
        if let Self::AddGaussNoise { sigma, .. } = self {
            if *sigma < 0.0 {
                return Err(DatavalError::invalid_input(format!(
                    "sigma must be non-negative, got {sigma}"
                )));
            }
        }
        Ok(())
    }

    /// Corrupt the training split in place and return the noisy positions, sorted.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        x_train: &mut Matrix,
        y_train: &mut [usize],
        num_classes: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>, DatavalError> {
        self.validate()?;
        let n = y_train.len();
        let count = (n as f64 * self.noise_rate()).round() as usize;

        match self {
            Self::None => Ok(Vec::new()),
            Self::MixLabels { .. } => {
                if num_classes < 2 {
                    tracing::warn!("mix_labels needs at least two classes, skipping");
                    return Ok(Vec::new());
                }
                let noisy = choose_distinct(rng, n, count);
                for &i in &noisy {
                    let shift = rng.gen_range(1..num_classes);
                    y_train[i] = (y_train[i] + shift) % num_classes;
                }
                Ok(noisy)
            }
            Self::AddGaussNoise { mu, sigma, .. } => {
                let noisy = choose_distinct(rng, n, count);
                for &i in &noisy {
                    for v in x_train.row_mut(i) {
                        *v += mu + sigma * standard_normal(rng);
                    }
                }
                Ok(noisy)
            }
        }
    }
}
