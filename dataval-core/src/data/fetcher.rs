//! Dataset fetcher: loads a registered dataset, splits it and injects noise.

use crate::data::matrix::Matrix;
use crate::data::noise::NoiseSpec;
use crate::data::registry::{Dataset, DatasetRegistry};
use crate::error::DatavalError;
use crate::reproducibility::seeded_rng;
use rand::seq::SliceRandom;
use std::path::Path;

/// One partition of the dataset.
#[derive(Debug, Clone)]
pub struct Split {
    pub x: Matrix,
    pub y: Vec<usize>,
}

impl Split {
    fn take(dataset: &Dataset, indices: &[usize]) -> Self {
        Self {
            x: dataset.covariates.select_rows(indices),
            y: indices.iter().map(|&i| dataset.labels[i]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Loaded dataset with train / valid / test partitions.
#[derive(Debug, Clone)]
pub struct DataFetcher {
    pub dataset_name: String,
    dataset: Dataset,
    seed: u64,
    pub train: Split,
    pub valid: Split,
    pub test: Split,
    /// Original dataset index of each training row.
    pub train_indices: Vec<usize>,
    pub valid_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    /// Positions within the training split that were corrupted.
    pub noisy_indices: Vec<usize>,
}

impl DataFetcher {
    /// Load `dataset_name` from the registry. No split is made yet.
    pub async fn setup(
        registry: &DatasetRegistry,
        dataset_name: &str,
        cache_dir: &Path,
        force_download: bool,
        seed: u64,
    ) -> Result<Self, DatavalError> {
        let entry = registry.get(dataset_name)?;
        let dataset = entry.load_data(cache_dir, force_download, seed).await?;
        Ok(Self::from_dataset(dataset_name, dataset, seed))
    }

    /// Wrap an already loaded dataset.
    pub fn from_dataset(name: &str, dataset: Dataset, seed: u64) -> Self {
        let empty = Split {
            x: Matrix::zeros(0, dataset.covariates.cols()),
            y: Vec::new(),
        };
        Self {
            dataset_name: name.to_string(),
            dataset,
            seed,
            train: empty.clone(),
            valid: empty.clone(),
            test: empty,
            train_indices: Vec::new(),
            valid_indices: Vec::new(),
            test_indices: Vec::new(),
            noisy_indices: Vec::new(),
        }
    }

    pub fn num_points(&self) -> usize {
        self.dataset.len()
    }

    pub fn covar_dim(&self) -> usize {
        self.dataset.covariates.cols()
    }

    pub fn num_classes(&self) -> usize {
        self.dataset.num_classes
    }

    /// Shuffle and split by absolute counts. The remainder is discarded.
    pub fn split_dataset_by_count(
        mut self,
        train_count: usize,
        valid_count: usize,
        test_count: usize,
    ) -> Result<Self, DatavalError> {
        if train_count == 0 || valid_count == 0 {
            return Err(DatavalError::invalid_input(
                "train and valid split sizes must be positive",
            ));
        }
        let total = train_count + valid_count + test_count;
        if total > self.num_points() {
            return Err(DatavalError::invalid_input(format!(
                "split sizes {train_count}+{valid_count}+{test_count}={total} exceed dataset size {}",
                self.num_points()
            )));
        }

        let mut order: Vec<usize> = (0..self.num_points()).collect();
        order.shuffle(&mut seeded_rng(self.seed));

        self.train_indices = order[..train_count].to_vec();
        self.valid_indices = order[train_count..train_count + valid_count].to_vec();
        self.test_indices = order[train_count + valid_count..total].to_vec();

        self.train = Split::take(&self.dataset, &self.train_indices);
        self.valid = Split::take(&self.dataset, &self.valid_indices);
        self.test = Split::take(&self.dataset, &self.test_indices);
        self.noisy_indices.clear();

        tracing::info!(
            dataset = %self.dataset_name,
            train = train_count,
            valid = valid_count,
            test = test_count,
            "Split dataset"
        );
        Ok(self)
    }

    /// Split by proportions of the full dataset (each in `[0, 1]`, summing to at most 1).
    pub fn split_dataset_by_prop(
        self,
        train_prop: f64,
        valid_prop: f64,
        test_prop: f64,
    ) -> Result<Self, DatavalError> {
        let props = [train_prop, valid_prop, test_prop];
        if props.iter().any(|p| !(0.0..=1.0).contains(p)) || props.iter().sum::<f64>() > 1.0 + 1e-9
        {
            return Err(DatavalError::invalid_input(format!(
                "split proportions must be in [0, 1] and sum to at most 1, got {props:?}"
            )));
        }
        let n = self.num_points() as f64;
        let train = (n * train_prop).round() as usize;
        let valid = (n * valid_prop).round() as usize;
        let remaining = self.num_points().saturating_sub(train + valid);
        let test = ((n * test_prop).round() as usize).min(remaining);
        self.split_dataset_by_count(train, valid, test)
    }

    /// Corrupt the training split. Replaces any previous noisy indices.
    pub fn noisify(mut self, noise: &NoiseSpec) -> Result<Self, DatavalError> {
        let mut rng = seeded_rng(self.seed.wrapping_add(1));
        let num_classes = self.num_classes();
        self.noisy_indices =
            noise.apply(&mut self.train.x, &mut self.train.y, num_classes, &mut rng)?;
        tracing::info!(
            noisy = self.noisy_indices.len(),
            train = self.train.len(),
            "Injected noise"
        );
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::registry::{GaussianSource, RegisteredDataset};
    use tempfile::TempDir;

    async fn gaussian_fetcher(n: usize, seed: u64) -> DataFetcher {
        let mut registry = DatasetRegistry::new();
        registry
            .register(RegisteredDataset::new("g", GaussianSource::new(n, 3)))
            .unwrap();
        let dir = TempDir::new().unwrap();
        DataFetcher::setup(&registry, "g", dir.path(), false, seed)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_split_is_disjoint_and_sized() {
        let fetcher = gaussian_fetcher(100, 1)
            .await
            .split_dataset_by_count(50, 20, 30)
            .unwrap();
        assert_eq!(fetcher.train.len(), 50);
        assert_eq!(fetcher.valid.len(), 20);
        assert_eq!(fetcher.test.len(), 30);
        let mut all: Vec<usize> = fetcher
            .train_indices
            .iter()
            .chain(&fetcher.valid_indices)
            .chain(&fetcher.test_indices)
            .copied()
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 100);
    }

    #[tokio::test]
    async fn test_split_too_large_rejected() {
        let err = gaussian_fetcher(10, 1)
            .await
            .split_dataset_by_count(8, 2, 1)
            .unwrap_err();
        assert!(err.to_string().contains("exceed dataset size"));
    }

    #[tokio::test]
    async fn test_zero_train_rejected() {
        assert!(
            gaussian_fetcher(10, 1)
                .await
                .split_dataset_by_count(0, 2, 1)
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_split_by_prop() {
        let fetcher = gaussian_fetcher(200, 2)
            .await
            .split_dataset_by_prop(0.5, 0.25, 0.25)
            .unwrap();
        assert_eq!(fetcher.train.len(), 100);
        assert_eq!(fetcher.valid.len(), 50);
        assert_eq!(fetcher.test.len(), 50);
    }

    #[tokio::test]
    async fn test_noisify_records_indices() {
        let fetcher = gaussian_fetcher(100, 3)
            .await
            .split_dataset_by_count(60, 20, 20)
            .unwrap()
            .noisify(&NoiseSpec::MixLabels { noise_rate: 0.1 })
            .unwrap();
        assert_eq!(fetcher.noisy_indices.len(), 6);
        assert!(fetcher.noisy_indices.iter().all(|&i| i < 60));
    }
}
