//! Dataset registry: named dataset sources with optional transforms.

use crate::data::cache::cache;
use crate::data::csv::Frame;
use crate::data::matrix::Matrix;
use crate::error::DatavalError;
use crate::reproducibility::{seeded_rng, standard_normal};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Covariates and class labels of a loaded dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub covariates: Matrix,
    pub labels: Vec<usize>,
    pub num_classes: usize,
}

impl Dataset {
    pub fn new(covariates: Matrix, labels: Vec<usize>) -> Result<Self, DatavalError> {
        if covariates.rows() != labels.len() {
            return Err(DatavalError::dataset(format!(
                "{} covariate rows but {} labels",
                covariates.rows(),
                labels.len()
            )));
        }
        let num_classes = labels.iter().max().map(|m| m + 1).unwrap_or(0);
        Ok(Self {
            covariates,
            labels,
            num_classes,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Arguments available to a source while loading.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Per-dataset download directory (`<cache_dir>/<dataset name>`).
    pub download_dir: PathBuf,
    pub force_download: bool,
    pub seed: u64,
}

/// Something that can produce covariates and labels.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn load(&self, ctx: &LoadContext) -> Result<(Matrix, Vec<usize>), DatavalError>;

    /// Short human-readable description for listings.
    fn describe(&self) -> String;
}

/// Covariate transform applied after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarTransform {
    MinMaxScale,
}

/// Label transform applied after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelTransform {
    /// Replace every label with class 0.
    Zeros,
}

/// A dataset registered under a unique name.
#[derive(Clone)]
pub struct RegisteredDataset {
    pub name: String,
    pub categorical: bool,
    pub cacheable: bool,
    pub source: Arc<dyn DatasetSource>,
    pub covar_transform: Option<CovarTransform>,
    pub label_transform: Option<LabelTransform>,
}

impl RegisteredDataset {
    pub fn new(name: &str, source: impl DatasetSource + 'static) -> Self {
        Self {
            name: name.to_string(),
            categorical: true,
            cacheable: false,
            source: Arc::new(source),
            covar_transform: None,
            label_transform: None,
        }
    }

    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    pub fn with_covar_transform(mut self, transform: CovarTransform) -> Self {
        self.covar_transform = Some(transform);
        self
    }

    pub fn with_label_transform(mut self, transform: LabelTransform) -> Self {
        self.label_transform = Some(transform);
        self
    }

    /// Load the data and apply the registered transforms.
    pub async fn load_data(
        &self,
        cache_dir: &Path,
        force_download: bool,
        seed: u64,
    ) -> Result<Dataset, DatavalError> {
        let ctx = LoadContext {
            download_dir: cache_dir.join(&self.name),
            force_download: force_download && self.cacheable,
            seed,
        };
        let (mut covariates, mut labels) = self.source.load(&ctx).await?;

        if let Some(CovarTransform::MinMaxScale) = self.covar_transform {
            covariates.minmax_scale();
        }
        if let Some(LabelTransform::Zeros) = self.label_transform {
            labels.iter_mut().for_each(|l| *l = 0);
        }

        let dataset = Dataset::new(covariates, labels)?;
        tracing::debug!(
            dataset = %self.name,
            rows = dataset.len(),
            dim = dataset.covariates.cols(),
            classes = dataset.num_classes,
            "Loaded dataset"
        );
        Ok(dataset)
    }
}

impl std::fmt::Debug for RegisteredDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredDataset")
            .field("name", &self.name)
            .field("cacheable", &self.cacheable)
            .field("source", &self.source.describe())
            .field("covar_transform", &self.covar_transform)
            .field("label_transform", &self.label_transform)
            .finish()
    }
}

/// Registry of loadable datasets, keyed by unique name.
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    datasets: BTreeMap<String, RegisteredDataset>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self {
            datasets: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the built-in datasets.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins = [
            RegisteredDataset::new("gaussian_classifier", GaussianSource::new(10_000, 10)),
            RegisteredDataset::new(
                "gaussian_classifier_high_dim",
                GaussianSource::new(10_000, 100),
            ),
            RegisteredDataset::new("gaussian_only_zeroes", GaussianSource::new(10_000, 100))
                .with_label_transform(LabelTransform::Zeros),
            RegisteredDataset::new("adult", AdultSource).cacheable(),
        ];
        for entry in builtins {
            registry.datasets.insert(entry.name.clone(), entry);
        }
        registry
    }

    /// Register a dataset. Names must be unique.
    pub fn register(&mut self, entry: RegisteredDataset) -> Result<(), DatavalError> {
        if self.datasets.contains_key(&entry.name) {
            return Err(DatavalError::AlreadyExists(format!(
                "{} has been registered, names must be unique",
                entry.name
            )));
        }
        self.datasets.insert(entry.name.clone(), entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&RegisteredDataset, DatavalError> {
        self.datasets
            .get(name)
            .ok_or_else(|| DatavalError::not_found(format!("dataset '{name}' is not registered")))
    }

    pub fn names(&self) -> Vec<&str> {
        self.datasets.keys().map(String::as_str).collect()
    }

    pub fn list(&self) -> impl Iterator<Item = &RegisteredDataset> {
        self.datasets.values()
    }
}

// ---------------------------------------------------------------------------
// GaussianSource
// ---------------------------------------------------------------------------

/// Synthetic binary classification: x ~ N(0, I), y ~ Bernoulli(sigmoid(x·β)).
#[derive(Debug, Clone)]
pub struct GaussianSource {
    pub n: usize,
    pub input_dim: usize,
}

impl GaussianSource {
    pub fn new(n: usize, input_dim: usize) -> Self {
        Self { n, input_dim }
    }
}

#[async_trait]
impl DatasetSource for GaussianSource {
    async fn load(&self, ctx: &LoadContext) -> Result<(Matrix, Vec<usize>), DatavalError> {
        let mut rng = seeded_rng(ctx.seed);
        let beta: Vec<f64> = (0..self.input_dim)
            .map(|_| standard_normal(&mut rng))
            .collect();

        let mut covariates = Matrix::zeros(self.n, self.input_dim);
        let mut labels = Vec::with_capacity(self.n);
        for i in 0..self.n {
            let row = covariates.row_mut(i);
            for v in row.iter_mut() {
                *v = standard_normal(&mut rng);
            }
            let logit: f64 = row.iter().zip(&beta).map(|(x, b)| x * b).sum();
            let p = 1.0 / (1.0 + (-logit).exp());
            labels.push(usize::from(rng.r#gen::<f64>() < p));
        }
        Ok((covariates, labels))
    }

    fn describe(&self) -> String {
        format!("synthetic gaussian (n={}, dim={})", self.n, self.input_dim)
    }
}

// ---------------------------------------------------------------------------
// AdultSource
// ---------------------------------------------------------------------------

const UCI_ADULT_URL: &str = "https://archive.ics.uci.edu/ml/machine-learning-databases/adult";

const ADULT_COLUMNS: [&str; 15] = [
    "Age",
    "WorkClass",
    "fnlwgt",
    "Education",
    "EducationNum",
    "MaritalStatus",
    "Occupation",
    "Relationship",
    "Race",
    "Gender",
    "CapitalGain",
    "CapitalLoss",
    "HoursPerWeek",
    "NativeCountry",
    "Income",
];

/// UCI Adult income, train and test files concatenated.
#[derive(Debug, Clone)]
pub struct AdultSource;

#[async_trait]
impl DatasetSource for AdultSource {
    async fn load(&self, ctx: &LoadContext) -> Result<(Matrix, Vec<usize>), DatavalError> {
        let train_path = cache(
            &format!("{UCI_ADULT_URL}/adult.data"),
            &ctx.download_dir,
            Some("train.csv"),
            ctx.force_download,
        )
        .await?;
        let test_path = cache(
            &format!("{UCI_ADULT_URL}/adult.test"),
            &ctx.download_dir,
            Some("test.csv"),
            ctx.force_download,
        )
        .await?;

        let train = tokio::fs::read_to_string(&train_path).await?;
        let test = tokio::fs::read_to_string(&test_path).await?;
        // The test file starts with a "|1x3 Cross validator" banner line.
        let test_body: String = test.lines().skip(1).collect::<Vec<_>>().join("\n");

        let mut frame =
            Frame::parse(&train, ',', false)?.concat(Frame::parse(&test_body, ',', false)?)?;
        frame.columns = ADULT_COLUMNS.iter().map(|c| c.to_string()).collect();

        let income = frame.column_index("Income")?;
        for row in &mut frame.rows {
            row[income] = match row[income].trim_end_matches('.') {
                "<=50K" => "0".to_string(),
                ">50K" => "1".to_string(),
                other => {
                    return Err(DatavalError::dataset(format!(
                        "unexpected Adult income label '{other}'"
                    )));
                }
            };
        }

        frame.into_covariates_and_labels("Income")
    }

    fn describe(&self) -> String {
        "UCI Adult income (downloaded)".to_string()
    }
}

// ---------------------------------------------------------------------------
// CsvSource
// ---------------------------------------------------------------------------

/// A local CSV file with a label column.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub label_column: String,
    pub delimiter: char,
    pub has_header: bool,
}

#[async_trait]
impl DatasetSource for CsvSource {
    async fn load(&self, _ctx: &LoadContext) -> Result<(Matrix, Vec<usize>), DatavalError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            DatavalError::dataset(format!("failed to read {}: {e}", self.path.display()))
        })?;
        Frame::parse(&content, self.delimiter, self.has_header)?
            .into_covariates_and_labels(&self.label_column)
    }

    fn describe(&self) -> String {
        format!("csv {} (label: {})", self.path.display(), self.label_column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtins_registered() {
        let registry = DatasetRegistry::with_builtins();
        let names = registry.names();
        assert!(names.contains(&"gaussian_classifier"));
        assert!(names.contains(&"adult"));
        assert!(registry.get("adult").unwrap().cacheable);
        assert!(registry.get("nope").is_err());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = DatasetRegistry::with_builtins();
        let dup = RegisteredDataset::new("gaussian_classifier", GaussianSource::new(10, 2));
        let err = registry.register(dup).unwrap_err();
        assert!(matches!(err, DatavalError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_gaussian_source_is_seeded() {
        let entry = RegisteredDataset::new("g", GaussianSource::new(200, 4));
        let dir = TempDir::new().unwrap();
        let a = entry.load_data(dir.path(), false, 5).await.unwrap();
        let b = entry.load_data(dir.path(), false, 5).await.unwrap();
        assert_eq!(a.covariates, b.covariates);
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.num_classes, 2);
    }

    #[tokio::test]
    async fn test_label_transform_zeros() {
        let registry = DatasetRegistry::with_builtins();
        let mut entry = registry.get("gaussian_only_zeroes").unwrap().clone();
        entry.source = Arc::new(GaussianSource::new(50, 3));
        let dir = TempDir::new().unwrap();
        let data = entry.load_data(dir.path(), false, 1).await.unwrap();
        assert!(data.labels.iter().all(|&l| l == 0));
        assert_eq!(data.num_classes, 1);
    }

    #[tokio::test]
    async fn test_csv_source_with_minmax() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("toy.csv");
        std::fs::write(&path, "a,b,label\n0,10,0\n5,20,1\n10,30,1\n").unwrap();
        let entry = RegisteredDataset::new(
            "toy",
            CsvSource {
                path,
                label_column: "label".into(),
                delimiter: ',',
                has_header: true,
            },
        )
        .with_covar_transform(CovarTransform::MinMaxScale);
        let data = entry.load_data(dir.path(), false, 0).await.unwrap();
        assert_eq!(data.covariates.row(1), &[0.5, 0.5]);
        assert_eq!(data.labels, vec![0, 1, 1]);
    }
}
