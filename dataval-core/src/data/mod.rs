//! Data layer: dataset registry, download cache, splitting and noise injection.

pub mod cache;
pub mod csv;
pub mod fetcher;
pub mod matrix;
pub mod noise;
pub mod registry;

pub use cache::cache;
pub use fetcher::{DataFetcher, Split};
pub use matrix::Matrix;
pub use noise::NoiseSpec;
pub use registry::{
    AdultSource, CovarTransform, CsvSource, Dataset, DatasetRegistry, DatasetSource,
    GaussianSource, LabelTransform, RegisteredDataset,
};
