//! Data loading, dataset assembly and submission output

mod dataset;
mod loader;
mod submission;

pub use dataset::{columns_to_array2, Dataset, DatasetBuilder};
pub use loader::{DataLoader, DataSaver};
pub use submission::Submission;
