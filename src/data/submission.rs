//! Competition submission file built from a sample-submission template

use super::loader::{DataLoader, DataSaver};
use crate::error::{FraudError, Result};
use ndarray::Array1;
use polars::prelude::*;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Submission {
    frame: DataFrame,
    id_column: String,
    target_column: String,
}

impl Submission {
    /// Read the template; the id column must exist, the target column is overwritten later
    pub fn load_template(
        path: impl AsRef<Path>,
        id_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Result<Self> {
        let frame = DataLoader::new().load_auto(path)?;
        Self::from_frame(frame, id_column, target_column)
    }

    pub fn from_frame(
        frame: DataFrame,
        id_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Result<Self> {
        let id_column = id_column.into();
        if frame.column(&id_column).is_err() {
            return Err(FraudError::FeatureNotFound(id_column));
        }
        Ok(Self { frame, id_column, target_column: target_column.into() })
    }

    pub fn n_rows(&self) -> usize {
        self.frame.height()
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Keep the id column and put the predictions in the target column
    pub fn with_predictions(self, predictions: &Array1<f64>) -> Result<Self> {
        if predictions.len() != self.n_rows() {
            return Err(FraudError::ShapeError {
                expected: format!("{} predictions", self.n_rows()),
                actual: format!("{} predictions", predictions.len()),
            });
        }
        let ids = self.frame.column(&self.id_column)?.clone();
        let target = Column::new(self.target_column.as_str().into(), predictions.to_vec());
        let frame = DataFrame::new(vec![ids, target])?;
        Ok(Self { frame, ..self })
    }

    pub fn write_csv(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        DataSaver::save_csv(&mut self.frame, path)?;
        info!(path = %path.display(), rows = self.n_rows(), "submission written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Submission {
        let df = DataFrame::new(vec![
            Column::new("TransactionID".into(), &[3663549i64, 3663550, 3663551]),
            Column::new("isFraud".into(), &[0.5, 0.5, 0.5]),
        ])
        .unwrap();
        Submission::from_frame(df, "TransactionID", "isFraud").unwrap()
    }

    #[test]
    fn test_with_predictions_replaces_target() {
        let sub = template()
            .with_predictions(&Array1::from_vec(vec![0.1, 0.2, 0.3]))
            .unwrap();
        let target: Vec<f64> = sub.frame().column("isFraud").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(target, vec![0.1, 0.2, 0.3]);
        assert_eq!(sub.frame().width(), 2);
    }

    #[test]
    fn test_row_count_mismatch() {
        let err = template().with_predictions(&Array1::zeros(2)).unwrap_err();
        assert!(matches!(err, FraudError::ShapeError { .. }));
    }

    #[test]
    fn test_missing_id_column() {
        let df = DataFrame::new(vec![Column::new("isFraud".into(), &[0.5])]).unwrap();
        assert!(Submission::from_frame(df, "TransactionID", "isFraud").is_err());
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("submission.csv");
        let mut sub = template()
            .with_predictions(&Array1::from_vec(vec![0.9, 0.1, 0.4]))
            .unwrap();
        sub.write_csv(&path).unwrap();

        let reloaded = Submission::load_template(&path, "TransactionID", "isFraud").unwrap();
        assert_eq!(reloaded.n_rows(), 3);
    }
}
