//! In-memory training set: feature matrix, labels and optional fold groups

use crate::error::{FraudError, Result};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// Numeric features with binary labels, row aligned
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    /// Group id per row, used by group k-fold
    pub groups: Option<Array1<i64>>,
    pub feature_names: Vec<String>,
}

impl Dataset {
    pub fn new(x: Array2<f64>, y: Array1<f64>, feature_names: Vec<String>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(FraudError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if feature_names.len() != x.ncols() {
            return Err(FraudError::ShapeError {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        if let Some(bad) = y.iter().find(|&&v| v != 0.0 && v != 1.0) {
            return Err(FraudError::ValidationError(format!(
                "labels must be 0 or 1, found {}",
                bad
            )));
        }
        Ok(Self { x, y, groups: None, feature_names })
    }

    pub fn with_groups(mut self, groups: Array1<i64>) -> Result<Self> {
        if groups.len() != self.n_samples() {
            return Err(FraudError::ShapeError {
                expected: format!("{} group ids", self.n_samples()),
                actual: format!("{} group ids", groups.len()),
            });
        }
        self.groups = Some(groups);
        Ok(self)
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn n_positive(&self) -> usize {
        self.y.iter().filter(|&&v| v == 1.0).count()
    }

    pub fn positive_rate(&self) -> f64 {
        if self.n_samples() == 0 {
            0.0
        } else {
            self.n_positive() as f64 / self.n_samples() as f64
        }
    }

    /// Subset of rows in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), rows),
            y: self.y.select(Axis(0), rows),
            groups: self.groups.as_ref().map(|g| g.select(Axis(0), rows)),
            feature_names: self.feature_names.clone(),
        }
    }

    /// Keep every positive row and a seeded `frac` sample of the negatives.
    /// Positives come first, followed by the sampled negatives in original order.
    pub fn downsample_negatives(&self, frac: f64, seed: u64) -> Result<Self> {
        if !(frac > 0.0 && frac <= 1.0) {
            return Err(FraudError::InvalidParameter {
                name: "negative_sample_frac".to_string(),
                value: frac.to_string(),
                reason: "must be in (0, 1]".to_string(),
            });
        }

        let (positives, negatives): (Vec<usize>, Vec<usize>) =
            (0..self.n_samples()).partition(|&i| self.y[i] == 1.0);

        let n_keep = (negatives.len() as f64 * frac).round() as usize;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut sampled: Vec<usize> = negatives
            .choose_multiple(&mut rng, n_keep)
            .copied()
            .collect();
        sampled.sort_unstable();

        let rows: Vec<usize> = positives.iter().copied().chain(sampled).collect();
        let out = self.select_rows(&rows);
        info!(
            positives = positives.len(),
            negatives_kept = n_keep,
            negatives_total = negatives.len(),
            "negatives down-sampled"
        );
        Ok(out)
    }

    /// Build a test matrix with the training feature columns, in training order
    pub fn align_test(&self, df: &DataFrame) -> Result<Array2<f64>> {
        columns_to_array2(df, &self.feature_names)
    }
}

/// Extract named columns as a row-major `f64` matrix; nulls become NaN
pub fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| column_to_f64(df, name))
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((n_rows, col_names.len()), |(r, c)| col_data[c][r]))
}

fn column_to_f64(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| FraudError::FeatureNotFound(name.to_string()))?;
    let values = column
        .cast(&DataType::Float64)?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

fn column_to_i64(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let column = df
        .column(name)
        .map_err(|_| FraudError::FeatureNotFound(name.to_string()))?;
    let cast = column.cast(&DataType::Int64)?;
    let values = cast
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| FraudError::DataError(format!("column '{}' is null at row {}", name, row)))
        })
        .collect::<Result<Vec<i64>>>()?;
    Ok(values)
}

/// Turns loaded frames into a [`Dataset`]
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    target_column: String,
    group_column: Option<String>,
    id_column: Option<String>,
    drop_columns: Vec<String>,
}

impl DatasetBuilder {
    pub fn new(target_column: impl Into<String>) -> Self {
        Self {
            target_column: target_column.into(),
            group_column: None,
            id_column: None,
            drop_columns: Vec::new(),
        }
    }

    /// Column holding fold groups; it is removed from the features
    pub fn with_group_column(mut self, name: Option<String>) -> Self {
        self.group_column = name;
        self
    }

    /// Row identifier column; it is removed from the features
    pub fn with_id_column(mut self, name: Option<String>) -> Self {
        self.id_column = name;
        self
    }

    pub fn with_drop_columns(mut self, names: Vec<String>) -> Self {
        self.drop_columns = names;
        self
    }

    /// Build from a features frame and, optionally, a separate labels frame.
    /// Without a labels frame the target column is read from `features`.
    pub fn build(&self, features: &DataFrame, labels: Option<&DataFrame>) -> Result<Dataset> {
        let label_frame = labels.unwrap_or(features);
        if label_frame.height() != features.height() {
            return Err(FraudError::ShapeError {
                expected: format!("{} label rows", features.height()),
                actual: format!("{} label rows", label_frame.height()),
            });
        }

        let y_raw = label_frame
            .column(&self.target_column)
            .map_err(|_| FraudError::FeatureNotFound(self.target_column.clone()))?
            .cast(&DataType::Float64)?;
        let y: Array1<f64> = y_raw
            .f64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| {
                v.ok_or_else(|| FraudError::DataError(format!("missing label at row {}", row)))
            })
            .collect::<Result<Vec<f64>>>()?
            .into();

        let excluded: Vec<&str> = std::iter::once(self.target_column.as_str())
            .chain(self.group_column.as_deref())
            .chain(self.id_column.as_deref())
            .chain(self.drop_columns.iter().map(String::as_str))
            .collect();
        let feature_names: Vec<String> = features
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .filter(|name| !excluded.contains(&name.as_str()))
            .collect();
        if feature_names.is_empty() {
            return Err(FraudError::DataError("no feature columns left".to_string()));
        }

        let x = columns_to_array2(features, &feature_names)?;
        let mut dataset = Dataset::new(x, y, feature_names)?;
        if let Some(group) = &self.group_column {
            let groups = Array1::from_vec(column_to_i64(features, group)?);
            dataset = dataset.with_groups(groups)?;
        }

        info!(
            rows = dataset.n_samples(),
            features = dataset.n_features(),
            positive_rate = dataset.positive_rate(),
            grouped = dataset.groups.is_some(),
            "dataset built"
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("TransactionID".into(), &[1i64, 2, 3, 4, 5, 6]),
            Column::new("isFraud".into(), &[0i64, 1, 0, 0, 1, 0]),
            Column::new("DT_M".into(), &[12i64, 12, 13, 13, 14, 14]),
            Column::new("amt".into(), &[Some(1.0), None, Some(3.0), Some(4.0), Some(5.0), Some(6.0)]),
            Column::new("card".into(), &[10i32, 20, 30, 40, 50, 60]),
        ])
        .unwrap()
    }

    fn builder() -> DatasetBuilder {
        DatasetBuilder::new("isFraud")
            .with_group_column(Some("DT_M".to_string()))
            .with_id_column(Some("TransactionID".to_string()))
    }

    #[test]
    fn test_build_excludes_label_group_and_id() {
        let ds = builder().build(&frame(), None).unwrap();
        assert_eq!(ds.feature_names, vec!["amt".to_string(), "card".to_string()]);
        assert_eq!(ds.n_samples(), 6);
        assert_eq!(ds.n_positive(), 2);
        assert!(ds.x[[1, 0]].is_nan());
        assert_eq!(ds.groups.as_ref().unwrap().to_vec(), vec![12, 12, 13, 13, 14, 14]);
    }

    #[test]
    fn test_separate_labels_frame() {
        let features = frame().drop("isFraud").unwrap();
        let labels = DataFrame::new(vec![Column::new("isFraud".into(), &[1i64, 0, 0, 0, 0, 1])]).unwrap();
        let ds = builder().build(&features, Some(&labels)).unwrap();
        assert_eq!(ds.y.to_vec(), vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_missing_target_column() {
        let err = DatasetBuilder::new("label").build(&frame(), None).unwrap_err();
        assert!(matches!(err, FraudError::FeatureNotFound(_)));
    }

    #[test]
    fn test_non_binary_labels_rejected() {
        let x = Array2::zeros((2, 1));
        let y = Array1::from_vec(vec![0.0, 2.0]);
        assert!(Dataset::new(x, y, vec!["a".into()]).is_err());
    }

    #[test]
    fn test_align_test_reorders_columns() {
        let ds = builder().build(&frame(), None).unwrap();
        let test = DataFrame::new(vec![
            Column::new("card".into(), &[7.0, 8.0]),
            Column::new("extra".into(), &[0.0, 0.0]),
            Column::new("amt".into(), &[1.5, 2.5]),
        ])
        .unwrap();
        let x = ds.align_test(&test).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![1.5, 7.0]);

        let missing = test.drop("amt").unwrap();
        assert!(matches!(ds.align_test(&missing), Err(FraudError::FeatureNotFound(_))));
    }

    #[test]
    fn test_downsample_negatives() {
        let ds = builder().build(&frame(), None).unwrap();
        let sampled = ds.downsample_negatives(0.5, 42).unwrap();
        assert_eq!(sampled.n_samples(), 4);
        assert_eq!(&sampled.y.to_vec()[..2], &[1.0, 1.0]);
        assert_eq!(sampled.n_positive(), 2);
        assert_eq!(sampled.groups.as_ref().unwrap().len(), 4);

        let again = ds.downsample_negatives(0.5, 42).unwrap();
        assert_eq!(sampled.x.column(1).to_vec(), again.x.column(1).to_vec());

        assert!(ds.downsample_negatives(0.0, 42).is_err());
    }
}
