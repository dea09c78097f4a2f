//! Classifier trait used by the cross-validation evaluator

use crate::error::Result;
use crate::optimizer::TrialParams;
use ndarray::{Array1, ArrayView1, ArrayView2};

/// A binary probabilistic classifier.
///
/// A configured but unfitted instance acts as a prototype: the evaluator clones
/// it once per fold so every fold starts from a fresh model.
pub trait Classifier: Clone + Send + Sync {
    /// Fit the model on a feature matrix and 0/1 labels
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<()>;

    /// Probability of the positive class for every row
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;

    /// Apply hyperparameters sampled by the search
    fn set_params(&mut self, params: &TrialParams) -> Result<()>;

    /// Short human readable name for logs
    fn name(&self) -> &'static str {
        "classifier"
    }
}
