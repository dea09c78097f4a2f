//! Model training and cross-validated evaluation
//!
//! Provides:
//! - Fold splitters (plain, stratified and grouped k-fold)
//! - Metrics for binary classifiers
//! - A histogram gradient-boosted tree classifier
//! - Fold-level pruning and the cross-validation evaluator

pub mod boosting;
pub mod cross_validation;
pub mod evaluator;
pub mod metrics;
mod model;
pub mod pruning;

pub use boosting::{BoostingType, GbdtClassifier, GbdtConfig};
pub use cross_validation::{CVSplit, CVStrategy, CrossValidator};
pub use evaluator::{CrossValEvaluator, CvConfig, CvOutcome, CvStatus, PredictionAverager};
pub use metrics::{roc_auc_score, Metric};
pub use model::Classifier;
pub use pruning::{PruneDecision, PruningTracker};
