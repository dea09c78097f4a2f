//! Cross-validated scoring of a classifier with optional fold-level pruning

use super::cross_validation::{CVStrategy, CrossValidator};
use super::metrics::Metric;
use super::model::Classifier;
use super::pruning::{PruneDecision, PruningTracker};
use crate::data::Dataset;
use crate::error::{FraudError, Result};
use crate::optimizer::OptimizeDirection;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Configuration for [`CrossValEvaluator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvConfig {
    pub strategy: CVStrategy,
    pub metric: Metric,
    pub direction: OptimizeDirection,
    /// Relative tolerance before a lagging run is pruned
    pub tolerance: f64,
    pub splits_to_start_pruning: usize,
    /// Consult the pruning tracker after every fold
    pub prune: bool,
    pub random_state: Option<u64>,
    /// Also score the model on its own training rows
    pub score_train: bool,
}

impl Default for CvConfig {
    fn default() -> Self {
        Self {
            strategy: CVStrategy::default(),
            metric: Metric::Auc,
            direction: OptimizeDirection::Maximize,
            tolerance: 0.02,
            splits_to_start_pruning: 2,
            prune: true,
            random_state: Some(42),
            score_train: false,
        }
    }
}

impl CvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: CVStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the metric; the direction follows the metric
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self.direction = metric.direction();
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_splits_to_start_pruning(mut self, k: usize) -> Self {
        self.splits_to_start_pruning = k;
        self
    }

    pub fn with_pruning(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_train_scores(mut self, score_train: bool) -> Self {
        self.score_train = score_train;
        self
    }

    pub(crate) fn build_tracker(&self) -> Result<PruningTracker> {
        PruningTracker::new(self.strategy.n_splits(), self.tolerance, self.direction)?
            .with_splits_to_start_pruning(self.splits_to_start_pruning)
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CvStatus {
    Completed,
    Pruned { after_folds: usize },
}

/// Result of one cross-validated evaluation
#[derive(Debug, Clone)]
pub struct CvOutcome {
    pub status: CvStatus,
    /// Mean of the fold scores, or the extrapolated score of a pruned run
    pub score: f64,
    pub fold_scores: Vec<f64>,
    pub train_scores: Vec<f64>,
    pub std_score: f64,
    /// Out-of-fold probabilities, completed runs only
    pub oof_predictions: Option<Array1<f64>>,
    /// Fold-averaged test probabilities, completed runs with a test matrix only
    pub test_predictions: Option<Array1<f64>>,
}

impl CvOutcome {
    pub fn is_pruned(&self) -> bool {
        matches!(self.status, CvStatus::Pruned { .. })
    }

    pub fn mean_train_score(&self) -> Option<f64> {
        if self.train_scores.is_empty() {
            None
        } else {
            Some(self.train_scores.iter().sum::<f64>() / self.train_scores.len() as f64)
        }
    }
}

/// Weighted running average of per-fold predictions
#[derive(Debug, Clone)]
pub struct PredictionAverager {
    sums: Array1<f64>,
    weights: Array1<f64>,
}

impl PredictionAverager {
    pub fn new(n_rows: usize) -> Self {
        Self {
            sums: Array1::zeros(n_rows),
            weights: Array1::zeros(n_rows),
        }
    }

    /// Add one fold's predictions for every row
    pub fn add(&mut self, predictions: ArrayView1<f64>, weight: f64) -> Result<()> {
        if predictions.len() != self.sums.len() {
            return Err(FraudError::ShapeError {
                expected: format!("{} predictions", self.sums.len()),
                actual: format!("{} predictions", predictions.len()),
            });
        }
        self.sums.scaled_add(weight, &predictions);
        self.weights += weight;
        Ok(())
    }

    /// Accumulated weight per row
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Weighted mean per row; rows without any weight are NaN
    pub fn finish(self) -> Array1<f64> {
        let mut out = self.sums;
        out.iter_mut().zip(self.weights.iter()).for_each(|(s, &w)| {
            *s = if w > 0.0 { *s / w } else { f64::NAN };
        });
        out
    }
}

/// Runs k-fold cross-validation of classifier prototypes against one dataset,
/// sharing a pruning tracker across calls.
#[derive(Debug, Clone)]
pub struct CrossValEvaluator {
    config: CvConfig,
    tracker: PruningTracker,
}

impl CrossValEvaluator {
    pub fn new(config: CvConfig) -> Result<Self> {
        let tracker = config.build_tracker()?;
        Ok(Self { config, tracker })
    }

    /// Restore an evaluator with pruning state from an earlier search
    pub fn with_tracker(config: CvConfig, tracker: PruningTracker) -> Result<Self> {
        if tracker.n_splits() != config.strategy.n_splits() {
            return Err(FraudError::ConfigError(format!(
                "pruning state covers {} folds but the strategy has {}",
                tracker.n_splits(),
                config.strategy.n_splits()
            )));
        }
        Ok(Self { config, tracker })
    }

    pub fn config(&self) -> &CvConfig {
        &self.config
    }

    pub fn tracker(&self) -> &PruningTracker {
        &self.tracker
    }

    pub fn into_tracker(self) -> PruningTracker {
        self.tracker
    }

    /// Evaluate a fresh clone of `prototype` on every fold
    pub fn evaluate<M: Classifier>(
        &mut self,
        prototype: &M,
        data: &Dataset,
        test: Option<ArrayView2<f64>>,
    ) -> Result<CvOutcome> {
        if let Some(t) = test {
            if t.ncols() != data.n_features() {
                return Err(FraudError::ShapeError {
                    expected: format!("{} test features", data.n_features()),
                    actual: format!("{} test features", t.ncols()),
                });
            }
        }

        let splits = CrossValidator::new(self.config.strategy.clone())
            .with_optional_random_state(self.config.random_state)
            .split(data.n_samples(), Some(&data.y), data.groups.as_ref())?;
        let n_splits = splits.len();

        let mut fold_scores = Vec::with_capacity(n_splits);
        let mut train_scores = Vec::new();
        let mut oof = Array1::from_elem(data.n_samples(), f64::NAN);
        let mut averager = test.map(|t| PredictionAverager::new(t.nrows()));

        self.tracker.reset_run();
        for split in &splits {
            let start = Instant::now();
            let fold = self.run_fold(prototype, data, test, &split.train_indices, &split.test_indices);
            let fold = match fold {
                Ok(f) => f,
                Err(e) => {
                    self.tracker.reset_run();
                    return Err(e);
                }
            };

            for (&row, &p) in split.test_indices.iter().zip(fold.val_proba.iter()) {
                oof[row] = p;
            }
            if let (Some(avg), Some(preds)) = (averager.as_mut(), fold.test_proba.as_ref()) {
                avg.add(preds.view(), 1.0 / n_splits as f64)?;
            }
            if let Some(s) = fold.train_score {
                train_scores.push(s);
            }
            fold_scores.push(fold.val_score);

            info!(
                fold = split.fold_idx,
                val_score = fold.val_score,
                train_score = ?fold.train_score,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "fold finished"
            );

            if self.config.prune {
                if let PruneDecision::Prune { score } = self.tracker.report(fold.val_score)? {
                    info!(
                        model = prototype.name(),
                        after_folds = fold_scores.len(),
                        score,
                        "run pruned"
                    );
                    let std_score = std_dev(&fold_scores);
                    return Ok(CvOutcome {
                        status: CvStatus::Pruned { after_folds: fold_scores.len() },
                        score,
                        fold_scores,
                        train_scores,
                        std_score,
                        oof_predictions: None,
                        test_predictions: None,
                    });
                }
            }
        }

        let score = if self.config.prune {
            self.tracker.complete()?
        } else {
            self.tracker.record_completed(&fold_scores)?
        };
        let std_score = std_dev(&fold_scores);
        debug!(best = ?self.tracker.best_score(), "pruning state updated");
        info!(
            model = prototype.name(),
            metric = %self.config.metric,
            score,
            std = std_score,
            "cross-validation completed"
        );

        Ok(CvOutcome {
            status: CvStatus::Completed,
            score,
            fold_scores,
            train_scores,
            std_score,
            oof_predictions: Some(oof),
            test_predictions: averager.map(PredictionAverager::finish),
        })
    }

    fn run_fold<M: Classifier>(
        &self,
        prototype: &M,
        data: &Dataset,
        test: Option<ArrayView2<f64>>,
        train_idx: &[usize],
        val_idx: &[usize],
    ) -> Result<FoldResult> {
        let x_train = data.x.select(Axis(0), train_idx);
        let y_train = data.y.select(Axis(0), train_idx);
        let x_val = data.x.select(Axis(0), val_idx);
        let y_val = data.y.select(Axis(0), val_idx);

        let mut model = prototype.clone();
        model.fit(x_train.view(), y_train.view())?;

        let val_proba = model.predict_proba(x_val.view())?;
        let val_score = self.config.metric.score(y_val.view(), val_proba.view())?;

        let train_score = if self.config.score_train {
            let train_proba = model.predict_proba(x_train.view())?;
            Some(self.config.metric.score(y_train.view(), train_proba.view())?)
        } else {
            None
        };

        let test_proba = match test {
            Some(t) => Some(model.predict_proba(t)?),
            None => None,
        };

        Ok(FoldResult { val_score, train_score, val_proba, test_proba })
    }
}

struct FoldResult {
    val_score: f64,
    train_score: Option<f64>,
    val_proba: Array1<f64>,
    test_proba: Option<Array1<f64>>,
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::TrialParams;
    use ndarray::Array2;

    /// Scores rows by one feature scaled by a quality knob; quality 1.0 ranks perfectly
    #[derive(Debug, Clone)]
    struct NoisyRanker {
        quality: f64,
        fitted: bool,
    }

    impl Classifier for NoisyRanker {
        fn fit(&mut self, _x: ArrayView2<f64>, _y: ArrayView1<f64>) -> Result<()> {
            self.fitted = true;
            Ok(())
        }

        fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
            if !self.fitted {
                return Err(FraudError::ModelNotFitted);
            }
            Ok(x.outer_iter()
                .map(|r| {
                    let s = self.quality * r[0] + (1.0 - self.quality) * r[1];
                    1.0 / (1.0 + (-s).exp())
                })
                .collect())
        }

        fn set_params(&mut self, _params: &TrialParams) -> Result<()> {
            Ok(())
        }
    }

    fn ranker(quality: f64) -> NoisyRanker {
        NoisyRanker { quality, fitted: false }
    }

    fn dataset() -> Dataset {
        let n = 120;
        let y = Array1::from_vec((0..n).map(|i| (i % 3 == 0) as u8 as f64).collect());
        let x = Array2::from_shape_fn((n, 2), |(i, j)| match j {
            0 => y[i] * 2.0 - 1.0 + (i % 7) as f64 * 0.01,
            _ => ((i * 31) % 17) as f64 / 17.0 - 0.5,
        });
        Dataset::new(x, y, vec!["signal".into(), "noise".into()]).unwrap()
    }

    fn config(prune: bool) -> CvConfig {
        CvConfig::default()
            .with_strategy(CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true })
            .with_pruning(prune)
    }

    #[test]
    fn test_first_run_completes() {
        let data = dataset();
        let mut evaluator = CrossValEvaluator::new(config(true)).unwrap();
        let outcome = evaluator.evaluate(&ranker(0.0), &data, None).unwrap();
        assert_eq!(outcome.status, CvStatus::Completed);
        assert_eq!(outcome.fold_scores.len(), 4);
        assert!(outcome.oof_predictions.unwrap().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_worse_run_is_pruned() {
        let data = dataset();
        let mut evaluator = CrossValEvaluator::new(config(true)).unwrap();
        let best = evaluator.evaluate(&ranker(1.0), &data, None).unwrap();
        assert!((best.score - 1.0).abs() < 1e-12);

        let test = Array2::<f64>::zeros((5, 2));
        let worse = evaluator.evaluate(&ranker(0.0), &data, Some(test.view())).unwrap();
        assert_eq!(worse.status, CvStatus::Pruned { after_folds: 2 });
        assert!(worse.score <= best.score);
        assert!(worse.test_predictions.is_none());
    }

    #[test]
    fn test_no_pruning_matches_plain_mean() {
        let data = dataset();
        let mut evaluator = CrossValEvaluator::new(config(false)).unwrap();
        evaluator.evaluate(&ranker(1.0), &data, None).unwrap();
        let outcome = evaluator.evaluate(&ranker(0.0), &data, None).unwrap();

        assert_eq!(outcome.status, CvStatus::Completed);
        let mean = outcome.fold_scores.iter().sum::<f64>() / 4.0;
        assert!((outcome.score - mean).abs() < 1e-12);
        assert!((evaluator.tracker().best_score().unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nan_predictions_fail_the_run_without_touching_best() {
        let data = dataset();
        let mut evaluator = CrossValEvaluator::new(config(true).with_metric(Metric::LogLoss)).unwrap();
        let err = evaluator.evaluate(&ranker(f64::NAN), &data, None).unwrap_err();
        assert!(matches!(err, FraudError::MetricError(_)));
        assert!(evaluator.tracker().best_score().is_none());

        let outcome = evaluator.evaluate(&ranker(1.0), &data, None).unwrap();
        assert_eq!(outcome.status, CvStatus::Completed);
        assert!(evaluator.tracker().best_score().unwrap().is_finite());
    }

    #[test]
    fn test_test_predictions_averaged() {
        let data = dataset();
        let mut evaluator = CrossValEvaluator::new(config(true).with_train_scores(true)).unwrap();
        let test = Array2::from_shape_vec((2, 2), vec![1.0, 0.0, -1.0, 0.0]).unwrap();
        let outcome = evaluator.evaluate(&ranker(1.0), &data, Some(test.view())).unwrap();

        let preds = outcome.test_predictions.unwrap();
        assert_eq!(preds.len(), 2);
        assert!((preds[0] - 1.0 / (1.0 + (-1.0f64).exp())).abs() < 1e-12);
        assert_eq!(outcome.train_scores.len(), 4);
    }

    #[test]
    fn test_averager_weights_sum_to_one() {
        let mut avg = PredictionAverager::new(3);
        for k in 0..4 {
            avg.add(Array1::from_elem(3, k as f64).view(), 0.25).unwrap();
        }
        assert!(avg.weights().iter().all(|w| (w - 1.0).abs() < 1e-12));
        let out = avg.finish();
        assert!((out[0] - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_test_feature_mismatch() {
        let data = dataset();
        let mut evaluator = CrossValEvaluator::new(config(true)).unwrap();
        let test = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            evaluator.evaluate(&ranker(1.0), &data, Some(test.view())),
            Err(FraudError::ShapeError { .. })
        ));
    }

    #[test]
    fn test_tracker_fold_count_must_match() {
        let tracker = config(true).build_tracker().unwrap();
        let other = CvConfig::default().with_strategy(CVStrategy::KFold { n_splits: 3, shuffle: false });
        assert!(CrossValEvaluator::with_tracker(other, tracker).is_err());
    }
}
