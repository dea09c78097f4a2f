//! Fold-level pruning of cross-validation runs
//!
//! The tracker remembers the per-fold scores of the best completed run. While a new
//! run is in progress its running mean is compared against the mean of the same
//! number of leading folds of the best run; a run that falls behind by more than the
//! relative tolerance is abandoned and its score extrapolated.

use crate::error::{FraudError, Result};
use crate::optimizer::OptimizeDirection;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of reporting one fold score
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PruneDecision {
    /// Keep evaluating folds
    Continue,
    /// Stop the run; `score` is the extrapolated full-run score
    Prune { score: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningTracker {
    n_splits: usize,
    tolerance: f64,
    splits_to_start_pruning: usize,
    direction: OptimizeDirection,
    best_splits: Vec<f64>,
    current_splits: Vec<f64>,
    n_completed: usize,
    n_pruned: usize,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn non_finite(score: f64) -> FraudError {
    FraudError::ValidationError(format!("fold score must be finite, got {}", score))
}

impl PruningTracker {
    pub fn new(n_splits: usize, tolerance: f64, direction: OptimizeDirection) -> Result<Self> {
        if n_splits < 2 {
            return Err(FraudError::InvalidParameter {
                name: "n_splits".to_string(),
                value: n_splits.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if !(tolerance >= 0.0) {
            return Err(FraudError::InvalidParameter {
                name: "tolerance".to_string(),
                value: tolerance.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        Ok(Self {
            n_splits,
            tolerance,
            splits_to_start_pruning: 2,
            direction,
            best_splits: Vec::new(),
            current_splits: Vec::new(),
            n_completed: 0,
            n_pruned: 0,
        })
    }

    /// Number of folds that must finish before pruning is considered
    pub fn with_splits_to_start_pruning(mut self, k: usize) -> Result<Self> {
        if k == 0 || k >= self.n_splits {
            return Err(FraudError::InvalidParameter {
                name: "splits_to_start_pruning".to_string(),
                value: k.to_string(),
                reason: format!("must be in [1, {})", self.n_splits),
            });
        }
        self.splits_to_start_pruning = k;
        Ok(self)
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn direction(&self) -> &OptimizeDirection {
        &self.direction
    }

    /// Mean score of the best completed run
    pub fn best_score(&self) -> Option<f64> {
        if self.best_splits.is_empty() {
            None
        } else {
            Some(mean(&self.best_splits))
        }
    }

    pub fn best_splits(&self) -> &[f64] {
        &self.best_splits
    }

    pub fn n_completed(&self) -> usize {
        self.n_completed
    }

    pub fn n_pruned(&self) -> usize {
        self.n_pruned
    }

    /// Drop the folds of an unfinished run, e.g. after a fold failed
    pub fn reset_run(&mut self) {
        self.current_splits.clear();
    }

    fn is_better(&self, candidate: f64, reference: f64) -> bool {
        match self.direction {
            OptimizeDirection::Minimize => candidate < reference,
            OptimizeDirection::Maximize => candidate > reference,
        }
    }

    /// Record the score of the next fold and decide whether the run goes on.
    /// A non-finite score abandons the run.
    pub fn report(&mut self, fold_score: f64) -> Result<PruneDecision> {
        if !fold_score.is_finite() {
            self.current_splits.clear();
            return Err(non_finite(fold_score));
        }
        self.current_splits.push(fold_score);
        let k = self.current_splits.len();

        if self.best_splits.is_empty() || k < self.splits_to_start_pruning || k >= self.n_splits {
            return Ok(PruneDecision::Continue);
        }

        let current = mean(&self.current_splits);
        let best_prefix = mean(&self.best_splits[..k]);
        let behind = match self.direction {
            OptimizeDirection::Minimize => current > best_prefix * (1.0 + self.tolerance),
            OptimizeDirection::Maximize => current * (1.0 + self.tolerance) < best_prefix,
        };
        if !behind {
            return Ok(PruneDecision::Continue);
        }

        let best_full = mean(&self.best_splits);
        let extrapolated = if best_prefix == 0.0 {
            current
        } else {
            current / best_prefix * best_full
        };
        // A pruned run never reports better than the best completed run
        let score = match self.direction {
            OptimizeDirection::Minimize => extrapolated.max(best_full),
            OptimizeDirection::Maximize => extrapolated.min(best_full),
        };
        debug!(folds = k, current, best_prefix, score, "run pruned");
        self.current_splits.clear();
        self.n_pruned += 1;
        Ok(PruneDecision::Prune { score })
    }

    /// Close a run whose folds were all reported; returns its mean score
    pub fn complete(&mut self) -> Result<f64> {
        let splits = std::mem::take(&mut self.current_splits);
        self.record_completed(&splits)
    }

    /// Register a finished run evaluated without fold-level reporting
    pub fn record_completed(&mut self, fold_scores: &[f64]) -> Result<f64> {
        self.current_splits.clear();
        if fold_scores.len() != self.n_splits {
            return Err(FraudError::ValidationError(format!(
                "expected {} fold scores, got {}",
                self.n_splits,
                fold_scores.len()
            )));
        }
        if let Some(&bad) = fold_scores.iter().find(|s| !s.is_finite()) {
            return Err(non_finite(bad));
        }
        let score = mean(fold_scores);
        let replace = match self.best_score() {
            None => true,
            Some(best) => self.is_better(score, best),
        };
        if replace {
            self.best_splits = fold_scores.to_vec();
        }
        self.n_completed += 1;
        Ok(score)
    }
}
