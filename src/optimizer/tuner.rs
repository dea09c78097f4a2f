//! Sequential hyperparameter search with checkpoint and resume

use super::config::OptimizationConfig;
use super::samplers::{create_sampler, Sampler};
use super::search_space::{SearchSpace, TrialParams};
use super::study::{SearchCheckpoint, Study, TrialResult, TrialState};
use crate::data::Dataset;
use crate::error::{FraudError, Result};
use crate::training::{Classifier, CrossValEvaluator, PruningTracker};
use chrono::Utc;
use std::time::Instant;
use tracing::{info, warn};

/// Value reported by an objective for one trial
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOutcome {
    pub value: f64,
    pub pruned: bool,
}

impl TrialOutcome {
    pub fn completed(value: f64) -> Self {
        Self { value, pruned: false }
    }

    pub fn pruned(value: f64) -> Self {
        Self { value, pruned: true }
    }
}

/// Function evaluated by the tuner for every sampled configuration
pub trait Objective {
    fn evaluate(&mut self, trial_id: usize, params: &TrialParams) -> Result<TrialOutcome>;

    /// Pruning state to store in checkpoints
    fn pruning_state(&self) -> Option<PruningTracker> {
        None
    }

    /// Restore pruning state from a checkpoint
    fn restore_pruning_state(&mut self, _tracker: PruningTracker) -> Result<()> {
        Ok(())
    }
}

/// Adapts a closure returning a plain score into an [`Objective`]
pub struct FnObjective<F>(pub F);

impl<F> Objective for FnObjective<F>
where
    F: FnMut(&TrialParams) -> Result<f64>,
{
    fn evaluate(&mut self, _trial_id: usize, params: &TrialParams) -> Result<TrialOutcome> {
        (self.0)(params).map(TrialOutcome::completed)
    }
}

/// Scores a configuration by pruned cross-validation of a classifier prototype
pub struct CvObjective<'a, M: Classifier> {
    prototype: M,
    data: &'a Dataset,
    evaluator: CrossValEvaluator,
}

impl<'a, M: Classifier> CvObjective<'a, M> {
    pub fn new(prototype: M, data: &'a Dataset, evaluator: CrossValEvaluator) -> Self {
        Self { prototype, data, evaluator }
    }

    pub fn evaluator(&self) -> &CrossValEvaluator {
        &self.evaluator
    }
}

impl<M: Classifier> Objective for CvObjective<'_, M> {
    fn evaluate(&mut self, trial_id: usize, params: &TrialParams) -> Result<TrialOutcome> {
        let mut model = self.prototype.clone();
        model.set_params(params)?;
        let outcome = self.evaluator.evaluate(&model, self.data, None)?;
        info!(
            trial = trial_id,
            score = outcome.score,
            folds = outcome.fold_scores.len(),
            pruned = outcome.is_pruned(),
            "trial evaluated"
        );
        Ok(TrialOutcome { value: outcome.score, pruned: outcome.is_pruned() })
    }

    fn pruning_state(&self) -> Option<PruningTracker> {
        Some(self.evaluator.tracker().clone())
    }

    fn restore_pruning_state(&mut self, tracker: PruningTracker) -> Result<()> {
        self.evaluator = CrossValEvaluator::with_tracker(self.evaluator.config().clone(), tracker)?;
        Ok(())
    }
}

/// Runs trials until the trial budget or the timeout is used up
pub struct Tuner {
    config: OptimizationConfig,
    search_space: SearchSpace,
    sampler: Box<dyn Sampler>,
    study: Study,
    restored_pruning: Option<PruningTracker>,
}

impl Tuner {
    pub fn new(config: OptimizationConfig, search_space: SearchSpace) -> Self {
        let study = Study::new(config.direction);
        Self::from_parts(config, search_space, study, None)
    }

    fn from_parts(
        config: OptimizationConfig,
        search_space: SearchSpace,
        study: Study,
        restored_pruning: Option<PruningTracker>,
    ) -> Self {
        // Offset the seed so a resumed search does not replay the first samples
        let seed = config
            .random_state
            .map(|s| s.wrapping_add(study.next_trial_id() as u64));
        let sampler = create_sampler(&config.sampler, seed, config.direction, config.n_startup_trials);
        Self { config, search_space, sampler, study, restored_pruning }
    }

    /// Continue from the configured checkpoint, or start fresh when there is none
    pub fn resume(config: OptimizationConfig, search_space: SearchSpace) -> Result<Self> {
        let path = match &config.checkpoint_path {
            Some(p) if p.exists() => p.clone(),
            _ => return Ok(Self::new(config, search_space)),
        };
        let checkpoint = SearchCheckpoint::load(&path)?;
        if checkpoint.study.direction != config.direction {
            return Err(FraudError::ConfigError(format!(
                "checkpoint {} was written for {:?}, not {:?}",
                path.display(),
                checkpoint.study.direction,
                config.direction
            )));
        }
        info!(
            path = %path.display(),
            trials = checkpoint.study.n_trials(),
            best = ?checkpoint.study.best_value(),
            "resuming search"
        );
        Ok(Self::from_parts(config, search_space, checkpoint.study, checkpoint.pruning))
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    pub fn into_study(self) -> Study {
        self.study
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    fn checkpoint(&self, objective: &dyn Objective) -> Result<()> {
        if let Some(path) = &self.config.checkpoint_path {
            SearchCheckpoint::new(self.study.clone(), objective.pruning_state()).save(path)?;
        }
        Ok(())
    }

    /// Run trials; a failing trial is recorded and the search goes on
    pub fn optimize(&mut self, objective: &mut dyn Objective) -> Result<&Study> {
        if let Some(tracker) = self.restored_pruning.take() {
            objective.restore_pruning_state(tracker)?;
        }

        let start = Instant::now();
        let mut trials_without_improvement = 0usize;

        while self.study.n_trials() < self.config.n_trials {
            if let Some(t) = self.config.timeout_secs {
                if start.elapsed().as_secs_f64() > t {
                    info!(trials = self.study.n_trials(), "search timeout reached");
                    break;
                }
            }
            if let Some(p) = self.config.early_stopping_patience {
                if trials_without_improvement >= p {
                    info!(patience = p, "search stopped early without improvement");
                    break;
                }
            }

            let trial_id = self.study.next_trial_id();
            let history = self.study.sampler_history();
            let params = self.sampler.sample(&self.search_space, &history);
            let best_before = self.study.best_value();
            let started_at = Utc::now();
            let trial_start = Instant::now();

            let (value, state, error) = match objective.evaluate(trial_id, &params) {
                Ok(o) if o.pruned => (Some(o.value), TrialState::Pruned, None),
                Ok(o) => (Some(o.value), TrialState::Complete, None),
                Err(e) => {
                    warn!(trial = trial_id, error = %e, "trial failed");
                    (None, TrialState::Failed, Some(e.to_string()))
                }
            };
            let duration_secs = trial_start.elapsed().as_secs_f64();

            self.study.add_trial(TrialResult {
                trial_id,
                params,
                value,
                state,
                duration_secs,
                started_at,
                error,
            });
            self.study.total_duration_secs += duration_secs;

            if state == TrialState::Complete {
                let improved = match (value, best_before) {
                    (Some(v), Some(b)) => self.config.direction.is_better(v, b)
                        && (v - b).abs() > self.config.min_improvement,
                    (Some(_), None) => true,
                    _ => false,
                };
                if improved {
                    trials_without_improvement = 0;
                } else {
                    trials_without_improvement += 1;
                }
            }

            info!(
                trial = trial_id,
                value = ?value,
                state = ?state,
                best = ?self.study.best_value(),
                elapsed_secs = duration_secs,
                "trial finished"
            );
            self.checkpoint(&*objective)?;
        }

        Ok(&self.study)
    }
}
