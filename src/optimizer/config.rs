//! Search configuration

use super::samplers::SamplerType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Direction of optimization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeDirection {
    Minimize,
    Maximize,
}

impl OptimizeDirection {
    /// Strictly better in this direction
    pub fn is_better(&self, candidate: f64, reference: f64) -> bool {
        match self {
            OptimizeDirection::Minimize => candidate < reference,
            OptimizeDirection::Maximize => candidate > reference,
        }
    }

    /// Value that loses against every finite score
    pub fn worst_value(&self) -> f64 {
        match self {
            OptimizeDirection::Minimize => f64::INFINITY,
            OptimizeDirection::Maximize => f64::NEG_INFINITY,
        }
    }
}

/// Configuration for hyperparameter search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Number of trials to run, counting trials restored from a checkpoint
    pub n_trials: usize,

    /// Wall-clock budget in seconds, checked between trials
    pub timeout_secs: Option<f64>,

    pub direction: OptimizeDirection,

    pub sampler: SamplerType,

    /// Random trials before the TPE sampler starts modelling
    pub n_startup_trials: usize,

    pub random_state: Option<u64>,

    /// Stop after this many completed trials without improvement
    pub early_stopping_patience: Option<usize>,

    /// Minimum improvement that resets the patience counter
    pub min_improvement: f64,

    /// Where the study is checkpointed after every trial
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            n_trials: 100,
            timeout_secs: None,
            direction: OptimizeDirection::Maximize,
            sampler: SamplerType::TPE,
            n_startup_trials: 10,
            random_state: Some(42),
            early_stopping_patience: None,
            min_improvement: 1e-6,
            checkpoint_path: None,
        }
    }
}

impl OptimizationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_direction(mut self, direction: OptimizeDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_early_stopping(mut self, patience: usize) -> Self {
        self.early_stopping_patience = Some(patience);
        self
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }
}
