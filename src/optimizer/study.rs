//! Trial history and search checkpoints

use super::config::OptimizeDirection;
use super::search_space::TrialParams;
use crate::error::{FraudError, Result};
use crate::training::PruningTracker;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// How a trial ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialState {
    Complete,
    Pruned,
    Failed,
}

/// Result of a single trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    pub params: TrialParams,
    /// Objective value; the extrapolated score for pruned trials, `None` for failures
    pub value: Option<f64>,
    pub state: TrialState,
    pub duration_secs: f64,
    pub started_at: DateTime<Utc>,
    /// Failure message
    pub error: Option<String>,
}

impl TrialResult {
    pub fn is_complete(&self) -> bool {
        self.state == TrialState::Complete
    }
}

/// Study containing all trials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub trials: Vec<TrialResult>,
    pub best_trial_idx: Option<usize>,
    /// Accumulated search time across resumed sessions
    pub total_duration_secs: f64,
    pub direction: OptimizeDirection,
}

impl Study {
    pub fn new(direction: OptimizeDirection) -> Self {
        Self {
            trials: Vec::new(),
            best_trial_idx: None,
            total_duration_secs: 0.0,
            direction,
        }
    }

    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.and_then(|idx| self.trials.get(idx))
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(|t| t.value)
    }

    pub fn best_params(&self) -> Option<&TrialParams> {
        self.best_trial().map(|t| &t.params)
    }

    /// Id the next trial will get
    pub fn next_trial_id(&self) -> usize {
        self.trials.len()
    }

    pub fn n_trials(&self) -> usize {
        self.trials.len()
    }

    pub fn count(&self, state: TrialState) -> usize {
        self.trials.iter().filter(|t| t.state == state).count()
    }

    /// Observations for the samplers: completed trials with their values, and
    /// pruned trials with the worst value so they only ever count as bad
    pub fn sampler_history(&self) -> Vec<(TrialParams, f64)> {
        self.trials
            .iter()
            .filter_map(|t| match (t.state, t.value) {
                (TrialState::Complete, Some(v)) => Some((t.params.clone(), v)),
                (TrialState::Pruned, _) => Some((t.params.clone(), self.direction.worst_value())),
                _ => None,
            })
            .collect()
    }

    /// Add a trial; only completed trials can become the best
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();
        if result.is_complete() {
            if let Some(value) = result.value {
                let is_better = match self.best_value() {
                    None => true,
                    Some(best) => self.direction.is_better(value, best),
                };
                if is_better {
                    self.best_trial_idx = Some(idx);
                }
            }
        }
        self.trials.push(result);
    }
}

/// Everything needed to resume an interrupted search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCheckpoint {
    pub study: Study,
    /// Pruning state of the cross-validation objective, when it has one
    pub pruning: Option<PruningTracker>,
    pub saved_at: DateTime<Utc>,
}

impl SearchCheckpoint {
    pub fn new(study: Study, pruning: Option<PruningTracker>) -> Self {
        Self { study, pruning, saved_at: Utc::now() }
    }

    /// Write to a sibling temp file, then rename over the target
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), trials = self.study.n_trials(), "checkpoint saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| {
            FraudError::SerializationError(format!("corrupt checkpoint {}: {}", path.display(), e))
        })
    }
}
