//! Pipeline configuration, loaded from JSON with defaults for every field

use crate::error::{FraudError, Result};
use crate::optimizer::{OptimizationConfig, SamplerType};
use crate::training::{BoostingType, CVStrategy, CvConfig, GbdtConfig, Metric};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Input and output files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub train_features: PathBuf,
    /// Separate labels file; the label is read from `train_features` when unset
    pub train_labels: Option<PathBuf>,
    pub test_features: Option<PathBuf>,
    pub sample_submission: Option<PathBuf>,
    pub submission_output: PathBuf,
    pub target_column: String,
    pub id_column: Option<String>,
    /// Fold groups for group k-fold, removed from the features
    pub group_column: Option<String>,
    pub drop_columns: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            train_features: PathBuf::from("data/train.parquet"),
            train_labels: None,
            test_features: Some(PathBuf::from("data/test.parquet")),
            sample_submission: Some(PathBuf::from("data/sample_submission.csv")),
            submission_output: PathBuf::from("submission.csv"),
            target_column: "isFraud".to_string(),
            id_column: Some("TransactionID".to_string()),
            group_column: Some("DT_M".to_string()),
            drop_columns: Vec::new(),
        }
    }
}

/// Hyperparameter search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    pub n_trials: usize,
    pub timeout_secs: Option<f64>,
    pub sampler: SamplerType,
    pub n_startup_trials: usize,
    pub early_stopping_patience: Option<usize>,
    /// Share of negative rows kept for the search set
    pub negative_sample_frac: Option<f64>,
    pub strategy: CVStrategy,
    pub checkpoint_path: Option<PathBuf>,
    /// Where the best parameters are written after the search
    pub best_params_output: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            n_trials: 100,
            timeout_secs: Some(21.0 * 3600.0),
            sampler: SamplerType::TPE,
            n_startup_trials: 10,
            early_stopping_patience: None,
            negative_sample_frac: Some(0.2),
            strategy: CVStrategy::GroupKFold { n_splits: 6 },
            checkpoint_path: Some(PathBuf::from("study_gbdt.json")),
            best_params_output: Some(PathBuf::from("best_params.json")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub search: SearchConfig,
    /// Strategy of the final cross-validation pass
    pub final_strategy: CVStrategy,
    /// Run the final pass on the negatively down-sampled set instead of every row
    pub final_on_search_set: bool,
    pub metric: Metric,
    pub tolerance: f64,
    pub splits_to_start_pruning: usize,
    pub random_state: u64,
    /// Model used by the final pass when the search is off, and the base of every trial
    pub model: GbdtConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            search: SearchConfig::default(),
            final_strategy: CVStrategy::StratifiedKFold { n_splits: 6, shuffle: true },
            final_on_search_set: true,
            metric: Metric::Auc,
            tolerance: 0.02,
            splits_to_start_pruning: 3,
            random_state: 42,
            model: GbdtConfig::default(),
        }
    }
}

fn with_n_splits(strategy: &CVStrategy, n: usize) -> CVStrategy {
    match strategy {
        CVStrategy::KFold { shuffle, .. } => CVStrategy::KFold { n_splits: n, shuffle: *shuffle },
        CVStrategy::StratifiedKFold { shuffle, .. } => {
            CVStrategy::StratifiedKFold { n_splits: n, shuffle: *shuffle }
        }
        CVStrategy::GroupKFold { .. } => CVStrategy::GroupKFold { n_splits: n },
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| FraudError::ConfigError(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&json)
            .map_err(|e| FraudError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance >= 0.0) {
            return Err(FraudError::ConfigError(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        for strategy in [&self.search.strategy, &self.final_strategy] {
            let n = strategy.n_splits();
            if n < 2 {
                return Err(FraudError::ConfigError(format!("need at least 2 folds, got {}", n)));
            }
            if strategy.needs_groups() && self.data.group_column.is_none() {
                return Err(FraudError::ConfigError(
                    "group k-fold needs data.group_column".to_string(),
                ));
            }
        }
        let search_folds = self.search.strategy.n_splits();
        if self.search.enabled && (self.splits_to_start_pruning == 0 || self.splits_to_start_pruning >= search_folds) {
            return Err(FraudError::ConfigError(format!(
                "splits_to_start_pruning must be in [1, {}), got {}",
                search_folds, self.splits_to_start_pruning
            )));
        }
        if let Some(frac) = self.search.negative_sample_frac {
            if !(frac > 0.0 && frac <= 1.0) {
                return Err(FraudError::ConfigError(format!(
                    "negative_sample_frac must be in (0, 1], got {}",
                    frac
                )));
            }
        }
        self.model.validate()
    }

    /// Set the fold count of both the search and the final pass
    pub fn with_n_folds(mut self, n: usize) -> Self {
        self.search.strategy = with_n_splits(&self.search.strategy, n);
        self.final_strategy = with_n_splits(&self.final_strategy, n);
        self
    }

    pub fn with_search(mut self, enabled: bool) -> Self {
        self.search.enabled = enabled;
        self
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.search.n_trials = n;
        self
    }

    pub fn with_timeout(mut self, secs: Option<f64>) -> Self {
        self.search.timeout_secs = secs;
        self
    }

    pub fn with_boosting_type(mut self, boosting_type: BoostingType) -> Self {
        self.model.boosting_type = boosting_type;
        self
    }

    pub fn with_final_on_search_set(mut self, enabled: bool) -> Self {
        self.final_on_search_set = enabled;
        self
    }

    pub fn with_checkpoint(mut self, path: Option<PathBuf>) -> Self {
        self.search.checkpoint_path = path;
        self
    }

    /// Evaluator settings for the search, with pruning on
    pub fn search_cv_config(&self) -> CvConfig {
        CvConfig::default()
            .with_strategy(self.search.strategy.clone())
            .with_metric(self.metric)
            .with_tolerance(self.tolerance)
            .with_splits_to_start_pruning(self.splits_to_start_pruning)
            .with_pruning(true)
            .with_random_state(Some(self.random_state))
    }

    /// Evaluator settings for the final pass: every fold, train scores included
    pub fn final_cv_config(&self) -> CvConfig {
        CvConfig::default()
            .with_strategy(self.final_strategy.clone())
            .with_metric(self.metric)
            .with_tolerance(self.tolerance)
            .with_splits_to_start_pruning(self.splits_to_start_pruning.min(self.final_strategy.n_splits() - 1).max(1))
            .with_pruning(false)
            .with_random_state(Some(self.random_state))
            .with_train_scores(true)
    }

    pub fn optimization_config(&self) -> OptimizationConfig {
        let mut config = OptimizationConfig::new()
            .with_n_trials(self.search.n_trials)
            .with_direction(self.metric.direction())
            .with_sampler(self.search.sampler.clone())
            .with_n_startup_trials(self.search.n_startup_trials)
            .with_random_state(Some(self.random_state));
        config.timeout_secs = self.search.timeout_secs;
        config.early_stopping_patience = self.search.early_stopping_patience;
        config.checkpoint_path = self.search.checkpoint_path.clone();
        config
    }
}
