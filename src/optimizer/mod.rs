//! Hyperparameter search
//!
//! Provides:
//! - Search spaces with linear and log-scaled ranges
//! - Random and Tree-structured Parzen Estimator (TPE) samplers
//! - A sequential tuner with timeout, early stopping and checkpoint/resume

mod config;
mod samplers;
mod search_space;
mod study;
mod tuner;

pub use config::{OptimizationConfig, OptimizeDirection};
pub use samplers::{create_sampler, RandomSampler, Sampler, SamplerType, TPESampler};
pub use search_space::{Parameter, ParameterType, ParameterValue, SearchSpace, TrialParams};
pub use study::{SearchCheckpoint, Study, TrialResult, TrialState};
pub use tuner::{CvObjective, FnObjective, Objective, TrialOutcome, Tuner};
