//! fraudcv - Fraud-detection modelling pipeline
//!
//! This crate provides:
//! - Tabular data loading and dataset assembly (polars)
//! - A histogram gradient-boosted tree classifier
//! - Pruned k-fold cross-validation with fold-averaged test predictions
//! - Hyperparameter search with checkpoint and resume
//! - A pipeline and CLI tying the pieces together
//!
//! # Modules
//!
//! - [`data`] - Loading, dataset building, negative down-sampling, submissions
//! - [`training`] - Splitters, metrics, the GBDT model, pruning and evaluation
//! - [`optimizer`] - Search spaces, samplers, studies and the tuner
//! - [`config`] - JSON pipeline configuration
//! - [`pipeline`] - End-to-end run
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core modules
pub mod data;
pub mod training;
pub mod optimizer;

// Orchestration
pub mod config;
pub mod pipeline;
pub mod cli;

pub use error::{FraudError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{FraudError, Result};

    // Data
    pub use crate::data::{DataLoader, Dataset, DatasetBuilder, Submission};

    // Training
    pub use crate::training::{
        BoostingType, CVStrategy, Classifier, CrossValEvaluator, CvConfig, CvOutcome, CvStatus,
        GbdtClassifier, GbdtConfig, Metric, PruningTracker,
    };

    // Optimization
    pub use crate::optimizer::{
        CvObjective, Objective, OptimizationConfig, OptimizeDirection, SearchSpace, Study,
        TrialParams, Tuner,
    };

    // Pipeline
    pub use crate::config::PipelineConfig;
    pub use crate::pipeline::{Pipeline, PipelineReport};
}
