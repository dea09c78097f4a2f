//! End-to-end run: load, search, final cross-validation, submission

use crate::config::PipelineConfig;
use crate::data::{DataLoader, Dataset, DatasetBuilder, Submission};
use crate::error::{FraudError, Result};
use crate::optimizer::{CvObjective, SearchSpace, Study, TrialParams, TrialState, Tuner};
use crate::training::{Classifier, CrossValEvaluator, CvOutcome, GbdtClassifier};
use ndarray::Array2;
use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Summary of a search
#[derive(Debug, Clone)]
pub struct SearchSummary {
    pub n_trials: usize,
    pub n_complete: usize,
    pub n_pruned: usize,
    pub n_failed: usize,
    pub best_value: Option<f64>,
    pub best_params: Option<TrialParams>,
}

impl From<&Study> for SearchSummary {
    fn from(study: &Study) -> Self {
        Self {
            n_trials: study.n_trials(),
            n_complete: study.count(TrialState::Complete),
            n_pruned: study.count(TrialState::Pruned),
            n_failed: study.count(TrialState::Failed),
            best_value: study.best_value(),
            best_params: study.best_params().cloned(),
        }
    }
}

/// What a pipeline run produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub search: Option<SearchSummary>,
    pub evaluation: CvOutcome,
    pub submission_path: Option<PathBuf>,
    pub elapsed_secs: f64,
}

pub struct Pipeline {
    config: PipelineConfig,
    loader: DataLoader,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, loader: DataLoader::new() })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn builder(&self) -> DatasetBuilder {
        let data = &self.config.data;
        DatasetBuilder::new(data.target_column.clone())
            .with_group_column(data.group_column.clone())
            .with_id_column(data.id_column.clone())
            .with_drop_columns(data.drop_columns.clone())
    }

    pub fn load_training(&self) -> Result<Dataset> {
        let data = &self.config.data;
        let features = self.loader.load_auto(&data.train_features)?;
        let labels = match &data.train_labels {
            Some(path) => Some(self.loader.load_auto(path)?),
            None => None,
        };
        self.builder().build(&features, labels.as_ref())
    }

    /// Test matrix aligned to the training columns, when a test file is configured
    pub fn load_test(&self, train: &Dataset) -> Result<Option<Array2<f64>>> {
        match &self.config.data.test_features {
            Some(path) => {
                let df = self.loader.load_auto(path)?;
                Ok(Some(train.align_test(&df)?))
            }
            None => Ok(None),
        }
    }

    fn base_model(&self) -> GbdtClassifier {
        GbdtClassifier::new(self.config.model.clone())
    }

    /// Training rows used by the search: all positives and a sample of the negatives
    pub fn search_set<'a>(&self, train: &'a Dataset) -> Result<Cow<'a, Dataset>> {
        match self.config.search.negative_sample_frac {
            Some(frac) if frac < 1.0 => Ok(Cow::Owned(train.downsample_negatives(frac, self.config.random_state)?)),
            _ => Ok(Cow::Borrowed(train)),
        }
    }

    /// Training rows of the final pass
    pub fn final_set<'a>(&self, train: &'a Dataset) -> Result<Cow<'a, Dataset>> {
        if self.config.final_on_search_set {
            self.search_set(train)
        } else {
            Ok(Cow::Borrowed(train))
        }
    }

    /// Pruned search on the (optionally down-sampled) training set, resuming from the checkpoint
    pub fn search(&self, train: &Dataset) -> Result<Study> {
        let search_set = self.search_set(train)?;
        self.search_on(&search_set)
    }

    fn search_on(&self, search_set: &Dataset) -> Result<Study> {
        let evaluator = CrossValEvaluator::new(self.config.search_cv_config())?;
        let mut objective = CvObjective::new(self.base_model(), search_set, evaluator);
        let mut tuner = Tuner::resume(self.config.optimization_config(), SearchSpace::lightgbm_default())?;
        tuner.optimize(&mut objective)?;
        let study = tuner.into_study();

        if let (Some(path), Some(params)) = (&self.config.search.best_params_output, study.best_params()) {
            fs::write(path, serde_json::to_string_pretty(params)?)?;
            info!(path = %path.display(), "best parameters written");
        }
        Ok(study)
    }

    /// Full cross-validation of one configuration, with test predictions when given
    pub fn evaluate(
        &self,
        train: &Dataset,
        test: Option<&Array2<f64>>,
        params: Option<&TrialParams>,
    ) -> Result<CvOutcome> {
        let mut model = self.base_model();
        if let Some(p) = params {
            model.set_params(p)?;
        }
        let mut evaluator = CrossValEvaluator::new(self.config.final_cv_config())?;
        evaluator.evaluate(&model, train, test.map(|t| t.view()))
    }

    fn write_submission(&self, outcome: &CvOutcome) -> Result<Option<PathBuf>> {
        let data = &self.config.data;
        let (Some(template), Some(preds)) = (&data.sample_submission, &outcome.test_predictions) else {
            return Ok(None);
        };
        let id_column = data
            .id_column
            .clone()
            .ok_or_else(|| FraudError::ConfigError("a submission needs data.id_column".to_string()))?;
        let mut submission = Submission::load_template(template, id_column, data.target_column.clone())?
            .with_predictions(preds)?;
        submission.write_csv(&data.submission_output)?;
        Ok(Some(data.submission_output.clone()))
    }

    /// Load, optionally search, cross-validate the chosen configuration and write the submission
    pub fn run(&self) -> Result<PipelineReport> {
        let start = Instant::now();
        let train = self.load_training()?;
        let test = self.load_test(&train)?;
        let search_set = self.search_set(&train)?;

        let (search, best_params) = if self.config.search.enabled {
            let study = self.search_on(&search_set)?;
            let summary = SearchSummary::from(&study);
            if summary.best_params.is_none() {
                warn!("search finished without a completed trial, using the configured model");
            }
            let params = summary.best_params.clone();
            (Some(summary), params)
        } else {
            (None, None)
        };

        let final_set: &Dataset = if self.config.final_on_search_set { &*search_set } else { &train };
        info!(rows = final_set.n_samples(), positives = final_set.n_positive(), "final cross-validation");
        let evaluation = self.evaluate(final_set, test.as_ref(), best_params.as_ref())?;
        let submission_path = self.write_submission(&evaluation)?;

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            score = evaluation.score,
            std = evaluation.std_score,
            train_score = ?evaluation.mean_train_score(),
            elapsed_secs,
            "pipeline finished"
        );
        Ok(PipelineReport { search, evaluation, submission_path, elapsed_secs })
    }
}
