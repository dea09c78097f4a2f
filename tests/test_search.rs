//! Integration tests for hyperparameter search over pruned cross-validation

use fraudcv::optimizer::{SearchCheckpoint, TrialState};
use fraudcv::prelude::*;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn fraud_like(n: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let y: Array1<f64> = (0..n).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();
    let x = Array2::from_shape_fn((n, 2), |(i, j)| match j {
        0 => y[i] + rng.gen::<f64>(),
        _ => rng.gen::<f64>(),
    });
    Dataset::new(x, y, vec!["signal".into(), "noise".into()]).unwrap()
}

fn prototype() -> GbdtClassifier {
    GbdtClassifier::new(GbdtConfig {
        n_estimators: 10,
        learning_rate: 0.1,
        num_leaves: 4,
        max_depth: Some(3),
        min_child_samples: 5,
        colsample_bytree: 1.0,
        reg_alpha: 0.0,
        ..GbdtConfig::default()
    })
}

fn space() -> SearchSpace {
    SearchSpace::new()
        .int("num_leaves", 2, 16)
        .int("min_child_samples", 2, 40)
        .log_float("learning_rate", 1e-3, 0.5)
        .int("n_estimators", 5, 20)
}

fn evaluator() -> CrossValEvaluator {
    CrossValEvaluator::new(
        CvConfig::default()
            .with_strategy(CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true })
            .with_splits_to_start_pruning(2),
    )
    .unwrap()
}

#[test]
fn test_search_finds_completed_best() {
    let data = fraud_like(200);
    let config = OptimizationConfig::new()
        .with_n_trials(8)
        .with_n_startup_trials(4)
        .with_direction(OptimizeDirection::Maximize);

    let mut objective = CvObjective::new(prototype(), &data, evaluator());
    let mut tuner = Tuner::new(config, space());
    let study = tuner.optimize(&mut objective).unwrap();

    assert_eq!(study.n_trials(), 8);
    // The first trial always runs every fold
    assert_eq!(study.trials[0].state, TrialState::Complete);
    let best = study.best_trial().unwrap();
    assert_eq!(best.state, TrialState::Complete);
    assert!(best.value.unwrap() > 0.7);

    // Pruned trials never report a better score than the best completed one
    for trial in study.trials.iter().filter(|t| t.state == TrialState::Pruned) {
        assert!(trial.value.unwrap() <= best.value.unwrap());
    }
    assert_eq!(
        objective.evaluator().tracker().n_completed(),
        study.count(TrialState::Complete)
    );
}

#[test]
fn test_unknown_parameter_fails_trial_but_search_continues() {
    let data = fraud_like(120);
    let bad_space = space().float("gamma", 0.0, 1.0);
    let config = OptimizationConfig::new().with_n_trials(3);

    let mut objective = CvObjective::new(prototype(), &data, evaluator());
    let mut tuner = Tuner::new(config, bad_space);
    let study = tuner.optimize(&mut objective).unwrap();

    assert_eq!(study.count(TrialState::Failed), 3);
    assert!(study.best_trial().is_none());
    assert!(study.trials.iter().all(|t| t.error.is_some()));
}

#[test]
fn test_resume_restores_study_and_pruning_state() {
    let data = fraud_like(160);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study_gbdt.json");

    let config = |n| {
        OptimizationConfig::new()
            .with_n_trials(n)
            .with_n_startup_trials(2)
            .with_checkpoint(&path)
    };

    {
        let mut objective = CvObjective::new(prototype(), &data, evaluator());
        let mut tuner = Tuner::new(config(3), space());
        tuner.optimize(&mut objective).unwrap();
    }

    let checkpoint = SearchCheckpoint::load(&path).unwrap();
    assert_eq!(checkpoint.study.n_trials(), 3);
    let saved_tracker = checkpoint.pruning.clone().unwrap();
    assert!(saved_tracker.best_score().is_some());

    let mut objective = CvObjective::new(prototype(), &data, evaluator());
    let mut tuner = Tuner::resume(config(5), space()).unwrap();
    let study = tuner.optimize(&mut objective).unwrap();

    assert_eq!(study.n_trials(), 5);
    assert_eq!(
        study.trials.iter().map(|t| t.trial_id).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    // Pruning state continued from the checkpoint rather than starting empty
    let tracker = objective.evaluator().tracker();
    assert_eq!(
        tracker.n_completed() + tracker.n_pruned(),
        saved_tracker.n_completed() + saved_tracker.n_pruned() + 2
    );
    assert!(tracker.best_score().unwrap() >= saved_tracker.best_score().unwrap());
}
