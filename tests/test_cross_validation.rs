//! Integration tests for pruned cross-validation with the GBDT classifier

use fraudcv::prelude::*;
use fraudcv::training::CVStrategy;
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Imbalanced binary data: one informative feature, one noise feature with gaps,
/// and a month-like group id.
fn fraud_like(n: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let y: Array1<f64> = (0..n).map(|i| if i % 5 == 0 { 1.0 } else { 0.0 }).collect();
    let x = Array2::from_shape_fn((n, 3), |(i, j)| match j {
        0 => y[i] * 1.5 + rng.gen::<f64>(),
        1 => {
            if i % 11 == 0 {
                f64::NAN
            } else {
                rng.gen::<f64>()
            }
        }
        _ => rng.gen_range(0.0..10.0),
    });
    let groups: Array1<i64> = (0..n).map(|i| 12 + (i / (n / 8)) as i64).map(|g| g.min(19)).collect();
    Dataset::new(x, y, vec!["signal".into(), "noise".into(), "amount".into()])
        .unwrap()
        .with_groups(groups)
        .unwrap()
}

fn model(n_estimators: usize, learning_rate: f64) -> GbdtClassifier {
    GbdtClassifier::new(GbdtConfig {
        n_estimators,
        learning_rate,
        num_leaves: 8,
        max_depth: Some(4),
        min_child_samples: 5,
        colsample_bytree: 1.0,
        reg_alpha: 0.0,
        ..GbdtConfig::default()
    })
}

fn cv(prune: bool, strategy: CVStrategy) -> CvConfig {
    CvConfig::default()
        .with_strategy(strategy)
        .with_metric(Metric::Auc)
        .with_tolerance(0.02)
        .with_pruning(prune)
}

#[test]
fn test_full_cv_learns_signal() {
    let data = fraud_like(400, 1);
    let mut evaluator = CrossValEvaluator::new(cv(false, CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true })).unwrap();
    let outcome = evaluator.evaluate(&model(40, 0.1), &data, None).unwrap();

    assert_eq!(outcome.status, CvStatus::Completed);
    assert_eq!(outcome.fold_scores.len(), 4);
    assert!(outcome.score > 0.85, "AUC too low: {}", outcome.score);
    let oof = outcome.oof_predictions.unwrap();
    assert!(oof.iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p)));
}

#[test]
fn test_pruning_disabled_matches_never_triggered_pruning() {
    let data = fraud_like(400, 2);
    let strategy = CVStrategy::KFold { n_splits: 4, shuffle: true };

    let mut pruned = CrossValEvaluator::new(cv(true, strategy.clone())).unwrap();
    let mut plain = CrossValEvaluator::new(cv(false, strategy)).unwrap();

    let a = pruned.evaluate(&model(20, 0.1), &data, None).unwrap();
    let b = plain.evaluate(&model(20, 0.1), &data, None).unwrap();

    assert_eq!(a.status, CvStatus::Completed);
    assert_eq!(a.fold_scores, b.fold_scores);
    assert!((a.score - b.score).abs() < 1e-12);
}

#[test]
fn test_weak_configuration_is_pruned_and_never_outscores_best() {
    let data = fraud_like(400, 3);
    let mut evaluator =
        CrossValEvaluator::new(cv(true, CVStrategy::StratifiedKFold { n_splits: 4, shuffle: true })).unwrap();

    let strong = evaluator.evaluate(&model(40, 0.1), &data, None).unwrap();
    assert_eq!(strong.status, CvStatus::Completed);

    // One stump on a sampled column with a negligible learning rate
    let weak = GbdtClassifier::new(GbdtConfig {
        n_estimators: 1,
        learning_rate: 1e-6,
        num_leaves: 2,
        max_depth: Some(1),
        min_child_samples: 150,
        colsample_bytree: 0.34,
        reg_alpha: 0.0,
        random_state: Some(7),
        ..GbdtConfig::default()
    });
    let outcome = evaluator.evaluate(&weak, &data, None).unwrap();
    assert!(outcome.score <= strong.score);
    if let CvStatus::Pruned { after_folds } = outcome.status {
        assert!(after_folds >= 2 && after_folds < 4);
        assert!(outcome.test_predictions.is_none());
    }
    assert!((evaluator.tracker().best_score().unwrap() - strong.score).abs() < 1e-12);
}

#[test]
fn test_test_predictions_are_fold_average() {
    let data = fraud_like(300, 4);
    let test = data.x.slice(ndarray::s![..25, ..]).to_owned();
    let mut evaluator =
        CrossValEvaluator::new(cv(false, CVStrategy::StratifiedKFold { n_splits: 3, shuffle: true })).unwrap();
    let outcome = evaluator.evaluate(&model(15, 0.1), &data, Some(test.view())).unwrap();

    let preds = outcome.test_predictions.unwrap();
    assert_eq!(preds.len(), 25);
    assert!(preds.iter().all(|p| (0.0..=1.0).contains(p)));
}

#[test]
fn test_group_folds_keep_months_together() {
    let data = fraud_like(400, 5);
    let groups = data.groups.clone().unwrap();
    let splits = fraudcv::training::CrossValidator::new(CVStrategy::GroupKFold { n_splits: 4 })
        .split(data.n_samples(), Some(&data.y), Some(&groups))
        .unwrap();

    for split in &splits {
        let val_groups: std::collections::HashSet<i64> =
            split.test_indices.iter().map(|&i| groups[i]).collect();
        assert!(split.train_indices.iter().all(|&i| !val_groups.contains(&groups[i])));
    }

    let mut evaluator = CrossValEvaluator::new(cv(false, CVStrategy::GroupKFold { n_splits: 4 })).unwrap();
    let outcome = evaluator.evaluate(&model(20, 0.1), &data, None).unwrap();
    assert_eq!(outcome.fold_scores.len(), 4);
}

#[test]
fn test_group_strategy_without_groups_fails() {
    let mut data = fraud_like(100, 6);
    data.groups = None;
    let mut evaluator = CrossValEvaluator::new(cv(false, CVStrategy::GroupKFold { n_splits: 4 })).unwrap();
    assert!(evaluator.evaluate(&model(5, 0.1), &data, None).is_err());
}
