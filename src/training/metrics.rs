//! Evaluation metrics for binary fraud classification

use crate::error::{FraudError, Result};
use crate::optimizer::OptimizeDirection;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metric used to score held-out fold predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Area under the ROC curve
    Auc,
    /// Binary cross-entropy
    LogLoss,
    /// Mean squared error of the probabilities (Brier score)
    Mse,
    /// Mean absolute error of the probabilities
    Mae,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Auc
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Auc => "auc",
            Metric::LogLoss => "log_loss",
            Metric::Mse => "mse",
            Metric::Mae => "mae",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Metric {
    type Err = FraudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auc" | "roc_auc" => Ok(Metric::Auc),
            "log_loss" | "logloss" | "binary_logloss" => Ok(Metric::LogLoss),
            "mse" => Ok(Metric::Mse),
            "mae" => Ok(Metric::Mae),
            other => Err(FraudError::ConfigError(format!("unknown metric '{}'", other))),
        }
    }
}

impl Metric {
    /// Natural optimisation direction of the metric
    pub fn direction(&self) -> OptimizeDirection {
        match self {
            Metric::Auc => OptimizeDirection::Maximize,
            Metric::LogLoss | Metric::Mse | Metric::Mae => OptimizeDirection::Minimize,
        }
    }

    /// Score predicted probabilities of the positive class against 0/1 labels
    pub fn score(&self, y_true: ArrayView1<f64>, y_prob: ArrayView1<f64>) -> Result<f64> {
        if y_true.len() != y_prob.len() {
            return Err(FraudError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_prob.len()),
            });
        }
        if y_true.is_empty() {
            return Err(FraudError::MetricError("cannot score an empty fold".to_string()));
        }
        if let Some(bad) = y_prob.iter().find(|p| !p.is_finite()) {
            return Err(FraudError::MetricError(format!("predictions must be finite, got {}", bad)));
        }

        let score = match self {
            Metric::Auc => roc_auc_score(y_true, y_prob)?,
            Metric::LogLoss => log_loss(y_true, y_prob),
            Metric::Mse => {
                let n = y_true.len() as f64;
                y_true.iter().zip(y_prob.iter()).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n
            }
            Metric::Mae => {
                let n = y_true.len() as f64;
                y_true.iter().zip(y_prob.iter()).map(|(t, p)| (t - p).abs()).sum::<f64>() / n
            }
        };
        if !score.is_finite() {
            return Err(FraudError::MetricError(format!("{} is not finite: {}", self, score)));
        }
        Ok(score)
    }
}

/// ROC AUC via the rank statistic; tied scores share their average rank.
pub fn roc_auc_score(y_true: ArrayView1<f64>, y_score: ArrayView1<f64>) -> Result<f64> {
    let n = y_true.len();
    let n_pos = y_true.iter().filter(|&&t| t > 0.5).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(FraudError::MetricError(
            "ROC AUC is undefined when only one class is present".to_string(),
        ));
    }
    if y_score.iter().any(|s| s.is_nan()) {
        return Err(FraudError::MetricError("scores contain NaN".to_string()));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    let mut pos_rank_sum = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && y_score[order[j + 1]] == y_score[order[i]] {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 averaged
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if y_true[idx] > 0.5 {
                pos_rank_sum += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Ok((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

fn log_loss(y_true: ArrayView1<f64>, y_prob: ArrayView1<f64>) -> f64 {
    const EPS: f64 = 1e-15;
    let n = y_true.len() as f64;
    -y_true
        .iter()
        .zip(y_prob.iter())
        .map(|(&t, &p)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            t * p.ln() + (1.0 - t) * (1.0 - p).ln()
        })
        .sum::<f64>()
        / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_perfect_auc() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let p = array![0.1, 0.2, 0.8, 0.9];
        let auc = roc_auc_score(y.view(), p.view()).unwrap();
        assert!((auc - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverted_auc() {
        let y = array![1.0, 1.0, 0.0, 0.0];
        let p = array![0.1, 0.2, 0.8, 0.9];
        let auc = roc_auc_score(y.view(), p.view()).unwrap();
        assert!(auc.abs() < 1e-12);
    }

    #[test]
    fn test_auc_with_ties() {
        // Pairs (pos, neg): (0.5, 0.5) tie counts 0.5, (0.5, 0.1) counts 1,
        // (0.9, 0.5) counts 1, (0.9, 0.1) counts 1 -> 3.5 / 4
        let y = array![0.0, 0.0, 1.0, 1.0];
        let p = array![0.5, 0.1, 0.5, 0.9];
        let auc = roc_auc_score(y.view(), p.view()).unwrap();
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class_errors() {
        let y = array![1.0, 1.0, 1.0];
        let p = array![0.2, 0.4, 0.6];
        assert!(matches!(
            roc_auc_score(y.view(), p.view()),
            Err(FraudError::MetricError(_))
        ));
    }

    #[test]
    fn test_log_loss_and_mse() {
        let y = array![0.0, 1.0];
        let p = array![0.5, 0.5];
        let ll = Metric::LogLoss.score(y.view(), p.view()).unwrap();
        assert!((ll - std::f64::consts::LN_2).abs() < 1e-12);
        let mse = Metric::Mse.score(y.view(), p.view()).unwrap();
        assert!((mse - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_predictions_rejected_by_every_metric() {
        let y = array![0.0, 1.0, 1.0];
        let p = array![0.2, f64::NAN, 0.7];
        for metric in [Metric::Auc, Metric::LogLoss, Metric::Mse, Metric::Mae] {
            assert!(
                matches!(metric.score(y.view(), p.view()), Err(FraudError::MetricError(_))),
                "{} accepted NaN",
                metric
            );
        }
        let p = array![0.2, f64::INFINITY, 0.7];
        assert!(Metric::Mae.score(y.view(), p.view()).is_err());
    }

    #[test]
    fn test_metric_directions() {
        assert_eq!(Metric::Auc.direction(), OptimizeDirection::Maximize);
        assert_eq!(Metric::LogLoss.direction(), OptimizeDirection::Minimize);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("AUC".parse::<Metric>().unwrap(), Metric::Auc);
        assert!("f1".parse::<Metric>().is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let y = array![0.0, 1.0];
        let p = array![0.5];
        assert!(Metric::Auc.score(y.view(), p.view()).is_err());
    }
}
