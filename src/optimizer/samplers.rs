//! Sampling strategies for hyperparameter optimization

use super::config::OptimizeDirection;
use super::search_space::{ParameterType, ParameterValue, SearchSpace, TrialParams};
use rand::prelude::*;
use rand_distr::Normal;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Type of sampler to use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SamplerType {
    /// Random sampling
    #[serde(rename = "random")]
    Random,
    /// Tree-structured Parzen Estimator
    #[serde(rename = "tpe")]
    TPE,
}

impl std::str::FromStr for SamplerType {
    type Err = crate::error::FraudError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "random" => Ok(SamplerType::Random),
            "tpe" => Ok(SamplerType::TPE),
            other => Err(crate::error::FraudError::ConfigError(format!(
                "unknown sampler '{}'",
                other
            ))),
        }
    }
}

/// Trait for hyperparameter samplers.
///
/// `history` holds the parameters and values of finished trials. Pruned trials
/// carry the direction's worst value (an infinity).
pub trait Sampler: Send + Sync {
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams;
}

fn make_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: make_rng(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, search_space: &SearchSpace, _history: &[(TrialParams, f64)]) -> TrialParams {
        search_space.sample(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator sampler.
///
/// Completed trials are split into the best `gamma` share and the rest. Candidates
/// are drawn around good trials and the one maximising `l(x) / g(x)` wins, where both
/// densities are Parzen estimators over the normalized parameter positions.
#[derive(Debug)]
pub struct TPESampler {
    rng: Xoshiro256PlusPlus,
    direction: OptimizeDirection,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
}

impl TPESampler {
    pub fn new(seed: Option<u64>, direction: OptimizeDirection) -> Self {
        Self {
            rng: make_rng(seed),
            direction,
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
        }
    }

    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Quantile of trials treated as good
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.clamp(0.01, 0.99);
        self
    }

    pub fn with_n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    /// Split history into good and bad trials, best first; non-finite values are always bad
    fn split_history<'a>(&self, history: &'a [(TrialParams, f64)]) -> (Vec<&'a TrialParams>, Vec<&'a TrialParams>) {
        let mut sorted: Vec<&(TrialParams, f64)> = history.iter().filter(|(_, v)| !v.is_nan()).collect();
        match self.direction {
            OptimizeDirection::Minimize => sorted.sort_by(|a, b| a.1.total_cmp(&b.1)),
            OptimizeDirection::Maximize => sorted.sort_by(|a, b| b.1.total_cmp(&a.1)),
        }
        let n_finite = sorted.iter().filter(|(_, v)| v.is_finite()).count();
        let n_good = if n_finite == 0 {
            0
        } else {
            ((n_finite as f64 * self.gamma).ceil() as usize).clamp(1, n_finite)
        };
        let good = sorted.iter().take(n_good).map(|(p, _)| p).collect();
        let bad = sorted.iter().skip(n_good).map(|(p, _)| p).collect();
        (good, bad)
    }

    fn bandwidth(n: usize) -> f64 {
        (1.0 / (n as f64 + 1.0).sqrt()).clamp(0.05, 0.5)
    }

    /// Draw a candidate around a randomly chosen good trial
    fn perturb(&mut self, space: &SearchSpace, anchor: &TrialParams, bw: f64) -> TrialParams {
        let mut out = TrialParams::new();
        for param in space.parameters() {
            let anchored = anchor.get(&param.name);
            let value = match (&param.param_type, anchored) {
                (ParameterType::Float { .. } | ParameterType::Int { .. }, Some(v)) => {
                    match param.normalize(v) {
                        Some(u) => {
                            let noise = Normal::new(0.0, bw).map(|n| n.sample(&mut self.rng)).unwrap_or(0.0);
                            param.denormalize(u + noise).unwrap_or_else(|| param.sample(&mut self.rng))
                        }
                        None => param.sample(&mut self.rng),
                    }
                }
                (ParameterType::Categorical { .. } | ParameterType::Boolean, Some(v))
                    if self.rng.gen::<f64>() < 0.8 =>
                {
                    v.clone()
                }
                _ => param.sample(&mut self.rng),
            };
            out.insert(param.name.clone(), value);
        }
        out
    }

    fn log_density(space: &SearchSpace, candidate: &TrialParams, observed: &[&TrialParams], bw: f64) -> f64 {
        let n = observed.len() as f64;
        let mut total = 0.0;
        for param in space.parameters() {
            let Some(value) = candidate.get(&param.name) else { continue };
            let density = match &param.param_type {
                ParameterType::Float { .. } | ParameterType::Int { .. } => {
                    let Some(x) = param.normalize(value) else { continue };
                    // Uniform prior component keeps the density positive
                    let kernels: f64 = observed
                        .iter()
                        .filter_map(|o| o.get(&param.name).and_then(|v| param.normalize(v)))
                        .map(|mu| {
                            let z = (x - mu) / bw;
                            (-0.5 * z * z).exp() / (bw * (2.0 * std::f64::consts::PI).sqrt())
                        })
                        .sum();
                    (kernels + 1.0) / (n + 1.0)
                }
                ParameterType::Categorical { choices } => {
                    let hits = observed.iter().filter(|o| o.get(&param.name) == Some(value)).count() as f64;
                    (hits + 1.0) / (n + choices.len() as f64)
                }
                ParameterType::Boolean => {
                    let hits = observed.iter().filter(|o| o.get(&param.name) == Some(value)).count() as f64;
                    (hits + 1.0) / (n + 2.0)
                }
            };
            total += density.ln();
        }
        total
    }
}

impl Sampler for TPESampler {
    fn sample(&mut self, search_space: &SearchSpace, history: &[(TrialParams, f64)]) -> TrialParams {
        if history.len() < self.n_startup_trials.max(2) {
            return search_space.sample(&mut self.rng);
        }

        let (good, bad) = self.split_history(history);
        if good.is_empty() {
            return search_space.sample(&mut self.rng);
        }
        let bw_good = Self::bandwidth(good.len());
        let bw_bad = Self::bandwidth(bad.len());

        let mut best: Option<(f64, TrialParams)> = None;
        for _ in 0..self.n_candidates {
            let anchor_idx = self.rng.gen_range(0..good.len());
            let candidate = self.perturb(search_space, good[anchor_idx], bw_good);
            let score = Self::log_density(search_space, &candidate, &good, bw_good)
                - Self::log_density(search_space, &candidate, &bad, bw_bad);
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, candidate));
            }
        }

        match best {
            Some((_, params)) => params,
            None => search_space.sample(&mut self.rng),
        }
    }
}

/// Create a sampler from type
pub fn create_sampler(
    sampler_type: &SamplerType,
    seed: Option<u64>,
    direction: OptimizeDirection,
    n_startup_trials: usize,
) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::TPE => Box::new(TPESampler::new(seed, direction).with_n_startup(n_startup_trials)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn history_around(best_lr: f64, direction: OptimizeDirection) -> Vec<(TrialParams, f64)> {
        (0..30)
            .map(|i| {
                let lr = 0.001 + i as f64 * (0.099 / 29.0);
                let mut params = HashMap::new();
                params.insert("lr".to_string(), ParameterValue::Float(lr));
                let loss = (lr - best_lr).abs();
                let value = match direction {
                    OptimizeDirection::Minimize => loss,
                    OptimizeDirection::Maximize => 1.0 - loss,
                };
                (params, value)
            })
            .collect()
    }

    #[test]
    fn test_random_sampler() {
        let space = SearchSpace::new().float("lr", 0.001, 0.1).int("n", 10, 100);
        let mut sampler = RandomSampler::new(Some(42));
        let params = sampler.sample(&space, &[]);
        assert!(params.contains_key("lr"));
        assert!(params.contains_key("n"));
    }

    #[test]
    fn test_tpe_sampler_startup() {
        let space = SearchSpace::new().float("lr", 0.001, 0.1);
        let mut sampler = TPESampler::new(Some(42), OptimizeDirection::Minimize);
        for _ in 0..5 {
            let params = sampler.sample(&space, &[]);
            assert!(space.parameters()[0].contains(&params["lr"]));
        }
    }

    #[test]
    fn test_tpe_concentrates_near_good_region() {
        let space = SearchSpace::new().float("lr", 0.001, 0.1);
        for direction in [OptimizeDirection::Minimize, OptimizeDirection::Maximize] {
            let history = history_around(0.09, direction);
            let mut sampler = TPESampler::new(Some(1), direction);
            let near = (0..40)
                .filter(|_| {
                    let p = sampler.sample(&space, &history);
                    p["lr"].as_float().unwrap() > 0.05
                })
                .count();
            assert!(near > 30, "{:?}: only {} samples near the optimum", direction, near);
        }
    }

    #[test]
    fn test_pruned_trials_only_count_as_bad() {
        let mut history = history_around(0.09, OptimizeDirection::Maximize);
        for lr in [0.02, 0.03, 0.04] {
            let mut params = HashMap::new();
            params.insert("lr".to_string(), ParameterValue::Float(lr));
            history.push((params, OptimizeDirection::Maximize.worst_value()));
        }

        let sampler = TPESampler::new(Some(3), OptimizeDirection::Maximize).with_gamma(1.0);
        let (good, bad) = sampler.split_history(&history);
        assert_eq!(good.len(), 30);
        assert_eq!(bad.len(), 3);

        // With nothing but pruned trials there is no good region to sample around
        let (good, bad) = sampler.split_history(&history[30..]);
        assert!(good.is_empty());
        assert_eq!(bad.len(), 3);
    }

    #[test]
    fn test_tpe_handles_categorical() {
        let space = SearchSpace::new()
            .float("lr", 0.001, 0.1)
            .categorical("boosting_type", vec!["gbdt", "goss"]);
        let history: Vec<(TrialParams, f64)> = (0..20)
            .map(|i| {
                let mut params = HashMap::new();
                params.insert("lr".to_string(), ParameterValue::Float(0.05));
                let bt = if i % 2 == 0 { "gbdt" } else { "goss" };
                params.insert("boosting_type".to_string(), ParameterValue::String(bt.into()));
                (params, if i % 2 == 0 { 0.9 } else { 0.6 })
            })
            .collect();

        let mut sampler = TPESampler::new(Some(5), OptimizeDirection::Maximize);
        let params = sampler.sample(&space, &history);
        assert!(space.get("boosting_type").unwrap().contains(&params["boosting_type"]));
    }

    #[test]
    fn test_sampler_type_parse() {
        assert_eq!("TPE".parse::<SamplerType>().unwrap(), SamplerType::TPE);
        assert!("grid".parse::<SamplerType>().is_err());
    }
}
