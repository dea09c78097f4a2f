//! Search space definition for hyperparameters

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Type of parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterType {
    /// Continuous float parameter
    Float {
        low: f64,
        high: f64,
        log_scale: bool,
    },
    /// Integer parameter
    Int {
        low: i64,
        high: i64,
        log_scale: bool,
    },
    /// Categorical parameter
    Categorical {
        choices: Vec<String>,
    },
    /// Boolean parameter
    Boolean,
}

/// A single hyperparameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParameterType,
}

impl Parameter {
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float { low, high, log_scale: false },
        }
    }

    /// Create a log-scale float parameter
    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Float { low, high, log_scale: true },
        }
    }

    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high, log_scale: false },
        }
    }

    /// Create a log-scale integer parameter
    pub fn log_int(name: impl Into<String>, low: i64, high: i64) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Int { low, high, log_scale: true },
        }
    }

    pub fn categorical(name: impl Into<String>, choices: Vec<&str>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Categorical {
                choices: choices.into_iter().map(String::from).collect(),
            },
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type: ParameterType::Boolean,
        }
    }

    /// Sample a random value
    pub fn sample(&self, rng: &mut impl Rng) -> ParameterValue {
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParameterValue::Float(val.clamp(*low, *high))
            }
            ParameterType::Int { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = (*low as f64).ln();
                    let log_high = (*high as f64 + 1.0).ln();
                    ((rng.gen::<f64>() * (log_high - log_low) + log_low).exp().floor() as i64)
                        .clamp(*low, *high)
                } else {
                    rng.gen_range(*low..=*high)
                };
                ParameterValue::Int(val)
            }
            ParameterType::Categorical { choices } => {
                let idx = rng.gen_range(0..choices.len());
                ParameterValue::String(choices[idx].clone())
            }
            ParameterType::Boolean => ParameterValue::Bool(rng.gen()),
        }
    }

    /// Position of a value inside the range mapped to [0, 1], log ranges in log space.
    /// Categorical and boolean values have no position.
    pub fn normalize(&self, value: &ParameterValue) -> Option<f64> {
        let (low, high, log_scale) = match &self.param_type {
            ParameterType::Float { low, high, log_scale } => (*low, *high, *log_scale),
            ParameterType::Int { low, high, log_scale } => (*low as f64, *high as f64, *log_scale),
            _ => return None,
        };
        let v = value.as_float()?;
        let (v, low, high) = if log_scale {
            (v.ln(), low.ln(), high.ln())
        } else {
            (v, low, high)
        };
        if high > low {
            Some(((v - low) / (high - low)).clamp(0.0, 1.0))
        } else {
            Some(0.0)
        }
    }

    /// Inverse of [`Parameter::normalize`] for numeric parameters
    pub fn denormalize(&self, u: f64) -> Option<ParameterValue> {
        let u = u.clamp(0.0, 1.0);
        let scale = |low: f64, high: f64, log_scale: bool| {
            if log_scale {
                (low.ln() + u * (high.ln() - low.ln())).exp()
            } else {
                low + u * (high - low)
            }
        };
        match &self.param_type {
            ParameterType::Float { low, high, log_scale } => {
                Some(ParameterValue::Float(scale(*low, *high, *log_scale).clamp(*low, *high)))
            }
            ParameterType::Int { low, high, log_scale } => {
                let v = scale(*low as f64, *high as f64, *log_scale).round() as i64;
                Some(ParameterValue::Int(v.clamp(*low, *high)))
            }
            _ => None,
        }
    }

    /// Whether a value has the right type and lies inside the range
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match (&self.param_type, value) {
            (ParameterType::Float { low, high, .. }, v) => {
                v.as_float().map_or(false, |x| x >= *low && x <= *high)
            }
            (ParameterType::Int { low, high, .. }, ParameterValue::Int(x)) => x >= low && x <= high,
            (ParameterType::Categorical { choices }, ParameterValue::String(s)) => choices.contains(s),
            (ParameterType::Boolean, ParameterValue::Bool(_)) => true,
            _ => false,
        }
    }
}

/// Sampled parameter value; serialized as a bare JSON value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParameterValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            ParameterValue::Float(v) if v.is_finite() => Some(v.round() as i64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            ParameterValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{:.6}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::String(v) => f.write_str(v),
            ParameterValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Search space for hyperparameter optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<Parameter>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self { parameters: Vec::new() }
    }

    /// Ranges tuned for the GBDT fraud model
    pub fn lightgbm_default() -> Self {
        Self::new()
            .int("num_leaves", 10, 1500)
            .int("max_depth", 10, 1000)
            .int("subsample_for_bin", 1000, 5_000_000)
            .int("min_child_samples", 200, 100_000)
            .log_float("reg_alpha", 1e-11, 10.0)
            .log_float("colsample_bytree", 1e-4, 1.0)
            .log_float("learning_rate", 1e-5, 2.0)
            .int("n_estimators", 500, 2000)
    }

    /// Add a parameter; a parameter with the same name is replaced
    pub fn add(mut self, param: Parameter) -> Self {
        self.parameters.retain(|p| p.name != param.name);
        self.parameters.push(param);
        self
    }

    pub fn float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::float(name, low, high))
    }

    pub fn log_float(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add(Parameter::log_float(name, low, high))
    }

    pub fn int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::int(name, low, high))
    }

    pub fn log_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.add(Parameter::log_int(name, low, high))
    }

    pub fn categorical(self, name: impl Into<String>, choices: Vec<&str>) -> Self {
        self.add(Parameter::categorical(name, choices))
    }

    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.add(Parameter::boolean(name))
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Sample a random configuration
    pub fn sample(&self, rng: &mut impl Rng) -> TrialParams {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.sample(rng)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

/// Alias for sampled configuration
pub type TrialParams = HashMap<String, ParameterValue>;
