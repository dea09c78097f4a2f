//! Fold splitters for cross-validation

use crate::error::{FraudError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Stratified K-Fold (maintains class distribution)
    StratifiedKFold { n_splits: usize, shuffle: bool },
    /// Group K-Fold (a group never spans two folds)
    GroupKFold { n_splits: usize },
}

impl CVStrategy {
    /// Number of folds this strategy produces
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. }
            | CVStrategy::StratifiedKFold { n_splits, .. }
            | CVStrategy::GroupKFold { n_splits } => *n_splits,
        }
    }

    /// Whether the strategy needs a group column
    pub fn needs_groups(&self) -> bool {
        matches!(self, CVStrategy::GroupKFold { .. })
    }
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::StratifiedKFold { n_splits: 6, shuffle: true }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Set an optional random state
    pub fn with_optional_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn strategy(&self) -> &CVStrategy {
        &self.strategy
    }

    /// Generate train/test splits
    pub fn split(
        &self,
        n_samples: usize,
        y: Option<&Array1<f64>>,
        groups: Option<&Array1<i64>>,
    ) -> Result<Vec<CVSplit>> {
        let n_splits = self.strategy.n_splits();
        if n_splits < 2 {
            return Err(FraudError::ValidationError(
                "n_splits must be at least 2".to_string(),
            ));
        }

        match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                self.k_fold_split(n_samples, *n_splits, *shuffle)
            }
            CVStrategy::StratifiedKFold { n_splits, shuffle } => {
                let y = y.ok_or_else(|| {
                    FraudError::ValidationError("StratifiedKFold requires target array".to_string())
                })?;
                check_len("y", y.len(), n_samples)?;
                self.stratified_k_fold_split(y, *n_splits, *shuffle)
            }
            CVStrategy::GroupKFold { n_splits } => {
                let groups = groups.ok_or_else(|| {
                    FraudError::ValidationError("GroupKFold requires groups array".to_string())
                })?;
                check_len("groups", groups.len(), n_samples)?;
                self.group_k_fold_split(groups, *n_splits)
            }
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        if n_samples < n_splits {
            return Err(FraudError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut fold_of = vec![0usize; n_samples];
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            for &idx in &indices[current..current + fold_size] {
                fold_of[idx] = fold_idx;
            }
            current += fold_size;
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        for &idx in &indices {
            folds[fold_of[idx]].push(idx);
        }
        Ok(folds_to_splits(folds))
    }

    fn stratified_k_fold_split(
        &self,
        y: &Array1<f64>,
        n_splits: usize,
        shuffle: bool,
    ) -> Result<Vec<CVSplit>> {
        // BTreeMap keeps class order stable so a seed reproduces the same folds.
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        let largest = class_indices.values().map(Vec::len).max().unwrap_or(0);
        if largest < n_splits {
            return Err(FraudError::ValidationError(format!(
                "every class has fewer members than n_splits ({})",
                n_splits
            )));
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Continue the round-robin across classes so fold sizes stay balanced.
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut cursor = 0usize;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[cursor % n_splits].push(idx);
                cursor += 1;
            }
        }

        Ok(folds_to_splits(folds))
    }

    fn group_k_fold_split(&self, groups: &Array1<i64>, n_splits: usize) -> Result<Vec<CVSplit>> {
        let mut group_sizes: HashMap<i64, usize> = HashMap::new();
        for &g in groups.iter() {
            *group_sizes.entry(g).or_insert(0) += 1;
        }

        if group_sizes.len() < n_splits {
            return Err(FraudError::ValidationError(format!(
                "Number of groups ({}) must be >= n_splits ({})",
                group_sizes.len(),
                n_splits
            )));
        }

        // Largest groups first, each into the currently lightest fold.
        let mut ordered: Vec<(i64, usize)> = group_sizes.into_iter().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut fold_weights = vec![0usize; n_splits];
        let mut group_to_fold: HashMap<i64, usize> = HashMap::with_capacity(ordered.len());
        for (group, size) in ordered {
            let lightest = fold_weights
                .iter()
                .enumerate()
                .min_by_key(|(i, w)| (**w, *i))
                .map(|(i, _)| i)
                .unwrap_or(0);
            fold_weights[lightest] += size;
            group_to_fold.insert(group, lightest);
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        for (idx, g) in groups.iter().enumerate() {
            folds[group_to_fold[g]].push(idx);
        }
        Ok(folds_to_splits(folds))
    }
}

fn check_len(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(FraudError::ShapeError {
            expected: format!("{} length = {}", name, expected),
            actual: format!("{} length = {}", name, actual),
        });
    }
    Ok(())
}

fn folds_to_splits(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
    (0..folds.len())
        .map(|fold_idx| {
            let mut test_indices = folds[fold_idx].clone();
            test_indices.sort_unstable();
            let mut train_indices: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold_idx)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            train_indices.sort_unstable();
            CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            }
        })
        .collect()
}
