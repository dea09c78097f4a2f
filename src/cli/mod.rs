//! fraudcv CLI Module
//!
//! Command-line interface for search, evaluation and full pipeline runs.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::optimizer::TrialParams;
use crate::pipeline::{Pipeline, PipelineReport, SearchSummary};
use crate::training::{CvOutcome, CvStatus};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString   { s.truecolor(230, 180, 80) }

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<16}", key)), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    println!("  {} {}...", accent("›"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "fraudcv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fraud-detection pipeline with pruned cross-validation and hyperparameter search")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: optional search, final cross-validation, submission
    Run {
        /// JSON configuration file; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip the hyperparameter search even if the config enables it
        #[arg(long)]
        no_search: bool,

        /// Override the number of search trials
        #[arg(long)]
        n_trials: Option<usize>,

        /// Override the search timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Run or resume the hyperparameter search only
    Search {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        n_trials: Option<usize>,

        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Cross-validate one configuration on the final-pass training rows
    Evaluate {
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// JSON file of parameters applied on top of the configured model
        #[arg(short, long)]
        params: Option<PathBuf>,
    },

    /// Write a configuration file with every default filled in
    InitConfig {
        #[arg(short, long, default_value = "fraudcv.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    Ok(match path {
        Some(p) => PipelineConfig::load(p)?,
        None => PipelineConfig::default(),
    })
}

fn apply_search_overrides(
    mut config: PipelineConfig,
    n_trials: Option<usize>,
    timeout: Option<f64>,
) -> PipelineConfig {
    if let Some(n) = n_trials {
        config = config.with_n_trials(n);
    }
    if timeout.is_some() {
        config = config.with_timeout(timeout);
    }
    config
}

// ─── Output ────────────────────────────────────────────────────────────────────

fn print_search(summary: &SearchSummary) {
    section("Search");
    println!("  {}", kv("trials", &summary.n_trials.to_string()));
    println!("  {}", kv("completed", &summary.n_complete.to_string()));
    println!("  {}", kv("pruned", &summary.n_pruned.to_string()));
    if summary.n_failed > 0 {
        println!("  {} {}", warn("!"), kv("failed", &summary.n_failed.to_string()));
    }
    match summary.best_value {
        Some(v) => println!("  {}", kv("best score", &format!("{:.6}", v).green().to_string())),
        None => println!("  {} {}", warn("!"), "no completed trial".yellow()),
    }
    if let Some(params) = &summary.best_params {
        let mut names: Vec<&String> = params.keys().collect();
        names.sort();
        for name in names {
            println!("    {}", kv(name, &params[name].to_string()));
        }
    }
}

fn print_evaluation(outcome: &CvOutcome) {
    section("Cross-validation");
    for (i, score) in outcome.fold_scores.iter().enumerate() {
        let train = outcome
            .train_scores
            .get(i)
            .map(|t| format!("  train {:.6}", t))
            .unwrap_or_default();
        println!("  {}{}", kv(&format!("fold {}", i), &format!("{:.6}", score)), dim(&train));
    }
    let status = match outcome.status {
        CvStatus::Completed => ok("completed"),
        CvStatus::Pruned { after_folds } => warn(&format!("pruned after {} folds", after_folds)),
    };
    println!("  {}", kv("status", &status.to_string()));
    println!(
        "  {}",
        kv("score", &format!("{:.6} ± {:.6}", outcome.score, outcome.std_score).green().bold().to_string())
    );
    if let Some(train) = outcome.mean_train_score() {
        println!("  {}", kv("train score", &format!("{:.6}", train)));
    }
}

fn print_report(report: &PipelineReport) {
    if let Some(search) = &report.search {
        print_search(search);
    }
    print_evaluation(&report.evaluation);
    println!();
    if let Some(path) = &report.submission_path {
        step_ok(&format!("submission written to {}", path.display().to_string().cyan()));
    }
    step_ok(&format!("finished in {:.1}s", report.elapsed_secs));
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(
    config_path: Option<&Path>,
    no_search: bool,
    n_trials: Option<usize>,
    timeout: Option<f64>,
) -> anyhow::Result<()> {
    let mut config = apply_search_overrides(load_config(config_path)?, n_trials, timeout);
    if no_search {
        config = config.with_search(false);
    }

    section("Run");
    step_run("Running pipeline");
    let pipeline = Pipeline::new(config)?;
    let report = pipeline.run()?;
    print_report(&report);
    Ok(())
}

pub fn cmd_search(
    config_path: Option<&Path>,
    n_trials: Option<usize>,
    timeout: Option<f64>,
) -> anyhow::Result<()> {
    let config = apply_search_overrides(load_config(config_path)?, n_trials, timeout).with_search(true);
    let pipeline = Pipeline::new(config)?;

    section("Search");
    let start = Instant::now();
    step_run("Loading training data");
    let train = pipeline.load_training()?;
    step_ok(&format!("{} rows × {} features", train.n_samples(), train.n_features()));

    step_run("Searching");
    let study = pipeline.search(&train)?;
    print_search(&SearchSummary::from(&study));
    println!();
    step_ok(&format!("finished in {:.1}s", start.elapsed().as_secs_f64()));
    Ok(())
}

pub fn cmd_evaluate(config_path: Option<&Path>, params_path: Option<&Path>) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(load_config(config_path)?.with_search(false))?;
    let params: Option<TrialParams> = match params_path {
        Some(p) => Some(serde_json::from_str(&std::fs::read_to_string(p)?)?),
        None => None,
    };

    section("Evaluate");
    let start = Instant::now();
    step_run("Loading data");
    let train = pipeline.load_training()?;
    let test = pipeline.load_test(&train)?;
    let eval_set = pipeline.final_set(&train)?;
    step_ok(&format!("{} rows × {} features", eval_set.n_samples(), eval_set.n_features()));

    step_run("Cross-validating");
    let outcome = pipeline.evaluate(&eval_set, test.as_ref(), params.as_ref())?;
    print_evaluation(&outcome);
    println!();
    step_ok(&format!("finished in {:.1}s", start.elapsed().as_secs_f64()));
    Ok(())
}

pub fn cmd_init_config(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", output.display());
    }
    PipelineConfig::default().save(output)?;
    step_ok(&format!("configuration written to {}", output.display().to_string().cyan()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["fraudcv", "run", "--config", "c.json", "--no-search", "--n-trials", "5"]).unwrap();
        match cli.command {
            Commands::Run { config, no_search, n_trials, timeout } => {
                assert_eq!(config, Some(PathBuf::from("c.json")));
                assert!(no_search);
                assert_eq!(n_trials, Some(5));
                assert_eq!(timeout, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraudcv.json");
        cmd_init_config(&path, false).unwrap();
        assert!(PipelineConfig::load(&path).is_ok());
        assert!(cmd_init_config(&path, false).is_err());
        assert!(cmd_init_config(&path, true).is_ok());
    }

    #[test]
    fn test_search_overrides() {
        let config = apply_search_overrides(PipelineConfig::default(), Some(3), Some(60.0));
        assert_eq!(config.search.n_trials, 3);
        assert_eq!(config.search.timeout_secs, Some(60.0));
    }
}
