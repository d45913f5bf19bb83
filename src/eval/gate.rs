//! Acceptance gate and regression check.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::Value;

use crate::domain::{AcceptanceVerdict, ValidationConfig, ValidationFold};
use crate::error::{AppError, ForecastError};

/// Exit code used by the regression check for both regressions and bad input.
pub const REGRESSION_EXIT_CODE: u8 = 1;

/// Pass iff mean candidate Brier ≤ `max_mean_brier` and the candidate wins at
/// least `ceil(min_win_fraction × folds)` folds.
pub fn acceptance_verdict(
    folds: &[ValidationFold],
    config: &ValidationConfig,
) -> Result<AcceptanceVerdict, ForecastError> {
    if folds.is_empty() {
        return Err(ForecastError::InsufficientData(
            "no completed folds; acceptance verdict undefined".into(),
        ));
    }

    let n = folds.len();
    let wins = folds.iter().filter(|f| f.candidate_wins()).count();
    // Guard against 0.8 × n landing a hair above an integer.
    let required_wins = ((config.min_win_fraction * n as f64) - 1e-9).ceil().max(0.0) as usize;
    let mean_candidate_brier = folds.iter().map(|f| f.candidate.brier).sum::<f64>() / n as f64;

    let brier_ok = mean_candidate_brier <= config.max_mean_brier;
    let wins_ok = wins >= required_wins;
    Ok(AcceptanceVerdict {
        folds: n,
        wins,
        required_wins,
        mean_candidate_brier,
        brier_ok,
        wins_ok,
        pass: brier_ok && wins_ok,
    })
}

/// Outcome of comparing a validation run against a stored target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionCheck {
    pub actual: f64,
    pub target: f64,
}

impl RegressionCheck {
    pub fn regressed(&self) -> bool {
        self.actual > self.target
    }
}

/// Read the first fold's candidate Brier from `results_path` (JSON array of
/// fold records) and `brier_score_target` from `target_path`.
///
/// Every input problem maps to exit code 1.
pub fn check_regression(results_path: &Path, target_path: &Path) -> Result<RegressionCheck, AppError> {
    let results = read_json_value(results_path, "results")?;
    let target = read_json_value(target_path, "target")?;

    let first = results
        .as_array()
        .and_then(|a| a.first())
        .ok_or_else(|| gate_error(format!("results file '{}' is empty", results_path.display())))?;
    let actual = first
        .get("candidate_brier")
        .or_else(|| first.get("hier_brier"))
        .and_then(Value::as_f64)
        .ok_or_else(|| gate_error("'candidate_brier' not found in results"))?;
    let target = target
        .get("brier_score_target")
        .and_then(Value::as_f64)
        .ok_or_else(|| gate_error("'brier_score_target' not found in target file"))?;

    Ok(RegressionCheck { actual, target })
}

fn read_json_value(path: &Path, what: &str) -> Result<Value, AppError> {
    let file = File::open(path)
        .map_err(|e| gate_error(format!("{what} file not found at '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| gate_error(format!("invalid JSON in {what} file '{}': {e}", path.display())))
}

fn gate_error(message: impl Into<String>) -> AppError {
    AppError::new(REGRESSION_EXIT_CODE, message)
}
