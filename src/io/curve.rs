//! Read/write the delay-curve JSON and the scoring-table override.

use std::fs::{self, File};
use std::path::Path;

use tracing::{debug, warn};

use crate::bayes::{DelayCurveFile, DelayDistributionModel, ScoringTable};
use crate::error::AppError;

pub fn write_delay_curve(path: &Path, curve: &DelayCurveFile) -> Result<(), AppError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::new(2, format!("Failed to create directory '{}': {e}", dir.display())))?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create delay curve '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, curve)
        .map_err(|e| AppError::new(2, format!("Failed to write delay curve JSON: {e}")))
}

pub fn read_delay_curve(path: &Path) -> Result<DelayCurveFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(4, format!("Failed to open delay curve '{}': {e}", path.display())))?;
    let curve: DelayCurveFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid delay curve JSON: {e}")))?;
    curve.parameters()?;
    Ok(curve)
}

/// The delay model to forecast with: the persisted curve when it loads and
/// validates, the built-in default otherwise.
pub fn load_delay_model(path: &Path) -> DelayDistributionModel {
    let loaded = read_delay_curve(path).and_then(|c| Ok(DelayDistributionModel::new(c.parameters()?)?));
    match loaded {
        Ok(model) => {
            debug!(path = %path.display(), "delay curve loaded");
            model
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "using default delay curve");
            DelayDistributionModel::default()
        }
    }
}

/// Scoring table from an optional JSON override; absent fields keep their defaults.
pub fn read_scoring_table(path: Option<&Path>) -> Result<ScoringTable, AppError> {
    let Some(path) = path else {
        return Ok(ScoringTable::default());
    };
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open scoring table '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid scoring table JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn curve_round_trip_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("delay_curve.json");
        let curve = DelayCurveFile {
            mean_ontime_delay: 2.0,
            mean_late_delay: 48.0,
            threshold_prob: 0.3,
            data_years: "2019-2023".into(),
            n_flights: 1234,
            ontime_pct: 79.0,
            late_pct: 21.0,
        };
        write_delay_curve(&path, &curve).unwrap();
        assert_eq!(read_delay_curve(&path).unwrap(), curve);
        assert_eq!(load_delay_model(&path).parameters().mean_late_delay, 48.0);

        let missing = dir.path().join("nope.json");
        assert_eq!(load_delay_model(&missing), DelayDistributionModel::default());
    }

    #[test]
    fn invalid_curve_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let bad = DelayCurveFile {
            threshold_prob: 1.5,
            ..DelayCurveFile::default()
        };
        write_delay_curve(&path, &bad).unwrap();
        assert_eq!(read_delay_curve(&path).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn partial_scoring_override_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scoring.json");
        let mut f = File::create(&path).unwrap();
        writeln!(f, r#"{{"base_rate": 0.2}}"#).unwrap();

        let table = read_scoring_table(Some(&path)).unwrap();
        assert_eq!(table.base_rate, 0.2);
        assert_eq!(table.max_probability, ScoringTable::default().max_probability);
        assert_eq!(read_scoring_table(None).unwrap(), ScoringTable::default());
    }
}
