//! Export validation folds and flight histories.
//!
//! Fold JSON is what the regression gate reads back: an array of flat
//! [`FoldRecord`]s, first fold first.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{FlightRecord, FoldRecord, ForecastResult, ValidationFold};
use crate::error::AppError;

fn create(path: &Path, what: &str) -> Result<BufWriter<File>, AppError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::new(2, format!("Failed to create directory '{}': {e}", dir.display())))?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

pub fn fold_records(folds: &[ValidationFold]) -> Vec<FoldRecord> {
    folds.iter().map(ValidationFold::to_record).collect()
}

/// Write folds as a pretty JSON array.
pub fn write_folds_json(path: &Path, folds: &[ValidationFold]) -> Result<(), AppError> {
    let mut out = create(path, "results JSON")?;
    serde_json::to_writer_pretty(&mut out, &fold_records(folds))
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))?;
    writeln!(out).and_then(|_| out.flush())
        .map_err(|e| AppError::new(2, format!("Failed to write results JSON: {e}")))
}

/// Write folds as CSV, one row per fold.
pub fn write_folds_csv(path: &Path, folds: &[ValidationFold]) -> Result<(), AppError> {
    let out = create(path, "results CSV")?;
    let mut writer = csv::Writer::from_writer(out);
    for record in fold_records(folds) {
        writer
            .serialize(record)
            .map_err(|e| AppError::new(2, format!("Failed to write results CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write results CSV: {e}")))
}

/// Write flights in the canonical ingest schema.
pub fn write_flights_csv(path: &Path, records: &[FlightRecord]) -> Result<(), AppError> {
    let out = create(path, "flights CSV")?;
    let mut writer = csv::Writer::from_writer(out);
    for record in records {
        writer
            .serialize(record)
            .map_err(|e| AppError::new(2, format!("Failed to write flights CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write flights CSV: {e}")))
}

/// Forecast as pretty JSON on any writer (stdout for `forecast --json`).
pub fn write_forecast_json<W: Write>(mut out: W, result: &ForecastResult) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut out, result)
        .map_err(|e| AppError::new(2, format!("Failed to write forecast JSON: {e}")))?;
    writeln!(out).map_err(|e| AppError::new(2, format!("Failed to write forecast JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelMetrics;
    use crate::io::read_flights;
    use chrono::NaiveDate;

    fn fold(test_year: i32) -> ValidationFold {
        ValidationFold {
            train_start: test_year - 4,
            train_end: test_year - 1,
            test_year,
            train_size: 100,
            test_size: 20,
            baseline: ModelMetrics::FAILED,
            candidate: ModelMetrics {
                brier: 0.1,
                log_loss: 0.3,
                auc: 0.7,
                ece: 0.02,
                threshold_brier: None,
            },
            baseline_seconds: 0.01,
            candidate_seconds: 0.2,
            candidate_degraded: false,
        }
    }

    #[test]
    fn fold_json_is_readable_by_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/results.json");
        write_folds_json(&path, &[fold(2021), fold(2022)]).unwrap();

        let back: Vec<FoldRecord> = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].test_year, 2021);
        assert_eq!(back[0].candidate_brier, 0.1);
        assert!(back[0].candidate_wins);
    }

    #[test]
    fn flights_csv_feeds_back_into_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flights.csv");
        let rec = FlightRecord {
            flight_date: NaiveDate::from_ymd_opt(2022, 7, 4).unwrap(),
            carrier: "B6".into(),
            flight_number: Some("615".into()),
            origin: "JFK".into(),
            dest: "BOS".into(),
            dep_hour: Some(18),
            dep_delay_minutes: Some(33.0),
            late: true,
            wx_temp_c: Some(27.5),
            wx_wind_kt: None,
            wx_precip_mm: None,
        };
        write_flights_csv(&path, std::slice::from_ref(&rec)).unwrap();

        let back = read_flights(File::open(&path).unwrap()).unwrap();
        assert!(back.row_errors.is_empty());
        assert_eq!(back.records, vec![rec]);
    }
}
