//! Live performance log: one JSON [`LiveRecord`] per line.
//!
//! `forecast --record` appends pending records; `record-outcome` resolves the
//! newest pending record for a flight; `validate-live` reads them back.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;

use crate::domain::LiveRecord;
use crate::error::AppError;
use crate::eval::REGRESSION_EXIT_CODE;

fn ensure_parent(path: &Path) -> Result<(), AppError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::new(2, format!("Failed to create directory '{}': {e}", dir.display())))?;
    }
    Ok(())
}

fn write_line(out: &mut impl Write, record: &LiveRecord) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    writeln!(out)
}

pub fn append_live_record(path: &Path, record: &LiveRecord) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open live log '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    write_line(&mut out, record)
        .and_then(|_| out.flush())
        .map_err(|e| AppError::new(2, format!("Failed to append to live log '{}': {e}", path.display())))
}

/// All records in the log; `None` when the log does not exist yet.
///
/// Blank lines are skipped. A malformed line fails the whole read with the
/// regression exit code.
pub fn read_live_log(path: &Path) -> Result<Option<Vec<LiveRecord>>, AppError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::new(
                REGRESSION_EXIT_CODE,
                format!("Failed to open live log '{}': {e}", path.display()),
            ));
        }
    };

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| {
            AppError::new(REGRESSION_EXIT_CODE, format!("Failed to read live log '{}': {e}", path.display()))
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            AppError::new(
                REGRESSION_EXIT_CODE,
                format!("invalid record on line {} of '{}': {e}", idx + 1, path.display()),
            )
        })?;
        records.push(record);
    }
    Ok(Some(records))
}

/// Set the outcome of the newest pending record for `flight_id` and rewrite the log.
pub fn record_outcome(path: &Path, flight_id: &str, late: bool) -> Result<LiveRecord, AppError> {
    let mut records = read_live_log(path)?
        .ok_or_else(|| AppError::new(2, format!("live log '{}' does not exist", path.display())))?;
    let idx = records
        .iter()
        .rposition(|r| r.flight_id == flight_id && r.late.is_none())
        .ok_or_else(|| AppError::new(2, format!("no pending forecast for {flight_id}")))?;
    records[idx].late = Some(late);

    let tmp = path.with_extension("jsonl.tmp");
    let file = File::create(&tmp)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", tmp.display())))?;
    let mut out = BufWriter::new(file);
    records
        .iter()
        .try_for_each(|r| write_line(&mut out, r))
        .and_then(|_| out.flush())
        .map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", tmp.display())))?;
    drop(out);
    fs::rename(&tmp, path)
        .map_err(|e| AppError::new(2, format!("Failed to replace live log '{}': {e}", path.display())))?;

    Ok(records.swap_remove(idx))
}
