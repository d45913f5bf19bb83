//! Learned collaborators behind the forecasting tiers.
//!
//! - `features`: pinned feature schemas shared by training and prediction
//! - `hierarchical`: partial-pooling model (`DelayModel`)
//! - `classifier`: fast logistic classifier (`DelayClassifier`)

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ForecastError;

pub mod classifier;
pub mod features;
pub mod hierarchical;

pub use classifier::*;
pub use features::*;
pub use hierarchical::*;

/// Read a JSON model artifact. Missing or malformed files are unavailable collaborators.
pub(crate) fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ForecastError> {
    let file = File::open(path).map_err(|e| {
        ForecastError::CollaboratorUnavailable(format!("cannot open artifact '{}': {e}", path.display()))
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        ForecastError::CollaboratorUnavailable(format!("invalid artifact '{}': {e}", path.display()))
    })
}

/// Write a JSON model artifact, creating parent directories as needed.
pub(crate) fn write_artifact<T: Serialize>(path: &Path, value: &T) -> Result<(), ForecastError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            ForecastError::CollaboratorUnavailable(format!("cannot create '{}': {e}", parent.display()))
        })?;
    }
    let file = File::create(path).map_err(|e| {
        ForecastError::CollaboratorUnavailable(format!("cannot create artifact '{}': {e}", path.display()))
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| e.to_string())
        .and_then(|()| writer.flush().map_err(|e| e.to_string()))
        .map_err(|e| {
            ForecastError::CollaboratorUnavailable(format!("cannot write artifact '{}': {e}", path.display()))
        })
}
