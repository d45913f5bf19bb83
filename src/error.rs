//! Error types.
//!
//! Two layers:
//!
//! - [`ForecastError`]: the typed taxonomy raised by the forecasting and
//!   validation core. Callers match on it to decide between fallback and
//!   propagation.
//! - [`AppError`]: what the binary reports. It carries a process exit code and a
//!   human-readable message.

use thiserror::Error;

/// Failure taxonomy of the forecasting core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    /// Malformed posterior parameters, non-binary observation, bad curve.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// CDF query outside `[0, n]`.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Empty train/test partition or no rows for a query.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Missing artifact, unseen route history, failed live fetch.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// The conjugate baseline itself failed. Never recovered.
    #[error("baseline failure: {0}")]
    BaselineFailure(String),
}

impl ForecastError {
    /// Stable label used in diagnostics and server-side error payloads.
    pub fn label(&self) -> &'static str {
        match self {
            ForecastError::InvalidParameter(_) => "invalid-parameter",
            ForecastError::InvalidRange(_) => "invalid-range",
            ForecastError::InsufficientData(_) => "insufficient-data",
            ForecastError::CollaboratorUnavailable(_) => "collaborator-unavailable",
            ForecastError::BaselineFailure(_) => "baseline-failure",
        }
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ForecastError::InvalidParameter(_) | ForecastError::InvalidRange(_) => 2,
            ForecastError::InsufficientData(_) => 3,
            ForecastError::CollaboratorUnavailable(_) => 4,
            ForecastError::BaselineFailure(_) => 5,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<ForecastError> for AppError {
    fn from(err: ForecastError) -> Self {
        AppError::new(err.exit_code(), format!("[{}] {err}", err.label()))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
