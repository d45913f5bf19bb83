//! Fast discriminative classifier.
//!
//! A ridge-stabilized logistic regression over the fixed classifier row
//! (hour buckets, carrier one-hot, congestion flags, route volume). Cheap to
//! evaluate, so it stands in when the hierarchical model cannot answer.

use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::FlightRecord;
use crate::error::ForecastError;
use crate::math::{fit_logistic, sigmoid, IrlsOptions};
use crate::models::features::{fill_classifier_row, ClassifierSchema, ModelInput, CLASSIFIER_SCHEMA_VERSION};
use crate::models::{read_artifact, write_artifact};

/// Ridge penalty used when training; one-hot columns can be constant in a window.
pub const CLASSIFIER_RIDGE: f64 = 1.0;

/// Something that maps a flight to a late probability.
pub trait DelayClassifier: Send + Sync {
    fn predict_proba(&self, input: &ModelInput) -> Result<f64, ForecastError>;
}

/// Persisted classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticClassifier {
    pub schema: ClassifierSchema,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub n_train: usize,
    pub converged: bool,
}

impl LogisticClassifier {
    pub fn train(records: &[FlightRecord]) -> Result<Self, ForecastError> {
        if records.is_empty() {
            return Err(ForecastError::InsufficientData(
                "cannot train classifier on an empty window".into(),
            ));
        }

        let schema = ClassifierSchema::from_records(records);
        let p = schema.width();
        let mut x = DMatrix::<f64>::zeros(records.len(), p);
        let mut row = vec![0.0; p];
        for (i, rec) in records.iter().enumerate() {
            fill_classifier_row(&schema, &ModelInput::from(rec), &mut row);
            for (j, v) in row.iter().enumerate() {
                x[(i, j)] = *v;
            }
        }
        let y: Vec<f64> = records.iter().map(|r| if r.late { 1.0 } else { 0.0 }).collect();

        let opts = IrlsOptions {
            ridge: CLASSIFIER_RIDGE,
            ..IrlsOptions::default()
        };
        let fit = fit_logistic(&x, &y, &opts).ok_or_else(|| {
            ForecastError::CollaboratorUnavailable("classifier IRLS step could not be solved".into())
        })?;
        if !fit.converged {
            warn!(iterations = fit.iterations, "classifier training did not converge");
        }
        info!(n_train = records.len(), features = p, "fast classifier trained");

        Ok(Self {
            feature_names: schema.column_names(),
            schema,
            coefficients: fit.coefficients,
            n_train: records.len(),
            converged: fit.converged,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ForecastError> {
        write_artifact(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, ForecastError> {
        let clf: Self = read_artifact(path)?;
        if clf.schema.version != CLASSIFIER_SCHEMA_VERSION || clf.coefficients.len() != clf.schema.width() {
            return Err(ForecastError::CollaboratorUnavailable(format!(
                "classifier artifact '{}' does not match schema v{CLASSIFIER_SCHEMA_VERSION}",
                path.display()
            )));
        }
        Ok(clf)
    }
}

impl DelayClassifier for LogisticClassifier {
    fn predict_proba(&self, input: &ModelInput) -> Result<f64, ForecastError> {
        let mut row = vec![0.0; self.schema.width()];
        fill_classifier_row(&self.schema, input, &mut row);
        let eta: f64 = row.iter().zip(&self.coefficients).map(|(a, b)| a * b).sum();
        let p = sigmoid(eta);
        if p.is_finite() {
            Ok(p)
        } else {
            Err(ForecastError::CollaboratorUnavailable("classifier produced a non-finite score".into()))
        }
    }
}
