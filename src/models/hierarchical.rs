//! Hierarchical (partial-pooling) late-departure model.
//!
//! Structure:
//!
//! ```text
//! logit P(late) = xᵀβ + u_route
//! ```
//!
//! - `β`: fixed effects over the pinned schema in [`HIER_FEATURES`], fitted by IRLS
//! - `u_route`: route random intercept, estimated by empirical-Bayes shrinkage
//!   of the route's observed late rate toward its fixed-effect prediction
//!
//! Persistence is split in two files: a small metadata descriptor and a
//! columnar trace. A descriptor whose trace is missing still loads, but the
//! model can no longer predict.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bayes::BetaPosterior;
use crate::domain::{FlightRecord, Observation};
use crate::error::ForecastError;
use crate::math::{fit_logistic, logit, sigmoid, IrlsOptions};
use crate::models::features::{fill_hier_row, ModelInput, WeatherFill, HIER_FEATURES, HIER_SCHEMA_VERSION};
use crate::models::{read_artifact, write_artifact};

/// Model family written to the descriptor.
pub const MODEL_FAMILY: &str = "bernoulli";

/// Pseudo-observations pulling each route toward the fixed-effect rate.
pub const DEFAULT_SHRINKAGE: f64 = 50.0;

/// Pseudo-count turning a seed probability into a Beta prior in `fast_update`.
pub const DEFAULT_PSEUDO_N: f64 = 10.0;

/// Convergence diagnostics reported after a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub iterations: usize,
    pub converged: bool,
    /// Largest coefficient change in the final IRLS step.
    pub last_step: f64,
    pub n_obs: usize,
    pub n_routes: usize,
}

/// Interface the orchestrator and the validator consume.
pub trait DelayModel: Send + Sync {
    /// Fit on a training window.
    fn fit(&mut self, records: &[FlightRecord]) -> Result<FitDiagnostics, ForecastError>;

    /// Late probabilities for a batch, in input order.
    fn predict(&self, inputs: &[ModelInput]) -> Result<Vec<f64>, ForecastError>;

    /// One conjugate update of a seed probability. Stateless with respect to the model.
    fn fast_update(&self, seed_p: f64, observation: Observation) -> Result<BetaPosterior, ForecastError>;

    fn save(&self, path: &Path) -> Result<(), ForecastError>;

    fn load(path: &Path) -> Result<Self, ForecastError>
    where
        Self: Sized;

    fn diagnostics(&self) -> Option<FitDiagnostics>;
}

/// Metadata descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_formula: String,
    pub model_family: String,
    pub fitted: bool,
    pub schema_version: u32,
    pub trace_path: PathBuf,
}

/// Columnar trace: parallel arrays of names and values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrace {
    pub schema_version: u32,
    pub coefficient_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub route_keys: Vec<String>,
    pub route_offsets: Vec<f64>,
    pub fill: WeatherFill,
    pub diagnostics: FitDiagnostics,
}

#[derive(Debug, Clone)]
struct Fitted {
    coefficients: Vec<f64>,
    route_offsets: HashMap<String, f64>,
    fill: WeatherFill,
    diagnostics: FitDiagnostics,
}

/// Concrete [`DelayModel`].
#[derive(Debug, Clone)]
pub struct PartialPoolingModel {
    pub irls: IrlsOptions,
    pub shrinkage: f64,
    pub pseudo_n: f64,
    fitted: bool,
    state: Option<Fitted>,
}

impl Default for PartialPoolingModel {
    fn default() -> Self {
        Self {
            irls: IrlsOptions::default(),
            shrinkage: DEFAULT_SHRINKAGE,
            pseudo_n: DEFAULT_PSEUDO_N,
            fitted: false,
            state: None,
        }
    }
}

impl PartialPoolingModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// `late ~ 1 + <fixed effects> + (1|route)`
    pub fn formula() -> String {
        format!("late ~ 1 + {} + (1|route)", HIER_FEATURES[1..].join(" + "))
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Whether a trace is present. A descriptor loaded without its trace is
    /// fitted but cannot predict.
    pub fn can_predict(&self) -> bool {
        self.state.is_some()
    }

    fn trace(&self) -> Option<ModelTrace> {
        let s = self.state.as_ref()?;
        let mut routes: Vec<(&String, &f64)> = s.route_offsets.iter().collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));
        Some(ModelTrace {
            schema_version: HIER_SCHEMA_VERSION,
            coefficient_names: HIER_FEATURES.iter().map(|s| s.to_string()).collect(),
            coefficients: s.coefficients.clone(),
            route_keys: routes.iter().map(|(k, _)| (*k).clone()).collect(),
            route_offsets: routes.iter().map(|(_, v)| **v).collect(),
            fill: s.fill,
            diagnostics: s.diagnostics,
        })
    }

    fn from_trace(trace: ModelTrace) -> Result<Fitted, ForecastError> {
        let expected: Vec<String> = HIER_FEATURES.iter().map(|s| s.to_string()).collect();
        if trace.schema_version != HIER_SCHEMA_VERSION || trace.coefficient_names != expected {
            return Err(ForecastError::CollaboratorUnavailable(format!(
                "trace schema v{} does not match v{HIER_SCHEMA_VERSION}",
                trace.schema_version
            )));
        }
        if trace.coefficients.len() != expected.len() || trace.route_keys.len() != trace.route_offsets.len() {
            return Err(ForecastError::CollaboratorUnavailable(
                "trace arrays have inconsistent lengths".into(),
            ));
        }
        Ok(Fitted {
            coefficients: trace.coefficients,
            route_offsets: trace.route_keys.into_iter().zip(trace.route_offsets).collect(),
            fill: trace.fill,
            diagnostics: trace.diagnostics,
        })
    }
}

impl DelayModel for PartialPoolingModel {
    fn fit(&mut self, records: &[FlightRecord]) -> Result<FitDiagnostics, ForecastError> {
        if records.is_empty() {
            return Err(ForecastError::InsufficientData(
                "cannot fit hierarchical model on an empty window".into(),
            ));
        }

        let fill = WeatherFill::from_records(records);
        let p = HIER_FEATURES.len();
        let n = records.len();
        let mut x = DMatrix::<f64>::zeros(n, p);
        let mut y = Vec::with_capacity(n);
        let mut row = vec![0.0; p];
        for (i, rec) in records.iter().enumerate() {
            fill_hier_row(&ModelInput::from(rec), &fill, &mut row);
            for (j, v) in row.iter().enumerate() {
                x[(i, j)] = *v;
            }
            y.push(if rec.late { 1.0 } else { 0.0 });
        }

        let fit = fit_logistic(&x, &y, &self.irls).ok_or_else(|| {
            ForecastError::CollaboratorUnavailable("fixed-effect IRLS step could not be solved".into())
        })?;
        if !fit.converged {
            warn!(
                iterations = fit.iterations,
                last_step = fit.last_step,
                "hierarchical fixed effects did not converge"
            );
        }

        // Per route: observed (n, k) and the sum of fixed-effect probabilities.
        let mut per_route: HashMap<String, (f64, f64, f64)> = HashMap::new();
        for (i, rec) in records.iter().enumerate() {
            let eta: f64 = (0..p).map(|j| x[(i, j)] * fit.coefficients[j]).sum();
            let e = per_route.entry(rec.route().to_string()).or_insert((0.0, 0.0, 0.0));
            e.0 += 1.0;
            e.1 += y[i];
            e.2 += sigmoid(eta);
        }

        let m = self.shrinkage.max(0.0);
        let route_offsets: HashMap<String, f64> = per_route
            .into_iter()
            .map(|(route, (n_r, k_r, sum_p))| {
                let pbar = sum_p / n_r;
                let shrunk = (k_r + m * pbar) / (n_r + m);
                (route, logit(shrunk) - logit(pbar))
            })
            .collect();

        let diagnostics = FitDiagnostics {
            iterations: fit.iterations,
            converged: fit.converged,
            last_step: fit.last_step,
            n_obs: n,
            n_routes: route_offsets.len(),
        };
        info!(
            n_obs = diagnostics.n_obs,
            n_routes = diagnostics.n_routes,
            iterations = diagnostics.iterations,
            converged = diagnostics.converged,
            "hierarchical model fitted"
        );

        self.state = Some(Fitted {
            coefficients: fit.coefficients,
            route_offsets,
            fill,
            diagnostics,
        });
        self.fitted = true;
        Ok(diagnostics)
    }

    fn predict(&self, inputs: &[ModelInput]) -> Result<Vec<f64>, ForecastError> {
        if !self.fitted {
            return Err(ForecastError::CollaboratorUnavailable(
                "hierarchical model must be fitted before predicting".into(),
            ));
        }
        let state = self.state.as_ref().ok_or_else(|| {
            ForecastError::CollaboratorUnavailable("no trace loaded; prediction disabled".into())
        })?;

        let mut row = vec![0.0; HIER_FEATURES.len()];
        Ok(inputs
            .iter()
            .map(|input| {
                fill_hier_row(input, &state.fill, &mut row);
                let fixed: f64 = row.iter().zip(&state.coefficients).map(|(a, b)| a * b).sum();
                let offset = state
                    .route_offsets
                    .get(&input.route.to_string())
                    .copied()
                    .unwrap_or(0.0);
                sigmoid(fixed + offset)
            })
            .collect())
    }

    fn fast_update(&self, seed_p: f64, observation: Observation) -> Result<BetaPosterior, ForecastError> {
        if !seed_p.is_finite() {
            return Err(ForecastError::InvalidParameter(format!(
                "seed probability must be finite, got {seed_p}"
            )));
        }
        let seed = seed_p.clamp(0.0, 1.0);
        let mut post = BetaPosterior::new(seed * self.pseudo_n + 0.5, (1.0 - seed) * self.pseudo_n + 0.5)?;
        post.update(observation);
        Ok(post)
    }

    fn save(&self, path: &Path) -> Result<(), ForecastError> {
        let trace = self.trace().ok_or_else(|| {
            ForecastError::InvalidParameter("cannot save an unfitted model".into())
        })?;

        let trace_path = path.with_extension("trace.json");
        let trace_name = trace_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| trace_path.clone());

        write_artifact(&trace_path, &trace)?;
        let descriptor = ModelDescriptor {
            model_formula: Self::formula(),
            model_family: MODEL_FAMILY.to_string(),
            fitted: self.fitted,
            schema_version: HIER_SCHEMA_VERSION,
            trace_path: trace_name,
        };
        write_artifact(path, &descriptor)?;
        debug!(path = %path.display(), trace = %trace_path.display(), "hierarchical model saved");
        Ok(())
    }

    fn load(path: &Path) -> Result<Self, ForecastError> {
        let descriptor: ModelDescriptor = read_artifact(path)?;
        if descriptor.schema_version != HIER_SCHEMA_VERSION {
            return Err(ForecastError::CollaboratorUnavailable(format!(
                "model schema v{} does not match v{HIER_SCHEMA_VERSION}",
                descriptor.schema_version
            )));
        }

        // Relative trace paths are resolved next to the descriptor.
        let trace_path = if descriptor.trace_path.is_absolute() {
            descriptor.trace_path.clone()
        } else {
            path.parent()
                .unwrap_or_else(|| Path::new("."))
                .join(&descriptor.trace_path)
        };

        let state = if trace_path.exists() {
            Some(Self::from_trace(read_artifact(&trace_path)?)?)
        } else {
            warn!(trace = %trace_path.display(), "model trace missing; prediction disabled");
            None
        };

        Ok(Self {
            fitted: descriptor.fitted,
            state,
            ..Self::default()
        })
    }

    fn diagnostics(&self) -> Option<FitDiagnostics> {
        self.state.as_ref().map(|s| s.diagnostics)
    }
}
