//! Historical counts → Beta prior.
//!
//! The estimator never fails: an unavailable history source or an unseen route
//! both resolve to the Jeffreys prior `Beta(0.5, 0.5)` with `n = 0`.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::{FlightRecord, PriorEstimate, RouteKey};
use crate::error::ForecastError;

/// Source of per-route `(n, k_late)` counts.
pub trait RouteHistory: Send + Sync {
    /// Total and late flight counts for `route`. Unseen routes return `(0, 0)`.
    fn route_counts(&self, route: &RouteKey) -> Result<(u64, u64), ForecastError>;
}

/// In-memory route count index, typically built from one training window.
#[derive(Debug, Clone, Default)]
pub struct RouteCounts {
    counts: HashMap<RouteKey, (u64, u64)>,
}

impl RouteCounts {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FlightRecord>) -> Self {
        let mut counts: HashMap<RouteKey, (u64, u64)> = HashMap::new();
        for rec in records {
            let entry = counts.entry(rec.route()).or_insert((0, 0));
            entry.0 += 1;
            if rec.late {
                entry.1 += 1;
            }
        }
        Self { counts }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl RouteHistory for RouteCounts {
    fn route_counts(&self, route: &RouteKey) -> Result<(u64, u64), ForecastError> {
        Ok(self.counts.get(route).copied().unwrap_or((0, 0)))
    }
}

/// Jeffreys prior + observed route counts.
#[derive(Clone, Copy)]
pub struct PriorEstimator<'a> {
    history: Option<&'a dyn RouteHistory>,
}

impl<'a> PriorEstimator<'a> {
    pub fn new(history: &'a dyn RouteHistory) -> Self {
        Self {
            history: Some(history),
        }
    }

    /// Estimator with no history source; always yields Jeffreys.
    pub fn without_history() -> Self {
        Self { history: None }
    }

    pub fn estimate(&self, route: &RouteKey) -> PriorEstimate {
        let Some(history) = self.history else {
            debug!(%route, "no route history configured; using Jeffreys prior");
            return PriorEstimate::JEFFREYS;
        };

        match history.route_counts(route) {
            Ok((0, _)) => {
                debug!(%route, "unseen route; using Jeffreys prior");
                PriorEstimate::JEFFREYS
            }
            Ok((n, k)) => PriorEstimate::from_counts(n, k),
            Err(err) => {
                warn!(%route, error = %err, "route history unavailable; using Jeffreys prior");
                PriorEstimate::JEFFREYS
            }
        }
    }
}
