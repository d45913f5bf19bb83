//! Single-route backtest of the conjugate baseline.
//!
//! The prior is built only from years strictly before the test year, then the
//! year's flights are replayed in date order: predict, score, update.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bayes::{BetaPosterior, PriorEstimator, RouteCounts};
use crate::data::HistoricalStore;
use crate::domain::RouteKey;
use crate::error::ForecastError;
use crate::eval::metrics::{brier_score, reliability_curve, ReliabilityBucket};

const RELIABILITY_BINS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub route: RouteKey,
    pub year: i32,
    pub n: usize,
    pub actual_rate: f64,
    pub mean_pred: f64,
    pub brier: f64,
    /// `mean_pred − actual_rate`; positive means the forecast ran pessimistic.
    pub bias: f64,
    pub buckets: Vec<ReliabilityBucket>,
}

pub fn run_backtest(store: &HistoricalStore, route: &RouteKey, year: i32) -> Result<BacktestReport, ForecastError> {
    let flights = store.route_year(route, year);
    if flights.is_empty() {
        return Err(ForecastError::InsufficientData(format!("no flights for {route} in {year}")));
    }

    let counts = RouteCounts::from_records(store.window(i32::MIN, year.saturating_sub(1)));
    let prior = PriorEstimator::new(&counts).estimate(route);
    let mut post = BetaPosterior::from_prior(&prior).map_err(|e| ForecastError::BaselineFailure(e.to_string()))?;

    let mut preds = Vec::with_capacity(flights.len());
    let mut labels = Vec::with_capacity(flights.len());
    for flight in &flights {
        preds.push(post.predictive_p_late());
        labels.push(flight.late);
        post.update(flight.observation());
    }

    let n = preds.len();
    let mean_pred = preds.iter().sum::<f64>() / n as f64;
    let actual_rate = labels.iter().filter(|&&y| y).count() as f64 / n as f64;
    let report = BacktestReport {
        route: route.clone(),
        year,
        n,
        actual_rate,
        mean_pred,
        brier: brier_score(&preds, &labels),
        bias: mean_pred - actual_rate,
        buckets: reliability_curve(&preds, &labels, RELIABILITY_BINS),
    };
    info!(%route, year, n, brier = report.brier, "backtest complete");
    Ok(report)
}
