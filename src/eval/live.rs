//! Rolling Brier check over resolved live forecasts.

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{LiveCheckConfig, LiveRecord};
use crate::eval::brier_score;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveCheck {
    /// Resolved forecasts inside the window.
    pub observations: usize,
    /// `None` when there were too few observations to judge.
    pub brier: Option<f64>,
    pub config: LiveCheckConfig,
}

impl LiveCheck {
    pub fn degraded(&self) -> bool {
        self.brier.is_some_and(|b| b > self.config.max_brier)
    }
}

/// Brier score of the resolved records from the last `lookback_days` before `now`.
pub fn evaluate_live(records: &[LiveRecord], now: DateTime<Utc>, config: LiveCheckConfig) -> LiveCheck {
    let cutoff = now - TimeDelta::days(config.lookback_days);
    let (pred, labels): (Vec<f64>, Vec<bool>) = records
        .iter()
        .filter(|r| r.recorded_at >= cutoff)
        .filter_map(|r| r.late.map(|late| (r.p_pred, late)))
        .unzip();

    let observations = pred.len();
    let brier = (observations >= config.min_observations).then(|| brier_score(&pred, &labels));
    LiveCheck {
        observations,
        brier,
        config,
    }
}
