//! Delay-distribution model.
//!
//! Turns a single "probability of departing ≥15 min late" into:
//!
//! - an expected delay in minutes (two-regime piecewise-linear curve)
//! - probabilities of exceeding 30/45/60 minutes
//!
//! Curve parameters are computed offline from historical delay minutes
//! ([`build_delay_curve`]) and loaded once per process.

use std::f64::consts::LN_2;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::domain::{FlightRecord, ThresholdProbabilities, LATE_THRESHOLD_MINUTES};
use crate::error::ForecastError;

/// Delays outside this window are treated as data errors when building a curve.
pub const DELAY_FILTER_MINUTES: (f64, f64) = (-60.0, 300.0);

const CURVE_BINS: usize = 20;
const THRESHOLD_RISE_MINUTES: f64 = 5.0;
const THRESHOLD_BOUNDS: (f64, f64) = (0.1, 0.8);

/// Fixed decay ratios used while the expected delay is under 15 minutes.
const LOW_DELAY_RATIOS: [f64; 3] = [0.3, 0.1, 0.05];
/// Each threshold probability is at most this share of the previous one.
const MAX_STEP_RATIO: f64 = 0.8;
const LAMBDA_EPS: f64 = 1e-6;
/// Upper bound on the delay added to a scheduled departure (one week).
const MAX_SHIFT_MINUTES: f64 = 7.0 * 24.0 * 60.0;

/// Immutable curve parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayCurveParameters {
    pub mean_ontime_delay: f64,
    pub mean_late_delay: f64,
    pub threshold_prob: f64,
}

impl DelayCurveParameters {
    pub fn new(mean_ontime_delay: f64, mean_late_delay: f64, threshold_prob: f64) -> Result<Self, ForecastError> {
        let params = Self {
            mean_ontime_delay,
            mean_late_delay,
            threshold_prob,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        if !(self.mean_ontime_delay.is_finite() && self.mean_late_delay.is_finite()) {
            return Err(ForecastError::InvalidParameter(
                "delay curve means must be finite".into(),
            ));
        }
        if self.mean_late_delay < self.mean_ontime_delay {
            return Err(ForecastError::InvalidParameter(format!(
                "mean_late_delay ({}) must be >= mean_ontime_delay ({})",
                self.mean_late_delay, self.mean_ontime_delay
            )));
        }
        if !(0.0..1.0).contains(&self.threshold_prob) {
            return Err(ForecastError::InvalidParameter(format!(
                "threshold_prob must be in [0, 1), got {}",
                self.threshold_prob
            )));
        }
        Ok(())
    }
}

impl Default for DelayCurveParameters {
    /// Used when no curve has been built for the data at hand.
    fn default() -> Self {
        Self {
            mean_ontime_delay: 0.0,
            mean_late_delay: 25.0,
            threshold_prob: 0.5,
        }
    }
}

/// Persisted curve: parameters plus where they came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayCurveFile {
    pub mean_ontime_delay: f64,
    pub mean_late_delay: f64,
    pub threshold_prob: f64,
    pub data_years: String,
    pub n_flights: usize,
    pub ontime_pct: f64,
    pub late_pct: f64,
}

impl DelayCurveFile {
    pub fn parameters(&self) -> Result<DelayCurveParameters, ForecastError> {
        DelayCurveParameters::new(self.mean_ontime_delay, self.mean_late_delay, self.threshold_prob)
    }
}

impl Default for DelayCurveFile {
    fn default() -> Self {
        let p = DelayCurveParameters::default();
        Self {
            mean_ontime_delay: p.mean_ontime_delay,
            mean_late_delay: p.mean_late_delay,
            threshold_prob: p.threshold_prob,
            data_years: "default".into(),
            n_flights: 0,
            ontime_pct: 80.0,
            late_pct: 20.0,
        }
    }
}

/// Late-probability → delay minutes and multi-threshold probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DelayDistributionModel {
    params: DelayCurveParameters,
}

impl DelayDistributionModel {
    pub fn new(params: DelayCurveParameters) -> Result<Self, ForecastError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn parameters(&self) -> &DelayCurveParameters {
        &self.params
    }

    /// Expected delay (minutes) for a late probability.
    ///
    /// Flat at `mean_ontime_delay` up to `threshold_prob`, then linear up to
    /// `mean_late_delay` at `p = 1`. Never negative.
    pub fn predict_delay(&self, p: f64) -> f64 {
        let p = sanitize_probability(p);
        let DelayCurveParameters {
            mean_ontime_delay: lo,
            mean_late_delay: hi,
            threshold_prob: t,
        } = self.params;

        let delay = if p <= t {
            lo
        } else {
            let progress = (p - t) / (1.0 - t);
            lo + progress * (hi - lo)
        };
        delay.max(0.0)
    }

    /// Probabilities of departing at least 15/30/45/60 minutes late.
    pub fn predict_threshold_probabilities(&self, p: f64) -> ThresholdProbabilities {
        let p15 = sanitize_probability(p);
        let expected = self.predict_delay(p15);

        let (mut p30, mut p45, mut p60) = if expected < LATE_THRESHOLD_MINUTES {
            (
                p15 * LOW_DELAY_RATIOS[0],
                p15 * LOW_DELAY_RATIOS[1],
                p15 * LOW_DELAY_RATIOS[2],
            )
        } else {
            // Exponential survival anchored so P(delay >= expected) = 0.5.
            let lambda = LN_2 / (expected - LATE_THRESHOLD_MINUTES).max(LAMBDA_EPS);
            (
                p15 * (-lambda * 15.0).exp(),
                p15 * (-lambda * 30.0).exp(),
                p15 * (-lambda * 45.0).exp(),
            )
        };

        p30 = p30.min(MAX_STEP_RATIO * p15).max(0.0);
        p45 = p45.min(MAX_STEP_RATIO * p30).max(0.0);
        p60 = p60.min(MAX_STEP_RATIO * p45).max(0.0);

        ThresholdProbabilities {
            p_late_15: p15,
            p_late_30: p30,
            p_late_45: p45,
            p_late_60: p60,
        }
    }

    /// `scheduled + max(0, expected_delay)` minutes. Never earlier than scheduled.
    pub fn predicted_departure(scheduled: NaiveDateTime, expected_delay: f64) -> NaiveDateTime {
        let minutes = if expected_delay.is_finite() {
            expected_delay.clamp(0.0, MAX_SHIFT_MINUTES)
        } else {
            0.0
        };
        let shift = TimeDelta::milliseconds((minutes * 60_000.0).round() as i64);
        scheduled.checked_add_signed(shift).unwrap_or(scheduled)
    }
}

fn sanitize_probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

/// Compute curve parameters from historical delay minutes.
///
/// - on-time/late means over delays in `[-60, 300]`
/// - `threshold_prob`: rows (in date order) are cut into 20 equal-count bins;
///   the first bin whose mean delay exceeds `mean_ontime + 5` gives `idx / 20`,
///   clamped to `[0.1, 0.8]`
pub fn build_delay_curve(
    records: &[FlightRecord],
    start_year: i32,
    end_year: i32,
) -> Result<DelayCurveFile, ForecastError> {
    let (min_delay, max_delay) = DELAY_FILTER_MINUTES;
    let mut rows: Vec<(chrono::NaiveDate, f64, bool)> = records
        .iter()
        .filter_map(|r| {
            let d = r.dep_delay_minutes?;
            (d.is_finite() && (min_delay..=max_delay).contains(&d)).then_some((r.flight_date, d, r.late))
        })
        .collect();

    if rows.is_empty() {
        return Err(ForecastError::InsufficientData(format!(
            "no delay minutes recorded for {start_year}-{end_year}"
        )));
    }
    rows.sort_by_key(|(date, _, _)| *date);

    let defaults = DelayCurveParameters::default();
    let mean_of = |late: bool| {
        let (sum, count) = rows
            .iter()
            .filter(|(_, _, l)| *l == late)
            .fold((0.0, 0usize), |(s, c), (_, d, _)| (s + d, c + 1));
        (count > 0).then(|| sum / count as f64)
    };
    let mean_ontime = mean_of(false).unwrap_or(defaults.mean_ontime_delay);
    let mean_late = mean_of(true)
        .unwrap_or(defaults.mean_late_delay)
        .max(mean_ontime);

    let n = rows.len();
    let mut bin_sum = [0.0; CURVE_BINS];
    let mut bin_count = [0usize; CURVE_BINS];
    for (i, (_, d, _)) in rows.iter().enumerate() {
        let b = (i * CURVE_BINS / n).min(CURVE_BINS - 1);
        bin_sum[b] += d;
        bin_count[b] += 1;
    }
    let threshold_idx = (0..CURVE_BINS)
        .find(|&b| bin_count[b] > 0 && bin_sum[b] / bin_count[b] as f64 > mean_ontime + THRESHOLD_RISE_MINUTES)
        .unwrap_or(0);
    let threshold_prob =
        (threshold_idx as f64 / CURVE_BINS as f64).clamp(THRESHOLD_BOUNDS.0, THRESHOLD_BOUNDS.1);

    let late_pct = 100.0 * rows.iter().filter(|(_, _, l)| *l).count() as f64 / n as f64;

    Ok(DelayCurveFile {
        mean_ontime_delay: mean_ontime,
        mean_late_delay: mean_late,
        threshold_prob,
        data_years: format!("{start_year}-{end_year}"),
        n_flights: n,
        ontime_pct: 100.0 - late_pct,
        late_pct,
    })
}
