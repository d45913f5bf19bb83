//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the forecasting tiers and the validator
//! - exported to JSON/CSV
//! - reloaded later (validation results feed the regression gate)

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Departure delay (minutes) at or above which a flight counts as late.
pub const LATE_THRESHOLD_MINUTES: f64 = 15.0;

/// Directional flight path operated by one carrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub carrier: String,
    pub origin: String,
    pub dest: String,
}

impl RouteKey {
    /// Build a key, normalizing codes to upper case.
    pub fn new(carrier: &str, origin: &str, dest: &str) -> Self {
        Self {
            carrier: carrier.trim().to_ascii_uppercase(),
            origin: origin.trim().to_ascii_uppercase(),
            dest: dest.trim().to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.carrier, self.origin, self.dest)
    }
}

/// A single binary outcome. Consumed exactly once by a posterior update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Observation {
    OnTime,
    Late,
}

impl Observation {
    /// Classify a departure delay against the 15-minute threshold.
    pub fn from_delay_minutes(delay_minutes: f64) -> Self {
        if delay_minutes >= LATE_THRESHOLD_MINUTES {
            Observation::Late
        } else {
            Observation::OnTime
        }
    }

    pub fn from_late(late: bool) -> Self {
        if late { Observation::Late } else { Observation::OnTime }
    }

    /// `1` for late, `0` for on-time.
    pub fn value(self) -> u8 {
        match self {
            Observation::OnTime => 0,
            Observation::Late => 1,
        }
    }

    pub fn is_late(self) -> bool {
        self == Observation::Late
    }
}

impl TryFrom<i64> for Observation {
    type Error = ForecastError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Observation::OnTime),
            1 => Ok(Observation::Late),
            other => Err(ForecastError::InvalidParameter(format!(
                "observation must be 0 (on-time) or 1 (late), got {other}"
            ))),
        }
    }
}

/// One historical departure as stored in the analytical store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub flight_date: NaiveDate,
    pub carrier: String,
    pub flight_number: Option<String>,
    pub origin: String,
    pub dest: String,
    /// Scheduled departure hour (0-23), if known.
    pub dep_hour: Option<u32>,
    pub dep_delay_minutes: Option<f64>,
    pub late: bool,
    pub wx_temp_c: Option<f64>,
    pub wx_wind_kt: Option<f64>,
    pub wx_precip_mm: Option<f64>,
}

impl FlightRecord {
    pub fn route(&self) -> RouteKey {
        RouteKey::new(&self.carrier, &self.origin, &self.dest)
    }

    pub fn observation(&self) -> Observation {
        Observation::from_late(self.late)
    }

    /// Weather at departure, as far as the record knows it.
    pub fn weather(&self) -> WeatherObservation {
        WeatherObservation {
            temp_c: self.wx_temp_c,
            wind_kt: self.wx_wind_kt,
            precip_mm: self.wx_precip_mm,
            conditions: None,
            valid_time: None,
        }
    }
}

/// Surface weather at the departure airport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub temp_c: Option<f64>,
    pub wind_kt: Option<f64>,
    pub precip_mm: Option<f64>,
    pub conditions: Option<String>,
    pub valid_time: Option<DateTime<Utc>>,
}

/// Aircraft assigned to the flight, when the status feed knows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AircraftInfo {
    pub tail_number: Option<String>,
    pub age_years: Option<f64>,
}

/// Live status of a specific flight on a specific day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightStatus {
    pub origin: Option<String>,
    pub dest: Option<String>,
    pub scheduled_departure: Option<NaiveDateTime>,
    /// Feed status string (`scheduled`, `active`, `landed`, ...).
    pub status: Option<String>,
    pub delay_minutes: Option<f64>,
    pub aircraft: AircraftInfo,
}

impl FlightStatus {
    /// The live observation this status implies, if any.
    ///
    /// Only flights that have actually departed (`active` or `landed`) with a
    /// reported departure delay yield an observation.
    pub fn live_observation(&self) -> Option<Observation> {
        let departed = matches!(self.status.as_deref(), Some("active") | Some("landed"));
        match (departed, self.delay_minutes) {
            (true, Some(delay)) if delay.is_finite() => Some(Observation::from_delay_minutes(delay)),
            _ => None,
        }
    }
}

/// Everything the tiers know about the flight being forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightContext {
    pub route: RouteKey,
    pub date: NaiveDate,
    pub dep_hour: Option<u32>,
    pub weather: Option<WeatherObservation>,
    pub live_observation: Option<Observation>,
}

/// Which tier produced a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    #[serde(rename = "hierarchical")]
    Hierarchical,
    #[serde(rename = "hierarchical-prior-only")]
    HierarchicalPriorOnly,
    #[serde(rename = "fast-classifier")]
    FastClassifier,
    #[serde(rename = "baseline")]
    Baseline,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Hierarchical => "hierarchical",
            Provenance::HierarchicalPriorOnly => "hierarchical-prior-only",
            Provenance::FastClassifier => "fast-classifier",
            Provenance::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(alpha, beta, n)` prior for a route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorEstimate {
    pub alpha: f64,
    pub beta: f64,
    pub n: u64,
}

impl PriorEstimate {
    /// Jeffreys prior `Beta(0.5, 0.5)` with no supporting flights.
    pub const JEFFREYS: PriorEstimate = PriorEstimate {
        alpha: 0.5,
        beta: 0.5,
        n: 0,
    };

    /// Jeffreys prior plus observed counts.
    pub fn from_counts(n: u64, k_late: u64) -> Self {
        let k = k_late.min(n);
        Self {
            alpha: 0.5 + k as f64,
            beta: 0.5 + (n - k) as f64,
            n,
        }
    }
}

/// Probability of departing at least 15/30/45/60 minutes late.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProbabilities {
    pub p_late_15: f64,
    pub p_late_30: f64,
    pub p_late_45: f64,
    pub p_late_60: f64,
}

/// Immutable output of a forecast request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub carrier: String,
    pub flight_number: String,
    pub origin: String,
    pub dest: String,
    pub scheduled_departure: Option<NaiveDateTime>,
    pub predicted_departure: Option<NaiveDateTime>,
    pub p_late_15: f64,
    pub p_late_30: f64,
    pub p_late_45: f64,
    pub p_late_60: f64,
    pub expected_delay_minutes: f64,
    /// Posterior parameters, present when the baseline tier answered.
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub provenance: Provenance,
    /// Whether a live observation was folded into the estimate.
    pub updated: bool,
    pub update_latency_ms: f64,
    pub wx_temp_c: Option<f64>,
    pub wx_wind_kt: Option<f64>,
    pub wx_precip_mm: Option<f64>,
    pub wx_conditions: Option<String>,
    pub wx_valid_time: Option<DateTime<Utc>>,
    pub tail_number: Option<String>,
    pub aircraft_age_yrs: Option<f64>,
}

/// One served forecast in the live performance log, with its outcome once known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveRecord {
    /// `CARRIER+NUMBER@DATE`, e.g. `UA1234@2024-03-09`.
    pub flight_id: String,
    pub recorded_at: DateTime<Utc>,
    pub p_pred: f64,
    pub provenance: Provenance,
    #[serde(default)]
    pub late: Option<bool>,
}

impl LiveRecord {
    pub fn flight_id(carrier: &str, flight_number: &str, date: NaiveDate) -> String {
        format!(
            "{}{}@{date}",
            carrier.trim().to_ascii_uppercase(),
            flight_number.trim()
        )
    }

    /// Pending record for a forecast served at `at`.
    pub fn from_forecast(result: &ForecastResult, date: NaiveDate, at: DateTime<Utc>) -> Self {
        Self {
            flight_id: Self::flight_id(&result.carrier, &result.flight_number, date),
            recorded_at: at,
            p_pred: result.p_late_15,
            provenance: result.provenance,
            late: None,
        }
    }
}

/// Brier scores at the higher delay thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBrier {
    pub brier_30: f64,
    pub brier_45: f64,
    pub brier_60: f64,
}

/// Calibration/discrimination metrics for one model on one fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub brier: f64,
    pub log_loss: f64,
    pub auc: f64,
    pub ece: f64,
    pub threshold_brier: Option<ThresholdBrier>,
}

impl ModelMetrics {
    /// Poor-score sentinel used when a model fails inside a fold.
    pub const FAILED: ModelMetrics = ModelMetrics {
        brier: 1.0,
        log_loss: 10.0,
        auc: 0.5,
        ece: 1.0,
        threshold_brier: None,
    };
}

/// One expanding-window fold: train on `[train_start, train_end]`, test on
/// `test_year`. Immutable once computed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFold {
    pub train_start: i32,
    pub train_end: i32,
    pub test_year: i32,
    pub train_size: usize,
    pub test_size: usize,
    pub baseline: ModelMetrics,
    pub candidate: ModelMetrics,
    pub baseline_seconds: f64,
    pub candidate_seconds: f64,
    /// The candidate failed and its metrics are the sentinel.
    pub candidate_degraded: bool,
}

impl ValidationFold {
    pub fn brier_improvement(&self) -> f64 {
        self.baseline.brier - self.candidate.brier
    }

    pub fn candidate_wins(&self) -> bool {
        self.candidate.brier < self.baseline.brier
    }

    /// Flatten into the exported record shape.
    pub fn to_record(&self) -> FoldRecord {
        let tb = self.baseline.threshold_brier;
        FoldRecord {
            train_start: self.train_start,
            train_end: self.train_end,
            test_year: self.test_year,
            train_size: self.train_size,
            test_size: self.test_size,
            baseline_brier: self.baseline.brier,
            baseline_log_loss: self.baseline.log_loss,
            baseline_auc: self.baseline.auc,
            baseline_ece: self.baseline.ece,
            baseline_brier_30: tb.map(|t| t.brier_30),
            baseline_brier_45: tb.map(|t| t.brier_45),
            baseline_brier_60: tb.map(|t| t.brier_60),
            candidate_brier: self.candidate.brier,
            candidate_log_loss: self.candidate.log_loss,
            candidate_auc: self.candidate.auc,
            candidate_ece: self.candidate.ece,
            baseline_time: self.baseline_seconds,
            candidate_time: self.candidate_seconds,
            brier_improvement: self.brier_improvement(),
            candidate_wins: self.candidate_wins(),
        }
    }
}

/// Flat, serializable form of a [`ValidationFold`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldRecord {
    pub train_start: i32,
    pub train_end: i32,
    pub test_year: i32,
    pub train_size: usize,
    pub test_size: usize,
    pub baseline_brier: f64,
    pub baseline_log_loss: f64,
    pub baseline_auc: f64,
    pub baseline_ece: f64,
    pub baseline_brier_30: Option<f64>,
    pub baseline_brier_45: Option<f64>,
    pub baseline_brier_60: Option<f64>,
    pub candidate_brier: f64,
    pub candidate_log_loss: f64,
    pub candidate_auc: f64,
    pub candidate_ece: f64,
    pub baseline_time: f64,
    pub candidate_time: f64,
    pub brier_improvement: f64,
    pub candidate_wins: bool,
}

/// Aggregate acceptance decision over all completed folds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceVerdict {
    pub folds: usize,
    pub wins: usize,
    pub required_wins: usize,
    pub mean_candidate_brier: f64,
    pub brier_ok: bool,
    pub wins_ok: bool,
    pub pass: bool,
}

/// Forecast tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    /// Advisory latency budget for Tier 1 (milliseconds).
    pub tier1_budget_ms: f64,
    /// Pseudo-count used to turn a seed probability into a Beta prior.
    pub fast_update_pseudo_n: f64,
    /// Upper clamp for the weather-adjusted classifier probability.
    pub classifier_cap: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            tier1_budget_ms: 150.0,
            fast_update_pseudo_n: 10.0,
            classifier_cap: 0.95,
        }
    }
}

/// Walk-forward tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    /// Training window starts this many years before the first test year.
    pub lookback_years: i32,
    /// Number of equal-width bins for ECE.
    pub n_bins: usize,
    /// Acceptance gate: mean candidate Brier must not exceed this.
    pub max_mean_brier: f64,
    /// Acceptance gate: fraction of folds the candidate must win.
    pub min_win_fraction: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            lookback_years: 4,
            n_bins: 10,
            max_mean_brier: 0.125,
            min_win_fraction: 0.8,
        }
    }
}

/// Rolling live-performance check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveCheckConfig {
    /// Degraded when the window's Brier score exceeds this.
    pub max_brier: f64,
    pub lookback_days: i64,
    /// Fewer resolved forecasts than this in the window means no verdict.
    pub min_observations: usize,
}

impl Default for LiveCheckConfig {
    fn default() -> Self {
        Self {
            max_brier: 0.18,
            lookback_days: 7,
            min_observations: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_flight_ids_are_normalized() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(LiveRecord::flight_id(" ua", "1234 ", date), "UA1234@2024-03-09");
    }

    #[test]
    fn observation_threshold_is_inclusive() {
        assert_eq!(Observation::from_delay_minutes(15.0), Observation::Late);
        assert_eq!(Observation::from_delay_minutes(14.9), Observation::OnTime);
        assert_eq!(Observation::from_delay_minutes(-5.0), Observation::OnTime);
    }

    #[test]
    fn non_binary_observation_is_rejected() {
        assert_eq!(Observation::try_from(1).unwrap(), Observation::Late);
        assert!(matches!(
            Observation::try_from(2),
            Err(ForecastError::InvalidParameter(_))
        ));
        assert!(Observation::try_from(-1).is_err());
    }

    #[test]
    fn live_observation_requires_departed_status() {
        let mut status = FlightStatus {
            status: Some("scheduled".into()),
            delay_minutes: Some(40.0),
            ..FlightStatus::default()
        };
        assert_eq!(status.live_observation(), None);

        status.status = Some("active".into());
        assert_eq!(status.live_observation(), Some(Observation::Late));

        status.delay_minutes = None;
        assert_eq!(status.live_observation(), None);
    }

    #[test]
    fn prior_from_counts_adds_jeffreys() {
        let p = PriorEstimate::from_counts(10, 3);
        assert_eq!((p.alpha, p.beta, p.n), (3.5, 7.5, 10));
    }

    #[test]
    fn provenance_serializes_with_tags() {
        let s = serde_json::to_string(&Provenance::HierarchicalPriorOnly).unwrap();
        assert_eq!(s, "\"hierarchical-prior-only\"");
    }
}
