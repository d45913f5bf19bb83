//! Tiered late-probability estimation.
//!
//! Tiers are tried strictly in order; the first success wins:
//!
//! 1. hierarchical model: conjugate fast update seeded by the scoring table
//!    when a live observation exists, otherwise the model's own prediction
//! 2. fast classifier, scaled by weather severity and capped
//! 3. conjugate baseline (prior from route history, optional live update)
//!
//! Tiers 1 and 2 report an explicit [`TierOutcome`]. Tier 3 has no fallback:
//! its only failure is [`ForecastError::BaselineFailure`], which propagates.
//!
//! Tier 1 carries a latency budget. It is advisory: the elapsed time is
//! measured and an overrun is logged, but the computation is never cancelled.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::bayes::{BetaPosterior, DelayDistributionModel, PriorEstimator, RouteHistory, ScoringTable};
use crate::domain::{FlightContext, ForecastConfig, PriorEstimate, Provenance};
use crate::error::ForecastError;
use crate::models::{DelayClassifier, DelayModel, ModelInput};

/// Read-only collaborators shared by every forecast request.
///
/// Built once at startup and passed by reference; nothing in here is mutated
/// per request.
#[derive(Clone, Default)]
pub struct ForecastContext {
    pub hierarchical: Option<Arc<dyn DelayModel>>,
    pub classifier: Option<Arc<dyn DelayClassifier>>,
    pub curve: DelayDistributionModel,
    pub scoring: ScoringTable,
    pub config: ForecastConfig,
}

impl ForecastContext {
    pub fn new(curve: DelayDistributionModel) -> Self {
        Self {
            curve,
            ..Self::default()
        }
    }

    pub fn with_hierarchical(mut self, model: Arc<dyn DelayModel>) -> Self {
        self.hierarchical = Some(model);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn DelayClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringTable) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_config(mut self, config: ForecastConfig) -> Self {
        self.config = config;
        self
    }
}

impl fmt::Debug for ForecastContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForecastContext")
            .field("hierarchical", &self.hierarchical.is_some())
            .field("classifier", &self.classifier.is_some())
            .field("curve", self.curve.parameters())
            .field("config", &self.config)
            .finish()
    }
}

/// A tier's answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierEstimate {
    pub p_late: f64,
    pub provenance: Provenance,
    /// Posterior behind the estimate, when the tier is conjugate.
    pub posterior: Option<BetaPosterior>,
    /// A live observation was folded in.
    pub updated: bool,
}

/// Result of attempting one fallible tier.
#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Success(TierEstimate),
    /// The collaborator is not loaded or has nothing to say.
    Unavailable,
    Failed(String),
}

impl TierOutcome {
    fn from_result(result: Result<TierEstimate, ForecastError>) -> Self {
        match result {
            Ok(est) if est.p_late.is_finite() => TierOutcome::Success(est),
            Ok(est) => TierOutcome::Failed(format!("non-finite probability {}", est.p_late)),
            Err(err) => TierOutcome::Failed(format!("[{}] {err}", err.label())),
        }
    }
}

/// Winning estimate plus timing.
#[derive(Debug, Clone, PartialEq)]
pub struct TierDecision {
    pub estimate: TierEstimate,
    /// Wall-clock time of the winning tier.
    pub latency_ms: f64,
    /// Whether Tier 1 ran past its budget (whatever tier won).
    pub tier1_over_budget: bool,
}

pub struct PredictionOrchestrator<'a> {
    ctx: &'a ForecastContext,
    history: Option<&'a dyn RouteHistory>,
}

impl<'a> PredictionOrchestrator<'a> {
    pub fn new(ctx: &'a ForecastContext, history: Option<&'a dyn RouteHistory>) -> Self {
        Self { ctx, history }
    }

    pub fn estimate(&self, flight: &FlightContext) -> Result<TierDecision, ForecastError> {
        let prior = self.prior(flight);

        let t1 = Instant::now();
        let outcome = self.tier1(flight, &prior);
        let tier1_ms = elapsed_ms(t1);
        let tier1_over_budget = tier1_ms > self.ctx.config.tier1_budget_ms;
        if tier1_over_budget {
            warn!(
                route = %flight.route,
                elapsed_ms = tier1_ms,
                budget_ms = self.ctx.config.tier1_budget_ms,
                "tier 1 exceeded its latency budget"
            );
        }
        match outcome {
            TierOutcome::Success(estimate) => {
                return Ok(TierDecision {
                    estimate,
                    latency_ms: tier1_ms,
                    tier1_over_budget,
                });
            }
            TierOutcome::Unavailable => debug!("tier 1 unavailable"),
            TierOutcome::Failed(reason) => warn!(%reason, "tier 1 failed; falling back"),
        }

        let t2 = Instant::now();
        match self.tier2(flight) {
            TierOutcome::Success(estimate) => {
                return Ok(TierDecision {
                    estimate,
                    latency_ms: elapsed_ms(t2),
                    tier1_over_budget,
                });
            }
            TierOutcome::Unavailable => debug!("tier 2 unavailable"),
            TierOutcome::Failed(reason) => warn!(%reason, "tier 2 failed; falling back"),
        }

        let t3 = Instant::now();
        let estimate = self.tier3(flight, &prior)?;
        Ok(TierDecision {
            estimate,
            latency_ms: elapsed_ms(t3),
            tier1_over_budget,
        })
    }

    fn prior(&self, flight: &FlightContext) -> PriorEstimate {
        match self.history {
            Some(h) => PriorEstimator::new(h).estimate(&flight.route),
            None => PriorEstimator::without_history().estimate(&flight.route),
        }
    }

    /// Hierarchical model.
    pub fn tier1(&self, flight: &FlightContext, prior: &PriorEstimate) -> TierOutcome {
        let Some(model) = self.ctx.hierarchical.as_deref() else {
            return TierOutcome::Unavailable;
        };

        let result = match flight.live_observation {
            Some(observation) => {
                // Route history, when there is any, replaces the table's base rate.
                let base_rate = (prior.n > 0).then(|| prior.alpha / (prior.alpha + prior.beta));
                let seed = self
                    .ctx
                    .scoring
                    .score(&flight.route, flight.dep_hour, flight.weather.as_ref(), base_rate);
                model.fast_update(seed, observation).map(|post| TierEstimate {
                    p_late: post.predictive_p_late(),
                    provenance: Provenance::Hierarchical,
                    posterior: Some(post),
                    updated: true,
                })
            }
            None => model.predict(&[ModelInput::from(flight)]).and_then(|preds| {
                let p = preds.first().copied().ok_or_else(|| {
                    ForecastError::CollaboratorUnavailable("hierarchical model returned no prediction".into())
                })?;
                Ok(TierEstimate {
                    p_late: p,
                    provenance: Provenance::HierarchicalPriorOnly,
                    posterior: None,
                    updated: false,
                })
            }),
        };
        TierOutcome::from_result(result)
    }

    /// Fast classifier × weather severity, capped.
    pub fn tier2(&self, flight: &FlightContext) -> TierOutcome {
        let Some(classifier) = self.ctx.classifier.as_deref() else {
            return TierOutcome::Unavailable;
        };

        let result = classifier.predict_proba(&ModelInput::from(flight)).map(|p| {
            let m = self.ctx.scoring.weather_multiplier(flight.weather.as_ref());
            TierEstimate {
                p_late: (p * m).clamp(0.0, self.ctx.config.classifier_cap),
                provenance: Provenance::FastClassifier,
                posterior: None,
                updated: false,
            }
        });
        TierOutcome::from_result(result)
    }

    /// Conjugate baseline. Never falls back.
    pub fn tier3(&self, flight: &FlightContext, prior: &PriorEstimate) -> Result<TierEstimate, ForecastError> {
        let mut post = BetaPosterior::from_prior(prior)
            .map_err(|e| ForecastError::BaselineFailure(format!("{}: {e}", flight.route)))?;
        if let Some(observation) = flight.live_observation {
            post.update(observation);
        }
        let p_late = post.predictive_p_late();
        if !p_late.is_finite() {
            return Err(ForecastError::BaselineFailure(format!(
                "{}: non-finite baseline probability",
                flight.route
            )));
        }
        Ok(TierEstimate {
            p_late,
            provenance: Provenance::Baseline,
            posterior: Some(post),
            updated: flight.live_observation.is_some(),
        })
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayes::RouteCounts;
    use crate::domain::{FlightRecord, Observation, RouteKey, WeatherObservation};
    use crate::models::FitDiagnostics;
    use chrono::NaiveDate;
    use std::path::Path;
    use std::thread;
    use std::time::Duration;

    /// Hierarchical stand-in with a configurable prediction and delay.
    struct Fake {
        predict: Result<f64, ForecastError>,
        sleep: Duration,
    }

    impl DelayModel for Fake {
        fn fit(&mut self, _records: &[FlightRecord]) -> Result<FitDiagnostics, ForecastError> {
            Err(ForecastError::CollaboratorUnavailable("read-only".into()))
        }
        fn predict(&self, inputs: &[ModelInput]) -> Result<Vec<f64>, ForecastError> {
            thread::sleep(self.sleep);
            self.predict.clone().map(|p| vec![p; inputs.len()])
        }
        fn fast_update(&self, seed_p: f64, observation: Observation) -> Result<BetaPosterior, ForecastError> {
            let mut post = BetaPosterior::new(seed_p * 10.0 + 0.5, (1.0 - seed_p) * 10.0 + 0.5)?;
            post.update(observation);
            Ok(post)
        }
        fn save(&self, _path: &Path) -> Result<(), ForecastError> {
            Ok(())
        }
        fn load(_path: &Path) -> Result<Self, ForecastError> {
            Err(ForecastError::CollaboratorUnavailable("fake".into()))
        }
        fn diagnostics(&self) -> Option<FitDiagnostics> {
            None
        }
    }

    struct FixedClassifier(f64);

    impl DelayClassifier for FixedClassifier {
        fn predict_proba(&self, _input: &ModelInput) -> Result<f64, ForecastError> {
            Ok(self.0)
        }
    }

    fn flight(live: Option<Observation>, weather: Option<WeatherObservation>) -> FlightContext {
        FlightContext {
            route: RouteKey::new("AA", "JFK", "LAX"),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            dep_hour: Some(12),
            weather,
            live_observation: live,
        }
    }

    fn fake(predict: Result<f64, ForecastError>) -> Arc<dyn DelayModel> {
        Arc::new(Fake {
            predict,
            sleep: Duration::ZERO,
        })
    }

    #[test]
    fn baseline_only_context_uses_conjugate_tier() {
        let ctx = ForecastContext::default();
        let orch = PredictionOrchestrator::new(&ctx, None);
        let d = orch.estimate(&flight(Some(Observation::Late), None)).unwrap();
        assert_eq!(d.estimate.provenance, Provenance::Baseline);
        assert!(d.estimate.updated);
        let post = d.estimate.posterior.unwrap();
        assert_eq!((post.alpha(), post.beta()), (1.5, 0.5));
        assert!((d.estimate.p_late - 0.75).abs() < 1e-12);
    }

    #[test]
    fn live_observation_takes_hierarchical_fast_path() {
        let ctx = ForecastContext::default().with_hierarchical(fake(Ok(0.9)));
        let orch = PredictionOrchestrator::new(&ctx, None);
        let d = orch.estimate(&flight(Some(Observation::OnTime), None)).unwrap();
        assert_eq!(d.estimate.provenance, Provenance::Hierarchical);

        // Seed: 0.35 base + 0.10 JFK + 0.5 × 0.07 LAX + 0.01 AA = 0.495.
        let seed: f64 = 0.495;
        let expected = (seed * 10.0 + 0.5) / (10.0 + 1.0 + 1.0);
        assert!((d.estimate.p_late - expected).abs() < 1e-9);
    }

    #[test]
    fn no_live_observation_uses_model_prediction() {
        let ctx = ForecastContext::default().with_hierarchical(fake(Ok(0.42)));
        let d = PredictionOrchestrator::new(&ctx, None).estimate(&flight(None, None)).unwrap();
        assert_eq!(d.estimate.provenance, Provenance::HierarchicalPriorOnly);
        assert_eq!(d.estimate.p_late, 0.42);
        assert!(!d.estimate.updated);
    }

    #[test]
    fn failed_tier1_falls_to_classifier_with_weather_cap() {
        let ctx = ForecastContext::default()
            .with_hierarchical(fake(Err(ForecastError::CollaboratorUnavailable("no trace".into()))))
            .with_classifier(Arc::new(FixedClassifier(0.8)));
        let storm = WeatherObservation {
            wind_kt: Some(40.0),
            precip_mm: Some(10.0),
            ..WeatherObservation::default()
        };
        let d = PredictionOrchestrator::new(&ctx, None)
            .estimate(&flight(None, Some(storm)))
            .unwrap();
        assert_eq!(d.estimate.provenance, Provenance::FastClassifier);
        assert_eq!(d.estimate.p_late, 0.95);

        let calm = PredictionOrchestrator::new(&ctx, None).estimate(&flight(None, None)).unwrap();
        assert_eq!(calm.estimate.p_late, 0.8);
    }

    #[test]
    fn non_finite_tier1_answer_falls_through() {
        let ctx = ForecastContext::default().with_hierarchical(fake(Ok(f64::NAN)));
        let orch = PredictionOrchestrator::new(&ctx, None);
        assert!(matches!(orch.tier1(&flight(None, None), &PriorEstimate::JEFFREYS), TierOutcome::Failed(_)));
        let d = orch.estimate(&flight(None, None)).unwrap();
        assert_eq!(d.estimate.provenance, Provenance::Baseline);
    }

    #[test]
    fn baseline_uses_route_history() {
        let records: Vec<FlightRecord> = (0..4)
            .map(|i| FlightRecord {
                flight_date: NaiveDate::from_ymd_opt(2023, 1, 1 + i).unwrap(),
                carrier: "AA".into(),
                flight_number: None,
                origin: "JFK".into(),
                dest: "LAX".into(),
                dep_hour: None,
                dep_delay_minutes: None,
                late: i == 0,
                wx_temp_c: None,
                wx_wind_kt: None,
                wx_precip_mm: None,
            })
            .collect();
        let counts = RouteCounts::from_records(&records);
        let ctx = ForecastContext::default();
        let d = PredictionOrchestrator::new(&ctx, Some(&counts))
            .estimate(&flight(None, None))
            .unwrap();
        // Beta(1.5, 3.5)
        assert!((d.estimate.p_late - 0.3).abs() < 1e-12);
        assert!(!d.estimate.updated);
    }

    #[test]
    fn tier1_overrun_is_recorded_not_cancelled() {
        let ctx = ForecastContext::default()
            .with_hierarchical(Arc::new(Fake {
                predict: Ok(0.6),
                sleep: Duration::from_millis(30),
            }))
            .with_config(ForecastConfig {
                tier1_budget_ms: 1.0,
                ..ForecastConfig::default()
            });
        let d = PredictionOrchestrator::new(&ctx, None).estimate(&flight(None, None)).unwrap();
        // The slow answer still wins; the overrun is only flagged.
        assert_eq!(d.estimate.provenance, Provenance::HierarchicalPriorOnly);
        assert_eq!(d.estimate.p_late, 0.6);
        assert!(d.tier1_over_budget);
        assert!(d.latency_ms >= 30.0);
    }
}
