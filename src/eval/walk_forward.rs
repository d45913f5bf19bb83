//! Expanding-window walk-forward validation.
//!
//! For each test year `Y` in `[start, end]`:
//!
//! ```text
//! train: [start − lookback, Y − 1]      test: Y
//! ```
//!
//! The conjugate baseline replays every test route chronologically
//! (predict, then update). The candidate is fitted on the training window and
//! scores the whole test year in one batch. A failing candidate degrades its
//! fold to the poor-score sentinel instead of aborting the run.
//!
//! Routes are independent, so the baseline scores them in parallel; each
//! route owns its posterior.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::bayes::{BetaPosterior, DelayDistributionModel, PriorEstimator, RouteCounts};
use crate::data::FlightHistory;
use crate::domain::{FlightRecord, ModelMetrics, RouteKey, ThresholdBrier, ValidationConfig, ValidationFold};
use crate::error::ForecastError;
use crate::eval::metrics::{brier_score, evaluate};
use crate::models::{DelayModel, ModelInput};

/// One scheduled fold: `(train_start, train_end, test_year)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoldWindow {
    pub train_start: i32,
    pub train_end: i32,
    pub test_year: i32,
}

/// Baseline prediction for one test flight.
#[derive(Debug, Clone, Copy)]
struct Scored {
    p_late: f64,
    late: bool,
    delay_minutes: Option<f64>,
}

pub struct WalkForwardValidator<'a, F> {
    history: &'a dyn FlightHistory,
    make_candidate: F,
    config: ValidationConfig,
    curve: DelayDistributionModel,
}

impl<'a, M, F> WalkForwardValidator<'a, F>
where
    M: DelayModel,
    F: Fn() -> M + Sync,
{
    pub fn new(history: &'a dyn FlightHistory, make_candidate: F) -> Self {
        Self {
            history,
            make_candidate,
            config: ValidationConfig::default(),
            curve: DelayDistributionModel::default(),
        }
    }

    pub fn with_config(mut self, config: ValidationConfig) -> Self {
        self.config = config;
        self
    }

    /// Delay curve used for the baseline's 30/45/60-minute Brier scores.
    pub fn with_curve(mut self, curve: DelayDistributionModel) -> Self {
        self.curve = curve;
        self
    }

    /// Fold schedule for `[start_year, end_year]`; windows with no training years are dropped.
    pub fn schedule(&self, start_year: i32, end_year: i32) -> Vec<FoldWindow> {
        let train_start = start_year - self.config.lookback_years;
        (start_year..=end_year)
            .filter_map(|test_year| {
                let train_end = test_year - 1;
                if train_end < train_start {
                    info!(test_year, train_start, train_end, "skipping fold: empty training window");
                    return None;
                }
                Some(FoldWindow {
                    train_start,
                    train_end,
                    test_year,
                })
            })
            .collect()
    }

    /// Run every fold and return completed folds in test-year order.
    ///
    /// Folds without training or test data are skipped. Zero completed folds is
    /// `InsufficientData`.
    pub fn run(&self, start_year: i32, end_year: i32) -> Result<Vec<ValidationFold>, ForecastError> {
        info!(start_year, end_year, "starting walk-forward validation");
        let mut folds = Vec::new();

        for window in self.schedule(start_year, end_year) {
            match self.run_fold(window) {
                Ok(fold) => folds.push(fold),
                Err(ForecastError::InsufficientData(reason)) => {
                    info!(test_year = window.test_year, %reason, "skipping fold");
                }
                Err(err) => return Err(err),
            }
        }

        if folds.is_empty() {
            return Err(ForecastError::InsufficientData(format!(
                "no valid folds completed for {start_year}-{end_year}"
            )));
        }
        Ok(folds)
    }

    pub fn run_fold(&self, window: FoldWindow) -> Result<ValidationFold, ForecastError> {
        let FoldWindow {
            train_start,
            train_end,
            test_year,
        } = window;
        if train_end < train_start {
            return Err(ForecastError::InsufficientData(format!(
                "empty training window {train_start}-{train_end}"
            )));
        }
        if !self.history.has_year(test_year) {
            return Err(ForecastError::InsufficientData(format!("no data for test year {test_year}")));
        }

        let train = self.history.load_years(train_start, train_end)?;
        let test = self.history.load_years(test_year, test_year)?;
        if train.is_empty() {
            return Err(ForecastError::InsufficientData(format!(
                "no training data for {train_start}-{train_end}"
            )));
        }
        if test.is_empty() {
            return Err(ForecastError::InsufficientData(format!("no test data for {test_year}")));
        }
        info!(
            train_start,
            train_end,
            test_year,
            train_size = train.len(),
            test_size = test.len(),
            "fold started"
        );

        let t0 = Instant::now();
        let baseline = self.evaluate_baseline(&train, &test)?;
        let baseline_seconds = t0.elapsed().as_secs_f64();

        let t1 = Instant::now();
        let (candidate, candidate_degraded) = match self.evaluate_candidate(&train, &test) {
            Ok(metrics) => (metrics, false),
            Err(err) => {
                warn!(test_year, error = %err, "candidate failed; using sentinel metrics");
                (ModelMetrics::FAILED, true)
            }
        };
        let candidate_seconds = t1.elapsed().as_secs_f64();

        let fold = ValidationFold {
            train_start,
            train_end,
            test_year,
            train_size: train.len(),
            test_size: test.len(),
            baseline,
            candidate,
            baseline_seconds,
            candidate_seconds,
            candidate_degraded,
        };
        info!(
            test_year,
            baseline_brier = fold.baseline.brier,
            candidate_brier = fold.candidate.brier,
            candidate_wins = fold.candidate_wins(),
            "fold complete"
        );
        Ok(fold)
    }

    /// Predict-then-update per route, seeded from training-window counts.
    fn evaluate_baseline(&self, train: &[FlightRecord], test: &[FlightRecord]) -> Result<ModelMetrics, ForecastError> {
        let counts = RouteCounts::from_records(train);
        let estimator = PriorEstimator::new(&counts);

        // `test` is chronological, so each route's list stays chronological.
        let mut by_route: BTreeMap<RouteKey, Vec<&FlightRecord>> = BTreeMap::new();
        for rec in test {
            by_route.entry(rec.route()).or_default().push(rec);
        }
        let routes: Vec<(RouteKey, Vec<&FlightRecord>)> = by_route.into_iter().collect();

        let per_route: Vec<Vec<Scored>> = routes
            .par_iter()
            .map(|(route, flights)| -> Result<Vec<Scored>, ForecastError> {
                let prior = estimator.estimate(route);
                let mut post = BetaPosterior::from_prior(&prior)
                    .map_err(|e| ForecastError::BaselineFailure(format!("{route}: {e}")))?;
                Ok(flights
                    .iter()
                    .map(|flight| {
                        let scored = Scored {
                            p_late: post.predictive_p_late(),
                            late: flight.late,
                            delay_minutes: flight.dep_delay_minutes,
                        };
                        post.update(flight.observation());
                        scored
                    })
                    .collect())
            })
            .collect::<Result<_, _>>()?;

        let scored: Vec<Scored> = per_route.into_iter().flatten().collect();
        let preds: Vec<f64> = scored.iter().map(|s| s.p_late).collect();
        let labels: Vec<bool> = scored.iter().map(|s| s.late).collect();

        let mut metrics = evaluate(&preds, &labels, self.config.n_bins);
        metrics.threshold_brier = self.threshold_brier(&scored);
        Ok(metrics)
    }

    /// Brier at 30/45/60 minutes over flights that report delay minutes.
    fn threshold_brier(&self, scored: &[Scored]) -> Option<ThresholdBrier> {
        let mut preds = [Vec::new(), Vec::new(), Vec::new()];
        let mut labels = [Vec::new(), Vec::new(), Vec::new()];
        for s in scored {
            let Some(delay) = s.delay_minutes else {
                continue;
            };
            let t = self.curve.predict_threshold_probabilities(s.p_late);
            for (i, (p, minutes)) in [(t.p_late_30, 30.0), (t.p_late_45, 45.0), (t.p_late_60, 60.0)]
                .into_iter()
                .enumerate()
            {
                preds[i].push(p);
                labels[i].push(delay >= minutes);
            }
        }
        if preds[0].is_empty() {
            return None;
        }
        Some(ThresholdBrier {
            brier_30: brier_score(&preds[0], &labels[0]),
            brier_45: brier_score(&preds[1], &labels[1]),
            brier_60: brier_score(&preds[2], &labels[2]),
        })
    }

    /// Fit on the training window, predict the test year in one batch.
    fn evaluate_candidate(&self, train: &[FlightRecord], test: &[FlightRecord]) -> Result<ModelMetrics, ForecastError> {
        let mut model = (self.make_candidate)();
        let diagnostics = model.fit(train)?;
        if !diagnostics.converged {
            warn!(iterations = diagnostics.iterations, "candidate fit did not converge");
        }

        let inputs: Vec<ModelInput> = test.iter().map(ModelInput::from).collect();
        let mut preds = model.predict(&inputs)?;
        let mut labels: Vec<bool> = test.iter().map(|r| r.late).collect();

        if preds.len() != labels.len() {
            warn!(preds = preds.len(), labels = labels.len(), "prediction/label length mismatch; truncating");
            let n = preds.len().min(labels.len());
            preds.truncate(n);
            labels.truncate(n);
        }
        if preds.is_empty() {
            return Err(ForecastError::CollaboratorUnavailable("candidate returned no predictions".into()));
        }
        if preds.iter().any(|p| !p.is_finite()) {
            return Err(ForecastError::CollaboratorUnavailable("candidate returned non-finite predictions".into()));
        }

        Ok(evaluate(&preds, &labels, self.config.n_bins))
    }
}
