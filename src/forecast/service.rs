//! Request-level forecasting: resolves the flight, gathers live context and
//! turns the winning tier's late probability into a [`ForecastResult`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tracing::{debug, info, warn};

use crate::bayes::{DelayDistributionModel, PriorEstimator, RouteHistory};
use crate::data::{FlightStatusSource, HistoricalStore, WeatherSource};
use crate::domain::{FlightContext, FlightStatus, ForecastResult, PriorEstimate, Provenance, RouteKey};
use crate::error::ForecastError;
use crate::forecast::{ForecastContext, PredictionOrchestrator};

/// One forecast front end over shared, read-only collaborators.
#[derive(Clone, Copy)]
pub struct ForecastService<'a> {
    ctx: &'a ForecastContext,
    store: Option<&'a HistoricalStore>,
    status: Option<&'a dyn FlightStatusSource>,
    weather: Option<&'a dyn WeatherSource>,
}

impl<'a> ForecastService<'a> {
    pub fn new(ctx: &'a ForecastContext) -> Self {
        Self {
            ctx,
            store: None,
            status: None,
            weather: None,
        }
    }

    pub fn with_store(mut self, store: &'a HistoricalStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_status_source(mut self, source: &'a dyn FlightStatusSource) -> Self {
        self.status = Some(source);
        self
    }

    pub fn with_weather_source(mut self, source: &'a dyn WeatherSource) -> Self {
        self.weather = Some(source);
        self
    }

    /// `(alpha, beta, n)` for a route from the historical store.
    pub fn estimate_prior(&self, carrier: &str, origin: &str, dest: &str) -> Result<PriorEstimate, ForecastError> {
        let route = RouteKey::new(carrier, origin, dest);
        validate_route(&route)?;
        Ok(self.prior_estimator().estimate(&route))
    }

    pub fn forecast(&self, carrier: &str, flight_number: &str, date: NaiveDate) -> Result<ForecastResult, ForecastError> {
        let carrier = carrier.trim().to_ascii_uppercase();
        let flight_number = flight_number.trim().to_string();
        validate_flight(&carrier, &flight_number)?;

        let status = self.fetch_status(&carrier, &flight_number, date);
        let (route, dep_hour, scheduled) = self.resolve(&carrier, &flight_number, date, status.as_ref())?;
        let weather = self.fetch_weather(&route.origin);

        let flight = FlightContext {
            route,
            date,
            dep_hour,
            weather,
            live_observation: status.as_ref().and_then(FlightStatus::live_observation),
        };

        let history = self.store.map(|s| s as &dyn RouteHistory);
        let decision = PredictionOrchestrator::new(self.ctx, history).estimate(&flight)?;
        let est = decision.estimate;

        let curve = &self.ctx.curve;
        let expected = curve.predict_delay(est.p_late);
        let thresholds = curve.predict_threshold_probabilities(est.p_late);
        let predicted = scheduled.map(|s| DelayDistributionModel::predicted_departure(s, expected));

        info!(
            route = %flight.route,
            provenance = %est.provenance,
            p_late = est.p_late,
            latency_ms = decision.latency_ms,
            "forecast"
        );

        // Tier 1's seeded pseudo-posterior is internal to that tier.
        let baseline_posterior = est.posterior.filter(|_| est.provenance == Provenance::Baseline);
        let aircraft = status.map(|s| s.aircraft).unwrap_or_default();
        let wx = flight.weather.unwrap_or_default();
        Ok(ForecastResult {
            carrier,
            flight_number,
            origin: flight.route.origin,
            dest: flight.route.dest,
            scheduled_departure: scheduled,
            predicted_departure: predicted,
            p_late_15: thresholds.p_late_15,
            p_late_30: thresholds.p_late_30,
            p_late_45: thresholds.p_late_45,
            p_late_60: thresholds.p_late_60,
            expected_delay_minutes: expected,
            alpha: baseline_posterior.map(|p| p.alpha()),
            beta: baseline_posterior.map(|p| p.beta()),
            provenance: est.provenance,
            updated: est.updated,
            update_latency_ms: decision.latency_ms,
            wx_temp_c: wx.temp_c,
            wx_wind_kt: wx.wind_kt,
            wx_precip_mm: wx.precip_mm,
            wx_conditions: wx.conditions,
            wx_valid_time: wx.valid_time,
            tail_number: aircraft.tail_number,
            aircraft_age_yrs: aircraft.age_years,
        })
    }

    fn prior_estimator(&self) -> PriorEstimator<'a> {
        match self.store {
            Some(store) => PriorEstimator::new(store),
            None => PriorEstimator::without_history(),
        }
    }

    fn fetch_status(&self, carrier: &str, flight_number: &str, date: NaiveDate) -> Option<FlightStatus> {
        let source = self.status?;
        match source.flight_status(carrier, flight_number, date) {
            Ok(status) => Some(status),
            Err(err) => {
                warn!(%carrier, %flight_number, error = %err, "live status unavailable");
                None
            }
        }
    }

    fn fetch_weather(&self, airport: &str) -> Option<crate::domain::WeatherObservation> {
        let source = self.weather?;
        match source.latest_weather(airport) {
            Ok(wx) => Some(wx),
            Err(err) => {
                debug!(%airport, error = %err, "weather omitted");
                None
            }
        }
    }

    /// Route, departure hour and scheduled departure.
    ///
    /// Live status wins; otherwise the most recent route flown under this
    /// flight number in the store.
    fn resolve(
        &self,
        carrier: &str,
        flight_number: &str,
        date: NaiveDate,
        status: Option<&FlightStatus>,
    ) -> Result<(RouteKey, Option<u32>, Option<NaiveDateTime>), ForecastError> {
        if let Some(s) = status {
            if let (Some(origin), Some(dest)) = (s.origin.as_deref(), s.dest.as_deref()) {
                let scheduled = s.scheduled_departure;
                return Ok((RouteKey::new(carrier, origin, dest), scheduled.map(|t| t.hour()), scheduled));
            }
        }

        let known = self.store.and_then(|store| store.latest_route_for_flight(carrier, flight_number));
        match known {
            Some((route, hour)) => {
                let scheduled = hour
                    .and_then(|h| NaiveTime::from_hms_opt(h, 0, 0))
                    .map(|t| date.and_time(t));
                Ok((route, hour, scheduled))
            }
            None => Err(ForecastError::CollaboratorUnavailable(format!(
                "cannot resolve a route for {carrier}{flight_number}"
            ))),
        }
    }
}

fn is_code(s: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphanumeric())
}

fn validate_route(route: &RouteKey) -> Result<(), ForecastError> {
    if !is_code(&route.carrier, 2, 3) {
        return Err(ForecastError::InvalidParameter(format!("bad carrier code '{}'", route.carrier)));
    }
    for airport in [&route.origin, &route.dest] {
        if !is_code(airport, 3, 4) {
            return Err(ForecastError::InvalidParameter(format!("bad airport code '{airport}'")));
        }
    }
    Ok(())
}

fn validate_flight(carrier: &str, flight_number: &str) -> Result<(), ForecastError> {
    if !is_code(carrier, 2, 3) {
        return Err(ForecastError::InvalidParameter(format!("bad carrier code '{carrier}'")));
    }
    if flight_number.is_empty() || flight_number.len() > 5 || !flight_number.chars().all(|c| c.is_ascii_digit()) {
        return Err(ForecastError::InvalidParameter(format!("bad flight number '{flight_number}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::{AircraftInfo, FlightRecord, WeatherObservation};
    use crate::models::PartialPoolingModel;

    struct Status(Result<FlightStatus, ForecastError>);

    impl FlightStatusSource for Status {
        fn flight_status(&self, _c: &str, _n: &str, _d: NaiveDate) -> Result<FlightStatus, ForecastError> {
            self.0.clone()
        }
    }

    struct Weather(Result<WeatherObservation, ForecastError>);

    impl WeatherSource for Weather {
        fn latest_weather(&self, _airport: &str) -> Result<WeatherObservation, ForecastError> {
            self.0.clone()
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn record(day: u32, late: bool) -> FlightRecord {
        FlightRecord {
            flight_date: NaiveDate::from_ymd_opt(2023, 5, day).unwrap(),
            carrier: "DL".into(),
            flight_number: Some("404".into()),
            origin: "ATL".into(),
            dest: "BOS".into(),
            dep_hour: Some(17),
            dep_delay_minutes: None,
            late,
            wx_temp_c: None,
            wx_wind_kt: None,
            wx_precip_mm: None,
        }
    }

    #[test]
    fn live_status_drives_route_and_update() {
        let ctx = ForecastContext::default();
        let scheduled = day().and_hms_opt(8, 30, 0).unwrap();
        let status = Status(Ok(FlightStatus {
            origin: Some("ORD".into()),
            dest: Some("DEN".into()),
            scheduled_departure: Some(scheduled),
            status: Some("active".into()),
            delay_minutes: Some(45.0),
            aircraft: AircraftInfo {
                tail_number: Some("N123UA".into()),
                age_years: None,
            },
        }));
        let wx = Weather(Ok(WeatherObservation {
            temp_c: Some(3.0),
            ..WeatherObservation::default()
        }));

        let res = ForecastService::new(&ctx)
            .with_status_source(&status)
            .with_weather_source(&wx)
            .forecast("ua", "1234", day())
            .unwrap();

        assert_eq!((res.origin.as_str(), res.dest.as_str()), ("ORD", "DEN"));
        assert_eq!(res.provenance, Provenance::Baseline);
        assert!(res.updated);
        assert_eq!((res.alpha, res.beta), (Some(1.5), Some(0.5)));
        assert_eq!(res.p_late_15, 0.75);
        assert!(res.predicted_departure.unwrap() >= scheduled);
        assert_eq!(res.wx_temp_c, Some(3.0));
        assert_eq!(res.tail_number.as_deref(), Some("N123UA"));
    }

    #[test]
    fn hierarchical_fast_path_reports_no_posterior() {
        let ctx = ForecastContext::default().with_hierarchical(Arc::new(PartialPoolingModel::new()));
        let status = Status(Ok(FlightStatus {
            origin: Some("ORD".into()),
            dest: Some("DEN".into()),
            scheduled_departure: Some(day().and_hms_opt(12, 0, 0).unwrap()),
            status: Some("landed".into()),
            delay_minutes: Some(20.0),
            aircraft: AircraftInfo::default(),
        }));

        let res = ForecastService::new(&ctx)
            .with_status_source(&status)
            .forecast("UA", "1234", day())
            .unwrap();

        assert_eq!(res.provenance, Provenance::Hierarchical);
        assert!(res.updated);
        assert_eq!((res.alpha, res.beta), (None, None));
    }

    #[test]
    fn store_resolves_route_when_status_fails() {
        let store = HistoricalStore::from_records(vec![record(1, true), record(2, false)]);
        let ctx = ForecastContext::default();
        let status = Status(Err(ForecastError::CollaboratorUnavailable("timeout".into())));
        let wx = Weather(Err(ForecastError::CollaboratorUnavailable("no metar".into())));

        let res = ForecastService::new(&ctx)
            .with_store(&store)
            .with_status_source(&status)
            .with_weather_source(&wx)
            .forecast("DL", "404", day())
            .unwrap();

        assert_eq!(res.dest, "BOS");
        assert_eq!(res.scheduled_departure, day().and_hms_opt(17, 0, 0));
        assert!(!res.updated);
        // Beta(1.5, 1.5)
        assert_eq!(res.p_late_15, 0.5);
        assert_eq!(res.wx_temp_c, None);
    }

    #[test]
    fn unknown_flight_is_unavailable() {
        let ctx = ForecastContext::default();
        let err = ForecastService::new(&ctx).forecast("DL", "9", day()).unwrap_err();
        assert!(matches!(err, ForecastError::CollaboratorUnavailable(_)));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let ctx = ForecastContext::default();
        let svc = ForecastService::new(&ctx);
        assert!(matches!(svc.forecast("D", "1", day()), Err(ForecastError::InvalidParameter(_))));
        assert!(matches!(svc.forecast("DL", "12a", day()), Err(ForecastError::InvalidParameter(_))));
        assert!(matches!(svc.estimate_prior("DL", "ATL", "B"), Err(ForecastError::InvalidParameter(_))));
    }

    #[test]
    fn prior_counts_route_history() {
        let store = HistoricalStore::from_records(vec![record(1, true), record(2, false), record(3, false)]);
        let ctx = ForecastContext::default();
        let prior = ForecastService::new(&ctx).with_store(&store).estimate_prior("dl", "atl", "bos").unwrap();
        assert_eq!((prior.alpha, prior.beta, prior.n), (1.5, 2.5, 3));

        let cold = ForecastService::new(&ctx).estimate_prior("DL", "ATL", "BOS").unwrap();
        assert_eq!(cold, PriorEstimate::JEFFREYS);
    }
}
