//! Aviationstack flight-status integration.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::data::http::{build_client, check_status, RetryPolicy};
use crate::data::FlightStatusSource;
use crate::domain::{AircraftInfo, FlightStatus};
use crate::error::ForecastError;

const BASE_URL: &str = "https://api.aviationstack.com/v1/flights";

pub struct AviationstackClient {
    client: Client,
    api_key: String,
    retry: RetryPolicy,
}

impl AviationstackClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ForecastError> {
        Ok(Self {
            client: build_client().map_err(ForecastError::CollaboratorUnavailable)?,
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_env() -> Result<Self, ForecastError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("AVIATIONSTACK_KEY").map_err(|_| {
            ForecastError::CollaboratorUnavailable("missing AVIATIONSTACK_KEY in environment (.env)".into())
        })?;
        Self::new(api_key)
    }

    fn fetch(&self, carrier: &str, flight_number: &str, date: NaiveDate) -> Result<FlightsResponse, String> {
        let date = date.to_string();
        self.retry.run(|| {
            let resp = self
                .client
                .get(BASE_URL)
                .query(&[
                    ("access_key", self.api_key.as_str()),
                    ("flight_date", date.as_str()),
                    ("airline_iata", carrier),
                    ("flight_number", flight_number),
                ])
                .send()
                .map_err(|e| e.to_string())?;
            check_status(resp)?
                .json::<FlightsResponse>()
                .map_err(|e| format!("failed to parse response: {e}"))
        })
    }
}

impl FlightStatusSource for AviationstackClient {
    fn flight_status(
        &self,
        carrier: &str,
        flight_number: &str,
        date: NaiveDate,
    ) -> Result<FlightStatus, ForecastError> {
        let body = self.fetch(carrier, flight_number, date).map_err(|e| {
            ForecastError::CollaboratorUnavailable(format!("Aviationstack request failed: {e}"))
        })?;
        let status = status_from_response(body).ok_or_else(|| {
            ForecastError::CollaboratorUnavailable(format!(
                "no flight data for {carrier}{flight_number} on {date}"
            ))
        })?;
        debug!(carrier, flight_number, status = ?status.status, "flight status fetched");
        Ok(status)
    }
}

#[derive(Debug, Deserialize)]
pub struct FlightsResponse {
    #[serde(default)]
    data: Vec<FlightEntry>,
}

#[derive(Debug, Deserialize)]
struct FlightEntry {
    flight_status: Option<String>,
    departure: Option<Endpoint>,
    arrival: Option<Endpoint>,
    aircraft: Option<Aircraft>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    iata: Option<String>,
    scheduled: Option<String>,
    delay: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Aircraft {
    registration: Option<String>,
}

/// First matching flight, or `None` when the feed has no data.
pub fn status_from_response(body: FlightsResponse) -> Option<FlightStatus> {
    let entry = body.data.into_iter().next()?;
    let (origin, scheduled, delay) = match entry.departure {
        Some(d) => (d.iata, d.scheduled, d.delay),
        None => (None, None, None),
    };

    Some(FlightStatus {
        origin,
        dest: entry.arrival.and_then(|a| a.iata),
        scheduled_departure: scheduled.as_deref().and_then(parse_timestamp),
        status: entry.flight_status,
        delay_minutes: delay,
        aircraft: AircraftInfo {
            tail_number: entry.aircraft.and_then(|a| a.registration),
            age_years: None,
        },
    })
}

/// Feed timestamps carry an offset; keep the local wall-clock time.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.naive_local())
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_flight() {
        let json = r#"{
            "data": [{
                "flight_status": "active",
                "departure": {"iata": "JFK", "scheduled": "2024-03-01T08:30:00+00:00", "delay": 22},
                "arrival": {"iata": "LAX"},
                "aircraft": {"registration": "N123AA"}
            }]
        }"#;
        let body: FlightsResponse = serde_json::from_str(json).unwrap();
        let status = status_from_response(body).unwrap();

        assert_eq!(status.origin.as_deref(), Some("JFK"));
        assert_eq!(status.dest.as_deref(), Some("LAX"));
        assert_eq!(status.delay_minutes, Some(22.0));
        assert_eq!(status.aircraft.tail_number.as_deref(), Some("N123AA"));
        let sched = status.scheduled_departure.unwrap();
        assert_eq!(sched.to_string(), "2024-03-01 08:30:00");
        assert!(status.live_observation().unwrap().is_late());
    }

    #[test]
    fn empty_feed_yields_none() {
        let body: FlightsResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(status_from_response(body).is_none());
        let body: FlightsResponse = serde_json::from_str(r#"{"error": {"code": 101}}"#).unwrap();
        assert!(status_from_response(body).is_none());
    }
}
