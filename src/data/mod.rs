//! Data collaborators.
//!
//! - `store`: historical flights loaded from CSV (analytical store)
//! - `aviationstack`: live flight status over HTTP
//! - `metar`: latest surface weather per station
//! - `synthetic`: seeded multi-year flight histories for demos and tests
//!
//! The traits below are the seams the forecasting core consumes, so tests can
//! swap in fakes.

use chrono::NaiveDate;

use crate::domain::{FlightRecord, FlightStatus, WeatherObservation};
use crate::error::ForecastError;

pub mod aviationstack;
pub mod http;
pub mod metar;
pub mod store;
pub mod synthetic;

pub use aviationstack::*;
pub use metar::*;
pub use store::*;
pub use synthetic::*;

/// Year-scoped access to historical flights.
pub trait FlightHistory: Send + Sync {
    /// Flights whose date falls in `[start_year, end_year]`, in date order.
    fn load_years(&self, start_year: i32, end_year: i32) -> Result<Vec<FlightRecord>, ForecastError>;

    fn has_year(&self, year: i32) -> bool;
}

/// Live status of a flight on a given day.
pub trait FlightStatusSource: Send + Sync {
    fn flight_status(
        &self,
        carrier: &str,
        flight_number: &str,
        date: NaiveDate,
    ) -> Result<FlightStatus, ForecastError>;
}

/// Latest weather at an airport (IATA code).
pub trait WeatherSource: Send + Sync {
    fn latest_weather(&self, airport: &str) -> Result<WeatherObservation, ForecastError>;
}
