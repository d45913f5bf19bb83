//! Synthetic multi-year flight histories.
//!
//! Each flight's late probability combines a route base rate with hour,
//! weather and a slow year-over-year drift, so both the conjugate baseline
//! (route rates) and the hierarchical model (covariates) have signal to find.

use chrono::{Datelike, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Exp, Normal};

use crate::domain::{FlightRecord, LATE_THRESHOLD_MINUTES};
use crate::error::ForecastError;
use crate::math::{logit, sigmoid};

/// `(carrier, origin, dest, base late rate, relative volume)`
const ROUTES: [(&str, &str, &str, f64, u32); 10] = [
    ("AA", "JFK", "LAX", 0.24, 5),
    ("DL", "ATL", "BOS", 0.16, 4),
    ("UA", "EWR", "SFO", 0.30, 4),
    ("B6", "JFK", "MCO", 0.28, 3),
    ("AS", "SEA", "SFO", 0.12, 3),
    ("WN", "DEN", "PHX", 0.20, 3),
    ("DL", "LGA", "ORD", 0.27, 2),
    ("AA", "DFW", "ORD", 0.22, 2),
    ("UA", "ORD", "DEN", 0.21, 1),
    ("NK", "LAS", "LAX", 0.26, 1),
];

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub start_year: i32,
    pub end_year: i32,
    pub flights_per_year: usize,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            start_year: 2018,
            end_year: 2023,
            flights_per_year: 2_000,
            seed: 7,
        }
    }
}

pub fn generate_history(config: &SyntheticConfig) -> Result<Vec<FlightRecord>, ForecastError> {
    if config.end_year < config.start_year {
        return Err(ForecastError::InvalidParameter(format!(
            "end year {} precedes start year {}",
            config.end_year, config.start_year
        )));
    }
    if config.flights_per_year == 0 {
        return Err(ForecastError::InvalidParameter("flights per year must be > 0".into()));
    }

    let dist_err = |e: String| ForecastError::InvalidParameter(format!("distribution error: {e}"));
    let mut rng = StdRng::seed_from_u64(config.seed);
    let temp_noise = Normal::<f64>::new(0.0, 6.0).map_err(|e| dist_err(e.to_string()))?;
    let wind_noise = Normal::<f64>::new(9.0, 6.0).map_err(|e| dist_err(e.to_string()))?;
    let ontime_delay = Normal::<f64>::new(-2.0, 6.0).map_err(|e| dist_err(e.to_string()))?;
    let late_excess = Exp::new(1.0 / 30.0).map_err(|e| dist_err(e.to_string()))?;

    let total_weight: u32 = ROUTES.iter().map(|r| r.4).sum();
    let mut out = Vec::with_capacity(config.flights_per_year * (config.end_year - config.start_year + 1) as usize);

    for year in config.start_year..=config.end_year {
        let year_start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| ForecastError::InvalidParameter(format!("invalid year {year}")))?;
        let days = if year_start.leap_year() { 366 } else { 365 };
        let drift = 0.03 * f64::from(year - config.start_year);

        for _ in 0..config.flights_per_year {
            let mut pick = rng.gen_range(0..total_weight);
            let (idx, route) = ROUTES
                .iter()
                .enumerate()
                .find(|(_, r)| {
                    if pick < r.4 {
                        true
                    } else {
                        pick -= r.4;
                        false
                    }
                })
                .unwrap_or((0, &ROUTES[0]));
            let (carrier, origin, dest, base, _) = *route;

            let flight_date = year_start + chrono::Days::new(rng.gen_range(0..days));
            let hour: u32 = rng.gen_range(5..24);

            // Seasonal temperature: cold in January, warm in July.
            let season = ((f64::from(flight_date.ordinal()) - 15.0) / 365.0 * std::f64::consts::TAU).cos();
            let temp = 15.0 - 12.0 * season + temp_noise.sample(&mut rng);
            let wind: f64 = wind_noise.sample(&mut rng).max(0.0);
            let precip = if rng.gen_bool(0.15) { rng.gen_range(0.2..8.0) } else { 0.0 };

            let mut eta = logit(base) + drift;
            if (16..=19).contains(&hour) {
                eta += 0.5;
            } else if hour <= 8 {
                eta -= 0.4;
            } else if hour >= 22 {
                eta += 0.3;
            }
            eta += 0.04 * (wind - 9.0).max(0.0) + 0.15 * precip;
            if temp < -5.0 {
                eta += 0.4;
            }
            let late = rng.gen_bool(sigmoid(eta).clamp(0.0, 1.0));

            let delay = if late {
                (LATE_THRESHOLD_MINUTES + late_excess.sample(&mut rng)).min(300.0)
            } else {
                ontime_delay.sample(&mut rng).clamp(-30.0, LATE_THRESHOLD_MINUTES - 1.0)
            };

            out.push(FlightRecord {
                flight_date,
                carrier: carrier.to_string(),
                flight_number: Some(format!("{}", 100 + idx * 11)),
                origin: origin.to_string(),
                dest: dest.to_string(),
                dep_hour: Some(hour),
                dep_delay_minutes: Some(delay.round()),
                late,
                wx_temp_c: Some((temp * 10.0).round() / 10.0),
                wx_wind_kt: Some(wind.round()),
                wx_precip_mm: Some((precip * 10.0).round() / 10.0),
            });
        }
    }

    out.sort_by_key(|r| (r.flight_date, r.dep_hour));
    Ok(out)
}
