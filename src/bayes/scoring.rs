//! Route/weather scoring table.
//!
//! A small immutable table of additive adjustments (carrier, airport
//! congestion, hour of day) and multiplicative weather-severity factors. The
//! scoring functions are pure: swapping or recalibrating the table never
//! touches the orchestrator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{RouteKey, WeatherObservation};

/// Additive adjustment for departures in `[start_hour, end_hour]` (inclusive).
///
/// Bands with `start_hour > end_hour` wrap past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourBand {
    pub start_hour: u32,
    pub end_hour: u32,
    pub adjustment: f64,
}

impl HourBand {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..=self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour <= self.end_hour
        }
    }
}

/// Multiplicative weather-severity factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherFactors {
    pub high_wind_kt: f64,
    pub high_wind_multiplier: f64,
    pub precip_mm: f64,
    pub precip_multiplier: f64,
    pub cold_c: f64,
    pub hot_c: f64,
    pub extreme_temp_multiplier: f64,
}

impl Default for WeatherFactors {
    fn default() -> Self {
        Self {
            high_wind_kt: 25.0,
            high_wind_multiplier: 1.25,
            precip_mm: 2.0,
            precip_multiplier: 1.20,
            cold_c: -10.0,
            hot_c: 35.0,
            extreme_temp_multiplier: 1.15,
        }
    }
}

/// Immutable scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringTable {
    /// Late rate assumed when nothing is known about the route.
    pub base_rate: f64,
    pub carrier_adjustments: BTreeMap<String, f64>,
    pub airport_congestion: BTreeMap<String, f64>,
    /// Destination congestion counts at this fraction of origin congestion.
    pub dest_weight: f64,
    pub hour_bands: Vec<HourBand>,
    pub weather: WeatherFactors,
    pub min_probability: f64,
    pub max_probability: f64,
}

impl Default for ScoringTable {
    fn default() -> Self {
        let carrier_adjustments = [
            ("DL", -0.02),
            ("AA", 0.01),
            ("UA", 0.00),
            ("SW", 0.03),
            ("B6", 0.05),
            ("AS", -0.05),
        ];
        let airport_congestion = [
            ("LGA", 0.15),
            ("EWR", 0.12),
            ("JFK", 0.10),
            ("ORD", 0.08),
            ("ATL", 0.06),
            ("DEN", 0.05),
            ("SFO", 0.08),
            ("LAX", 0.07),
        ];
        let band = |start_hour, end_hour, adjustment| HourBand {
            start_hour,
            end_hour,
            adjustment,
        };

        Self {
            base_rate: 0.35,
            carrier_adjustments: carrier_adjustments
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            airport_congestion: airport_congestion
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            dest_weight: 0.5,
            hour_bands: vec![
                band(6, 8, -0.05),
                band(14, 18, 0.08),
                band(19, 22, 0.05),
                band(23, 5, 0.12),
            ],
            weather: WeatherFactors::default(),
            min_probability: 0.05,
            max_probability: 0.85,
        }
    }
}

impl ScoringTable {
    pub fn carrier_adjustment(&self, carrier: &str) -> f64 {
        self.carrier_adjustments.get(carrier).copied().unwrap_or(0.0)
    }

    pub fn congestion(&self, airport: &str) -> f64 {
        self.airport_congestion.get(airport).copied().unwrap_or(0.0)
    }

    /// First matching band wins.
    pub fn hour_adjustment(&self, hour: u32) -> f64 {
        self.hour_bands
            .iter()
            .find(|b| b.contains(hour))
            .map_or(0.0, |b| b.adjustment)
    }

    /// Product of the weather-severity multipliers that apply; `1.0` when calm or unknown.
    pub fn weather_multiplier(&self, weather: Option<&WeatherObservation>) -> f64 {
        let Some(wx) = weather else {
            return 1.0;
        };
        let f = &self.weather;
        let mut m = 1.0;
        if wx.wind_kt.is_some_and(|w| w >= f.high_wind_kt) {
            m *= f.high_wind_multiplier;
        }
        if wx.precip_mm.is_some_and(|p| p >= f.precip_mm) {
            m *= f.precip_multiplier;
        }
        if wx.temp_c.is_some_and(|t| t < f.cold_c || t > f.hot_c) {
            m *= f.extreme_temp_multiplier;
        }
        m
    }

    /// Route-and-weather-informed late probability.
    ///
    /// `base_rate` overrides the table's base rate (e.g. with the route's
    /// historical rate). Result is clamped to `[min_probability, max_probability]`.
    pub fn score(
        &self,
        route: &RouteKey,
        dep_hour: Option<u32>,
        weather: Option<&WeatherObservation>,
        base_rate: Option<f64>,
    ) -> f64 {
        let base = base_rate.filter(|b| b.is_finite()).unwrap_or(self.base_rate);
        let additive = self.congestion(&route.origin)
            + self.dest_weight * self.congestion(&route.dest)
            + dep_hour.map_or(0.0, |h| self.hour_adjustment(h))
            + self.carrier_adjustment(&route.carrier);

        let p = (base + additive) * self.weather_multiplier(weather);
        p.clamp(self.min_probability, self.max_probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_bands_wrap_midnight() {
        let table = ScoringTable::default();
        assert_eq!(table.hour_adjustment(7), -0.05);
        assert_eq!(table.hour_adjustment(16), 0.08);
        assert_eq!(table.hour_adjustment(23), 0.12);
        assert_eq!(table.hour_adjustment(2), 0.12);
        assert_eq!(table.hour_adjustment(11), 0.0);
    }

    #[test]
    fn score_sums_adjustments() {
        let table = ScoringTable::default();
        let route = RouteKey::new("B6", "LGA", "JFK");
        // 0.35 + 0.15 + 0.5*0.10 + 0.08 + 0.05
        let p = table.score(&route, Some(15), None, None);
        assert!((p - 0.68).abs() < 1e-12);
    }

    #[test]
    fn severe_weather_multiplies_and_clamps() {
        let table = ScoringTable::default();
        let wx = WeatherObservation {
            wind_kt: Some(30.0),
            precip_mm: Some(5.0),
            temp_c: Some(-15.0),
            ..WeatherObservation::default()
        };
        let m = table.weather_multiplier(Some(&wx));
        assert!((m - 1.25 * 1.20 * 1.15).abs() < 1e-12);

        let route = RouteKey::new("B6", "LGA", "JFK");
        assert_eq!(table.score(&route, Some(15), Some(&wx), None), 0.85);

        let calm = RouteKey::new("AS", "SEA", "PDX");
        assert_eq!(table.score(&calm, Some(7), None, Some(0.0)), 0.05);
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let table: ScoringTable = serde_json::from_str(r#"{"base_rate": 0.2}"#).unwrap();
        assert_eq!(table.base_rate, 0.2);
        assert_eq!(table.congestion("LGA"), 0.15);
    }
}
