//! Fixed, versioned feature schemas.
//!
//! Both learned collaborators build their design rows here so that training
//! and prediction always agree on column order. Changing a column means
//! bumping the schema version; artifacts written under another version are
//! refused at load time.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{FlightContext, FlightRecord, RouteKey, WeatherObservation};

/// Version of [`HIER_FEATURES`].
pub const HIER_SCHEMA_VERSION: u32 = 1;

/// Fixed-effect columns of the hierarchical model, intercept first.
pub const HIER_FEATURES: [&str; 7] = [
    "intercept",
    "early_morning",
    "evening_rush",
    "late_night",
    "wx_temp_c",
    "wx_wind_kt",
    "wx_precip_mm",
];

/// Version of the classifier layout produced by [`fill_classifier_row`].
pub const CLASSIFIER_SCHEMA_VERSION: u32 = 1;

/// Airports flagged as high-congestion in classifier features.
pub const HIGH_DELAY_AIRPORTS: [&str; 8] = ["LGA", "EWR", "JFK", "ORD", "LAX", "SFO", "ATL", "DFW"];

/// Number of carriers that get their own one-hot column.
pub const TOP_CARRIERS: usize = 6;

/// What a learned model sees about one flight.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub route: RouteKey,
    pub dep_hour: Option<u32>,
    pub weather: WeatherObservation,
}

impl From<&FlightRecord> for ModelInput {
    fn from(rec: &FlightRecord) -> Self {
        Self {
            route: rec.route(),
            dep_hour: rec.dep_hour,
            weather: rec.weather(),
        }
    }
}

impl From<&FlightContext> for ModelInput {
    fn from(ctx: &FlightContext) -> Self {
        Self {
            route: ctx.route.clone(),
            dep_hour: ctx.dep_hour,
            weather: ctx.weather.clone().unwrap_or_default(),
        }
    }
}

/// `[early_morning, evening_rush, late_night]` indicators.
pub fn hour_buckets(hour: Option<u32>) -> [f64; 3] {
    let Some(h) = hour else {
        return [0.0; 3];
    };
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    [flag(h <= 8), flag((16..=19).contains(&h)), flag(h >= 22)]
}

/// Training medians substituted for missing weather covariates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherFill {
    pub temp_c: f64,
    pub wind_kt: f64,
    pub precip_mm: f64,
}

impl Default for WeatherFill {
    fn default() -> Self {
        Self {
            temp_c: 15.0,
            wind_kt: 8.0,
            precip_mm: 0.0,
        }
    }
}

impl WeatherFill {
    pub fn from_records(records: &[FlightRecord]) -> Self {
        let d = Self::default();
        let col = |f: fn(&FlightRecord) -> Option<f64>| {
            let values: Vec<f64> = records.iter().filter_map(f).filter(|v| v.is_finite()).collect();
            median(values)
        };
        Self {
            temp_c: col(|r| r.wx_temp_c).unwrap_or(d.temp_c),
            wind_kt: col(|r| r.wx_wind_kt).unwrap_or(d.wind_kt),
            precip_mm: col(|r| r.wx_precip_mm).unwrap_or(d.precip_mm),
        }
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        0.5 * (values[mid - 1] + values[mid])
    } else {
        values[mid]
    })
}

/// Fill a hierarchical design row (length `HIER_FEATURES.len()`).
///
/// # Panics
/// Panics if `out` is shorter than `HIER_FEATURES.len()`.
pub fn fill_hier_row(input: &ModelInput, fill: &WeatherFill, out: &mut [f64]) {
    let [early, evening, late] = hour_buckets(input.dep_hour);
    let wx = &input.weather;
    let pick = |v: Option<f64>, d: f64| v.filter(|x| x.is_finite()).unwrap_or(d);

    out[0] = 1.0;
    out[1] = early;
    out[2] = evening;
    out[3] = late;
    out[4] = pick(wx.temp_c, fill.temp_c);
    out[5] = pick(wx.wind_kt, fill.wind_kt);
    out[6] = pick(wx.precip_mm, fill.precip_mm);
}

/// Training-derived vocabulary for the classifier columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSchema {
    pub version: u32,
    /// Carriers with a one-hot column, most frequent first.
    pub carriers: Vec<String>,
    /// Routes whose training volume exceeds the median route volume.
    pub high_volume_routes: BTreeSet<String>,
}

impl ClassifierSchema {
    pub fn from_records(records: &[FlightRecord]) -> Self {
        let mut carrier_counts: HashMap<&str, usize> = HashMap::new();
        let mut route_counts: HashMap<String, usize> = HashMap::new();
        for rec in records {
            *carrier_counts.entry(rec.carrier.as_str()).or_default() += 1;
            *route_counts.entry(rec.route().to_string()).or_default() += 1;
        }

        let mut carriers: Vec<(&str, usize)> = carrier_counts.into_iter().collect();
        carriers.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let carriers = carriers
            .into_iter()
            .take(TOP_CARRIERS)
            .map(|(c, _)| c.to_ascii_uppercase())
            .collect();

        let volumes: Vec<f64> = route_counts.values().map(|&c| c as f64).collect();
        let threshold = median(volumes).unwrap_or(0.0);
        let high_volume_routes = route_counts
            .into_iter()
            .filter(|(_, c)| *c as f64 > threshold)
            .map(|(k, _)| k)
            .collect();

        Self {
            version: CLASSIFIER_SCHEMA_VERSION,
            carriers,
            high_volume_routes,
        }
    }

    /// Column count: intercept, 3 hour buckets, carriers, origin/dest flags, volume flag.
    pub fn width(&self) -> usize {
        1 + 3 + self.carriers.len() + 3
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names: Vec<String> = ["intercept", "early_morning", "evening_rush", "late_night"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        names.extend(self.carriers.iter().map(|c| format!("carrier_{c}")));
        names.extend(["origin_high_delay", "dest_high_delay", "high_volume_route"].map(String::from));
        names
    }
}

/// Fill a classifier design row (length `schema.width()`).
///
/// # Panics
/// Panics if `out` is shorter than `schema.width()`.
pub fn fill_classifier_row(schema: &ClassifierSchema, input: &ModelInput, out: &mut [f64]) {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };
    let route = &input.route;

    out[0] = 1.0;
    out[1..4].copy_from_slice(&hour_buckets(input.dep_hour));
    let mut j = 4;
    for carrier in &schema.carriers {
        out[j] = flag(*carrier == route.carrier);
        j += 1;
    }
    out[j] = flag(HIGH_DELAY_AIRPORTS.contains(&route.origin.as_str()));
    out[j + 1] = flag(HIGH_DELAY_AIRPORTS.contains(&route.dest.as_str()));
    out[j + 2] = flag(schema.high_volume_routes.contains(&route.to_string()));
}
