//! In-memory historical flight store.
//!
//! Records are kept sorted by `(flight_date, dep_hour)` so that a year window is
//! a contiguous slice and per-route iteration is chronological.

use std::collections::{BTreeSet, HashMap};

use chrono::Datelike;

use crate::bayes::RouteHistory;
use crate::data::FlightHistory;
use crate::domain::{FlightRecord, RouteKey};
use crate::error::ForecastError;

#[derive(Debug, Clone, Default)]
pub struct HistoricalStore {
    records: Vec<FlightRecord>,
    counts: HashMap<RouteKey, (u64, u64)>,
}

impl HistoricalStore {
    pub fn from_records(mut records: Vec<FlightRecord>) -> Self {
        records.sort_by_key(|r| (r.flight_date, r.dep_hour));
        let mut counts: HashMap<RouteKey, (u64, u64)> = HashMap::new();
        for rec in &records {
            let e = counts.entry(rec.route()).or_insert((0, 0));
            e.0 += 1;
            e.1 += u64::from(rec.late);
        }
        Self { records, counts }
    }

    pub fn records(&self) -> &[FlightRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn years(&self) -> BTreeSet<i32> {
        self.records.iter().map(|r| r.flight_date.year()).collect()
    }

    /// Contiguous slice of flights in `[start_year, end_year]`.
    pub fn window(&self, start_year: i32, end_year: i32) -> &[FlightRecord] {
        if end_year < start_year {
            return &[];
        }
        let lo = self.records.partition_point(|r| r.flight_date.year() < start_year);
        let hi = self.records.partition_point(|r| r.flight_date.year() <= end_year);
        &self.records[lo..hi.max(lo)]
    }

    /// One route's flights in a year, in chronological order.
    pub fn route_year(&self, route: &RouteKey, year: i32) -> Vec<&FlightRecord> {
        self.window(year, year).iter().filter(|r| r.route() == *route).collect()
    }

    /// Most recent route flown under `carrier` + `flight_number`, with its departure hour.
    pub fn latest_route_for_flight(&self, carrier: &str, flight_number: &str) -> Option<(RouteKey, Option<u32>)> {
        let carrier = carrier.trim().to_ascii_uppercase();
        let number = flight_number.trim();
        self.records
            .iter()
            .rev()
            .find(|r| {
                r.carrier.eq_ignore_ascii_case(&carrier) && r.flight_number.as_deref().map(str::trim) == Some(number)
            })
            .map(|r| (r.route(), r.dep_hour))
    }
}

impl RouteHistory for HistoricalStore {
    fn route_counts(&self, route: &RouteKey) -> Result<(u64, u64), ForecastError> {
        Ok(self.counts.get(route).copied().unwrap_or((0, 0)))
    }
}

impl FlightHistory for HistoricalStore {
    fn load_years(&self, start_year: i32, end_year: i32) -> Result<Vec<FlightRecord>, ForecastError> {
        Ok(self.window(start_year, end_year).to_vec())
    }

    fn has_year(&self, year: i32) -> bool {
        !self.window(year, year).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rec(y: i32, m: u32, number: &str, dest: &str, late: bool) -> FlightRecord {
        FlightRecord {
            flight_date: NaiveDate::from_ymd_opt(y, m, 1).unwrap(),
            carrier: "DL".into(),
            flight_number: Some(number.into()),
            origin: "ATL".into(),
            dest: dest.into(),
            dep_hour: Some(9),
            dep_delay_minutes: None,
            late,
            wx_temp_c: None,
            wx_wind_kt: None,
            wx_precip_mm: None,
        }
    }

    fn store() -> HistoricalStore {
        HistoricalStore::from_records(vec![
            rec(2021, 5, "202", "BOS", true),
            rec(2019, 1, "202", "MCO", false),
            rec(2021, 1, "202", "BOS", false),
            rec(2022, 3, "7", "LAX", true),
        ])
    }

    #[test]
    fn windows_are_year_scoped() {
        let s = store();
        assert_eq!(s.window(2020, 2021).len(), 2);
        assert_eq!(s.window(2019, 2022).len(), 4);
        assert!(s.window(2021, 2020).is_empty());
        assert!(s.has_year(2019));
        assert!(!s.has_year(2020));
        assert_eq!(s.years().into_iter().collect::<Vec<_>>(), vec![2019, 2021, 2022]);
    }

    #[test]
    fn route_counts_and_latest_route() {
        let s = store();
        let bos = RouteKey::new("DL", "ATL", "BOS");
        assert_eq!(s.route_counts(&bos).unwrap(), (2, 1));
        assert_eq!(s.latest_route_for_flight("dl", "202").unwrap().0, bos);
        assert!(s.latest_route_for_flight("DL", "999").is_none());
        assert_eq!(s.route_year(&bos, 2021).len(), 2);
    }
}
