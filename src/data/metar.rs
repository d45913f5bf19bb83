//! Latest METAR observation per station (NOAA text feed).
//!
//! The feed is two lines:
//!
//! ```text
//! 2024/03/01 12:51
//! KJFK 011251Z 24015G25KT 10SM -RA BKN020 M02/M07 A2992 RMK AO2 P0012
//! ```
//!
//! Only the fields the forecast uses are parsed: temperature, wind speed,
//! hourly precipitation (`Pxxxx` remark, hundredths of an inch), present
//! weather codes and the observation time.

use chrono::{NaiveDateTime, TimeZone, Utc};
use reqwest::blocking::Client;
use tracing::debug;

use crate::data::http::{build_client, check_status, RetryPolicy};
use crate::data::WeatherSource;
use crate::domain::WeatherObservation;
use crate::error::ForecastError;

const FEED_URL: &str = "https://tgftp.nws.noaa.gov/data/observations/metar/stations";
const MM_PER_INCH: f64 = 25.4;

/// Present-weather phenomena recognized in the body of a report.
const WX_CODES: [&str; 12] = ["TS", "RA", "SN", "DZ", "FG", "BR", "HZ", "SH", "FZ", "PL", "GR", "UP"];

pub struct MetarClient {
    client: Client,
    retry: RetryPolicy,
}

impl MetarClient {
    pub fn new() -> Result<Self, ForecastError> {
        Ok(Self {
            client: build_client().map_err(ForecastError::CollaboratorUnavailable)?,
            retry: RetryPolicy::default(),
        })
    }

    fn fetch_text(&self, icao: &str) -> Result<String, String> {
        let url = format!("{FEED_URL}/{icao}.TXT");
        self.retry.run(|| {
            let resp = self.client.get(&url).send().map_err(|e| e.to_string())?;
            check_status(resp)?.text().map_err(|e| e.to_string())
        })
    }
}

impl WeatherSource for MetarClient {
    fn latest_weather(&self, airport: &str) -> Result<WeatherObservation, ForecastError> {
        let icao = icao_for(airport);
        let text = self
            .fetch_text(&icao)
            .map_err(|e| ForecastError::CollaboratorUnavailable(format!("METAR {icao}: {e}")))?;
        let wx = parse_metar(&text)?;
        debug!(%icao, temp_c = ?wx.temp_c, wind_kt = ?wx.wind_kt, "METAR fetched");
        Ok(wx)
    }
}

/// US IATA codes map to ICAO by a `K` prefix; 4-letter codes pass through.
pub fn icao_for(airport: &str) -> String {
    let code = airport.trim().to_ascii_uppercase();
    if code.len() == 3 { format!("K{code}") } else { code }
}

/// Parse the two-line feed into a weather observation.
pub fn parse_metar(text: &str) -> Result<WeatherObservation, ForecastError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let (Some(time_line), Some(report)) = (lines.next(), lines.next()) else {
        return Err(ForecastError::CollaboratorUnavailable("unexpected METAR format".into()));
    };

    let valid_time = NaiveDateTime::parse_from_str(time_line, "%Y/%m/%d %H:%M")
        .map(|dt| Utc.from_utc_datetime(&dt))
        .map_err(|e| ForecastError::CollaboratorUnavailable(format!("invalid METAR time '{time_line}': {e}")))?;

    let mut wx = WeatherObservation {
        valid_time: Some(valid_time),
        ..WeatherObservation::default()
    };
    let mut codes: Vec<&str> = Vec::new();
    let mut in_remarks = false;

    for tok in report.split_whitespace() {
        if tok == "RMK" {
            in_remarks = true;
            continue;
        }
        if in_remarks {
            if let Some(mm) = parse_precip(tok) {
                wx.precip_mm = Some(mm);
            }
            continue;
        }
        if let Some(kt) = parse_wind(tok) {
            wx.wind_kt = Some(kt);
        } else if let Some(t) = parse_temperature(tok) {
            wx.temp_c = Some(t);
        } else if is_weather_code(tok) {
            codes.push(tok);
        }
    }

    if !codes.is_empty() {
        wx.conditions = Some(codes.join(" "));
    }
    Ok(wx)
}

/// `24015KT`, `24015G25KT`, `VRB03KT` → sustained speed in knots.
fn parse_wind(tok: &str) -> Option<f64> {
    let body = tok.strip_suffix("KT")?;
    if body.len() < 5 {
        return None;
    }
    let speed = body.get(3..)?.split('G').next()?;
    speed.parse::<u32>().ok().map(f64::from)
}

/// `M05/M10`, `12/08`, `12/` → temperature in °C.
fn parse_temperature(tok: &str) -> Option<f64> {
    let (temp, _dew) = tok.split_once('/')?;
    let (sign, digits) = match temp.strip_prefix('M') {
        Some(rest) => (-1.0, rest),
        None => (1.0, temp),
    };
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<f64>().ok().map(|v| sign * v)
}

/// `P0012` → 0.12 in → mm.
fn parse_precip(tok: &str) -> Option<f64> {
    let digits = tok.strip_prefix('P')?;
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hundredths: f64 = digits.parse().ok()?;
    Some(hundredths / 100.0 * MM_PER_INCH)
}

fn is_weather_code(tok: &str) -> bool {
    let core = tok.trim_start_matches(['+', '-']).trim_start_matches("VC");
    !core.is_empty()
        && core.len() % 2 == 0
        && core
            .as_bytes()
            .chunks(2)
            .all(|pair| std::str::from_utf8(pair).is_ok_and(|p| WX_CODES.contains(&p)))
}
