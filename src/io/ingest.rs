//! CSV ingest of historical flights.
//!
//! Accepts either the canonical column names (`flight_date`, `carrier`,
//! `origin`, `dest`, ...) or the raw BTS on-time export names (`FL_DATE`,
//! `OP_UNIQUE_CARRIER`, `CRS_DEP_TIME`, `DEP_DEL15`, ...).
//!
//! Behavior:
//! - **Strict schema** for required columns (exit code 2)
//! - **Row-level validation**: bad rows are skipped and reported, never fatal
//! - `late` is taken from the file when present, else derived from
//!   `dep_delay_minutes >= 15`

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;

use crate::domain::{FlightRecord, LATE_THRESHOLD_MINUTES};
use crate::error::AppError;

/// Canonical column name and the aliases it may appear under.
const COLUMNS: &[(&str, &[&str])] = &[
    ("flight_date", &["fl_date", "date"]),
    ("carrier", &["op_unique_carrier", "op_carrier", "airline"]),
    ("flight_number", &["op_carrier_fl_num", "fl_num"]),
    ("origin", &[]),
    ("dest", &["destination"]),
    ("dep_hour", &[]),
    ("crs_dep_time", &[]),
    ("dep_delay_minutes", &["dep_delay"]),
    ("late", &["dep_del15"]),
    ("cancelled", &[]),
    ("wx_temp_c", &[]),
    ("wx_wind_kt", &[]),
    ("wx_precip_mm", &[]),
];

const REQUIRED: [&str; 4] = ["flight_date", "carrier", "origin", "dest"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: parsed flights plus what was skipped.
#[derive(Debug, Clone)]
pub struct IngestedFlights {
    pub records: Vec<FlightRecord>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load a historical-flight CSV file.
pub fn load_flights(path: &Path) -> Result<IngestedFlights, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open flights CSV '{}': {e}", path.display())))?;
    read_flights(file)
}

/// Parse historical flights from any CSV source.
pub fn read_flights<R: Read>(source: R) -> Result<IngestedFlights, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let missing: Vec<&str> = REQUIRED
        .iter()
        .copied()
        .filter(|c| !header_map.contains_key(*c))
        .collect();
    if !missing.is_empty() {
        return Err(AppError::new(
            2,
            format!("Flights CSV is missing required column(s): {}", missing.join(", ")),
        ));
    }
    if !header_map.contains_key("late") && !header_map.contains_key("dep_delay_minutes") {
        return Err(AppError::new(
            2,
            "Flights CSV needs a `late` or `dep_delay_minutes` column.",
        ));
    }

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;

        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, &header_map));
        match parsed {
            Ok(rec) => records.push(rec),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    Ok(IngestedFlights {
        records,
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    let mut map = HashMap::new();
    for (idx, raw) in headers.iter().enumerate() {
        let name = normalize_header_name(raw);
        let canonical = COLUMNS
            .iter()
            .find(|(c, aliases)| *c == name || aliases.contains(&name.as_str()))
            .map(|(c, _)| (*c).to_string())
            .unwrap_or(name);
        // First occurrence wins.
        map.entry(canonical).or_insert(idx);
    }
    map
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase().replace([' ', '-'], "_")
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<FlightRecord, String> {
    let flight_date = parse_date(get_required(record, header_map, "flight_date")?)?;
    let carrier = get_required(record, header_map, "carrier")?.to_ascii_uppercase();
    let origin = get_required(record, header_map, "origin")?.to_ascii_uppercase();
    let dest = get_required(record, header_map, "dest")?.to_ascii_uppercase();

    let dep_hour = match get_optional(record, header_map, "dep_hour") {
        Some(s) => Some(parse_hour(s)?),
        None => match get_optional(record, header_map, "crs_dep_time") {
            Some(s) => Some(parse_hhmm_hour(s)?),
            None => None,
        },
    };

    let dep_delay_minutes = parse_opt_f64(get_optional(record, header_map, "dep_delay_minutes"));
    let cancelled = match get_optional(record, header_map, "cancelled") {
        Some(s) => parse_bool(s)?,
        None => false,
    };

    let flagged = match get_optional(record, header_map, "late") {
        Some(s) => parse_bool(s)?,
        None => match dep_delay_minutes {
            Some(d) => d >= LATE_THRESHOLD_MINUTES,
            None => return Err("Neither `late` nor `dep_delay_minutes` is set".to_string()),
        },
    };
    // Cancelled flights never count as late.
    let late = flagged && !cancelled;

    Ok(FlightRecord {
        flight_date,
        carrier,
        flight_number: get_optional(record, header_map, "flight_number").map(normalize_flight_number),
        origin,
        dest,
        dep_hour,
        dep_delay_minutes,
        late,
        wx_temp_c: parse_opt_f64(get_optional(record, header_map, "wx_temp_c")),
        wx_wind_kt: parse_opt_f64(get_optional(record, header_map, "wx_wind_kt")),
        wx_precip_mm: parse_opt_f64(get_optional(record, header_map, "wx_precip_mm")),
    })
}

fn get_required<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    // BTS exports carry a midnight timestamp after the date.
    let s = s.split_whitespace().next().unwrap_or(s);
    const FMTS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!("Invalid date '{s}'. Expected YYYY-MM-DD, MM/DD/YYYY or YYYY/MM/DD."))
}

fn parse_hour(s: &str) -> Result<u32, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid dep_hour '{s}'"))?;
    if v.fract() != 0.0 || !(0.0..=23.0).contains(&v) {
        return Err(format!("dep_hour out of range: {s}"));
    }
    Ok(v as u32)
}

/// `HHMM` scheduled time to its hour; `2400` is midnight.
fn parse_hhmm_hour(s: &str) -> Result<u32, String> {
    let v: f64 = s.parse().map_err(|_| format!("Invalid crs_dep_time '{s}'"))?;
    if !(0.0..=2400.0).contains(&v) {
        return Err(format!("crs_dep_time out of range: {s}"));
    }
    Ok(((v as u32) / 100) % 24)
}

fn parse_bool(s: &str) -> Result<bool, String> {
    if let Ok(v) = s.parse::<f64>() {
        return if v == 0.0 {
            Ok(false)
        } else if v == 1.0 {
            Ok(true)
        } else {
            Err(format!("Invalid flag '{s}' (expected 0 or 1)"))
        };
    }
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" => Ok(true),
        "false" | "f" | "no" | "n" => Ok(false),
        other => Err(format!("Invalid boolean '{other}'")),
    }
}

fn normalize_flight_number(s: &str) -> String {
    // `1234.0` from float-typed exports.
    s.strip_suffix(".0").unwrap_or(s).to_string()
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let v = s?.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_columns_round_out_late_from_delay() {
        let csv = "\u{feff}flight_date,carrier,flight_number,origin,dest,dep_hour,dep_delay_minutes\n\
                   2023-01-02,aa,100,jfk,lax,7,22\n\
                   2023-01-03,AA,100,JFK,LAX,7,-4\n";
        let out = read_flights(csv.as_bytes()).unwrap();
        assert_eq!(out.rows_read, 2);
        assert!(out.row_errors.is_empty());
        let r = &out.records[0];
        assert_eq!((r.carrier.as_str(), r.origin.as_str()), ("AA", "JFK"));
        assert_eq!(r.dep_hour, Some(7));
        assert!(r.late);
        assert!(!out.records[1].late);
    }

    #[test]
    fn bts_export_names_are_recognized() {
        let csv = "FL_DATE,OP_UNIQUE_CARRIER,OP_CARRIER_FL_NUM,ORIGIN,DEST,CRS_DEP_TIME,DEP_DELAY,DEP_DEL15,CANCELLED\n\
                   1/15/2022 12:00:00 AM,DL,404.0,ATL,BOS,1735,31,1.00,0.00\n\
                   1/16/2022 12:00:00 AM,DL,404.0,ATL,BOS,2400,,1.00,1.00\n";
        let out = read_flights(csv.as_bytes()).unwrap();
        assert!(out.row_errors.is_empty(), "{:?}", out.row_errors);
        assert_eq!(out.records[0].flight_date, NaiveDate::from_ymd_opt(2022, 1, 15).unwrap());
        assert_eq!(out.records[0].dep_hour, Some(17));
        assert_eq!(out.records[0].flight_number.as_deref(), Some("404"));
        assert!(out.records[0].late);
        assert_eq!(out.records[1].dep_hour, Some(0));
        assert!(!out.records[1].late);
    }

    #[test]
    fn bad_rows_are_skipped_and_reported() {
        let csv = "flight_date,carrier,origin,dest,late\n\
                   2023-01-02,UA,ORD,DEN,1\n\
                   not-a-date,UA,ORD,DEN,0\n\
                   2023-01-04,UA,,DEN,0\n\
                   2023-01-05,UA,ORD,DEN,maybe\n";
        let out = read_flights(csv.as_bytes()).unwrap();
        assert_eq!(out.records.len(), 1);
        let lines: Vec<usize> = out.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![3, 4, 5]);
    }

    #[test]
    fn missing_schema_is_fatal() {
        let err = read_flights("flight_date,carrier,origin\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("dest"));

        let err = read_flights("flight_date,carrier,origin,dest\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("late"));
    }
}
