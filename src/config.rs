//! Process settings read once at startup.
//!
//! `.env` is loaded first (if present); real environment variables win.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_DATA_PATH: &str = "data/flights.csv";
pub const DEFAULT_MODELS_DIR: &str = "models";
pub const DEFAULT_LIVE_LOG: &str = "data/live_perf.jsonl";

pub const HIERARCHICAL_ARTIFACT: &str = "hierarchical.json";
pub const CLASSIFIER_ARTIFACT: &str = "fast_classifier.json";
pub const DELAY_CURVE_ARTIFACT: &str = "delay_curve.json";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Historical flight CSV (`FDB_DATA`).
    pub data_path: PathBuf,
    /// Artifact directory (`FDB_MODELS_DIR`).
    pub models_dir: PathBuf,
    /// Aviationstack key; `None` disables live status.
    pub aviationstack_key: Option<String>,
    /// `FDB_METAR=0` disables live weather.
    pub metar_enabled: bool,
    /// Optional scoring-table override (`FDB_SCORING`).
    pub scoring_path: Option<PathBuf>,
    /// Served forecasts and their outcomes (`FDB_LIVE_LOG`).
    pub live_log_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            aviationstack_key: None,
            metar_enabled: true,
            scoring_path: None,
            live_log_path: PathBuf::from(DEFAULT_LIVE_LOG),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        Self {
            data_path: get("FDB_DATA").map(PathBuf::from).unwrap_or(defaults.data_path),
            models_dir: get("FDB_MODELS_DIR").map(PathBuf::from).unwrap_or(defaults.models_dir),
            aviationstack_key: get("AVIATIONSTACK_KEY"),
            metar_enabled: get("FDB_METAR").is_none_or(|v| !matches!(v.as_str(), "0" | "false" | "off")),
            scoring_path: get("FDB_SCORING").map(PathBuf::from),
            live_log_path: get("FDB_LIVE_LOG").map(PathBuf::from).unwrap_or(defaults.live_log_path),
        }
    }

    pub fn hierarchical_path(&self) -> PathBuf {
        self.models_dir.join(HIERARCHICAL_ARTIFACT)
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.models_dir.join(CLASSIFIER_ARTIFACT)
    }

    pub fn delay_curve_path(&self) -> PathBuf {
        self.models_dir.join(DELAY_CURVE_ARTIFACT)
    }
}
