//! Command-line parsing for the flight-delay forecaster.
//!
//! Argument parsing and command dispatch are kept apart from the modeling code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "fdb", version, about = "Bayesian flight-delay forecaster")]
pub struct Cli {
    /// Historical flight CSV (overrides FDB_DATA).
    #[arg(long, global = true, value_name = "CSV")]
    pub data: Option<PathBuf>,

    /// Artifact directory (overrides FDB_MODELS_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the Jeffreys-based prior (alpha, beta, n) for a route.
    EstimatePrior(RouteArgs),
    /// Forecast a flight's departure delay.
    Forecast(ForecastArgs),
    /// Replay one route-year with predict-then-update and report calibration.
    Backtest(BacktestArgs),
    /// Expanding-window validation of the hierarchical model against the baseline.
    WalkCv(WalkCvArgs),
    /// Derive the delay-curve parameters from historical delay minutes.
    BuildDelayCurve(TrainArgs),
    /// Fit and save the hierarchical model.
    TrainHier(TrainArgs),
    /// Train and save the fast classifier.
    TrainFast(TrainArgs),
    /// Compare a results file against a Brier target; exit 1 on regression.
    CheckRegression(RegressionArgs),
    /// Write a seeded synthetic flight history as CSV.
    Synth(SynthArgs),
    /// Mark a recorded forecast as late or on time.
    RecordOutcome(OutcomeArgs),
    /// Rolling Brier score of recorded live forecasts; exit 1 when degraded.
    ValidateLive(ValidateLiveArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RouteArgs {
    /// Carrier IATA code (e.g. AA).
    pub carrier: String,
    /// Origin airport IATA code.
    pub origin: String,
    /// Destination airport IATA code.
    pub dest: String,
}

#[derive(Debug, Args, Clone)]
pub struct ForecastArgs {
    pub carrier: String,
    pub flight_number: String,

    /// Flight date (YYYY-MM-DD); defaults to today (UTC).
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,

    /// Skip live status and weather lookups.
    #[arg(long)]
    pub offline: bool,

    /// Append the forecast to the live performance log.
    #[arg(long)]
    pub record: bool,
}

#[derive(Debug, Args, Clone)]
pub struct BacktestArgs {
    #[command(flatten)]
    pub route: RouteArgs,

    /// Year to replay; the prior uses strictly earlier years.
    #[arg(long)]
    pub year: i32,
}

#[derive(Debug, Args, Clone)]
pub struct WalkCvArgs {
    /// First test year.
    #[arg(long, default_value_t = 2019)]
    pub start: i32,

    /// Last test year.
    #[arg(long, default_value_t = 2023)]
    pub end: i32,

    /// Years of training data before each test year.
    #[arg(long, default_value_t = 4)]
    pub lookback: i32,

    /// Run only the first test year.
    #[arg(long)]
    pub quick: bool,

    /// Write fold records as a JSON array.
    #[arg(long, value_name = "JSON")]
    pub out: Option<PathBuf>,

    /// Also write fold records as CSV.
    #[arg(long, value_name = "CSV")]
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct TrainArgs {
    /// First year of training data.
    #[arg(long, default_value_t = 2019)]
    pub start: i32,

    /// Last year of training data.
    #[arg(long, default_value_t = 2023)]
    pub end: i32,

    /// Output path (defaults to the artifact directory).
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct RegressionArgs {
    /// Walk-forward results JSON (array of fold records).
    pub results: PathBuf,
    /// JSON with a `brier_score_target` field.
    pub target: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct OutcomeArgs {
    pub carrier: String,
    pub flight_number: String,

    /// Flight date the forecast was recorded for.
    #[arg(long)]
    pub date: NaiveDate,

    /// The flight departed 15+ minutes late.
    #[arg(long, conflicts_with = "on_time", required_unless_present = "on_time")]
    pub late: bool,

    #[arg(long)]
    pub on_time: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ValidateLiveArgs {
    /// Live log (overrides FDB_LIVE_LOG).
    #[arg(long, value_name = "JSONL")]
    pub log: Option<PathBuf>,

    #[arg(long, default_value_t = 0.18)]
    pub threshold: f64,

    #[arg(long, default_value_t = 7)]
    pub days: i64,

    /// Fewer resolved forecasts than this skips the check.
    #[arg(long, default_value_t = 20)]
    pub min_obs: usize,
}

#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    #[arg(long, value_name = "CSV", default_value = "data/flights.csv")]
    pub out: PathBuf,

    #[arg(long, default_value_t = 2018)]
    pub start_year: i32,

    #[arg(long, default_value_t = 2023)]
    pub end_year: i32,

    #[arg(long, default_value_t = 2000)]
    pub flights_per_year: usize,

    #[arg(long, default_value_t = 7)]
    pub seed: u64,
}
