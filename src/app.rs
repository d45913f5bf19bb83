//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - initializes logging (stderr, `FDB_LOG`)
//! - loads settings and parses the CLI
//! - dispatches to the command handlers
//! - prints reports to stdout and writes optional exports

use std::io;
use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    BacktestArgs, Cli, Command, ForecastArgs, OutcomeArgs, RegressionArgs, RouteArgs, SynthArgs, TrainArgs,
    ValidateLiveArgs, WalkCvArgs,
};
use crate::config::Settings;
use crate::data::{FlightStatusSource, SyntheticConfig, WeatherSource, generate_history};
use crate::domain::{LiveCheckConfig, LiveRecord, RouteKey, ValidationConfig};
use crate::error::AppError;
use crate::eval::{REGRESSION_EXIT_CODE, check_regression, evaluate_live, run_backtest};
use crate::forecast::ForecastService;
use crate::io::{
    append_live_record, read_live_log, record_outcome, write_delay_curve, write_flights_csv, write_folds_csv,
    write_folds_json, write_forecast_json,
};
use crate::report;

pub mod pipeline;

/// Initialize the global subscriber once. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env("FDB_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// Entry point for the `fdb` binary.
pub fn run() -> Result<(), AppError> {
    let mut settings = Settings::from_env();
    init_tracing();

    let cli = Cli::parse();
    if let Some(data) = cli.data {
        settings.data_path = data;
    }
    if let Some(dir) = cli.models_dir {
        settings.models_dir = dir;
    }

    match cli.command {
        Command::EstimatePrior(args) => handle_estimate_prior(&settings, args),
        Command::Forecast(args) => handle_forecast(&settings, args),
        Command::Backtest(args) => handle_backtest(&settings, args),
        Command::WalkCv(args) => handle_walk_cv(&settings, args),
        Command::BuildDelayCurve(args) => handle_build_delay_curve(&settings, args),
        Command::TrainHier(args) => handle_train_hier(&settings, args),
        Command::TrainFast(args) => handle_train_fast(&settings, args),
        Command::CheckRegression(args) => handle_check_regression(args),
        Command::Synth(args) => handle_synth(args),
        Command::RecordOutcome(args) => handle_record_outcome(&settings, args),
        Command::ValidateLive(args) => handle_validate_live(&settings, args),
    }
}

fn handle_estimate_prior(settings: &Settings, args: RouteArgs) -> Result<(), AppError> {
    let store = pipeline::load_store(&settings.data_path)?;
    let ctx = pipeline::load_context(settings)?;
    let prior = ForecastService::new(&ctx)
        .with_store(&store)
        .estimate_prior(&args.carrier, &args.origin, &args.dest)?;
    let route = RouteKey::new(&args.carrier, &args.origin, &args.dest);
    print!("{}", report::format_prior(&route, &prior));
    Ok(())
}

fn handle_forecast(settings: &Settings, args: ForecastArgs) -> Result<(), AppError> {
    // The forecast can run on live status alone, so a missing history is not fatal.
    let store = match pipeline::load_store(&settings.data_path) {
        Ok(store) => Some(store),
        Err(err) => {
            tracing::warn!(error = %err, "forecasting without historical flights");
            None
        }
    };
    let ctx = pipeline::load_context(settings)?;
    let (status, weather) = if args.offline {
        (None, None)
    } else {
        pipeline::live_sources(settings)
    };

    let mut service = ForecastService::new(&ctx);
    if let Some(store) = &store {
        service = service.with_store(store);
    }
    if let Some(status) = &status {
        service = service.with_status_source(status as &dyn FlightStatusSource);
    }
    if let Some(weather) = &weather {
        service = service.with_weather_source(weather as &dyn WeatherSource);
    }

    let date = args.date.unwrap_or_else(|| Utc::now().date_naive());
    let result = service.forecast(&args.carrier, &args.flight_number, date)?;
    if args.record {
        let record = LiveRecord::from_forecast(&result, date, Utc::now());
        append_live_record(&settings.live_log_path, &record)?;
        info!(flight = %record.flight_id, path = %settings.live_log_path.display(), "forecast recorded");
    }

    if args.json {
        write_forecast_json(io::stdout().lock(), &result)?;
    } else {
        print!("{}", report::format_forecast(&result));
    }
    Ok(())
}

fn handle_backtest(settings: &Settings, args: BacktestArgs) -> Result<(), AppError> {
    let store = pipeline::load_store(&settings.data_path)?;
    let route = RouteKey::new(&args.route.carrier, &args.route.origin, &args.route.dest);
    let backtest = run_backtest(&store, &route, args.year)?;
    print!("{}", report::format_backtest(&backtest));
    Ok(())
}

fn handle_walk_cv(settings: &Settings, args: WalkCvArgs) -> Result<(), AppError> {
    if args.end < args.start {
        return Err(AppError::new(2, format!("--end {} is before --start {}", args.end, args.start)));
    }
    let store = pipeline::load_store(&settings.data_path)?;
    let end = if args.quick { args.start } else { args.end };
    let config = ValidationConfig {
        lookback_years: args.lookback,
        ..ValidationConfig::default()
    };

    let (folds, verdict) = pipeline::walk_forward(&store, settings, args.start, end, config)?;
    print!("{}", report::format_walk_forward(&folds, &verdict));

    if let Some(path) = &args.out {
        write_folds_json(path, &folds)?;
        info!(path = %path.display(), "fold records written");
    }
    if let Some(path) = &args.csv {
        write_folds_csv(path, &folds)?;
    }
    Ok(())
}

fn out_or(out: Option<PathBuf>, default: PathBuf) -> PathBuf {
    out.unwrap_or(default)
}

fn handle_build_delay_curve(settings: &Settings, args: TrainArgs) -> Result<(), AppError> {
    let store = pipeline::load_store(&settings.data_path)?;
    let curve = pipeline::delay_curve(&store, args.start, args.end)?;
    let path = out_or(args.out, settings.delay_curve_path());
    write_delay_curve(&path, &curve)?;
    print!("{}", report::format_delay_curve(&curve));
    println!("Saved to {}", path.display());
    Ok(())
}

fn handle_train_hier(settings: &Settings, args: TrainArgs) -> Result<(), AppError> {
    let store = pipeline::load_store(&settings.data_path)?;
    let path = out_or(args.out, settings.hierarchical_path());
    let diag = pipeline::train_hierarchical(&store, args.start, args.end, &path)?;
    print!("{}", report::format_fit_diagnostics("hierarchical", &diag));
    println!("Saved to {}", path.display());
    Ok(())
}

fn handle_train_fast(settings: &Settings, args: TrainArgs) -> Result<(), AppError> {
    let store = pipeline::load_store(&settings.data_path)?;
    let path = out_or(args.out, settings.classifier_path());
    let clf = pipeline::train_fast(&store, args.start, args.end, &path)?;
    println!(
        "fast classifier: n_train={} features={} converged={}",
        clf.n_train,
        clf.feature_names.len(),
        clf.converged
    );
    println!("Saved to {}", path.display());
    Ok(())
}

fn handle_check_regression(args: RegressionArgs) -> Result<(), AppError> {
    let check = check_regression(&args.results, &args.target)?;
    if check.regressed() {
        return Err(AppError::new(
            REGRESSION_EXIT_CODE,
            format!(
                "Regression: Brier {:.4} exceeds target {:.4}",
                check.actual, check.target
            ),
        ));
    }
    println!("OK: Brier {:.4} within target {:.4}", check.actual, check.target);
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = SyntheticConfig {
        start_year: args.start_year,
        end_year: args.end_year,
        flights_per_year: args.flights_per_year,
        seed: args.seed,
    };
    let records = generate_history(&config)?;
    write_flights_csv(&args.out, &records)?;
    println!("Wrote {} flights to {}", records.len(), args.out.display());
    Ok(())
}

fn handle_record_outcome(settings: &Settings, args: OutcomeArgs) -> Result<(), AppError> {
    let flight_id = LiveRecord::flight_id(&args.carrier, &args.flight_number, args.date);
    let record = record_outcome(&settings.live_log_path, &flight_id, args.late)?;
    println!(
        "{}: p_pred={:.3} marked {}",
        record.flight_id,
        record.p_pred,
        if args.late { "late" } else { "on time" }
    );
    Ok(())
}

fn handle_validate_live(settings: &Settings, args: ValidateLiveArgs) -> Result<(), AppError> {
    let path = args.log.unwrap_or_else(|| settings.live_log_path.clone());
    let Some(records) = read_live_log(&path)? else {
        println!("Live log not found at {}; nothing to validate", path.display());
        return Ok(());
    };

    let config = LiveCheckConfig {
        max_brier: args.threshold,
        lookback_days: args.days,
        min_observations: args.min_obs,
    };
    let check = evaluate_live(&records, Utc::now(), config);
    print!("{}", report::format_live_check(&check));
    if check.degraded() {
        return Err(AppError::new(
            REGRESSION_EXIT_CODE,
            format!(
                "Live Brier {:.4} exceeds threshold {:.2}",
                check.brier.unwrap_or(f64::NAN),
                config.max_brier
            ),
        ));
    }
    Ok(())
}
