//! Shared workflows behind the CLI commands.
//!
//! Each function loads what it needs, runs the core, and hands back results;
//! printing stays in `app`.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::bayes::{DelayCurveFile, build_delay_curve};
use crate::config::Settings;
use crate::data::{AviationstackClient, FlightHistory, HistoricalStore, MetarClient};
use crate::domain::{AcceptanceVerdict, ValidationConfig, ValidationFold};
use crate::error::{AppError, ForecastError};
use crate::eval::{WalkForwardValidator, acceptance_verdict};
use crate::forecast::ForecastContext;
use crate::io::{load_delay_model, load_flights, read_scoring_table};
use crate::models::{DelayModel, FitDiagnostics, LogisticClassifier, PartialPoolingModel};

/// How many row errors to echo before summarizing.
const ROW_ERRORS_SHOWN: usize = 5;

/// Load the historical store from the configured CSV.
pub fn load_store(path: &Path) -> Result<HistoricalStore, AppError> {
    let ingested = load_flights(path)?;
    for e in ingested.row_errors.iter().take(ROW_ERRORS_SHOWN) {
        warn!(line = e.line, message = %e.message, "skipped row");
    }
    if !ingested.row_errors.is_empty() {
        warn!(
            skipped = ingested.row_errors.len(),
            read = ingested.rows_read,
            "some rows were skipped"
        );
    }
    info!(path = %path.display(), flights = ingested.records.len(), "historical flights loaded");
    Ok(HistoricalStore::from_records(ingested.records))
}

/// Build the shared forecast context from whatever artifacts are present.
///
/// Missing or broken artifacts disable their tier; they never fail startup.
pub fn load_context(settings: &Settings) -> Result<ForecastContext, AppError> {
    let scoring = read_scoring_table(settings.scoring_path.as_deref())?;
    let mut ctx = ForecastContext::new(load_delay_model(&settings.delay_curve_path())).with_scoring(scoring);

    let hier_path = settings.hierarchical_path();
    match PartialPoolingModel::load(&hier_path) {
        Ok(mut model) => {
            model.pseudo_n = ctx.config.fast_update_pseudo_n;
            if !model.can_predict() {
                warn!(path = %hier_path.display(), "hierarchical trace missing; prediction disabled");
            }
            ctx = ctx.with_hierarchical(Arc::new(model));
        }
        Err(err) => warn!(path = %hier_path.display(), error = %err, "hierarchical model unavailable"),
    }

    let clf_path = settings.classifier_path();
    match LogisticClassifier::load(&clf_path) {
        Ok(clf) => ctx = ctx.with_classifier(Arc::new(clf)),
        Err(err) => warn!(path = %clf_path.display(), error = %err, "fast classifier unavailable"),
    }

    Ok(ctx)
}

/// Live collaborators per settings; a client that cannot be built is left out.
pub fn live_sources(settings: &Settings) -> (Option<AviationstackClient>, Option<MetarClient>) {
    let status = settings.aviationstack_key.as_ref().and_then(|key| {
        AviationstackClient::new(key.clone())
            .inspect_err(|err| warn!(error = %err, "live status disabled"))
            .ok()
    });
    let weather = settings.metar_enabled.then(MetarClient::new).and_then(|r| {
        r.inspect_err(|err| warn!(error = %err, "live weather disabled"))
            .ok()
    });
    (status, weather)
}

fn training_window(store: &HistoricalStore, start: i32, end: i32) -> Result<Vec<crate::domain::FlightRecord>, ForecastError> {
    let records = store.load_years(start, end)?;
    if records.is_empty() {
        return Err(ForecastError::InsufficientData(format!("no flights in {start}-{end}")));
    }
    Ok(records)
}

pub fn train_hierarchical(
    store: &HistoricalStore,
    start: i32,
    end: i32,
    out: &Path,
) -> Result<FitDiagnostics, AppError> {
    let records = training_window(store, start, end)?;
    let mut model = PartialPoolingModel::new();
    let diag = model.fit(&records)?;
    if !diag.converged {
        warn!(iterations = diag.iterations, last_step = diag.last_step, "IRLS did not converge");
    }
    model.save(out)?;
    info!(path = %out.display(), "hierarchical model saved");
    Ok(diag)
}

pub fn train_fast(store: &HistoricalStore, start: i32, end: i32, out: &Path) -> Result<LogisticClassifier, AppError> {
    let records = training_window(store, start, end)?;
    let clf = LogisticClassifier::train(&records)?;
    clf.save(out)?;
    info!(path = %out.display(), n_train = clf.n_train, "fast classifier saved");
    Ok(clf)
}

pub fn delay_curve(store: &HistoricalStore, start: i32, end: i32) -> Result<DelayCurveFile, AppError> {
    let records = training_window(store, start, end)?;
    Ok(build_delay_curve(&records, start, end)?)
}

/// Walk-forward the hierarchical model against the baseline and judge it.
pub fn walk_forward(
    store: &HistoricalStore,
    settings: &Settings,
    start: i32,
    end: i32,
    config: ValidationConfig,
) -> Result<(Vec<ValidationFold>, AcceptanceVerdict), AppError> {
    let validator = WalkForwardValidator::new(store, PartialPoolingModel::new)
        .with_config(config.clone())
        .with_curve(load_delay_model(&settings.delay_curve_path()));
    let folds = validator.run(start, end)?;
    let verdict = acceptance_verdict(&folds, &config)?;
    Ok((folds, verdict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SyntheticConfig, generate_history};
    use crate::io::write_flights_csv;

    #[test]
    fn artifacts_trained_here_load_into_the_context() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("flights.csv");
        let cfg = SyntheticConfig {
            start_year: 2021,
            end_year: 2022,
            flights_per_year: 400,
            seed: 3,
        };
        write_flights_csv(&csv, &generate_history(&cfg).unwrap()).unwrap();

        let settings = Settings {
            data_path: csv.clone(),
            models_dir: dir.path().join("models"),
            ..Settings::default()
        };
        let store = load_store(&csv).unwrap();
        assert_eq!(store.len(), 800);

        train_hierarchical(&store, 2021, 2022, &settings.hierarchical_path()).unwrap();
        train_fast(&store, 2021, 2022, &settings.classifier_path()).unwrap();

        let ctx = load_context(&settings).unwrap();
        assert!(ctx.hierarchical.is_some());
        assert!(ctx.classifier.is_some());
    }

    #[test]
    fn empty_artifact_dir_gives_baseline_only_context() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            models_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let ctx = load_context(&settings).unwrap();
        assert!(ctx.hierarchical.is_none() && ctx.classifier.is_none());
    }

    #[test]
    fn training_on_an_empty_window_is_insufficient_data() {
        let store = HistoricalStore::default();
        let err = train_fast(&store, 2020, 2021, Path::new("unused.json")).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
