//! End-to-end behavior on synthetic flight histories.

use std::fs;
use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};

use flight_delay_bayes::data::{HistoricalStore, SyntheticConfig, generate_history};
use flight_delay_bayes::domain::{LiveCheckConfig, LiveRecord, ModelMetrics, Provenance, ValidationConfig, ValidationFold};
use flight_delay_bayes::eval::{WalkForwardValidator, acceptance_verdict, check_regression, evaluate_live};
use flight_delay_bayes::forecast::{ForecastContext, ForecastService};
use flight_delay_bayes::io::{append_live_record, read_live_log, record_outcome, write_folds_json};
use flight_delay_bayes::models::{DelayModel, LogisticClassifier, ModelInput, PartialPoolingModel};

fn store(start_year: i32, end_year: i32) -> HistoricalStore {
    let cfg = SyntheticConfig {
        start_year,
        end_year,
        flights_per_year: 600,
        seed: 11,
    };
    HistoricalStore::from_records(generate_history(&cfg).unwrap())
}

fn fold(test_year: i32, baseline: f64, candidate: f64) -> ValidationFold {
    ValidationFold {
        train_start: 2015,
        train_end: test_year - 1,
        test_year,
        train_size: 1_000,
        test_size: 200,
        baseline: ModelMetrics { brier: baseline, ..ModelMetrics::FAILED },
        candidate: ModelMetrics { brier: candidate, ..ModelMetrics::FAILED },
        baseline_seconds: 0.0,
        candidate_seconds: 0.0,
        candidate_degraded: false,
    }
}

#[test]
fn walk_forward_expands_training_and_feeds_the_gate() {
    let store = store(2018, 2022);
    let config = ValidationConfig {
        lookback_years: 3,
        ..ValidationConfig::default()
    };
    let folds = WalkForwardValidator::new(&store, PartialPoolingModel::new)
        .with_config(config.clone())
        .run(2021, 2022)
        .unwrap();

    let years: Vec<i32> = folds.iter().map(|f| f.test_year).collect();
    assert_eq!(years, vec![2021, 2022]);
    assert!(folds.iter().all(|f| f.train_start == 2018));
    assert_eq!(folds[0].train_size, 1_800);
    assert_eq!(folds[1].train_size, 2_400);
    for f in &folds {
        assert_eq!(f.test_size, 600);
        assert!(!f.candidate_degraded);
        assert!((0.0..=1.0).contains(&f.baseline.brier));
        assert!((0.0..=1.0).contains(&f.candidate.brier));
        assert!(f.baseline.threshold_brier.is_some());
    }

    let verdict = acceptance_verdict(&folds, &config).unwrap();
    assert_eq!(verdict.folds, 2);
    assert_eq!(verdict.required_wins, 2);

    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.json");
    let target = dir.path().join("target.json");
    write_folds_json(&results, &folds).unwrap();
    fs::write(&target, r#"{"brier_score_target": 1.0}"#).unwrap();
    let check = check_regression(&results, &target).unwrap();
    assert!((check.actual - folds[0].candidate.brier).abs() < 1e-12);
    assert!(!check.regressed());
}

#[test]
fn fold_without_training_years_is_dropped() {
    let store = store(2020, 2022);
    let config = ValidationConfig {
        lookback_years: 0,
        ..ValidationConfig::default()
    };
    let validator = WalkForwardValidator::new(&store, PartialPoolingModel::new).with_config(config);
    let schedule = validator.schedule(2021, 2022);
    assert_eq!(schedule.len(), 1);
    assert_eq!(schedule[0].test_year, 2022);

    let folds = validator.run(2021, 2022).unwrap();
    assert_eq!(folds.iter().map(|f| f.test_year).collect::<Vec<_>>(), vec![2022]);
}

#[test]
fn five_winning_folds_under_the_brier_gate_pass() {
    let folds: Vec<ValidationFold> = [0.11, 0.12, 0.115, 0.105, 0.125]
        .iter()
        .zip(2019..)
        .map(|(&b, y)| fold(y, 0.2, b))
        .collect();
    let verdict = acceptance_verdict(&folds, &ValidationConfig::default()).unwrap();
    assert!((verdict.mean_candidate_brier - 0.115).abs() < 1e-12);
    assert_eq!((verdict.wins, verdict.required_wins), (5, 4));
    assert!(verdict.pass);
}

#[test]
fn hierarchical_artifacts_round_trip_and_degrade_without_trace() {
    let store = store(2021, 2022);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hier.json");

    let mut model = PartialPoolingModel::new();
    let diag = model.fit(store.records()).unwrap();
    assert_eq!(diag.n_obs, 1_200);
    model.save(&path).unwrap();

    let inputs: Vec<ModelInput> = store.records().iter().take(25).map(ModelInput::from).collect();
    let loaded = PartialPoolingModel::load(&path).unwrap();
    let before = model.predict(&inputs).unwrap();
    let after = loaded.predict(&inputs).unwrap();
    for (a, b) in before.iter().zip(&after) {
        assert!((a - b).abs() < 1e-9);
    }

    fs::remove_file(dir.path().join("hier.trace.json")).unwrap();
    let disabled = PartialPoolingModel::load(&path).unwrap();
    assert!(disabled.is_fitted());
    assert!(!disabled.can_predict());
    assert!(disabled.predict(&inputs).is_err());
}

#[test]
fn forecast_falls_back_from_disabled_model_to_classifier() {
    let store = store(2021, 2022);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hier.json");
    let mut model = PartialPoolingModel::new();
    model.fit(store.records()).unwrap();
    model.save(&path).unwrap();
    fs::remove_file(dir.path().join("hier.trace.json")).unwrap();

    let rec = store.records().iter().rev().find(|r| r.flight_number.is_some()).unwrap().clone();
    let number = rec.flight_number.clone().unwrap();
    let day = NaiveDate::from_ymd_opt(2023, 1, 10).unwrap();

    let hier_only = ForecastContext::default().with_hierarchical(Arc::new(PartialPoolingModel::load(&path).unwrap()));
    let res = ForecastService::new(&hier_only)
        .with_store(&store)
        .forecast(&rec.carrier, &number, day)
        .unwrap();
    assert_eq!(res.provenance, Provenance::Baseline);
    assert!(res.alpha.is_some());

    let clf = LogisticClassifier::train(store.records()).unwrap();
    let with_clf = hier_only.clone().with_classifier(Arc::new(clf));
    let res = ForecastService::new(&with_clf)
        .with_store(&store)
        .forecast(&rec.carrier, &number, day)
        .unwrap();
    assert_eq!(res.provenance, Provenance::FastClassifier);
    assert_eq!(res.alpha, None);
    assert!(res.p_late_15 <= 0.95);
    assert_eq!((res.origin.as_str(), res.dest.as_str()), (rec.origin.as_str(), rec.dest.as_str()));
}

#[test]
fn fitted_model_answers_tier_one() {
    let store = store(2021, 2022);
    let mut model = PartialPoolingModel::new();
    model.fit(store.records()).unwrap();
    let ctx = ForecastContext::default().with_hierarchical(Arc::new(model));

    let rec = &store.records()[0];
    let res = ForecastService::new(&ctx)
        .with_store(&store)
        .forecast(&rec.carrier, rec.flight_number.as_deref().unwrap(), NaiveDate::from_ymd_opt(2023, 2, 1).unwrap())
        .unwrap();
    assert_eq!(res.provenance, Provenance::HierarchicalPriorOnly);
    assert!((0.0..=1.0).contains(&res.p_late_15));
    assert!(res.p_late_15 >= res.p_late_60);
}

#[test]
fn recorded_forecasts_feed_the_live_check() {
    let store = store(2021, 2022);
    let ctx = ForecastContext::default();
    let service = ForecastService::new(&ctx).with_store(&store);
    let rec = store.records().iter().find(|r| r.flight_number.is_some()).unwrap().clone();
    let number = rec.flight_number.clone().unwrap();
    let first_day = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let run = |name: &str, late: bool| {
        let path = dir.path().join(name);
        for d in 0..25 {
            let day = first_day + Days::new(d);
            let res = service.forecast(&rec.carrier, &number, day).unwrap();
            append_live_record(&path, &LiveRecord::from_forecast(&res, day, Utc::now())).unwrap();
            record_outcome(&path, &LiveRecord::flight_id(&rec.carrier, &number, day), late).unwrap();
        }
        let records = read_live_log(&path).unwrap().unwrap();
        evaluate_live(&records, Utc::now(), LiveCheckConfig::default())
    };

    // The route's baseline rate sits well below one half.
    let on_time = run("on_time.jsonl", false);
    assert_eq!(on_time.observations, 25);
    assert!(!on_time.degraded(), "brier={:?}", on_time.brier);

    let late = run("late.jsonl", true);
    assert!(late.degraded(), "brier={:?}", late.brier);
}
