//! Formatted terminal output.
//!
//! Formatting lives in one place so the math and validation code stays free
//! of presentation, and output changes are localized.

use crate::bayes::DelayCurveFile;
use crate::domain::{AcceptanceVerdict, ForecastResult, PriorEstimate, RouteKey, ValidationFold};
use crate::eval::{BacktestReport, LiveCheck};
use crate::models::FitDiagnostics;

/// Mean of `f` over the folds; `NaN` for no folds.
fn mean_by(folds: &[ValidationFold], f: impl Fn(&ValidationFold) -> f64) -> f64 {
    if folds.is_empty() {
        return f64::NAN;
    }
    folds.iter().map(f).sum::<f64>() / folds.len() as f64
}

/// Per-fold table, aggregate means, win rate and the acceptance line.
pub fn format_walk_forward(folds: &[ValidationFold], verdict: &AcceptanceVerdict) -> String {
    let mut out = String::new();

    out.push_str("=== fdb - Walk-forward validation ===\n");
    out.push_str(
        format!(
            "{:<11} {:>6} {:>8} {:>7} {:>10} {:>10} {:>9} {:>9} {:>4}\n",
            "train", "test", "n_train", "n_test", "base_brier", "cand_brier", "cand_auc", "cand_ece", "win"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<11} {:->6} {:->8} {:->7} {:->10} {:->10} {:->9} {:->9} {:->4}\n",
            "", "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for f in folds {
        let degraded = if f.candidate_degraded { " (degraded)" } else { "" };
        out.push_str(&format!(
            "{:<11} {:>6} {:>8} {:>7} {:>10.4} {:>10.4} {:>9.3} {:>9.4} {:>4}{degraded}\n",
            format!("{}-{}", f.train_start, f.train_end),
            f.test_year,
            f.train_size,
            f.test_size,
            f.baseline.brier,
            f.candidate.brier,
            f.candidate.auc,
            f.candidate.ece,
            if f.candidate_wins() { "yes" } else { "no" },
        ));
    }

    out.push_str("\nAggregate:\n");
    out.push_str(&format!(
        "- baseline : brier={:.4} auc={:.3} ece={:.4}\n",
        mean_by(folds, |f| f.baseline.brier),
        mean_by(folds, |f| f.baseline.auc),
        mean_by(folds, |f| f.baseline.ece),
    ));
    out.push_str(&format!(
        "- candidate: brier={:.4} auc={:.3} ece={:.4}\n",
        mean_by(folds, |f| f.candidate.brier),
        mean_by(folds, |f| f.candidate.auc),
        mean_by(folds, |f| f.candidate.ece),
    ));
    out.push_str(&format!(
        "- improvement: {:+.4} mean Brier\n",
        mean_by(folds, ValidationFold::brier_improvement)
    ));
    out.push_str(&format!(
        "- wins: {}/{} ({:.0}%), required {}\n",
        verdict.wins,
        verdict.folds,
        100.0 * verdict.wins as f64 / verdict.folds.max(1) as f64,
        verdict.required_wins,
    ));
    out.push('\n');
    out.push_str(&format_verdict(verdict));
    out
}

pub fn format_verdict(verdict: &AcceptanceVerdict) -> String {
    let status = if verdict.pass { "PASS" } else { "FAIL" };
    format!(
        "{status}: mean candidate Brier {:.4} ({}), wins {}/{} ({})\n",
        verdict.mean_candidate_brier,
        if verdict.brier_ok { "ok" } else { "too high" },
        verdict.wins,
        verdict.folds,
        if verdict.wins_ok { "ok" } else { "too few" },
    )
}

pub fn format_prior(route: &RouteKey, prior: &PriorEstimate) -> String {
    let mean = prior.alpha / (prior.alpha + prior.beta);
    format!(
        "{route}: alpha={:.1} beta={:.1} n={} (p_late={:.3})\n",
        prior.alpha, prior.beta, prior.n, mean
    )
}

pub fn format_forecast(r: &ForecastResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== {}{} {} -> {} ===\n",
        r.carrier, r.flight_number, r.origin, r.dest
    ));
    out.push_str(&format!(
        "Scheduled: {}\n",
        r.scheduled_departure.map(|t| t.to_string()).unwrap_or_else(|| "unknown".into())
    ));
    if let Some(predicted) = r.predicted_departure {
        out.push_str(&format!("Predicted: {predicted}\n"));
    }
    out.push_str(&format!(
        "P(late >= 15/30/45/60 min): {:.3} / {:.3} / {:.3} / {:.3}\n",
        r.p_late_15, r.p_late_30, r.p_late_45, r.p_late_60
    ));
    out.push_str(&format!("Expected delay: {:.1} min\n", r.expected_delay_minutes));

    let mut source = format!("Source: {}", r.provenance);
    if let (Some(a), Some(b)) = (r.alpha, r.beta) {
        source.push_str(&format!(" Beta({a:.1}, {b:.1})"));
    }
    if r.updated {
        source.push_str(" + live update");
    }
    out.push_str(&format!("{source} [{:.1} ms]\n", r.update_latency_ms));

    let wx: Vec<String> = [
        r.wx_temp_c.map(|v| format!("{v:.1}°C")),
        r.wx_wind_kt.map(|v| format!("wind {v:.0}kt")),
        r.wx_precip_mm.map(|v| format!("precip {v:.1}mm")),
        r.wx_conditions.clone(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !wx.is_empty() {
        out.push_str(&format!("Weather: {}\n", wx.join(", ")));
    }
    if let Some(tail) = &r.tail_number {
        match r.aircraft_age_yrs {
            Some(age) => out.push_str(&format!("Aircraft: {tail} ({age:.1} yrs)\n")),
            None => out.push_str(&format!("Aircraft: {tail}\n")),
        }
    }
    out
}

pub fn format_backtest(report: &BacktestReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== Backtest {} {} ===\n", report.route, report.year));
    out.push_str(&format!(
        "n={} actual={:.3} predicted={:.3} bias={:+.3} brier={:.4}\n\n",
        report.n, report.actual_rate, report.mean_pred, report.bias, report.brier
    ));
    out.push_str(format!("{:>6} {:>9} {:>8} {:>6}\n", "bin", "mean_pred", "actual", "count").trim_end());
    out.push('\n');
    for b in report.buckets.iter().filter(|b| b.count > 0) {
        out.push_str(&format!(
            "{:>6.2} {:>9.3} {:>8.3} {:>6}\n",
            b.bin_mid, b.mean_pred, b.actual_rate, b.count
        ));
    }
    out
}

pub fn format_live_check(check: &LiveCheck) -> String {
    let cfg = &check.config;
    let mut out = format!(
        "{} resolved forecasts in the last {} days\n",
        check.observations, cfg.lookback_days
    );
    match check.brier {
        None => out.push_str(&format!(
            "Not enough recent data to validate (minimum is {}); skipping\n",
            cfg.min_observations
        )),
        Some(brier) => {
            let verdict = if check.degraded() { "DEGRADED" } else { "OK" };
            out.push_str(&format!(
                "{verdict}: {}-day rolling Brier {brier:.4} (threshold {:.2})\n",
                cfg.lookback_days, cfg.max_brier
            ));
        }
    }
    out
}

pub fn format_fit_diagnostics(what: &str, diag: &FitDiagnostics) -> String {
    format!(
        "{what}: n_obs={} routes={} iterations={} converged={} last_step={:.2e}\n",
        diag.n_obs, diag.n_routes, diag.iterations, diag.converged, diag.last_step
    )
}

pub fn format_delay_curve(curve: &DelayCurveFile) -> String {
    format!(
        "Delay curve ({}, n={}): on-time mean {:.1} min, late mean {:.1} min, threshold {:.2} | on-time {:.1}% late {:.1}%\n",
        curve.data_years,
        curve.n_flights,
        curve.mean_ontime_delay,
        curve.mean_late_delay,
        curve.threshold_prob,
        curve.ontime_pct,
        curve.late_pct,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelMetrics, Provenance};
    use chrono::NaiveDate;

    fn fold(year: i32, base: f64, cand: f64) -> ValidationFold {
        ValidationFold {
            train_start: year - 4,
            train_end: year - 1,
            test_year: year,
            train_size: 1000,
            test_size: 250,
            baseline: ModelMetrics { brier: base, ..ModelMetrics::FAILED },
            candidate: ModelMetrics { brier: cand, ..ModelMetrics::FAILED },
            baseline_seconds: 0.0,
            candidate_seconds: 0.0,
            candidate_degraded: false,
        }
    }

    #[test]
    fn live_check_lines() {
        let config = crate::domain::LiveCheckConfig::default();
        let bad = LiveCheck { observations: 30, brier: Some(0.2), config };
        assert!(format_live_check(&bad).contains("DEGRADED: 7-day rolling Brier 0.2000 (threshold 0.18)"));

        let thin = LiveCheck { observations: 3, brier: None, config };
        assert!(format_live_check(&thin).contains("minimum is 20"));
    }

    #[test]
    fn walk_forward_summary_lists_folds_and_verdict() {
        let folds = vec![fold(2021, 0.20, 0.11), fold(2022, 0.18, 0.19)];
        let verdict = AcceptanceVerdict {
            folds: 2,
            wins: 1,
            required_wins: 2,
            mean_candidate_brier: 0.15,
            brier_ok: false,
            wins_ok: false,
            pass: false,
        };
        let text = format_walk_forward(&folds, &verdict);
        assert!(text.contains("2017-2020"));
        assert!(text.contains("wins: 1/2 (50%)"));
        assert!(text.trim_end().ends_with("(too few)"));
        assert!(text.contains("FAIL: mean candidate Brier 0.1500"));
    }

    #[test]
    fn forecast_output_names_source_and_weather() {
        let r = ForecastResult {
            carrier: "UA".into(),
            flight_number: "1234".into(),
            origin: "ORD".into(),
            dest: "DEN".into(),
            scheduled_departure: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap().and_hms_opt(8, 30, 0),
            predicted_departure: None,
            p_late_15: 0.75,
            p_late_30: 0.5,
            p_late_45: 0.3,
            p_late_60: 0.2,
            expected_delay_minutes: 31.0,
            alpha: Some(1.5),
            beta: Some(0.5),
            provenance: Provenance::Baseline,
            updated: true,
            update_latency_ms: 0.2,
            wx_temp_c: Some(3.0),
            wx_wind_kt: None,
            wx_precip_mm: None,
            wx_conditions: Some("-SN".into()),
            wx_valid_time: None,
            tail_number: None,
            aircraft_age_yrs: None,
        };
        let text = format_forecast(&r);
        assert!(text.contains("Source: baseline Beta(1.5, 0.5) + live update"));
        assert!(text.contains("Weather: 3.0°C, -SN"));
        assert!(!text.contains("Aircraft"));
    }
}
