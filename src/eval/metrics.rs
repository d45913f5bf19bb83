//! Probabilistic forecast metrics.
//!
//! All functions take predictions `p_i ∈ [0, 1]` and binary labels `y_i ∈ {0, 1}`
//! of equal length:
//!
//! - Brier score: `mean((p − y)²)`
//! - log-loss with `p` clipped to `[1e-15, 1 − 1e-15]`
//! - ROC AUC via the Mann-Whitney rank statistic (ties get average ranks)
//! - expected calibration error over equal-width bins `(lo, hi]`

use serde::{Deserialize, Serialize};

use crate::domain::ModelMetrics;

/// Clip applied to probabilities before taking logs.
pub const LOG_LOSS_EPS: f64 = 1e-15;

pub fn brier_score(pred: &[f64], labels: &[bool]) -> f64 {
    let n = pred.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    pred.iter()
        .zip(labels)
        .map(|(p, &y)| (p - label(y)).powi(2))
        .sum::<f64>()
        / n as f64
}

pub fn log_loss(pred: &[f64], labels: &[bool]) -> f64 {
    let n = pred.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    -pred
        .iter()
        .zip(labels)
        .map(|(p, &y)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if y { p.ln() } else { (1.0 - p).ln() }
        })
        .sum::<f64>()
        / n as f64
}

/// ROC AUC; `0.5` when only one class is present.
pub fn auc(pred: &[f64], labels: &[bool]) -> f64 {
    let n = pred.len().min(labels.len());
    let n_pos = labels[..n].iter().filter(|&&y| y).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| pred[a].total_cmp(&pred[b]));

    // Average 1-based ranks over runs of tied scores.
    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && pred[order[j + 1]] == pred[order[i]] {
            j += 1;
        }
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            if labels[idx] {
                rank_sum_pos += avg_rank;
            }
        }
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
    u / (n_pos * n_neg as f64)
}

/// Expected calibration error with `n_bins` equal-width bins over `(0, 1]`.
pub fn expected_calibration_error(pred: &[f64], labels: &[bool], n_bins: usize) -> f64 {
    let n = pred.len().min(labels.len());
    if n == 0 || n_bins == 0 {
        return 0.0;
    }

    let mut ece = 0.0;
    for b in 0..n_bins {
        let lo = b as f64 / n_bins as f64;
        let hi = (b + 1) as f64 / n_bins as f64;
        let (mut count, mut conf, mut acc) = (0usize, 0.0, 0.0);
        for (p, &y) in pred[..n].iter().zip(&labels[..n]) {
            if *p > lo && *p <= hi {
                count += 1;
                conf += p;
                acc += label(y);
            }
        }
        if count > 0 {
            let c = count as f64;
            ece += (conf / c - acc / c).abs() * (c / n as f64);
        }
    }
    ece
}

/// One reliability-diagram bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityBucket {
    pub bin_mid: f64,
    pub mean_pred: f64,
    pub actual_rate: f64,
    pub count: usize,
}

/// Reliability curve with `n_bins` equal-width bins `(lo, hi]`; zero joins the
/// first bin and empty bins are omitted.
pub fn reliability_curve(pred: &[f64], labels: &[bool], n_bins: usize) -> Vec<ReliabilityBucket> {
    let n_bins = n_bins.max(1);
    let mut sums = vec![(0usize, 0.0, 0.0); n_bins];
    for (p, &y) in pred.iter().zip(labels) {
        let b = ((p.clamp(0.0, 1.0) * n_bins as f64).ceil() as usize)
            .saturating_sub(1)
            .min(n_bins - 1);
        sums[b].0 += 1;
        sums[b].1 += p;
        sums[b].2 += label(y);
    }
    sums.into_iter()
        .enumerate()
        .filter(|(_, (count, _, _))| *count > 0)
        .map(|(b, (count, sp, sy))| ReliabilityBucket {
            bin_mid: (b as f64 + 0.5) / n_bins as f64,
            mean_pred: sp / count as f64,
            actual_rate: sy / count as f64,
            count,
        })
        .collect()
}

/// All four headline metrics for one model on one test set.
pub fn evaluate(pred: &[f64], labels: &[bool], n_bins: usize) -> ModelMetrics {
    ModelMetrics {
        brier: brier_score(pred, labels),
        log_loss: log_loss(pred, labels),
        auc: auc(pred, labels),
        ece: expected_calibration_error(pred, labels, n_bins),
        threshold_brier: None,
    }
}

fn label(y: bool) -> f64 {
    if y { 1.0 } else { 0.0 }
}
