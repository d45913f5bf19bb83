//! Special functions used by the Beta-Binomial predictive and the logistic models.
//!
//! - `ln_gamma_ratio(x, a) = ln Γ(x + a) − ln Γ(x)`, switching to an asymptotic
//!   series once `x` is large enough that the direct difference cancels badly.
//! - logistic link helpers with clamping so that `logit` never sees 0 or 1.

use statrs::function::gamma::ln_gamma;

/// Smallest probability the logistic helpers will hand to `ln`.
pub const PROB_EPS: f64 = 1e-12;

/// Below this `x` the two `ln Γ` values are small enough to subtract directly.
const RATIO_SERIES_MIN_X: f64 = 1e7;
/// Largest shift for which three series terms stay below 1e-13.
const RATIO_SERIES_MAX_A: f64 = 100.0;

/// `ln Γ(x + a) − ln Γ(x)` for `x > 0`, `x + a > 0`.
///
/// For large `x` uses
/// `a·ln x + a(a−1)/(2x) − a(a−1)(2a−1)/(12x²)`.
pub fn ln_gamma_ratio(x: f64, a: f64) -> f64 {
    if x >= RATIO_SERIES_MIN_X && a.abs() <= RATIO_SERIES_MAX_A {
        let am1 = a * (a - 1.0);
        return a * x.ln() + am1 / (2.0 * x) - am1 * (2.0 * a - 1.0) / (12.0 * x * x);
    }
    ln_gamma(x + a) - ln_gamma(x)
}

/// Logistic function, stable for large `|x|`.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Log-odds of `p`, clamped away from 0 and 1.
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
    (p / (1.0 - p)).ln()
}
