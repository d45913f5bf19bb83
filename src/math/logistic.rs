//! Logistic regression by iteratively reweighted least squares (IRLS).
//!
//! Each iteration linearizes the Bernoulli log-likelihood around the current
//! coefficients and solves a weighted least squares problem:
//!
//! ```text
//! η = Xβ,  p = σ(η),  w = p(1−p),  z = η + (y − p) / w
//! β' = argmin Σ w_i (z_i − x_iᵀβ)² + λ‖β_{1..}‖²
//! ```
//!
//! The ridge term keeps one-hot columns that are constant in a training window
//! from blowing up.

use nalgebra::DMatrix;

use crate::math::ols::solve_weighted_ridge;
use crate::math::special::{logit, sigmoid};

/// Lower bound on IRLS working weights.
const MIN_WEIGHT: f64 = 1e-6;

/// IRLS settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrlsOptions {
    pub max_iter: usize,
    /// Converged once the largest coefficient change falls below this.
    pub tol: f64,
    pub ridge: f64,
}

impl Default for IrlsOptions {
    fn default() -> Self {
        Self {
            max_iter: 25,
            tol: 1e-6,
            ridge: 1e-3,
        }
    }
}

/// Fitted coefficients plus convergence diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticFit {
    pub coefficients: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    /// Largest absolute coefficient change in the final iteration.
    pub last_step: f64,
}

/// Fit `P(y=1 | x) = σ(xᵀβ)` on design matrix `x` (column 0 = intercept).
///
/// Returns `None` when the data are empty or a step cannot be solved.
pub fn fit_logistic(x: &DMatrix<f64>, y: &[f64], opts: &IrlsOptions) -> Option<LogisticFit> {
    let n = x.nrows();
    let p = x.ncols();
    if n == 0 || p == 0 || y.len() != n {
        return None;
    }

    // Start from the intercept-only solution.
    let mean_y = y.iter().sum::<f64>() / n as f64;
    let mut beta = vec![0.0; p];
    beta[0] = logit(mean_y);

    let mut w = vec![0.0; n];
    let mut z = vec![0.0; n];
    let mut last_step = f64::INFINITY;

    for iter in 1..=opts.max_iter.max(1) {
        for i in 0..n {
            let mut eta = 0.0;
            for j in 0..p {
                eta += x[(i, j)] * beta[j];
            }
            let pi = sigmoid(eta);
            let wi = (pi * (1.0 - pi)).max(MIN_WEIGHT);
            w[i] = wi;
            z[i] = eta + (y[i] - pi) / wi;
        }

        let next = solve_weighted_ridge(x, &z, &w, opts.ridge)?;
        last_step = next
            .iter()
            .zip(beta.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        beta = next.iter().copied().collect();

        if last_step < opts.tol {
            return Some(LogisticFit {
                coefficients: beta,
                iterations: iter,
                converged: true,
                last_step,
            });
        }
    }

    Some(LogisticFit {
        coefficients: beta,
        iterations: opts.max_iter.max(1),
        converged: false,
        last_step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intercept_only_recovers_base_rate() {
        let y: Vec<f64> = (0..100).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();
        let x = DMatrix::from_element(100, 1, 1.0);
        let fit = fit_logistic(&x, &y, &IrlsOptions::default()).unwrap();
        assert!(fit.converged);
        assert!((sigmoid(fit.coefficients[0]) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn binary_feature_separates_rates() {
        // Group A (x=0): 10% late. Group B (x=1): 50% late.
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..200 {
            let b = i >= 100;
            rows.extend_from_slice(&[1.0, if b { 1.0 } else { 0.0 }]);
            let late = if b { i % 2 == 0 } else { i % 10 == 0 };
            y.push(if late { 1.0 } else { 0.0 });
        }
        let x = DMatrix::from_row_slice(200, 2, &rows);
        let opts = IrlsOptions { ridge: 0.0, ..IrlsOptions::default() };
        let fit = fit_logistic(&x, &y, &opts).unwrap();

        let pa = sigmoid(fit.coefficients[0]);
        let pb = sigmoid(fit.coefficients[0] + fit.coefficients[1]);
        assert!((pa - 0.1).abs() < 1e-4, "pa={pa}");
        assert!((pb - 0.5).abs() < 1e-4, "pb={pb}");
    }

    #[test]
    fn empty_input_is_rejected() {
        let x = DMatrix::<f64>::zeros(0, 2);
        assert!(fit_logistic(&x, &[], &IrlsOptions::default()).is_none());
    }
}
