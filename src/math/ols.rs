//! Least squares solver.
//!
//! Both fitted collaborators (the partial-pooling model and the fast classifier)
//! are logistic regressions solved by iteratively reweighted least squares. Each
//! IRLS step reduces to a small linear system of the form:
//!
//! ```text
//! (Xᵀ W X + λ D) β = Xᵀ W z
//! ```
//!
//! Implementation choices:
//! - We form the normal equations explicitly. The parameter dimension is tiny
//!   (well under 20 columns) while the row count can be large, so the `p × p`
//!   system is far cheaper than factoring the tall design matrix.
//! - We solve with SVD so near-singular systems (e.g. a one-hot column that is
//!   never set in the training window) still yield a finite minimum-norm answer.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve a weighted, ridge-penalized least squares problem via normal equations.
///
/// `ridge` is added to the diagonal of every column except column 0, which is
/// assumed to be the intercept and left unpenalized.
pub fn solve_weighted_ridge(
    x: &DMatrix<f64>,
    z: &[f64],
    w: &[f64],
    ridge: f64,
) -> Option<DVector<f64>> {
    let n = x.nrows();
    let p = x.ncols();
    if n == 0 || p == 0 || z.len() != n || w.len() != n {
        return None;
    }

    let mut xtwx = DMatrix::<f64>::zeros(p, p);
    let mut xtwz = DVector::<f64>::zeros(p);

    for i in 0..n {
        let wi = w[i];
        if !(wi.is_finite() && wi > 0.0) || !z[i].is_finite() {
            continue;
        }
        for a in 0..p {
            let xa = x[(i, a)];
            if xa == 0.0 {
                continue;
            }
            xtwz[a] += wi * xa * z[i];
            for b in a..p {
                xtwx[(a, b)] += wi * xa * x[(i, b)];
            }
        }
    }

    // Mirror the upper triangle.
    for a in 0..p {
        for b in 0..a {
            xtwx[(a, b)] = xtwx[(b, a)];
        }
    }

    let ridge = ridge.max(0.0);
    for j in 1..p {
        xtwx[(j, j)] += ridge;
    }

    solve_least_squares(&xtwx, &xtwz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn weighted_normal_equations_match_plain_fit_with_unit_weights() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let z = [1.0, 3.0, 5.0, 7.0];
        let w = [1.0; 4];

        let beta = solve_weighted_ridge(&x, &z, &w, 0.0).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-9);
        assert!((beta[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn ridge_shrinks_slope_but_not_intercept() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, -1.0, 1.0, 0.0, 1.0, 1.0]);
        let z = [0.0, 1.0, 2.0];
        let w = [1.0; 3];

        let free = solve_weighted_ridge(&x, &z, &w, 0.0).unwrap();
        let shrunk = solve_weighted_ridge(&x, &z, &w, 10.0).unwrap();
        assert!(shrunk[1].abs() < free[1].abs());
        assert!((shrunk[0] - free[0]).abs() < 1e-9);
    }
}
