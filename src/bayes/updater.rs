//! Beta-Binomial conjugate updater.
//!
//! Belief about `P(late)` is a `Beta(alpha, beta)` distribution. Each binary
//! observation updates it in closed form:
//!
//! ```text
//! late    → alpha += 1
//! on-time → beta  += 1
//! ```
//!
//! Both parameters only ever grow, so a posterior stays valid for its whole
//! lifetime once constructed.

use serde::{Deserialize, Serialize};

use crate::domain::{Observation, PriorEstimate};
use crate::error::ForecastError;
use crate::math::ln_gamma_ratio;

/// Posterior belief about the late-departure probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaPosterior {
    alpha: f64,
    beta: f64,
}

impl BetaPosterior {
    /// Create a posterior; both parameters must be finite and strictly positive.
    pub fn new(alpha: f64, beta: f64) -> Result<Self, ForecastError> {
        if !(alpha.is_finite() && alpha > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "alpha must be > 0, got {alpha}"
            )));
        }
        if !(beta.is_finite() && beta > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "beta must be > 0, got {beta}"
            )));
        }
        Ok(Self { alpha, beta })
    }

    /// Non-informative `Beta(0.5, 0.5)`.
    pub fn jeffreys() -> Self {
        Self {
            alpha: 0.5,
            beta: 0.5,
        }
    }

    /// Seed from a prior estimate.
    pub fn from_prior(prior: &PriorEstimate) -> Result<Self, ForecastError> {
        Self::new(prior.alpha, prior.beta)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Fold one observation into the posterior in place.
    pub fn update(&mut self, observation: Observation) {
        match observation {
            Observation::Late => self.alpha += 1.0,
            Observation::OnTime => self.beta += 1.0,
        }
    }

    /// Raw-integer variant of [`update`](Self::update): only `0` and `1` are accepted.
    pub fn update_value(&mut self, value: i64) -> Result<(), ForecastError> {
        let observation = Observation::try_from(value)?;
        self.update(observation);
        Ok(())
    }

    pub fn predictive_p_on_time(&self) -> f64 {
        self.beta / (self.alpha + self.beta)
    }

    pub fn predictive_p_late(&self) -> f64 {
        1.0 - self.predictive_p_on_time()
    }

    /// Probability of at most `k` late outcomes in the next `n` flights.
    ///
    /// Beta-Binomial pmf `C(n, i) · B(i + α, n − i + β) / B(α, β)`, walked up
    /// from `i = 0` in log space:
    ///
    /// ```text
    /// ln pmf(0)     = ln Γ(β + α) − ln Γ(β) − [ln Γ(n + β + α) − ln Γ(n + β)]
    /// pmf(i+1)/pmf(i) = (n − i)/(i + 1) · (i + α)/(n − i − 1 + β)
    /// ```
    pub fn predictive_cdf(&self, k: i64, n: i64) -> Result<f64, ForecastError> {
        if n < 0 || k < 0 || k > n {
            return Err(ForecastError::InvalidRange(format!(
                "cdf requires 0 <= k <= n, got k={k}, n={n}"
            )));
        }
        if k == n {
            return Ok(1.0);
        }

        let (a, b) = (self.alpha, self.beta);
        let n = n as f64;

        let mut ln_pmf = ln_gamma_ratio(b, a) - ln_gamma_ratio(n + b, a);
        let mut total = ln_pmf.exp();
        for i in 0..k {
            let i = i as f64;
            ln_pmf += ((n - i) / (i + 1.0)).ln() + ((i + a) / (n - i - 1.0 + b)).ln();
            total += ln_pmf.exp();
        }
        Ok(total.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_parameters() {
        assert!(matches!(
            BetaPosterior::new(0.0, 1.0),
            Err(ForecastError::InvalidParameter(_))
        ));
        assert!(BetaPosterior::new(1.0, -2.0).is_err());
        assert!(BetaPosterior::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn single_late_update_from_jeffreys() {
        let mut post = BetaPosterior::new(0.5, 0.5).unwrap();
        post.update_value(1).unwrap();
        assert_eq!((post.alpha(), post.beta()), (1.5, 0.5));
        assert!((post.predictive_p_on_time() - 0.25).abs() < 1e-12);
        assert!((post.predictive_p_late() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn non_binary_update_leaves_posterior_untouched() {
        let mut post = BetaPosterior::jeffreys();
        assert!(post.update_value(3).is_err());
        assert_eq!(post, BetaPosterior::jeffreys());
    }

    #[test]
    fn cdf_of_uniform_prior_is_discrete_uniform() {
        // Beta(1,1)-Binomial(n) is uniform over {0..n}.
        let post = BetaPosterior::new(1.0, 1.0).unwrap();
        for k in 0..4 {
            let got = post.predictive_cdf(k, 4).unwrap();
            assert!((got - (k + 1) as f64 / 5.0).abs() < 1e-9, "k={k} got={got}");
        }
        assert_eq!(post.predictive_cdf(4, 4).unwrap(), 1.0);
    }

    #[test]
    fn cdf_stays_accurate_for_long_horizons() {
        let post = BetaPosterior::new(1.0, 1.0).unwrap();
        for n in [10_000_i64, 1_000_000_000, 1_000_000_000_000_000] {
            let exact = 1.0 / (n as f64 + 1.0);
            let got = post.predictive_cdf(0, n).unwrap();
            assert!(((got - exact) / exact).abs() < 1e-9, "n={n} got={got}");
        }
        let got = post.predictive_cdf(5_000, 10_000).unwrap();
        assert!((got - 5_001.0 / 10_001.0).abs() < 1e-9, "got={got}");
    }

    #[test]
    fn cdf_survives_tiny_leading_terms() {
        // pmf(0) here is far below f64's smallest normal value.
        let post = BetaPosterior::new(2_000.5, 2_000.5).unwrap();
        let got = post.predictive_cdf(1_000, 2_000).unwrap();
        assert!((got - 0.5).abs() < 0.05, "got={got}");
    }

    #[test]
    fn cdf_with_zero_trials() {
        let post = BetaPosterior::jeffreys();
        assert_eq!(post.predictive_cdf(0, 0).unwrap(), 1.0);
    }

    #[test]
    fn cdf_rejects_out_of_range() {
        let post = BetaPosterior::jeffreys();
        assert!(matches!(
            post.predictive_cdf(5, 3),
            Err(ForecastError::InvalidRange(_))
        ));
        assert!(post.predictive_cdf(-1, 3).is_err());
    }
}
