//! Closed-form Bayesian building blocks.
//!
//! - `updater`: Beta-Binomial posterior with sequential updates
//! - `prior`: historical counts → Beta prior (Jeffreys fallback)
//! - `delay_curve`: late-probability → expected delay + threshold probabilities
//! - `scoring`: data-driven route/weather prior table

pub mod delay_curve;
pub mod prior;
pub mod scoring;
pub mod updater;

pub use delay_curve::*;
pub use prior::*;
pub use scoring::*;
pub use updater::*;
