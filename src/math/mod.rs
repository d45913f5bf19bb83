//! Mathematical utilities: special functions, least squares and logistic IRLS.

pub mod logistic;
pub mod ols;
pub mod special;

pub use logistic::*;
pub use ols::*;
pub use special::*;
