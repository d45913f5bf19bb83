//! Forecasting front end.
//!
//! - `orchestrator`: tiered late-probability estimation
//! - `service`: flight resolution, live context and result assembly

pub mod orchestrator;
pub mod service;

pub use orchestrator::*;
pub use service::*;
