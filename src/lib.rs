//! `flight-delay-bayes` library crate.
//!
//! The binary (`fdb`) is a thin wrapper around this library so that:
//!
//! - the forecasting and validation core is testable without spawning processes
//! - collaborators (history, live status, weather, models) sit behind traits
//!   and can be swapped for fakes

pub mod app;
pub mod bayes;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod eval;
pub mod forecast;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
