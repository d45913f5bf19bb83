//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - route/observation primitives (`RouteKey`, `Observation`, `FlightRecord`)
//! - forecast outputs (`ForecastResult`, `Provenance`, `ThresholdProbabilities`)
//! - validation outputs (`ValidationFold`, `FoldRecord`, `AcceptanceVerdict`)
//! - tunables (`ForecastConfig`, `ValidationConfig`)

pub mod types;

pub use types::*;
