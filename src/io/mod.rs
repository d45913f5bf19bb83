//! Input/output helpers.
//!
//! - historical flight CSV ingest (`ingest`)
//! - fold/flight/forecast exports (`export`)
//! - delay curve and scoring table files (`curve`)
//! - the JSONL live performance log (`live_log`)

pub mod curve;
pub mod export;
pub mod ingest;
pub mod live_log;

pub use curve::*;
pub use export::*;
pub use ingest::*;
pub use live_log::*;
