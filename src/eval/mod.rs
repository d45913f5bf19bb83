//! Evaluation: metrics, single-route backtests, walk-forward validation, the
//! acceptance/regression gates and the rolling live-performance check.

pub mod backtest;
pub mod gate;
pub mod live;
pub mod metrics;
pub mod walk_forward;

pub use backtest::*;
pub use gate::*;
pub use live::*;
pub use metrics::*;
pub use walk_forward::*;
