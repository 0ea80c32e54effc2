//! Telemetry for the request pool.
//!
//! Structured logging plus a thin metrics facade over the dispatch,
//! coalescing, and completion paths.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_coalesced, record_dispatch, record_load_completed, record_queue_depth,
};
