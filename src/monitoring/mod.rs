//! Structured logging and in-process metrics (spec §7, §4.6).

pub mod logging;
pub mod metrics;

pub use metrics::Metrics;
