//! Real-time engagement-events stream processor.
//!
//! Consumes raw user-interaction events from a partitioned log, enriches
//! them with content metadata, and fans each enriched event out to a
//! leaderboard store, an analytical warehouse, and an external HTTP
//! endpoint. See `stream::StreamCoordinator` for the live path and
//! `backfill::BackfillCoordinator` for historical replay.

pub mod backfill;
pub mod config;
pub mod content;
pub mod enrich;
pub mod error;
pub mod model;
pub mod monitoring;
pub mod sinks;
pub mod stream;

pub use error::{ErrorCategory, PipelineError};
