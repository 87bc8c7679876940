//! Error taxonomy for the engagement pipeline.
//!
//! Every failure mode the pipeline can hit is a variant of [`PipelineError`].
//! [`ErrorCategory`] groups variants by the disposition the coordinator
//! gives them: drop-and-continue, isolate-the-sink, or abort-the-batch.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors the pipeline can produce, from validation up through fatal
/// initialisation failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raw event failed schema validation (bad enum, missing conditional
    /// `duration_ms`). The event is dropped; the batch continues.
    #[error("validation failed: {message}")]
    Validation {
        /// What was wrong with the record.
        message: String,
    },

    /// `content_id` on the raw event has no matching row in the content
    /// store. The event is dropped with a warning; the batch continues.
    #[error("content {content_id} not found, dropping event {event_id}")]
    Orphan {
        /// The content id the event referenced.
        content_id: uuid::Uuid,
        /// The dropped event's id, for log correlation.
        event_id: i64,
    },

    /// A single sink's I/O failed after its retry budget was exhausted.
    /// Recorded against that sink for that event; other sinks and the
    /// batch are unaffected.
    #[error("sink {sink} failed: {message}")]
    TransientSink {
        /// Which sink failed (`"leaderboard"`, `"warehouse"`, `"http"`).
        sink: &'static str,
        /// Underlying error description.
        message: String,
    },

    /// The content/relational store was unreachable. Fatal to the current
    /// batch: it aborts without committing offsets, so the next poll
    /// re-delivers the same records.
    #[error("content store unavailable: {message}")]
    TransientStore {
        /// Underlying error description.
        message: String,
    },

    /// A mandatory client failed to initialise at startup. Warehouse and
    /// HTTP sink init failures are handled separately (they degrade to
    /// no-ops, see [`ErrorCategory::FatalInit`] docs) — this variant is for
    /// clients the pipeline cannot run without, such as the content store
    /// pool or the event log consumer.
    #[error("fatal initialisation failure: {message}")]
    FatalInit {
        /// Underlying error description.
        message: String,
    },
}

impl PipelineError {
    /// The disposition category for this error, used by the coordinator to
    /// decide whether to drop, isolate, or abort.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Validation { .. } => ErrorCategory::Validation,
            PipelineError::Orphan { .. } => ErrorCategory::Orphan,
            PipelineError::TransientSink { .. } => ErrorCategory::TransientSink,
            PipelineError::TransientStore { .. } => ErrorCategory::TransientStore,
            PipelineError::FatalInit { .. } => ErrorCategory::FatalInit,
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(error: sqlx::Error) -> Self {
        PipelineError::TransientStore {
            message: error.to_string(),
        }
    }
}

impl From<redis::RedisError> for PipelineError {
    fn from(error: redis::RedisError) -> Self {
        PipelineError::TransientSink {
            sink: "leaderboard",
            message: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(error: reqwest::Error) -> Self {
        PipelineError::TransientSink {
            sink: "http",
            message: error.to_string(),
        }
    }
}

/// Disposition category a [`PipelineError`] falls into. See spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Drop the event, count it, continue the batch.
    Validation,
    /// Drop the event, warn, continue the batch.
    Orphan,
    /// Retry within the sink, then isolate; never blocks the batch.
    TransientSink,
    /// Abort the current batch without committing offsets.
    TransientStore,
    /// Exit the process (for mandatory clients only).
    FatalInit,
}

/// Exponential backoff policy used by the HTTP sink's retry loop.
///
/// Matches spec §4.5: base 1s, multiplier 2, floored at 4s starting from
/// the second attempt, capped at 10s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay before the backoff multiplier is applied.
    pub base_delay: Duration,
    /// Floor below which a computed delay is never allowed to fall.
    pub min_delay: Duration,
    /// Ceiling a computed delay is never allowed to exceed.
    pub max_delay: Duration,
    /// Multiplier applied per attempt beyond the first.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait *before* making `attempt` (1-indexed; the first
    /// attempt has no preceding delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1) as i32;
        let raw_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let floored = raw_secs.max(self.min_delay.as_secs_f64());
        let capped = floored.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delays_are_floored_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn category_mapping_matches_disposition() {
        let err = PipelineError::Orphan {
            content_id: uuid::Uuid::nil(),
            event_id: 1,
        };
        assert_eq!(err.category(), ErrorCategory::Orphan);
    }
}
