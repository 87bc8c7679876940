use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::content::{Content, ContentType};

/// `play | pause | finish | click`, tagged at the JSON boundary so an
/// unrecognised value fails decoding instead of reaching the enricher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Play,
    Pause,
    Finish,
    Click,
}

impl EventType {
    /// `true` for event types that require `duration_ms` to be present.
    fn requires_duration(self) -> bool {
        matches!(self, EventType::Play | EventType::Pause | EventType::Finish)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Play => "play",
            EventType::Pause => "pause",
            EventType::Finish => "finish",
            EventType::Click => "click",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of a raw event as it arrives from the log, before the
/// conditional-`duration_ms` rule has been checked.
#[derive(Debug, Deserialize)]
struct RawEventWire {
    id: i64,
    content_id: Uuid,
    user_id: Uuid,
    event_type: EventType,
    event_ts: DateTime<Utc>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    raw_payload: Option<HashMap<String, Value>>,
}

/// A validated raw engagement event as read from the log.
///
/// Construction goes through [`TryFrom<RawEventWire>`], so a `RawEvent`
/// that exists is already schema-valid: `duration_ms` is guaranteed to be
/// `Some` for `play | pause | finish` events. There is no separate
/// validator to run later.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawEventWire")]
pub struct RawEvent {
    pub id: i64,
    pub content_id: Uuid,
    pub user_id: Uuid,
    pub event_type: EventType,
    pub event_ts: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub device: Option<String>,
    pub raw_payload: Option<HashMap<String, Value>>,
}

impl TryFrom<RawEventWire> for RawEvent {
    type Error = String;

    fn try_from(wire: RawEventWire) -> Result<Self, Self::Error> {
        if wire.event_type.requires_duration() && wire.duration_ms.is_none() {
            return Err(format!(
                "duration_ms is required for {} events",
                wire.event_type
            ));
        }
        Ok(RawEvent {
            id: wire.id,
            content_id: wire.content_id,
            user_id: wire.user_id,
            event_type: wire.event_type,
            event_ts: wire.event_ts,
            duration_ms: wire.duration_ms,
            device: wire.device,
            raw_payload: wire.raw_payload,
        })
    }
}

impl RawEvent {
    /// Parse and validate a raw event from its JSON log-message value, for
    /// callers that need the validation error instead of a `serde_json`
    /// decode error. Validation failures map to [`PipelineError::Validation`]
    /// one level up in the enricher.
    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        let wire: RawEventWire =
            serde_json::from_slice(bytes).map_err(|e| format!("malformed event: {e}"))?;
        RawEvent::try_from(wire)
    }
}

/// A raw event joined with content metadata and the derived engagement
/// fields. Built only through [`EnrichedEvent::new`] — there is no mutable
/// builder and no post-hoc validation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    pub id: i64,
    pub content_id: Uuid,
    pub user_id: Uuid,
    pub event_type: EventType,
    pub event_ts: DateTime<Utc>,
    pub duration_ms: Option<u64>,
    pub device: Option<String>,
    pub raw_payload: Option<HashMap<String, Value>>,

    pub slug: String,
    pub title: String,
    pub content_type: ContentType,
    pub length_seconds: Option<i32>,

    pub engagement_seconds: Option<Decimal>,
    pub engagement_pct: Option<Decimal>,
}

impl EnrichedEvent {
    /// Join a raw event with the content it references and compute the
    /// derived engagement fields. See spec §3 for the derivation rules.
    pub fn new(raw: RawEvent, content: &Content) -> Self {
        let engagement_seconds = raw.duration_ms.map(|ms| {
            (Decimal::from(ms) / Decimal::from(1000))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        });

        let engagement_pct = match (engagement_seconds, content.length_seconds) {
            (Some(seconds), Some(length)) if length > 0 => {
                let pct = (seconds / Decimal::from(length)) * Decimal::from(100);
                Some(pct.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
            }
            _ => None,
        };

        EnrichedEvent {
            id: raw.id,
            content_id: raw.content_id,
            user_id: raw.user_id,
            event_type: raw.event_type,
            event_ts: raw.event_ts,
            duration_ms: raw.duration_ms,
            device: raw.device,
            raw_payload: raw.raw_payload,
            slug: content.slug.clone(),
            title: content.title.clone(),
            content_type: content.content_type,
            length_seconds: content.length_seconds,
            engagement_seconds,
            engagement_pct,
        }
    }
}
