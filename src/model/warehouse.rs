use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::EnrichedEvent;

/// An [`EnrichedEvent`] flattened to the scalar columns the warehouse
/// table holds (spec §6): identifiers as strings, engagement fields as
/// floats (decimal precision was only needed for the computation, not the
/// storage — see `SPEC_FULL.md` §9).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WarehouseRecord {
    pub event_id: i64,
    pub content_id: String,
    pub user_id: String,
    pub event_type: String,
    pub event_timestamp: DateTime<Utc>,
    pub duration_ms: Option<i64>,
    pub engagement_seconds: Option<f64>,
    pub engagement_pct: Option<f64>,
    pub device: Option<String>,
    pub content_slug: String,
    pub content_title: String,
    pub content_type: String,
    pub content_length_seconds: Option<i32>,
    pub raw_payload: Option<Value>,
    pub processed_timestamp: DateTime<Utc>,
}

impl WarehouseRecord {
    pub fn from_enriched(event: &EnrichedEvent, processed_timestamp: DateTime<Utc>) -> Self {
        WarehouseRecord {
            event_id: event.id,
            content_id: event.content_id.to_string(),
            user_id: event.user_id.to_string(),
            event_type: event.event_type.as_str().to_string(),
            event_timestamp: event.event_ts,
            duration_ms: event.duration_ms.map(|ms| ms as i64),
            engagement_seconds: event.engagement_seconds.and_then(|d| d.to_f64()),
            engagement_pct: event.engagement_pct.and_then(|d| d.to_f64()),
            device: event.device.clone(),
            content_slug: event.slug.clone(),
            content_title: event.title.clone(),
            content_type: event.content_type.to_string(),
            content_length_seconds: event.length_seconds,
            raw_payload: event
                .raw_payload
                .as_ref()
                .map(|m| serde_json::to_value(m).unwrap_or(Value::Null)),
            processed_timestamp,
        }
    }
}
