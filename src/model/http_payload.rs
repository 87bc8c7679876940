use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::Value;

use super::event::EnrichedEvent;

/// The JSON envelope POSTed to the HTTP sink's endpoint for a single event
/// (spec §4.5).
#[derive(Debug, Clone, Serialize)]
pub struct HttpEnvelope {
    pub event_id: i64,
    pub content_id: String,
    pub user_id: String,
    pub event_type: String,
    pub timestamp: String,
    pub metadata: HttpEnvelopeMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct HttpEnvelopeMetadata {
    pub content_title: String,
    pub content_type: String,
    pub device: Option<String>,
    pub engagement_seconds: Option<f64>,
    pub engagement_pct: Option<f64>,
    pub raw_payload: Option<Value>,
}

impl HttpEnvelope {
    pub fn from_enriched(event: &EnrichedEvent) -> Self {
        HttpEnvelope {
            event_id: event.id,
            content_id: event.content_id.to_string(),
            user_id: event.user_id.to_string(),
            event_type: event.event_type.as_str().to_string(),
            timestamp: event.event_ts.to_rfc3339(),
            metadata: HttpEnvelopeMetadata {
                content_title: event.title.clone(),
                content_type: event.content_type.to_string(),
                device: event.device.clone(),
                engagement_seconds: event.engagement_seconds.and_then(|d| d.to_f64()),
                engagement_pct: event.engagement_pct.and_then(|d| d.to_f64()),
                raw_payload: event
                    .raw_payload
                    .as_ref()
                    .map(|m| serde_json::to_value(m).unwrap_or(Value::Null)),
            },
        }
    }
}

/// Batch envelope POSTed to the optional `…/batch` endpoint (spec §4.5).
#[derive(Debug, Clone, Serialize)]
pub struct BatchEnvelope {
    pub events: Vec<HttpEnvelope>,
    pub batch_id: String,
    pub event_count: usize,
}

impl BatchEnvelope {
    pub fn new(events: Vec<HttpEnvelope>, batch_id: String) -> Self {
        let event_count = events.len();
        BatchEnvelope {
            events,
            batch_id,
            event_count,
        }
    }
}
