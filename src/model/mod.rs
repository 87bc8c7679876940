//! Data model for the engagement pipeline: raw log records, the content
//! metadata they're joined against, and the enriched + derived shape fed
//! to the three sinks.

mod content;
mod event;
mod http_payload;
mod warehouse;

pub use content::{Content, ContentType};
pub use event::{EnrichedEvent, EventType, RawEvent};
pub use http_payload::{BatchEnvelope, HttpEnvelope};
pub use warehouse::WarehouseRecord;
