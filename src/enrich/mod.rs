//! Enricher (spec §4.2): turns a raw log record into an [`EnrichedEvent`]
//! or a drop decision.

use uuid::Uuid;

use crate::content::{ContentResolver, ContentStore, ResolveError};
use crate::model::{EnrichedEvent, RawEvent};

/// Why an event was dropped rather than enriched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Failed schema validation (see [`RawEvent::from_json`]).
    Invalid(String),
    /// `content_id` has no matching content row.
    Orphan { content_id: Uuid, event_id: i64 },
}

/// Result of attempting to enrich one raw event.
pub enum EnrichOutcome {
    Enriched(EnrichedEvent),
    Dropped(DropReason),
    /// The content store itself is unreachable — fatal to the batch.
    StoreUnavailable(String),
}

/// Validates, looks up content for, and derives engagement fields on raw
/// events. Holds no mutable state of its own beyond the resolver's cache.
pub struct Enricher<S: ContentStore> {
    resolver: ContentResolver<S>,
}

impl<S: ContentStore> Enricher<S> {
    pub fn new(resolver: ContentResolver<S>) -> Self {
        Self { resolver }
    }

    /// Enrich a raw event that has already been decoded (and thus is
    /// schema-valid, per [`RawEvent`]'s `TryFrom` construction).
    pub async fn enrich(&self, raw: RawEvent) -> EnrichOutcome {
        match self.resolver.resolve(raw.content_id).await {
            Ok(content) => EnrichOutcome::Enriched(EnrichedEvent::new(raw, &content)),
            Err(ResolveError::NotFound(content_id)) => EnrichOutcome::Dropped(DropReason::Orphan {
                content_id,
                event_id: raw.id,
            }),
            Err(ResolveError::StoreUnavailable(message)) => EnrichOutcome::StoreUnavailable(message),
        }
    }

    /// Decode a raw log message and enrich it in one step, surfacing
    /// schema-validation failures as a drop rather than a decode panic.
    pub async fn enrich_bytes(&self, bytes: &[u8]) -> EnrichOutcome {
        match RawEvent::from_json(bytes) {
            Ok(raw) => self.enrich(raw).await,
            Err(message) => EnrichOutcome::Dropped(DropReason::Invalid(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MockContentStore;
    use crate::model::{Content, ContentType, EventType};
    use chrono::Utc;
    use std::time::Duration;

    fn raw_finish(content_id: Uuid) -> RawEvent {
        let json = format!(
            r#"{{"id":1,"content_id":"{}","user_id":"{}","event_type":"finish","event_ts":"2026-01-01T00:00:00Z","duration_ms":60000}}"#,
            content_id,
            Uuid::new_v4()
        );
        RawEvent::from_json(json.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn orphan_event_is_dropped_not_errored() {
        let mut mock = MockContentStore::new();
        mock.expect_find().returning(|_| Ok(None));
        let resolver = ContentResolver::new(mock, 10, Duration::from_secs(60));
        let enricher = Enricher::new(resolver);

        let outcome = enricher.enrich(raw_finish(Uuid::new_v4())).await;
        assert!(matches!(
            outcome,
            EnrichOutcome::Dropped(DropReason::Orphan { .. })
        ));
    }

    #[tokio::test]
    async fn known_content_produces_enriched_event() {
        let content_id = Uuid::new_v4();
        let mut mock = MockContentStore::new();
        mock.expect_find().returning(move |_| {
            Ok(Some(Content {
                id: content_id,
                slug: "v1".into(),
                title: "Video One".into(),
                content_type: ContentType::Video,
                length_seconds: Some(300),
                publish_ts: Utc::now(),
            }))
        });
        let resolver = ContentResolver::new(mock, 10, Duration::from_secs(60));
        let enricher = Enricher::new(resolver);

        match enricher.enrich(raw_finish(content_id)).await {
            EnrichOutcome::Enriched(event) => {
                assert_eq!(event.event_type, EventType::Finish);
                assert!(event.engagement_pct.is_some());
            }
            _ => panic!("expected enrichment to succeed"),
        }
    }

    #[tokio::test]
    async fn invalid_json_is_dropped_as_invalid() {
        let mut mock = MockContentStore::new();
        mock.expect_find().times(0).returning(|_| Ok(None));
        let resolver = ContentResolver::new(mock, 10, Duration::from_secs(60));
        let enricher = Enricher::new(resolver);

        let bad = br#"{"id":1,"event_type":"play"}"#;
        assert!(matches!(
            enricher.enrich_bytes(bad).await,
            EnrichOutcome::Dropped(DropReason::Invalid(_))
        ));
    }
}
