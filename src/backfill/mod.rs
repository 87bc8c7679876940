//! Backfill coordinator (spec §4.7): time-bounded historical replay over
//! the relational store, fanned out through the same three sinks as the
//! live path. No log involvement — rows are read and paged directly.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::model::{Content, ContentType, EnrichedEvent, EventType, RawEvent};
use crate::sinks::{HttpSink, LeaderboardWriter, SinkOutcome, WarehouseSink};

const PAGE_SLEEP: Duration = Duration::from_millis(50);

/// One page row: the raw event columns joined with the content columns
/// it references (spec §4.7 step 1's `JOIN content ON …`).
#[derive(Debug, sqlx::FromRow)]
struct BackfillRow {
    event_id: i64,
    event_content_id: Uuid,
    user_id: Uuid,
    event_type: String,
    event_ts: DateTime<Utc>,
    duration_ms: Option<i64>,
    device: Option<String>,
    raw_payload: Option<Value>,

    content_id: Uuid,
    slug: String,
    title: String,
    content_type: String,
    length_seconds: Option<i32>,
    publish_ts: DateTime<Utc>,
}

impl TryFrom<BackfillRow> for EnrichedEvent {
    type Error = String;

    fn try_from(row: BackfillRow) -> Result<Self, Self::Error> {
        let event_type = match row.event_type.as_str() {
            "play" => EventType::Play,
            "pause" => EventType::Pause,
            "finish" => EventType::Finish,
            "click" => EventType::Click,
            other => return Err(format!("unknown event_type {other} in backfill row")),
        };
        let content_type = match row.content_type.as_str() {
            "podcast" => ContentType::Podcast,
            "newsletter" => ContentType::Newsletter,
            "video" => ContentType::Video,
            other => return Err(format!("unknown content_type {other} in backfill row")),
        };

        let raw_payload = match row.raw_payload {
            Some(Value::Object(map)) => {
                Some(map.into_iter().collect::<HashMap<String, Value>>())
            }
            Some(Value::Null) | None => None,
            Some(_) => return Err("raw_payload was not a JSON object".to_string()),
        };

        let raw = RawEvent {
            id: row.event_id,
            content_id: row.event_content_id,
            user_id: row.user_id,
            event_type,
            event_ts: row.event_ts,
            duration_ms: row.duration_ms.map(|ms| ms as u64),
            device: row.device,
            raw_payload,
        };
        let content = Content {
            id: row.content_id,
            slug: row.slug,
            title: row.title,
            content_type,
            length_seconds: row.length_seconds,
            publish_ts: row.publish_ts,
        };
        Ok(EnrichedEvent::new(raw, &content))
    }
}

pub struct BackfillCoordinator<B: LeaderboardWriter> {
    pool: PgPool,
    leaderboard: B,
    warehouse: WarehouseSink,
    http: HttpSink,
    page_size: i64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BackfillSummary {
    pub rows_read: u64,
    pub events_dispatched: u64,
    pub rows_skipped: u64,
}

impl<B: LeaderboardWriter> BackfillCoordinator<B> {
    pub fn new(
        pool: PgPool,
        leaderboard: B,
        warehouse: WarehouseSink,
        http: HttpSink,
        page_size: i64,
    ) -> Self {
        BackfillCoordinator {
            pool,
            leaderboard,
            warehouse,
            http,
            page_size,
        }
    }

    /// Replay `[start, end)`, paging until an empty page terminates the
    /// run (spec §4.7). Deterministic in the multiset of events produced:
    /// each page is ordered by `event_ts` (spec §8 invariant 7).
    pub async fn run(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<BackfillSummary, String> {
        let mut summary = BackfillSummary::default();
        let mut offset: i64 = 0;

        loop {
            let rows: Vec<BackfillRow> = sqlx::query_as(
                "SELECT e.id AS event_id, e.content_id AS event_content_id, e.user_id, \
                        e.event_type, e.event_ts, e.duration_ms, e.device, e.raw_payload, \
                        c.id AS content_id, c.slug, c.title, c.content_type, \
                        c.length_seconds, c.publish_ts \
                 FROM engagement_events e \
                 JOIN content c ON e.content_id = c.id \
                 WHERE e.event_ts >= $1 AND e.event_ts < $2 \
                 ORDER BY e.event_ts \
                 LIMIT $3 OFFSET $4",
            )
            .bind(start)
            .bind(end)
            .bind(self.page_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.to_string())?;

            if rows.is_empty() {
                break;
            }

            summary.rows_read += rows.len() as u64;
            for row in rows {
                match EnrichedEvent::try_from(row) {
                    Ok(event) => {
                        self.dispatch(&event).await;
                        summary.events_dispatched += 1;
                    }
                    Err(reason) => {
                        tracing::warn!(reason = %reason, "skipped unconvertible backfill row");
                        summary.rows_skipped += 1;
                    }
                }
            }

            self.warehouse.flush(true).await.map_err(|e| {
                tracing::warn!(error = %e, "warehouse flush failed during backfill");
                e
            })?;

            offset += self.page_size;
            tokio::time::sleep(PAGE_SLEEP).await;
        }

        Ok(summary)
    }

    async fn dispatch(&mut self, event: &EnrichedEvent) {
        let leaderboard = &mut self.leaderboard;
        let warehouse = &mut self.warehouse;
        let http = &self.http;
        let (lb_outcome, wh_outcome, http_outcome) = tokio::join!(
            leaderboard.dispatch(event),
            warehouse.append(event),
            http.send(event),
        );
        for (sink, outcome) in [
            ("leaderboard", lb_outcome),
            ("warehouse", wh_outcome),
            ("http", http_outcome),
        ] {
            if let SinkOutcome::Failed(reason) = outcome {
                tracing::warn!(sink, event_id = event.id, reason = %reason, "backfill sink dispatch failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(event_type: &str, content_type: &str) -> BackfillRow {
        let content_id = Uuid::new_v4();
        BackfillRow {
            event_id: 1,
            event_content_id: content_id,
            user_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            event_ts: Utc::now(),
            duration_ms: Some(60_000),
            device: None,
            raw_payload: None,
            content_id,
            slug: "v1".into(),
            title: "Video One".into(),
            content_type: content_type.to_string(),
            length_seconds: Some(300),
            publish_ts: Utc::now(),
        }
    }

    #[test]
    fn valid_row_converts_to_enriched_event() {
        let event = EnrichedEvent::try_from(row("finish", "video")).unwrap();
        assert_eq!(event.engagement_seconds, Some(rust_decimal::Decimal::new(6000, 2)));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(EnrichedEvent::try_from(row("skip", "video")).is_err());
    }

    #[test]
    fn unknown_content_type_is_rejected() {
        assert!(EnrichedEvent::try_from(row("finish", "ebook")).is_err());
    }
}
