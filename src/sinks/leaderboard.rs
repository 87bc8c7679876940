//! Leaderboard sink (spec §4.3): recent-events stream, per-content
//! counters, windowed activity, and a top-N scoreboard, all backed by a
//! key/value store that supports hashes, sets, sorted sets, streams, and
//! TTLs. Grounded on the original `redis_sink.py::_update_content_aggregations`
//! (one pipelined transaction per event) and, for the background cleanup
//! task shape, on the teacher's `registry::background_tasks`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::prelude::*;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::model::{EnrichedEvent, EventType};

use super::SinkOutcome;

const RECENT_EVENTS_MAXLEN: usize = 1000;
const RECENT_EVENTS_TTL_SECS: i64 = 3600;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

fn base_score(event_type: EventType) -> f64 {
    match event_type {
        EventType::Play => 1.0,
        EventType::Pause => 0.5,
        EventType::Finish => 3.0,
        EventType::Click => 0.3,
    }
}

/// Per-event score delta (spec §4.3): `base × (1 + min(pct/100, 1.0))`.
fn event_score(event: &EnrichedEvent) -> f64 {
    let base = base_score(event.event_type);
    let multiplier = match event.engagement_pct {
        Some(pct) => 1.0 + pct.to_f64().unwrap_or(0.0).min(100.0).max(0.0) / 100.0,
        None => 1.0,
    };
    base * multiplier
}

/// Composite top-N row, spec §4.3 reads.
#[derive(Debug, Clone)]
pub struct TopContentEntry {
    pub content_id: Uuid,
    pub score: f64,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub total_events: u64,
    pub total_engagement_seconds: f64,
    pub unique_users: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ContentStats {
    pub total_events: u64,
    pub total_engagement_seconds: f64,
    pub unique_users: u64,
    pub window_event_count: u64,
}

/// The leaderboard sink's contract, abstracted behind a trait so the
/// coordinator can be exercised in tests without a running key/value
/// store, the same way [`crate::content::ContentStore`] decouples
/// content lookups from Postgres.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeaderboardWriter: Send + Sync {
    async fn dispatch(&mut self, event: &EnrichedEvent) -> SinkOutcome;
    async fn top_n(&mut self, limit: isize) -> Result<Vec<TopContentEntry>, String>;
    async fn content_stats(&mut self, content_id: Uuid) -> Result<ContentStats, String>;
    async fn recent_events(&mut self, content_id: Uuid, n: usize) -> Result<Vec<String>, String>;
}

pub struct LeaderboardSink {
    conn: ConnectionManager,
    top_content_key: String,
    window_minutes: i64,
    ttl_seconds: u64,
    shutdown: Option<watch::Sender<bool>>,
}

impl LeaderboardSink {
    pub async fn connect(
        url: &str,
        top_content_key: String,
        window_minutes: i64,
        ttl_seconds: u64,
    ) -> Result<Self, String> {
        let client = redis::Client::open(url).map_err(|e| e.to_string())?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| e.to_string())?;
        Ok(LeaderboardSink {
            conn,
            top_content_key,
            window_minutes,
            ttl_seconds,
            shutdown: None,
        })
    }

    fn window_key(&self, content_id: Uuid) -> String {
        format!("content_window:{content_id}:{}min", self.window_minutes)
    }

    async fn dispatch_impl(&mut self, event: &EnrichedEvent) -> SinkOutcome {
        match self.dispatch_inner(event).await {
            Ok(()) => SinkOutcome::Delivered,
            Err(e) => {
                tracing::warn!(event_id = event.id, error = %e, "leaderboard dispatch failed");
                SinkOutcome::Failed(e)
            }
        }
    }

    async fn dispatch_inner(&mut self, event: &EnrichedEvent) -> Result<(), String> {
        let now = Utc::now().timestamp();
        let content_id = event.content_id;
        let stream_key = format!("recent_events:{content_id}");
        let stats_key = format!("content_stats:{content_id}");
        let users_key = format!("content_stats:{content_id}:users");
        let window_key = self.window_key(content_id);
        let meta_key = format!("content_meta:{content_id}");

        let summary = json!({
            "event_id": event.id,
            "user_id": event.user_id,
            "event_type": event.event_type.as_str(),
            "event_ts": event.event_ts,
            "engagement_seconds": event.engagement_seconds.and_then(|d| d.to_f64()),
            "engagement_pct": event.engagement_pct.and_then(|d| d.to_f64()),
            "device": event.device,
        })
        .to_string();

        let mut pipe = redis::pipe();
        pipe.atomic();

        pipe.cmd("XADD")
            .arg(&stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(RECENT_EVENTS_MAXLEN)
            .arg("*")
            .arg("summary")
            .arg(&summary)
            .ignore();
        pipe.expire(&stream_key, RECENT_EVENTS_TTL_SECS).ignore();

        pipe.hincr(&stats_key, "total_events", 1i64).ignore();
        if let Some(seconds) = event.engagement_seconds.and_then(|d| d.to_f64()) {
            pipe.cmd("HINCRBYFLOAT")
                .arg(&stats_key)
                .arg("total_engagement_seconds")
                .arg(seconds)
                .ignore();
        }
        pipe.expire(&stats_key, self.ttl_seconds as i64).ignore();
        pipe.sadd(&users_key, event.user_id.to_string()).ignore();
        pipe.expire(&users_key, self.ttl_seconds as i64).ignore();

        let cutoff = now - self.window_minutes * 60;
        pipe.zadd(&window_key, format!("{}:{now}", event.id), now)
            .ignore();
        pipe.zrembyscore(&window_key, "-inf", cutoff).ignore();
        pipe.expire(&window_key, self.ttl_seconds as i64).ignore();

        let score = event_score(event);
        if score > 0.0 {
            pipe.zincr(&self.top_content_key, content_id.to_string(), score)
                .ignore();
            pipe.expire(&self.top_content_key, self.ttl_seconds as i64)
                .ignore();
            pipe.hset_multiple(
                &meta_key,
                &[
                    ("slug", event.slug.clone()),
                    ("title", event.title.clone()),
                    ("content_type", event.content_type.to_string()),
                    ("last_updated", now.to_string()),
                ],
            )
            .ignore();
            pipe.expire(&meta_key, self.ttl_seconds as i64).ignore();
        }

        pipe.query_async::<_, ()>(&mut self.conn)
            .await
            .map_err(|e| e.to_string())
    }

    /// Top `limit` content ids by scoreboard score, joined with their
    /// metadata and counters (spec §4.3 reads).
    async fn top_n_impl(&mut self, limit: isize) -> Result<Vec<TopContentEntry>, String> {
        let ranked: Vec<(String, f64)> = self
            .conn
            .zrevrange_withscores(&self.top_content_key, 0, limit.saturating_sub(1))
            .await
            .map_err(|e| e.to_string())?;

        let mut entries = Vec::with_capacity(ranked.len());
        for (id_str, score) in ranked {
            let content_id = Uuid::parse_str(&id_str).map_err(|e| e.to_string())?;
            let meta_key = format!("content_meta:{content_id}");
            let meta: std::collections::HashMap<String, String> = self
                .conn
                .hgetall(&meta_key)
                .await
                .map_err(|e| e.to_string())?;
            let stats = self.content_stats_impl(content_id).await?;

            entries.push(TopContentEntry {
                content_id,
                score,
                slug: meta.get("slug").cloned(),
                title: meta.get("title").cloned(),
                content_type: meta.get("content_type").cloned(),
                total_events: stats.total_events,
                total_engagement_seconds: stats.total_engagement_seconds,
                unique_users: stats.unique_users,
            });
        }
        Ok(entries)
    }

    /// Counters plus window entry count for one content id (spec §4.3 reads).
    async fn content_stats_impl(&mut self, content_id: Uuid) -> Result<ContentStats, String> {
        let stats_key = format!("content_stats:{content_id}");
        let users_key = format!("content_stats:{content_id}:users");
        let window_key = self.window_key(content_id);

        let fields: std::collections::HashMap<String, String> = self
            .conn
            .hgetall(&stats_key)
            .await
            .map_err(|e| e.to_string())?;
        let unique_users: u64 = self.conn.scard(&users_key).await.map_err(|e| e.to_string())?;
        let window_event_count: u64 = self
            .conn
            .zcard(&window_key)
            .await
            .map_err(|e| e.to_string())?;

        Ok(ContentStats {
            total_events: fields
                .get("total_events")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            total_engagement_seconds: fields
                .get("total_engagement_seconds")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            unique_users,
            window_event_count,
        })
    }

    /// Last `n` recent-events stream entries for a content id (spec §4.3 reads).
    async fn recent_events_impl(
        &mut self,
        content_id: Uuid,
        n: usize,
    ) -> Result<Vec<String>, String> {
        let stream_key = format!("recent_events:{content_id}");
        let entries: Vec<(String, Vec<(String, String)>)> = self
            .conn
            .xrevrange_count(&stream_key, "+", "-", n)
            .await
            .map_err(|e| e.to_string())?;
        Ok(entries
            .into_iter()
            .filter_map(|(_, fields)| fields.into_iter().find(|(k, _)| k == "summary").map(|(_, v)| v))
            .collect())
    }

    /// Spawn the periodic window-trim/empty-key cleanup (spec §4.3).
    /// Cooperative shutdown via `watch`, matching the teacher's
    /// `RegistryBackgroundTasks::start_cleanup_task` shape.
    pub fn start_cleanup_task(&mut self) {
        let (tx, mut rx) = watch::channel(false);
        self.shutdown = Some(tx);
        let mut conn = self.conn.clone();
        let window_minutes = self.window_minutes;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(CLEANUP_INTERVAL) => {
                        if let Err(e) = cleanup_pass(&mut conn, window_minutes).await {
                            tracing::warn!(error = %e, "leaderboard cleanup pass failed");
                        }
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    pub fn stop_cleanup_task(&self) {
        if let Some(tx) = &self.shutdown {
            let _ = tx.send(true);
        }
    }
}

#[async_trait]
impl LeaderboardWriter for LeaderboardSink {
    async fn dispatch(&mut self, event: &EnrichedEvent) -> SinkOutcome {
        self.dispatch_impl(event).await
    }

    async fn top_n(&mut self, limit: isize) -> Result<Vec<TopContentEntry>, String> {
        self.top_n_impl(limit).await
    }

    async fn content_stats(&mut self, content_id: Uuid) -> Result<ContentStats, String> {
        self.content_stats_impl(content_id).await
    }

    async fn recent_events(&mut self, content_id: Uuid, n: usize) -> Result<Vec<String>, String> {
        self.recent_events_impl(content_id, n).await
    }
}

async fn cleanup_pass(conn: &mut ConnectionManager, window_minutes: i64) -> Result<(), String> {
    let pattern = format!("content_window:*:{window_minutes}min");
    let cutoff = Utc::now().timestamp() - window_minutes * 60;

    let keys: Vec<String> = conn.keys(&pattern).await.map_err(|e| e.to_string())?;
    for key in keys {
        conn.zrembyscore::<_, _, _, ()>(&key, "-inf", cutoff)
            .await
            .map_err(|e| e.to_string())?;
        let remaining: i64 = conn.zcard(&key).await.map_err(|e| e.to_string())?;
        if remaining == 0 {
            let _: () = conn.del(&key).await.map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn event(event_type: EventType, engagement_pct: Option<i64>) -> EnrichedEvent {
        EnrichedEvent {
            id: 1,
            content_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            event_type,
            event_ts: Utc::now(),
            duration_ms: None,
            device: None,
            raw_payload: None,
            slug: "v1".into(),
            title: "Video One".into(),
            content_type: crate::model::ContentType::Video,
            length_seconds: Some(300),
            engagement_seconds: None,
            engagement_pct: engagement_pct.map(Decimal::from),
        }
    }

    #[test]
    fn s1_finish_score_matches_spec_example() {
        let event = event(EventType::Finish, Some(20));
        assert!((event_score(&event) - 3.60).abs() < 1e-9);
    }

    #[test]
    fn s2_click_without_engagement_uses_base_score() {
        let event = event(EventType::Click, None);
        assert!((event_score(&event) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn full_engagement_caps_multiplier_at_two() {
        let event = event(EventType::Play, Some(100));
        assert!((event_score(&event) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn s6_ten_full_finishes_sum_to_sixty() {
        let per_event = event_score(&event(EventType::Finish, Some(100)));
        assert!((per_event * 10.0 - 60.0).abs() < 1e-9);
    }
}
