//! Stream coordinator (spec §4.6): poll → accumulate → enrich → dispatch
//! → commit, one batch at a time. Grounded on the teacher's
//! `EventStreamConfig` polling loop shape, adapted to a stateful batch
//! accumulator with an explicit stage marker instead of a free-running
//! broadcast subscriber.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::content::ContentStore;
use crate::enrich::{DropReason, EnrichOutcome, Enricher};
use crate::model::RawEvent;
use crate::monitoring::Metrics;
use crate::sinks::{HttpSink, LeaderboardWriter, SinkOutcome, WarehouseSink};

use super::{EventLog, LogMessage};

/// Where a batch currently is in its processing lifecycle (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Accumulating,
    Enriching,
    Dispatching,
    Committing,
    Idle,
}

pub struct StreamCoordinator<L: EventLog, S: ContentStore, B: LeaderboardWriter> {
    log: L,
    enricher: Enricher<S>,
    leaderboard: B,
    warehouse: WarehouseSink,
    http: HttpSink,
    metrics: Metrics,

    batch_size: usize,
    flush_interval: Duration,
    max_poll_records: usize,
    manual_commit: bool,

    buffer: Vec<LogMessage>,
    last_flush: Instant,
    stage: BatchStage,
}

impl<L: EventLog, S: ContentStore, B: LeaderboardWriter> StreamCoordinator<L, S, B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        log: L,
        enricher: Enricher<S>,
        leaderboard: B,
        warehouse: WarehouseSink,
        http: HttpSink,
        batch_size: usize,
        flush_interval: Duration,
        max_poll_records: usize,
        manual_commit: bool,
    ) -> Self {
        StreamCoordinator {
            log,
            enricher,
            leaderboard,
            warehouse,
            http,
            metrics: Metrics::new(),
            batch_size,
            flush_interval,
            max_poll_records,
            manual_commit,
            buffer: Vec::new(),
            last_flush: Instant::now(),
            stage: BatchStage::Idle,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn stage(&self) -> BatchStage {
        self.stage
    }

    /// Run until `shutdown` reports `true`. A single iteration: poll,
    /// accumulate, and process the batch if it's due by size or age
    /// (spec §4.6 step 4 — idle ticks still trigger a time-based flush).
    pub async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) {
        self.metrics.set_running(true);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        if !self.buffer.is_empty() {
            self.process_batch().await;
        }
        self.metrics.set_running(false);
    }

    async fn tick(&mut self) {
        self.stage = BatchStage::Accumulating;
        match self.log.poll(self.max_poll_records, Duration::from_secs(1)).await {
            Ok(messages) => self.buffer.extend(messages),
            Err(e) => tracing::error!(error = %e, "log poll failed"),
        }
        self.metrics.set_buffer_size(self.buffer.len());

        let size_due = self.buffer.len() >= self.batch_size;
        let age_due = self.last_flush.elapsed() >= self.flush_interval;
        if size_due || age_due {
            self.process_batch().await;
        }
    }

    /// Enrich, dispatch, flush, and commit one batch. A `StoreUnavailable`
    /// hit during enrichment aborts the whole batch before any dispatch —
    /// offsets are left uncommitted so the next poll re-delivers
    /// everything (spec §7 TransientStore, §8 invariant 4).
    async fn process_batch(&mut self) {
        let messages = std::mem::take(&mut self.buffer);
        if messages.is_empty() {
            self.last_flush = Instant::now();
            return;
        }

        let mut offsets: HashMap<i32, i64> = HashMap::new();
        for msg in &messages {
            offsets
                .entry(msg.partition)
                .and_modify(|o| *o = (*o).max(msg.offset))
                .or_insert(msg.offset);
        }

        self.stage = BatchStage::Enriching;
        let mut survivors = Vec::new();
        for msg in messages {
            match RawEvent::from_json(&msg.value) {
                Ok(raw) => match self.enricher.enrich(raw).await {
                    EnrichOutcome::Enriched(event) => survivors.push(event),
                    EnrichOutcome::Dropped(DropReason::Invalid(reason)) => {
                        self.metrics.record_error();
                        tracing::warn!(reason = %reason, "dropped invalid event");
                    }
                    EnrichOutcome::Dropped(DropReason::Orphan { content_id, event_id }) => {
                        tracing::warn!(%content_id, event_id, "dropped orphan event");
                    }
                    EnrichOutcome::StoreUnavailable(reason) => {
                        tracing::error!(reason = %reason, "content store unavailable, aborting batch");
                        self.stage = BatchStage::Idle;
                        self.last_flush = Instant::now();
                        return;
                    }
                },
                Err(reason) => {
                    self.metrics.record_error();
                    tracing::warn!(reason = %reason, "dropped malformed event");
                }
            }
        }

        self.stage = BatchStage::Dispatching;
        for event in &survivors {
            let event_started = Instant::now();
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
                    self.metrics.record_error();
                    tracing::warn!(sink, event_id = event.id, reason = %reason, "sink dispatch failed");
                }
            }
            self.metrics
                .record_processed(event_started.elapsed(), chrono::Utc::now());
        }

        self.stage = BatchStage::Committing;
        if let Err(e) = self.warehouse.flush(true).await {
            tracing::warn!(error = %e, "explicit warehouse flush failed");
        }

        if self.manual_commit {
            if let Err(e) = self.log.commit(&offsets).await {
                tracing::error!(error = %e, "offset commit failed");
            }
        }

        self.last_flush = Instant::now();
        self.stage = BatchStage::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentResolver, MockContentStore};
    use crate::model::{Content, ContentType};
    use chrono::Utc;
    use uuid::Uuid;

    fn log_message(id: i64, content_id: Uuid, offset: i64) -> LogMessage {
        let json = format!(
            r#"{{"id":{id},"content_id":"{content_id}","user_id":"{}","event_type":"click","event_ts":"2026-01-01T00:00:00Z"}}"#,
            Uuid::new_v4()
        );
        LogMessage {
            partition: 0,
            offset,
            value: json.into_bytes(),
        }
    }

    fn coordinator_with(
        mock: MockContentStore,
        messages: Vec<LogMessage>,
    ) -> StreamCoordinator<
        crate::stream::test_support::InMemoryEventLog,
        MockContentStore,
        crate::sinks::MockLeaderboardWriter,
    > {
        let resolver = ContentResolver::new(mock, 10, Duration::from_secs(60));
        let enricher = Enricher::new(resolver);
        let log = crate::stream::test_support::InMemoryEventLog::new(messages);
        let mut leaderboard = crate::sinks::MockLeaderboardWriter::new();
        leaderboard.expect_dispatch().returning(|_| SinkOutcome::Delivered);
        StreamCoordinator::new(
            log,
            enricher,
            leaderboard,
            WarehouseSink::Degraded,
            HttpSink::Degraded,
            100,
            Duration::from_secs(1),
            500,
            true,
        )
    }

    #[tokio::test]
    async fn orphan_events_are_dropped_without_counting_as_an_error() {
        let unknown = Uuid::new_v4();
        let mut mock = MockContentStore::new();
        mock.expect_find().returning(|_| Ok(None));
        let mut coordinator = coordinator_with(mock, vec![log_message(1, unknown, 0)]);

        coordinator.process_batch().await;

        assert_eq!(coordinator.metrics().error_count(), 0);
        assert_eq!(coordinator.log.committed.get(&0), Some(&0));
    }

    #[tokio::test]
    async fn known_content_advances_offset_without_error() {
        let content_id = Uuid::new_v4();
        let mut mock = MockContentStore::new();
        mock.expect_find().returning(move |_| {
            Ok(Some(Content {
                id: content_id,
                slug: "n1".into(),
                title: "Newsletter One".into(),
                content_type: ContentType::Newsletter,
                length_seconds: None,
                publish_ts: Utc::now(),
            }))
        });
        let mut coordinator = coordinator_with(mock, vec![log_message(1, content_id, 5)]);

        coordinator.process_batch().await;

        assert_eq!(coordinator.metrics().error_count(), 0);
        assert_eq!(coordinator.metrics().processed_count(), 1);
        assert_eq!(coordinator.log.committed.get(&0), Some(&5));
    }

    #[tokio::test]
    async fn processed_count_is_incremented_once_per_surviving_event() {
        let content_id = Uuid::new_v4();
        let mut mock = MockContentStore::new();
        mock.expect_find().returning(move |_| {
            Ok(Some(Content {
                id: content_id,
                slug: "n1".into(),
                title: "Newsletter One".into(),
                content_type: ContentType::Newsletter,
                length_seconds: None,
                publish_ts: Utc::now(),
            }))
        });
        let messages: Vec<LogMessage> = (0..5).map(|i| log_message(i, content_id, i)).collect();
        let mut coordinator = coordinator_with(mock, messages);

        coordinator.process_batch().await;

        assert_eq!(coordinator.metrics().processed_count(), 5);
    }

    /// S4 (duplicate delivery): a crash between dispatch and offset commit
    /// means the next poll redelivers the same batch. Modelled here as two
    /// independent runs over the same 10-event batch sharing one dispatch
    /// counter — the redelivered run has no way to tell it already ran, so
    /// the leaderboard sees exactly double the dispatches (spec §7, §8 S4).
    #[tokio::test]
    async fn s4_duplicate_delivery_doubles_leaderboard_dispatch_count() {
        let content_id = Uuid::new_v4();
        let dispatch_calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let build = |calls: std::sync::Arc<std::sync::atomic::AtomicUsize>| {
            let mut mock = MockContentStore::new();
            mock.expect_find().returning(move |_| {
                Ok(Some(Content {
                    id: content_id,
                    slug: "p1".into(),
                    title: "Podcast One".into(),
                    content_type: ContentType::Podcast,
                    length_seconds: Some(600),
                    publish_ts: Utc::now(),
                }))
            });
            let resolver = ContentResolver::new(mock, 10, Duration::from_secs(60));
            let enricher = Enricher::new(resolver);
            let messages: Vec<LogMessage> = (0..10).map(|i| log_message(i, content_id, i)).collect();
            let log = crate::stream::test_support::InMemoryEventLog::new(messages);
            let mut leaderboard = crate::sinks::MockLeaderboardWriter::new();
            leaderboard.expect_dispatch().returning(move |_| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                SinkOutcome::Delivered
            });
            StreamCoordinator::new(
                log,
                enricher,
                leaderboard,
                WarehouseSink::Degraded,
                HttpSink::Degraded,
                100,
                Duration::from_secs(1),
                500,
                true,
            )
        };

        build(dispatch_calls.clone()).process_batch().await;
        build(dispatch_calls.clone()).process_batch().await;

        assert_eq!(
            dispatch_calls.load(std::sync::atomic::Ordering::SeqCst),
            20
        );
    }

    /// S5 (sink degradation): a warehouse that failed to connect degrades
    /// to a no-op rather than aborting the pipeline. Leaderboard and HTTP
    /// still receive every event, and the coordinator reports zero errors —
    /// degradation is not an error (spec §7, §8 S5).
    #[tokio::test]
    async fn s5_warehouse_degradation_is_not_counted_as_an_error() {
        let mock_server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let content_id = Uuid::new_v4();
        let mut mock = MockContentStore::new();
        mock.expect_find().returning(move |_| {
            Ok(Some(Content {
                id: content_id,
                slug: "p1".into(),
                title: "Podcast One".into(),
                content_type: ContentType::Podcast,
                length_seconds: Some(600),
                publish_ts: Utc::now(),
            }))
        });
        let resolver = ContentResolver::new(mock, 10, Duration::from_secs(60));
        let enricher = Enricher::new(resolver);

        let messages: Vec<LogMessage> = (0..100).map(|i| log_message(i, content_id, i)).collect();
        let log = crate::stream::test_support::InMemoryEventLog::new(messages);

        let mut leaderboard = crate::sinks::MockLeaderboardWriter::new();
        leaderboard
            .expect_dispatch()
            .times(100)
            .returning(|_| SinkOutcome::Delivered);

        let http = HttpSink::connect(&mock_server.uri(), Duration::from_secs(5), 3);

        let mut coordinator = StreamCoordinator::new(
            log,
            enricher,
            leaderboard,
            WarehouseSink::Degraded,
            http,
            200,
            Duration::from_secs(1),
            500,
            true,
        );

        coordinator.process_batch().await;

        assert_eq!(coordinator.metrics().error_count(), 0);
        assert_eq!(coordinator.metrics().processed_count(), 100);
    }
}
