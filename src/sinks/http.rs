//! HTTP sink (spec §4.5): per-event forwarder with bounded retries, an
//! optional batch endpoint with per-event fallback, and a heartbeat task
//! restored from the original's `external_sink.py::send_heartbeat`.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use uuid::Uuid;

use crate::error::RetryPolicy;
use crate::model::{BatchEnvelope, EnrichedEvent, HttpEnvelope};

use super::SinkOutcome;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

fn is_success(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::ACCEPTED
}

/// Either a live forwarder or a no-op stand-in, chosen once at
/// construction (spec §4.5: init failure degrades, never aborts).
pub enum HttpSink {
    Live(LiveHttpSink),
    Degraded,
}

impl HttpSink {
    pub fn connect(base_url: &str, timeout: Duration, retry_attempts: u32) -> Self {
        match Client::builder().timeout(timeout).build() {
            Ok(client) => HttpSink::Live(LiveHttpSink {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                policy: RetryPolicy {
                    max_attempts: retry_attempts,
                    ..RetryPolicy::default()
                },
                timeout,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "http sink client build failed; degrading to no-op");
                HttpSink::Degraded
            }
        }
    }

    pub async fn send(&self, event: &EnrichedEvent) -> SinkOutcome {
        match self {
            HttpSink::Live(sink) => sink.send(event).await,
            HttpSink::Degraded => SinkOutcome::Degraded,
        }
    }

    pub async fn send_batch(&self, events: &[EnrichedEvent], batch_id: String) -> Vec<SinkOutcome> {
        match self {
            HttpSink::Live(sink) => sink.send_batch(events, batch_id).await,
            HttpSink::Degraded => events.iter().map(|_| SinkOutcome::Degraded).collect(),
        }
    }

    pub fn start_heartbeat_task(&self) {
        if let HttpSink::Live(sink) = self {
            sink.start_heartbeat_task();
        }
    }
}

pub struct LiveHttpSink {
    client: Client,
    base_url: String,
    policy: RetryPolicy,
    timeout: Duration,
}

impl LiveHttpSink {
    /// Post one event's envelope, retrying up to `max_attempts` times with
    /// the shared backoff policy. 2xx and 202 count as success.
    async fn send(&self, event: &EnrichedEvent) -> SinkOutcome {
        let envelope = HttpEnvelope::from_enriched(event);
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.client.post(&self.base_url).json(&envelope).send().await {
                Ok(response) if is_success(response.status()) => return SinkOutcome::Delivered,
                Ok(response) => {
                    last_error = format!("status {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
        }

        tracing::warn!(event_id = event.id, error = %last_error, "http sink exhausted retries");
        SinkOutcome::Failed(last_error)
    }

    /// Post the whole batch to `…/batch` with doubled timeout; on any
    /// non-2xx response fall back to sending each event individually.
    async fn send_batch(&self, events: &[EnrichedEvent], batch_id: String) -> Vec<SinkOutcome> {
        let envelopes: Vec<HttpEnvelope> = events.iter().map(HttpEnvelope::from_enriched).collect();
        let batch = BatchEnvelope::new(envelopes, batch_id);
        let batch_url = format!("{}/batch", self.base_url);

        let batch_client = match Client::builder().timeout(self.timeout * 2).build() {
            Ok(c) => c,
            Err(_) => self.client.clone(),
        };

        let response = batch_client.post(&batch_url).json(&batch).send().await;
        match response {
            Ok(resp) if is_success(resp.status()) => {
                events.iter().map(|_| SinkOutcome::Delivered).collect()
            }
            _ => {
                let mut outcomes = Vec::with_capacity(events.len());
                for event in events {
                    outcomes.push(self.send(event).await);
                }
                outcomes
            }
        }
    }

    /// Fire-and-forget liveness ping every 60s, ambient addition outside
    /// the per-event dispatch path (spec §4.5).
    fn start_heartbeat_task(&self) {
        let client = self.client.clone();
        let heartbeat_url = format!("{}/heartbeat", self.base_url);
        let instance_id = Uuid::new_v4();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEARTBEAT_INTERVAL).await;
                let body = serde_json::json!({ "instance_id": instance_id.to_string() });
                if let Err(e) = client.post(&heartbeat_url).json(&body).send().await {
                    tracing::debug!(error = %e, "heartbeat send failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_and_2xx_both_count_as_success() {
        assert!(is_success(StatusCode::OK));
        assert!(is_success(StatusCode::ACCEPTED));
        assert!(is_success(StatusCode::CREATED));
    }

    #[test]
    fn client_errors_are_not_success() {
        assert!(!is_success(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_success(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn degraded_sink_reports_degraded_without_network() {
        let sink = HttpSink::Degraded;
        let content = crate::model::Content {
            id: Uuid::new_v4(),
            slug: "v1".into(),
            title: "Video One".into(),
            content_type: crate::model::ContentType::Video,
            length_seconds: Some(300),
            publish_ts: chrono::Utc::now(),
        };
        let raw = crate::model::RawEvent {
            id: 1,
            content_id: content.id,
            user_id: Uuid::new_v4(),
            event_type: crate::model::EventType::Click,
            event_ts: chrono::Utc::now(),
            duration_ms: None,
            device: None,
            raw_payload: None,
        };
        let event = EnrichedEvent::new(raw, &content);
        assert_eq!(sink.send(&event).await, SinkOutcome::Degraded);
    }
}
