//! Content Resolver (spec §4.1): looks up content metadata by id against
//! the relational store, with an in-memory cache on top since content is
//! slow-changing and stale reads within minutes are acceptable.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::model::Content;

/// Outcome of a content lookup that didn't return metadata.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No row for this content id — the caller should drop the event as
    /// an orphan, not retry.
    #[error("content {0} not found")]
    NotFound(Uuid),

    /// The store itself could not be reached — fatal to the current
    /// batch (spec §4.1).
    #[error("content store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<sqlx::Error> for ResolveError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => ResolveError::StoreUnavailable(
                "RowNotFound reached resolve() directly; query should use fetch_optional".into(),
            ),
            other => ResolveError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Read-only access to content metadata. Abstracted behind a trait so
/// tests can substitute an in-memory store (see `tests/enrichment.rs`).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn find(&self, content_id: Uuid) -> Result<Option<Content>, ResolveError>;
}

/// `sqlx`-backed implementation of [`ContentStore`] against the `content`
/// table described in spec §6.
pub struct PostgresContentStore {
    pool: PgPool,
}

impl PostgresContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for PostgresContentStore {
    async fn find(&self, content_id: Uuid) -> Result<Option<Content>, ResolveError> {
        let row = sqlx::query_as::<_, Content>(
            "SELECT id, slug, title, content_type, length_seconds, publish_ts \
             FROM content WHERE id = $1",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

struct CacheEntry {
    content: Content,
    cached_at: Instant,
}

/// Caches [`ContentStore`] lookups in memory, bounded both by a max entry
/// count and a TTL, evicting lazily on insert. Correctness never depends
/// on the cache: a miss just means an extra store round trip.
pub struct ContentResolver<S: ContentStore> {
    store: S,
    cache: DashMap<Uuid, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
}

impl<S: ContentStore> ContentResolver<S> {
    pub fn new(store: S, max_entries: usize, ttl: Duration) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            max_entries,
            ttl,
        }
    }

    pub async fn resolve(&self, content_id: Uuid) -> Result<Content, ResolveError> {
        if let Some(entry) = self.cache.get(&content_id) {
            if entry.cached_at.elapsed() < self.ttl {
                return Ok(entry.content.clone());
            }
        }

        match self.store.find(content_id).await? {
            Some(content) => {
                self.insert(content_id, content.clone());
                Ok(content)
            }
            None => Err(ResolveError::NotFound(content_id)),
        }
    }

    fn insert(&self, content_id: Uuid, content: Content) {
        if self.cache.len() >= self.max_entries && !self.cache.contains_key(&content_id) {
            // Bounded cache, not an LRU: evict an arbitrary entry rather
            // than grow unbounded under cache-id churn.
            if let Some(stale) = self.cache.iter().next().map(|e| *e.key()) {
                self.cache.remove(&stale);
            }
        }
        self.cache.insert(
            content_id,
            CacheEntry {
                content,
                cached_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentType;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        content: Content,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentStore for CountingStore {
        async fn find(&self, content_id: Uuid) -> Result<Option<Content>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if content_id == self.content.id {
                Ok(Some(self.content.clone()))
            } else {
                Ok(None)
            }
        }
    }

    fn sample_content(id: Uuid) -> Content {
        Content {
            id,
            slug: "v1".into(),
            title: "Video One".into(),
            content_type: ContentType::Video,
            length_seconds: Some(300),
            publish_ts: Utc::now(),
        }
    }

    #[tokio::test]
    async fn cache_hit_avoids_second_store_call() {
        let id = Uuid::new_v4();
        let store = CountingStore {
            content: sample_content(id),
            calls: AtomicUsize::new(0),
        };
        let resolver = ContentResolver::new(store, 100, Duration::from_secs(60));

        resolver.resolve(id).await.unwrap();
        resolver.resolve(id).await.unwrap();

        assert_eq!(resolver.store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_content_is_not_found() {
        let id = Uuid::new_v4();
        let store = CountingStore {
            content: sample_content(Uuid::new_v4()),
            calls: AtomicUsize::new(0),
        };
        let resolver = ContentResolver::new(store, 100, Duration::from_secs(60));

        let err = resolver.resolve(id).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }
}
