//! The content-addressed inbound cache of raw signed statements.
//!
//! The sequencing queue is the authoritative ingress record; this cache is a
//! best-effort overflow keyed by content hash, partitioned by the fence
//! index captured at ingress time. Objects are immutable once written, and
//! a periodic sweep enforces the service's leaf TTL.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::{BlobMeta, BlobStore, Error, Result};

/// Cache headers for content-addressed objects: the key commits to the
/// bytes, so any cached copy is valid forever.
const CACHE_FOREVER: &str = "public, max-age=31536000, immutable";

pub struct LeafCache {
    store: Arc<dyn BlobStore>,
    ttl: Duration,
}

impl LeafCache {
    pub fn new(store: Arc<dyn BlobStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(log_id: &str, fence_index: u64, sha256_hex: &str) -> String {
        format!("logs/{log_id}/leaves/{fence_index}/{sha256_hex}")
    }

    /// Write one raw statement. Re-writing the same key is idempotent: the
    /// content is identical by construction, so last-writer-wins at the
    /// store is acceptable.
    pub async fn put(
        &self,
        log_id: &str,
        fence_index: u64,
        sha256_hex: &str,
        content: Bytes,
        content_type: &str,
        now_ms: i64,
    ) -> Result<String> {
        let key = Self::key(log_id, fence_index, sha256_hex);
        let meta = BlobMeta {
            created_ms: now_ms,
            content_type: Some(content_type.to_string()),
            cache_control: Some(CACHE_FOREVER.to_string()),
            custom: [
                ("log-id".to_string(), log_id.to_string()),
                ("fence-index".to_string(), fence_index.to_string()),
            ]
            .into(),
        };
        self.store.put(&key, content, meta).await?;
        Ok(key)
    }

    /// Delete cached leaves older than the TTL. Returns the number removed.
    pub async fn sweep(&self, now_ms: i64) -> Result<usize> {
        let cutoff = now_ms - self.ttl.as_millis() as i64;
        let mut removed = 0;

        for key in self.store.list("logs/").await? {
            if !key.contains("/leaves/") {
                continue;
            }
            let created_ms = match self.store.meta(&key).await {
                Ok(meta) => meta.created_ms,
                // Swept concurrently, or a sidecar went missing; skip it.
                Err(Error::NotFound(_)) | Err(Error::Meta(_)) => continue,
                Err(err) => return Err(err),
            };
            if created_ms >= cutoff {
                continue;
            }
            match self.store.delete(&key).await {
                Ok(()) => removed += 1,
                Err(Error::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::MemStore;

    #[tokio::test]
    async fn put_records_cache_headers_and_custom_metadata() {
        let store = Arc::new(MemStore::new());
        let cache = LeafCache::new(store.clone(), Duration::from_secs(60));

        let key = cache
            .put("a-log", 7, "deadbeef", Bytes::from_static(b"cose"), "application/cose", 1_000)
            .await
            .unwrap();
        assert_eq!(key, "logs/a-log/leaves/7/deadbeef");

        let meta = store.meta(&key).await.unwrap();
        assert_eq!(meta.cache_control.as_deref(), Some(CACHE_FOREVER));
        assert_eq!(meta.custom["log-id"], "a-log");
        assert_eq!(meta.custom["fence-index"], "7");
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_leaves() {
        let store = Arc::new(MemStore::new());
        let cache = LeafCache::new(store.clone(), Duration::from_secs(10));

        let body = Bytes::from_static(b"cose");
        cache.put("log", 0, "old", body.clone(), "application/cose", 0).await.unwrap();
        cache.put("log", 0, "new", body.clone(), "application/cose", 9_000).await.unwrap();

        // An unrelated object under logs/ is not a leaf and is untouched.
        store
            .put("logs/log/other", body, crate::BlobMeta::default())
            .await
            .unwrap();

        let removed = cache.sweep(12_000).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("logs/log/leaves/0/old").await.is_err());
        assert!(store.get("logs/log/leaves/0/new").await.is_ok());
        assert!(store.get("logs/log/other").await.is_ok());
    }
}
