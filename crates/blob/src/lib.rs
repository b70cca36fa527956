//! Object-storage access for massifs, checkpoints and the inbound leaf
//! cache.
//!
//! [`BlobStore`] is the only seam the rest of the service sees. Massif and
//! checkpoint blobs are immutable once written (their keys identify a
//! specific version), so readers never coordinate; the leaf cache is
//! write-many-read-many with idempotent content-addressed writes.

use std::collections::BTreeMap;

use bytes::Bytes;

mod fs;
mod http;
pub mod leaves;
mod mem;

pub use fs::FileStore;
pub use http::HttpReader;
pub use mem::MemStore;

/// Metadata carried alongside a stored object.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlobMeta {
    /// Milliseconds since the epoch at which the object was written.
    pub created_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// Opaque custom pairs. Stored verbatim and never interpreted.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("operation is not supported by this blob store")]
    Unsupported,
    #[error("invalid blob key: {0}")]
    InvalidKey(String),
    #[error("metadata sidecar for {0} is corrupt")]
    Meta(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to fetch blob from storage URL")]
    Fetch(#[source] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Byte-addressed object storage.
///
/// `get_range` returns the bytes that exist within the requested window,
/// which may be fewer than `len` near the end of an object; callers that
/// require an exact count check the returned length.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Bytes>;
    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes>;
    async fn put(&self, key: &str, data: Bytes, meta: BlobMeta) -> Result<()>;
    async fn meta(&self, key: &str) -> Result<BlobMeta>;
    /// Keys under `prefix`, in unspecified order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == ".." || part.is_empty())
    {
        return Err(Error::InvalidKey(key.to_string()));
    }
    Ok(())
}
