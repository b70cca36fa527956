use bytes::Bytes;
use url::Url;

use crate::{check_key, BlobMeta, BlobStore, Error, Result};

/// Read-only store over an HTTP(S) base URL, for deployments where massif
/// and checkpoint objects are served from a bucket endpoint or CDN. Range
/// requests map to `Range: bytes=..` headers; servers that ignore ranges
/// and reply 200 are tolerated by slicing locally.
pub struct HttpReader {
    base: Url,
    http: reqwest::Client,
}

impl HttpReader {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            http: reqwest::Client::new(),
        }
    }

    fn url_of(&self, key: &str) -> Result<Url> {
        check_key(key)?;
        self.base
            .join(key)
            .map_err(|_| Error::InvalidKey(key.to_string()))
    }

    async fn fetch(&self, key: &str, range: Option<(u64, u64)>) -> Result<Bytes> {
        let mut request = self.http.get(self.url_of(key)?);
        if let Some((offset, len)) = range {
            let end = offset + len - 1;
            request = request.header(reqwest::header::RANGE, format!("bytes={offset}-{end}"));
        }

        let response = request.send().await.map_err(Error::Fetch)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND
            || response.status() == reqwest::StatusCode::RANGE_NOT_SATISFIABLE
        {
            return Err(Error::NotFound(key.to_string()));
        }
        let ranged = response.status() == reqwest::StatusCode::PARTIAL_CONTENT;
        let response = response.error_for_status().map_err(Error::Fetch)?;
        let body = response.bytes().await.map_err(Error::Fetch)?;

        match range {
            Some((offset, len)) if !ranged => {
                let start = (offset as usize).min(body.len());
                let end = (offset.saturating_add(len) as usize).min(body.len());
                Ok(body.slice(start..end))
            }
            _ => Ok(body),
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpReader {
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.fetch(key, None).await
    }

    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        self.fetch(key, Some((offset, len))).await
    }

    async fn put(&self, _key: &str, _data: Bytes, _meta: BlobMeta) -> Result<()> {
        Err(Error::Unsupported)
    }

    async fn meta(&self, _key: &str) -> Result<BlobMeta> {
        Err(Error::Unsupported)
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<String>> {
        Err(Error::Unsupported)
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(Error::Unsupported)
    }
}
