use std::collections::BTreeMap;
use std::sync::Mutex;

use bytes::Bytes;

use crate::{check_key, BlobMeta, BlobStore, Error, Result};

/// In-memory store used by tests and by `:memory:` development mode.
#[derive(Default)]
pub struct MemStore {
    objects: Mutex<BTreeMap<String, (Bytes, BlobMeta)>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes> {
        let data = self.get(key).await?;
        let start = (offset as usize).min(data.len());
        let end = (offset.saturating_add(len) as usize).min(data.len());
        Ok(data.slice(start..end))
    }

    async fn put(&self, key: &str, data: Bytes, meta: BlobMeta) -> Result<()> {
        check_key(key)?;
        let mut objects = self.objects.lock().unwrap();
        objects.insert(key.to_string(), (data, meta));
        Ok(())
    }

    async fn meta(&self, key: &str) -> Result<BlobMeta> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(key)
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }
}
