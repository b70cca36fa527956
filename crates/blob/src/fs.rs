use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::{check_key, BlobMeta, BlobStore, Error, Result};

const META_SUFFIX: &str = ".meta.json";

/// Filesystem-backed store: keys map to paths under a root directory, with
/// metadata in a JSON sidecar next to each object. Writes land in a
/// temporary file and are renamed into place, so readers never observe a
/// partial object.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    fn not_found(key: &str, err: std::io::Error) -> Error {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(key.to_string())
        } else {
            Error::Io(err)
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for FileStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.path_of(key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|err| Self::not_found(key, err))?;
        Ok(data.into())
    }

    async fn get_range(&self, key: &str, offset: u64, len: u64) -> Result<Bytes> {
        let path = self.path_of(key)?;
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|err| Self::not_found(key, err))?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; len as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf.into())
    }

    async fn put(&self, key: &str, data: Bytes, meta: BlobMeta) -> Result<()> {
        let path = self.path_of(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        let sidecar = serde_json::to_vec(&meta).expect("meta serializes");
        tokio::fs::write(meta_path(&path), sidecar).await?;
        Ok(())
    }

    async fn meta(&self, key: &str) -> Result<BlobMeta> {
        let path = self.path_of(key)?;
        let data = tokio::fs::read(meta_path(&path))
            .await
            .map_err(|err| Self::not_found(key, err))?;
        serde_json::from_slice(&data).map_err(|_| Error::Meta(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = self.key_of(&path) else { continue };
                if key.starts_with(prefix) && !key.ends_with(META_SUFFIX) {
                    found.push(key);
                }
            }
        }
        Ok(found)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_of(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| Self::not_found(key, err))?;
        // Absence of a sidecar is not an error.
        let _ = tokio::fs::remove_file(meta_path(&path)).await;
        Ok(())
    }
}

impl FileStore {
    fn key_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }
}

fn meta_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(META_SUFFIX);
    PathBuf::from(os)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn round_trip_with_sidecar_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        let meta = BlobMeta {
            created_ms: 1234,
            content_type: Some("application/cose".to_string()),
            cache_control: None,
            custom: [("fence-index".to_string(), "7".to_string())].into(),
        };
        store
            .put("logs/a/leaves/0/deadbeef", Bytes::from_static(b"payload"), meta.clone())
            .await
            .unwrap();

        assert_eq!(store.get("logs/a/leaves/0/deadbeef").await.unwrap(), "payload");
        assert_eq!(store.meta("logs/a/leaves/0/deadbeef").await.unwrap(), meta);
        assert_eq!(store.get_range("logs/a/leaves/0/deadbeef", 3, 4).await.unwrap(), "load");

        // Listing never surfaces metadata sidecars.
        assert_eq!(store.list("logs/").await.unwrap(), vec!["logs/a/leaves/0/deadbeef"]);

        store.delete("logs/a/leaves/0/deadbeef").await.unwrap();
        assert!(matches!(
            store.get("logs/a/leaves/0/deadbeef").await,
            Err(Error::NotFound(_)),
        ));
    }

    #[tokio::test]
    async fn range_read_past_end_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store
            .put("blob", Bytes::from_static(b"0123456789"), BlobMeta::default())
            .await
            .unwrap();
        assert_eq!(store.get_range("blob", 6, 100).await.unwrap(), "6789");
    }
}
