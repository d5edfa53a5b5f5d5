// src/store/mod.rs
// =============================================================================
// One-JSON-file-per-URL snapshot storage.
//
// Used for both the page cache and change-detection baselines:
// - the file name is the SHA-256 of the URL (hex), so any URL maps to a
//   safe, fixed-length name
// - each file is a self-describing JSON snapshot, so write-then-read gives
//   back exactly what was written
// - writes to the same key are serialized with a per-key async lock and go
//   through a temp file + rename, so readers never see half a file
// - different keys never wait on each other, and a key's lock is dropped
//   from the map once its last holder is done
// =============================================================================

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt snapshot: {0}")]
    Serde(#[from] serde_json::Error),
}

/// SHA-256 of `input`, hex encoded.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// A stored snapshot plus what the directory listing knows about it.
#[derive(Debug)]
pub struct StoredItem<T> {
    pub key: String,
    pub value: T,
    pub bytes: u64,
}

pub struct JsonStore<T> {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned,
{
    // Opens (and creates if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            locks: DashMap::new(),
            _marker: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Key (file stem) for a URL.
    pub fn key_for(url: &str) -> String {
        sha256_hex(url)
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // Reads the snapshot for `url`; Ok(None) if there is none.
    pub async fn load(&self, url: &str) -> Result<Option<T>, StoreError> {
        let path = self.path_for_key(&Self::key_for(url));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // Drops the map entry for `key` once no task holds its lock. A task
    // that cloned the lock first keeps the entry alive.
    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(key, |_, l| Arc::strong_count(l) == 1);
    }

    // Writes (overwrites) the snapshot for `url`.
    pub async fn save(&self, url: &str, value: &T) -> Result<(), StoreError> {
        let key = Self::key_for(url);
        let bytes = serde_json::to_vec_pretty(value)?;

        let lock = self.lock_for(&key);
        let result = {
            let _guard = lock.lock().await;
            self.write_file(&key, &bytes).await
        };
        self.release(&key, lock);
        result
    }

    async fn write_file(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for_key(key);
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    // Deletes one snapshot by key. Missing files are not an error.
    pub async fn remove_key(&self, key: &str) -> Result<(), StoreError> {
        let lock = self.lock_for(key);
        let result = {
            let _guard = lock.lock().await;
            match tokio::fs::remove_file(self.path_for_key(key)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        };
        self.release(key, lock);
        result
    }

    // Lists every readable snapshot.
    //
    // Files that fail to parse are logged and skipped rather than failing
    // the whole listing.
    pub async fn entries(&self) -> Result<Vec<StoredItem<T>>, StoreError> {
        let mut items = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let key = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };

            let bytes = match tokio::fs::read(&path).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable snapshot");
                    continue;
                }
            };
            match serde_json::from_slice(&bytes) {
                Ok(value) => items.push(StoredItem {
                    key,
                    value,
                    bytes: bytes.len() as u64,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping corrupt snapshot");
                }
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        url: String,
        body: String,
        seen: u32,
    }

    #[test]
    fn test_keys_are_stable_hex_digests() {
        let key = JsonStore::<Snapshot>::key_for("https://example.com/");
        assert_eq!(key.len(), 64);
        assert_eq!(key, JsonStore::<Snapshot>::key_for("https://example.com/"));
        assert_ne!(key, JsonStore::<Snapshot>::key_for("https://example.com"));
    }

    #[tokio::test]
    async fn test_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::<Snapshot>::open(dir.path()).unwrap();
        let snap = Snapshot {
            url: "https://example.com/a".into(),
            body: "<p>ñ \"quoted\"</p>".into(),
            seen: 2,
        };

        assert!(store.load(&snap.url).await.unwrap().is_none());
        store.save(&snap.url, &snap).await.unwrap();
        assert_eq!(store.load(&snap.url).await.unwrap(), Some(snap));
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_one_key_leave_a_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::<Snapshot>::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for seen in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let snap = Snapshot {
                    url: "https://example.com/".into(),
                    body: "x".repeat(1000 + seen as usize),
                    seen,
                };
                store.save(&snap.url, &snap).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let snap = store.load("https://example.com/").await.unwrap().unwrap();
        assert_eq!(snap.body.len(), 1000 + snap.seen as usize);
        assert_eq!(store.entries().await.unwrap().len(), 1);
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_key_locks_do_not_outlive_their_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::<Snapshot>::open(dir.path()).unwrap();
        for i in 0..50 {
            let snap = Snapshot {
                url: format!("https://example.com/page-{}", i),
                body: String::new(),
                seen: i,
            };
            store.save(&snap.url, &snap).await.unwrap();
        }
        assert!(store.locks.is_empty());

        for item in store.entries().await.unwrap() {
            store.remove_key(&item.key).await.unwrap();
        }
        assert!(store.locks.is_empty());
        assert!(store.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_held_lock_keeps_its_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::<Snapshot>::open(dir.path()).unwrap();
        let snap = Snapshot {
            url: "https://example.com/".into(),
            body: String::new(),
            seen: 0,
        };
        let key = JsonStore::<Snapshot>::key_for(&snap.url);
        let held = store.lock_for(&key);

        store.save(&snap.url, &snap).await.unwrap();
        assert_eq!(store.locks.len(), 1);

        store.release(&key, held);
        assert!(store.locks.is_empty());
    }

    #[tokio::test]
    async fn test_entries_skip_corrupt_files_and_remove_works() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::<Snapshot>::open(dir.path()).unwrap();
        let snap = Snapshot {
            url: "https://example.com/".into(),
            body: String::new(),
            seen: 0,
        };
        store.save(&snap.url, &snap).await.unwrap();
        std::fs::write(dir.path().join("garbage.json"), b"{not json").unwrap();

        let items = store.entries().await.unwrap();
        assert_eq!(items.len(), 1);

        store.remove_key(&items[0].key).await.unwrap();
        store.remove_key(&items[0].key).await.unwrap();
        assert!(store.load(&snap.url).await.unwrap().is_none());
    }
}
