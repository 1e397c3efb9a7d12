//! Idempotent "fetch or load from disk" cache for JSON values.
//!
//! The whole cache file is read into memory by [`KeyedCache::open`] and
//! rewritten wholesale by [`KeyedCache::close`]. Nothing is flushed in
//! between, so entries added by a run that crashes are lost.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    future::Future,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{CacheError, EngineError};

type Entries = BTreeMap<String, Value>;

#[derive(Debug, Default)]
pub struct KeyedCache {
    /// Backing file. `None` keeps the cache in memory for the run only.
    path: Option<PathBuf>,
    entries: Mutex<Entries>,
    /// One lock per key so concurrent callers fetch a missing key once.
    fetching: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedCache {
    /// Loads the cache file at `path`.
    ///
    /// A missing file is an error unless `create_missing` is set, in which
    /// case the parent directory is created and the cache starts empty.
    pub fn open(path: impl Into<PathBuf>, create_missing: bool) -> Result<Self, CacheError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Entries>(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && create_missing => {
                tracing::debug!(path = %path.display(), "init cache directory");
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                Entries::new()
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
            fetching: Mutex::default(),
        })
    }

    /// A cache that never touches the disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`, or [`CacheError::NotFound`].
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, CacheError> {
        let value = {
            let entries = self.entries();
            match entries.get(key) {
                Some(value) => value.clone(),
                None => {
                    tracing::debug!(key, "cache miss");
                    return Err(CacheError::NotFound(key.to_string()));
                }
            }
        };
        let value = serde_json::from_value(value)?;
        tracing::debug!(key, "cache hit");
        Ok(value)
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let value = serde_json::to_value(value)?;
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    /// Returns the cached value for `key`, calling `fetch` and storing its
    /// result on a miss. Any cache error other than a miss is returned as
    /// is, without falling back to `fetch`.
    pub async fn fetch_or_cache<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        match self.get(key) {
            Ok(value) => return Ok(value),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        let value = fetch().await?;
        self.set(key, &value)?;
        Ok(value)
    }

    /// Writes the full cache back to its file, pretty printed.
    pub fn close(&self) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let payload = serde_json::to_string_pretty(&*self.entries())?;
        fs::write(path, payload)?;
        tracing::debug!(path = %path.display(), "cache written");
        Ok(())
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut fetching = self
            .fetching
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fetching.entry(key.to_string()).or_default().clone()
    }
}
