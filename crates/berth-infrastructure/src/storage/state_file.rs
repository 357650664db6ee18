//! Durable State Store.
//!
//! A `StateFile<T>` keeps the working copy of one collection in memory and
//! mirrors it to a JSON document of the form `{ "<key>": <state> }`.
//! Mutations only flip a dirty flag; the periodic flush loop (or a shutdown
//! hook) writes the document back.

use serde::{Serialize, de::DeserializeOwned};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use berth_core::error::{BerthError, Result};

use super::atomic_write;

/// A store that can be flushed by the process supervisor on shutdown.
pub trait Flushable: Send + Sync {
    /// Logical name of the persisted collection.
    fn key(&self) -> &str;

    /// Writes the current in-memory state to disk.
    fn flush(&self) -> Result<()>;
}

pub struct StateFile<T> {
    key: String,
    file_path: PathBuf,
    state: RwLock<T>,
    dirty: AtomicBool,
    /// Serializes writers; every save goes through the same temp file.
    save_lock: Mutex<()>,
}

impl<T> StateFile<T>
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    /// Creates the store with a default state. Nothing touches the disk until
    /// [`load`](Self::load) or [`save`](Self::save).
    pub fn new(key: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            file_path: file_path.into(),
            state: RwLock::new(T::default()),
            dirty: AtomicBool::new(false),
            save_lock: Mutex::new(()),
        }
    }

    /// Creates the store and loads it from disk.
    pub fn open(key: impl Into<String>, file_path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(key, file_path);
        store.load()?;
        Ok(store)
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Populates memory from disk, writing a `{}` placeholder first when the
    /// file is missing. On a read or decode failure the in-memory state is
    /// left as it was.
    pub fn load(&self) -> Result<()> {
        if !self.file_path.exists() {
            let _writer = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
            tracing::debug!(file_path = %self.file_path.display(), "[StateFile] Creating placeholder");
            atomic_write(&self.file_path, b"{}")?;
        }

        let content = fs::read_to_string(&self.file_path)?;
        let loaded = self.decode(&content)?;

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = loaded;
        self.dirty.store(false, Ordering::SeqCst);
        tracing::debug!(key = %self.key, file_path = %self.file_path.display(), "[StateFile] Loaded");
        Ok(())
    }

    fn decode(&self, content: &str) -> Result<T> {
        if content.trim().is_empty() {
            return Ok(T::default());
        }

        let mut document: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(content).map_err(|e| self.decode_error(e))?;

        match document.remove(&self.key) {
            Some(value) => serde_json::from_value(value).map_err(|e| self.decode_error(e)),
            None => Ok(T::default()),
        }
    }

    fn decode_error(&self, err: serde_json::Error) -> BerthError {
        BerthError::Serialization {
            format: "JSON".to_string(),
            message: format!("{}: {}", self.file_path.display(), err),
        }
    }

    /// Runs `f` against the current state under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Mutates the state under the write lock and marks it dirty.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut guard);
        self.dirty.store(true, Ordering::SeqCst);
        result
    }

    /// Mutates the state under the write lock; the store is only marked
    /// dirty when `f` reports a change.
    pub fn update_if(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let changed = f(&mut guard);
        if changed {
            self.dirty.store(true, Ordering::SeqCst);
        }
        changed
    }

    pub fn replace(&self, value: T) {
        self.update(|state| *state = value);
    }

    pub fn snapshot(&self) -> T {
        self.read(T::clone)
    }

    pub fn mark_changed(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Copies the state under the lock, clears the dirty flag, then
    /// serializes and writes outside the lock. A failed write re-marks the
    /// store dirty so the next tick retries. Concurrent saves of the same
    /// store run one after another.
    pub fn save(&self) -> Result<()> {
        let _writer = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = {
            let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
            self.dirty.store(false, Ordering::SeqCst);
            guard.clone()
        };

        let result = self.write_document(snapshot);
        if result.is_err() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        result
    }

    fn write_document(&self, snapshot: T) -> Result<()> {
        let mut document = serde_json::Map::new();
        document.insert(self.key.clone(), serde_json::to_value(snapshot)?);
        let json = serde_json::to_vec_pretty(&document)?;
        atomic_write(&self.file_path, &json)
    }

    /// Saves every `period` while dirty, until `token` is cancelled. A final
    /// save runs on cancellation if anything is still pending.
    pub async fn run_periodic_flush(self: Arc<Self>, period: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if self.is_dirty() {
                        self.save_in_background().await;
                    }
                }
            }
        }

        if self.is_dirty() {
            self.save_in_background().await;
        }
        tracing::debug!(key = %self.key, "[StateFile] Flush loop stopped");
    }

    async fn save_in_background(self: &Arc<Self>) {
        let store = Arc::clone(self);
        match tokio::task::spawn_blocking(move || store.save()).await {
            Ok(Ok(())) => {
                tracing::trace!(key = %self.key, "[StateFile] Flushed");
            }
            Ok(Err(e)) => {
                tracing::error!(key = %self.key, error = %e, "[StateFile] Flush failed");
            }
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "[StateFile] Flush task panicked");
            }
        }
    }
}

impl<T> Flushable for StateFile<T>
where
    T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static,
{
    fn key(&self) -> &str {
        &self.key
    }

    fn flush(&self) -> Result<()> {
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        value: u32,
    }

    fn items(n: u32) -> Vec<Item> {
        (0..n)
            .map(|i| Item {
                id: format!("item-{i}"),
                value: i * 10,
            })
            .collect()
    }

    #[test]
    fn test_load_creates_placeholder() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sub").join("items.json");

        let store = StateFile::<Vec<Item>>::open("items", &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(store.snapshot().is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");

        let store = StateFile::<Vec<Item>>::open("items", &path).unwrap();
        store.replace(items(3));
        store.save().unwrap();
        assert!(!store.is_dirty());

        let reopened = StateFile::<Vec<Item>>::open("items", &path).unwrap();
        assert_eq!(reopened.snapshot(), items(3));

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["items"][1]["id"], "item-1");
    }

    #[test]
    fn test_decode_failure_keeps_memory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");

        let store = StateFile::<Vec<Item>>::open("items", &path).unwrap();
        store.replace(items(2));
        fs::write(&path, "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(err.is_serialization());
        assert_eq!(store.snapshot(), items(2));
    }

    #[test]
    fn test_update_marks_dirty() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateFile::<Vec<Item>>::open("items", temp_dir.path().join("items.json")).unwrap();

        let len = store.update(|state| {
            state.push(Item::default());
            state.len()
        });

        assert_eq!(len, 1);
        assert!(store.is_dirty());
        assert_eq!(store.read(|state| state.len()), 1);
    }

    #[test]
    fn test_update_if_marks_dirty_only_on_change() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateFile::<Vec<Item>>::open("items", temp_dir.path().join("items.json")).unwrap();

        assert!(!store.update_if(|state| !state.is_empty()));
        assert!(!store.is_dirty());

        assert!(store.update_if(|state| {
            state.push(Item::default());
            true
        }));
        assert!(store.is_dirty());
    }

    #[test]
    fn test_flushable_writes_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");
        let store = StateFile::<Vec<Item>>::open("items", &path).unwrap();
        store.replace(items(1));

        let hook: &dyn Flushable = &store;
        assert_eq!(hook.key(), "items");
        hook.flush().unwrap();

        let reopened = StateFile::<Vec<Item>>::open("items", &path).unwrap();
        assert_eq!(reopened.snapshot(), items(1));
    }

    #[test]
    fn test_concurrent_saves_all_succeed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");
        let store = StateFile::<Vec<Item>>::open("items", &path).unwrap();
        store.replace(items(20_000));

        let failures = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..20 {
                        if store.save().is_err() {
                            failures.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert!(!store.is_dirty());
        let reopened = StateFile::<Vec<Item>>::open("items", &path).unwrap();
        assert_eq!(reopened.snapshot().len(), 20_000);
        assert!(!temp_dir.path().join(".items.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_periodic_flush_skips_clean_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");
        let store = Arc::new(StateFile::<Vec<Item>>::open("items", &path).unwrap());
        store.replace(items(1));
        store.save().unwrap();

        // Anything written from here on would recreate the file.
        fs::remove_file(&path).unwrap();

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&store).run_periodic_flush(Duration::from_millis(10), token.clone()));
        tokio::time::sleep(Duration::from_millis(80)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_periodic_flush_writes_dirty_state() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");
        let store = Arc::new(StateFile::<Vec<Item>>::open("items", &path).unwrap());

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&store).run_periodic_flush(Duration::from_millis(10), token.clone()));
        store.replace(items(2));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(!store.is_dirty());
        let reopened = StateFile::<Vec<Item>>::open("items", &path).unwrap();
        assert_eq!(reopened.snapshot(), items(2));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_flushes_pending_changes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("items.json");
        let store = Arc::new(StateFile::<Vec<Item>>::open("items", &path).unwrap());

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&store).run_periodic_flush(Duration::from_secs(3600), token.clone()));
        // Let the immediate first tick pass before mutating.
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.replace(items(4));
        token.cancel();
        handle.await.unwrap();

        let reopened = StateFile::<Vec<Item>>::open("items", &path).unwrap();
        assert_eq!(reopened.snapshot(), items(4));
    }
}
