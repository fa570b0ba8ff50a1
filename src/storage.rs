//! Persistence bridge
//!
//! Mirrors playback state and the queue to durable key/value storage and
//! restores them at startup. Writes are debounced and best-effort:
//! storage failures are logged and swallowed, never surfaced to the UI.
//!
//! Storage layout (key -> JSON value):
//! - `volume`       -> number
//! - `currentTrack` -> `{track, progress, playbackMode, savedAt}`
//! - `queue`        -> `{tracks, trackIndex}`
//!
//! An absent key means "use default": volume 1.0, empty queue, no current
//! track.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::StorageError;
use crate::track::{PlayMode, Track};

pub const KEY_VOLUME: &str = "volume";
pub const KEY_CURRENT_TRACK: &str = "currentTrack";
pub const KEY_QUEUE: &str = "queue";

const DEBOUNCE: Duration = Duration::from_millis(300);

/// Key/value storage boundary. Absent keys read as `None`.
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// One JSON file per key under a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Ok(std::fs::write(self.path_for(key), value)?)
    }
}

/// Point-in-time projection of the transport, stored under `currentTrack`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRecord {
    pub track: Option<Track>,
    pub progress: f64,
    pub playback_mode: PlayMode,
    pub saved_at: DateTime<Utc>,
}

/// Full queue projection, stored under `queue`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub tracks: Vec<Track>,
    pub track_index: Option<usize>,
}

/// Everything the bridge could recover at startup, defaults filled in.
#[derive(Debug)]
pub struct RestoredSession {
    pub volume: f32,
    pub tracks: Vec<Track>,
    pub track_index: Option<usize>,
    pub current_track: Option<Track>,
    pub progress: f64,
    pub playback_mode: PlayMode,
}

impl Default for RestoredSession {
    fn default() -> Self {
        Self {
            volume: 1.0,
            tracks: Vec::new(),
            track_index: None,
            current_track: None,
            progress: 0.0,
            playback_mode: PlayMode::default(),
        }
    }
}

struct PendingState {
    volume: f32,
    record: StateRecord,
}

/// Debounced, best-effort mirror of the player onto a [`StorageBackend`].
///
/// Each schedule replaces the pending payload and restarts the timer, so
/// rapid updates coalesce into a single write. [`flush`](Self::flush)
/// writes anything still pending; the facade calls it on teardown.
pub struct PersistenceBridge {
    store: Arc<dyn StorageBackend>,
    state_gen: AtomicU64,
    queue_gen: AtomicU64,
    pending_state: Mutex<Option<PendingState>>,
    pending_queue: Mutex<Option<QueueRecord>>,
}

impl PersistenceBridge {
    pub fn new(store: Arc<dyn StorageBackend>) -> Self {
        Self {
            store,
            state_gen: AtomicU64::new(0),
            queue_gen: AtomicU64::new(0),
            pending_state: Mutex::new(None),
            pending_queue: Mutex::new(None),
        }
    }

    /// Reads the persisted snapshot, falling back to defaults for any
    /// missing or unreadable key.
    pub fn load(&self) -> RestoredSession {
        let mut session = RestoredSession::default();

        match self.store.read(KEY_VOLUME) {
            Ok(Some(raw)) => match raw.trim().parse::<f32>() {
                Ok(v) => session.volume = v.clamp(0.0, 1.0),
                Err(e) => tracing::warn!(error = %e, "Ignoring unparseable stored volume"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to read stored volume"),
        }

        if let Some(record) = self.read_json::<StateRecord>(KEY_CURRENT_TRACK) {
            session.current_track = record.track;
            session.progress = record.progress.max(0.0);
            session.playback_mode = record.playback_mode;
        }

        if let Some(record) = self.read_json::<QueueRecord>(KEY_QUEUE) {
            session.track_index = record
                .track_index
                .filter(|i| *i < record.tracks.len());
            session.tracks = record.tracks;
        }

        session
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.read(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Ignoring unreadable stored value");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read stored value");
                None
            }
        }
    }

    /// Schedules a debounced write of `volume` + `currentTrack`.
    pub fn schedule_state_write(self: &Arc<Self>, volume: f32, record: StateRecord) {
        *self.pending_state.lock().expect("pending state lock") =
            Some(PendingState { volume, record });
        let generation = self.state_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            if this.state_gen.load(Ordering::SeqCst) == generation {
                this.write_state();
            }
        });
    }

    /// Schedules a debounced write of the full `queue`.
    pub fn schedule_queue_write(self: &Arc<Self>, record: QueueRecord) {
        *self.pending_queue.lock().expect("pending queue lock") = Some(record);
        let generation = self.queue_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            if this.queue_gen.load(Ordering::SeqCst) == generation {
                this.write_queue();
            }
        });
    }

    /// Writes anything still pending, bypassing the debounce timers.
    pub fn flush(&self) {
        self.write_state();
        self.write_queue();
    }

    fn write_state(&self) {
        let Some(pending) = self.pending_state.lock().expect("pending state lock").take()
        else {
            return;
        };
        self.write_value(KEY_VOLUME, &pending.volume);
        self.write_value(KEY_CURRENT_TRACK, &pending.record);
    }

    fn write_queue(&self) {
        let Some(record) = self.pending_queue.lock().expect("pending queue lock").take()
        else {
            return;
        };
        self.write_value(KEY_QUEUE, &record);
    }

    fn write_value<T: Serialize>(&self, key: &str, value: &T) {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to serialize for persistence");
                return;
            }
        };
        if let Err(e) = self.store.write(key, &serialized) {
            tracing::warn!(key, error = %e, "Persistence write failed");
        } else {
            tracing::trace!(key, "Persisted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn record(track: Option<Track>, progress: f64) -> StateRecord {
        StateRecord {
            track,
            progress,
            playback_mode: PlayMode::Loop,
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn absent_keys_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let bridge = PersistenceBridge::new(store);
        let session = bridge.load();
        assert_eq!(session.volume, 1.0);
        assert!(session.tracks.is_empty());
        assert_eq!(session.track_index, None);
        assert!(session.current_track.is_none());
    }

    #[tokio::test]
    async fn flush_writes_pending_state_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        let bridge = Arc::new(PersistenceBridge::new(store));

        let track = Track::new("a", "/music/a.mp3");
        bridge.schedule_state_write(0.25, record(Some(track.clone()), 12.0));
        bridge.schedule_queue_write(QueueRecord {
            tracks: vec![track],
            track_index: Some(0),
        });
        bridge.flush();

        let session = bridge.load();
        assert_eq!(session.volume, 0.25);
        assert_eq!(session.current_track.unwrap().id, "a");
        assert_eq!(session.progress, 12.0);
        assert_eq!(session.tracks.len(), 1);
        assert_eq!(session.track_index, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_updates_coalesce_into_one_write() {
        struct CountingStore(AtomicUsize);
        impl StorageBackend for CountingStore {
            fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
                Ok(None)
            }
            fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let store = Arc::new(CountingStore(AtomicUsize::new(0)));
        let bridge = Arc::new(PersistenceBridge::new(store.clone()));
        for i in 0..10 {
            bridge.schedule_state_write(0.1 * i as f32, record(None, 0.0));
        }
        tokio::time::sleep(DEBOUNCE * 3).await;
        // One debounced write covering `volume` and `currentTrack`.
        assert_eq!(store.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn storage_failures_are_swallowed() {
        struct BrokenStore;
        impl StorageBackend for BrokenStore {
            fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
                Err(StorageError::Io(std::io::Error::other("disk gone")))
            }
            fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
                Err(StorageError::Io(std::io::Error::other("disk gone")))
            }
        }

        let bridge = Arc::new(PersistenceBridge::new(Arc::new(BrokenStore)));
        let session = bridge.load();
        assert_eq!(session.volume, 1.0);

        bridge.schedule_state_write(0.5, record(None, 0.0));
        bridge.flush();
    }

    #[test]
    fn stale_track_index_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()).unwrap());
        store
            .write(KEY_QUEUE, r#"{"tracks":[{"id":"a","url":"x"}],"trackIndex":5}"#)
            .unwrap();
        let bridge = PersistenceBridge::new(store);
        let session = bridge.load();
        assert_eq!(session.tracks.len(), 1);
        assert_eq!(session.track_index, None);
    }
}
