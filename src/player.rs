//! Player facade
//!
//! Composes the track queue, playback state, device adapter, lyrics
//! synchronizer and persistence bridge into the single object the view
//! layer consumes. One facade instance owns one queue, one state and one
//! device for the lifetime of a session; construct it explicitly and
//! dispose it explicitly.
//!
//! User intents and device callbacks serialize on one internal lock, so
//! the queue-advance protocol (ended -> next -> bind -> play) is atomic
//! with respect to interleaved pause/seek calls.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::device::{DeviceAdapter, DeviceEvent, MediaBackend, TaggedEvent};
use crate::lyrics::{LyricsSource, LyricsSync};
use crate::queue::TrackQueue;
use crate::state::PlaybackState;
use crate::storage::{PersistenceBridge, QueueRecord, StateRecord, StorageBackend};
use crate::track::{PlayMode, Track};

/// Read-only view of the player for rendering.
#[derive(Clone, Debug)]
pub struct PlayerSnapshot {
    pub track: Option<Track>,
    pub is_playing: bool,
    pub volume: f32,
    pub play_mode: PlayMode,
    pub position: f64,
    pub duration: Option<f64>,
    pub queue_len: usize,
    pub queue_index: Option<usize>,
    pub lyric_line: Option<String>,
    pub lyric_index: usize,
    pub notice: Option<String>,
}

struct PlayerCore {
    queue: TrackQueue,
    state: PlaybackState,
    lyrics: LyricsSync,
    /// Seek requested before any source was bound; retried on `Loaded`.
    deferred_seek: Option<f64>,
    /// Last non-fatal device notice for the UI.
    notice: Option<String>,
}

struct Shared {
    core: Mutex<PlayerCore>,
    adapter: DeviceAdapter,
    bridge: Arc<PersistenceBridge>,
    lyrics_source: Arc<dyn LyricsSource>,
}

pub struct Player {
    shared: Arc<Shared>,
    pump: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Builds a player around a media backend and its event channel.
    /// Spawns the device event pump; must be called on a tokio runtime.
    pub fn new(
        backend: Box<dyn MediaBackend>,
        events: UnboundedReceiver<TaggedEvent>,
        store: Arc<dyn StorageBackend>,
        lyrics_source: Arc<dyn LyricsSource>,
    ) -> Self {
        let shared = Arc::new(Shared {
            core: Mutex::new(PlayerCore {
                queue: TrackQueue::new(),
                state: PlaybackState::new(),
                lyrics: LyricsSync::new(),
                deferred_seek: None,
                notice: None,
            }),
            adapter: DeviceAdapter::new(backend),
            bridge: Arc::new(PersistenceBridge::new(store)),
            lyrics_source,
        });

        let pump = tokio::spawn(pump_loop(Arc::clone(&shared), events));
        Self {
            shared,
            pump: std::sync::Mutex::new(Some(pump)),
        }
    }

    /// Restores the persisted session: queue first (stored order), then
    /// current track and volume. The stored progress is not seeked
    /// immediately; it is deferred until the device reports the source as
    /// loaded. Playback stays paused.
    pub async fn restore(&self) {
        let session = self.shared.bridge.load();
        tracing::info!(
            tracks = session.tracks.len(),
            track_index = ?session.track_index,
            volume = session.volume,
            mode = session.playback_mode.label(),
            "Restoring persisted session"
        );

        let mut core = self.shared.core.lock().await;
        core.queue.clear();
        for track in session.tracks {
            core.queue.add_track(track);
        }
        core.state.set_play_mode(session.playback_mode);
        core.state.set_volume(session.volume);
        self.shared.adapter.set_volume(core.state.volume());

        let index = match &session.current_track {
            Some(stored) => session
                .track_index
                .filter(|i| core.queue.get(*i).is_some_and(|t| t.id == stored.id))
                .or_else(|| core.queue.index_of(&stored.id)),
            None => session.track_index,
        };
        if let Some(index) = index {
            if self.shared.start_track(&mut core, index, false) && session.progress > 0.0 {
                core.deferred_seek = Some(session.progress);
            }
        }
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let core = self.shared.core.lock().await;
        let track = core
            .state
            .current_track()
            .and_then(|id| core.queue.tracks().iter().find(|t| t.id == id))
            .cloned();
        PlayerSnapshot {
            track,
            is_playing: core.state.is_playing(),
            volume: core.state.volume(),
            play_mode: core.state.play_mode(),
            position: core.state.current_time(),
            duration: core.state.duration(),
            queue_len: core.queue.len(),
            queue_index: core.queue.current_index(),
            lyric_line: core.lyrics.current_line().map(|l| l.text.clone()),
            lyric_index: core.lyrics.line_index(),
            notice: core.notice.clone(),
        }
    }

    pub async fn add_track(&self, track: Track) {
        let mut core = self.shared.core.lock().await;
        core.queue.add_track(track);
        self.shared.persist_queue(&core);
    }

    /// Removes the first occurrence of `id` from the queue. Playback of an
    /// already-bound source is not interrupted; the re-clamped index only
    /// affects where the queue advances next.
    pub async fn remove_track(&self, id: &str) -> bool {
        let mut core = self.shared.core.lock().await;
        let removed = core.queue.remove_track(id);
        if removed {
            self.shared.persist_queue(&core);
        }
        removed
    }

    /// Empties the queue and stops the transport (the queue itself never
    /// touches playback state; this facade is the caller that does).
    pub async fn clear_queue(&self) {
        let mut core = self.shared.core.lock().await;
        core.queue.clear();
        self.shared.adapter.release();
        core.state.set_current_track(None);
        core.lyrics.set_track(None);
        core.deferred_seek = None;
        self.shared.persist_state(&core);
        self.shared.persist_queue(&core);
    }

    /// Starts or resumes playback. Idempotent while already playing. With
    /// no bound source, binds the queue's current track first.
    pub async fn play(&self) {
        let mut core = self.shared.core.lock().await;
        if self.shared.adapter.has_source() {
            self.shared.adapter.play();
            core.state.set_playing(true);
            self.shared.persist_state(&core);
        } else if let Some(index) = core.queue.current_index() {
            self.shared.start_track(&mut core, index, true);
        }
    }

    pub async fn pause(&self) {
        let mut core = self.shared.core.lock().await;
        self.shared.adapter.pause();
        core.state.set_playing(false);
        self.shared.persist_state(&core);
    }

    pub async fn toggle(&self) {
        let is_playing = {
            let core = self.shared.core.lock().await;
            core.state.is_playing()
        };
        if is_playing {
            self.pause().await;
        } else {
            self.play().await;
        }
    }

    /// Plays the first queue entry with this id. Returns false when the id
    /// is not in the queue.
    pub async fn play_track(&self, id: &str) -> bool {
        let mut core = self.shared.core.lock().await;
        match core.queue.index_of(id) {
            Some(index) => {
                self.shared.start_track(&mut core, index, true);
                true
            }
            None => false,
        }
    }

    pub async fn next(&self) {
        let mut core = self.shared.core.lock().await;
        if let Some(index) = core.queue.next_index(core.state.play_mode()) {
            self.shared.start_track(&mut core, index, true);
        }
    }

    pub async fn previous(&self) {
        let mut core = self.shared.core.lock().await;
        if let Some(index) = core.queue.prev_index(core.state.play_mode()) {
            self.shared.start_track(&mut core, index, true);
        }
    }

    /// Seeks within the bound source; without one the request is deferred
    /// until a source reports loaded, never dropped.
    pub async fn seek(&self, seconds: f64) {
        let mut core = self.shared.core.lock().await;
        self.shared.seek_locked(&mut core, seconds);
        self.shared.persist_state(&core);
    }

    /// Jumps to the timestamp of the given lyric line.
    pub async fn seek_to_lyric_line(&self, index: usize) {
        let mut core = self.shared.core.lock().await;
        if let Some(time) = core.lyrics.line_time(index) {
            self.shared.seek_locked(&mut core, time);
            self.shared.persist_state(&core);
        }
    }

    pub async fn set_volume(&self, volume: f32) {
        let mut core = self.shared.core.lock().await;
        core.state.set_volume(volume);
        self.shared.adapter.set_volume(core.state.volume());
        self.shared.persist_state(&core);
    }

    /// Volume step, clamped into `[0, 1]`.
    pub async fn step_volume(&self, delta: f32) {
        let mut core = self.shared.core.lock().await;
        let volume = core.state.volume() + delta;
        core.state.set_volume(volume);
        self.shared.adapter.set_volume(core.state.volume());
        self.shared.persist_state(&core);
    }

    pub async fn set_play_mode(&self, mode: PlayMode) {
        let mut core = self.shared.core.lock().await;
        core.state.set_play_mode(mode);
        self.shared.persist_state(&core);
    }

    pub async fn cycle_play_mode(&self) -> PlayMode {
        let mut core = self.shared.core.lock().await;
        let mode = core.state.play_mode().next();
        core.state.set_play_mode(mode);
        self.shared.persist_state(&core);
        mode
    }

    /// Flushes pending persistence and releases the device. The player is
    /// inert afterwards.
    pub async fn dispose(&self) {
        tracing::info!("Disposing player");
        if let Some(pump) = self.pump.lock().expect("pump lock").take() {
            pump.abort();
        }
        {
            let core = self.shared.core.lock().await;
            self.shared.persist_state(&core);
            self.shared.persist_queue(&core);
        }
        self.shared.bridge.flush();
        self.shared.adapter.release();
    }
}

impl Shared {
    /// Binds and optionally starts the queue entry at `index`. Returns
    /// whether the device accepted the source.
    fn start_track(self: &Arc<Self>, core: &mut PlayerCore, index: usize, autoplay: bool) -> bool {
        let Some(track) = core.queue.set_current(index).cloned() else {
            return false;
        };
        tracing::info!(track_id = %track.id, index, autoplay, "Starting track");

        core.state.set_current_track(Some(track.id.clone()));
        core.state.set_duration(track.duration);
        core.deferred_seek = None;
        core.notice = None;
        if core.lyrics.set_track(Some(&track)) {
            self.spawn_lyrics_fetch(track.clone());
        }

        let bound = match self.adapter.set_source(&track.url) {
            Ok(_) => {
                if autoplay {
                    self.adapter.play();
                    core.state.set_playing(true);
                }
                true
            }
            Err(e) => {
                tracing::warn!(track_id = %track.id, error = %e, "Device rejected source");
                core.notice = Some(e.to_string());
                core.state.set_playing(false);
                false
            }
        };
        self.persist_state(core);
        bound
    }

    /// Queue-advance protocol, entered on a (token-validated) `Ended`.
    fn advance_after_ended(self: &Arc<Self>, core: &mut PlayerCore) {
        // If the playing track was removed, the cursor already points at
        // its successor; play that instead of stepping past it.
        let orphaned = core
            .state
            .current_track()
            .is_some_and(|id| core.queue.current().map(|t| t.id.as_str()) != Some(id));
        let index = if orphaned {
            core.queue.current_index()
        } else {
            core.queue.next_index(core.state.play_mode())
        };
        match index {
            Some(index) => {
                self.start_track(core, index, true);
            }
            None => {
                // Nothing to play; leave the current track addressed.
                core.state.set_playing(false);
                self.persist_state(core);
            }
        }
    }

    fn seek_locked(&self, core: &mut PlayerCore, seconds: f64) {
        if self.adapter.has_source() {
            match self.adapter.seek(seconds) {
                Ok(_) => {
                    core.state.update_current_time(seconds.max(0.0));
                    let t = core.state.current_time();
                    core.lyrics.on_time(t);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Seek failed");
                    core.notice = Some(e.to_string());
                }
            }
        } else {
            tracing::debug!(seconds, "No source bound yet, deferring seek");
            core.deferred_seek = Some(seconds.max(0.0));
        }
    }

    async fn handle_event(self: &Arc<Self>, event: DeviceEvent) {
        let mut core = self.core.lock().await;
        match event {
            DeviceEvent::Loaded { duration } => {
                tracing::debug!(?duration, "Source loaded");
                if let Some(d) = duration {
                    if let Some(id) = core.state.current_track().map(str::to_string) {
                        core.queue.correct_duration(&id, d);
                    }
                    core.state.set_duration(Some(d));
                }
                if let Some(seconds) = core.deferred_seek.take() {
                    self.seek_locked(&mut core, seconds);
                }
            }
            DeviceEvent::TimeUpdate { position } => {
                core.state.update_current_time(position);
                let t = core.state.current_time();
                core.lyrics.on_time(t);
                self.persist_state(&core);
            }
            DeviceEvent::Ended => {
                tracing::debug!("Track ended");
                self.advance_after_ended(&mut core);
            }
            DeviceEvent::Error { message } => {
                tracing::warn!(%message, "Device error");
                // The source is unusable; unbind it so the next play()
                // attempts a fresh bind instead of resuming nothing.
                self.adapter.release();
                core.state.set_playing(false);
                core.notice = Some(message);
                self.persist_state(&core);
            }
        }
    }

    fn spawn_lyrics_fetch(self: &Arc<Self>, track: Track) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let lines = match this.lyrics_source.fetch(&track).await {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::debug!(track_id = %track.id, error = %e, "No lyrics available");
                    Vec::new()
                }
            };
            this.core.lock().await.lyrics.apply_fetched(&track.id, lines);
        });
    }

    fn persist_state(self: &Arc<Self>, core: &PlayerCore) {
        let track = core
            .state
            .current_track()
            .and_then(|id| core.queue.tracks().iter().find(|t| t.id == id))
            .cloned();
        self.bridge.schedule_state_write(
            core.state.volume(),
            StateRecord {
                track,
                progress: core.state.current_time(),
                playback_mode: core.state.play_mode(),
                saved_at: Utc::now(),
            },
        );
    }

    fn persist_queue(self: &Arc<Self>, core: &PlayerCore) {
        self.bridge.schedule_queue_write(QueueRecord {
            tracks: core.queue.tracks().to_vec(),
            track_index: core.queue.current_index(),
        });
    }
}

async fn pump_loop(shared: Arc<Shared>, mut events: UnboundedReceiver<TaggedEvent>) {
    while let Some(raw) = events.recv().await {
        let Some(event) = shared.adapter.accept(raw) else {
            continue;
        };
        shared.handle_event(event).await;
    }
    tracing::debug!("Device event pump finished");
}
