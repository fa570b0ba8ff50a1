//! Client-side music player core.
//!
//! The library maintains a queue of tracks, drives a single audio output
//! device, keeps playback position/volume/mode consistent with user
//! actions and device events, synchronizes time-coded lyrics to the
//! playback clock, and persists/restores state across sessions.
//!
//! The [`Player`] facade composes the pieces; the `device`, `lyrics` and
//! `storage` boundaries are traits, so any media API, lyrics provider or
//! key/value store satisfying them is substitutable.

pub mod device;
pub mod error;
pub mod input;
pub mod logging;
pub mod lyrics;
pub mod player;
pub mod queue;
pub mod state;
pub mod storage;
pub mod track;

pub use device::{DeviceAdapter, DeviceEvent, MediaBackend, TaggedEvent};
pub use error::{DeviceError, FetchError, StorageError};
pub use lyrics::{LyricLine, LyricsSource};
pub use player::{Player, PlayerSnapshot};
pub use queue::TrackQueue;
pub use state::PlaybackState;
pub use storage::{FileStore, PersistenceBridge, StorageBackend};
pub use track::{PlayMode, Track};
