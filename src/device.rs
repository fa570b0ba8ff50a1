//! Audio device adapter
//!
//! Wraps the single physical audio output behind the [`MediaBackend`]
//! trait: a command surface (load/play/pause/seek/volume/release) plus an
//! event channel carrying loaded/timeupdate/ended/error notifications.
//! Any media API satisfying this contract is substitutable.
//!
//! Every load is stamped with a monotonically increasing source token, and
//! events carry the token of the source they belong to. A token that no
//! longer matches the adapter's current one identifies a stale callback
//! from a source that has since been replaced; the adapter drops it.

pub mod rodio;
pub mod sim;

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::mpsc::UnboundedSender;

use crate::error::DeviceError;

/// Notifications originating from the device.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceEvent {
    /// The source is bound and its real duration (seconds) is known.
    Loaded { duration: Option<f64> },
    /// Periodic position report, in seconds.
    TimeUpdate { position: f64 },
    /// The source finished playing naturally.
    Ended,
    /// The device cannot load or play the source.
    Error { message: String },
}

/// A device event stamped with the source token it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct TaggedEvent {
    pub token: u64,
    pub event: DeviceEvent,
}

/// Channel type backends emit on.
pub type EventSender = UnboundedSender<TaggedEvent>;

/// Command surface of an underlying media output.
///
/// Implementations emit [`TaggedEvent`]s on the sender they were
/// constructed with, echoing back the token passed to [`load`].
///
/// [`load`]: MediaBackend::load
pub trait MediaBackend: Send + Sync {
    /// Binds a new source. Load failures may be returned directly or
    /// surfaced later as a [`DeviceEvent::Error`] event.
    fn load(&self, token: u64, url: &str) -> Result<(), DeviceError>;
    /// Starts or resumes playback. No-op without a bound source.
    fn play(&self);
    /// Pauses playback. No-op without a bound source.
    fn pause(&self);
    /// Moves the playhead, in seconds.
    fn seek(&self, position: f64) -> Result<(), DeviceError>;
    fn set_volume(&self, volume: f32);
    /// Releases the bound source, if any.
    fn release(&self);
}

/// Owns the one physical playback resource for the lifetime of a player
/// session. All mutation of the device goes through here.
pub struct DeviceAdapter {
    backend: Box<dyn MediaBackend>,
    token: AtomicU64,
    duration: Mutex<Option<f64>>,
    bound: AtomicBool,
}

impl DeviceAdapter {
    pub fn new(backend: Box<dyn MediaBackend>) -> Self {
        Self {
            backend,
            token: AtomicU64::new(0),
            duration: Mutex::new(None),
            bound: AtomicBool::new(false),
        }
    }

    /// Scoped acquisition of the device: releases any prior source, bumps
    /// the source token and binds the new source under it. Pending
    /// callbacks of the prior source become stale at this point.
    pub fn set_source(&self, url: &str) -> Result<u64, DeviceError> {
        // Unbound until the new load succeeds; a failed load must not
        // leave the previous source's flag standing.
        self.bound.store(false, Ordering::SeqCst);
        self.backend.release();
        let token = self.token.fetch_add(1, Ordering::SeqCst) + 1;
        *self.duration.lock().expect("duration lock") = None;
        tracing::debug!(token, url, "Binding audio source");
        self.backend.load(token, url)?;
        self.bound.store(true, Ordering::SeqCst);
        Ok(token)
    }

    pub fn current_token(&self) -> u64 {
        self.token.load(Ordering::SeqCst)
    }

    /// Whether a source has been bound since construction / last release.
    pub fn has_source(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    /// Filters an incoming event against the current source token.
    ///
    /// Stale events are dropped and `None` is returned; current ones are
    /// unwrapped. The known duration is recorded on `Loaded` so later
    /// seeks can clamp against it.
    pub fn accept(&self, event: TaggedEvent) -> Option<DeviceEvent> {
        if event.token != self.current_token() {
            tracing::trace!(
                stale = event.token,
                current = self.current_token(),
                "Dropping stale device event"
            );
            return None;
        }
        if let DeviceEvent::Loaded { duration } = &event.event {
            *self.duration.lock().expect("duration lock") = *duration;
        }
        Some(event.event)
    }

    /// Idempotent: playing while already playing is a no-op at the device.
    pub fn play(&self) {
        self.backend.play();
    }

    pub fn pause(&self) {
        self.backend.pause();
    }

    /// Clamps into `[0, duration]` (duration as last reported by the
    /// device) and commands the device position.
    pub fn seek(&self, position: f64) -> Result<(), DeviceError> {
        let mut t = position.max(0.0);
        if let Some(duration) = *self.duration.lock().expect("duration lock") {
            t = t.min(duration);
        }
        self.backend.seek(t)
    }

    pub fn set_volume(&self, volume: f32) {
        self.backend.set_volume(volume.clamp(0.0, 1.0));
    }

    pub fn release(&self) {
        self.bound.store(false, Ordering::SeqCst);
        self.backend.release();
    }
}
