//! Clock-driven simulated backend
//!
//! Stands in for a physical output when none exists (headless operation)
//! and gives tests a deterministic device: position advances only when
//! [`SimulatedBackend::advance`] is called or a background clock is
//! started, load failures can be scripted per URL, and `Loaded` delivery
//! can be held back to exercise stale-token handling.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::device::{DeviceEvent, EventSender, MediaBackend, TaggedEvent};
use crate::error::DeviceError;

const DEFAULT_DURATION: f64 = 30.0;

#[derive(Debug)]
struct Slot {
    token: u64,
    duration: f64,
    position: f64,
    playing: bool,
    ended: bool,
}

struct Inner {
    events: EventSender,
    slot: Mutex<Option<Slot>>,
    durations: Mutex<HashMap<String, f64>>,
    failing: Mutex<HashSet<String>>,
    holding: Mutex<HashSet<String>>,
    held: Mutex<Option<(u64, f64)>>,
}

#[derive(Clone)]
pub struct SimulatedBackend {
    inner: Arc<Inner>,
}

impl SimulatedBackend {
    pub fn new(events: EventSender) -> Self {
        Self {
            inner: Arc::new(Inner {
                events,
                slot: Mutex::new(None),
                durations: Mutex::new(HashMap::new()),
                failing: Mutex::new(HashSet::new()),
                holding: Mutex::new(HashSet::new()),
                held: Mutex::new(None),
            }),
        }
    }

    /// Sets the duration the simulated asset will report for `url`.
    pub fn set_duration(&self, url: &str, seconds: f64) {
        self.inner
            .durations
            .lock()
            .expect("durations lock")
            .insert(url.to_string(), seconds);
    }

    /// Every future load of `url` fails with a device error event.
    pub fn fail_on(&self, url: &str) {
        self.inner
            .failing
            .lock()
            .expect("failing lock")
            .insert(url.to_string());
    }

    /// Defers the `Loaded` event for the next load of `url` until
    /// [`release_held`](Self::release_held) is called.
    pub fn hold_loaded(&self, url: &str) {
        self.inner
            .holding
            .lock()
            .expect("holding lock")
            .insert(url.to_string());
    }

    /// Fires the deferred `Loaded` of a held load, with the token captured
    /// at load time. Models an old load's completion callback arriving
    /// after the source was replaced.
    pub fn release_held(&self) {
        if let Some((token, duration)) = self.inner.held.lock().expect("held lock").take() {
            let _ = self.inner.events.send(TaggedEvent {
                token,
                event: DeviceEvent::Loaded { duration: Some(duration) },
            });
        }
    }

    /// Moves the clock forward while playing, emitting a `TimeUpdate` and,
    /// at the end of the asset, a single `Ended`.
    pub fn advance(&self, seconds: f64) {
        let mut guard = self.inner.slot.lock().expect("slot lock");
        let Some(slot) = guard.as_mut() else { return };
        if !slot.playing || slot.ended {
            return;
        }
        slot.position = (slot.position + seconds).min(slot.duration);
        let _ = self.inner.events.send(TaggedEvent {
            token: slot.token,
            event: DeviceEvent::TimeUpdate { position: slot.position },
        });
        if slot.position >= slot.duration {
            slot.playing = false;
            slot.ended = true;
            let _ = self.inner.events.send(TaggedEvent {
                token: slot.token,
                event: DeviceEvent::Ended,
            });
        }
    }

    /// Runs the bound source to completion immediately.
    pub fn finish_current(&self) {
        let remaining = {
            let guard = self.inner.slot.lock().expect("slot lock");
            match guard.as_ref() {
                Some(slot) if slot.playing => slot.duration - slot.position,
                _ => return,
            }
        };
        self.advance(remaining.max(0.0));
    }

    /// Spawns a wall-clock ticker for headless operation.
    pub fn start_clock(&self, tick: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                if this.inner.events.is_closed() {
                    break;
                }
                this.advance(tick.as_secs_f64());
            }
        });
    }

    pub fn position(&self) -> f64 {
        self.inner
            .slot
            .lock()
            .expect("slot lock")
            .as_ref()
            .map(|s| s.position)
            .unwrap_or(0.0)
    }

    pub fn is_playing(&self) -> bool {
        self.inner
            .slot
            .lock()
            .expect("slot lock")
            .as_ref()
            .map(|s| s.playing)
            .unwrap_or(false)
    }
}

impl MediaBackend for SimulatedBackend {
    fn load(&self, token: u64, url: &str) -> Result<(), DeviceError> {
        if self.inner.failing.lock().expect("failing lock").contains(url) {
            let _ = self.inner.events.send(TaggedEvent {
                token,
                event: DeviceEvent::Error {
                    message: format!("simulated load failure for {url}"),
                },
            });
            return Ok(());
        }

        let duration = self
            .inner
            .durations
            .lock()
            .expect("durations lock")
            .get(url)
            .copied()
            .unwrap_or(DEFAULT_DURATION);

        if self.inner.holding.lock().expect("holding lock").remove(url) {
            *self.inner.held.lock().expect("held lock") = Some((token, duration));
            return Ok(());
        }

        *self.inner.slot.lock().expect("slot lock") = Some(Slot {
            token,
            duration,
            position: 0.0,
            playing: false,
            ended: false,
        });
        let _ = self.inner.events.send(TaggedEvent {
            token,
            event: DeviceEvent::Loaded { duration: Some(duration) },
        });
        Ok(())
    }

    fn play(&self) {
        if let Some(slot) = self.inner.slot.lock().expect("slot lock").as_mut() {
            if !slot.ended {
                slot.playing = true;
            }
        }
    }

    fn pause(&self) {
        if let Some(slot) = self.inner.slot.lock().expect("slot lock").as_mut() {
            slot.playing = false;
        }
    }

    fn seek(&self, position: f64) -> Result<(), DeviceError> {
        if let Some(slot) = self.inner.slot.lock().expect("slot lock").as_mut() {
            slot.position = position.clamp(0.0, slot.duration);
            slot.ended = false;
        }
        Ok(())
    }

    fn set_volume(&self, _volume: f32) {}

    fn release(&self) {
        *self.inner.slot.lock().expect("slot lock") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn advance_emits_timeupdate_then_a_single_ended() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sim = SimulatedBackend::new(tx);
        sim.set_duration("u", 1.0);
        sim.load(1, "u").unwrap();
        assert!(matches!(
            rx.recv().await.unwrap().event,
            DeviceEvent::Loaded { .. }
        ));

        sim.play();
        sim.advance(0.6);
        assert!(matches!(
            rx.recv().await.unwrap().event,
            DeviceEvent::TimeUpdate { .. }
        ));
        sim.advance(0.6);
        assert!(matches!(
            rx.recv().await.unwrap().event,
            DeviceEvent::TimeUpdate { .. }
        ));
        assert_eq!(rx.recv().await.unwrap().event, DeviceEvent::Ended);

        // The drained source stays silent.
        sim.advance(1.0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn scripted_failure_surfaces_as_error_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sim = SimulatedBackend::new(tx);
        sim.fail_on("broken");
        sim.load(7, "broken").unwrap();
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.token, 7);
        assert!(matches!(ev.event, DeviceEvent::Error { .. }));
    }
}
