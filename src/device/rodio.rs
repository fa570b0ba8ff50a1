//! Real audio output backed by a rodio sink
//!
//! One `OutputStream` is acquired for the process and deliberately leaked
//! (dropping it would silence every sink bound to it; see the handle docs).
//! Each bound source gets a fresh `Sink`. A poll task mirrors the sink
//! clock into `TimeUpdate` events and reports `Ended` once the sink
//! drains.

use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use crate::device::{DeviceEvent, EventSender, MediaBackend, TaggedEvent};
use crate::error::DeviceError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Slot {
    token: u64,
    sink: Sink,
    ended_sent: bool,
}

struct Inner {
    handle: OutputStreamHandle,
    events: EventSender,
    slot: Mutex<Option<Slot>>,
    volume: Mutex<f32>,
}

pub struct RodioBackend {
    inner: Arc<Inner>,
}

impl RodioBackend {
    /// Acquires the default output device and starts the position poll
    /// task. Must be called on a tokio runtime.
    pub fn new(events: EventSender) -> Result<Self, DeviceError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| DeviceError::NoOutput(e.to_string()))?;
        // The stream must outlive every sink; it is not Send, so it cannot
        // be stored behind the Send + Sync backend. Leak it for the
        // process lifetime, as the sinks keep no owning reference.
        std::mem::forget(stream);

        let inner = Arc::new(Inner {
            handle,
            events,
            slot: Mutex::new(None),
            volume: Mutex::new(1.0),
        });

        let poll = Arc::clone(&inner);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                if poll.events.is_closed() {
                    break;
                }
                poll.tick();
            }
        });

        Ok(Self { inner })
    }
}

impl Inner {
    fn tick(&self) {
        let mut guard = self.slot.lock().expect("slot lock");
        let Some(slot) = guard.as_mut() else { return };
        if slot.sink.empty() {
            if !slot.ended_sent {
                slot.ended_sent = true;
                let _ = self.events.send(TaggedEvent {
                    token: slot.token,
                    event: DeviceEvent::Ended,
                });
            }
        } else if !slot.sink.is_paused() {
            let _ = self.events.send(TaggedEvent {
                token: slot.token,
                event: DeviceEvent::TimeUpdate {
                    position: slot.sink.get_pos().as_secs_f64(),
                },
            });
        }
    }
}

fn source_path(url: &str) -> &str {
    url.strip_prefix("file://").unwrap_or(url)
}

fn load_error(url: &str, e: impl std::fmt::Display) -> DeviceError {
    DeviceError::Load {
        url: url.to_string(),
        message: e.to_string(),
    }
}

impl MediaBackend for RodioBackend {
    fn load(&self, token: u64, url: &str) -> Result<(), DeviceError> {
        let path = source_path(url);

        let file = File::open(path).map_err(|e| load_error(url, e))?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| load_error(url, e))?;
        let duration = source.total_duration().map(|d| d.as_secs_f64());

        let sink = Sink::try_new(&self.inner.handle).map_err(|e| load_error(url, e))?;
        sink.set_volume(*self.inner.volume.lock().expect("volume lock"));
        sink.append(source);
        sink.pause();

        *self.inner.slot.lock().expect("slot lock") = Some(Slot {
            token,
            sink,
            ended_sent: false,
        });
        let _ = self.inner.events.send(TaggedEvent {
            token,
            event: DeviceEvent::Loaded { duration },
        });
        Ok(())
    }

    fn play(&self) {
        if let Some(slot) = self.inner.slot.lock().expect("slot lock").as_ref() {
            slot.sink.play();
        }
    }

    fn pause(&self) {
        if let Some(slot) = self.inner.slot.lock().expect("slot lock").as_ref() {
            slot.sink.pause();
        }
    }

    fn seek(&self, position: f64) -> Result<(), DeviceError> {
        if let Some(slot) = self.inner.slot.lock().expect("slot lock").as_mut() {
            slot.sink
                .try_seek(Duration::from_secs_f64(position.max(0.0)))
                .map_err(|e| DeviceError::Seek(e.to_string()))?;
            slot.ended_sent = false;
        }
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        *self.inner.volume.lock().expect("volume lock") = volume;
        if let Some(slot) = self.inner.slot.lock().expect("slot lock").as_ref() {
            slot.sink.set_volume(volume);
        }
    }

    fn release(&self) {
        if let Some(slot) = self.inner.slot.lock().expect("slot lock").take() {
            slot.sink.stop();
        }
    }
}
