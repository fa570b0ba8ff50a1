//! Transport state: playing/paused, volume, play mode, current time
//!
//! Setters are total over their declared domains; out-of-range input is
//! clamped rather than rejected. Transitions are synchronous and
//! immediately observable; debouncing belongs to the device adapter or
//! the UI, never here.

use crate::track::PlayMode;

#[derive(Debug)]
pub struct PlaybackState {
    current_track: Option<String>,
    is_playing: bool,
    volume: f32,
    play_mode: PlayMode,
    current_time: f64,
    duration: Option<f64>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current_track: None,
            is_playing: false,
            volume: 1.0,
            play_mode: PlayMode::default(),
            current_time: 0.0,
            duration: None,
        }
    }
}

impl PlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_track(&self) -> Option<&str> {
        self.current_track.as_deref()
    }

    /// Addresses a track by id, or stops addressing any track.
    ///
    /// The transport cannot play nothing: clearing the track forces
    /// `is_playing = false`. Addressing a track (including re-addressing
    /// the same one, e.g. a single-mode repeat) resets the clock.
    pub fn set_current_track(&mut self, id: Option<String>) {
        self.current_time = 0.0;
        self.duration = None;
        if id.is_none() {
            self.is_playing = false;
        }
        self.current_track = id;
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Playing requires an addressed track; `true` without one is ignored.
    pub fn set_playing(&mut self, playing: bool) {
        self.is_playing = playing && self.current_track.is_some();
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Stores `clamp(v, 0, 1)`. Non-finite input is ignored.
    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_finite() {
            self.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn play_mode(&self) -> PlayMode {
        self.play_mode
    }

    pub fn set_play_mode(&mut self, mode: PlayMode) {
        self.play_mode = mode;
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Advances the clock. Negative input clamps to zero; while a duration
    /// is known the clock never runs past it.
    pub fn update_current_time(&mut self, seconds: f64) {
        let mut t = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if let Some(duration) = self.duration {
            t = t.min(duration);
        }
        self.current_time = t;
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Option<f64>) {
        self.duration = duration.filter(|d| d.is_finite() && *d >= 0.0);
        if let Some(d) = self.duration {
            self.current_time = self.current_time.min(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_is_clamped_for_any_input() {
        let mut s = PlaybackState::new();
        for (input, expected) in [(0.5, 0.5), (-3.0, 0.0), (7.2, 1.0), (0.0, 0.0), (1.0, 1.0)] {
            s.set_volume(input);
            assert_eq!(s.volume(), expected);
        }
        s.set_volume(0.3);
        s.set_volume(f32::NAN);
        assert_eq!(s.volume(), 0.3);
    }

    #[test]
    fn clearing_track_forces_paused() {
        let mut s = PlaybackState::new();
        s.set_current_track(Some("a".into()));
        s.set_playing(true);
        assert!(s.is_playing());
        s.set_current_track(None);
        assert!(!s.is_playing());

        // Holds regardless of prior state.
        s.set_current_track(None);
        assert!(!s.is_playing());
    }

    #[test]
    fn playing_without_a_track_is_rejected() {
        let mut s = PlaybackState::new();
        s.set_playing(true);
        assert!(!s.is_playing());
    }

    #[test]
    fn switching_tracks_resets_the_clock() {
        let mut s = PlaybackState::new();
        s.set_current_track(Some("a".into()));
        s.set_duration(Some(100.0));
        s.update_current_time(42.0);
        s.set_current_track(Some("b".into()));
        assert_eq!(s.current_time(), 0.0);
        assert_eq!(s.duration(), None);
    }

    #[test]
    fn clock_clamps_into_known_duration() {
        let mut s = PlaybackState::new();
        s.set_current_track(Some("a".into()));
        s.set_duration(Some(180.0));
        s.update_current_time(-5.0);
        assert_eq!(s.current_time(), 0.0);
        s.update_current_time(200.0);
        assert_eq!(s.current_time(), 180.0);
        s.update_current_time(90.0);
        assert_eq!(s.current_time(), 90.0);
    }

    #[test]
    fn late_duration_clamps_an_ahead_clock() {
        let mut s = PlaybackState::new();
        s.set_current_track(Some("a".into()));
        s.update_current_time(500.0);
        s.set_duration(Some(300.0));
        assert_eq!(s.current_time(), 300.0);
    }
}
