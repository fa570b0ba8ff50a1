//! Track and play-mode definitions shared across the player core

use serde::{Deserialize, Serialize};

/// A single playable entry in the queue.
///
/// Immutable once enqueued, except `duration`, which the device corrects
/// after it probes the real asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    /// Known duration in seconds, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Track {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            title: None,
            artist: None,
            album: None,
            cover: None,
            duration: None,
        }
    }

    /// Best available display name for the track.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// How the queue advances when a track finishes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// Play the queue in order, wrapping at the end.
    #[default]
    Loop,
    /// Pick a random other track.
    Shuffle,
    /// Repeat the current track.
    Single,
}

impl PlayMode {
    pub fn next(self) -> Self {
        match self {
            PlayMode::Loop => PlayMode::Shuffle,
            PlayMode::Shuffle => PlayMode::Single,
            PlayMode::Single => PlayMode::Loop,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PlayMode::Loop => "loop",
            PlayMode::Shuffle => "shuffle",
            PlayMode::Single => "single",
        }
    }
}
