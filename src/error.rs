//! Error taxonomy for the player core
//!
//! Every I/O-boundary failure is converted into one of these at the
//! adapter/bridge where it happens; nothing here unwinds into the
//! queue/state core as an uncaught failure.

use thiserror::Error;

/// The audio device cannot load or drive a source.
///
/// Surfaced to the UI as a non-fatal notice; playback reverts to paused
/// and the user must re-trigger. Never retried automatically.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The source could not be opened or decoded
    #[error("failed to load source {url}: {message}")]
    Load { url: String, message: String },

    /// Seeking is unsupported or failed for the bound source
    #[error("seek failed: {0}")]
    Seek(String),

    /// No physical output device is available
    #[error("no audio output device: {0}")]
    NoOutput(String),
}

/// Durable storage read/write failure. Logged and swallowed; defaults apply.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Lyrics could not be fetched or parsed. Degrades to an empty timeline.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("no lyrics found for {0}")]
    NotFound(String),

    #[error("lyrics I/O error: {0}")]
    Io(#[from] std::io::Error),
}
