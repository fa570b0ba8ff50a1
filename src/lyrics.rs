//! Lyrics synchronizer
//!
//! Resolves a time-coded lyric timeline for the current track through the
//! [`LyricsSource`] boundary (cache-through, per track id) and maps the
//! playback clock onto the current line. A missing or failed timeline is
//! an empty one; lyrics never block playback.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::FetchError;
use crate::track::Track;

/// One time-coded lyric line. Timelines are sorted ascending by time.
#[derive(Clone, Debug, PartialEq)]
pub struct LyricLine {
    /// Seconds from the start of the track.
    pub time: f64,
    pub text: String,
}

/// Boundary for fetching a track's lyric timeline. Asynchronous and
/// fallible; failure means "no lyrics", never an aborted playback.
pub trait LyricsSource: Send + Sync {
    fn fetch<'a>(&'a self, track: &'a Track) -> BoxFuture<'a, Result<Vec<LyricLine>, FetchError>>;
}

/// Tracks the current timeline and line index for the playing track.
///
/// Timelines are cached by track id for the session. On a cache miss the
/// old timeline is dropped and the empty one is exposed until the fetch
/// resolves; a fetch that resolves after the track changed again is only
/// applied to the cache, not to the display.
pub struct LyricsSync {
    cache: HashMap<String, Arc<Vec<LyricLine>>>,
    current: Arc<Vec<LyricLine>>,
    line_index: usize,
    track_id: Option<String>,
}

impl Default for LyricsSync {
    fn default() -> Self {
        Self {
            cache: HashMap::new(),
            current: Arc::new(Vec::new()),
            line_index: 0,
            track_id: None,
        }
    }
}

impl LyricsSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to `track`'s timeline. Returns true when the caller needs
    /// to issue an asynchronous fetch (cache miss).
    pub fn set_track(&mut self, track: Option<&Track>) -> bool {
        self.line_index = 0;
        match track {
            None => {
                self.track_id = None;
                self.current = Arc::new(Vec::new());
                false
            }
            Some(track) => {
                self.track_id = Some(track.id.clone());
                if let Some(lines) = self.cache.get(&track.id) {
                    self.current = Arc::clone(lines);
                    false
                } else {
                    self.current = Arc::new(Vec::new());
                    true
                }
            }
        }
    }

    /// Applies a resolved fetch. The timeline goes into the cache either
    /// way; it becomes the displayed one only if `id` is still current.
    pub fn apply_fetched(&mut self, id: &str, lines: Vec<LyricLine>) {
        let lines = Arc::new(lines);
        self.cache.insert(id.to_string(), Arc::clone(&lines));
        if self.track_id.as_deref() == Some(id) {
            self.current = lines;
            self.line_index = 0;
        } else {
            tracing::debug!(track_id = %id, "Discarding stale lyrics fetch result");
        }
    }

    /// Recomputes the current line for the given playback time: the last
    /// line whose timestamp has passed, or line 0 if none qualifies.
    pub fn on_time(&mut self, seconds: f64) {
        self.line_index = self
            .current
            .partition_point(|l| l.time <= seconds)
            .saturating_sub(1);
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.current
    }

    pub fn line_index(&self) -> usize {
        self.line_index
    }

    pub fn current_line(&self) -> Option<&LyricLine> {
        self.current.get(self.line_index)
    }

    /// Maps a line index back to its timestamp, for seek-to-line.
    pub fn line_time(&self, index: usize) -> Option<f64> {
        self.current.get(index).map(|l| l.time)
    }
}

/// Parses standard LRC text into a sorted timeline.
///
/// Handles multiple `[mm:ss.xx]` tags per line; metadata tags like
/// `[ar:...]` and malformed lines are skipped.
pub fn parse_lrc(text: &str) -> Vec<LyricLine> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut rest = raw.trim();
        let mut times = Vec::new();
        while let Some(stripped) = rest.strip_prefix('[') {
            let Some(end) = stripped.find(']') else { break };
            if let Some(time) = parse_timestamp(&stripped[..end]) {
                times.push(time);
            }
            rest = stripped[end + 1..].trim_start();
        }
        for time in times {
            lines.push(LyricLine {
                time,
                text: rest.to_string(),
            });
        }
    }
    lines.sort_by(|a, b| a.time.total_cmp(&b.time));
    lines
}

fn parse_timestamp(tag: &str) -> Option<f64> {
    let (minutes, seconds) = tag.split_once(':')?;
    let minutes: f64 = minutes.trim().parse().ok()?;
    let seconds: f64 = seconds.trim().parse().ok()?;
    if minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(minutes * 60.0 + seconds)
}

/// Looks for a `<stem>.lrc` file next to the track's audio file.
pub struct FileLyricsSource;

impl FileLyricsSource {
    fn lrc_path(track: &Track) -> PathBuf {
        let path = track.url.strip_prefix("file://").unwrap_or(&track.url);
        PathBuf::from(path).with_extension("lrc")
    }
}

impl LyricsSource for FileLyricsSource {
    fn fetch<'a>(&'a self, track: &'a Track) -> BoxFuture<'a, Result<Vec<LyricLine>, FetchError>> {
        Box::pin(async move {
            let path = Self::lrc_path(track);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(FetchError::NotFound(track.id.clone()));
            }
            let text = tokio::fs::read_to_string(&path).await?;
            Ok(parse_lrc(&text))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> Vec<LyricLine> {
        vec![
            LyricLine { time: 0.0, text: "a".into() },
            LyricLine { time: 10.0, text: "b".into() },
            LyricLine { time: 20.0, text: "c".into() },
        ]
    }

    fn synced() -> LyricsSync {
        let mut sync = LyricsSync::new();
        sync.set_track(Some(&Track::new("t", "/music/t.mp3")));
        sync.apply_fetched("t", lines());
        sync
    }

    #[test]
    fn line_selection_picks_last_passed_timestamp() {
        let mut sync = synced();
        sync.on_time(15.0);
        assert_eq!(sync.line_index(), 1);
        sync.on_time(0.0);
        assert_eq!(sync.line_index(), 0);
        sync.on_time(-5.0);
        assert_eq!(sync.line_index(), 0);
        sync.on_time(20.0);
        assert_eq!(sync.line_index(), 2);
        sync.on_time(1000.0);
        assert_eq!(sync.line_index(), 2);
    }

    #[test]
    fn line_index_is_stable_on_empty_timeline() {
        let mut sync = LyricsSync::new();
        sync.on_time(42.0);
        assert_eq!(sync.line_index(), 0);
        assert!(sync.current_line().is_none());
    }

    #[test]
    fn cache_hit_is_synchronous_and_miss_requests_fetch() {
        let mut sync = synced();
        let other = Track::new("u", "/music/u.mp3");
        assert!(sync.set_track(Some(&other)));
        assert!(sync.lines().is_empty());

        // Back to the cached track: no fetch, timeline restored.
        assert!(!sync.set_track(Some(&Track::new("t", "/music/t.mp3"))));
        assert_eq!(sync.lines().len(), 3);
    }

    #[test]
    fn stale_fetch_result_is_cached_but_not_displayed() {
        let mut sync = LyricsSync::new();
        sync.set_track(Some(&Track::new("t1", "x")));
        sync.set_track(Some(&Track::new("t2", "y")));
        sync.apply_fetched("t1", lines());
        assert!(sync.lines().is_empty());

        // The late result is still usable as a cache entry.
        assert!(!sync.set_track(Some(&Track::new("t1", "x"))));
        assert_eq!(sync.lines().len(), 3);
    }

    #[test]
    fn seek_to_line_maps_index_to_time() {
        let sync = synced();
        assert_eq!(sync.line_time(1), Some(10.0));
        assert_eq!(sync.line_time(9), None);
    }

    #[test]
    fn parses_plain_lrc() {
        let lrc = "[ar:Somebody]\n[00:00.00]a\n[00:10.00]b\n[00:20.50]c\n";
        let lines = parse_lrc(lrc);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], LyricLine { time: 20.5, text: "c".into() });
    }

    #[test]
    fn parses_multi_tag_lines_and_sorts() {
        let lrc = "[01:00]chorus\n[00:30][01:30]verse\nnoise without tags\n[xx:yy]junk\n";
        let lines = parse_lrc(lrc);
        assert_eq!(
            lines
                .iter()
                .map(|l| (l.time, l.text.as_str()))
                .collect::<Vec<_>>(),
            vec![(30.0, "verse"), (60.0, "chorus"), (90.0, "verse")]
        );
    }
}
