//! Track queue: ordered track list plus the current index
//!
//! Insertion order is playback order under loop mode. The index invariant
//! is `0 <= current < len` whenever the queue is non-empty, and `None`
//! exactly when it is empty.

use rand::Rng;

use crate::track::{PlayMode, Track};

#[derive(Debug, Default)]
pub struct TrackQueue {
    tracks: Vec<Track>,
    current: Option<usize>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track. Always succeeds; duplicate ids are allowed.
    /// The first track added to an empty queue becomes current.
    pub fn add_track(&mut self, track: Track) {
        tracing::debug!(track_id = %track.id, "Adding track to queue");
        self.tracks.push(track);
        if self.current.is_none() {
            self.current = Some(0);
        }
    }

    /// Removes the first occurrence of `id`.
    ///
    /// The current index is re-clamped to stay in range: it keeps its
    /// position where possible, which effectively advances to the next
    /// track when the current one is removed. Returns false if `id` was
    /// not in the queue.
    pub fn remove_track(&mut self, id: &str) -> bool {
        let Some(removed) = self.tracks.iter().position(|t| t.id == id) else {
            return false;
        };
        self.tracks.remove(removed);
        tracing::debug!(track_id = %id, index = removed, "Removed track from queue");

        self.current = if self.tracks.is_empty() {
            None
        } else {
            self.current.map(|cur| {
                let shifted = if cur > removed { cur - 1 } else { cur };
                shifted.min(self.tracks.len() - 1)
            })
        };
        true
    }

    /// Empties the queue. Does not touch playback state; callers stop
    /// playback separately.
    pub fn clear(&mut self) {
        tracing::debug!(len = self.tracks.len(), "Clearing queue");
        self.tracks.clear();
        self.current = None;
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|i| self.tracks.get(i))
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Makes `index` current. Returns the track, or `None` when out of range
    /// (the index is left untouched in that case).
    pub fn set_current(&mut self, index: usize) -> Option<&Track> {
        if index < self.tracks.len() {
            self.current = Some(index);
            self.tracks.get(index)
        } else {
            None
        }
    }

    /// Index of the track that follows the current one under `mode`.
    ///
    /// Loop wraps to 0 at the end; Shuffle picks a uniformly random track
    /// other than the current when more than one exists; Single repeats
    /// the current track.
    pub fn next_index(&self, mode: PlayMode) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        let Some(cur) = self.current else {
            return Some(0);
        };
        match mode {
            PlayMode::Loop => Some((cur + 1) % len),
            PlayMode::Single => Some(cur),
            PlayMode::Shuffle => Some(self.random_other(cur)),
        }
    }

    /// Index of the track that precedes the current one under `mode`.
    ///
    /// For Shuffle there is no meaningful "previous"; the policy is to
    /// re-roll uniformly excluding the current track.
    pub fn prev_index(&self, mode: PlayMode) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }
        let Some(cur) = self.current else {
            return Some(0);
        };
        match mode {
            PlayMode::Loop => Some((cur + len - 1) % len),
            PlayMode::Single => Some(cur),
            PlayMode::Shuffle => Some(self.random_other(cur)),
        }
    }

    fn random_other(&self, cur: usize) -> usize {
        let len = self.tracks.len();
        if len <= 1 {
            return cur;
        }
        // Draw from [0, len-1) and skip over `cur` to stay uniform.
        let roll = rand::thread_rng().gen_range(0..len - 1);
        if roll >= cur { roll + 1 } else { roll }
    }

    /// Corrects the stored duration for every entry with this id, once the
    /// device has probed the real asset.
    pub fn correct_duration(&mut self, id: &str, duration: f64) {
        for track in self.tracks.iter_mut().filter(|t| t.id == id) {
            track.duration = Some(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track::new(id, format!("/music/{id}.mp3"))
    }

    fn queue_of(ids: &[&str]) -> TrackQueue {
        let mut q = TrackQueue::new();
        for id in ids {
            q.add_track(track(id));
        }
        q
    }

    #[test]
    fn first_add_becomes_current() {
        let mut q = TrackQueue::new();
        assert_eq!(q.current_index(), None);
        q.add_track(track("a"));
        assert_eq!(q.current_index(), Some(0));
        q.add_track(track("b"));
        assert_eq!(q.current_index(), Some(0));
    }

    #[test]
    fn duplicates_are_allowed() {
        let mut q = queue_of(&["a", "a", "a"]);
        assert_eq!(q.len(), 3);
        q.add_track(track("a"));
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn index_invariant_holds_after_any_add_remove_sequence() {
        let mut q = TrackQueue::new();
        let check = |q: &TrackQueue| {
            if q.is_empty() {
                assert_eq!(q.current_index(), None);
            } else {
                let cur = q.current_index().expect("non-empty queue has an index");
                assert!(cur < q.len());
            }
        };
        for (i, op) in [0, 0, 1, 0, 1, 1, 1, 0, 1, 1].iter().enumerate() {
            if *op == 0 {
                q.add_track(track(&format!("t{}", i % 3)));
            } else {
                q.remove_track(&format!("t{}", i % 3));
            }
            check(&q);
        }
    }

    #[test]
    fn removing_current_advances_to_next() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.set_current(1);
        q.remove_track("b");
        // Index stays at 1, which is now "c".
        assert_eq!(q.current_index(), Some(1));
        assert_eq!(q.current().unwrap().id, "c");
    }

    #[test]
    fn removing_last_current_clamps_to_end() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.set_current(2);
        q.remove_track("c");
        assert_eq!(q.current_index(), Some(1));
        assert_eq!(q.current().unwrap().id, "b");
    }

    #[test]
    fn removing_before_current_shifts_index() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.set_current(2);
        q.remove_track("a");
        assert_eq!(q.current().unwrap().id, "c");
    }

    #[test]
    fn removing_final_track_resets_sentinel() {
        let mut q = queue_of(&["a"]);
        q.remove_track("a");
        assert_eq!(q.current_index(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn loop_mode_is_a_cyclic_permutation() {
        let mut q = queue_of(&["a", "b", "c", "d"]);
        for start in 0..q.len() {
            q.set_current(start);
            for _ in 0..q.len() {
                let next = q.next_index(PlayMode::Loop).unwrap();
                q.set_current(next);
            }
            assert_eq!(q.current_index(), Some(start));
        }
    }

    #[test]
    fn loop_prev_is_inverse_of_next() {
        let mut q = queue_of(&["a", "b", "c"]);
        q.set_current(0);
        assert_eq!(q.prev_index(PlayMode::Loop), Some(2));
        let next = q.next_index(PlayMode::Loop).unwrap();
        q.set_current(next);
        assert_eq!(q.prev_index(PlayMode::Loop), Some(0));
    }

    #[test]
    fn single_mode_repeats_current() {
        let mut q = queue_of(&["a", "b"]);
        q.set_current(1);
        assert_eq!(q.next_index(PlayMode::Single), Some(1));
        assert_eq!(q.prev_index(PlayMode::Single), Some(1));
    }

    #[test]
    fn shuffle_never_returns_current_when_possible() {
        let mut q = queue_of(&["a", "b", "c", "d", "e"]);
        q.set_current(2);
        for _ in 0..200 {
            let next = q.next_index(PlayMode::Shuffle).unwrap();
            assert_ne!(next, 2);
            assert!(next < q.len());
        }
    }

    #[test]
    fn shuffle_on_singleton_returns_current() {
        let mut q = queue_of(&["a"]);
        q.set_current(0);
        assert_eq!(q.next_index(PlayMode::Shuffle), Some(0));
    }

    #[test]
    fn next_on_empty_queue_is_none() {
        let q = TrackQueue::new();
        assert_eq!(q.next_index(PlayMode::Loop), None);
        assert_eq!(q.prev_index(PlayMode::Shuffle), None);
    }

    #[test]
    fn duration_correction_touches_every_occurrence() {
        let mut q = queue_of(&["a", "b", "a"]);
        q.correct_duration("a", 182.5);
        assert_eq!(q.get(0).unwrap().duration, Some(182.5));
        assert_eq!(q.get(1).unwrap().duration, None);
        assert_eq!(q.get(2).unwrap().duration, Some(182.5));
    }
}
