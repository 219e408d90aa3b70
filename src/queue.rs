//! Per-tenant play queue: an ordered track list with a current-track
//! cursor, repeat flags, and two shuffle strategies.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::error::{Error, Result};
use crate::fingerprint::TrackFingerprint;
use crate::track::Track;

#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: VecDeque<Track>,
    current: Option<Track>,
    track_repeat: bool,
    queue_repeat: bool,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a track, or insert at `index` (clamped to `[0, len]`).
    /// No deduplication happens here; admission control is the dedup
    /// engine's job, run by callers before `add`.
    pub fn add(&mut self, track: Track, index: Option<usize>) {
        match index {
            Some(index) => {
                let index = index.min(self.tracks.len());
                self.tracks.insert(index, track);
            }
            None => self.tracks.push_back(track),
        }
    }

    /// Add a batch, preserving its order, at the tail or at `index`.
    pub fn add_all(&mut self, tracks: Vec<Track>, index: Option<usize>) {
        match index {
            Some(index) => {
                let base = index.min(self.tracks.len());
                for (offset, track) in tracks.into_iter().enumerate() {
                    self.tracks.insert(base + offset, track);
                }
            }
            None => self.tracks.extend(tracks),
        }
    }

    /// Remove and return the track at `index`. The current track is not
    /// addressable here and is never touched.
    pub fn remove(&mut self, index: usize) -> Result<Track> {
        let len = self.tracks.len();
        self.tracks.remove(index).ok_or_else(|| {
            Error::InvalidArgument(format!("queue index {index} out of range (length {len})"))
        })
    }

    /// Drop all queued tracks. `current` is unaffected.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Clamped pagination window over the queued tracks.
    pub fn slice(&self, start: usize, end: usize) -> Vec<Track> {
        let end = end.min(self.tracks.len());
        if start >= end {
            return Vec::new();
        }
        self.tracks.iter().skip(start).take(end - start).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn set_current(&mut self, track: Option<Track>) {
        self.current = track;
    }

    /// Total duration in milliseconds, including `current` when present.
    /// Streams report zero and therefore contribute nothing. Callers
    /// wanting "remaining" time subtract the current track themselves.
    pub fn duration_ms(&self) -> u64 {
        let queued: u64 = self.tracks.iter().map(|t| t.duration_ms).sum();
        queued + self.current.as_ref().map_or(0, |t| t.duration_ms)
    }

    pub fn track_repeat(&self) -> bool {
        self.track_repeat
    }

    pub fn queue_repeat(&self) -> bool {
        self.queue_repeat
    }

    /// At most one repeat mode is active; enabling one clears the other.
    pub fn set_track_repeat(&mut self, enabled: bool) {
        self.track_repeat = enabled;
        if enabled {
            self.queue_repeat = false;
        }
    }

    pub fn set_queue_repeat(&mut self, enabled: bool) {
        self.queue_repeat = enabled;
        if enabled {
            self.track_repeat = false;
        }
    }

    /// Uniform random permutation of the queued tracks (`current` is
    /// not part of the deck).
    pub fn shuffle_random(&mut self) {
        self.tracks.make_contiguous().shuffle(&mut thread_rng());
    }

    /// Interleave requester groups round-robin: one track per requester
    /// per pass, groups in first-encountered order, each group keeping
    /// its internal order. No requester dominates consecutive slots
    /// while others still have tracks waiting.
    pub fn shuffle_round_robin(&mut self) {
        let mut groups: Vec<(String, VecDeque<Track>)> = Vec::new();
        for track in self.tracks.drain(..) {
            let key = track.requester.identity().to_string();
            match groups.iter_mut().find(|(id, _)| *id == key) {
                Some((_, group)) => group.push_back(track),
                None => groups.push((key, VecDeque::from([track]))),
            }
        }

        let mut interleaved = VecDeque::new();
        loop {
            let mut exhausted = true;
            for (_, group) in groups.iter_mut() {
                if let Some(track) = group.pop_front() {
                    interleaved.push_back(track);
                    exhausted = false;
                }
            }
            if exhausted {
                break;
            }
        }
        self.tracks = interleaved;
    }

    /// Move to the next track per the active repeat mode, returning what
    /// should play now (None once the queue is exhausted).
    ///
    /// Track repeat replays `current`; queue repeat requeues the finished
    /// track at the tail before advancing.
    pub fn advance(&mut self) -> Option<Track> {
        if self.track_repeat {
            if let Some(current) = self.current.clone() {
                return Some(current);
            }
        }
        if self.queue_repeat {
            if let Some(finished) = self.current.take() {
                self.tracks.push_back(finished);
            }
        }
        self.current = self.tracks.pop_front();
        self.current.clone()
    }

    /// Fingerprints for every queued track plus `current`, the queue's
    /// contribution to the dedup exclusion set.
    pub fn fingerprints(&self) -> Vec<TrackFingerprint> {
        self.tracks
            .iter()
            .chain(self.current.as_ref())
            .map(TrackFingerprint::of)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Requester;

    fn track_by(identifier: &str, requester: Requester) -> Track {
        Track::new(
            identifier,
            format!("Song {identifier}"),
            "Artist",
            200_000,
            None,
            "https://example.com/watch",
            requester,
        )
        .unwrap()
    }

    fn track(identifier: &str) -> Track {
        track_by(identifier, Requester::user("u1", "alice"))
    }

    #[test]
    fn add_appends_by_default() {
        let mut queue = Queue::new();
        queue.add(track("a"), None);
        queue.add(track("b"), None);
        assert_eq!(queue.get(1).unwrap().identifier, "b");
    }

    #[test]
    fn add_at_zero_prepends() {
        let mut queue = Queue::new();
        queue.add(track("a"), None);
        queue.add(track("b"), Some(0));
        assert_eq!(queue.get(0).unwrap().identifier, "b");
    }

    #[test]
    fn add_clamps_oversized_index() {
        let mut queue = Queue::new();
        queue.add(track("a"), None);
        queue.add(track("b"), Some(99));
        assert_eq!(queue.get(1).unwrap().identifier, "b");
    }

    #[test]
    fn add_all_preserves_batch_order_at_index() {
        let mut queue = Queue::new();
        queue.add(track("a"), None);
        queue.add(track("d"), None);
        queue.add_all(vec![track("b"), track("c")], Some(1));
        let ids: Vec<_> = queue.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
    }

    #[test]
    fn remove_middle_preserves_order() {
        let mut queue = Queue::new();
        queue.add_all(vec![track("t1"), track("t2"), track("t3")], None);
        let removed = queue.remove(1).unwrap();
        assert_eq!(removed.identifier, "t2");
        let ids: Vec<_> = queue.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(ids, ["t1", "t3"]);
    }

    #[test]
    fn remove_out_of_range_fails() {
        let mut queue = Queue::new();
        queue.add(track("a"), None);
        assert!(matches!(queue.remove(1), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn remove_does_not_touch_current() {
        let mut queue = Queue::new();
        queue.set_current(Some(track("now")));
        queue.add(track("a"), None);
        queue.remove(0).unwrap();
        assert_eq!(queue.current().unwrap().identifier, "now");
    }

    #[test]
    fn clear_keeps_current() {
        let mut queue = Queue::new();
        queue.set_current(Some(track("now")));
        queue.add(track("a"), None);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.current().is_some());
    }

    #[test]
    fn repeat_modes_are_mutually_exclusive() {
        let mut queue = Queue::new();
        queue.set_track_repeat(true);
        queue.set_queue_repeat(true);
        assert!(!queue.track_repeat());
        assert!(queue.queue_repeat());
        queue.set_track_repeat(true);
        assert!(queue.track_repeat());
        assert!(!queue.queue_repeat());
    }

    #[test]
    fn disabling_one_mode_leaves_the_other_off() {
        let mut queue = Queue::new();
        queue.set_track_repeat(true);
        queue.set_track_repeat(false);
        assert!(!queue.track_repeat());
        assert!(!queue.queue_repeat());
    }

    #[test]
    fn duration_sums_queue_and_current() {
        let mut queue = Queue::new();
        queue.set_current(Some(track("now")));
        queue.add(track("a"), None);
        assert_eq!(queue.duration_ms(), 400_000);
    }

    #[test]
    fn duration_counts_streams_as_zero() {
        let mut queue = Queue::new();
        let stream = Track::new(
            "live",
            "radio",
            "X",
            0,
            None,
            "https://example.com/live",
            Requester::user("u1", "alice"),
        )
        .unwrap();
        queue.add(stream, None);
        queue.add(track("a"), None);
        assert_eq!(queue.duration_ms(), 200_000);
    }

    #[test]
    fn slice_clamps_bounds() {
        let mut queue = Queue::new();
        queue.add_all(vec![track("a"), track("b"), track("c")], None);
        let page = queue.slice(1, 99);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].identifier, "b");
        assert!(queue.slice(5, 9).is_empty());
    }

    #[test]
    fn shuffle_random_keeps_current_and_membership() {
        let mut queue = Queue::new();
        queue.set_current(Some(track("now")));
        for i in 0..20 {
            queue.add(track(&format!("t{i}")), None);
        }
        queue.shuffle_random();
        assert_eq!(queue.len(), 20);
        assert_eq!(queue.current().unwrap().identifier, "now");
        for i in 0..20 {
            let id = format!("t{i}");
            assert!(queue.iter().any(|t| t.identifier == id));
        }
    }

    #[test]
    fn round_robin_interleaves_requesters_fairly() {
        let mut queue = Queue::new();
        let alice = Requester::user("A", "alice");
        let bob = Requester::user("B", "bob");
        queue.add(track_by("a1", alice.clone()), None);
        queue.add(track_by("a2", alice.clone()), None);
        queue.add(track_by("a3", alice.clone()), None);
        queue.add(track_by("b1", bob.clone()), None);
        queue.shuffle_round_robin();

        let owners: Vec<_> = queue.iter().map(|t| t.requester.identity().to_string()).collect();
        assert_eq!(owners, ["A", "B", "A", "A"]);

        // each group keeps its internal order
        let ids: Vec<_> = queue.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(ids, ["a1", "b1", "a2", "a3"]);
    }

    #[test]
    fn round_robin_no_consecutive_repeats_until_exhausted() {
        let mut queue = Queue::new();
        let alice = Requester::user("A", "alice");
        let bob = Requester::user("B", "bob");
        queue.add(track_by("a1", alice.clone()), None);
        queue.add(track_by("a2", alice.clone()), None);
        queue.add(track_by("b1", bob.clone()), None);
        queue.add(track_by("b2", bob.clone()), None);
        queue.shuffle_round_robin();

        let owners: Vec<_> = queue.iter().map(|t| t.requester.identity()).collect();
        for pair in owners.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn advance_pops_in_order() {
        let mut queue = Queue::new();
        queue.add_all(vec![track("a"), track("b")], None);
        assert_eq!(queue.advance().unwrap().identifier, "a");
        assert_eq!(queue.advance().unwrap().identifier, "b");
        assert!(queue.advance().is_none());
    }

    #[test]
    fn advance_with_track_repeat_replays_current() {
        let mut queue = Queue::new();
        queue.add_all(vec![track("a"), track("b")], None);
        queue.advance();
        queue.set_track_repeat(true);
        assert_eq!(queue.advance().unwrap().identifier, "a");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn advance_with_queue_repeat_requeues_finished() {
        let mut queue = Queue::new();
        queue.set_queue_repeat(true);
        queue.add_all(vec![track("a"), track("b")], None);
        assert_eq!(queue.advance().unwrap().identifier, "a");
        assert_eq!(queue.advance().unwrap().identifier, "b");
        assert_eq!(queue.advance().unwrap().identifier, "a");
    }

    #[test]
    fn fingerprints_include_current() {
        let mut queue = Queue::new();
        queue.set_current(Some(track("now")));
        queue.add(track("a"), None);
        let fps = queue.fingerprints();
        assert_eq!(fps.len(), 2);
        assert!(fps.iter().any(|fp| fp.identifier == "now"));
    }
}
