//! Near-duplicate admission gate for recommended tracks, plus the
//! bounded fingerprint pools it checks against.

use std::collections::VecDeque;

use crate::fingerprint::TrackFingerprint;
use crate::similarity::compare;
use crate::track::Track;

/// Confidence at or above which a candidate counts as already seen.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Bounded FIFO pool of fingerprints. Oldest entries are dropped once
/// the cap is exceeded.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<TrackFingerprint>,
    cap: usize,
}

impl History {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cap,
        }
    }

    /// Append unconditionally, trimming from the front past the cap.
    pub fn push(&mut self, fingerprint: TrackFingerprint) {
        self.entries.push_back(fingerprint);
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
    }

    /// Append unless an entry with the same identifier is already
    /// present (play history suppresses exact repeats).
    pub fn push_unique(&mut self, fingerprint: TrackFingerprint) {
        if self.contains_identifier(&fingerprint.identifier) {
            return;
        }
        self.push(fingerprint);
    }

    pub fn contains_identifier(&self, identifier: &str) -> bool {
        self.entries.iter().any(|fp| fp.identifier == identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackFingerprint> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Decides whether a candidate track is "already seen" against the
/// union of play history, autoplay history, and the live queue. The
/// sole gate before a recommendation may enter the queue.
#[derive(Debug, Clone, Copy)]
pub struct DedupEngine {
    threshold: f64,
}

impl Default for DedupEngine {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl DedupEngine {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// True if any pool entry compares at or above the threshold. First
    /// match short-circuits; pools have no priority order.
    pub fn is_duplicate<'a>(
        &self,
        candidate: &TrackFingerprint,
        pools: impl IntoIterator<Item = &'a TrackFingerprint>,
    ) -> bool {
        pools
            .into_iter()
            .any(|seen| compare(candidate, seen) >= self.threshold)
    }

    /// Fingerprints the candidate once and checks it against the three
    /// pools a session maintains.
    pub fn is_duplicate_track(
        &self,
        candidate: &Track,
        play_history: &History,
        autoplay_history: &History,
        queue_fingerprints: &[TrackFingerprint],
    ) -> bool {
        let fingerprint = TrackFingerprint::of(candidate);
        self.is_duplicate(
            &fingerprint,
            play_history
                .iter()
                .chain(autoplay_history.iter())
                .chain(queue_fingerprints.iter()),
        )
    }
}
