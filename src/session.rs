//! Live per-tenant playback state: the queue, history pools, player
//! flags, and the small Idle/Playing/Paused state machine.

use serde::Serialize;

use crate::dedup::History;
use crate::fingerprint::TrackFingerprint;
use crate::queue::Queue;
use crate::store::PlayerSession;
use crate::track::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
}

/// One tenant's playback session. Created when playback starts,
/// destroyed on explicit stop or tenant teardown; the history pools die
/// with it.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    tenant_id: String,
    pub text_channel_id: Option<String>,
    pub voice_channel_id: Option<String>,
    pub volume: u16,
    pub paused: bool,
    pub position_ms: u64,
    pub autoplay_enabled: bool,
    /// Set before an explicit stop so completion handlers (queue-ended
    /// notifications, inactivity timers) suppress their side effects.
    pub stopped_by_command: bool,
    state: PlayerState,
    pub queue: Queue,
    play_history: History,
    autoplay_history: History,
}

impl PlaybackSession {
    pub fn new(
        tenant_id: impl Into<String>,
        text_channel_id: Option<String>,
        voice_channel_id: Option<String>,
        volume: u16,
        play_history_cap: usize,
        autoplay_history_cap: usize,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            text_channel_id,
            voice_channel_id,
            volume,
            paused: false,
            position_ms: 0,
            autoplay_enabled: false,
            stopped_by_command: false,
            state: PlayerState::Idle,
            queue: Queue::new(),
            play_history: History::new(play_history_cap),
            autoplay_history: History::new(autoplay_history_cap),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn begin_playing(&mut self) {
        self.state = PlayerState::Playing;
        self.paused = false;
    }

    /// Playing → Paused. Returns false when there is nothing to pause.
    pub fn pause(&mut self) -> bool {
        if self.state != PlayerState::Playing {
            return false;
        }
        self.state = PlayerState::Paused;
        self.paused = true;
        true
    }

    /// Paused → Playing. Returns false when not paused.
    pub fn resume(&mut self) -> bool {
        if self.state != PlayerState::Paused {
            return false;
        }
        self.state = PlayerState::Playing;
        self.paused = false;
        true
    }

    /// Back to Idle on queue exhaustion or explicit stop.
    pub fn finish(&mut self) {
        self.state = PlayerState::Idle;
        self.paused = false;
        self.position_ms = 0;
    }

    /// Adopt the voice node's live view of this tenant after a restore
    /// found playback already running there.
    pub fn apply_remote_state(&mut self, paused: bool, position_ms: u64) {
        self.paused = paused;
        self.position_ms = position_ms;
        self.state = if paused {
            PlayerState::Paused
        } else {
            PlayerState::Playing
        };
    }

    /// Note an actually-played track. Exact repeats (same identifier)
    /// are not recorded twice.
    pub fn record_play(&mut self, track: &Track) {
        self.play_history.push_unique(TrackFingerprint::of(track));
    }

    /// Note tracks injected by the recommendation engine.
    pub fn record_autoplayed(&mut self, tracks: &[Track]) {
        for track in tracks {
            self.autoplay_history.push(TrackFingerprint::of(track));
        }
    }

    pub fn play_history(&self) -> &History {
        &self.play_history
    }

    pub fn autoplay_history(&self) -> &History {
        &self.autoplay_history
    }

    /// Union of everything autoplay must not recommend again: both
    /// history pools plus the live queue (current track included).
    pub fn exclusion_fingerprints(&self) -> Vec<TrackFingerprint> {
        let mut fingerprints = self.queue.fingerprints();
        fingerprints.extend(self.play_history.iter().cloned());
        fingerprints.extend(self.autoplay_history.iter().cloned());
        fingerprints
    }

    pub fn snapshot(&self, timestamp_ms: u64) -> PlayerSession {
        PlayerSession {
            tenant_id: self.tenant_id.clone(),
            text_channel_id: self.text_channel_id.clone(),
            voice_channel_id: self.voice_channel_id.clone(),
            volume: self.volume,
            paused: self.paused,
            track_repeat: self.queue.track_repeat(),
            queue_repeat: self.queue.queue_repeat(),
            autoplay_enabled: self.autoplay_enabled,
            current_track: self.queue.current().cloned(),
            queue: self.queue.iter().cloned().collect(),
            position_ms: self.position_ms,
            timestamp_ms,
        }
    }

    /// Rebuild a session from a snapshot. History pools start empty:
    /// they are working memory for dedup, not part of the durable state.
    pub fn from_snapshot(
        snapshot: &PlayerSession,
        play_history_cap: usize,
        autoplay_history_cap: usize,
    ) -> Self {
        let mut session = Self::new(
            snapshot.tenant_id.clone(),
            snapshot.text_channel_id.clone(),
            snapshot.voice_channel_id.clone(),
            snapshot.volume,
            play_history_cap,
            autoplay_history_cap,
        );
        session.queue.add_all(snapshot.queue.clone(), None);
        session.queue.set_current(snapshot.current_track.clone());
        if snapshot.track_repeat {
            session.queue.set_track_repeat(true);
        }
        if snapshot.queue_repeat {
            session.queue.set_queue_repeat(true);
        }
        session.autoplay_enabled = snapshot.autoplay_enabled;
        session.position_ms = snapshot.position_ms;
        session.paused = snapshot.paused;
        session.state = match snapshot.current_track {
            Some(_) if snapshot.paused => PlayerState::Paused,
            Some(_) => PlayerState::Playing,
            None => PlayerState::Idle,
        };
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::now_ms;
    use crate::track::Requester;

    fn track(identifier: &str) -> Track {
        Track::new(
            identifier,
            format!("Song {identifier}"),
            "Artist",
            200_000,
            None,
            "https://example.com/watch",
            Requester::user("u1", "alice"),
        )
        .unwrap()
    }

    fn session() -> PlaybackSession {
        PlaybackSession::new("g1", Some("text1".into()), Some("voice1".into()), 50, 50, 100)
    }

    #[test]
    fn starts_idle() {
        let session = session();
        assert_eq!(session.state(), PlayerState::Idle);
        assert!(!session.paused);
    }

    #[test]
    fn state_machine_transitions() {
        let mut session = session();
        assert!(!session.pause(), "cannot pause while idle");
        session.begin_playing();
        assert!(session.pause());
        assert_eq!(session.state(), PlayerState::Paused);
        assert!(session.resume());
        assert_eq!(session.state(), PlayerState::Playing);
        session.finish();
        assert_eq!(session.state(), PlayerState::Idle);
        assert!(!session.resume(), "cannot resume from idle");
    }

    #[test]
    fn record_play_suppresses_repeat_identifiers() {
        let mut session = session();
        session.record_play(&track("a"));
        session.record_play(&track("a"));
        assert_eq!(session.play_history().len(), 1);
    }

    #[test]
    fn record_autoplayed_keeps_every_entry() {
        let mut session = session();
        session.record_autoplayed(&[track("a"), track("a")]);
        assert_eq!(session.autoplay_history().len(), 2);
    }

    #[test]
    fn exclusion_covers_all_three_pools() {
        let mut session = session();
        session.record_play(&track("played"));
        session.record_autoplayed(&[track("injected")]);
        session.queue.set_current(Some(track("now")));
        session.queue.add(track("queued"), None);

        let ids: Vec<_> = session
            .exclusion_fingerprints()
            .iter()
            .map(|fp| fp.identifier.clone())
            .collect();
        for id in ["played", "injected", "now", "queued"] {
            assert!(ids.contains(&id.to_string()), "missing {id}");
        }
    }

    #[test]
    fn snapshot_round_trip_preserves_queue_and_flags() {
        let mut session = session();
        session.queue.set_current(Some(track("now")));
        session.queue.add_all(vec![track("a"), track("b")], None);
        session.queue.set_queue_repeat(true);
        session.autoplay_enabled = true;
        session.volume = 80;
        session.position_ms = 123_456;
        session.begin_playing();

        let snapshot = session.snapshot(now_ms());
        let restored = PlaybackSession::from_snapshot(&snapshot, 50, 100);

        assert_eq!(restored.tenant_id(), "g1");
        assert_eq!(restored.volume, 80);
        assert_eq!(restored.position_ms, 123_456);
        assert!(restored.autoplay_enabled);
        assert!(restored.queue.queue_repeat());
        assert!(!restored.queue.track_repeat());
        assert_eq!(restored.queue.current().unwrap().identifier, "now");
        let ids: Vec<_> = restored.queue.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(restored.state(), PlayerState::Playing);
    }

    #[test]
    fn from_snapshot_without_current_is_idle() {
        let session = session();
        let snapshot = session.snapshot(now_ms());
        let restored = PlaybackSession::from_snapshot(&snapshot, 50, 100);
        assert_eq!(restored.state(), PlayerState::Idle);
    }

    #[test]
    fn apply_remote_state_prefers_node_view() {
        let mut session = session();
        session.apply_remote_state(true, 9_000);
        assert_eq!(session.state(), PlayerState::Paused);
        assert!(session.paused);
        assert_eq!(session.position_ms, 9_000);
    }
}
