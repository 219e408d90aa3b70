//! Structured events the core hands to the command/embed layer. The
//! core never formats user-facing text; listeners subscribe to a
//! broadcast channel and render these however they like.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::track::Track;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SessionEvent {
    TrackStarted {
        tenant_id: String,
        track: Track,
    },
    /// Natural queue exhaustion. Suppressed when playback was stopped
    /// by an explicit command.
    QueueEnded {
        tenant_id: String,
    },
    RecommendationsAdded {
        tenant_id: String,
        tracks: Vec<Track>,
    },
    SessionRestored {
        tenant_id: String,
        text_channel_id: Option<String>,
        /// Track the host should start when the voice node was not
        /// already playing one.
        resume: Option<Track>,
    },
    SessionRestoreFailed {
        tenant_id: String,
        reason: String,
    },
    SessionDestroyed {
        tenant_id: String,
    },
}

pub fn channel() -> (broadcast::Sender<SessionEvent>, broadcast::Receiver<SessionEvent>) {
    broadcast::channel(EVENT_CAPACITY)
}
