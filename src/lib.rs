//! Per-tenant music playback session core.
//!
//! Owns the play queue, recommendation-based autoplay with fuzzy
//! deduplication, and durable session snapshots for crash recovery.
//! The surrounding bot (command parsing, permissions, embeds, the
//! actual voice transport) talks to this crate through
//! [`SessionManager`] and the collaborator traits in [`backend`].

pub mod autoplay;
pub mod backend;
pub mod dedup;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod manager;
pub mod queue;
pub mod session;
pub mod settings;
pub mod storage;
pub mod store;
pub mod track;

mod similarity;

pub use dedup::DedupEngine;
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use fingerprint::TrackFingerprint;
pub use manager::SessionManager;
pub use queue::Queue;
pub use session::{PlaybackSession, PlayerState};
pub use settings::Settings;
pub use store::PlayerSession;
pub use track::{Requester, Track};

pub use similarity::{compare, similarity};

/// Install a formatted `tracing` subscriber honoring `RUST_LOG`. Host
/// binaries call this once at startup; calling it again is a no-op.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
