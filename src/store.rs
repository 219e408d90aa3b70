//! Durable session snapshots: one record per tenant, written atomically,
//! single-use on restore, rejected once stale.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::BlobStore;
use crate::track::Track;

/// Point-in-time serialization of a tenant's playback state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSession {
    pub tenant_id: String,
    pub text_channel_id: Option<String>,
    pub voice_channel_id: Option<String>,
    pub volume: u16,
    pub paused: bool,
    pub track_repeat: bool,
    pub queue_repeat: bool,
    pub autoplay_enabled: bool,
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    pub position_ms: u64,
    pub timestamp_ms: u64,
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Persists [`PlayerSession`] records through a [`BlobStore`].
pub struct SessionStore {
    store: Arc<dyn BlobStore>,
    staleness: Duration,
}

impl SessionStore {
    pub fn new(store: Arc<dyn BlobStore>, staleness: Duration) -> Self {
        Self { store, staleness }
    }

    pub async fn save(&self, snapshot: &PlayerSession) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot)?;
        self.store.write(&snapshot.tenant_id, &bytes).await?;
        debug!(
            "[Store] Saved session for tenant {}: current={:?}, queue={}",
            snapshot.tenant_id,
            snapshot.current_track.as_ref().map(|t| t.title.as_str()),
            snapshot.queue.len()
        );
        Ok(())
    }

    /// Load a snapshot. A corrupt record self-heals: it is deleted and
    /// reported as absent rather than failing the tenant forever.
    pub async fn load(&self, tenant_id: &str) -> Result<Option<PlayerSession>> {
        let Some(bytes) = self.store.read(tenant_id).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                warn!("[Store] Discarding corrupt session for tenant {tenant_id}: {err}");
                self.store.delete(tenant_id).await?;
                Ok(None)
            }
        }
    }

    pub async fn delete(&self, tenant_id: &str) -> Result<()> {
        self.store.delete(tenant_id).await
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        self.store.list_keys().await
    }

    /// Snapshots are only good for a short window after the process
    /// died; anything older must not be resumed.
    pub fn is_stale(&self, snapshot: &PlayerSession, now_ms: u64) -> bool {
        now_ms.saturating_sub(snapshot.timestamp_ms) > self.staleness.as_millis() as u64
    }
}
