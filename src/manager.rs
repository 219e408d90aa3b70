//! Top-level session manager: owns the per-tenant session registry and
//! inactivity timers, reacts to track lifecycle callbacks, triggers
//! autoplay, and drives snapshot save/restore across all tenants.
//!
//! Registry mutations never span a collaborator await: state is locked,
//! changed or copied out, unlocked, and re-validated after the await.
//! Every path that runs after a suspension tolerates "tenant already
//! torn down".

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::autoplay;
use crate::backend::{ChannelResolver, PlayerGateway, SearchBackend};
use crate::dedup::DedupEngine;
use crate::error::{Error, Result};
use crate::events::{self, SessionEvent};
use crate::fingerprint::TrackFingerprint;
use crate::session::{PlaybackSession, PlayerState};
use crate::settings::Settings;
use crate::storage::BlobStore;
use crate::store::{now_ms, SessionStore};
use crate::track::{Requester, Track};

pub struct SessionManager {
    sessions: TokioMutex<HashMap<String, PlaybackSession>>,
    timers: StdMutex<HashMap<String, JoinHandle<()>>>,
    backend: Arc<dyn SearchBackend>,
    channels: Arc<dyn ChannelResolver>,
    gateway: Arc<dyn PlayerGateway>,
    store: SessionStore,
    dedup: DedupEngine,
    events: broadcast::Sender<SessionEvent>,
    settings: Settings,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        channels: Arc<dyn ChannelResolver>,
        gateway: Arc<dyn PlayerGateway>,
        blob_store: Arc<dyn BlobStore>,
        settings: Settings,
    ) -> Arc<Self> {
        let (events, _) = events::channel();
        let store = SessionStore::new(blob_store, settings.staleness());
        let dedup = DedupEngine::new(settings.dedup_threshold);
        Arc::new(Self {
            sessions: TokioMutex::new(HashMap::new()),
            timers: StdMutex::new(HashMap::new()),
            backend,
            channels,
            gateway,
            store,
            dedup,
            events,
            settings,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn emit(&self, event: SessionEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Create (or re-point) a tenant's session.
    pub async fn create_session(
        &self,
        tenant_id: &str,
        text_channel_id: Option<String>,
        voice_channel_id: Option<String>,
    ) {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(tenant_id) {
            Some(session) => {
                session.text_channel_id = text_channel_id;
                session.voice_channel_id = voice_channel_id;
            }
            None => {
                info!("[Session] Created session for tenant {tenant_id}");
                sessions.insert(
                    tenant_id.to_string(),
                    PlaybackSession::new(
                        tenant_id,
                        text_channel_id,
                        voice_channel_id,
                        self.settings.default_volume,
                        self.settings.play_history_cap,
                        self.settings.autoplay_history_cap,
                    ),
                );
            }
        }
    }

    pub async fn session_exists(&self, tenant_id: &str) -> bool {
        self.sessions.lock().await.contains_key(tenant_id)
    }

    pub async fn active_tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        tenants.sort();
        tenants
    }

    /// Run a closure against one tenant's session. None if the tenant
    /// has no session.
    pub async fn with_session<R>(
        &self,
        tenant_id: &str,
        f: impl FnOnce(&mut PlaybackSession) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(tenant_id).map(f)
    }

    async fn try_with_session<R>(
        &self,
        tenant_id: &str,
        f: impl FnOnce(&mut PlaybackSession) -> R,
    ) -> Result<R> {
        self.with_session(tenant_id, f)
            .await
            .ok_or_else(|| Error::NotFound(format!("no session for tenant {tenant_id}")))
    }

    // ---- queue commands -------------------------------------------------

    pub async fn enqueue(
        &self,
        tenant_id: &str,
        tracks: Vec<Track>,
        index: Option<usize>,
    ) -> Result<usize> {
        self.try_with_session(tenant_id, |session| {
            session.queue.add_all(tracks, index);
            session.queue.len()
        })
        .await
    }

    pub async fn remove_track(&self, tenant_id: &str, index: usize) -> Result<Track> {
        self.try_with_session(tenant_id, |session| session.queue.remove(index))
            .await?
    }

    pub async fn clear_queue(&self, tenant_id: &str) -> Result<()> {
        self.try_with_session(tenant_id, |session| session.queue.clear())
            .await
    }

    pub async fn shuffle_random(&self, tenant_id: &str) -> Result<()> {
        self.try_with_session(tenant_id, |session| session.queue.shuffle_random())
            .await
    }

    pub async fn shuffle_round_robin(&self, tenant_id: &str) -> Result<()> {
        self.try_with_session(tenant_id, |session| session.queue.shuffle_round_robin())
            .await
    }

    pub async fn set_track_repeat(&self, tenant_id: &str, enabled: bool) -> Result<()> {
        self.try_with_session(tenant_id, |session| session.queue.set_track_repeat(enabled))
            .await
    }

    pub async fn set_queue_repeat(&self, tenant_id: &str, enabled: bool) -> Result<()> {
        self.try_with_session(tenant_id, |session| session.queue.set_queue_repeat(enabled))
            .await
    }

    pub async fn set_volume(&self, tenant_id: &str, volume: u16) -> Result<()> {
        self.try_with_session(tenant_id, |session| session.volume = volume.min(100))
            .await
    }

    /// Pause or resume. Returns whether the state actually changed.
    pub async fn set_paused(&self, tenant_id: &str, paused: bool) -> Result<bool> {
        self.try_with_session(tenant_id, |session| {
            if paused {
                session.pause()
            } else {
                session.resume()
            }
        })
        .await
    }

    /// Periodic position report from the host's player loop.
    pub async fn set_position(&self, tenant_id: &str, position_ms: u64) -> Result<()> {
        self.try_with_session(tenant_id, |session| session.position_ms = position_ms)
            .await
    }

    // ---- autoplay -------------------------------------------------------

    /// Toggle autoplay. Enabling it with a track on deck seeds the
    /// queue immediately; the injected batch is returned.
    pub async fn set_autoplay(&self, tenant_id: &str, enabled: bool) -> Result<Vec<Track>> {
        let seed = self
            .try_with_session(tenant_id, |session| {
                session.autoplay_enabled = enabled;
                if enabled {
                    session
                        .queue
                        .current()
                        .cloned()
                        .map(|current| (current, session.exclusion_fingerprints()))
                } else {
                    None
                }
            })
            .await?;

        match seed {
            Some((current, exclusion)) => Ok(self
                .top_up(tenant_id, &current, self.settings.autoplay_seed_batch, exclusion)
                .await),
            None => Ok(Vec::new()),
        }
    }

    /// Fetch recommendations and append whatever survives dedup. The
    /// session is re-checked after each network hop; a tenant torn down
    /// mid-fetch just drops the batch.
    async fn top_up(
        &self,
        tenant_id: &str,
        seed: &Track,
        batch: usize,
        exclusion: Vec<TrackFingerprint>,
    ) -> Vec<Track> {
        let batch = batch.min(autoplay::MAX_RELATED);
        let mut found = match autoplay::fetch_related(
            self.backend.as_ref(),
            seed,
            batch,
            &exclusion,
            &self.dedup,
        )
        .await
        {
            Ok(tracks) => tracks,
            Err(err) => {
                warn!("[Autoplay] Recommendation fetch failed for tenant {tenant_id}: {err}");
                Vec::new()
            }
        };

        if found.is_empty() {
            found = match autoplay::fetch_by_author(
                self.backend.as_ref(),
                seed,
                batch,
                &exclusion,
                &self.dedup,
            )
            .await
            {
                Ok(tracks) => tracks,
                Err(err) => {
                    warn!("[Autoplay] Author fallback failed for tenant {tenant_id}: {err}");
                    Vec::new()
                }
            };
        }

        if found.is_empty() {
            return Vec::new();
        }

        let tagged: Vec<Track> = found
            .into_iter()
            .map(|track| track.with_requester(Requester::Autoplay))
            .collect();

        let appended = {
            let mut sessions = self.sessions.lock().await;
            match sessions.get_mut(tenant_id) {
                Some(session) if session.autoplay_enabled => {
                    session.queue.add_all(tagged.clone(), None);
                    session.record_autoplayed(&tagged);
                    true
                }
                _ => false,
            }
        };
        if !appended {
            debug!("[Autoplay] Tenant {tenant_id} went away mid-fetch, dropping batch");
            return Vec::new();
        }

        info!(
            "[Autoplay] Added {} related tracks for tenant {tenant_id}",
            tagged.len()
        );
        self.emit(SessionEvent::RecommendationsAdded {
            tenant_id: tenant_id.to_string(),
            tracks: tagged.clone(),
        });
        tagged
    }

    // ---- track lifecycle ------------------------------------------------

    /// The host confirmed a track is playing. Records history, keeps the
    /// cursor in sync, and tops the queue up when autoplay is on and the
    /// queue has run low. Returns any tracks autoplay injected.
    pub async fn handle_track_start(
        &self,
        tenant_id: &str,
        track: &Track,
    ) -> Result<Vec<Track>> {
        self.cancel_inactivity_timer(tenant_id);

        let fetch = self
            .try_with_session(tenant_id, |session| {
                session.queue.set_current(Some(track.clone()));
                session.begin_playing();
                session.record_play(track);
                if session.autoplay_enabled && session.queue.len() <= self.settings.low_water_mark {
                    Some(session.exclusion_fingerprints())
                } else {
                    None
                }
            })
            .await?;

        self.emit(SessionEvent::TrackStarted {
            tenant_id: tenant_id.to_string(),
            track: track.clone(),
        });

        match fetch {
            Some(exclusion) => Ok(self
                .top_up(tenant_id, track, self.settings.autoplay_batch, exclusion)
                .await),
            None => Ok(Vec::new()),
        }
    }

    /// A track finished naturally. Advances the queue per the repeat
    /// flags and returns what the host should play next; None means the
    /// queue is exhausted (a queue-ended event fires unless playback was
    /// stopped by command, and the idle session is scheduled for
    /// teardown).
    pub async fn handle_track_end(self: &Arc<Self>, tenant_id: &str) -> Result<Option<Track>> {
        let (next, stopped) = self
            .try_with_session(tenant_id, |session| {
                let next = session.queue.advance();
                if next.is_none() {
                    session.finish();
                }
                (next, session.stopped_by_command)
            })
            .await?;

        if next.is_none() && !stopped {
            self.emit(SessionEvent::QueueEnded {
                tenant_id: tenant_id.to_string(),
            });
            self.schedule_inactivity_destroy(tenant_id, self.settings.inactivity());
        }
        Ok(next)
    }

    // ---- teardown -------------------------------------------------------

    /// Explicit stop: flags the session first so queue-ended handling
    /// stays quiet, then removes the snapshot, the backend player, and
    /// the session itself. Idempotent.
    pub async fn stop(&self, tenant_id: &str) -> Result<()> {
        let existed = self
            .with_session(tenant_id, |session| {
                session.stopped_by_command = true;
            })
            .await
            .is_some();
        if !existed {
            return Ok(());
        }

        if let Err(err) = self.store.delete(tenant_id).await {
            warn!("[Session] Failed to delete snapshot for tenant {tenant_id}: {err}");
        }
        if let Err(err) = self.gateway.destroy_player(tenant_id).await {
            warn!("[Session] Failed to destroy backend player for tenant {tenant_id}: {err}");
        }
        self.destroy_session(tenant_id).await;
        Ok(())
    }

    /// Drop the tenant's registry entry (histories die with it) and any
    /// pending timer. Idempotent against "already torn down".
    pub async fn destroy_session(&self, tenant_id: &str) -> bool {
        self.cancel_inactivity_timer(tenant_id);
        let removed = self.sessions.lock().await.remove(tenant_id);
        if removed.is_some() {
            info!("[Session] Destroyed session for tenant {tenant_id}");
            self.emit(SessionEvent::SessionDestroyed {
                tenant_id: tenant_id.to_string(),
            });
            true
        } else {
            false
        }
    }

    // ---- timers ---------------------------------------------------------

    pub fn cancel_inactivity_timer(&self, tenant_id: &str) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timers.remove(tenant_id) {
            handle.abort();
        }
    }

    /// Arm (or re-arm) the single inactivity timer for a tenant. When it
    /// fires, the session is destroyed only if it is still idle with an
    /// empty queue; anything else that happened in the meantime wins.
    pub fn schedule_inactivity_destroy(self: &Arc<Self>, tenant_id: &str, delay: Duration) {
        let manager = Arc::clone(self);
        let tenant = tenant_id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_idle = {
                let sessions = manager.sessions.lock().await;
                sessions
                    .get(&tenant)
                    .map(|session| {
                        session.state() != PlayerState::Playing
                            && session.queue.is_empty()
                            && !session.stopped_by_command
                    })
                    .unwrap_or(false)
            };
            if still_idle {
                info!("[Session] Tenant {tenant} idle past grace period, tearing down");
                if let Err(err) = manager.gateway.destroy_player(&tenant).await {
                    warn!("[Session] Failed to destroy backend player for tenant {tenant}: {err}");
                }
                manager.destroy_session(&tenant).await;
            }
        });

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = timers.insert(tenant_id.to_string(), handle) {
            old.abort();
        }
    }

    // ---- persistence ----------------------------------------------------

    pub async fn snapshot_session(&self, tenant_id: &str) -> Result<()> {
        let snapshot = self
            .try_with_session(tenant_id, |session| session.snapshot(now_ms()))
            .await?;
        self.store.save(&snapshot).await
    }

    /// Snapshot every live session concurrently. One tenant's storage
    /// failure is logged and never aborts the rest. Returns how many
    /// snapshots landed.
    pub async fn save_all(&self) -> usize {
        let snapshots: Vec<_> = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .map(|session| session.snapshot(now_ms()))
                .collect()
        };
        let total = snapshots.len();
        let results = join_all(snapshots.iter().map(|snapshot| self.store.save(snapshot))).await;

        let mut saved = 0;
        for (snapshot, result) in snapshots.iter().zip(results) {
            match result {
                Ok(()) => saved += 1,
                Err(err) => warn!(
                    "[Store] Failed to save session for tenant {}: {err}",
                    snapshot.tenant_id
                ),
            }
        }
        info!("[Store] Saved {saved}/{total} player sessions");
        saved
    }

    /// Bounded shutdown drain: snapshot everything, but never hold the
    /// process hostage to slow storage.
    pub async fn shutdown(&self, timeout: Duration) {
        if tokio::time::timeout(timeout, self.save_all()).await.is_err() {
            warn!("[Store] Shutdown snapshot drain timed out after {timeout:?}");
        }
    }

    /// Background autosave loop; abort the handle to stop it.
    pub fn spawn_autosave(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.save_all().await;
            }
        })
    }

    // ---- restore --------------------------------------------------------

    /// Attempt to restore every persisted tenant, independently and
    /// concurrently; called once per backend-connect event. Returns how
    /// many sessions came back.
    pub async fn restore_all(&self) -> usize {
        let tenants = match self.store.list().await {
            Ok(tenants) => tenants,
            Err(err) => {
                warn!("[Store] Could not list saved sessions: {err}");
                return 0;
            }
        };
        if tenants.is_empty() {
            debug!("[Store] No saved sessions to restore");
            return 0;
        }
        info!("[Store] Found {} saved sessions to restore", tenants.len());

        let results = join_all(tenants.iter().map(|tenant| self.restore_session(tenant))).await;
        results.into_iter().filter(|restored| *restored).count()
    }

    /// Restore one tenant from its snapshot. Fails closed: a stale
    /// snapshot, a dangling channel reference, or a dead backend all
    /// delete the snapshot, tear down any stray backend-side player,
    /// and report false. Snapshots are single-use either way.
    pub async fn restore_session(&self, tenant_id: &str) -> bool {
        let snapshot = match self.store.load(tenant_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return false,
            Err(err) => {
                warn!("[Store] Could not load snapshot for tenant {tenant_id}: {err}");
                return false;
            }
        };

        if self.store.is_stale(&snapshot, now_ms()) {
            return self.fail_restore(tenant_id, "snapshot is stale").await;
        }
        if !self.gateway.is_available() {
            return self.fail_restore(tenant_id, "no usable voice node").await;
        }
        let (Some(voice_id), Some(text_id)) = (
            snapshot.voice_channel_id.clone(),
            snapshot.text_channel_id.clone(),
        ) else {
            return self
                .fail_restore(tenant_id, "snapshot has no channel references")
                .await;
        };
        if self.channels.fetch_channel(&voice_id).await.is_none() {
            return self
                .fail_restore(tenant_id, "voice channel no longer exists")
                .await;
        }
        if self.channels.fetch_channel(&text_id).await.is_none() {
            return self
                .fail_restore(tenant_id, "text channel no longer exists")
                .await;
        }

        let remote = match self.gateway.get_player(tenant_id).await {
            Ok(remote) => remote,
            Err(err) => {
                debug!("[Store] Could not query backend player for tenant {tenant_id}: {err}");
                None
            }
        };

        let mut session = PlaybackSession::from_snapshot(
            &snapshot,
            self.settings.play_history_cap,
            self.settings.autoplay_history_cap,
        );

        // If the voice node kept playing across our restart, its state
        // wins; starting the snapshot track too would double-play.
        let resume = match remote {
            Some(remote) if remote.current.is_some() => {
                session.queue.set_current(remote.current);
                session.apply_remote_state(remote.paused, remote.position_ms);
                None
            }
            _ => snapshot.current_track.clone(),
        };

        {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(tenant_id) {
                drop(sessions);
                debug!("[Store] Tenant {tenant_id} already has a live session, dropping snapshot");
                if let Err(err) = self.store.delete(tenant_id).await {
                    warn!("[Store] Failed to delete snapshot for tenant {tenant_id}: {err}");
                }
                return false;
            }
            sessions.insert(tenant_id.to_string(), session);
        }

        if let Err(err) = self.store.delete(tenant_id).await {
            warn!("[Store] Failed to delete snapshot for tenant {tenant_id}: {err}");
        }

        info!("[Store] Session restored for tenant {tenant_id}");
        self.emit(SessionEvent::SessionRestored {
            tenant_id: tenant_id.to_string(),
            text_channel_id: Some(text_id),
            resume,
        });
        true
    }

    async fn fail_restore(&self, tenant_id: &str, reason: &str) -> bool {
        warn!("[Store] Skipping restore for tenant {tenant_id}: {reason}");
        if let Err(err) = self.store.delete(tenant_id).await {
            warn!("[Store] Failed to delete snapshot for tenant {tenant_id}: {err}");
        }
        if let Err(err) = self.gateway.destroy_player(tenant_id).await {
            debug!("[Store] Backend player cleanup for tenant {tenant_id} failed: {err}");
        }
        self.emit(SessionEvent::SessionRestoreFailed {
            tenant_id: tenant_id.to_string(),
            reason: reason.to_string(),
        });
        false
    }
}
