//! Collaborator interfaces consumed by the core.
//!
//! The search backend, channel resolver, and voice-node gateway are
//! external services; the core only ever talks to them through these
//! traits. Stub implementations are provided for development and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::track::{Requester, Track};

/// How a search backend classified a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadType {
    Track,
    Search,
    Playlist,
    Empty,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub name: String,
}

/// A batch of results from the search backend. `Empty` and `Error` are
/// data ("no results"), never a fault the core throws on.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub load_type: LoadType,
    pub tracks: Vec<Track>,
    pub playlist: Option<PlaylistInfo>,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self {
            load_type: LoadType::Empty,
            tracks: Vec::new(),
            playlist: None,
        }
    }

    pub fn has_results(&self) -> bool {
        !matches!(self.load_type, LoadType::Empty | LoadType::Error) && !self.tracks.is_empty()
    }
}

/// Search service seam. Implementations wrap whatever node protocol the
/// bot actually speaks; the core only needs queries and related-item
/// listings.
#[async_trait::async_trait]
pub trait SearchBackend: Send + Sync {
    /// Free-text or URI search.
    async fn search(&self, query: &str, requester: &Requester) -> Result<SearchResponse>;

    /// The backend's "mix"/related listing for a known item.
    async fn related(&self, identifier: &str, requester: &Requester) -> Result<SearchResponse>;
}

/// Resolves persisted channel references before a session restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

#[async_trait::async_trait]
pub trait ChannelResolver: Send + Sync {
    /// None when the channel no longer exists (or is unreachable).
    async fn fetch_channel(&self, id: &str) -> Option<Channel>;
}

/// The voice backend's view of a tenant's player, used to reconcile a
/// restore against playback that survived the process restart.
#[derive(Debug, Clone)]
pub struct RemotePlayer {
    pub current: Option<Track>,
    pub paused: bool,
    pub position_ms: u64,
}

#[async_trait::async_trait]
pub trait PlayerGateway: Send + Sync {
    /// Whether any node is currently usable.
    fn is_available(&self) -> bool;

    async fn get_player(&self, tenant_id: &str) -> Result<Option<RemotePlayer>>;

    async fn destroy_player(&self, tenant_id: &str) -> Result<()>;
}

/// Canned-response backend for tests and development.
pub struct StubSearchBackend {
    searches: Mutex<HashMap<String, SearchResponse>>,
    related: Mutex<HashMap<String, SearchResponse>>,
}

impl StubSearchBackend {
    pub fn new() -> Self {
        Self {
            searches: Mutex::new(HashMap::new()),
            related: Mutex::new(HashMap::new()),
        }
    }

    pub fn on_search(&self, query: impl Into<String>, response: SearchResponse) {
        self.searches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(query.into(), response);
    }

    pub fn on_related(&self, identifier: impl Into<String>, response: SearchResponse) {
        self.related
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identifier.into(), response);
    }
}

impl Default for StubSearchBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SearchBackend for StubSearchBackend {
    async fn search(&self, query: &str, _requester: &Requester) -> Result<SearchResponse> {
        Ok(self
            .searches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(query)
            .cloned()
            .unwrap_or_else(SearchResponse::empty))
    }

    async fn related(&self, identifier: &str, _requester: &Requester) -> Result<SearchResponse> {
        Ok(self
            .related
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(identifier)
            .cloned()
            .unwrap_or_else(SearchResponse::empty))
    }
}

/// Resolver that knows a fixed set of channels.
pub struct StubChannelResolver {
    channels: Mutex<HashMap<String, Channel>>,
}

impl StubChannelResolver {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_channel(&self, id: impl Into<String>, name: impl Into<String>) {
        let id = id.into();
        let channel = Channel {
            id: id.clone(),
            name: name.into(),
        };
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, channel);
    }

    pub fn remove_channel(&self, id: &str) {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}

impl Default for StubChannelResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChannelResolver for StubChannelResolver {
    async fn fetch_channel(&self, id: &str) -> Option<Channel> {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }
}

/// Gateway stub: configurable availability, remembers destroyed players.
pub struct StubPlayerGateway {
    available: Mutex<bool>,
    players: Mutex<HashMap<String, RemotePlayer>>,
    destroyed: Mutex<Vec<String>>,
}

impl StubPlayerGateway {
    pub fn new(available: bool) -> Self {
        Self {
            available: Mutex::new(available),
            players: Mutex::new(HashMap::new()),
            destroyed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        *self.available.lock().unwrap_or_else(|e| e.into_inner()) = available;
    }

    pub fn set_player(&self, tenant_id: impl Into<String>, player: RemotePlayer) {
        self.players
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tenant_id.into(), player);
    }

    pub fn destroyed_players(&self) -> Vec<String> {
        self.destroyed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl PlayerGateway for StubPlayerGateway {
    fn is_available(&self) -> bool {
        *self.available.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn get_player(&self, tenant_id: &str) -> Result<Option<RemotePlayer>> {
        Ok(self
            .players
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(tenant_id)
            .cloned())
    }

    async fn destroy_player(&self, tenant_id: &str) -> Result<()> {
        self.players
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(tenant_id);
        self.destroyed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tenant_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(identifier: &str) -> Track {
        Track::new(
            identifier,
            "Song",
            "Artist",
            200_000,
            None,
            "https://example.com/watch",
            Requester::Autoplay,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn stub_search_returns_canned_response() {
        let backend = StubSearchBackend::new();
        backend.on_search(
            "Artist - Song",
            SearchResponse {
                load_type: LoadType::Search,
                tracks: vec![track("hit1")],
                playlist: None,
            },
        );
        let response = backend.search("Artist - Song", &Requester::Autoplay).await.unwrap();
        assert!(response.has_results());
        assert_eq!(response.tracks[0].identifier, "hit1");
    }

    #[tokio::test]
    async fn stub_search_defaults_to_empty() {
        let backend = StubSearchBackend::new();
        let response = backend.search("nothing", &Requester::Autoplay).await.unwrap();
        assert!(!response.has_results());
        assert_eq!(response.load_type, LoadType::Empty);
    }

    #[test]
    fn error_load_type_has_no_results() {
        let response = SearchResponse {
            load_type: LoadType::Error,
            tracks: vec![track("x")],
            playlist: None,
        };
        assert!(!response.has_results());
    }

    #[tokio::test]
    async fn stub_resolver_forgets_removed_channels() {
        let resolver = StubChannelResolver::new();
        resolver.add_channel("c1", "general");
        assert!(resolver.fetch_channel("c1").await.is_some());
        resolver.remove_channel("c1");
        assert!(resolver.fetch_channel("c1").await.is_none());
    }

    #[tokio::test]
    async fn stub_gateway_tracks_destroyed_players() {
        let gateway = StubPlayerGateway::new(true);
        gateway.set_player(
            "g1",
            RemotePlayer {
                current: Some(track("x")),
                paused: false,
                position_ms: 1_000,
            },
        );
        assert!(gateway.get_player("g1").await.unwrap().is_some());
        gateway.destroy_player("g1").await.unwrap();
        assert!(gateway.get_player("g1").await.unwrap().is_none());
        assert_eq!(gateway.destroyed_players(), vec!["g1".to_string()]);
    }
}
