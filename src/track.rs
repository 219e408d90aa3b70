//! Track value type and requester identity.
//!
//! Search backends hand back loosely-shaped results; everything entering
//! the core goes through `Track::new` so required fields are validated
//! once, at the boundary.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Identity string used for tracks injected by autoplay.
pub const AUTOPLAY_IDENTITY: &str = "autoplay";

/// Who asked for a track: a real user, or the autoplay engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Requester {
    User { id: String, name: String },
    Autoplay,
}

impl Requester {
    pub fn user(id: impl Into<String>, name: impl Into<String>) -> Self {
        Requester::User {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Stable identity key. Round-robin shuffling groups by this.
    pub fn identity(&self) -> &str {
        match self {
            Requester::User { id, .. } => id,
            Requester::Autoplay => AUTOPLAY_IDENTITY,
        }
    }

    pub fn is_autoplay(&self) -> bool {
        matches!(self, Requester::Autoplay)
    }
}

/// A single playable item from a search backend. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub identifier: String,
    pub title: String,
    pub author: String,
    /// Duration in milliseconds; 0 for non-seekable live streams.
    pub duration_ms: u64,
    pub artwork_url: Option<String>,
    pub uri: String,
    pub requester: Requester,
    #[serde(default)]
    pub is_stream: bool,
}

impl Track {
    /// Build a track, validating the fields the core relies on.
    pub fn new(
        identifier: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        duration_ms: u64,
        artwork_url: Option<String>,
        uri: impl Into<String>,
        requester: Requester,
    ) -> Result<Self> {
        let identifier = identifier.into();
        let title = title.into();
        let author = author.into();
        let uri = uri.into();

        if identifier.trim().is_empty() {
            return Err(Error::InvalidArgument("track identifier is empty".into()));
        }
        if title.trim().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "track {identifier} has an empty title"
            )));
        }
        if uri.trim().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "track {identifier} has an empty uri"
            )));
        }

        Ok(Self {
            identifier,
            title,
            author,
            duration_ms,
            artwork_url,
            uri,
            is_stream: duration_ms == 0,
            requester,
        })
    }

    /// Same track, re-attributed (autoplay retags injected tracks).
    pub fn with_requester(mut self, requester: Requester) -> Self {
        self.requester = requester;
        self
    }
}
