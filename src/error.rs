use thiserror::Error;

/// Errors surfaced by the playback session core.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller passed something that can never succeed (bad index, limit
    /// over the cap, malformed track fields). Rejected synchronously,
    /// never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A session, channel, or snapshot that should exist does not.
    /// Treated as "skip this tenant", not a fault.
    #[error("not found: {0}")]
    NotFound(String),

    /// No usable search/voice node. Recommendation and restore degrade
    /// to a no-op when they see this.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Snapshot read/write failed. Best-effort on shutdown paths.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn display_includes_detail() {
        let err = Error::InvalidArgument("limit exceeds maximum of 50".to_string());
        assert_eq!(err.to_string(), "invalid argument: limit exceeds maximum of 50");
    }
}
