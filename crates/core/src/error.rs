//! Unified error types for offcache.
//!
//! Every variant renders with a stable code prefix so callers on the far side
//! of the MCP transport can branch on it.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

use crate::response::HttpResponse;

/// Unified error type for the interception cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty method).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Invalid or unsupported URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// No response was obtained from the origin (connectivity, DNS, timeout).
    #[error("NETWORK_UNAVAILABLE: {0}")]
    NetworkUnavailable(String),

    /// The origin answered with a non-2xx status.
    ///
    /// The full response travels with the error so it can be handed to the
    /// caller unchanged.
    #[error("ORIGIN_ERROR: status {}", .0.status)]
    OriginError(Box<HttpResponse>),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// No stored entry for the requested identity.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Persistence rejected a cache write.
    #[error("STORE_WRITE_ERROR: {0}")]
    StoreWrite(String),

    /// One or more manifest assets could not be fetched during installation.
    #[error("MANIFEST_INSTALL_ERROR: generation {generation}: {reason}")]
    ManifestInstall { generation: String, reason: String },

    /// A lifecycle transition is not legal from the generation's current state.
    #[error("INVALID_TRANSITION: {0}")]
    InvalidTransition(String),

    /// No generation with the given name exists.
    #[error("GENERATION_NOT_FOUND: {0}")]
    GenerationNotFound(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),
}

impl Error {
    /// Whether this failure means no response was obtained at all.
    pub fn is_network_unavailable(&self) -> bool {
        matches!(self, Error::NetworkUnavailable(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let code = match &err {
            Error::InvalidInput(_) => -32602,
            Error::InvalidUrl(_) => -32003,
            Error::NetworkUnavailable(_) => -32020,
            Error::OriginError(_) => -32021,
            Error::FetchTooLarge(_) => -32007,
            Error::CacheMiss(_) => -32001,
            Error::StoreWrite(_) => -32022,
            Error::ManifestInstall { .. } => -32023,
            Error::InvalidTransition(_) => -32024,
            Error::GenerationNotFound(_) => -32025,
            Error::Database(_) | Error::MigrationFailed(_) | Error::CorruptEntry(_) => -32002,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NetworkUnavailable("connection refused".to_string());
        assert!(err.to_string().starts_with("NETWORK_UNAVAILABLE"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_origin_error_display_carries_status() {
        let err = Error::OriginError(Box::new(HttpResponse::new(503, Vec::new(), b"down".to_vec())));
        assert_eq!(err.to_string(), "ORIGIN_ERROR: status 503");
        assert!(!err.is_network_unavailable());
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::GenerationNotFound("v9".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32025);
        assert!(mcp_err.message.contains("v9"));
    }
}
