//! Error types for the sync engine.

use crate::ids::{ConflictId, ConnectionId, PendingImportId};
use cardsync_security::{UrlError, VaultError};
use cardsync_vcard::{ParseError, UploadError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// Network failure or server-side error that may succeed on retry.
    #[error("transient remote error: {0}")]
    Transient(String),

    /// Request rejected by the server; retrying will not help.
    #[error("remote error: {0}")]
    Fatal(String),

    /// Server rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// `If-Match` / `If-None-Match` precondition did not hold.
    #[error("precondition failed for {0}")]
    PreconditionFailed(String),

    /// Remote object does not exist.
    #[error("remote object not found: {0}")]
    NotFound(String),

    /// Request exceeded its timeout.
    #[error("operation timed out")]
    Timeout,

    /// Server URL rejected.
    #[error(transparent)]
    Url(#[from] UrlError),

    /// Credential could not be encrypted or decrypted.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Malformed vCard payload.
    #[error("vCard parse error: {0}")]
    Parse(#[from] ParseError),

    /// Rejected upload.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Persistence layer failure.
    #[error("store error: {0}")]
    Store(String),

    /// A mapping would duplicate an existing uid or href.
    #[error("mapping conflict: {0}")]
    MappingConflict(String),

    /// A sync for this connection is already in progress.
    #[error("sync already running for connection {0}")]
    AlreadyRunning(ConnectionId),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// Unknown connection.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Unknown conflict.
    #[error("conflict not found: {0}")]
    ConflictNotFound(ConflictId),

    /// Unknown pending import.
    #[error("pending import not found: {0}")]
    PendingImportNotFound(PendingImportId),

    /// A conflict resolution names an unknown field or an impossible value.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    /// Unexpected response from the server.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Creates a fatal remote error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Maps an HTTP status to an error.
    ///
    /// 401/403 are authentication failures; 408, 425, 429 and 5xx are
    /// transient; every other 4xx is fatal.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(format!("HTTP {status} for {context}")),
            404 | 410 => Self::NotFound(context.to_string()),
            412 => Self::PreconditionFailed(context.to_string()),
            408 | 425 | 429 | 500..=599 => Self::transient(format!("HTTP {status} for {context}")),
            _ => Self::fatal(format!("HTTP {status} for {context}")),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout)
    }

    /// Returns true if this error ends the whole run rather than just the
    /// object being processed.
    ///
    /// A rejected request (`Fatal`) means the server will not accept what
    /// this client sends, so the run fails instead of repeating it per
    /// object. Unparsable or vanished objects only skip that object.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            Self::Transient(_)
                | Self::Fatal(_)
                | Self::Timeout
                | Self::AuthenticationFailed(_)
                | Self::Url(_)
                | Self::Vault(_)
                | Self::Store(_)
                | Self::Cancelled
                | Self::AlreadyRunning(_)
                | Self::ConnectionNotFound(_)
        )
    }
}
