//! Error types for URL validation and the credential vault.

use thiserror::Error;

/// Result type for URL validation.
pub type UrlResult<T> = Result<T, UrlError>;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// A server URL was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// The URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Scheme other than `http` or `https`.
    #[error("scheme not allowed: {0}")]
    DisallowedScheme(String),

    /// Host is, or resolves to, a loopback, private or link-local address.
    #[error("URL points to an internal address: {0}")]
    InternalAddress(String),

    /// Host name could not be resolved.
    #[error("could not resolve {host}: {reason}")]
    ResolutionFailed {
        /// Host that failed to resolve.
        host: String,
        /// Resolver message.
        reason: String,
    },
}

/// Vault failures.
///
/// Messages never include key material or plaintext.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Stored value is not `iv:tag:data` lowercase hex.
    #[error("invalid credential format: {0}")]
    InvalidFormat(String),

    /// Tag verification failed (wrong key or tampered data).
    #[error("credential authentication failed")]
    AuthenticationFailed,

    /// Key material has the wrong size or encoding.
    #[error("invalid key: expected {expected} bytes, got {actual}")]
    InvalidKey {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// Encryption or key derivation failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

impl VaultError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat(message.into())
    }

    /// Creates an invalid key size error.
    pub fn invalid_key(actual: usize, expected: usize) -> Self {
        Self::InvalidKey { expected, actual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_error_display() {
        let err = UrlError::InternalAddress("127.0.0.1".into());
        assert_eq!(err.to_string(), "URL points to an internal address: 127.0.0.1");
    }

    #[test]
    fn vault_error_display() {
        assert_eq!(
            VaultError::invalid_key(16, 32).to_string(),
            "invalid key: expected 32 bytes, got 16"
        );
        assert_eq!(
            VaultError::AuthenticationFailed.to_string(),
            "credential authentication failed"
        );
    }
}
