//! # CardSync Security
//!
//! Guards the two trust boundaries of the sync engine:
//!
//! - [`UrlGuard`] rejects server URLs that point at the local machine or a
//!   private network before any request is made to them.
//! - [`CredentialVault`] keeps server passwords encrypted at rest with
//!   AES-256-GCM and only hands plaintext out in a [`zeroize::Zeroizing`]
//!   wrapper.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod url_guard;
pub mod vault;

pub use error::{UrlError, UrlResult, VaultError, VaultResult};
pub use url_guard::{is_internal, Resolver, SystemResolver, UrlGuard, ValidatedUrl};
pub use vault::{CredentialVault, VaultKey};
pub use zeroize::Zeroizing;
