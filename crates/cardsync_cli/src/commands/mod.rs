//! CLI command implementations.

pub mod check_url;
pub mod conflicts;
pub mod connection;
pub mod dedupe;
pub mod inspect;
pub mod keys;
pub mod pending;
pub mod sync;
pub mod transfer;

/// Result type shared by the commands.
pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;
