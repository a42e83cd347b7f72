//! Server connections.

use crate::ids::ConnectionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How newly discovered remote contacts enter the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImportMode {
    /// Create local contacts immediately.
    #[default]
    Auto,
    /// Stage them as pending imports for the user to accept or reject.
    Review,
}

/// What happens when both sides changed the same contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Record a conflict and wait for the user.
    #[default]
    Manual,
    /// Overwrite the server with the local version.
    KeepLocal,
    /// Overwrite the local contact with the server version.
    KeepRemote,
}

/// A CardDAV address book the user synchronizes with.
///
/// The password is stored only in its vault-encrypted form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Connection identifier.
    pub id: ConnectionId,
    /// Human readable label.
    pub name: String,
    /// Address book collection URL.
    pub url: String,
    /// Account name.
    pub username: String,
    /// Password as produced by the credential vault.
    pub encrypted_password: String,
    /// Whether scheduled syncs run for this connection.
    pub sync_enabled: bool,
    /// Push local contacts that have never been on this server.
    pub auto_export: bool,
    /// Minimum time between scheduled syncs.
    pub sync_interval: Duration,
    /// Import mode for new remote contacts.
    pub import_mode: ImportMode,
    /// Policy for concurrent edits.
    pub conflict_policy: ConflictPolicy,
    /// End of the last successful sync.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Message of the last failed sync, cleared on success.
    pub last_error: Option<String>,
}

impl Connection {
    /// Whether a scheduled sync should run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.sync_enabled {
            return false;
        }
        match self.last_sync_at {
            None => true,
            Some(last) => match chrono::Duration::from_std(self.sync_interval) {
                Ok(interval) => now >= last + interval,
                Err(_) => false,
            },
        }
    }
}

/// Input for registering a connection.
#[derive(Debug, Clone)]
pub struct NewConnection {
    /// Label.
    pub name: String,
    /// Address book URL, validated before it is stored.
    pub url: String,
    /// Account name.
    pub username: String,
    /// Plaintext password, encrypted before it is stored.
    pub password: String,
    /// See [`Connection::sync_enabled`].
    pub sync_enabled: bool,
    /// See [`Connection::auto_export`].
    pub auto_export: bool,
    /// See [`Connection::sync_interval`].
    pub sync_interval: Duration,
    /// See [`Connection::import_mode`].
    pub import_mode: ImportMode,
    /// See [`Connection::conflict_policy`].
    pub conflict_policy: ConflictPolicy,
}

impl NewConnection {
    /// Starts a connection with default settings: enabled, hourly, no
    /// automatic export, auto import and manual conflicts.
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let url = url.into();
        Self {
            name: url.clone(),
            url,
            username: username.into(),
            password: password.into(),
            sync_enabled: true,
            auto_export: false,
            sync_interval: Duration::from_secs(3600),
            import_mode: ImportMode::Auto,
            conflict_policy: ConflictPolicy::Manual,
        }
    }

    /// Sets the label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables or disables scheduled syncs.
    pub fn with_sync_enabled(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    /// Enables or disables automatic export.
    pub fn with_auto_export(mut self, enabled: bool) -> Self {
        self.auto_export = enabled;
        self
    }

    /// Sets the sync interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the import mode.
    pub fn with_import_mode(mut self, mode: ImportMode) -> Self {
        self.import_mode = mode;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(interval_secs: u64, last: Option<DateTime<Utc>>) -> Connection {
        Connection {
            id: ConnectionId::new(),
            name: "home".into(),
            url: "https://dav.example.com/".into(),
            username: "ana".into(),
            encrypted_password: String::new(),
            sync_enabled: true,
            auto_export: false,
            sync_interval: Duration::from_secs(interval_secs),
            import_mode: ImportMode::Auto,
            conflict_policy: ConflictPolicy::Manual,
            last_sync_at: last,
            last_error: None,
        }
    }

    #[test]
    fn never_synced_is_due() {
        assert!(connection(60, None).is_due(Utc::now()));
    }

    #[test]
    fn due_after_interval() {
        let now = Utc::now();
        let recent = connection(600, Some(now - chrono::Duration::seconds(60)));
        assert!(!recent.is_due(now));
        let stale = connection(600, Some(now - chrono::Duration::seconds(601)));
        assert!(stale.is_due(now));
    }

    #[test]
    fn disabled_is_never_due() {
        let mut conn = connection(0, None);
        conn.sync_enabled = false;
        assert!(!conn.is_due(Utc::now()));
    }

    #[test]
    fn new_connection_defaults() {
        let new = NewConnection::new("https://dav.example.com/", "ana", "secret")
            .with_import_mode(ImportMode::Review);
        assert_eq!(new.name, "https://dav.example.com/");
        assert!(new.sync_enabled);
        assert!(!new.auto_export);
        assert_eq!(new.import_mode, ImportMode::Review);
        assert_eq!(new.conflict_policy, ConflictPolicy::Manual);
    }
}
