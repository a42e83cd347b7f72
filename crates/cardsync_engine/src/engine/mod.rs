//! The sync orchestrator.

mod imports;
mod pull;
mod push;
mod resolve;

use crate::config::SyncConfig;
use crate::connection::{Connection, NewConnection};
use crate::error::{SyncError, SyncResult};
use crate::ids::{ConnectionId, ContactId};
use crate::lock::{ConnectionLocks, SyncLease};
use crate::retry::RetryPolicy;
use crate::state::{SyncReport, SyncState};
use crate::store::{ContactStore, SyncStore};
use crate::transport::{AddressBook, Connector, Credentials};
use cardsync_dedupe::DuplicateDetector;
use cardsync_security::{CredentialVault, Resolver, SystemResolver, UrlError, UrlGuard, ValidatedUrl};
use cardsync_vcard::{decode, Contact};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// Synchronizes local contacts with CardDAV address books.
///
/// One engine serves every connection. Runs for different connections may
/// proceed in parallel from different threads; a second run for the same
/// connection fails with [`SyncError::AlreadyRunning`].
pub struct SyncEngine<C: Connector, S: SyncStore, L: ContactStore> {
    config: SyncConfig,
    connector: C,
    store: Arc<S>,
    contacts: Arc<L>,
    vault: CredentialVault,
    guard: UrlGuard<Arc<dyn Resolver>>,
    detector: DuplicateDetector,
    retry: RetryPolicy,
    locks: ConnectionLocks,
    states: RwLock<HashMap<ConnectionId, SyncState>>,
}

/// A fetched and decoded remote object.
pub(crate) struct RemoteVersion {
    pub(crate) contact: Contact,
    pub(crate) etag: Option<String>,
    pub(crate) body: String,
}

impl<C: Connector, S: SyncStore, L: ContactStore> SyncEngine<C, S, L> {
    /// Creates an engine.
    pub fn new(config: SyncConfig, connector: C, store: S, contacts: L, vault: CredentialVault) -> Self {
        let resolver: Arc<dyn Resolver> = Arc::new(SystemResolver);
        Self {
            detector: DuplicateDetector::new().with_threshold(config.duplicate_threshold),
            retry: RetryPolicy::new(config.retry.clone()),
            config,
            connector,
            store: Arc::new(store),
            contacts: Arc::new(contacts),
            vault,
            guard: UrlGuard::with_resolver(resolver),
            locks: ConnectionLocks::new(),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the DNS resolver used by URL validation.
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.guard = UrlGuard::with_resolver(resolver);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the engine's state store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the local contact store.
    pub fn contacts(&self) -> &L {
        &self.contacts
    }

    /// Returns the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Current state of a connection.
    pub fn state(&self, id: ConnectionId) -> SyncState {
        self.states.read().get(&id).copied().unwrap_or_default()
    }

    /// Whether an operation holds the connection right now.
    pub fn is_running(&self, id: ConnectionId) -> bool {
        self.locks.is_locked(id)
    }

    /// Requests cancellation of the running sync for `id`. The run stops at
    /// its next checkpoint and fails with [`SyncError::Cancelled`].
    pub fn cancel(&self, id: ConnectionId) -> bool {
        let requested = self.locks.cancel(id);
        if requested {
            tracing::info!(connection = %id, "sync cancellation requested");
        }
        requested
    }

    fn set_state(&self, id: ConnectionId, state: SyncState) {
        self.states.write().insert(id, state);
    }

    /// Validates the URL, encrypts the password and stores a connection.
    pub fn register_connection(&self, new: NewConnection) -> SyncResult<Connection> {
        let validated = self.guard.validate(&new.url)?;
        let connection = Connection {
            id: ConnectionId::new(),
            name: new.name,
            url: validated.url.to_string(),
            username: new.username,
            encrypted_password: self.vault.encrypt(&new.password)?,
            sync_enabled: new.sync_enabled,
            auto_export: new.auto_export,
            sync_interval: new.sync_interval,
            import_mode: new.import_mode,
            conflict_policy: new.conflict_policy,
            last_sync_at: None,
            last_error: None,
        };
        self.store.save_connection(&connection)?;
        tracing::info!(connection = %connection.id, host = validated.host(), "connection registered");
        Ok(connection)
    }

    /// Replaces a connection's account name and password.
    pub fn update_credentials(&self, id: ConnectionId, username: &str, password: &str) -> SyncResult<()> {
        let mut connection = self.connection(id)?;
        connection.username = username.to_string();
        connection.encrypted_password = self.vault.encrypt(password)?;
        connection.last_error = None;
        self.store.save_connection(&connection)
    }

    /// Stores changed connection settings. The URL is validated again if
    /// it changed.
    pub fn update_connection(&self, connection: &Connection) -> SyncResult<()> {
        let existing = self.connection(connection.id)?;
        if existing.url != connection.url {
            self.guard.validate(&connection.url)?;
        }
        self.store.save_connection(connection)
    }

    /// Removes a connection with its mappings, conflicts and staged imports.
    /// Local contacts are kept.
    pub fn delete_connection(&self, id: ConnectionId) -> SyncResult<bool> {
        let _lease = self.locks.acquire(id)?;
        let deleted = self.store.delete_connection(id)?;
        self.states.write().remove(&id);
        Ok(deleted)
    }

    /// A connection by id.
    pub fn connection(&self, id: ConnectionId) -> SyncResult<Connection> {
        self.store
            .get_connection(id)?
            .ok_or(SyncError::ConnectionNotFound(id))
    }

    /// All connections.
    pub fn connections(&self) -> SyncResult<Vec<Connection>> {
        self.store.list_connections()
    }

    /// Connections whose scheduled sync is due at `now`.
    pub fn due_connections(&self, now: DateTime<Utc>) -> SyncResult<Vec<Connection>> {
        Ok(self
            .store
            .list_connections()?
            .into_iter()
            .filter(|c| c.is_due(now))
            .collect())
    }

    /// Runs every due sync in turn. A failure of one connection does not
    /// stop the others.
    pub fn sync_due(&self, now: DateTime<Utc>) -> SyncResult<Vec<(ConnectionId, SyncResult<SyncReport>)>> {
        Ok(self
            .due_connections(now)?
            .into_iter()
            .map(|connection| (connection.id, self.sync(connection.id)))
            .collect())
    }

    /// Connects and lists the address book without changing anything.
    /// Returns the number of remote objects.
    pub fn test_connection(&self, id: ConnectionId) -> SyncResult<usize> {
        let lease = self.locks.acquire(id)?;
        let connection = self.connection(id)?;
        let book = self.open(&lease, &connection)?;
        Ok(self.call(&lease, "list", || book.list())?.len())
    }

    /// Runs one pull-then-push cycle for a connection.
    ///
    /// The outcome is recorded on the connection: `last_sync_at` on
    /// success, `last_error` on failure.
    pub fn sync(&self, id: ConnectionId) -> SyncResult<SyncReport> {
        let lease = self.locks.acquire(id)?;
        let connection = self.connection(id)?;
        tracing::info!(connection = %id, name = %connection.name, "sync started");

        let result = self.run(&lease, &connection);

        let mut updated = match self.store.get_connection(id) {
            Ok(Some(current)) => current,
            _ => connection,
        };
        match &result {
            Ok(report) => {
                self.set_state(id, SyncState::Completed);
                updated.last_sync_at = Some(Utc::now());
                updated.last_error = None;
                tracing::info!(
                    connection = %id,
                    pulled = report.pulled(),
                    pushed = report.pushed(),
                    staged = report.staged,
                    conflicts = report.conflicts,
                    errors = report.errors,
                    duration_ms = report.duration.as_millis() as u64,
                    "sync completed"
                );
            }
            Err(err) => {
                self.set_state(id, SyncState::Failed);
                updated.last_error = Some(err.to_string());
                tracing::warn!(connection = %id, error = %err, "sync failed");
            }
        }
        if let Err(save_err) = self.store.save_connection(&updated) {
            if result.is_ok() {
                return Err(save_err);
            }
            tracing::warn!(connection = %id, error = %save_err, "could not record sync failure");
        }
        result
    }

    fn run(&self, lease: &SyncLease<'_>, connection: &Connection) -> SyncResult<SyncReport> {
        let started = Instant::now();
        let id = connection.id;
        let mut report = SyncReport::new(id);

        self.set_state(id, SyncState::Connecting);
        let book = self.open(lease, connection)?;

        self.set_state(id, SyncState::Pulling);
        self.pull(lease, connection, &book, &mut report)?;

        self.set_state(id, SyncState::Pushing);
        self.push(lease, connection, &book, &mut report)?;

        self.prune_conflicts(id)?;

        report.conflicts = self
            .store
            .conflicts(Some(id))?
            .iter()
            .filter(|c| !c.is_resolved())
            .count();
        report.duration = started.elapsed();
        Ok(report)
    }

    fn prune_conflicts(&self, id: ConnectionId) -> SyncResult<()> {
        let Ok(retention) = chrono::Duration::from_std(self.config.resolved_conflict_retention) else {
            return Ok(());
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
            return Ok(());
        };
        let pruned = self.store.prune_resolved_conflicts(cutoff)?;
        if pruned > 0 {
            tracing::debug!(connection = %id, pruned, "pruned resolved conflicts");
        }
        Ok(())
    }

    /// Validates the URL (again), decrypts the password and connects.
    fn open(&self, lease: &SyncLease<'_>, connection: &Connection) -> SyncResult<C::Book> {
        lease.check()?;
        let target = if self.config.revalidate_before_connect {
            self.guard.validate(&connection.url)?
        } else {
            ValidatedUrl {
                url: Url::parse(&connection.url).map_err(|e| UrlError::InvalidUrl(e.to_string()))?,
                resolved: Vec::new(),
            }
        };
        let credentials = Credentials {
            username: connection.username.clone(),
            password: self.vault.decrypt(&connection.encrypted_password)?,
        };
        let book = self.connector.connect(&target, &credentials, &self.config)?;
        lease.check()?;
        Ok(book)
    }

    /// One remote call under the retry policy, honouring cancellation
    /// before every attempt.
    fn call<T>(
        &self,
        lease: &SyncLease<'_>,
        operation: &str,
        mut op: impl FnMut() -> SyncResult<T>,
    ) -> SyncResult<T> {
        self.retry.run(operation, || {
            lease.check()?;
            op()
        })
    }

    fn fetch_remote(
        &self,
        lease: &SyncLease<'_>,
        book: &C::Book,
        href: &str,
    ) -> SyncResult<RemoteVersion> {
        let object = self.call(lease, "fetch", || book.fetch(href))?;
        let contact = decode(&object.body)?;
        Ok(RemoteVersion {
            contact,
            etag: object.etag,
            body: object.body,
        })
    }

    /// Deletes a local contact and propagates the delete to every server it
    /// is mapped on.
    ///
    /// Mappings are dropped whether or not the remote delete succeeds. If a
    /// sync for one of the connections is running, that mapping is left for
    /// the run's push phase to handle. Returns the number of remote objects
    /// deleted.
    pub fn delete_local_contact(&self, contact_id: ContactId) -> SyncResult<usize> {
        self.contacts.remove(contact_id)?;
        let mut deleted = 0;
        for mapping in self.store.mappings_for_contact(contact_id)? {
            let lease = match self.locks.acquire(mapping.connection_id) {
                Ok(lease) => lease,
                Err(SyncError::AlreadyRunning(id)) => {
                    tracing::debug!(connection = %id, "sync running; remote delete deferred");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Some(mut conflict) = self.store.open_conflict(mapping.connection_id, contact_id)? {
                conflict.mark_resolved();
                self.store.save_conflict(&conflict)?;
            }
            match self.delete_remote(&lease, &mapping.href, mapping.etag.as_deref()) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!(
                    connection = %mapping.connection_id,
                    href = %mapping.href,
                    error = %err,
                    "remote delete failed; dropping mapping anyway"
                ),
            }
            self.store.remove_mapping(mapping.connection_id, contact_id)?;
        }
        Ok(deleted)
    }

    fn delete_remote(&self, lease: &SyncLease<'_>, href: &str, etag: Option<&str>) -> SyncResult<bool> {
        let connection = self.connection(lease.connection_id())?;
        let book = self.open(lease, &connection)?;
        match self.call(lease, "delete", || book.delete(href, etag)) {
            Ok(()) => Ok(true),
            Err(SyncError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn possible_duplicates(&self, contact: &Contact) -> SyncResult<Vec<ContactId>> {
        let entries = self.named_entries()?;
        let target = cardsync_dedupe::NamedEntry::new(
            ContactId::new(),
            contact.given_name.clone(),
            contact.combined_family_name(),
        );
        Ok(self
            .detector
            .find_duplicates(&target, &entries)
            .into_iter()
            .map(|candidate| candidate.id)
            .collect())
    }

    fn named_entries(&self) -> SyncResult<Vec<cardsync_dedupe::NamedEntry<ContactId>>> {
        Ok(self
            .contacts
            .list()?
            .into_iter()
            .map(|(id, c)| cardsync_dedupe::NamedEntry::new(id, c.given_name.clone(), c.combined_family_name()))
            .collect())
    }

    /// Groups of local contacts that look like duplicates of each other.
    pub fn duplicate_groups(&self) -> SyncResult<Vec<cardsync_dedupe::DuplicateGroup<ContactId>>> {
        Ok(self.detector.find_all_duplicate_groups(&self.named_entries()?))
    }
}

/// Isolates per-object failures: logs and counts them, and lets errors
/// that end the run through.
fn isolate(result: SyncResult<()>, href: &str, errors: &mut usize) -> SyncResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if !err.aborts_run() => {
            *errors += 1;
            tracing::warn!(href, error = %err, "skipping object");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
