//! Pull phase: bring remote changes into the local store.

use super::{isolate, RemoteVersion, SyncEngine};
use crate::conflict::Conflict;
use crate::config::OrphanPolicy;
use crate::connection::{Connection, ConflictPolicy, ImportMode};
use crate::error::{SyncError, SyncResult};
use crate::ids::PendingImportId;
use crate::import::{ImportSource, PendingImport};
use crate::lock::SyncLease;
use crate::mapping::{contact_hash, Mapping};
use crate::state::SyncReport;
use crate::store::{ContactStore, SyncStore};
use crate::transport::{diff, AddressBook, Connector, RemoteChange, RemoteEntry};
use chrono::Utc;
use std::collections::HashSet;

/// What reconciling one mapped object did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reconciled {
    /// Remote content matched the last agreed state.
    Unchanged,
    /// Both sides already hold the same content.
    Converged,
    /// The remote version overwrote the local contact.
    AppliedRemote,
    /// The local version will overwrite the remote one.
    KeptLocal,
    /// A conflict is open for the contact.
    Conflicted,
    /// The local contact was missing and has been recreated.
    Restored,
}

impl<C: Connector, S: SyncStore, L: ContactStore> SyncEngine<C, S, L> {
    pub(super) fn pull(
        &self,
        lease: &SyncLease<'_>,
        connection: &Connection,
        book: &C::Book,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let listing = self.call(lease, "list", || book.list())?;
        let mappings = self.store.mappings(connection.id)?;
        self.drop_stale_pending(connection, &listing)?;

        let listed: HashSet<&str> = listing.iter().map(|e| e.href.as_str()).collect();
        let changes = diff(&listing, &mappings);
        let touched = changes
            .iter()
            .filter(|c| !matches!(c, RemoteChange::Deleted { .. }))
            .count();
        report.unchanged += listing.len().saturating_sub(touched);
        tracing::debug!(
            connection = %connection.id,
            listed = listing.len(),
            changes = changes.len(),
            "pull diff computed"
        );

        for change in changes {
            lease.check()?;
            let href = match &change {
                RemoteChange::Created { href, .. } => href.clone(),
                RemoteChange::Updated { mapping, .. } | RemoteChange::Deleted { mapping } => {
                    mapping.href.clone()
                }
            };
            let result = match change {
                RemoteChange::Created { href, etag } => {
                    self.pull_created(lease, connection, book, &href, etag, &listed, report)
                }
                RemoteChange::Updated { mapping, .. } => self
                    .fetch_remote(lease, book, &mapping.href)
                    .and_then(|remote| self.reconcile(connection, mapping, remote, report))
                    .map(|_| ()),
                RemoteChange::Deleted { mapping } => self.pull_deleted(connection, mapping, report),
            };
            isolate(result, &href, &mut report.errors)?;
        }
        Ok(())
    }

    /// Removes pending imports whose remote object no longer exists.
    fn drop_stale_pending(&self, connection: &Connection, listing: &[RemoteEntry]) -> SyncResult<()> {
        let listed: HashSet<&str> = listing.iter().map(|e| e.href.as_str()).collect();
        for pending in self.store.pending_imports()? {
            let stale = pending.connection_id() == Some(connection.id)
                && pending
                    .href
                    .as_deref()
                    .is_some_and(|href| !listed.contains(href));
            if stale {
                self.store.remove_pending_import(pending.id)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn pull_created(
        &self,
        lease: &SyncLease<'_>,
        connection: &Connection,
        book: &C::Book,
        href: &str,
        etag: Option<String>,
        listed: &HashSet<&str>,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let staged = self
            .store
            .pending_imports()?
            .into_iter()
            .find(|p| p.connection_id() == Some(connection.id) && p.href.as_deref() == Some(href));
        if let Some(pending) = &staged {
            if etag.is_some() && pending.etag == etag {
                return Ok(());
            }
        }

        let mut remote = self.fetch_remote(lease, book, href)?;
        let uid = remote.contact.uid.clone().unwrap_or_else(|| href.to_string());
        remote.contact.uid = Some(uid.clone());

        // Same UID under a new href: the object was moved on the server.
        if let Some(mut mapping) = self.store.mapping_by_uid(connection.id, &uid)? {
            if listed.contains(mapping.href.as_str()) {
                return Err(SyncError::MappingConflict(format!(
                    "uid '{uid}' appears at both {} and {href}",
                    mapping.href
                )));
            }
            tracing::info!(uid = %uid, from = %mapping.href, to = href, "remote object moved");
            mapping.href = href.to_string();
            self.store.save_mapping(&mapping)?;
            return self.reconcile(connection, mapping, remote, report).map(|_| ());
        }

        // A local contact with this UID that this connection does not know
        // yet, e.g. from an earlier file import: link instead of duplicating.
        if let Some(existing) = self.contacts.find_by_uid(&uid)? {
            if self.store.mapping_by_contact(connection.id, existing)?.is_none() {
                let mut mapping = Mapping::new(connection.id, existing, uid, href, None, &remote.contact);
                mapping.synced_hash = String::new();
                self.store.save_mapping(&mapping)?;
                return self.reconcile(connection, mapping, remote, report).map(|_| ());
            }
        }

        match connection.import_mode {
            ImportMode::Auto => {
                let contact_id = self.contacts.insert(remote.contact.clone())?;
                let mapping = Mapping::new(connection.id, contact_id, uid, href, remote.etag, &remote.contact);
                self.store.save_mapping(&mapping)?;
                report.created_local += 1;
            }
            ImportMode::Review => {
                let pending = PendingImport {
                    id: staged.as_ref().map_or_else(PendingImportId::new, |p| p.id),
                    source: ImportSource::Connection(connection.id),
                    display_name: remote.contact.display_name(),
                    possible_duplicates: self.possible_duplicates(&remote.contact)?,
                    payload: remote.body,
                    uid: Some(uid),
                    href: Some(href.to_string()),
                    etag: remote.etag,
                    staged_at: Utc::now(),
                    rejected_at: None,
                };
                self.store.save_pending_import(&pending)?;
                report.staged += 1;
            }
        }
        Ok(())
    }

    /// Decides between the local and remote version of a mapped contact.
    pub(super) fn reconcile(
        &self,
        connection: &Connection,
        mut mapping: Mapping,
        remote: RemoteVersion,
        report: &mut SyncReport,
    ) -> SyncResult<Reconciled> {
        let mut remote_contact = remote.contact;
        if remote_contact.uid.is_none() {
            remote_contact.uid = Some(mapping.uid.clone());
        }
        let remote_hash = contact_hash(&remote_contact);

        if let Some(mut conflict) = self.store.open_conflict(connection.id, mapping.contact_id)? {
            if conflict.remote != remote_contact || conflict.remote_etag != remote.etag {
                if let Some(local) = self.contacts.get(mapping.contact_id)? {
                    conflict.local = local;
                }
                conflict.remote = remote_contact;
                conflict.remote_etag = remote.etag;
                self.store.save_conflict(&conflict)?;
                tracing::info!(conflict = %conflict.id, href = %mapping.href, "open conflict refreshed");
            }
            return Ok(Reconciled::Conflicted);
        }

        let Some(local) = self.contacts.get(mapping.contact_id)? else {
            let contact_id = self.contacts.insert(remote_contact.clone())?;
            self.store.remove_mapping(connection.id, mapping.contact_id)?;
            mapping.contact_id = contact_id;
            mapping.mark_synced(remote.etag, &remote_contact);
            self.store.save_mapping(&mapping)?;
            report.created_local += 1;
            tracing::info!(href = %mapping.href, "restored missing local contact from server");
            return Ok(Reconciled::Restored);
        };
        let local_hash = contact_hash(&local);

        if remote_hash == mapping.synced_hash {
            mapping.etag = remote.etag;
            self.store.save_mapping(&mapping)?;
            report.unchanged += 1;
            return Ok(Reconciled::Unchanged);
        }
        if local_hash == remote_hash {
            mapping.mark_synced(remote.etag, &local);
            self.store.save_mapping(&mapping)?;
            report.unchanged += 1;
            return Ok(Reconciled::Converged);
        }
        if local_hash == mapping.synced_hash {
            self.apply_remote(&mut mapping, remote_contact, remote.etag)?;
            report.updated_local += 1;
            return Ok(Reconciled::AppliedRemote);
        }

        match connection.conflict_policy {
            ConflictPolicy::KeepRemote => {
                self.apply_remote(&mut mapping, remote_contact, remote.etag)?;
                report.auto_resolved += 1;
                Ok(Reconciled::AppliedRemote)
            }
            ConflictPolicy::KeepLocal => {
                // Leave synced_hash alone so the push phase sends the local
                // version against the fresh ETag.
                mapping.etag = remote.etag;
                self.store.save_mapping(&mapping)?;
                report.auto_resolved += 1;
                Ok(Reconciled::KeptLocal)
            }
            ConflictPolicy::Manual => {
                let conflict = Conflict::new(
                    connection.id,
                    mapping.contact_id,
                    mapping.href.clone(),
                    local,
                    remote_contact,
                    remote.etag,
                );
                self.store.save_conflict(&conflict)?;
                tracing::info!(
                    conflict = %conflict.id,
                    href = %mapping.href,
                    fields = ?conflict.differing_fields(),
                    "conflict recorded"
                );
                Ok(Reconciled::Conflicted)
            }
        }
    }

    fn apply_remote(
        &self,
        mapping: &mut Mapping,
        remote: cardsync_vcard::Contact,
        etag: Option<String>,
    ) -> SyncResult<()> {
        self.contacts.update(mapping.contact_id, remote.clone())?;
        mapping.mark_synced(etag, &remote);
        self.store.save_mapping(mapping)
    }

    fn pull_deleted(
        &self,
        connection: &Connection,
        mapping: Mapping,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        // Relocated earlier in this run.
        match self.store.mapping_by_contact(connection.id, mapping.contact_id)? {
            Some(current) if current.href == mapping.href => {}
            _ => return Ok(()),
        }

        if let Some(mut conflict) = self.store.open_conflict(connection.id, mapping.contact_id)? {
            conflict.mark_resolved();
            self.store.save_conflict(&conflict)?;
        }
        if self.config.orphan_policy == OrphanPolicy::DeleteLocal
            && self.contacts.remove(mapping.contact_id)?
        {
            report.deleted_local += 1;
        }
        self.store.remove_mapping(connection.id, mapping.contact_id)?;
        tracing::debug!(href = %mapping.href, policy = ?self.config.orphan_policy, "remote object deleted");
        Ok(())
    }
}
