//! Manual conflict resolution.

use super::SyncEngine;
use crate::conflict::{Conflict, ConflictResolution};
use crate::error::{SyncError, SyncResult};
use crate::ids::{ConflictId, ConnectionId};
use crate::mapping::{contact_hash, Mapping};
use crate::store::{ContactStore, SyncStore};
use crate::transport::{AddressBook, Connector};
use cardsync_vcard::{encode, EncodeOptions};

impl<C: Connector, S: SyncStore, L: ContactStore> SyncEngine<C, S, L> {
    /// Conflicts of one connection, or of all connections.
    pub fn open_conflicts(&self, connection: Option<ConnectionId>) -> SyncResult<Vec<Conflict>> {
        Ok(self
            .store
            .conflicts(connection)?
            .into_iter()
            .filter(|c| !c.is_resolved())
            .collect())
    }

    /// Settles a conflict on both sides.
    ///
    /// The chosen version is written to the server first, conditional on
    /// the remote ETag recorded in the conflict. If the server changed again
    /// the conflict is refreshed with the newer version and
    /// [`SyncError::PreconditionFailed`] is returned so the user can decide
    /// again. On success the local contact and the mapping are updated and
    /// the conflict is marked resolved.
    pub fn resolve_conflict(
        &self,
        id: ConflictId,
        resolution: ConflictResolution,
    ) -> SyncResult<Conflict> {
        let mut conflict = self
            .store
            .get_conflict(id)?
            .ok_or(SyncError::ConflictNotFound(id))?;
        if conflict.is_resolved() {
            return Err(SyncError::InvalidResolution(format!(
                "conflict {id} is already resolved"
            )));
        }

        let lease = self.locks.acquire(conflict.connection_id)?;
        let connection = self.connection(conflict.connection_id)?;
        let current_local = self.contacts.get(conflict.contact_id)?;
        let local = current_local.clone().unwrap_or_else(|| conflict.local.clone());
        let chosen = resolution.apply(&local, &conflict.remote)?;

        let book = self.open(&lease, &connection)?;
        let remote_etag = if contact_hash(&chosen) == contact_hash(&conflict.remote) {
            conflict.remote_etag.clone()
        } else {
            let body = encode(&chosen, &EncodeOptions::default());
            match self.call(&lease, "update", || {
                book.update(&conflict.href, &body, conflict.remote_etag.as_deref())
            }) {
                Ok(etag) => etag,
                Err(SyncError::NotFound(_)) => {
                    self.call(&lease, "create", || book.create(&conflict.href, &body))?
                }
                Err(SyncError::PreconditionFailed(href)) => {
                    let mut remote = self.fetch_remote(&lease, &book, &conflict.href)?;
                    if remote.contact.uid.is_none() {
                        remote.contact.uid = conflict.remote.uid.clone();
                    }
                    conflict.remote = remote.contact;
                    conflict.remote_etag = remote.etag;
                    conflict.local = local;
                    self.store.save_conflict(&conflict)?;
                    tracing::info!(conflict = %id, "remote changed again; conflict refreshed");
                    return Err(SyncError::PreconditionFailed(href));
                }
                Err(err) => return Err(err),
            }
        };

        let contact_id = match current_local {
            Some(_) => {
                self.contacts.update(conflict.contact_id, chosen.clone())?;
                conflict.contact_id
            }
            None => self.contacts.insert(chosen.clone())?,
        };
        let mut mapping = match self
            .store
            .mapping_by_contact(connection.id, conflict.contact_id)?
        {
            Some(mapping) => mapping,
            None => Mapping::new(
                connection.id,
                contact_id,
                chosen.uid.clone().unwrap_or_else(|| conflict.href.clone()),
                conflict.href.clone(),
                None,
                &chosen,
            ),
        };
        if mapping.contact_id != contact_id {
            self.store.remove_mapping(connection.id, mapping.contact_id)?;
            mapping.contact_id = contact_id;
        }
        mapping.href = conflict.href.clone();
        mapping.mark_synced(remote_etag, &chosen);
        self.store.save_mapping(&mapping)?;

        conflict.mark_resolved();
        self.store.save_conflict(&conflict)?;
        tracing::info!(conflict = %id, contact = %contact_id, "conflict resolved");
        Ok(conflict)
    }
}
