//! Persistence seams and in-memory implementations.
//!
//! The engine never owns storage. [`ContactStore`] is the surrounding
//! application's contact table; [`SyncStore`] holds everything the engine
//! itself tracks (connections, mappings, conflicts and pending imports).

use crate::conflict::Conflict;
use crate::connection::Connection;
use crate::error::{SyncError, SyncResult};
use crate::ids::{ConflictId, ConnectionId, ContactId, PendingImportId};
use crate::import::PendingImport;
use crate::mapping::Mapping;
use cardsync_vcard::Contact;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Local contact storage.
pub trait ContactStore: Send + Sync {
    /// All contacts, in a stable order.
    fn list(&self) -> SyncResult<Vec<(ContactId, Contact)>>;

    /// A single contact.
    fn get(&self, id: ContactId) -> SyncResult<Option<Contact>>;

    /// Stores a new contact.
    fn insert(&self, contact: Contact) -> SyncResult<ContactId>;

    /// Replaces an existing contact.
    fn update(&self, id: ContactId, contact: Contact) -> SyncResult<()>;

    /// Removes a contact; returns whether it existed.
    fn remove(&self, id: ContactId) -> SyncResult<bool>;

    /// First contact carrying `uid`.
    fn find_by_uid(&self, uid: &str) -> SyncResult<Option<ContactId>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|(_, c)| c.uid.as_deref() == Some(uid))
            .map(|(id, _)| id))
    }
}

/// Engine-owned state.
pub trait SyncStore: Send + Sync {
    /// A connection by id.
    fn get_connection(&self, id: ConnectionId) -> SyncResult<Option<Connection>>;

    /// All connections.
    fn list_connections(&self) -> SyncResult<Vec<Connection>>;

    /// Inserts or replaces a connection.
    fn save_connection(&self, connection: &Connection) -> SyncResult<()>;

    /// Removes a connection together with its mappings, conflicts and
    /// pending imports.
    fn delete_connection(&self, id: ConnectionId) -> SyncResult<bool>;

    /// Mappings of one connection.
    fn mappings(&self, connection: ConnectionId) -> SyncResult<Vec<Mapping>>;

    /// Mappings of one contact across all connections.
    fn mappings_for_contact(&self, contact: ContactId) -> SyncResult<Vec<Mapping>>;

    /// Inserts or replaces the mapping for `(connection_id, contact_id)`.
    ///
    /// Fails with [`SyncError::MappingConflict`] if another contact of the
    /// same connection already owns the uid or the href.
    fn save_mapping(&self, mapping: &Mapping) -> SyncResult<()>;

    /// Removes the mapping for a contact; returns whether it existed.
    fn remove_mapping(&self, connection: ConnectionId, contact: ContactId) -> SyncResult<bool>;

    /// Mapping by remote path.
    fn mapping_by_href(&self, connection: ConnectionId, href: &str) -> SyncResult<Option<Mapping>> {
        Ok(self.mappings(connection)?.into_iter().find(|m| m.href == href))
    }

    /// Mapping by vCard UID.
    fn mapping_by_uid(&self, connection: ConnectionId, uid: &str) -> SyncResult<Option<Mapping>> {
        Ok(self.mappings(connection)?.into_iter().find(|m| m.uid == uid))
    }

    /// Mapping by local contact.
    fn mapping_by_contact(
        &self,
        connection: ConnectionId,
        contact: ContactId,
    ) -> SyncResult<Option<Mapping>> {
        Ok(self
            .mappings(connection)?
            .into_iter()
            .find(|m| m.contact_id == contact))
    }

    /// Conflicts, resolved ones included, optionally for one connection.
    fn conflicts(&self, connection: Option<ConnectionId>) -> SyncResult<Vec<Conflict>>;

    /// A conflict by id.
    fn get_conflict(&self, id: ConflictId) -> SyncResult<Option<Conflict>>;

    /// Inserts or replaces a conflict.
    fn save_conflict(&self, conflict: &Conflict) -> SyncResult<()>;

    /// Drops conflicts resolved before `resolved_before`; returns how many
    /// were removed. Open conflicts are never pruned.
    fn prune_resolved_conflicts(&self, resolved_before: DateTime<Utc>) -> SyncResult<usize>;

    /// The unresolved conflict for a contact on a connection.
    fn open_conflict(
        &self,
        connection: ConnectionId,
        contact: ContactId,
    ) -> SyncResult<Option<Conflict>> {
        Ok(self
            .conflicts(Some(connection))?
            .into_iter()
            .find(|c| c.contact_id == contact && !c.is_resolved()))
    }

    /// All pending imports.
    fn pending_imports(&self) -> SyncResult<Vec<PendingImport>>;

    /// Inserts or replaces a pending import.
    fn save_pending_import(&self, pending: &PendingImport) -> SyncResult<()>;

    /// Removes a pending import; returns whether it existed.
    fn remove_pending_import(&self, id: PendingImportId) -> SyncResult<bool>;

    /// A pending import by id.
    fn get_pending_import(&self, id: PendingImportId) -> SyncResult<Option<PendingImport>> {
        Ok(self.pending_imports()?.into_iter().find(|p| p.id == id))
    }
}

/// Serializable contents of a [`MemorySyncStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    /// Connections.
    pub connections: Vec<Connection>,
    /// Mappings.
    pub mappings: Vec<Mapping>,
    /// Conflicts.
    pub conflicts: Vec<Conflict>,
    /// Pending imports.
    pub pending_imports: Vec<PendingImport>,
}

/// In-memory [`SyncStore`].
#[derive(Debug, Default)]
pub struct MemorySyncStore {
    state: RwLock<SyncSnapshot>,
}

impl MemorySyncStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding a previously taken snapshot.
    pub fn from_snapshot(snapshot: SyncSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// Copies the current contents.
    pub fn snapshot(&self) -> SyncSnapshot {
        self.state.read().clone()
    }
}

impl SyncStore for MemorySyncStore {
    fn get_connection(&self, id: ConnectionId) -> SyncResult<Option<Connection>> {
        Ok(self
            .state
            .read()
            .connections
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn list_connections(&self) -> SyncResult<Vec<Connection>> {
        Ok(self.state.read().connections.clone())
    }

    fn save_connection(&self, connection: &Connection) -> SyncResult<()> {
        let mut state = self.state.write();
        match state.connections.iter_mut().find(|c| c.id == connection.id) {
            Some(existing) => *existing = connection.clone(),
            None => state.connections.push(connection.clone()),
        }
        Ok(())
    }

    fn delete_connection(&self, id: ConnectionId) -> SyncResult<bool> {
        let mut state = self.state.write();
        let before = state.connections.len();
        state.connections.retain(|c| c.id != id);
        state.mappings.retain(|m| m.connection_id != id);
        state.conflicts.retain(|c| c.connection_id != id);
        state.pending_imports.retain(|p| p.connection_id() != Some(id));
        Ok(state.connections.len() != before)
    }

    fn mappings(&self, connection: ConnectionId) -> SyncResult<Vec<Mapping>> {
        Ok(self
            .state
            .read()
            .mappings
            .iter()
            .filter(|m| m.connection_id == connection)
            .cloned()
            .collect())
    }

    fn mappings_for_contact(&self, contact: ContactId) -> SyncResult<Vec<Mapping>> {
        Ok(self
            .state
            .read()
            .mappings
            .iter()
            .filter(|m| m.contact_id == contact)
            .cloned()
            .collect())
    }

    fn save_mapping(&self, mapping: &Mapping) -> SyncResult<()> {
        let mut state = self.state.write();
        let clash = state.mappings.iter().find(|m| {
            m.connection_id == mapping.connection_id
                && m.contact_id != mapping.contact_id
                && (m.uid == mapping.uid || m.href == mapping.href)
        });
        if let Some(existing) = clash {
            return Err(SyncError::MappingConflict(format!(
                "uid '{}' or href '{}' already mapped to contact {}",
                mapping.uid, mapping.href, existing.contact_id
            )));
        }
        match state.mappings.iter_mut().find(|m| {
            m.connection_id == mapping.connection_id && m.contact_id == mapping.contact_id
        }) {
            Some(existing) => *existing = mapping.clone(),
            None => state.mappings.push(mapping.clone()),
        }
        Ok(())
    }

    fn remove_mapping(&self, connection: ConnectionId, contact: ContactId) -> SyncResult<bool> {
        let mut state = self.state.write();
        let before = state.mappings.len();
        state
            .mappings
            .retain(|m| !(m.connection_id == connection && m.contact_id == contact));
        Ok(state.mappings.len() != before)
    }

    fn conflicts(&self, connection: Option<ConnectionId>) -> SyncResult<Vec<Conflict>> {
        Ok(self
            .state
            .read()
            .conflicts
            .iter()
            .filter(|c| connection.map_or(true, |id| c.connection_id == id))
            .cloned()
            .collect())
    }

    fn get_conflict(&self, id: ConflictId) -> SyncResult<Option<Conflict>> {
        Ok(self
            .state
            .read()
            .conflicts
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn save_conflict(&self, conflict: &Conflict) -> SyncResult<()> {
        let mut state = self.state.write();
        match state.conflicts.iter_mut().find(|c| c.id == conflict.id) {
            Some(existing) => *existing = conflict.clone(),
            None => state.conflicts.push(conflict.clone()),
        }
        Ok(())
    }

    fn prune_resolved_conflicts(&self, resolved_before: DateTime<Utc>) -> SyncResult<usize> {
        let mut state = self.state.write();
        let before = state.conflicts.len();
        state
            .conflicts
            .retain(|c| c.resolved_at.map_or(true, |at| at >= resolved_before));
        Ok(before - state.conflicts.len())
    }

    fn pending_imports(&self) -> SyncResult<Vec<PendingImport>> {
        Ok(self.state.read().pending_imports.clone())
    }

    fn save_pending_import(&self, pending: &PendingImport) -> SyncResult<()> {
        let mut state = self.state.write();
        match state.pending_imports.iter_mut().find(|p| p.id == pending.id) {
            Some(existing) => *existing = pending.clone(),
            None => state.pending_imports.push(pending.clone()),
        }
        Ok(())
    }

    fn remove_pending_import(&self, id: PendingImportId) -> SyncResult<bool> {
        let mut state = self.state.write();
        let before = state.pending_imports.len();
        state.pending_imports.retain(|p| p.id != id);
        Ok(state.pending_imports.len() != before)
    }
}

/// A contact with its identifier, as kept in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContact {
    /// Identifier.
    pub id: ContactId,
    /// Contact data.
    pub contact: Contact,
}

/// In-memory [`ContactStore`] preserving insertion order.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    contacts: RwLock<Vec<StoredContact>>,
}

impl MemoryContactStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding previously stored contacts.
    pub fn from_contacts(contacts: Vec<StoredContact>) -> Self {
        Self {
            contacts: RwLock::new(contacts),
        }
    }

    /// Copies the current contents.
    pub fn snapshot(&self) -> Vec<StoredContact> {
        self.contacts.read().clone()
    }

    /// Number of stored contacts.
    pub fn len(&self) -> usize {
        self.contacts.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.contacts.read().is_empty()
    }
}

impl ContactStore for MemoryContactStore {
    fn list(&self) -> SyncResult<Vec<(ContactId, Contact)>> {
        Ok(self
            .contacts
            .read()
            .iter()
            .map(|s| (s.id, s.contact.clone()))
            .collect())
    }

    fn get(&self, id: ContactId) -> SyncResult<Option<Contact>> {
        Ok(self
            .contacts
            .read()
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.contact.clone()))
    }

    fn insert(&self, contact: Contact) -> SyncResult<ContactId> {
        let id = ContactId::new();
        self.contacts.write().push(StoredContact { id, contact });
        Ok(id)
    }

    fn update(&self, id: ContactId, contact: Contact) -> SyncResult<()> {
        let mut contacts = self.contacts.write();
        let slot = contacts
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SyncError::store(format!("contact {id} does not exist")))?;
        slot.contact = contact;
        Ok(())
    }

    fn remove(&self, id: ContactId) -> SyncResult<bool> {
        let mut contacts = self.contacts.write();
        let before = contacts.len();
        contacts.retain(|s| s.id != id);
        Ok(contacts.len() != before)
    }
}
