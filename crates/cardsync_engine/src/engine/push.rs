//! Push phase: send local changes to the server.

use super::pull::Reconciled;
use super::{isolate, SyncEngine};
use crate::connection::Connection;
use crate::error::{SyncError, SyncResult};
use crate::ids::ContactId;
use crate::lock::SyncLease;
use crate::mapping::Mapping;
use crate::state::SyncReport;
use crate::store::{ContactStore, SyncStore};
use crate::transport::{AddressBook, Connector};
use cardsync_vcard::{encode, Contact, EncodeOptions};
use std::collections::HashSet;
use uuid::Uuid;

impl<C: Connector, S: SyncStore, L: ContactStore> SyncEngine<C, S, L> {
    pub(super) fn push(
        &self,
        lease: &SyncLease<'_>,
        connection: &Connection,
        book: &C::Book,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        for mapping in self.store.mappings(connection.id)? {
            lease.check()?;
            let href = mapping.href.clone();
            let result = self.push_mapping(lease, connection, book, mapping, report);
            isolate(result, &href, &mut report.errors)?;
        }

        if !connection.auto_export {
            return Ok(());
        }
        let mapped: HashSet<ContactId> = self
            .store
            .mappings(connection.id)?
            .into_iter()
            .map(|m| m.contact_id)
            .collect();
        for (contact_id, contact) in self.contacts.list()? {
            if mapped.contains(&contact_id) {
                continue;
            }
            lease.check()?;
            let label = contact.display_name();
            let result = self.export_contact(lease, connection, book, contact_id, contact, report);
            isolate(result, &label, &mut report.errors)?;
        }
        Ok(())
    }

    fn push_mapping(
        &self,
        lease: &SyncLease<'_>,
        connection: &Connection,
        book: &C::Book,
        mapping: Mapping,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        if self
            .store
            .open_conflict(connection.id, mapping.contact_id)?
            .is_some()
        {
            return Ok(());
        }

        let Some(mut local) = self.contacts.get(mapping.contact_id)? else {
            match self.call(lease, "delete", || {
                book.delete(&mapping.href, mapping.etag.as_deref())
            }) {
                Ok(()) => report.deleted_remote += 1,
                Err(SyncError::NotFound(_)) => {}
                // Edited remotely since; the next pull brings it back.
                Err(SyncError::PreconditionFailed(_)) => {
                    tracing::info!(href = %mapping.href, "remote copy changed after local delete; keeping it")
                }
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(err) => {
                    report.errors += 1;
                    tracing::warn!(
                        href = %mapping.href,
                        error = %err,
                        "remote delete failed; dropping mapping anyway"
                    );
                }
            }
            self.store.remove_mapping(connection.id, mapping.contact_id)?;
            return Ok(());
        };

        if local.uid.is_none() {
            local.uid = Some(mapping.uid.clone());
            self.contacts.update(mapping.contact_id, local.clone())?;
        }
        if !mapping.is_changed(&local) {
            return Ok(());
        }
        self.upload(lease, connection, book, mapping, &local, report)
    }

    fn upload(
        &self,
        lease: &SyncLease<'_>,
        connection: &Connection,
        book: &C::Book,
        mut mapping: Mapping,
        local: &Contact,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let body = encode(local, &EncodeOptions::default());
        match self.call(lease, "update", || {
            book.update(&mapping.href, &body, mapping.etag.as_deref())
        }) {
            Ok(etag) => {
                mapping.mark_synced(etag, local);
                self.store.save_mapping(&mapping)?;
                report.pushed_updates += 1;
            }
            Err(SyncError::NotFound(_)) => {
                let etag = self.call(lease, "create", || book.create(&mapping.href, &body))?;
                mapping.mark_synced(etag, local);
                self.store.save_mapping(&mapping)?;
                report.pushed_creates += 1;
            }
            Err(SyncError::PreconditionFailed(_)) => {
                tracing::debug!(href = %mapping.href, "remote changed during sync; reconciling");
                let remote = self.fetch_remote(lease, book, &mapping.href)?;
                let outcome = self.reconcile(connection, mapping.clone(), remote, report)?;
                if outcome != Reconciled::KeptLocal {
                    return Ok(());
                }
                let Some(mut fresh) = self.store.mapping_by_contact(connection.id, mapping.contact_id)?
                else {
                    return Ok(());
                };
                let etag = self.call(lease, "update", || {
                    book.update(&fresh.href, &body, fresh.etag.as_deref())
                })?;
                fresh.mark_synced(etag, local);
                self.store.save_mapping(&fresh)?;
                report.pushed_updates += 1;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Creates a remote object for a contact this connection has never
    /// seen. Contacts without a UID get one first.
    fn export_contact(
        &self,
        lease: &SyncLease<'_>,
        connection: &Connection,
        book: &C::Book,
        contact_id: ContactId,
        mut contact: Contact,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let uid = match &contact.uid {
            Some(uid) => uid.clone(),
            None => {
                let uid = Uuid::new_v4().to_string();
                contact.uid = Some(uid.clone());
                self.contacts.update(contact_id, contact.clone())?;
                uid
            }
        };
        if let Some(owner) = self.store.mapping_by_uid(connection.id, &uid)? {
            return Err(SyncError::MappingConflict(format!(
                "uid '{uid}' already belongs to contact {}",
                owner.contact_id
            )));
        }

        let name = if is_safe_object_name(&uid) {
            uid.clone()
        } else {
            Uuid::new_v4().to_string()
        };
        let href = book.new_href(&name);
        let body = encode(&contact, &EncodeOptions::default());
        let etag = self.call(lease, "create", || book.create(&href, &body))?;
        self.store
            .save_mapping(&Mapping::new(connection.id, contact_id, uid, href, etag, &contact))?;
        report.pushed_creates += 1;
        Ok(())
    }
}

fn is_safe_object_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::is_safe_object_name;

    #[test]
    fn object_names() {
        assert!(is_safe_object_name("0f8fad5b-d9cb-469f-a165-70867728950e"));
        assert!(is_safe_object_name("ana_belluco.1"));
        assert!(!is_safe_object_name(""));
        assert!(!is_safe_object_name("../etc"));
        assert!(!is_safe_object_name("a/b"));
        assert!(!is_safe_object_name("urn:uuid:1234"));
        assert!(!is_safe_object_name(".hidden"));
    }
}
