//! File imports, staged imports and exports.

use super::SyncEngine;
use crate::connection::ImportMode;
use crate::error::{SyncError, SyncResult};
use crate::ids::{ContactId, PendingImportId};
use crate::import::{ImportReport, ImportSource, PendingImport};
use crate::mapping::Mapping;
use crate::store::{ContactStore, SyncStore};
use crate::transport::Connector;
use cardsync_vcard::file::{export_file_name, validate_upload};
use cardsync_vcard::{decode, encode_many, split_cards, EncodeOptions};
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;

impl<C: Connector, S: SyncStore, L: ContactStore> SyncEngine<C, S, L> {
    /// Imports an uploaded `.vcf` file.
    ///
    /// Every card is handled on its own: unparsable cards are counted as
    /// errored, cards whose UID is already known locally (or already staged)
    /// as existing. In [`ImportMode::Review`] the rest is staged for the
    /// user; otherwise contacts are created right away.
    pub fn stage_file_import(
        &self,
        user: &str,
        file_name: &str,
        content: &str,
        mode: ImportMode,
    ) -> SyncResult<ImportReport> {
        validate_upload(file_name, content)?;

        let mut known_uids: HashSet<String> = self
            .store
            .pending_imports()?
            .into_iter()
            .filter(|p| !p.is_rejected())
            .filter_map(|p| p.uid)
            .collect();
        let mut report = ImportReport::default();

        for (index, card) in split_cards(content).into_iter().enumerate() {
            let contact = match decode(&card) {
                Ok(contact) => contact,
                Err(err) => {
                    tracing::warn!(file = file_name, card = index + 1, error = %err, "skipping unparsable card");
                    report.errored += 1;
                    continue;
                }
            };
            if let Some(uid) = &contact.uid {
                if known_uids.contains(uid) || self.contacts.find_by_uid(uid)?.is_some() {
                    report.already_existing += 1;
                    continue;
                }
                known_uids.insert(uid.clone());
            }

            match mode {
                ImportMode::Auto => {
                    self.contacts.insert(contact)?;
                    report.imported += 1;
                }
                ImportMode::Review => {
                    let pending = PendingImport {
                        id: PendingImportId::new(),
                        source: ImportSource::Upload {
                            user: user.to_string(),
                        },
                        display_name: contact.display_name(),
                        possible_duplicates: self.possible_duplicates(&contact)?,
                        uid: contact.uid,
                        payload: card,
                        href: None,
                        etag: None,
                        staged_at: Utc::now(),
                        rejected_at: None,
                    };
                    self.store.save_pending_import(&pending)?;
                    report.staged += 1;
                }
            }
        }

        tracing::info!(
            file = file_name,
            imported = report.imported,
            staged = report.staged,
            existing = report.already_existing,
            errored = report.errored,
            "file import finished"
        );
        Ok(report)
    }

    /// Imports waiting for a decision, oldest first.
    pub fn pending_imports(&self) -> SyncResult<Vec<PendingImport>> {
        let mut pending: Vec<PendingImport> = self
            .store
            .pending_imports()?
            .into_iter()
            .filter(|p| !p.is_rejected())
            .collect();
        pending.sort_by_key(|p| p.staged_at);
        Ok(pending)
    }

    /// Accepts a pending import, creating the local contact. Imports from a
    /// connection are mapped to their remote object.
    pub fn accept_pending_import(&self, id: PendingImportId) -> SyncResult<ContactId> {
        let pending = self
            .store
            .get_pending_import(id)?
            .filter(|p| !p.is_rejected())
            .ok_or(SyncError::PendingImportNotFound(id))?;
        let mut contact = decode(&pending.payload)?;

        let contact_id = match pending.source {
            ImportSource::Upload { .. } => self.contacts.insert(contact)?,
            ImportSource::Connection(connection_id) => {
                let _lease = self.locks.acquire(connection_id)?;
                let href = pending
                    .href
                    .clone()
                    .ok_or_else(|| SyncError::protocol(format!("pending import {id} has no href")))?;
                let uid = pending
                    .uid
                    .clone()
                    .or_else(|| contact.uid.clone())
                    .unwrap_or_else(|| href.clone());
                contact.uid = Some(uid.clone());

                let taken = self.store.mapping_by_uid(connection_id, &uid)?.is_some()
                    || self.store.mapping_by_href(connection_id, &href)?.is_some();
                if taken {
                    return Err(SyncError::MappingConflict(format!(
                        "uid '{uid}' or href '{href}' is already mapped"
                    )));
                }
                let contact_id = self.contacts.insert(contact.clone())?;
                let mapping = Mapping::new(connection_id, contact_id, uid, href, pending.etag.clone(), &contact);
                if let Err(err) = self.store.save_mapping(&mapping) {
                    self.contacts.remove(contact_id)?;
                    return Err(err);
                }
                contact_id
            }
        };

        self.store.remove_pending_import(id)?;
        tracing::info!(import = %id, contact = %contact_id, "pending import accepted");
        Ok(contact_id)
    }

    /// Rejects a pending import.
    ///
    /// Uploads are discarded. Connection imports are remembered as rejected
    /// so the same remote version is not offered again; a later remote edit
    /// stages it anew.
    pub fn reject_pending_import(&self, id: PendingImportId) -> SyncResult<()> {
        let mut pending = self
            .store
            .get_pending_import(id)?
            .filter(|p| !p.is_rejected())
            .ok_or(SyncError::PendingImportNotFound(id))?;
        match pending.source {
            ImportSource::Upload { .. } => {
                self.store.remove_pending_import(id)?;
            }
            ImportSource::Connection(_) => {
                pending.rejected_at = Some(Utc::now());
                self.store.save_pending_import(&pending)?;
            }
        }
        tracing::info!(import = %id, "pending import rejected");
        Ok(())
    }

    /// Accepts several imports, counting failures instead of stopping.
    pub fn accept_pending_imports(&self, ids: &[PendingImportId]) -> ImportReport {
        let mut report = ImportReport::default();
        for id in ids {
            match self.accept_pending_import(*id) {
                Ok(_) => report.imported += 1,
                Err(SyncError::MappingConflict(_)) => report.already_existing += 1,
                Err(err) => {
                    tracing::warn!(import = %id, error = %err, "could not accept import");
                    report.errored += 1;
                }
            }
        }
        report
    }

    /// Rejects several imports, counting failures instead of stopping.
    pub fn reject_pending_imports(&self, ids: &[PendingImportId]) -> ImportReport {
        let mut report = ImportReport::default();
        for id in ids {
            match self.reject_pending_import(*id) {
                Ok(()) => report.skipped += 1,
                Err(err) => {
                    tracing::warn!(import = %id, error = %err, "could not reject import");
                    report.errored += 1;
                }
            }
        }
        report
    }

    /// Renders every local contact as one `.vcf` file. Returns the
    /// suggested file name and the body.
    pub fn export_contacts(
        &self,
        name: &str,
        date: NaiveDate,
        options: &EncodeOptions,
    ) -> SyncResult<(String, String)> {
        let contacts = self.contacts.list()?;
        let body = encode_many(contacts.iter().map(|(_, c)| c), options);
        tracing::debug!(contacts = contacts.len(), "exported contacts");
        Ok((export_file_name(name, date), body))
    }
}
