//! Staged imports.

use crate::ids::{ConnectionId, ContactId, PendingImportId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a pending import came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportSource {
    /// Discovered on a server connection in review mode.
    Connection(ConnectionId),
    /// Uploaded from a file.
    Upload {
        /// Who uploaded it.
        user: String,
    },
}

/// A remote or uploaded contact waiting for the user's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingImport {
    /// Import identifier.
    pub id: PendingImportId,
    /// Origin.
    pub source: ImportSource,
    /// Raw vCard text of a single card.
    pub payload: String,
    /// Name shown in the review list.
    pub display_name: String,
    /// UID from the card, if any.
    pub uid: Option<String>,
    /// Remote path for connection imports.
    pub href: Option<String>,
    /// Remote ETag for connection imports.
    pub etag: Option<String>,
    /// Local contacts with a similar name.
    pub possible_duplicates: Vec<ContactId>,
    /// When it was staged.
    pub staged_at: DateTime<Utc>,
    /// Set when the user rejected a connection import. The record stays
    /// behind so the same remote version is not offered again.
    pub rejected_at: Option<DateTime<Utc>>,
}

impl PendingImport {
    /// Connection this import belongs to, if any.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        match self.source {
            ImportSource::Connection(id) => Some(id),
            ImportSource::Upload { .. } => None,
        }
    }

    /// Whether the user rejected this import.
    pub fn is_rejected(&self) -> bool {
        self.rejected_at.is_some()
    }
}

/// Counts produced by file imports and by accepting or rejecting pending
/// imports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Contacts created locally.
    pub imported: usize,
    /// Contacts staged for review.
    pub staged: usize,
    /// Pending imports the user rejected.
    pub skipped: usize,
    /// Cards whose UID already exists locally.
    pub already_existing: usize,
    /// Cards that could not be parsed or stored.
    pub errored: usize,
}

impl ImportReport {
    /// Adds another report's counts to this one.
    pub fn merge(&mut self, other: &ImportReport) {
        self.imported += other.imported;
        self.staged += other.staged;
        self.skipped += other.skipped;
        self.already_existing += other.already_existing;
        self.errored += other.errored;
    }

    /// Total number of cards accounted for.
    pub fn total(&self) -> usize {
        self.imported + self.staged + self.skipped + self.already_existing + self.errored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_accumulate() {
        let mut total = ImportReport {
            imported: 2,
            errored: 1,
            ..ImportReport::default()
        };
        total.merge(&ImportReport {
            staged: 3,
            skipped: 1,
            ..ImportReport::default()
        });
        assert_eq!(total.imported, 2);
        assert_eq!(total.staged, 3);
        assert_eq!(total.total(), 7);
    }

    #[test]
    fn source_connection() {
        let id = ConnectionId::new();
        let pending = PendingImport {
            id: PendingImportId::new(),
            source: ImportSource::Connection(id),
            payload: String::new(),
            display_name: "Ana".into(),
            uid: None,
            href: Some("/ab/a.vcf".into()),
            etag: None,
            possible_duplicates: Vec::new(),
            staged_at: Utc::now(),
            rejected_at: None,
        };
        assert_eq!(pending.connection_id(), Some(id));
        assert!(!pending.is_rejected());
    }
}
