//! Links between local contacts and remote objects.

use crate::ids::{ConnectionId, ContactId};
use cardsync_vcard::{encode, Contact, EncodeOptions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Records that a local contact corresponds to a remote object.
///
/// Within one connection a contact, a uid and an href each appear in at most
/// one mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    /// Connection the remote object lives on.
    pub connection_id: ConnectionId,
    /// Local contact.
    pub contact_id: ContactId,
    /// vCard UID shared by both sides.
    pub uid: String,
    /// Remote object path.
    pub href: String,
    /// ETag of the remote object when last synchronized.
    pub etag: Option<String>,
    /// [`contact_hash`] of the contact when last synchronized.
    pub synced_hash: String,
    /// When the two sides were last known to agree.
    pub synced_at: DateTime<Utc>,
}

impl Mapping {
    /// Creates a mapping recording `contact` as the agreed state.
    pub fn new(
        connection_id: ConnectionId,
        contact_id: ContactId,
        uid: impl Into<String>,
        href: impl Into<String>,
        etag: Option<String>,
        contact: &Contact,
    ) -> Self {
        Self {
            connection_id,
            contact_id,
            uid: uid.into(),
            href: href.into(),
            etag,
            synced_hash: contact_hash(contact),
            synced_at: Utc::now(),
        }
    }

    /// Records a new agreed state.
    pub fn mark_synced(&mut self, etag: Option<String>, contact: &Contact) {
        self.etag = etag;
        self.synced_hash = contact_hash(contact);
        self.synced_at = Utc::now();
    }

    /// Whether `contact` differs from the last agreed state.
    pub fn is_changed(&self, contact: &Contact) -> bool {
        contact_hash(contact) != self.synced_hash
    }
}

/// SHA-256 over the canonical vCard encoding of a contact, hex encoded.
pub fn contact_hash(contact: &Contact) -> String {
    let canonical = encode(contact, &EncodeOptions::default());
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
