//! Conflict records and resolution.

use crate::error::{SyncError, SyncResult};
use crate::ids::{ConflictId, ConnectionId, ContactId};
use cardsync_vcard::Contact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contact fields that take a literal value in a merge.
pub const TEXT_FIELDS: &[&str] = &[
    "prefix",
    "given_name",
    "additional_names",
    "family_name",
    "second_family_name",
    "suffix",
    "nickname",
    "organization",
    "title",
    "notes",
];

/// Contact fields that can only be taken from one side.
pub const LIST_FIELDS: &[&str] = &[
    "phones",
    "emails",
    "urls",
    "im_handles",
    "addresses",
    "dates",
    "photo",
    "custom_fields",
];

/// A contact that changed on both sides since the last sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Conflict identifier.
    pub id: ConflictId,
    /// Connection the remote version came from.
    pub connection_id: ConnectionId,
    /// Local contact.
    pub contact_id: ContactId,
    /// Remote object path.
    pub href: String,
    /// Local version when the conflict was last refreshed.
    pub local: Contact,
    /// Remote version when the conflict was last refreshed.
    pub remote: Contact,
    /// ETag of the remote version.
    pub remote_etag: Option<String>,
    /// First detection.
    pub detected_at: DateTime<Utc>,
    /// Set once the conflict has been resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    /// Creates an open conflict.
    pub fn new(
        connection_id: ConnectionId,
        contact_id: ContactId,
        href: impl Into<String>,
        local: Contact,
        remote: Contact,
        remote_etag: Option<String>,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            connection_id,
            contact_id,
            href: href.into(),
            local,
            remote,
            remote_etag,
            detected_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Returns true if the conflict has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Marks the conflict resolved now.
    pub fn mark_resolved(&mut self) {
        self.resolved_at = Some(Utc::now());
    }

    /// Names of the fields whose values differ between the two sides.
    pub fn differing_fields(&self) -> Vec<&'static str> {
        let (a, b) = (&self.local, &self.remote);
        let checks: [(&'static str, bool); 18] = [
            ("prefix", a.prefix != b.prefix),
            ("given_name", a.given_name != b.given_name),
            ("additional_names", a.additional_names != b.additional_names),
            ("family_name", a.family_name != b.family_name),
            ("second_family_name", a.second_family_name != b.second_family_name),
            ("suffix", a.suffix != b.suffix),
            ("nickname", a.nickname != b.nickname),
            ("organization", a.organization != b.organization),
            ("title", a.title != b.title),
            ("notes", a.notes != b.notes),
            ("phones", a.phones != b.phones),
            ("emails", a.emails != b.emails),
            ("urls", a.urls != b.urls),
            ("im_handles", a.im_handles != b.im_handles),
            ("addresses", a.addresses != b.addresses),
            ("dates", a.dates != b.dates),
            ("photo", a.photo != b.photo),
            ("custom_fields", a.custom_fields != b.custom_fields),
        ];
        checks
            .into_iter()
            .filter_map(|(name, differs)| differs.then_some(name))
            .collect()
    }
}

/// Per-field choice in a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeChoice {
    /// Take the local value.
    Local,
    /// Take the remote value.
    Remote,
    /// Use this literal value (text fields only; empty clears an optional field).
    Value(String),
}

/// How the user settled a conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// Keep the local version everywhere.
    KeepLocal,
    /// Take the remote version everywhere.
    KeepRemote,
    /// Field-by-field choices; unnamed fields keep the local value.
    Merge(BTreeMap<String, MergeChoice>),
}

impl ConflictResolution {
    /// Produces the contact both sides should end up with.
    pub fn apply(&self, local: &Contact, remote: &Contact) -> SyncResult<Contact> {
        let mut merged = match self {
            Self::KeepLocal => return Ok(local.clone()),
            Self::KeepRemote => remote.clone(),
            Self::Merge(choices) => {
                let mut merged = local.clone();
                for (field, choice) in choices {
                    apply_choice(&mut merged, remote, field, choice)?;
                }
                merged
            }
        };
        if merged.uid.is_none() {
            merged.uid = local.uid.clone();
        }
        Ok(merged)
    }
}

fn apply_choice(
    target: &mut Contact,
    remote: &Contact,
    field: &str,
    choice: &MergeChoice,
) -> SyncResult<()> {
    macro_rules! text {
        ($f:ident) => {
            match choice {
                MergeChoice::Local => {}
                MergeChoice::Remote => target.$f = remote.$f.clone(),
                MergeChoice::Value(value) => target.$f = value.clone(),
            }
        };
    }
    macro_rules! optional_text {
        ($f:ident) => {
            match choice {
                MergeChoice::Local => {}
                MergeChoice::Remote => target.$f = remote.$f.clone(),
                MergeChoice::Value(value) if value.is_empty() => target.$f = None,
                MergeChoice::Value(value) => target.$f = Some(value.clone()),
            }
        };
    }
    macro_rules! whole {
        ($f:ident) => {
            match choice {
                MergeChoice::Local => {}
                MergeChoice::Remote => target.$f = remote.$f.clone(),
                MergeChoice::Value(_) => {
                    return Err(SyncError::InvalidResolution(format!(
                        "field '{field}' cannot take a literal value"
                    )))
                }
            }
        };
    }

    match field {
        "prefix" => text!(prefix),
        "given_name" => text!(given_name),
        "additional_names" => text!(additional_names),
        "family_name" => text!(family_name),
        "second_family_name" => text!(second_family_name),
        "suffix" => text!(suffix),
        "nickname" => optional_text!(nickname),
        "organization" => optional_text!(organization),
        "title" => optional_text!(title),
        "notes" => optional_text!(notes),
        "phones" => whole!(phones),
        "emails" => whole!(emails),
        "urls" => whole!(urls),
        "im_handles" => whole!(im_handles),
        "addresses" => whole!(addresses),
        "dates" => whole!(dates),
        "photo" => whole!(photo),
        "custom_fields" => whole!(custom_fields),
        other => {
            return Err(SyncError::InvalidResolution(format!(
                "unknown field '{other}'"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardsync_vcard::TypedValue;

    fn sides() -> (Contact, Contact) {
        let mut local = Contact::named("Ana", "Belluco");
        local.uid = Some("uid-1".into());
        local.notes = Some("local".into());
        local.phones.push(TypedValue::new(Some("cell"), "+1 555 0100"));

        let mut remote = local.clone();
        remote.notes = Some("remote".into());
        remote.title = Some("CTO".into());
        remote.phones = vec![TypedValue::new(Some("work"), "+1 555 0199")];
        (local, remote)
    }

    fn conflict() -> Conflict {
        let (local, remote) = sides();
        Conflict::new(
            ConnectionId::new(),
            ContactId::new(),
            "/ab/uid-1.vcf",
            local,
            remote,
            Some("\"7\"".into()),
        )
    }

    #[test]
    fn keep_either_side() {
        let (local, remote) = sides();
        assert_eq!(ConflictResolution::KeepLocal.apply(&local, &remote).unwrap(), local);
        assert_eq!(ConflictResolution::KeepRemote.apply(&local, &remote).unwrap(), remote);
    }

    #[test]
    fn merge_mixes_fields() {
        let (local, remote) = sides();
        let choices = BTreeMap::from([
            ("notes".to_string(), MergeChoice::Value("new".into())),
            ("phones".to_string(), MergeChoice::Remote),
        ]);
        let merged = ConflictResolution::Merge(choices).apply(&local, &remote).unwrap();

        assert_eq!(merged.notes.as_deref(), Some("new"));
        assert_eq!(merged.phones, remote.phones);
        assert_eq!(merged.title, None, "unnamed fields keep the local value");
        assert_eq!(merged.uid.as_deref(), Some("uid-1"));
    }

    #[test]
    fn empty_value_clears_optional_field() {
        let (local, remote) = sides();
        let choices = BTreeMap::from([("notes".to_string(), MergeChoice::Value(String::new()))]);
        let merged = ConflictResolution::Merge(choices).apply(&local, &remote).unwrap();
        assert_eq!(merged.notes, None);
    }

    #[test]
    fn invalid_merges_are_rejected() {
        let (local, remote) = sides();
        let unknown = BTreeMap::from([("shoe_size".to_string(), MergeChoice::Remote)]);
        assert!(matches!(
            ConflictResolution::Merge(unknown).apply(&local, &remote),
            Err(SyncError::InvalidResolution(_))
        ));

        let literal_list = BTreeMap::from([("phones".to_string(), MergeChoice::Value("x".into()))]);
        assert!(matches!(
            ConflictResolution::Merge(literal_list).apply(&local, &remote),
            Err(SyncError::InvalidResolution(_))
        ));
    }

    #[test]
    fn differing_fields_lists_changes() {
        assert_eq!(conflict().differing_fields(), vec!["title", "notes", "phones"]);
    }

    #[test]
    fn resolution_lifecycle() {
        let mut conflict = conflict();
        assert!(!conflict.is_resolved());
        conflict.mark_resolved();
        assert!(conflict.is_resolved());
    }

    #[test]
    fn field_tables_cover_every_mergeable_field() {
        let (local, remote) = sides();
        for field in TEXT_FIELDS {
            let choices = BTreeMap::from([(field.to_string(), MergeChoice::Value("v".into()))]);
            assert!(ConflictResolution::Merge(choices).apply(&local, &remote).is_ok());
        }
        for field in LIST_FIELDS {
            let choices = BTreeMap::from([(field.to_string(), MergeChoice::Remote)]);
            assert!(ConflictResolution::Merge(choices).apply(&local, &remote).is_ok());
        }
    }
}
