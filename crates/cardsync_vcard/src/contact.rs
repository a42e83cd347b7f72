//! Contact record model.
//!
//! Name parts use empty strings for "absent" because that is how the
//! structured `N` property represents them. Everything else uses `Option`
//! or an empty `Vec`.

use serde::{Deserialize, Serialize};

/// A contact record as exchanged with the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Contact {
    /// vCard `UID`, stable across servers.
    pub uid: Option<String>,
    /// Honorific prefix ("Dr.").
    pub prefix: String,
    /// Given name.
    pub given_name: String,
    /// Additional (middle) names.
    pub additional_names: String,
    /// Primary surname.
    pub family_name: String,
    /// Secondary surname, folded into the `N` family component on the wire.
    pub second_family_name: String,
    /// Honorific suffix ("Jr.").
    pub suffix: String,
    /// Nickname.
    pub nickname: Option<String>,
    /// Organization name.
    pub organization: Option<String>,
    /// Job title.
    pub title: Option<String>,
    /// Phone numbers.
    pub phones: Vec<TypedValue>,
    /// Email addresses.
    pub emails: Vec<TypedValue>,
    /// Web addresses.
    pub urls: Vec<TypedValue>,
    /// Instant messaging handles.
    pub im_handles: Vec<ImHandle>,
    /// Postal addresses.
    pub addresses: Vec<PostalAddress>,
    /// Birthdays, anniversaries and labelled dates.
    pub dates: Vec<ImportantDate>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Embedded photo.
    pub photo: Option<Photo>,
    /// Extension and otherwise unsupported properties.
    pub custom_fields: Vec<CustomField>,
}

impl Contact {
    /// Creates a contact with just a given name and primary surname.
    pub fn named(given_name: impl Into<String>, family_name: impl Into<String>) -> Self {
        Self {
            given_name: given_name.into(),
            family_name: family_name.into(),
            ..Self::default()
        }
    }

    /// Primary and secondary surname joined by a single space.
    pub fn combined_family_name(&self) -> String {
        match (self.family_name.is_empty(), self.second_family_name.is_empty()) {
            (false, false) => format!("{} {}", self.family_name, self.second_family_name),
            (true, false) => self.second_family_name.clone(),
            _ => self.family_name.clone(),
        }
    }

    /// Given name followed by the combined surname.
    pub fn display_name(&self) -> String {
        let family = self.combined_family_name();
        match (self.given_name.is_empty(), family.is_empty()) {
            (false, false) => format!("{} {}", self.given_name, family),
            (false, true) => self.given_name.clone(),
            (true, false) => family,
            (true, true) => String::new(),
        }
    }

    /// Looks up a custom field by key.
    pub fn custom_field(&self, key: &str) -> Option<&str> {
        self.custom_fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }
}

/// A value with an optional lower-case type label, e.g. `cell` or `work`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    /// Type label(s), comma separated when there are several.
    pub kind: Option<String>,
    /// The value itself.
    pub value: String,
}

impl TypedValue {
    /// Creates a typed value.
    pub fn new(kind: Option<&str>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.map(str::to_string),
            value: value.into(),
        }
    }
}

/// An instant messaging handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImHandle {
    /// Service name ("skype", "xmpp").
    pub service: String,
    /// Handle or URI on that service.
    pub handle: String,
}

/// A structured postal address (`ADR`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostalAddress {
    /// Type label(s).
    pub kind: Option<String>,
    /// Post office box.
    pub po_box: String,
    /// Extended address (apartment, suite).
    pub extended: String,
    /// Street address.
    pub street: String,
    /// City.
    pub locality: String,
    /// State or province.
    pub region: String,
    /// Postal code.
    pub postal_code: String,
    /// Country.
    pub country: String,
}

/// What an [`ImportantDate`] commemorates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateKind {
    /// `BDAY`.
    Birthday,
    /// `ANNIVERSARY`.
    Anniversary,
    /// A user-labelled date.
    Other(String),
}

/// A date attached to a contact, kept in its wire representation
/// (`1990-05-01`, `--0501`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportantDate {
    /// Kind of date.
    pub kind: DateKind,
    /// Date text.
    pub date: String,
}

/// An embedded photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    /// Media type, e.g. `image/jpeg`.
    pub media_type: String,
    /// Raw image bytes.
    pub data: Vec<u8>,
}

/// A key/value extension field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    /// Field key; upper-case `X-` tokens are emitted as properties verbatim.
    pub key: String,
    /// Field value.
    pub value: String,
}

impl CustomField {
    /// Creates a custom field.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_family_name_joins_both_surnames() {
        let mut contact = Contact::named("Ana", "Belluco");
        contact.second_family_name = "De La Rosa".into();
        assert_eq!(contact.combined_family_name(), "Belluco De La Rosa");
        assert_eq!(contact.display_name(), "Ana Belluco De La Rosa");
    }

    #[test]
    fn combined_family_name_with_only_one_part() {
        let contact = Contact::named("Ana", "Belluco");
        assert_eq!(contact.combined_family_name(), "Belluco");

        let mut only_second = Contact::named("Ana", "");
        only_second.second_family_name = "Rosa".into();
        assert_eq!(only_second.combined_family_name(), "Rosa");
    }

    #[test]
    fn display_name_without_surname() {
        let contact = Contact::named("Cher", "");
        assert_eq!(contact.display_name(), "Cher");
        assert_eq!(Contact::default().display_name(), "");
    }

    #[test]
    fn custom_field_lookup() {
        let mut contact = Contact::default();
        contact
            .custom_fields
            .push(CustomField::new("X-SHOE-SIZE", "42"));
        assert_eq!(contact.custom_field("X-SHOE-SIZE"), Some("42"));
        assert_eq!(contact.custom_field("X-OTHER"), None);
    }
}
