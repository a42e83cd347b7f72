//! # CardSync vCard
//!
//! vCard encoding and decoding for CardSync.
//!
//! The encoder always writes vCard 3.0 with CRLF line endings and folds
//! lines at 75 octets. The decoder is lenient and accepts 2.1, 3.0 and 4.0
//! input.
//!
//! ## Round trip
//!
//! With the default [`EncodeOptions`], every field of a [`Contact`] survives
//! `decode(encode(contact))`:
//!
//! ```
//! use cardsync_vcard::{decode, encode, Contact, EncodeOptions};
//!
//! let mut contact = Contact::named("Ana", "Belluco");
//! contact.second_family_name = "De La Rosa".into();
//!
//! let text = encode(&contact, &EncodeOptions::default());
//! assert!(text.contains("N:Belluco De La Rosa;Ana;;;"));
//!
//! let decoded = decode(&text).unwrap();
//! assert_eq!(decoded, contact);
//! ```
//!
//! ## Vendor extensions
//!
//! | Property | Carries |
//! |----------|---------|
//! | `X-CARDSYNC-SECOND-LASTNAME` | secondary surname |
//! | `X-CARDSYNC-DATE;X-LABEL=..` | labelled important date |
//! | `X-CARDSYNC-CUSTOM;X-LABEL=..` | custom field whose key is not a property name |

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod contact;
mod decoder;
mod encoder;
mod error;
pub mod file;

pub use contact::{
    Contact, CustomField, DateKind, ImHandle, ImportantDate, Photo, PostalAddress, TypedValue,
};
pub use decoder::{decode, decode_all, split_cards, unescape_text};
pub use encoder::{
    encode, encode_many, escape_text, strip_markdown, EncodeOptions, VcardEncoder,
    MAX_LINE_OCTETS,
};
pub use error::{ParseError, ParseResult, UploadError};

/// `PRODID` written into every encoded card.
pub const PRODID: &str = concat!("-//CardSync//cardsync_vcard ", env!("CARGO_PKG_VERSION"), "//EN");

/// Carries the secondary surname.
pub const SECOND_LASTNAME_PROPERTY: &str = "X-CARDSYNC-SECOND-LASTNAME";

/// Carries a labelled important date.
pub const VENDOR_DATE_PROPERTY: &str = "X-CARDSYNC-DATE";

/// Carries a custom field under an `X-LABEL` parameter.
pub const VENDOR_CUSTOM_PROPERTY: &str = "X-CARDSYNC-CUSTOM";

/// Properties the codec maps onto dedicated [`Contact`] fields or consumes
/// itself. A custom field with one of these keys is written in the labelled
/// vendor form.
const RESERVED_PROPERTIES: &[&str] = &[
    "BEGIN",
    "END",
    "VERSION",
    "PRODID",
    "REV",
    "UID",
    "N",
    "FN",
    "NICKNAME",
    "ORG",
    "TITLE",
    "TEL",
    "EMAIL",
    "URL",
    "ADR",
    "IMPP",
    "BDAY",
    "ANNIVERSARY",
    "NOTE",
    "PHOTO",
    SECOND_LASTNAME_PROPERTY,
    VENDOR_DATE_PROPERTY,
    VENDOR_CUSTOM_PROPERTY,
];

pub(crate) fn is_reserved_property(name: &str) -> bool {
    RESERVED_PROPERTIES.contains(&name)
}
