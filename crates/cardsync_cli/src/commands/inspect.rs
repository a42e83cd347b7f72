//! Inspect command implementation.

use super::CliResult;
use cardsync_vcard::{decode_all, Contact};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// What a `.vcf` file contains.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// File path.
    pub path: String,
    /// Number of cards found.
    pub cards: usize,
    /// Cards that decoded.
    pub parsed: usize,
    /// Cards that did not.
    pub failed: Vec<CardFailure>,
    /// One summary per decoded card.
    pub contacts: Vec<CardSummary>,
}

/// A card that failed to decode.
#[derive(Debug, Serialize)]
pub struct CardFailure {
    /// 1-based position in the file.
    pub card: usize,
    /// Decoder message.
    pub error: String,
}

/// Short description of one contact.
#[derive(Debug, Serialize)]
pub struct CardSummary {
    /// Given name and surnames.
    pub name: String,
    /// vCard UID.
    pub uid: Option<String>,
    /// Number of phone numbers.
    pub phones: usize,
    /// Number of email addresses.
    pub emails: usize,
    /// Number of postal addresses.
    pub addresses: usize,
    /// Whether a photo is embedded.
    pub photo: bool,
    /// Number of extension fields.
    pub custom_fields: usize,
}

impl From<&Contact> for CardSummary {
    fn from(contact: &Contact) -> Self {
        Self {
            name: contact.display_name(),
            uid: contact.uid.clone(),
            phones: contact.phones.len(),
            emails: contact.emails.len(),
            addresses: contact.addresses.len(),
            photo: contact.photo.is_some(),
            custom_fields: contact.custom_fields.len(),
        }
    }
}

/// Decodes every card in `content`.
pub fn inspect(path: &Path, content: &str) -> InspectResult {
    let mut result = InspectResult {
        path: path.display().to_string(),
        cards: 0,
        parsed: 0,
        failed: Vec::new(),
        contacts: Vec::new(),
    };
    for (index, decoded) in decode_all(content).into_iter().enumerate() {
        result.cards += 1;
        match decoded {
            Ok(contact) => {
                result.parsed += 1;
                result.contacts.push(CardSummary::from(&contact));
            }
            Err(err) => result.failed.push(CardFailure {
                card: index + 1,
                error: err.to_string(),
            }),
        }
    }
    result
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult {
    let content = fs::read_to_string(path)?;
    let result = inspect(path, &content);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("{}: {} card(s), {} parsed", result.path, result.cards, result.parsed);
    for contact in &result.contacts {
        let name = if contact.name.is_empty() { "(no name)" } else { &contact.name };
        print!("  {name}");
        if let Some(uid) = &contact.uid {
            print!(" [{uid}]");
        }
        println!(
            "  tel:{} email:{} adr:{}{}",
            contact.phones,
            contact.emails,
            contact.addresses,
            if contact.photo { " photo" } else { "" }
        );
    }
    for failure in &result.failed {
        println!("  card {}: {}", failure.card, failure.error);
    }
}
