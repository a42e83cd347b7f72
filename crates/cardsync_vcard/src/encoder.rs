//! vCard encoder.

use crate::contact::{Contact, DateKind, Photo, TypedValue};
use crate::{is_reserved_property, PRODID, SECOND_LASTNAME_PROPERTY, VENDOR_CUSTOM_PROPERTY, VENDOR_DATE_PROPERTY};
use base64::Engine;

/// Maximum octets per physical line before folding.
pub const MAX_LINE_OCTETS: usize = 75;

/// Options controlling what [`encode`] emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Embed the photo as base64.
    pub include_photo: bool,
    /// Emit custom/extension fields.
    pub include_custom_fields: bool,
    /// Strip markdown syntax from notes (lossy).
    pub strip_markdown: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            include_photo: true,
            include_custom_fields: true,
            strip_markdown: false,
        }
    }
}

impl EncodeOptions {
    /// Creates the default, lossless options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the photo is embedded.
    #[must_use]
    pub const fn include_photo(mut self, value: bool) -> Self {
        self.include_photo = value;
        self
    }

    /// Sets whether custom fields are emitted.
    #[must_use]
    pub const fn include_custom_fields(mut self, value: bool) -> Self {
        self.include_custom_fields = value;
        self
    }

    /// Sets whether markdown is stripped from notes.
    #[must_use]
    pub const fn strip_markdown(mut self, value: bool) -> Self {
        self.strip_markdown = value;
        self
    }
}

/// Encodes a contact as a vCard 3.0 block with CRLF line endings.
pub fn encode(contact: &Contact, options: &EncodeOptions) -> String {
    let mut encoder = VcardEncoder::new();
    encoder.encode_contact(contact, options);
    encoder.finish()
}

/// Encodes several contacts into one `.vcf` body.
pub fn encode_many<'a>(
    contacts: impl IntoIterator<Item = &'a Contact>,
    options: &EncodeOptions,
) -> String {
    let mut encoder = VcardEncoder::new();
    for contact in contacts {
        encoder.encode_contact(contact, options);
    }
    encoder.finish()
}

/// Streaming vCard writer.
///
/// Every property goes through [`VcardEncoder::property`], which takes care
/// of parameter quoting and line folding.
#[derive(Debug, Default)]
pub struct VcardEncoder {
    out: String,
}

impl VcardEncoder {
    /// Creates an empty encoder.
    pub fn new() -> Self {
        Self { out: String::new() }
    }

    /// Appends one `BEGIN:VCARD` ... `END:VCARD` block.
    pub fn encode_contact(&mut self, contact: &Contact, options: &EncodeOptions) {
        self.raw_line("BEGIN:VCARD");
        self.raw_line("VERSION:3.0");
        self.property("PRODID", &[], PRODID);

        if let Some(uid) = &contact.uid {
            self.property("UID", &[], &escape_text(uid));
        }

        let structured = [
            contact.combined_family_name(),
            contact.given_name.clone(),
            contact.additional_names.clone(),
            contact.prefix.clone(),
            contact.suffix.clone(),
        ]
        .iter()
        .map(|part| escape_text(part))
        .collect::<Vec<_>>()
        .join(";");
        self.property("N", &[], &structured);
        self.property("FN", &[], &escape_text(&formatted_name(contact)));

        if !contact.second_family_name.is_empty() {
            self.property(
                SECOND_LASTNAME_PROPERTY,
                &[],
                &escape_text(&contact.second_family_name),
            );
        }

        if let Some(nickname) = &contact.nickname {
            self.property("NICKNAME", &[], &escape_text(nickname));
        }
        if let Some(org) = &contact.organization {
            self.property("ORG", &[], &escape_text(org));
        }
        if let Some(title) = &contact.title {
            self.property("TITLE", &[], &escape_text(title));
        }

        for phone in &contact.phones {
            self.typed("TEL", phone);
        }
        for email in &contact.emails {
            self.typed("EMAIL", email);
        }

        for adr in &contact.addresses {
            let value = [
                &adr.po_box,
                &adr.extended,
                &adr.street,
                &adr.locality,
                &adr.region,
                &adr.postal_code,
                &adr.country,
            ]
            .iter()
            .map(|part| escape_text(part))
            .collect::<Vec<_>>()
            .join(";");
            let params = type_params(adr.kind.as_deref());
            self.property("ADR", &params, &value);
        }

        for url in &contact.urls {
            self.typed("URL", url);
        }

        for im in &contact.im_handles {
            self.property(
                "IMPP",
                &[("X-SERVICE-TYPE", param_value(&im.service))],
                &escape_text(&im.handle),
            );
        }

        for date in &contact.dates {
            match &date.kind {
                DateKind::Birthday => self.property("BDAY", &[], &escape_text(&date.date)),
                DateKind::Anniversary => {
                    self.property("ANNIVERSARY", &[], &escape_text(&date.date))
                }
                DateKind::Other(label) => self.property(
                    VENDOR_DATE_PROPERTY,
                    &[("X-LABEL", param_value(label))],
                    &escape_text(&date.date),
                ),
            }
        }

        if let Some(notes) = &contact.notes {
            let notes = if options.strip_markdown {
                strip_markdown(notes)
            } else {
                notes.clone()
            };
            self.property("NOTE", &[], &escape_text(&notes));
        }

        if options.include_photo {
            if let Some(photo) = &contact.photo {
                self.photo(photo);
            }
        }

        if options.include_custom_fields {
            for field in &contact.custom_fields {
                if is_verbatim_key(&field.key) {
                    self.property(&field.key, &[], &escape_text(&field.value));
                } else {
                    self.property(
                        VENDOR_CUSTOM_PROPERTY,
                        &[("X-LABEL", param_value(&field.key))],
                        &escape_text(&field.value),
                    );
                }
            }
        }

        self.raw_line("END:VCARD");
    }

    /// Returns the encoded text.
    pub fn finish(self) -> String {
        self.out
    }

    /// Writes a property whose value is already escaped.
    pub fn property(&mut self, name: &str, params: &[(&str, String)], value: &str) {
        let mut line = String::with_capacity(name.len() + value.len() + 16);
        line.push_str(name);
        for (key, val) in params {
            line.push(';');
            line.push_str(key);
            line.push('=');
            line.push_str(val);
        }
        line.push(':');
        line.push_str(value);
        fold_line(&line, &mut self.out);
    }

    fn typed(&mut self, name: &str, typed: &TypedValue) {
        let params = type_params(typed.kind.as_deref());
        self.property(name, &params, &escape_text(&typed.value));
    }

    fn photo(&mut self, photo: &Photo) {
        let data = base64::engine::general_purpose::STANDARD.encode(&photo.data);
        let media = match photo.media_type.strip_prefix("image/") {
            Some(subtype) => subtype.to_ascii_uppercase(),
            None => photo.media_type.clone(),
        };
        self.property(
            "PHOTO",
            &[("ENCODING", "b".to_string()), ("TYPE", param_value(&media))],
            &data,
        );
    }

    fn raw_line(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push_str("\r\n");
    }
}

fn formatted_name(contact: &Contact) -> String {
    let name = contact.display_name();
    if !name.is_empty() {
        return name;
    }
    contact
        .organization
        .clone()
        .or_else(|| contact.nickname.clone())
        .unwrap_or_default()
}

fn type_params(kind: Option<&str>) -> Vec<(&'static str, String)> {
    match kind {
        Some(kind) if !kind.is_empty() => {
            vec![("TYPE", param_value(&kind.to_ascii_uppercase()))]
        }
        _ => Vec::new(),
    }
}

/// Keys emitted as their own property instead of the labelled vendor form.
fn is_verbatim_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
        && !is_reserved_property(key)
}

/// Escapes a text value (`\\`, `\,`, `\;`, `\n`).
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\n' => out.push_str("\\n"),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            c => out.push(c),
        }
    }
    out
}

/// Encodes a parameter value with RFC 6868 caret escapes, quoting it when
/// it contains separators.
fn param_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '^' => encoded.push_str("^^"),
            '\n' => encoded.push_str("^n"),
            '"' => encoded.push_str("^'"),
            c => encoded.push(c),
        }
    }
    if encoded.contains(|c: char| matches!(c, ':' | ';' | ',')) {
        format!("\"{encoded}\"")
    } else {
        encoded
    }
}

/// Folds a logical line at [`MAX_LINE_OCTETS`] without splitting UTF-8
/// sequences. Continuation lines start with one space.
fn fold_line(line: &str, out: &mut String) {
    let mut used = 0;
    let mut limit = MAX_LINE_OCTETS;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if used + len > limit {
            out.push_str("\r\n ");
            used = 0;
            limit = MAX_LINE_OCTETS - 1;
        }
        out.push(ch);
        used += len;
    }
    out.push_str("\r\n");
}

/// Removes common markdown syntax from note text.
pub fn strip_markdown(text: &str) -> String {
    text.lines()
        .map(strip_markdown_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn strip_markdown_line(line: &str) -> String {
    let mut body = line.trim_start();

    let hashes = body.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&hashes) && body[hashes..].starts_with(' ') {
        body = body[hashes..].trim_start();
    }
    if let Some(rest) = body.strip_prefix("> ") {
        body = rest;
    }
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = body.strip_prefix(marker) {
            body = rest;
            break;
        }
    }

    strip_inline_markdown(body)
}

fn strip_inline_markdown(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let prev_space = i == 0 || chars[i - 1].is_whitespace();
        let next_space = i + 1 >= chars.len() || chars[i + 1].is_whitespace();

        match c {
            '[' => {
                if let Some((label, url, next)) = parse_link(&chars, i) {
                    out.push_str(&strip_inline_markdown(&label));
                    out.push_str(" (");
                    out.push_str(&url);
                    out.push(')');
                    i = next;
                    continue;
                }
                out.push(c);
            }
            '`' => {}
            '*' if !(prev_space && next_space) => {}
            '~' if chars.get(i + 1) == Some(&'~') => {
                i += 2;
                continue;
            }
            '_' => {
                let inner_word = i > 0
                    && chars[i - 1].is_alphanumeric()
                    && chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
                if inner_word {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

/// Parses `[label](url)` starting at `start`; returns the index after `)`.
fn parse_link(chars: &[char], start: usize) -> Option<(String, String, usize)> {
    let close = start + chars[start..].iter().position(|c| *c == ']')?;
    if chars.get(close + 1) != Some(&'(') {
        return None;
    }
    let end = close + 1 + chars[close + 1..].iter().position(|c| *c == ')')?;
    let label: String = chars[start + 1..close].iter().collect();
    let url: String = chars[close + 2..end].iter().collect();
    Some((label, url, end + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{CustomField, ImportantDate, PostalAddress};

    fn lines(text: &str) -> Vec<&str> {
        text.split("\r\n").filter(|l| !l.is_empty()).collect()
    }

    #[test]
    fn encodes_envelope_and_names() {
        let contact = Contact::named("John", "Smith");
        let text = encode(&contact, &EncodeOptions::default());
        let lines = lines(&text);

        assert_eq!(lines.first(), Some(&"BEGIN:VCARD"));
        assert_eq!(lines.get(1), Some(&"VERSION:3.0"));
        assert_eq!(lines.last(), Some(&"END:VCARD"));
        assert!(lines.contains(&"N:Smith;John;;;"));
        assert!(lines.contains(&"FN:John Smith"));
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn secondary_surname_is_folded_into_family_component() {
        let mut contact = Contact::named("Ana", "Belluco");
        contact.second_family_name = "De La Rosa".into();
        let text = encode(&contact, &EncodeOptions::default());

        assert!(text.contains("N:Belluco De La Rosa;Ana;;;\r\n"));
        assert!(text.contains("FN:Ana Belluco De La Rosa\r\n"));
        assert!(text.contains("X-CARDSYNC-SECOND-LASTNAME:De La Rosa\r\n"));
    }

    #[test]
    fn no_vendor_field_without_secondary_surname() {
        let text = encode(&Contact::named("Ana", "Belluco"), &EncodeOptions::default());
        assert!(!text.contains("SECOND-LASTNAME"));
    }

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
        assert_eq!(escape_text("x\r\ny"), "x\\ny");
    }

    #[test]
    fn folds_long_lines_at_75_octets() {
        let mut contact = Contact::named("A", "B");
        contact.notes = Some("x".repeat(200));
        let text = encode(&contact, &EncodeOptions::default());

        for line in text.split("\r\n") {
            assert!(line.len() <= MAX_LINE_OCTETS, "line too long: {}", line.len());
        }
        assert!(text.contains("\r\n x"));
    }

    #[test]
    fn folding_respects_utf8_boundaries() {
        let mut contact = Contact::named("A", "B");
        contact.notes = Some("é".repeat(100));
        let text = encode(&contact, &EncodeOptions::default());

        let note_lines: Vec<&str> = text
            .split("\r\n")
            .skip_while(|l| !l.starts_with("NOTE:"))
            .take_while(|l| l.starts_with("NOTE:") || l.starts_with(' '))
            .collect();
        assert!(note_lines.len() > 2);
        for line in &note_lines {
            assert!(line.len() <= MAX_LINE_OCTETS);
        }
        let rejoined: String = note_lines
            .iter()
            .map(|l| l.strip_prefix(' ').unwrap_or(l))
            .collect();
        assert_eq!(rejoined, format!("NOTE:{}", "é".repeat(100)));
    }

    #[test]
    fn photo_is_base64_and_folded() {
        let mut contact = Contact::named("A", "B");
        contact.photo = Some(Photo {
            media_type: "image/jpeg".into(),
            data: vec![0xAB; 300],
        });
        let text = encode(&contact, &EncodeOptions::default());

        assert!(text.contains("PHOTO;ENCODING=b;TYPE=JPEG:"));
        for line in text.split("\r\n") {
            assert!(line.len() <= MAX_LINE_OCTETS);
        }

        let without = encode(&contact, &EncodeOptions::new().include_photo(false));
        assert!(!without.contains("PHOTO"));
    }

    #[test]
    fn custom_fields_verbatim_or_labelled() {
        let mut contact = Contact::named("A", "B");
        contact.custom_fields = vec![
            CustomField::new("X-SHOE-SIZE", "42"),
            CustomField::new("Favorite color", "blue"),
            CustomField::new("TEL", "not a phone"),
        ];
        let text = encode(&contact, &EncodeOptions::default());

        assert!(text.contains("X-SHOE-SIZE:42\r\n"));
        assert!(text.contains("X-CARDSYNC-CUSTOM;X-LABEL=Favorite color:blue\r\n"));
        assert!(text.contains("X-CARDSYNC-CUSTOM;X-LABEL=TEL:not a phone\r\n"));

        let without = encode(&contact, &EncodeOptions::new().include_custom_fields(false));
        assert!(!without.contains("X-SHOE-SIZE"));
    }

    #[test]
    fn typed_values_and_addresses() {
        let mut contact = Contact::named("A", "B");
        contact.phones.push(TypedValue::new(Some("cell"), "+1 555 0100"));
        contact.emails.push(TypedValue::new(None, "a@example.com"));
        contact.addresses.push(PostalAddress {
            kind: Some("home".into()),
            street: "1 Main St".into(),
            locality: "Springfield".into(),
            country: "USA".into(),
            ..PostalAddress::default()
        });
        let text = encode(&contact, &EncodeOptions::default());

        assert!(text.contains("TEL;TYPE=CELL:+1 555 0100\r\n"));
        assert!(text.contains("EMAIL:a@example.com\r\n"));
        assert!(text.contains("ADR;TYPE=HOME:;;1 Main St;Springfield;;;USA\r\n"));
    }

    #[test]
    fn labelled_dates_quote_separators() {
        let mut contact = Contact::named("A", "B");
        contact.dates.push(ImportantDate {
            kind: DateKind::Other("First met; Paris".into()),
            date: "2015-06-01".into(),
        });
        contact.dates.push(ImportantDate {
            kind: DateKind::Birthday,
            date: "1990-05-01".into(),
        });
        let text = encode(&contact, &EncodeOptions::default());

        assert!(text.contains("X-CARDSYNC-DATE;X-LABEL=\"First met; Paris\":2015-06-01\r\n"));
        assert!(text.contains("BDAY:1990-05-01\r\n"));
    }

    #[test]
    fn formatted_name_falls_back_to_organization() {
        let contact = Contact {
            organization: Some("Acme".into()),
            ..Contact::default()
        };
        let text = encode(&contact, &EncodeOptions::default());
        assert!(text.contains("FN:Acme\r\n"));
    }

    #[test]
    fn strip_markdown_in_notes() {
        let mut contact = Contact::named("A", "B");
        contact.notes = Some("# Title\n- **bold** and _it_ see [site](https://x.io)".into());
        let text = encode(&contact, &EncodeOptions::new().strip_markdown(true));
        assert!(text.contains("NOTE:Title\\nbold and it see site (https://x.io)\r\n"));
    }

    #[test]
    fn strip_markdown_keeps_plain_text() {
        assert_eq!(strip_markdown("5 * 3 = 15"), "5 * 3 = 15");
        assert_eq!(strip_markdown("snake_case_name"), "snake_case_name");
        assert_eq!(strip_markdown("`code` ~~gone~~"), "code gone");
    }

    #[test]
    fn encode_many_concatenates_blocks() {
        let a = Contact::named("A", "One");
        let b = Contact::named("B", "Two");
        let text = encode_many([&a, &b], &EncodeOptions::default());
        assert_eq!(text.matches("BEGIN:VCARD").count(), 2);
        assert_eq!(text.matches("END:VCARD").count(), 2);
    }
}
