//! vCard decoder.
//!
//! Accepts 2.1, 3.0 and 4.0 property syntax. Decoding happens in three
//! stages: physical lines are unfolded into logical lines (keeping the line
//! number of the first physical line), logical lines are split into
//! properties, and properties are mapped onto a [`Contact`].

use crate::contact::{
    Contact, CustomField, DateKind, ImHandle, ImportantDate, Photo, PostalAddress, TypedValue,
};
use crate::error::{ParseError, ParseResult};
use crate::{SECOND_LASTNAME_PROPERTY, VENDOR_CUSTOM_PROPERTY, VENDOR_DATE_PROPERTY};
use base64::Engine;

/// Decodes the first vCard in `text`.
pub fn decode(text: &str) -> ParseResult<Contact> {
    decode_all(text)
        .into_iter()
        .next()
        .unwrap_or_else(|| Err(ParseError::new(1, "no BEGIN:VCARD found")))
}

/// Decodes every vCard in `text`.
///
/// A malformed card yields an `Err` in its slot without affecting the
/// cards around it.
pub fn decode_all(text: &str) -> Vec<ParseResult<Contact>> {
    let lines = unfold(text);
    let mut results = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !is_marker(&lines[i].text, "BEGIN") {
            i += 1;
            continue;
        }
        let begin_line = lines[i].number;
        i += 1;
        let start = i;
        while i < lines.len()
            && !is_marker(&lines[i].text, "END")
            && !is_marker(&lines[i].text, "BEGIN")
        {
            i += 1;
        }
        if i >= lines.len() || is_marker(&lines[i].text, "BEGIN") {
            results.push(Err(ParseError::new(
                begin_line,
                "BEGIN:VCARD without matching END:VCARD",
            )));
            continue;
        }
        results.push(decode_card(&lines[start..i]));
        i += 1;
    }

    results
}

/// Splits a multi-card file into one text block per card.
///
/// Blocks keep their original physical lines, so a block can be stored
/// verbatim and decoded later. An unterminated trailing card is returned
/// as-is and will fail to decode.
pub fn split_cards(text: &str) -> Vec<String> {
    let mut cards = Vec::new();
    let mut current: Option<String> = None;

    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if is_marker(line, "BEGIN") {
            if let Some(unterminated) = current.take() {
                cards.push(unterminated);
            }
            current = Some(String::new());
        }
        if let Some(card) = current.as_mut() {
            card.push_str(line);
            card.push_str("\r\n");
            if is_marker(line, "END") {
                cards.extend(current.take());
            }
        }
    }
    cards.extend(current);
    cards
}

fn is_marker(line: &str, keyword: &str) -> bool {
    let line = line.trim_end();
    match line.split_once(':') {
        Some((key, value)) => {
            key.eq_ignore_ascii_case(keyword) && value.trim().eq_ignore_ascii_case("VCARD")
        }
        None => false,
    }
}

#[derive(Debug)]
struct LogicalLine {
    number: usize,
    text: String,
}

fn unfold(text: &str) -> Vec<LogicalLine> {
    let mut lines: Vec<LogicalLine> = Vec::new();
    let mut soft_break = false;

    for (idx, raw) in text.split('\n').enumerate() {
        let physical = raw.strip_suffix('\r').unwrap_or(raw);

        if soft_break {
            if let Some(last) = lines.last_mut() {
                last.text.push_str(physical);
                soft_break = take_soft_break(last);
                continue;
            }
        }

        if let Some(rest) = physical.strip_prefix(|c: char| c == ' ' || c == '\t') {
            if let Some(last) = lines.last_mut() {
                last.text.push_str(rest);
                soft_break = take_soft_break(last);
                continue;
            }
        }

        if physical.trim().is_empty() {
            continue;
        }

        let mut line = LogicalLine {
            number: idx + 1,
            text: physical.to_string(),
        };
        soft_break = take_soft_break(&mut line);
        lines.push(line);
    }

    lines
}

/// Removes a quoted-printable soft line break, reporting whether the next
/// physical line continues this one.
fn take_soft_break(line: &mut LogicalLine) -> bool {
    if !line.text.ends_with('=') {
        return false;
    }
    let head_end = find_unquoted(&line.text, ':').unwrap_or(line.text.len());
    let is_qp = line.text[..head_end]
        .to_ascii_uppercase()
        .contains("QUOTED-PRINTABLE");
    if is_qp && head_end < line.text.len() {
        line.text.pop();
        true
    } else {
        false
    }
}

#[derive(Debug)]
struct Property {
    line: usize,
    name: String,
    params: Vec<(String, String)>,
    value: String,
}

impl Property {
    fn parse(line: &LogicalLine) -> ParseResult<Self> {
        let colon = find_unquoted(&line.text, ':')
            .ok_or_else(|| ParseError::new(line.number, "missing ':' separator"))?;
        let (head, value) = (&line.text[..colon], &line.text[colon + 1..]);

        let mut parts = split_unquoted(head, ';').into_iter();
        let raw_name = parts.next().unwrap_or_default();
        let name = raw_name
            .rsplit('.')
            .next()
            .unwrap_or(raw_name)
            .trim()
            .to_ascii_uppercase();
        if name.is_empty() {
            return Err(ParseError::new(line.number, "empty property name"));
        }

        let mut params = Vec::new();
        for part in parts {
            if part.trim().is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((key, val)) => {
                    params.push((key.trim().to_ascii_uppercase(), decode_param_value(val)));
                }
                None => {
                    // vCard 2.1 bare parameter.
                    let bare = part.trim();
                    let key = match bare.to_ascii_uppercase().as_str() {
                        "QUOTED-PRINTABLE" | "BASE64" | "B" | "8BIT" | "7BIT" => "ENCODING",
                        _ => "TYPE",
                    };
                    params.push((key.to_string(), bare.to_string()));
                }
            }
        }

        Ok(Self {
            line: line.number,
            name,
            params,
            value: value.to_string(),
        })
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn types(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|(k, _)| k == "TYPE")
            .flat_map(|(_, v)| v.split(','))
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn kind(&self) -> Option<String> {
        let types = self.types();
        if types.is_empty() {
            None
        } else {
            Some(types.join(","))
        }
    }

    fn has_encoding(&self, names: &[&str]) -> bool {
        self.param("ENCODING")
            .is_some_and(|enc| names.iter().any(|n| enc.eq_ignore_ascii_case(n)))
    }

    /// Value with transfer encoding removed but text escapes intact.
    fn raw(&self) -> String {
        if self.has_encoding(&["QUOTED-PRINTABLE"]) {
            decode_quoted_printable(&self.value)
        } else {
            self.value.clone()
        }
    }

    fn text(&self) -> String {
        unescape_text(&self.raw())
    }

    fn components(&self) -> Vec<String> {
        split_structured(&self.raw())
            .iter()
            .map(|c| unescape_text(c))
            .collect()
    }

    fn typed(&self) -> TypedValue {
        TypedValue {
            kind: self.kind(),
            value: self.text(),
        }
    }
}

fn decode_card(lines: &[LogicalLine]) -> ParseResult<Contact> {
    let props = lines
        .iter()
        .map(Property::parse)
        .collect::<ParseResult<Vec<_>>>()?;

    let mut contact = Contact::default();
    let mut formatted_name = None;
    let mut saw_structured_name = false;
    let mut second_family_name = None;

    for prop in &props {
        match prop.name.as_str() {
            "VERSION" | "PRODID" | "REV" => {}
            "UID" => contact.uid = Some(prop.text()),
            "FN" => formatted_name = Some(prop.text()),
            "N" => {
                saw_structured_name = true;
                let mut parts = prop.components().into_iter();
                contact.family_name = parts.next().unwrap_or_default();
                contact.given_name = parts.next().unwrap_or_default();
                contact.additional_names = parts.next().unwrap_or_default();
                contact.prefix = parts.next().unwrap_or_default();
                contact.suffix = parts.next().unwrap_or_default();
            }
            "NICKNAME" => contact.nickname = Some(prop.text()),
            "ORG" => {
                let org = prop
                    .components()
                    .into_iter()
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                contact.organization = Some(org);
            }
            "TITLE" => contact.title = Some(prop.text()),
            "TEL" => contact.phones.push(prop.typed()),
            "EMAIL" => contact.emails.push(prop.typed()),
            "URL" => contact.urls.push(prop.typed()),
            "ADR" => {
                let mut parts = prop.components().into_iter();
                let mut next = || parts.next().unwrap_or_default();
                contact.addresses.push(PostalAddress {
                    kind: prop.kind(),
                    po_box: next(),
                    extended: next(),
                    street: next(),
                    locality: next(),
                    region: next(),
                    postal_code: next(),
                    country: next(),
                });
            }
            "IMPP" => contact.im_handles.push(decode_impp(prop)),
            "BDAY" => contact.dates.push(ImportantDate {
                kind: DateKind::Birthday,
                date: prop.text(),
            }),
            "ANNIVERSARY" => contact.dates.push(ImportantDate {
                kind: DateKind::Anniversary,
                date: prop.text(),
            }),
            "NOTE" => {
                let note = prop.text();
                contact.notes = Some(match contact.notes.take() {
                    Some(existing) => format!("{existing}\n{note}"),
                    None => note,
                });
            }
            "PHOTO" => {
                if let Some(photo) = decode_photo(prop)? {
                    contact.photo = Some(photo);
                }
            }
            name if name == SECOND_LASTNAME_PROPERTY => second_family_name = Some(prop.text()),
            name if name == VENDOR_DATE_PROPERTY => contact.dates.push(ImportantDate {
                kind: DateKind::Other(prop.param("X-LABEL").unwrap_or_default().to_string()),
                date: prop.text(),
            }),
            name if name == VENDOR_CUSTOM_PROPERTY => {
                let key = prop.param("X-LABEL").unwrap_or(name);
                contact.custom_fields.push(CustomField::new(key, prop.text()));
            }
            _ => contact
                .custom_fields
                .push(CustomField::new(prop.name.clone(), prop.text())),
        }
    }

    if !saw_structured_name {
        if let Some(name) = formatted_name {
            contact.given_name = name;
        }
    }

    if let Some(second) = second_family_name.filter(|s| !s.is_empty()) {
        split_secondary_surname(&mut contact, second);
    }

    Ok(contact)
}

/// Splits the secondary surname back out of the combined `N` family field.
///
/// Only applies when the field still ends with the secondary surname, so a
/// name edited by another client stays whole.
fn split_secondary_surname(contact: &mut Contact, second: String) {
    if contact.family_name == second {
        contact.family_name.clear();
        contact.second_family_name = second;
        return;
    }
    let suffix = format!(" {second}");
    if let Some(primary) = contact.family_name.strip_suffix(&suffix) {
        contact.family_name = primary.to_string();
        contact.second_family_name = second;
    }
}

fn decode_impp(prop: &Property) -> ImHandle {
    let value = prop.text();
    match prop.param("X-SERVICE-TYPE") {
        Some(service) => ImHandle {
            service: service.to_string(),
            handle: value,
        },
        None => match value.split_once(':') {
            Some((scheme, rest)) => ImHandle {
                service: scheme.to_string(),
                handle: rest.to_string(),
            },
            None => ImHandle {
                service: String::new(),
                handle: value,
            },
        },
    }
}

fn decode_photo(prop: &Property) -> ParseResult<Option<Photo>> {
    let invalid = |_| ParseError::new(prop.line, "invalid base64 photo data");

    if let Some(uri) = prop.value.strip_prefix("data:") {
        let Some((meta, payload)) = uri.split_once(',') else {
            return Err(ParseError::new(prop.line, "malformed data URI"));
        };
        let media_type = meta
            .split(';')
            .next()
            .filter(|m| !m.is_empty())
            .unwrap_or("image/jpeg")
            .to_ascii_lowercase();
        let data = decode_base64(payload).map_err(invalid)?;
        return Ok(Some(Photo { media_type, data }));
    }

    if prop.has_encoding(&["b", "BASE64"]) {
        let media_type = prop
            .param("MEDIATYPE")
            .map(str::to_ascii_lowercase)
            .or_else(|| prop.types().into_iter().next().map(|t| media_type_for(&t)))
            .unwrap_or_else(|| "image/jpeg".to_string());
        let data = decode_base64(&prop.value).map_err(invalid)?;
        return Ok(Some(Photo { media_type, data }));
    }

    // Photo by external reference; nothing to embed.
    Ok(None)
}

fn media_type_for(type_param: &str) -> String {
    if type_param.contains('/') {
        type_param.to_string()
    } else {
        format!("image/{type_param}")
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD.decode(compact)
}

fn find_unquoted(text: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    for (idx, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => return Some(idx),
            _ => {}
        }
    }
    None
}

fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == separator && !in_quotes => {
                parts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Reverses RFC 6868 caret escapes and strips surrounding quotes.
fn decode_param_value(value: &str) -> String {
    let unquoted = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value);

    let mut out = String::with_capacity(unquoted.len());
    let mut chars = unquoted.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '^' {
            out.push(ch);
            continue;
        }
        match chars.peek() {
            Some('^') => out.push('^'),
            Some('n') => out.push('\n'),
            Some('\'') => out.push('"'),
            _ => {
                out.push('^');
                continue;
            }
        }
        chars.next();
    }
    out
}

/// Splits a structured value on unescaped semicolons.
fn split_structured(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                current.push('\\');
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ';' => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Reverses text escaping (`\\`, `\,`, `\;`, `\n`, `\N`).
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(c @ ('\\' | ',' | ';' | ':')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn decode_quoted_printable(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'=' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
