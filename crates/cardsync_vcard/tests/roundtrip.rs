//! Encode/decode round trips over whole contacts.

use cardsync_vcard::{
    decode, decode_all, encode, encode_many, split_cards, Contact, CustomField, DateKind,
    EncodeOptions, ImHandle, ImportantDate, Photo, PostalAddress, TypedValue, MAX_LINE_OCTETS,
};
use proptest::prelude::*;

fn text() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[A-Za-z0-9 ,;:.'!éß\\\n-]{0,40}").expect("Invalid regex")
}

fn label() -> impl Strategy<Value = String> {
    prop::string::string_regex(r#"[A-Za-z :;,"^]{1,12}"#).expect("Invalid regex")
}

fn kind() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec!["cell", "home", "work", "home,voice"]))
        .prop_map(|k| k.map(str::to_string))
}

fn typed_values() -> impl Strategy<Value = Vec<TypedValue>> {
    prop::collection::vec(
        (kind(), text()).prop_map(|(kind, value)| TypedValue { kind, value }),
        0..3,
    )
}

fn address() -> impl Strategy<Value = PostalAddress> {
    (kind(), text(), text(), text(), text(), text(), text(), text()).prop_map(
        |(kind, po_box, extended, street, locality, region, postal_code, country)| PostalAddress {
            kind,
            po_box,
            extended,
            street,
            locality,
            region,
            postal_code,
            country,
        },
    )
}

fn date() -> impl Strategy<Value = ImportantDate> {
    let kind = prop_oneof![
        Just(DateKind::Birthday),
        Just(DateKind::Anniversary),
        label().prop_map(DateKind::Other),
    ];
    (kind, "[0-9]{4}-[0-9]{2}-[0-9]{2}").prop_map(|(kind, date)| ImportantDate { kind, date })
}

fn custom_field() -> impl Strategy<Value = CustomField> {
    let key = prop_oneof![
        "X-[A-Z]{1,8}",
        "[a-z][a-z ]{0,9}",
        Just("TEL".to_string()),
        Just("CATEGORIES".to_string()),
    ];
    (key, text()).prop_map(|(key, value)| CustomField { key, value })
}

fn photo() -> impl Strategy<Value = Photo> {
    (
        prop::sample::select(vec!["image/jpeg", "image/png"]),
        prop::collection::vec(any::<u8>(), 0..200),
    )
        .prop_map(|(media_type, data)| Photo {
            media_type: media_type.to_string(),
            data,
        })
}

prop_compose! {
    fn names()(
        prefix in text(),
        given_name in text(),
        additional_names in text(),
        family_name in text(),
        second_family_name in text(),
        suffix in text(),
    ) -> (String, String, String, String, String, String) {
        (prefix, given_name, additional_names, family_name, second_family_name, suffix)
    }
}

prop_compose! {
    fn contact()(
        uid in prop::option::of("[a-f0-9-]{1,36}"),
        (prefix, given_name, additional_names, family_name, second_family_name, suffix) in names(),
        nickname in prop::option::of(text()),
        organization in prop::option::of(text()),
        title in prop::option::of(text()),
        phones in typed_values(),
        emails in typed_values(),
        urls in typed_values(),
        im_handles in prop::collection::vec(
            ("[a-z]{1,8}", text()).prop_map(|(service, handle)| ImHandle { service, handle }),
            0..2,
        ),
        addresses in prop::collection::vec(address(), 0..2),
        dates in prop::collection::vec(date(), 0..3),
        notes in prop::option::of(text()),
        photo in prop::option::of(photo()),
        custom_fields in prop::collection::vec(custom_field(), 0..4),
    ) -> Contact {
        Contact {
            uid,
            prefix,
            given_name,
            additional_names,
            family_name,
            second_family_name,
            suffix,
            nickname,
            organization,
            title,
            phones,
            emails,
            urls,
            im_handles,
            addresses,
            dates,
            notes,
            photo,
            custom_fields,
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn decode_inverts_encode(contact in contact()) {
        let text = encode(&contact, &EncodeOptions::default());
        let decoded = decode(&text).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(decoded, contact);
    }

    #[test]
    fn encoded_lines_never_exceed_limit(contact in contact()) {
        let text = encode(&contact, &EncodeOptions::default());
        prop_assert!(text.ends_with("\r\n"));
        for line in text.split("\r\n") {
            prop_assert!(line.len() <= MAX_LINE_OCTETS);
        }
    }

    #[test]
    fn multi_card_files_split_and_decode(contacts in prop::collection::vec(contact(), 1..4)) {
        let text = encode_many(contacts.iter(), &EncodeOptions::default());

        let cards = split_cards(&text);
        prop_assert_eq!(cards.len(), contacts.len());

        let decoded: Vec<Contact> = decode_all(&text)
            .into_iter()
            .collect::<Result<_, _>>()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(decoded, contacts);
    }
}

#[test]
fn secondary_surname_round_trip() {
    let mut contact = Contact::named("Ana", "Belluco");
    contact.second_family_name = "De La Rosa".into();

    let text = encode(&contact, &EncodeOptions::default());
    assert!(text.contains("N:Belluco De La Rosa;Ana;;;\r\n"));

    let decoded = decode(&text).unwrap();
    assert_eq!(decoded.family_name, "Belluco");
    assert_eq!(decoded.second_family_name, "De La Rosa");
}

#[test]
fn third_party_card_decodes() {
    let text = concat!(
        "BEGIN:VCARD\r\n",
        "VERSION:3.0\r\n",
        "PRODID:-//Apple Inc.//iPhone OS 17.0//EN\r\n",
        "N:Appleseed;Johnny;;;\r\n",
        "FN:Johnny Appleseed\r\n",
        "ORG:Apple Inc.;\r\n",
        "item1.EMAIL;type=INTERNET;type=pref:johnny@example.com\r\n",
        "item1.X-ABLabel:_$!<Other>!$_\r\n",
        "TEL;type=CELL;type=VOICE;type=pref:+1 (408) 555-0100\r\n",
        "item2.ADR;type=HOME;type=pref:;;1 Infinite Loop;Cupertino;CA;95014;United St\r\n",
        " ates\r\n",
        "BDAY:1970-01-01\r\n",
        "REV:2024-01-01T00:00:00Z\r\n",
        "END:VCARD\r\n",
    );
    let contact = decode(text).unwrap();

    assert_eq!(contact.display_name(), "Johnny Appleseed");
    assert_eq!(contact.organization.as_deref(), Some("Apple Inc."));
    assert_eq!(contact.emails[0].kind.as_deref(), Some("internet,pref"));
    assert_eq!(contact.phones[0].value, "+1 (408) 555-0100");
    assert_eq!(contact.addresses[0].country, "United States");
    assert_eq!(contact.addresses[0].locality, "Cupertino");
    assert_eq!(contact.dates[0].kind, DateKind::Birthday);
    assert_eq!(contact.custom_field("X-ABLABEL"), Some("_$!<Other>!$_"));
}

#[test]
fn markdown_stripping_is_lossy() {
    let mut contact = Contact::named("A", "B");
    contact.notes = Some("**Met** at [conf](https://example.org)".into());

    let text = encode(&contact, &EncodeOptions::new().strip_markdown(true));
    let decoded = decode(&text).unwrap();
    assert_eq!(
        decoded.notes.as_deref(),
        Some("Met at conf (https://example.org)")
    );
}
