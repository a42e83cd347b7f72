//! Benchmark fixtures.

use cardsync_dedupe::NamedEntry;
use cardsync_vcard::{Contact, CustomField, DateKind, ImportantDate, PostalAddress, TypedValue};
use rand::seq::SliceRandom;
use rand::Rng;

const GIVEN: &[&str] = &[
    "Ana", "Bruno", "Carla", "Diego", "Elena", "Fabio", "Gloria", "Hugo", "Irene", "Jorge",
    "Karla", "Lucas", "Marta", "Nicolas", "Olga", "Pablo",
];
const FAMILY: &[&str] = &[
    "Belluco", "Costa", "Dias", "Esteves", "Ferreira", "Gomes", "Herrera", "Ibarra", "Jimenez",
    "Lopes", "Moreno", "Navarro", "Ortega", "Pereira",
];

/// A contact with every commonly used field filled in.
pub fn full_contact(index: usize) -> Contact {
    let mut contact = Contact::named(GIVEN[index % GIVEN.len()], FAMILY[index % FAMILY.len()]);
    contact.uid = Some(format!("bench-{index:06}"));
    contact.second_family_name = "De La Rosa".into();
    contact.organization = Some("Acme; Research".into());
    contact.title = Some("Engineer".into());
    contact.phones = vec![
        TypedValue::new(Some("cell"), format!("+34 600 {index:06}")),
        TypedValue::new(Some("work"), "+34 910 000 000"),
    ];
    contact.emails = vec![TypedValue::new(Some("home"), format!("person{index}@example.com"))];
    contact.addresses = vec![PostalAddress {
        kind: Some("home".into()),
        street: "Calle Mayor, 1".into(),
        locality: "Madrid".into(),
        postal_code: "28013".into(),
        country: "Spain".into(),
        ..PostalAddress::default()
    }];
    contact.dates = vec![ImportantDate {
        kind: DateKind::Birthday,
        date: "1990-05-17".into(),
    }];
    contact.notes = Some("Met at the **conference**.\nFollow up in May.".into());
    contact.custom_fields = vec![CustomField::new("X-TEAM", "platform")];
    contact
}

/// `count` contacts with cycling names.
pub fn contacts(count: usize) -> Vec<Contact> {
    (0..count).map(full_contact).collect()
}

/// `count` name entries where roughly one in five is a near-duplicate
/// (one letter changed) of an earlier entry.
pub fn named_entries(count: usize) -> Vec<NamedEntry<usize>> {
    let mut rng = rand::thread_rng();
    let mut entries: Vec<NamedEntry<usize>> = Vec::with_capacity(count);
    for id in 0..count {
        if id > 0 && rng.gen_ratio(1, 5) {
            let original = &entries[rng.gen_range(0..entries.len())];
            let mut name: Vec<char> = original.name.chars().collect();
            let pos = rng.gen_range(0..name.len());
            name[pos] = *['a', 'e', 'o'].choose(&mut rng).unwrap_or(&'a');
            let surname = original.surname.clone();
            entries.push(NamedEntry::new(id, name.into_iter().collect::<String>(), surname));
        } else {
            let given = GIVEN.choose(&mut rng).unwrap_or(&"Ana");
            let family = FAMILY.choose(&mut rng).unwrap_or(&"Costa");
            entries.push(NamedEntry::new(id, format!("{given}{}", id % 97), *family));
        }
    }
    entries
}
