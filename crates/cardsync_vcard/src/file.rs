//! Helpers for `.vcf` files supplied by users or produced for download.

use crate::error::UploadError;
use chrono::NaiveDate;

/// Accepted file extensions, lower-case.
pub const ALLOWED_EXTENSIONS: &[&str] = &["vcf", "vcard"];

/// Checks that an uploaded file looks like vCard data.
///
/// The extension is compared case-insensitively; the content must contain
/// a `BEGIN:VCARD` line somewhere.
pub fn validate_upload(file_name: &str, content: &str) -> Result<(), UploadError> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    let allowed = extension
        .as_deref()
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext));
    if !allowed {
        return Err(UploadError::UnsupportedExtension {
            file_name: file_name.to_string(),
        });
    }

    let has_marker = content
        .lines()
        .any(|line| line.trim().eq_ignore_ascii_case("BEGIN:VCARD"));
    if !has_marker {
        return Err(UploadError::MissingVcardMarker);
    }

    Ok(())
}

/// Builds a download file name such as `family-contacts-2026-10-18.vcf`.
pub fn export_file_name(name: &str, date: NaiveDate) -> String {
    let slug = slugify(name);
    let slug = if slug.is_empty() { "contacts" } else { &slug };
    format!("{slug}-{}.vcf", date.format("%Y-%m-%d"))
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_vcf_and_vcard() {
        let body = "BEGIN:VCARD\nEND:VCARD\n";
        assert!(validate_upload("people.vcf", body).is_ok());
        assert!(validate_upload("People.VCARD", body).is_ok());
    }

    #[test]
    fn rejects_other_extensions() {
        let err = validate_upload("people.csv", "BEGIN:VCARD").unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedExtension { .. }));
        assert!(validate_upload("vcf", "BEGIN:VCARD").is_err());
    }

    #[test]
    fn rejects_missing_marker() {
        let err = validate_upload("people.vcf", "FN:nobody").unwrap_err();
        assert_eq!(err, UploadError::MissingVcardMarker);
    }

    #[test]
    fn export_names_are_slugged_and_dated() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(
            export_file_name("My Contacts!", date),
            "my-contacts-2026-10-18.vcf"
        );
        assert_eq!(export_file_name("  ***  ", date), "contacts-2026-10-18.vcf");
        assert_eq!(export_file_name("Zoë's list", date), "zo-s-list-2026-10-18.vcf");
    }
}
