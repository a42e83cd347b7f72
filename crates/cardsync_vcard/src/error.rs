//! Error types for the vCard crate.

use thiserror::Error;

/// Result type for vCard decoding.
pub type ParseResult<T> = Result<T, ParseError>;

/// A vCard block could not be parsed.
///
/// `line` is the 1-based physical line of the input where the problem was
/// detected, so callers can report it or skip the offending card.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line number in the input.
    pub line: usize,
    /// Description of the problem.
    pub message: String,
}

impl ParseError {
    /// Creates a parse error for the given line.
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Errors raised when validating a user-supplied vCard file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// File extension is not `.vcf` or `.vcard`.
    #[error("unsupported file extension: {file_name}")]
    UnsupportedExtension {
        /// Name of the rejected file.
        file_name: String,
    },

    /// File does not contain a `BEGIN:VCARD` marker.
    #[error("file contains no vCard data")]
    MissingVcardMarker,
}
