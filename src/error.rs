//! Error types for document parsing
//!
//! Two layers of failure exist:
//! - [`DocumentError`] is fatal to a whole source document (malformed XML, unreadable file).
//! - [`ParseError`] describes why a single record could not be built or committed.
//!   Record-level variants abort only the record being parsed.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that make a whole document unusable
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The XML is not well-formed
    #[error("Malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    /// The document has no root element
    #[error("Document has no root element")]
    MissingRoot,

    /// The root element is not the one expected for the document kind
    #[error("Unexpected root element '{found}', expected '{expected}'")]
    UnexpectedRoot { expected: String, found: String },

    /// IO error with path context
    #[error("IO error with {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while parsing or committing one record
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParseError {
    /// A mandatory attribute or element is missing
    #[error("{context}: required field '{field}' {reason}")]
    RequiredField {
        context: String,
        field: String,
        reason: String,
    },

    /// A value is present but semantically invalid
    #[error("{context}: invalid field '{field}' {reason}{}", .value.as_ref().map(|v| format!(" (got '{v}')")).unwrap_or_default())]
    FieldValidation {
        context: String,
        field: String,
        reason: String,
        value: Option<String>,
    },

    /// A structural contract of the schema was violated
    #[error("{context}: {element} {reason}")]
    Parser {
        context: String,
        element: String,
        reason: String,
    },

    /// An addressed entity or record does not exist in the current scope
    #[error("{what} not found: {key}")]
    NotFound { what: String, key: String },

    /// The persistence backend rejected the record's unit of work
    #[error("Storage error: {source}")]
    Storage {
        #[serde(serialize_with = "serialize_display")]
        source: StorageError,
    },
}

/// Result type for record parsing
pub type ParseResult<T> = Result<T, ParseError>;

fn serialize_display<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: std::fmt::Display,
{
    serializer.collect_str(value)
}

impl ParseError {
    /// Create a required-field error
    pub fn required(
        context: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RequiredField {
            context: context.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a field-validation error
    pub fn invalid(
        context: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::FieldValidation {
            context: context.into(),
            field: field.into(),
            reason: reason.into(),
            value: None,
        }
    }

    /// Create a field-validation error that cites the offending value
    pub fn invalid_value(
        context: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::FieldValidation {
            context: context.into(),
            field: field.into(),
            reason: reason.into(),
            value: Some(value.into()),
        }
    }

    /// Create a structural parser error
    pub fn parser(
        context: impl Into<String>,
        element: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Parser {
            context: context.into(),
            element: element.into(),
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            key: key.into(),
        }
    }

    /// Short name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::RequiredField { .. } => "RequiredFieldError",
            ParseError::FieldValidation { .. } => "FieldValidationError",
            ParseError::Parser { .. } => "ParserError",
            ParseError::NotFound { .. } => "NotFound",
            ParseError::Storage { .. } => "StorageError",
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ParseError::RequiredField { context, field, .. } if field == "xml:lang" => {
                format!(
                    "{self}\n\nHint: Set xml:lang on the narrative in {context} or on the record root."
                )
            }
            ParseError::RequiredField { field, .. } if field == "currency" => {
                format!(
                    "{self}\n\nHint: Set @currency on the value or @default-currency on the record root."
                )
            }
            ParseError::FieldValidation { value: Some(_), .. } => {
                format!("{self}\n\nHint: Check the code against the published codelist.")
            }
            _ => self.to_string(),
        }
    }
}

impl From<StorageError> for ParseError {
    fn from(err: StorageError) -> Self {
        ParseError::Storage { source: err }
    }
}
