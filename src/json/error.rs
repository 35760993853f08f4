//! Decode and encode error types.
//!
//! Decode errors are per-document data errors: they never affect the
//! resolution table and the caller may continue with the next document.
//! Encode errors are mostly programming errors (writing a subtype that was
//! never registered, unbalanced writer calls).

use super::reader::Token;

/// Errors raised while reading a document or resolving its discriminator.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed JSON at offset {offset} ({path}): {message}")]
    Syntax {
        message: &'static str,
        offset: usize,
        path: String,
    },
    #[error("expected {expected} but was {found} at path {path}")]
    UnexpectedToken {
        expected: &'static str,
        found: Token,
        path: String,
    },
    #[error("unexpected end of input at path {path}")]
    UnexpectedEof { path: String },
    #[error("cannot skip unexpected name '{name}' at path {path}")]
    UnexpectedKey { name: String, path: String },
    #[error("nesting too deep at path {path} (limit {limit})")]
    NestingTooDeep { limit: usize, path: String },
    #[error("unexpected null at path {path}")]
    UnexpectedNull { path: String },
    #[error("JSON document was not fully consumed (at path {path})")]
    NotFullyConsumed { path: String },
    #[error("missing label for key '{key}' (expected one of [{}])", .known_labels.join(", "))]
    MissingDiscriminator {
        key: String,
        known_labels: Vec<String>,
    },
    #[error(
        "expected one of [{}] for key '{key}' but found '{label}'. Register a subtype for this label.",
        .known_labels.join(", ")
    )]
    UnknownLabel {
        key: String,
        label: String,
        known_labels: Vec<String>,
    },
    #[error("invalid payload at path {path}: {source}")]
    Payload {
        path: String,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Custom(String),
}

/// Errors raised while writing a document.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(
        "expected one of [{}] but found subtype '{subtype}'. Register this subtype.",
        .known.join(", ")
    )]
    UnregisteredSubtype { subtype: String, known: Vec<String> },
    #[error("adapter for {expected} cannot encode subtype '{found}'")]
    SubtypeMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("field '{name}' collides with the discriminator key")]
    ReservedName { name: String },
    #[error("nesting problem: {0}")]
    Nesting(&'static str),
    #[error("numeric values must be finite, but was {0}")]
    NonFinite(f64),
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}
