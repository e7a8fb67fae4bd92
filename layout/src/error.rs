//! Error types for layout operations

use std::fmt;
use thiserror::Error;

/// Error type for failures that abort a build, decode, or encode call.
///
/// Recoverable problems found while traversing a buffer are not errors: they are recorded as
/// [Diagnostic]s on the active context and the traversal continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("unexpected end of buffer: {len} bytes at offset {offset}")]
    EndOfBuffer { offset: usize, len: usize },
    #[error("unterminated string at offset {0}")]
    Unterminated(usize),
    #[error("member {0} does not have a fixed size")]
    UnsizedMember(String),
    #[error("array {0} has an element type without a fixed size")]
    UnsizedElement(String),
    #[error("{owner} refers to unknown field {field}")]
    UnknownField { owner: String, field: String },
    #[error("duplicate field: {0}")]
    DuplicateField(String),
    #[error("invalid source for {field}: {reason}")]
    InvalidSource { field: String, reason: String },
    #[error("invalid value in {0}: {1}")]
    InvalidValue(&'static str, String), // context, message
    #[error("type has no fixed size and no value to measure")]
    Unsized,
    #[error("schema {0} expects a record")]
    NotARecord(String),
    #[error("self reference outlived its schema")]
    Dangling,
    #[error("instances nested deeper than {0}")]
    TooDeep(usize),
}

/// A recoverable problem found while decoding or encoding.
///
/// `path` locates the problem using dotted member access and bracketed array indices, rooted
/// at `root` (e.g. `root.pixels[3].color`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
