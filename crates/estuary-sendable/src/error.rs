//! Sendable parsing and projection errors.

use estuary_types::ParseTagError;

/// Errors raised when parsing or projecting a sendable.
#[derive(Debug, thiserror::Error)]
pub enum SendableError {
    /// A required top-level field is missing from the stored entry.
    #[error("sendable {id:?} is missing field {field:?}")]
    MissingField { id: String, field: &'static str },

    /// The body does not contain the requested key.
    #[error("sendable body doesn't contain key {0:?}")]
    MissingBodyKey(&'static str),

    /// A projection was attempted on a sendable of a different kind.
    #[error("expected a {expected:?} sendable, found {found:?}")]
    KindMismatch {
        expected: &'static str,
        found: String,
    },

    /// A body sub-type tag failed to parse.
    #[error(transparent)]
    Tag(#[from] ParseTagError),
}
