//! Error types for treegram
//!
//! Two kinds of failure flow through this crate and they never mix:
//! document errors, which are recoverable and reported as
//! [`ValidityViolation`] values through the error sink, and fatal
//! conditions ([`Error`]), which abort a validation run because the
//! grammar or the caller is broken, not the document.

use std::fmt;
use thiserror::Error;

/// Result type alias using treegram Error
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error type for treegram operations
///
/// None of these variants is produced by an invalid document. A document
/// that does not match the grammar keeps streaming and is reported through
/// the [`ValidityViolation`] side channel instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A continuation or required transition resolved to the empty
    /// language although grammar construction guaranteed it could not.
    /// Indicates a defective grammar or a bug, never a document error.
    #[error("grammar inconsistency: {0}")]
    GrammarInconsistency(String),

    /// A named pattern reference was used without being bound to a target
    #[error("unbound reference: {0}")]
    UnboundReference(String),

    /// A named pattern reference was bound more than once
    #[error("reference '{0}' is already bound")]
    ReferenceRebound(String),

    /// Event sequence violated the driver contract (e.g. characters
    /// before document start, unbalanced end tag)
    #[error("event order error: {0}")]
    EventOrder(String),

    /// Namespace error (undeclared prefix in the document)
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Resource limit exceeded while processing the document
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// XML parsing error from the event front end
    #[error("XML error: {0}")]
    Xml(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}

/// A position in the source document, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// 1-based line number
    pub line: u64,
    /// 1-based column number
    pub column: u64,
}

impl Location {
    /// Create a new location
    pub fn new(line: u64, column: u64) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A recoverable document error reported during validation
///
/// Violations carry the diagnosis produced at the point of failure plus
/// the document location the event source supplied. They are handed to
/// the error sink as they happen and also retained by the verifier for
/// post-hoc inspection.
#[derive(Debug, Clone)]
pub struct ValidityViolation {
    /// Human-readable diagnosis
    pub message: String,
    /// Where in the document the violation was detected
    pub location: Option<Location>,
}

impl ValidityViolation {
    /// Create a new violation
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Attach a document location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for ValidityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(f, "{}: {}", loc, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ValidityViolation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display() {
        let v = ValidityViolation::new("element 'foo' is not allowed here")
            .with_location(Location::new(12, 3));

        let msg = format!("{}", v);
        assert!(msg.contains("12:3"));
        assert!(msg.contains("not allowed here"));
    }

    #[test]
    fn test_violation_without_location() {
        let v = ValidityViolation::new("text is not allowed here");
        assert_eq!(format!("{}", v), "text is not allowed here");
    }

    #[test]
    fn test_fatal_error_display() {
        let err = Error::GrammarInconsistency("continuation is the empty language".into());
        assert!(format!("{}", err).starts_with("grammar inconsistency"));
    }
}
