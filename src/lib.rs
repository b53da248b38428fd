//! # treegram
//!
//! A streaming validator for regular tree grammars, built on Brzozowski
//! derivatives of content-model expressions.
//!
//! A compiled grammar is an immutable graph of expressions (choice,
//! sequence, interleave, repetition, element and attribute declarations,
//! typed values, named recursive patterns). The verifier consumes a
//! stream of start-tag / text / end-tag events and tracks, per open
//! element, the *residual* expression: what may still follow. On
//! mismatch it reports a specific diagnosis through the error sink,
//! substitutes a recovery state, and keeps validating, so one mistake in
//! a document yields one actionable message instead of a cascade.
//!
//! ## Example
//!
//! ```rust
//! use treegram::grammar::datatypes::builtin;
//! use treegram::grammar::GrammarBuilder;
//! use treegram::reader::validate_str;
//! use std::sync::Arc;
//!
//! // <doc> contains one or more <item x="<integer>"/>
//! let b = GrammarBuilder::new();
//! let x = b.attribute("x", b.data(builtin::integer()));
//! let item = b.element("item", x);
//! let doc = b.element("doc", b.one_or_more(item));
//! let grammar = Arc::new(b.build(doc));
//!
//! let violations = validate_str(&grammar, r#"<doc><item x="1"/></doc>"#).unwrap();
//! assert!(violations.is_empty());
//!
//! let violations = validate_str(&grammar, r#"<doc><item x="one"/></doc>"#).unwrap();
//! assert_eq!(violations.len(), 1);
//! ```
//!
//! Schema-syntax readers, a full datatype/facet library, and document
//! generation are out of scope; they are consumed (or consumable)
//! through the interfaces in [`grammar`].

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Utilities
pub mod namespaces;

// The compiled grammar model
pub mod grammar;

// The validation engine
pub mod verifier;

// Event front end
pub mod reader;

// Re-exports for convenience
pub use error::{Error, Location, Result, ValidityViolation};
pub use grammar::{Grammar, GrammarBuilder};
pub use verifier::{ErrorSink, StartTag, Verifier, VerifierOptions};

/// Version of the treegram library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
