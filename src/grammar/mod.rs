//! The compiled grammar model
//!
//! An immutable, shared graph of content-model expressions plus the
//! collaborators the validation engine consumes: name classes and
//! datatypes. Everything here is constructed before validation begins
//! and read-only afterwards.

pub mod builder;
pub mod datatypes;
pub mod expr;
pub mod nameclass;

pub use builder::GrammarBuilder;
pub use datatypes::{Datatype, DatatypeError, DatatypeRef, ValidityContext};
pub use expr::{Expr, ExprId, ExpressionPool, Grammar, RefId, StringCare};
pub use nameclass::NameClass;
