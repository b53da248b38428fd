//! Grammar construction convenience layer
//!
//! Schema readers (RELAX, TREX, XSD, ...) are external collaborators:
//! whatever parses a schema ends up making these same calls against the
//! pool. The builder wraps the pool with the shorthand those readers,
//! the tests, and downstream tools all want: n-ary combinators,
//! optionality, mixed content, named patterns.

use super::datatypes::DatatypeRef;
use super::expr::{ExprId, ExpressionPool, Grammar, RefId};
use super::nameclass::NameClass;
use crate::error::Result;

/// Builds an expression graph and finishes it into a [`Grammar`]
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    pool: ExpressionPool,
}

impl GrammarBuilder {
    /// Create a builder with a fresh pool
    pub fn new() -> Self {
        Self {
            pool: ExpressionPool::new(),
        }
    }

    /// Direct access to the underlying pool
    pub fn pool(&self) -> &ExpressionPool {
        &self.pool
    }

    /// The empty-sequence pattern
    pub fn empty(&self) -> ExprId {
        ExpressionPool::EPSILON
    }

    /// The empty language
    pub fn not_allowed(&self) -> ExprId {
        ExpressionPool::NULL_SET
    }

    /// Any text
    pub fn text(&self) -> ExprId {
        ExpressionPool::ANY_STRING
    }

    /// A typed-value pattern
    pub fn data(&self, datatype: DatatypeRef) -> ExprId {
        self.pool.value(datatype, None)
    }

    /// A typed-value pattern pinned to one fixed literal
    pub fn literal(&self, datatype: DatatypeRef, token: &str) -> ExprId {
        self.pool.value(datatype, Some(token))
    }

    /// An element with a no-namespace simple name
    pub fn element(&self, local: &str, content: ExprId) -> ExprId {
        self.pool.element(NameClass::simple("", local), content)
    }

    /// An element with a namespaced simple name
    pub fn element_ns(&self, namespace: &str, local: &str, content: ExprId) -> ExprId {
        self.pool
            .element(NameClass::simple(namespace, local), content)
    }

    /// An element with an arbitrary name class
    pub fn element_nc(&self, name: NameClass, content: ExprId) -> ExprId {
        self.pool.element(name, content)
    }

    /// A required attribute with a no-namespace simple name
    pub fn attribute(&self, local: &str, value: ExprId) -> ExprId {
        self.pool.attribute(NameClass::simple("", local), value)
    }

    /// A required attribute with an arbitrary name class
    pub fn attribute_nc(&self, name: NameClass, value: ExprId) -> ExprId {
        self.pool.attribute(name, value)
    }

    /// An optional attribute with a no-namespace simple name
    pub fn optional_attribute(&self, local: &str, value: ExprId) -> ExprId {
        self.optional(self.attribute(local, value))
    }

    /// Makes any pattern optional
    pub fn optional(&self, expr: ExprId) -> ExprId {
        self.pool.choice(expr, ExpressionPool::EPSILON)
    }

    /// N-ary union
    pub fn choice(&self, exprs: &[ExprId]) -> ExprId {
        exprs
            .iter()
            .copied()
            .fold(ExpressionPool::NULL_SET, |acc, e| self.pool.choice(acc, e))
    }

    /// N-ary concatenation
    pub fn sequence(&self, exprs: &[ExprId]) -> ExprId {
        exprs
            .iter()
            .copied()
            .fold(ExpressionPool::EPSILON, |acc, e| self.pool.sequence(acc, e))
    }

    /// N-ary shuffle product
    pub fn interleave(&self, exprs: &[ExprId]) -> ExprId {
        exprs
            .iter()
            .copied()
            .fold(ExpressionPool::EPSILON, |acc, e| {
                self.pool.interleave(acc, e)
            })
    }

    /// One or more repetitions
    pub fn one_or_more(&self, expr: ExprId) -> ExprId {
        self.pool.one_or_more(expr)
    }

    /// Zero or more repetitions
    pub fn zero_or_more(&self, expr: ExprId) -> ExprId {
        self.optional(self.pool.one_or_more(expr))
    }

    /// Content interleaved with arbitrary text
    pub fn mixed(&self, expr: ExprId) -> ExprId {
        self.pool.interleave(expr, ExpressionPool::ANY_STRING)
    }

    /// Declare a named pattern; bind it later with [`bind`](Self::bind)
    pub fn define(&self, name: &str) -> RefId {
        self.pool.define_ref(name)
    }

    /// The pattern referring to a named definition
    pub fn refer(&self, r: RefId) -> ExprId {
        self.pool.reference(r)
    }

    /// Bind a named pattern to its target, exactly once
    pub fn bind(&self, r: RefId, target: ExprId) -> Result<()> {
        self.pool.bind_ref(r, target)
    }

    /// Finish construction
    pub fn build(self, start: ExprId) -> Grammar {
        Grammar::new(self.pool, start)
    }
}
