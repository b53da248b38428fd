//! Name classes
//!
//! A name class is a pure predicate deciding whether a
//! (namespace URI, local name) pair is accepted. Element and attribute
//! expressions each carry one, and the diagnosis module renders them
//! back into candidate suggestions when a tag is rejected.

/// Wildcard sentinel recognized by [`NameClass::LocalOnly`] in
/// document-type-style grammars.
pub const LOCAL_NAME_WILDCARD: &str = "*";

/// Predicate over a (namespace URI, local name) pair
///
/// The empty string namespace means "no namespace".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameClass {
    /// Accepts any name
    Any,
    /// Accepts exactly one (namespace, local) pair
    Simple {
        /// Namespace URI, empty for no namespace
        namespace: String,
        /// Local name
        local: String,
    },
    /// Accepts any local name within one namespace
    Namespace(String),
    /// Accepts whatever the inner class rejects
    Not(Box<NameClass>),
    /// Accepts what either side accepts
    Choice(Box<NameClass>, Box<NameClass>),
    /// Accepts what the first side accepts unless the second does
    Difference(Box<NameClass>, Box<NameClass>),
    /// Document-type-style matching: compares the local name only,
    /// ignoring the namespace unless it is the wildcard sentinel
    LocalOnly(String),
}

impl NameClass {
    /// Build a simple name class
    pub fn simple(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        NameClass::Simple {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Does this class accept the given (namespace, local) pair?
    pub fn accepts(&self, namespace: &str, local: &str) -> bool {
        match self {
            NameClass::Any => true,
            NameClass::Simple {
                namespace: ns,
                local: ln,
            } => ns == namespace && ln == local,
            NameClass::Namespace(ns) => ns == namespace,
            NameClass::Not(inner) => !inner.accepts(namespace, local),
            NameClass::Choice(a, b) => a.accepts(namespace, local) || b.accepts(namespace, local),
            NameClass::Difference(a, b) => {
                a.accepts(namespace, local) && !b.accepts(namespace, local)
            }
            NameClass::LocalOnly(ln) => ln == local || local == LOCAL_NAME_WILDCARD,
        }
    }
}

impl std::fmt::Display for NameClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameClass::Any => write!(f, "*"),
            NameClass::Simple { namespace, local } => {
                if namespace.is_empty() {
                    write!(f, "{}", local)
                } else {
                    write!(f, "{{{}}}{}", namespace, local)
                }
            }
            NameClass::Namespace(ns) => write!(f, "{{{}}}*", ns),
            NameClass::Not(inner) => write!(f, "not({})", inner),
            NameClass::Choice(a, b) => write!(f, "{}|{}", a, b),
            NameClass::Difference(a, b) => write!(f, "{}-{}", a, b),
            NameClass::LocalOnly(local) => write!(f, "{}", local),
        }
    }
}
