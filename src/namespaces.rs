//! XML namespace handling
//!
//! This module provides qualified names (QNames) and the scoped
//! prefix-to-URI mapping the streaming verifier maintains while a
//! document is open.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// XML Namespace URI
pub type NamespaceUri = String;

/// Namespace prefix
pub type Prefix = String;

/// Qualified name (QName) - combination of namespace and local name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<NamespaceUri>,
    /// Local name
    pub local_name: String,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(|s| s.into()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local_name: local_name.into(),
        }
    }

    /// Namespace URI, with the empty string standing in for "no namespace"
    pub fn namespace_str(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => write!(f, "{{{}}}{}", ns, self.local_name),
            _ => write!(f, "{}", self.local_name),
        }
    }
}

/// Scoped namespace support for a streaming document
///
/// Prefix declarations are pushed with the element that carries them and
/// popped when that element closes. Lookup walks scopes innermost-first.
#[derive(Debug, Clone, Default)]
pub struct NamespaceStack {
    /// One map per open scope, innermost last
    scopes: Vec<HashMap<Prefix, NamespaceUri>>,
}

impl NamespaceStack {
    /// Create an empty namespace stack
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    /// Open a new scope (called at element start)
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Close the innermost scope (called at element end)
    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declare a prefix in the innermost scope
    ///
    /// The empty prefix declares the default namespace.
    pub fn declare_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        if self.scopes.is_empty() {
            self.scopes.push(HashMap::new());
        }
        self.scopes
            .last_mut()
            .expect("scope exists")
            .insert(prefix.into(), namespace.into());
    }

    /// Resolve a prefix to its namespace URI, innermost declaration wins
    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        for scope in self.scopes.iter().rev() {
            if let Some(uri) = scope.get(prefix) {
                return Some(uri.as_str());
            }
        }
        // the xml prefix is implicitly declared
        if prefix == "xml" {
            return Some("http://www.w3.org/XML/1998/namespace");
        }
        None
    }

    /// Resolve a prefixed name against the current scopes
    pub fn resolve(&self, prefixed_name: &str) -> Result<QName> {
        if let Some((prefix, local)) = prefixed_name.split_once(':') {
            let namespace = self
                .resolve_prefix(prefix)
                .ok_or_else(|| Error::Namespace(format!("Unknown prefix: {}", prefix)))?;
            Ok(QName::namespaced(namespace, local))
        } else {
            match self.resolve_prefix("") {
                Some(default_ns) if !default_ns.is_empty() => {
                    Ok(QName::namespaced(default_ns, prefixed_name))
                }
                _ => Ok(QName::local(prefixed_name)),
            }
        }
    }

    /// Number of open scopes
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_creation() {
        let qname = QName::namespaced("http://example.com", "element");
        assert_eq!(qname.namespace, Some("http://example.com".to_string()));
        assert_eq!(qname.local_name, "element");
    }

    #[test]
    fn test_qname_display() {
        let qname = QName::namespaced("http://example.com", "element");
        assert_eq!(qname.to_string(), "{http://example.com}element");

        let qname_local = QName::local("element");
        assert_eq!(qname_local.to_string(), "element");
    }

    #[test]
    fn test_scoped_resolution() {
        let mut ns = NamespaceStack::new();
        ns.push_scope();
        ns.declare_prefix("a", "http://outer");

        ns.push_scope();
        ns.declare_prefix("a", "http://inner");

        assert_eq!(ns.resolve_prefix("a"), Some("http://inner"));

        ns.pop_scope();
        assert_eq!(ns.resolve_prefix("a"), Some("http://outer"));
    }

    #[test]
    fn test_resolve_prefixed_name() {
        let mut ns = NamespaceStack::new();
        ns.push_scope();
        ns.declare_prefix("x", "http://example.com");

        let qname = ns.resolve("x:item").unwrap();
        assert_eq!(qname.namespace, Some("http://example.com".to_string()));
        assert_eq!(qname.local_name, "item");

        assert!(ns.resolve("missing:item").is_err());
    }

    #[test]
    fn test_default_namespace() {
        let mut ns = NamespaceStack::new();
        ns.push_scope();
        ns.declare_prefix("", "http://default");

        let qname = ns.resolve("item").unwrap();
        assert_eq!(qname.namespace, Some("http://default".to_string()));
    }

    #[test]
    fn test_xml_prefix_implicit() {
        let ns = NamespaceStack::new();
        assert_eq!(
            ns.resolve_prefix("xml"),
            Some("http://www.w3.org/XML/1998/namespace")
        );
    }
}
