//! Token model
//!
//! Transient value objects representing one input event, matched against
//! the expression graph and discarded. Tokens never own graph nodes.

use indexmap::IndexMap;

use crate::grammar::datatypes::ValidityContext;
use crate::grammar::ExprId;
use crate::namespaces::QName;

/// One attribute as it appeared in the document
#[derive(Debug, Clone)]
pub struct AttributeValue {
    /// The attribute name as written (prefix included)
    pub qname: String,
    /// The attribute value, entity-resolved
    pub value: String,
}

/// A start tag with its attribute set
///
/// Attributes are keyed by resolved name and kept in document order.
#[derive(Debug, Clone)]
pub struct StartTag {
    /// Namespace URI, empty for no namespace
    pub namespace: String,
    /// Local name
    pub local: String,
    /// The tag name as written, for diagnostics
    pub qname: String,
    /// Attributes in document order
    pub attributes: IndexMap<QName, AttributeValue>,
}

impl StartTag {
    /// Create a tag with no attributes
    pub fn new(
        namespace: impl Into<String>,
        local: impl Into<String>,
        qname: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
            qname: qname.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Add an attribute (builder form, used heavily by tests)
    pub fn with_attribute(mut self, local: &str, value: &str) -> Self {
        self.add_attribute("", local, local, value);
        self
    }

    /// Add an attribute with full name information
    pub fn add_attribute(&mut self, namespace: &str, local: &str, qname: &str, value: &str) {
        let key = if namespace.is_empty() {
            QName::local(local)
        } else {
            QName::namespaced(namespace, local)
        };
        self.attributes.insert(
            key,
            AttributeValue {
                qname: qname.to_string(),
                value: value.to_string(),
            },
        );
    }
}

/// One token fed to the residual calculator
pub enum Token<'a> {
    /// A start tag that was matched against specific element
    /// declarations: exactly those declarations accept it
    MatchedElements(&'a [ExprId]),
    /// Wildcard element probe, used only during error recovery:
    /// every element declaration accepts it
    AnyElement,
    /// Character data to be checked against text constraints
    Text {
        /// The literal as buffered from the document
        literal: &'a str,
        /// Session context for datatype checks (prefixes, ID tracking)
        context: &'a dyn ValidityContext,
        /// Whitespace-only text may also be ignored where the content
        /// model has no use for it
        ignorable: bool,
    },
    /// Wildcard text probe: every text constraint is treated as
    /// satisfied. Used to decide whether any text is expected at all.
    AnyText,
}

impl<'a> Token<'a> {
    /// Build a text token, marking whitespace-only literals ignorable
    pub fn text(literal: &'a str, context: &'a dyn ValidityContext) -> Self {
        Token::Text {
            literal,
            context,
            ignorable: literal.trim().is_empty(),
        }
    }
}

impl std::fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::MatchedElements(ids) => f.debug_tuple("MatchedElements").field(ids).finish(),
            Token::AnyElement => write!(f, "AnyElement"),
            Token::Text {
                literal, ignorable, ..
            } => f
                .debug_struct("Text")
                .field("literal", literal)
                .field("ignorable", ignorable)
                .finish(),
            Token::AnyText => write!(f, "AnyText"),
        }
    }
}
