//! Expression graph and pool
//!
//! Content models are immutable nodes in an arena owned by
//! [`ExpressionPool`]. Nodes are referred to by [`ExprId`] and
//! hash-consed, so structurally equal subexpressions share one id. That
//! sharing is what makes the per-node memo cells (epsilon-reducibility,
//! string-care level) valid: both are pure functions of the shared
//! subgraph, so racing writers always store the same value and the cells
//! need no locks.
//!
//! Named patterns (`Ref`) live in a separate table. A target is bound
//! exactly once during grammar construction; cyclic and mutually
//! recursive bindings are legal, and every full-graph traversal guards
//! ref unwrapping with a visited set.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

use super::datatypes::DatatypeRef;
use super::nameclass::NameClass;

/// Index of an expression node in the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

/// Index of a named pattern in the reference table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefId(u32);

/// One content-model expression node
///
/// A closed union: every traversal in the crate is a `match` over these
/// variants, checked for exhaustiveness by the compiler.
#[derive(Debug, Clone)]
pub enum Expr {
    /// The empty language
    NullSet,
    /// The language containing only the empty sequence
    Epsilon,
    /// Zero or more characters of text, any content
    AnyString,
    /// Union of two languages
    Choice(ExprId, ExprId),
    /// Concatenation
    Sequence(ExprId, ExprId),
    /// Shuffle product (order-free combination)
    Interleave(ExprId, ExprId),
    /// One or more repetitions
    OneOrMore(ExprId),
    /// An element declaration: name class plus content model
    Element {
        /// Names this declaration accepts
        name: Arc<NameClass>,
        /// Content model validated against the element's subtree
        content: ExprId,
    },
    /// An attribute declaration: name class plus value model
    Attribute {
        /// Names this declaration accepts
        name: Arc<NameClass>,
        /// Model the attribute value must satisfy
        value: ExprId,
    },
    /// A typed literal: a datatype membership test, optionally pinned
    /// to one fixed literal
    Value {
        /// The datatype collaborator consulted for membership
        datatype: DatatypeRef,
        /// When present, the literal must also equal this token
        literal: Option<Arc<str>>,
    },
    /// A named, possibly recursive pattern; resolved through the pool
    Ref(RefId),
    /// A pattern carrying an opaque annotation, transparent to matching
    Annotated {
        /// The annotated pattern
        inner: ExprId,
        /// Reader-supplied payload, ignored by the engine
        note: Arc<str>,
    },
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        use Expr::*;
        match (self, other) {
            (NullSet, NullSet) | (Epsilon, Epsilon) | (AnyString, AnyString) => true,
            (Choice(a1, b1), Choice(a2, b2))
            | (Sequence(a1, b1), Sequence(a2, b2))
            | (Interleave(a1, b1), Interleave(a2, b2)) => a1 == a2 && b1 == b2,
            (OneOrMore(a1), OneOrMore(a2)) => a1 == a2,
            (
                Element {
                    name: n1,
                    content: c1,
                },
                Element {
                    name: n2,
                    content: c2,
                },
            ) => n1 == n2 && c1 == c2,
            (
                Attribute {
                    name: n1,
                    value: v1,
                },
                Attribute {
                    name: n2,
                    value: v2,
                },
            ) => n1 == n2 && v1 == v2,
            (
                Value {
                    datatype: d1,
                    literal: l1,
                },
                Value {
                    datatype: d2,
                    literal: l2,
                },
            ) => Arc::ptr_eq(d1, d2) && l1 == l2,
            (Ref(r1), Ref(r2)) => r1 == r2,
            (
                Annotated {
                    inner: i1,
                    note: n1,
                },
                Annotated {
                    inner: i2,
                    note: n2,
                },
            ) => i1 == i2 && n1 == n2,
            _ => false,
        }
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Expr::*;
        std::mem::discriminant(self).hash(state);
        match self {
            NullSet | Epsilon | AnyString => {}
            Choice(a, b) | Sequence(a, b) | Interleave(a, b) => {
                a.hash(state);
                b.hash(state);
            }
            OneOrMore(a) => a.hash(state),
            Element { name, content } => {
                name.hash(state);
                content.hash(state);
            }
            Attribute { name, value } => {
                name.hash(state);
                value.hash(state);
            }
            Value { datatype, literal } => {
                (Arc::as_ptr(datatype) as *const () as usize).hash(state);
                literal.hash(state);
            }
            Ref(r) => r.hash(state),
            Annotated { inner, note } => {
                inner.hash(state);
                note.hash(state);
            }
        }
    }
}

/// How an expression treats character data
///
/// Computed once per distinct node and cached there; see
/// `verifier::acceptor` for the calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StringCare {
    /// Text other than whitespace is an error
    Prohibited,
    /// Text is irrelevant and need not be buffered
    Ignore,
    /// Text must satisfy a typed-value constraint
    Strict,
}

struct RefEntry {
    name: String,
    target: Option<ExprId>,
}

struct PoolInner {
    nodes: Vec<Expr>,
    memo: HashMap<Expr, ExprId>,
    // per-node memo cells; 0 = not computed
    nullable: Vec<AtomicU8>,
    care: Vec<AtomicU8>,
    refs: Vec<RefEntry>,
}

/// Arena of hash-consed expression nodes
///
/// Shared by every validation session running against the grammar. Node
/// construction (including fresh Choice/Sequence nodes built while
/// computing residuals) synchronizes internally; the memo cells are
/// idempotent and lock-free.
pub struct ExpressionPool {
    inner: RwLock<PoolInner>,
}

impl Default for ExpressionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionPool {
    /// The empty language
    pub const NULL_SET: ExprId = ExprId(0);
    /// The language of the empty sequence
    pub const EPSILON: ExprId = ExprId(1);
    /// Any text
    pub const ANY_STRING: ExprId = ExprId(2);

    /// Create a pool seeded with the three constant nodes
    pub fn new() -> Self {
        let pool = Self {
            inner: RwLock::new(PoolInner {
                nodes: Vec::new(),
                memo: HashMap::new(),
                nullable: Vec::new(),
                care: Vec::new(),
                refs: Vec::new(),
            }),
        };
        assert_eq!(pool.intern(Expr::NullSet), Self::NULL_SET);
        assert_eq!(pool.intern(Expr::Epsilon), Self::EPSILON);
        assert_eq!(pool.intern(Expr::AnyString), Self::ANY_STRING);
        pool
    }

    fn intern(&self, expr: Expr) -> ExprId {
        if let Some(&id) = self.inner.read().expect("pool lock").memo.get(&expr) {
            return id;
        }
        let mut inner = self.inner.write().expect("pool lock");
        if let Some(&id) = inner.memo.get(&expr) {
            return id;
        }
        let id = ExprId(inner.nodes.len() as u32);
        inner.nodes.push(expr.clone());
        inner.nullable.push(AtomicU8::new(0));
        inner.care.push(AtomicU8::new(0));
        inner.memo.insert(expr, id);
        id
    }

    /// Fetch a node by id
    pub fn node(&self, id: ExprId) -> Expr {
        self.inner.read().expect("pool lock").nodes[id.0 as usize].clone()
    }

    /// Union. Absorbs NullSet, collapses duplicate branches.
    ///
    /// The right operand is flattened so choice chains stay left-leaning
    /// and never repeat a branch; without this, recovery unions grow
    /// without bound.
    pub fn choice(&self, a: ExprId, b: ExprId) -> ExprId {
        if a == Self::NULL_SET {
            return b;
        }
        if b == Self::NULL_SET || a == b {
            return a;
        }
        if let Expr::Choice(b1, b2) = self.node(b) {
            let left = self.choice(a, b1);
            return self.choice(left, b2);
        }
        if self.choice_contains(a, b) {
            return a;
        }
        self.intern(Expr::Choice(a, b))
    }

    fn choice_contains(&self, tree: ExprId, leaf: ExprId) -> bool {
        if tree == leaf {
            return true;
        }
        match self.node(tree) {
            Expr::Choice(x, y) => self.choice_contains(x, leaf) || self.choice_contains(y, leaf),
            _ => false,
        }
    }

    /// Concatenation. NullSet annihilates, Epsilon is the identity.
    pub fn sequence(&self, a: ExprId, b: ExprId) -> ExprId {
        if a == Self::NULL_SET || b == Self::NULL_SET {
            return Self::NULL_SET;
        }
        if a == Self::EPSILON {
            return b;
        }
        if b == Self::EPSILON {
            return a;
        }
        self.intern(Expr::Sequence(a, b))
    }

    /// Shuffle product. NullSet annihilates, Epsilon is the identity.
    pub fn interleave(&self, a: ExprId, b: ExprId) -> ExprId {
        if a == Self::NULL_SET || b == Self::NULL_SET {
            return Self::NULL_SET;
        }
        if a == Self::EPSILON {
            return b;
        }
        if b == Self::EPSILON {
            return a;
        }
        self.intern(Expr::Interleave(a, b))
    }

    /// One or more repetitions
    pub fn one_or_more(&self, a: ExprId) -> ExprId {
        if a == Self::NULL_SET || a == Self::EPSILON {
            return a;
        }
        if matches!(self.node(a), Expr::OneOrMore(_)) {
            return a;
        }
        self.intern(Expr::OneOrMore(a))
    }

    /// An element declaration node
    pub fn element(&self, name: NameClass, content: ExprId) -> ExprId {
        self.intern(Expr::Element {
            name: Arc::new(name),
            content,
        })
    }

    /// An attribute declaration node
    pub fn attribute(&self, name: NameClass, value: ExprId) -> ExprId {
        self.intern(Expr::Attribute {
            name: Arc::new(name),
            value,
        })
    }

    /// A typed-value node, optionally pinned to a fixed literal
    pub fn value(&self, datatype: DatatypeRef, literal: Option<&str>) -> ExprId {
        self.intern(Expr::Value {
            datatype,
            literal: literal.map(Arc::from),
        })
    }

    /// An annotation wrapper, transparent to matching
    pub fn annotated(&self, inner: ExprId, note: impl Into<Arc<str>>) -> ExprId {
        self.intern(Expr::Annotated {
            inner,
            note: note.into(),
        })
    }

    /// Create a named pattern slot. The target is bound later, exactly
    /// once, with [`bind_ref`](Self::bind_ref).
    pub fn define_ref(&self, name: impl Into<String>) -> RefId {
        let mut inner = self.inner.write().expect("pool lock");
        let id = RefId(inner.refs.len() as u32);
        inner.refs.push(RefEntry {
            name: name.into(),
            target: None,
        });
        id
    }

    /// The expression node referring to a named pattern
    pub fn reference(&self, r: RefId) -> ExprId {
        self.intern(Expr::Ref(r))
    }

    /// Bind a named pattern to its target. Rebinding is an error: after
    /// construction the graph is read-only.
    pub fn bind_ref(&self, r: RefId, target: ExprId) -> Result<()> {
        let mut inner = self.inner.write().expect("pool lock");
        let entry = &mut inner.refs[r.0 as usize];
        if entry.target.is_some() {
            return Err(Error::ReferenceRebound(entry.name.clone()));
        }
        entry.target = Some(target);
        Ok(())
    }

    /// Target of a named pattern
    pub fn ref_target(&self, r: RefId) -> Result<ExprId> {
        let inner = self.inner.read().expect("pool lock");
        let entry = &inner.refs[r.0 as usize];
        entry
            .target
            .ok_or_else(|| Error::UnboundReference(entry.name.clone()))
    }

    /// Name of a named pattern
    pub fn ref_name(&self, r: RefId) -> String {
        self.inner.read().expect("pool lock").refs[r.0 as usize]
            .name
            .clone()
    }

    fn cached_nullable(&self, id: ExprId) -> Option<bool> {
        match self.inner.read().expect("pool lock").nullable[id.0 as usize].load(Ordering::Relaxed)
        {
            0 => None,
            1 => Some(false),
            _ => Some(true),
        }
    }

    fn store_nullable(&self, id: ExprId, value: bool) {
        self.inner.read().expect("pool lock").nullable[id.0 as usize]
            .store(if value { 2 } else { 1 }, Ordering::Relaxed);
    }

    /// Cached string-care level, if computed
    pub fn cached_care(&self, id: ExprId) -> Option<StringCare> {
        match self.inner.read().expect("pool lock").care[id.0 as usize].load(Ordering::Relaxed) {
            1 => Some(StringCare::Prohibited),
            2 => Some(StringCare::Ignore),
            3 => Some(StringCare::Strict),
            _ => None,
        }
    }

    /// Store a computed string-care level. Idempotent: every caller
    /// computes the same value for the same node.
    pub fn store_care(&self, id: ExprId, care: StringCare) {
        let encoded = match care {
            StringCare::Prohibited => 1,
            StringCare::Ignore => 2,
            StringCare::Strict => 3,
        };
        self.inner.read().expect("pool lock").care[id.0 as usize]
            .store(encoded, Ordering::Relaxed);
    }

    /// Can this expression match with zero further input?
    pub fn is_epsilon_reducible(&self, id: ExprId) -> bool {
        if let Some(v) = self.cached_nullable(id) {
            return v;
        }
        let mut visited = HashSet::new();
        let mut clean = true;
        self.compute_nullable(id, &mut visited, &mut clean)
    }

    fn compute_nullable(
        &self,
        id: ExprId,
        visited: &mut HashSet<RefId>,
        clean: &mut bool,
    ) -> bool {
        if let Some(v) = self.cached_nullable(id) {
            return v;
        }
        let value = match self.node(id) {
            Expr::NullSet => false,
            Expr::Epsilon | Expr::AnyString => true,
            Expr::Choice(a, b) => {
                self.compute_nullable(a, visited, clean) | self.compute_nullable(b, visited, clean)
            }
            Expr::Sequence(a, b) | Expr::Interleave(a, b) => {
                self.compute_nullable(a, visited, clean) & self.compute_nullable(b, visited, clean)
            }
            Expr::OneOrMore(a) => self.compute_nullable(a, visited, clean),
            Expr::Element { .. } | Expr::Attribute { .. } | Expr::Value { .. } => false,
            Expr::Ref(r) => {
                if !visited.insert(r) {
                    // cycle: assume not reducible (least fixpoint), and
                    // taint the cache so the assumption is not persisted
                    *clean = false;
                    return false;
                }
                match self.ref_target(r) {
                    Ok(target) => self.compute_nullable(target, visited, clean),
                    Err(_) => false,
                }
            }
            Expr::Annotated { inner, .. } => self.compute_nullable(inner, visited, clean),
        };
        if *clean {
            self.store_nullable(id, value);
        }
        value
    }

    /// Number of nodes in the pool
    pub fn len(&self) -> usize {
        self.inner.read().expect("pool lock").nodes.len()
    }

    /// Whether the pool holds only the three constant nodes
    pub fn is_empty(&self) -> bool {
        self.len() <= 3
    }
}

impl std::fmt::Debug for ExpressionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionPool")
            .field("nodes", &self.len())
            .finish()
    }
}

/// A compiled grammar: the pool plus a start expression
///
/// Immutable after construction; share behind `Arc` across concurrently
/// running verifier sessions.
#[derive(Debug)]
pub struct Grammar {
    pool: ExpressionPool,
    start: ExprId,
}

impl Grammar {
    /// Wrap a pool and its start expression
    pub fn new(pool: ExpressionPool, start: ExprId) -> Self {
        Self { pool, start }
    }

    /// The expression pool
    pub fn pool(&self) -> &ExpressionPool {
        &self.pool
    }

    /// The start expression
    pub fn start(&self) -> ExprId {
        self.start
    }
}
