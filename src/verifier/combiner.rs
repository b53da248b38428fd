//! Content combiner
//!
//! A state expression may offer several element declarations whose name
//! classes all accept the same start tag (grammars with overlapping or
//! competing declarations). The combiner collects every declaration the
//! tag could satisfy, folds their content models into one combined
//! pattern for the child, and computes the continuation the parent
//! resumes with once the child closes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::grammar::datatypes::ValidityContext;
use crate::grammar::expr::{Expr, ExprId, ExpressionPool, RefId};
use crate::grammar::NameClass;

use super::attributes::AttributeFeeder;
use super::residual::ResidualCalculator;
use super::token::{StartTag, Token};

/// What the combiner checks while collecting candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombineMode {
    /// Require the tag name to be accepted by the declaration
    pub check_name: bool,
    /// Feed the tag's attributes into each candidate's content model
    pub feed_attributes: bool,
}

impl CombineMode {
    /// Normal child-acceptor construction: name and attributes
    pub const FULL: Self = Self {
        check_name: true,
        feed_attributes: true,
    };
    /// Name check only; used to tell "wrong name" from "bad attributes"
    pub const NAME_ONLY: Self = Self {
        check_name: true,
        feed_attributes: false,
    };
    /// Every element declaration reachable from the state; used by
    /// recovery and by expected-content diagnosis
    pub const ALL_ELEMENTS: Self = Self {
        check_name: false,
        feed_attributes: false,
    };
}

/// One element declaration that could accept the tag
#[derive(Debug, Clone)]
pub struct Concern {
    /// The Element node in the pool
    pub element: ExprId,
    /// Its name class, for candidate rendering
    pub name: Arc<NameClass>,
    /// Its raw content model (attributes not yet consumed)
    pub content: ExprId,
    /// Found under nested interleave: diagnosis quality degrades
    pub deep: bool,
}

/// Result of combining a state expression with a start tag
#[derive(Debug, Clone)]
pub struct Combined {
    /// Combined child content; `NullSet` means no candidate survived
    pub content: ExprId,
    /// What remains of the parent state once the child is consumed;
    /// absent when no candidate survived
    pub continuation: Option<ExprId>,
    /// The surviving candidates
    pub concerns: Vec<Concern>,
    /// True when any candidate sat under nested interleave
    pub complex: bool,
}

type ConcernKey = (ExprId, bool, String, String);

/// Combines competing element declarations for one validation session
///
/// The name-matching walk is deterministic over the immutable graph, so
/// its results are memoized per (state, tag name, mode). The cache is
/// session-local: the shared graph stays free of locked state.
#[derive(Debug, Default)]
pub struct ContentCombiner {
    concern_cache: HashMap<ConcernKey, Arc<Vec<Concern>>>,
}

impl ContentCombiner {
    /// Create a combiner with an empty memo
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop memoized results (between documents the graph is unchanged,
    /// so this is only needed when switching grammars)
    pub fn clear(&mut self) {
        self.concern_cache.clear();
    }

    /// Combine a state expression with a start tag
    pub fn combine(
        &mut self,
        pool: &ExpressionPool,
        state: ExprId,
        tag: &StartTag,
        mode: CombineMode,
        context: &dyn ValidityContext,
    ) -> Combined {
        let concerns = self.concerns(pool, state, tag, mode.check_name);
        let feeder = AttributeFeeder::new(pool);

        let mut survivors = Vec::new();
        let mut content = ExpressionPool::NULL_SET;
        let mut complex = false;

        for concern in concerns.iter() {
            let mut candidate = concern.content;
            if mode.feed_attributes {
                for (name, attribute) in &tag.attributes {
                    candidate = feeder.feed(
                        candidate,
                        name.namespace_str(),
                        &name.local_name,
                        &attribute.value,
                        context,
                    );
                    if candidate == ExpressionPool::NULL_SET {
                        break;
                    }
                }
                if candidate != ExpressionPool::NULL_SET {
                    candidate = feeder.prune(candidate);
                }
                if candidate == ExpressionPool::NULL_SET {
                    continue;
                }
            }
            complex |= concern.deep;
            survivors.push(concern.clone());
            content = pool.choice(content, candidate);
        }

        let continuation = if survivors.is_empty() {
            None
        } else {
            let matched: Vec<ExprId> = survivors.iter().map(|c| c.element).collect();
            let calc = ResidualCalculator::new(pool);
            Some(calc.residual(state, &Token::MatchedElements(&matched)))
        };

        Combined {
            content,
            continuation,
            concerns: survivors,
            complex,
        }
    }

    /// The element declarations reachable from `state` that accept the
    /// tag name (or all of them when `check_name` is off)
    pub fn concerns(
        &mut self,
        pool: &ExpressionPool,
        state: ExprId,
        tag: &StartTag,
        check_name: bool,
    ) -> Arc<Vec<Concern>> {
        let key: ConcernKey = if check_name {
            (state, true, tag.namespace.clone(), tag.local.clone())
        } else {
            (state, false, String::new(), String::new())
        };
        if let Some(hit) = self.concern_cache.get(&key) {
            return Arc::clone(hit);
        }

        let mut out = Vec::new();
        let mut visited = HashSet::new();
        Self::walk(
            pool,
            state,
            &tag.namespace,
            &tag.local,
            check_name,
            0,
            &mut visited,
            &mut out,
        );
        let entry = Arc::new(out);
        self.concern_cache.insert(key, Arc::clone(&entry));
        entry
    }

    #[allow(clippy::too_many_arguments)]
    fn walk(
        pool: &ExpressionPool,
        expr: ExprId,
        namespace: &str,
        local: &str,
        check_name: bool,
        interleave_depth: u32,
        visited: &mut HashSet<RefId>,
        out: &mut Vec<Concern>,
    ) {
        match pool.node(expr) {
            Expr::NullSet
            | Expr::Epsilon
            | Expr::AnyString
            | Expr::Value { .. }
            | Expr::Attribute { .. } => {}

            Expr::Element { name, content } => {
                if check_name && !name.accepts(namespace, local) {
                    return;
                }
                if out.iter().any(|c| c.element == expr) {
                    return;
                }
                out.push(Concern {
                    element: expr,
                    name,
                    content,
                    deep: interleave_depth > 1,
                });
            }

            Expr::Choice(a, b) => {
                Self::walk(pool, a, namespace, local, check_name, interleave_depth, visited, out);
                Self::walk(pool, b, namespace, local, check_name, interleave_depth, visited, out);
            }

            Expr::Sequence(a, b) => {
                Self::walk(pool, a, namespace, local, check_name, interleave_depth, visited, out);
                // the tail is only reachable when the head can match
                // zero further input
                if pool.is_epsilon_reducible(a) {
                    Self::walk(pool, b, namespace, local, check_name, interleave_depth, visited, out);
                }
            }

            Expr::Interleave(a, b) => {
                let depth = interleave_depth + 1;
                Self::walk(pool, a, namespace, local, check_name, depth, visited, out);
                Self::walk(pool, b, namespace, local, check_name, depth, visited, out);
            }

            Expr::OneOrMore(a) => {
                Self::walk(pool, a, namespace, local, check_name, interleave_depth, visited, out);
            }

            Expr::Ref(r) => {
                if !visited.insert(r) {
                    return;
                }
                if let Ok(target) = pool.ref_target(r) {
                    Self::walk(pool, target, namespace, local, check_name, interleave_depth, visited, out);
                }
            }

            Expr::Annotated { inner, .. } => {
                Self::walk(pool, inner, namespace, local, check_name, interleave_depth, visited, out);
            }
        }
    }
}
