//! Attribute-feeding helpers
//!
//! Attribute declarations live inside content-model expressions.
//! Consuming a start tag means feeding each of its attributes into the
//! candidate content model (attributes commute, so a match may be found
//! on either side of a Sequence or Interleave), then resolving the
//! attribute declarations left over: pruning turns them into NullSet so
//! branches still requiring an attribute die, removing turns them into
//! Epsilon during error recovery, and picking projects an expression
//! onto its attribute-only residue for missing-attribute diagnosis.

use std::collections::HashSet;

use crate::grammar::datatypes::ValidityContext;
use crate::grammar::expr::{Expr, ExprId, ExpressionPool, RefId};

use super::residual::ResidualCalculator;
use super::token::Token;

enum FeedValue<'a> {
    /// Check the literal against the declared value model
    Literal(&'a str, &'a dyn ValidityContext),
    /// Wildcard probe: accept any value, collecting the value models
    /// that were bypassed so diagnosis can inspect them
    Any,
}

/// Rewrites content expressions around attribute consumption
pub struct AttributeFeeder<'g> {
    pool: &'g ExpressionPool,
}

impl<'g> AttributeFeeder<'g> {
    /// Create a feeder over the given pool
    pub fn new(pool: &'g ExpressionPool) -> Self {
        Self { pool }
    }

    /// Consume one attribute, checking its value. `NullSet` means no
    /// declaration in the expression accepts the attribute.
    pub fn feed(
        &self,
        expr: ExprId,
        namespace: &str,
        local: &str,
        value: &str,
        context: &dyn ValidityContext,
    ) -> ExprId {
        let mut visited = HashSet::new();
        let mut bypassed = Vec::new();
        self.feed_rec(
            expr,
            namespace,
            local,
            &FeedValue::Literal(value, context),
            &mut bypassed,
            &mut visited,
        )
    }

    /// Consume one attribute accepting any value. Returns the rewritten
    /// expression plus the value models the wildcard bypassed; `NullSet`
    /// means the attribute is not declared at all.
    pub fn feed_any_value(
        &self,
        expr: ExprId,
        namespace: &str,
        local: &str,
    ) -> (ExprId, Vec<ExprId>) {
        let mut visited = HashSet::new();
        let mut bypassed = Vec::new();
        let result = self.feed_rec(
            expr,
            namespace,
            local,
            &FeedValue::Any,
            &mut bypassed,
            &mut visited,
        );
        (result, bypassed)
    }

    fn feed_rec(
        &self,
        expr: ExprId,
        namespace: &str,
        local: &str,
        value: &FeedValue<'_>,
        bypassed: &mut Vec<ExprId>,
        visited: &mut HashSet<RefId>,
    ) -> ExprId {
        let pool = self.pool;
        match pool.node(expr) {
            Expr::NullSet
            | Expr::Epsilon
            | Expr::AnyString
            | Expr::Element { .. }
            | Expr::Value { .. } => ExpressionPool::NULL_SET,

            Expr::Attribute {
                name,
                value: value_model,
            } => {
                if !name.accepts(namespace, local) {
                    return ExpressionPool::NULL_SET;
                }
                match value {
                    FeedValue::Literal(literal, context) => {
                        if self.value_accepts(value_model, literal, *context) {
                            ExpressionPool::EPSILON
                        } else {
                            ExpressionPool::NULL_SET
                        }
                    }
                    FeedValue::Any => {
                        bypassed.push(value_model);
                        ExpressionPool::EPSILON
                    }
                }
            }

            Expr::Choice(a, b) => {
                let ra = self.feed_rec(a, namespace, local, value, bypassed, visited);
                let rb = self.feed_rec(b, namespace, local, value, bypassed, visited);
                pool.choice(ra, rb)
            }

            Expr::Sequence(a, b) => {
                let ra = self.feed_rec(a, namespace, local, value, bypassed, visited);
                let rb = self.feed_rec(b, namespace, local, value, bypassed, visited);
                let left = pool.sequence(ra, b);
                let right = pool.sequence(a, rb);
                pool.choice(left, right)
            }

            Expr::Interleave(a, b) => {
                let ra = self.feed_rec(a, namespace, local, value, bypassed, visited);
                let rb = self.feed_rec(b, namespace, local, value, bypassed, visited);
                let left = pool.interleave(ra, b);
                let right = pool.interleave(a, rb);
                pool.choice(left, right)
            }

            Expr::OneOrMore(a) => {
                let ra = self.feed_rec(a, namespace, local, value, bypassed, visited);
                let rest = pool.choice(expr, ExpressionPool::EPSILON);
                pool.sequence(ra, rest)
            }

            Expr::Ref(r) => {
                if !visited.insert(r) {
                    return ExpressionPool::NULL_SET;
                }
                match pool.ref_target(r) {
                    Ok(target) => self.feed_rec(target, namespace, local, value, bypassed, visited),
                    Err(_) => ExpressionPool::NULL_SET,
                }
            }

            Expr::Annotated { inner, .. } => {
                self.feed_rec(inner, namespace, local, value, bypassed, visited)
            }
        }
    }

    fn value_accepts(&self, value_model: ExprId, literal: &str, context: &dyn ValidityContext) -> bool {
        let calc = ResidualCalculator::new(self.pool);
        let residual = calc.residual(value_model, &Token::text(literal, context));
        self.pool.is_epsilon_reducible(residual)
    }

    /// Replace every unconsumed attribute declaration with NullSet
    pub fn prune(&self, expr: ExprId) -> ExprId {
        let mut visited = HashSet::new();
        self.rewrite(expr, ExpressionPool::NULL_SET, &mut visited)
    }

    /// Replace every unconsumed attribute declaration with Epsilon
    pub fn remove(&self, expr: ExprId) -> ExprId {
        let mut visited = HashSet::new();
        self.rewrite(expr, ExpressionPool::EPSILON, &mut visited)
    }

    fn rewrite(&self, expr: ExprId, replacement: ExprId, visited: &mut HashSet<RefId>) -> ExprId {
        let pool = self.pool;
        match pool.node(expr) {
            Expr::NullSet
            | Expr::Epsilon
            | Expr::AnyString
            | Expr::Element { .. }
            | Expr::Value { .. } => expr,

            Expr::Attribute { .. } => replacement,

            Expr::Choice(a, b) => {
                let ra = self.rewrite(a, replacement, visited);
                let rb = self.rewrite(b, replacement, visited);
                pool.choice(ra, rb)
            }
            Expr::Sequence(a, b) => {
                let ra = self.rewrite(a, replacement, visited);
                let rb = self.rewrite(b, replacement, visited);
                pool.sequence(ra, rb)
            }
            Expr::Interleave(a, b) => {
                let ra = self.rewrite(a, replacement, visited);
                let rb = self.rewrite(b, replacement, visited);
                pool.interleave(ra, rb)
            }
            Expr::OneOrMore(a) => {
                let ra = self.rewrite(a, replacement, visited);
                pool.one_or_more(ra)
            }
            Expr::Ref(r) => {
                if !visited.insert(r) {
                    return expr;
                }
                match pool.ref_target(r) {
                    Ok(target) => self.rewrite(target, replacement, visited),
                    Err(_) => expr,
                }
            }
            Expr::Annotated { inner, .. } => self.rewrite(inner, replacement, visited),
        }
    }

    /// Project an expression onto its attribute-only residue: element
    /// and text content collapses to Epsilon, attribute structure stays.
    /// Epsilon-reducible output means no attribute is required.
    pub fn pick(&self, expr: ExprId) -> ExprId {
        let mut visited = HashSet::new();
        self.pick_rec(expr, &mut visited)
    }

    fn pick_rec(&self, expr: ExprId, visited: &mut HashSet<RefId>) -> ExprId {
        let pool = self.pool;
        match pool.node(expr) {
            Expr::NullSet => expr,
            Expr::Epsilon | Expr::AnyString | Expr::Element { .. } | Expr::Value { .. } => {
                ExpressionPool::EPSILON
            }
            Expr::Attribute { .. } => expr,

            Expr::Choice(a, b) => {
                let ra = self.pick_rec(a, visited);
                let rb = self.pick_rec(b, visited);
                pool.choice(ra, rb)
            }
            Expr::Sequence(a, b) => {
                let ra = self.pick_rec(a, visited);
                let rb = self.pick_rec(b, visited);
                pool.sequence(ra, rb)
            }
            Expr::Interleave(a, b) => {
                let ra = self.pick_rec(a, visited);
                let rb = self.pick_rec(b, visited);
                pool.interleave(ra, rb)
            }
            Expr::OneOrMore(a) => {
                let ra = self.pick_rec(a, visited);
                pool.one_or_more(ra)
            }
            Expr::Ref(r) => {
                if !visited.insert(r) {
                    return ExpressionPool::EPSILON;
                }
                match pool.ref_target(r) {
                    Ok(target) => self.pick_rec(target, visited),
                    Err(_) => ExpressionPool::EPSILON,
                }
            }
            Expr::Annotated { inner, .. } => self.pick_rec(inner, visited),
        }
    }
}
