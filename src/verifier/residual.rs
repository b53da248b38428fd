//! Residual calculator
//!
//! Computes the Brzozowski derivative of an expression with respect to
//! one token: the expression describing what may still follow after the
//! token has been consumed. Pure over the immutable graph; the only
//! construction it performs is new Choice/Sequence/Interleave nodes
//! through the pool, which keeps the results shared and comparable
//! by id.

use std::collections::HashSet;

use crate::grammar::expr::{Expr, ExprId, ExpressionPool, RefId};
use crate::grammar::ExpressionPool as Pool;

use super::token::Token;

/// Derivative computation over one expression pool
pub struct ResidualCalculator<'g> {
    pool: &'g ExpressionPool,
}

impl<'g> ResidualCalculator<'g> {
    /// Create a calculator over the given pool
    pub fn new(pool: &'g ExpressionPool) -> Self {
        Self { pool }
    }

    /// The residual of `expr` with respect to `token`
    ///
    /// `NullSet` means no member of the expression's language begins
    /// with the token.
    pub fn residual(&self, expr: ExprId, token: &Token<'_>) -> ExprId {
        let mut visited = HashSet::new();
        self.calc(expr, token, &mut visited)
    }

    fn calc(&self, expr: ExprId, token: &Token<'_>, visited: &mut HashSet<RefId>) -> ExprId {
        let pool = self.pool;
        match pool.node(expr) {
            // epsilon accepts nothing further
            Expr::NullSet | Expr::Epsilon => Pool::NULL_SET,

            // any amount of text: consuming some leaves the rest
            Expr::AnyString => match token {
                Token::Text { .. } | Token::AnyText => Pool::ANY_STRING,
                _ => Pool::NULL_SET,
            },

            Expr::Choice(a, b) => {
                let ra = self.calc(a, token, visited);
                let rb = self.calc(b, token, visited);
                pool.choice(ra, rb)
            }

            Expr::Sequence(a, b) => {
                let ra = self.calc(a, token, visited);
                let head = pool.sequence(ra, b);
                if pool.is_epsilon_reducible(a) {
                    let rb = self.calc(b, token, visited);
                    pool.choice(head, rb)
                } else {
                    head
                }
            }

            Expr::Interleave(a, b) => {
                let ra = self.calc(a, token, visited);
                let rb = self.calc(b, token, visited);
                let left = pool.interleave(ra, b);
                let right = pool.interleave(a, rb);
                pool.choice(left, right)
            }

            Expr::OneOrMore(a) => {
                let ra = self.calc(a, token, visited);
                let rest = pool.choice(expr, Pool::EPSILON);
                pool.sequence(ra, rest)
            }

            Expr::Element { .. } => match token {
                Token::MatchedElements(ids) if ids.contains(&expr) => Pool::EPSILON,
                Token::AnyElement => Pool::EPSILON,
                _ => Pool::NULL_SET,
            },

            // attributes are consumed by the feeder, never by tokens
            Expr::Attribute { .. } => Pool::NULL_SET,

            Expr::Value { datatype, literal } => match token {
                Token::Text {
                    literal: text,
                    context,
                    ..
                } => {
                    let member = datatype.check_valid(text, *context).is_ok();
                    let pinned_ok = match &literal {
                        Some(fixed) => fixed.as_ref() == text.trim(),
                        None => true,
                    };
                    if member && pinned_ok {
                        Pool::EPSILON
                    } else {
                        Pool::NULL_SET
                    }
                }
                Token::AnyText => Pool::EPSILON,
                _ => Pool::NULL_SET,
            },

            Expr::Ref(r) => {
                if !visited.insert(r) {
                    // repeat visit through a cyclic reference: leave the
                    // node unchanged so the computation terminates
                    return expr;
                }
                match pool.ref_target(r) {
                    Ok(target) => self.calc(target, token, visited),
                    Err(_) => Pool::NULL_SET,
                }
            }

            Expr::Annotated { inner, .. } => self.calc(inner, token, visited),
        }
    }
}
