//! Acceptor: the per-element state machine
//!
//! One acceptor tracks the remaining-language state ("right language")
//! for one open element subtree. It is created from the parent's state
//! by the content combiner, stepped by text tokens, and handed back to
//! the parent as a continuation when the element closes. On failure it
//! produces a diagnosis and substitutes a recovery state so the stream
//! keeps validating.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::grammar::datatypes::ValidityContext;
use crate::grammar::expr::{Expr, ExprId, ExpressionPool, RefId, StringCare};

use super::attributes::AttributeFeeder;
use super::combiner::{CombineMode, ContentCombiner};
use super::diagnosis;
use super::residual::ResidualCalculator;
use super::token::{StartTag, Token};

/// Result of offering a start tag to an acceptor
#[derive(Debug)]
pub enum ChildOutcome {
    /// The tag was accepted; validate the element against this acceptor
    Accepted(Acceptor),
    /// The tag was rejected; the message diagnoses why, and the
    /// returned acceptor is a best-effort recovery state so the
    /// subtree and its siblings can still be validated
    Recovered {
        /// Best-effort child state
        child: Acceptor,
        /// Diagnosis for the error sink
        message: String,
    },
}

/// State machine for one open element
#[derive(Debug, Clone)]
pub struct Acceptor {
    expr: ExprId,
    continuation: Option<ExprId>,
}

impl Acceptor {
    /// An acceptor over a fresh state (the grammar's start expression)
    pub fn new(expr: ExprId) -> Self {
        Self {
            expr,
            continuation: None,
        }
    }

    fn with_continuation(expr: ExprId, continuation: ExprId) -> Self {
        Self {
            expr,
            continuation: Some(continuation),
        }
    }

    /// The current remaining-language expression
    pub fn expression(&self) -> ExprId {
        self.expr
    }

    /// The parent's state after this element is consumed
    pub fn continuation(&self) -> Option<ExprId> {
        self.continuation
    }

    /// Can this element close now?
    pub fn is_accept_state(&self, pool: &ExpressionPool) -> bool {
        pool.is_epsilon_reducible(self.expr)
    }

    /// How this state treats character data. Computed once per distinct
    /// node and cached on it; safe under concurrent recomputation
    /// because every caller derives the same value.
    pub fn string_care(&self, pool: &ExpressionPool) -> StringCare {
        string_care_of(pool, self.expr)
    }

    /// Offer a start tag. On success the child acceptor carries the
    /// continuation this acceptor transitions by when the child closes.
    pub fn create_child(
        &mut self,
        pool: &ExpressionPool,
        combiner: &mut ContentCombiner,
        tag: &StartTag,
        context: &dyn ValidityContext,
    ) -> ChildOutcome {
        let combined = combiner.combine(pool, self.expr, tag, CombineMode::FULL, context);
        if combined.content != ExpressionPool::NULL_SET {
            let continuation = combined
                .continuation
                .expect("survivors imply a continuation");
            return ChildOutcome::Accepted(Acceptor::with_continuation(
                combined.content,
                continuation,
            ));
        }

        let message = self.diagnose_start_tag(pool, combiner, tag, context);
        let child = self.build_recovery(pool, combiner, context);
        ChildOutcome::Recovered { child, message }
    }

    /// Two-tier diagnosis of a rejected start tag: wrong name, or name
    /// accepted but attributes not.
    fn diagnose_start_tag(
        &self,
        pool: &ExpressionPool,
        combiner: &mut ContentCombiner,
        tag: &StartTag,
        context: &dyn ValidityContext,
    ) -> String {
        let by_name = combiner.combine(pool, self.expr, tag, CombineMode::NAME_ONLY, context);

        if by_name.content == ExpressionPool::NULL_SET {
            // the name itself is wrong
            let reachable =
                combiner.combine(pool, self.expr, tag, CombineMode::ALL_ELEMENTS, context);
            if reachable.content == ExpressionPool::NULL_SET {
                return diagnosis::element_not_allowed(tag);
            }
            return diagnosis::bad_tag_name(tag, &reachable.concerns, reachable.complex)
                .unwrap_or_else(|| diagnosis::unexpected_element(tag));
        }

        // the name is accepted, so some attribute must be at fault
        let feeder = AttributeFeeder::new(pool);
        let mut state = by_name.content;
        for (name, attribute) in &tag.attributes {
            let fed = feeder.feed(
                state,
                name.namespace_str(),
                &name.local_name,
                &attribute.value,
                context,
            );
            if fed != ExpressionPool::NULL_SET {
                state = fed;
                continue;
            }

            // value may be wrong: probe with a wildcard value
            let (probed, bypassed) =
                feeder.feed_any_value(state, name.namespace_str(), &name.local_name);
            if probed == ExpressionPool::NULL_SET {
                return diagnosis::undeclared_attribute(tag, &attribute.qname);
            }
            return diagnosis::bad_attribute_value(
                pool,
                &bypassed,
                tag,
                &attribute.qname,
                &attribute.value,
                by_name.complex,
                context,
            )
            .unwrap_or_else(|| diagnosis::bad_attribute_value_generic(tag, &attribute.qname));
        }

        // every present attribute was accepted: a required one is missing
        diagnosis::missing_attribute(pool, state, tag, by_name.complex)
            .unwrap_or_else(|| diagnosis::missing_attribute_generic(tag))
    }

    /// Build the recovery acceptor and widen this state so subsequent
    /// siblings still validate. Two ways back into sync are unioned:
    /// ignore the bad element entirely, or pretend its content was
    /// accepted by one of the reachable declarations.
    fn build_recovery(
        &mut self,
        pool: &ExpressionPool,
        combiner: &mut ContentCombiner,
        context: &dyn ValidityContext,
    ) -> Acceptor {
        let probe_tag = StartTag::new("", "*", "*");
        let combined_here =
            combiner.combine(pool, self.expr, &probe_tag, CombineMode::ALL_ELEMENTS, context);

        let calc = ResidualCalculator::new(pool);
        let after_skip = calc.residual(self.expr, &Token::AnyElement);
        let combined_after =
            combiner.combine(pool, after_skip, &probe_tag, CombineMode::ALL_ELEMENTS, context);

        self.expr = pool.choice(self.expr, after_skip);

        let continuation = merge_continuations(
            pool,
            combined_here.continuation,
            combined_after.continuation,
        )
        .unwrap_or(self.expr);

        let feeder = AttributeFeeder::new(pool);
        let mut content = pool.choice(combined_here.content, combined_after.content);
        content = feeder.remove(content);
        if content == ExpressionPool::NULL_SET {
            // nothing reachable to pretend with; accept an empty subtree
            // so one error never becomes a rejection loop
            content = ExpressionPool::EPSILON;
        }

        Acceptor::with_continuation(content, continuation)
    }

    /// Consume buffered character data. On failure the expression keeps
    /// an accepting path: the union with the wildcard-text residual
    /// stands in for "this text was one of the expected tokens".
    pub fn step_text(
        &mut self,
        pool: &ExpressionPool,
        literal: &str,
        context: &dyn ValidityContext,
    ) -> std::result::Result<(), String> {
        let calc = ResidualCalculator::new(pool);
        let token = Token::text(literal, context);
        let mut residual = calc.residual(self.expr, &token);
        if matches!(token, Token::Text { ignorable: true, .. }) {
            // incidental whitespace may also leave the state in place
            residual = pool.choice(residual, self.expr);
        }

        if residual != ExpressionPool::NULL_SET {
            self.expr = residual;
            return Ok(());
        }

        let recovery = calc.residual(self.expr, &Token::AnyText);
        if recovery == ExpressionPool::NULL_SET {
            // no text constraint reachable at all; the expression is
            // left untouched, which recovers by ignoring the token
            return Err(diagnosis::text_not_allowed());
        }

        let message = diagnosis::bad_literal(pool, self.expr, literal, context)
            .unwrap_or_else(diagnosis::bad_literal_generic);
        self.expr = pool.choice(self.expr, recovery);
        Err(message)
    }

    /// Transition by a closing child's continuation. A NullSet
    /// continuation means the grammar broke its own guarantee; that is
    /// fatal, not a document error.
    pub fn step_by_continuation(&mut self, continuation: ExprId) -> Result<()> {
        if continuation == ExpressionPool::NULL_SET {
            return Err(Error::GrammarInconsistency(
                "continuation resolved to the empty language".into(),
            ));
        }
        self.expr = continuation;
        Ok(())
    }

    /// Diagnosis for an element closing before its content is complete
    pub fn diagnose_incomplete(
        &self,
        pool: &ExpressionPool,
        combiner: &mut ContentCombiner,
        qname: &str,
        context: &dyn ValidityContext,
    ) -> String {
        let probe_tag = StartTag::new("", "*", "*");
        let reachable =
            combiner.combine(pool, self.expr, &probe_tag, CombineMode::ALL_ELEMENTS, context);
        diagnosis::incomplete_content(qname, &reachable.concerns, reachable.complex)
            .unwrap_or_else(|| diagnosis::incomplete_content_generic(qname))
    }
}

fn merge_continuations(
    pool: &ExpressionPool,
    a: Option<ExprId>,
    b: Option<ExprId>,
) -> Option<ExprId> {
    let keep = |e: Option<ExprId>| e.filter(|&id| id != ExpressionPool::NULL_SET);
    match (keep(a), keep(b)) {
        (Some(x), Some(y)) => Some(pool.choice(x, y)),
        (Some(x), None) => Some(x),
        (None, Some(y)) => Some(y),
        (None, None) => None,
    }
}

/// String-care level of an expression, cached on the node
pub fn string_care_of(pool: &ExpressionPool, expr: ExprId) -> StringCare {
    if let Some(cached) = pool.cached_care(expr) {
        return cached;
    }
    let mut visited = HashSet::new();
    let care = calc_care(pool, expr, &mut visited);
    pool.store_care(expr, care);
    care
}

fn calc_care(pool: &ExpressionPool, expr: ExprId, visited: &mut HashSet<RefId>) -> StringCare {
    match pool.node(expr) {
        Expr::NullSet | Expr::Epsilon | Expr::Element { .. } | Expr::Attribute { .. } => {
            StringCare::Prohibited
        }
        Expr::AnyString => StringCare::Ignore,
        Expr::Value { .. } => StringCare::Strict,
        Expr::Choice(a, b) | Expr::Sequence(a, b) | Expr::Interleave(a, b) => {
            calc_care(pool, a, visited).max(calc_care(pool, b, visited))
        }
        Expr::OneOrMore(a) => calc_care(pool, a, visited),
        Expr::Ref(r) => {
            if !visited.insert(r) {
                return StringCare::Prohibited;
            }
            match pool.ref_target(r) {
                Ok(target) => calc_care(pool, target, visited),
                Err(_) => StringCare::Prohibited,
            }
        }
        Expr::Annotated { inner, .. } => calc_care(pool, inner, visited),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::datatypes::{builtin, NullContext};
    use crate::grammar::GrammarBuilder;

    #[test]
    fn test_accept_and_close() {
        let b = GrammarBuilder::new();
        let child = b.element("child", b.empty());
        let root_content = b.one_or_more(child);
        let root = b.element("root", root_content);

        let mut combiner = ContentCombiner::new();
        let mut top = Acceptor::new(root);
        assert!(!top.is_accept_state(b.pool()));

        let tag = StartTag::new("", "root", "root");
        let outcome = top.create_child(b.pool(), &mut combiner, &tag, &NullContext);
        let mut inside = match outcome {
            ChildOutcome::Accepted(a) => a,
            ChildOutcome::Recovered { message, .. } => panic!("rejected: {}", message),
        };

        // one <child/> satisfies the one-or-more
        let child_tag = StartTag::new("", "child", "child");
        let child_acceptor =
            match inside.create_child(b.pool(), &mut combiner, &child_tag, &NullContext) {
                ChildOutcome::Accepted(a) => a,
                ChildOutcome::Recovered { message, .. } => panic!("rejected: {}", message),
            };
        assert!(child_acceptor.is_accept_state(b.pool()));
        inside
            .step_by_continuation(child_acceptor.continuation().unwrap())
            .unwrap();
        assert!(inside.is_accept_state(b.pool()));
    }

    #[test]
    fn test_rejection_produces_recovery() {
        let b = GrammarBuilder::new();
        let only_a = b.element("a", b.empty());
        let mut acceptor = Acceptor::new(only_a);
        let mut combiner = ContentCombiner::new();

        let tag = StartTag::new("", "b", "b");
        match acceptor.create_child(b.pool(), &mut combiner, &tag, &NullContext) {
            ChildOutcome::Accepted(_) => panic!("b must not be accepted"),
            ChildOutcome::Recovered { child, message } => {
                assert!(message.contains('b'));
                // the recovery child can close immediately
                assert!(child.is_accept_state(b.pool()));
                // and the widened parent state still accepts a valid <a>
                let a_tag = StartTag::new("", "a", "a");
                assert!(matches!(
                    acceptor.create_child(b.pool(), &mut combiner, &a_tag, &NullContext),
                    ChildOutcome::Accepted(_)
                ));
            }
        }
    }

    #[test]
    fn test_step_text_strict() {
        let b = GrammarBuilder::new();
        let int = b.data(builtin::integer());
        let mut acceptor = Acceptor::new(int);
        assert_eq!(acceptor.string_care(b.pool()), StringCare::Strict);

        assert!(acceptor.step_text(b.pool(), "42", &NullContext).is_ok());
        assert!(acceptor.is_accept_state(b.pool()));
    }

    #[test]
    fn test_step_text_failure_keeps_accepting_path() {
        let b = GrammarBuilder::new();
        let int = b.data(builtin::integer());
        let mut acceptor = Acceptor::new(int);

        let err = acceptor
            .step_text(b.pool(), "forty-two", &NullContext)
            .unwrap_err();
        assert!(err.contains("forty-two"));
        // recovery pretends one of the expected tokens was seen
        assert!(acceptor.is_accept_state(b.pool()));
    }

    #[test]
    fn test_text_where_none_allowed() {
        let b = GrammarBuilder::new();
        let elem_only = b.element("a", b.empty());
        let mut acceptor = Acceptor::new(elem_only);
        assert_eq!(acceptor.string_care(b.pool()), StringCare::Prohibited);

        let before = acceptor.expression();
        let err = acceptor
            .step_text(b.pool(), "stray", &NullContext)
            .unwrap_err();
        assert!(err.contains("not allowed"));
        // the token is ignored: state untouched
        assert_eq!(acceptor.expression(), before);
    }

    #[test]
    fn test_string_care_levels() {
        let b = GrammarBuilder::new();
        let elem = b.element("a", b.empty());
        assert_eq!(string_care_of(b.pool(), elem), StringCare::Prohibited);

        let mixed = b.mixed(b.zero_or_more(elem));
        assert_eq!(string_care_of(b.pool(), mixed), StringCare::Ignore);

        let typed = b.data(builtin::decimal());
        assert_eq!(string_care_of(b.pool(), typed), StringCare::Strict);

        // cached on the node now
        assert_eq!(b.pool().cached_care(mixed), Some(StringCare::Ignore));
    }

    #[test]
    fn test_null_continuation_is_fatal() {
        let b = GrammarBuilder::new();
        let mut acceptor = Acceptor::new(b.element("a", b.empty()));
        let err = acceptor
            .step_by_continuation(ExpressionPool::NULL_SET)
            .unwrap_err();
        assert!(matches!(err, Error::GrammarInconsistency(_)));
    }
}
