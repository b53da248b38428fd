//! Properties of the expression algebra
//!
//! Random expression shapes are generated as recipes and instantiated
//! into a pool, then checked against the algebraic guarantees the
//! engine relies on.

use proptest::prelude::*;

use treegram::grammar::datatypes::{builtin, NullContext};
use treegram::grammar::expr::ExpressionPool;
use treegram::grammar::{ExprId, GrammarBuilder};
use treegram::verifier::combiner::{CombineMode, ContentCombiner};
use treegram::verifier::{ResidualCalculator, StartTag, Token};

/// A pool-independent description of an expression shape
#[derive(Debug, Clone)]
enum Recipe {
    Empty,
    Text,
    ElemA,
    ElemB,
    IntValue,
    Choice(Box<Recipe>, Box<Recipe>),
    Sequence(Box<Recipe>, Box<Recipe>),
    Interleave(Box<Recipe>, Box<Recipe>),
    OneOrMore(Box<Recipe>),
}

impl Recipe {
    fn build(&self, b: &GrammarBuilder) -> ExprId {
        match self {
            Recipe::Empty => b.empty(),
            Recipe::Text => b.text(),
            Recipe::ElemA => b.element("a", b.empty()),
            Recipe::ElemB => b.element("b", b.text()),
            Recipe::IntValue => b.data(builtin::integer()),
            Recipe::Choice(x, y) => {
                let built = [x.build(b), y.build(b)];
                b.choice(&built)
            }
            Recipe::Sequence(x, y) => {
                let built = [x.build(b), y.build(b)];
                b.sequence(&built)
            }
            Recipe::Interleave(x, y) => {
                let built = [x.build(b), y.build(b)];
                b.interleave(&built)
            }
            Recipe::OneOrMore(x) => b.one_or_more(x.build(b)),
        }
    }

    fn mentions_elem_a(&self) -> bool {
        match self {
            Recipe::ElemA => true,
            Recipe::Empty | Recipe::Text | Recipe::ElemB | Recipe::IntValue => false,
            Recipe::Choice(x, y) | Recipe::Sequence(x, y) | Recipe::Interleave(x, y) => {
                x.mentions_elem_a() || y.mentions_elem_a()
            }
            Recipe::OneOrMore(x) => x.mentions_elem_a(),
        }
    }
}

fn arb_recipe() -> impl Strategy<Value = Recipe> {
    let leaf = prop_oneof![
        Just(Recipe::Empty),
        Just(Recipe::Text),
        Just(Recipe::ElemA),
        Just(Recipe::ElemB),
        Just(Recipe::IntValue),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(x, y)| Recipe::Choice(Box::new(x), Box::new(y))),
            (inner.clone(), inner.clone())
                .prop_map(|(x, y)| Recipe::Sequence(Box::new(x), Box::new(y))),
            (inner.clone(), inner.clone())
                .prop_map(|(x, y)| Recipe::Interleave(Box::new(x), Box::new(y))),
            inner.prop_map(|x| Recipe::OneOrMore(Box::new(x))),
        ]
    })
}

proptest! {
    /// Hash-consing: building the same shape twice yields the same node
    #[test]
    fn construction_is_deterministic(recipe in arb_recipe()) {
        let b = GrammarBuilder::new();
        let first = recipe.build(&b);
        let second = recipe.build(&b);
        prop_assert_eq!(first, second);
    }

    /// Identical states derive to identical residuals (same node id)
    #[test]
    fn residuals_of_identical_states_are_identical(recipe in arb_recipe()) {
        let b = GrammarBuilder::new();
        let elem_a = b.element("a", b.empty());
        let first = recipe.build(&b);
        let second = recipe.build(&b);

        let calc = ResidualCalculator::new(b.pool());
        let matched = [elem_a];
        let token = Token::MatchedElements(&matched);
        prop_assert_eq!(calc.residual(first, &token), calc.residual(second, &token));
    }

    /// The derivative distributes over choice, by node identity
    #[test]
    fn residual_distributes_over_choice(x in arb_recipe(), y in arb_recipe()) {
        let b = GrammarBuilder::new();
        let elem_a = b.element("a", b.empty());
        let ex = x.build(&b);
        let ey = y.build(&b);
        let both = b.pool().choice(ex, ey);

        let calc = ResidualCalculator::new(b.pool());
        let matched = [elem_a];
        let token = Token::MatchedElements(&matched);

        let direct = calc.residual(both, &token);
        let rx = calc.residual(ex, &token);
        let ry = calc.residual(ey, &token);
        prop_assert_eq!(direct, b.pool().choice(rx, ry));
    }

    /// An element token derives to non-empty exactly when the combiner
    /// lists that element as a candidate: no expression rejects a tag
    /// the combiner would accept, and vice versa
    #[test]
    fn residual_agrees_with_combiner(recipe in arb_recipe()) {
        let b = GrammarBuilder::new();
        let elem_a = b.element("a", b.empty());
        let expr = recipe.build(&b);

        let calc = ResidualCalculator::new(b.pool());
        let matched = [elem_a];
        let derived = calc.residual(expr, &Token::MatchedElements(&matched));

        let mut combiner = ContentCombiner::new();
        let tag = StartTag::new("", "a", "a");
        let combined = combiner.combine(
            b.pool(),
            expr,
            &tag,
            CombineMode::NAME_ONLY,
            &NullContext,
        );
        let listed = combined.concerns.iter().any(|c| c.element == elem_a);

        prop_assert_eq!(derived != ExpressionPool::NULL_SET, listed);
    }

    /// If the shape never mentions element a, the token is rejected:
    /// no member of the language begins with it
    #[test]
    fn absent_element_token_derives_to_null(recipe in arb_recipe()) {
        prop_assume!(!recipe.mentions_elem_a());
        let b = GrammarBuilder::new();
        let elem_a = b.element("a", b.empty());
        let expr = recipe.build(&b);

        let calc = ResidualCalculator::new(b.pool());
        let matched = [elem_a];
        prop_assert_eq!(
            calc.residual(expr, &Token::MatchedElements(&matched)),
            ExpressionPool::NULL_SET
        );
    }

    /// One-or-more is epsilon-reducible exactly when its body is
    #[test]
    fn one_or_more_preserves_nullability(recipe in arb_recipe()) {
        let b = GrammarBuilder::new();
        let body = recipe.build(&b);
        let plus = b.one_or_more(body);
        prop_assert_eq!(
            b.pool().is_epsilon_reducible(plus),
            b.pool().is_epsilon_reducible(body)
        );
    }

    /// Residual computation never rewrites the input node
    #[test]
    fn residual_leaves_input_intact(recipe in arb_recipe()) {
        let b = GrammarBuilder::new();
        let elem_a = b.element("a", b.empty());
        let expr = recipe.build(&b);
        let nullable_before = b.pool().is_epsilon_reducible(expr);

        let calc = ResidualCalculator::new(b.pool());
        let matched = [elem_a];
        let _ = calc.residual(expr, &Token::MatchedElements(&matched));
        let ctx = NullContext;
        let _ = calc.residual(expr, &Token::text("17", &ctx));

        // the node is unchanged: same shape, same properties
        prop_assert_eq!(recipe.build(&b), expr);
        prop_assert_eq!(b.pool().is_epsilon_reducible(expr), nullable_before);
    }
}
