//! Property-based tests for the logic substrate.
//!
//! These validate the substitution and subsumption invariants that the rule
//! engine depends on, over randomly generated vocabularies.

use irale_logic::{Literal, Predicate, State, Substitution, Term};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn arb_const_name() -> impl Strategy<Value = String> {
    "[a-e][0-9]?".prop_map(|s| s.to_string())
}

fn arb_var_name() -> impl Strategy<Value = String> {
    "[X-Z][0-9]?".prop_map(|s| s.to_string())
}

fn arb_const() -> impl Strategy<Value = Term> {
    arb_const_name().prop_map(Term::constant)
}

fn arb_term() -> impl Strategy<Value = Term> {
    prop_oneof![
        arb_var_name().prop_map(Term::var),
        arb_const_name().prop_map(Term::constant),
    ]
}

/// Distinct (variable, constant) binding pairs.
fn arb_injective_pairs() -> impl Strategy<Value = Vec<(Term, Term)>> {
    prop::collection::btree_map(arb_var_name(), arb_const_name(), 0..5).prop_map(|m| {
        let mut used = BTreeSet::new();
        m.into_iter()
            .filter(|(_, v)| used.insert(v.clone()))
            .map(|(k, v)| (Term::var(k), Term::constant(v)))
            .collect()
    })
}

fn arb_fact() -> impl Strategy<Value = Literal> {
    (0usize..3, prop::collection::vec(arb_const(), 2))
        .prop_map(|(p, args)| Predicate::new(format!("p{p}"), 2).of(args))
}

fn arb_state() -> impl Strategy<Value = State> {
    prop::collection::vec(arb_fact(), 0..8).prop_map(State::from_facts)
}

proptest! {
    /// For injective σ, applying the inverse after σ fixes every source.
    #[test]
    fn prop_inverse_round_trips(pairs in arb_injective_pairs()) {
        let mut sub = Substitution::new();
        for (from, to) in &pairs {
            prop_assert!(sub.set_safe(from, to));
        }
        let inv = sub.inverse();
        for (from, _) in &pairs {
            prop_assert_eq!(inv.apply_term(&sub.apply_term(from)), from.clone());
        }
    }

    /// set_safe never produces a non-injective mapping in injective mode.
    #[test]
    fn prop_set_safe_preserves_injectivity(
        attempts in prop::collection::vec((arb_term(), arb_const()), 0..10)
    ) {
        let mut sub = Substitution::new();
        for (from, to) in &attempts {
            sub.set_safe(from, to);
        }
        prop_assert!(sub.check_injective());
    }

    /// Every substitution returned by oi_subsume embeds the source into the
    /// destination and is injective.
    #[test]
    fn prop_oi_subsume_is_sound(state in arb_state(), vars in prop::collection::vec(arb_var_name(), 2)) {
        prop_assume!(vars[0] != vars[1]);
        let source = BTreeSet::from([Predicate::new("p0", 2)
            .of(vec![Term::var(vars[0].as_str()), Term::var(vars[1].as_str())])]);

        for sub in Substitution::new().oi_subsume(&source, &state.facts) {
            prop_assert!(sub.check_injective());
            for lit in &source {
                prop_assert!(state.contains(&sub.apply(lit)));
            }
        }
    }

    /// Query results all match the pattern's predicate and constants.
    #[test]
    fn prop_query_is_sound(state in arb_state(), pattern_arg in arb_term()) {
        let pattern = Predicate::new("p0", 2).of(vec![pattern_arg, Term::var("Q")]);
        for hit in state.query(&pattern) {
            prop_assert_eq!(&hit.predicate, &pattern.predicate);
            if !pattern.parameters[0].is_var() {
                prop_assert_eq!(&hit.parameters[0], &pattern.parameters[0]);
            }
        }
    }

    /// expand_uncovered only produces injective extensions of the receiver.
    #[test]
    fn prop_expand_uncovered_extends(
        froms in prop::collection::btree_set(arb_var_name(), 0..3),
        tos in prop::collection::btree_set(arb_const_name(), 0..4)
    ) {
        let from: Vec<Term> = froms.into_iter().map(Term::var).collect();
        let to: Vec<Term> = tos.into_iter().map(Term::constant).collect();
        let base = Substitution::new();
        for sub in base.expand_uncovered(from.iter(), to.iter(), true) {
            prop_assert!(sub.extends(&base));
            prop_assert!(sub.check_injective());
            for f in &from {
                prop_assert!(sub.get(f).is_some());
            }
        }
    }

    /// Similarity is symmetric and lands in [0, 1].
    #[test]
    fn prop_similarity_bounds(s1 in arb_state(), s2 in arb_state()) {
        let sim = State::similarity(&s1, &s2);
        prop_assert!((0.0..=1.0).contains(&sim));
        prop_assert_eq!(sim, State::similarity(&s2, &s1));
    }
}
