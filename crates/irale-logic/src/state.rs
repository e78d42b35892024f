//! States as sets of positive grounded facts, and goals.

use crate::action::ActionSchema;
use crate::literal::Literal;
use crate::substitution::Substitution;
use crate::term::TermType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An unordered set of positive grounded literals.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct State {
    pub facts: BTreeSet<Literal>,
}

impl State {
    pub fn new() -> Self {
        State {
            facts: BTreeSet::new(),
        }
    }

    pub fn from_facts(facts: impl IntoIterator<Item = Literal>) -> Self {
        let mut state = State::new();
        for f in facts {
            state.add_fact(&f);
        }
        state
    }

    pub fn add_fact(&mut self, fact: &Literal) {
        self.facts.insert(fact.abs());
    }

    pub fn add_facts(&mut self, facts: impl IntoIterator<Item = Literal>) {
        for f in facts {
            self.add_fact(&f);
        }
    }

    pub fn remove_fact(&mut self, fact: &Literal) {
        self.facts.remove(&fact.abs());
    }

    pub fn remove_facts(&mut self, facts: impl IntoIterator<Item = Literal>) {
        for f in facts {
            self.remove_fact(&f);
        }
    }

    pub fn contains(&self, fact: &Literal) -> bool {
        self.facts.contains(fact)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Every fact matching a (possibly variable) pattern: same predicate and
    /// arity, constants equal positionwise, variables type-compatible.
    pub fn query(&self, pattern: &Literal) -> BTreeSet<Literal> {
        self.facts
            .iter()
            .filter(|fact| {
                fact.predicate == pattern.predicate
                    && fact.parameters.len() == pattern.parameters.len()
                    && pattern
                        .parameters
                        .iter()
                        .zip(fact.parameters.iter())
                        .all(|(p, f)| {
                            if p.is_var() {
                                TermType::type_subsumes(p.ty(), f.ty())
                            } else {
                                p == f
                            }
                        })
            })
            .cloned()
            .collect()
    }

    /// Enumerate injective substitutions grounding a schema's positive
    /// preconditions in this state, then keep those under which no negative
    /// precondition holds.
    pub fn unify_action(&self, action: &ActionSchema) -> Vec<Substitution> {
        let mut all_subs = vec![Substitution::new()];

        for precond in &action.true_precond {
            let mut next_subs = Vec::new();
            for sub in &all_subs {
                let pattern = sub.apply(precond);
                for fact in self.query(&pattern) {
                    let mut extended = sub.clone();
                    let mut valid = true;
                    for (p, f) in pattern.parameters.iter().zip(fact.parameters.iter()) {
                        if p.is_var() {
                            if extended.get_inverse(f).is_some() {
                                valid = false;
                                break;
                            }
                            extended.set(p, f);
                        }
                    }
                    if valid {
                        next_subs.push(extended);
                    }
                }
            }
            all_subs = next_subs;
        }

        all_subs
            .into_iter()
            .filter(|sub| {
                action
                    .false_precond
                    .iter()
                    .all(|precond| !self.contains(&sub.apply(precond)))
            })
            .collect()
    }

    /// Symmetric difference against a successor state: facts present only in
    /// `other` come back positive in `added`, facts present only in `self`
    /// come back *negative* in `removed`.
    pub fn difference(&self, other: &State) -> (BTreeSet<Literal>, BTreeSet<Literal>) {
        let added = other
            .facts
            .iter()
            .filter(|f| !self.contains(f))
            .cloned()
            .collect();
        let removed = self
            .facts
            .iter()
            .filter(|f| !other.contains(f))
            .map(|f| -f)
            .collect();
        (added, removed)
    }

    /// Normalised symmetric-difference size: `|Δ| / (|S₁| + |S₂| + 1)`.
    pub fn distance(s1: &State, s2: &State) -> f64 {
        let delta = s1.facts.iter().filter(|f| !s2.contains(f)).count()
            + s2.facts.iter().filter(|f| !s1.contains(f)).count();
        delta as f64 / (s1.len() + s2.len() + 1) as f64
    }

    pub fn similarity(s1: &State, s2: &State) -> f64 {
        1.0 - State::distance(s1, s2)
    }
}

impl FromIterator<Literal> for State {
    fn from_iter<I: IntoIterator<Item = Literal>>(iter: I) -> Self {
        State::from_facts(iter)
    }
}

/// A conjunction of facts to reach and facts to avoid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub true_facts: Vec<Literal>,
    pub false_facts: Vec<Literal>,
}

impl Goal {
    pub fn reached(&self, state: &State) -> bool {
        self.true_facts.iter().all(|f| state.contains(f))
            && self.false_facts.iter().all(|f| !state.contains(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Predicate;
    use crate::term::Term;

    fn on() -> Predicate {
        Predicate::new("on", 2)
    }

    fn fact(p: &str, args: &[&str]) -> Literal {
        Predicate::new(p, args.len()).of(args.iter().map(|a| Term::constant(*a)).collect())
    }

    #[test]
    fn facts_are_stored_positive() {
        let mut state = State::new();
        state.add_fact(&-fact("on", &["a", "b"]));
        assert!(state.contains(&fact("on", &["a", "b"])));
    }

    #[test]
    fn query_matches_constants_and_variables() {
        let state = State::from_facts([
            fact("on", &["a", "b"]),
            fact("on", &["b", "c"]),
            fact("clear", &["a"]),
        ]);

        let pattern = on().of(vec![Term::var("X"), Term::var("Y")]);
        assert_eq!(state.query(&pattern).len(), 2);

        let pattern = on().of(vec![Term::constant("a"), Term::var("Y")]);
        let hits = state.query(&pattern);
        assert_eq!(hits.len(), 1);
        assert!(hits.contains(&fact("on", &["a", "b"])));

        let pattern = on().of(vec![Term::constant("c"), Term::var("Y")]);
        assert!(state.query(&pattern).is_empty());
    }

    #[test]
    fn difference_splits_added_and_removed() {
        let before = State::from_facts([fact("on", &["a", "b"]), fact("clear", &["c"])]);
        let after = State::from_facts([fact("on", &["a", "c"]), fact("clear", &["c"])]);

        let (added, removed) = before.difference(&after);
        assert_eq!(added, BTreeSet::from([fact("on", &["a", "c"])]));
        assert_eq!(removed, BTreeSet::from([-fact("on", &["a", "b"])]));
    }

    #[test]
    fn similarity_is_one_minus_normalised_delta() {
        let s1 = State::from_facts([fact("on", &["a", "b"])]);
        let s2 = State::from_facts([fact("on", &["a", "b"])]);
        assert!((State::similarity(&s1, &s2) - 1.0).abs() < f64::EPSILON);

        let s3 = State::from_facts([fact("on", &["b", "a"])]);
        // delta = 2, sizes 1 + 1 + 1.
        assert!((State::distance(&s1, &s3) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn unify_action_grounds_preconditions() {
        let clear = Predicate::new("clear", 1);
        let mv = Predicate::new("move", 2);
        let x = Term::var("X");
        let y = Term::var("Y");

        let schema = ActionSchema::new(
            mv.of(vec![x.clone(), y.clone()]),
            vec![clear.of(vec![x.clone()]), clear.of(vec![y.clone()])],
            vec![],
            vec![],
            vec![],
        );

        let state = State::from_facts([fact("clear", &["a"]), fact("clear", &["b"])]);
        let subs = state.unify_action(&schema);
        // Injective: (a, b) and (b, a).
        assert_eq!(subs.len(), 2);
    }

    #[test]
    fn goal_reached() {
        let state = State::from_facts([fact("on", &["a", "b"])]);
        let goal = Goal {
            true_facts: vec![fact("on", &["a", "b"])],
            false_facts: vec![fact("on", &["b", "a"])],
        };
        assert!(goal.reached(&state));
    }
}
