//! The unknown-rule model.
//!
//! For each grounded action literal the learner keeps a side belief that
//! some rule it has never observed would fire here: `p_any` is the prior
//! that an arbitrary domain fact must hold for it, and `p_nfs` pins
//! specific facts the model has implicated through failures.

use irale_logic::{Domain, Literal, State};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
pub struct UnknownRule {
    pub grounded_action: Literal,
    /// Prior that a generic fact is required by the unseen rule.
    pub p_any: f64,
    /// Total number of groundable facts in the domain.
    pub n_all: usize,
    /// Per-fact requirement probabilities for facts implicated so far.
    pub p_nfs: BTreeMap<Literal, f64>,
}

impl UnknownRule {
    pub fn new(raw_prob: f64, domain: &Domain, instance_count: usize, grounded_action: Literal) -> Self {
        let n_all: usize = domain
            .predicates
            .iter()
            .map(|pred| instance_count.pow(pred.arity as u32))
            .sum();

        UnknownRule {
            grounded_action,
            p_any: 1.0 - raw_prob.powf(1.0 / n_all as f64),
            n_all,
            p_nfs: BTreeMap::new(),
        }
    }

    /// Probability that the unseen rule would fire in `state`, with the
    /// expected information gain of trying as a byproduct.
    pub fn compute_prob(&self, state: &State) -> (f64, f64) {
        let mut expected_gain = 0.0;
        let mut prob = 1.0;
        let mut false_any_facts = self.n_all as f64 - state.len() as f64;

        for (fact, p) in &self.p_nfs {
            if !state.contains(fact) {
                // An implicated fact is no longer a generic one.
                false_any_facts -= 1.0;
                prob *= 1.0 - p;
                expected_gain += p;
            }
        }

        prob *= (1.0 - self.p_any).powf(false_any_facts);

        expected_gain += false_any_facts * self.p_any;
        if prob < 1.0 {
            expected_gain *= prob / (1.0 - prob);
        } else {
            expected_gain = 0.0;
        }

        (prob, expected_gain)
    }

    /// Condition the model on the action having failed in `state`: facts of
    /// the state become specifically implicated, absent facts and the
    /// generic prior are renormalised by the failure probability.
    pub fn corroborate_failure(&mut self, state: &State) {
        let (prob, _) = self.compute_prob(state);
        let p_fail = 1.0 - prob;
        if p_fail == 0.0 {
            return;
        }

        for fact in &state.facts {
            self.p_nfs.entry(fact.clone()).or_insert(self.p_any);
        }

        for (fact, p) in self.p_nfs.iter_mut() {
            if !state.contains(fact) {
                *p /= p_fail;
            }
        }

        self.p_any /= p_fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irale_logic::{ActionSchema, Predicate, Term};
    use std::collections::BTreeSet;

    fn fact(p: &str, args: &[&str]) -> Literal {
        Predicate::new(p, args.len()).of(args.iter().map(|a| Term::constant(*a)).collect())
    }

    fn domain() -> Domain {
        let on = Predicate::new("on", 2);
        let clear = Predicate::new("clear", 1);
        let mv = Predicate::new("move", 2);
        Domain::new(
            vec![],
            BTreeSet::from([on, clear]),
            BTreeSet::new(),
            vec![ActionSchema::nullary(
                mv.of(vec![Term::var("X"), Term::var("Y")]),
            )],
        )
    }

    #[test]
    fn n_all_counts_groundable_facts() {
        let unknown = UnknownRule::new(0.5, &domain(), 3, fact("move", &["a", "b"]));
        // on/2 -> 9, clear/1 -> 3, plus the synthesised reset/0 (1),
        // delete/1 (3) and remove-fact/1 (3).
        assert_eq!(unknown.n_all, 9 + 3 + 1 + 3 + 3);
        assert!(unknown.p_any > 0.0 && unknown.p_any < 1.0);
    }

    #[test]
    fn p_any_grows_across_failures() {
        let mut unknown = UnknownRule::new(0.5, &domain(), 3, fact("move", &["a", "b"]));
        let state = State::from_facts([fact("on", &["a", "b"]), fact("clear", &["a"])]);

        let mut previous = unknown.p_any;
        for _ in 0..4 {
            unknown.corroborate_failure(&state);
            assert!(unknown.p_any >= previous);
            previous = unknown.p_any;
            for p in unknown.p_nfs.values() {
                assert!(*p <= 1.0 + 1e-9);
            }
        }
    }

    #[test]
    fn observed_facts_get_pinned() {
        let mut unknown = UnknownRule::new(0.5, &domain(), 3, fact("move", &["a", "b"]));
        let state = State::from_facts([fact("on", &["a", "b"])]);
        unknown.corroborate_failure(&state);
        assert!(unknown.p_nfs.contains_key(&fact("on", &["a", "b"])));
    }

    #[test]
    fn prob_shrinks_with_more_absent_facts() {
        let unknown = UnknownRule::new(0.5, &domain(), 3, fact("move", &["a", "b"]));
        let rich = State::from_facts([
            fact("on", &["a", "b"]),
            fact("on", &["b", "c"]),
            fact("clear", &["a"]),
        ]);
        let poor = State::from_facts([fact("on", &["a", "b"])]);

        let (p_rich, _) = unknown.compute_prob(&rich);
        let (p_poor, _) = unknown.compute_prob(&poor);
        // More facts hold, so fewer requirements can fail.
        assert!(p_rich > p_poor);
    }
}
