//! Prematching, postmatching and covering.
//!
//! All three relate a rule to an example rule through OI substitutions:
//!
//! - *prematch*: the rule's preconditions embed into the example's;
//! - *postmatch*: the rule's effects map exactly onto the example's;
//! - *cover*: some prematching substitution also postmatches.
//!
//! The boolean forms differ on purpose: `prematches` demands exactly one
//! substitution, `postmatches` and `covers` at least one.

use crate::rule::Rule;
use irale_logic::{Literal, State, Substitution, Term};
use std::collections::BTreeSet;

/// Extend every substitution in `subs` so that each literal of `to_unify`
/// maps onto some fact of `s`; substitutions that cannot absorb a literal
/// are dropped.
pub(crate) fn unify_with_state(
    to_unify: &BTreeSet<Literal>,
    s: &State,
    mut subs: BTreeSet<Substitution>,
) -> BTreeSet<Substitution> {
    for lit in to_unify {
        let mut next_subs = BTreeSet::new();

        for sub in &subs {
            let subbed = sub.apply(lit);
            let matches = s.query(&subbed);
            if matches.is_empty() {
                continue;
            }
            if subbed.grounded() {
                next_subs.insert(sub.clone());
                continue;
            }
            for fact in matches {
                let mut extended = sub.clone();
                if extended.set_safe_multiple(&subbed.parameters, &fact.parameters) {
                    next_subs.insert(extended);
                }
            }
        }

        if next_subs.is_empty() {
            return BTreeSet::new();
        }
        subs = next_subs;
    }
    subs
}

fn strip_identities(subs: BTreeSet<Substitution>) -> BTreeSet<Substitution> {
    subs.into_iter()
        .map(|mut sub| {
            sub.clean_constants();
            sub
        })
        .collect()
}

impl Rule {
    /// Every OI substitution embedding this rule's preconditions into the
    /// example's precondition state, starting from `sub`.
    pub fn prematching_subs(&self, x: &Rule, sub: &Substitution) -> BTreeSet<Substitution> {
        if !Literal::compatible(&self.action_literal, &x.action_literal) {
            return BTreeSet::new();
        }

        let mut sub = sub.clone();

        // Constants of the action literal and preconditions stand for
        // themselves unless the caller already bound them.
        let mut constants: BTreeSet<Term> = self
            .action_literal
            .parameters
            .iter()
            .filter(|p| !p.is_var())
            .cloned()
            .collect();
        constants.extend(self.precondition_constants());
        for c in &constants {
            if sub.get(c).is_none() {
                sub.set(c, c);
            }
        }

        if !sub.set_safe_multiple(
            &self.action_literal.parameters,
            &x.action_literal.parameters,
        ) {
            return BTreeSet::new();
        }

        let state = State::from_facts(x.preconditions.iter().cloned());
        let subs = unify_with_state(&self.preconditions, &state, BTreeSet::from([sub]));
        strip_identities(subs)
    }

    /// Exactly one prematching substitution exists.
    pub fn prematches(&self, x: &Rule) -> bool {
        self.prematching_subs(x, &Substitution::new()).len() == 1
    }

    /// Exactly one prematching substitution extends `sub`.
    pub fn prematches_with(&self, x: &Rule, sub: &Substitution) -> bool {
        self.prematching_subs(x, sub).len() == 1
    }

    /// Every OI substitution mapping this rule's effects exactly onto the
    /// example's. Requires matching effect-set sizes.
    pub fn postmatching_subs(&self, x: &Rule, sub: &Substitution) -> BTreeSet<Substitution> {
        if !Literal::compatible(&self.action_literal, &x.action_literal) {
            return BTreeSet::new();
        }
        if self.add.len() != x.add.len() || self.del.len() != x.del.len() {
            return BTreeSet::new();
        }

        let mut effect_state = State::new();
        effect_state.add_facts(x.add.iter().cloned());
        effect_state.add_facts(x.del.iter().cloned());

        let mut sub = sub.clone();
        let mut constants: BTreeSet<Term> = self
            .action_literal
            .parameters
            .iter()
            .filter(|p| !p.is_var())
            .cloned()
            .collect();
        for eff in self.add.iter().chain(&self.del) {
            constants.extend(eff.parameters.iter().filter(|p| !p.is_var()).cloned());
        }
        for c in &constants {
            if sub.get(c).is_none() && sub.get_inverse(c).is_none() {
                sub.set(c, c);
            }
        }

        if !sub.set_safe_multiple(
            &self.action_literal.parameters,
            &x.action_literal.parameters,
        ) {
            return BTreeSet::new();
        }

        let mut effects: BTreeSet<Literal> = self.add.iter().cloned().collect();
        effects.extend(self.del.iter().cloned());

        let subs = unify_with_state(&effects, &effect_state, BTreeSet::from([sub]));
        strip_identities(subs)
    }

    /// At least one postmatching substitution extends `sub`.
    pub fn postmatches(&self, x: &Rule, sub: &Substitution) -> bool {
        !self.postmatching_subs(x, sub).is_empty()
    }

    /// Prematch, then postmatch each result; the union of the postmatches.
    pub fn covering_subs(&self, x: &Rule) -> BTreeSet<Substitution> {
        let mut covering = BTreeSet::new();
        for pre in self.prematching_subs(x, &Substitution::new()) {
            covering.extend(self.postmatching_subs(x, &pre));
        }
        covering
    }

    /// At least one covering substitution exists.
    pub fn covers(&self, x: &Rule) -> bool {
        !self.covering_subs(x).is_empty()
    }

    /// The rule prematches the example under some substitution that fails to
    /// postmatch: the rule would fire but predicts the wrong effects.
    pub fn contradicts(&self, x: &Rule) -> bool {
        self.prematching_subs(x, &Substitution::new())
            .iter()
            .any(|sub| !self.postmatches(x, sub))
    }
}
