//! # Substitutions, unification and OI-subsumption
//!
//! A [`Substitution`] is a finite mapping from terms to terms, together with
//! an `injective` flag. Injective substitutions obey the Object Identity
//! regime: no two sources may share an image, so the inverse is a partial
//! function. Free (non-injective) substitutions arise from classical
//! unification and from merging.
//!
//! ## Operations
//!
//! - `apply` rewrites terms, literals, literal sets and grounded actions in a
//!   single pass (no fixpoint iteration).
//! - `unify` computes a most general unifier of two literals; the receiver
//!   becomes non-injective.
//! - `oi_subsume` enumerates *every* injective extension of the receiver
//!   embedding a source literal set into a destination set, where both
//!   variables and constants map injectively (identity permitted).
//! - `expand_uncovered` enumerates every injective assignment of the
//!   still-unmapped source terms to candidate images whose type is subsumed
//!   by the source type.
//! - `merge` composes right-biased with bridge closure: if the receiver maps
//!   `a ↦ b` and the argument maps `b ↦ c`, the merge maps `a ↦ c`.
//!
//! Enumerating operations return empty collections when nothing matches;
//! binding clashes are local failures the enumeration backtracks over.

use crate::action::{Condition, GroundedAction};
use crate::literal::Literal;
use crate::term::{Term, TermType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Substitution {
    mapping: BTreeMap<Term, Term>,
    injective: bool,
}

impl Substitution {
    /// The empty injective substitution.
    pub fn new() -> Self {
        Substitution {
            mapping: BTreeMap::new(),
            injective: true,
        }
    }

    /// The empty free (non-injective) substitution.
    pub fn free() -> Self {
        Substitution {
            mapping: BTreeMap::new(),
            injective: false,
        }
    }

    /// Pairwise construction, skipping identity pairs.
    pub fn from_pairs(from: &[Term], to: &[Term], injective: bool) -> Self {
        debug_assert_eq!(from.len(), to.len());
        let mut sub = Substitution {
            mapping: BTreeMap::new(),
            injective,
        };
        for (f, t) in from.iter().zip(to.iter()) {
            if f != t {
                sub.set(f, t);
            }
        }
        sub
    }

    /// A copy of this substitution with the injectivity flag replaced.
    pub fn with_injective(&self, injective: bool) -> Self {
        Substitution {
            mapping: self.mapping.clone(),
            injective,
        }
    }

    pub fn is_injective(&self) -> bool {
        self.injective
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn mapping(&self) -> &BTreeMap<Term, Term> {
        &self.mapping
    }

    pub fn get(&self, from: &Term) -> Option<&Term> {
        self.mapping.get(from)
    }

    /// First preimage (in key order) whose image equals `to`.
    pub fn get_inverse(&self, to: &Term) -> Option<&Term> {
        self.mapping
            .iter()
            .find(|(_, v)| *v == to)
            .map(|(k, _)| k)
    }

    pub fn contains(&self, from: &Term) -> bool {
        self.mapping.contains_key(from)
    }

    /// Does `term` occur on either side of the mapping?
    pub fn contains_both(&self, term: &Term) -> bool {
        self.mapping
            .iter()
            .any(|(k, v)| k == term || v == term)
    }

    /// Does this substitution agree with every binding of `other`?
    pub fn extends(&self, other: &Substitution) -> bool {
        other
            .mapping
            .iter()
            .all(|(k, v)| self.get(k).map(|t| t == v).unwrap_or(false))
    }

    /// Is the mapping actually injective (no two keys share an image)?
    pub fn check_injective(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.mapping.values().all(|v| seen.insert(v.clone()))
    }

    /// Unconditional binding. In injective mode an inverse clash on a
    /// different source is a programming error.
    pub fn set(&mut self, from: &Term, to: &Term) {
        if self.injective {
            debug_assert!(
                self.get_inverse(to).map(|f| f == from).unwrap_or(true),
                "injective substitution already maps something else to {}",
                to.name()
            );
        }
        self.mapping.insert(from.clone(), to.clone());
    }

    /// Binding that fails instead of clobbering: succeeds iff `from` is a
    /// variable that is unmapped (or already mapped to `to`) and, in
    /// injective mode, `to` has no other preimage. `from == to` always
    /// succeeds without recording anything.
    pub fn set_safe(&mut self, from: &Term, to: &Term) -> bool {
        if from == to {
            return true;
        }
        if !from.is_var() {
            return false;
        }
        if let Some(existing) = self.mapping.get(from) {
            return existing == to;
        }
        if self.injective && self.get_inverse(to).is_some() {
            return false;
        }
        self.mapping.insert(from.clone(), to.clone());
        true
    }

    /// Positionwise `set_safe` over two parameter sequences. All positions
    /// are attempted; the result is the conjunction of the outcomes.
    pub fn set_safe_multiple(&mut self, from: &[Term], to: &[Term]) -> bool {
        debug_assert_eq!(from.len(), to.len());
        let mut success = true;
        for (f, t) in from.iter().zip(to.iter()) {
            success &= self.set_safe(f, t);
        }
        success
    }

    pub fn remove(&mut self, from: &Term) {
        self.mapping.remove(from);
    }

    /// The inverse substitution. Meaningful for injective substitutions.
    pub fn inverse(&self) -> Substitution {
        let mut inv = Substitution::new();
        for (k, v) in &self.mapping {
            inv.set(v, k);
        }
        inv
    }

    pub fn apply_term(&self, term: &Term) -> Term {
        self.mapping.get(term).cloned().unwrap_or_else(|| term.clone())
    }

    pub fn apply(&self, lit: &Literal) -> Literal {
        Literal {
            predicate: lit.predicate.clone(),
            parameters: lit.parameters.iter().map(|p| self.apply_term(p)).collect(),
            positive: lit.positive,
        }
    }

    pub fn apply_all(&self, lits: &BTreeSet<Literal>) -> BTreeSet<Literal> {
        lits.iter().map(|l| self.apply(l)).collect()
    }

    pub fn apply_grounded(&self, act: &GroundedAction) -> GroundedAction {
        GroundedAction {
            action_literal: self.apply(&act.action_literal),
            pre_conditions: act
                .pre_conditions
                .iter()
                .map(|c| Condition::new(self.apply(&c.literal), c.truth))
                .collect(),
            post_conditions: act
                .post_conditions
                .iter()
                .map(|c| Condition::new(self.apply(&c.literal), c.truth))
                .collect(),
        }
    }

    /// The subset of `parameters` that has no binding yet.
    pub fn uncovered(&self, parameters: &BTreeSet<Term>) -> BTreeSet<Term> {
        parameters
            .iter()
            .filter(|p| !self.mapping.contains_key(p))
            .cloned()
            .collect()
    }

    /// Enumerate every injective extension of this substitution that assigns
    /// each uncovered element of `from` to some element of `to` whose type
    /// is subsumed by the source's type. With `skip_constants`, non-variable
    /// sources are left unexpanded.
    pub fn expand_uncovered<'a, F, T>(&self, from: F, to: T, skip_constants: bool) -> Vec<Substitution>
    where
        F: IntoIterator<Item = &'a Term>,
        T: IntoIterator<Item = &'a Term>,
    {
        let from: BTreeSet<Term> = from.into_iter().cloned().collect();
        let to: BTreeSet<Term> = to.into_iter().cloned().collect();

        let mut generated = vec![self.clone()];
        for source in self.uncovered(&from) {
            if !source.is_var() && skip_constants {
                continue;
            }
            let prev = std::mem::take(&mut generated);
            for sub in prev {
                for image in &to {
                    if sub.get_inverse(image).is_none()
                        && TermType::type_subsumes(source.ty(), image.ty())
                    {
                        let mut extended = sub.clone();
                        extended.set(&source, image);
                        generated.push(extended);
                    }
                }
            }
        }
        generated
    }

    /// Right-biased composition with bridge closure: bindings of `other` win,
    /// and a receiver binding `a ↦ b` whose image is itself mapped by `other`
    /// to `c` contributes `a ↦ c`. The result is non-injective.
    pub fn merge(&self, other: &Substitution) -> Substitution {
        let mut result = other.with_injective(false);
        for (from, to) in &self.mapping {
            match other.get(to) {
                Some(bridged) => {
                    if bridged != from {
                        result.set(from, bridged);
                    }
                }
                None => result.set(from, to),
            }
        }
        result
    }

    /// Drop identity bindings `x ↦ x`.
    pub fn clean_constants(&mut self) {
        self.mapping.retain(|k, v| k != v);
    }

    /// Classical most-general-unifier step over two literals, resolving both
    /// sides through the current bindings position by position. Turns the
    /// receiver non-injective. Returns false on predicate mismatch or a
    /// constant/constant clash.
    pub fn unify(&mut self, from: &Literal, to: &Literal) -> bool {
        if from.predicate != to.predicate || from.parameters.len() != to.parameters.len() {
            return false;
        }

        self.injective = false;

        for (from_raw, to_raw) in from.parameters.iter().zip(to.parameters.iter()) {
            let from_atom = self.apply_term(from_raw);
            let to_atom = self.apply_term(to_raw);

            if from_atom == to_atom {
                continue;
            }

            match (from_atom.is_var(), to_atom.is_var()) {
                (true, _) => {
                    self.mapping.insert(from_atom.clone(), to_atom.clone());
                    self.mapping.insert(from_raw.clone(), to_atom);
                }
                (false, true) => {
                    self.mapping.insert(to_atom.clone(), from_atom.clone());
                    self.mapping.insert(to_raw.clone(), from_atom);
                }
                (false, false) => return false,
            }
        }
        true
    }

    /// Enumerate every injective substitution σ extending this one with
    /// σ(source) ⊆ dst. Injectivity covers variables *and* constants:
    /// a branch dies at the first position whose source is already bound
    /// elsewhere or whose image already has a different preimage.
    pub fn oi_subsume(
        &self,
        source: &BTreeSet<Literal>,
        dst: &BTreeSet<Literal>,
    ) -> BTreeSet<Substitution> {
        let source: Vec<Literal> = source.iter().cloned().collect();
        self.oi_subsume_vec(source, dst)
    }

    fn oi_subsume_vec(
        &self,
        mut source: Vec<Literal>,
        dst: &BTreeSet<Literal>,
    ) -> BTreeSet<Substitution> {
        let first = match source.pop() {
            Some(lit) => self.apply(&lit),
            None => return BTreeSet::from([self.clone()]),
        };

        let mut subs = BTreeSet::new();
        for fact in dst {
            if fact.predicate != first.predicate {
                continue;
            }

            let mut sub = self.clone();
            let mut could_match = true;
            for (src_param, dst_param) in first.parameters.iter().zip(fact.parameters.iter()) {
                if src_param == dst_param {
                    continue;
                }
                if src_param.is_var()
                    && sub.get(src_param).is_none()
                    && sub.get_inverse(dst_param).is_none()
                {
                    sub.set(src_param, dst_param);
                } else {
                    could_match = false;
                    break;
                }
            }
            if !could_match {
                continue;
            }

            subs.extend(sub.oi_subsume_vec(source.clone(), dst));
        }
        subs
    }
}

impl PartialEq for Substitution {
    fn eq(&self, other: &Self) -> bool {
        self.injective == other.injective && self.mapping == other.mapping
    }
}

impl Eq for Substitution {}

impl PartialOrd for Substitution {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Substitution {
    fn cmp(&self, other: &Self) -> Ordering {
        // Injective substitutions sort first, then by size, then by content.
        other
            .injective
            .cmp(&self.injective)
            .then_with(|| self.mapping.len().cmp(&other.mapping.len()))
            .then_with(|| self.mapping.cmp(&other.mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Predicate;

    fn on() -> Predicate {
        Predicate::new("on", 2)
    }

    fn c(name: &str) -> Term {
        Term::constant(name)
    }

    fn v(name: &str) -> Term {
        Term::var(name)
    }

    #[test]
    fn set_safe_rejects_clashes() {
        let mut sub = Substitution::new();
        assert!(sub.set_safe(&v("X"), &c("a")));
        // Same binding again is fine.
        assert!(sub.set_safe(&v("X"), &c("a")));
        // Conflicting forward binding fails.
        assert!(!sub.set_safe(&v("X"), &c("b")));
        // Injectivity: another variable cannot reuse the image.
        assert!(!sub.set_safe(&v("Y"), &c("a")));
        // Constants only bind to themselves.
        assert!(sub.set_safe(&c("k"), &c("k")));
        assert!(!sub.set_safe(&c("k"), &c("l")));
    }

    #[test]
    fn inverse_round_trips() {
        let mut sub = Substitution::new();
        sub.set(&v("X"), &c("a"));
        sub.set(&v("Y"), &c("b"));

        let inv = sub.inverse();
        for (from, to) in sub.mapping() {
            assert_eq!(inv.apply_term(to), *from);
        }
    }

    #[test]
    fn apply_is_single_pass() {
        let mut sub = Substitution::free();
        sub.set(&v("X"), &v("Y"));
        sub.set(&v("Y"), &c("a"));

        // X resolves to Y in one pass, not chased to a.
        assert_eq!(sub.apply_term(&v("X")), v("Y"));
    }

    #[test]
    fn merge_bridges_chains() {
        let mut s1 = Substitution::new();
        s1.set(&v("A"), &v("B"));
        let mut s2 = Substitution::new();
        s2.set(&v("B"), &c("c"));

        let merged = s1.merge(&s2);
        assert_eq!(merged.apply_term(&v("A")), c("c"));
        assert_eq!(merged.apply_term(&v("B")), c("c"));
        assert!(!merged.is_injective());
    }

    #[test]
    fn clean_constants_drops_identity() {
        let mut sub = Substitution::new();
        sub.set(&c("a"), &c("a"));
        sub.set(&v("X"), &c("b"));
        sub.clean_constants();
        assert_eq!(sub.len(), 1);
        assert!(sub.get(&c("a")).is_none());
    }

    #[test]
    fn unify_binds_variables_both_ways() {
        let l1 = on().of(vec![v("X"), c("b")]);
        let l2 = on().of(vec![c("a"), v("Y")]);

        let mut sub = Substitution::new();
        assert!(sub.unify(&l1, &l2));
        assert!(!sub.is_injective());
        assert_eq!(sub.apply_term(&v("X")), c("a"));
        assert_eq!(sub.apply_term(&v("Y")), c("b"));
    }

    #[test]
    fn unify_fails_on_constant_clash() {
        let l1 = on().of(vec![c("a"), c("b")]);
        let l2 = on().of(vec![c("a"), c("c")]);
        let mut sub = Substitution::new();
        assert!(!sub.unify(&l1, &l2));
    }

    #[test]
    fn oi_subsume_enumerates_all_embeddings() {
        let clear = Predicate::new("clear", 1);
        let source = BTreeSet::from([clear.of(vec![v("X")])]);
        let dst = BTreeSet::from([clear.of(vec![c("a")]), clear.of(vec![c("b")])]);

        let subs = Substitution::new().oi_subsume(&source, &dst);
        assert_eq!(subs.len(), 2);
        let images: BTreeSet<Term> = subs.iter().map(|s| s.apply_term(&v("X"))).collect();
        assert_eq!(images, BTreeSet::from([c("a"), c("b")]));
    }

    #[test]
    fn oi_subsume_is_injective_over_variables() {
        let on = on();
        let source = BTreeSet::from([on.of(vec![v("X"), v("Y")])]);
        // X and Y may not both map to a.
        let dst = BTreeSet::from([on.of(vec![c("a"), c("a")])]);
        let subs = Substitution::new().oi_subsume(&source, &dst);
        assert!(subs.is_empty());
    }

    #[test]
    fn oi_subsume_multi_literal() {
        let on = on();
        let clear = Predicate::new("clear", 1);
        let source = BTreeSet::from([on.of(vec![v("X"), v("Y")]), clear.of(vec![v("X")])]);
        let dst = BTreeSet::from([
            on.of(vec![c("a"), c("b")]),
            on.of(vec![c("b"), c("c")]),
            clear.of(vec![c("a")]),
        ]);

        let subs = Substitution::new().oi_subsume(&source, &dst);
        assert_eq!(subs.len(), 1);
        let sub = subs.iter().next().unwrap();
        assert_eq!(sub.apply_term(&v("X")), c("a"));
        assert_eq!(sub.apply_term(&v("Y")), c("b"));
    }

    #[test]
    fn expand_uncovered_respects_injectivity_and_types() {
        let from = [v("X"), v("Y")];
        let to = [c("a"), c("b")];
        let subs = Substitution::new().expand_uncovered(from.iter(), to.iter(), true);

        // Two injective assignments of {X, Y} onto {a, b}.
        assert_eq!(subs.len(), 2);
        for sub in &subs {
            assert!(sub.check_injective());
        }
    }

    #[test]
    fn expand_uncovered_skips_constants_when_asked() {
        let from = [c("k"), v("X")];
        let to = [c("a"), c("b")];
        let subs = Substitution::new().expand_uncovered(from.iter(), to.iter(), true);
        assert_eq!(subs.len(), 2);
        for sub in &subs {
            assert!(sub.get(&c("k")).is_none());
        }
    }
}
