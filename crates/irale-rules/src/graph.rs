//! The generalisation DAG.
//!
//! Rules live in an id-indexed arena; `parents` links point *upwards* in
//! generality (a rule's parents are the more specific rules it generalises,
//! with examples as leaves). Ids are never reused, so insertion order is the
//! id order — ties between equally general rules resolve to the earliest.

use crate::error::RuleError;
use crate::rule::Rule;
use irale_logic::State;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Index of a rule in its arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(usize);

impl RuleId {
    pub fn from_raw(raw: usize) -> Self {
        RuleId(raw)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Arena owning every rule ever created in a learning session, active or
/// not. Which ids are *active* is the reviser's business; the arena only
/// maintains the DAG structure.
#[derive(Clone, Debug, Default)]
pub struct RuleArena {
    rules: Vec<Rule>,
}

impl RuleArena {
    pub fn new() -> Self {
        RuleArena { rules: Vec::new() }
    }

    pub fn insert(&mut self, rule: Rule) -> RuleId {
        self.rules.push(rule);
        RuleId(self.rules.len() - 1)
    }

    pub fn get(&self, id: RuleId) -> &Rule {
        &self.rules[id.0]
    }

    pub fn get_mut(&mut self, id: RuleId) -> &mut Rule {
        &mut self.rules[id.0]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = RuleId> {
        (0..self.rules.len()).map(RuleId)
    }

    /// Is `ancestor` reachable from `id` through parent links?
    pub fn is_ancestor(&self, id: RuleId, ancestor: RuleId) -> bool {
        self.get(id).parents.iter().any(|&parent| {
            parent == ancestor || self.is_ancestor(parent, ancestor)
        })
    }

    /// Attach `parent` to `child`. Fails if that would make `child` its own
    /// ancestor, which breaks the DAG invariant.
    pub fn insert_parent(&mut self, child: RuleId, parent: RuleId) -> Result<(), RuleError> {
        if child == parent || self.is_ancestor(parent, child) {
            return Err(RuleError::SelfParenting {
                rule: child.index(),
            });
        }
        self.get_mut(child).parents.insert(parent);
        Ok(())
    }

    /// 1 + the maximum parent generality; 0 for leaves (examples).
    pub fn generality_level(&self, id: RuleId) -> usize {
        self.get(id)
            .parents
            .iter()
            .map(|&p| self.generality_level(p) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Number of leaf examples under this rule.
    pub fn count_leaves(&self, id: RuleId) -> usize {
        let parents = &self.get(id).parents;
        if parents.is_empty() {
            return 1;
        }
        parents.iter().map(|&p| self.count_leaves(p)).sum()
    }

    /// Greatest similarity between `state` and the precondition state of any
    /// leaf under this rule.
    pub fn max_leaf_similarity(&self, id: RuleId, state: &State) -> f64 {
        let rule = self.get(id);
        if rule.parents.is_empty() {
            let leaf_state = State::from_facts(rule.preconditions.iter().cloned());
            return State::similarity(state, &leaf_state);
        }
        rule.parents
            .iter()
            .map(|&p| self.max_leaf_similarity(p, state))
            .fold(0.0, f64::max)
    }

    /// The node of minimum generality level in this rule's sub-DAG
    /// (including itself) that covers the example. Ties resolve to the
    /// earliest-visited node.
    pub fn least_general_rule_covering(&self, id: RuleId, example: &Rule) -> Option<RuleId> {
        let mut result = if self.get(id).covers(example) {
            Some(id)
        } else {
            None
        };

        let mut min_generality: Option<usize> = result.map(|r| self.generality_level(r));
        for &parent in &self.get(id).parents {
            if let Some(lgr) = self.least_general_rule_covering(parent, example) {
                let level = self.generality_level(lgr);
                if min_generality.map(|m| level < m).unwrap_or(true) {
                    min_generality = Some(level);
                    result = Some(lgr);
                }
            }
        }

        result
    }

    /// Sever `parent` from the ancestor sets of the whole sub-DAG rooted at
    /// `id`: drop the direct link, then recurse into the remaining parents.
    pub fn remove_parent_recursive(&mut self, id: RuleId, parent: RuleId) {
        self.get_mut(id).parents.remove(&parent);
        let remaining: BTreeSet<RuleId> = self.get(id).parents.clone();
        for p in remaining {
            self.remove_parent_recursive(p, parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irale_logic::{Literal, Predicate, Term, Trace};
    use std::collections::BTreeSet;

    fn fact(p: &str, args: &[&str]) -> Literal {
        Predicate::new(p, args.len()).of(args.iter().map(|a| Term::constant(*a)).collect())
    }

    fn leaf_rule(x: &str, y: &str, from: &str) -> Rule {
        let state = State::from_facts([
            fact("clear", &[x]),
            fact("clear", &[y]),
            fact("on", &[x, from]),
        ]);
        let mut new_state = state.clone();
        new_state.remove_fact(&fact("on", &[x, from]));
        new_state.remove_fact(&fact("clear", &[y]));
        new_state.add_fact(&fact("on", &[x, y]));
        new_state.add_fact(&fact("clear", &[from]));
        Rule::from_trace(
            &Trace::new(state, fact("move", &[x, y]), true, new_state),
            0.5,
            true,
        )
        .unwrap()
    }

    fn lifted_rule(parents: BTreeSet<RuleId>) -> Rule {
        let on = Predicate::new("on", 2);
        let clear = Predicate::new("clear", 1);
        let mv = Predicate::new("move", 2);
        let (x, y, z) = (Term::var("X"), Term::var("Y"), Term::var("Z"));
        Rule::new(
            BTreeSet::from([
                clear.of(vec![x.clone()]),
                clear.of(vec![y.clone()]),
                on.of(vec![x.clone(), z.clone()]),
            ]),
            mv.of(vec![x.clone(), y.clone()]),
            BTreeSet::from([on.of(vec![x.clone(), y.clone()]), clear.of(vec![z.clone()])]),
            BTreeSet::from([
                -on.of(vec![x.clone(), z.clone()]),
                -clear.of(vec![y.clone()]),
            ]),
            parents,
            0.5,
            true,
        )
    }

    #[test]
    fn generality_and_leaf_counts() {
        let mut arena = RuleArena::new();
        let leaf1 = arena.insert(leaf_rule("a", "b", "c"));
        let leaf2 = arena.insert(leaf_rule("b", "c", "a"));
        let general = arena.insert(lifted_rule(BTreeSet::from([leaf1, leaf2])));

        assert_eq!(arena.generality_level(leaf1), 0);
        assert_eq!(arena.generality_level(general), 1);
        assert_eq!(arena.count_leaves(general), 2);
        assert_eq!(arena.count_leaves(leaf1), 1);
    }

    #[test]
    fn self_parenting_is_rejected() {
        let mut arena = RuleArena::new();
        let leaf = arena.insert(leaf_rule("a", "b", "c"));
        let general = arena.insert(lifted_rule(BTreeSet::from([leaf])));

        assert!(arena.insert_parent(general, general).is_err());
        assert!(arena.insert_parent(leaf, general).is_err());
        assert!(arena.insert_parent(general, leaf).is_ok());
    }

    #[test]
    fn least_general_covering_prefers_specific_nodes() {
        let mut arena = RuleArena::new();
        let leaf1 = arena.insert(leaf_rule("a", "b", "c"));
        let leaf2 = arena.insert(leaf_rule("b", "c", "a"));
        let general = arena.insert(lifted_rule(BTreeSet::from([leaf1, leaf2])));

        // The same example as leaf1 is covered by leaf1 itself, not the
        // lifted rule.
        let example = leaf_rule("a", "b", "c");
        let found = arena.least_general_rule_covering(general, &example);
        assert_eq!(found, Some(leaf1));

        // An example over fresh objects is only covered by the lifted rule.
        let example = leaf_rule("d", "e", "f");
        let found = arena.least_general_rule_covering(general, &example);
        assert_eq!(found, Some(general));
    }

    #[test]
    fn remove_parent_recursive_severs_the_subtree() {
        let mut arena = RuleArena::new();
        let leaf1 = arena.insert(leaf_rule("a", "b", "c"));
        let leaf2 = arena.insert(leaf_rule("b", "c", "a"));
        let mid = arena.insert(lifted_rule(BTreeSet::from([leaf1])));
        let top = arena.insert(lifted_rule(BTreeSet::from([mid, leaf2])));

        arena.remove_parent_recursive(top, leaf1);
        assert!(!arena.get(top).parents.contains(&leaf1));
        assert!(!arena.get(mid).parents.contains(&leaf1));
        assert!(arena.get(top).parents.contains(&mid));
    }

    #[test]
    fn max_leaf_similarity_picks_the_closest_leaf() {
        let mut arena = RuleArena::new();
        let leaf1 = arena.insert(leaf_rule("a", "b", "c"));
        let general = arena.insert(lifted_rule(BTreeSet::from([leaf1])));

        let leaf_state = State::from_facts([
            fact("clear", &["a"]),
            fact("clear", &["b"]),
            fact("on", &["a", "c"]),
        ]);
        let sim = arena.max_leaf_similarity(general, &leaf_state);
        assert!((sim - 1.0).abs() < 1e-9);
    }
}
