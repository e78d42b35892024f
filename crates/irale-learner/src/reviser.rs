//! The reviser: consuming observations, specialising and generalising.
//!
//! The reviser owns the rule arena, the active rule set and the two
//! counter-example stores. On each observation it builds an example rule,
//! partitions the active rules into prematching / contradicting / covering,
//! and dispatches:
//!
//! - a *failed* action that some rule prematches triggers specialisation of
//!   every prematching rule;
//! - an *authorized* action no rule prematches is a new uncovered positive
//!   example and triggers generalisation;
//! - an *authorized* action some rule contradicts triggers specialisation of
//!   the contradicting rules, whose orphaned leaves are re-generalised.
//!
//! At all times the active set stays consistent with every stored
//! counter-example.

use crate::config::LearnerConfig;
use crate::error::LearnError;
use indexmap::IndexSet;
use irale_logic::{ActionSchema, Domain, Literal, Predicate, Substitution, Term, Trace};
use irale_rules::{Rule, RuleArena, RuleId};
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub struct Reviser {
    pub arena: RuleArena,
    /// Active rules, in insertion order.
    pub active: IndexSet<RuleId>,
    /// Positive examples the model must keep covering.
    pub counter_examples: IndexSet<RuleId>,
    /// Examples of rejected actions no rule may prematch.
    pub failed_counter_examples: IndexSet<RuleId>,
    config: LearnerConfig,
    start_pu: f64,
}

impl Reviser {
    pub fn new(config: LearnerConfig, start_pu: f64) -> Self {
        Reviser {
            arena: RuleArena::new(),
            active: IndexSet::new(),
            counter_examples: IndexSet::new(),
            failed_counter_examples: IndexSet::new(),
            config,
            start_pu,
        }
    }

    pub fn start_pu(&self) -> f64 {
        self.start_pu
    }

    /// Is some active rule defined for this action predicate?
    pub fn has_rule_for(&self, predicate: &Predicate) -> bool {
        self.active
            .iter()
            .any(|&id| self.arena.get(id).action_literal.predicate == *predicate)
    }

    /// Revise the model against one observation. Returns whether the rule
    /// set was modified.
    pub fn update_knowledge<R: Rng>(
        &mut self,
        trace: &Trace,
        delete_pred: &Predicate,
        rng: &mut R,
    ) -> Result<bool, LearnError> {
        if !trace.action.grounded() {
            return Err(LearnError::UngroundedAction {
                action: trace.action.to_string(),
            });
        }

        // Actions naming a masked instance are no observation at all.
        for param in &trace.action.parameters {
            if trace
                .state
                .contains(&delete_pred.of(vec![param.clone()]))
            {
                return Ok(false);
            }
        }

        let example = Rule::from_trace(trace, self.start_pu, trace.authorized)?;
        let example_id = self.arena.insert(example);

        let mut prematching: Vec<RuleId> = Vec::new();
        let mut contradicting: Vec<RuleId> = Vec::new();
        for &id in &self.active {
            let subs = self
                .arena
                .get(id)
                .prematching_subs(self.arena.get(example_id), &Substitution::new());
            if subs.is_empty() {
                continue;
            }
            prematching.push(id);
            if trace.authorized
                && subs
                    .iter()
                    .any(|sub| !self.arena.get(id).postmatches(self.arena.get(example_id), sub))
            {
                contradicting.push(id);
            }
        }

        let mut modified = false;
        let mut uncovered: IndexSet<RuleId> = IndexSet::new();

        if prematching.is_empty() && trace.authorized {
            debug!(example = %example_id, "no rule covers the example");
            modified = true;
            self.counter_examples.insert(example_id);
            uncovered.insert(example_id);
        }

        if !prematching.is_empty() && !trace.authorized {
            debug!(example = %example_id, "rules prematch a failed action, specialising");
            modified = true;
            self.failed_counter_examples.insert(example_id);

            for &id in &prematching {
                let newly_uncovered = self.specialize(id, example_id);
                for u in newly_uncovered {
                    let remaining: Vec<RuleId> = self.active.iter().copied().collect();
                    for r in remaining {
                        self.arena.remove_parent_recursive(r, u);
                    }
                    uncovered.insert(u);
                }
            }
        } else if !contradicting.is_empty() {
            debug!(example = %example_id, "rules contradict the example, specialising");
            modified = true;
            self.counter_examples.insert(example_id);

            for &id in &contradicting {
                uncovered.extend(self.specialize(id, example_id));
            }
        }

        for u in uncovered {
            self.generalize(u, rng)?;
        }

        Ok(modified)
    }

    /// Retract a rule that disagrees with an example: remove it from the
    /// active set and walk its parents, returning orphaned leaves and
    /// recursing into parents that still contradict.
    fn specialize(&mut self, rule_id: RuleId, example_id: RuleId) -> IndexSet<RuleId> {
        self.active.shift_remove(&rule_id);

        let mut uncovered = IndexSet::new();
        let parents: Vec<RuleId> = self.arena.get(rule_id).parents.iter().copied().collect();
        for parent in parents {
            if self.arena.get(parent).parents.is_empty() {
                uncovered.insert(parent);
                self.active.shift_remove(&parent);
            } else if self
                .arena
                .get(parent)
                .contradicts(self.arena.get(example_id))
            {
                uncovered.extend(self.specialize(parent, example_id));
            }
        }
        uncovered
    }

    /// Ensure the example is covered: attach it under an existing covering
    /// node, or build a least-general generalisation with some active rule,
    /// or fall back to inserting the example itself as a new root.
    pub fn generalize<R: Rng>(
        &mut self,
        example_id: RuleId,
        rng: &mut R,
    ) -> Result<(), LearnError> {
        // Step 1: some node of an active sub-DAG may already cover it.
        let mut least_level: Option<usize> = None;
        let mut least_general: IndexSet<RuleId> = IndexSet::new();
        for &id in &self.active {
            let Some(lgr) = self
                .arena
                .least_general_rule_covering(id, self.arena.get(example_id))
            else {
                continue;
            };
            let level = self.arena.generality_level(lgr);
            match least_level {
                Some(best) if level > best => {}
                Some(best) if level == best => {
                    least_general.insert(lgr);
                }
                _ => {
                    least_level = Some(level);
                    least_general = IndexSet::from([lgr]);
                }
            }
        }

        for &id in &least_general {
            if id == example_id {
                continue;
            }
            self.arena.insert_parent(id, example_id)?;
        }
        let mut recovered = !least_general.is_empty();

        // Step 2: try to least-generally generalise an active rule with the
        // example.
        if !recovered {
            let current: Vec<RuleId> = self.active.iter().copied().collect();
            for rule_id in current {
                if let Some(gen_rule) = self.try_generalize_rule(rule_id, example_id, rng) {
                    debug!(rule = %rule_id, "replaced by its generalisation");
                    let gen_id = self.arena.insert(gen_rule);
                    self.active.insert(gen_id);
                    self.active.shift_remove(&rule_id);
                    recovered = true;
                    break;
                }
            }
        }

        // Step 3: the example enters the active set as its own root.
        if !recovered {
            debug!(example = %example_id, "inserted as a new root rule");
            if self.config.always_generalize_constants {
                let lifted = self
                    .arena
                    .get(example_id)
                    .make_use_of_variables(example_id);
                let lifted_id = self.arena.insert(lifted);
                self.active.insert(lifted_id);
            } else {
                self.active.insert(example_id);
            }
        }

        Ok(())
    }

    /// Run POST-GENERALIZATION and up to `generalization_trials` LGG
    /// searches between a rule and an example; return the best candidate
    /// that is well-formed and respects every counter-example.
    fn try_generalize_rule<R: Rng>(
        &self,
        rule_id: RuleId,
        example_id: RuleId,
        rng: &mut R,
    ) -> Option<Rule> {
        let rule = self.arena.get(rule_id);
        let example = self.arena.get(example_id);

        let mut subr = Substitution::new();
        let mut subx = Substitution::new();
        let mut gen_vars = BTreeSet::new();
        if !rule.post_generalizes(example, &mut subr, &mut subx, &mut gen_vars, rng) {
            return None;
        }

        let mut best: Option<Rule> = None;
        for _ in 0..self.config.generalization_trials.max(1) {
            let mut sr = subr.clone();
            let mut sx = subx.clone();
            let mut gv = gen_vars.clone();

            let mut gen_preconds = rule.any_generalization(example, &mut sr, &mut sx, &mut gv, rng);

            // Bindings agreed on by both sides are constants of the
            // generalisation; identities are noise.
            for (from, to) in sr.mapping().clone() {
                if sx.get(&from).is_some_and(|t| *t == to) {
                    let rename = Substitution::from_pairs(
                        std::slice::from_ref(&from),
                        std::slice::from_ref(&to),
                        true,
                    );
                    gen_preconds = rename.apply_all(&gen_preconds);
                    sr.remove(&from);
                    sx.remove(&from);
                }
                if from == to {
                    sr.remove(&from);
                }
            }

            let inv_sr = sr.inverse();
            let inv_sx = sx.inverse();

            // Preconditions of either side missing from the generalisation
            // are candidates for the removed set; necessities merge by mean.
            let mut removed_preconds: BTreeSet<Literal> = BTreeSet::new();
            let mut precond_lists: BTreeMap<Literal, Vec<f64>> = BTreeMap::new();
            let mut const_lists: BTreeMap<Term, Vec<f64>> = BTreeMap::new();

            for (source, inv) in [(rule, &inv_sr), (example, &inv_sx)] {
                for (lit, &nec) in &source.preconds_necessities {
                    let gen_version = inv.apply(lit);
                    if !gen_preconds.contains(&gen_version) {
                        removed_preconds.insert(gen_version.clone());
                    }
                    precond_lists.entry(gen_version).or_default().push(nec);
                }
                for (cst, &nec) in &source.consts_necessities {
                    if inv.apply_term(cst) == *cst {
                        const_lists.entry(cst.clone()).or_default().push(nec);
                    }
                }
            }

            let mut precond_necessities: BTreeMap<Literal, f64> = BTreeMap::new();
            for (lit, vals) in precond_lists {
                let mean = vals.iter().sum::<f64>() / vals.len() as f64;
                if mean <= 0.01 && !gen_preconds.contains(&lit) {
                    removed_preconds.remove(&lit);
                    continue;
                }
                precond_necessities.insert(lit, mean);
            }
            let const_necessities: BTreeMap<Term, f64> = const_lists
                .into_iter()
                .map(|(cst, vals)| {
                    let mean = vals.iter().sum::<f64>() / vals.len() as f64;
                    (cst, mean)
                })
                .collect();

            let mut gen_rule = Rule::new(
                gen_preconds,
                inv_sr.apply(&rule.action_literal),
                inv_sr.apply_all(&rule.add),
                inv_sr.apply_all(&rule.del),
                BTreeSet::from([rule_id, example_id]),
                self.start_pu,
                true,
            );
            gen_rule.removed_preconditions = removed_preconds;

            for (lit, nec) in &precond_necessities {
                if gen_rule.preconditions.contains(lit)
                    || gen_rule.removed_preconditions.contains(lit)
                {
                    gen_rule.preconds_necessities.insert(lit.clone(), *nec);
                }
            }
            for (cst, nec) in &const_necessities {
                if gen_rule.consts_necessities.contains_key(cst) {
                    gen_rule.consts_necessities.insert(cst.clone(), *nec);
                }
            }

            if !gen_rule.well_formed() {
                continue;
            }
            if self
                .counter_examples
                .iter()
                .any(|&cx| gen_rule.contradicts(self.arena.get(cx)))
            {
                continue;
            }
            if self
                .failed_counter_examples
                .iter()
                .any(|&fcx| gen_rule.prematches(self.arena.get(fcx)))
            {
                continue;
            }

            let better = match &best {
                None => true,
                Some(current) => {
                    if self.config.least_general {
                        gen_rule.preconditions.len() > current.preconditions.len()
                    } else {
                        gen_rule.preconditions.len() < current.preconditions.len()
                    }
                }
            };
            if better {
                best = Some(gen_rule);
            }
        }

        best
    }
}

/// Project the active rules into a domain over the source vocabulary, for
/// the internal planner and the explorer's simulated rollouts.
pub fn domain_from_rules(domain: &Domain, arena: &RuleArena, active: &IndexSet<RuleId>) -> Domain {
    let actions = active
        .iter()
        .map(|&id| {
            let rule = arena.get(id);
            ActionSchema::new(
                rule.action_literal.clone(),
                rule.preconditions.iter().cloned().collect(),
                Vec::new(),
                rule.add.iter().cloned().collect(),
                rule.del.iter().cloned().collect(),
            )
        })
        .collect();

    let mut projected = Domain::new(
        domain.types.clone(),
        domain.predicates.clone(),
        domain.constants.clone(),
        actions,
    );
    projected.removed_facts = domain.removed_facts.clone();
    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use irale_logic::{Predicate, State};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn c(name: &str) -> Term {
        Term::constant(name)
    }

    fn fact(p: &str, args: &[&str]) -> Literal {
        Predicate::new(p, args.len()).of(args.iter().map(|a| c(a)).collect())
    }

    fn delete_pred() -> Predicate {
        Predicate::new("delete", 1)
    }

    fn move_trace(x: &str, y: &str, from: &str) -> Trace {
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
        Trace::new(state, fact("move", &[x, y]), true, new_state)
    }

    fn reviser() -> Reviser {
        Reviser::new(LearnerConfig::default(), 0.5)
    }

    #[test]
    fn first_observation_becomes_a_root_rule() {
        let mut reviser = reviser();
        let mut rng = StdRng::seed_from_u64(1);

        let modified = reviser
            .update_knowledge(&move_trace("a", "b", "c"), &delete_pred(), &mut rng)
            .unwrap();

        assert!(modified);
        assert_eq!(reviser.active.len(), 1);
        assert_eq!(reviser.counter_examples.len(), 1);
        // The example covers itself.
        let id = *reviser.active.first().unwrap();
        let cx = *reviser.counter_examples.first().unwrap();
        assert!(reviser.arena.get(id).covers(reviser.arena.get(cx)));
    }

    #[test]
    fn second_observation_generalizes() {
        let mut reviser = reviser();
        let mut rng = StdRng::seed_from_u64(1);

        reviser
            .update_knowledge(&move_trace("a", "b", "c"), &delete_pred(), &mut rng)
            .unwrap();
        let modified = reviser
            .update_knowledge(&move_trace("b", "c", "a"), &delete_pred(), &mut rng)
            .unwrap();

        assert!(modified);
        assert_eq!(reviser.active.len(), 1);
        let id = *reviser.active.first().unwrap();
        let rule = reviser.arena.get(id);

        // The generalised rule has two parents and covers both examples.
        assert_eq!(rule.parents.len(), 2);
        for &cx in &reviser.counter_examples {
            assert!(rule.covers(reviser.arena.get(cx)));
        }
        assert!(rule.well_formed());
    }

    #[test]
    fn covered_observation_modifies_nothing() {
        let mut reviser = reviser();
        let mut rng = StdRng::seed_from_u64(1);

        reviser
            .update_knowledge(&move_trace("a", "b", "c"), &delete_pred(), &mut rng)
            .unwrap();
        let modified = reviser
            .update_knowledge(&move_trace("a", "b", "c"), &delete_pred(), &mut rng)
            .unwrap();

        assert!(!modified);
        assert_eq!(reviser.active.len(), 1);
    }

    #[test]
    fn failed_action_specializes_prematching_rules() {
        let mut reviser = reviser();
        let mut rng = StdRng::seed_from_u64(1);

        reviser
            .update_knowledge(&move_trace("a", "b", "c"), &delete_pred(), &mut rng)
            .unwrap();
        reviser
            .update_knowledge(&move_trace("b", "c", "a"), &delete_pred(), &mut rng)
            .unwrap();

        // The generalised rule now prematches a state where the same action
        // nevertheless fails.
        let state = State::from_facts([
            fact("clear", &["c"]),
            fact("clear", &["a"]),
            fact("on", &["c", "b"]),
        ]);
        let failed = Trace::new(state.clone(), fact("move", &["c", "a"]), false, state);

        let modified = reviser
            .update_knowledge(&failed, &delete_pred(), &mut rng)
            .unwrap();

        assert!(modified);
        assert_eq!(reviser.failed_counter_examples.len(), 1);
        // No remaining active rule prematches the failed example.
        let fcx = *reviser.failed_counter_examples.first().unwrap();
        for &id in &reviser.active {
            assert!(!reviser
                .arena
                .get(id)
                .prematches(reviser.arena.get(fcx)));
        }
        // The orphaned leaves are re-covered.
        for &cx in &reviser.counter_examples {
            let covered = reviser
                .active
                .iter()
                .any(|&id| reviser.arena.get(id).covers(reviser.arena.get(cx)));
            assert!(covered);
        }
    }

    #[test]
    fn actions_on_deleted_instances_are_ignored() {
        let mut reviser = reviser();
        let mut rng = StdRng::seed_from_u64(1);

        let mut trace = move_trace("a", "b", "c");
        trace.state.add_fact(&delete_pred().of(vec![c("a")]));

        let modified = reviser
            .update_knowledge(&trace, &delete_pred(), &mut rng)
            .unwrap();
        assert!(!modified);
        assert!(reviser.active.is_empty());
    }

    #[test]
    fn ungrounded_actions_are_rejected() {
        let mut reviser = reviser();
        let mut rng = StdRng::seed_from_u64(1);

        let mut trace = move_trace("a", "b", "c");
        trace.action = Predicate::new("move", 2).of(vec![Term::var("X"), c("b")]);

        assert!(reviser
            .update_knowledge(&trace, &delete_pred(), &mut rng)
            .is_err());
    }

    #[test]
    fn domain_projection_reflects_active_rules() {
        let mut reviser = reviser();
        let mut rng = StdRng::seed_from_u64(1);
        reviser
            .update_knowledge(&move_trace("a", "b", "c"), &delete_pred(), &mut rng)
            .unwrap();

        let on = Predicate::new("on", 2);
        let clear = Predicate::new("clear", 1);
        let mv = Predicate::new("move", 2);
        let base = Domain::new(
            vec![],
            BTreeSet::from([on, clear, mv]),
            BTreeSet::new(),
            vec![],
        );

        let projected = domain_from_rules(&base, &reviser.arena, &reviser.active);
        assert_eq!(projected.actions.len(), 1);
        assert_eq!(
            projected.actions[0].action_literal,
            fact("move", &["a", "b"])
        );
    }
}
