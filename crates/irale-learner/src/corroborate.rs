//! Observation-driven necessity updates.
//!
//! Each observed trace corroborates every rule whose action literal is
//! compatible with the observed action. The update factors through three
//! quantities per rule:
//!
//! - `protRT`: cd over the substitutions predicting the *wrong* effects —
//!   the probability none of them fired;
//! - `covRT`: the complement of the product of dgcds over substitutions
//!   predicting the *observed* effects — the probability at least one
//!   correct substitution fired;
//! - `covMT`: the model-level coverage combining every rule with the
//!   unknown-rule probability.
//!
//! Each necessity `N_k` is then rescaled by the ratio of the conditional
//! (`¬N_k`) versions of these quantities, with sticky 0/1 short-circuits
//! and a clamp to `[0, 0.95]`.

use crate::belief::{cd_prob, dgcd_prob, process_effects, Disjunct};
use crate::unknown::UnknownRule;
use indexmap::IndexSet;
use irale_logic::{Literal, Term, Trace};
use irale_rules::{RuleArena, RuleId};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::trace;

/// Upper clamp for corroborated necessities; exact 0 and 1 stay sticky.
pub const NECESSITY_CLAMP: f64 = 0.95;

enum NecessityKey {
    Precond(Literal),
    Constant(Term),
}

fn disjunct_mentions(disj: &Disjunct, key: &NecessityKey) -> bool {
    match key {
        NecessityKey::Precond(lit) => disj.preconditions.contains(lit),
        NecessityKey::Constant(term) => disj.constants.contains(term),
    }
}

/// The probability that no substitution of `neg` fired and that at least
/// one of `pos` did, as (`protRT`, `nCovRT`).
fn prot_and_ncov(
    precond_necs: &BTreeMap<Literal, f64>,
    const_necs: &BTreeMap<Term, f64>,
    pos: &[Disjunct],
    neg: &[Disjunct],
) -> (f64, f64) {
    let prot = cd_prob(precond_necs, const_necs, neg);

    let mut n_cov = 1.0;
    let mut conditional: Vec<Disjunct> = neg.to_vec();
    for disj in pos {
        n_cov *= dgcd_prob(precond_necs, const_necs, disj, &conditional);
        conditional.push(disj.clone());
    }

    (prot, n_cov)
}

/// Corroborate every compatible rule on one trace, updating necessities in
/// place, and condition the action's unknown-rule model. `p_ue` is the
/// unknown-rule probability of the observed experiment, computed before the
/// update.
#[allow(clippy::too_many_arguments)]
pub fn corroborate_rules<R: Rng>(
    arena: &mut RuleArena,
    active: &IndexSet<RuleId>,
    unknown_rules: &mut BTreeMap<Literal, UnknownRule>,
    trace_obs: &Trace,
    all_insts: &[Term],
    estimated_rules_per_action: usize,
    rng: &mut R,
) {
    let (added, removed) = trace_obs.state.difference(&trace_obs.new_state);
    let mut effects = added;
    effects.extend(removed);

    let mut rules_for_action: Vec<RuleId> = Vec::new();
    let mut pos_sigmas: BTreeMap<RuleId, Vec<Disjunct>> = BTreeMap::new();
    let mut neg_sigmas: BTreeMap<RuleId, Vec<Disjunct>> = BTreeMap::new();
    let mut prot_rts: BTreeMap<RuleId, f64> = BTreeMap::new();
    let mut cov_rts: BTreeMap<RuleId, f64> = BTreeMap::new();

    let mut cov_mt = 1.0;
    for &id in active {
        let rule = arena.get(id);
        if !Literal::compatible(&rule.action_literal, &trace_obs.action) {
            continue;
        }
        rules_for_action.push(id);

        let (pos, neg) = process_effects(
            rule,
            &trace_obs.state,
            &trace_obs.action,
            &effects,
            all_insts,
            rng,
        );
        let pos: Vec<Disjunct> = pos.into_iter().collect();
        let neg: Vec<Disjunct> = neg.into_iter().collect();

        let (prot, n_cov) = prot_and_ncov(
            &rule.preconds_necessities,
            &rule.consts_necessities,
            &pos,
            &neg,
        );
        if prot == 0.0 {
            // Some misfiring substitution certainly fired; the observation
            // carries no usable signal.
            return;
        }

        pos_sigmas.insert(id, pos);
        neg_sigmas.insert(id, neg);
        prot_rts.insert(id, prot);
        cov_rts.insert(id, 1.0 - n_cov);
        cov_mt *= n_cov;
    }

    let p_ue = unknown_rules
        .get(&trace_obs.action)
        .map(|u| u.compute_prob(&trace_obs.state).0)
        .unwrap_or(0.0);

    let k = estimated_rules_per_action as f64;
    let l = rules_for_action.len() as f64;
    let p_ueff = if l < k { 1.0 / (k - l) } else { 1.0 };

    if let Some(unknown) = unknown_rules.get_mut(&trace_obs.action) {
        unknown.corroborate_failure(&trace_obs.state);
    }

    cov_mt *= 1.0 - p_ue * p_ueff;
    cov_mt = 1.0 - cov_mt;

    for &id in &rules_for_action {
        let rule = arena.get(id);
        let prot_rt = prot_rts[&id];

        let keys: Vec<NecessityKey> = rule
            .preconds_necessities
            .keys()
            .map(|l| NecessityKey::Precond(l.clone()))
            .chain(
                rule.consts_necessities
                    .keys()
                    .map(|t| NecessityKey::Constant(t.clone())),
            )
            .collect();

        let mut updated_preconds: BTreeMap<Literal, f64> = BTreeMap::new();
        let mut updated_consts: BTreeMap<Term, f64> = BTreeMap::new();

        for key in keys {
            let current = match &key {
                NecessityKey::Precond(lit) => rule.preconds_necessities[lit],
                NecessityKey::Constant(term) => rule.consts_necessities[term],
            };

            // Sticky certainties and degenerate denominators pass through.
            if current == 0.0 || current == 1.0 || prot_rt == 0.0 || cov_mt == 0.0 {
                match key {
                    NecessityKey::Precond(lit) => {
                        updated_preconds.insert(lit, current);
                    }
                    NecessityKey::Constant(term) => {
                        updated_consts.insert(term, current);
                    }
                }
                continue;
            }

            let filtered_neg: Vec<Disjunct> = neg_sigmas[&id]
                .iter()
                .filter(|d| !disjunct_mentions(d, &key))
                .cloned()
                .collect();
            let filtered_pos: Vec<Disjunct> = pos_sigmas[&id]
                .iter()
                .filter(|d| !disjunct_mentions(d, &key))
                .cloned()
                .collect();

            let (prot_given, n_cov_given) = prot_and_ncov(
                &rule.preconds_necessities,
                &rule.consts_necessities,
                &filtered_pos,
                &filtered_neg,
            );
            let cov_given = 1.0 - n_cov_given;

            let mut cov_mt_without = 1.0 - p_ue * p_ueff;
            for &other in &rules_for_action {
                if other != id {
                    cov_mt_without *= 1.0 - cov_rts[&other];
                }
            }
            cov_mt_without = 1.0 - cov_mt_without;

            let updated = (prot_given * (cov_given + n_cov_given * cov_mt_without)
                / prot_rt
                / cov_mt
                * current)
                .clamp(0.0, NECESSITY_CLAMP);

            match key {
                NecessityKey::Precond(lit) => {
                    updated_preconds.insert(lit, updated);
                }
                NecessityKey::Constant(term) => {
                    updated_consts.insert(term, updated);
                }
            }
        }

        trace!(rule = %id, "necessities corroborated");
        let rule = arena.get_mut(id);
        rule.preconds_necessities = updated_preconds;
        rule.consts_necessities = updated_consts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irale_logic::{Predicate, State};
    use irale_rules::Rule;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn c(name: &str) -> Term {
        Term::constant(name)
    }

    fn fact(p: &str, args: &[&str]) -> Literal {
        Predicate::new(p, args.len()).of(args.iter().map(|a| c(a)).collect())
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

    #[test]
    fn corroboration_keeps_necessities_in_bounds_and_ones_sticky() {
        let trace = move_trace("a", "b", "c");
        let rule = Rule::from_trace(&trace, 0.5, true).unwrap();

        let mut arena = RuleArena::new();
        let id = arena.insert(rule);
        let active = IndexSet::from([id]);
        let mut unknown = BTreeMap::new();
        let insts: Vec<Term> = ["a", "b", "c"].iter().map(|n| c(n)).collect();
        let mut rng = StdRng::seed_from_u64(5);

        let sticky: Vec<Literal> = arena
            .get(id)
            .preconds_necessities
            .iter()
            .filter(|(_, n)| **n == 1.0)
            .map(|(l, _)| l.clone())
            .collect();
        assert!(!sticky.is_empty());

        for _ in 0..3 {
            corroborate_rules(
                &mut arena,
                &active,
                &mut unknown,
                &trace,
                &insts,
                2,
                &mut rng,
            );
        }

        let rule = arena.get(id);
        for (lit, n) in &rule.preconds_necessities {
            assert!((0.0..=1.0).contains(n), "{lit}: {n}");
        }
        for n in rule.consts_necessities.values() {
            assert!((0.0..=1.0).contains(n));
        }
        for lit in &sticky {
            assert_eq!(rule.preconds_necessities[lit], 1.0);
        }
    }

    #[test]
    fn corroboration_ignores_incompatible_actions() {
        let trace = move_trace("a", "b", "c");
        let rule = Rule::from_trace(&trace, 0.5, true).unwrap();
        let before = rule.preconds_necessities.clone();

        let mut arena = RuleArena::new();
        let id = arena.insert(rule);
        let active = IndexSet::from([id]);
        let mut unknown = BTreeMap::new();
        let insts: Vec<Term> = ["a", "b", "c"].iter().map(|n| c(n)).collect();
        let mut rng = StdRng::seed_from_u64(5);

        let other = Trace::new(
            State::new(),
            fact("push", &["a", "b"]),
            false,
            State::new(),
        );
        corroborate_rules(
            &mut arena,
            &active,
            &mut unknown,
            &other,
            &insts,
            2,
            &mut rng,
        );

        assert_eq!(arena.get(id).preconds_necessities, before);
    }
}
