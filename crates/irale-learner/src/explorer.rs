//! The Bayesian explorer.
//!
//! Chooses the next grounded action by hill-climbing a *revision
//! probability*: the posterior probability that executing `(state, action)`
//! yields an observation forcing a change to the current model. Candidate
//! plans are random rollouts through the learner's own projected domain,
//! scored by `γ^depth · P(revision)` and cut off by a wall-clock budget.
//! Meta-actions (`reset`, `delete`, `remove-fact`) let the explorer escape
//! states the current model cannot leave.

use crate::belief::fulfilment_probability;
use crate::config::ExplorerConfig;
use crate::corroborate::corroborate_rules;
use crate::motivation::{MotivationTrace, RuleMotivation};
use crate::unknown::UnknownRule;
use indexmap::IndexSet;
use irale_logic::{
    Domain, Literal, Predicate, State, Substitution, Term, Trace, DELETE_ACTION,
    REMOVE_FACT_ACTION, RESET_ACTION,
};
use irale_rules::{RuleArena, RuleId};
use rand::seq::IteratorRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, warn};

/// A `(state, action)` pair already tried or under consideration.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Experiment {
    pub action: Literal,
    pub state: State,
}

fn is_meta(action: &Literal) -> bool {
    matches!(
        action.predicate.name.as_str(),
        RESET_ACTION | DELETE_ACTION | REMOVE_FACT_ACTION
    )
}

pub struct BayesianExplorer {
    config: ExplorerConfig,
    /// Buffered plan; the next action sits at the back.
    pub plan: Vec<Literal>,
    revision_probs: Vec<Option<f64>>,

    action_literals: BTreeSet<Literal>,
    action_predicates: BTreeSet<Predicate>,
    pub deleted_instances: BTreeSet<Term>,
    all_experiments: BTreeSet<Experiment>,
    pub unknown_rules: BTreeMap<Literal, UnknownRule>,

    positive_probs: Vec<f64>,
    negative_probs: Vec<f64>,
    last_rev_prob: Option<f64>,
    pub pos_mean: f64,
    pub neg_mean: f64,
    revs_no_prob: usize,
    revisions: usize,
    steps_without_revision: usize,
    iteration: usize,

    motivation: Option<MotivationTrace>,
}

impl BayesianExplorer {
    pub fn new(config: ExplorerConfig) -> Self {
        let motivation = if config.save_motivation_trace {
            Some(MotivationTrace::new(format!(
                "{}.json",
                config.motivation_trace_file_name
            )))
        } else {
            None
        };

        BayesianExplorer {
            config,
            plan: Vec::new(),
            revision_probs: Vec::new(),
            action_literals: BTreeSet::new(),
            action_predicates: BTreeSet::new(),
            deleted_instances: BTreeSet::new(),
            all_experiments: BTreeSet::new(),
            unknown_rules: BTreeMap::new(),
            positive_probs: Vec::new(),
            negative_probs: Vec::new(),
            last_rev_prob: None,
            pos_mean: 1.0,
            neg_mean: 0.0,
            revs_no_prob: 0,
            revisions: 0,
            steps_without_revision: 0,
            iteration: 0,
            motivation,
        }
    }

    pub fn start_pu(&self) -> f64 {
        self.config.start_pu
    }

    pub fn revisions(&self) -> usize {
        self.revisions
    }

    /// Ground the domain's action literals over the problem objects and set
    /// up one unknown-rule model per grounded action.
    pub fn set_action_literals(
        &mut self,
        base_action_literals: &BTreeSet<Literal>,
        domain: &Domain,
        instances: &[Term],
    ) {
        self.action_literals.clear();
        self.action_predicates.clear();

        let all_insts: Vec<Term> = instances
            .iter()
            .chain(domain.constants.iter())
            .cloned()
            .collect();

        for lit in base_action_literals {
            self.action_predicates.insert(lit.predicate.clone());
            for sub in
                Substitution::new().expand_uncovered(lit.parameters.iter(), all_insts.iter(), true)
            {
                self.action_literals.insert(sub.apply(lit));
            }
        }

        for action in &self.action_literals {
            self.unknown_rules.entry(action.clone()).or_insert_with(|| {
                UnknownRule::new(
                    self.config.start_pu,
                    domain,
                    all_insts.len(),
                    action.clone(),
                )
            });
        }
    }

    pub fn reset_problem(&mut self) {
        self.plan.clear();
        self.revision_probs.clear();
        self.all_experiments.clear();
        self.deleted_instances.clear();
    }

    /// Feed one observation to the belief engine. Meta-actions carry no
    /// signal about the domain's rules.
    pub fn corroborate<R: Rng>(
        &mut self,
        arena: &mut RuleArena,
        active: &IndexSet<RuleId>,
        trace: &Trace,
        all_insts: &[Term],
        rng: &mut R,
    ) {
        if is_meta(&trace.action) {
            return;
        }
        corroborate_rules(
            arena,
            active,
            &mut self.unknown_rules,
            trace,
            all_insts,
            self.config.estimated_rules_per_action,
            rng,
        );
    }

    /// Notify the explorer of the outcome of the last revision step: resets
    /// the plan on success and maintains the running means of revision
    /// probabilities for revised vs unrevised steps.
    pub fn inform_revision(&mut self, knowledge_revised: bool) {
        if knowledge_revised {
            self.revisions += 1;
            self.steps_without_revision = 0;
            self.plan.clear();
            self.revision_probs.clear();
        } else {
            self.steps_without_revision += 1;
        }

        match self.last_rev_prob {
            Some(p) => {
                if knowledge_revised {
                    self.positive_probs.push(p);
                } else {
                    self.negative_probs.push(p);
                }
            }
            None => {
                if knowledge_revised {
                    self.revs_no_prob += 1;
                }
            }
        }

        if !self.positive_probs.is_empty() {
            self.pos_mean =
                self.positive_probs.iter().sum::<f64>() / self.positive_probs.len() as f64;
        }
        if !self.negative_probs.is_empty() {
            self.neg_mean =
                self.negative_probs.iter().sum::<f64>() / self.negative_probs.len() as f64;
        }
    }

    /// Unknown-rule probability (and expected gain) of an experiment.
    pub fn compute_pu(&self, state: &State, action: &Literal) -> (f64, f64) {
        if is_meta(action) {
            return (0.0, 0.0);
        }
        self.unknown_rules
            .get(action)
            .map(|u| u.compute_prob(state))
            .unwrap_or((0.0, 0.0))
    }

    /// `1 − P(¬U_E) · Π_r (fulfils_r if prematches else 1 − fulfils_r)`.
    #[allow(clippy::too_many_arguments)]
    pub fn revision_probability<R: Rng>(
        &mut self,
        state: &State,
        action: &Literal,
        arena: &RuleArena,
        active: &IndexSet<RuleId>,
        all_insts: &[Term],
        rng: &mut R,
        make_trace: bool,
    ) -> f64 {
        let (pu, _) = self.compute_pu(state, action);

        let mut per_rule: Vec<(RuleId, bool, f64, BTreeSet<Substitution>)> = Vec::new();
        for &id in active {
            let rule = arena.get(id);
            if rule.action_literal.predicate != action.predicate {
                continue;
            }
            let (fulfilment, prematches, subs) =
                fulfilment_probability(rule, state, action, all_insts, rng);
            per_rule.push((id, prematches, fulfilment, subs));
        }

        let mut p_rev = 1.0 - pu;
        for (_, prematches, fulfilment, _) in &per_rule {
            p_rev *= if *prematches {
                *fulfilment
            } else {
                1.0 - fulfilment
            };
        }
        p_rev = 1.0 - p_rev;

        if make_trace {
            if let Some(motivation) = &mut self.motivation {
                let infos: Vec<RuleMotivation<'_>> = per_rule
                    .iter()
                    .map(|(id, prematches, fulfilment, subs)| RuleMotivation {
                        rule: arena.get(*id),
                        prematching: *prematches,
                        fulfilment: *fulfilment,
                        substitutions: subs,
                    })
                    .collect();
                motivation.record(state, action, p_rev, &infos);
            }
        }

        p_rev
    }

    /// Necessity-weighted expected posterior shift of trying `(state,
    /// action)` — the alternative utility to [`revision_probability`].
    #[allow(clippy::too_many_arguments)]
    pub fn expected_information_gain<R: Rng>(
        &mut self,
        state: &State,
        action: &Literal,
        arena: &RuleArena,
        active: &IndexSet<RuleId>,
        all_insts: &[Term],
        rng: &mut R,
    ) -> f64 {
        let mut fulfilments: Vec<(RuleId, f64)> = Vec::new();
        let mut impacts: BTreeMap<RuleId, f64> = BTreeMap::new();
        let mut prod_pr = 1.0;

        for &id in active {
            let rule = arena.get(id);
            if rule.action_literal.predicate != action.predicate {
                continue;
            }
            let (pr, _, _) = fulfilment_probability(rule, state, action, all_insts, rng);
            fulfilments.push((id, pr));
            prod_pr *= 1.0 - pr;

            let mut sum_nki = 0.0;
            for lit in rule.preconditions.iter().chain(&rule.removed_preconditions) {
                if !state.contains(lit) {
                    sum_nki += rule.preconds_necessities.get(lit).copied().unwrap_or(0.0);
                }
            }
            impacts.insert(id, sum_nki);
        }

        let (pu, _) = self.compute_pu(state, action);
        let pp = 1.0 - (1.0 - pu) * prod_pr;

        let mut gain = 0.0;
        for (id, pr) in &fulfilments {
            let snki = impacts[id];

            let mut pp_nki = 1.0 - pu;
            for (other, other_pr) in &fulfilments {
                if other != id {
                    pp_nki *= 1.0 - other_pr;
                }
            }
            pp_nki = 1.0 - pp_nki;

            let covered_shift = if pp > 0.0 {
                (1.0 - pp_nki / pp).abs()
            } else {
                0.0
            };
            let uncovered_shift = if pp < 1.0 {
                (1.0 - (1.0 - pp_nki) / (1.0 - pp)).abs()
            } else {
                0.0
            };
            gain += snki * (pr * covered_shift + (1.0 - pr) * uncovered_shift);
        }

        gain
    }

    /// 0: none, 1: reset, 2: delete. The delete share decays with the
    /// number of already-deleted instances.
    fn meta_action_type<R: Rng>(&self, instance_count: usize, rng: &mut R) -> u8 {
        if rng.gen::<f64>() >= self.config.meta_probability {
            return 0;
        }
        let delete_prob =
            (1.0 - self.config.base_reset_prob) / (1.0 + self.deleted_instances.len() as f64);
        if self.deleted_instances.len() < instance_count && rng.gen::<f64>() < delete_prob {
            return 2;
        }
        1
    }

    fn available_experiments(
        &self,
        new_deleted: &BTreeSet<Term>,
        state: &State,
        action_preds: &BTreeSet<Predicate>,
    ) -> BTreeSet<Literal> {
        self.action_literals
            .iter()
            .filter(|lit| {
                action_preds.contains(&lit.predicate)
                    && !self.all_experiments.contains(&Experiment {
                        action: (*lit).clone(),
                        state: state.clone(),
                    })
                    && lit.parameters.iter().all(|p| !new_deleted.contains(p))
            })
            .cloned()
            .collect()
    }

    fn not_deleted(&self, all_insts: &[Term]) -> BTreeSet<Term> {
        all_insts
            .iter()
            .filter(|inst| !self.deleted_instances.contains(inst))
            .cloned()
            .collect()
    }

    /// Pop the next action of the buffered plan, refilling it first if
    /// needed. Executed experiments are recorded so they are not proposed
    /// again; `reset` and `delete` maintain the deleted-instance set.
    #[allow(clippy::too_many_arguments)]
    pub fn get_next_action<R: Rng>(
        &mut self,
        state: &State,
        domain: &mut Domain,
        arena: &RuleArena,
        active: &IndexSet<RuleId>,
        instances: &[Term],
        rng: &mut R,
    ) -> Literal {
        self.iteration += 1;

        if self.iteration % 50 == 0 {
            if let Some(motivation) = &self.motivation {
                if let Err(err) = motivation.flush() {
                    warn!(%err, "could not flush motivation trace");
                }
            }
        }

        // Restore transiently removed facts before starting a fresh plan.
        if self.plan.is_empty() && !domain.removed_facts.is_empty() {
            domain.removed_facts.clear();
            if let Some(pred) = domain.action_pred_by_name(REMOVE_FACT_ACTION) {
                return Literal::new(pred, vec![]);
            }
        }

        if self.plan.is_empty() {
            self.generate_random_plan(state, domain, arena, active, instances, rng);
        }

        let Some(next_action) = self.plan.pop() else {
            return Literal::default();
        };
        self.last_rev_prob = self.revision_probs.pop().flatten();

        if !is_meta(&next_action) {
            self.all_experiments.insert(Experiment {
                action: next_action.clone(),
                state: state.clone(),
            });
            debug!(experiments = self.all_experiments.len(), action = %next_action, "executing experiment");
        }

        if next_action.predicate.name == RESET_ACTION {
            self.deleted_instances.clear();
        } else if next_action.predicate.name == DELETE_ACTION {
            self.deleted_instances
                .insert(next_action.parameters[0].clone());
        }

        next_action
    }

    /// Roll out candidate plans and keep the one of highest utility
    /// `γ^(depth+1) · P(revision)`; ties go to the shorter plan. Falls back
    /// to a uniformly random untried experiment when configured random, when
    /// stagnating, or with probability `random_discount^revisions`.
    #[allow(clippy::too_many_arguments)]
    fn generate_random_plan<R: Rng>(
        &mut self,
        state: &State,
        domain: &mut Domain,
        arena: &RuleArena,
        active: &IndexSet<RuleId>,
        instances: &[Term],
        rng: &mut R,
    ) {
        let started = Instant::now();
        let over_budget =
            |started: &Instant, limit: f64| started.elapsed().as_secs_f64() > limit;
        let limit = self.config.exploration_time_limit;

        let all_insts: Vec<Term> = instances
            .iter()
            .chain(domain.constants.iter())
            .cloned()
            .collect();

        self.plan.clear();
        self.revision_probs.clear();

        let reset_literal = domain
            .action_pred_by_name(RESET_ACTION)
            .map(|p| Literal::new(p, vec![]))
            .unwrap_or_default();

        let experiments =
            self.available_experiments(&self.deleted_instances.clone(), state, &self.action_predicates.clone());
        if experiments.is_empty() {
            self.plan.push(reset_literal);
            self.revision_probs.push(None);
            return;
        }

        let mut seed = experiments
            .iter()
            .choose(rng)
            .cloned()
            .unwrap_or_default();
        match self.meta_action_type(instances.len(), rng) {
            1 => seed = reset_literal.clone(),
            2 => {
                let not_deleted = self.not_deleted(&all_insts);
                if let Some(to_delete) = not_deleted.iter().choose(rng) {
                    if let Some(pred) = domain.action_pred_by_name(DELETE_ACTION) {
                        seed = pred.of(vec![to_delete.clone()]);
                    }
                }
            }
            _ => {}
        }
        self.plan.push(seed.clone());
        self.revision_probs.push(None);

        // Exploration floor: sometimes the sampled action goes out as-is.
        if self.config.random
            || rng.gen::<f64>() < self.config.random_discount.powi(self.revisions as i32)
        {
            return;
        }

        if self.steps_without_revision > self.config.stagnation_threshold
            && self.config.use_stagnation
        {
            self.steps_without_revision = 0;
            debug!("stagnation escape: keeping the random experiment");
            return;
        }

        let mut best_utility =
            self.revision_probability(state, &seed, arena, active, &all_insts, rng, false);
        let mut found_better = false;

        let remove_fact_pred = domain.action_pred_by_name(REMOVE_FACT_ACTION);

        // Optionally focus rollouts on the most specific rules' actions.
        let mean_specificity = if active.is_empty() {
            0.0
        } else {
            active
                .iter()
                .map(|&id| arena.get(id).specificity() as f64)
                .sum::<f64>()
                / active.len() as f64
        };
        let specific_preds: BTreeSet<Predicate> = active
            .iter()
            .filter(|&&id| arena.get(id).specificity() as f64 > 0.5 * mean_specificity)
            .map(|&id| arena.get(id).action_literal.predicate.clone())
            .collect();
        let limit_to_specifics = rng.gen::<f64>() < self.config.focus_specific_rules;

        'plans: for _ in 0..self.config.random_plans {
            if over_budget(&started, limit) {
                break;
            }

            let mut current_plan: Vec<Literal> = Vec::new();
            let mut current_rev_probs: Vec<Option<f64>> = Vec::new();
            let mut current_state = state.clone();
            let mut new_deleted = self.deleted_instances.clone();

            for depth in 0..self.config.plan_depth {
                if over_budget(&started, limit) {
                    break 'plans;
                }

                let experiments = if limit_to_specifics {
                    self.available_experiments(&new_deleted, &current_state, &specific_preds)
                } else {
                    self.available_experiments(
                        &new_deleted,
                        &current_state,
                        &self.action_predicates.clone(),
                    )
                };

                for _ in 0..self.config.random_experiments {
                    if over_budget(&started, limit) {
                        break 'plans;
                    }
                    if experiments.is_empty() {
                        break;
                    }

                    let experiment = experiments
                        .iter()
                        .choose(rng)
                        .cloned()
                        .expect("non-empty experiment set");

                    let remove_fact = !current_state.is_empty()
                        && rng.gen::<f64>()
                            > self
                                .config
                                .fact_removal_discount
                                .powi(self.revisions as i32);
                    let mut to_remove = current_state
                        .facts
                        .iter()
                        .choose(rng)
                        .cloned()
                        .unwrap_or_default();

                    if remove_fact {
                        // Aim the removal at a precondition of a rule that
                        // would fire on the candidate experiment.
                        let matching: Vec<RuleId> = active
                            .iter()
                            .copied()
                            .filter(|&id| {
                                arena.get(id).action_literal.unifies(&experiment)
                            })
                            .collect();
                        if let Some(&rule_id) = matching.iter().choose(rng) {
                            let rule = arena.get(rule_id);
                            if let Some(precond) = rule.preconditions.iter().choose(rng) {
                                let mut params = Vec::with_capacity(precond.parameters.len());
                                for p in &precond.parameters {
                                    let grounded = if p.is_var() {
                                        match rule
                                            .action_literal
                                            .parameters
                                            .iter()
                                            .position(|rp| rp == p)
                                        {
                                            Some(pos) => experiment.parameters[pos].clone(),
                                            None => all_insts
                                                .iter()
                                                .choose(rng)
                                                .cloned()
                                                .unwrap_or_else(|| p.clone()),
                                        }
                                    } else {
                                        p.clone()
                                    };
                                    params.push(grounded);
                                }
                                to_remove = Literal::new(precond.predicate.clone(), params);
                            }
                        }
                    }

                    let mut exp_plan = current_plan.clone();
                    if remove_fact {
                        if let Some(pred) = &remove_fact_pred {
                            exp_plan.insert(
                                0,
                                Literal::new(
                                    pred.clone(),
                                    vec![Term::constant(to_remove.to_string())],
                                ),
                            );
                        }
                    }
                    exp_plan.insert(0, experiment.clone());
                    if remove_fact {
                        if let Some(pred) = &remove_fact_pred {
                            exp_plan.insert(0, Literal::new(pred.clone(), vec![]));
                        }
                    }

                    let mut exp_state = current_state.clone();
                    if remove_fact {
                        exp_state.remove_fact(&to_remove);
                    }

                    let p_rev = self.revision_probability(
                        &exp_state,
                        &experiment,
                        arena,
                        active,
                        &all_insts,
                        rng,
                        false,
                    );
                    let utility = self.config.gamma.powi(depth as i32 + 1) * p_rev;

                    let take = utility > best_utility
                        || (utility == best_utility && exp_plan.len() < self.plan.len());
                    if take {
                        best_utility = best_utility.max(utility);
                        let mut probs = vec![Some(p_rev)];
                        probs.extend(current_rev_probs.iter().copied());
                        self.plan = exp_plan;
                        self.revision_probs = probs;
                        found_better = true;
                        debug!(utility, steps = self.plan.len(), "better plan found");
                    }
                }

                if active.is_empty() {
                    break 'plans;
                }
                if self.config.use_passthrough && best_utility >= self.config.passthrough_threshold
                {
                    break 'plans;
                }

                // Extend the partial plan by one action: a meta-action at
                // the root, a random applicable action below.
                let mut chosen_action = Literal::default();
                let mut p_rev: Option<f64> = None;
                let mut next_state: Option<State> = None;

                let meta = if depth == 0 {
                    self.meta_action_type(instances.len(), rng)
                } else {
                    0
                };
                match meta {
                    1 => {
                        new_deleted.clear();
                        chosen_action = reset_literal.clone();
                        let (s, ok) =
                            domain.try_action(&current_state, instances, &chosen_action, false);
                        if ok {
                            next_state = Some(s);
                        }
                    }
                    2 => {
                        let not_deleted = self.not_deleted(&all_insts);
                        if let Some(to_delete) = not_deleted.iter().choose(rng) {
                            if let Some(pred) = domain.action_pred_by_name(DELETE_ACTION) {
                                new_deleted.insert(to_delete.clone());
                                chosen_action = pred.of(vec![to_delete.clone()]);
                                let (s, ok) = domain.try_action(
                                    &current_state,
                                    instances,
                                    &chosen_action,
                                    false,
                                );
                                if ok {
                                    next_state = Some(s);
                                }
                            }
                        }
                    }
                    _ => {
                        let select_from: Vec<Literal> = self
                            .action_literals
                            .iter()
                            .filter(|lit| {
                                active.iter().any(|&id| {
                                    arena.get(id).action_literal.predicate == lit.predicate
                                })
                            })
                            .cloned()
                            .collect();
                        if select_from.is_empty() {
                            break 'plans;
                        }

                        let mut trials = self.config.random_action_trials;
                        while next_state.is_none() && trials > 0 {
                            trials -= 1;
                            chosen_action = select_from[rng.gen_range(0..select_from.len())].clone();
                            let (s, ok) = domain.try_action(
                                &current_state,
                                instances,
                                &chosen_action,
                                false,
                            );
                            if ok {
                                next_state = Some(s);
                            }
                        }

                        p_rev = Some(self.revision_probability(
                            &current_state,
                            &chosen_action,
                            arena,
                            active,
                            &all_insts,
                            rng,
                            false,
                        ));
                    }
                }

                let Some(reached) = next_state else {
                    break;
                };
                current_plan.insert(0, chosen_action);
                current_rev_probs.insert(0, p_rev);
                current_state = reached;
            }

            if active.is_empty() {
                break;
            }
            if self.config.use_passthrough && best_utility >= self.config.passthrough_threshold {
                break;
            }
        }

        if found_better && self.plan.len() == 1 && self.motivation.is_some() {
            let head = self.plan[0].clone();
            self.revision_probability(state, &head, arena, active, &all_insts, rng, true);
        }

        if self.steps_without_revision > self.config.stagnation_threshold
            && self.config.use_stagnation
        {
            self.steps_without_revision = 0;
        }
    }
}
