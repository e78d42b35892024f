//! Necessity-based belief computations.
//!
//! Every rule element (precondition or constant) carries a *necessity*: the
//! posterior probability that the true underlying rule requires it. A
//! candidate substitution is summarised by its [`Disjunct`] — the elements
//! it leaves unverified. The probability that *no* substitution of a set
//! fires is a conjunction of disjunctions over element necessities,
//! evaluated by a pruned binary decision tree ([`cd_prob`]); its sequential
//! derivative ([`dgcd_prob`]) conditions one disjunction on a set of others.
//!
//! [`generate_random_subs`] samples the substitutions themselves: action
//! and effect constants are ρ-generalised to fresh variables, remaining
//! variables are ordered by necessity impact and instantiated by
//! loss-weighted draws, so the sample leans towards substitutions that
//! nearly satisfy the rule.

use irale_logic::{Literal, State, Substitution, Term, Trace};
use irale_rules::Rule;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};

/// Mass below which a decision-tree branch is pruned. Load-bearing for the
/// exponential traversal.
pub const PRECISION: f64 = 1e-3;

/// Substitution sample sizes.
pub const SUBS_FOR_FULFILMENT: usize = 20;
pub const SUBS_FOR_CORROBORATION: usize = 20;

/// The unverified elements of one candidate substitution: preconditions
/// whose image is absent from the state, and constants that were remapped.
/// The substitution fires only if none of them turns out necessary.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Disjunct {
    pub preconditions: Vec<Literal>,
    pub constants: Vec<Term>,
}

impl Disjunct {
    pub fn is_empty(&self) -> bool {
        self.preconditions.is_empty() && self.constants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.preconditions.len() + self.constants.len()
    }

    fn contains_precond(&self, lit: &Literal) -> bool {
        self.preconditions.contains(lit)
    }

    fn contains_const(&self, term: &Term) -> bool {
        self.constants.contains(term)
    }

    /// Does the disjunct contain the given necessity choice?
    fn contains(&self, choice: &Choice) -> bool {
        match choice {
            Choice::Precond(lit) => self.contains_precond(lit),
            Choice::Constant(term) => self.contains_const(term),
        }
    }

    fn without(&self, choice: &Choice) -> Disjunct {
        match choice {
            Choice::Precond(lit) => Disjunct {
                preconditions: self
                    .preconditions
                    .iter()
                    .filter(|l| *l != lit)
                    .cloned()
                    .collect(),
                constants: self.constants.clone(),
            },
            Choice::Constant(term) => Disjunct {
                preconditions: self.preconditions.clone(),
                constants: self
                    .constants
                    .iter()
                    .filter(|t| *t != term)
                    .cloned()
                    .collect(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Choice {
    Precond(Literal),
    Constant(Term),
}

/// Necessity choices ordered with certainty-1 entries first, so the tree
/// commits to them before spending branch mass.
fn ordered_choices(
    precond_necs: &BTreeMap<Literal, f64>,
    const_necs: &BTreeMap<Term, f64>,
) -> Vec<(Choice, f64)> {
    let mut choices = Vec::with_capacity(precond_necs.len() + const_necs.len());
    for (lit, &nec) in precond_necs {
        let choice = (Choice::Precond(lit.clone()), nec);
        if nec == 1.0 {
            choices.insert(0, choice);
        } else {
            choices.push(choice);
        }
    }
    for (term, &nec) in const_necs {
        let choice = (Choice::Constant(term.clone()), nec);
        if nec == 1.0 {
            choices.insert(0, choice);
        } else {
            choices.push(choice);
        }
    }
    choices
}

fn cd_prob_tree(choices: &[(Choice, f64)], choice_index: usize, branch_power: f64, cds: &[Disjunct]) -> f64 {
    let Some((choice, choice_power)) = choices.get(choice_index) else {
        return branch_power;
    };

    let mut cds_true = Vec::new();
    let mut cds_false = Vec::new();
    let mut prune_false_branch = false;
    let mut found_choice = false;

    for disj in cds {
        // An empty disjunction can never be satisfied.
        if disj.is_empty() {
            return 0.0;
        }

        if disj.contains(choice) {
            found_choice = true;
            let remainder = disj.without(choice);
            if remainder.is_empty() {
                prune_false_branch = true;
            } else {
                cds_false.push(remainder);
            }
        } else {
            cds_true.push(disj.clone());
            cds_false.push(disj.clone());
        }
    }

    if !found_choice {
        return cd_prob_tree(choices, choice_index + 1, branch_power, &cds_true);
    }

    let mut true_branch = choice_power * branch_power;
    if true_branch >= PRECISION {
        true_branch = cd_prob_tree(choices, choice_index + 1, branch_power * choice_power, &cds_true);
    }

    prune_false_branch |= branch_power * (1.0 - choice_power) < PRECISION;
    if prune_false_branch {
        return true_branch;
    }

    true_branch + cd_prob_tree(
        choices,
        choice_index + 1,
        branch_power * (1.0 - choice_power),
        &cds_false,
    )
}

/// `P(every disjunction is satisfied by some necessary element)` — the
/// probability that none of the substitutions summarised by `cds` fires.
/// `cd_prob` of an empty set is 1; any empty disjunction forces 0.
pub fn cd_prob(
    precond_necs: &BTreeMap<Literal, f64>,
    const_necs: &BTreeMap<Term, f64>,
    cds: &[Disjunct],
) -> f64 {
    let choices = ordered_choices(precond_necs, const_necs);
    cd_prob_tree(&choices, 0, 1.0, cds)
}

/// `P(at least one element of `disj` is unverified | every disjunction of
/// `conditional_cds` is satisfied)`, by sequential factorisation: each
/// element contributes its necessity, reweighted by the ratio of the
/// conditional cd with and without the disjunctions it appears in.
pub fn dgcd_prob(
    precond_necs: &BTreeMap<Literal, f64>,
    const_necs: &BTreeMap<Term, f64>,
    disj: &Disjunct,
    conditional_cds: &[Disjunct],
) -> f64 {
    let mut disj = disj.clone();
    let mut conditional: Vec<Disjunct> = conditional_cds.to_vec();

    let mut dgcd = 0.0;
    let mut cond_factor = 1.0;

    while !disj.is_empty() {
        let (choice, ni_val) = if let Some(lit) = disj.preconditions.pop() {
            let val = precond_necs.get(&lit).copied().unwrap_or(0.0);
            (Choice::Precond(lit), val)
        } else {
            let term = disj.constants.pop().expect("disjunct is non-empty");
            let val = const_necs.get(&term).copied().unwrap_or(0.0);
            (Choice::Constant(term), val)
        };

        let choices = ordered_choices(precond_necs, const_necs);
        let cd_val = cd_prob_tree(&choices, 0, 1.0, &conditional);

        let mut ngcd_val = ni_val;
        if cd_val > 0.0 {
            let filtered: Vec<Disjunct> = conditional
                .iter()
                .filter(|d| !d.contains(&choice))
                .cloned()
                .collect();
            ngcd_val *= cd_prob_tree(&choices, 0, 1.0, &filtered) / cd_val;
        }

        dgcd += cond_factor * ngcd_val;
        cond_factor *= 1.0 - ngcd_val;

        conditional = conditional.iter().map(|d| d.without(&choice)).collect();
    }

    dgcd
}

/// The disjunct of one substitution against a state: preconditions whose
/// image is missing and constants that do not map to themselves either way.
fn disjunct_of(rule: &Rule, state: &State, sub: &Substitution) -> Disjunct {
    let preconditions = rule
        .preconds_necessities
        .keys()
        .filter(|lit| !state.contains(&sub.apply(lit)))
        .cloned()
        .collect();
    let constants = rule
        .consts_necessities
        .keys()
        .filter(|c| {
            sub.apply_term(c) != **c || sub.get_inverse(c).is_some_and(|from| from != *c)
        })
        .cloned()
        .collect();
    Disjunct {
        preconditions,
        constants,
    }
}

/// Cd over the disjuncts of a substitution set. 1 when the action literal
/// is not even compatible (no substitution could concern this rule).
pub fn compute_cd_prob(
    rule: &Rule,
    state: &State,
    action: &Literal,
    subs: &BTreeSet<Substitution>,
) -> f64 {
    if !Literal::compatible(&rule.action_literal, action) {
        return 1.0;
    }

    let cds: BTreeSet<Disjunct> = subs
        .iter()
        .map(|sub| disjunct_of(rule, state, sub))
        .collect();
    let cds: Vec<Disjunct> = cds.into_iter().collect();

    cd_prob(&rule.preconds_necessities, &rule.consts_necessities, &cds)
}

fn select_weighted<'a, T, R: Rng>(items: &'a [T], weights: &[f64], rng: &mut R) -> &'a T {
    debug_assert_eq!(items.len(), weights.len());
    let sample: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (item, w) in items.iter().zip(weights.iter()) {
        cumulative += w;
        if cumulative >= sample {
            return item;
        }
    }
    items.last().expect("non-empty candidate set")
}

/// Necessity lost by binding `var` to `inst` under `rho`/`sigma`: the sum of
/// necessities of preconditions that can no longer be satisfied, plus the
/// necessities of any constants the binding overrides.
#[allow(clippy::too_many_arguments)]
fn necessity_loss(
    rule: &Rule,
    state: &State,
    rho: &Substitution,
    sigma: &Substitution,
    var: &Term,
    inst: &Term,
    instances_left: &BTreeSet<Term>,
) -> f64 {
    let mut temp_sigma = sigma.clone();
    temp_sigma.set(var, inst);

    let mut loss = 0.0;
    for (precond, nec) in &rule.preconds_necessities {
        let subbed = temp_sigma.apply(&rho.apply(precond));

        if subbed.grounded() {
            if !state.contains(&subbed) {
                loss += nec;
            }
            continue;
        }

        // A non-grounded precondition is only lost when no queried fact can
        // still be reached with the instances that remain available.
        let reachable = state.query(&subbed).iter().any(|fact| {
            subbed
                .parameters
                .iter()
                .zip(fact.parameters.iter())
                .all(|(p, f)| !p.is_var() || instances_left.contains(f))
        });
        if !reachable {
            loss += nec;
        }
    }

    let original = rho.get_inverse(var);
    if let Some(orig) = original {
        if !orig.is_var() && orig != inst {
            loss += rule.consts_necessities.get(orig).copied().unwrap_or(0.0);
        }
    }
    if original.map(|o| o != inst).unwrap_or(true) {
        if let Some(nec) = rule.consts_necessities.get(inst) {
            loss += nec;
        }
    }

    loss
}

/// Sample substitutions binding the rule to a grounded action at a state.
///
/// The action-literal binding is forced; effect constants are ρ-generalised
/// so they can rebind; the remaining variables are ranked by necessity
/// impact and instantiated one by one, weighting instances by how little
/// necessity their choice sacrifices. When the full space is smaller than
/// `max_random_subs` it is enumerated exhaustively instead.
#[allow(clippy::too_many_arguments)]
pub fn generate_random_subs<R: Rng>(
    rule: &Rule,
    state: &State,
    action: &Literal,
    instances: &[Term],
    mut rho: Substitution,
    mut sigma: Substitution,
    max_random_subs: usize,
    subs: &mut BTreeSet<Substitution>,
    rng: &mut R,
) {
    let mut gen_vars: BTreeSet<Term> = BTreeSet::new();
    let mut vars_to_map: BTreeSet<Term> = BTreeSet::new();
    let mut remain_constants: BTreeSet<Term> = BTreeSet::new();

    // Action-literal positions pin down part of the substitution.
    let pre_subbed = sigma.apply(&rho.apply(&rule.action_literal));
    for (i, (t1, t2)) in pre_subbed
        .parameters
        .iter()
        .zip(action.parameters.iter())
        .enumerate()
    {
        if t1 == t2 {
            if *t1 == rule.action_literal.parameters[i] {
                remain_constants.insert(t1.clone());
            }
            continue;
        }
        if sigma.get_inverse(t2).is_some() {
            return;
        }
        if t1.is_var() {
            sigma.set(t1, t2);
        } else {
            let var = rule.make_new_var(&mut gen_vars, t1);
            rho.set(t1, &var);
            sigma.set(&var, t2);
        }
    }

    // Effect parameters must be mapped; effect constants are generalised so
    // the sample can contemplate rebinding them.
    for eff in rule.add.iter().chain(rule.del.iter()) {
        let gen_eff = rho.apply(eff);
        for param in &gen_eff.parameters {
            if sigma.apply_term(param).is_var() {
                vars_to_map.insert(param.clone());
            } else if !param.is_var() && !remain_constants.contains(param) {
                let var = rule.make_new_var(&mut gen_vars, param);
                rho.set(param, &var);
                vars_to_map.insert(var);
            }
        }
    }

    // Remaining rule parameters: variables join the map set; constants that
    // appear in neither action literal nor effects stay constant.
    for param in &rule.parameters {
        let gen = rho.apply_term(param);
        if sigma.apply_term(&gen) != gen || remain_constants.contains(&gen) {
            continue;
        }
        if gen.is_var() {
            vars_to_map.insert(gen);
        }
    }

    for removed in &rule.removed_preconditions {
        for param in &removed.parameters {
            let gen = rho.apply_term(param);
            if sigma.apply_term(&gen) != gen || remain_constants.contains(&gen) {
                continue;
            }
            if gen.is_var() {
                vars_to_map.insert(gen);
            }
        }
    }

    let available: BTreeSet<Term> = instances
        .iter()
        .filter(|inst| !remain_constants.contains(inst) && sigma.get_inverse(inst).is_none())
        .cloned()
        .collect();

    let mut max_subs: usize = 1;
    for i in 0..vars_to_map.len() {
        max_subs = max_subs.saturating_mul(available.len().saturating_sub(i));
    }

    if max_subs <= max_random_subs {
        for expanded in sigma.expand_uncovered(vars_to_map.iter(), available.iter(), true) {
            subs.insert(rho.merge(&expanded));
        }
        return;
    }

    // Rank variables by decreasing necessity impact.
    let mut sorted_vars: Vec<(f64, Term)> = vars_to_map
        .iter()
        .map(|var| {
            let mut impact: f64 = rule
                .preconds_necessities
                .iter()
                .filter(|(prec, _)| rho.apply(prec).parameters.contains(var))
                .map(|(_, nec)| nec)
                .sum();
            if let Some(original) = rho.get_inverse(var) {
                if !original.is_var() {
                    impact += rule.consts_necessities.get(original).copied().unwrap_or(0.0);
                }
            }
            (-impact, var.clone())
        })
        .collect();
    sorted_vars.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    for _ in subs.len()..max_random_subs {
        let mut random_sigma = sigma.clone();
        let mut instances_left = available.clone();

        for (_, var) in &sorted_vars {
            if instances_left.is_empty() {
                break;
            }

            let candidates: Vec<Term> = instances_left.iter().cloned().collect();
            let losses: Vec<f64> = candidates
                .iter()
                .map(|inst| {
                    necessity_loss(rule, state, &rho, &random_sigma, var, inst, &instances_left)
                })
                .collect();

            let max_loss = losses.iter().cloned().fold(0.0, f64::max) * 2.0;
            let loss_sum = max_loss * losses.len() as f64 - losses.iter().sum::<f64>();

            let selected = if loss_sum > 0.0 {
                let weights: Vec<f64> =
                    losses.iter().map(|loss| (max_loss - loss) / loss_sum).collect();
                select_weighted(&candidates, &weights, rng).clone()
            } else {
                candidates[rng.gen_range(0..candidates.len())].clone()
            };

            random_sigma.set(var, &selected);
            instances_left.remove(&selected);
        }

        subs.insert(rho.merge(&random_sigma));
    }
}

/// Probability that the rule's conditions are fulfilled at `(state,
/// action)`, with the prematch flag and the substitution sample used.
pub fn fulfilment_probability<R: Rng>(
    rule: &Rule,
    state: &State,
    action: &Literal,
    instances: &[Term],
    rng: &mut R,
) -> (f64, bool, BTreeSet<Substitution>) {
    let probe = Trace::new(state.clone(), action.clone(), true, state.clone());
    let example = Rule::from_trace_unchecked(&probe, rule.start_pu, false);

    let mut subs = rule.prematching_subs(&example, &Substitution::new());
    let prematches = !subs.is_empty();

    generate_random_subs(
        rule,
        state,
        action,
        instances,
        Substitution::new(),
        Substitution::new(),
        SUBS_FOR_FULFILMENT,
        &mut subs,
        rng,
    );

    let fulfilment = 1.0 - compute_cd_prob(rule, state, action, &subs);
    (fulfilment, prematches, subs)
}

/// Split sampled substitutions into those reproducing the observed effects
/// exactly (σ⁺) and those predicting anything else (σ⁻), as disjuncts.
pub fn process_effects<R: Rng>(
    rule: &Rule,
    state: &State,
    action: &Literal,
    effects: &BTreeSet<Literal>,
    instances: &[Term],
    rng: &mut R,
) -> (BTreeSet<Disjunct>, BTreeSet<Disjunct>) {
    let mut subs = BTreeSet::new();
    generate_random_subs(
        rule,
        state,
        action,
        instances,
        Substitution::new(),
        Substitution::new(),
        SUBS_FOR_CORROBORATION,
        &mut subs,
        rng,
    );

    let mut sigma_pos = BTreeSet::new();
    let mut sigma_neg = BTreeSet::new();

    for sub in &subs {
        let disj = disjunct_of(rule, state, sub);

        let mut image: BTreeSet<Literal> = rule.add.iter().map(|l| sub.apply(l)).collect();
        image.extend(rule.del.iter().map(|l| sub.apply(l)));

        if *action == sub.apply(&rule.action_literal) && image == *effects {
            sigma_pos.insert(disj);
        } else {
            sigma_neg.insert(disj);
        }
    }

    (sigma_pos, sigma_neg)
}
