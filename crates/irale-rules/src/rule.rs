//! Extended Deterministic STRIPS rules.
//!
//! A [`Rule`] pairs an action literal with a precondition set and add/delete
//! effects, plus the learner's bookkeeping: per-precondition and per-constant
//! necessity probabilities, the preconditions dropped by past
//! generalisations, and the parent links of the generalisation DAG.
//!
//! Counter-examples are themselves rules (built from a trace), so matching
//! and generalisation operate uniformly on rule pairs.

use crate::error::RuleError;
use crate::graph::RuleId;
use irale_logic::{Literal, State, Substitution, Term, TermType, Trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An action-literal binding σ together with an instance expansion θ and
/// their merge, used when a rule is applied to a concrete state.
#[derive(Clone, Debug)]
pub struct SigmaTheta {
    pub sigma: Substitution,
    pub theta: Substitution,
    pub st: Substitution,
}

impl SigmaTheta {
    pub fn new(sigma: Substitution, theta: Substitution) -> Self {
        let st = sigma.merge(&theta);
        SigmaTheta { sigma, theta, st }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    pub action_literal: Literal,
    pub preconditions: BTreeSet<Literal>,
    /// Preconditions dropped by a past generalisation; they keep their
    /// necessity entries.
    pub removed_preconditions: BTreeSet<Literal>,
    pub add: BTreeSet<Literal>,
    pub del: BTreeSet<Literal>,
    pub parents: BTreeSet<RuleId>,
    pub preconds_necessities: BTreeMap<Literal, f64>,
    pub consts_necessities: BTreeMap<Term, f64>,
    /// Every distinct term occurring in the rule, in canonical order.
    pub parameters: Vec<Term>,
    pub start_pu: f64,
}

/// Does `var` occur as a parameter of some literal?
pub(crate) fn var_occurs(var: &Term, literals: &BTreeSet<Literal>) -> bool {
    literals.iter().any(|l| l.parameters.contains(var))
}

/// Is `from` connected to some term of `to` through the co-occurrence graph?
pub(crate) fn linked(
    links: &BTreeMap<Term, BTreeSet<Term>>,
    from: &Term,
    to: &BTreeSet<Term>,
) -> bool {
    if to.contains(from) {
        return true;
    }

    let mut to_visit = BTreeSet::from([from.clone()]);
    let mut visited = BTreeSet::new();

    while let Some(current) = to_visit.pop_first() {
        visited.insert(current.clone());
        if let Some(neighbours) = links.get(&current) {
            for next in neighbours {
                if visited.contains(next) {
                    continue;
                }
                if to.contains(next) {
                    return true;
                }
                to_visit.insert(next.clone());
            }
        }
    }

    false
}

/// Co-occurrence graph over the parameters of a precondition set.
fn cooccurrence_links(preconditions: &BTreeSet<Literal>) -> BTreeMap<Term, BTreeSet<Term>> {
    let mut links: BTreeMap<Term, BTreeSet<Term>> = BTreeMap::new();
    for precond in preconditions {
        for p1 in &precond.parameters {
            let entry = links.entry(p1.clone()).or_default();
            for p2 in &precond.parameters {
                if p1 != p2 {
                    entry.insert(p2.clone());
                }
            }
        }
    }
    links
}

/// Keep only the preconditions whose every parameter is linked, through
/// precondition co-occurrence, to an action-literal or effect parameter.
fn filter_linked(
    preconditions: BTreeSet<Literal>,
    action_literal: &Literal,
    add: &BTreeSet<Literal>,
    del: &BTreeSet<Literal>,
) -> BTreeSet<Literal> {
    let links = cooccurrence_links(&preconditions);

    let mut targets: BTreeSet<Term> = action_literal.parameters.iter().cloned().collect();
    for eff in add.iter().chain(del.iter()) {
        targets.extend(eff.parameters.iter().cloned());
    }

    preconditions
        .into_iter()
        .filter(|precond| {
            precond
                .parameters
                .iter()
                .all(|param| linked(&links, param, &targets))
        })
        .collect()
}

impl Rule {
    /// Build a rule from parts. With `filter`, preconditions not linked to
    /// the action literal or effects are discarded.
    pub fn new(
        preconditions: BTreeSet<Literal>,
        action_literal: Literal,
        add: BTreeSet<Literal>,
        del: BTreeSet<Literal>,
        parents: BTreeSet<RuleId>,
        start_pu: f64,
        filter: bool,
    ) -> Self {
        let preconditions = if filter {
            filter_linked(preconditions, &action_literal, &add, &del)
        } else {
            preconditions
        };

        let mut rule = Rule {
            action_literal,
            preconditions,
            removed_preconditions: BTreeSet::new(),
            add,
            del,
            parents,
            preconds_necessities: BTreeMap::new(),
            consts_necessities: BTreeMap::new(),
            parameters: Vec::new(),
            start_pu,
        };
        rule.extract_parameters();
        rule.init_necessities();
        rule
    }

    /// Build an example rule from a trace: preconditions are the source
    /// state's facts (linked-filtered), effects are the state difference.
    ///
    /// An authorized, filtered example that comes out malformed indicates a
    /// broken observation stream and is rejected.
    pub fn from_trace(trace: &Trace, start_pu: f64, filter: bool) -> Result<Self, RuleError> {
        let rule = Rule::from_trace_unchecked(trace, start_pu, filter);
        if trace.authorized && filter && !rule.well_formed() {
            return Err(RuleError::Malformed {
                rule: rule.to_string(),
            });
        }
        Ok(rule)
    }

    /// [`Rule::from_trace`] without the well-formedness gate. Used for probe
    /// examples built from a bare `(state, action)` pair, which carry no
    /// effects and are not expected to be well-formed.
    pub fn from_trace_unchecked(trace: &Trace, start_pu: f64, filter: bool) -> Self {
        let (add, del) = trace.state.difference(&trace.new_state);
        let preconditions: BTreeSet<Literal> = trace.state.facts.iter().cloned().collect();

        Rule::new(
            preconditions,
            trace.action.clone(),
            add,
            del,
            BTreeSet::new(),
            start_pu,
            filter,
        )
    }

    fn extract_parameters(&mut self) {
        let mut params: BTreeSet<Term> = self.action_literal.parameters.iter().cloned().collect();
        for lit in self
            .preconditions
            .iter()
            .chain(&self.add)
            .chain(&self.del)
        {
            params.extend(lit.parameters.iter().cloned());
        }
        self.parameters = params.into_iter().collect();
    }

    /// Constants occurring in the preconditions.
    pub fn precondition_constants(&self) -> BTreeSet<Term> {
        self.preconditions
            .iter()
            .flat_map(|p| p.parameters.iter())
            .filter(|p| !p.is_var())
            .cloned()
            .collect()
    }

    fn init_necessities(&mut self) {
        let constants = self.precondition_constants();
        let components =
            (self.preconditions.len() + constants.len()) as f64 - self.del.len() as f64;
        let base = 1.0 - self.start_pu.powf(1.0 / components);

        for precond in &self.preconditions {
            // A delete effect's inverse precondition is known to be
            // necessary: it was observed to hold and to be consumed.
            let necessity = if self.del.contains(&-precond) { 1.0 } else { base };
            self.preconds_necessities.insert(precond.clone(), necessity);

            for param in &precond.parameters {
                if !param.is_var() {
                    self.consts_necessities.insert(param.clone(), base);
                }
            }
        }
    }

    /// Record preconditions dropped by a generalisation; their parameters
    /// join the rule's parameter list.
    pub fn set_removed_preconditions(&mut self, removed: BTreeSet<Literal>) {
        for lit in &removed {
            for param in &lit.parameters {
                if !self.parameters.contains(param) {
                    self.parameters.push(param.clone());
                }
            }
        }
        self.removed_preconditions = removed;
    }

    /// Smallest positive id such that `_V{id}` collides with no rule
    /// parameter and nothing in the blacklist.
    pub fn free_parameter_id(&self, blacklist: &BTreeSet<Term>) -> usize {
        let mut id = 0;
        loop {
            id += 1;
            let name = format!("_V{id}");
            let taken = self.parameters.iter().any(|p| p.name() == name)
                || blacklist.iter().any(|p| p.name() == name);
            if !taken {
                return id;
            }
        }
    }

    /// Mint a fresh generalisation variable for `param`, typed with the most
    /// general ancestor of `param`'s type.
    pub fn make_new_var(&self, gen_vars: &mut BTreeSet<Term>, param: &Term) -> Term {
        let id = self.free_parameter_id(gen_vars);
        let ty = param.ty().map(TermType::most_general);
        let var = match ty {
            Some(ty) => Term::typed_var(format!("_V{id}"), ty),
            None => Term::var(format!("_V{id}")),
        };
        gen_vars.insert(var.clone());
        var
    }

    /// Well-formedness: deletions are backed by preconditions, additions are
    /// not already preconditions, every add variable occurs in a
    /// precondition, and every precondition variable is linked to an
    /// action-literal or effect parameter.
    pub fn well_formed(&self) -> bool {
        let mut link_target: BTreeSet<Term> =
            self.action_literal.parameters.iter().cloned().collect();

        for del_eff in &self.del {
            if !self.preconditions.contains(&-del_eff) {
                return false;
            }
            link_target.extend(del_eff.parameters.iter().cloned());
        }

        let mut add_vars = BTreeSet::new();
        for add_eff in &self.add {
            if self.preconditions.contains(add_eff) {
                return false;
            }
            for p in &add_eff.parameters {
                add_vars.insert(p.clone());
                link_target.insert(p.clone());
            }
        }

        for var in &add_vars {
            if !var_occurs(var, &self.preconditions) {
                return false;
            }
        }

        let links = cooccurrence_links(&self.preconditions);
        links
            .keys()
            .all(|var| linked(&links, var, &link_target))
    }

    /// |preconditions| plus the constant occurrences within them.
    pub fn specificity(&self) -> usize {
        self.preconditions
            .iter()
            .map(|p| 1 + p.parameters.iter().filter(|t| !t.is_var()).count())
            .sum()
    }

    /// A copy of this rule with every ground constant replaced by a fresh
    /// variable; `self_id` becomes its only parent.
    pub fn make_use_of_variables(&self, self_id: RuleId) -> Rule {
        let mut gen_vars = BTreeSet::new();
        let mut gen_sub = Substitution::new();

        for param in &self.action_literal.parameters {
            if !param.is_var() {
                let var = self.make_new_var(&mut gen_vars, param);
                gen_sub.set(param, &var);
            }
        }

        let mut generalize_set = |lits: &BTreeSet<Literal>, gen_sub: &mut Substitution| {
            let mut out = BTreeSet::new();
            for lit in lits {
                for param in &lit.parameters {
                    if !param.is_var() && gen_sub.get(param).is_none() {
                        let var = self.make_new_var(&mut gen_vars, param);
                        gen_sub.set(param, &var);
                    }
                }
                out.insert(gen_sub.apply(lit));
            }
            out
        };

        let new_preconds = generalize_set(&self.preconditions, &mut gen_sub);
        let new_add = generalize_set(&self.add, &mut gen_sub);
        let new_del = generalize_set(&self.del, &mut gen_sub);

        Rule::new(
            new_preconds,
            gen_sub.apply(&self.action_literal),
            new_add,
            new_del,
            BTreeSet::from([self_id]),
            self.start_pu,
            true,
        )
    }

    /// Enumerate the `SigmaTheta` bindings under which this rule fires on
    /// `state` for a grounded action literal.
    pub fn applies(
        &self,
        state: &State,
        instances: &[Term],
        action_literal: &Literal,
        only_first: bool,
    ) -> Vec<SigmaTheta> {
        if *action_literal != self.action_literal {
            return Vec::new();
        }

        let sigma = Substitution::from_pairs(
            &self.action_literal.parameters,
            &action_literal.parameters,
            true,
        );

        let params: BTreeSet<Term> = self.parameters.iter().cloned().collect();
        let uncovered = sigma.uncovered(&params);
        let thetas = Substitution::new().expand_uncovered(uncovered.iter(), instances.iter(), true);

        let mut validated = Vec::new();
        for theta in thetas {
            let sigma_theta = SigmaTheta::new(sigma.clone(), theta);
            let verified = self
                .preconditions
                .iter()
                .all(|p| state.contains(&sigma_theta.st.apply(p)));
            if verified {
                validated.push(sigma_theta);
                if only_first {
                    break;
                }
            }
        }
        validated
    }

    /// Execute the rule's effects on a state under a chosen binding.
    pub fn apply(&self, state: &State, sigma_theta: &SigmaTheta) -> State {
        let mut new_state = state.clone();
        new_state.add_facts(self.add.iter().map(|l| sigma_theta.st.apply(l)));
        new_state.remove_facts(self.del.iter().map(|l| sigma_theta.st.apply(l)));
        new_state
    }

}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.action_literal)?;
        write!(f, " :- ")?;
        for (i, p) in self.preconditions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, " => ")?;
        for (i, e) in self.add.iter().chain(&self.del).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irale_logic::Predicate;

    fn c(name: &str) -> Term {
        Term::constant(name)
    }

    fn fact(p: &str, args: &[&str]) -> Literal {
        Predicate::new(p, args.len()).of(args.iter().map(|a| c(a)).collect())
    }

    fn blocks_trace() -> Trace {
        let state = State::from_facts([
            fact("on", &["a", "b"]),
            fact("on", &["b", "f1"]),
            fact("clear", &["a"]),
            fact("clear", &["f2"]),
            fact("block", &["a"]),
            fact("block", &["b"]),
        ]);
        let mut new_state = state.clone();
        new_state.remove_fact(&fact("on", &["a", "b"]));
        new_state.remove_fact(&fact("clear", &["f2"]));
        new_state.add_fact(&fact("on", &["a", "f2"]));
        new_state.add_fact(&fact("clear", &["b"]));

        Trace::new(state, fact("move", &["a", "f2"]), true, new_state)
    }

    #[test]
    fn example_rule_from_trace() {
        let trace = blocks_trace();
        let rule = Rule::from_trace(&trace, 0.5, true).unwrap();

        assert_eq!(rule.preconditions, trace.state.facts);
        assert_eq!(
            rule.add,
            BTreeSet::from([fact("on", &["a", "f2"]), fact("clear", &["b"])])
        );
        assert_eq!(
            rule.del,
            BTreeSet::from([-fact("on", &["a", "b"]), -fact("clear", &["f2"])])
        );
        for name in ["a", "b", "f2"] {
            assert!(rule.parameters.contains(&c(name)));
        }
        assert!(rule.well_formed());
    }

    #[test]
    fn necessities_are_sticky_for_delete_inverses() {
        let rule = Rule::from_trace(&blocks_trace(), 0.5, true).unwrap();

        // on(a, b) and clear(f2) are consumed, so they are known necessary.
        assert_eq!(rule.preconds_necessities[&fact("on", &["a", "b"])], 1.0);
        assert_eq!(rule.preconds_necessities[&fact("clear", &["f2"])], 1.0);

        // The rest start at 1 - p0^(1/k).
        let k = (rule.preconditions.len() + rule.precondition_constants().len()
            - rule.del.len()) as f64;
        let expected = 1.0 - 0.5f64.powf(1.0 / k);
        let other = rule.preconds_necessities[&fact("clear", &["a"])];
        assert!((other - expected).abs() < 1e-9);

        for necessity in rule.consts_necessities.values() {
            assert!((necessity - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn linked_filter_drops_disconnected_preconditions() {
        let base = blocks_trace();
        // An island fact sharing no object with the action or effects,
        // present on both sides so it is not an effect.
        let island = fact("on", &["q1", "q2"]);
        let mut state = base.state.clone();
        state.add_fact(&island);
        let mut new_state = base.new_state.clone();
        new_state.add_fact(&island);
        let trace = Trace::new(state, base.action, true, new_state);

        let rule = Rule::from_trace(&trace, 0.5, true).unwrap();
        assert!(!rule.preconditions.contains(&island));
    }

    #[test]
    fn well_formedness_violations() {
        let trace = blocks_trace();
        let good = Rule::from_trace(&trace, 0.5, true).unwrap();

        // A delete effect without its inverse precondition.
        let mut bad = good.clone();
        bad.preconditions.remove(&fact("on", &["a", "b"]));
        assert!(!bad.well_formed());

        // An add effect already present in the preconditions.
        let mut bad = good.clone();
        bad.preconditions.insert(fact("on", &["a", "f2"]));
        assert!(!bad.well_formed());

        // An add-effect variable that never occurs in the preconditions.
        let mut bad = good.clone();
        bad.add
            .insert(Predicate::new("clear", 1).of(vec![Term::var("W")]));
        assert!(!bad.well_formed());

        assert!(good.well_formed());
    }

    #[test]
    fn variable_mint_skips_taken_names() {
        let rule = Rule::from_trace(&blocks_trace(), 0.5, true).unwrap();
        let mut gen_vars = BTreeSet::new();
        let v1 = rule.make_new_var(&mut gen_vars, &c("a"));
        let v2 = rule.make_new_var(&mut gen_vars, &c("b"));
        assert_eq!(v1.name(), "_V1");
        assert_eq!(v2.name(), "_V2");
        assert!(v1.is_var() && v2.is_var());
    }

    #[test]
    fn make_use_of_variables_lifts_constants() {
        let rule = Rule::from_trace(&blocks_trace(), 0.5, true).unwrap();
        let lifted = rule.make_use_of_variables(RuleId::from_raw(0));

        assert!(lifted
            .parameters
            .iter()
            .all(|p| p.is_var()));
        assert_eq!(lifted.parents, BTreeSet::from([RuleId::from_raw(0)]));
        assert!(lifted.well_formed());
        assert_eq!(lifted.preconditions.len(), rule.preconditions.len());
    }

    #[test]
    fn applies_and_apply_execute_effects() {
        let trace = blocks_trace();
        let rule = Rule::from_trace(&trace, 0.5, true).unwrap();
        let instances: Vec<Term> = ["a", "b", "f1", "f2"].iter().map(|n| c(n)).collect();

        let bindings = rule.applies(&trace.state, &instances, &trace.action, false);
        assert_eq!(bindings.len(), 1);

        let result = rule.apply(&trace.state, &bindings[0]);
        assert_eq!(result, trace.new_state);
    }

    #[test]
    fn specificity_counts_preconditions_and_constants() {
        let rule = Rule::from_trace(&blocks_trace(), 0.5, true).unwrap();
        // 6 grounded preconditions, 2 parameters in two of them, 1 in four.
        assert_eq!(rule.specificity(), 6 + 2 * 2 + 4);
    }
}
