//! The domain simulator: vocabulary, action application and the reserved
//! meta-actions.
//!
//! A [`Domain`] owns the types, predicates, constants and action schemas of
//! a planning problem and can apply a grounded action literal to a state.
//! Three meta-predicates are reserved and synthesised when the vocabulary
//! does not already provide them:
//!
//! - `reset/0` restores a configured reset state;
//! - `delete/1` marks an instance as unavailable until reset — any action
//!   naming a deleted instance is rejected;
//! - `remove-fact/1` transiently removes a fact from the state; calling it
//!   with no argument restores every fact removed since the last call.

use crate::action::ActionSchema;
use crate::error::LogicError;
use crate::literal::{Literal, Predicate};
use crate::state::{Goal, State};
use crate::substitution::Substitution;
use crate::term::{Term, TermType};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

pub const RESET_ACTION: &str = "reset";
pub const DELETE_ACTION: &str = "delete";
pub const REMOVE_FACT_ACTION: &str = "remove-fact";

#[derive(Clone, Debug, Default)]
pub struct Domain {
    pub types: Vec<Arc<TermType>>,
    pub predicates: BTreeSet<Predicate>,
    pub constants: BTreeSet<Term>,
    pub actions: Vec<ActionSchema>,

    reset_action: ActionSchema,
    delete_action: ActionSchema,
    remove_fact_action: ActionSchema,
    delete_pred: Predicate,

    pub reset_state: Option<State>,
    pub removed_facts: BTreeSet<Literal>,
}

impl Domain {
    pub fn new(
        types: Vec<Arc<TermType>>,
        predicates: BTreeSet<Predicate>,
        constants: BTreeSet<Term>,
        actions: Vec<ActionSchema>,
    ) -> Self {
        let mut domain = Domain {
            types,
            predicates,
            constants,
            actions,
            ..Default::default()
        };

        let reset_pred = domain
            .predicates
            .iter()
            .find(|p| p.name == RESET_ACTION)
            .cloned()
            .unwrap_or_else(|| Predicate::new(RESET_ACTION, 0));
        let delete_pred = domain
            .predicates
            .iter()
            .find(|p| p.name == DELETE_ACTION)
            .cloned()
            .unwrap_or_else(|| Predicate::new(DELETE_ACTION, 1));
        let remove_fact_pred = domain
            .predicates
            .iter()
            .find(|p| p.name == REMOVE_FACT_ACTION)
            .cloned()
            .unwrap_or_else(|| Predicate::new(REMOVE_FACT_ACTION, 1));

        domain.predicates.insert(reset_pred.clone());
        domain.predicates.insert(delete_pred.clone());
        domain.predicates.insert(remove_fact_pred.clone());

        let obj = Term::var("obj");
        domain.reset_action = ActionSchema::nullary(reset_pred.of(vec![]));
        domain.delete_action = ActionSchema::nullary(delete_pred.of(vec![obj.clone()]));
        domain.remove_fact_action = ActionSchema::nullary(remove_fact_pred.of(vec![obj]));
        domain.delete_pred = delete_pred;

        domain
    }

    /// Apply a grounded action literal to a state. Returns the successor
    /// state and whether the domain accepted the action. A rejected action
    /// leaves the state untouched.
    pub fn try_action(
        &mut self,
        state: &State,
        instances: &[Term],
        action_literal: &Literal,
        only_add: bool,
    ) -> (State, bool) {
        let all_insts: Vec<Term> = instances
            .iter()
            .chain(self.constants.iter())
            .cloned()
            .collect();

        if action_literal.predicate == self.reset_action.action_literal.predicate {
            return match &self.reset_state {
                Some(reset) => (reset.clone(), true),
                None => (state.clone(), false),
            };
        }

        if action_literal.predicate == self.delete_action.action_literal.predicate {
            if state.contains(action_literal) {
                return (state.clone(), false);
            }
            let target = &action_literal.parameters[0];
            let mut new_state = State::new();
            for fact in &state.facts {
                if !fact.parameters.contains(target) {
                    new_state.add_fact(fact);
                }
            }
            new_state.add_fact(action_literal);
            return (new_state, true);
        }

        if action_literal.predicate == self.remove_fact_action.action_literal.predicate {
            if action_literal.parameters.is_empty() {
                let mut new_state = state.clone();
                new_state.add_facts(std::mem::take(&mut self.removed_facts));
                return (new_state, true);
            }
            // The fact to remove travels as the textual name of the single
            // parameter.
            let to_remove =
                match self.parse_literal(action_literal.parameters[0].name(), instances, false) {
                    Ok(lit) => lit,
                    Err(_) => return (state.clone(), false),
                };
            if state.contains(&to_remove) {
                self.removed_facts.insert(to_remove.clone());
            }
            let mut new_state = state.clone();
            new_state.remove_fact(&to_remove);
            return (new_state, true);
        }

        for param in &action_literal.parameters {
            if state.contains(&self.delete_pred.of(vec![param.clone()])) {
                return (state.clone(), false);
            }
        }

        for schema in &self.actions {
            if schema.action_literal.predicate != action_literal.predicate {
                continue;
            }

            let mut sub = Substitution::new();
            let mut valid = true;
            for (schema_param, lit_param) in schema
                .action_literal
                .parameters
                .iter()
                .zip(action_literal.parameters.iter())
            {
                if !TermType::type_subsumes(schema_param.ty(), lit_param.ty()) {
                    valid = false;
                    break;
                }
                if schema_param == lit_param || sub.get_inverse(lit_param).is_some() {
                    continue;
                }
                sub.set(schema_param, lit_param);
            }
            if !valid {
                continue;
            }

            let positive_subs = unify_facts(state, &all_insts, &schema.true_precond, &sub, true);
            if positive_subs.is_empty() {
                continue;
            }
            let mut all_subs = Vec::new();
            for p_sub in &positive_subs {
                all_subs.extend(unify_facts(
                    state,
                    &all_insts,
                    &schema.false_precond,
                    p_sub,
                    false,
                ));
            }
            let applied = match all_subs.last() {
                Some(sub) => sub,
                None => continue,
            };

            let mut new_state = state.clone();
            new_state.add_facts(schema.add.iter().map(|l| applied.apply(l)));
            if !only_add {
                new_state.remove_facts(schema.del.iter().map(|l| applied.apply(l)));
            }
            return (new_state, true);
        }

        (state.clone(), false)
    }

    /// Parse a literal from `pred(a, b)`-style text. A leading `-` on the
    /// predicate name makes it negative. Objects are resolved against the
    /// problem instances and domain constants.
    pub fn parse_literal(
        &self,
        text: &str,
        instances: &[Term],
        is_action: bool,
    ) -> Result<Literal, LogicError> {
        let all_insts: Vec<Term> = instances
            .iter()
            .chain(self.constants.iter())
            .cloned()
            .collect();

        let mut positive = true;
        let mut body = text.trim();
        if let Some(rest) = body.strip_prefix('-') {
            positive = false;
            body = rest;
        }

        let mut tokens = body
            .split(|c: char| c == '(' || c == ')' || c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty());

        let pred_name = tokens.next().ok_or(LogicError::EmptyLiteral)?;
        let predicate = if is_action {
            self.action_pred_by_name(pred_name)
                .ok_or_else(|| LogicError::UnknownActionPredicate {
                    name: pred_name.to_string(),
                })?
        } else {
            self.pred_by_name(pred_name)
                .ok_or_else(|| LogicError::UnknownPredicate {
                    name: pred_name.to_string(),
                })?
        };

        let mut params = Vec::new();
        for token in tokens {
            let inst = all_insts
                .iter()
                .find(|i| i.name() == token)
                .cloned()
                .ok_or_else(|| {
                    warn!(object = token, literal = text, "unknown object in literal");
                    LogicError::UnknownObject {
                        name: token.to_string(),
                    }
                })?;
            params.push(inst);
        }

        if params.len() != predicate.arity {
            warn!(
                predicate = %predicate.name,
                expected = predicate.arity,
                actual = params.len(),
                "arity mismatch while parsing literal"
            );
            return Err(LogicError::ArityMismatch {
                name: predicate.name,
                expected: predicate.arity,
                actual: params.len(),
            });
        }

        Ok(Literal {
            predicate,
            parameters: params,
            positive,
        })
    }

    /// The domain's action schemas; with `include_meta`, the three reserved
    /// meta-actions are appended.
    pub fn get_actions(&self, include_meta: bool) -> Vec<ActionSchema> {
        let mut actions = self.actions.clone();
        if include_meta {
            actions.push(self.reset_action.clone());
            actions.push(self.delete_action.clone());
            actions.push(self.remove_fact_action.clone());
        }
        actions
    }

    pub fn action_literals(&self, include_meta: bool) -> BTreeSet<Literal> {
        self.get_actions(include_meta)
            .iter()
            .map(|a| a.action_literal.clone())
            .collect()
    }

    pub fn pred_by_name(&self, name: &str) -> Option<Predicate> {
        self.predicates.iter().find(|p| p.name == name).cloned()
    }

    pub fn constant_by_name(&self, name: &str) -> Option<Term> {
        self.constants.iter().find(|c| c.name() == name).cloned()
    }

    pub fn type_by_name(&self, name: &str) -> Option<Arc<TermType>> {
        self.types.iter().find(|t| t.name == name).cloned()
    }

    pub fn action_pred_by_name(&self, name: &str) -> Option<Predicate> {
        for meta in [
            &self.reset_action,
            &self.delete_action,
            &self.remove_fact_action,
        ] {
            if meta.action_literal.predicate.name == name {
                return Some(meta.action_literal.predicate.clone());
            }
        }
        self.actions
            .iter()
            .find(|a| a.action_literal.predicate.name == name)
            .map(|a| a.action_literal.predicate.clone())
    }

    pub fn delete_pred(&self) -> &Predicate {
        &self.delete_pred
    }

    pub fn add_type(&mut self, ty: Arc<TermType>) {
        debug_assert!(!self.types.iter().any(|t| t.name == ty.name));
        self.types.push(ty);
    }

    pub fn add_predicate(&mut self, pred: Predicate) {
        self.predicates.insert(pred);
    }

    pub fn add_constant(&mut self, constant: Term) {
        self.constants.insert(constant);
    }

    pub fn add_action(&mut self, action: ActionSchema) {
        self.actions.push(action);
    }

    pub fn set_reset_state(&mut self, state: State) {
        self.reset_state = Some(state);
    }
}

/// Recursively extend `sub` so that every fact of `facts` is grounded over
/// `instances` and its containment in `state` matches `true_facts`.
fn unify_facts(
    state: &State,
    instances: &[Term],
    facts: &[Literal],
    sub: &Substitution,
    true_facts: bool,
) -> Vec<Substitution> {
    let (fact, rest) = match facts.split_last() {
        Some(split) => split,
        None => return vec![sub.clone()],
    };

    let mut result = Vec::new();
    for new_sub in sub.expand_uncovered(fact.parameters.iter(), instances.iter(), true) {
        let found = state.contains(&new_sub.apply(fact));
        if found == true_facts {
            result.extend(unify_facts(state, instances, rest, &new_sub, true_facts));
        }
    }
    result
}

/// A problem instance over a domain: objects, initial state, goal and an
/// optional scripted prefix of actions.
#[derive(Clone, Debug, Default)]
pub struct Problem {
    pub instances: BTreeSet<Term>,
    pub initial_state: State,
    pub goal: Goal,
    pub headstart_actions: Vec<Literal>,
}

impl Problem {
    pub fn instance_by_name(&self, domain: &Domain, name: &str) -> Option<Term> {
        domain
            .constant_by_name(name)
            .or_else(|| self.instances.iter().find(|i| i.name() == name).cloned())
    }
}

pub fn filter_by_type(atoms: &BTreeSet<Term>, ty: Option<&Arc<TermType>>) -> BTreeSet<Term> {
    atoms
        .iter()
        .filter(|a| TermType::type_subsumes(a.ty(), ty))
        .cloned()
        .collect()
}

pub fn filter_deleted(atoms: &[Term], state: &State, delete_pred: &Predicate) -> Vec<Term> {
    atoms
        .iter()
        .filter(|a| !state.contains(&delete_pred.of(vec![(*a).clone()])))
        .cloned()
        .collect()
}
