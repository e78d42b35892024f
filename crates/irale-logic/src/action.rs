//! Action schemas, conditions and grounded actions.

use crate::literal::Literal;
use crate::substitution::Substitution;
use crate::term::Term;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A STRIPS-style action schema: an action literal, positive and negative
/// preconditions, and add/delete effects. All effect and precondition
/// variables are drawn from the same pool as the action literal's.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionSchema {
    pub action_literal: Literal,
    pub true_precond: Vec<Literal>,
    pub false_precond: Vec<Literal>,
    pub add: Vec<Literal>,
    pub del: Vec<Literal>,
    /// Every distinct term of the schema, in first-occurrence order.
    pub parameters: Vec<Term>,
}

impl ActionSchema {
    pub fn new(
        action_literal: Literal,
        true_precond: Vec<Literal>,
        false_precond: Vec<Literal>,
        add: Vec<Literal>,
        del: Vec<Literal>,
    ) -> Self {
        let mut schema = ActionSchema {
            action_literal,
            true_precond,
            false_precond,
            add,
            del,
            parameters: Vec::new(),
        };
        schema.init_params();
        schema
    }

    /// A schema with an action literal and no conditions or effects.
    pub fn nullary(action_literal: Literal) -> Self {
        ActionSchema::new(action_literal, vec![], vec![], vec![], vec![])
    }

    fn init_params(&mut self) {
        let mut params: Vec<Term> = Vec::new();
        let mut push_unique = |params: &mut Vec<Term>, t: &Term| {
            if !params.contains(t) {
                params.push(t.clone());
            }
        };
        for p in &self.action_literal.parameters {
            push_unique(&mut params, p);
        }
        for lit in self
            .true_precond
            .iter()
            .chain(&self.false_precond)
            .chain(&self.add)
            .chain(&self.del)
        {
            for p in &lit.parameters {
                push_unique(&mut params, p);
            }
        }
        self.parameters = params;
    }
}

impl Default for ActionSchema {
    fn default() -> Self {
        ActionSchema::nullary(Literal::default())
    }
}

/// A literal together with the truth value it is required (or produced) to
/// have.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Condition {
    pub literal: Literal,
    pub truth: bool,
}

impl Condition {
    pub fn new(literal: Literal, truth: bool) -> Self {
        Condition { literal, truth }
    }

    pub fn ground(&self, sub: &Substitution) -> Condition {
        Condition {
            literal: sub.apply(&self.literal),
            truth: self.truth,
        }
    }

    /// A grounded condition holds in a state when containment matches the
    /// required truth. Non-grounded conditions never hold.
    pub fn reached(&self, state: &crate::state::State) -> bool {
        if !self.literal.grounded() {
            return false;
        }
        state.contains(&self.literal) == self.truth
    }
}

/// An action schema instantiated by a substitution: preconditions and
/// postconditions as truth-carrying conditions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroundedAction {
    pub action_literal: Literal,
    pub pre_conditions: Vec<Condition>,
    pub post_conditions: Vec<Condition>,
}

impl GroundedAction {
    pub fn from_schema(schema: &ActionSchema, sub: &Substitution) -> Self {
        let mut pre = Vec::new();
        for lit in &schema.true_precond {
            pre.push(Condition::new(sub.apply(lit), true));
        }
        for lit in &schema.false_precond {
            pre.push(Condition::new(sub.apply(lit), false));
        }

        let mut post = Vec::new();
        for lit in &schema.add {
            post.push(Condition::new(sub.apply(lit), true));
        }
        for lit in &schema.del {
            post.push(Condition::new(sub.apply(lit), false));
        }

        GroundedAction {
            action_literal: sub.apply(&schema.action_literal),
            pre_conditions: pre,
            post_conditions: post,
        }
    }

    /// Every variable still occurring anywhere in the action.
    pub fn variables(&self) -> BTreeSet<Term> {
        let mut vars = BTreeSet::new();
        for p in &self.action_literal.parameters {
            if p.is_var() {
                vars.insert(p.clone());
            }
        }
        for cond in self.pre_conditions.iter().chain(&self.post_conditions) {
            for p in &cond.literal.parameters {
                if p.is_var() {
                    vars.insert(p.clone());
                }
            }
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Predicate;
    use crate::state::State;

    #[test]
    fn schema_parameters_keep_first_occurrence_order() {
        let on = Predicate::new("on", 2);
        let clear = Predicate::new("clear", 1);
        let mv = Predicate::new("move", 2);

        let x = Term::var("X");
        let y = Term::var("Y");
        let z = Term::var("Z");

        let schema = ActionSchema::new(
            mv.of(vec![x.clone(), y.clone()]),
            vec![on.of(vec![x.clone(), z.clone()]), clear.of(vec![x.clone()])],
            vec![],
            vec![on.of(vec![x.clone(), y.clone()])],
            vec![on.of(vec![x.clone(), z.clone()])],
        );

        assert_eq!(schema.parameters, vec![x, y, z]);
    }

    #[test]
    fn grounded_action_instantiates_conditions() {
        let on = Predicate::new("on", 2);
        let mv = Predicate::new("move", 2);
        let x = Term::var("X");
        let y = Term::var("Y");

        let schema = ActionSchema::new(
            mv.of(vec![x.clone(), y.clone()]),
            vec![on.of(vec![x.clone(), y.clone()])],
            vec![],
            vec![],
            vec![on.of(vec![x.clone(), y.clone()])],
        );

        let sub = Substitution::from_pairs(
            &[x, y],
            &[Term::constant("a"), Term::constant("b")],
            true,
        );
        let grounded = GroundedAction::from_schema(&schema, &sub);

        let fact = on.of(vec![Term::constant("a"), Term::constant("b")]);
        assert_eq!(grounded.pre_conditions, vec![Condition::new(fact.clone(), true)]);
        assert_eq!(grounded.post_conditions, vec![Condition::new(fact.clone(), false)]);

        let state = State::from_facts([fact]);
        assert!(grounded.pre_conditions[0].reached(&state));
        assert!(!grounded.post_conditions[0].reached(&state));
    }
}
