//! The planner interface consumed once a model exists.
//!
//! The learner does not plan towards goals itself; it projects its rule set
//! into a [`Domain`] (see [`crate::domain_from_rules`]) and feeds any
//! conforming planner. Returning `None` from [`Planner::get_next_action`]
//! means no action was found within the planner's budget.

use irale_logic::{Domain, Goal, Literal, Problem, State, Term, TraceLog};

pub trait Planner {
    /// Provide the (projected) domain, the problem and the observation
    /// history.
    fn init(&mut self, domain: &Domain, problem: &Problem, trace: &TraceLog);

    /// The problem changed: new objects, a new goal, or a scripted prefix
    /// of actions to replay first.
    fn update_problem(&mut self, instances: &[Term], goal: &Goal, headstart: &[Literal]);

    /// Best next action for the current state, or `None` on time-out with
    /// no usable plan.
    fn get_next_action(&mut self, state: &State) -> Option<Literal>;
}
