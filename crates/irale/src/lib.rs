//! # irale
//!
//! Incremental relational action-model learning.
//!
//! This is the umbrella crate re-exporting the three irale components:
//!
//! - [`logic`]: terms, literals, substitutions with Object Identity,
//!   states, domains and observations;
//! - [`rules`]: Extended Deterministic STRIPS rules, OI matching,
//!   least-general generalisation and the generalisation DAG;
//! - [`learner`]: the belief engine (necessities, cd/dgcd, unknown rules),
//!   the reviser and the Bayesian explorer.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use irale::prelude::*;
//! use std::collections::BTreeSet;
//!
//! // A domain the agent does NOT get to read the rules of.
//! let on = Predicate::new("on", 2);
//! let clear = Predicate::new("clear", 1);
//! let mv = Predicate::new("move", 2);
//! let domain = Domain::new(
//!     vec![],
//!     BTreeSet::from([on.clone(), clear.clone(), mv.clone()]),
//!     BTreeSet::new(),
//!     vec![/* hidden action schemas */],
//! );
//!
//! let instances = vec![Term::constant("a"), Term::constant("b")];
//! let mut agent = LearningAgent::new(
//!     &domain,
//!     instances.clone(),
//!     vec![],
//!     LearnerConfig::default(),
//!     ExplorerConfig::default(),
//!     0xC0FFEE,
//! );
//!
//! // The learning loop: act, observe, revise.
//! let mut domain = domain;
//! let mut state = State::new();
//! for _ in 0..100 {
//!     let action = agent.next_action(&state, &domain)?;
//!     let (new_state, authorized) = domain.try_action(&state, &instances, &action, false);
//!     agent.observe(Trace::new(state.clone(), action, authorized, new_state.clone()));
//!     if authorized {
//!         state = new_state;
//!     }
//! }
//! # Ok::<(), irale::learner::LearnError>(())
//! ```

pub use irale_learner as learner;
pub use irale_logic as logic;
pub use irale_rules as rules;

/// Convenient imports for the common learning loop.
pub mod prelude {
    pub use crate::learner::{
        BayesianExplorer, ExplorerConfig, LearnerConfig, LearningAgent, Planner, Reviser,
    };
    pub use crate::logic::{
        ActionSchema, Domain, Goal, Literal, Predicate, Problem, State, Substitution, Term,
        TermType, Trace, TraceLog,
    };
    pub use crate::rules::{Rule, RuleArena, RuleId};
}
