//! # irale-learner
//!
//! The incremental relational action-model learner: given a stream of
//! `(state, action, authorized, next state)` observations from an unknown
//! STRIPS-like domain, it maintains a set of EDS rules that is at all times
//! consistent with every observation and covers every observation it must
//! explain, and chooses the next action to maximise the expected
//! probability of revising that model.
//!
//! ## Components
//!
//! - **Belief engine** ([`belief`], [`UnknownRule`]): per-rule necessity
//!   probabilities over preconditions and constants, the unknown-rule side
//!   model, fulfilment and revision probabilities, and the cd/dgcd
//!   disjunctive probability computations.
//! - **Reviser** ([`Reviser`]): consumes observations, classifies rules
//!   into prematching / contradicting / covering, and dispatches
//!   generalisation or specialisation while maintaining positive and
//!   failed-action counter-examples.
//! - **Explorer** ([`BayesianExplorer`]): selects the next grounded action
//!   by rolling out random short plans scored by revision probability, with
//!   meta-actions to escape dead ends.
//! - **Driver** ([`LearningAgent`]): the sequential corroborate → revise →
//!   explore loop, with headstarts, stagnation resets and the projected
//!   internal domain.
//!
//! The whole core is single-threaded and deterministic given a seed: all
//! randomness flows through one caller-seeded generator.

pub mod belief;
mod config;
mod corroborate;
mod error;
mod explorer;
mod motivation;
mod planner;
mod reviser;
mod unknown;

mod agent;

pub use agent::LearningAgent;
pub use config::{ExplorerConfig, LearnerConfig};
pub use corroborate::{corroborate_rules, NECESSITY_CLAMP};
pub use error::LearnError;
pub use explorer::{BayesianExplorer, Experiment};
pub use motivation::{MotivationTrace, RuleMotivation};
pub use planner::Planner;
pub use reviser::{domain_from_rules, Reviser};
pub use unknown::UnknownRule;
