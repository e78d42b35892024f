//! # irale-logic
//!
//! First-order logic substrate for the irale action-model learner.
//!
//! This crate provides the vocabulary every other irale component builds on:
//!
//! - **Terms** ([`Term`], [`TermType`]): variables and constants with
//!   optional nominal types ordered by a single-parent subsumption chain.
//! - **Literals** ([`Predicate`], [`Literal`]): predicates applied to
//!   parameter sequences, with polarity.
//! - **Substitutions** ([`Substitution`]): finite term mappings, either
//!   *injective* (the Object Identity regime, where distinct sources keep
//!   distinct images) or *free*; classical unification, OI-subsumption and
//!   injective expansion all live here.
//! - **States** ([`State`], [`Goal`]): sets of positive grounded facts with
//!   pattern queries and symmetric differences.
//! - **Actions** ([`ActionSchema`], [`GroundedAction`], [`Condition`]):
//!   STRIPS-style schemas and their instantiations.
//! - **Domains** ([`Domain`], [`Problem`]): the simulator that applies
//!   grounded action literals, synthesises the reserved meta-actions
//!   (`reset`, `delete`, `remove-fact`) and parses literal text.
//! - **Traces** ([`Trace`], [`TraceLog`]): observations `(state, action,
//!   authorized, next state)` and their bounded, most-recent-first history.
//!
//! ## Example
//!
//! ```rust
//! use irale_logic::{Literal, Predicate, State, Substitution, Term};
//! use std::collections::BTreeSet;
//!
//! let on = Predicate::new("on", 2);
//! let state = State::from_facts([
//!     on.of(vec![Term::constant("a"), Term::constant("b")]),
//! ]);
//!
//! // Query with a variable pattern.
//! let pattern = on.of(vec![Term::var("X"), Term::constant("b")]);
//! assert_eq!(state.query(&pattern).len(), 1);
//!
//! // OI-subsumption enumerates injective embeddings.
//! let source = BTreeSet::from([pattern]);
//! let subs = Substitution::new().oi_subsume(&source, &state.facts);
//! assert_eq!(subs.len(), 1);
//! ```

mod action;
mod display;
mod domain;
mod error;
mod literal;
mod state;
mod substitution;
mod term;
mod trace;

pub use action::{ActionSchema, Condition, GroundedAction};
pub use domain::{
    filter_by_type, filter_deleted, Domain, Problem, DELETE_ACTION, REMOVE_FACT_ACTION,
    RESET_ACTION,
};
pub use error::LogicError;
pub use literal::{Literal, Predicate};
pub use state::{Goal, State};
pub use substitution::Substitution;
pub use term::{Term, TermType, ANY_VAR};
pub use trace::{Trace, TraceLog};
