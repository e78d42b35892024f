//! # irale-rules
//!
//! Extended Deterministic STRIPS (EDS) rules and the operators that learn
//! them.
//!
//! An EDS [`Rule`] is an action literal, a precondition set and add/delete
//! effects, annotated with per-precondition and per-constant *necessity*
//! probabilities and linked into a generalisation DAG ([`RuleArena`],
//! [`RuleId`]) whose leaves are observed examples.
//!
//! The engine provides:
//!
//! - **Matching**: `prematching_subs` / `postmatching_subs` /
//!   `covering_subs` enumerate the OI substitutions relating a rule to an
//!   example; `prematches` demands a *unique* substitution while
//!   `postmatches` and `covers` accept any.
//! - **Generalisation**: `generalize_literals_oi` (LIT-GEN-OI),
//!   `any_generalization` (UNE-GEN-OI, dropping unmatchable preconditions),
//!   `exact_generalization` (all-or-nothing randomised DFS) and
//!   `post_generalizes` (effect-set generalisation gating the LGG).
//! - **Well-formedness**: deletions backed by preconditions, additions
//!   absent from them, add variables grounded in preconditions, and every
//!   precondition variable linked to the action literal or effects.
//!
//! Randomised operators take a caller-supplied `rand::Rng` so runs can be
//! reproduced by pinning the seed.

mod error;
mod generalize;
mod graph;
mod matching;
mod rule;

pub use error::RuleError;
pub use graph::{RuleArena, RuleId};
pub use rule::{Rule, SigmaTheta};
