//! Error types for the logic substrate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogicError {
    #[error("unknown predicate '{name}'")]
    UnknownPredicate { name: String },
    #[error("unknown action predicate '{name}'")]
    UnknownActionPredicate { name: String },
    #[error("unknown object '{name}'")]
    UnknownObject { name: String },
    #[error("predicate '{name}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("literal '{literal}' is not grounded")]
    NotGrounded { literal: String },
    #[error("empty literal text")]
    EmptyLiteral,
}
