//! Error types for the rule engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("rule is not well-formed: {rule}")]
    Malformed { rule: String },
    #[error("rule {rule} would become its own ancestor")]
    SelfParenting { rule: usize },
}
