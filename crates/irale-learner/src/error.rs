//! Error types for the learner.

use irale_rules::RuleError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LearnError {
    #[error("observed action is not grounded: {action}")]
    UngroundedAction { action: String },
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error("failed to persist motivation trace: {0}")]
    Trace(#[from] std::io::Error),
}
