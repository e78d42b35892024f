//! Flat configuration records.
//!
//! Two records cover the whole learner: one for the Bayesian explorer's
//! rollout weights and budgets, one for the experiment driver. Both
//! deserialize from flat key maps and reject unknown keys, so a typo in a
//! config file fails at startup rather than silently falling back to a
//! default.

use serde::Deserialize;

/// Configuration of the Bayesian explorer (`bayesian_explorer.*` keys).
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplorerConfig {
    /// Force pure random action selection.
    pub random: bool,
    /// Escape to a random experiment after `stagnation_threshold` steps
    /// without a revision.
    pub use_stagnation: bool,
    pub stagnation_threshold: usize,
    /// Cut the rollout short once a plan beats `passthrough_threshold`.
    pub use_passthrough: bool,
    pub passthrough_threshold: f64,
    /// Rollout discount per plan depth.
    pub gamma: f64,
    /// Prior probability that a candidate rule element is unnecessary.
    pub start_pu: f64,
    /// Wall-clock budget for one plan search, in seconds.
    pub exploration_time_limit: f64,
    /// Probability of seeding a plan with a meta-action.
    pub meta_probability: f64,
    /// Share of the meta-action draw going to `reset` rather than `delete`.
    pub base_reset_prob: f64,
    /// Decay of the fact-removal branch with accumulated revisions.
    pub fact_removal_discount: f64,
    /// Decay of the pure-random shortcut with accumulated revisions.
    pub random_discount: f64,
    /// Probability of restricting rollouts to the most specific rules'
    /// actions.
    pub focus_specific_rules: f64,
    pub estimated_rules_per_action: usize,
    /// Rollout budgets.
    pub random_plans: usize,
    pub random_experiments: usize,
    pub random_action_trials: usize,
    pub plan_depth: usize,
    /// Motivation-trace persistence.
    pub save_motivation_trace: bool,
    pub motivation_trace_file_name: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        ExplorerConfig {
            random: false,
            use_stagnation: true,
            stagnation_threshold: 30,
            use_passthrough: true,
            passthrough_threshold: 0.9,
            gamma: 0.9,
            start_pu: 0.5,
            exploration_time_limit: 1.0,
            meta_probability: 0.1,
            base_reset_prob: 0.5,
            fact_removal_discount: 0.9,
            random_discount: 0.9,
            focus_specific_rules: 0.5,
            estimated_rules_per_action: 2,
            random_plans: 30,
            random_experiments: 10,
            random_action_trials: 10,
            plan_depth: 3,
            save_motivation_trace: false,
            motivation_trace_file_name: "motivation".to_string(),
        }
    }
}

/// Configuration of the experiment driver (`irale.*` keys).
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LearnerConfig {
    pub runs: usize,
    pub steps: usize,
    /// Emit a `reset` after `reset_state_after` steps without revision.
    pub reset_state_after_stagnation: bool,
    pub reset_state_after: usize,
    pub test_domain_every: usize,
    pub test_only_when_knowledge_modified: bool,
    /// Insert variabilised copies of raw examples instead of the examples
    /// themselves.
    pub always_generalize_constants: bool,
    /// Restarts of the randomised LGG search per candidate rule.
    pub generalization_trials: usize,
    /// Prefer the candidate with the most preconditions (least general)
    /// instead of the fewest.
    pub least_general: bool,
    pub use_bayesian_explorer: bool,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        LearnerConfig {
            runs: 5,
            steps: 1200,
            reset_state_after_stagnation: false,
            reset_state_after: 30,
            test_domain_every: 30,
            test_only_when_knowledge_modified: true,
            always_generalize_constants: false,
            generalization_trials: 3,
            least_general: false,
            use_bayesian_explorer: true,
        }
    }
}
