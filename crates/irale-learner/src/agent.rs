//! The learning agent: the sequential loop tying reviser, belief engine and
//! explorer together.
//!
//! Each tick consumes the latest observation (corroborate, then revise),
//! rebuilds the internal projected domain when the rule set changed, and
//! asks the explorer for the next action. Failed observations of actions
//! with no rule yet are parked and replayed through corroboration once the
//! first rule for that predicate appears.

use crate::config::{ExplorerConfig, LearnerConfig};
use crate::error::LearnError;
use crate::explorer::BayesianExplorer;
use crate::reviser::{domain_from_rules, Reviser};
use indexmap::IndexSet;
use irale_logic::{Domain, Literal, Predicate, State, Term, Trace, TraceLog, RESET_ACTION};
use irale_rules::{RuleArena, RuleId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub struct LearningAgent {
    pub reviser: Reviser,
    pub explorer: BayesianExplorer,
    learner_config: LearnerConfig,

    /// The projection of the learnt rules over the source vocabulary; the
    /// explorer rolls plans out against it.
    internal_domain: Domain,
    instances: Vec<Term>,
    headstart: Vec<Literal>,

    pub trace_log: TraceLog,
    failed_before_first_success: BTreeMap<Predicate, Vec<Trace>>,

    step: usize,
    last_revision_step: usize,
    rng: StdRng,
}

impl LearningAgent {
    pub fn new(
        domain: &Domain,
        instances: Vec<Term>,
        headstart: Vec<Literal>,
        learner_config: LearnerConfig,
        explorer_config: ExplorerConfig,
        seed: u64,
    ) -> Self {
        let start_pu = explorer_config.start_pu;
        let reviser = Reviser::new(learner_config.clone(), start_pu);
        let mut explorer = BayesianExplorer::new(explorer_config);

        let internal_domain = domain_from_rules(domain, &reviser.arena, &reviser.active);
        explorer.set_action_literals(&domain.action_literals(false), &internal_domain, &instances);

        LearningAgent {
            reviser,
            explorer,
            learner_config,
            internal_domain,
            instances,
            headstart,
            trace_log: TraceLog::with_capacity(4096),
            failed_before_first_success: BTreeMap::new(),
            step: 0,
            last_revision_step: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn arena(&self) -> &RuleArena {
        &self.reviser.arena
    }

    pub fn active_rules(&self) -> &IndexSet<RuleId> {
        &self.reviser.active
    }

    /// Record one observation from the environment.
    pub fn observe(&mut self, trace: Trace) {
        self.trace_log.push(trace);
    }

    fn all_instances(&self, domain: &Domain) -> Vec<Term> {
        self.instances
            .iter()
            .chain(domain.constants.iter())
            .cloned()
            .collect()
    }

    /// Consume the latest observation and produce the next action to try.
    pub fn next_action(&mut self, state: &State, domain: &Domain) -> Result<Literal, LearnError> {
        self.step += 1;

        let mut knowledge_modified = false;
        if let Some(trace) = self.trace_log.latest().cloned() {
            let all_insts = self.all_instances(domain);
            self.explorer.corroborate(
                &mut self.reviser.arena,
                &self.reviser.active,
                &trace,
                &all_insts,
                &mut self.rng,
            );

            if !is_meta_name(&trace.action.predicate.name) {
                // Park failures of not-yet-modelled actions for later
                // corroboration.
                if !trace.authorized && !self.reviser.has_rule_for(&trace.action.predicate) {
                    self.failed_before_first_success
                        .entry(trace.action.predicate.clone())
                        .or_default()
                        .push(trace.clone());
                }

                knowledge_modified = self.reviser.update_knowledge(
                    &trace,
                    domain.delete_pred(),
                    &mut self.rng,
                )?;

                self.replay_parked_failures(&all_insts);
            }
        }

        if knowledge_modified {
            info!(
                rules = self.reviser.active.len(),
                examples = self.reviser.counter_examples.len(),
                step = self.step,
                "knowledge revised"
            );
            self.last_revision_step = self.step;
            self.internal_domain =
                domain_from_rules(domain, &self.reviser.arena, &self.reviser.active);
        }
        self.explorer.inform_revision(knowledge_modified);

        if self.step <= self.headstart.len() {
            let scripted = self.headstart[self.step - 1].clone();
            debug!(action = %scripted, "headstart action");
            return Ok(scripted);
        }

        if self.learner_config.reset_state_after_stagnation
            && self.step - self.last_revision_step >= self.learner_config.reset_state_after
        {
            self.last_revision_step = self.step;
            self.explorer.plan.clear();
            if let Some(pred) = domain.action_pred_by_name(RESET_ACTION) {
                debug!("stagnation reset");
                return Ok(Literal::new(pred, vec![]));
            }
        }

        Ok(self.explorer.get_next_action(
            state,
            &mut self.internal_domain,
            &self.reviser.arena,
            &self.reviser.active,
            &self.instances,
            &mut self.rng,
        ))
    }

    /// Once a predicate has its first rule, its parked failures become
    /// informative: run them through corroboration and drop them.
    fn replay_parked_failures(&mut self, all_insts: &[Term]) {
        let ready: Vec<Predicate> = self
            .failed_before_first_success
            .keys()
            .filter(|pred| self.reviser.has_rule_for(pred))
            .cloned()
            .collect();

        for pred in ready {
            if let Some(traces) = self.failed_before_first_success.remove(&pred) {
                for parked in traces {
                    self.explorer.corroborate(
                        &mut self.reviser.arena,
                        &self.reviser.active,
                        &parked,
                        all_insts,
                        &mut self.rng,
                    );
                }
            }
        }
    }

    /// The problem changed: new objects and/or a new scripted prefix.
    pub fn update_problem(&mut self, domain: &Domain, instances: Vec<Term>, headstart: Vec<Literal>) {
        self.instances = instances;
        self.headstart = headstart;
        self.step = 0;
        self.last_revision_step = 0;
        self.internal_domain =
            domain_from_rules(domain, &self.reviser.arena, &self.reviser.active);
        self.explorer.reset_problem();
        self.explorer.set_action_literals(
            &domain.action_literals(false),
            &self.internal_domain,
            &self.instances,
        );
    }
}

fn is_meta_name(name: &str) -> bool {
    matches!(
        name,
        irale_logic::RESET_ACTION | irale_logic::DELETE_ACTION | irale_logic::REMOVE_FACT_ACTION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use irale_logic::{ActionSchema, Predicate};
    use std::collections::BTreeSet;

    fn c(name: &str) -> Term {
        Term::constant(name)
    }

    fn fact(p: &str, args: &[&str]) -> Literal {
        Predicate::new(p, args.len()).of(args.iter().map(|a| c(a)).collect())
    }

    fn blocks_domain() -> Domain {
        let on = Predicate::new("on", 2);
        let clear = Predicate::new("clear", 1);
        let mv = Predicate::new("move", 2);
        let (x, y, z) = (Term::var("X"), Term::var("Y"), Term::var("Z"));
        let schema = ActionSchema::new(
            mv.of(vec![x.clone(), y.clone()]),
            vec![
                clear.of(vec![x.clone()]),
                clear.of(vec![y.clone()]),
                on.of(vec![x.clone(), z.clone()]),
            ],
            vec![],
            vec![on.of(vec![x.clone(), y.clone()]), clear.of(vec![z.clone()])],
            vec![on.of(vec![x.clone(), z.clone()]), clear.of(vec![y.clone()])],
        );
        Domain::new(
            vec![],
            BTreeSet::from([on, clear, mv]),
            BTreeSet::new(),
            vec![schema],
        )
    }

    fn agent(domain: &Domain) -> LearningAgent {
        LearningAgent::new(
            domain,
            vec![c("a"), c("b"), c("c")],
            vec![],
            LearnerConfig::default(),
            ExplorerConfig {
                meta_probability: 0.0,
                exploration_time_limit: 0.2,
                random_plans: 2,
                random_experiments: 2,
                plan_depth: 2,
                ..ExplorerConfig::default()
            },
            42,
        )
    }

    #[test]
    fn learns_from_an_environment_loop() {
        let mut domain = blocks_domain();
        let mut agent = agent(&domain);
        let instances = vec![c("a"), c("b"), c("c")];

        let mut state = State::from_facts([
            fact("clear", &["a"]),
            fact("clear", &["b"]),
            fact("on", &["a", "c"]),
        ]);

        for _ in 0..12 {
            let action = agent.next_action(&state, &domain).unwrap();
            if action == Literal::default() {
                continue;
            }
            let (new_state, authorized) = domain.try_action(&state, &instances, &action, false);
            agent.observe(Trace::new(state.clone(), action, authorized, new_state.clone()));
            if authorized {
                state = new_state;
            }
        }

        // The agent has learnt at least one rule for move, and every stored
        // positive example is covered.
        assert!(!agent.active_rules().is_empty());
        for &cx in &agent.reviser.counter_examples {
            let covered = agent
                .active_rules()
                .iter()
                .any(|&id| agent.arena().get(id).covers(agent.arena().get(cx)));
            assert!(covered);
        }
    }

    #[test]
    fn headstart_actions_are_replayed_first() {
        let domain = blocks_domain();
        let mut agent = LearningAgent::new(
            &domain,
            vec![c("a"), c("b"), c("c")],
            vec![fact("move", &["a", "b"])],
            LearnerConfig::default(),
            ExplorerConfig::default(),
            1,
        );

        let state = State::from_facts([
            fact("clear", &["a"]),
            fact("clear", &["b"]),
            fact("on", &["a", "c"]),
        ]);
        let first = agent.next_action(&state, &domain).unwrap();
        assert_eq!(first, fact("move", &["a", "b"]));
    }
}
