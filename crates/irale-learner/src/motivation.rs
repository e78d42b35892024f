//! Motivation-trace persistence.
//!
//! When enabled, the explorer appends one JSON object per hill-climbed tick
//! recording the state, the chosen action, its revision probability and a
//! per-rule snapshot (necessities, prematch flag, fulfilment, sampled
//! substitutions). The buffer is rewritten to disk every 50 ticks.

use irale_logic::{Literal, State, Substitution, Term};
use irale_rules::Rule;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Per-rule snapshot attached to one motivation entry.
pub struct RuleMotivation<'a> {
    pub rule: &'a Rule,
    pub prematching: bool,
    pub fulfilment: f64,
    pub substitutions: &'a BTreeSet<Substitution>,
}

pub struct MotivationTrace {
    path: PathBuf,
    entries: Vec<Value>,
}

fn json_literal(lit: &Literal, necessity: Option<f64>) -> Value {
    let name = if lit.positive {
        lit.predicate.name.clone()
    } else {
        format!("-{}", lit.predicate.name)
    };
    let params: Vec<Value> = lit
        .parameters
        .iter()
        .map(|p| Value::String(p.name().to_string()))
        .collect();
    match necessity {
        Some(nec) => json!([name, params, nec]),
        None => json!([name, params]),
    }
}

fn json_substitution(sub: &Substitution) -> Value {
    let pairs: Vec<Value> = sub
        .mapping()
        .iter()
        .map(|(from, to)| json!([from.name(), to.name()]))
        .collect();
    Value::Array(pairs)
}

fn json_constant(term: &Term, necessity: f64) -> Value {
    json!([term.name(), necessity])
}

impl MotivationTrace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MotivationTrace {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append one tick's record.
    pub fn record(
        &mut self,
        state: &State,
        action: &Literal,
        revision_prob: f64,
        rules: &[RuleMotivation<'_>],
    ) {
        let state_facts: Vec<Value> = state.facts.iter().map(|f| json_literal(f, None)).collect();

        let rule_objects: Vec<Value> = rules
            .iter()
            .map(|info| {
                let mut preconditions = Vec::new();
                let mut removed = Vec::new();
                for (lit, nec) in &info.rule.preconds_necessities {
                    if info.rule.preconditions.contains(lit) {
                        preconditions.push(json_literal(lit, Some(*nec)));
                    } else {
                        removed.push(json_literal(lit, Some(*nec)));
                    }
                }

                let constants: Vec<Value> = info
                    .rule
                    .consts_necessities
                    .iter()
                    .map(|(cst, nec)| json_constant(cst, *nec))
                    .collect();

                let effects: Vec<Value> = info
                    .rule
                    .add
                    .iter()
                    .chain(&info.rule.del)
                    .map(|eff| json_literal(eff, None))
                    .collect();

                let substitutions: Vec<Value> =
                    info.substitutions.iter().map(json_substitution).collect();

                json!({
                    "preconditions": preconditions,
                    "removed_preconditions": removed,
                    "constants": constants,
                    "action": json_literal(&info.rule.action_literal, None),
                    "effects": effects,
                    "prematching": info.prematching,
                    "fulfilment": info.fulfilment,
                    "substitutions": substitutions,
                })
            })
            .collect();

        self.entries.push(json!({
            "state": state_facts,
            "action": json_literal(action, None),
            "revision": revision_prob,
            "rules": rule_objects,
        }));
    }

    /// Rewrite the whole buffer to disk.
    pub fn flush(&self) -> io::Result<()> {
        let content = serde_json::to_string_pretty(&Value::Array(self.entries.clone()))?;
        fs::write(&self.path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irale_logic::{Predicate, Trace};

    fn fact(p: &str, args: &[&str]) -> Literal {
        Predicate::new(p, args.len()).of(args.iter().map(|a| Term::constant(*a)).collect())
    }

    #[test]
    fn records_carry_the_full_schema() {
        let state = State::from_facts([
            fact("clear", &["a"]),
            fact("clear", &["b"]),
            fact("on", &["a", "c"]),
        ]);
        let mut new_state = state.clone();
        new_state.remove_fact(&fact("on", &["a", "c"]));
        new_state.remove_fact(&fact("clear", &["b"]));
        new_state.add_fact(&fact("on", &["a", "b"]));
        new_state.add_fact(&fact("clear", &["c"]));
        let trace = Trace::new(state.clone(), fact("move", &["a", "b"]), true, new_state);
        let rule = Rule::from_trace(&trace, 0.5, true).unwrap();

        let subs = BTreeSet::from([Substitution::new()]);
        let mut motivation = MotivationTrace::new("/tmp/unused.json");
        motivation.record(
            &state,
            &trace.action,
            0.25,
            &[RuleMotivation {
                rule: &rule,
                prematching: true,
                fulfilment: 0.75,
                substitutions: &subs,
            }],
        );

        assert_eq!(motivation.len(), 1);
        let entry = &motivation.entries[0];
        assert_eq!(entry["revision"], 0.25);
        assert_eq!(entry["action"][0], "move");
        assert_eq!(entry["state"].as_array().unwrap().len(), 3);

        let rule_obj = &entry["rules"][0];
        for key in [
            "preconditions",
            "removed_preconditions",
            "constants",
            "action",
            "effects",
            "prematching",
            "fulfilment",
            "substitutions",
        ] {
            assert!(!rule_obj[key].is_null(), "missing key {key}");
        }
        assert_eq!(rule_obj["prematching"], true);
    }
}
