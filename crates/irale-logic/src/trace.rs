//! Observations and their bounded history.

use crate::literal::Literal;
use crate::state::State;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One observation: a state, the grounded action attempted in it, whether
/// the domain accepted it, and the resulting state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub state: State,
    pub action: Literal,
    pub authorized: bool,
    pub new_state: State,
}

impl Trace {
    pub fn new(state: State, action: Literal, authorized: bool, new_state: State) -> Self {
        Trace {
            state,
            action,
            authorized,
            new_state,
        }
    }
}

/// A bounded ring of traces, most recent first. Each trace is consumed by
/// the reviser exactly once when observed; the ring only serves restarts and
/// diagnostics.
#[derive(Clone, Debug, Default)]
pub struct TraceLog {
    entries: VecDeque<Trace>,
    capacity: usize,
}

impl TraceLog {
    pub fn with_capacity(capacity: usize) -> Self {
        TraceLog {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, trace: Trace) {
        if self.capacity > 0 && self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(trace);
    }

    /// The most recent trace, if any.
    pub fn latest(&self) -> Option<&Trace> {
        self.entries.front()
    }

    /// Iterate most recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Trace> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::Predicate;
    use crate::term::Term;

    fn step(n: u32) -> Trace {
        let act = Predicate::new("tick", 1).of(vec![Term::constant(format!("t{n}"))]);
        Trace::new(State::new(), act, true, State::new())
    }

    #[test]
    fn ring_keeps_most_recent_first() {
        let mut log = TraceLog::with_capacity(3);
        for n in 0..5 {
            log.push(step(n));
        }
        assert_eq!(log.len(), 3);
        let names: Vec<String> = log
            .iter()
            .map(|t| t.action.parameters[0].name().to_string())
            .collect();
        assert_eq!(names, vec!["t4", "t3", "t2"]);
        assert_eq!(log.latest().unwrap().action.parameters[0].name(), "t4");
    }
}
