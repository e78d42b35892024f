//! Learn a Blocksworld move operator from scratch.
//!
//! The agent only sees the domain vocabulary; the move schema stays hidden
//! behind `try_action`. Run with `cargo run --example blocksworld`.

use anyhow::Result;
use irale::prelude::*;
use std::collections::BTreeSet;

fn fact(p: &str, args: &[&str]) -> Literal {
    Predicate::new(p, args.len()).of(args.iter().map(|a| Term::constant(*a)).collect())
}

fn hidden_domain() -> Domain {
    let on = Predicate::new("on", 2);
    let clear = Predicate::new("clear", 1);
    let block = Predicate::new("block", 1);
    let mv = Predicate::new("move", 2);

    let (x, y, z) = (Term::var("X"), Term::var("Y"), Term::var("Z"));
    let move_schema = ActionSchema::new(
        mv.of(vec![x.clone(), y.clone()]),
        vec![
            clear.of(vec![x.clone()]),
            clear.of(vec![y.clone()]),
            on.of(vec![x.clone(), z.clone()]),
            block.of(vec![x.clone()]),
        ],
        vec![],
        vec![on.of(vec![x.clone(), y.clone()]), clear.of(vec![z.clone()])],
        vec![on.of(vec![x.clone(), z.clone()]), clear.of(vec![y.clone()])],
    );

    Domain::new(
        vec![],
        BTreeSet::from([on, clear, block, mv]),
        BTreeSet::new(),
        vec![move_schema],
    )
}

fn main() -> Result<()> {
    let mut domain = hidden_domain();

    let instances: Vec<Term> = ["a", "b", "c", "f1", "f2"]
        .iter()
        .map(|n| Term::constant(*n))
        .collect();

    let mut state = State::from_facts([
        fact("on", &["a", "b"]),
        fact("on", &["b", "f1"]),
        fact("clear", &["a"]),
        fact("clear", &["f2"]),
        fact("block", &["a"]),
        fact("block", &["b"]),
    ]);
    domain.set_reset_state(state.clone());

    let mut agent = LearningAgent::new(
        &domain,
        instances.clone(),
        vec![],
        LearnerConfig::default(),
        ExplorerConfig::default(),
        0xB10C5,
    );

    for step in 0..200 {
        let action = agent.next_action(&state, &domain)?;
        let (new_state, authorized) = domain.try_action(&state, &instances, &action, false);
        println!(
            "step {step:3}: {action} -> {}",
            if authorized { "ok" } else { "rejected" }
        );
        agent.observe(Trace::new(state.clone(), action, authorized, new_state.clone()));
        state = new_state;
    }

    println!("\nlearnt rules:");
    for &id in agent.active_rules() {
        println!("  {}", agent.arena().get(id));
    }

    Ok(())
}
