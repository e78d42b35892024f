//! Least-general generalisation under Object Identity.
//!
//! Four cooperating algorithms:
//!
//! - `generalize_literals_oi` (LIT-GEN-OI): the most specific single literal
//!   generalising two compatible literals, growing a pair of substitutions
//!   that instantiate it back to either side.
//! - `selection`: one non-deterministic generalisation step — pick a rule
//!   precondition and a compatible example precondition whose generalisation
//!   keeps the candidate rule prematching the example.
//! - `any_generalization` (UNE-GEN-OI): repeated selection until the rule
//!   side is exhausted; a failed step drops the chosen rule precondition.
//! - `exact_generalization` (EXACT-GEN): a randomised depth-first search that
//!   must map *every* rule-side literal; no dropping. Used on effect sets by
//!   `post_generalizes`.

use crate::rule::Rule;
use irale_logic::{Literal, Substitution, Term};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

/// Outcome of one selection step. On failure the last drawn rule literal is
/// reported so the caller can drop it from the generalisation.
pub(crate) enum Selection {
    Success { lr: Literal, lx: Literal },
    Failure { last_lr: Option<Literal> },
}

impl Rule {
    /// LIT-GEN-OI: the most specific literal `g` with extended substitutions
    /// θ₁, θ₂ such that θ₁(g) = l1 and θ₂(g) = l2 under Object Identity.
    /// On failure the substitutions and `gen_vars` are left untouched.
    pub fn generalize_literals_oi(
        &self,
        l1: &Literal,
        l2: &Literal,
        gen_vars: &mut BTreeSet<Term>,
        theta1: &mut Substitution,
        theta2: &mut Substitution,
    ) -> Option<Literal> {
        if !Literal::compatible(l1, l2) {
            return None;
        }

        let mut t1 = theta1.clone();
        let mut t2 = theta2.clone();
        let mut vars = gen_vars.clone();
        let mut params = Vec::with_capacity(l1.parameters.len());

        for (term1, term2) in l1.parameters.iter().zip(l2.parameters.iter()) {
            let inv1 = t1.get_inverse(term1).cloned();
            let inv2 = t2.get_inverse(term2).cloned();
            let gen1 = inv1.clone().unwrap_or_else(|| term1.clone());
            let gen2 = inv2.clone().unwrap_or_else(|| term2.clone());

            if gen1 == gen2 {
                if !gen1.is_var() {
                    // Equal constants still generalise to a shared variable.
                    let var = self.make_new_var(&mut vars, term1);
                    params.push(var.clone());
                    t1.set(&var, term1);
                    t2.set(&var, term2);
                } else {
                    params.push(gen1);
                }
                continue;
            }

            if inv1.as_ref().is_some_and(|i| i == term1)
                || inv2.as_ref().is_some_and(|i| i == term2)
            {
                return None;
            }
            if gen1.is_var() && gen2.is_var() {
                return None;
            }

            if gen1.is_var() {
                if t2.get(&gen1).is_some() {
                    return None;
                }
                params.push(gen1.clone());
                if t1.get(&gen1).is_none() {
                    t1.set(&gen1, &gen1);
                }
                t2.set(&gen1, term2);
            } else if gen2.is_var() {
                if t1.get(&gen2).is_some() {
                    return None;
                }
                params.push(gen2.clone());
                if t2.get(&gen2).is_none() {
                    t2.set(&gen2, &gen2);
                }
                t1.set(&gen2, term1);
            } else {
                let var = self.make_new_var(&mut vars, term1);
                params.push(var.clone());
                t1.set(&var, term1);
                t2.set(&var, term2);
            }
        }

        *theta1 = t1;
        *theta2 = t2;
        *gen_vars = vars;
        Some(Literal {
            predicate: l1.predicate.clone(),
            parameters: params,
            positive: l1.positive,
        })
    }

    /// One SELECTION step over shuffled candidate sets. A choice is
    /// committed only if the candidate generalised rule still prematches the
    /// example under the extended example-side substitution.
    pub(crate) fn selection<R: Rng>(
        &self,
        lr: &BTreeSet<Literal>,
        lx: &BTreeSet<Literal>,
        x: &Rule,
        subr: &mut Substitution,
        subx: &mut Substitution,
        gen_vars: &mut BTreeSet<Term>,
        gen_lits: &mut BTreeSet<Literal>,
        rng: &mut R,
    ) -> Selection {
        let inv_subr = subr.inverse();
        let gen_act = inv_subr.apply(&self.action_literal);
        let gen_add = inv_subr.apply_all(&self.add);
        let gen_del = inv_subr.apply_all(&self.del);

        let mut draw_lr: Vec<Literal> = lr.iter().cloned().collect();
        draw_lr.shuffle(rng);

        let mut last_lr = None;
        for chosen_lr in draw_lr {
            last_lr = Some(chosen_lr.clone());

            let mut draw_lx: Vec<Literal> = lx
                .iter()
                .filter(|l| Literal::compatible(&chosen_lr, l))
                .cloned()
                .collect();
            draw_lx.shuffle(rng);

            for chosen_lx in draw_lx {
                let mut tmp_subr = subr.clone();
                let mut tmp_subx = subx.clone();
                let mut tmp_gen_vars = gen_vars.clone();

                let Some(gen_lit) = self.generalize_literals_oi(
                    &chosen_lr,
                    &chosen_lx,
                    &mut tmp_gen_vars,
                    &mut tmp_subr,
                    &mut tmp_subx,
                ) else {
                    continue;
                };

                let mut new_gen_lits = gen_lits.clone();
                new_gen_lits.insert(gen_lit);

                let candidate = Rule::new(
                    new_gen_lits.clone(),
                    gen_act.clone(),
                    gen_add.clone(),
                    gen_del.clone(),
                    self.parents.clone(),
                    self.start_pu,
                    false,
                );

                if candidate.prematches_with(x, &tmp_subx) {
                    *gen_lits = new_gen_lits;
                    *subr = tmp_subr;
                    *subx = tmp_subx;
                    *gen_vars = tmp_gen_vars;
                    return Selection::Success {
                        lr: chosen_lr,
                        lx: chosen_lx,
                    };
                }
            }
        }

        Selection::Failure { last_lr }
    }

    /// UNE-GEN-OI over explicit candidate sets: repeated selection until the
    /// rule side runs out. A successful step consumes both chosen literals;
    /// an unsuccessful one only drops the rule-side literal.
    pub fn any_generalization_of<R: Rng>(
        &self,
        mut lr: BTreeSet<Literal>,
        mut lx: BTreeSet<Literal>,
        x: &Rule,
        subr: &mut Substitution,
        subx: &mut Substitution,
        gen_vars: &mut BTreeSet<Term>,
        rng: &mut R,
    ) -> BTreeSet<Literal> {
        let mut gen_lits = BTreeSet::new();

        while !lr.is_empty() && !lx.is_empty() {
            match self.selection(&lr, &lx, x, subr, subx, gen_vars, &mut gen_lits, rng) {
                Selection::Success {
                    lr: chosen_lr,
                    lx: chosen_lx,
                } => {
                    lx.remove(&chosen_lx);
                    lr.remove(&chosen_lr);
                }
                Selection::Failure {
                    last_lr: Some(chosen_lr),
                } => {
                    lr.remove(&chosen_lr);
                }
                Selection::Failure { last_lr: None } => break,
            }
        }

        gen_lits
    }

    /// UNE-GEN-OI over the two precondition sets, lifted through the current
    /// substitution inverses.
    pub fn any_generalization<R: Rng>(
        &self,
        x: &Rule,
        subr: &mut Substitution,
        subx: &mut Substitution,
        gen_vars: &mut BTreeSet<Term>,
        rng: &mut R,
    ) -> BTreeSet<Literal> {
        let lr = subr.inverse().apply_all(&self.preconditions);
        let lx = subx.inverse().apply_all(&x.preconditions);
        self.any_generalization_of(lr, lx, x, subr, subx, gen_vars, rng)
    }

    /// EXACT-GEN: randomised depth-first mapping of every literal of `lr`
    /// onto a distinct compatible literal of `lx`. Unlike UNE-GEN a leaf
    /// failure fails the whole branch.
    pub fn exact_generalization<R: Rng>(
        &self,
        lr: &BTreeSet<Literal>,
        lx: &BTreeSet<Literal>,
        subr: &mut Substitution,
        subx: &mut Substitution,
        gen_vars: &mut BTreeSet<Term>,
        gen_lits: &mut BTreeSet<Literal>,
        rng: &mut R,
    ) -> bool {
        if lr.is_empty() {
            return true;
        }

        let mut shuffled: Vec<Literal> = lr.iter().cloned().collect();
        shuffled.shuffle(rng);

        for chosen_lr in &shuffled {
            let mut tmp_subr = subr.clone();
            let mut tmp_subx = subx.clone();
            let mut tmp_gen_vars = gen_vars.clone();
            let mut tmp_gen_lits = gen_lits.clone();
            let mut tmp_lr = lr.clone();
            tmp_lr.remove(chosen_lr);

            if self.exact_gen_lx_choice(
                chosen_lr,
                &tmp_lr,
                lx,
                &mut tmp_subr,
                &mut tmp_subx,
                &mut tmp_gen_vars,
                &mut tmp_gen_lits,
                rng,
            ) {
                *subr = tmp_subr;
                *subx = tmp_subx;
                *gen_vars = tmp_gen_vars;
                *gen_lits = tmp_gen_lits;
                return true;
            }
        }

        false
    }

    #[allow(clippy::too_many_arguments)]
    fn exact_gen_lx_choice<R: Rng>(
        &self,
        chosen_lr: &Literal,
        lr: &BTreeSet<Literal>,
        lx: &BTreeSet<Literal>,
        subr: &mut Substitution,
        subx: &mut Substitution,
        gen_vars: &mut BTreeSet<Term>,
        gen_lits: &mut BTreeSet<Literal>,
        rng: &mut R,
    ) -> bool {
        let mut shuffled: Vec<Literal> = lx
            .iter()
            .filter(|l| Literal::compatible(l, chosen_lr))
            .cloned()
            .collect();
        shuffled.shuffle(rng);

        for chosen_lx in &shuffled {
            let mut tmp_subr = subr.clone();
            let mut tmp_subx = subx.clone();
            let mut tmp_gen_vars = gen_vars.clone();
            let mut tmp_lx = lx.clone();
            tmp_lx.remove(chosen_lx);

            let Some(gen_lit) = self.generalize_literals_oi(
                chosen_lr,
                chosen_lx,
                &mut tmp_gen_vars,
                &mut tmp_subr,
                &mut tmp_subx,
            ) else {
                continue;
            };

            let mut tmp_gen_lits = gen_lits.clone();
            tmp_gen_lits.insert(gen_lit);

            if self.exact_generalization(
                lr,
                &tmp_lx,
                &mut tmp_subr,
                &mut tmp_subx,
                &mut tmp_gen_vars,
                &mut tmp_gen_lits,
                rng,
            ) {
                *subr = tmp_subr;
                *subx = tmp_subx;
                *gen_vars = tmp_gen_vars;
                *gen_lits = tmp_gen_lits;
                return true;
            }
        }

        false
    }

    /// POST-GENERALIZATION: generalise the action literals, then exactly
    /// generalise the effect sets (sizes must match). Both substitutions are
    /// closed so every action-literal and effect parameter has an entry.
    pub fn post_generalizes<R: Rng>(
        &self,
        x: &Rule,
        subr: &mut Substitution,
        subx: &mut Substitution,
        gen_vars: &mut BTreeSet<Term>,
        rng: &mut R,
    ) -> bool {
        if self.add.len() != x.add.len() || self.del.len() != x.del.len() {
            return false;
        }

        if self
            .generalize_literals_oi(
                &self.action_literal,
                &x.action_literal,
                gen_vars,
                subr,
                subx,
            )
            .is_none()
        {
            return false;
        }

        let mut effects_r: BTreeSet<Literal> = self.add.iter().cloned().collect();
        effects_r.extend(self.del.iter().cloned());
        let mut effects_x: BTreeSet<Literal> = x.add.iter().cloned().collect();
        effects_x.extend(x.del.iter().cloned());

        let mut gen_effects = BTreeSet::new();
        let success =
            self.exact_generalization(&effects_r, &effects_x, subr, subx, gen_vars, &mut gen_effects, rng);

        subr.clean_constants();

        let close = |sub: &mut Substitution, action: &Literal, add: &BTreeSet<Literal>, del: &BTreeSet<Literal>| {
            for p in &action.parameters {
                if sub.get_inverse(p).is_none() {
                    sub.set(p, p);
                }
            }
            for eff in add.iter().chain(del.iter()) {
                for p in &eff.parameters {
                    if sub.get_inverse(p).is_none() {
                        sub.set(p, p);
                    }
                }
            }
        };
        close(subr, &self.action_literal, &self.add, &self.del);
        close(subx, &x.action_literal, &x.add, &x.del);

        success
    }
}
