//! Explicit-state game graph built from a GR(1) specification.
//!
//! A state is a pair `(e, s)` of an environment valuation index and a
//! system valuation index, numbered `e * |S| + s`. From every state the
//! environment picks a next valuation allowed by `env_safety`, and the
//! system answers with one allowed by `sys_safety`. Under Moore semantics
//! the system answer may not depend on the next environment valuation,
//! so its moves are stored once per state.

use crate::domain::{Valuation, VarTable};
use crate::error::{SynthesisError, SynthesisResult};
use crate::formula::{CompareOp, Formula};
use crate::spec::{GrSpec, InitialCondition, Section};
use bitvec::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Bounds on the explicit construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of game states
    pub max_states: u64,
    /// Maximum number of safety evaluations while building moves
    pub max_evaluations: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_states: 1 << 16,
            max_evaluations: 1 << 26,
        }
    }
}

impl Limits {
    pub fn with_max_states(mut self, max_states: u64) -> Self {
        self.max_states = max_states;
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: u64) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }
}

/// Set of game states
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateSet {
    bits: BitVec,
}

impl StateSet {
    pub fn empty(universe: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, universe),
        }
    }

    pub fn full(universe: usize) -> Self {
        Self {
            bits: BitVec::repeat(true, universe),
        }
    }

    pub fn universe(&self) -> usize {
        self.bits.len()
    }

    pub fn contains(&self, state: usize) -> bool {
        self.bits[state]
    }

    pub fn insert(&mut self, state: usize) {
        self.bits.set(state, true);
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    pub fn union(&self, other: &StateSet) -> StateSet {
        let bits = self
            .bits
            .iter()
            .by_vals()
            .zip(other.bits.iter().by_vals())
            .map(|(a, b)| a || b)
            .collect();
        StateSet { bits }
    }

    pub fn intersection(&self, other: &StateSet) -> StateSet {
        let bits = self
            .bits
            .iter()
            .by_vals()
            .zip(other.bits.iter().by_vals())
            .map(|(a, b)| a && b)
            .collect();
        StateSet { bits }
    }

    pub fn complement(&self) -> StateSet {
        StateSet {
            bits: self.bits.iter().by_vals().map(|b| !b).collect(),
        }
    }

    pub fn is_subset(&self, other: &StateSet) -> bool {
        self.iter().all(|state| other.contains(state))
    }
}

/// Formula compiled against the slot layout of a game frame
#[derive(Debug, Clone)]
enum Expr {
    Const(bool),
    Slot(usize),
    Cmp { slot: usize, op: CompareOp, value: i64 },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Implies(Box<Expr>, Box<Expr>),
    Iff(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, frame: &[i64]) -> bool {
        match self {
            Expr::Const(b) => *b,
            Expr::Slot(slot) => frame[*slot] != 0,
            Expr::Cmp { slot, op, value } => op.apply(frame[*slot], *value),
            Expr::Not(inner) => !inner.eval(frame),
            Expr::And(l, r) => l.eval(frame) && r.eval(frame),
            Expr::Or(l, r) => l.eval(frame) || r.eval(frame),
            Expr::Implies(l, r) => !l.eval(frame) || r.eval(frame),
            Expr::Iff(l, r) => l.eval(frame) == r.eval(frame),
        }
    }
}

/// Maps variable names to frame slots.
///
/// Environment variables come first, then system variables; the next
/// value of slot `k` lives at `k + width`.
struct Layout {
    slots: HashMap<String, usize>,
    width: usize,
}

impl Layout {
    fn new(env: &VarTable, sys: &VarTable) -> Self {
        let slots = env
            .iter()
            .chain(sys.iter())
            .enumerate()
            .map(|(slot, (name, _))| (name.to_string(), slot))
            .collect::<HashMap<_, _>>();
        Self {
            width: slots.len(),
            slots,
        }
    }

    fn compile(&self, formula: &Formula, section: Section) -> SynthesisResult<Expr> {
        self.compile_at(formula, section, false)
    }

    fn compile_at(&self, formula: &Formula, section: Section, next: bool) -> SynthesisResult<Expr> {
        let slot = |name: &str| {
            self.slots
                .get(name)
                .map(|slot| if next { slot + self.width } else { *slot })
                .ok_or_else(|| SynthesisError::UndeclaredVariable {
                    name: name.to_string(),
                    section: section.to_string(),
                })
        };
        let boxed = |f: &Formula| self.compile_at(f, section, next).map(Box::new);

        Ok(match formula {
            Formula::True => Expr::Const(true),
            Formula::False => Expr::Const(false),
            Formula::Var(name) => Expr::Slot(slot(name)?),
            Formula::Compare { var, op, value } => Expr::Cmp {
                slot: slot(var)?,
                op: *op,
                value: *value,
            },
            Formula::Not(inner) => Expr::Not(boxed(inner)?),
            Formula::And(l, r) => Expr::And(boxed(l)?, boxed(r)?),
            Formula::Or(l, r) => Expr::Or(boxed(l)?, boxed(r)?),
            Formula::Implies(l, r) => Expr::Implies(boxed(l)?, boxed(r)?),
            Formula::Iff(l, r) => Expr::Iff(boxed(l)?, boxed(r)?),
            Formula::Next(inner) if !next => self.compile_at(inner, section, true)?,
            Formula::Next(_) | Formula::Always(_) | Formula::Eventually(_) => {
                return Err(SynthesisError::InvalidFormula {
                    section: section.to_string(),
                    formula: formula.to_string(),
                    reason: "not expressible over a single transition".to_string(),
                })
            }
        })
    }

    fn compile_all(&self, spec: &GrSpec, section: Section) -> SynthesisResult<Vec<Expr>> {
        spec.section(section)
            .iter()
            .map(|f| self.compile(f, section))
            .collect()
    }
}

fn all_hold(exprs: &[Expr], frame: &[i64]) -> bool {
    exprs.iter().all(|e| e.eval(frame))
}

#[derive(Debug)]
pub struct Game {
    env: VarTable,
    sys: VarTable,
    moore: bool,
    qinit: InitialCondition,
    env_count: usize,
    sys_count: usize,
    env_moves: Vec<Vec<u32>>,
    sys_moves: Vec<Vec<u32>>,
    move_base: Vec<usize>,
    env_init: Vec<bool>,
    sys_init: StateSet,
    env_goals: Vec<StateSet>,
    sys_goals: Vec<StateSet>,
}

impl Game {
    /// Validate `spec` and enumerate its states and moves
    pub fn build(spec: &GrSpec, limits: Limits) -> SynthesisResult<Self> {
        spec.validate()?;

        let env_size = spec.env_vars.size();
        let sys_size = spec.sys_vars.size();
        let states = env_size.saturating_mul(sys_size);
        if states > limits.max_states {
            return Err(SynthesisError::StateSpaceTooLarge {
                size: states,
                limit: limits.max_states,
            });
        }
        let per_state = if spec.moore {
            env_size + sys_size
        } else {
            env_size + env_size * sys_size
        };
        let evaluations = states.saturating_mul(per_state);
        if evaluations > limits.max_evaluations {
            return Err(SynthesisError::StateSpaceTooLarge {
                size: evaluations,
                limit: limits.max_evaluations,
            });
        }

        let layout = Layout::new(&spec.env_vars, &spec.sys_vars);
        let env_init = layout.compile_all(spec, Section::EnvInit)?;
        let sys_init = layout.compile_all(spec, Section::SysInit)?;
        let env_safety = layout.compile_all(spec, Section::EnvSafety)?;
        let sys_safety = layout.compile_all(spec, Section::SysSafety)?;
        let env_prog = layout.compile_all(spec, Section::EnvProg)?;
        let sys_prog = layout.compile_all(spec, Section::SysProg)?;

        let env_count = env_size as usize;
        let sys_count = sys_size as usize;
        let num_states = env_count * sys_count;
        let env_values: Vec<Vec<i64>> = (0..env_size)
            .map(|e| spec.env_vars.raw_values(e))
            .collect();
        let sys_values: Vec<Vec<i64>> = (0..sys_size)
            .map(|s| spec.sys_vars.raw_values(s))
            .collect();

        let width = layout.width;
        let env_width = spec.env_vars.len();
        let mut frame = vec![0i64; 2 * width];
        let set_env = |frame: &mut [i64], e: usize, next: bool| {
            let base = if next { width } else { 0 };
            frame[base..base + env_width].copy_from_slice(&env_values[e]);
        };
        let set_sys = |frame: &mut [i64], s: usize, next: bool| {
            let base = env_width + if next { width } else { 0 };
            frame[base..base + width - env_width].copy_from_slice(&sys_values[s]);
        };

        let mut env_init_ok = Vec::with_capacity(env_count);
        for e in 0..env_count {
            set_env(&mut frame, e, false);
            env_init_ok.push(all_hold(&env_init, &frame));
        }

        let mut sys_init_set = StateSet::empty(num_states);
        let mut env_goals = vec![StateSet::empty(num_states); env_prog.len().max(1)];
        let mut sys_goals = vec![StateSet::empty(num_states); sys_prog.len().max(1)];
        let mut env_moves = Vec::with_capacity(num_states);
        let mut sys_moves = Vec::new();
        let mut move_base = Vec::with_capacity(num_states);

        for state in 0..num_states {
            let (e, s) = (state / sys_count, state % sys_count);
            set_env(&mut frame, e, false);
            set_sys(&mut frame, s, false);

            if all_hold(&sys_init, &frame) {
                sys_init_set.insert(state);
            }
            for (i, goal) in env_goals.iter_mut().enumerate() {
                if env_prog.get(i).map_or(true, |g| g.eval(&frame)) {
                    goal.insert(state);
                }
            }
            for (j, goal) in sys_goals.iter_mut().enumerate() {
                if sys_prog.get(j).map_or(true, |g| g.eval(&frame)) {
                    goal.insert(state);
                }
            }

            let mut allowed_env = Vec::new();
            for e2 in 0..env_count {
                set_env(&mut frame, e2, true);
                if all_hold(&env_safety, &frame) {
                    allowed_env.push(e2 as u32);
                }
            }

            move_base.push(sys_moves.len());
            if spec.moore {
                // next environment slots are never read by Moore guarantees
                let mut allowed_sys = Vec::new();
                for s2 in 0..sys_count {
                    set_sys(&mut frame, s2, true);
                    if all_hold(&sys_safety, &frame) {
                        allowed_sys.push(s2 as u32);
                    }
                }
                sys_moves.push(allowed_sys);
            } else {
                for &e2 in &allowed_env {
                    set_env(&mut frame, e2 as usize, true);
                    let mut allowed_sys = Vec::new();
                    for s2 in 0..sys_count {
                        set_sys(&mut frame, s2, true);
                        if all_hold(&sys_safety, &frame) {
                            allowed_sys.push(s2 as u32);
                        }
                    }
                    sys_moves.push(allowed_sys);
                }
            }
            env_moves.push(allowed_env);
        }

        debug!(
            "Built game '{}': {} states ({} env x {} sys), moore={}",
            spec.name, num_states, env_count, sys_count, spec.moore
        );

        Ok(Self {
            env: spec.env_vars.clone(),
            sys: spec.sys_vars.clone(),
            moore: spec.moore,
            qinit: spec.qinit,
            env_count,
            sys_count,
            env_moves,
            sys_moves,
            move_base,
            env_init: env_init_ok,
            sys_init: sys_init_set,
            env_goals,
            sys_goals,
        })
    }

    pub fn num_states(&self) -> usize {
        self.env_count * self.sys_count
    }

    pub fn env_count(&self) -> usize {
        self.env_count
    }

    pub fn sys_count(&self) -> usize {
        self.sys_count
    }

    pub fn env_table(&self) -> &VarTable {
        &self.env
    }

    pub fn sys_table(&self) -> &VarTable {
        &self.sys
    }

    pub fn is_moore(&self) -> bool {
        self.moore
    }

    pub fn qinit(&self) -> InitialCondition {
        self.qinit
    }

    pub fn state_id(&self, env: usize, sys: usize) -> usize {
        env * self.sys_count + sys
    }

    pub fn split(&self, state: usize) -> (usize, usize) {
        (state / self.sys_count, state % self.sys_count)
    }

    /// Next environment valuations allowed from `state`
    pub fn env_moves(&self, state: usize) -> &[u32] {
        &self.env_moves[state]
    }

    /// System answers allowed from `state` after the `k`-th environment move.
    /// Moore games ignore `k`.
    pub fn sys_moves(&self, state: usize, k: usize) -> &[u32] {
        if self.moore {
            &self.sys_moves[self.move_base[state]]
        } else {
            &self.sys_moves[self.move_base[state] + k]
        }
    }

    pub fn env_init(&self, env: usize) -> bool {
        self.env_init[env]
    }

    pub fn sys_init(&self, state: usize) -> bool {
        self.sys_init.contains(state)
    }

    pub fn env_goals(&self) -> &[StateSet] {
        &self.env_goals
    }

    pub fn sys_goals(&self) -> &[StateSet] {
        &self.sys_goals
    }

    /// Full valuation (inputs and outputs) of a state
    pub fn valuation(&self, state: usize) -> Valuation {
        let (e, s) = self.split(state);
        let mut valuation = self.env.decode(e as u64);
        valuation.extend(self.sys.decode(s as u64));
        valuation
    }

    /// Controllable predecessor: states from which the system can force
    /// the next state into `target`
    pub fn cpre(&self, target: &StateSet) -> StateSet {
        let mut result = StateSet::empty(self.num_states());
        for state in 0..self.num_states() {
            if self.forces(state, |next| target.contains(next)) {
                result.insert(state);
            }
        }
        result
    }

    /// True if the system can force a successor of `state` satisfying `good`
    pub fn forces(&self, state: usize, good: impl Fn(usize) -> bool) -> bool {
        let env_moves = self.env_moves(state);
        if self.moore {
            env_moves.is_empty()
                || self.sys_moves(state, 0).iter().any(|&s2| {
                    env_moves
                        .iter()
                        .all(|&e2| good(self.state_id(e2 as usize, s2 as usize)))
                })
        } else {
            env_moves.iter().enumerate().all(|(k, &e2)| {
                self.sys_moves(state, k)
                    .iter()
                    .any(|&s2| good(self.state_id(e2 as usize, s2 as usize)))
            })
        }
    }
}
