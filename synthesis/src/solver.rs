//! GR(1) game solving.
//!
//! Computes the winning region with the nested fixpoint
//!
//! ```text
//! Z = νZ. ⋀_j μY. ⋁_i νX. (J_sys_j ∧ Cpre(Z)) ∨ Cpre(Y) ∨ (¬J_env_i ∧ Cpre(X))
//! ```
//!
//! and keeps, for every system goal `j`, the rank of each winning state
//! (the iteration of `Y` in which it first appeared) together with the
//! `X` layers of every rank. The strategy in [`Solution::choose`] either
//! reaches the goal, strictly lowers the rank, or stays inside an `X`
//! layer while the environment withholds one of its own goals.

use crate::game::{Game, StateSet};
use crate::spec::InitialCondition;
use tracing::{debug, info};

pub const UNRANKED: u32 = u32::MAX;

#[derive(Debug, Clone)]
pub struct Solution {
    winning: StateSet,
    /// `ranks[j][state]`, `UNRANKED` outside the winning region
    ranks: Vec<Vec<u32>>,
    /// `layers[j][rank][i]`: the `X` fixpoint for env goal `i`
    layers: Vec<Vec<Vec<StateSet>>>,
    realizable: bool,
    fixed_sys: Option<usize>,
    fixed_state: Option<usize>,
}

/// Solve the game and decide realizability under its initial condition
pub fn solve(game: &Game) -> Solution {
    let n = game.num_states();
    let mut z = StateSet::full(n);
    let mut rounds = 0usize;

    let (ranks, layers) = loop {
        rounds += 1;
        let mut z_next = z.clone();
        let mut ranks = Vec::with_capacity(game.sys_goals().len());
        let mut layers = Vec::with_capacity(game.sys_goals().len());

        for j in 0..game.sys_goals().len() {
            let (y, goal_ranks, goal_layers) = reach_goal(game, &z, j);
            z_next = z_next.intersection(&y);
            ranks.push(goal_ranks);
            layers.push(goal_layers);
        }

        if z_next == z {
            break (ranks, layers);
        }
        z = z_next;
    };

    debug!(
        "Fixpoint converged after {} rounds: {}/{} winning states",
        rounds,
        z.count(),
        n
    );

    let mut solution = Solution {
        winning: z,
        ranks,
        layers,
        realizable: false,
        fixed_sys: None,
        fixed_state: None,
    };
    solution.decide_initial(game);
    info!(
        "Realizability ({}): {}",
        game.qinit(),
        if solution.realizable {
            "realizable"
        } else {
            "unrealizable"
        }
    );
    solution
}

/// `μY. ⋁_i νX. ...` for system goal `j`, restricted to `z`
fn reach_goal(game: &Game, z: &StateSet, j: usize) -> (StateSet, Vec<u32>, Vec<Vec<StateSet>>) {
    let n = game.num_states();
    let start = game.sys_goals()[j]
        .intersection(&game.cpre(z))
        .intersection(z);

    let mut y = StateSet::empty(n);
    let mut ranks = vec![UNRANKED; n];
    let mut layers = Vec::new();

    loop {
        let base = start.union(&game.cpre(&y)).intersection(z);
        let mut y_next = StateSet::empty(n);
        let mut x_sets = Vec::with_capacity(game.env_goals().len());

        for env_goal in game.env_goals() {
            let avoid = env_goal.complement();
            let mut x = z.clone();
            loop {
                let x_next = base
                    .union(&avoid.intersection(&game.cpre(&x)))
                    .intersection(z);
                if x_next == x {
                    break;
                }
                x = x_next;
            }
            y_next = y_next.union(&x);
            x_sets.push(x);
        }

        if y_next == y {
            break;
        }
        let rank = layers.len() as u32;
        for state in y_next.iter() {
            if ranks[state] == UNRANKED {
                ranks[state] = rank;
            }
        }
        layers.push(x_sets);
        y = y_next;
    }

    (y, ranks, layers)
}

impl Solution {
    pub fn winning(&self) -> &StateSet {
        &self.winning
    }

    pub fn is_realizable(&self) -> bool {
        self.realizable
    }

    pub fn rank(&self, goal: usize, state: usize) -> u32 {
        self.ranks[goal][state]
    }

    fn decide_initial(&mut self, game: &Game) {
        let env_init: Vec<usize> = (0..game.env_count()).filter(|&e| game.env_init(e)).collect();
        let good = |e: usize, s: usize| {
            let state = game.state_id(e, s);
            game.sys_init(state) && self.winning.contains(state)
        };

        match game.qinit() {
            InitialCondition::ForallExists => {
                self.realizable = env_init
                    .iter()
                    .all(|&e| (0..game.sys_count()).any(|s| good(e, s)));
            }
            InitialCondition::ExistsForall => {
                self.fixed_sys =
                    (0..game.sys_count()).find(|&s| env_init.iter().all(|&e| good(e, s)));
                self.realizable = self.fixed_sys.is_some();
            }
            InitialCondition::ForallForall => {
                self.realizable = env_init.iter().all(|&e| {
                    (0..game.sys_count())
                        .filter(|&s| game.sys_init(game.state_id(e, s)))
                        .all(|s| self.winning.contains(game.state_id(e, s)))
                });
            }
            InitialCondition::ExistsExists => {
                self.fixed_state = env_init.iter().find_map(|&e| {
                    (0..game.sys_count())
                        .find(|&s| good(e, s))
                        .map(|s| game.state_id(e, s))
                });
                self.realizable = self.fixed_state.is_some();
            }
        }
    }

    /// Initial system valuation for the initial input `env`, if any
    pub fn initial_sys(&self, game: &Game, env: usize) -> Option<usize> {
        if !game.env_init(env) {
            return None;
        }
        match game.qinit() {
            InitialCondition::ForallExists | InitialCondition::ForallForall => (0..game
                .sys_count())
                .find(|&s| {
                    let state = game.state_id(env, s);
                    game.sys_init(state) && self.winning.contains(state)
                }),
            InitialCondition::ExistsForall => self.fixed_sys,
            InitialCondition::ExistsExists => self.fixed_state.and_then(|state| {
                let (e, s) = game.split(state);
                (e == env).then_some(s)
            }),
        }
    }

    /// Environment valuations that may start a play
    pub fn initial_envs(&self, game: &Game) -> Vec<usize> {
        match (game.qinit(), self.fixed_state) {
            (InitialCondition::ExistsExists, Some(state)) => vec![game.split(state).0],
            _ => (0..game.env_count()).filter(|&e| game.env_init(e)).collect(),
        }
    }

    /// First system answer from `state` whose successors all satisfy `good`.
    /// `k` selects the environment move for Mealy games.
    fn pick(&self, game: &Game, state: usize, k: usize, good: impl Fn(usize) -> bool) -> Option<usize> {
        let env_moves = game.env_moves(state);
        if game.is_moore() {
            game.sys_moves(state, 0)
                .iter()
                .find(|&&s2| {
                    env_moves
                        .iter()
                        .all(|&e2| good(game.state_id(e2 as usize, s2 as usize)))
                })
                .map(|&s2| s2 as usize)
        } else {
            let e2 = *env_moves.get(k)? as usize;
            game.sys_moves(state, k)
                .iter()
                .find(|&&s2| good(game.state_id(e2, s2 as usize)))
                .map(|&s2| s2 as usize)
        }
    }

    /// Strategy step: system answer and next goal for `state` under goal
    /// `goal` after the `k`-th environment move
    pub fn choose(&self, game: &Game, state: usize, goal: usize, k: usize) -> Option<(usize, usize)> {
        let goals = self.ranks.len();
        let in_winning = |t: usize| self.winning.contains(t);

        if game.sys_goals()[goal].contains(state) {
            let next_goal = (goal + 1) % goals;
            return self
                .pick(game, state, k, in_winning)
                .map(|s2| (s2, next_goal));
        }

        let ranks = &self.ranks[goal];
        let rank = ranks[state];
        if rank == UNRANKED {
            return self.pick(game, state, k, in_winning).map(|s2| (s2, goal));
        }

        if rank > 0 {
            if let Some(s2) = self.pick(game, state, k, |t| ranks[t] < rank) {
                return Some((s2, goal));
            }
        }

        for (i, layer) in self.layers[goal][rank as usize].iter().enumerate() {
            if layer.contains(state) && !game.env_goals()[i].contains(state) {
                if let Some(s2) = self.pick(game, state, k, |t| layer.contains(t)) {
                    return Some((s2, goal));
                }
            }
        }

        self.pick(game, state, k, in_winning).map(|s2| (s2, goal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::game::Limits;
    use crate::spec::{GrSpec, Section};

    fn build(spec: GrSpec) -> (Game, Solution) {
        let game = Game::build(&spec, Limits::default()).unwrap();
        let solution = solve(&game);
        (game, solution)
    }

    fn request_grant() -> GrSpec {
        GrSpec::new("request-grant")
            .with_env_var("req", Domain::Bool)
            .unwrap()
            .with_sys_var("grant", Domain::Bool)
            .unwrap()
            .with_formula(Section::EnvInit, "!req")
            .unwrap()
            .with_formula(Section::SysInit, "!grant")
            .unwrap()
            .with_formula(Section::SysSafety, "!req -> X(!grant)")
            .unwrap()
            .with_formula(Section::SysSafety, "req -> X(grant)")
            .unwrap()
            .with_formula(Section::EnvProg, "req")
            .unwrap()
            .with_formula(Section::SysProg, "grant")
            .unwrap()
            .with_moore(true)
            .with_qinit(InitialCondition::ExistsForall)
    }

    #[test]
    fn test_request_grant_is_realizable() {
        let (game, solution) = build(request_grant());
        assert!(solution.is_realizable());
        assert_eq!(solution.winning().count(), game.num_states());
        assert_eq!(solution.initial_sys(&game, 0), Some(0));
        assert_eq!(solution.initial_sys(&game, 1), None);
    }

    #[test]
    fn test_strategy_follows_requests() {
        let (game, solution) = build(request_grant());
        // req = 1, grant = 0: the only answer is to grant
        let state = game.state_id(1, 0);
        assert_eq!(solution.choose(&game, state, 0, 0), Some((1, 0)));
        // req = 0, grant = 0: stay idle
        let state = game.state_id(0, 0);
        assert_eq!(solution.choose(&game, state, 0, 0), Some((0, 0)));
    }

    #[test]
    fn test_contradicting_guarantees_are_unrealizable() {
        let spec = GrSpec::new("contradiction")
            .with_env_var("req", Domain::Bool)
            .unwrap()
            .with_sys_var("grant", Domain::Bool)
            .unwrap()
            .with_formula(Section::SysSafety, "X grant")
            .unwrap()
            .with_formula(Section::SysSafety, "X !grant")
            .unwrap();
        let (_, solution) = build(spec);
        assert!(solution.winning().is_empty());
        assert!(!solution.is_realizable());
    }

    #[test]
    fn test_liveness_needs_environment_assumption() {
        // the system may only grant in answer to a request
        let without_assumption = GrSpec::new("lazy-env")
            .with_env_var("req", Domain::Bool)
            .unwrap()
            .with_sys_var("grant", Domain::Bool)
            .unwrap()
            .with_formula(Section::SysSafety, "!req -> X(!grant)")
            .unwrap()
            .with_formula(Section::SysProg, "grant")
            .unwrap();
        let (_, solution) = build(without_assumption.clone());
        assert!(!solution.is_realizable());

        let with_assumption = without_assumption
            .with_formula(Section::EnvProg, "req")
            .unwrap();
        let (_, solution) = build(with_assumption);
        assert!(solution.is_realizable());
    }

    #[test]
    fn test_exists_exists_fixes_initial_state() {
        let spec = GrSpec::new("pick-start")
            .with_env_var("a", Domain::Bool)
            .unwrap()
            .with_sys_var("b", Domain::Bool)
            .unwrap()
            .with_formula(Section::SysInit, "a <-> b")
            .unwrap()
            .with_qinit(InitialCondition::ExistsExists);
        let (game, solution) = build(spec);
        assert!(solution.is_realizable());
        assert_eq!(solution.initial_envs(&game), vec![0]);
        assert_eq!(solution.initial_sys(&game, 0), Some(0));
        assert_eq!(solution.initial_sys(&game, 1), None);
    }

    #[test]
    fn test_forall_forall_requires_every_initial_state() {
        let spec = GrSpec::new("all-starts")
            .with_env_var("a", Domain::Bool)
            .unwrap()
            .with_sys_var("b", Domain::Bool)
            .unwrap()
            .with_formula(Section::SysSafety, "!b")
            .unwrap()
            .with_qinit(InitialCondition::ForallForall);
        let (_, solution) = build(spec.clone());
        // states with b = 1 violate the guarantee immediately
        assert!(!solution.is_realizable());

        let (_, solution) = build(spec.with_qinit(InitialCondition::ForallExists));
        assert!(solution.is_realizable());
    }
}
