//! Finite-state controllers extracted from a winning strategy.

use crate::domain::{Valuation, VarTable};
use crate::error::{SynthesisError, SynthesisResult};
use crate::game::{Game, Limits};
use crate::solver::{solve, Solution};
use crate::spec::GrSpec;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// One controller state: the last input, the current output and the
/// system goal the strategy is working towards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    pub id: usize,
    pub goal: usize,
    pub inputs: Valuation,
    pub outputs: Valuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Transition {
    input: u64,
}

/// Synthesize a controller with the default construction limits
pub fn synthesize(spec: &GrSpec) -> SynthesisResult<Transducer> {
    synthesize_with_limits(spec, Limits::default())
}

pub fn synthesize_with_limits(spec: &GrSpec, limits: Limits) -> SynthesisResult<Transducer> {
    let game = Game::build(spec, limits)?;
    let solution = solve(&game);
    if !solution.is_realizable() {
        return Err(SynthesisError::Unrealizable);
    }
    let transducer = Transducer::from_strategy(&spec.name, &game, &solution)?;
    info!(
        "Synthesized '{}': {} states, {} transitions",
        spec.name,
        transducer.len(),
        transducer.graph.edge_count()
    );
    Ok(transducer)
}

/// Decide realizability without building a controller
pub fn check_realizable(spec: &GrSpec) -> SynthesisResult<bool> {
    let game = Game::build(spec, Limits::default())?;
    Ok(solve(&game).is_realizable())
}

/// Mealy or Moore machine over the specification's variables
#[derive(Debug, Clone)]
pub struct Transducer {
    name: String,
    moore: bool,
    env: VarTable,
    sys: VarTable,
    graph: DiGraph<MachineState, Transition>,
    initial: BTreeMap<u64, NodeIndex>,
}

impl Transducer {
    fn from_strategy(name: &str, game: &Game, solution: &Solution) -> SynthesisResult<Self> {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<(usize, usize), NodeIndex> = HashMap::new();
        let mut queue = VecDeque::new();

        let mut initial = BTreeMap::new();
        for env in solution.initial_envs(game) {
            match solution.initial_sys(game, env) {
                Some(sys) => {
                    let node = intern(
                        game,
                        &mut graph,
                        &mut nodes,
                        &mut queue,
                        game.state_id(env, sys),
                        0,
                    );
                    initial.insert(env as u64, node);
                }
                None => debug!("No winning initial state for input {}", env),
            }
        }

        while let Some((state, goal)) = queue.pop_front() {
            let from = nodes[&(state, goal)];
            for (k, &e2) in game.env_moves(state).iter().enumerate() {
                let (s2, next_goal) = solution
                    .choose(game, state, goal, k)
                    .ok_or(SynthesisError::Unrealizable)?;
                let to = intern(
                    game,
                    &mut graph,
                    &mut nodes,
                    &mut queue,
                    game.state_id(e2 as usize, s2),
                    next_goal,
                );
                graph.add_edge(
                    from,
                    to,
                    Transition {
                        input: u64::from(e2),
                    },
                );
            }
        }

        Ok(Self {
            name: name.to_string(),
            moore: game.is_moore(),
            env: game.env_table().clone(),
            sys: game.sys_table().clone(),
            graph,
            initial,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_moore(&self) -> bool {
        self.moore
    }

    pub fn env_vars(&self) -> &VarTable {
        &self.env
    }

    pub fn sys_vars(&self) -> &VarTable {
        &self.sys
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn states(&self) -> impl Iterator<Item = &MachineState> {
        self.graph.node_weights()
    }

    pub fn state(&self, id: usize) -> Option<&MachineState> {
        self.graph.node_weight(NodeIndex::new(id))
    }

    /// Ids of the initial states, one per admissible first input
    pub fn initial_states(&self) -> Vec<usize> {
        self.initial.values().map(|node| node.index()).collect()
    }

    /// Initial state for the first input
    pub fn initial_state(&self, inputs: &Valuation) -> SynthesisResult<usize> {
        let input = self.env.encode(inputs)?;
        self.initial
            .get(&input)
            .map(|node| node.index())
            .ok_or_else(|| SynthesisError::AssumptionViolated {
                reason: format!("initial input {} is not admissible", describe(inputs)),
            })
    }

    /// Successor of state `id` on `inputs`
    pub fn step(&self, id: usize, inputs: &Valuation) -> SynthesisResult<usize> {
        let input = self.env.encode(inputs)?;
        let node = NodeIndex::new(id);
        if self.graph.node_weight(node).is_none() {
            return Err(SynthesisError::AssumptionViolated {
                reason: format!("unknown controller state {}", id),
            });
        }
        self.graph
            .edges(node)
            .find(|edge| edge.weight().input == input)
            .map(|edge| edge.target().index())
            .ok_or_else(|| SynthesisError::AssumptionViolated {
                reason: format!(
                    "input {} is not allowed from state {}",
                    describe(inputs),
                    id
                ),
            })
    }

    /// Graphviz rendering, one node per controller state
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape(&self.name));
        let _ = writeln!(out, "    node [shape=box];");
        let _ = writeln!(out, "    init [shape=point];");
        for node in self.graph.node_indices() {
            let state = &self.graph[node];
            let mut label = format!("{} (goal {})", state.id, state.goal);
            for (name, value) in state.inputs.iter().chain(state.outputs.iter()) {
                let _ = write!(label, "\\n{} = {}", name, value);
            }
            let _ = writeln!(out, "    n{} [label=\"{}\"];", node.index(), escape(&label));
        }
        for node in self.initial.values() {
            let _ = writeln!(out, "    init -> n{};", node.index());
        }
        for edge in self.graph.edge_references() {
            let _ = writeln!(
                out,
                "    n{} -> n{} [label=\"{}\"];",
                edge.source().index(),
                edge.target().index(),
                escape(&describe(&self.env.decode(edge.weight().input)))
            );
        }
        out.push_str("}\n");
        out
    }

    pub fn to_export(&self) -> TransducerExport {
        TransducerExport {
            name: self.name.clone(),
            moore: self.moore,
            env_vars: self.env.clone(),
            sys_vars: self.sys.clone(),
            initial: self.initial_states(),
            states: self.graph.node_weights().cloned().collect(),
            transitions: self
                .graph
                .edge_references()
                .map(|edge| TransitionExport {
                    from: edge.source().index(),
                    to: edge.target().index(),
                    input: self.env.decode(edge.weight().input),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> SynthesisResult<String> {
        Ok(serde_json::to_string_pretty(&self.to_export())?)
    }

    pub fn from_json(input: &str) -> SynthesisResult<Self> {
        let export: TransducerExport = serde_json::from_str(input)?;
        Self::from_export(export)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> SynthesisResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> SynthesisResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn from_export(export: TransducerExport) -> SynthesisResult<Self> {
        let mut graph = DiGraph::with_capacity(export.states.len(), export.transitions.len());
        for (position, state) in export.states.into_iter().enumerate() {
            if state.id != position {
                return Err(SynthesisError::InvalidTransducer {
                    reason: format!("state id {} at position {}", state.id, position),
                });
            }
            graph.add_node(state);
        }

        let node = |id: usize| -> SynthesisResult<NodeIndex> {
            if id < graph.node_count() {
                Ok(NodeIndex::new(id))
            } else {
                Err(SynthesisError::InvalidTransducer {
                    reason: format!("reference to unknown state {}", id),
                })
            }
        };

        let mut edges = Vec::with_capacity(export.transitions.len());
        for transition in &export.transitions {
            let input = export.env_vars.encode(&transition.input)?;
            edges.push((node(transition.from)?, node(transition.to)?, input));
        }
        let mut initial = BTreeMap::new();
        for id in export.initial {
            let index = node(id)?;
            let input = export.env_vars.encode(&graph[index].inputs)?;
            initial.insert(input, index);
        }
        for (from, to, input) in edges {
            graph.add_edge(from, to, Transition { input });
        }

        Ok(Self {
            name: export.name,
            moore: export.moore,
            env: export.env_vars,
            sys: export.sys_vars,
            graph,
            initial,
        })
    }
}

/// Serialized form of a [`Transducer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransducerExport {
    pub name: String,
    pub moore: bool,
    pub env_vars: VarTable,
    pub sys_vars: VarTable,
    pub initial: Vec<usize>,
    pub states: Vec<MachineState>,
    pub transitions: Vec<TransitionExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionExport {
    pub from: usize,
    pub to: usize,
    pub input: Valuation,
}

/// Stepwise execution of a transducer.
///
/// The first call to [`react`](TransducerRunner::react) selects the initial
/// state from the first input; later calls follow transitions. Under Moore
/// semantics the outputs returned for an input were fixed before that
/// input was seen.
#[derive(Debug, Clone)]
pub struct TransducerRunner {
    transducer: Arc<Transducer>,
    current: Option<usize>,
}

impl TransducerRunner {
    pub fn new(transducer: Arc<Transducer>) -> Self {
        Self {
            transducer,
            current: None,
        }
    }

    pub fn transducer(&self) -> &Transducer {
        &self.transducer
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Feed one input valuation, returning the outputs of the new state
    pub fn react(&mut self, inputs: &Valuation) -> SynthesisResult<Valuation> {
        let next = match self.current {
            None => self.transducer.initial_state(inputs)?,
            Some(id) => self.transducer.step(id, inputs)?,
        };
        self.current = Some(next);
        self.transducer
            .state(next)
            .map(|state| state.outputs.clone())
            .ok_or_else(|| SynthesisError::AssumptionViolated {
                reason: format!("unknown controller state {}", next),
            })
    }
}

fn intern(
    game: &Game,
    graph: &mut DiGraph<MachineState, Transition>,
    nodes: &mut HashMap<(usize, usize), NodeIndex>,
    queue: &mut VecDeque<(usize, usize)>,
    state: usize,
    goal: usize,
) -> NodeIndex {
    if let Some(&node) = nodes.get(&(state, goal)) {
        return node;
    }
    let (e, s) = game.split(state);
    let id = graph.node_count();
    let node = graph.add_node(MachineState {
        id,
        goal,
        inputs: game.env_table().decode(e as u64),
        outputs: game.sys_table().decode(s as u64),
    });
    nodes.insert((state, goal), node);
    queue.push_back((state, goal));
    node
}

fn describe(valuation: &Valuation) -> String {
    let parts: Vec<String> = valuation
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

fn escape(text: &str) -> String {
    text.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Domain, Value};
    use crate::spec::{InitialCondition, Section};

    fn req(value: bool) -> Valuation {
        Valuation::from([("req".to_string(), Value::Bool(value))])
    }

    fn grant(outputs: &Valuation) -> bool {
        outputs["grant"] == Value::Bool(true)
    }

    fn moore_spec() -> GrSpec {
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

    fn mealy_spec() -> GrSpec {
        GrSpec::new("request-grant-mealy")
            .with_env_var("req", Domain::Bool)
            .unwrap()
            .with_sys_var("grant", Domain::Bool)
            .unwrap()
            .with_formula(Section::EnvInit, "!req")
            .unwrap()
            .with_formula(Section::SysInit, "!grant")
            .unwrap()
            .with_formula(Section::SysSafety, "X req <-> X grant")
            .unwrap()
            .with_formula(Section::EnvProg, "req")
            .unwrap()
            .with_formula(Section::SysProg, "grant")
            .unwrap()
    }

    #[test]
    fn test_moore_grant_follows_request_by_one_step() {
        let transducer = Arc::new(synthesize(&moore_spec()).unwrap());
        assert!(transducer.is_moore());
        let mut runner = TransducerRunner::new(transducer);

        assert!(!grant(&runner.react(&req(false)).unwrap()));
        assert!(!grant(&runner.react(&req(true)).unwrap()));
        assert!(grant(&runner.react(&req(false)).unwrap()));
        assert!(!grant(&runner.react(&req(false)).unwrap()));
    }

    #[test]
    fn test_mealy_grant_answers_same_step() {
        let transducer = Arc::new(synthesize(&mealy_spec()).unwrap());
        let mut runner = TransducerRunner::new(transducer);

        assert!(!grant(&runner.react(&req(false)).unwrap()));
        assert!(grant(&runner.react(&req(true)).unwrap()));
        assert!(!grant(&runner.react(&req(false)).unwrap()));
    }

    #[test]
    fn test_inadmissible_initial_input() {
        let transducer = Arc::new(synthesize(&moore_spec()).unwrap());
        let mut runner = TransducerRunner::new(transducer);
        assert!(matches!(
            runner.react(&req(true)),
            Err(SynthesisError::AssumptionViolated { .. })
        ));
        assert_eq!(runner.current(), None);
    }

    #[test]
    fn test_unrealizable_spec() {
        let spec = mealy_spec()
            .with_formula(Section::SysSafety, "X !grant")
            .unwrap();
        assert!(matches!(
            synthesize(&spec),
            Err(SynthesisError::Unrealizable)
        ));
        assert!(!check_realizable(&spec).unwrap());
    }

    #[test]
    fn test_every_state_is_reachable_and_complete() {
        let transducer = synthesize(&moore_spec()).unwrap();
        assert_eq!(transducer.initial_states().len(), 1);
        for state in transducer.states() {
            let node = NodeIndex::new(state.id);
            // no env safety, so both request values are possible everywhere
            assert_eq!(transducer.graph.edges(node).count(), 2);
        }
    }

    #[test]
    fn test_dot_output() {
        let transducer = synthesize(&moore_spec()).unwrap();
        let dot = transducer.to_dot();
        assert!(dot.starts_with("digraph \"request-grant\" {"));
        assert!(dot.contains("init -> n0;"));
        assert!(dot.contains("grant = false"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_json_export_reloads() {
        let transducer = synthesize(&mealy_spec()).unwrap();
        let json = transducer.to_json().unwrap();
        let reloaded = Transducer::from_json(&json).unwrap();
        assert_eq!(reloaded.len(), transducer.len());
        assert_eq!(reloaded.initial_states(), transducer.initial_states());

        let mut runner = TransducerRunner::new(Arc::new(reloaded));
        assert!(!grant(&runner.react(&req(false)).unwrap()));
        assert!(grant(&runner.react(&req(true)).unwrap()));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("controller.json");
        let transducer = synthesize(&moore_spec()).unwrap();
        transducer.save(&path).unwrap();
        let loaded = Transducer::load(&path).unwrap();
        assert_eq!(loaded.to_export(), transducer.to_export());
    }
}
