//! Episode execution and run summaries.

use crate::config::HarnessConfig;
use crate::controllers::{Command, ControllerError, ControllerRegistry, Propositions, Thresholds};
use crate::lander::{Action, LanderError, LunarLander, Observation, StepResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use synthesis::{Monitor, MonitorReport, Property, SynthesisError, Valuation, Value};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error("Simulation error: {0}")]
    Lander(#[from] LanderError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] SynthesisError),

    #[error("Episode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Concurrency limiter closed: {0}")]
    Semaphore(#[from] tokio::sync::AcquireError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RunnerResult<T> = Result<T, RunnerError>;

/// Why an episode stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Landed,
    Crashed,
    OutOfBounds,
    /// The simulation's own time limit
    TimeLimit,
    /// The runner's `max_steps`
    StepLimit,
    /// The controller returned [`Command::Terminate`]
    ControllerTerminated,
}

/// One simulated frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub episode: usize,
    pub seed: u64,
    pub step: usize,
    pub action: Action,
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeOutcome {
    pub episode: usize,
    pub seed: u64,
    pub steps: usize,
    pub total_reward: f64,
    pub success: bool,
    pub end: EndReason,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub monitor: Option<MonitorReport>,
    #[serde(skip)]
    pub trajectory: Vec<StepRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub controller: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub episodes: Vec<EpisodeOutcome>,
    pub successes: usize,
    /// Percentage with two decimals
    pub success_rate: f64,
    pub mean_reward: f64,
}

impl RunSummary {
    fn new(
        controller: &str,
        started_at: DateTime<Utc>,
        episodes: Vec<EpisodeOutcome>,
    ) -> Self {
        let successes = episodes.iter().filter(|e| e.success).count();
        let success_rate = if episodes.is_empty() {
            0.0
        } else {
            (successes * 10_000 / episodes.len()) as f64 / 100.0
        };
        let mean_reward = if episodes.is_empty() {
            0.0
        } else {
            episodes.iter().map(|e| e.total_reward).sum::<f64>() / episodes.len() as f64
        };
        Self {
            run_id: Uuid::new_v4(),
            controller: controller.to_string(),
            started_at,
            finished_at: Utc::now(),
            episodes,
            successes,
            success_rate,
            mean_reward,
        }
    }

    /// Episodes whose monitor report has a violation
    pub fn monitor_violations(&self) -> usize {
        self.episodes
            .iter()
            .filter(|e| e.monitor.as_ref().is_some_and(|r| !r.all_satisfied()))
            .count()
    }
}

/// Trace position seen by the monitor: the propositions of the observation
/// the controller acted on under `thresholds`, the action taken and the
/// status flags of the resulting step.
pub fn trace_valuation(
    observation: &Observation,
    thresholds: &Thresholds,
    action: Action,
    step: &StepResult,
) -> Valuation {
    let mut valuation = Propositions::evaluate(observation, thresholds).to_valuation();
    let flags = [
        ("crash", step.status.crashed),
        ("landed", step.status.landed),
        ("out_of_bounds", step.status.out_of_bounds),
    ];
    for (name, value) in flags {
        valuation.insert(name.to_string(), Value::Bool(value));
    }
    valuation.insert("action".to_string(), Value::Int(i64::from(action.index())));
    valuation
}

#[derive(Clone)]
pub struct EpisodeRunner {
    config: HarnessConfig,
    registry: Arc<ControllerRegistry>,
    monitor: Option<Arc<Monitor>>,
}

impl EpisodeRunner {
    pub fn new(config: HarnessConfig, registry: Arc<ControllerRegistry>) -> RunnerResult<Self> {
        config.validate().map_err(RunnerError::InvalidConfig)?;
        if !registry.contains(&config.controller) {
            return Err(ControllerError::NotFound {
                name: config.controller.clone(),
            }
            .into());
        }

        let monitor = if config.properties.is_empty() {
            None
        } else {
            let mut monitor = Monitor::new();
            for property in &config.properties {
                monitor.add(property.parse::<Property>()?);
            }
            Some(Arc::new(monitor))
        };

        Ok(Self {
            config,
            registry,
            monitor,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Simulate episode `episode` with seed `seed + episode`
    pub fn run_episode(&self, episode: usize) -> RunnerResult<EpisodeOutcome> {
        let seed = self.config.seed.wrapping_add(episode as u64);
        let mut controller = self.registry.create(&self.config.controller)?;
        controller.reset(seed);

        let mut lander = LunarLander::new(self.config.lander.clone())?;
        let mut observation = lander.reset(seed);

        let mut trajectory = Vec::new();
        let mut trace = Vec::new();
        let mut total_reward = 0.0;
        let mut end = EndReason::StepLimit;

        for step in 0..self.config.max_steps {
            let action = match controller.control(&observation)? {
                Command::Act(action) => action,
                Command::Terminate => {
                    debug!("Episode {}: controller terminated at step {}", episode, step);
                    end = EndReason::ControllerTerminated;
                    break;
                }
            };

            let result = lander.step(action)?;
            total_reward += result.reward;
            if self.monitor.is_some() {
                trace.push(trace_valuation(
                    &observation,
                    &self.config.monitor_thresholds,
                    action,
                    &result,
                ));
            }
            trajectory.push(StepRecord {
                episode,
                seed,
                step,
                action,
                observation: result.observation,
                reward: result.reward,
                terminated: result.terminated,
                truncated: result.truncated,
            });

            if self.config.log_interval > 0 && step % self.config.log_interval == 0 {
                debug!(
                    "Episode {} step {}: action={}, reward={:.3}, {}",
                    episode, step, action, result.reward, result.observation
                );
            }

            observation = result.observation;
            if result.done() {
                end = if result.status.crashed {
                    EndReason::Crashed
                } else if result.status.out_of_bounds {
                    EndReason::OutOfBounds
                } else if result.status.landed {
                    EndReason::Landed
                } else {
                    EndReason::TimeLimit
                };
                break;
            }
        }

        let monitor = match &self.monitor {
            Some(monitor) => {
                let report = monitor.check(&trace)?;
                for result in report.violations() {
                    warn!(
                        "Episode {}: property '{}' {:?}",
                        episode, result.name, result.verdict
                    );
                }
                Some(report)
            }
            None => None,
        };

        let success = total_reward >= self.config.success_threshold;
        info!(
            "Episode {} (seed {}) finished after {} steps: {:?}, return {:.2}{}",
            episode,
            seed,
            trajectory.len(),
            end,
            total_reward,
            if success { ", success" } else { "" }
        );

        Ok(EpisodeOutcome {
            episode,
            seed,
            steps: trajectory.len(),
            total_reward,
            success,
            end,
            monitor,
            trajectory,
        })
    }

    /// Run every episode on the blocking pool, at most `parallelism` at once
    pub async fn run(&self) -> RunnerResult<RunSummary> {
        let started_at = Utc::now();
        info!(
            "Running {} episodes of '{}' from seed {}",
            self.config.episodes, self.config.controller, self.config.seed
        );

        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
        let mut handles = Vec::with_capacity(self.config.episodes);
        for episode in 0..self.config.episodes {
            let permit = semaphore.clone().acquire_owned().await?;
            let runner = self.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let outcome = runner.run_episode(episode);
                drop(permit);
                outcome
            }));
        }

        // every episode is awaited before the first error is returned
        let mut outcomes = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for (episode, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!("Episode {} failed: {}", episode, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        if let Some(path) = &self.config.record {
            write_trajectories(path, &outcomes)?;
            info!("Recorded trajectories to {}", path.display());
        }

        let summary = RunSummary::new(&self.config.controller, started_at, outcomes);
        info!(
            "Success rate: {:.2}% ({}/{})",
            summary.success_rate,
            summary.successes,
            summary.episodes.len()
        );
        Ok(summary)
    }
}

/// Write every step of `outcomes` as one JSON object per line
pub fn write_trajectories(path: &Path, outcomes: &[EpisodeOutcome]) -> RunnerResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for record in outcomes.iter().flat_map(|o| &o.trajectory) {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::{Controller, ControllerResult};
    use crate::lander::{LanderConfig, StepStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Command);

    impl Controller for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn control(&mut self, _observation: &Observation) -> ControllerResult<Command> {
            Ok(self.0)
        }
    }

    /// Fails on the episode started with `fail_seed`, counts every start
    struct FailsOnSeed {
        fail_seed: u64,
        seed: u64,
        started: Arc<AtomicUsize>,
    }

    impl Controller for FailsOnSeed {
        fn name(&self) -> &str {
            "fails-on-seed"
        }

        fn reset(&mut self, seed: u64) {
            self.seed = seed;
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn control(&mut self, _observation: &Observation) -> ControllerResult<Command> {
            if self.seed == self.fail_seed {
                return Err(ControllerError::InvalidOutput {
                    message: "broken episode".to_string(),
                });
            }
            Ok(Command::Act(Action::Noop))
        }
    }

    fn registry() -> Arc<ControllerRegistry> {
        let mut registry = ControllerRegistry::with_defaults();
        registry.register("idle", "never fires", || {
            Ok(Box::new(Fixed(Command::Act(Action::Noop))))
        });
        registry.register("quit", "terminates at once", || {
            Ok(Box::new(Fixed(Command::Terminate)))
        });
        Arc::new(registry)
    }

    fn config(controller: &str) -> HarnessConfig {
        HarnessConfig::new()
            .with_controller(controller)
            .with_episodes(3)
            .with_max_steps(600)
            .with_lander(LanderConfig::default().with_random_terrain(false))
    }

    #[test]
    fn test_trace_valuation_thresholds() {
        let observation = Observation {
            x: 0.2,
            y: 1.0,
            ..Default::default()
        };
        let step = StepResult {
            observation,
            reward: 0.0,
            terminated: false,
            truncated: false,
            status: StepStatus::default(),
        };

        let tight = trace_valuation(&observation, &Thresholds::TIGHT, Action::Noop, &step);
        let relaxed = trace_valuation(&observation, &Thresholds::RELAXED, Action::Noop, &step);
        assert_eq!(tight.get("p"), Some(&Value::Bool(false)));
        assert_eq!(relaxed.get("p"), Some(&Value::Bool(true)));
        assert_eq!(relaxed.get("action"), Some(&Value::Int(0)));
        assert_eq!(relaxed.get("crash"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_unknown_controller() {
        assert!(matches!(
            EpisodeRunner::new(config("missing"), registry()),
            Err(RunnerError::Controller(ControllerError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_invalid_property() {
        let config = config("idle").with_property("broken=G (q &&");
        assert!(matches!(
            EpisodeRunner::new(config, registry()),
            Err(RunnerError::Monitor(_))
        ));
    }

    #[test]
    fn test_terminate_ends_episode_without_stepping() {
        let runner = EpisodeRunner::new(config("quit"), registry()).unwrap();
        let outcome = runner.run_episode(0).unwrap();
        assert_eq!(outcome.steps, 0);
        assert_eq!(outcome.end, EndReason::ControllerTerminated);
        assert_eq!(outcome.total_reward, 0.0);
        assert!(!outcome.success);
    }

    #[test]
    fn test_free_fall_crashes() {
        let runner = EpisodeRunner::new(config("idle"), registry()).unwrap();
        let outcome = runner.run_episode(1).unwrap();
        assert_eq!(outcome.seed, 1);
        assert!(matches!(
            outcome.end,
            EndReason::Crashed | EndReason::OutOfBounds
        ));
        assert_eq!(outcome.trajectory.len(), outcome.steps);
        assert!(outcome.trajectory.last().unwrap().terminated);
        assert!(!outcome.success);
    }

    #[test]
    fn test_step_limit() {
        let runner =
            EpisodeRunner::new(config("idle").with_max_steps(5), registry()).unwrap();
        let outcome = runner.run_episode(0).unwrap();
        assert_eq!(outcome.steps, 5);
        assert_eq!(outcome.end, EndReason::StepLimit);
    }

    #[test]
    fn test_monitor_report_per_episode() {
        let config = config("idle")
            .with_property("no_crash=G !crash")
            .with_property("idle=G (action = 0)");
        let runner = EpisodeRunner::new(config, registry()).unwrap();
        let outcome = runner.run_episode(0).unwrap();
        let report = outcome.monitor.unwrap();
        assert_eq!(report.verdict("idle"), Some(synthesis::Verdict::Satisfied));
        if outcome.end == EndReason::Crashed {
            assert_eq!(
                report.verdict("no_crash"),
                Some(synthesis::Verdict::Violated {
                    at: outcome.steps - 1
                })
            );
        }
    }

    #[test]
    fn test_success_rate_rounding() {
        let outcome = |success| EpisodeOutcome {
            episode: 0,
            seed: 0,
            steps: 1,
            total_reward: if success { 250.0 } else { -50.0 },
            success,
            end: EndReason::StepLimit,
            monitor: None,
            trajectory: Vec::new(),
        };
        let summary = RunSummary::new(
            "idle",
            Utc::now(),
            vec![outcome(true), outcome(false), outcome(false)],
        );
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.success_rate, 33.33);
        assert_eq!(summary.mean_reward, 50.0);
    }

    #[tokio::test]
    async fn test_run_reports_in_seed_order() {
        let runner = EpisodeRunner::new(
            config("random").with_seed(10).with_episodes(6).with_parallelism(3),
            registry(),
        )
        .unwrap();
        let summary = runner.run().await.unwrap();
        let seeds: Vec<u64> = summary.episodes.iter().map(|e| e.seed).collect();
        assert_eq!(seeds, vec![10, 11, 12, 13, 14, 15]);
        assert_eq!(summary.controller, "random");
        assert!(summary.finished_at >= summary.started_at);
    }

    #[tokio::test]
    async fn test_runs_are_reproducible() {
        let runner = EpisodeRunner::new(config("random").with_seed(4), registry()).unwrap();
        let first = runner.run().await.unwrap();
        let second = runner.run().await.unwrap();
        assert_ne!(first.run_id, second.run_id);
        for (a, b) in first.episodes.iter().zip(&second.episodes) {
            assert_eq!(a.total_reward, b.total_reward);
            assert_eq!(a.trajectory, b.trajectory);
        }
    }

    #[tokio::test]
    async fn test_failed_episode_waits_for_the_rest() {
        let started = Arc::new(AtomicUsize::new(0));
        let mut registry = ControllerRegistry::new();
        let counter = started.clone();
        registry.register("fails-on-seed", "fails on seed 0", move || {
            Ok(Box::new(FailsOnSeed {
                fail_seed: 0,
                seed: 0,
                started: counter.clone(),
            }))
        });

        let config = config("fails-on-seed")
            .with_episodes(6)
            .with_parallelism(2)
            .with_max_steps(20);
        let runner = EpisodeRunner::new(config, Arc::new(registry)).unwrap();
        let result = runner.run().await;

        assert!(matches!(
            result,
            Err(RunnerError::Controller(ControllerError::InvalidOutput { .. }))
        ));
        assert_eq!(started.load(Ordering::SeqCst), 6);
    }
}
