pub mod config;
pub mod controllers;
pub mod lander;
pub mod runner;

pub use config::{ConfigError, ConfigResult, HarnessConfig};
pub use controllers::{
    Command, Controller, ControllerError, ControllerRegistry, ControllerResult,
    DescentGuardController, Phase, PhaseFsmController, PhaseFsmVariant, PropertyFlagsController,
    Propositions, RandomController, SafetyEnvelopeController, SpecGuidedController,
    SynthesizedController, Thresholds,
};
pub use lander::{
    Action, LanderConfig, LanderError, LanderResult, LunarLander, Observation, StepResult,
    StepStatus, Terrain,
};
pub use runner::{
    trace_valuation, write_trajectories, EndReason, EpisodeOutcome, EpisodeRunner, RunSummary,
    RunnerError, RunnerResult, StepRecord,
};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::controllers::{Command, Controller, ControllerRegistry, Thresholds};
    pub use crate::lander::{Action, LanderConfig, LunarLander, Observation, StepResult};
    pub use crate::runner::*;
}
