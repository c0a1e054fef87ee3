//! Controller driven by a GR(1)-synthesized transducer.
//!
//! Observations are abstracted into the boolean inputs of the bundled
//! `lander_actions` specification and the transducer's `action` output is
//! applied directly. The inputs carry the side of the pad and the
//! direction of tilt, which the symmetric `p`/`q` propositions lose; the
//! landing goal over those propositions (`tulip_lander.toml`) is only
//! realizable once the environment is assumed to land by itself.

use super::{Command, Controller, ControllerError, ControllerResult};
use crate::lander::{Action, Observation};
use std::sync::Arc;
use synthesis::{GrSpec, SynthesisError, Transducer, TransducerRunner, Valuation, Value};
use tracing::{debug, warn};

const BUNDLED_SPEC: &str = include_str!("../../../specs/lander_actions.toml");

pub const INPUTS: [&str; 6] = [
    "over_left",
    "over_right",
    "tilt_ccw",
    "tilt_cw",
    "falling_fast",
    "touchdown",
];

/// Synthesize the transducer for the bundled thruster specification
pub fn bundled_transducer() -> ControllerResult<Transducer> {
    let spec = GrSpec::from_toml_str(BUNDLED_SPEC)?;
    let transducer = synthesis::synthesize(&spec)?;
    debug!(
        "Synthesized {} with {} states",
        transducer.name(),
        transducer.len()
    );
    Ok(transducer)
}

/// Tolerances of the observation abstraction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Abstraction {
    pub pad_half_width: f64,
    pub tilt: f64,
    /// Seconds of angular velocity added to the angle when judging tilt
    pub tilt_lookahead: f64,
    pub descent_limit: f64,
    pub near_ground_descent_limit: f64,
    pub near_ground: f64,
}

impl Default for Abstraction {
    fn default() -> Self {
        Self {
            pad_half_width: 0.2,
            tilt: 0.1,
            tilt_lookahead: 0.5,
            descent_limit: 0.3,
            near_ground_descent_limit: 0.1,
            near_ground: 0.3,
        }
    }
}

impl Abstraction {
    pub fn inputs(&self, obs: &Observation) -> Valuation {
        let tilt = obs.angle + self.tilt_lookahead * obs.angular_velocity;
        let limit = if obs.y < self.near_ground {
            self.near_ground_descent_limit
        } else {
            self.descent_limit
        };
        let values = [
            obs.x < -self.pad_half_width,
            obs.x > self.pad_half_width,
            tilt > self.tilt,
            tilt < -self.tilt,
            obs.vy < -limit,
            obs.both_legs_down(),
        ];
        INPUTS
            .iter()
            .zip(values)
            .map(|(name, value)| (name.to_string(), Value::Bool(value)))
            .collect()
    }
}

pub struct SynthesizedController {
    runner: TransducerRunner,
    abstraction: Abstraction,
}

impl SynthesizedController {
    pub const NAME: &'static str = "synthesized";

    pub fn new(transducer: Arc<Transducer>) -> ControllerResult<Self> {
        for name in INPUTS {
            if !transducer.env_vars().contains(name) {
                return Err(ControllerError::InvalidOutput {
                    message: format!("transducer has no input '{}'", name),
                });
            }
        }
        if !transducer.sys_vars().contains("action") {
            return Err(ControllerError::InvalidOutput {
                message: "transducer has no 'action' output".to_string(),
            });
        }
        Ok(Self {
            runner: TransducerRunner::new(transducer),
            abstraction: Abstraction::default(),
        })
    }

    pub fn with_abstraction(mut self, abstraction: Abstraction) -> Self {
        self.abstraction = abstraction;
        self
    }

    fn react(&mut self, inputs: &Valuation) -> ControllerResult<Option<Valuation>> {
        match self.runner.react(inputs) {
            Ok(outputs) => Ok(Some(outputs)),
            Err(SynthesisError::AssumptionViolated { reason }) => {
                warn!("Observation outside the synthesized assumptions: {}", reason);
                self.runner.reset();
                match self.runner.react(inputs) {
                    Ok(outputs) => Ok(Some(outputs)),
                    Err(SynthesisError::AssumptionViolated { .. }) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Controller for SynthesizedController {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reset(&mut self, _seed: u64) {
        self.runner.reset();
    }

    fn control(&mut self, obs: &Observation) -> ControllerResult<Command> {
        let inputs = self.abstraction.inputs(obs);
        let Some(outputs) = self.react(&inputs)? else {
            return Ok(Action::Noop.into());
        };

        let raw = outputs
            .get("action")
            .and_then(Value::as_int)
            .ok_or_else(|| ControllerError::InvalidOutput {
                message: "missing integer 'action'".to_string(),
            })?;
        let action = Action::try_from(raw).map_err(|_| ControllerError::InvalidOutput {
            message: format!("action {} out of range", raw),
        })?;
        Ok(action.into())
    }
}
