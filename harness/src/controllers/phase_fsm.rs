//! Flight-phase state machines over the lander propositions.
//!
//! All variants classify the observation into a [`Phase`] and pick an
//! action per phase. The later variants put speed overrides in front of
//! the phase table.

use super::propositions::{Phase, Propositions, Thresholds};
use super::{Command, Controller, ControllerResult};
use crate::lander::{Action, Observation};
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseFsmVariant {
    /// Plain phase table, ends the episode on touchdown
    Basic,
    /// Brakes any fast descent before consulting the phase table
    VerticalOverride,
    /// Brakes fast descent, then damps rotation, with relaxed tolerances
    RateOverrides,
}

impl PhaseFsmVariant {
    pub const ALL: [PhaseFsmVariant; 3] = [
        PhaseFsmVariant::Basic,
        PhaseFsmVariant::VerticalOverride,
        PhaseFsmVariant::RateOverrides,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PhaseFsmVariant::Basic => "phase-fsm",
            PhaseFsmVariant::VerticalOverride => "phase-fsm-v2",
            PhaseFsmVariant::RateOverrides => "phase-fsm-v3",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            PhaseFsmVariant::Basic => "Cruise/Approach/Align/Touchdown phase machine",
            PhaseFsmVariant::VerticalOverride => "Phase machine with a vertical speed override",
            PhaseFsmVariant::RateOverrides => {
                "Phase machine with vertical speed and angular rate overrides"
            }
        }
    }

    pub fn thresholds(self) -> Thresholds {
        match self {
            PhaseFsmVariant::Basic | PhaseFsmVariant::VerticalOverride => Thresholds::TIGHT,
            PhaseFsmVariant::RateOverrides => Thresholds::RELAXED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseFsmController {
    variant: PhaseFsmVariant,
    thresholds: Thresholds,
    phase: Option<Phase>,
}

impl PhaseFsmController {
    pub fn new(variant: PhaseFsmVariant) -> Self {
        Self {
            variant,
            thresholds: variant.thresholds(),
            phase: None,
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Phase of the last observation
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    fn overrides(&self, obs: &Observation) -> Option<Action> {
        let t = &self.thresholds;
        match self.variant {
            PhaseFsmVariant::Basic => None,
            PhaseFsmVariant::VerticalOverride => (obs.vy < -t.vy).then_some(Action::FireMain),
            PhaseFsmVariant::RateOverrides => {
                if obs.vy < -t.vy {
                    Some(Action::FireMain)
                } else if obs.angular_velocity > t.angular_velocity {
                    Some(Action::FireRight)
                } else if obs.angular_velocity < -t.angular_velocity {
                    Some(Action::FireLeft)
                } else {
                    None
                }
            }
        }
    }

    fn phase_action(&self, phase: Phase, obs: &Observation) -> Command {
        let t = &self.thresholds;
        let action = match phase {
            Phase::Cruise => {
                if obs.x > t.x {
                    Action::FireLeft
                } else if obs.x < -t.x {
                    Action::FireRight
                } else {
                    Action::Noop
                }
            }
            Phase::Approach => {
                if obs.angle > t.angle {
                    Action::FireLeft
                } else if obs.angle < -t.angle {
                    Action::FireRight
                } else if self.variant == PhaseFsmVariant::Basic && obs.vy < -t.vy {
                    Action::FireMain
                } else {
                    Action::Noop
                }
            }
            Phase::Align => {
                if obs.vy < -t.vy {
                    Action::FireMain
                } else {
                    Action::Noop
                }
            }
            Phase::Touchdown => {
                if self.variant == PhaseFsmVariant::Basic {
                    return Command::Terminate;
                }
                Action::Noop
            }
        };
        Command::Act(action)
    }
}

impl Controller for PhaseFsmController {
    fn name(&self) -> &str {
        self.variant.name()
    }

    fn reset(&mut self, _seed: u64) {
        self.phase = None;
    }

    fn control(&mut self, obs: &Observation) -> ControllerResult<Command> {
        let props = Propositions::evaluate(obs, &self.thresholds);
        let phase = Phase::classify(&props);
        if self.phase != Some(phase) {
            trace!("{}: entering phase {}", self.variant.name(), phase);
        }
        self.phase = Some(phase);

        if let Some(action) = self.overrides(obs) {
            return Ok(action.into());
        }
        Ok(self.phase_action(phase, obs))
    }
}
