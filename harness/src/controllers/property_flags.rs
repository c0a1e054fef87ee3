use super::{Command, Controller, ControllerResult};
use crate::lander::{Action, Observation};
use serde::{Deserialize, Serialize};

/// Property flags re-evaluated on every observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFlags {
    pub always_safe_altitude: bool,
    pub never_crash: bool,
    pub avoid_large_velocity: bool,
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self {
            always_safe_altitude: true,
            never_crash: true,
            avoid_large_velocity: true,
        }
    }
}

/// Coarse controller driven by three property flags.
///
/// The gentle-landing rule reads the horizontal velocity slot, as the
/// rule was written.
#[derive(Debug, Clone, Default)]
pub struct PropertyFlagsController {
    flags: PropertyFlags,
}

impl PropertyFlagsController {
    pub const NAME: &'static str = "property-flags";

    const SAFE_ALTITUDE: f64 = 10.0;
    const LARGE_VELOCITY: f64 = 5.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    fn update_flags(&mut self, obs: &Observation) {
        self.flags = PropertyFlags {
            always_safe_altitude: obs.y > -Self::SAFE_ALTITUDE,
            never_crash: obs.y >= -0.8,
            avoid_large_velocity: obs.vx.abs() < Self::LARGE_VELOCITY,
        };
    }
}

impl Controller for PropertyFlagsController {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reset(&mut self, _seed: u64) {
        self.flags = PropertyFlags::default();
    }

    fn control(&mut self, obs: &Observation) -> ControllerResult<Command> {
        self.update_flags(obs);
        let flags = self.flags;

        let action = if !flags.always_safe_altitude {
            Action::FireRight
        } else if !flags.never_crash || !flags.avoid_large_velocity {
            Action::Noop
        } else if obs.vx > -0.5 {
            Action::Noop
        } else {
            Action::FireRight
        };
        Ok(action.into())
    }
}
