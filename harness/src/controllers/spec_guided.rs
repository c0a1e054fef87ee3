use super::{Command, Controller, ControllerResult};
use crate::lander::{Action, Observation};
use std::f64::consts::PI;

/// Rule cascade derived from five temporal requirements:
///
/// ```text
/// G (altitude > 0)
/// G (|angle| < π/6)
/// G (|velocity| < v_max)
/// F (over_pad ∧ |velocity| < 0.5)
/// G (fuel > 0 → F over_pad)
/// ```
///
/// The most urgent violated requirement picks the action.
#[derive(Debug, Clone)]
pub struct SpecGuidedController {
    max_angle: f64,
    max_velocity: f64,
    safe_landing_velocity: f64,
    pad_radius: f64,
}

impl SpecGuidedController {
    pub const NAME: &'static str = "spec-guided";

    pub fn new() -> Self {
        Self {
            max_angle: PI / 6.0,
            max_velocity: 1.0,
            safe_landing_velocity: 0.5,
            pad_radius: 0.3,
        }
    }

    fn decide(&self, obs: &Observation) -> Action {
        if obs.both_legs_down() {
            return Action::Noop;
        }

        if obs.y < 0.1 && obs.vy < -self.safe_landing_velocity {
            return Action::FireMain;
        }

        if obs.angle.abs() > self.max_angle {
            return if obs.angle > 0.0 {
                Action::FireLeft
            } else {
                Action::FireRight
            };
        }

        if obs.vx.abs() > self.max_velocity || obs.vy.abs() > self.max_velocity {
            if obs.vx.abs() > obs.vy.abs() {
                return if obs.vx > 0.0 {
                    Action::FireLeft
                } else {
                    Action::FireRight
                };
            }
            if obs.vy < -self.max_velocity {
                return Action::FireMain;
            }
        }

        if obs.x.abs() < self.pad_radius {
            if obs.vy < -self.safe_landing_velocity {
                Action::FireMain
            } else {
                Action::Noop
            }
        } else if obs.x > 0.0 {
            Action::FireLeft
        } else {
            Action::FireRight
        }
    }
}

impl Default for SpecGuidedController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for SpecGuidedController {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn control(&mut self, obs: &Observation) -> ControllerResult<Command> {
        Ok(self.decide(obs).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(obs: Observation) -> Action {
        SpecGuidedController::new().decide(&obs)
    }

    #[test]
    fn test_landed_idles() {
        let obs = Observation {
            x: 0.8,
            vy: -3.0,
            left_contact: true,
            right_contact: true,
            ..Default::default()
        };
        assert_eq!(decide(obs), Action::Noop);
    }

    #[test]
    fn test_low_and_fast_brakes_first() {
        let obs = Observation {
            y: 0.05,
            vy: -0.7,
            angle: 1.0,
            ..Default::default()
        };
        assert_eq!(decide(obs), Action::FireMain);
    }

    #[test]
    fn test_angle_correction() {
        let obs = Observation {
            y: 1.0,
            angle: 0.6,
            ..Default::default()
        };
        assert_eq!(decide(obs), Action::FireLeft);
        assert_eq!(
            decide(Observation { angle: -0.6, ..obs }),
            Action::FireRight
        );
    }

    #[test]
    fn test_velocity_rules() {
        let obs = Observation {
            y: 1.0,
            vx: 1.5,
            vy: -0.5,
            ..Default::default()
        };
        assert_eq!(decide(obs), Action::FireLeft);
        assert_eq!(decide(Observation { vx: -1.5, ..obs }), Action::FireRight);
        assert_eq!(
            decide(Observation { vx: 0.2, vy: -1.5, ..obs }),
            Action::FireMain
        );
        // fast climb falls through to the pad rules
        assert_eq!(
            decide(Observation { vx: 0.2, vy: 1.5, ..obs }),
            Action::Noop
        );
    }

    #[test]
    fn test_pad_approach() {
        let obs = Observation {
            y: 1.0,
            x: 0.5,
            ..Default::default()
        };
        assert_eq!(decide(obs), Action::FireLeft);
        assert_eq!(decide(Observation { x: -0.5, ..obs }), Action::FireRight);
        assert_eq!(
            decide(Observation { x: 0.1, vy: -0.6, ..obs }),
            Action::FireMain
        );
    }
}
