//! Boolean abstractions of a lander observation.

use crate::lander::Observation;
use serde::{Deserialize, Serialize};
use std::fmt;
use synthesis::{Valuation, Value};

/// Tolerances that turn an observation into propositions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// `p`: |x| within this distance of the pad centre
    pub x: f64,
    /// `q`: |angle| below this
    pub angle: f64,
    /// `r`: |vx| below this
    pub vx: f64,
    /// `r`: |vy| below this
    pub vy: f64,
    /// `a`: |angular velocity| below this
    pub angular_velocity: f64,
    /// `near_ground`: y below this
    pub y: f64,
}

impl Thresholds {
    pub const TIGHT: Thresholds = Thresholds {
        x: 0.1,
        angle: 0.1,
        vx: 0.1,
        vy: 0.1,
        angular_velocity: 0.1,
        y: 0.2,
    };

    pub const RELAXED: Thresholds = Thresholds {
        x: 0.3,
        angle: 0.1,
        vx: 0.1,
        vy: 1.0,
        angular_velocity: 0.1,
        y: 0.3,
    };
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::TIGHT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Propositions {
    /// Over the pad
    pub p: bool,
    /// Upright
    pub q: bool,
    /// Slow
    pub r: bool,
    /// Angular rate bounded
    pub a: bool,
    /// Both legs down
    pub s: bool,
    pub near_ground: bool,
}

impl Propositions {
    pub const NAMES: [&'static str; 6] = ["p", "q", "r", "a", "s", "near_ground"];

    pub fn evaluate(obs: &Observation, t: &Thresholds) -> Self {
        Self {
            p: obs.x.abs() <= t.x,
            q: obs.angle.abs() <= t.angle,
            r: obs.vx.abs() <= t.vx && obs.vy.abs() <= t.vy,
            a: obs.angular_velocity.abs() <= t.angular_velocity,
            s: obs.both_legs_down(),
            near_ground: obs.y <= t.y,
        }
    }

    /// Low, over the pad, upright and slow
    pub fn stable(&self) -> bool {
        self.near_ground && self.p && self.q && self.r
    }

    pub fn to_valuation(&self) -> Valuation {
        [
            ("p", self.p),
            ("q", self.q),
            ("r", self.r),
            ("a", self.a),
            ("s", self.s),
            ("near_ground", self.near_ground),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), Value::Bool(value)))
        .collect()
    }
}

/// Discrete flight phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Not near the ground
    Cruise,
    /// Near the ground but not yet aligned over the pad
    Approach,
    /// Near the ground, over the pad, upright and slow
    Align,
    /// Both legs down
    Touchdown,
}

impl Phase {
    pub fn classify(props: &Propositions) -> Self {
        if props.s {
            Phase::Touchdown
        } else if props.near_ground {
            if props.p && props.q && props.r {
                Phase::Align
            } else {
                Phase::Approach
            }
        } else {
            Phase::Cruise
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Cruise => "Cruise",
            Phase::Approach => "Approach",
            Phase::Align => "Align",
            Phase::Touchdown => "Touchdown",
        };
        write!(f, "{}", name)
    }
}
