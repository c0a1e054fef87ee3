use super::{LanderError, LanderResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete engine command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Action {
    Noop = 0,
    /// Left orientation engine: pushes the lander left and turns it
    /// counter-clockwise
    FireLeft = 1,
    FireMain = 2,
    /// Mirror image of [`Action::FireLeft`]
    FireRight = 3,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Noop,
        Action::FireLeft,
        Action::FireMain,
        Action::FireRight,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Action {
    type Error = LanderError;

    fn try_from(value: u8) -> LanderResult<Self> {
        match value {
            0 => Ok(Action::Noop),
            1 => Ok(Action::FireLeft),
            2 => Ok(Action::FireMain),
            3 => Ok(Action::FireRight),
            other => Err(LanderError::InvalidAction(i64::from(other))),
        }
    }
}

impl TryFrom<i64> for Action {
    type Error = LanderError;

    fn try_from(value: i64) -> LanderResult<Self> {
        u8::try_from(value)
            .map_err(|_| LanderError::InvalidAction(value))
            .and_then(Action::try_from)
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        action.index()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Normalized observation, in the layout
/// `[x, y, vx, vy, angle, angular_velocity, left_contact, right_contact]`.
///
/// `x` is 0 over the pad centre and ±1 at the viewport edges, `y` is 0
/// when the legs rest on the pad.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub angle: f64,
    pub angular_velocity: f64,
    pub left_contact: bool,
    pub right_contact: bool,
}

impl Observation {
    pub fn to_array(&self) -> [f64; 8] {
        [
            self.x,
            self.y,
            self.vx,
            self.vy,
            self.angle,
            self.angular_velocity,
            if self.left_contact { 1.0 } else { 0.0 },
            if self.right_contact { 1.0 } else { 0.0 },
        ]
    }

    pub fn from_array(values: [f64; 8]) -> Self {
        Self {
            x: values[0],
            y: values[1],
            vx: values[2],
            vy: values[3],
            angle: values[4],
            angular_velocity: values[5],
            left_contact: values[6] != 0.0,
            right_contact: values[7] != 0.0,
        }
    }

    pub fn both_legs_down(&self) -> bool {
        self.left_contact && self.right_contact
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x={:5.2}, y={:5.2}, vx={:5.2}, vy={:5.2}, ang={:5.2}, av={:5.2}, lleg={}, rleg={}",
            self.x,
            self.y,
            self.vx,
            self.vy,
            self.angle,
            self.angular_velocity,
            u8::from(self.left_contact),
            u8::from(self.right_contact)
        )
    }
}

/// Outcome flags of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepStatus {
    pub crashed: bool,
    pub out_of_bounds: bool,
    /// Came to rest on both legs
    pub landed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub status: StepStatus,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}
