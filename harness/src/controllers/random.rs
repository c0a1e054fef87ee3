use super::{Command, Controller, ControllerResult};
use crate::lander::{Action, Observation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniformly random actions, reproducible per episode seed
#[derive(Debug, Clone)]
pub struct RandomController {
    rng: StdRng,
}

impl RandomController {
    pub const NAME: &'static str = "random";

    pub fn new() -> Self {
        Self {
            rng: StdRng::seed_from_u64(0),
        }
    }
}

impl Default for RandomController {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for RandomController {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reset(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn control(&mut self, _obs: &Observation) -> ControllerResult<Command> {
        let action = Action::ALL[self.rng.gen_range(0..Action::ALL.len())];
        Ok(action.into())
    }
}
