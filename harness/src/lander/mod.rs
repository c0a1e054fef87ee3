//! Lunar Lander simulation.
//!
//! A simplified rigid-body version of the classic control task. It keeps
//! the viewport geometry, the normalized 8-value observation, the four
//! discrete actions, the shaped reward and the termination rules, but
//! replaces the physics engine with explicit integration and a small
//! contact model for the two legs.

mod observation;
mod terrain;

pub use observation::{Action, Observation, StepResult, StepStatus};
pub use terrain::{Terrain, CHUNKS};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const FPS: f64 = 50.0;
pub const SCALE: f64 = 30.0;
pub const VIEWPORT_W: f64 = 600.0;
pub const VIEWPORT_H: f64 = 400.0;
pub const W: f64 = VIEWPORT_W / SCALE;
pub const H: f64 = VIEWPORT_H / SCALE;
pub const LEG_AWAY: f64 = 20.0 / SCALE;
pub const LEG_DOWN: f64 = 18.0 / SCALE;
/// Lower hull corners in the body frame
const HULL_BOTTOM: [(f64, f64); 2] = [(-17.0 / SCALE, -10.0 / SCALE), (17.0 / SCALE, -10.0 / SCALE)];
/// Feet in the body frame
const FEET: [(f64, f64); 2] = [(-LEG_AWAY, -LEG_DOWN), (LEG_AWAY, -LEG_DOWN)];

const CONTACT_TOLERANCE: f64 = 0.02;
const GROUND_FRICTION: f64 = 0.1;
const LEVELING_RATE: f64 = 0.2;
const REST_SPEED: f64 = 0.05;
const REST_ANGULAR_SPEED: f64 = 0.05;

#[derive(Error, Debug)]
pub enum LanderError {
    #[error("Episode is over, call reset first")]
    EpisodeOver,

    #[error("Invalid action: {0}")]
    InvalidAction(i64),

    #[error("Invalid lander configuration: {0}")]
    InvalidConfig(String),
}

pub type LanderResult<T> = Result<T, LanderError>;

/// Physical parameters of the simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanderConfig {
    pub gravity: f64,
    /// Acceleration of the main engine along the hull axis
    pub main_engine_accel: f64,
    /// Lateral acceleration of an orientation engine
    pub side_engine_accel: f64,
    /// Angular acceleration of an orientation engine
    pub side_engine_angular_accel: f64,
    /// Angular acceleration while tipping over a single leg
    pub tipping_angular_accel: f64,
    /// Relative spread of engine thrust
    pub dispersion: f64,
    /// Bound on each component of the random initial velocity
    pub initial_speed: f64,
    /// Leg impact speed that breaks the lander
    pub crash_speed: f64,
    /// Consecutive steps at rest on both legs that end the episode
    pub rest_steps: usize,
    pub time_limit: usize,
    /// Generate random terrain; flat ground at the helipad height otherwise
    pub random_terrain: bool,
}

impl Default for LanderConfig {
    fn default() -> Self {
        Self {
            gravity: -10.0,
            main_engine_accel: 15.0,
            side_engine_accel: 2.0,
            side_engine_angular_accel: 4.0,
            tipping_angular_accel: 3.0,
            dispersion: 0.05,
            initial_speed: 2.0,
            crash_speed: 4.0,
            rest_steps: 25,
            time_limit: 1000,
            random_terrain: true,
        }
    }
}

impl LanderConfig {
    pub fn with_gravity(mut self, gravity: f64) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_initial_speed(mut self, initial_speed: f64) -> Self {
        self.initial_speed = initial_speed;
        self
    }

    pub fn with_dispersion(mut self, dispersion: f64) -> Self {
        self.dispersion = dispersion;
        self
    }

    pub fn with_time_limit(mut self, time_limit: usize) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_random_terrain(mut self, random_terrain: bool) -> Self {
        self.random_terrain = random_terrain;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(-12.0..0.0).contains(&self.gravity) {
            return Err("Gravity must be in [-12, 0)".to_string());
        }
        if self.main_engine_accel <= 0.0 {
            return Err("Main engine acceleration must be positive".to_string());
        }
        if self.side_engine_accel < 0.0 || self.side_engine_angular_accel < 0.0 {
            return Err("Side engine accelerations cannot be negative".to_string());
        }
        if !(0.0..1.0).contains(&self.dispersion) {
            return Err("Dispersion must be in [0, 1)".to_string());
        }
        if self.initial_speed < 0.0 {
            return Err("Initial speed cannot be negative".to_string());
        }
        if self.crash_speed <= 0.0 {
            return Err("Crash speed must be positive".to_string());
        }
        if self.rest_steps == 0 {
            return Err("Rest steps must be greater than 0".to_string());
        }
        if self.time_limit == 0 {
            return Err("Time limit must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Rigid-body state in world units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Body {
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    angle: f64,
    angular_velocity: f64,
}

impl Body {
    fn to_world(&self, (bx, by): (f64, f64)) -> (f64, f64) {
        let (sin, cos) = self.angle.sin_cos();
        (self.x + bx * cos - by * sin, self.y + bx * sin + by * cos)
    }

    /// Vertical velocity of a body-frame point
    fn point_vy(&self, (bx, by): (f64, f64)) -> f64 {
        let (sin, cos) = self.angle.sin_cos();
        self.vy + self.angular_velocity * (bx * cos - by * sin)
    }
}

pub struct LunarLander {
    config: LanderConfig,
    rng: StdRng,
    terrain: Terrain,
    body: Body,
    contacts: [bool; 2],
    prev_shaping: f64,
    steps: usize,
    rest_counter: usize,
    done: bool,
}

impl LunarLander {
    pub fn new(config: LanderConfig) -> LanderResult<Self> {
        config.validate().map_err(LanderError::InvalidConfig)?;
        Ok(Self {
            terrain: Terrain::flat(W, H / 4.0),
            rng: StdRng::seed_from_u64(0),
            config,
            body: Body::default(),
            contacts: [false; 2],
            prev_shaping: 0.0,
            steps: 0,
            rest_counter: 0,
            done: true,
        })
    }

    pub fn config(&self) -> &LanderConfig {
        &self.config
    }

    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Start a new episode; the same seed yields the same episode
    pub fn reset(&mut self, seed: u64) -> Observation {
        self.rng = StdRng::seed_from_u64(seed);
        let helipad_y = H / 4.0;
        self.terrain = if self.config.random_terrain {
            Terrain::generate(&mut self.rng, W, H, helipad_y)
        } else {
            Terrain::flat(W, helipad_y)
        };

        let speed = self.config.initial_speed;
        let (vx, vy) = if speed > 0.0 {
            (
                self.rng.gen_range(-speed..=speed),
                self.rng.gen_range(-speed..=speed),
            )
        } else {
            (0.0, 0.0)
        };
        self.body = Body {
            x: W / 2.0,
            y: H,
            vx,
            vy,
            angle: 0.0,
            angular_velocity: 0.0,
        };
        self.contacts = [false; 2];
        self.steps = 0;
        self.rest_counter = 0;
        self.done = false;

        let observation = self.observe();
        self.prev_shaping = shaping(&observation);
        debug!("Reset lander with seed {}: {}", seed, observation);
        observation
    }

    /// Advance the simulation by one frame
    pub fn step(&mut self, action: Action) -> LanderResult<StepResult> {
        if self.done {
            return Err(LanderError::EpisodeOver);
        }
        self.steps += 1;

        let dt = 1.0 / FPS;
        let (sin, cos) = self.body.angle.sin_cos();
        let up = (-sin, cos);
        let right = (cos, sin);
        let spread = self.config.dispersion;

        let mut ax = 0.0;
        let mut ay = self.config.gravity;
        let mut alpha = 0.0;
        let mut main_power = 0.0;
        let mut side_power = 0.0;

        match action {
            Action::Noop => {}
            Action::FireMain => {
                let thrust = self.config.main_engine_accel
                    * (1.0 + spread * self.rng.gen_range(-1.0..=1.0));
                ax += up.0 * thrust;
                ay += up.1 * thrust;
                alpha += spread * self.config.side_engine_angular_accel
                    * self.rng.gen_range(-1.0..=1.0);
                main_power = 1.0;
            }
            Action::FireLeft | Action::FireRight => {
                let direction = if action == Action::FireLeft { -1.0 } else { 1.0 };
                let thrust = self.config.side_engine_accel
                    * (1.0 + spread * self.rng.gen_range(-1.0..=1.0));
                ax += direction * right.0 * thrust;
                ay += direction * right.1 * thrust;
                alpha -= direction * self.config.side_engine_angular_accel;
                side_power = 1.0;
            }
        }

        let body = &mut self.body;
        body.vx += ax * dt;
        body.vy += ay * dt;
        body.angular_velocity += alpha * dt;
        body.x += body.vx * dt;
        body.y += body.vy * dt;
        body.angle += body.angular_velocity * dt;

        let crashed = self.resolve_contacts(dt);

        let observation = self.observe();
        let shape = shaping(&observation);
        let mut reward = shape - self.prev_shaping;
        self.prev_shaping = shape;
        reward -= main_power * 0.30;
        reward -= side_power * 0.03;

        let out_of_bounds = observation.x.abs() >= 1.0;
        let mut status = StepStatus {
            crashed,
            out_of_bounds,
            landed: false,
        };
        let mut terminated = false;
        if crashed || out_of_bounds {
            terminated = true;
            reward = -100.0;
        } else if self.at_rest() {
            self.rest_counter += 1;
            if self.rest_counter >= self.config.rest_steps {
                terminated = true;
                status.landed = true;
                reward = 100.0;
            }
        } else {
            self.rest_counter = 0;
        }
        let truncated = !terminated && self.steps >= self.config.time_limit;
        self.done = terminated || truncated;

        Ok(StepResult {
            observation,
            reward,
            terminated,
            truncated,
            status,
        })
    }

    /// Push the feet out of the ground and apply the leg contact model.
    /// Returns whether the lander crashed.
    fn resolve_contacts(&mut self, dt: f64) -> bool {
        let mut crashed = false;
        let mut lift: f64 = 0.0;
        for foot in FEET {
            let (fx, fy) = self.body.to_world(foot);
            let depth = self.terrain.height_at(fx) - fy;
            if depth > 0.0 {
                if -self.body.point_vy(foot) > self.config.crash_speed {
                    crashed = true;
                }
                lift = lift.max(depth);
            }
        }

        if lift > 0.0 {
            self.body.y += lift;
            if self.body.vy < 0.0 {
                self.body.vy = 0.0;
            }
            self.body.vx *= 1.0 - GROUND_FRICTION;
        }

        self.contacts = self.feet_touching();
        match self.contacts {
            [true, true] => {
                let (lx, _) = self.body.to_world(FEET[0]);
                let (rx, _) = self.body.to_world(FEET[1]);
                let slope = (self.terrain.height_at(rx) - self.terrain.height_at(lx)).atan2(rx - lx);
                self.body.angle += (slope - self.body.angle) * LEVELING_RATE;
                self.body.angular_velocity = 0.0;
                self.settle();
            }
            // pivot on the grounded leg, the free side falls
            [true, false] => {
                self.body.angular_velocity -= self.config.tipping_angular_accel * dt;
            }
            [false, true] => {
                self.body.angular_velocity += self.config.tipping_angular_accel * dt;
            }
            [false, false] => {}
        }

        for corner in HULL_BOTTOM {
            let (cx, cy) = self.body.to_world(corner);
            if cy < self.terrain.height_at(cx) {
                crashed = true;
            }
        }
        crashed
    }

    /// Lift the body so that no foot stays below the ground
    fn settle(&mut self) {
        let lift = FEET
            .iter()
            .map(|&foot| {
                let (fx, fy) = self.body.to_world(foot);
                self.terrain.height_at(fx) - fy
            })
            .fold(0.0f64, f64::max);
        self.body.y += lift;
    }

    fn feet_touching(&self) -> [bool; 2] {
        FEET.map(|foot| {
            let (fx, fy) = self.body.to_world(foot);
            fy - self.terrain.height_at(fx) <= CONTACT_TOLERANCE
        })
    }

    fn at_rest(&self) -> bool {
        self.contacts == [true, true]
            && self.body.vx.abs() < REST_SPEED
            && self.body.vy.abs() < REST_SPEED
            && self.body.angular_velocity.abs() < REST_ANGULAR_SPEED
    }

    fn observe(&self) -> Observation {
        let b = &self.body;
        Observation {
            x: (b.x - W / 2.0) / (W / 2.0),
            y: (b.y - (self.terrain.helipad_y() + LEG_DOWN)) / (H / 2.0),
            vx: b.vx * (W / 2.0) / FPS,
            vy: b.vy * (H / 2.0) / FPS,
            angle: b.angle,
            angular_velocity: 20.0 * b.angular_velocity / FPS,
            left_contact: self.contacts[0],
            right_contact: self.contacts[1],
        }
    }
}

/// Potential used for reward shaping
pub fn shaping(obs: &Observation) -> f64 {
    -100.0 * (obs.x * obs.x + obs.y * obs.y).sqrt()
        - 100.0 * (obs.vx * obs.vx + obs.vy * obs.vy).sqrt()
        - 100.0 * obs.angle.abs()
        + 10.0 * f64::from(u8::from(obs.left_contact))
        + 10.0 * f64::from(u8::from(obs.right_contact))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still_lander() -> LunarLander {
        let config = LanderConfig::default()
            .with_initial_speed(0.0)
            .with_dispersion(0.0)
            .with_random_terrain(false);
        let mut lander = LunarLander::new(config).unwrap();
        lander.reset(0);
        lander
    }

    fn run(lander: &mut LunarLander, action: Action, steps: usize) -> StepResult {
        let mut last = None;
        for _ in 0..steps {
            last = Some(lander.step(action).unwrap());
        }
        last.unwrap()
    }

    #[test]
    fn test_reset_observation() {
        let lander = still_lander();
        let obs = lander.observe();
        assert_eq!(obs.x, 0.0);
        assert!((obs.y - (H - H / 4.0 - LEG_DOWN) / (H / 2.0)).abs() < 1e-12);
        assert_eq!(obs.vx, 0.0);
        assert!(!obs.left_contact && !obs.right_contact);
    }

    #[test]
    fn test_gravity_accelerates_descent() {
        let mut lander = still_lander();
        let first = lander.step(Action::Noop).unwrap().observation;
        let later = run(&mut lander, Action::Noop, 10).observation;
        assert!(first.vy < 0.0);
        assert!(later.vy < first.vy);
        assert!(later.y < first.y);
    }

    #[test]
    fn test_main_engine_reduces_descent() {
        let mut idle = still_lander();
        let mut burning = still_lander();
        let idle_obs = run(&mut idle, Action::Noop, 20).observation;
        let burn_obs = run(&mut burning, Action::FireMain, 20).observation;
        assert!(burn_obs.vy > idle_obs.vy);
        // 15 m/s² of thrust beats 10 m/s² of gravity
        assert!(burn_obs.vy > 0.0);
    }

    #[test]
    fn test_orientation_engines() {
        let mut left = still_lander();
        let obs = run(&mut left, Action::FireLeft, 5).observation;
        assert!(obs.angular_velocity > 0.0);
        assert!(obs.angle > 0.0);
        assert!(obs.vx < 0.0);

        let mut right = still_lander();
        let obs = run(&mut right, Action::FireRight, 5).observation;
        assert!(obs.angular_velocity < 0.0);
        assert!(obs.vx > 0.0);
    }

    #[test]
    fn test_fuel_cost() {
        let mut lander = still_lander();
        let start = shaping(&lander.observe());
        let result = lander.step(Action::FireMain).unwrap();
        let expected = shaping(&result.observation) - start - 0.30;
        assert!((result.reward - expected).abs() < 1e-9);

        let mut lander = still_lander();
        let start = shaping(&lander.observe());
        let result = lander.step(Action::FireRight).unwrap();
        let expected = shaping(&result.observation) - start - 0.03;
        assert!((result.reward - expected).abs() < 1e-9);
    }

    #[test]
    fn test_leaving_the_viewport_terminates() {
        let mut lander = still_lander();
        lander.body.x = W - 0.01;
        lander.body.vx = 5.0;
        let result = lander.step(Action::Noop).unwrap();
        assert!(result.terminated);
        assert!(result.status.out_of_bounds);
        assert_eq!(result.reward, -100.0);
        assert!(matches!(
            lander.step(Action::Noop),
            Err(LanderError::EpisodeOver)
        ));
    }

    #[test]
    fn test_free_fall_crashes() {
        let mut lander = still_lander();
        let mut result = lander.step(Action::Noop).unwrap();
        while !result.done() {
            result = lander.step(Action::Noop).unwrap();
        }
        assert!(result.terminated);
        assert!(result.status.crashed);
        assert_eq!(result.reward, -100.0);
    }

    #[test]
    fn test_gentle_touchdown_comes_to_rest() {
        let mut lander = still_lander();
        // just above the pad, barely moving
        lander.body.y = H / 4.0 + LEG_DOWN + 0.05;
        lander.body.vy = -0.5;
        let mut total = 0.0;
        let mut result = lander.step(Action::Noop).unwrap();
        total += result.reward;
        while !result.done() {
            result = lander.step(Action::Noop).unwrap();
            total += result.reward;
        }
        assert!(result.terminated);
        assert!(result.status.landed);
        assert!(!result.status.crashed);
        assert_eq!(result.reward, 100.0);
        assert!(result.observation.both_legs_down());
        assert!(result.observation.y.abs() < 0.01);
        assert!(total > 100.0);
    }

    #[test]
    fn test_single_leg_contact_tips_the_lander() {
        let mut lander = still_lander();
        // tilted clockwise, so the right foot lands first
        lander.body.y = H / 4.0 + LEG_DOWN + 0.2;
        lander.body.angle = -0.3;
        lander.body.vy = -1.0;
        let mut first_single_contact = None;
        for _ in 0..30 {
            let result = lander.step(Action::Noop).unwrap();
            let obs = result.observation;
            if obs.right_contact && !obs.left_contact {
                first_single_contact = Some(lander.body.angular_velocity);
                break;
            }
            assert!(!result.done());
        }
        let angular_velocity = first_single_contact.expect("right leg never touched alone");
        assert!(angular_velocity > 0.0);
    }

    #[test]
    fn test_seeds_are_reproducible() {
        let config = LanderConfig::default();
        let mut a = LunarLander::new(config.clone()).unwrap();
        let mut b = LunarLander::new(config).unwrap();
        assert_eq!(a.reset(42), b.reset(42));
        for action in [Action::FireMain, Action::FireLeft, Action::Noop, Action::FireRight] {
            assert_eq!(a.step(action).unwrap(), b.step(action).unwrap());
        }
        assert_eq!(a.terrain(), b.terrain());

        let mut c = LunarLander::new(LanderConfig::default()).unwrap();
        assert_ne!(c.reset(43), a.reset(42));
    }

    #[test]
    fn test_truncation() {
        let config = LanderConfig::default()
            .with_initial_speed(0.0)
            .with_time_limit(5);
        let mut lander = LunarLander::new(config).unwrap();
        lander.reset(1);
        let result = run(&mut lander, Action::Noop, 5);
        assert!(result.truncated);
        assert!(!result.terminated);
        assert!(lander.is_done());
    }

    #[test]
    fn test_step_before_reset() {
        let mut lander = LunarLander::new(LanderConfig::default()).unwrap();
        assert!(matches!(
            lander.step(Action::Noop),
            Err(LanderError::EpisodeOver)
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(LanderConfig::default().validate().is_ok());
        assert!(LanderConfig::default().with_gravity(1.0).validate().is_err());
        assert!(LanderConfig::default().with_time_limit(0).validate().is_err());
        assert!(matches!(
            LunarLander::new(LanderConfig::default().with_dispersion(2.0)),
            Err(LanderError::InvalidConfig(_))
        ));
    }
}
