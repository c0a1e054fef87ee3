use crate::controllers::Thresholds;
use crate::lander::LanderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings of an evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub controller: String,
    pub episodes: usize,
    /// Seed of the first episode; episode `i` uses `seed + i`
    pub seed: u64,
    pub max_steps: usize,
    /// Episodes simulated concurrently
    pub parallelism: usize,
    /// Episode return counted as a successful landing
    pub success_threshold: f64,
    /// Log every n-th step of an episode, 0 disables step logging
    pub log_interval: usize,
    /// JSON-lines file receiving every step
    pub record: Option<PathBuf>,
    /// Properties as `name=formula`, checked on every episode trace
    pub properties: Vec<String>,
    /// Tolerances behind the propositions of monitored traces
    pub monitor_thresholds: Thresholds,
    pub lander: LanderConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            controller: "phase-fsm-v3".to_string(),
            episodes: 10,
            seed: 0,
            max_steps: 400,
            parallelism: 4,
            success_threshold: 200.0,
            log_interval: 10,
            record: None,
            properties: Vec::new(),
            monitor_thresholds: Thresholds::TIGHT,
            lander: LanderConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = controller.into();
        self
    }

    pub fn with_episodes(mut self, episodes: usize) -> Self {
        self.episodes = episodes;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_success_threshold(mut self, threshold: f64) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_log_interval(mut self, log_interval: usize) -> Self {
        self.log_interval = log_interval;
        self
    }

    pub fn with_record(mut self, path: impl Into<PathBuf>) -> Self {
        self.record = Some(path.into());
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.properties.push(property.into());
        self
    }

    pub fn with_monitor_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.monitor_thresholds = thresholds;
        self
    }

    pub fn with_lander(mut self, lander: LanderConfig) -> Self {
        self.lander = lander;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.controller.is_empty() {
            return Err("Controller name cannot be empty".to_string());
        }

        if self.episodes == 0 {
            return Err("Episodes must be greater than 0".to_string());
        }

        if self.max_steps == 0 {
            return Err("Max steps must be greater than 0".to_string());
        }

        if self.parallelism == 0 {
            return Err("Parallelism must be greater than 0".to_string());
        }

        if !self.success_threshold.is_finite() {
            return Err("Success threshold must be finite".to_string());
        }

        let t = &self.monitor_thresholds;
        let tolerances = [t.x, t.angle, t.vx, t.vy, t.angular_velocity, t.y];
        if tolerances.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err("Monitor thresholds must be finite and non-negative".to_string());
        }

        self.lander.validate()
    }

    pub fn from_toml_str(input: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
