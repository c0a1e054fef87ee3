//! Lander controllers and the registry that creates them by name.

pub mod descent_guard;
pub mod phase_fsm;
pub mod property_flags;
pub mod propositions;
pub mod random;
pub mod safety;
pub mod spec_guided;
pub mod synthesized;

pub use descent_guard::DescentGuardController;
pub use phase_fsm::{PhaseFsmController, PhaseFsmVariant};
pub use property_flags::PropertyFlagsController;
pub use propositions::{Phase, Propositions, Thresholds};
pub use random::RandomController;
pub use safety::SafetyEnvelopeController;
pub use spec_guided::SpecGuidedController;
pub use synthesized::SynthesizedController;

use crate::lander::{Action, Observation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use synthesis::{SynthesisError, Transducer};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Controller not found: {name}")]
    NotFound { name: String },

    #[error("Synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Controller output is not an action: {message}")]
    InvalidOutput { message: String },
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// What a controller asks the runner to do next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Act(Action),
    /// End the episode without stepping the simulation
    Terminate,
}

impl From<Action> for Command {
    fn from(action: Action) -> Self {
        Command::Act(action)
    }
}

pub trait Controller: Send {
    fn name(&self) -> &str;

    /// Prepare for a new episode started with `seed`
    fn reset(&mut self, _seed: u64) {}

    fn control(&mut self, observation: &Observation) -> ControllerResult<Command>;
}

type Factory = Box<dyn Fn() -> ControllerResult<Box<dyn Controller>> + Send + Sync>;

struct Registration {
    description: String,
    factory: Factory,
}

/// Named controller factories; every episode gets a fresh instance
pub struct ControllerRegistry {
    controllers: BTreeMap<String, Registration>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self {
            controllers: BTreeMap::new(),
        }
    }

    /// Registry with every built-in controller
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            SafetyEnvelopeController::NAME,
            "Tilt, horizontal bound and descent speed envelope",
            || Ok(Box::new(SafetyEnvelopeController::new())),
        );
        for variant in PhaseFsmVariant::ALL {
            registry.register(variant.name(), variant.description(), move || {
                Ok(Box::new(PhaseFsmController::new(variant)))
            });
        }
        registry.register(
            SpecGuidedController::NAME,
            "Prioritised altitude, angle, velocity and pad rules",
            || Ok(Box::new(SpecGuidedController::new())),
        );
        registry.register(
            PropertyFlagsController::NAME,
            "Coarse altitude, crash and velocity property flags",
            || Ok(Box::new(PropertyFlagsController::new())),
        );
        registry.register(
            DescentGuardController::NAME,
            "Left engine on fast descent near the ground or fast spin",
            || Ok(Box::new(DescentGuardController::new())),
        );
        registry.register(RandomController::NAME, "Uniformly random actions", || {
            Ok(Box::new(RandomController::new()))
        });

        let transducer: Arc<OnceLock<Arc<Transducer>>> = Arc::new(OnceLock::new());
        registry.register(
            SynthesizedController::NAME,
            "GR(1)-synthesized transducer over lander propositions",
            move || {
                let transducer = match transducer.get() {
                    Some(transducer) => transducer.clone(),
                    None => {
                        let built = Arc::new(synthesized::bundled_transducer()?);
                        transducer.get_or_init(|| built).clone()
                    }
                };
                Ok(Box::new(SynthesizedController::new(transducer)?))
            },
        );
        registry
    }

    pub fn register<F>(&mut self, name: &str, description: &str, factory: F)
    where
        F: Fn() -> ControllerResult<Box<dyn Controller>> + Send + Sync + 'static,
    {
        self.controllers.insert(
            name.to_string(),
            Registration {
                description: description.to_string(),
                factory: Box::new(factory),
            },
        );
    }

    pub fn create(&self, name: &str) -> ControllerResult<Box<dyn Controller>> {
        match self.controllers.get(name) {
            Some(registration) => (registration.factory)(),
            None => Err(ControllerError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.controllers.keys().map(|s| s.as_str()).collect()
    }

    pub fn describe(&self) -> Vec<(&str, &str)> {
        self.controllers
            .iter()
            .map(|(name, registration)| (name.as_str(), registration.description.as_str()))
            .collect()
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant(Action);

    impl Controller for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn control(&mut self, _observation: &Observation) -> ControllerResult<Command> {
            Ok(self.0.into())
        }
    }

    #[test]
    fn test_default_registry_names() {
        let registry = ControllerRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec![
                "descent-guard",
                "phase-fsm",
                "phase-fsm-v2",
                "phase-fsm-v3",
                "property-flags",
                "random",
                "safety-envelope",
                "spec-guided",
                "synthesized",
            ]
        );
        for (_, description) in registry.describe() {
            assert!(!description.is_empty());
        }
    }

    #[test]
    fn test_create_every_controller() {
        let registry = ControllerRegistry::with_defaults();
        for name in registry.names() {
            let mut controller = registry.create(name).unwrap();
            assert_eq!(controller.name(), name);
            controller.reset(0);
            controller.control(&Observation::default()).unwrap();
        }
    }

    #[test]
    fn test_register_and_unknown_name() {
        let mut registry = ControllerRegistry::new();
        registry.register("constant", "always the main engine", || {
            Ok(Box::new(Constant(Action::FireMain)))
        });
        assert!(registry.contains("constant"));

        let mut controller = registry.create("constant").unwrap();
        assert_eq!(
            controller.control(&Observation::default()).unwrap(),
            Command::Act(Action::FireMain)
        );
        assert!(matches!(
            registry.create("missing"),
            Err(ControllerError::NotFound { .. })
        ));
    }
}
