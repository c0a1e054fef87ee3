use thiserror::Error;

/// Error produced while lexing or parsing a formula
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("Invalid formula in {section}: {source}")]
    Parse {
        section: String,
        #[source]
        source: ParseError,
    },

    #[error("Variable declared twice: {name}")]
    DuplicateVariable { name: String },

    #[error("Undeclared variable '{name}' in {section}")]
    UndeclaredVariable { name: String, section: String },

    #[error("Invalid domain for '{name}': {reason}")]
    InvalidDomain { name: String, reason: String },

    #[error("Value {value} is outside the domain of '{name}'")]
    ValueOutOfDomain { name: String, value: String },

    #[error("Invalid formula '{formula}' in {section}: {reason}")]
    InvalidFormula {
        section: String,
        formula: String,
        reason: String,
    },

    #[error("Invalid initial condition: {value}")]
    InvalidInitialCondition { value: String },

    #[error("State space too large: {size} exceeds the limit of {limit}")]
    StateSpaceTooLarge { size: u64, limit: u64 },

    #[error("Specification is unrealizable")]
    Unrealizable,

    #[error("Environment assumption violated: {reason}")]
    AssumptionViolated { reason: String },

    #[error("Invalid transducer: {reason}")]
    InvalidTransducer { reason: String },

    #[error("Unknown variable in trace: {name}")]
    UnknownVariable { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SynthesisResult<T> = Result<T, SynthesisError>;
