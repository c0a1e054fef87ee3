pub mod domain;
pub mod error;
pub mod formula;
pub mod game;
pub mod monitor;
pub mod parser;
pub mod solver;
pub mod spec;
pub mod transducer;

pub use domain::{Domain, Valuation, Value, VarTable};
pub use error::{ParseError, SynthesisError, SynthesisResult};
pub use formula::{CompareOp, Formula};
pub use game::{Game, Limits, StateSet};
pub use monitor::{evaluate, Monitor, MonitorReport, Property, PropertyResult, Verdict};
pub use parser::parse;
pub use solver::{solve, Solution};
pub use spec::{GrSpec, InitialCondition, Section, SpecFile, VarDecl};
pub use transducer::{
    check_realizable, synthesize, synthesize_with_limits, MachineState, Transducer,
    TransducerExport, TransducerRunner, TransitionExport,
};

pub mod prelude {
    pub use crate::domain::*;
    pub use crate::error::*;
    pub use crate::formula::*;
    pub use crate::monitor::*;
    pub use crate::spec::*;
    pub use crate::transducer::*;
}
