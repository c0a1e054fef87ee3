//! Temporal properties checked over finite traces.
//!
//! Evaluation uses the usual finite-trace reading: `X φ` is false at the
//! last position, `G φ` requires φ at every remaining position and `F φ`
//! at some remaining position. Past the end of the trace atoms are false,
//! `G φ` holds, `F φ` and `X φ` fail, and the boolean connectives combine
//! their operands as usual.

use crate::domain::{Valuation, Value};
use crate::error::{SynthesisError, SynthesisResult};
use crate::formula::Formula;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Evaluate `formula` at position `at` of `trace`
pub fn holds_at(formula: &Formula, trace: &[Valuation], at: usize) -> SynthesisResult<bool> {
    let step = trace.get(at);
    Ok(match formula {
        Formula::True => true,
        Formula::False => false,
        Formula::Var(name) => match step {
            Some(step) => match lookup(step, name)? {
                Value::Bool(b) => b,
                Value::Int(v) => v != 0,
            },
            None => false,
        },
        Formula::Compare { var, op, value } => match step {
            Some(step) => {
                let current = match lookup(step, var)? {
                    Value::Bool(b) => b as i64,
                    Value::Int(v) => v,
                };
                op.apply(current, *value)
            }
            None => false,
        },
        Formula::Not(inner) => !holds_at(inner, trace, at)?,
        Formula::And(lhs, rhs) => holds_at(lhs, trace, at)? && holds_at(rhs, trace, at)?,
        Formula::Or(lhs, rhs) => holds_at(lhs, trace, at)? || holds_at(rhs, trace, at)?,
        Formula::Implies(lhs, rhs) => !holds_at(lhs, trace, at)? || holds_at(rhs, trace, at)?,
        Formula::Iff(lhs, rhs) => holds_at(lhs, trace, at)? == holds_at(rhs, trace, at)?,
        Formula::Next(inner) => at + 1 < trace.len() && holds_at(inner, trace, at + 1)?,
        Formula::Always(inner) => first_failure(inner, trace, at)?.is_none(),
        Formula::Eventually(inner) => {
            for position in at..trace.len() {
                if holds_at(inner, trace, position)? {
                    return Ok(true);
                }
            }
            false
        }
    })
}

/// Evaluate `formula` on the whole trace
pub fn evaluate(formula: &Formula, trace: &[Valuation]) -> SynthesisResult<bool> {
    holds_at(formula, trace, 0)
}

fn first_failure(inner: &Formula, trace: &[Valuation], from: usize) -> SynthesisResult<Option<usize>> {
    for position in from..trace.len() {
        if !holds_at(inner, trace, position)? {
            return Ok(Some(position));
        }
    }
    Ok(None)
}

fn lookup(step: &Valuation, name: &str) -> SynthesisResult<Value> {
    step.get(name)
        .copied()
        .ok_or_else(|| SynthesisError::UnknownVariable {
            name: name.to_string(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Satisfied,
    /// Violated; for `G` properties `at` is the first failing position
    Violated { at: usize },
}

impl Verdict {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Verdict::Satisfied)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Satisfied => write!(f, "satisfied"),
            Verdict::Violated { at } => write!(f, "violated at step {}", at),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub formula: Formula,
}

impl Property {
    pub fn new(name: impl Into<String>, formula: Formula) -> Self {
        Self {
            name: name.into(),
            formula,
        }
    }

    pub fn check(&self, trace: &[Valuation]) -> SynthesisResult<Verdict> {
        if let Formula::Always(inner) = &self.formula {
            return Ok(match first_failure(inner, trace, 0)? {
                Some(at) => Verdict::Violated { at },
                None => Verdict::Satisfied,
            });
        }
        Ok(if evaluate(&self.formula, trace)? {
            Verdict::Satisfied
        } else {
            Verdict::Violated { at: 0 }
        })
    }
}

impl std::str::FromStr for Property {
    type Err = SynthesisError;

    /// Parses `name=formula`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, formula) = s.split_once('=').ok_or_else(|| SynthesisError::InvalidFormula {
            section: "property".to_string(),
            formula: s.to_string(),
            reason: "expected name=formula".to_string(),
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(SynthesisError::InvalidFormula {
                section: "property".to_string(),
                formula: s.to_string(),
                reason: "empty property name".to_string(),
            });
        }
        let formula = formula
            .parse::<Formula>()
            .map_err(|source| SynthesisError::Parse {
                section: format!("property '{}'", name),
                source,
            })?;
        Ok(Self::new(name, formula))
    }
}

/// Named set of properties checked together
#[derive(Debug, Clone, Default)]
pub struct Monitor {
    properties: Vec<Property>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, property: Property) {
        self.properties.push(property);
    }

    pub fn with_property(mut self, name: &str, formula: &str) -> SynthesisResult<Self> {
        let formula = formula
            .parse::<Formula>()
            .map_err(|source| SynthesisError::Parse {
                section: format!("property '{}'", name),
                source,
            })?;
        self.add(Property::new(name, formula));
        Ok(self)
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn check(&self, trace: &[Valuation]) -> SynthesisResult<MonitorReport> {
        let mut results = Vec::with_capacity(self.properties.len());
        for property in &self.properties {
            results.push(PropertyResult {
                name: property.name.clone(),
                verdict: property.check(trace)?,
            });
        }
        Ok(MonitorReport { results })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyResult {
    pub name: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub results: Vec<PropertyResult>,
}

impl MonitorReport {
    pub fn all_satisfied(&self) -> bool {
        self.results.iter().all(|r| r.verdict.is_satisfied())
    }

    pub fn violations(&self) -> impl Iterator<Item = &PropertyResult> {
        self.results.iter().filter(|r| !r.verdict.is_satisfied())
    }

    pub fn verdict(&self, name: &str) -> Option<Verdict> {
        self.results
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.verdict)
    }
}
