//! Variable domains and valuations.

use crate::error::{SynthesisError, SynthesisResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Finite domain of a specification variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Domain {
    Bool,
    /// Inclusive integer range
    Int { min: i64, max: i64 },
}

impl Domain {
    /// Number of values; saturates at `u64::MAX` for the widest ranges
    pub fn size(&self) -> u64 {
        match self {
            Domain::Bool => 2,
            Domain::Int { min, max } => {
                u64::try_from(i128::from(*max) - i128::from(*min) + 1).unwrap_or(u64::MAX)
            }
        }
    }

    /// Raw slot encoding of a value, `None` if out of domain
    pub fn raw(&self, value: Value) -> Option<i64> {
        match (self, value) {
            (Domain::Bool, Value::Bool(b)) => Some(b as i64),
            (Domain::Int { min, max }, Value::Int(v)) if (*min..=*max).contains(&v) => Some(v),
            _ => None,
        }
    }

    pub fn value(&self, raw: i64) -> Value {
        match self {
            Domain::Bool => Value::Bool(raw != 0),
            Domain::Int { .. } => Value::Int(raw),
        }
    }

    fn offset(&self, raw: i64) -> u64 {
        match self {
            Domain::Bool => raw as u64,
            Domain::Int { min, .. } => (i128::from(raw) - i128::from(*min)) as u64,
        }
    }

    fn from_offset(&self, offset: u64) -> i64 {
        match self {
            Domain::Bool => offset as i64,
            Domain::Int { min, .. } => (i128::from(*min) + i128::from(offset)) as i64,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Bool => write!(f, "bool"),
            Domain::Int { min, max } => write!(f, "[{}, {}]", min, max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

/// Assignment of values to variables
pub type Valuation = BTreeMap<String, Value>;

/// Ordered variable declarations with a mixed-radix valuation encoding.
///
/// The first declared variable is the least significant digit, so for a
/// table holding a single `action` variable the index of a valuation is
/// `action - min`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarTable {
    vars: Vec<(String, Domain)>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, domain: Domain) -> SynthesisResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(SynthesisError::DuplicateVariable { name });
        }
        if let Domain::Int { min, max } = domain {
            if min > max {
                return Err(SynthesisError::InvalidDomain {
                    name,
                    reason: format!("empty range [{}, {}]", min, max),
                });
            }
        }
        self.vars.push((name, domain));
        Ok(())
    }

    pub fn with(mut self, name: impl Into<String>, domain: Domain) -> SynthesisResult<Self> {
        self.declare(name, domain)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.vars.iter().position(|(n, _)| n == name)
    }

    pub fn domain(&self, name: &str) -> Option<Domain> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, d)| *d)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Domain)> {
        self.vars.iter().map(|(n, d)| (n.as_str(), *d))
    }

    /// Number of valuations; saturates instead of overflowing
    pub fn size(&self) -> u64 {
        self.vars
            .iter()
            .fold(1u64, |acc, (_, d)| acc.saturating_mul(d.size()))
    }

    /// Raw slot values of the valuation with the given index
    pub fn raw_values(&self, index: u64) -> Vec<i64> {
        let mut rest = index;
        self.vars
            .iter()
            .map(|(_, domain)| {
                let size = domain.size();
                let offset = rest % size;
                rest /= size;
                domain.from_offset(offset)
            })
            .collect()
    }

    pub fn decode(&self, index: u64) -> Valuation {
        self.vars
            .iter()
            .zip(self.raw_values(index))
            .map(|((name, domain), raw)| (name.clone(), domain.value(raw)))
            .collect()
    }

    /// Index of a complete valuation; extra keys are ignored
    pub fn encode(&self, valuation: &Valuation) -> SynthesisResult<u64> {
        let mut index = 0u64;
        let mut stride = 1u64;
        for (name, domain) in &self.vars {
            let value = valuation
                .get(name)
                .ok_or_else(|| SynthesisError::UnknownVariable { name: name.clone() })?;
            let raw = domain
                .raw(*value)
                .ok_or_else(|| SynthesisError::ValueOutOfDomain {
                    name: name.clone(),
                    value: value.to_string(),
                })?;
            index += domain.offset(raw) * stride;
            stride = stride.saturating_mul(domain.size());
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> VarTable {
        VarTable::new()
            .with("grant", Domain::Bool)
            .unwrap()
            .with("action", Domain::Int { min: 0, max: 3 })
            .unwrap()
    }

    #[test]
    fn test_size_and_roundtrip() {
        let table = table();
        assert_eq!(table.size(), 8);
        for index in 0..table.size() {
            let valuation = table.decode(index);
            assert_eq!(table.encode(&valuation).unwrap(), index);
        }
    }

    #[test]
    fn test_first_variable_is_least_significant() {
        let table = table();
        let v = table.decode(1);
        assert_eq!(v["grant"], Value::Bool(true));
        assert_eq!(v["action"], Value::Int(0));

        let v = table.decode(6);
        assert_eq!(v["grant"], Value::Bool(false));
        assert_eq!(v["action"], Value::Int(3));
    }

    #[test]
    fn test_declaration_errors() {
        let mut table = table();
        assert!(matches!(
            table.declare("grant", Domain::Bool),
            Err(SynthesisError::DuplicateVariable { .. })
        ));
        assert!(matches!(
            table.declare("level", Domain::Int { min: 3, max: 1 }),
            Err(SynthesisError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn test_widest_ranges_saturate() {
        assert_eq!(Domain::Int { min: 0, max: i64::MAX }.size(), 1u64 << 63);
        assert_eq!(
            Domain::Int {
                min: i64::MIN,
                max: i64::MAX
            }
            .size(),
            u64::MAX
        );
        assert_eq!(Domain::Int { min: -2, max: 2 }.size(), 5);

        let table = VarTable::new()
            .with("x", Domain::Int { min: i64::MIN, max: i64::MAX })
            .unwrap()
            .with("g", Domain::Bool)
            .unwrap();
        assert_eq!(table.size(), u64::MAX);

        let wide = VarTable::new()
            .with("x", Domain::Int { min: i64::MIN, max: i64::MAX })
            .unwrap();
        let mut v = Valuation::new();
        v.insert("x".to_string(), Value::Int(i64::MAX));
        assert_eq!(wide.encode(&v).unwrap(), u64::MAX);
        assert_eq!(wide.decode(0)["x"], Value::Int(i64::MIN));
    }

    #[test]
    fn test_encode_rejects_bad_values() {
        let table = table();
        let mut v = table.decode(0);
        v.insert("action".to_string(), Value::Int(7));
        assert!(matches!(
            table.encode(&v),
            Err(SynthesisError::ValueOutOfDomain { .. })
        ));

        v.remove("action");
        assert!(matches!(
            table.encode(&v),
            Err(SynthesisError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn test_value_serialization() {
        let table = table();
        let json = serde_json::to_string(&table.decode(7)).unwrap();
        assert_eq!(json, r#"{"action":3,"grant":true}"#);
    }
}
