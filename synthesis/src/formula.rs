//! Temporal-logic formula representation.
//!
//! Formulas are propositional logic over boolean and bounded-integer
//! variables, extended with the temporal operators `X` (next), `G`
//! (always) and `F` (eventually). GR(1) specifications only use `X`
//! directly; `G` and `F` appear in runtime monitor properties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Comparison operator for integer atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
}

impl CompareOp {
    pub fn apply(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "="),
            CompareOp::Ne => write!(f, "!="),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Formula {
    True,
    False,
    Var(String),
    Compare {
        var: String,
        op: CompareOp,
        value: i64,
    },
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Iff(Box<Formula>, Box<Formula>),
    Next(Box<Formula>),
    Always(Box<Formula>),
    Eventually(Box<Formula>),
}

impl Formula {
    pub fn var(name: impl Into<String>) -> Self {
        Formula::Var(name.into())
    }

    pub fn eq(var: impl Into<String>, value: i64) -> Self {
        Formula::Compare {
            var: var.into(),
            op: CompareOp::Eq,
            value,
        }
    }

    pub fn not(inner: Formula) -> Self {
        Formula::Not(Box::new(inner))
    }

    pub fn and(lhs: Formula, rhs: Formula) -> Self {
        Formula::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Formula, rhs: Formula) -> Self {
        Formula::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn implies(lhs: Formula, rhs: Formula) -> Self {
        Formula::Implies(Box::new(lhs), Box::new(rhs))
    }

    pub fn iff(lhs: Formula, rhs: Formula) -> Self {
        Formula::Iff(Box::new(lhs), Box::new(rhs))
    }

    pub fn next(inner: Formula) -> Self {
        Formula::Next(Box::new(inner))
    }

    pub fn always(inner: Formula) -> Self {
        Formula::Always(Box::new(inner))
    }

    pub fn eventually(inner: Formula) -> Self {
        Formula::Eventually(Box::new(inner))
    }

    /// Conjunction of all formulas; `True` for an empty iterator
    pub fn conjunction(formulas: impl IntoIterator<Item = Formula>) -> Self {
        formulas
            .into_iter()
            .reduce(Formula::and)
            .unwrap_or(Formula::True)
    }

    /// Names of every variable referenced by the formula
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(false, &mut |name, _| {
            names.insert(name.to_string());
        });
        names
    }

    /// Names of variables that occur under an `X` operator
    pub fn next_variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variables(false, &mut |name, under_next| {
            if under_next {
                names.insert(name.to_string());
            }
        });
        names
    }

    fn collect_variables(&self, under_next: bool, visit: &mut impl FnMut(&str, bool)) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Var(name) | Formula::Compare { var: name, .. } => visit(name, under_next),
            Formula::Not(inner) | Formula::Always(inner) | Formula::Eventually(inner) => {
                inner.collect_variables(under_next, visit)
            }
            Formula::Next(inner) => inner.collect_variables(true, visit),
            Formula::And(l, r) | Formula::Or(l, r) | Formula::Implies(l, r) | Formula::Iff(l, r) => {
                l.collect_variables(under_next, visit);
                r.collect_variables(under_next, visit);
            }
        }
    }

    /// True if the formula contains `G` or `F`
    pub fn is_temporal(&self) -> bool {
        match self {
            Formula::Always(_) | Formula::Eventually(_) => true,
            Formula::True | Formula::False | Formula::Var(_) | Formula::Compare { .. } => false,
            Formula::Not(inner) | Formula::Next(inner) => inner.is_temporal(),
            Formula::And(l, r) | Formula::Or(l, r) | Formula::Implies(l, r) | Formula::Iff(l, r) => {
                l.is_temporal() || r.is_temporal()
            }
        }
    }

    /// Maximum nesting depth of `X`
    pub fn next_depth(&self) -> usize {
        match self {
            Formula::True | Formula::False | Formula::Var(_) | Formula::Compare { .. } => 0,
            Formula::Next(inner) => 1 + inner.next_depth(),
            Formula::Not(inner) | Formula::Always(inner) | Formula::Eventually(inner) => {
                inner.next_depth()
            }
            Formula::And(l, r) | Formula::Or(l, r) | Formula::Implies(l, r) | Formula::Iff(l, r) => {
                l.next_depth().max(r.next_depth())
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Var(name) => write!(f, "{}", name),
            Formula::Compare { var, op, value } => write!(f, "{} {} {}", var, op, value),
            Formula::Not(inner) => write!(f, "!{}", inner),
            Formula::And(l, r) => write!(f, "({} && {})", l, r),
            Formula::Or(l, r) => write!(f, "({} || {})", l, r),
            Formula::Implies(l, r) => write!(f, "({} -> {})", l, r),
            Formula::Iff(l, r) => write!(f, "({} <-> {})", l, r),
            Formula::Next(inner) => write!(f, "X {}", inner),
            Formula::Always(inner) => write!(f, "G {}", inner),
            Formula::Eventually(inner) => write!(f, "F {}", inner),
        }
    }
}
