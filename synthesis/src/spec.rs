//! GR(1) specifications.
//!
//! A specification is the implication
//!
//! ```text
//! (env_init ∧ G env_safety ∧ ⋀ GF env_prog) → (sys_init ∧ G sys_safety ∧ ⋀ GF sys_prog)
//! ```
//!
//! over finite-domain environment (input) and system (output) variables.
//! Specifications are usually loaded from TOML files:
//!
//! ```toml
//! name = "request-grant"
//! moore = true
//! qinit = '\E \A'
//! env_init = ["!req"]
//! sys_init = ["!grant"]
//! sys_safety = ["!req -> X(!grant)", "req -> X(grant)"]
//! env_prog = ["req"]
//! sys_prog = ["grant"]
//!
//! [env_vars]
//! req = "bool"
//!
//! [sys_vars]
//! grant = "bool"
//! ```

use crate::domain::{Domain, VarTable};
use crate::error::{SynthesisError, SynthesisResult};
use crate::formula::Formula;
use crate::parser::parse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Quantification of the initial states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InitialCondition {
    /// For every initial input there exists a winning initial output (`\A \E`)
    #[default]
    ForallExists,
    /// One initial output is winning for every initial input (`\E \A`)
    ExistsForall,
    /// Every initial state is winning (`\A \A`)
    ForallForall,
    /// Some initial state is winning (`\E \E`)
    ExistsExists,
}

impl FromStr for InitialCondition {
    type Err = SynthesisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.as_str() {
            "\\A \\E" | "forall-exists" => Ok(InitialCondition::ForallExists),
            "\\E \\A" | "exists-forall" => Ok(InitialCondition::ExistsForall),
            "\\A \\A" | "forall-forall" => Ok(InitialCondition::ForallForall),
            "\\E \\E" | "exists-exists" => Ok(InitialCondition::ExistsExists),
            _ => Err(SynthesisError::InvalidInitialCondition {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for InitialCondition {
    type Error = SynthesisError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InitialCondition> for String {
    fn from(value: InitialCondition) -> Self {
        value.to_string()
    }
}

impl fmt::Display for InitialCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitialCondition::ForallExists => write!(f, "\\A \\E"),
            InitialCondition::ExistsForall => write!(f, "\\E \\A"),
            InitialCondition::ForallForall => write!(f, "\\A \\A"),
            InitialCondition::ExistsExists => write!(f, "\\E \\E"),
        }
    }
}

/// Formula section of a specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    EnvInit,
    SysInit,
    EnvSafety,
    SysSafety,
    EnvProg,
    SysProg,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::EnvInit,
        Section::SysInit,
        Section::EnvSafety,
        Section::SysSafety,
        Section::EnvProg,
        Section::SysProg,
    ];
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::EnvInit => "env_init",
            Section::SysInit => "sys_init",
            Section::EnvSafety => "env_safety",
            Section::SysSafety => "sys_safety",
            Section::EnvProg => "env_prog",
            Section::SysProg => "sys_prog",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrSpec {
    pub name: String,
    pub env_vars: VarTable,
    pub sys_vars: VarTable,
    pub env_init: Vec<Formula>,
    pub sys_init: Vec<Formula>,
    pub env_safety: Vec<Formula>,
    pub sys_safety: Vec<Formula>,
    pub env_prog: Vec<Formula>,
    pub sys_prog: Vec<Formula>,
    /// Outputs are chosen before the next inputs are seen
    pub moore: bool,
    pub qinit: InitialCondition,
}

impl GrSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_vars: VarTable::new(),
            sys_vars: VarTable::new(),
            env_init: Vec::new(),
            sys_init: Vec::new(),
            env_safety: Vec::new(),
            sys_safety: Vec::new(),
            env_prog: Vec::new(),
            sys_prog: Vec::new(),
            moore: false,
            qinit: InitialCondition::default(),
        }
    }

    pub fn with_env_var(mut self, name: &str, domain: Domain) -> SynthesisResult<Self> {
        self.env_vars.declare(name, domain)?;
        Ok(self)
    }

    pub fn with_sys_var(mut self, name: &str, domain: Domain) -> SynthesisResult<Self> {
        self.sys_vars.declare(name, domain)?;
        Ok(self)
    }

    /// Parse `formula` and append it to `section`
    pub fn with_formula(mut self, section: Section, formula: &str) -> SynthesisResult<Self> {
        let parsed = parse(formula).map_err(|source| SynthesisError::Parse {
            section: section.to_string(),
            source,
        })?;
        self.section_mut(section).push(parsed);
        Ok(self)
    }

    pub fn with_moore(mut self, moore: bool) -> Self {
        self.moore = moore;
        self
    }

    pub fn with_qinit(mut self, qinit: InitialCondition) -> Self {
        self.qinit = qinit;
        self
    }

    pub fn section(&self, section: Section) -> &[Formula] {
        match section {
            Section::EnvInit => &self.env_init,
            Section::SysInit => &self.sys_init,
            Section::EnvSafety => &self.env_safety,
            Section::SysSafety => &self.sys_safety,
            Section::EnvProg => &self.env_prog,
            Section::SysProg => &self.sys_prog,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut Vec<Formula> {
        match section {
            Section::EnvInit => &mut self.env_init,
            Section::SysInit => &mut self.sys_init,
            Section::EnvSafety => &mut self.env_safety,
            Section::SysSafety => &mut self.sys_safety,
            Section::EnvProg => &mut self.env_prog,
            Section::SysProg => &mut self.sys_prog,
        }
    }

    pub fn domain(&self, name: &str) -> Option<Domain> {
        self.env_vars
            .domain(name)
            .or_else(|| self.sys_vars.domain(name))
    }

    pub fn from_toml_str(input: &str) -> SynthesisResult<Self> {
        let file: SpecFile = toml::from_str(input)?;
        file.into_spec()
    }

    pub fn load(path: impl AsRef<Path>) -> SynthesisResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check declarations and the shape of every formula
    pub fn validate(&self) -> SynthesisResult<()> {
        for (name, _) in self.sys_vars.iter() {
            if self.env_vars.contains(name) {
                return Err(SynthesisError::DuplicateVariable {
                    name: name.to_string(),
                });
            }
        }

        for section in Section::ALL {
            for formula in self.section(section) {
                self.validate_formula(section, formula)?;
            }
        }
        Ok(())
    }

    fn validate_formula(&self, section: Section, formula: &Formula) -> SynthesisResult<()> {
        let invalid = |reason: &str| SynthesisError::InvalidFormula {
            section: section.to_string(),
            formula: formula.to_string(),
            reason: reason.to_string(),
        };

        check_atoms(formula, &|name: &str| self.domain(name), section)?;

        if formula.is_temporal() {
            return Err(invalid("G and F are implicit in GR(1) sections"));
        }

        match section {
            Section::EnvInit | Section::SysInit | Section::EnvProg | Section::SysProg => {
                if formula.next_depth() > 0 {
                    return Err(invalid("X is only allowed in safety formulas"));
                }
            }
            Section::EnvSafety | Section::SysSafety => {
                if formula.next_depth() > 1 {
                    return Err(invalid("X may not be nested"));
                }
            }
        }

        if section == Section::EnvInit {
            if let Some(name) = formula
                .variables()
                .into_iter()
                .find(|name| !self.env_vars.contains(name))
            {
                return Err(SynthesisError::UndeclaredVariable {
                    name,
                    section: section.to_string(),
                });
            }
        }

        if section == Section::EnvSafety
            && formula
                .next_variables()
                .iter()
                .any(|name| self.sys_vars.contains(name))
        {
            return Err(invalid(
                "environment safety may only constrain next environment values",
            ));
        }

        if section == Section::SysSafety
            && self.moore
            && formula
                .next_variables()
                .iter()
                .any(|name| self.env_vars.contains(name))
        {
            return Err(invalid(
                "a Moore system cannot react to next environment values",
            ));
        }

        Ok(())
    }
}

fn check_atoms(
    formula: &Formula,
    domain_of: &dyn Fn(&str) -> Option<Domain>,
    section: Section,
) -> SynthesisResult<()> {
    let undeclared = |name: &str| SynthesisError::UndeclaredVariable {
        name: name.to_string(),
        section: section.to_string(),
    };
    match formula {
        Formula::True | Formula::False => Ok(()),
        Formula::Var(name) => match domain_of(name) {
            Some(Domain::Bool) => Ok(()),
            Some(Domain::Int { .. }) => Err(SynthesisError::InvalidFormula {
                section: section.to_string(),
                formula: formula.to_string(),
                reason: format!("integer variable '{}' used as a proposition", name),
            }),
            None => Err(undeclared(name)),
        },
        Formula::Compare { var, value, .. } => match domain_of(var) {
            Some(domain @ Domain::Int { min, max }) => {
                if (min..=max).contains(value) {
                    Ok(())
                } else {
                    Err(SynthesisError::ValueOutOfDomain {
                        name: var.clone(),
                        value: format!("{} (domain {})", value, domain),
                    })
                }
            }
            Some(Domain::Bool) => Err(SynthesisError::InvalidFormula {
                section: section.to_string(),
                formula: formula.to_string(),
                reason: format!("boolean variable '{}' compared to an integer", var),
            }),
            None => Err(undeclared(var)),
        },
        Formula::Not(inner)
        | Formula::Next(inner)
        | Formula::Always(inner)
        | Formula::Eventually(inner) => check_atoms(inner, domain_of, section),
        Formula::And(l, r) | Formula::Or(l, r) | Formula::Implies(l, r) | Formula::Iff(l, r) => {
            check_atoms(l, domain_of, section)?;
            check_atoms(r, domain_of, section)
        }
    }
}

/// Variable declaration as written in a spec file: `"bool"`, a range
/// `[min, max]` or a list of three or more values such as `[0, 1, 2, 3]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarDecl {
    Kind(String),
    Range(Vec<i64>),
}

impl VarDecl {
    fn to_domain(&self, name: &str) -> SynthesisResult<Domain> {
        let invalid = |reason: String| SynthesisError::InvalidDomain {
            name: name.to_string(),
            reason,
        };
        match self {
            VarDecl::Kind(kind) if kind == "bool" || kind == "boolean" => Ok(Domain::Bool),
            VarDecl::Kind(kind) => Err(invalid(format!("unknown kind '{}'", kind))),
            VarDecl::Range(bounds) => match bounds.as_slice() {
                [] => Err(invalid("empty value list".to_string())),
                [value] => Ok(Domain::Int {
                    min: *value,
                    max: *value,
                }),
                [min, max] => Ok(Domain::Int {
                    min: *min,
                    max: *max,
                }),
                values => {
                    let mut sorted = values.to_vec();
                    sorted.sort_unstable();
                    sorted.dedup();
                    if sorted
                        .windows(2)
                        .any(|pair| pair[1].checked_sub(pair[0]) != Some(1))
                    {
                        return Err(invalid(format!(
                            "values {:?} do not form a contiguous range",
                            values
                        )));
                    }
                    Ok(Domain::Int {
                        min: sorted[0],
                        max: sorted[sorted.len() - 1],
                    })
                }
            },
        }
    }
}

/// On-disk form of a specification
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecFile {
    pub name: String,
    pub moore: bool,
    pub qinit: InitialCondition,
    pub env_vars: BTreeMap<String, VarDecl>,
    pub sys_vars: BTreeMap<String, VarDecl>,
    pub env_init: Vec<String>,
    pub sys_init: Vec<String>,
    pub env_safety: Vec<String>,
    pub sys_safety: Vec<String>,
    pub env_prog: Vec<String>,
    pub sys_prog: Vec<String>,
}

impl SpecFile {
    pub fn into_spec(self) -> SynthesisResult<GrSpec> {
        let mut spec = GrSpec::new(self.name)
            .with_moore(self.moore)
            .with_qinit(self.qinit);

        for (name, decl) in &self.env_vars {
            spec.env_vars.declare(name.as_str(), decl.to_domain(name)?)?;
        }
        for (name, decl) in &self.sys_vars {
            spec.sys_vars.declare(name.as_str(), decl.to_domain(name)?)?;
        }

        let sections = [
            (Section::EnvInit, self.env_init),
            (Section::SysInit, self.sys_init),
            (Section::EnvSafety, self.env_safety),
            (Section::SysSafety, self.sys_safety),
            (Section::EnvProg, self.env_prog),
            (Section::SysProg, self.sys_prog),
        ];
        for (section, formulas) in sections {
            for formula in formulas {
                spec = spec.with_formula(section, &formula)?;
            }
        }

        spec.validate()?;
        Ok(spec)
    }
}
