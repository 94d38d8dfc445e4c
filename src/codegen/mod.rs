//! Rendering IR into executable programs.
//!
//! Validation happens once, up front, against the registry and the target
//! format's constraints; the renderers themselves cannot fail.

#![forbid(unsafe_code)]

pub mod bytecode;
pub mod groovy;

use std::fmt;
use std::hash::Hasher;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;
use xxhash_rust::xxh64::Xxh64;

pub use bytecode::{Argument, Bytecode, Instruction};

use crate::config::ConfigError;
use crate::error::CodegenError;
use crate::ir::{ChooseCondition, Predicate, Statement, Step, Traversal, Value};
use crate::registry::Registry;

/// Output format of [`emit`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Gremlin-Groovy source text.
    #[default]
    Groovy,
    /// Structured instruction list.
    Bytecode,
}

impl TargetFormat {
    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetFormat::Groovy => "groovy",
            TargetFormat::Bytecode => "bytecode",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groovy" => Ok(TargetFormat::Groovy),
            "bytecode" => Ok(TargetFormat::Bytecode),
            _ => Err(ConfigError::UnknownFormat { name: s.to_owned() }),
        }
    }
}

/// Rendered program.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "format", content = "program", rename_all = "lowercase")]
pub enum Program {
    /// Gremlin-Groovy text.
    Groovy(String),
    /// Instruction list.
    Bytecode(Bytecode),
}

impl Program {
    /// Format the program was rendered in.
    pub fn format(&self) -> TargetFormat {
        match self {
            Program::Groovy(_) => TargetFormat::Groovy,
            Program::Bytecode(_) => TargetFormat::Bytecode,
        }
    }

    /// Groovy text, if this is a Groovy program.
    pub fn as_groovy(&self) -> Option<&str> {
        match self {
            Program::Groovy(text) => Some(text),
            Program::Bytecode(_) => None,
        }
    }

    /// Instructions, if this is a bytecode program.
    pub fn as_bytecode(&self) -> Option<&Bytecode> {
        match self {
            Program::Groovy(_) => None,
            Program::Bytecode(bytecode) => Some(bytecode),
        }
    }

    /// Text form: Groovy source or pretty-printed JSON.
    pub fn render(&self) -> Result<String, CodegenError> {
        match self {
            Program::Groovy(text) => Ok(text.clone()),
            Program::Bytecode(bytecode) => serde_json::to_string_pretty(bytecode)
                .map_err(|err| CodegenError::Serialization(err.to_string())),
        }
    }

    /// Stable xxh64 of the program, usable as a cache key.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Xxh64::new(0);
        hasher.write(self.format().as_str().as_bytes());
        match self {
            Program::Groovy(text) => hasher.write(text.as_bytes()),
            Program::Bytecode(bytecode) => bytecode.hash_into(&mut hasher),
        }
        hasher.finish()
    }
}

/// Renders a statement in the requested format.
pub fn emit(
    statement: &Statement,
    format: TargetFormat,
    registry: &Registry,
) -> Result<Program, CodegenError> {
    let root = &statement.traversal;
    match root.steps().first() {
        Some(step) if step.is_start() => {}
        Some(step) => {
            return Err(CodegenError::unsupported(
                step.name(),
                "root traversal must begin with V(), E(), addV() or inject()",
            ))
        }
        None => return Err(CodegenError::unsupported("traversal", "root traversal is empty")),
    }
    validate(root, registry)?;
    let program = match format {
        TargetFormat::Groovy => Program::Groovy(groovy::render_root(root)),
        TargetFormat::Bytecode => Program::Bytecode(bytecode::render(root)),
    };
    debug!(%format, fingerprint = program.fingerprint(), "emitted program");
    Ok(program)
}

fn validate(traversal: &Traversal, registry: &Registry) -> Result<(), CodegenError> {
    traversal.try_walk(&mut |step| {
        match step {
            Step::Project(entries) if entries.is_empty() => {
                return Err(CodegenError::unsupported(step.name(), "no keys"))
            }
            Step::Union(branches) | Step::Coalesce(branches) if branches.is_empty() => {
                return Err(CodegenError::unsupported(step.name(), "no branches"))
            }
            Step::Apply(function) if !registry.has_function(*function) => {
                return Err(CodegenError::UnknownCustomSymbol {
                    symbol: function.symbol().to_owned(),
                })
            }
            _ => {}
        }
        for value in step_values(step) {
            validate_value(step.name(), value)?;
        }
        for predicate in step_predicates(step) {
            validate_predicate(step.name(), predicate, registry)?;
        }
        Ok(())
    })
}

fn step_values(step: &Step) -> Vec<&Value> {
    match step {
        Step::Property { value, .. } | Step::Constant(value) => vec![value],
        Step::Inject(values) => values.iter().collect(),
        _ => Vec::new(),
    }
}

fn step_predicates(step: &Step) -> Vec<&Predicate> {
    match step {
        Step::Has { predicate, .. } | Step::Is(predicate) => vec![predicate],
        Step::Choose {
            condition: ChooseCondition::Predicate(predicate),
            ..
        } => vec![predicate],
        _ => Vec::new(),
    }
}

fn validate_predicate(
    step: &'static str,
    predicate: &Predicate,
    registry: &Registry,
) -> Result<(), CodegenError> {
    match predicate {
        Predicate::Eq(v)
        | Predicate::Neq(v)
        | Predicate::Lt(v)
        | Predicate::Lte(v)
        | Predicate::Gt(v)
        | Predicate::Gte(v)
        | Predicate::Text(_, v) => validate_value(step, v),
        Predicate::Within(values) | Predicate::Without(values) => {
            values.iter().try_for_each(|v| validate_value(step, v))
        }
        Predicate::Custom(custom, argument) => {
            if !registry.has_predicate(*custom) {
                return Err(CodegenError::UnknownCustomSymbol {
                    symbol: custom.symbol().to_owned(),
                });
            }
            argument.iter().try_for_each(|v| validate_value(step, v))
        }
    }
}

fn validate_value(step: &'static str, value: &Value) -> Result<(), CodegenError> {
    match value {
        Value::Float(f) if !f.is_finite() => {
            Err(CodegenError::unsupported(step, format!("non-finite float {f}")))
        }
        Value::Parameter(name) if !is_identifier(name) => Err(CodegenError::unsupported(
            step,
            format!("'{name}' is not a valid binding identifier"),
        )),
        Value::List(items) => items.iter().try_for_each(|v| validate_value(step, v)),
        Value::Map(entries) => entries.iter().try_for_each(|(_, v)| validate_value(step, v)),
        _ => Ok(()),
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
