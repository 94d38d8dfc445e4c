//! Target flavors: ordered IR rewrite and verification passes.
//!
//! Traversal-level passes run on every nested traversal, innermost first.
//! Statement-level passes see the whole root traversal. The pipeline repeats
//! until the IR stops changing, so applying a flavor twice yields the same
//! statement as applying it once.

#![forbid(unsafe_code)]

pub mod rewrite;
pub mod verify;

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::ConfigError;
use crate::error::TranslationError;
use crate::ir::{check_labels, Statement, Traversal};

/// Rounds after which a still-changing pipeline is rejected.
const MAX_ROUNDS: usize = 8;

/// A single IR transformation or check.
#[derive(Clone, Copy)]
pub enum Pass {
    /// Pure rewrite.
    Rewrite {
        /// Name used in logs.
        name: &'static str,
        /// Rewrite function.
        apply: fn(Traversal) -> Traversal,
    },
    /// Check that leaves the IR untouched.
    Verify {
        /// Name used in logs.
        name: &'static str,
        /// Check function.
        check: fn(&Traversal) -> Result<(), TranslationError>,
    },
}

impl Pass {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Pass::Rewrite { name, .. } | Pass::Verify { name, .. } => name,
        }
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::Rewrite { name, .. } => write!(f, "Rewrite({name})"),
            Pass::Verify { name, .. } => write!(f, "Verify({name})"),
        }
    }
}

/// Built-in flavor names.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FlavorName {
    /// Gremlin Server with the custom function plugin.
    #[default]
    Gremlin,
    /// Azure Cosmos DB.
    Cosmosdb,
    /// Amazon Neptune.
    Neptune,
    /// No passes at all.
    Empty,
}

impl FlavorName {
    /// Every built-in flavor.
    pub const ALL: [FlavorName; 4] = [
        FlavorName::Gremlin,
        FlavorName::Cosmosdb,
        FlavorName::Neptune,
        FlavorName::Empty,
    ];

    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            FlavorName::Gremlin => "gremlin",
            FlavorName::Cosmosdb => "cosmosdb",
            FlavorName::Neptune => "neptune",
            FlavorName::Empty => "empty",
        }
    }

    /// One-line description shown by the CLI.
    pub fn describe(self) -> &'static str {
        match self {
            FlavorName::Gremlin => "Gremlin Server with the custom predicate and function plugin",
            FlavorName::Cosmosdb => "Cosmos DB: property access via properties(), native text predicates",
            FlavorName::Neptune => "Neptune: native text predicates, rejects custom functions",
            FlavorName::Empty => "no rewrites or checks",
        }
    }
}

impl fmt::Display for FlavorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlavorName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FlavorName::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownFlavor {
                name: s.to_owned(),
            })
    }
}

/// Ordered passes tailoring IR to one target.
#[derive(Clone, Debug)]
pub struct TranslatorFlavor {
    name: FlavorName,
    /// Passes run once over the root traversal.
    pub statement_passes: Vec<Pass>,
    /// Passes run over every nested traversal, innermost first.
    pub traversal_passes: Vec<Pass>,
}

impl TranslatorFlavor {
    /// Flavor with explicit pass lists.
    pub fn new(name: FlavorName, statement_passes: Vec<Pass>, traversal_passes: Vec<Pass>) -> Self {
        TranslatorFlavor {
            name,
            statement_passes,
            traversal_passes,
        }
    }

    /// Built-in flavor by name.
    pub fn named(name: FlavorName) -> Self {
        match name {
            FlavorName::Gremlin => TranslatorFlavor::gremlin(),
            FlavorName::Cosmosdb => TranslatorFlavor::cosmosdb(),
            FlavorName::Neptune => TranslatorFlavor::neptune(),
            FlavorName::Empty => TranslatorFlavor::empty(),
        }
    }

    /// Default flavor: cleanup rewrites only.
    pub fn gremlin() -> Self {
        TranslatorFlavor::new(
            FlavorName::Gremlin,
            vec![rewrite::REMOVE_UNUSED_ALIASES],
            vec![
                rewrite::REMOVE_IDENTITY_STEPS,
                rewrite::REMOVE_IMMEDIATE_RESELECT,
                rewrite::COLLAPSE_BARRIERS,
            ],
        )
    }

    /// Cosmos DB: no `values()` on vertices, text predicates instead of custom ones.
    pub fn cosmosdb() -> Self {
        TranslatorFlavor::new(
            FlavorName::Cosmosdb,
            vec![rewrite::REMOVE_UNUSED_ALIASES],
            vec![
                rewrite::REMOVE_IDENTITY_STEPS,
                rewrite::REMOVE_IMMEDIATE_RESELECT,
                rewrite::COLLAPSE_BARRIERS,
                rewrite::COSMOS_PROPERTY_ACCESS,
                rewrite::NATIVE_TEXT_PREDICATES,
            ],
        )
    }

    /// Neptune: no custom predicate or function support at all.
    pub fn neptune() -> Self {
        TranslatorFlavor::new(
            FlavorName::Neptune,
            vec![rewrite::REMOVE_UNUSED_ALIASES, verify::NO_CUSTOM_FUNCTIONS],
            vec![
                rewrite::REMOVE_IDENTITY_STEPS,
                rewrite::REMOVE_IMMEDIATE_RESELECT,
                rewrite::COLLAPSE_BARRIERS,
                rewrite::NATIVE_TEXT_PREDICATES,
            ],
        )
    }

    /// Passes nothing through unchanged.
    pub fn empty() -> Self {
        TranslatorFlavor::new(FlavorName::Empty, Vec::new(), Vec::new())
    }

    /// Flavor name.
    pub fn name(&self) -> FlavorName {
        self.name
    }

    /// Runs the pipeline to a fixed point and re-checks label scoping.
    pub fn apply(&self, statement: Statement) -> Result<Statement, TranslationError> {
        let Statement {
            mut traversal,
            columns,
        } = statement;
        let mut converged = false;
        for round in 0..MAX_ROUNDS {
            let before = traversal.clone();
            traversal = self.round(traversal)?;
            if traversal == before {
                trace!(flavor = %self.name, round, "pass pipeline converged");
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(flavor = %self.name, rounds = MAX_ROUNDS, "pass pipeline did not converge");
            return Err(TranslationError::NotConverged {
                flavor: self.name.to_string(),
                rounds: MAX_ROUNDS,
            });
        }
        check_labels(&traversal)?;
        debug!(flavor = %self.name, steps = traversal.deep_len(), "applied flavor");
        Ok(Statement { traversal, columns })
    }

    fn round(&self, mut traversal: Traversal) -> Result<Traversal, TranslationError> {
        for pass in &self.traversal_passes {
            traversal = match *pass {
                Pass::Rewrite { apply, .. } => traversal.rewrite_bottom_up(&mut |t| apply(t)),
                Pass::Verify { check, .. } => {
                    verify_nested(&traversal, check)?;
                    traversal
                }
            };
        }
        for pass in &self.statement_passes {
            traversal = match *pass {
                Pass::Rewrite { apply, .. } => apply(traversal),
                Pass::Verify { check, .. } => {
                    check(&traversal)?;
                    traversal
                }
            };
        }
        Ok(traversal)
    }
}

impl Default for TranslatorFlavor {
    fn default() -> Self {
        TranslatorFlavor::gremlin()
    }
}

/// Runs `check` on `traversal` and every traversal nested in it.
fn verify_nested(
    traversal: &Traversal,
    check: fn(&Traversal) -> Result<(), TranslationError>,
) -> Result<(), TranslationError> {
    check(traversal)?;
    for step in traversal.steps() {
        for child in step.traversals() {
            verify_nested(child, check)?;
        }
    }
    Ok(())
}
