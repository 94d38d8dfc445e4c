//! Target-agnostic traversal IR.
//!
//! A [`Statement`] is what lowering produces and what the flavor pipeline and
//! code generators consume: a root [`Traversal`] plus the output columns in
//! declaration order. Steps form a closed union ([`Step`]); every pass and
//! renderer matches it exhaustively, so adding a step is a compile error
//! everywhere it is not yet handled.

#![forbid(unsafe_code)]

pub mod step;
pub mod token;
mod visit;

use std::collections::HashSet;

pub use step::{
    ChooseCondition, Column, Label, LabelComparison, Predicate, Scope, SortOrder, Step,
    TextPredicate, Traversal, Value,
};
pub use token::Token;

use crate::error::TranslationError;

/// What a result column holds, as decided by lowering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Whole node.
    Node,
    /// Whole relationship.
    Relationship,
    /// Path value.
    Path,
    /// Bare element id.
    Id,
    /// Anything else: scalars, lists, maps.
    Value,
}

/// Named output column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputColumn {
    /// Column name as the caller sees it.
    pub name: String,
    /// Shape hint for the normalizer.
    pub kind: ColumnKind,
}

impl OutputColumn {
    /// Creates a column.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        OutputColumn {
            name: name.into(),
            kind,
        }
    }
}

/// Lowered query.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    /// Root traversal, starting from the traversal source.
    pub traversal: Traversal,
    /// Output columns in declaration order. Empty for write-only queries.
    pub columns: Vec<OutputColumn>,
}

/// Verifies that every label reference is preceded by its introduction.
///
/// Labels bound by `as()` are visible to later steps of the same traversal
/// and to traversals nested in those steps; labels bound inside a nested
/// traversal do not leak back out. Side-effect keys bound by `aggregate()`
/// are global once introduced.
pub fn check_labels(root: &Traversal) -> Result<(), TranslationError> {
    let mut side_effects = HashSet::new();
    check_scope(root, &HashSet::new(), &mut side_effects)
}

fn check_scope(
    traversal: &Traversal,
    outer: &HashSet<Label>,
    side_effects: &mut HashSet<Label>,
) -> Result<(), TranslationError> {
    let mut visible = outer.clone();
    for step in traversal.steps() {
        let referenced: Vec<&Label> = match step {
            Step::Select(labels) => labels.iter().collect(),
            Step::AddE { from, to, .. } => vec![from, to],
            Step::WhereLabel { label, .. } | Step::Cap(label) => vec![label],
            _ => Vec::new(),
        };
        for label in referenced {
            let known = match step {
                Step::Cap(_) => side_effects.contains(label),
                Step::WhereLabel { .. } => visible.contains(label) || side_effects.contains(label),
                _ => visible.contains(label),
            };
            if !known {
                return Err(TranslationError::UndefinedLabel {
                    label: label.encode(),
                });
            }
        }
        for child in step.traversals() {
            check_scope(child, &visible, side_effects)?;
        }
        match step {
            Step::As(label) => {
                visible.insert(label.clone());
            }
            Step::Aggregate(key) => {
                side_effects.insert(key.clone());
            }
            _ => {}
        }
    }
    Ok(())
}
