//! Verification passes.

use std::collections::BTreeSet;

use crate::error::TranslationError;
use crate::flavor::Pass;
use crate::ir::{Predicate, Step, Traversal};

/// Rejects statements that reference any custom predicate or function.
pub const NO_CUSTOM_FUNCTIONS: Pass = Pass::Verify {
    name: "no_custom_functions",
    check: no_custom_functions,
};

fn no_custom_functions(traversal: &Traversal) -> Result<(), TranslationError> {
    let mut names = BTreeSet::new();
    traversal.walk(&mut |step| match step {
        Step::Apply(function) => {
            names.insert(function.name());
        }
        Step::Is(predicate) | Step::Has { predicate, .. } => {
            if let Predicate::Custom(custom, _) = predicate {
                names.insert(custom.name());
            }
        }
        Step::Choose { condition, .. } => {
            if let crate::ir::ChooseCondition::Predicate(Predicate::Custom(custom, _)) = condition {
                names.insert(custom.name());
            }
        }
        _ => {}
    });
    if names.is_empty() {
        return Ok(());
    }
    Err(TranslationError::UnsupportedCustomFunctions {
        names: names.into_iter().collect::<Vec<_>>().join(", "),
    })
}
