//! Rewrite passes.

use std::collections::HashSet;

use crate::flavor::Pass;
use crate::ir::{Label, Predicate, Step, TextPredicate, Traversal};
use crate::registry::CustomPredicate;

/// Drops `identity()` steps.
pub const REMOVE_IDENTITY_STEPS: Pass = Pass::Rewrite {
    name: "remove_identity_steps",
    apply: remove_identity_steps,
};

/// Merges runs of `barrier()` and drops barriers before reducing steps.
pub const COLLAPSE_BARRIERS: Pass = Pass::Rewrite {
    name: "collapse_barriers",
    apply: collapse_barriers,
};

/// Drops `as()` of compiler labels nothing refers to.
pub const REMOVE_UNUSED_ALIASES: Pass = Pass::Rewrite {
    name: "remove_unused_aliases",
    apply: remove_unused_aliases,
};

/// Drops `select(x)` that directly follows `as(x)` on a graph element.
pub const REMOVE_IMMEDIATE_RESELECT: Pass = Pass::Rewrite {
    name: "remove_immediate_reselect",
    apply: remove_immediate_reselect,
};

/// Replaces `values(k)` with `properties(k).hasKey(k).value()`.
pub const COSMOS_PROPERTY_ACCESS: Pass = Pass::Rewrite {
    name: "cosmos_property_access",
    apply: cosmos_property_access,
};

/// Replaces custom string predicates with `TextP` equivalents.
pub const NATIVE_TEXT_PREDICATES: Pass = Pass::Rewrite {
    name: "native_text_predicates",
    apply: native_text_predicates,
};

fn remove_identity_steps(traversal: Traversal) -> Traversal {
    traversal
        .0
        .into_iter()
        .filter(|step| *step != Step::Identity)
        .collect()
}

fn collapse_barriers(traversal: Traversal) -> Traversal {
    let mut out: Vec<Step> = Vec::with_capacity(traversal.len());
    for step in traversal.0 {
        if matches!(out.last(), Some(Step::Barrier)) && reduces(&step) {
            out.pop();
        }
        out.push(step);
    }
    Traversal(out)
}

/// Steps that already consume their whole input before emitting.
fn reduces(step: &Step) -> bool {
    matches!(
        step,
        Step::Barrier | Step::Fold | Step::Order(_) | Step::Group { .. } | Step::Count(_)
    )
}

fn remove_unused_aliases(traversal: Traversal) -> Traversal {
    let mut referenced = HashSet::new();
    traversal.walk(&mut |step| match step {
        Step::Select(labels) => referenced.extend(labels.iter().cloned()),
        Step::WhereLabel { label, .. } => {
            referenced.insert(label.clone());
        }
        Step::AddE { from, to, .. } => {
            referenced.insert(from.clone());
            referenced.insert(to.clone());
        }
        _ => {}
    });
    traversal.rewrite_bottom_up(&mut |t: Traversal| {
        t.0.into_iter()
            .filter(|step| !matches!(step, Step::As(label) if unused(label, &referenced)))
            .collect()
    })
}

fn unused(label: &Label, referenced: &HashSet<Label>) -> bool {
    label.is_synthetic() && !referenced.contains(label)
}

fn remove_immediate_reselect(traversal: Traversal) -> Traversal {
    let mut out: Vec<Step> = Vec::with_capacity(traversal.len());
    for step in traversal.0 {
        if let Step::Select(labels) = &step {
            if let [.., before, Step::As(alias)] = out.as_slice() {
                if labels.len() == 1 && labels[0] == *alias && emits_element(before) {
                    continue;
                }
            }
        }
        out.push(step);
    }
    Traversal(out)
}

/// `select(x)` prefers a map key over a path label, so only elements qualify.
fn emits_element(step: &Step) -> bool {
    matches!(
        step,
        Step::V
            | Step::E
            | Step::AddV(_)
            | Step::AddE { .. }
            | Step::OutE(_)
            | Step::InE(_)
            | Step::BothE(_)
            | Step::InV
            | Step::OutV
            | Step::OtherV
            | Step::HasLabel(_)
    )
}

fn cosmos_property_access(traversal: Traversal) -> Traversal {
    let mut out = Vec::with_capacity(traversal.len());
    for step in traversal.0 {
        match step {
            Step::Values(keys) => {
                out.push(Step::Properties(keys.clone()));
                if let [key] = keys.as_slice() {
                    out.push(Step::HasKey(key.clone()));
                }
                out.push(Step::Value);
            }
            other => out.push(other),
        }
    }
    Traversal(out)
}

fn native_text_predicates(traversal: Traversal) -> Traversal {
    traversal
        .0
        .into_iter()
        .map(|step| match step {
            Step::Is(predicate) => Step::Is(text_predicate(predicate)),
            Step::Has { key, predicate } => Step::Has {
                key,
                predicate: text_predicate(predicate),
            },
            other => other,
        })
        .collect()
}

fn text_predicate(predicate: Predicate) -> Predicate {
    let native = |custom: CustomPredicate| match custom {
        CustomPredicate::StartsWith => Some(TextPredicate::StartingWith),
        CustomPredicate::EndsWith => Some(TextPredicate::EndingWith),
        CustomPredicate::Contains => Some(TextPredicate::Containing),
        CustomPredicate::IsNode | CustomPredicate::IsRelationship | CustomPredicate::IsString => {
            None
        }
    };
    match predicate {
        Predicate::Custom(custom, Some(argument)) => match native(custom) {
            Some(text) => Predicate::Text(text, argument),
            None => Predicate::Custom(custom, Some(argument)),
        },
        other => other,
    }
}
