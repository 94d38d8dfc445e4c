//! Traversal over nested step sequences.

use std::mem;

use crate::ir::step::{ChooseCondition, Step, Traversal};

impl Step {
    /// Nested traversals held by this step, in argument order.
    pub fn traversals(&self) -> Vec<&Traversal> {
        match self {
            Step::PropertyFrom { value, .. } => vec![value],
            Step::Where(t)
            | Step::Not(t)
            | Step::SideEffect(t)
            | Step::Map(t)
            | Step::FlatMap(t) => vec![t],
            Step::And(ts) | Step::Or(ts) | Step::Coalesce(ts) | Step::Union(ts) => {
                ts.iter().collect()
            }
            Step::Choose {
                condition,
                then,
                otherwise,
            } => {
                let mut out = Vec::with_capacity(3);
                if let ChooseCondition::Traversal(t) = condition {
                    out.push(t);
                }
                out.push(then);
                out.push(otherwise);
                out
            }
            Step::Project(entries) => entries.iter().map(|(_, t)| t).collect(),
            Step::Order(keys) => keys.iter().map(|(t, _)| t).collect(),
            Step::Group { key, value } => vec![key, value],
            Step::V
            | Step::E
            | Step::AddV(_)
            | Step::AddE { .. }
            | Step::Property { .. }
            | Step::Drop
            | Step::OutE(_)
            | Step::InE(_)
            | Step::BothE(_)
            | Step::InV
            | Step::OutV
            | Step::OtherV
            | Step::Has { .. }
            | Step::HasLabel(_)
            | Step::HasNot(_)
            | Step::HasKey(_)
            | Step::Is(_)
            | Step::WhereLabel { .. }
            | Step::As(_)
            | Step::Select(_)
            | Step::SelectKey(_)
            | Step::SelectColumn(_)
            | Step::Constant(_)
            | Step::Inject(_)
            | Step::Id
            | Step::Label
            | Step::Values(_)
            | Step::ValueMap(_)
            | Step::Properties(_)
            | Step::Key
            | Step::Value
            | Step::Dedup
            | Step::Count(_)
            | Step::Fold
            | Step::Unfold
            | Step::Sum
            | Step::Mean
            | Step::Min
            | Step::Max
            | Step::Aggregate(_)
            | Step::Cap(_)
            | Step::Limit(_)
            | Step::Skip(_)
            | Step::Range(..)
            | Step::Barrier
            | Step::Apply(_)
            | Step::Identity => Vec::new(),
        }
    }

    /// Mutable access to nested traversals, same order as [`Step::traversals`].
    pub fn traversals_mut(&mut self) -> Vec<&mut Traversal> {
        match self {
            Step::PropertyFrom { value, .. } => vec![value],
            Step::Where(t)
            | Step::Not(t)
            | Step::SideEffect(t)
            | Step::Map(t)
            | Step::FlatMap(t) => vec![t],
            Step::And(ts) | Step::Or(ts) | Step::Coalesce(ts) | Step::Union(ts) => {
                ts.iter_mut().collect()
            }
            Step::Choose {
                condition,
                then,
                otherwise,
            } => {
                let mut out = Vec::with_capacity(3);
                if let ChooseCondition::Traversal(t) = condition {
                    out.push(t);
                }
                out.push(then);
                out.push(otherwise);
                out
            }
            Step::Project(entries) => entries.iter_mut().map(|(_, t)| t).collect(),
            Step::Order(keys) => keys.iter_mut().map(|(t, _)| t).collect(),
            Step::Group { key, value } => vec![key, value],
            Step::V
            | Step::E
            | Step::AddV(_)
            | Step::AddE { .. }
            | Step::Property { .. }
            | Step::Drop
            | Step::OutE(_)
            | Step::InE(_)
            | Step::BothE(_)
            | Step::InV
            | Step::OutV
            | Step::OtherV
            | Step::Has { .. }
            | Step::HasLabel(_)
            | Step::HasNot(_)
            | Step::HasKey(_)
            | Step::Is(_)
            | Step::WhereLabel { .. }
            | Step::As(_)
            | Step::Select(_)
            | Step::SelectKey(_)
            | Step::SelectColumn(_)
            | Step::Constant(_)
            | Step::Inject(_)
            | Step::Id
            | Step::Label
            | Step::Values(_)
            | Step::ValueMap(_)
            | Step::Properties(_)
            | Step::Key
            | Step::Value
            | Step::Dedup
            | Step::Count(_)
            | Step::Fold
            | Step::Unfold
            | Step::Sum
            | Step::Mean
            | Step::Min
            | Step::Max
            | Step::Aggregate(_)
            | Step::Cap(_)
            | Step::Limit(_)
            | Step::Skip(_)
            | Step::Range(..)
            | Step::Barrier
            | Step::Apply(_)
            | Step::Identity => Vec::new(),
        }
    }
}

impl Traversal {
    /// Visits every step, outer before inner, in evaluation order.
    pub fn walk<F: FnMut(&Step)>(&self, visit: &mut F) {
        for step in &self.0 {
            visit(step);
            for child in step.traversals() {
                child.walk(visit);
            }
        }
    }

    /// Like [`Traversal::walk`] but stops at the first error.
    pub fn try_walk<E, F: FnMut(&Step) -> Result<(), E>>(&self, visit: &mut F) -> Result<(), E> {
        for step in &self.0 {
            visit(step)?;
            for child in step.traversals() {
                child.try_walk(visit)?;
            }
        }
        Ok(())
    }

    /// Rewrites innermost traversals first, then this one.
    pub fn rewrite_bottom_up<F: FnMut(Traversal) -> Traversal>(mut self, rewrite: &mut F) -> Traversal {
        for step in &mut self.0 {
            for child in step.traversals_mut() {
                let inner = mem::take(child);
                *child = inner.rewrite_bottom_up(rewrite);
            }
        }
        rewrite(self)
    }

    /// Number of steps including nested ones.
    pub fn deep_len(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }
}
