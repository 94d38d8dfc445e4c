//! SET, REMOVE and DELETE.
//!
//! Deletions are staged: each DELETE aggregates its targets into a
//! side-effect bucket, and a single delete phase appended after the last
//! clause checks for still-connected nodes before anything is dropped.

use crate::ast::{Expr, PropertyRef, SetItem};
use crate::error::{TranslationError, DELETE_CONNECTED_NODE};
use crate::ir::{Label, LabelComparison, Predicate, Step, Token, Traversal, Value};
use crate::lower::{user_name, Lowering, Mode, VarKind};
use crate::registry::{CustomFunction, CustomPredicate};

impl Lowering {
    pub(super) fn set(&mut self, items: &[SetItem]) -> Result<(), TranslationError> {
        for item in items {
            let target = self.mutable_target(&item.var, "SET")?;
            user_name(&item.key, "property key")?;
            let write = match &item.value {
                Expr::Literal(literal) if literal.is_null() => {
                    Traversal::of([Step::Properties(vec![item.key.clone()]), Step::Drop])
                }
                Expr::Literal(literal) => Traversal::of([Step::Property {
                    key: item.key.clone(),
                    value: self.literal(literal)?,
                }]),
                Expr::Parameter(name) => {
                    user_name(name, "parameter")?;
                    Traversal::of([Step::Property {
                        key: item.key.clone(),
                        value: Value::Parameter(name.clone()),
                    }])
                }
                other => Traversal::of([Step::PropertyFrom {
                    key: item.key.clone(),
                    value: self.value(other, Mode::Raw)?,
                }]),
            };
            self.root.push(Step::SideEffect(target.append(write)));
        }
        Ok(())
    }

    pub(super) fn remove(&mut self, items: &[PropertyRef]) -> Result<(), TranslationError> {
        for item in items {
            let target = self.mutable_target(&item.var, "REMOVE")?;
            user_name(&item.key, "property key")?;
            self.root.push(Step::SideEffect(
                target
                    .then(Step::Properties(vec![item.key.clone()]))
                    .then(Step::Drop),
            ));
        }
        Ok(())
    }

    /// Selects the element a SET or REMOVE writes to. Null bindings write nothing.
    fn mutable_target(&self, var: &str, context: &'static str) -> Result<Traversal, TranslationError> {
        let info = self.lookup(var, context)?;
        match info.kind {
            VarKind::Node | VarKind::Relationship | VarKind::Value => Ok(self.select_bound(var, info)),
            kind => Err(TranslationError::InvalidArgument {
                context,
                reason: format!("variable '{var}' is a {kind:?}, not a graph element"),
            }),
        }
    }

    pub(super) fn delete(&mut self, detach: bool, targets: &[Expr]) -> Result<(), TranslationError> {
        for target in targets {
            let Expr::Variable(var) = target else {
                return Err(TranslationError::unsupported(format!("DELETE of `{target}`")));
            };
            match self.lookup(var, "DELETE")?.kind {
                VarKind::Node => self.stage(Label::named(var), detach),
                VarKind::Relationship => self.stage_relationship(Label::named(var)),
                VarKind::Path => {
                    let elements = self
                        .paths
                        .get(var)
                        .map(|shape| shape.elements.clone())
                        .ok_or_else(|| TranslationError::unknown_var(var, "DELETE"))?;
                    for (label, kind) in elements {
                        match kind {
                            VarKind::Relationship => self.stage_relationship(label),
                            _ => self.stage(label, detach),
                        }
                    }
                }
                VarKind::Value | VarKind::Map => self.stage_dynamic(Label::named(var), detach),
            }
        }
        Ok(())
    }

    fn bucket(&mut self, detach: bool) -> Label {
        if detach {
            self.deletes.detached = true;
            Label::from(Token::DetachDelete)
        } else {
            self.deletes.nodes = true;
            Label::from(Token::Delete)
        }
    }

    fn stage(&mut self, label: Label, detach: bool) {
        let bucket = self.bucket(detach);
        self.root.push(Step::SideEffect(Traversal::of([
            Step::Select(vec![label]),
            Step::Is(Predicate::Neq(Value::Token(Token::Null))),
            Step::Aggregate(bucket),
        ])));
    }

    fn stage_relationship(&mut self, label: Label) {
        self.stage(label, true);
    }

    /// Routes a value of unknown kind by testing it at run time.
    fn stage_dynamic(&mut self, label: Label, detach: bool) {
        let nodes = self.bucket(detach);
        let relationships = self.bucket(true);
        for (test, bucket) in [
            (CustomPredicate::IsNode, nodes),
            (CustomPredicate::IsRelationship, relationships),
        ] {
            self.root.push(Step::SideEffect(Traversal::of([
                Step::Select(vec![label.clone()]),
                Step::Is(Predicate::Custom(test, None)),
                Step::Aggregate(bucket),
            ])));
        }
    }

    /// Check-then-drop phase over the staged buckets.
    pub(super) fn delete_phase(&mut self, returns: bool) {
        let once = Label::from(Token::DeleteOnce);
        let delete = Label::from(Token::Delete);
        let detach = Label::from(Token::DetachDelete);
        self.root.push(Step::Fold);
        self.root.push(Step::As(once.clone()));

        if self.deletes.nodes {
            let mut check = Traversal::of([Step::Cap(delete.clone()), Step::Unfold, Step::Dedup]);
            let mut incident = Traversal::of([Step::BothE(Vec::new())]);
            if self.deletes.detached {
                let surviving = Step::WhereLabel {
                    comparison: LabelComparison::Without,
                    label: detach.clone(),
                };
                check.push(surviving.clone());
                incident.push(surviving.clone());
                incident.push(Step::OtherV);
                incident.push(surviving);
            }
            check.push(Step::Where(incident));
            check.push(Step::Constant(Value::String(DELETE_CONNECTED_NODE.to_owned())));
            check.push(Step::Apply(CustomFunction::Raise));
            self.root.push(Step::SideEffect(check));
        }
        if self.deletes.detached {
            self.root.push(Step::SideEffect(Traversal::of([
                Step::Cap(detach),
                Step::Unfold,
                Step::Dedup,
                Step::Drop,
            ])));
        }
        if self.deletes.nodes {
            self.root.push(Step::SideEffect(Traversal::of([
                Step::Cap(delete),
                Step::Unfold,
                Step::Dedup,
                Step::Drop,
            ])));
        }
        if returns {
            self.root.push(Step::Select(vec![once]));
            self.root.push(Step::Unfold);
        } else {
            self.root.push(Step::Limit(0));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{node, Direction, Expr, Pattern, QueryBuilder, RelPattern};
    use crate::ir::{Label, LabelComparison, Predicate, Step, Token, Traversal, Value};
    use crate::lower::lower;
    use crate::registry::CustomFunction;

    fn buckets(steps: &[Step]) -> Vec<Label> {
        steps
            .iter()
            .filter_map(|step| match step {
                Step::SideEffect(t) => t.0.iter().find_map(|s| match s {
                    Step::Aggregate(label) => Some(label.clone()),
                    _ => None,
                }),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn set_null_drops_the_property() {
        let query = QueryBuilder::new()
            .r#match([node("n")])
            .set("n", "age", Expr::lit(crate::value::Literal::Null))
            .set("n", "name", Expr::lit("marko"))
            .build()
            .expect("builder succeeds");
        let statement = lower(&query).expect("lowering succeeds");
        let steps = &statement.traversal.0;
        assert!(steps.contains(&Step::SideEffect(Traversal::of([
            Step::Select(vec![Label::named("n")]),
            Step::Properties(vec!["age".into()]),
            Step::Drop,
        ]))));
        assert!(steps.contains(&Step::SideEffect(Traversal::of([
            Step::Select(vec![Label::named("n")]),
            Step::Property {
                key: "name".into(),
                value: Value::String("marko".into()),
            },
        ]))));
    }

    #[test]
    fn optional_bindings_are_null_guarded_before_writes() {
        let query = QueryBuilder::new()
            .r#match([node("n")])
            .optional_match([Pattern::from(node("n")).out(RelPattern::new(Direction::Out), node("m"))])
            .remove("m", "age")
            .build()
            .expect("builder succeeds");
        let statement = lower(&query).expect("lowering succeeds");
        assert!(statement.traversal.0.contains(&Step::SideEffect(Traversal::of([
            Step::Select(vec![Label::named("m")]),
            Step::Is(Predicate::Neq(Value::Token(Token::Null))),
            Step::Properties(vec!["age".into()]),
            Step::Drop,
        ]))));
    }

    #[test]
    fn relationships_go_to_the_detach_bucket() {
        let query = QueryBuilder::new()
            .r#match([Pattern::from(node("a")).out(RelPattern::new(Direction::Out).var("r"), node("b"))])
            .delete(["r", "a"])
            .build()
            .expect("builder succeeds");
        let statement = lower(&query).expect("lowering succeeds");
        let steps = &statement.traversal.0;
        assert_eq!(
            buckets(steps),
            [Label::from(Token::DetachDelete), Label::from(Token::Delete)]
        );
        let check = steps
            .iter()
            .find_map(|s| match s {
                Step::SideEffect(t) if t.0.first() == Some(&Step::Cap(Label::from(Token::Delete))) => {
                    Some(t)
                }
                _ => None,
            })
            .expect("connected-node check");
        assert_eq!(check.0.last(), Some(&Step::Apply(CustomFunction::Raise)));
        assert!(check.0.contains(&Step::WhereLabel {
            comparison: LabelComparison::Without,
            label: Label::from(Token::DetachDelete),
        }));
        assert_eq!(steps.last(), Some(&Step::Limit(0)));
    }

    #[test]
    fn detach_delete_skips_the_connected_check() {
        let query = QueryBuilder::new()
            .r#match([node("n")])
            .detach_delete(["n"])
            .r#return([(Expr::CountStar, "deleted")])
            .build()
            .expect("builder succeeds");
        let statement = lower(&query).expect("lowering succeeds");
        let steps = &statement.traversal.0;
        let raises = |s: &Step| {
            matches!(s, Step::SideEffect(t) if t.0.contains(&Step::Apply(CustomFunction::Raise)))
        };
        assert!(!steps.iter().any(raises));
        assert_eq!(
            &steps[steps.len() - 2..],
            &[Step::Select(vec![Label::from(Token::DeleteOnce)]), Step::Unfold]
        );
        assert!(steps.contains(&Step::SideEffect(Traversal::of([
            Step::Select(vec![Label::named("n")]),
            Step::Is(Predicate::Neq(Value::Token(Token::Null))),
            Step::Aggregate(Label::from(Token::DetachDelete)),
        ]))));
    }
}
