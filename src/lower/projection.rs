//! RETURN, WITH and UNWIND.

use crate::ast::{Expr, Projection, ProjectionItem, SortItem};
use crate::error::TranslationError;
use crate::ir::{
    ChooseCondition, Column, ColumnKind, Label, OutputColumn, Predicate, Scope, SortOrder, Step,
    Token, Traversal, Value,
};
use crate::lower::expr::{node_tag_step, null_guarded, relationship_tag};
use crate::lower::{user_name, Lowering, Mode, VarInfo, VarKind};
use crate::value::Literal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Aggregate {
    Count,
    CountStar,
    Collect,
    Sum,
    Avg,
    Min,
    Max,
}

/// One projected column after star expansion.
struct Item {
    name: String,
    expr: Expr,
    aggregate: Option<(Aggregate, bool)>,
}

impl Lowering {
    pub(super) fn return_clause(
        &mut self,
        projection: &Projection,
    ) -> Result<Vec<OutputColumn>, TranslationError> {
        self.ensure_started();
        let items = self.expand(projection)?;
        let columns = items
            .iter()
            .map(|item| {
                let kind = match item.aggregate {
                    Some(_) => ColumnKind::Value,
                    None => self.column_kind(&item.expr),
                };
                OutputColumn::new(item.name.clone(), kind)
            })
            .collect();
        let steps = self.project(&items, Mode::Return)?;
        self.root.extend(steps);
        self.modifiers(projection, &items)?;
        Ok(columns)
    }

    pub(super) fn with(&mut self, projection: &Projection) -> Result<(), TranslationError> {
        self.ensure_started();
        let items = self.expand(projection)?;
        let aggregating = items.iter().any(|item| item.aggregate.is_some());
        let carried: Vec<(String, VarInfo)> = items
            .iter()
            .map(|item| {
                let (mut kind, nullable) = match item.aggregate {
                    Some(_) => (VarKind::Value, true),
                    None => self.carried_kind(&item.expr),
                };
                if aggregating && kind == VarKind::Path {
                    kind = VarKind::Value;
                }
                (item.name.clone(), VarInfo { kind, nullable })
            })
            .collect();
        let mut paths = std::collections::HashMap::new();
        if !aggregating {
            for item in &items {
                if let Expr::Variable(var) = &item.expr {
                    if let Some(shape) = self.paths.get(var) {
                        paths.insert(item.name.clone(), shape.clone());
                    }
                }
            }
        }

        let steps = self.project(&items, Mode::Raw)?;
        self.root.extend(steps);
        self.modifiers(projection, &items)?;

        let fresh = self.fresh_id();
        self.root.push(Step::As(fresh.clone()));
        for (name, _) in &carried {
            self.root.push(Step::Select(vec![fresh.clone()]));
            self.root.push(Step::SelectKey(Label::named(name)));
            self.root.push(Step::As(Label::named(name)));
        }
        self.scope = carried.into_iter().collect();
        self.paths = paths;

        if let Some(predicate) = &projection.predicate {
            let filter = self.filter(predicate)?;
            self.root.push(Step::Where(filter));
        }
        Ok(())
    }

    pub(super) fn unwind(&mut self, expr: &Expr, alias: &str) -> Result<(), TranslationError> {
        user_name(alias, "UNWIND alias")?;
        self.ensure_started();
        let list = self
            .value(expr, Mode::Raw)?
            .then(Step::Is(Predicate::Neq(Value::Token(Token::Null))))
            .then(Step::Unfold);
        self.root.push(Step::FlatMap(list));
        self.root.push(Step::As(Label::named(alias)));
        self.declare(alias, VarKind::Value, true);
        Ok(())
    }

    /// Expands `*`, names every column and classifies aggregates.
    fn expand(&self, projection: &Projection) -> Result<Vec<Item>, TranslationError> {
        let mut items = Vec::new();
        if projection.star {
            if self.scope.is_empty() {
                return Err(TranslationError::InvalidQuery {
                    reason: "`*` projection with no variables in scope",
                });
            }
            for name in self.scope.keys() {
                items.push(Item {
                    name: name.clone(),
                    expr: Expr::Variable(name.clone()),
                    aggregate: None,
                });
            }
        }
        for item in &projection.items {
            items.push(self.item(item)?);
        }
        if items.is_empty() {
            return Err(TranslationError::InvalidQuery {
                reason: "projection has no items",
            });
        }
        for (idx, item) in items.iter().enumerate() {
            if items[..idx].iter().any(|earlier| earlier.name == item.name) {
                return Err(TranslationError::InvalidArgument {
                    context: "projection",
                    reason: format!("duplicate column name '{}'", item.name),
                });
            }
        }
        Ok(items)
    }

    fn item(&self, item: &ProjectionItem) -> Result<Item, TranslationError> {
        let name = item.column_name();
        user_name(&name, "column name")?;
        let aggregate = match &item.expr {
            Expr::CountStar => Some((Aggregate::CountStar, false)),
            Expr::Function {
                name: function,
                distinct,
                args,
            } if crate::ast::is_aggregate_name(function) => {
                let kind = match function.to_ascii_lowercase().as_str() {
                    "count" => Aggregate::Count,
                    "collect" => Aggregate::Collect,
                    "sum" => Aggregate::Sum,
                    "avg" => Aggregate::Avg,
                    "min" => Aggregate::Min,
                    _ => Aggregate::Max,
                };
                match args.as_slice() {
                    [arg] if !arg.is_aggregate() => Some((kind, *distinct)),
                    [_] => {
                        return Err(TranslationError::unsupported(format!(
                            "nested aggregate `{}`",
                            item.expr
                        )))
                    }
                    _ => {
                        return Err(TranslationError::InvalidArgument {
                            context: "aggregate",
                            reason: format!("{function}() takes exactly one argument"),
                        })
                    }
                }
            }
            other if other.is_aggregate() => {
                return Err(TranslationError::unsupported(format!(
                    "aggregate inside expression `{other}`"
                )))
            }
            _ => None,
        };
        Ok(Item {
            name,
            expr: item.expr.clone(),
            aggregate,
        })
    }

    /// Projection steps producing one map per row (or per group).
    fn project(&mut self, items: &[Item], mode: Mode) -> Result<Traversal, TranslationError> {
        let aggregating = items.iter().any(|item| item.aggregate.is_some());
        if !aggregating {
            let mut entries = Vec::with_capacity(items.len());
            for item in items {
                entries.push((Label::named(&item.name), self.value(&item.expr, mode)?));
            }
            return Ok(Traversal::of([Step::Project(entries)]));
        }

        // Aggregate arguments are evaluated per row into a map keyed by a
        // generated label before the rows are folded.
        let mut inputs = Vec::new();
        let mut input_keys = Vec::with_capacity(items.len());
        for item in items {
            match (&item.aggregate, &item.expr) {
                (Some((Aggregate::CountStar, _)), _) | (None, _) => input_keys.push(None),
                (Some((kind, _)), Expr::Function { args, .. }) => {
                    let arg_mode = if *kind == Aggregate::Collect { mode } else { Mode::Raw };
                    let key = self.generated();
                    inputs.push((key.clone(), self.value(&args[0], arg_mode)?));
                    input_keys.push(Some(key));
                }
                (Some(_), other) => {
                    return Err(TranslationError::unsupported(format!("aggregate `{other}`")))
                }
            }
        }
        let rows = if inputs.is_empty() {
            Traversal::of([Step::Fold])
        } else {
            Traversal::of([Step::Project(inputs), Step::Fold])
        };

        let keys: Vec<&Item> = items.iter().filter(|item| item.aggregate.is_none()).collect();
        if keys.is_empty() {
            let mut entries = Vec::with_capacity(items.len());
            for (item, key) in items.iter().zip(&input_keys) {
                entries.push((Label::named(&item.name), finalize(item, key.as_ref())));
            }
            return Ok(rows.then(Step::Project(entries)));
        }

        let mut key_entries = Vec::with_capacity(keys.len());
        for item in &keys {
            if self.column_kind(&item.expr) == ColumnKind::Path {
                return Err(TranslationError::unsupported(
                    "path as a grouping key",
                ));
            }
            key_entries.push((Label::named(&item.name), self.value(&item.expr, Mode::Raw)?));
        }
        let mut entries = Vec::with_capacity(items.len());
        for (item, key) in items.iter().zip(&input_keys) {
            let column = match item.aggregate {
                Some(_) => Traversal::of([Step::SelectColumn(Column::Values)])
                    .append(finalize(item, key.as_ref())),
                None => {
                    let mut t = Traversal::of([
                        Step::SelectColumn(Column::Keys),
                        Step::SelectKey(Label::named(&item.name)),
                    ]);
                    if mode == Mode::Return {
                        if let Some(tag) = self.retag(&item.expr) {
                            t.push(tag);
                        }
                    }
                    t
                }
            };
            entries.push((Label::named(&item.name), column));
        }
        Ok(Traversal::of([
            Step::Group {
                key: Traversal::of([Step::Project(key_entries)]),
                value: rows,
            },
            Step::Unfold,
            Step::Project(entries),
        ]))
    }

    /// Tagging for a raw grouping key handed back to the caller.
    fn retag(&self, expr: &Expr) -> Option<Step> {
        match self.column_kind(expr) {
            ColumnKind::Node => Some(null_guarded(Traversal::of([node_tag_step()]))),
            ColumnKind::Relationship => Some(null_guarded(Traversal::of([relationship_tag(
                Token::ProjectionRelationship,
            )]))),
            ColumnKind::Id => Some(null_guarded(Traversal::of([Step::Project(vec![(
                Label::from(Token::ProjectionId),
                Traversal::of([Step::Identity]),
            )])]))),
            ColumnKind::Path | ColumnKind::Value => None,
        }
    }

    /// DISTINCT, ORDER BY, SKIP and LIMIT over projected maps.
    fn modifiers(&mut self, projection: &Projection, items: &[Item]) -> Result<(), TranslationError> {
        if projection.distinct {
            self.root.push(Step::Dedup);
        }
        if !projection.order_by.is_empty() {
            let aggregating = items.iter().any(|item| item.aggregate.is_some());
            // Every key is preceded by its null rank, so nulls sort last
            // ascending and first descending and never meet other types.
            let mut keys = Vec::with_capacity(projection.order_by.len() * 2);
            for sort in &projection.order_by {
                let key = self.sort_key(sort, items, aggregating)?;
                let order = sort_order(sort);
                keys.push((null_rank(key.clone()), order));
                keys.push((key, order));
            }
            self.root.push(Step::Order(keys));
        }
        let skip = bound(projection.skip.as_ref(), "SKIP")?;
        let limit = bound(projection.limit.as_ref(), "LIMIT")?;
        match (skip, limit) {
            (Some(skip), Some(limit)) => self.root.push(Step::Range(skip, skip.saturating_add(limit))),
            (Some(skip), None) => self.root.push(Step::Skip(skip)),
            (None, Some(limit)) => self.root.push(Step::Limit(limit)),
            (None, None) => {}
        }
        Ok(())
    }

    fn sort_key(
        &mut self,
        sort: &SortItem,
        items: &[Item],
        aggregating: bool,
    ) -> Result<Traversal, TranslationError> {
        let column = items.iter().find(|item| {
            item.expr == sort.expr
                || matches!(&sort.expr, Expr::Variable(name) if *name == item.name)
        });
        if let Some(item) = column {
            return Ok(Traversal::of([Step::SelectKey(Label::named(&item.name))]));
        }
        if aggregating {
            return Err(TranslationError::unsupported(format!(
                "ORDER BY `{}` not projected by an aggregating clause",
                sort.expr
            )));
        }
        self.value(&sort.expr, Mode::Raw)
    }
}

/// Aggregation over the folded per-row inputs.
fn finalize(item: &Item, key: Option<&Label>) -> Traversal {
    let Some((kind, distinct)) = item.aggregate else {
        return Traversal::new();
    };
    let Some(key) = key else {
        return Traversal::of([Step::Count(Scope::Local)]);
    };
    let mut values = Traversal::of([
        Step::Unfold,
        Step::SelectKey(key.clone()),
        Step::Is(Predicate::Neq(Value::Token(Token::Null))),
    ]);
    if distinct {
        values.push(Step::Dedup);
    }
    let with_default = |values: Traversal, step: Step, default: Value| {
        Traversal::of([Step::Coalesce(vec![
            values.then(step),
            Traversal::of([Step::Constant(default)]),
        ])])
    };
    match kind {
        Aggregate::Count => values.then(Step::Count(Scope::Global)),
        Aggregate::Collect => values.then(Step::Fold),
        Aggregate::Sum => with_default(values, Step::Sum, Value::Int(0)),
        Aggregate::Avg => with_default(values, Step::Mean, Value::Token(Token::Null)),
        Aggregate::Min => with_default(values, Step::Min, Value::Token(Token::Null)),
        Aggregate::Max => with_default(values, Step::Max, Value::Token(Token::Null)),
        Aggregate::CountStar => Traversal::of([Step::Count(Scope::Local)]),
    }
}

/// `1` for a null sort key, `0` otherwise.
fn null_rank(key: Traversal) -> Traversal {
    key.then(Step::Choose {
        condition: ChooseCondition::Predicate(Predicate::Eq(Value::Token(Token::Null))),
        then: Traversal::of([Step::Constant(Value::Int(1))]),
        otherwise: Traversal::of([Step::Constant(Value::Int(0))]),
    })
}

fn sort_order(sort: &SortItem) -> SortOrder {
    if sort.descending {
        SortOrder::Desc
    } else {
        SortOrder::Asc
    }
}

fn bound(expr: Option<&Expr>, clause: &'static str) -> Result<Option<u64>, TranslationError> {
    match expr {
        None => Ok(None),
        Some(Expr::Literal(Literal::Int(n))) => u64::try_from(*n)
            .map(Some)
            .map_err(|_| TranslationError::InvalidArgument {
                context: clause,
                reason: format!("{n} is negative"),
            }),
        Some(other) => Err(TranslationError::unsupported(format!(
            "non-literal {clause} `{other}`"
        ))),
    }
}
