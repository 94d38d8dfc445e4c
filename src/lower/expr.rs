//! Expression lowering.
//!
//! [`Lowering::value`] produces a traversal that, run from the current row,
//! emits exactly one value (Cypher null is the `NULL` token).
//! [`Lowering::filter`] produces a traversal that emits iff the predicate
//! holds. Both are only ever embedded as child traversals, so reducing steps
//! inside them see a single row.

use crate::ast::{CompareOp, Expr, StringOp};
use crate::error::{TranslationError, INVALID_RANGE};
use crate::ir::{
    ChooseCondition, Column, ColumnKind, Label, LabelComparison, Predicate, Step, Token,
    Traversal, Value,
};
use crate::lower::{user_name, Lowering, Mode, VarKind};
use crate::registry::{CustomFunction, CustomPredicate};
use crate::value::Literal;

/// Upper bound on the number of elements a literal `range()` may produce.
pub(crate) const MAX_RANGE_ELEMENTS: i64 = 10_000;

impl Lowering {
    pub(super) fn value(&mut self, expr: &Expr, mode: Mode) -> Result<Traversal, TranslationError> {
        match expr {
            Expr::Literal(literal) => Ok(Traversal::of([Step::Constant(self.literal(literal)?)])),
            Expr::Parameter(name) => {
                user_name(name, "parameter")?;
                Ok(Traversal::of([Step::Constant(Value::Parameter(name.clone()))]))
            }
            Expr::Variable(var) => self.variable(var, mode),
            Expr::Property(base, key) => self.property(base, key),
            Expr::List(items) => {
                if let Some(values) = literal_items(items) {
                    let values = values
                        .into_iter()
                        .map(|literal| self.literal(literal))
                        .collect::<Result<_, _>>()?;
                    return Ok(Traversal::of([Step::Constant(Value::List(values))]));
                }
                if items.is_empty() {
                    return Ok(Traversal::of([Step::Constant(Value::List(Vec::new()))]));
                }
                let branches = items
                    .iter()
                    .map(|item| self.value(item, mode))
                    .collect::<Result<_, _>>()?;
                Ok(Traversal::of([Step::Union(branches), Step::Fold]))
            }
            Expr::Map(entries) => {
                if entries.is_empty() {
                    return Ok(Traversal::of([Step::Constant(Value::Map(Vec::new()))]));
                }
                let mut projected = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    user_name(key, "map key")?;
                    projected.push((Label::named(key), self.value(value, mode)?));
                }
                Ok(Traversal::of([Step::Project(projected)]))
            }
            Expr::Not(_)
            | Expr::And(..)
            | Expr::Or(..)
            | Expr::Xor(..)
            | Expr::Compare(..)
            | Expr::StringMatch(..)
            | Expr::IsNull(_)
            | Expr::IsNotNull(_)
            | Expr::In(..)
            | Expr::HasLabels(..)
            | Expr::Pattern(_) => {
                let condition = self.filter(expr)?;
                Ok(Traversal::of([Step::Choose {
                    condition: ChooseCondition::Traversal(condition),
                    then: Traversal::of([Step::Constant(Value::Bool(true))]),
                    otherwise: Traversal::of([Step::Constant(Value::Bool(false))]),
                }]))
            }
            Expr::Arithmetic(..) => Err(TranslationError::unsupported(format!(
                "arithmetic expression `{expr}`"
            ))),
            Expr::Function {
                name,
                distinct: _,
                args,
            } => self.function(name, args, mode),
            Expr::CountStar => Err(TranslationError::unsupported(
                "count(*) outside of a projection",
            )),
        }
    }

    fn variable(&mut self, var: &str, mode: Mode) -> Result<Traversal, TranslationError> {
        let info = self.lookup(var, "expression")?;
        let select = Step::Select(vec![Label::named(var)]);
        Ok(match (info.kind, mode) {
            (VarKind::Node, Mode::Return) => Traversal::of([select, null_guarded(node_tag())]),
            (VarKind::Relationship, Mode::Return) => {
                Traversal::of([select, null_guarded(Traversal::of([relationship_tag(
                    Token::ProjectionRelationship,
                )]))])
            }
            (VarKind::Path, _) => self.path_value(var, mode)?,
            _ => Traversal::of([select]),
        })
    }

    /// `base.key`, null when the base is null or the key is missing.
    fn property(&mut self, base: &Expr, key: &str) -> Result<Traversal, TranslationError> {
        user_name(key, "property key")?;
        let map_like = match base {
            Expr::Variable(var) => self.lookup(var, "property access")?.kind == VarKind::Map,
            Expr::Map(_) => true,
            _ => false,
        };
        let access = if map_like {
            Step::SelectKey(Label::named(key))
        } else {
            Step::Values(vec![key.to_owned()])
        };
        Ok(self.value(base, Mode::Raw)?.then(null_guarded(Traversal::of([
            Step::Coalesce(vec![
                Traversal::of([access]),
                Traversal::of([Step::Constant(Value::Token(Token::Null))]),
            ]),
        ]))))
    }

    fn function(&mut self, name: &str, args: &[Expr], mode: Mode) -> Result<Traversal, TranslationError> {
        let lowered = name.to_ascii_lowercase();
        if crate::ast::is_aggregate_name(&lowered) {
            return Err(TranslationError::unsupported(format!(
                "aggregate function {name}() in this position"
            )));
        }
        match lowered.as_str() {
            "coalesce" => {
                if args.is_empty() {
                    return Err(arity(name, "at least one"));
                }
                let mut branches = Vec::with_capacity(args.len() + 1);
                for arg in args {
                    branches.push(
                        self.value(arg, mode)?
                            .then(Step::Is(Predicate::Neq(Value::Token(Token::Null)))),
                    );
                }
                branches.push(Traversal::of([Step::Constant(Value::Token(Token::Null))]));
                return Ok(Traversal::of([Step::Coalesce(branches)]));
            }
            "range" => return self.range(args),
            _ => {}
        }
        let [arg] = args else {
            return Err(arity(name, "exactly one"));
        };
        match lowered.as_str() {
            "id" => {
                let inner = match mode {
                    Mode::Return => Traversal::of([Step::Project(vec![(
                        Label::from(Token::ProjectionId),
                        Traversal::of([Step::Id]),
                    )])]),
                    Mode::Raw => Traversal::of([Step::Id]),
                };
                Ok(self.value(arg, Mode::Raw)?.then(null_guarded(inner)))
            }
            "labels" => Ok(self
                .value(arg, Mode::Raw)?
                .then(null_guarded(Traversal::of([Step::Label, Step::Fold])))),
            "type" => Ok(self
                .value(arg, Mode::Raw)?
                .then(null_guarded(Traversal::of([Step::Label])))),
            "keys" => {
                let inner = if self.is_map_expr(arg)? {
                    Traversal::of([Step::SelectColumn(Column::Keys)])
                } else {
                    Traversal::of([Step::Properties(Vec::new()), Step::Key, Step::Dedup, Step::Fold])
                };
                Ok(self.value(arg, Mode::Raw)?.then(null_guarded(inner)))
            }
            "startnode" | "endnode" => {
                let mut inner = Traversal::of([if lowered == "startnode" {
                    Step::OutV
                } else {
                    Step::InV
                }]);
                if mode == Mode::Return {
                    inner.push(node_tag_step());
                }
                Ok(self.value(arg, Mode::Raw)?.then(null_guarded(inner)))
            }
            "nodes" | "relationships" => {
                let var = self.path_argument(name, arg)?;
                let want = if lowered == "nodes" {
                    VarKind::Node
                } else {
                    VarKind::Relationship
                };
                let shape = self
                    .paths
                    .get(var)
                    .ok_or_else(|| TranslationError::unknown_var(var, "path function"))?;
                let branches = shape
                    .elements
                    .iter()
                    .filter(|(_, kind)| *kind == want)
                    .map(|(label, kind)| {
                        let mut branch = Traversal::of([Step::Select(vec![label.clone()])]);
                        if mode == Mode::Return {
                            branch.push(match kind {
                                VarKind::Node => node_tag_step(),
                                _ => relationship_tag(Token::ProjectionRelationship),
                            });
                        }
                        branch
                    })
                    .collect::<Vec<_>>();
                if branches.is_empty() {
                    return Ok(Traversal::of([Step::Constant(Value::List(Vec::new()))]));
                }
                Ok(Traversal::of([Step::Union(branches), Step::Fold]))
            }
            "length" if self.is_path_expr(arg) => {
                let var = self.path_argument(name, arg)?;
                let hops = self
                    .paths
                    .get(var)
                    .map(|shape| shape.hops())
                    .ok_or_else(|| TranslationError::unknown_var(var, "path function"))?;
                Ok(Traversal::of([Step::Constant(Value::Int(hops as i64))]))
            }
            "exists" => {
                let Expr::Property(base, key) = arg else {
                    return Err(TranslationError::unsupported(format!(
                        "exists() over `{arg}`"
                    )));
                };
                user_name(key, "property key")?;
                let probe = if self.is_map_expr(base)? {
                    Step::SelectKey(Label::named(key))
                } else {
                    Step::Values(vec![key.clone()])
                };
                Ok(self.value(base, Mode::Raw)?.then(Step::Choose {
                    condition: ChooseCondition::Predicate(Predicate::Neq(Value::Token(Token::Null))),
                    then: Traversal::of([Step::Choose {
                        condition: ChooseCondition::Traversal(Traversal::of([probe])),
                        then: Traversal::of([Step::Constant(Value::Bool(true))]),
                        otherwise: Traversal::of([Step::Constant(Value::Bool(false))]),
                    }]),
                    otherwise: Traversal::of([Step::Constant(Value::Token(Token::Null))]),
                }))
            }
            _ => match CustomFunction::from_cypher_name(name) {
                Some(function) => Ok(self
                    .value(arg, Mode::Raw)?
                    .then(null_guarded(Traversal::of([Step::Apply(function)])))),
                None => Err(TranslationError::unsupported(format!("function {name}()"))),
            },
        }
    }

    /// `range()` over integer literals, folded at translation time.
    fn range(&self, args: &[Expr]) -> Result<Traversal, TranslationError> {
        let bounds: Option<Vec<i64>> = args
            .iter()
            .map(|arg| match arg {
                Expr::Literal(literal) => literal.as_int(),
                _ => None,
            })
            .collect();
        let (start, end, step) = match bounds.as_deref() {
            Some([start, end]) => (*start, *end, 1),
            Some([start, end, step]) => (*start, *end, *step),
            Some(_) => return Err(arity("range", "two or three")),
            None => {
                return Err(TranslationError::unsupported(
                    "range() with non-literal arguments",
                ))
            }
        };
        let count = range_len(start, end, step);
        match count {
            Some(count) if count <= MAX_RANGE_ELEMENTS => {
                let values = (0..count).map(|i| Value::Int(start + i * step)).collect();
                Ok(Traversal::of([Step::Constant(Value::List(values))]))
            }
            _ => Ok(Traversal::of([
                Step::Constant(Value::String(INVALID_RANGE.to_owned())),
                Step::Apply(CustomFunction::Raise),
            ])),
        }
    }

    /// Traversal that emits iff `expr` evaluates to true.
    pub(super) fn filter(&mut self, expr: &Expr) -> Result<Traversal, TranslationError> {
        match expr {
            Expr::And(..) => {
                let mut conjuncts = Vec::new();
                flatten(expr, &mut conjuncts, |e| match e {
                    Expr::And(l, r) => Some((l.as_ref(), r.as_ref())),
                    _ => None,
                });
                let branches = conjuncts
                    .into_iter()
                    .map(|e| self.filter(e))
                    .collect::<Result<_, _>>()?;
                Ok(Traversal::of([Step::And(branches)]))
            }
            Expr::Or(..) => {
                let mut disjuncts = Vec::new();
                flatten(expr, &mut disjuncts, |e| match e {
                    Expr::Or(l, r) => Some((l.as_ref(), r.as_ref())),
                    _ => None,
                });
                let branches = disjuncts
                    .into_iter()
                    .map(|e| self.filter(e))
                    .collect::<Result<_, _>>()?;
                Ok(Traversal::of([Step::Or(branches)]))
            }
            Expr::Not(inner) => Ok(Traversal::of([Step::Not(self.filter(inner)?)])),
            Expr::Xor(..) => Err(TranslationError::unsupported(format!("XOR in `{expr}`"))),
            Expr::Compare(op, left, right) => self.comparison(*op, left, right),
            Expr::StringMatch(op, left, right) => {
                let argument = match right.as_ref() {
                    Expr::Literal(Literal::String(s)) => {
                        user_name(s, "string literal")?;
                        Value::String(s.clone())
                    }
                    Expr::Parameter(name) => {
                        user_name(name, "parameter")?;
                        Value::Parameter(name.clone())
                    }
                    other => {
                        return Err(TranslationError::unsupported(format!(
                            "non-literal string operand `{other}`"
                        )))
                    }
                };
                let predicate = match op {
                    StringOp::StartsWith => CustomPredicate::StartsWith,
                    StringOp::EndsWith => CustomPredicate::EndsWith,
                    StringOp::Contains => CustomPredicate::Contains,
                };
                Ok(self
                    .operand(left)?
                    .then(Step::Is(Predicate::Custom(predicate, Some(argument)))))
            }
            Expr::IsNull(inner) => Ok(self
                .value(inner, Mode::Raw)?
                .then(Step::Is(Predicate::Eq(Value::Token(Token::Null))))),
            Expr::IsNotNull(inner) => Ok(self
                .value(inner, Mode::Raw)?
                .then(Step::Is(Predicate::Neq(Value::Token(Token::Null))))),
            Expr::In(item, list) => {
                let candidates = match list.as_ref() {
                    Expr::Literal(Literal::List(items)) => items
                        .iter()
                        .map(|item| self.literal(item))
                        .collect::<Result<_, _>>()?,
                    Expr::List(items) => match literal_items(items) {
                        Some(items) => items
                            .into_iter()
                            .map(|item| self.literal(item))
                            .collect::<Result<_, _>>()?,
                        None => {
                            return Err(TranslationError::unsupported(format!(
                                "IN over non-literal list `{list}`"
                            )))
                        }
                    },
                    Expr::Parameter(name) => {
                        user_name(name, "parameter")?;
                        vec![Value::Parameter(name.clone())]
                    }
                    other => {
                        return Err(TranslationError::unsupported(format!(
                            "IN over `{other}`"
                        )))
                    }
                };
                Ok(self
                    .operand(item)?
                    .then(Step::Is(Predicate::Within(candidates))))
            }
            Expr::HasLabels(var, labels) => {
                self.lookup(var, "label predicate")?;
                let mut steps = Traversal::of([Step::Select(vec![Label::named(var)])]);
                for label in labels {
                    user_name(label, "node label")?;
                    steps.push(Step::HasLabel(vec![label.clone()]));
                }
                Ok(steps)
            }
            Expr::Pattern(pattern) => self.pattern_filter(pattern),
            Expr::Literal(Literal::Bool(true)) => Ok(Traversal::of([Step::Identity])),
            Expr::Literal(Literal::Bool(false) | Literal::Null) => {
                Ok(Traversal::of([Step::Not(Traversal::of([Step::Identity]))]))
            }
            other => Ok(self
                .value(other, Mode::Raw)?
                .then(Step::Is(Predicate::Eq(Value::Bool(true))))),
        }
    }

    fn comparison(&mut self, op: CompareOp, left: &Expr, right: &Expr) -> Result<Traversal, TranslationError> {
        if matches!(left, Expr::Literal(Literal::Null)) || matches!(right, Expr::Literal(Literal::Null)) {
            return Ok(Traversal::of([Step::Not(Traversal::of([Step::Identity]))]));
        }
        if let Some(value) = self.constant(right)? {
            return Ok(self.operand(left)?.then(Step::Is(compare(op, value))));
        }
        if let Some(value) = self.constant(left)? {
            return Ok(self.operand(right)?.then(Step::Is(compare(op.flipped(), value))));
        }
        let temp = self.generated();
        let comparison = match op {
            CompareOp::Eq => LabelComparison::Eq,
            CompareOp::Neq => LabelComparison::Neq,
            CompareOp::Lt => LabelComparison::Lt,
            CompareOp::Lte => LabelComparison::Lte,
            CompareOp::Gt => LabelComparison::Gt,
            CompareOp::Gte => LabelComparison::Gte,
        };
        Ok(self
            .operand(right)?
            .then(Step::As(temp.clone()))
            .append(self.operand(left)?)
            .then(Step::WhereLabel {
                comparison,
                label: temp,
            }))
    }

    fn constant(&self, expr: &Expr) -> Result<Option<Value>, TranslationError> {
        match expr {
            Expr::Literal(literal) => self.literal(literal).map(Some),
            Expr::Parameter(name) => {
                user_name(name, "parameter")?;
                Ok(Some(Value::Parameter(name.clone())))
            }
            _ => Ok(None),
        }
    }

    /// Non-null value of `expr`, shaped for a following `is()` test.
    fn operand(&mut self, expr: &Expr) -> Result<Traversal, TranslationError> {
        if let Expr::Property(base, key) = expr {
            if let Expr::Variable(var) = base.as_ref() {
                let info = self.lookup(var, "predicate")?;
                user_name(key, "property key")?;
                let access = match info.kind {
                    VarKind::Node | VarKind::Relationship => Some(Step::Values(vec![key.clone()])),
                    VarKind::Map => Some(Step::SelectKey(Label::named(key))),
                    VarKind::Path | VarKind::Value => None,
                };
                if let Some(access) = access {
                    let mut steps = Traversal::of([Step::Select(vec![Label::named(var)])]);
                    if info.nullable {
                        steps.push(Step::Is(Predicate::Neq(Value::Token(Token::Null))));
                    }
                    steps.push(access);
                    return Ok(steps);
                }
            }
        }
        Ok(self
            .value(expr, Mode::Raw)?
            .then(Step::Is(Predicate::Neq(Value::Token(Token::Null)))))
    }

    fn path_argument<'e>(&self, name: &str, arg: &'e Expr) -> Result<&'e str, TranslationError> {
        match arg {
            Expr::Variable(var) if self.lookup(var, "path function")?.kind == VarKind::Path => Ok(var),
            _ => Err(TranslationError::InvalidArgument {
                context: "path function",
                reason: format!("{name}() expects a path variable, got `{arg}`"),
            }),
        }
    }

    fn is_path_expr(&self, expr: &Expr) -> bool {
        matches!(expr, Expr::Variable(var) if self.scope.get(var).map(|i| i.kind) == Some(VarKind::Path))
    }

    fn is_map_expr(&self, expr: &Expr) -> Result<bool, TranslationError> {
        Ok(match expr {
            Expr::Variable(var) => self.lookup(var, "expression")?.kind == VarKind::Map,
            Expr::Map(_) | Expr::Literal(Literal::Map(_)) => true,
            _ => false,
        })
    }

    /// Path as a list of marker-tagged elements (return mode) or raw elements.
    pub(super) fn path_value(&self, var: &str, mode: Mode) -> Result<Traversal, TranslationError> {
        let shape = self
            .paths
            .get(var)
            .ok_or_else(|| TranslationError::unknown_var(var, "path"))?;
        let branches = shape
            .elements
            .iter()
            .enumerate()
            .map(|(idx, (label, kind))| {
                let mut branch = Traversal::of([Step::Select(vec![label.clone()])]);
                if mode == Mode::Return {
                    branch.push(match (idx, label, kind) {
                        (0, Label::Synthetic(token), _) => Step::Project(vec![(
                            Label::from(token.clone()),
                            Traversal::of([Step::ValueMap(true)]),
                        )]),
                        (_, Label::Synthetic(token @ Token::PathEdge(_)), _) => {
                            relationship_tag(token.clone())
                        }
                        (_, _, VarKind::Relationship) => {
                            relationship_tag(Token::ProjectionRelationship)
                        }
                        _ => node_tag_step(),
                    });
                }
                branch
            })
            .collect();
        Ok(Traversal::of([Step::Union(branches), Step::Fold]))
    }

    /// Result column kind for a projected expression.
    pub(super) fn column_kind(&self, expr: &Expr) -> ColumnKind {
        match expr {
            Expr::Variable(var) => match self.scope.get(var).map(|info| info.kind) {
                Some(VarKind::Node) => ColumnKind::Node,
                Some(VarKind::Relationship) => ColumnKind::Relationship,
                Some(VarKind::Path) => ColumnKind::Path,
                _ => ColumnKind::Value,
            },
            Expr::Function { name, .. } => match name.to_ascii_lowercase().as_str() {
                "id" => ColumnKind::Id,
                "startnode" | "endnode" => ColumnKind::Node,
                _ => ColumnKind::Value,
            },
            _ => ColumnKind::Value,
        }
    }

    /// Variable kind a WITH alias inherits from its expression.
    pub(super) fn carried_kind(&self, expr: &Expr) -> (VarKind, bool) {
        match expr {
            Expr::Variable(var) => match self.scope.get(var) {
                Some(info) => (info.kind, info.nullable),
                None => (VarKind::Value, true),
            },
            Expr::Map(_) | Expr::Literal(Literal::Map(_)) => (VarKind::Map, false),
            Expr::Function { name, .. } => match name.to_ascii_lowercase().as_str() {
                "startnode" | "endnode" => (VarKind::Node, true),
                "properties" => (VarKind::Map, true),
                _ => (VarKind::Value, true),
            },
            _ => (VarKind::Value, true),
        }
    }
}

/// `project(ELEMENT).by(valueMap(true))`
pub(super) fn node_tag_step() -> Step {
    Step::Project(vec![(
        Label::from(Token::ProjectionElement),
        Traversal::of([Step::ValueMap(true)]),
    )])
}

pub(super) fn node_tag() -> Traversal {
    Traversal::of([node_tag_step()])
}

/// `project(key, INV, OUTV).by(valueMap(true)).by(inV().id()).by(outV().id())`
pub(super) fn relationship_tag(key: Token) -> Step {
    Step::Project(vec![
        (Label::from(key), Traversal::of([Step::ValueMap(true)])),
        (
            Label::from(Token::ProjectionInv),
            Traversal::of([Step::InV, Step::Id]),
        ),
        (
            Label::from(Token::ProjectionOutv),
            Traversal::of([Step::OutV, Step::Id]),
        ),
    ])
}

/// `choose(neq(NULL), inner, constant(NULL))`
pub(super) fn null_guarded(inner: Traversal) -> Step {
    Step::Choose {
        condition: ChooseCondition::Predicate(Predicate::Neq(Value::Token(Token::Null))),
        then: inner,
        otherwise: Traversal::of([Step::Constant(Value::Token(Token::Null))]),
    }
}

fn compare(op: CompareOp, value: Value) -> Predicate {
    match op {
        CompareOp::Eq => Predicate::Eq(value),
        CompareOp::Neq => Predicate::Neq(value),
        CompareOp::Lt => Predicate::Lt(value),
        CompareOp::Lte => Predicate::Lte(value),
        CompareOp::Gt => Predicate::Gt(value),
        CompareOp::Gte => Predicate::Gte(value),
    }
}

fn literal_items(items: &[Expr]) -> Option<Vec<&Literal>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| match item {
            Expr::Literal(literal) => Some(literal),
            _ => None,
        })
        .collect()
}

fn flatten<'e>(
    expr: &'e Expr,
    out: &mut Vec<&'e Expr>,
    split: impl Fn(&'e Expr) -> Option<(&'e Expr, &'e Expr)> + Copy,
) {
    match split(expr) {
        Some((left, right)) => {
            flatten(left, out, split);
            flatten(right, out, split);
        }
        None => out.push(expr),
    }
}

fn arity(function: &str, expected: &str) -> TranslationError {
    TranslationError::InvalidArgument {
        context: "function call",
        reason: format!("{function}() takes {expected} argument(s)"),
    }
}

/// Element count of `range(start, end, step)`, `None` when the step is zero.
fn range_len(start: i64, end: i64, step: i64) -> Option<i64> {
    if step == 0 {
        return None;
    }
    if (step > 0 && start > end) || (step < 0 && start < end) {
        return Some(0);
    }
    let span = (end as i128 - start as i128) / step as i128 + 1;
    i64::try_from(span).ok()
}
