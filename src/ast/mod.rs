//! Cypher abstract syntax tree consumed by the lowering stage.
//!
//! Queries arrive already parsed and validated by an external front end.
//! The structures mirror Cypher's clause and expression grammar closely
//! enough that every construct the lowering understands has a direct home,
//! while anything else can still be represented and rejected by name.

#![forbid(unsafe_code)]

pub mod builder;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Literal;

pub use builder::{node, QueryBuilder};

/// A complete single-part or multi-part Cypher query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Clauses in source order.
    pub clauses: Vec<Clause>,
}

/// Top-level Cypher clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Clause {
    /// `MATCH` or `OPTIONAL MATCH`.
    Match(MatchClause),
    /// `UNWIND expr AS alias`.
    Unwind {
        /// List-valued expression.
        expr: Expr,
        /// Variable bound to each element.
        alias: String,
    },
    /// `WITH` projection.
    With(Projection),
    /// `RETURN` projection.
    Return(Projection),
    /// `CREATE` of one or more patterns.
    Create {
        /// Patterns to create.
        patterns: Vec<Pattern>,
    },
    /// `MERGE` of a single pattern.
    Merge {
        /// Pattern to match or create.
        pattern: Pattern,
    },
    /// `SET v.key = expr, ...`.
    Set {
        /// Assignments in source order.
        items: Vec<SetItem>,
    },
    /// `REMOVE v.key, ...`.
    Remove {
        /// Properties to remove.
        items: Vec<PropertyRef>,
    },
    /// `DELETE` or `DETACH DELETE`.
    Delete {
        /// Whether relationships are removed along with nodes.
        detach: bool,
        /// Deleted expressions.
        targets: Vec<Expr>,
    },
}

/// `MATCH` clause body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchClause {
    /// `OPTIONAL MATCH` when set.
    #[serde(default)]
    pub optional: bool,
    /// Comma-separated patterns.
    pub patterns: Vec<Pattern>,
    /// Trailing `WHERE` predicate.
    #[serde(default, rename = "where")]
    pub predicate: Option<Expr>,
}

/// A path pattern: a start node followed by relationship hops.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Named path variable (`p = (a)-->(b)`).
    #[serde(default)]
    pub path: Option<String>,
    /// First node of the chain.
    pub start: NodePattern,
    /// Relationship and node pairs following the start node.
    #[serde(default)]
    pub hops: Vec<Hop>,
}

/// One `-[rel]->(node)` step of a pattern chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    /// Relationship pattern.
    pub rel: RelPattern,
    /// Node reached by the relationship.
    pub node: NodePattern,
}

/// `(var:Label {key: value})`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePattern {
    /// Bound variable, anonymous when absent.
    #[serde(default)]
    pub var: Option<String>,
    /// Required labels.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Inline property constraints.
    #[serde(default)]
    pub properties: Vec<(String, Expr)>,
}

/// `-[var:TYPE|OTHER {key: value}]->`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelPattern {
    /// Bound variable, anonymous when absent.
    #[serde(default)]
    pub var: Option<String>,
    /// Alternative relationship types.
    #[serde(default)]
    pub types: Vec<String>,
    /// Pattern direction relative to the preceding node.
    #[serde(default)]
    pub direction: Direction,
    /// Inline property constraints.
    #[serde(default)]
    pub properties: Vec<(String, Expr)>,
    /// Variable-length bounds (`*1..3`).
    #[serde(default)]
    pub length: Option<VarLength>,
}

/// Relationship direction as written in the pattern.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `-->`
    #[default]
    Out,
    /// `<--`
    In,
    /// `--`
    Both,
}

/// Variable-length relationship bounds.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VarLength {
    /// Minimum hop count.
    pub min: Option<u32>,
    /// Maximum hop count.
    pub max: Option<u32>,
}

/// Shared body of `WITH` and `RETURN`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// `DISTINCT` modifier.
    #[serde(default)]
    pub distinct: bool,
    /// `*` projection of every visible variable.
    #[serde(default)]
    pub star: bool,
    /// Projected items.
    #[serde(default)]
    pub items: Vec<ProjectionItem>,
    /// `ORDER BY` items.
    #[serde(default)]
    pub order_by: Vec<SortItem>,
    /// `SKIP` expression.
    #[serde(default)]
    pub skip: Option<Expr>,
    /// `LIMIT` expression.
    #[serde(default)]
    pub limit: Option<Expr>,
    /// `WHERE` following a `WITH`.
    #[serde(default, rename = "where")]
    pub predicate: Option<Expr>,
}

/// `expr [AS alias]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectionItem {
    /// Projected expression.
    pub expr: Expr,
    /// Explicit alias.
    #[serde(default)]
    pub alias: Option<String>,
}

impl ProjectionItem {
    /// Column name: the alias, or the expression's Cypher text.
    pub fn column_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => self.expr.to_string(),
        }
    }
}

/// `ORDER BY expr [DESC]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortItem {
    /// Sort key.
    pub expr: Expr,
    /// Descending order.
    #[serde(default)]
    pub descending: bool,
}

/// `SET var.key = value`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SetItem {
    /// Target variable.
    pub var: String,
    /// Property key.
    pub key: String,
    /// Assigned value.
    pub value: Expr,
}

/// `var.key` reference used by `REMOVE`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyRef {
    /// Target variable.
    pub var: String,
    /// Property key.
    pub key: String,
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

impl CompareOp {
    /// Operator with its operands swapped (`a < b` is `b > a`).
    pub fn flipped(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Neq => CompareOp::Neq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Lte => CompareOp::Gte,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Gte => CompareOp::Lte,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }
}

/// String matching operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringOp {
    /// `STARTS WITH`
    StartsWith,
    /// `ENDS WITH`
    EndsWith,
    /// `CONTAINS`
    Contains,
}

/// Arithmetic operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

/// Cypher expression tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Literal value.
    Literal(Literal),
    /// `$name` parameter.
    Parameter(String),
    /// Variable reference.
    Variable(String),
    /// `expr.key`
    Property(Box<Expr>, String),
    /// `[a, b]`
    List(Vec<Expr>),
    /// `{k: v}`
    Map(Vec<(String, Expr)>),
    /// `NOT expr`
    Not(Box<Expr>),
    /// `a AND b`
    And(Box<Expr>, Box<Expr>),
    /// `a OR b`
    Or(Box<Expr>, Box<Expr>),
    /// `a XOR b`
    Xor(Box<Expr>, Box<Expr>),
    /// Binary comparison.
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    /// `STARTS WITH` / `ENDS WITH` / `CONTAINS`.
    StringMatch(StringOp, Box<Expr>, Box<Expr>),
    /// `expr IS NULL`
    IsNull(Box<Expr>),
    /// `expr IS NOT NULL`
    IsNotNull(Box<Expr>),
    /// `expr IN list`
    In(Box<Expr>, Box<Expr>),
    /// `var:Label:Other`
    HasLabels(String, Vec<String>),
    /// Pattern used as a predicate.
    Pattern(Pattern),
    /// Arithmetic expression.
    Arithmetic(ArithOp, Box<Expr>, Box<Expr>),
    /// Function or aggregate invocation.
    Function {
        /// Function name as written.
        name: String,
        /// `DISTINCT` inside an aggregate.
        #[serde(default)]
        distinct: bool,
        /// Arguments.
        #[serde(default)]
        args: Vec<Expr>,
    },
    /// `count(*)`
    CountStar,
}

impl Expr {
    /// Variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    /// Literal value.
    pub fn lit(value: impl Into<Literal>) -> Self {
        Expr::Literal(value.into())
    }

    /// `$name` parameter.
    pub fn param(name: impl Into<String>) -> Self {
        Expr::Parameter(name.into())
    }

    /// Function call.
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            distinct: false,
            args,
        }
    }

    /// `self.key`
    pub fn prop(self, key: impl Into<String>) -> Self {
        Expr::Property(Box::new(self), key.into())
    }

    /// `self op rhs`
    pub fn compare(self, op: CompareOp, rhs: Expr) -> Self {
        Expr::Compare(op, Box::new(self), Box::new(rhs))
    }

    /// `self = rhs`
    pub fn eq(self, rhs: Expr) -> Self {
        self.compare(CompareOp::Eq, rhs)
    }

    /// `self > rhs`
    pub fn gt(self, rhs: Expr) -> Self {
        self.compare(CompareOp::Gt, rhs)
    }

    /// `self < rhs`
    pub fn lt(self, rhs: Expr) -> Self {
        self.compare(CompareOp::Lt, rhs)
    }

    /// `self AND rhs`
    pub fn and(self, rhs: Expr) -> Self {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    /// `self OR rhs`
    pub fn or(self, rhs: Expr) -> Self {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    /// String operator application.
    pub fn string_match(self, op: StringOp, rhs: Expr) -> Self {
        Expr::StringMatch(op, Box::new(self), Box::new(rhs))
    }

    /// Returns true when the expression contains an aggregate call.
    pub fn is_aggregate(&self) -> bool {
        match self {
            Expr::CountStar => true,
            Expr::Function { name, args, .. } => {
                is_aggregate_name(name) || args.iter().any(Expr::is_aggregate)
            }
            Expr::Property(base, _) => base.is_aggregate(),
            Expr::List(items) => items.iter().any(Expr::is_aggregate),
            Expr::Map(entries) => entries.iter().any(|(_, e)| e.is_aggregate()),
            Expr::Not(inner) | Expr::IsNull(inner) | Expr::IsNotNull(inner) => inner.is_aggregate(),
            Expr::And(l, r)
            | Expr::Or(l, r)
            | Expr::Xor(l, r)
            | Expr::Compare(_, l, r)
            | Expr::StringMatch(_, l, r)
            | Expr::In(l, r)
            | Expr::Arithmetic(_, l, r) => l.is_aggregate() || r.is_aggregate(),
            Expr::Literal(_)
            | Expr::Parameter(_)
            | Expr::Variable(_)
            | Expr::HasLabels(..)
            | Expr::Pattern(_) => false,
        }
    }
}

/// Aggregate function names, lower-cased.
pub fn is_aggregate_name(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "count" | "collect" | "sum" | "avg" | "min" | "max"
    )
}

fn write_literal(f: &mut fmt::Formatter<'_>, lit: &Literal) -> fmt::Result {
    match lit {
        Literal::Null => write!(f, "null"),
        Literal::Bool(v) => write!(f, "{v}"),
        Literal::Int(v) => write!(f, "{v}"),
        Literal::Float(v) => write!(f, "{v:?}"),
        Literal::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
        Literal::List(items) => {
            write!(f, "[")?;
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write_literal(f, item)?;
            }
            write!(f, "]")
        }
        Literal::Map(entries) => {
            write!(f, "{{")?;
            for (idx, (key, value)) in entries.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}: ")?;
                write_literal(f, value)?;
            }
            write!(f, "}}")
        }
    }
}

impl fmt::Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        if let Some(var) = &self.var {
            write!(f, "{var}")?;
        }
        for label in &self.labels {
            write!(f, ":{label}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)?;
        for hop in &self.hops {
            let (left, right) = match hop.rel.direction {
                Direction::Out => ("-", "->"),
                Direction::In => ("<-", "-"),
                Direction::Both => ("-", "-"),
            };
            write!(f, "{left}[")?;
            if let Some(var) = &hop.rel.var {
                write!(f, "{var}")?;
            }
            if !hop.rel.types.is_empty() {
                write!(f, ":{}", hop.rel.types.join("|"))?;
            }
            write!(f, "]{right}{}", hop.node)?;
        }
        Ok(())
    }
}

/// Renders the expression as Cypher text, used for implicit column names.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit) => write_literal(f, lit),
            Expr::Parameter(name) => write!(f, "${name}"),
            Expr::Variable(name) => write!(f, "{name}"),
            Expr::Property(base, key) => write!(f, "{base}.{key}"),
            Expr::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Expr::Map(entries) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in entries.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Expr::Not(inner) => write!(f, "NOT {inner}"),
            Expr::And(l, r) => write!(f, "{l} AND {r}"),
            Expr::Or(l, r) => write!(f, "{l} OR {r}"),
            Expr::Xor(l, r) => write!(f, "{l} XOR {r}"),
            Expr::Compare(op, l, r) => write!(f, "{l} {} {r}", op.symbol()),
            Expr::StringMatch(op, l, r) => {
                let word = match op {
                    StringOp::StartsWith => "STARTS WITH",
                    StringOp::EndsWith => "ENDS WITH",
                    StringOp::Contains => "CONTAINS",
                };
                write!(f, "{l} {word} {r}")
            }
            Expr::IsNull(inner) => write!(f, "{inner} IS NULL"),
            Expr::IsNotNull(inner) => write!(f, "{inner} IS NOT NULL"),
            Expr::In(l, r) => write!(f, "{l} IN {r}"),
            Expr::HasLabels(var, labels) => {
                write!(f, "{var}")?;
                for label in labels {
                    write!(f, ":{label}")?;
                }
                Ok(())
            }
            Expr::Pattern(pattern) => write!(f, "{pattern}"),
            Expr::Arithmetic(op, l, r) => {
                let sym = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "/",
                    ArithOp::Mod => "%",
                };
                write!(f, "{l} {sym} {r}")
            }
            Expr::Function {
                name,
                distinct,
                args,
            } => {
                write!(f, "{name}(")?;
                if *distinct {
                    write!(f, "DISTINCT ")?;
                }
                for (idx, arg) in args.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::CountStar => write!(f, "count(*)"),
        }
    }
}
