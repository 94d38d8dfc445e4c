//! Step-level IR types.

use std::fmt;

use crate::ir::token::Token;
use crate::registry::{CustomFunction, CustomPredicate};

/// Step label, projection key, or side-effect key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    /// User-visible name (variable, column alias, map key).
    Named(String),
    /// Reserved token.
    Synthetic(Token),
}

impl Label {
    /// User-visible label.
    pub fn named(name: impl Into<String>) -> Self {
        Label::Named(name.into())
    }

    /// Encoded form handed to engines.
    pub fn encode(&self) -> String {
        match self {
            Label::Named(name) => name.clone(),
            Label::Synthetic(token) => token.encode(),
        }
    }

    /// True for compiler-introduced identifiers.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Label::Synthetic(token) if token.is_synthetic_label())
    }
}

impl From<Token> for Label {
    fn from(token: Token) -> Self {
        Label::Synthetic(token)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Named(name) => f.write_str(name),
            Label::Synthetic(token) => write!(f, "{token:?}"),
        }
    }
}

/// IR literal. Cypher null is [`Token::Null`], never a bare null.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// User string. Never starts with the reserved prefix.
    String(String),
    /// List of values.
    List(Vec<Value>),
    /// Map with keys in declaration order.
    Map(Vec<(String, Value)>),
    /// Sentinel token.
    Token(Token),
    /// Query parameter resolved by the engine.
    Parameter(String),
}

impl From<Token> for Value {
    fn from(token: Token) -> Self {
        Value::Token(token)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

/// Native text predicates (`TextP`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextPredicate {
    /// `startingWith`
    StartingWith,
    /// `endingWith`
    EndingWith,
    /// `containing`
    Containing,
}

/// Predicate argument of `has`, `is`, and `choose`.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `eq(v)`
    Eq(Value),
    /// `neq(v)`
    Neq(Value),
    /// `lt(v)`
    Lt(Value),
    /// `lte(v)`
    Lte(Value),
    /// `gt(v)`
    Gt(Value),
    /// `gte(v)`
    Gte(Value),
    /// `within(a, b, ...)`
    Within(Vec<Value>),
    /// `without(a, b, ...)`
    Without(Vec<Value>),
    /// Registry predicate with an optional argument.
    Custom(CustomPredicate, Option<Value>),
    /// Native text predicate.
    Text(TextPredicate, Value),
}

/// Comparison used by `where(P(label))`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelComparison {
    /// Current object equals the labelled one.
    Eq,
    /// Current object differs from the labelled one.
    Neq,
    /// Current object is not contained in the labelled collection.
    Without,
    /// Ordering comparisons.
    Lt,
    /// `lte(label)`
    Lte,
    /// `gt(label)`
    Gt,
    /// `gte(label)`
    Gte,
}

/// `local` versus default scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Across the traverser stream.
    Global,
    /// Within the current collection.
    Local,
}

/// Map column selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Column {
    /// Map keys.
    Keys,
    /// Map values.
    Values,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// Condition of a `choose` step.
#[derive(Clone, Debug, PartialEq)]
pub enum ChooseCondition {
    /// Tests the current object.
    Predicate(Predicate),
    /// True when the traversal yields anything.
    Traversal(Traversal),
}

/// One traversal step. Every consumer matches exhaustively.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// `V()`
    V,
    /// `E()`
    E,
    /// `addV(label)`
    AddV(Option<String>),
    /// `addE(label).from(a).to(b)`
    AddE {
        /// Relationship type.
        label: String,
        /// Source vertex label.
        from: Label,
        /// Target vertex label.
        to: Label,
    },
    /// `property(key, value)`
    Property {
        /// Property key.
        key: String,
        /// Constant value.
        value: Value,
    },
    /// `property(key, traversal)`
    PropertyFrom {
        /// Property key.
        key: String,
        /// Value-producing traversal.
        value: Traversal,
    },
    /// `drop()`
    Drop,
    /// `outE(types...)`
    OutE(Vec<String>),
    /// `inE(types...)`
    InE(Vec<String>),
    /// `bothE(types...)`
    BothE(Vec<String>),
    /// `inV()`
    InV,
    /// `outV()`
    OutV,
    /// `otherV()`
    OtherV,
    /// `has(key, predicate)`
    Has {
        /// Property key.
        key: String,
        /// Value test.
        predicate: Predicate,
    },
    /// `hasLabel(a, b)`, any of the listed labels.
    HasLabel(Vec<String>),
    /// `hasNot(key)`
    HasNot(String),
    /// `hasKey(key)` on properties.
    HasKey(String),
    /// `is(predicate)`
    Is(Predicate),
    /// `where(traversal)`
    Where(Traversal),
    /// `where(P(label))`
    WhereLabel {
        /// Comparison.
        comparison: LabelComparison,
        /// Compared label or side-effect key.
        label: Label,
    },
    /// `and(...)`
    And(Vec<Traversal>),
    /// `or(...)`
    Or(Vec<Traversal>),
    /// `not(traversal)`
    Not(Traversal),
    /// `as(label)`
    As(Label),
    /// `select(labels...)` over path labels.
    Select(Vec<Label>),
    /// `select(key)` over the current map.
    SelectKey(Label),
    /// `select(keys|values)`
    SelectColumn(Column),
    /// `choose(condition, then, otherwise)`
    Choose {
        /// Branch condition.
        condition: ChooseCondition,
        /// Taken when the condition holds.
        then: Traversal,
        /// Taken otherwise.
        otherwise: Traversal,
    },
    /// `coalesce(...)`
    Coalesce(Vec<Traversal>),
    /// `union(...)`
    Union(Vec<Traversal>),
    /// `constant(value)`
    Constant(Value),
    /// `inject(values...)`
    Inject(Vec<Value>),
    /// `id()`
    Id,
    /// `label()`
    Label,
    /// `values(keys...)`
    Values(Vec<String>),
    /// `valueMap(include_tokens)`
    ValueMap(bool),
    /// `properties(keys...)`
    Properties(Vec<String>),
    /// `key()`
    Key,
    /// `value()`
    Value,
    /// `project(keys...).by(...)...`
    Project(Vec<(Label, Traversal)>),
    /// `order().by(...)...`
    Order(Vec<(Traversal, SortOrder)>),
    /// `group().by(key).by(value)`
    Group {
        /// Key traversal.
        key: Traversal,
        /// Value traversal.
        value: Traversal,
    },
    /// `dedup()`
    Dedup,
    /// `count()` or `count(local)`
    Count(Scope),
    /// `fold()`
    Fold,
    /// `unfold()`
    Unfold,
    /// `sum()`
    Sum,
    /// `mean()`
    Mean,
    /// `min()`
    Min,
    /// `max()`
    Max,
    /// `aggregate(key)`
    Aggregate(Label),
    /// `cap(key)`
    Cap(Label),
    /// `limit(n)`
    Limit(u64),
    /// `skip(n)`
    Skip(u64),
    /// `range(low, high)`
    Range(u64, u64),
    /// `barrier()`
    Barrier,
    /// `sideEffect(traversal)`
    SideEffect(Traversal),
    /// `map(traversal)`
    Map(Traversal),
    /// `flatMap(traversal)`
    FlatMap(Traversal),
    /// `map(customFunction())`
    Apply(CustomFunction),
    /// `identity()`
    Identity,
}

impl Step {
    /// Gremlin operator name.
    pub fn name(&self) -> &'static str {
        match self {
            Step::V => "V",
            Step::E => "E",
            Step::AddV(_) => "addV",
            Step::AddE { .. } => "addE",
            Step::Property { .. } | Step::PropertyFrom { .. } => "property",
            Step::Drop => "drop",
            Step::OutE(_) => "outE",
            Step::InE(_) => "inE",
            Step::BothE(_) => "bothE",
            Step::InV => "inV",
            Step::OutV => "outV",
            Step::OtherV => "otherV",
            Step::Has { .. } => "has",
            Step::HasLabel(_) => "hasLabel",
            Step::HasNot(_) => "hasNot",
            Step::HasKey(_) => "hasKey",
            Step::Is(_) => "is",
            Step::Where(_) | Step::WhereLabel { .. } => "where",
            Step::And(_) => "and",
            Step::Or(_) => "or",
            Step::Not(_) => "not",
            Step::As(_) => "as",
            Step::Select(_) | Step::SelectKey(_) | Step::SelectColumn(_) => "select",
            Step::Choose { .. } => "choose",
            Step::Coalesce(_) => "coalesce",
            Step::Union(_) => "union",
            Step::Constant(_) => "constant",
            Step::Inject(_) => "inject",
            Step::Id => "id",
            Step::Label => "label",
            Step::Values(_) => "values",
            Step::ValueMap(_) => "valueMap",
            Step::Properties(_) => "properties",
            Step::Key => "key",
            Step::Value => "value",
            Step::Project(_) => "project",
            Step::Order(_) => "order",
            Step::Group { .. } => "group",
            Step::Dedup => "dedup",
            Step::Count(_) => "count",
            Step::Fold => "fold",
            Step::Unfold => "unfold",
            Step::Sum => "sum",
            Step::Mean => "mean",
            Step::Min => "min",
            Step::Max => "max",
            Step::Aggregate(_) => "aggregate",
            Step::Cap(_) => "cap",
            Step::Limit(_) => "limit",
            Step::Skip(_) => "skip",
            Step::Range(..) => "range",
            Step::Barrier => "barrier",
            Step::SideEffect(_) => "sideEffect",
            Step::Map(_) | Step::Apply(_) => "map",
            Step::FlatMap(_) => "flatMap",
            Step::Identity => "identity",
        }
    }

    /// True for steps that may begin a root traversal.
    pub fn is_start(&self) -> bool {
        matches!(
            self,
            Step::V | Step::E | Step::AddV(_) | Step::Inject(_)
        )
    }
}

/// Ordered step sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Traversal(pub Vec<Step>);

impl Traversal {
    /// Empty anonymous traversal (identity).
    pub fn new() -> Self {
        Traversal(Vec::new())
    }

    /// Traversal made of the given steps.
    pub fn of(steps: impl IntoIterator<Item = Step>) -> Self {
        Traversal(steps.into_iter().collect())
    }

    /// Appends a step, builder style.
    pub fn then(mut self, step: Step) -> Self {
        self.0.push(step);
        self
    }

    /// Appends every step of `other`.
    pub fn append(mut self, other: Traversal) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Appends a step in place.
    pub fn push(&mut self, step: Step) {
        self.0.push(step);
    }

    /// Appends every step of `other` in place.
    pub fn extend(&mut self, other: Traversal) {
        self.0.extend(other.0);
    }

    /// Borrowed steps.
    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    /// True when there are no steps.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of top-level steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<Step> for Traversal {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Traversal(iter.into_iter().collect())
    }
}
