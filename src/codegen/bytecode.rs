//! Structured instruction form.
//!
//! Modulators (`from`, `to`, `by`) are separate instructions following the
//! step they modify, the way Gremlin bytecode records them.

use std::hash::Hasher;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use crate::ir::{
    ChooseCondition, Column, LabelComparison, Predicate, Scope, SortOrder, Step, TextPredicate,
    Traversal, Value,
};

/// Ordered instruction list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    /// Instructions in evaluation order.
    pub steps: Vec<Instruction>,
}

/// One operator call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Gremlin operator name.
    pub operator: String,
    /// Positional arguments.
    pub arguments: Vec<Argument>,
}

/// Instruction argument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Argument {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal, step label or property key.
    String(String),
    /// List literal.
    List(Vec<Argument>),
    /// Map literal, declaration order.
    Map(Vec<(String, Argument)>),
    /// Encoded sentinel token.
    Token(String),
    /// Parameter resolved by the engine.
    Binding {
        /// Binding name.
        name: String,
    },
    /// Predicate, standard or custom.
    Predicate {
        /// `eq`, `within`, `startingWith`, or a registry symbol.
        operator: String,
        /// Predicate arguments.
        value: Vec<Argument>,
    },
    /// Anonymous traversal.
    Traversal(Bytecode),
    /// Gremlin enum constant such as `Scope.local`.
    Enum {
        /// Enum type.
        kind: String,
        /// Constant name.
        value: String,
    },
    /// Registry function.
    Function {
        /// Engine symbol.
        symbol: String,
    },
}

impl Bytecode {
    fn push(&mut self, operator: &str, arguments: Vec<Argument>) {
        self.steps.push(Instruction {
            operator: operator.to_owned(),
            arguments,
        });
    }

    /// Feeds a structural digest of the instructions into `hasher`.
    pub(crate) fn hash_into(&self, hasher: &mut Xxh64) {
        hasher.write_u64(self.steps.len() as u64);
        for instruction in &self.steps {
            hasher.write(instruction.operator.as_bytes());
            hasher.write_u64(instruction.arguments.len() as u64);
            for argument in &instruction.arguments {
                argument.hash_into(hasher);
            }
        }
    }
}

impl Argument {
    fn string(value: impl Into<String>) -> Self {
        Argument::String(value.into())
    }

    fn enumeration(kind: &str, value: &str) -> Self {
        Argument::Enum {
            kind: kind.to_owned(),
            value: value.to_owned(),
        }
    }

    fn hash_into(&self, hasher: &mut Xxh64) {
        match self {
            Argument::Bool(b) => {
                hasher.write_u8(0);
                hasher.write_u8(u8::from(*b));
            }
            Argument::Int(i) => {
                hasher.write_u8(1);
                hasher.write_i64(*i);
            }
            Argument::Float(f) => {
                hasher.write_u8(2);
                hasher.write_u64(f.to_bits());
            }
            Argument::String(s) => {
                hasher.write_u8(3);
                write_str(hasher, s);
            }
            Argument::List(items) => {
                hasher.write_u8(4);
                hasher.write_u64(items.len() as u64);
                items.iter().for_each(|item| item.hash_into(hasher));
            }
            Argument::Map(entries) => {
                hasher.write_u8(5);
                hasher.write_u64(entries.len() as u64);
                for (key, value) in entries {
                    write_str(hasher, key);
                    value.hash_into(hasher);
                }
            }
            Argument::Token(token) => {
                hasher.write_u8(6);
                write_str(hasher, token);
            }
            Argument::Binding { name } => {
                hasher.write_u8(7);
                write_str(hasher, name);
            }
            Argument::Predicate { operator, value } => {
                hasher.write_u8(8);
                write_str(hasher, operator);
                hasher.write_u64(value.len() as u64);
                value.iter().for_each(|v| v.hash_into(hasher));
            }
            Argument::Traversal(bytecode) => {
                hasher.write_u8(9);
                bytecode.hash_into(hasher);
            }
            Argument::Enum { kind, value } => {
                hasher.write_u8(10);
                write_str(hasher, kind);
                write_str(hasher, value);
            }
            Argument::Function { symbol } => {
                hasher.write_u8(11);
                write_str(hasher, symbol);
            }
        }
    }
}

fn write_str(hasher: &mut Xxh64, s: &str) {
    hasher.write_u64(s.len() as u64);
    hasher.write(s.as_bytes());
}

/// Renders a validated traversal.
pub(crate) fn render(traversal: &Traversal) -> Bytecode {
    let mut out = Bytecode::default();
    for step in traversal.steps() {
        render_step(step, &mut out);
    }
    out
}

fn nested(traversal: &Traversal) -> Argument {
    Argument::Traversal(render(traversal))
}

fn strings(items: &[String]) -> Vec<Argument> {
    items.iter().map(|s| Argument::string(s.as_str())).collect()
}

fn count(n: u64) -> Argument {
    Argument::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn render_step(step: &Step, out: &mut Bytecode) {
    let op = step.name();
    match step {
        Step::V
        | Step::E
        | Step::Drop
        | Step::InV
        | Step::OutV
        | Step::OtherV
        | Step::Id
        | Step::Label
        | Step::Key
        | Step::Value
        | Step::Dedup
        | Step::Fold
        | Step::Unfold
        | Step::Sum
        | Step::Mean
        | Step::Min
        | Step::Max
        | Step::Barrier
        | Step::Identity => out.push(op, Vec::new()),
        Step::AddV(label) => out.push(op, label.iter().map(|l| Argument::string(l.as_str())).collect()),
        Step::AddE { label, from, to } => {
            out.push(op, vec![Argument::string(label.as_str())]);
            out.push("from", vec![Argument::string(from.encode())]);
            out.push("to", vec![Argument::string(to.encode())]);
        }
        Step::Property { key, value } => {
            out.push(op, vec![Argument::string(key.as_str()), argument(value)])
        }
        Step::PropertyFrom { key, value } => {
            out.push(op, vec![Argument::string(key.as_str()), nested(value)])
        }
        Step::OutE(types) | Step::InE(types) | Step::BothE(types) => out.push(op, strings(types)),
        Step::Has { key, predicate } => {
            out.push(op, vec![Argument::string(key.as_str()), predicate_argument(predicate)])
        }
        Step::HasLabel(labels) => out.push(op, strings(labels)),
        Step::HasNot(key) | Step::HasKey(key) => out.push(op, vec![Argument::string(key.as_str())]),
        Step::Is(predicate) => out.push(op, vec![predicate_argument(predicate)]),
        Step::Where(t) | Step::Not(t) | Step::SideEffect(t) | Step::Map(t) | Step::FlatMap(t) => {
            out.push(op, vec![nested(t)])
        }
        Step::WhereLabel { comparison, label } => out.push(
            op,
            vec![Argument::Predicate {
                operator: label_comparison(*comparison).to_owned(),
                value: vec![Argument::string(label.encode())],
            }],
        ),
        Step::And(ts) | Step::Or(ts) | Step::Coalesce(ts) | Step::Union(ts) => {
            out.push(op, ts.iter().map(nested).collect())
        }
        Step::As(label) | Step::SelectKey(label) | Step::Aggregate(label) | Step::Cap(label) => {
            out.push(op, vec![Argument::string(label.encode())])
        }
        Step::Select(labels) => {
            out.push(op, labels.iter().map(|l| Argument::string(l.encode())).collect())
        }
        Step::SelectColumn(column) => out.push(op, vec![column_argument(*column)]),
        Step::Choose {
            condition,
            then,
            otherwise,
        } => {
            let condition = match condition {
                ChooseCondition::Predicate(p) => predicate_argument(p),
                ChooseCondition::Traversal(t) => nested(t),
            };
            out.push(op, vec![condition, nested(then), nested(otherwise)]);
        }
        Step::Constant(value) => out.push(op, vec![argument(value)]),
        Step::Inject(values) => out.push(op, values.iter().map(argument).collect()),
        Step::Values(keys) | Step::Properties(keys) => out.push(op, strings(keys)),
        Step::ValueMap(tokens) => out.push(op, vec![Argument::Bool(*tokens)]),
        Step::Project(entries) => {
            out.push(op, entries.iter().map(|(k, _)| Argument::string(k.encode())).collect());
            for (_, t) in entries {
                out.push("by", vec![nested(t)]);
            }
        }
        Step::Order(keys) => {
            out.push(op, Vec::new());
            for (t, order) in keys {
                out.push("by", vec![nested(t), order_argument(*order)]);
            }
        }
        Step::Group { key, value } => {
            out.push(op, Vec::new());
            out.push("by", vec![nested(key)]);
            out.push("by", vec![nested(value)]);
        }
        Step::Count(Scope::Global) => out.push(op, Vec::new()),
        Step::Count(Scope::Local) => out.push(op, vec![Argument::enumeration("Scope", "local")]),
        Step::Limit(n) | Step::Skip(n) => out.push(op, vec![count(*n)]),
        Step::Range(low, high) => out.push(op, vec![count(*low), count(*high)]),
        Step::Apply(function) => out.push(
            op,
            vec![Argument::Function {
                symbol: function.symbol().to_owned(),
            }],
        ),
    }
}

fn argument(value: &Value) -> Argument {
    match value {
        Value::Bool(b) => Argument::Bool(*b),
        Value::Int(i) => Argument::Int(*i),
        Value::Float(f) => Argument::Float(*f),
        Value::String(s) => Argument::string(s.as_str()),
        Value::List(items) => Argument::List(items.iter().map(argument).collect()),
        Value::Map(entries) => {
            Argument::Map(entries.iter().map(|(k, v)| (k.clone(), argument(v))).collect())
        }
        Value::Token(token) => Argument::Token(token.encode()),
        Value::Parameter(name) => Argument::Binding { name: name.clone() },
    }
}

fn predicate_argument(predicate: &Predicate) -> Argument {
    let (operator, value): (&str, Vec<Argument>) = match predicate {
        Predicate::Eq(v) => ("eq", vec![argument(v)]),
        Predicate::Neq(v) => ("neq", vec![argument(v)]),
        Predicate::Lt(v) => ("lt", vec![argument(v)]),
        Predicate::Lte(v) => ("lte", vec![argument(v)]),
        Predicate::Gt(v) => ("gt", vec![argument(v)]),
        Predicate::Gte(v) => ("gte", vec![argument(v)]),
        Predicate::Within(vs) => ("within", vs.iter().map(argument).collect()),
        Predicate::Without(vs) => ("without", vs.iter().map(argument).collect()),
        Predicate::Custom(custom, arg) => (custom.symbol(), arg.iter().map(argument).collect()),
        Predicate::Text(text, v) => (text_operator(*text), vec![argument(v)]),
    };
    Argument::Predicate {
        operator: operator.to_owned(),
        value,
    }
}

pub(crate) fn text_operator(text: TextPredicate) -> &'static str {
    match text {
        TextPredicate::StartingWith => "startingWith",
        TextPredicate::EndingWith => "endingWith",
        TextPredicate::Containing => "containing",
    }
}

pub(crate) fn label_comparison(comparison: LabelComparison) -> &'static str {
    match comparison {
        LabelComparison::Eq => "eq",
        LabelComparison::Neq => "neq",
        LabelComparison::Without => "without",
        LabelComparison::Lt => "lt",
        LabelComparison::Lte => "lte",
        LabelComparison::Gt => "gt",
        LabelComparison::Gte => "gte",
    }
}

fn column_argument(column: Column) -> Argument {
    match column {
        Column::Keys => Argument::enumeration("Column", "keys"),
        Column::Values => Argument::enumeration("Column", "values"),
    }
}

fn order_argument(order: SortOrder) -> Argument {
    match order {
        SortOrder::Asc => Argument::enumeration("Order", "asc"),
        SortOrder::Desc => Argument::enumeration("Order", "desc"),
    }
}
