//! Gremlin-Groovy script rendering.

use std::fmt::Write;

use crate::codegen::bytecode::{label_comparison, text_operator};
use crate::codegen::is_identifier;
use crate::ir::{ChooseCondition, Column, Predicate, Scope, SortOrder, Step, Traversal, Value};

/// Renders a root traversal, `g.V()...`.
pub(crate) fn render_root(traversal: &Traversal) -> String {
    let mut out = String::from("g");
    chain(traversal, &mut out);
    out
}

/// Renders an anonymous traversal, `__.out()...`.
fn anonymous(traversal: &Traversal) -> String {
    if traversal.is_empty() {
        return "__.identity()".to_owned();
    }
    let mut out = String::from("__");
    chain(traversal, &mut out);
    out
}

fn chain(traversal: &Traversal, out: &mut String) {
    for step in traversal.steps() {
        step_call(step, out);
    }
}

fn call(out: &mut String, name: &str, args: &[String]) {
    // Writing into a String cannot fail.
    let _ = write!(out, ".{name}({})", args.join(", "));
}

fn quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

fn quoted_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| quoted(s)).collect()
}

fn step_call(step: &Step, out: &mut String) {
    let name = step.name();
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
        | Step::Identity => call(out, name, &[]),
        Step::AddV(label) => {
            let args: Vec<String> = label.iter().map(|l| quoted(l)).collect();
            call(out, name, &args)
        }
        Step::AddE { label, from, to } => {
            call(out, name, &[quoted(label)]);
            call(out, "from", &[quoted(&from.encode())]);
            call(out, "to", &[quoted(&to.encode())]);
        }
        Step::Property { key, value } => call(out, name, &[quoted(key), literal(value)]),
        Step::PropertyFrom { key, value } => call(out, name, &[quoted(key), anonymous(value)]),
        Step::OutE(types) | Step::InE(types) | Step::BothE(types) => {
            call(out, name, &quoted_all(types))
        }
        Step::Has { key, predicate } => call(out, name, &[quoted(key), self::predicate(predicate)]),
        Step::HasLabel(labels) => call(out, name, &quoted_all(labels)),
        Step::HasNot(key) | Step::HasKey(key) => call(out, name, &[quoted(key)]),
        Step::Is(p) => call(out, name, &[predicate(p)]),
        Step::Where(t) | Step::Not(t) | Step::SideEffect(t) | Step::Map(t) | Step::FlatMap(t) => {
            call(out, name, &[anonymous(t)])
        }
        Step::WhereLabel { comparison, label } => {
            let p = format!("{}({})", label_comparison(*comparison), quoted(&label.encode()));
            call(out, name, &[p])
        }
        Step::And(ts) | Step::Or(ts) | Step::Coalesce(ts) | Step::Union(ts) => {
            let args: Vec<String> = ts.iter().map(anonymous).collect();
            call(out, name, &args)
        }
        Step::As(label) | Step::SelectKey(label) | Step::Aggregate(label) | Step::Cap(label) => {
            call(out, name, &[quoted(&label.encode())])
        }
        Step::Select(labels) => {
            let args: Vec<String> = labels.iter().map(|l| quoted(&l.encode())).collect();
            call(out, name, &args)
        }
        Step::SelectColumn(Column::Keys) => call(out, name, &["keys".to_owned()]),
        Step::SelectColumn(Column::Values) => call(out, name, &["values".to_owned()]),
        Step::Choose {
            condition,
            then,
            otherwise,
        } => {
            let condition = match condition {
                ChooseCondition::Predicate(p) => predicate(p),
                ChooseCondition::Traversal(t) => anonymous(t),
            };
            call(out, name, &[condition, anonymous(then), anonymous(otherwise)])
        }
        Step::Constant(value) => call(out, name, &[literal(value)]),
        Step::Inject(values) => {
            let args: Vec<String> = values.iter().map(literal).collect();
            call(out, name, &args)
        }
        Step::Values(keys) | Step::Properties(keys) => call(out, name, &quoted_all(keys)),
        Step::ValueMap(tokens) => call(out, name, &[tokens.to_string()]),
        Step::Project(entries) => {
            let keys: Vec<String> = entries.iter().map(|(k, _)| quoted(&k.encode())).collect();
            call(out, name, &keys);
            for (_, t) in entries {
                call(out, "by", &[anonymous(t)]);
            }
        }
        Step::Order(keys) => {
            call(out, name, &[]);
            for (t, order) in keys {
                let order = match order {
                    SortOrder::Asc => "asc",
                    SortOrder::Desc => "desc",
                };
                call(out, "by", &[anonymous(t), order.to_owned()]);
            }
        }
        Step::Group { key, value } => {
            call(out, name, &[]);
            call(out, "by", &[anonymous(key)]);
            call(out, "by", &[anonymous(value)]);
        }
        Step::Count(Scope::Global) => call(out, name, &[]),
        Step::Count(Scope::Local) => call(out, name, &["local".to_owned()]),
        Step::Limit(n) | Step::Skip(n) => call(out, name, &[n.to_string()]),
        Step::Range(low, high) => call(out, name, &[low.to_string(), high.to_string()]),
        Step::Apply(function) => call(out, name, &[format!("{}()", function.symbol())]),
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        // Debug keeps a fraction or exponent on every float.
        Value::Float(f) => format!("{f:?}"),
        Value::String(s) => quoted(s),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(entries) if entries.is_empty() => "[:]".to_owned(),
        Value::Map(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| {
                    let key = if is_identifier(k) { k.clone() } else { quoted(k) };
                    format!("{key}: {}", literal(v))
                })
                .collect();
            format!("[{}]", entries.join(", "))
        }
        Value::Token(token) => quoted(&token.encode()),
        Value::Parameter(name) => name.clone(),
    }
}

fn predicate(predicate: &Predicate) -> String {
    let unary = |name: &str, v: &Value| format!("{name}({})", literal(v));
    let many = |name: &str, vs: &[Value]| {
        let args: Vec<String> = vs.iter().map(literal).collect();
        format!("{name}({})", args.join(", "))
    };
    match predicate {
        Predicate::Eq(v) => unary("eq", v),
        Predicate::Neq(v) => unary("neq", v),
        Predicate::Lt(v) => unary("lt", v),
        Predicate::Lte(v) => unary("lte", v),
        Predicate::Gt(v) => unary("gt", v),
        Predicate::Gte(v) => unary("gte", v),
        Predicate::Within(vs) => many("within", vs),
        Predicate::Without(vs) => many("without", vs),
        Predicate::Custom(custom, None) => format!("{}()", custom.symbol()),
        Predicate::Custom(custom, Some(v)) => unary(custom.symbol(), v),
        Predicate::Text(text, v) => unary(text_operator(*text), v),
    }
}
