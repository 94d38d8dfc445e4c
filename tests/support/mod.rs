//! In-memory property graph and a bytecode interpreter standing in for a
//! Gremlin server.
//!
//! Evaluation is eager: every instruction consumes the whole traverser
//! stream before the next one runs. Child traversals start from a copy of
//! the parent traverser and see its step labels; labels they add are
//! dropped when they hand objects back.

#![allow(dead_code)]

use std::cell::{Ref, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use cypher_traverse::codegen::{Argument, Bytecode, Instruction};
use cypher_traverse::ir::{token, Token};
use cypher_traverse::normalize::{ElementId, RawKey, RawRow, RawValue};
use cypher_traverse::{
    ExecutionError, Literal, Params, Program, Registry, TraversalEngine,
};
use indexmap::IndexMap;

pub const MARKO: i64 = 1;
pub const VADAS: i64 = 2;
pub const JOSH: i64 = 3;
pub const PETER: i64 = 4;
pub const LOP: i64 = 5;
pub const RIPPLE: i64 = 6;
pub const MARKO_KNOWS_VADAS: i64 = 7;
pub const MARKO_KNOWS_JOSH: i64 = 8;
pub const JOSH_KNOWS_PETER: i64 = 9;
pub const MARKO_CREATED_LOP: i64 = 10;
pub const JOSH_CREATED_RIPPLE: i64 = 11;

type Res<T> = Result<T, ExecutionError>;

fn fail<T>(message: impl Into<String>) -> Res<T> {
    Err(ExecutionError::Engine {
        message: message.into(),
    })
}

/// Object carried by a traverser.
#[derive(Clone, Debug, PartialEq)]
pub enum Obj {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Obj>),
    Map(Vec<(Obj, Obj)>),
    Entry(Box<Obj>, Box<Obj>),
    T(TKey),
    Vertex(i64),
    Edge(i64),
    Property {
        owner: Box<Obj>,
        key: String,
        value: Box<Obj>,
    },
}

/// Gremlin `T` tokens used as value map keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TKey {
    Id,
    Label,
}

impl From<&str> for Obj {
    fn from(value: &str) -> Self {
        Obj::Str(value.to_owned())
    }
}

impl From<i64> for Obj {
    fn from(value: i64) -> Self {
        Obj::Int(value)
    }
}

#[derive(Clone, Debug)]
struct Element {
    label: String,
    properties: IndexMap<String, Obj>,
}

#[derive(Clone, Debug)]
struct EdgeRecord {
    element: Element,
    out_v: i64,
    in_v: i64,
}

/// Vertices and edges sharing one id sequence.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    vertices: BTreeMap<i64, Element>,
    edges: BTreeMap<i64, EdgeRecord>,
    last_id: i64,
}

fn properties(pairs: &[(&str, Obj)]) -> IndexMap<String, Obj> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Four people and two pieces of software; ids follow the constants
    /// at the top of this module.
    pub fn people() -> Self {
        let mut g = Graph::new();
        g.add_vertex("person", &[("name", "marko".into()), ("age", Obj::Int(29)), ("city", "Riga".into())]);
        g.add_vertex("person", &[("name", "vadas".into()), ("age", Obj::Int(27)), ("city", "Riga".into())]);
        g.add_vertex("person", &[("name", "josh".into()), ("age", Obj::Int(32)), ("city", "Oslo".into())]);
        g.add_vertex("person", &[("name", "peter".into()), ("age", Obj::Int(35))]);
        g.add_vertex("software", &[("name", "lop".into()), ("lang", "java".into())]);
        g.add_vertex("software", &[("name", "ripple".into())]);
        g.add_edge("knows", MARKO, VADAS, &[("weight", Obj::Float(0.5))]);
        g.add_edge("knows", MARKO, JOSH, &[("weight", Obj::Float(1.0))]);
        g.add_edge("knows", JOSH, PETER, &[]);
        g.add_edge("created", MARKO, LOP, &[]);
        g.add_edge("created", JOSH, RIPPLE, &[]);
        g
    }

    fn allocate(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    pub fn add_vertex(&mut self, label: &str, props: &[(&str, Obj)]) -> i64 {
        let id = self.allocate();
        self.vertices.insert(
            id,
            Element {
                label: label.to_owned(),
                properties: properties(props),
            },
        );
        id
    }

    pub fn add_edge(&mut self, label: &str, out_v: i64, in_v: i64, props: &[(&str, Obj)]) -> i64 {
        let id = self.allocate();
        self.edges.insert(
            id,
            EdgeRecord {
                element: Element {
                    label: label.to_owned(),
                    properties: properties(props),
                },
                out_v,
                in_v,
            },
        );
        id
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_vertex(&self, id: i64) -> bool {
        self.vertices.contains_key(&id)
    }

    pub fn has_edge(&self, id: i64) -> bool {
        self.edges.contains_key(&id)
    }

    pub fn vertex_property(&self, id: i64, key: &str) -> Option<&Obj> {
        self.vertices.get(&id)?.properties.get(key)
    }

    pub fn vertices_labelled(&self, label: &str) -> usize {
        self.vertices.values().filter(|v| v.label == label).count()
    }

    fn element(&self, obj: &Obj) -> Res<&Element> {
        let found = match obj {
            Obj::Vertex(id) => self.vertices.get(id),
            Obj::Edge(id) => self.edges.get(id).map(|e| &e.element),
            other => return fail(format!("{other:?} is not an element")),
        };
        match found {
            Some(element) => Ok(element),
            None => fail(format!("{obj:?} was removed")),
        }
    }

    fn element_mut(&mut self, obj: &Obj) -> Res<&mut Element> {
        let found = match obj {
            Obj::Vertex(id) => self.vertices.get_mut(id),
            Obj::Edge(id) => self.edges.get_mut(id).map(|e| &mut e.element),
            other => return fail(format!("{other:?} is not an element")),
        };
        match found {
            Some(element) => Ok(element),
            None => fail(format!("{obj:?} was removed")),
        }
    }

    fn remove_vertex(&mut self, id: i64) {
        self.vertices.remove(&id);
        self.edges.retain(|_, e| e.out_v != id && e.in_v != id);
    }
}

/// [`TraversalEngine`] over a [`Graph`]. Each program runs against a copy
/// of the graph that replaces the original only when the program succeeds.
pub struct MemoryEngine {
    graph: RefCell<Graph>,
    symbols: Vec<String>,
    registrations: usize,
}

impl MemoryEngine {
    pub fn new(graph: Graph) -> Self {
        MemoryEngine {
            graph: RefCell::new(graph),
            symbols: Vec::new(),
            registrations: 0,
        }
    }

    pub fn graph(&self) -> Ref<'_, Graph> {
        self.graph.borrow()
    }

    pub fn registrations(&self) -> usize {
        self.registrations
    }
}

impl TraversalEngine for MemoryEngine {
    fn register(&mut self, registry: &Registry) -> Res<()> {
        self.symbols = registry.symbols().into_iter().map(str::to_owned).collect();
        self.registrations += 1;
        Ok(())
    }

    fn execute(&self, program: &Program, params: &Params) -> Res<Vec<RawRow>> {
        let Some(bytecode) = program.as_bytecode() else {
            return fail("script programs are not supported by the in-memory engine");
        };
        let mut graph = self.graph.borrow().clone();
        let rows = {
            let mut exec = Exec {
                graph: &mut graph,
                side_effects: HashMap::new(),
                params,
                symbols: &self.symbols,
            };
            exec.declare_side_effects(bytecode);
            let out = exec.root(bytecode)?;
            out.iter()
                .map(|t| exec.row(&t.obj))
                .collect::<Res<Vec<_>>>()?
        };
        *self.graph.borrow_mut() = graph;
        Ok(rows)
    }
}

#[derive(Clone, Debug)]
struct Trav {
    obj: Obj,
    labels: Vec<(String, Obj)>,
    /// Vertex an edge was reached from, for `otherV`.
    from: Option<i64>,
}

impl Trav {
    fn new(obj: Obj) -> Self {
        Trav {
            obj,
            labels: Vec::new(),
            from: None,
        }
    }

    fn with(&self, obj: Obj) -> Self {
        Trav {
            obj,
            labels: self.labels.clone(),
            from: None,
        }
    }

    fn label(&self, name: &str) -> Option<&Obj> {
        self.labels
            .iter()
            .rev()
            .find(|(l, _)| l == name)
            .map(|(_, o)| o)
    }
}

struct Exec<'a> {
    graph: &'a mut Graph,
    side_effects: HashMap<String, Vec<Obj>>,
    params: &'a Params,
    symbols: &'a [String],
}

fn is_modulator(instruction: &Instruction) -> bool {
    matches!(instruction.operator.as_str(), "by" | "from" | "to")
}

fn string_arg(ins: &Instruction, idx: usize) -> Res<&str> {
    match ins.arguments.get(idx) {
        Some(Argument::String(s)) => Ok(s),
        other => fail(format!("{}: expected a string argument, got {other:?}", ins.operator)),
    }
}

fn string_args(ins: &Instruction) -> Res<Vec<String>> {
    (0..ins.arguments.len())
        .map(|idx| string_arg(ins, idx).map(str::to_owned))
        .collect()
}

fn traversal_arg(ins: &Instruction, idx: usize) -> Res<&Bytecode> {
    match ins.arguments.get(idx) {
        Some(Argument::Traversal(code)) => Ok(code),
        other => fail(format!("{}: expected a traversal, got {other:?}", ins.operator)),
    }
}

fn traversal_args(ins: &Instruction) -> Res<Vec<&Bytecode>> {
    (0..ins.arguments.len())
        .map(|idx| traversal_arg(ins, idx))
        .collect()
}

fn count_arg(ins: &Instruction, idx: usize) -> Res<usize> {
    match ins.arguments.get(idx) {
        Some(Argument::Int(n)) => Ok(usize::try_from(*n).unwrap_or(usize::MAX)),
        other => fail(format!("{}: expected an integer, got {other:?}", ins.operator)),
    }
}

fn modulator<'i>(modulators: &'i [Instruction], operator: &str) -> Res<&'i Instruction> {
    match modulators.iter().find(|m| m.operator == operator) {
        Some(found) => Ok(found),
        None => fail(format!("missing {operator}() modulator")),
    }
}

fn int(n: usize) -> Obj {
    Obj::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

fn null() -> Obj {
    Obj::Str(Token::Null.encode())
}

impl Exec<'_> {
    fn declare_side_effects(&mut self, code: &Bytecode) {
        for ins in &code.steps {
            if ins.operator == "aggregate" {
                if let Some(Argument::String(key)) = ins.arguments.first() {
                    self.side_effects.entry(key.clone()).or_default();
                }
            }
            for arg in &ins.arguments {
                if let Argument::Traversal(child) = arg {
                    self.declare_side_effects(child);
                }
            }
        }
    }

    fn root(&mut self, code: &Bytecode) -> Res<Vec<Trav>> {
        let Some(first) = code.steps.first() else {
            return fail("empty traversal");
        };
        let start = match first.operator.as_str() {
            "V" | "E" | "addV" => self.step(first, &[], vec![Trav::new(Obj::Null)])?,
            "inject" => first
                .arguments
                .iter()
                .map(|a| Ok(Trav::new(self.value(a)?)))
                .collect::<Res<Vec<_>>>()?,
            other => return fail(format!("{other}() cannot start a traversal")),
        };
        self.run_from(code, 1, start)
    }

    fn run_from(&mut self, code: &Bytecode, start: usize, mut stream: Vec<Trav>) -> Res<Vec<Trav>> {
        let steps = &code.steps;
        let mut idx = start;
        while idx < steps.len() {
            let end = steps[idx + 1..]
                .iter()
                .position(|i| !is_modulator(i))
                .map_or(steps.len(), |n| idx + 1 + n);
            stream = self.step(&steps[idx], &steps[idx + 1..end], stream)?;
            idx = end;
        }
        Ok(stream)
    }

    fn objects(&mut self, code: &Bytecode, input: &Trav) -> Res<Vec<Obj>> {
        Ok(self
            .run_from(code, 0, vec![input.clone()])?
            .into_iter()
            .map(|t| t.obj)
            .collect())
    }

    fn first(&mut self, code: &Bytecode, input: &Trav) -> Res<Option<Obj>> {
        Ok(self.objects(code, input)?.into_iter().next())
    }

    fn produces(&mut self, code: &Bytecode, input: &Trav) -> Res<bool> {
        Ok(!self.run_from(code, 0, vec![input.clone()])?.is_empty())
    }

    /// Map key, then side effect, then step label.
    fn scope(&self, t: &Trav, key: &str) -> Option<Obj> {
        if let Obj::Map(entries) = &t.obj {
            if let Some((_, v)) = entries
                .iter()
                .find(|(k, _)| matches!(k, Obj::Str(s) if s == key))
            {
                return Some(v.clone());
            }
        }
        if let Some(values) = self.side_effects.get(key) {
            return Some(Obj::List(values.clone()));
        }
        t.label(key).cloned()
    }

    fn step(&mut self, ins: &Instruction, modulators: &[Instruction], input: Vec<Trav>) -> Res<Vec<Trav>> {
        let op = ins.operator.as_str();
        let mut out = Vec::new();
        match op {
            "V" => {
                let ids: Vec<i64> = self.graph.vertices.keys().copied().collect();
                for t in &input {
                    out.extend(ids.iter().map(|id| t.with(Obj::Vertex(*id))));
                }
            }
            "E" => {
                let ids: Vec<i64> = self.graph.edges.keys().copied().collect();
                for t in &input {
                    out.extend(ids.iter().map(|id| t.with(Obj::Edge(*id))));
                }
            }
            "addV" => {
                let label = match ins.arguments.first() {
                    Some(Argument::String(label)) => label.clone(),
                    _ => "vertex".to_owned(),
                };
                for t in &input {
                    let id = self.graph.add_vertex(&label, &[]);
                    out.push(t.with(Obj::Vertex(id)));
                }
            }
            "addE" => {
                let label = string_arg(ins, 0)?.to_owned();
                let from = string_arg(modulator(modulators, "from")?, 0)?.to_owned();
                let to = string_arg(modulator(modulators, "to")?, 0)?.to_owned();
                for t in &input {
                    let (Some(Obj::Vertex(out_v)), Some(Obj::Vertex(in_v))) =
                        (self.scope(t, &from), self.scope(t, &to))
                    else {
                        return fail("addE() endpoints must be vertices");
                    };
                    let id = self.graph.add_edge(&label, out_v, in_v, &[]);
                    out.push(t.with(Obj::Edge(id)));
                }
            }
            "property" => {
                let key = string_arg(ins, 0)?.to_owned();
                let Some(value_arg) = ins.arguments.get(1) else {
                    return fail("property() without a value");
                };
                for t in input {
                    let value = match value_arg {
                        Argument::Traversal(child) => match self.first(child, &t)? {
                            Some(value) => value,
                            None => return fail(format!("property({key}) traversal produced no value")),
                        },
                        other => self.value(other)?,
                    };
                    self.graph
                        .element_mut(&t.obj)?
                        .properties
                        .insert(key.clone(), value);
                    out.push(t);
                }
            }
            "drop" => {
                for t in &input {
                    match &t.obj {
                        Obj::Vertex(id) => self.graph.remove_vertex(*id),
                        Obj::Edge(id) => {
                            self.graph.edges.remove(id);
                        }
                        Obj::Property { owner, key, .. } => {
                            if let Ok(element) = self.graph.element_mut(owner) {
                                element.properties.shift_remove(key);
                            }
                        }
                        other => return fail(format!("cannot drop {other:?}")),
                    }
                }
            }
            "outE" | "inE" | "bothE" => {
                let types = string_args(ins)?;
                for t in &input {
                    let Obj::Vertex(v) = &t.obj else {
                        return fail(format!("{op}() on {:?}", t.obj));
                    };
                    for (id, edge) in &self.graph.edges {
                        let incident = match op {
                            "outE" => edge.out_v == *v,
                            "inE" => edge.in_v == *v,
                            _ => edge.out_v == *v || edge.in_v == *v,
                        };
                        if incident && (types.is_empty() || types.contains(&edge.element.label)) {
                            let mut next = t.with(Obj::Edge(*id));
                            next.from = Some(*v);
                            out.push(next);
                        }
                    }
                }
            }
            "inV" | "outV" | "otherV" => {
                for t in &input {
                    let Obj::Edge(id) = &t.obj else {
                        return fail(format!("{op}() on {:?}", t.obj));
                    };
                    let Some(edge) = self.graph.edges.get(id) else {
                        return fail(format!("edge {id} was removed"));
                    };
                    let vertex = match (op, t.from) {
                        ("inV", _) => edge.in_v,
                        ("outV", _) => edge.out_v,
                        (_, Some(from)) if from == edge.out_v => edge.in_v,
                        (_, Some(_)) => edge.out_v,
                        (_, None) => return fail("otherV() without a starting vertex"),
                    };
                    out.push(t.with(Obj::Vertex(vertex)));
                }
            }
            "has" => {
                let key = string_arg(ins, 0)?;
                let Some(predicate) = ins.arguments.get(1) else {
                    return fail("has() without a predicate");
                };
                for t in input {
                    let value = match self.graph.element(&t.obj) {
                        Ok(element) => element.properties.get(key).cloned(),
                        Err(_) => None,
                    };
                    if let Some(value) = value {
                        if self.test(predicate, &value)? {
                            out.push(t);
                        }
                    }
                }
            }
            "hasLabel" => {
                let labels = string_args(ins)?;
                for t in input {
                    if self
                        .graph
                        .element(&t.obj)
                        .is_ok_and(|e| labels.contains(&e.label))
                    {
                        out.push(t);
                    }
                }
            }
            "hasNot" => {
                let key = string_arg(ins, 0)?;
                for t in input {
                    if !self.graph.element(&t.obj)?.properties.contains_key(key) {
                        out.push(t);
                    }
                }
            }
            "hasKey" => {
                let key = string_arg(ins, 0)?;
                out.extend(
                    input
                        .into_iter()
                        .filter(|t| matches!(&t.obj, Obj::Property { key: k, .. } if k == key)),
                );
            }
            "is" => {
                let Some(predicate) = ins.arguments.first() else {
                    return fail("is() without a predicate");
                };
                for t in input {
                    if self.test(predicate, &t.obj)? {
                        out.push(t);
                    }
                }
            }
            "where" => match ins.arguments.first() {
                Some(Argument::Traversal(child)) => {
                    for t in input {
                        if self.produces(child, &t)? {
                            out.push(t);
                        }
                    }
                }
                Some(Argument::Predicate { operator, value }) => {
                    let Some(Argument::String(label)) = value.first() else {
                        return fail("where() predicate must name a step label");
                    };
                    for t in input {
                        let keep = match self.scope(&t, label) {
                            Some(other) => compare_with(operator, &t.obj, &other)?,
                            None => false,
                        };
                        if keep {
                            out.push(t);
                        }
                    }
                }
                other => return fail(format!("where() with {other:?}")),
            },
            "and" | "or" => {
                let children = traversal_args(ins)?;
                for t in input {
                    let mut keep = op == "and";
                    for child in &children {
                        let produced = self.produces(child, &t)?;
                        if op == "and" && !produced {
                            keep = false;
                            break;
                        }
                        if op == "or" && produced {
                            keep = true;
                            break;
                        }
                    }
                    if keep {
                        out.push(t);
                    }
                }
            }
            "not" => {
                let child = traversal_arg(ins, 0)?;
                for t in input {
                    if !self.produces(child, &t)? {
                        out.push(t);
                    }
                }
            }
            "as" => {
                let label = string_arg(ins, 0)?;
                for mut t in input {
                    t.labels.push((label.to_owned(), t.obj.clone()));
                    out.push(t);
                }
            }
            "select" => match ins.arguments.first() {
                Some(Argument::Enum { value: column, .. }) => {
                    let keys = column == "keys";
                    for t in &input {
                        let selected = match &t.obj {
                            Obj::Entry(k, v) => {
                                if keys {
                                    (**k).clone()
                                } else {
                                    (**v).clone()
                                }
                            }
                            Obj::Map(entries) => Obj::List(
                                entries
                                    .iter()
                                    .map(|(k, v)| if keys { k.clone() } else { v.clone() })
                                    .collect(),
                            ),
                            other => return fail(format!("select({column}) on {other:?}")),
                        };
                        out.push(t.with(selected));
                    }
                }
                _ => {
                    let labels = string_args(ins)?;
                    for t in &input {
                        if let [label] = labels.as_slice() {
                            if let Some(value) = self.scope(t, label) {
                                out.push(t.with(value));
                            }
                            continue;
                        }
                        let entries: Option<Vec<(Obj, Obj)>> = labels
                            .iter()
                            .map(|l| self.scope(t, l).map(|v| (Obj::Str(l.clone()), v)))
                            .collect();
                        if let Some(entries) = entries {
                            out.push(t.with(Obj::Map(entries)));
                        }
                    }
                }
            },
            "choose" => {
                let Some(condition) = ins.arguments.first() else {
                    return fail("choose() without a condition");
                };
                let then = traversal_arg(ins, 1)?;
                let otherwise = traversal_arg(ins, 2)?;
                for t in &input {
                    let taken = match condition {
                        Argument::Traversal(child) => self.produces(child, t)?,
                        predicate => self.test(predicate, &t.obj)?,
                    };
                    let branch = if taken { then } else { otherwise };
                    for obj in self.objects(branch, t)? {
                        out.push(t.with(obj));
                    }
                }
            }
            "coalesce" => {
                let children = traversal_args(ins)?;
                for t in &input {
                    for child in &children {
                        let objs = self.objects(child, t)?;
                        if !objs.is_empty() {
                            out.extend(objs.into_iter().map(|o| t.with(o)));
                            break;
                        }
                    }
                }
            }
            "union" => {
                let children = traversal_args(ins)?;
                for t in &input {
                    for child in &children {
                        for obj in self.objects(child, t)? {
                            out.push(t.with(obj));
                        }
                    }
                }
            }
            "constant" => {
                let Some(arg) = ins.arguments.first() else {
                    return fail("constant() without a value");
                };
                let value = self.value(arg)?;
                out.extend(input.iter().map(|t| t.with(value.clone())));
            }
            "inject" => {
                out = input;
                for arg in &ins.arguments {
                    out.push(Trav::new(self.value(arg)?));
                }
            }
            "id" => {
                for t in &input {
                    let id = match &t.obj {
                        Obj::Vertex(id) | Obj::Edge(id) => *id,
                        other => return fail(format!("id() on {other:?}")),
                    };
                    out.push(t.with(Obj::Int(id)));
                }
            }
            "label" => {
                for t in &input {
                    let label = self.graph.element(&t.obj)?.label.clone();
                    out.push(t.with(Obj::Str(label)));
                }
            }
            "values" => {
                let keys = string_args(ins)?;
                for t in &input {
                    let element = self.graph.element(&t.obj)?;
                    let values: Vec<Obj> = element
                        .properties
                        .iter()
                        .filter(|(k, _)| keys.is_empty() || keys.contains(k))
                        .map(|(_, v)| v.clone())
                        .collect();
                    out.extend(values.into_iter().map(|v| t.with(v)));
                }
            }
            "properties" => {
                let keys = string_args(ins)?;
                for t in &input {
                    let element = self.graph.element(&t.obj)?;
                    let props: Vec<Obj> = element
                        .properties
                        .iter()
                        .filter(|(k, _)| keys.is_empty() || keys.contains(k))
                        .map(|(k, v)| Obj::Property {
                            owner: Box::new(t.obj.clone()),
                            key: k.clone(),
                            value: Box::new(v.clone()),
                        })
                        .collect();
                    out.extend(props.into_iter().map(|p| t.with(p)));
                }
            }
            "key" | "value" => {
                for t in &input {
                    let Obj::Property { key, value, .. } = &t.obj else {
                        return fail(format!("{op}() on {:?}", t.obj));
                    };
                    let obj = if op == "key" {
                        Obj::Str(key.clone())
                    } else {
                        (**value).clone()
                    };
                    out.push(t.with(obj));
                }
            }
            "valueMap" => {
                let tokens = matches!(ins.arguments.first(), Some(Argument::Bool(true)));
                for t in &input {
                    let map = self.value_map(&t.obj, tokens)?;
                    out.push(t.with(map));
                }
            }
            "project" => {
                let keys = string_args(ins)?;
                let bys: Vec<&Instruction> = modulators.iter().filter(|m| m.operator == "by").collect();
                if bys.len() != keys.len() {
                    return fail("project() needs one by() per key");
                }
                for t in &input {
                    let mut entries = Vec::with_capacity(keys.len());
                    for (key, by) in keys.iter().zip(&bys) {
                        let child = traversal_arg(by, 0)?;
                        let Some(value) = self.first(child, t)? else {
                            return fail(format!(
                                "The provided traverser does not map to a value for project({key})"
                            ));
                        };
                        entries.push((Obj::Str(key.clone()), value));
                    }
                    out.push(t.with(Obj::Map(entries)));
                }
            }
            "order" => {
                let mut keyed = Vec::with_capacity(input.len());
                for t in input {
                    let mut keys = Vec::with_capacity(modulators.len());
                    for by in modulators {
                        let child = traversal_arg(by, 0)?;
                        let Some(key) = self.first(child, &t)? else {
                            return fail("The provided traverser does not map to a value for order()");
                        };
                        let descending = matches!(
                            by.arguments.get(1),
                            Some(Argument::Enum { value, .. }) if value == "desc"
                        );
                        keys.push((key, descending));
                    }
                    keyed.push((keys, t));
                }
                keyed.sort_by(|(a, _), (b, _)| {
                    a.iter()
                        .zip(b)
                        .map(|((x, desc), (y, _))| {
                            let ord = sort_order(x, y);
                            if *desc {
                                ord.reverse()
                            } else {
                                ord
                            }
                        })
                        .find(|ord| *ord != Ordering::Equal)
                        .unwrap_or(Ordering::Equal)
                });
                out.extend(keyed.into_iter().map(|(_, t)| t));
            }
            "group" => {
                let key_code = traversal_arg(modulator(modulators, "by")?, 0)?;
                let Some(value_by) = modulators.iter().filter(|m| m.operator == "by").nth(1) else {
                    return fail("group() needs a value by()");
                };
                let value_code = traversal_arg(value_by, 0)?;
                let mut groups: Vec<(Obj, Vec<Trav>)> = Vec::new();
                for t in input {
                    let key = self.first(key_code, &t)?.unwrap_or(Obj::Null);
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, members)) => members.push(t),
                        None => groups.push((key, vec![t])),
                    }
                }
                let mut entries = Vec::with_capacity(groups.len());
                for (key, members) in groups {
                    let value = self
                        .run_from(value_code, 0, members)?
                        .into_iter()
                        .next()
                        .map_or(Obj::List(Vec::new()), |t| t.obj);
                    entries.push((key, value));
                }
                out.push(Trav::new(Obj::Map(entries)));
            }
            "dedup" => {
                let mut seen: Vec<Obj> = Vec::new();
                for t in input {
                    if !seen.contains(&t.obj) {
                        seen.push(t.obj.clone());
                        out.push(t);
                    }
                }
            }
            "count" => {
                if ins.arguments.is_empty() {
                    out.push(Trav::new(int(input.len())));
                } else {
                    for t in &input {
                        let n = match &t.obj {
                            Obj::List(items) => items.len(),
                            Obj::Map(entries) => entries.len(),
                            _ => 1,
                        };
                        out.push(t.with(int(n)));
                    }
                }
            }
            "fold" => {
                out.push(Trav::new(Obj::List(input.into_iter().map(|t| t.obj).collect())));
            }
            "unfold" => {
                for t in &input {
                    match &t.obj {
                        Obj::List(items) => out.extend(items.iter().map(|i| t.with(i.clone()))),
                        Obj::Map(entries) => out.extend(entries.iter().map(|(k, v)| {
                            t.with(Obj::Entry(Box::new(k.clone()), Box::new(v.clone())))
                        })),
                        other => out.push(t.with(other.clone())),
                    }
                }
            }
            "sum" | "mean" | "min" | "max" => {
                let values: Vec<Obj> = input.into_iter().map(|t| t.obj).collect();
                if !values.is_empty() {
                    out.push(Trav::new(reduce(op, &values)?));
                }
            }
            "aggregate" => {
                let key = string_arg(ins, 0)?;
                let bucket = self.side_effects.entry(key.to_owned()).or_default();
                bucket.extend(input.iter().map(|t| t.obj.clone()));
                out = input;
            }
            "cap" => {
                let key = string_arg(ins, 0)?;
                let values = self.side_effects.get(key).cloned().unwrap_or_default();
                out.push(Trav::new(Obj::List(values)));
            }
            "limit" => out.extend(input.into_iter().take(count_arg(ins, 0)?)),
            "skip" => out.extend(input.into_iter().skip(count_arg(ins, 0)?)),
            "range" => {
                let low = count_arg(ins, 0)?;
                let high = count_arg(ins, 1)?;
                out.extend(input.into_iter().skip(low).take(high.saturating_sub(low)));
            }
            "barrier" | "identity" => out = input,
            "sideEffect" => {
                let child = traversal_arg(ins, 0)?;
                for t in input {
                    self.run_from(child, 0, vec![t.clone()])?;
                    out.push(t);
                }
            }
            "map" => match ins.arguments.first() {
                Some(Argument::Function { symbol }) => {
                    for t in &input {
                        let value = self.apply(symbol, &t.obj)?;
                        out.push(t.with(value));
                    }
                }
                _ => {
                    let child = traversal_arg(ins, 0)?;
                    for t in &input {
                        if let Some(obj) = self.first(child, t)? {
                            out.push(t.with(obj));
                        }
                    }
                }
            },
            "flatMap" => {
                let child = traversal_arg(ins, 0)?;
                for t in &input {
                    for obj in self.objects(child, t)? {
                        out.push(t.with(obj));
                    }
                }
            }
            other => return fail(format!("unsupported operator {other}()")),
        }
        Ok(out)
    }

    fn value(&self, arg: &Argument) -> Res<Obj> {
        Ok(match arg {
            Argument::Bool(b) => Obj::Bool(*b),
            Argument::Int(i) => Obj::Int(*i),
            Argument::Float(f) => Obj::Float(*f),
            Argument::String(s) | Argument::Token(s) => Obj::Str(s.clone()),
            Argument::List(items) => {
                Obj::List(items.iter().map(|i| self.value(i)).collect::<Res<_>>()?)
            }
            Argument::Map(entries) => Obj::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((Obj::Str(k.clone()), self.value(v)?)))
                    .collect::<Res<_>>()?,
            ),
            Argument::Binding { name } => match self.params.get(name) {
                Some(literal) => from_literal(literal),
                None => return fail(format!("unbound parameter {name}")),
            },
            other => return fail(format!("{other:?} is not a value")),
        })
    }

    fn require(&self, symbol: &str) -> Res<()> {
        if self.symbols.iter().any(|s| s == symbol) {
            Ok(())
        } else {
            fail(format!("No such function: {symbol}"))
        }
    }

    fn test(&self, predicate: &Argument, obj: &Obj) -> Res<bool> {
        let Argument::Predicate { operator, value } = predicate else {
            return fail(format!("expected a predicate, got {predicate:?}"));
        };
        if operator.starts_with("cypher") {
            self.require(operator)?;
        }
        let args = value
            .iter()
            .map(|a| self.value(a))
            .collect::<Res<Vec<_>>>()?;
        let arg = args.first();
        let text = |check: fn(&str, &str) -> bool| match (obj, arg) {
            (Obj::Str(s), Some(Obj::Str(p))) if !token::is_reserved(s) => check(s, p),
            _ => false,
        };
        Ok(match operator.as_str() {
            "eq" => arg.is_some_and(|a| loose_eq(obj, a)),
            "neq" => arg.is_some_and(|a| !loose_eq(obj, a)),
            "lt" => arg.and_then(|a| compare(obj, a)) == Some(Ordering::Less),
            "lte" => matches!(arg.and_then(|a| compare(obj, a)), Some(Ordering::Less | Ordering::Equal)),
            "gt" => arg.and_then(|a| compare(obj, a)) == Some(Ordering::Greater),
            "gte" => matches!(
                arg.and_then(|a| compare(obj, a)),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            "within" => flatten(&args).iter().any(|a| loose_eq(obj, a)),
            "without" => !flatten(&args).iter().any(|a| loose_eq(obj, a)),
            "startingWith" | "cypherStartsWith" => text(|s, p| s.starts_with(p)),
            "endingWith" | "cypherEndsWith" => text(|s, p| s.ends_with(p)),
            "containing" | "cypherContains" => text(|s, p| s.contains(p)),
            "cypherIsNode" => matches!(obj, Obj::Vertex(_)),
            "cypherIsRelationship" => matches!(obj, Obj::Edge(_)),
            "cypherIsString" => matches!(obj, Obj::Str(s) if !token::is_reserved(s)),
            other => return fail(format!("unknown predicate {other}")),
        })
    }

    fn apply(&self, symbol: &str, obj: &Obj) -> Res<Obj> {
        self.require(symbol)?;
        Ok(match (symbol, obj) {
            ("cypherException", Obj::Str(message)) => return fail(message.clone()),
            ("cypherToString", Obj::Str(s)) => Obj::Str(s.clone()),
            ("cypherToString", Obj::Int(i)) => Obj::Str(i.to_string()),
            ("cypherToString", Obj::Float(f)) => Obj::Str(format!("{f:?}")),
            ("cypherToString", Obj::Bool(b)) => Obj::Str(b.to_string()),
            ("cypherToBoolean", Obj::Bool(b)) => Obj::Bool(*b),
            ("cypherToBoolean", Obj::Str(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Obj::Bool(true),
                "false" => Obj::Bool(false),
                _ => null(),
            },
            ("cypherToInteger", Obj::Int(i)) => Obj::Int(*i),
            ("cypherToInteger", Obj::Float(f)) => Obj::Int(f.trunc() as i64),
            ("cypherToInteger", Obj::Str(s)) => s
                .trim()
                .parse::<i64>()
                .map(Obj::Int)
                .or_else(|_| s.trim().parse::<f64>().map(|f| Obj::Int(f.trunc() as i64)))
                .unwrap_or_else(|_| null()),
            ("cypherToFloat", Obj::Int(i)) => Obj::Float(*i as f64),
            ("cypherToFloat", Obj::Float(f)) => Obj::Float(*f),
            ("cypherToFloat", Obj::Str(s)) => {
                s.trim().parse::<f64>().map(Obj::Float).unwrap_or_else(|_| null())
            }
            ("cypherLength" | "cypherSize", Obj::Str(s)) => int(s.chars().count()),
            ("cypherLength" | "cypherSize", Obj::List(items)) => int(items.len()),
            ("cypherProperties", Obj::Vertex(_) | Obj::Edge(_)) => Obj::Map(
                self.graph
                    .element(obj)?
                    .properties
                    .iter()
                    .map(|(k, v)| (Obj::Str(k.clone()), v.clone()))
                    .collect(),
            ),
            ("cypherProperties", Obj::Map(_)) => obj.clone(),
            (symbol, other) => return fail(format!("{symbol} cannot be applied to {other:?}")),
        })
    }

    fn value_map(&self, obj: &Obj, tokens: bool) -> Res<Obj> {
        let element = self.graph.element(obj)?;
        let vertex = matches!(obj, Obj::Vertex(_));
        let mut entries = Vec::with_capacity(element.properties.len() + 2);
        if tokens {
            let id = match obj {
                Obj::Vertex(id) | Obj::Edge(id) => *id,
                _ => 0,
            };
            entries.push((Obj::T(TKey::Id), Obj::Int(id)));
            entries.push((Obj::T(TKey::Label), Obj::Str(element.label.clone())));
        }
        for (k, v) in &element.properties {
            let value = if vertex {
                Obj::List(vec![v.clone()])
            } else {
                v.clone()
            };
            entries.push((Obj::Str(k.clone()), value));
        }
        Ok(Obj::Map(entries))
    }

    fn row(&self, obj: &Obj) -> Res<RawRow> {
        let Obj::Map(entries) = obj else {
            return fail(format!("result {obj:?} is not a row"));
        };
        entries
            .iter()
            .map(|(k, v)| match k {
                Obj::Str(name) => Ok((name.clone(), self.raw(v)?)),
                other => fail(format!("row key {other:?} is not a string")),
            })
            .collect()
    }

    fn raw(&self, obj: &Obj) -> Res<RawValue> {
        Ok(match obj {
            Obj::Null => RawValue::Null,
            Obj::Bool(b) => RawValue::Bool(*b),
            Obj::Int(i) => RawValue::Int(*i),
            Obj::Float(f) => RawValue::Float(*f),
            Obj::Str(s) => RawValue::String(s.clone()),
            Obj::List(items) => {
                RawValue::List(items.iter().map(|i| self.raw(i)).collect::<Res<_>>()?)
            }
            Obj::Map(entries) => RawValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((raw_key(k), self.raw(v)?)))
                    .collect::<Res<_>>()?,
            ),
            Obj::Entry(k, v) => {
                RawValue::Map([(raw_key(k), self.raw(v)?)].into_iter().collect())
            }
            Obj::T(TKey::Id) => RawValue::String("T.id".into()),
            Obj::T(TKey::Label) => RawValue::String("T.label".into()),
            Obj::Vertex(id) => {
                let element = self.graph.element(obj)?;
                RawValue::Vertex {
                    id: ElementId::Int(*id),
                    label: element.label.clone(),
                    properties: element
                        .properties
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), RawValue::List(vec![self.raw(v)?]))))
                        .collect::<Res<_>>()?,
                }
            }
            Obj::Edge(id) => {
                let Some(edge) = self.graph.edges.get(id) else {
                    return fail(format!("edge {id} was removed"));
                };
                RawValue::Edge {
                    id: ElementId::Int(*id),
                    label: edge.element.label.clone(),
                    out_v: ElementId::Int(edge.out_v),
                    in_v: ElementId::Int(edge.in_v),
                    properties: edge
                        .element
                        .properties
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), self.raw(v)?)))
                        .collect::<Res<_>>()?,
                }
            }
            Obj::Property { value, .. } => self.raw(value)?,
        })
    }
}

fn raw_key(key: &Obj) -> RawKey {
    match key {
        Obj::T(TKey::Id) => RawKey::Id,
        Obj::T(TKey::Label) => RawKey::Label,
        Obj::Str(name) => RawKey::Name(name.clone()),
        other => RawKey::Name(format!("{other:?}")),
    }
}

/// Binds a parameter the way a server would: a bare null stays a host null.
fn from_literal(literal: &Literal) -> Obj {
    match literal {
        Literal::Null => Obj::Null,
        Literal::Bool(b) => Obj::Bool(*b),
        Literal::Int(i) => Obj::Int(*i),
        Literal::Float(f) => Obj::Float(*f),
        Literal::String(s) => Obj::Str(s.clone()),
        Literal::List(items) => Obj::List(items.iter().map(from_literal).collect()),
        Literal::Map(entries) => Obj::Map(
            entries
                .iter()
                .map(|(k, v)| (Obj::Str(k.clone()), from_literal(v)))
                .collect(),
        ),
    }
}

fn flatten(args: &[Obj]) -> Vec<Obj> {
    match args {
        [Obj::List(items)] => items.clone(),
        other => other.to_vec(),
    }
}

fn number(obj: &Obj) -> Option<f64> {
    match obj {
        Obj::Int(i) => Some(*i as f64),
        Obj::Float(f) => Some(*f),
        _ => None,
    }
}

fn loose_eq(a: &Obj, b: &Obj) -> bool {
    match (a, b) {
        (Obj::Int(x), Obj::Int(y)) => x == y,
        _ => match (number(a), number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
    }
}

fn compare(a: &Obj, b: &Obj) -> Option<Ordering> {
    match (a, b) {
        (Obj::Int(x), Obj::Int(y)) => Some(x.cmp(y)),
        (Obj::Str(x), Obj::Str(y)) if !token::is_reserved(x) && !token::is_reserved(y) => {
            Some(x.cmp(y))
        }
        (Obj::Bool(x), Obj::Bool(y)) => Some(x.cmp(y)),
        _ => number(a)?.partial_cmp(&number(b)?),
    }
}

fn rank(obj: &Obj) -> u8 {
    match obj {
        Obj::Null => 0,
        Obj::Bool(_) => 1,
        Obj::Int(_) | Obj::Float(_) => 2,
        Obj::Str(_) => 3,
        Obj::Vertex(_) => 4,
        Obj::Edge(_) => 5,
        Obj::List(_) => 6,
        Obj::Map(_) => 7,
        _ => 8,
    }
}

/// Total order used by `order()`, `min()` and `max()`. Types sort by rank;
/// the engine knows nothing of sentinel strings and orders them as text.
fn sort_order(a: &Obj, b: &Obj) -> Ordering {
    match (a, b) {
        (Obj::Int(x), Obj::Int(y)) => x.cmp(y),
        (Obj::Str(x), Obj::Str(y)) => x.cmp(y),
        (Obj::Bool(x), Obj::Bool(y)) => x.cmp(y),
        (Obj::Vertex(x), Obj::Vertex(y)) | (Obj::Edge(x), Obj::Edge(y)) => x.cmp(y),
        _ => match (number(a), number(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

fn compare_with(operator: &str, left: &Obj, right: &Obj) -> Res<bool> {
    Ok(match operator {
        "eq" => loose_eq(left, right),
        "neq" => !loose_eq(left, right),
        "without" => match right {
            Obj::List(items) => !items.iter().any(|i| loose_eq(left, i)),
            other => !loose_eq(left, other),
        },
        "lt" => compare(left, right) == Some(Ordering::Less),
        "lte" => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
        "gt" => compare(left, right) == Some(Ordering::Greater),
        "gte" => matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)),
        other => return fail(format!("unknown where() comparison {other}")),
    })
}

fn reduce(op: &str, values: &[Obj]) -> Res<Obj> {
    match op {
        "sum" => {
            if values.iter().all(|v| matches!(v, Obj::Int(_))) {
                let mut total: i64 = 0;
                for v in values {
                    if let Obj::Int(i) = v {
                        total = match total.checked_add(*i) {
                            Some(total) => total,
                            None => return fail("integer overflow in sum()"),
                        };
                    }
                }
                Ok(Obj::Int(total))
            } else {
                let mut total = 0.0;
                for v in values {
                    match number(v) {
                        Some(n) => total += n,
                        None => return fail(format!("sum() over {v:?}")),
                    }
                }
                Ok(Obj::Float(total))
            }
        }
        "mean" => {
            let mut total = 0.0;
            for v in values {
                match number(v) {
                    Some(n) => total += n,
                    None => return fail(format!("mean() over {v:?}")),
                }
            }
            Ok(Obj::Float(total / values.len() as f64))
        }
        _ => {
            let mut best = values[0].clone();
            for v in &values[1..] {
                let ord = sort_order(v, &best);
                if (op == "min" && ord == Ordering::Less) || (op == "max" && ord == Ordering::Greater) {
                    best = v.clone();
                }
            }
            Ok(best)
        }
    }
}
