//! Raw engine values and the Cypher values they normalize into.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Native element id. Integer ids stay integers, string ids stay strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementId {
    /// Numeric id.
    Int(i64),
    /// String id.
    String(String),
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Int(id) => write!(f, "{id}"),
            ElementId::String(id) => f.write_str(id),
        }
    }
}

impl From<i64> for ElementId {
    fn from(id: i64) -> Self {
        ElementId::Int(id)
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        ElementId::String(id.to_owned())
    }
}

/// Key of a raw map: a Gremlin `T` token or a plain string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RawKey {
    /// `T.id`
    Id,
    /// `T.label`
    Label,
    /// Property key, projection key, or token-encoded tag.
    Name(String),
}

impl From<&str> for RawKey {
    fn from(name: &str) -> Self {
        RawKey::Name(name.to_owned())
    }
}

/// Value as returned by a traversal engine.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    /// Engine null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String, possibly a token encoding.
    String(String),
    /// List.
    List(Vec<RawValue>),
    /// Map.
    Map(IndexMap<RawKey, RawValue>),
    /// Vertex handle.
    Vertex {
        /// Native id.
        id: ElementId,
        /// Vertex label.
        label: String,
        /// Property values.
        properties: IndexMap<String, RawValue>,
    },
    /// Edge handle.
    Edge {
        /// Native id.
        id: ElementId,
        /// Edge label.
        label: String,
        /// Source vertex id.
        out_v: ElementId,
        /// Target vertex id.
        in_v: ElementId,
        /// Property values.
        properties: IndexMap<String, RawValue>,
    },
}

impl RawValue {
    /// Short shape name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "boolean",
            RawValue::Int(_) => "integer",
            RawValue::Float(_) => "float",
            RawValue::String(_) => "string",
            RawValue::List(_) => "list",
            RawValue::Map(_) => "map",
            RawValue::Vertex { .. } => "vertex",
            RawValue::Edge { .. } => "edge",
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::String(value.to_owned())
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

/// One raw result row keyed by column name.
pub type RawRow = IndexMap<String, RawValue>;

/// Graph node.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Node {
    /// Native id.
    pub id: ElementId,
    /// Node labels.
    pub labels: Vec<String>,
    /// Properties in engine order.
    pub properties: IndexMap<String, CypherValue>,
}

/// Graph relationship.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Relationship {
    /// Native id.
    pub id: ElementId,
    /// Relationship type.
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Source node id.
    pub start_id: ElementId,
    /// Target node id.
    pub end_id: ElementId,
    /// Properties in engine order.
    pub properties: IndexMap<String, CypherValue>,
}

/// Alternating node/relationship sequence.
///
/// `relationships.len() + 1 == nodes.len()`; relationship `i` connects
/// `nodes[i]` and `nodes[i + 1]` in either direction.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Path {
    /// Nodes in traversal order.
    pub nodes: Vec<Node>,
    /// Relationships in traversal order.
    pub relationships: Vec<Relationship>,
}

impl Path {
    /// Number of relationships.
    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    /// True for a single-node path.
    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    /// Path elements in alternating order, starting and ending with a node.
    pub fn elements(&self) -> Vec<PathElement<'_>> {
        let mut out = Vec::with_capacity(self.nodes.len() + self.relationships.len());
        for (idx, node) in self.nodes.iter().enumerate() {
            if idx > 0 {
                if let Some(rel) = self.relationships.get(idx - 1) {
                    out.push(PathElement::Relationship(rel));
                }
            }
            out.push(PathElement::Node(node));
        }
        out
    }
}

/// Borrowed path element.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathElement<'a> {
    /// A node.
    Node(&'a Node),
    /// A relationship.
    Relationship(&'a Relationship),
}

/// Cypher-shaped result value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CypherValue {
    /// Cypher null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    String(String),
    /// List.
    List(Vec<CypherValue>),
    /// Map.
    Map(IndexMap<String, CypherValue>),
    /// Node.
    Node(Node),
    /// Relationship.
    Relationship(Relationship),
    /// Path.
    Path(Path),
}

impl CypherValue {
    /// True for [`CypherValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, CypherValue::Null)
    }

    /// Node payload, if any.
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            CypherValue::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Relationship payload, if any.
    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            CypherValue::Relationship(rel) => Some(rel),
            _ => None,
        }
    }

    /// Path payload, if any.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            CypherValue::Path(path) => Some(path),
            _ => None,
        }
    }
}

impl From<ElementId> for CypherValue {
    fn from(id: ElementId) -> Self {
        match id {
            ElementId::Int(id) => CypherValue::Int(id),
            ElementId::String(id) => CypherValue::String(id),
        }
    }
}

/// Normalized row. Column order matches the query's projection.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultRow {
    columns: IndexMap<String, CypherValue>,
}

impl ResultRow {
    pub(crate) fn new(columns: IndexMap<String, CypherValue>) -> Self {
        ResultRow { columns }
    }

    /// Value of a column.
    pub fn get(&self, column: &str) -> Option<&CypherValue> {
        self.columns.get(column)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CypherValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Consumes the row.
    pub fn into_inner(self) -> IndexMap<String, CypherValue> {
        self.columns
    }
}
