//! Raw engine output back into Cypher values.
//!
//! Lowering tags every returned element with a projection token so this
//! module can tell a whole node from its id from a path fragment without
//! guessing. Anything it cannot place is a [`NormalizationError`]: such a
//! value means lowering and the engine disagree, never that the user erred.

#![forbid(unsafe_code)]

mod value;

use indexmap::IndexMap;
use tracing::trace;

pub use value::{
    CypherValue, ElementId, Node, Path, PathElement, RawKey, RawRow, RawValue, Relationship,
    ResultRow,
};

use crate::error::NormalizationError;
use crate::ir::{ColumnKind, OutputColumn, Token};

/// Normalizes one raw row against the statement's output columns.
pub fn normalize(raw: &RawRow, columns: &[OutputColumn]) -> Result<ResultRow, NormalizationError> {
    let mut out = IndexMap::with_capacity(columns.len());
    for column in columns {
        let value = raw
            .get(&column.name)
            .ok_or_else(|| NormalizationError::MissingColumn {
                column: column.name.clone(),
            })?;
        let ctx = Context {
            column: &column.name,
        };
        let normalized = ctx.value(value)?;
        ctx.check_kind(column.kind, &normalized)?;
        out.insert(column.name.clone(), normalized);
    }
    trace!(columns = out.len(), "normalized row");
    Ok(ResultRow::new(out))
}

struct Context<'a> {
    column: &'a str,
}

/// Tag found on a projection map.
enum Tag {
    Element(RawValue),
    Relationship { map: RawValue, inv: RawValue, outv: RawValue },
    Id(RawValue),
    PathStart,
}

impl Context<'_> {
    fn shape(&self, expected: &'static str, found: impl Into<String>) -> NormalizationError {
        NormalizationError::UnexpectedShape {
            column: self.column.to_owned(),
            expected,
            found: found.into(),
        }
    }

    fn value(&self, raw: &RawValue) -> Result<CypherValue, NormalizationError> {
        match raw {
            RawValue::Null => Ok(CypherValue::Null),
            RawValue::Bool(b) => Ok(CypherValue::Bool(*b)),
            RawValue::Int(i) => Ok(CypherValue::Int(*i)),
            RawValue::Float(f) => Ok(CypherValue::Float(*f)),
            RawValue::String(s) => self.string(s),
            RawValue::List(items) => {
                if let Some(RawValue::Map(first)) = items.first() {
                    if matches!(self.tag(first)?, Some(Tag::PathStart)) {
                        return self.path(items).map(CypherValue::Path);
                    }
                }
                items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<Result<_, _>>()
                    .map(CypherValue::List)
            }
            RawValue::Map(map) => match self.tag(map)? {
                Some(Tag::Element(element)) => self.node(&element).map(CypherValue::Node),
                Some(Tag::Relationship { map, inv, outv }) => self
                    .relationship(&map, &inv, &outv)
                    .map(CypherValue::Relationship),
                Some(Tag::Id(id)) => self.id(&id).map(CypherValue::from),
                Some(Tag::PathStart) => Err(self.shape("path list", "bare path start map")),
                None => self.plain_map(map),
            },
            RawValue::Vertex {
                id,
                label,
                properties,
            } => Ok(CypherValue::Node(Node {
                id: id.clone(),
                labels: vec![label.clone()],
                properties: self.properties(properties, true)?,
            })),
            RawValue::Edge {
                id,
                label,
                out_v,
                in_v,
                properties,
            } => Ok(CypherValue::Relationship(Relationship {
                id: id.clone(),
                rel_type: label.clone(),
                start_id: out_v.clone(),
                end_id: in_v.clone(),
                properties: self.properties(properties, false)?,
            })),
        }
    }

    fn string(&self, s: &str) -> Result<CypherValue, NormalizationError> {
        match Token::decode(s) {
            None => Ok(CypherValue::String(s.to_owned())),
            Some(Token::Null | Token::Nonexistent) => Ok(CypherValue::Null),
            Some(_) => Err(self.shape("value", format!("token {s:?}"))),
        }
    }

    /// Classifies a map by its single tag key, if it carries one.
    fn tag(&self, map: &IndexMap<RawKey, RawValue>) -> Result<Option<Tag>, NormalizationError> {
        let mut element = None;
        let mut relationship = None;
        let mut id = None;
        let mut inv = None;
        let mut outv = None;
        let mut path_start = false;
        for (key, value) in map {
            let RawKey::Name(name) = key else { continue };
            match Token::decode(name) {
                Some(Token::ProjectionElement) => element = Some(value.clone()),
                Some(Token::ProjectionRelationship | Token::PathEdge(_)) => {
                    relationship = Some(value.clone())
                }
                Some(Token::ProjectionId) => id = Some(value.clone()),
                Some(Token::ProjectionInv) => inv = Some(value.clone()),
                Some(Token::ProjectionOutv) => outv = Some(value.clone()),
                Some(Token::PathStart(_)) => path_start = true,
                Some(_) => return Err(self.shape("projection tag", format!("key {name:?}"))),
                None => {}
            }
        }
        let tag = match (element, relationship, id) {
            (Some(element), None, None) => Some(Tag::Element(element)),
            (None, Some(map), None) => match (inv, outv) {
                (Some(inv), Some(outv)) => Some(Tag::Relationship { map, inv, outv }),
                _ => return Err(self.shape("relationship endpoints", "missing inv/outv")),
            },
            (None, None, Some(id)) => Some(Tag::Id(id)),
            (None, None, None) if path_start => Some(Tag::PathStart),
            (None, None, None) => None,
            _ => return Err(self.shape("single projection tag", "conflicting tags")),
        };
        Ok(tag)
    }

    fn id(&self, raw: &RawValue) -> Result<ElementId, NormalizationError> {
        match raw {
            RawValue::Int(id) => Ok(ElementId::Int(*id)),
            RawValue::String(id) if Token::decode(id).is_none() => Ok(ElementId::String(id.clone())),
            other => Err(self.shape("element id", other.kind())),
        }
    }

    /// `valueMap(true)` of a vertex.
    fn node(&self, raw: &RawValue) -> Result<Node, NormalizationError> {
        if let RawValue::Vertex { .. } = raw {
            return match self.value(raw)? {
                CypherValue::Node(node) => Ok(node),
                _ => Err(self.shape("node", raw.kind())),
            };
        }
        let RawValue::Map(map) = raw else {
            return Err(self.shape("node value map", raw.kind()));
        };
        let (id, label, properties) = self.element_map(map, true)?;
        Ok(Node {
            id,
            labels: vec![label],
            properties,
        })
    }

    fn relationship(
        &self,
        raw: &RawValue,
        inv: &RawValue,
        outv: &RawValue,
    ) -> Result<Relationship, NormalizationError> {
        let RawValue::Map(map) = raw else {
            return Err(self.shape("relationship value map", raw.kind()));
        };
        let (id, rel_type, properties) = self.element_map(map, false)?;
        Ok(Relationship {
            id,
            rel_type,
            start_id: self.id(outv)?,
            end_id: self.id(inv)?,
            properties,
        })
    }

    fn element_map(
        &self,
        map: &IndexMap<RawKey, RawValue>,
        vertex: bool,
    ) -> Result<(ElementId, String, IndexMap<String, CypherValue>), NormalizationError> {
        let mut id = None;
        let mut label = None;
        let mut properties = IndexMap::new();
        for (key, value) in map {
            match key {
                RawKey::Id => id = Some(self.id(value)?),
                RawKey::Label => match value {
                    RawValue::String(s) => label = Some(s.clone()),
                    other => return Err(self.shape("label string", other.kind())),
                },
                RawKey::Name(name) => {
                    properties.insert(name.clone(), self.property(value, vertex)?);
                }
            }
        }
        match (id, label) {
            (Some(id), Some(label)) => Ok((id, label, properties)),
            _ => Err(self.shape("element map with T.id and T.label", "untagged map")),
        }
    }

    fn properties(
        &self,
        raw: &IndexMap<String, RawValue>,
        vertex: bool,
    ) -> Result<IndexMap<String, CypherValue>, NormalizationError> {
        raw.iter()
            .map(|(k, v)| Ok((k.clone(), self.property(v, vertex)?)))
            .collect()
    }

    /// Vertex properties arrive as lists; single values are unwrapped.
    fn property(&self, raw: &RawValue, vertex: bool) -> Result<CypherValue, NormalizationError> {
        match raw {
            RawValue::List(items) if vertex && items.len() == 1 => self.value(&items[0]),
            other => self.value(other),
        }
    }

    fn plain_map(&self, map: &IndexMap<RawKey, RawValue>) -> Result<CypherValue, NormalizationError> {
        let mut out = IndexMap::with_capacity(map.len());
        for (key, value) in map {
            let RawKey::Name(name) = key else {
                return Err(self.shape("projection tag", "untagged element map"));
            };
            out.insert(name.clone(), self.value(value)?);
        }
        Ok(CypherValue::Map(out))
    }

    fn path(&self, items: &[RawValue]) -> Result<Path, NormalizationError> {
        let mut nodes = Vec::with_capacity(items.len() / 2 + 1);
        let mut relationships = Vec::with_capacity(items.len() / 2);
        for (position, item) in items.iter().enumerate() {
            let RawValue::Map(map) = item else {
                return Err(self.shape("path element map", item.kind()));
            };
            let expect_node = position % 2 == 0;
            match (expect_node, self.tag(map)?) {
                (true, Some(Tag::PathStart)) if position == 0 => {
                    let element = map.values().next().cloned().unwrap_or(RawValue::Null);
                    nodes.push(self.node(&element)?);
                }
                (true, Some(Tag::Element(element))) => nodes.push(self.node(&element)?),
                (false, Some(Tag::Relationship { map, inv, outv })) => {
                    relationships.push(self.relationship(&map, &inv, &outv)?)
                }
                _ => return Err(NormalizationError::BrokenPath {
                    column: self.column.to_owned(),
                    position,
                }),
            }
        }
        if nodes.len() != relationships.len() + 1 {
            return Err(NormalizationError::BrokenPath {
                column: self.column.to_owned(),
                position: items.len(),
            });
        }
        for (idx, rel) in relationships.iter().enumerate() {
            let (a, b) = (&nodes[idx].id, &nodes[idx + 1].id);
            let forward = rel.start_id == *a && rel.end_id == *b;
            let backward = rel.start_id == *b && rel.end_id == *a;
            if !forward && !backward {
                return Err(NormalizationError::BrokenPath {
                    column: self.column.to_owned(),
                    position: idx * 2 + 1,
                });
            }
        }
        Ok(Path {
            nodes,
            relationships,
        })
    }

    fn check_kind(&self, kind: ColumnKind, value: &CypherValue) -> Result<(), NormalizationError> {
        let ok = match (kind, value) {
            (_, CypherValue::Null) | (ColumnKind::Value, _) => true,
            (ColumnKind::Node, CypherValue::Node(_)) => true,
            (ColumnKind::Relationship, CypherValue::Relationship(_)) => true,
            (ColumnKind::Path, CypherValue::Path(_)) => true,
            (ColumnKind::Id, CypherValue::Int(_) | CypherValue::String(_)) => true,
            _ => false,
        };
        if ok {
            return Ok(());
        }
        let expected = match kind {
            ColumnKind::Node => "node",
            ColumnKind::Relationship => "relationship",
            ColumnKind::Path => "path",
            ColumnKind::Id => "element id",
            ColumnKind::Value => "value",
        };
        Err(self.shape(expected, format!("{value:?}")))
    }
}
