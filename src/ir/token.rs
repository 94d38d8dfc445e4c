//! Reserved sentinel tokens.
//!
//! Every token is encoded as [`PREFIX`] followed by a fixed name and, for the
//! parameterised variants, a suffix. The prefix is two ASCII spaces; lowering
//! rejects user strings that start with it, so an encoded token can never be
//! confused with user data. The encoded forms are a compatibility contract
//! with engines and result consumers and must not change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Leading byte sequence shared by every encoded token.
pub const PREFIX: &str = "  ";

const START: &str = "  cypher.start";
const NULL: &str = "  cypher.null";
const UNUSED: &str = "  cypher.unused";
const NONEXISTENT: &str = "  cypher.nonexistent";
const PATH_START: &str = "  cypher.path.start.";
const PATH_EDGE: &str = "  cypher.path.edge.";
const PROJECTION_RELATIONSHIP: &str = "  cypher.relationship";
const PROJECTION_ELEMENT: &str = "  cypher.element";
const PROJECTION_ID: &str = "  cypher.id";
const PROJECTION_INV: &str = "  cypher.inv";
const PROJECTION_OUTV: &str = "  cypher.outv";
const GENERATED: &str = "  GENERATED";
const UNNAMED: &str = "  UNNAMED";
const FRESHID: &str = "  FRESHID";
const DELETE: &str = "  cypher.delete";
const DETACH_DELETE: &str = "  cypher.delete.detach";
const DELETE_ONCE: &str = "  cypher.delete.once";

/// Sentinel token table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Token {
    /// Seed object for traversals that do not start from the graph.
    Start,
    /// Cypher `null`.
    Null,
    /// Padding slot that keeps optional-match results map-shaped.
    Unused,
    /// Value of the padding slot when an optional pattern did not match.
    Nonexistent,
    /// Anchor on the first node of path `p`.
    PathStart(String),
    /// Marker on a relationship hop of path `p`.
    PathEdge(String),
    /// Projection key holding a relationship's value map.
    ProjectionRelationship,
    /// Projection key holding a node's value map.
    ProjectionElement,
    /// Projection key holding an element id.
    ProjectionId,
    /// Projection key holding a relationship's incoming vertex id.
    ProjectionInv,
    /// Projection key holding a relationship's outgoing vertex id.
    ProjectionOutv,
    /// Compiler temporary.
    Generated(u32),
    /// Anonymous pattern element.
    Unnamed(u32),
    /// Re-binding map introduced by `WITH` and `OPTIONAL MATCH`.
    FreshId(u32),
    /// Side-effect bucket for nodes deleted without `DETACH`.
    Delete,
    /// Side-effect bucket for relationships and detached nodes.
    DetachDelete,
    /// Label of the single traverser running the delete phase.
    DeleteOnce,
}

impl Token {
    /// Encoded string form.
    pub fn encode(&self) -> String {
        match self {
            Token::Start => START.to_owned(),
            Token::Null => NULL.to_owned(),
            Token::Unused => UNUSED.to_owned(),
            Token::Nonexistent => NONEXISTENT.to_owned(),
            Token::PathStart(name) => format!("{PATH_START}{name}"),
            Token::PathEdge(name) => format!("{PATH_EDGE}{name}"),
            Token::ProjectionRelationship => PROJECTION_RELATIONSHIP.to_owned(),
            Token::ProjectionElement => PROJECTION_ELEMENT.to_owned(),
            Token::ProjectionId => PROJECTION_ID.to_owned(),
            Token::ProjectionInv => PROJECTION_INV.to_owned(),
            Token::ProjectionOutv => PROJECTION_OUTV.to_owned(),
            Token::Generated(n) => format!("{GENERATED}{n}"),
            Token::Unnamed(n) => format!("{UNNAMED}{n}"),
            Token::FreshId(n) => format!("{FRESHID}{n}"),
            Token::Delete => DELETE.to_owned(),
            Token::DetachDelete => DETACH_DELETE.to_owned(),
            Token::DeleteOnce => DELETE_ONCE.to_owned(),
        }
    }

    /// Parses an encoded token. Returns `None` for ordinary strings.
    pub fn decode(raw: &str) -> Option<Token> {
        if !is_reserved(raw) {
            return None;
        }
        let fixed = match raw {
            START => Some(Token::Start),
            NULL => Some(Token::Null),
            UNUSED => Some(Token::Unused),
            NONEXISTENT => Some(Token::Nonexistent),
            PROJECTION_RELATIONSHIP => Some(Token::ProjectionRelationship),
            PROJECTION_ELEMENT => Some(Token::ProjectionElement),
            PROJECTION_ID => Some(Token::ProjectionId),
            PROJECTION_INV => Some(Token::ProjectionInv),
            PROJECTION_OUTV => Some(Token::ProjectionOutv),
            DELETE => Some(Token::Delete),
            DETACH_DELETE => Some(Token::DetachDelete),
            DELETE_ONCE => Some(Token::DeleteOnce),
            _ => None,
        };
        if fixed.is_some() {
            return fixed;
        }
        if let Some(name) = raw.strip_prefix(PATH_START) {
            return Some(Token::PathStart(name.to_owned()));
        }
        if let Some(name) = raw.strip_prefix(PATH_EDGE) {
            return Some(Token::PathEdge(name.to_owned()));
        }
        let counters: [(&str, fn(u32) -> Token); 3] = [
            (GENERATED, Token::Generated),
            (UNNAMED, Token::Unnamed),
            (FRESHID, Token::FreshId),
        ];
        for (prefix, make) in counters {
            if let Some(n) = raw.strip_prefix(prefix).and_then(|n| n.parse().ok()) {
                return Some(make(n));
            }
        }
        None
    }

    /// True for compiler-introduced labels that users never see.
    pub fn is_synthetic_label(&self) -> bool {
        matches!(
            self,
            Token::Generated(_) | Token::Unnamed(_) | Token::FreshId(_)
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// True when `raw` starts with the reserved token prefix.
pub fn is_reserved(raw: &str) -> bool {
    raw.starts_with(PREFIX)
}
