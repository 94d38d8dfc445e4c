//! Cypher AST to IR lowering.
//!
//! Lowering walks the clauses in order and appends steps to a single root
//! traversal. Cypher semantics the traversal model lacks are encoded with
//! sentinel tokens: null is [`Token::Null`], anonymous pattern elements get
//! `UNNAMED` labels, compiler temporaries get `GENERATED` labels, and
//! re-binding maps get `FRESHID` labels. All three share one counter that
//! starts at 1 for every translation, so output is deterministic.

#![forbid(unsafe_code)]

mod expr;
mod mutation;
mod pattern;
mod projection;

use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::ast::{Clause, Query};
use crate::error::TranslationError;
use crate::ir::{check_labels, token, Label, Predicate, Statement, Step, Token, Traversal, Value};
use crate::value::Literal;

/// Lowers a parsed query into an IR statement.
pub fn lower(query: &Query) -> Result<Statement, TranslationError> {
    let Some(last) = query.clauses.len().checked_sub(1) else {
        return Err(TranslationError::InvalidQuery {
            reason: "query has no clauses",
        });
    };
    let mut lowering = Lowering::new();
    let mut columns = Vec::new();
    for (idx, clause) in query.clauses.iter().enumerate() {
        trace!(idx, clause = clause_name(clause), "lowering clause");
        match clause {
            Clause::Match(clause) => lowering.match_clause(clause)?,
            Clause::Unwind { expr, alias } => lowering.unwind(expr, alias)?,
            Clause::With(projection) => lowering.with(projection)?,
            Clause::Return(projection) => {
                if idx != last {
                    return Err(TranslationError::InvalidQuery {
                        reason: "RETURN must be the final clause",
                    });
                }
                columns = lowering.return_clause(projection)?;
            }
            Clause::Create { patterns } => lowering.create(patterns)?,
            Clause::Merge { pattern } => lowering.merge(pattern)?,
            Clause::Set { items } => lowering.set(items)?,
            Clause::Remove { items } => lowering.remove(items)?,
            Clause::Delete { detach, targets } => lowering.delete(*detach, targets)?,
        }
    }
    let returns = matches!(query.clauses.last(), Some(Clause::Return(_)));
    let traversal = lowering.finish(returns);
    check_labels(&traversal)?;
    debug!(
        steps = traversal.deep_len(),
        columns = columns.len(),
        "lowered query"
    );
    Ok(Statement { traversal, columns })
}

fn clause_name(clause: &Clause) -> &'static str {
    match clause {
        Clause::Match(m) if m.optional => "OPTIONAL MATCH",
        Clause::Match(_) => "MATCH",
        Clause::Unwind { .. } => "UNWIND",
        Clause::With(_) => "WITH",
        Clause::Return(_) => "RETURN",
        Clause::Create { .. } => "CREATE",
        Clause::Merge { .. } => "MERGE",
        Clause::Set { .. } => "SET",
        Clause::Remove { .. } => "REMOVE",
        Clause::Delete { .. } => "DELETE",
    }
}

/// What a Cypher variable is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VarKind {
    Node,
    Relationship,
    Path,
    Map,
    Value,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct VarInfo {
    kind: VarKind,
    /// Bound by a construct that may produce null (optional match, WITH, UNWIND).
    nullable: bool,
}

/// Labels making up a named path, start node first.
#[derive(Clone, Debug)]
pub(crate) struct PathShape {
    /// Label to select for each element, alternating node and relationship.
    elements: Vec<(Label, VarKind)>,
}

impl PathShape {
    fn hops(&self) -> usize {
        self.elements.len() / 2
    }
}

/// Which delete buckets the statement has used.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct DeleteStaging {
    nodes: bool,
    detached: bool,
}

/// Whether projected elements are tagged for the result normalizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Values consumed by later steps.
    Raw,
    /// Values handed back to the caller.
    Return,
}

pub(crate) struct Lowering {
    root: Traversal,
    counter: u32,
    scope: IndexMap<String, VarInfo>,
    paths: HashMap<String, PathShape>,
    deletes: DeleteStaging,
}

impl Lowering {
    fn new() -> Self {
        Lowering {
            root: Traversal::new(),
            counter: 1,
            scope: IndexMap::new(),
            paths: HashMap::new(),
            deletes: DeleteStaging::default(),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.counter;
        self.counter += 1;
        id
    }

    fn generated(&mut self) -> Label {
        let id = self.next_id();
        Label::from(Token::Generated(id))
    }

    fn unnamed(&mut self) -> Label {
        let id = self.next_id();
        Label::from(Token::Unnamed(id))
    }

    fn fresh_id(&mut self) -> Label {
        let id = self.next_id();
        Label::from(Token::FreshId(id))
    }

    /// Seeds the root with `inject(START)` when nothing produced a traverser yet.
    fn ensure_started(&mut self) {
        if self.root.is_empty() {
            self.root.push(Step::Inject(vec![Value::Token(Token::Start)]));
        }
    }

    fn declare(&mut self, name: &str, kind: VarKind, nullable: bool) {
        self.scope
            .insert(name.to_owned(), VarInfo { kind, nullable });
    }

    fn lookup(&self, name: &str, context: &'static str) -> Result<VarInfo, TranslationError> {
        self.scope
            .get(name)
            .copied()
            .ok_or_else(|| TranslationError::unknown_var(name, context))
    }

    /// `select(name)`, dropping the traverser when a nullable binding holds null.
    fn select_bound(&self, name: &str, info: VarInfo) -> Traversal {
        let mut steps = Traversal::of([Step::Select(vec![Label::named(name)])]);
        if info.nullable {
            steps.push(Step::Is(Predicate::Neq(Value::Token(Token::Null))));
        }
        steps
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scope.contains_key(name)
    }

    fn literal(&self, literal: &Literal) -> Result<Value, TranslationError> {
        Ok(match literal {
            Literal::Null => Value::Token(Token::Null),
            Literal::Bool(v) => Value::Bool(*v),
            Literal::Int(v) => Value::Int(*v),
            Literal::Float(v) => {
                if !v.is_finite() {
                    return Err(TranslationError::InvalidArgument {
                        context: "float literal",
                        reason: format!("{v} is not finite"),
                    });
                }
                Value::Float(*v)
            }
            Literal::String(s) => {
                user_name(s, "string literal")?;
                Value::String(s.clone())
            }
            Literal::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| self.literal(item))
                    .collect::<Result<_, _>>()?,
            ),
            Literal::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| {
                        user_name(key, "map key")?;
                        Ok((key.clone(), self.literal(value)?))
                    })
                    .collect::<Result<_, TranslationError>>()?,
            ),
        })
    }

    /// Appends the deferred delete phase and the write-only tail.
    fn finish(mut self, returns: bool) -> Traversal {
        if self.deletes.nodes || self.deletes.detached {
            self.delete_phase(returns);
        } else if !returns {
            self.root.push(Step::Barrier);
            self.root.push(Step::Limit(0));
        }
        self.root
    }
}

/// Rejects user-supplied names that collide with the token prefix.
pub(crate) fn user_name(name: &str, context: &'static str) -> Result<(), TranslationError> {
    if token::is_reserved(name) {
        return Err(TranslationError::ReservedToken {
            value: name.to_owned(),
            context,
        });
    }
    Ok(())
}
