//! Fluent construction of Cypher ASTs.
//!
//! The builder is a convenience for tests, benches, and embedders that do not
//! run a Cypher parser. Misuse is recorded and reported by [`QueryBuilder::build`]
//! instead of panicking mid-chain.

use std::mem;

use crate::ast::{
    Clause, Direction, Expr, Hop, MatchClause, NodePattern, Pattern, Projection,
    ProjectionItem, PropertyRef, RelPattern, SetItem, SortItem,
};
use crate::error::TranslationError;
use crate::value::Literal;

/// Node pattern bound to `var`.
pub fn node(var: impl Into<String>) -> NodePattern {
    NodePattern {
        var: Some(var.into()),
        ..NodePattern::default()
    }
}

impl NodePattern {
    /// Anonymous node pattern.
    pub fn anonymous() -> Self {
        NodePattern::default()
    }

    /// Adds a required label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Adds an inline property constraint.
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.properties.push((key.into(), Expr::Literal(value.into())));
        self
    }
}

impl RelPattern {
    /// Relationship pattern with the given direction and no constraints.
    pub fn new(direction: Direction) -> Self {
        RelPattern {
            var: None,
            types: Vec::new(),
            direction,
            properties: Vec::new(),
            length: None,
        }
    }

    /// Binds the relationship to `var`.
    pub fn var(mut self, var: impl Into<String>) -> Self {
        self.var = Some(var.into());
        self
    }

    /// Adds an alternative relationship type.
    pub fn typed(mut self, rel_type: impl Into<String>) -> Self {
        self.types.push(rel_type.into());
        self
    }

    /// Adds an inline property constraint.
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.properties.push((key.into(), Expr::Literal(value.into())));
        self
    }
}

impl From<NodePattern> for Pattern {
    fn from(start: NodePattern) -> Self {
        Pattern {
            path: None,
            start,
            hops: Vec::new(),
        }
    }
}

impl Pattern {
    /// Names the whole pattern as a path variable.
    pub fn named(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Appends a hop through `rel` to `node`.
    pub fn hop(mut self, rel: RelPattern, node: NodePattern) -> Self {
        self.hops.push(Hop { rel, node });
        self
    }

    /// Appends an outgoing hop.
    pub fn out(self, rel: RelPattern, node: NodePattern) -> Self {
        self.hop(
            RelPattern {
                direction: Direction::Out,
                ..rel
            },
            node,
        )
    }

    /// Appends an incoming hop.
    pub fn inbound(self, rel: RelPattern, node: NodePattern) -> Self {
        self.hop(
            RelPattern {
                direction: Direction::In,
                ..rel
            },
            node,
        )
    }
}

impl From<Expr> for ProjectionItem {
    fn from(expr: Expr) -> Self {
        ProjectionItem { expr, alias: None }
    }
}

impl<S: Into<String>> From<(Expr, S)> for ProjectionItem {
    fn from((expr, alias): (Expr, S)) -> Self {
        ProjectionItem {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// Fluent builder producing a [`crate::ast::Query`].
#[derive(Default)]
pub struct QueryBuilder {
    clauses: Vec<Clause>,
    error: Option<TranslationError>,
}

impl QueryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `MATCH` clause over the supplied patterns.
    pub fn r#match<P: Into<Pattern>>(self, patterns: impl IntoIterator<Item = P>) -> Self {
        self.push_match(false, patterns)
    }

    /// Adds an `OPTIONAL MATCH` clause over the supplied patterns.
    pub fn optional_match<P: Into<Pattern>>(self, patterns: impl IntoIterator<Item = P>) -> Self {
        self.push_match(true, patterns)
    }

    fn push_match<P: Into<Pattern>>(
        mut self,
        optional: bool,
        patterns: impl IntoIterator<Item = P>,
    ) -> Self {
        let patterns: Vec<Pattern> = patterns.into_iter().map(Into::into).collect();
        if patterns.is_empty() {
            self.fail("MATCH requires at least one pattern");
            return self;
        }
        self.clauses.push(Clause::Match(MatchClause {
            optional,
            patterns,
            predicate: None,
        }));
        self
    }

    /// Attaches a `WHERE` predicate to the preceding `MATCH` or `WITH`.
    pub fn r#where(mut self, predicate: Expr) -> Self {
        let slot = match self.clauses.last_mut() {
            Some(Clause::Match(clause)) => Some(&mut clause.predicate),
            Some(Clause::With(projection)) => Some(&mut projection.predicate),
            _ => None,
        };
        match slot {
            Some(slot) => {
                *slot = Some(match slot.take() {
                    Some(existing) => existing.and(predicate),
                    None => predicate,
                });
            }
            None => self.fail("WHERE must follow MATCH or WITH"),
        }
        self
    }

    /// Adds `UNWIND expr AS alias`.
    pub fn unwind(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.clauses.push(Clause::Unwind {
            expr,
            alias: alias.into(),
        });
        self
    }

    /// Adds a `WITH` projection.
    pub fn with<I: Into<ProjectionItem>>(mut self, items: impl IntoIterator<Item = I>) -> Self {
        let projection = self.projection(items);
        self.clauses.push(Clause::With(projection));
        self
    }

    /// Adds a `RETURN` projection.
    pub fn r#return<I: Into<ProjectionItem>>(mut self, items: impl IntoIterator<Item = I>) -> Self {
        let projection = self.projection(items);
        self.clauses.push(Clause::Return(projection));
        self
    }

    /// Adds `RETURN *`.
    pub fn return_all(mut self) -> Self {
        self.clauses.push(Clause::Return(Projection {
            star: true,
            ..Projection::default()
        }));
        self
    }

    fn projection<I: Into<ProjectionItem>>(
        &mut self,
        items: impl IntoIterator<Item = I>,
    ) -> Projection {
        let items: Vec<ProjectionItem> = items.into_iter().map(Into::into).collect();
        if items.is_empty() {
            self.fail("projection requires at least one item");
        }
        Projection {
            items,
            ..Projection::default()
        }
    }

    /// Marks the preceding projection as `DISTINCT`.
    pub fn distinct(mut self) -> Self {
        if let Some(projection) = self.last_projection() {
            projection.distinct = true;
        }
        self
    }

    /// Adds an `ORDER BY` key to the preceding projection.
    pub fn order_by(mut self, expr: Expr, descending: bool) -> Self {
        if let Some(projection) = self.last_projection() {
            projection.order_by.push(SortItem { expr, descending });
        }
        self
    }

    /// Sets `SKIP` on the preceding projection.
    pub fn skip(mut self, count: i64) -> Self {
        if let Some(projection) = self.last_projection() {
            projection.skip = Some(Expr::lit(count));
        }
        self
    }

    /// Sets `LIMIT` on the preceding projection.
    pub fn limit(mut self, count: i64) -> Self {
        if let Some(projection) = self.last_projection() {
            projection.limit = Some(Expr::lit(count));
        }
        self
    }

    fn last_projection(&mut self) -> Option<&mut Projection> {
        let found = matches!(
            self.clauses.last(),
            Some(Clause::With(_)) | Some(Clause::Return(_))
        );
        if !found {
            self.fail("projection modifier must follow WITH or RETURN");
            return None;
        }
        match self.clauses.last_mut() {
            Some(Clause::With(projection)) | Some(Clause::Return(projection)) => Some(projection),
            _ => None,
        }
    }

    /// Adds a `CREATE` clause.
    pub fn create<P: Into<Pattern>>(mut self, patterns: impl IntoIterator<Item = P>) -> Self {
        let patterns = patterns.into_iter().map(Into::into).collect();
        self.clauses.push(Clause::Create { patterns });
        self
    }

    /// Adds a `MERGE` clause.
    pub fn merge(mut self, pattern: impl Into<Pattern>) -> Self {
        self.clauses.push(Clause::Merge {
            pattern: pattern.into(),
        });
        self
    }

    /// Adds `SET var.key = value`.
    pub fn set(mut self, var: impl Into<String>, key: impl Into<String>, value: Expr) -> Self {
        let item = SetItem {
            var: var.into(),
            key: key.into(),
            value,
        };
        match self.clauses.last_mut() {
            Some(Clause::Set { items }) => items.push(item),
            _ => self.clauses.push(Clause::Set { items: vec![item] }),
        }
        self
    }

    /// Adds `REMOVE var.key`.
    pub fn remove(mut self, var: impl Into<String>, key: impl Into<String>) -> Self {
        self.clauses.push(Clause::Remove {
            items: vec![PropertyRef {
                var: var.into(),
                key: key.into(),
            }],
        });
        self
    }

    /// Adds `DELETE vars`.
    pub fn delete<S: Into<String>>(self, vars: impl IntoIterator<Item = S>) -> Self {
        self.push_delete(false, vars)
    }

    /// Adds `DETACH DELETE vars`.
    pub fn detach_delete<S: Into<String>>(self, vars: impl IntoIterator<Item = S>) -> Self {
        self.push_delete(true, vars)
    }

    fn push_delete<S: Into<String>>(
        mut self,
        detach: bool,
        vars: impl IntoIterator<Item = S>,
    ) -> Self {
        let targets = vars.into_iter().map(|v| Expr::Variable(v.into())).collect();
        self.clauses.push(Clause::Delete { detach, targets });
        self
    }

    fn fail(&mut self, reason: &'static str) {
        if self.error.is_none() {
            self.error = Some(TranslationError::InvalidQuery { reason });
        }
    }

    /// Finishes the query, reporting the first recorded misuse.
    pub fn build(mut self) -> Result<crate::ast::Query, TranslationError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if self.clauses.is_empty() {
            return Err(TranslationError::InvalidQuery {
                reason: "query has no clauses",
            });
        }
        Ok(crate::ast::Query {
            clauses: mem::take(&mut self.clauses),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_attaches_to_preceding_match() {
        let query = QueryBuilder::new()
            .r#match([node("n").label("person")])
            .r#where(Expr::var("n").prop("age").gt(Expr::lit(25)))
            .r#where(Expr::var("n").prop("age").lt(Expr::lit(60)))
            .r#return([Expr::var("n").prop("name")])
            .build()
            .expect("builder succeeds");
        match &query.clauses[0] {
            Clause::Match(clause) => {
                assert_eq!(
                    clause.predicate.as_ref().map(ToString::to_string).as_deref(),
                    Some("n.age > 25 AND n.age < 60")
                );
            }
            other => panic!("unexpected clause: {other:?}"),
        }
    }

    #[test]
    fn where_without_match_is_rejected() {
        let err = QueryBuilder::new()
            .r#where(Expr::lit(true))
            .build()
            .expect_err("dangling WHERE");
        assert!(matches!(err, TranslationError::InvalidQuery { .. }));
    }

    #[test]
    fn patterns_chain_hops() {
        let pattern = Pattern::from(node("a"))
            .out(RelPattern::new(Direction::Out).var("r").typed("KNOWS"), node("b"))
            .inbound(RelPattern::new(Direction::Out), NodePattern::anonymous().label("city"));
        assert_eq!(pattern.to_string(), "(a)-[r:KNOWS]->(b)<-[]-(:city)");
    }
}
