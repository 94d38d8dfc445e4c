//! Pattern clauses: MATCH, OPTIONAL MATCH, CREATE, MERGE.

use crate::ast::{Direction, Expr, Hop, MatchClause, NodePattern, Pattern, RelPattern};
use crate::error::TranslationError;
use crate::ir::{Label, LabelComparison, Predicate, Step, Token, Traversal, Value};
use crate::lower::{user_name, Lowering, Mode, PathShape, VarInfo, VarKind};

impl Lowering {
    pub(super) fn match_clause(&mut self, clause: &MatchClause) -> Result<(), TranslationError> {
        if clause.optional {
            return self.optional_match(clause);
        }
        let steps = self.match_patterns(&clause.patterns, clause.predicate.as_ref(), false)?;
        self.root.extend(steps);
        Ok(())
    }

    /// Lowers comma-separated patterns plus their WHERE into one step run.
    fn match_patterns(
        &mut self,
        patterns: &[Pattern],
        predicate: Option<&Expr>,
        optional: bool,
    ) -> Result<Traversal, TranslationError> {
        let mut steps = Traversal::new();
        let mut relationships = Vec::new();
        for pattern in patterns {
            self.pattern_steps(pattern, &mut steps, &mut relationships, optional)?;
        }
        for (idx, left) in relationships.iter().enumerate() {
            for right in &relationships[idx + 1..] {
                steps.push(Step::Where(Traversal::of([
                    Step::Select(vec![left.clone()]),
                    Step::WhereLabel {
                        comparison: LabelComparison::Neq,
                        label: right.clone(),
                    },
                ])));
            }
        }
        if let Some(predicate) = predicate {
            let filter = self.filter(predicate)?;
            steps.push(Step::Where(filter));
        }
        Ok(steps)
    }

    fn pattern_steps(
        &mut self,
        pattern: &Pattern,
        steps: &mut Traversal,
        relationships: &mut Vec<Label>,
        optional: bool,
    ) -> Result<(), TranslationError> {
        if let Some(path) = &pattern.path {
            user_name(path, "path variable")?;
            if optional {
                return Err(TranslationError::unsupported(
                    "named path in OPTIONAL MATCH",
                ));
            }
        }
        let start = &pattern.start;
        let start_label = match start.var.as_deref() {
            Some(var) if self.is_bound(var) => {
                let info = self.expect_kind(var, VarKind::Node, "MATCH")?;
                steps.extend(self.select_bound(var, info));
                self.node_filters(start, steps)?;
                Label::named(var)
            }
            _ => {
                steps.push(Step::V);
                self.node_filters(start, steps)?;
                let label = self.element_label(start.var.as_deref(), "node variable")?;
                steps.push(Step::As(label.clone()));
                if let Some(var) = &start.var {
                    self.declare(var, VarKind::Node, optional);
                }
                label
            }
        };
        let mut elements = vec![(start_label, VarKind::Node)];
        if let Some(path) = &pattern.path {
            steps.push(Step::As(Label::from(Token::PathStart(path.clone()))));
        }
        for (idx, hop) in pattern.hops.iter().enumerate() {
            let rel_label = self.relationship_hop(hop, steps, relationships, optional)?;
            let marker = match &pattern.path {
                Some(path) => {
                    let marker = Label::from(Token::PathEdge(format!("{path}.{}", idx + 1)));
                    steps.push(Step::As(marker.clone()));
                    marker
                }
                None => rel_label,
            };
            steps.push(vertex_step(hop.rel.direction));
            let node_label = self.hop_node(&hop.node, steps, optional)?;
            elements.push((marker, VarKind::Relationship));
            elements.push((node_label, VarKind::Node));
        }
        if let Some(path) = &pattern.path {
            elements[0].0 = Label::from(Token::PathStart(path.clone()));
            self.declare(path, VarKind::Path, false);
            self.paths.insert(path.clone(), PathShape { elements });
        }
        Ok(())
    }

    fn relationship_hop(
        &mut self,
        hop: &Hop,
        steps: &mut Traversal,
        relationships: &mut Vec<Label>,
        optional: bool,
    ) -> Result<Label, TranslationError> {
        let rel = &hop.rel;
        reject_var_length(rel)?;
        for rel_type in &rel.types {
            user_name(rel_type, "relationship type")?;
        }
        steps.push(edge_step(rel.direction, rel.types.clone()));
        for (key, value) in &rel.properties {
            let predicate = Predicate::Eq(self.constraint_value(key, value)?);
            steps.push(Step::Has {
                key: key.clone(),
                predicate,
            });
        }
        match rel.var.as_deref() {
            Some(var) if self.is_bound(var) => {
                self.expect_kind(var, VarKind::Relationship, "MATCH")?;
                steps.push(Step::WhereLabel {
                    comparison: LabelComparison::Eq,
                    label: Label::named(var),
                });
                Ok(Label::named(var))
            }
            var => {
                let label = self.element_label(var, "relationship variable")?;
                steps.push(Step::As(label.clone()));
                relationships.push(label.clone());
                if let Some(var) = var {
                    self.declare(var, VarKind::Relationship, optional);
                }
                Ok(label)
            }
        }
    }

    fn hop_node(
        &mut self,
        node: &NodePattern,
        steps: &mut Traversal,
        optional: bool,
    ) -> Result<Label, TranslationError> {
        match node.var.as_deref() {
            Some(var) if self.is_bound(var) => {
                self.expect_kind(var, VarKind::Node, "MATCH")?;
                steps.push(Step::WhereLabel {
                    comparison: LabelComparison::Eq,
                    label: Label::named(var),
                });
                self.node_filters(node, steps)?;
                Ok(Label::named(var))
            }
            var => {
                self.node_filters(node, steps)?;
                let label = self.element_label(var, "node variable")?;
                steps.push(Step::As(label.clone()));
                if let Some(var) = var {
                    self.declare(var, VarKind::Node, optional);
                }
                Ok(label)
            }
        }
    }

    fn node_filters(&self, node: &NodePattern, steps: &mut Traversal) -> Result<(), TranslationError> {
        for label in &node.labels {
            user_name(label, "node label")?;
            steps.push(Step::HasLabel(vec![label.clone()]));
        }
        for (key, value) in &node.properties {
            let predicate = Predicate::Eq(self.constraint_value(key, value)?);
            steps.push(Step::Has {
                key: key.clone(),
                predicate,
            });
        }
        Ok(())
    }

    /// Value of an inline `{key: value}` constraint or assignment.
    pub(super) fn constraint_value(&self, key: &str, value: &Expr) -> Result<Value, TranslationError> {
        user_name(key, "property key")?;
        match value {
            Expr::Literal(literal) => self.literal(literal),
            Expr::Parameter(name) => {
                user_name(name, "parameter")?;
                Ok(Value::Parameter(name.clone()))
            }
            other => Err(TranslationError::unsupported(format!(
                "non-literal property value `{other}` in pattern"
            ))),
        }
    }

    fn element_label(
        &mut self,
        var: Option<&str>,
        context: &'static str,
    ) -> Result<Label, TranslationError> {
        match var {
            Some(var) => {
                user_name(var, context)?;
                Ok(Label::named(var))
            }
            None => Ok(self.unnamed()),
        }
    }

    pub(super) fn expect_kind(
        &self,
        var: &str,
        kind: VarKind,
        context: &'static str,
    ) -> Result<VarInfo, TranslationError> {
        let info = self.lookup(var, context)?;
        if info.kind != kind && !matches!(info.kind, VarKind::Value | VarKind::Map) {
            return Err(TranslationError::InvalidArgument {
                context,
                reason: format!("variable '{var}' is bound to a {:?}, not a {kind:?}", info.kind),
            });
        }
        Ok(info)
    }

    fn optional_match(&mut self, clause: &MatchClause) -> Result<(), TranslationError> {
        self.ensure_started();
        let before = self.scope.len();
        let matched = self.match_patterns(&clause.patterns, clause.predicate.as_ref(), true)?;
        let introduced: Vec<String> = self.scope.keys().skip(before).cloned().collect();

        let unused = Label::from(Token::Unused);
        let mut slots: Vec<Label> = introduced.iter().map(Label::named).collect();
        slots.push(unused.clone());

        let matched = matched
            .then(Step::As(unused.clone()))
            .then(Step::Select(slots.clone()));
        let mut fallback = Traversal::of([
            Step::Constant(Value::Token(Token::Nonexistent)),
            Step::As(unused),
        ]);
        for var in &introduced {
            fallback.push(Step::Constant(Value::Token(Token::Null)));
            fallback.push(Step::As(Label::named(var)));
        }
        fallback.push(Step::Select(slots));
        self.root.push(Step::Coalesce(vec![matched, fallback]));

        if introduced.is_empty() {
            return Ok(());
        }
        let fresh = self.fresh_id();
        self.root.push(Step::As(fresh.clone()));
        for var in &introduced {
            self.root.push(Step::Select(vec![fresh.clone()]));
            self.root.push(Step::SelectKey(Label::named(var)));
            self.root.push(Step::As(Label::named(var)));
        }
        Ok(())
    }

    pub(super) fn create(&mut self, patterns: &[Pattern]) -> Result<(), TranslationError> {
        for pattern in patterns {
            if pattern.path.is_some() {
                return Err(TranslationError::unsupported("named path in CREATE"));
            }
            let mut previous = self.create_node(&pattern.start)?;
            for hop in &pattern.hops {
                let next = self.create_node(&hop.node)?;
                let rel = &hop.rel;
                reject_var_length(rel)?;
                let rel_type = match rel.types.as_slice() {
                    [single] => single,
                    _ => {
                        return Err(TranslationError::unsupported(
                            "CREATE of a relationship without exactly one type",
                        ))
                    }
                };
                user_name(rel_type, "relationship type")?;
                let (from, to) = match rel.direction {
                    Direction::Out => (previous, next.clone()),
                    Direction::In => (next.clone(), previous),
                    Direction::Both => {
                        return Err(TranslationError::unsupported(
                            "CREATE of an undirected relationship",
                        ))
                    }
                };
                self.root.push(Step::AddE {
                    label: rel_type.clone(),
                    from,
                    to,
                });
                self.assign_properties(&rel.properties)?;
                let label = self.element_label(rel.var.as_deref(), "relationship variable")?;
                self.root.push(Step::As(label));
                if let Some(var) = &rel.var {
                    self.declare(var, VarKind::Relationship, false);
                }
                previous = next;
            }
        }
        Ok(())
    }

    fn create_node(&mut self, node: &NodePattern) -> Result<Label, TranslationError> {
        if let Some(var) = node.var.as_deref() {
            if self.is_bound(var) {
                if !node.labels.is_empty() || !node.properties.is_empty() {
                    return Err(TranslationError::InvalidArgument {
                        context: "CREATE",
                        reason: format!("variable '{var}' is already bound"),
                    });
                }
                self.expect_kind(var, VarKind::Node, "CREATE")?;
                return Ok(Label::named(var));
            }
        }
        let label = match node.labels.as_slice() {
            [] => None,
            [single] => {
                user_name(single, "node label")?;
                Some(single.clone())
            }
            _ => return Err(TranslationError::unsupported("CREATE of a node with multiple labels")),
        };
        self.root.push(Step::AddV(label));
        self.assign_properties(&node.properties)?;
        let label = self.element_label(node.var.as_deref(), "node variable")?;
        self.root.push(Step::As(label.clone()));
        if let Some(var) = &node.var {
            self.declare(var, VarKind::Node, false);
        }
        Ok(label)
    }

    /// `property()` steps for inline properties of a created element. Nulls are skipped.
    fn assign_properties(&mut self, properties: &[(String, Expr)]) -> Result<(), TranslationError> {
        for (key, value) in properties {
            user_name(key, "property key")?;
            match value {
                Expr::Literal(literal) if literal.is_null() => {}
                Expr::Literal(_) | Expr::Parameter(_) => {
                    let value = self.constraint_value(key, value)?;
                    self.root.push(Step::Property {
                        key: key.clone(),
                        value,
                    });
                }
                other => {
                    let value = self.value(other, Mode::Raw)?;
                    self.root.push(Step::PropertyFrom {
                        key: key.clone(),
                        value,
                    });
                }
            }
        }
        Ok(())
    }

    pub(super) fn merge(&mut self, pattern: &Pattern) -> Result<(), TranslationError> {
        if pattern.path.is_some() {
            return Err(TranslationError::unsupported("named path in MERGE"));
        }
        self.ensure_started();
        match pattern.hops.as_slice() {
            [] => self.merge_node(&pattern.start),
            [hop] => self.merge_relationship(&pattern.start, hop),
            _ => Err(TranslationError::unsupported("MERGE of a multi-hop pattern")),
        }
    }

    fn merge_node(&mut self, node: &NodePattern) -> Result<(), TranslationError> {
        if let Some(var) = node.var.as_deref() {
            if self.is_bound(var) {
                return Err(TranslationError::unsupported("MERGE on an already bound variable"));
            }
        }
        let label = match node.labels.as_slice() {
            [] => None,
            [single] => Some(single.clone()),
            _ => return Err(TranslationError::unsupported("MERGE of a node with multiple labels")),
        };
        let mut find = Traversal::of([Step::V]);
        self.node_filters(node, &mut find)?;
        let mut create = Traversal::of([Step::AddV(label)]);
        for (key, value) in &node.properties {
            let value = self.constraint_value(key, value)?;
            if value != Value::Token(Token::Null) {
                create.push(Step::Property {
                    key: key.clone(),
                    value,
                });
            }
        }
        self.root.push(Step::Coalesce(vec![find, create]));
        let label = self.element_label(node.var.as_deref(), "node variable")?;
        self.root.push(Step::As(label));
        if let Some(var) = &node.var {
            self.declare(var, VarKind::Node, false);
        }
        Ok(())
    }

    fn merge_relationship(&mut self, start: &NodePattern, hop: &Hop) -> Result<(), TranslationError> {
        let endpoint = |node: &NodePattern| -> Result<Label, TranslationError> {
            match node.var.as_deref() {
                Some(var)
                    if self.is_bound(var) && node.labels.is_empty() && node.properties.is_empty() =>
                {
                    self.expect_kind(var, VarKind::Node, "MERGE")?;
                    Ok(Label::named(var))
                }
                _ => Err(TranslationError::unsupported(
                    "MERGE of a relationship whose endpoints are not bound nodes",
                )),
            }
        };
        let left = endpoint(start)?;
        let right = endpoint(&hop.node)?;
        let rel = &hop.rel;
        reject_var_length(rel)?;
        let rel_type = match rel.types.as_slice() {
            [single] => single.clone(),
            _ => {
                return Err(TranslationError::unsupported(
                    "MERGE of a relationship without exactly one type",
                ))
            }
        };
        user_name(&rel_type, "relationship type")?;
        let (from, to) = match rel.direction {
            Direction::Out => (left, right),
            Direction::In => (right, left),
            Direction::Both => {
                return Err(TranslationError::unsupported("MERGE of an undirected relationship"))
            }
        };
        let mut find = Traversal::of([
            Step::Select(vec![from.clone()]),
            Step::OutE(vec![rel_type.clone()]),
        ]);
        let mut create = Traversal::of([Step::AddE {
            label: rel_type,
            from: from.clone(),
            to: to.clone(),
        }]);
        for (key, value) in &rel.properties {
            let value = self.constraint_value(key, value)?;
            find.push(Step::Has {
                key: key.clone(),
                predicate: Predicate::Eq(value.clone()),
            });
            create.push(Step::Property {
                key: key.clone(),
                value,
            });
        }
        find.push(Step::Where(Traversal::of([
            Step::InV,
            Step::WhereLabel {
                comparison: LabelComparison::Eq,
                label: to,
            },
        ])));
        self.root.push(Step::Coalesce(vec![find, create]));
        let label = self.element_label(rel.var.as_deref(), "relationship variable")?;
        self.root.push(Step::As(label));
        if let Some(var) = &rel.var {
            self.declare(var, VarKind::Relationship, false);
        }
        Ok(())
    }

    /// Pattern used as a boolean: emits iff the pattern matches from bound variables.
    pub(super) fn pattern_filter(&mut self, pattern: &Pattern) -> Result<Traversal, TranslationError> {
        let start_var = match pattern.start.var.as_deref() {
            Some(var) if self.is_bound(var) => var,
            _ => {
                return Err(TranslationError::unsupported(format!(
                    "pattern predicate `{pattern}` without a bound start node"
                )))
            }
        };
        let mut steps = Traversal::of([Step::Select(vec![Label::named(start_var)])]);
        self.node_filters(&pattern.start, &mut steps)?;
        for hop in &pattern.hops {
            let rel = &hop.rel;
            reject_var_length(rel)?;
            if rel.var.is_some() {
                return Err(TranslationError::unsupported(format!(
                    "relationship variable in pattern predicate `{pattern}`"
                )));
            }
            steps.push(edge_step(rel.direction, rel.types.clone()));
            for (key, value) in &rel.properties {
                let predicate = Predicate::Eq(self.constraint_value(key, value)?);
                steps.push(Step::Has {
                    key: key.clone(),
                    predicate,
                });
            }
            steps.push(vertex_step(rel.direction));
            match hop.node.var.as_deref() {
                Some(var) if self.is_bound(var) => steps.push(Step::WhereLabel {
                    comparison: LabelComparison::Eq,
                    label: Label::named(var),
                }),
                Some(var) => {
                    return Err(TranslationError::unsupported(format!(
                        "new variable '{var}' in pattern predicate"
                    )))
                }
                None => {}
            }
            self.node_filters(&hop.node, &mut steps)?;
        }
        Ok(steps)
    }
}

fn reject_var_length(rel: &RelPattern) -> Result<(), TranslationError> {
    if rel.length.is_some() {
        return Err(TranslationError::unsupported("variable-length relationship"));
    }
    Ok(())
}

fn edge_step(direction: Direction, types: Vec<String>) -> Step {
    match direction {
        Direction::Out => Step::OutE(types),
        Direction::In => Step::InE(types),
        Direction::Both => Step::BothE(types),
    }
}

fn vertex_step(direction: Direction) -> Step {
    match direction {
        Direction::Out => Step::InV,
        Direction::In => Step::OutV,
        Direction::Both => Step::OtherV,
    }
}
