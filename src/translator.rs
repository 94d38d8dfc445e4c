//! Translation facade and the execution boundary.
//!
//! [`Translator`] runs lowering, the flavor pipeline, and code generation in
//! sequence. [`CypherClient`] pairs a translator with a [`TraversalEngine`],
//! maps engine failures onto domain errors, and normalizes every row.

#![forbid(unsafe_code)]

use indexmap::IndexMap;
use tracing::{debug, debug_span, info, warn};

use crate::ast::Query;
use crate::codegen::{emit, Program, TargetFormat};
use crate::config::TranslatorConfig;
use crate::error::{ExecutionError, Result, TranslationError};
use crate::flavor::{FlavorName, TranslatorFlavor};
use crate::ir::{OutputColumn, Statement, Token};
use crate::lower::{lower, user_name};
use crate::normalize::{normalize, RawRow, ResultRow};
use crate::registry::Registry;
use crate::value::Literal;

/// Named query parameters, bound by the engine.
pub type Params = IndexMap<String, Literal>;

/// Output of [`Translator::translate`].
#[derive(Clone, Debug, PartialEq)]
pub struct Translation {
    /// Rendered program.
    pub program: Program,
    /// Output columns in projection order.
    pub columns: Vec<OutputColumn>,
    /// IR after the flavor pipeline.
    pub statement: Statement,
}

/// Stateless, reusable translation pipeline.
#[derive(Clone, Debug)]
pub struct Translator {
    flavor: TranslatorFlavor,
    format: TargetFormat,
    registry: Registry,
}

impl Default for Translator {
    fn default() -> Self {
        Translator::builder().build()
    }
}

impl Translator {
    /// Starts a builder with the default flavor, Groovy output and the
    /// standard registry.
    pub fn builder() -> TranslatorBuilder {
        TranslatorBuilder::default()
    }

    /// Translator configured from a loaded config.
    pub fn from_config(config: &TranslatorConfig) -> Self {
        Translator::builder()
            .flavor(config.flavor)
            .format(config.format)
            .build()
    }

    /// Active flavor.
    pub fn flavor(&self) -> &TranslatorFlavor {
        &self.flavor
    }

    /// Output format.
    pub fn format(&self) -> TargetFormat {
        self.format
    }

    /// Registry consulted by code generation.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Lowers, applies the flavor, and renders.
    pub fn translate(&self, query: &Query) -> Result<Translation> {
        let span = debug_span!("translate", flavor = %self.flavor.name(), format = %self.format);
        let _guard = span.enter();
        let lowered = lower(query)?;
        let statement = self.flavor.apply(lowered)?;
        let program = emit(&statement, self.format, &self.registry)?;
        debug!(
            columns = statement.columns.len(),
            fingerprint = program.fingerprint(),
            "translated query"
        );
        Ok(Translation {
            program,
            columns: statement.columns.clone(),
            statement,
        })
    }
}

/// Builder for [`Translator`].
#[derive(Clone, Debug, Default)]
pub struct TranslatorBuilder {
    flavor: Option<TranslatorFlavor>,
    format: TargetFormat,
    registry: Option<Registry>,
}

impl TranslatorBuilder {
    /// Built-in flavor by name.
    pub fn flavor(mut self, name: FlavorName) -> Self {
        self.flavor = Some(TranslatorFlavor::named(name));
        self
    }

    /// Caller-assembled flavor.
    pub fn custom_flavor(mut self, flavor: TranslatorFlavor) -> Self {
        self.flavor = Some(flavor);
        self
    }

    /// Output format.
    pub fn format(mut self, format: TargetFormat) -> Self {
        self.format = format;
        self
    }

    /// Registry other than the standard one.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> Translator {
        Translator {
            flavor: self.flavor.unwrap_or_default(),
            format: self.format,
            registry: self
                .registry
                .unwrap_or_else(|| Registry::standard().clone()),
        }
    }
}

/// External engine that runs rendered programs.
pub trait TraversalEngine {
    /// Installs the registry's custom predicates and functions. Called once,
    /// before the first `execute`.
    fn register(&mut self, registry: &Registry) -> std::result::Result<(), ExecutionError>;

    /// Runs a program with bound parameters.
    fn execute(
        &self,
        program: &Program,
        params: &Params,
    ) -> std::result::Result<Vec<RawRow>, ExecutionError>;
}

/// Translator plus engine.
#[derive(Debug)]
pub struct CypherClient<E> {
    translator: Translator,
    engine: E,
}

impl<E: TraversalEngine> CypherClient<E> {
    /// Registers the translator's registry with `engine`.
    pub fn new(translator: Translator, mut engine: E) -> Result<Self> {
        engine.register(translator.registry())?;
        info!(
            flavor = %translator.flavor().name(),
            symbols = translator.registry().symbols().len(),
            "registered custom symbols with engine"
        );
        Ok(CypherClient { translator, engine })
    }

    /// Translator in use.
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Wrapped engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Translates, executes, and normalizes.
    pub fn query(&self, query: &Query, params: &Params) -> Result<Vec<ResultRow>> {
        let translation = self.translator.translate(query)?;
        let params = normalize_params(params)?;
        let raw = self
            .engine
            .execute(&translation.program, &params)
            .map_err(|err| {
                let err = err.classify();
                warn!(code = err.code(), "engine rejected program");
                err
            })?;
        let rows = raw
            .iter()
            .map(|row| normalize(row, &translation.columns))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(rows = rows.len(), "normalized results");
        Ok(rows)
    }
}

/// Prepares parameters for the engine. Nulls at any depth become the null
/// token; strings and map keys using the token prefix are rejected.
pub fn normalize_params(params: &Params) -> std::result::Result<Params, TranslationError> {
    params
        .iter()
        .map(|(name, value)| {
            user_name(name, "parameter")?;
            Ok((name.clone(), param_value(value)?))
        })
        .collect()
}

fn param_value(value: &Literal) -> std::result::Result<Literal, TranslationError> {
    Ok(match value {
        Literal::Null => Literal::String(Token::Null.encode()),
        Literal::String(s) => {
            user_name(s, "parameter value")?;
            value.clone()
        }
        Literal::List(items) => Literal::List(
            items
                .iter()
                .map(param_value)
                .collect::<std::result::Result<_, _>>()?,
        ),
        Literal::Map(entries) => Literal::Map(
            entries
                .iter()
                .map(|(key, item)| {
                    user_name(key, "parameter map key")?;
                    Ok((key.clone(), param_value(item)?))
                })
                .collect::<std::result::Result<_, TranslationError>>()?,
        ),
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{node, Expr, QueryBuilder};
    use crate::error::Error;
    use crate::normalize::RawValue;
    use std::cell::{Cell, RefCell};

    struct Scripted {
        registered: Cell<usize>,
        reply: std::result::Result<Vec<RawRow>, ExecutionError>,
    }

    impl TraversalEngine for Scripted {
        fn register(&mut self, registry: &Registry) -> std::result::Result<(), ExecutionError> {
            assert!(!registry.symbols().is_empty());
            self.registered.set(self.registered.get() + 1);
            Ok(())
        }

        fn execute(
            &self,
            program: &Program,
            _params: &Params,
        ) -> std::result::Result<Vec<RawRow>, ExecutionError> {
            assert!(program.as_groovy().is_some_and(|g| g.starts_with("g.")));
            self.reply.clone()
        }
    }

    /// Records the parameters of every program it runs.
    #[derive(Default)]
    struct Capturing {
        seen: RefCell<Vec<Params>>,
    }

    impl TraversalEngine for Capturing {
        fn register(&mut self, _registry: &Registry) -> std::result::Result<(), ExecutionError> {
            Ok(())
        }

        fn execute(
            &self,
            _program: &Program,
            params: &Params,
        ) -> std::result::Result<Vec<RawRow>, ExecutionError> {
            self.seen.borrow_mut().push(params.clone());
            Ok(Vec::new())
        }
    }

    fn count_query() -> Query {
        QueryBuilder::new()
            .r#match([node("n")])
            .r#return([(Expr::CountStar, "c")])
            .build()
            .expect("builder succeeds")
    }

    #[test]
    fn client_registers_once_and_normalizes() {
        let engine = Scripted {
            registered: Cell::new(0),
            reply: Ok(vec![[("c".to_owned(), RawValue::Int(3))].into_iter().collect()]),
        };
        let client = CypherClient::new(Translator::default(), engine).expect("registers");
        let rows = client.query(&count_query(), &Params::new()).expect("runs");
        assert_eq!(client.engine().registered.get(), 1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("c"), Some(&crate::normalize::CypherValue::Int(3)));
    }

    #[test]
    fn engine_messages_are_mapped() {
        let engine = Scripted {
            registered: Cell::new(0),
            reply: Err(ExecutionError::Engine {
                message: "java.lang.RuntimeException: Invalid range argument".into(),
            }),
        };
        let client = CypherClient::new(Translator::default(), engine).expect("registers");
        match client.query(&count_query(), &Params::new()) {
            Err(Error::Execution(ExecutionError::InvalidRange { .. })) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn client_hands_the_engine_normalized_params() {
        let client = CypherClient::new(Translator::default(), Capturing::default()).expect("registers");
        let params: Params = [
            ("missing".to_owned(), Literal::Null),
            (
                "nested".to_owned(),
                Literal::Map(vec![
                    ("tags".to_owned(), Literal::List(vec![Literal::from("a"), Literal::Null])),
                    ("age".to_owned(), Literal::Int(3)),
                ]),
            ),
        ]
        .into_iter()
        .collect();
        client.query(&count_query(), &params).expect("runs");

        let null = || Literal::String(Token::Null.encode());
        let seen = client.engine().seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("missing"), Some(&null()));
        assert_eq!(
            seen[0].get("nested"),
            Some(&Literal::Map(vec![
                ("tags".to_owned(), Literal::List(vec![Literal::from("a"), null()])),
                ("age".to_owned(), Literal::Int(3)),
            ]))
        );
    }

    #[test]
    fn reserved_params_never_reach_the_engine() {
        let client = CypherClient::new(Translator::default(), Capturing::default()).expect("registers");
        let cases: [Params; 3] = [
            [("x".to_owned(), Literal::from("  cypher.null"))].into_iter().collect(),
            [("  x".to_owned(), Literal::Int(1))].into_iter().collect(),
            [(
                "x".to_owned(),
                Literal::Map(vec![("  key".to_owned(), Literal::Int(1))]),
            )]
            .into_iter()
            .collect(),
        ];
        for params in &cases {
            match client.query(&count_query(), params) {
                Err(Error::Translation(err)) => assert_eq!(err.code(), "ReservedToken"),
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert!(client.engine().seen.borrow().is_empty());
    }

    #[test]
    fn builder_applies_settings() {
        let translator = Translator::builder()
            .flavor(FlavorName::Cosmosdb)
            .format(TargetFormat::Bytecode)
            .build();
        assert_eq!(translator.flavor().name(), FlavorName::Cosmosdb);
        let translation = translator.translate(&count_query()).expect("translates");
        assert!(translation.program.as_bytecode().is_some());
        assert_eq!(translation.columns, translation.statement.columns);
    }
}
