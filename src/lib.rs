//! Cypher to Gremlin traversal translation.
//!
//! The pipeline is
//! [`lower`](lower::lower) → [`TranslatorFlavor::apply`](flavor::TranslatorFlavor::apply)
//! → [`emit`](codegen::emit), wrapped by [`Translator`]. Results coming back
//! from an engine pass through [`normalize`](normalize::normalize).
//!
//! ```
//! use cypher_traverse::ast::{node, Expr, QueryBuilder};
//! use cypher_traverse::Translator;
//!
//! let query = QueryBuilder::new()
//!     .r#match([node("n").label("person")])
//!     .r#return([(Expr::var("n").prop("name"), "name")])
//!     .build()
//!     .unwrap();
//! let translation = Translator::default().translate(&query).unwrap();
//! assert!(translation.program.as_groovy().unwrap().starts_with("g.V().hasLabel('person')"));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod flavor;
pub mod ir;
pub mod lower;
pub mod normalize;
pub mod registry;
pub mod translator;
pub mod value;

pub use codegen::{Program, TargetFormat};
pub use config::{ConfigError, TranslatorConfig};
pub use error::{
    CodegenError, Error, ErrorWithCode, ExecutionError, NormalizationError, Result,
    TranslationError,
};
pub use flavor::{FlavorName, TranslatorFlavor};
pub use normalize::{CypherValue, ResultRow};
pub use registry::Registry;
pub use translator::{normalize_params, CypherClient, Params, Translation, Translator, TraversalEngine};
pub use value::Literal;
