//! Error taxonomy shared by every translation stage.
//!
//! Translation-time failures are terminal for the query: nothing partially
//! lowered or partially rendered ever escapes. Execution failures reported by
//! an engine are matched against known message signatures and re-raised with
//! domain meaning when recognised.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Convenience alias for results carrying the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Lowering or pass-pipeline rejection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// An AST node has no lowering rule.
    #[error("unsupported construct: {construct}")]
    Unsupported { construct: String },
    /// A user-supplied string collides with the reserved token prefix.
    #[error("{context} '{value}' uses the reserved token prefix")]
    ReservedToken { value: String, context: &'static str },
    /// A variable was referenced before any clause bound it.
    #[error("unknown variable '{var}' referenced in {context}")]
    UnknownVariable { var: String, context: &'static str },
    /// A step references a label that is not in scope.
    #[error("step label '{label}' referenced before it was introduced")]
    UndefinedLabel { label: String },
    /// The flavor lacks custom predicate/function support.
    #[error("Custom functions and predicates are not supported on target implementation: {names}")]
    UnsupportedCustomFunctions { names: String },
    /// An argument has the right shape but an unusable value.
    #[error("invalid argument for {context}: {reason}")]
    InvalidArgument { context: &'static str, reason: String },
    /// The query itself is malformed (builder misuse, empty query).
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: &'static str },
    /// A flavor's rewrite passes kept changing the IR.
    #[error("flavor '{flavor}' did not reach a fixed point after {rounds} rounds")]
    NotConverged { flavor: String, rounds: usize },
}

impl TranslationError {
    /// Builds an [`TranslationError::Unsupported`] naming the construct.
    pub fn unsupported(construct: impl Into<String>) -> Self {
        TranslationError::Unsupported {
            construct: construct.into(),
        }
    }

    /// Builds an [`TranslationError::UnknownVariable`] for a context.
    pub fn unknown_var(var: impl Into<String>, context: &'static str) -> Self {
        TranslationError::UnknownVariable {
            var: var.into(),
            context,
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            TranslationError::Unsupported { .. } => "Unsupported",
            TranslationError::ReservedToken { .. } => "ReservedToken",
            TranslationError::UnknownVariable { .. } => "UnknownVariable",
            TranslationError::UndefinedLabel { .. } => "UndefinedLabel",
            TranslationError::UnsupportedCustomFunctions { .. } => "NoCustomFunctions",
            TranslationError::InvalidArgument { .. } => "InvalidArgument",
            TranslationError::InvalidQuery { .. } => "InvalidQuery",
            TranslationError::NotConverged { .. } => "NotConverged",
        }
    }
}

/// IR that cannot be rendered in the requested target format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// The step (or one of its arguments) has no rendering.
    #[error("cannot render step '{step}': {reason}")]
    UnsupportedStep { step: &'static str, reason: String },
    /// A custom predicate or function is missing from the registry.
    #[error("custom symbol '{symbol}' is not registered")]
    UnknownCustomSymbol { symbol: String },
    /// Structured output failed to serialize.
    #[error("failed to serialize program: {0}")]
    Serialization(String),
}

impl CodegenError {
    /// Builds an [`CodegenError::UnsupportedStep`].
    pub fn unsupported(step: &'static str, reason: impl Into<String>) -> Self {
        CodegenError::UnsupportedStep {
            step,
            reason: reason.into(),
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            CodegenError::UnsupportedStep { .. } => "UnsupportedStep",
            CodegenError::UnknownCustomSymbol { .. } => "UnknownCustomSymbol",
            CodegenError::Serialization(_) => "Serialization",
        }
    }
}

/// Raw engine output that violates the shape lowering promised.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// A declared column is absent from the raw row.
    #[error("raw row is missing column '{column}'")]
    MissingColumn { column: String },
    /// A raw value does not have the expected shape.
    #[error("column '{column}': expected {expected}, found {found}")]
    UnexpectedShape {
        column: String,
        expected: &'static str,
        found: String,
    },
    /// A path's relationships do not connect its nodes.
    #[error("column '{column}': broken path at position {position}")]
    BrokenPath { column: String, position: usize },
}

impl NormalizationError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            NormalizationError::MissingColumn { .. } => "MissingColumn",
            NormalizationError::UnexpectedShape { .. } => "UnexpectedShape",
            NormalizationError::BrokenPath { .. } => "BrokenPath",
        }
    }
}

/// Message fragment engines report when a node still has relationships.
pub const DELETE_CONNECTED_NODE_MESSAGE: &str = "Cannot delete node, because it still has relationships. To delete this node, you must first delete its relationships.";
/// Message engines report for an invalid `range()` argument.
pub const INVALID_RANGE_MESSAGE: &str = "Invalid range argument";

/// Exception names raised through the `raise` custom function.
pub const DELETE_CONNECTED_NODE: &str = "DELETE_CONNECTED_NODE";
/// See [`DELETE_CONNECTED_NODE`].
pub const INVALID_RANGE: &str = "INVALID_RANGE";

/// Failure reported by an external traversal engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// A deleted node still had relationships and `DETACH` was not used.
    #[error("{message}")]
    DeleteConnectedNode { message: String },
    /// `range()` received an unusable argument.
    #[error("{message}")]
    InvalidRange { message: String },
    /// Anything the translation layer does not recognise, passed through.
    #[error("{message}")]
    Engine { message: String },
}

impl ExecutionError {
    /// Maps an engine message onto a domain error when its signature is known.
    pub fn from_engine_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("still has relationships") || message.contains(DELETE_CONNECTED_NODE) {
            ExecutionError::DeleteConnectedNode { message }
        } else if message.contains(INVALID_RANGE_MESSAGE) || message.contains(INVALID_RANGE) {
            ExecutionError::InvalidRange { message }
        } else {
            ExecutionError::Engine { message }
        }
    }

    /// Re-applies signature matching to an already classified error.
    pub fn classify(self) -> Self {
        match self {
            ExecutionError::Engine { message } => ExecutionError::from_engine_message(message),
            other => other,
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::DeleteConnectedNode { .. } => "DeleteConnectedNode",
            ExecutionError::InvalidRange { .. } => "InvalidRange",
            ExecutionError::Engine { .. } => "Engine",
        }
    }
}

/// Any failure surfaced by the crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Returns the code of the wrapped error.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Translation(err) => err.code(),
            Error::Codegen(err) => err.code(),
            Error::Normalization(err) => err.code(),
            Error::Execution(err) => err.code(),
            Error::Config(err) => err.code(),
        }
    }
}

/// Formats an error prefixed with its code.
pub struct ErrorWithCode<'a>(pub &'a Error);

impl fmt::Display for ErrorWithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.0.code(), self.0)
    }
}
