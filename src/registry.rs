//! Custom predicate and function registry.
//!
//! Cypher operations the traversal language lacks (string matching, type
//! checks, coercions) are referenced from the IR symbolically. The registry is
//! an explicit value: code generation consults it to decide which references
//! are legal, and engines consult it to know what they must install before
//! running any program.

#![forbid(unsafe_code)]

use std::sync::OnceLock;

/// Custom predicates referenced from [`crate::ir::Predicate::Custom`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CustomPredicate {
    /// String prefix test.
    StartsWith,
    /// String suffix test.
    EndsWith,
    /// Substring test.
    Contains,
    /// Element is a vertex.
    IsNode,
    /// Element is an edge.
    IsRelationship,
    /// Value is a string.
    IsString,
}

impl CustomPredicate {
    /// Every predicate, in registry order.
    pub const ALL: [CustomPredicate; 6] = [
        CustomPredicate::StartsWith,
        CustomPredicate::EndsWith,
        CustomPredicate::Contains,
        CustomPredicate::IsNode,
        CustomPredicate::IsRelationship,
        CustomPredicate::IsString,
    ];

    /// Cypher-facing name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            CustomPredicate::StartsWith => "startsWith",
            CustomPredicate::EndsWith => "endsWith",
            CustomPredicate::Contains => "contains",
            CustomPredicate::IsNode => "isNode",
            CustomPredicate::IsRelationship => "isRelationship",
            CustomPredicate::IsString => "isString",
        }
    }

    /// Symbol the engine registers.
    pub fn symbol(self) -> &'static str {
        match self {
            CustomPredicate::StartsWith => "cypherStartsWith",
            CustomPredicate::EndsWith => "cypherEndsWith",
            CustomPredicate::Contains => "cypherContains",
            CustomPredicate::IsNode => "cypherIsNode",
            CustomPredicate::IsRelationship => "cypherIsRelationship",
            CustomPredicate::IsString => "cypherIsString",
        }
    }
}

/// Custom functions referenced from [`crate::ir::Step::Apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CustomFunction {
    /// `toString(x)`
    ToString,
    /// `toBoolean(x)`
    ToBoolean,
    /// `toInteger(x)`
    ToInteger,
    /// `toFloat(x)`
    ToFloat,
    /// `length(x)` for strings and lists.
    Length,
    /// `size(x)`
    Size,
    /// `properties(x)`
    Properties,
    /// Raises the named exception carried by the current value.
    Raise,
}

impl CustomFunction {
    /// Every function, in registry order.
    pub const ALL: [CustomFunction; 8] = [
        CustomFunction::ToString,
        CustomFunction::ToBoolean,
        CustomFunction::ToInteger,
        CustomFunction::ToFloat,
        CustomFunction::Length,
        CustomFunction::Size,
        CustomFunction::Properties,
        CustomFunction::Raise,
    ];

    /// Cypher-facing name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            CustomFunction::ToString => "toString",
            CustomFunction::ToBoolean => "toBoolean",
            CustomFunction::ToInteger => "toInteger",
            CustomFunction::ToFloat => "toFloat",
            CustomFunction::Length => "length",
            CustomFunction::Size => "size",
            CustomFunction::Properties => "properties",
            CustomFunction::Raise => "raise",
        }
    }

    /// Symbol the engine registers.
    pub fn symbol(self) -> &'static str {
        match self {
            CustomFunction::ToString => "cypherToString",
            CustomFunction::ToBoolean => "cypherToBoolean",
            CustomFunction::ToInteger => "cypherToInteger",
            CustomFunction::ToFloat => "cypherToFloat",
            CustomFunction::Length => "cypherLength",
            CustomFunction::Size => "cypherSize",
            CustomFunction::Properties => "cypherProperties",
            CustomFunction::Raise => "cypherException",
        }
    }

    /// Looks a function up by its Cypher name, case-insensitively.
    pub fn from_cypher_name(name: &str) -> Option<CustomFunction> {
        CustomFunction::ALL
            .into_iter()
            .filter(|f| *f != CustomFunction::Raise)
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }
}

/// Result type of a registered function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    /// Boolean or null.
    Boolean,
    /// String or null.
    String,
    /// Integer or null.
    Integer,
    /// Float or null.
    Float,
    /// Map.
    Map,
    /// Never returns normally.
    Never,
}

/// Evaluation contract of a custom predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct PredicateSpec {
    /// IR variant.
    pub predicate: CustomPredicate,
    /// Cypher-facing name.
    pub name: &'static str,
    /// Engine symbol.
    pub symbol: &'static str,
    /// Number of arguments besides the tested value.
    pub arity: usize,
    /// False when either side is null, instead of erroring.
    pub null_safe: bool,
    /// Same inputs always give the same answer.
    pub deterministic: bool,
}

/// Evaluation contract of a custom function.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionSpec {
    /// IR variant.
    pub function: CustomFunction,
    /// Cypher-facing name.
    pub name: &'static str,
    /// Engine symbol.
    pub symbol: &'static str,
    /// Output type.
    pub output: ValueType,
    /// Same input always gives the same output.
    pub deterministic: bool,
}

/// Outcome of [`Registry::resolve`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Resolved<'a> {
    /// A registered predicate.
    Predicate(&'a PredicateSpec),
    /// A registered function.
    Function(&'a FunctionSpec),
    /// Nothing registered under that name.
    NotFound,
}

/// Read-only set of custom predicates and functions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Registry {
    predicates: Vec<PredicateSpec>,
    functions: Vec<FunctionSpec>,
}

impl Registry {
    /// The full registry, built on first use and never mutated afterwards.
    pub fn standard() -> &'static Registry {
        static STANDARD: OnceLock<Registry> = OnceLock::new();
        STANDARD.get_or_init(|| {
            Registry::with(CustomPredicate::ALL, CustomFunction::ALL)
        })
    }

    /// Registry holding only the listed entries.
    pub fn with(
        predicates: impl IntoIterator<Item = CustomPredicate>,
        functions: impl IntoIterator<Item = CustomFunction>,
    ) -> Registry {
        Registry {
            predicates: predicates.into_iter().map(predicate_spec).collect(),
            functions: functions.into_iter().map(function_spec).collect(),
        }
    }

    /// Finds an entry by Cypher name or engine symbol.
    pub fn resolve(&self, name: &str) -> Resolved<'_> {
        if let Some(spec) = self
            .predicates
            .iter()
            .find(|p| p.name == name || p.symbol == name)
        {
            return Resolved::Predicate(spec);
        }
        match self
            .functions
            .iter()
            .find(|f| f.name == name || f.symbol == name)
        {
            Some(spec) => Resolved::Function(spec),
            None => Resolved::NotFound,
        }
    }

    /// True when `predicate` is registered.
    pub fn has_predicate(&self, predicate: CustomPredicate) -> bool {
        self.predicates.iter().any(|p| p.predicate == predicate)
    }

    /// True when `function` is registered.
    pub fn has_function(&self, function: CustomFunction) -> bool {
        self.functions.iter().any(|f| f.function == function)
    }

    /// Registered predicates.
    pub fn predicates(&self) -> &[PredicateSpec] {
        &self.predicates
    }

    /// Registered functions.
    pub fn functions(&self) -> &[FunctionSpec] {
        &self.functions
    }

    /// Every engine symbol an engine must install, predicates first.
    pub fn symbols(&self) -> Vec<&'static str> {
        self.predicates
            .iter()
            .map(|p| p.symbol)
            .chain(self.functions.iter().map(|f| f.symbol))
            .collect()
    }
}

fn predicate_spec(predicate: CustomPredicate) -> PredicateSpec {
    let (arity, null_safe) = match predicate {
        CustomPredicate::StartsWith | CustomPredicate::EndsWith | CustomPredicate::Contains => {
            (1, true)
        }
        CustomPredicate::IsNode | CustomPredicate::IsRelationship | CustomPredicate::IsString => {
            (0, true)
        }
    };
    PredicateSpec {
        predicate,
        name: predicate.name(),
        symbol: predicate.symbol(),
        arity,
        null_safe,
        deterministic: true,
    }
}

fn function_spec(function: CustomFunction) -> FunctionSpec {
    let output = match function {
        CustomFunction::ToString => ValueType::String,
        CustomFunction::ToBoolean => ValueType::Boolean,
        CustomFunction::ToInteger | CustomFunction::Length | CustomFunction::Size => {
            ValueType::Integer
        }
        CustomFunction::ToFloat => ValueType::Float,
        CustomFunction::Properties => ValueType::Map,
        CustomFunction::Raise => ValueType::Never,
    };
    FunctionSpec {
        function,
        name: function.name(),
        symbol: function.symbol(),
        output,
        deterministic: true,
    }
}
