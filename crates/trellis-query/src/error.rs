//! Error types for query compilation.
//!
//! Each stage of the compiler owns one error enum so callers can tell a bad
//! intent apart from a graph-store outage or an unsupported filter. `QueryError`
//! unifies them for the compiler facade.

use thiserror::Error;

/// The intent references a path the compiler cannot even split.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntentError {
    #[error("malformed path '{path}': {reason}")]
    MalformedPath { path: String, reason: String },
}

/// Failures while consulting the relationship graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("relationship graph unavailable: {0}")]
    Connection(String),

    #[error("unknown collection '{0}' in relationship graph")]
    UnknownCollection(String),

    #[error("relationship graph query failed: {0}")]
    Query(String),
}

impl ResolveError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        Self::Query(msg.into())
    }
}

/// Failures while turning filters and recipes into pipeline stages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("unsupported filter operator '{op}' on '{path}'")]
    UnsupportedOperator { op: String, path: String },

    #[error("operator '{op}' on '{path}' {expected}, got {found}")]
    IncompatibleValue {
        op: String,
        path: String,
        expected: &'static str,
        found: String,
    },

    #[error("join '{target_path}' depends on '{prerequisite}' which has not been joined yet")]
    RecipeOrder {
        target_path: String,
        prerequisite: String,
    },

    #[error("two joins expose the same field '{0}'")]
    DuplicateAlias(String),

    #[error("aggregation output '{name}' would hold both '{first}' and '{second}'")]
    OutputNameClash {
        name: String,
        first: String,
        second: String,
    },
}

/// Any failure produced by the compiler facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Result type for compiler operations
pub type QueryResult<T> = Result<T, QueryError>;
