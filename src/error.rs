use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::EmbeddingError;
use crate::db::ExecutionError;
use crate::dsl::{ComponentKind, Operator};

/// Errors surfaced by the translation core.
///
/// Retrieval misses are not represented here: a search that finds nothing
/// returns an empty list.
#[derive(Debug, Error)]
pub enum Error {
    /// A component payload does not match its declared kind.
    #[error("malformed {kind} component: {reason}")]
    MalformedComponent { kind: ComponentKind, reason: String },

    /// The embedding service failed; nothing was committed for `kind`.
    #[error("embedding unavailable for {kind} components")]
    EmbeddingUnavailable {
        kind: ComponentKind,
        #[source]
        source: EmbeddingError,
    },

    /// Generation was attempted on a query missing a mandatory clause.
    #[error("query is incomplete: {clause} clause is empty")]
    QueryIncomplete { clause: &'static str },

    /// A filter value does not have the shape its operator needs.
    /// Only raised when strict value shapes are enabled.
    #[error("filter on `{column}` with operator {operator}: {reason}")]
    InvalidFilterValue {
        column: String,
        operator: Operator,
        reason: String,
    },

    #[error("catalog storage for {kind} at {}: {source}", .path.display())]
    Storage {
        kind: ComponentKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two stored entry lists claim the same kind.
    #[error("catalog storage holds more than one {kind} entry list")]
    DuplicateKind {
        kind: ComponentKind,
        path: Option<PathBuf>,
    },

    /// A clause value outside its allowed range. Only raised when strict
    /// value shapes are enabled.
    #[error("invalid {clause} clause: {reason}")]
    InvalidClause { clause: &'static str, reason: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    /// Passed through from the execution sink untouched.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub type Result<T> = std::result::Result<T, Error>;
