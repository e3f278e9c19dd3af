//! Error types for query evaluation.

use probdb_dsl::{Name, ParseError};
use probdb_store::ValidationError;
use thiserror::Error;

/// The query is outside the class this evaluator computes exactly.
///
/// Raised before any enumeration starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsupportedQueryError {
    #[error(
        "query is not hierarchical: `{left}` and `{right}` share `{shared_relation}` \
         but neither variable's atoms contain the other's"
    )]
    NotHierarchical {
        left: Name,
        right: Name,
        shared_relation: Name,
    },
    #[error("no variable occurs in every atom of `{formula}`")]
    NoRootVariable { formula: String },
    #[error("both sides of `{formula}` read `{relation}`, so they are not independent")]
    SharedRelation { relation: Name, formula: String },
    #[error("`{variable}` is not a separator variable of `{formula}`")]
    NotSeparator { variable: Name, formula: String },
    #[error("variable `{variable}` is free in `{formula}`")]
    FreeVariable { variable: Name, formula: String },
}

/// Any error on the text → store → probability path.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Unsupported(#[from] UnsupportedQueryError),
}
