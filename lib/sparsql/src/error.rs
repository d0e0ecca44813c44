use spargebra::SparqlSyntaxError;
use sqlgebra::{AliasError, ParseColumnError, RelationError};
use std::convert::Infallible;
use std::error::Error;

/// A SPARQL evaluation error
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EvaluationError {
    /// Error from the SQL executor
    #[error(transparent)]
    Database(Box<dyn Error + Send + Sync>),
    /// Relations of the bridges can not be combined
    #[error(transparent)]
    Relation(#[from] RelationError),
    /// The query uses a feature that can not be translated
    #[error("{0} is not supported")]
    Unsupported(String),
    #[error(transparent)]
    Syntax(#[from] SparqlSyntaxError),
    #[error("The SPARQL operation has been cancelled")]
    Cancelled,
}

impl From<AliasError> for EvaluationError {
    #[inline]
    fn from(error: AliasError) -> Self {
        Self::Relation(error.into())
    }
}

impl From<Infallible> for EvaluationError {
    #[inline]
    fn from(error: Infallible) -> Self {
        match error {}
    }
}

/// An error raised when a bridge definition is invalid
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Invalid template {template}: {message}")]
    InvalidTemplate { template: String, message: String },
    #[error("Unknown column function {0}, expected urlencode, urlify or encode")]
    UnknownFunction(String),
    #[error(transparent)]
    Column(#[from] ParseColumnError),
}
