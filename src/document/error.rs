use thiserror::Error;

/// Errors raised while evaluating a query, update, projection or pipeline.
/// These are caller mistakes reported back verbatim, never infrastructure failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("bad query: {0}")]
    BadQuery(String),

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    #[error("invalid projection: {0}")]
    InvalidProjection(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid field path: {0}")]
    InvalidPath(String),

    #[error("Unrecognized pipeline stage name: '{0}'")]
    UnknownStage(String),

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),
}
