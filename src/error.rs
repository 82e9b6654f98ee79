//! Error types for the intent router
//!
//! Library errors are `thiserror` enums so callers can match on the stop
//! cause. Loaders and binaries wrap them in `anyhow` with context.

use std::time::Duration;

use intent_router_types::{ErrorKind, ExecutionCause};
use thiserror::Error;

/// Stop-causing errors of the routing pipeline.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("No active rule matched the query")]
    NoMatch,

    #[error("Required parameter '{parameter}' could not be extracted for rule '{rule}'")]
    MissingParameter { rule: String, parameter: String },

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Request canceled before the query completed")]
    Canceled,
}

impl RouterError {
    /// Wire-level classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RouterError::NoMatch => ErrorKind::NoMatch,
            RouterError::MissingParameter { .. } => ErrorKind::MissingParameter,
            RouterError::Execution(_) => ErrorKind::ExecutionError,
            RouterError::Canceled => ErrorKind::Canceled,
        }
    }
}

/// Failure while running a materialized query.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Query timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Backing store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),
}

impl ExecutionError {
    pub fn cause(&self) -> ExecutionCause {
        match self {
            ExecutionError::Timeout(_) => ExecutionCause::Timeout,
            ExecutionError::StoreUnavailable(_) => ExecutionCause::StoreUnavailable,
            ExecutionError::MalformedQuery(_) => ExecutionCause::MalformedQuery,
        }
    }
}

/// Errors raised by a `QueryStore` implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query rejected by store: {0}")]
    Rejected(String),
}

impl From<StoreError> for ExecutionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(msg) => ExecutionError::StoreUnavailable(msg),
            StoreError::Rejected(msg) => ExecutionError::MalformedQuery(msg),
        }
    }
}

/// Rule catalog load and validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Duplicate rule id {id}")]
    DuplicateId { id: i64 },

    #[error("Duplicate active rule name '{name}'")]
    DuplicateName { name: String },

    #[error("Rule '{rule}' has {placeholders} placeholders but {parameters} parameter specs")]
    PlaceholderMismatch {
        rule: String,
        placeholders: usize,
        parameters: usize,
    },

    #[error("Rule '{rule}' produces a table but declares no result fields")]
    EmptyResultFields { rule: String },

    #[error("Rule '{rule}' has a parameter spec with an empty name")]
    UnnamedParameter { rule: String },

    #[error("Rule '{rule}' declares parameter '{parameter}' more than once")]
    DuplicateParameter { rule: String, parameter: String },

    #[error("Rule '{rule}' has an empty query template")]
    EmptyTemplate { rule: String },

    #[error("Fallback rule '{name}' is not an active rule in the catalog")]
    UnknownFallback { name: String },
}

pub type Result<T> = std::result::Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_execution_causes() {
        let unavailable: ExecutionError = StoreError::Unavailable("pool closed".into()).into();
        assert_eq!(unavailable.cause(), ExecutionCause::StoreUnavailable);

        let rejected: ExecutionError = StoreError::Rejected("syntax error".into()).into();
        assert_eq!(rejected.cause(), ExecutionCause::MalformedQuery);
    }

    #[test]
    fn router_error_kinds() {
        assert_eq!(RouterError::NoMatch.kind(), ErrorKind::NoMatch);
        assert_eq!(RouterError::Canceled.kind(), ErrorKind::Canceled);
        let err: RouterError = ExecutionError::Timeout(Duration::from_millis(5)).into();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
        assert_eq!(err.to_string(), "Execution error: Query timed out after 5ms");
    }
}
