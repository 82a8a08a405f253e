//! Query error types
//!
//! Error codes:
//! - CQ_QUERY_INVALID_TREE_OPERATION (FATAL) - programming error, never retried
//! - CQ_QUERY_STORE_FAILURE (ERROR) - store call failed during execution
//! - CQ_QUERY_EXECUTION_FAILED (ERROR) - execution failed, carries the rendered plan
//! - CQ_QUERY_RANGE_WITHOUT_ORDERING (ERROR) - configuration error, raised before any store call
//! - CQ_QUERY_CONFIG_INVALID (ERROR)

use thiserror::Error;

use crate::observability::Severity;
use crate::store::StoreError;

/// Errors raised while building or executing an operand tree
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// An operation the node variant does not support
    #[error("invalid tree operation: {0}")]
    InvalidTreeOperation(String),

    /// A store call failed while a node was executing
    #[error("error processing secondary index on '{column_family}' for [{clause}]: {source}")]
    Store {
        column_family: String,
        clause: String,
        #[source]
        source: StoreError,
    },

    /// Query execution failed; `plan` is the rendered tree
    #[error("failed to run query [{plan}]: {source}")]
    Execution {
        plan: String,
        #[source]
        source: Box<QueryError>,
    },

    /// A result range was requested without an ordering expression
    #[error(
        "cannot apply a range without an ordering expression: rows are returned in store order and need an ordering to page"
    )]
    RangeWithoutOrdering,

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl QueryError {
    pub fn invalid_tree_operation(reason: impl Into<String>) -> Self {
        QueryError::InvalidTreeOperation(reason.into())
    }

    pub fn store(column_family: impl Into<String>, clause: impl Into<String>, source: StoreError) -> Self {
        QueryError::Store {
            column_family: column_family.into(),
            clause: clause.into(),
            source,
        }
    }

    /// Wrap an execution failure with the plan that was running
    pub fn execution(plan: impl Into<String>, source: QueryError) -> Self {
        QueryError::Execution {
            plan: plan.into(),
            source: Box::new(source),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        QueryError::InvalidConfig(reason.into())
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidTreeOperation(_) => "CQ_QUERY_INVALID_TREE_OPERATION",
            QueryError::Store { .. } => "CQ_QUERY_STORE_FAILURE",
            QueryError::Execution { .. } => "CQ_QUERY_EXECUTION_FAILED",
            QueryError::RangeWithoutOrdering => "CQ_QUERY_RANGE_WITHOUT_ORDERING",
            QueryError::InvalidConfig(_) => "CQ_QUERY_CONFIG_INVALID",
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        match self {
            QueryError::InvalidTreeOperation(_) => Severity::Fatal,
            QueryError::Execution { source, .. } => source.severity(),
            _ => Severity::Error,
        }
    }

    /// The innermost error, skipping execution wrappers
    pub fn root_cause(&self) -> &QueryError {
        match self {
            QueryError::Execution { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            QueryError::invalid_tree_operation("x").code(),
            "CQ_QUERY_INVALID_TREE_OPERATION"
        );
        assert_eq!(
            QueryError::RangeWithoutOrdering.code(),
            "CQ_QUERY_RANGE_WITHOUT_ORDERING"
        );
    }

    #[test]
    fn test_tree_errors_are_fatal() {
        assert_eq!(
            QueryError::invalid_tree_operation("x").severity(),
            Severity::Fatal
        );
        let wrapped = QueryError::execution("a = 'b'", QueryError::invalid_tree_operation("x"));
        assert_eq!(wrapped.severity(), Severity::Fatal);
        assert_eq!(wrapped.root_cause().code(), "CQ_QUERY_INVALID_TREE_OPERATION");
    }

    #[test]
    fn test_store_error_display_names_clause() {
        let err = QueryError::store(
            "users",
            "status = 'active'",
            StoreError::Unavailable("node down".into()),
        );
        let display = err.to_string();
        assert!(display.contains("users"));
        assert!(display.contains("status = 'active'"));
        assert!(display.contains("node down"));
    }
}
