//! Filter evaluation errors
//!
//! Error codes:
//! - CQ_EVAL_UNSUPPORTED (WARN) - filter shape has no index-clause form
//! - CQ_EVAL_MISSING_PARAMETER (WARN)
//! - CQ_EVAL_ENCODING (WARN) - literal cannot be encoded for the column
//! - CQ_EVAL_TREE (severity of the wrapped error)
//!
//! The compiler downgrades every evaluation failure to a full scan, so these
//! never reach the caller of `QueryCompiler::run`.

use thiserror::Error;

use crate::codec::CodecError;
use crate::observability::Severity;
use crate::query::QueryError;

#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("unsupported filter: {0}")]
    Unsupported(String),

    #[error("no value bound for parameter '{0}'")]
    MissingParameter(String),

    #[error("cannot encode value for field '{field}': {source}")]
    Encoding {
        field: String,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Tree(#[from] QueryError),
}

impl EvalError {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        EvalError::Unsupported(reason.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            EvalError::Unsupported(_) => "CQ_EVAL_UNSUPPORTED",
            EvalError::MissingParameter(_) => "CQ_EVAL_MISSING_PARAMETER",
            EvalError::Encoding { .. } => "CQ_EVAL_ENCODING",
            EvalError::Tree(_) => "CQ_EVAL_TREE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            EvalError::Tree(err) => err.severity(),
            _ => Severity::Warn,
        }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;
