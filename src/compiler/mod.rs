//! Query compilation
//!
//! Translates a parsed filter plus class metadata into an operand tree of
//! secondary-index lookups, runs it against a [`crate::store::StoreClient`],
//! and reports the plan.
//!
//! ```ignore
//! use colquery::compiler::{FilterExpr, QueryCompiler, QueryRequest};
//!
//! let compiler = QueryCompiler::new(QueryConfig::default())?;
//! let request = QueryRequest::new().with_filter(FilterExpr::eq("status", "active"));
//! let outcome = compiler.run(&request, &descriptor, &store)?;
//! ```

#[allow(clippy::module_inception)]
mod compiler;
mod errors;
mod explain;
mod filter;
mod metadata;

pub use compiler::{OrderBy, QueryCompiler, QueryOutcome, QueryRequest};
pub use errors::{EvalError, EvalResult};
pub use explain::{ExplainPlan, ScanKind};
pub use filter::{
    EvalContext, FilterEvaluator, FilterExpr, FilterOp, IndexedFilterEvaluator, Literal,
};
pub use metadata::{ClassDescriptor, ClassMetadata, FieldDescriptor};
