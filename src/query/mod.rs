//! Index clauses and operand trees
//!
//! The query layer turns a filter into a tree of secondary-index lookups:
//!
//! - [`IndexClause`]: a conjunction the store executes as one lookup
//! - [`OperandTree`]: `Equality` leaves and `Or` nodes over them
//! - discriminator expansion for single-table class hierarchies
//!
//! Execution returns [`CandidateKeys`]: row keys plus the columns that were
//! selected, deduplicated by row key.

mod clause;
mod columns;
mod discriminator;
mod errors;
mod operand;

pub use clause::{render_value, IndexClause, IndexExpression, IndexOperator};
pub use columns::{CandidateKeys, Columns};
pub use errors::{QueryError, QueryResult};
pub use operand::{
    ExecutionOptions, Node, NodeId, NodeState, OperandKind, OperandTree,
    DEFAULT_MAX_BRANCH_THREADS,
};
