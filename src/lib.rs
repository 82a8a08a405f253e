//! colquery - query compilation for wide-column stores
//!
//! Translates object-query filters into secondary-index lookups against a
//! column store that only supports equality and range comparisons on indexed
//! columns, and provides the binary array codec used for values stored there.
//!
//! - [`codec`]: length-prefixed array encoding over per-type element codecs
//! - [`query`]: index clauses, operand trees, discriminator expansion
//! - [`compiler`]: filter evaluation and the query driver
//! - [`store`]: the store client interface and an in-memory store
//! - [`observability`]: structured logging, scopes, counters

pub mod codec;
pub mod compiler;
pub mod config;
pub mod observability;
pub mod query;
pub mod store;

pub use config::QueryConfig;
