//! Query compiler
//!
//! Drives one query end to end:
//!
//! 1. reject a result range without an ordering, before any store call
//! 2. evaluate the filter into an operand tree, or fall back to the
//!    all-scan placeholder when the filter has no index-clause form
//! 3. restrict the tree to the class's discriminator values
//! 4. execute: one index lookup per leaf, or a paginated full scan
//!
//! The result is the set of candidate rows with the identity (and
//! discriminator) columns needed to materialize objects.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use super::errors::EvalError;
use super::explain::ExplainPlan;
use super::filter::{EvalContext, FilterEvaluator, FilterExpr, IndexedFilterEvaluator, Literal};
use super::metadata::ClassMetadata;
use crate::config::QueryConfig;
use crate::observability::{Logger, ObservationScope, QueryMetrics, Severity};
use crate::query::{
    CandidateKeys, ExecutionOptions, NodeId, OperandTree, QueryError, QueryResult,
};
use crate::store::{paginated_scan, ColumnSelection, StoreClient};

/// One ordering expression of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// A query against one candidate class
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub filter: Option<FilterExpr>,
    pub parameters: HashMap<String, Literal>,
    /// Requested result range; requires an ordering
    pub range: Option<Range<u64>>,
    /// Ordering expressions; carried for validation only
    pub ordering: Vec<OrderBy>,
    /// Also match rows of subclasses
    pub include_subclasses: bool,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_range(mut self, range: Range<u64>) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_ordering(mut self, ordering: OrderBy) -> Self {
        self.ordering.push(ordering);
        self
    }

    pub fn include_subclasses(mut self, include: bool) -> Self {
        self.include_subclasses = include;
        self
    }
}

/// Result of [`QueryCompiler::run`]
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub candidates: CandidateKeys,
    /// False when the rows came from a full scan
    pub indexed: bool,
    /// Rendered operand tree that was executed
    pub plan: String,
}

pub struct QueryCompiler {
    config: QueryConfig,
    evaluator: Box<dyn FilterEvaluator>,
    metrics: Arc<QueryMetrics>,
}

impl QueryCompiler {
    /// Create a compiler with the indexed filter evaluator.
    ///
    /// Also applies `config.log_level` to the process-wide logger.
    pub fn new(config: QueryConfig) -> QueryResult<Self> {
        config.validate()?;
        Logger::set_min_severity(config.log_level);
        Ok(Self {
            config,
            evaluator: Box::new(IndexedFilterEvaluator::new()),
            metrics: Arc::new(QueryMetrics::new()),
        })
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn FilterEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Share counters with other components
    pub fn with_metrics(mut self, metrics: Arc<QueryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<QueryMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Build the operand tree for `filter`.
    ///
    /// Filters without an index-clause form compile to the all-scan
    /// placeholder. Invalid tree operations are programming errors and are
    /// returned.
    pub fn compile(
        &self,
        filter: Option<&FilterExpr>,
        metadata: &dyn ClassMetadata,
        parameters: &HashMap<String, Literal>,
        row_limit: u32,
        include_subclasses: bool,
    ) -> QueryResult<OperandTree> {
        self.metrics.increment_compiled();

        let mut tree = OperandTree::new();
        let evaluated = match filter {
            None => Ok(tree.all_scan(row_limit)),
            Some(expr) => {
                let mut ctx = EvalContext::new(&mut tree, metadata, parameters, row_limit);
                self.evaluator.evaluate(expr, &mut ctx)
            }
        };

        let mut root = match evaluated {
            Ok(root) => root,
            Err(EvalError::Tree(err)) => return Err(err),
            Err(err) => {
                let reason = err.to_string();
                let rendered = filter.map(|f| f.to_string()).unwrap_or_default();
                self.fall_back(
                    &mut tree,
                    row_limit,
                    &[
                        ("code", err.code()),
                        ("filter", rendered.as_str()),
                        ("reason", reason.as_str()),
                    ],
                )
            }
        };

        if let Some(column) = metadata.discriminator_column() {
            let values = metadata.discriminator_values(include_subclasses);
            root = match tree.optimize_discriminator(root, column, &values) {
                Ok(expanded) => expanded,
                Err(err) => {
                    let reason = err.to_string();
                    self.fall_back(
                        &mut tree,
                        row_limit,
                        &[("code", err.code()), ("reason", reason.as_str())],
                    )
                }
            };
        }

        tree.set_root(root);
        Ok(tree)
    }

    /// Replace `tree` with a fresh all-scan placeholder
    fn fall_back(&self, tree: &mut OperandTree, row_limit: u32, fields: &[(&str, &str)]) -> NodeId {
        self.metrics.increment_scan_fallbacks();
        Logger::trace("QUERY_FALLBACK_FULL_SCAN", fields);
        *tree = OperandTree::new();
        tree.all_scan(row_limit)
    }

    /// Execute a compiled tree and return its candidate rows.
    ///
    /// A tree that is not indexed is answered with a paginated full scan
    /// capped at the placeholder's row count. Failures are wrapped with the
    /// rendered tree.
    pub fn execute<S>(
        &self,
        tree: &mut OperandTree,
        store: &S,
        column_family: &str,
        select: &ColumnSelection,
    ) -> QueryResult<CandidateKeys>
    where
        S: StoreClient + Sync + ?Sized,
    {
        let root = tree
            .root()
            .ok_or_else(|| QueryError::invalid_tree_operation("operand tree has no root"))?;
        let read = self.config.read_options();
        let plan = tree.render(root);

        let candidates = if tree.is_indexed(root) {
            self.metrics.increment_index_queries();
            self.metrics.add_leaf_lookups(tree.leaves(root).len() as u64);
            if Logger::enabled(Severity::Trace) {
                Logger::trace(
                    "QUERY_PLAN",
                    &[("column_family", column_family), ("plan", plan.as_str())],
                );
            }

            let options = ExecutionOptions {
                read,
                parallel: self.config.parallel_branches,
                max_threads: self.config.max_branch_threads,
            };
            tree.perform_query(root, store, column_family, select, &options)
                .map_err(|err| {
                    if matches!(err, QueryError::Store { .. }) {
                        self.metrics.increment_store_failures();
                    }
                    QueryError::execution(plan.as_str(), err)
                })?;
            tree.take_candidate_keys(root)?
        } else {
            self.metrics.increment_full_scans();
            let limit = ExplainPlan::from_node(tree, root).row_limit;
            Logger::trace(
                "QUERY_FULL_SCAN",
                &[("column_family", column_family), ("limit", limit.to_string().as_str())],
            );

            paginated_scan(
                store,
                column_family,
                select,
                limit as usize,
                self.config.scan_page_size,
                &read,
            )
            .map_err(|err| {
                self.metrics.increment_store_failures();
                QueryError::execution(plan.as_str(), QueryError::store(column_family, "full scan", err))
            })?
        };

        self.metrics.add_rows_returned(candidates.len() as u64);
        Ok(candidates)
    }

    /// Compile and execute `request` against the class described by `metadata`
    pub fn run<S>(
        &self,
        request: &QueryRequest,
        metadata: &dyn ClassMetadata,
        store: &S,
    ) -> QueryResult<QueryOutcome>
    where
        S: StoreClient + Sync + ?Sized,
    {
        if request.range.is_some() && request.ordering.is_empty() {
            return Err(QueryError::RangeWithoutOrdering);
        }

        let row_limit = match &request.range {
            Some(range) => u32::try_from(range.end).unwrap_or(u32::MAX),
            None => self.config.default_row_limit,
        };

        let mut select = vec![metadata.identity_column().to_vec()];
        if let Some(column) = metadata.discriminator_column() {
            select.push(column.to_vec());
        }
        let select = ColumnSelection::new(select);
        let column_family = metadata.column_family();

        let scope = ObservationScope::with_fields(
            "QUERY",
            &[("class", metadata.class_name()), ("column_family", column_family)],
        );

        let result = self
            .compile(
                request.filter.as_ref(),
                metadata,
                &request.parameters,
                row_limit,
                request.include_subclasses,
            )
            .and_then(|mut tree| {
                let indexed = tree.root().map(|root| tree.is_indexed(root)).unwrap_or(false);
                let plan = tree.to_string();
                let candidates = self.execute(&mut tree, store, column_family, &select)?;
                Ok(QueryOutcome {
                    candidates,
                    indexed,
                    plan,
                })
            });

        match &result {
            Ok(outcome) => {
                let rows = outcome.candidates.len().to_string();
                scope.complete_with_fields(&[
                    ("indexed", if outcome.indexed { "true" } else { "false" }),
                    ("rows", rows.as_str()),
                ]);
            }
            Err(err) => scope.fail(&err.to_string()),
        }
        result
    }

    pub fn explain(&self, tree: &OperandTree) -> ExplainPlan {
        ExplainPlan::from_tree(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ComparatorType;
    use crate::compiler::errors::EvalResult;
    use crate::compiler::metadata::{ClassDescriptor, FieldDescriptor};
    use crate::store::{MemoryStore, StoreError};

    fn users() -> ClassDescriptor {
        ClassDescriptor::new("User", "users")
            .with_field(FieldDescriptor::new("status", ComparatorType::Utf8).indexed())
            .with_field(FieldDescriptor::new("nickname", ComparatorType::Utf8))
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_column_family("users").unwrap();
        for (key, status) in [("u1", "active"), ("u2", "banned"), ("u3", "active")] {
            store
                .insert_row("users", key, [("id", key), ("status", status)])
                .unwrap();
        }
        store
    }

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(QueryConfig::default()).unwrap()
    }

    #[test]
    fn test_no_filter_compiles_to_all_scan() {
        let tree = compiler()
            .compile(None, &users(), &HashMap::new(), 1000, false)
            .unwrap();
        let root = tree.root().unwrap();
        assert!(!tree.is_indexed(root));
        assert_eq!(tree.clause(root).unwrap().count(), 1000);
    }

    #[test]
    fn test_unsupported_filter_falls_back() {
        let compiler = compiler();
        let filter = FilterExpr::eq("nickname", "bob");
        let tree = compiler
            .compile(Some(&filter), &users(), &HashMap::new(), 50, false)
            .unwrap();

        assert!(!tree.is_indexed(tree.root().unwrap()));
        assert_eq!(compiler.metrics().snapshot().scan_fallbacks, 1);
    }

    #[test]
    fn test_tree_errors_are_not_swallowed() {
        struct Broken;
        impl FilterEvaluator for Broken {
            fn evaluate(&self, _: &FilterExpr, _: &mut EvalContext<'_>) -> EvalResult<NodeId> {
                Err(QueryError::invalid_tree_operation("bad link").into())
            }
        }

        let compiler = compiler().with_evaluator(Box::new(Broken));
        let filter = FilterExpr::eq("status", "active");
        let err = compiler
            .compile(Some(&filter), &users(), &HashMap::new(), 50, false)
            .unwrap_err();
        assert_eq!(err.code(), "CQ_QUERY_INVALID_TREE_OPERATION");
    }

    #[test]
    fn test_run_indexed_query() {
        let compiler = compiler();
        let request = QueryRequest::new().with_filter(FilterExpr::eq("status", "active"));

        let outcome = compiler.run(&request, &users(), &store()).unwrap();

        assert!(outcome.indexed);
        assert_eq!(outcome.plan, "status = 'active'");
        let keys: Vec<_> = outcome.candidates.keys().collect();
        assert_eq!(keys, vec![&b"u1"[..], &b"u3"[..]]);
        assert_eq!(
            outcome.candidates.get(b"u1").unwrap().column_value(b"id"),
            Some(&b"u1"[..])
        );

        let metrics = compiler.metrics().snapshot();
        assert_eq!(metrics.index_queries, 1);
        assert_eq!(metrics.rows_returned, 2);
    }

    #[test]
    fn test_run_full_scan() {
        let compiler = compiler();
        let outcome = compiler.run(&QueryRequest::new(), &users(), &store()).unwrap();

        assert!(!outcome.indexed);
        assert_eq!(outcome.candidates.len(), 3);
        assert_eq!(compiler.metrics().snapshot().full_scans, 1);
    }

    #[test]
    fn test_range_without_ordering_is_rejected_before_store_calls() {
        let store = store();
        let request = QueryRequest::new()
            .with_filter(FilterExpr::eq("status", "active"))
            .with_range(0..10);

        let err = compiler().run(&request, &users(), &store).unwrap_err();

        assert!(matches!(err, QueryError::RangeWithoutOrdering));
        assert_eq!(store.indexed_calls(), 0);
        assert_eq!(store.range_calls(), 0);
    }

    #[test]
    fn test_range_end_limits_rows() {
        let request = QueryRequest::new()
            .with_range(0..2)
            .with_ordering(OrderBy::asc("status"));

        let outcome = compiler().run(&request, &users(), &store()).unwrap();
        assert_eq!(outcome.candidates.len(), 2);
    }

    #[test]
    fn test_store_failure_names_plan() {
        let store = store();
        store.fail_with(StoreError::Unavailable("node down".into()));
        let compiler = compiler();
        let request = QueryRequest::new().with_filter(FilterExpr::eq("status", "active"));

        let err = compiler.run(&request, &users(), &store).unwrap_err();

        assert_eq!(err.code(), "CQ_QUERY_EXECUTION_FAILED");
        assert!(err.to_string().contains("status = 'active'"));
        assert_eq!(err.root_cause().code(), "CQ_QUERY_STORE_FAILURE");
        assert_eq!(compiler.metrics().snapshot().store_failures, 1);
    }

    #[test]
    fn test_execute_without_root_fails() {
        let mut tree = OperandTree::new();
        let err = compiler()
            .execute(&mut tree, &store(), "users", &ColumnSelection::new(["id"]))
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidTreeOperation(_)));
    }
}
