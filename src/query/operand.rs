//! Operand trees
//!
//! A compiled query is a binary tree of two node kinds:
//!
//! - `Equality`: one [`IndexClause`], executed as a single index lookup
//! - `Or`: two children whose candidate rows are unioned by row key
//!
//! Nodes live in an arena owned by [`OperandTree`] and refer to each other
//! through [`NodeId`]. The parent link is a plain id, so a tree has a single
//! owner and no reference cycles.
//!
//! Execution follows the node state machine
//! `Unexecuted -> Executing -> Complete`. A leaf that finishes notifies its
//! parent through [`OperandTree::complete`]; an `Or` becomes complete once both
//! children have reported.

use std::fmt;
use std::thread;

use super::clause::{IndexClause, IndexExpression};
use super::columns::CandidateKeys;
use super::errors::{QueryError, QueryResult};
use crate::observability::{Logger, Severity};
use crate::store::{ColumnSelection, ReadOptions, StoreClient};

/// Handle to a node of one [`OperandTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Execution state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Unexecuted,
    Executing,
    Complete,
}

/// The two node variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandKind {
    Equality(IndexClause),
    Or {
        left: NodeId,
        right: NodeId,
        /// Completion flags for `[left, right]`
        completed: [bool; 2],
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    kind: OperandKind,
    parent: Option<NodeId>,
    state: NodeState,
    candidates: CandidateKeys,
}

impl Node {
    fn new(kind: OperandKind) -> Self {
        Self {
            kind,
            parent: None,
            state: NodeState::Unexecuted,
            candidates: CandidateKeys::new(),
        }
    }

    pub fn kind(&self) -> &OperandKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// The clause of an `Equality` node
    pub fn clause(&self) -> Option<&IndexClause> {
        match &self.kind {
            OperandKind::Equality(clause) => Some(clause),
            OperandKind::Or { .. } => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, OperandKind::Equality(_))
    }
}

/// Extra threads one parallel execution may spawn by default
pub const DEFAULT_MAX_BRANCH_THREADS: usize = 8;

/// Options for one tree execution
#[derive(Debug, Clone, Copy)]
pub struct ExecutionOptions {
    pub read: ReadOptions,
    /// Run the two branches of an `Or` on separate threads
    pub parallel: bool,
    /// Upper bound on threads spawned for one execution; branches beyond
    /// the budget run on the calling thread
    pub max_threads: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            read: ReadOptions::default(),
            parallel: false,
            max_threads: DEFAULT_MAX_BRANCH_THREADS,
        }
    }
}

/// Arena-backed operand tree
#[derive(Debug, Clone, Default)]
pub struct OperandTree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl OperandTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    fn push(&mut self, kind: OperandKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(kind));
        id
    }

    /// New `Equality` leaf with an empty clause limited to `count` rows
    pub fn equality(&mut self, count: u32) -> NodeId {
        self.push(OperandKind::Equality(IndexClause::new(count)))
    }

    /// The all-scan placeholder: an `Equality` leaf with no expressions
    pub fn all_scan(&mut self, count: u32) -> NodeId {
        self.equality(count)
    }

    pub fn equality_with(&mut self, clause: IndexClause) -> NodeId {
        self.push(OperandKind::Equality(clause))
    }

    /// New `Or` node over two detached subtrees
    pub fn or(&mut self, left: NodeId, right: NodeId) -> QueryResult<NodeId> {
        if left == right {
            return Err(QueryError::invalid_tree_operation(format!(
                "node {} cannot be both children of an Or",
                left
            )));
        }
        self.ensure_detached(left, None)?;
        self.ensure_detached(right, None)?;

        let id = self.push(OperandKind::Or {
            left,
            right,
            completed: [false; 2],
        });
        self.node_mut(left)?.parent = Some(id);
        self.node_mut(right)?.parent = Some(id);
        Ok(id)
    }

    pub fn set_left(&mut self, or: NodeId, child: NodeId) -> QueryResult<()> {
        self.set_child(or, child, 0)
    }

    pub fn set_right(&mut self, or: NodeId, child: NodeId) -> QueryResult<()> {
        self.set_child(or, child, 1)
    }

    fn set_child(&mut self, or: NodeId, child: NodeId, side: usize) -> QueryResult<()> {
        let sibling = match &self.node(or)?.kind {
            OperandKind::Equality(_) => {
                return Err(QueryError::invalid_tree_operation(format!(
                    "cannot attach child {} to Equality node {}",
                    child, or
                )))
            }
            OperandKind::Or { left, right, .. } => {
                if side == 0 {
                    *right
                } else {
                    *left
                }
            }
        };
        if child == sibling {
            return Err(QueryError::invalid_tree_operation(format!(
                "node {} cannot be both children of Or node {}",
                child, or
            )));
        }
        self.ensure_detached(child, Some(or))?;
        self.ensure_not_ancestor(child, or)?;

        let mut previous = child;
        if let OperandKind::Or { left, right, .. } = &mut self.node_mut(or)?.kind {
            let slot = if side == 0 { left } else { right };
            previous = std::mem::replace(slot, child);
        }

        if previous != child {
            let old = self.node_mut(previous)?;
            if old.parent == Some(or) {
                old.parent = None;
            }
        }
        self.node_mut(child)?.parent = Some(or);
        Ok(())
    }

    /// `child` may only be attached when it has no parent, or when it is
    /// already a child of `owner`
    fn ensure_detached(&self, child: NodeId, owner: Option<NodeId>) -> QueryResult<()> {
        match self.node(child)?.parent {
            Some(parent) if Some(parent) != owner => {
                Err(QueryError::invalid_tree_operation(format!(
                    "node {} is already a child of {}",
                    child, parent
                )))
            }
            _ => Ok(()),
        }
    }

    /// Reject attaching `child` below `or` when `child` is `or` itself or one
    /// of its ancestors
    fn ensure_not_ancestor(&self, child: NodeId, or: NodeId) -> QueryResult<()> {
        let mut current = Some(or);
        let mut steps = 0;
        while let Some(id) = current {
            if id == child || steps > self.nodes.len() {
                return Err(QueryError::invalid_tree_operation(format!(
                    "attaching {} below {} would create a cycle",
                    child, or
                )));
            }
            current = self.node(id)?.parent;
            steps += 1;
        }
        Ok(())
    }

    /// Append an expression to an `Equality` leaf's clause
    pub fn add_expression(&mut self, leaf: NodeId, expression: IndexExpression) -> QueryResult<()> {
        match &mut self.node_mut(leaf)?.kind {
            OperandKind::Equality(clause) => {
                clause.push(expression);
                Ok(())
            }
            OperandKind::Or { .. } => Err(QueryError::invalid_tree_operation(format!(
                "cannot add an expression to Or node {}",
                leaf
            ))),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn node(&self, id: NodeId) -> QueryResult<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| QueryError::invalid_tree_operation(format!("unknown node {}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> QueryResult<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| QueryError::invalid_tree_operation(format!("unknown node {}", id)))
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// Number of nodes in the arena, including detached ones
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn state(&self, id: NodeId) -> Option<NodeState> {
        self.get(id).map(Node::state)
    }

    pub fn clause(&self, id: NodeId) -> Option<&IndexClause> {
        self.get(id).and_then(Node::clause)
    }

    /// False only for the all-scan placeholder, or an `Or` above one
    pub fn is_indexed(&self, id: NodeId) -> bool {
        match self.get(id).map(Node::kind) {
            Some(OperandKind::Equality(clause)) => !clause.is_empty(),
            Some(OperandKind::Or { left, right, .. }) => {
                self.is_indexed(*left) && self.is_indexed(*right)
            }
            None => false,
        }
    }

    /// Equality leaves under `id`, left to right
    pub fn leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.get(current).map(Node::kind) {
                Some(OperandKind::Equality(_)) => leaves.push(current),
                Some(OperandKind::Or { left, right, .. }) => {
                    stack.push(*right);
                    stack.push(*left);
                }
                None => {}
            }
        }
        leaves
    }

    /// Height of the subtree at `id`; a single leaf has depth 1
    pub fn depth(&self, id: NodeId) -> usize {
        match self.get(id).map(Node::kind) {
            Some(OperandKind::Equality(_)) => 1,
            Some(OperandKind::Or { left, right, .. }) => {
                1 + self.depth(*left).max(self.depth(*right))
            }
            None => 0,
        }
    }

    /// Rows accumulated at `id`; empty until the node has executed
    pub fn candidate_keys(&self, id: NodeId) -> QueryResult<&CandidateKeys> {
        Ok(&self.node(id)?.candidates)
    }

    pub fn take_candidate_keys(&mut self, id: NodeId) -> QueryResult<CandidateKeys> {
        Ok(std::mem::take(&mut self.node_mut(id)?.candidates))
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Record that `child` of `parent` finished.
    ///
    /// Once both children of an `Or` are complete their rows are moved into
    /// the `Or`, which then completes and notifies its own parent.
    pub fn complete(&mut self, parent: NodeId, child: NodeId) -> QueryResult<()> {
        let mut parent = parent;
        let mut child = child;

        loop {
            let (left, right) = match &mut self.node_mut(parent)?.kind {
                OperandKind::Equality(_) => {
                    return Err(QueryError::invalid_tree_operation(format!(
                        "complete called on Equality node {} by {}",
                        parent, child
                    )))
                }
                OperandKind::Or {
                    left,
                    right,
                    completed,
                } => {
                    if child == *left {
                        completed[0] = true;
                    } else if child == *right {
                        completed[1] = true;
                    } else {
                        return Err(QueryError::invalid_tree_operation(format!(
                            "node {} is not a child of {}",
                            child, parent
                        )));
                    }
                    if !(completed[0] && completed[1]) {
                        return Ok(());
                    }
                    (*left, *right)
                }
            };

            let mut merged = self.take_candidate_keys(left)?;
            merged.merge(self.take_candidate_keys(right)?);

            let node = self.node_mut(parent)?;
            node.candidates = merged;
            node.state = NodeState::Complete;

            match node.parent {
                Some(grandparent) => {
                    child = parent;
                    parent = grandparent;
                }
                None => return Ok(()),
            }
        }
    }

    /// Execute the subtree at `id` against `store`.
    ///
    /// Every leaf issues one index lookup. With `options.parallel` the two
    /// branches of each `Or` run on separate scoped threads. On success `id`
    /// is complete and its parent, if any, has been notified.
    pub fn perform_query<S>(
        &mut self,
        id: NodeId,
        store: &S,
        column_family: &str,
        select: &ColumnSelection,
        options: &ExecutionOptions,
    ) -> QueryResult<()>
    where
        S: StoreClient + Sync + ?Sized,
    {
        self.reset(id)?;

        let threads = if options.parallel { options.max_threads } else { 0 };
        let fetched = self.fetch(id, store, column_family, select, options, threads)?;

        for (leaf, candidates) in fetched {
            let node = self.node_mut(leaf)?;
            node.candidates = candidates;
            node.state = NodeState::Complete;
            let parent = node.parent;
            if let Some(parent) = parent {
                self.complete(parent, leaf)?;
            }
        }
        Ok(())
    }

    /// Mark the subtree as executing and clear any earlier results
    fn reset(&mut self, id: NodeId) -> QueryResult<()> {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node_mut(current)?;
            node.state = NodeState::Executing;
            node.candidates = CandidateKeys::new();
            if let OperandKind::Or {
                left,
                right,
                completed,
            } = &mut node.kind
            {
                *completed = [false; 2];
                stack.push(*right);
                stack.push(*left);
            }
        }
        Ok(())
    }

    /// Run every lookup under `id` without touching node state. At most
    /// `threads` extra threads are spawned for the subtree.
    fn fetch<S>(
        &self,
        id: NodeId,
        store: &S,
        column_family: &str,
        select: &ColumnSelection,
        options: &ExecutionOptions,
        threads: usize,
    ) -> QueryResult<Vec<(NodeId, CandidateKeys)>>
    where
        S: StoreClient + Sync + ?Sized,
    {
        match &self.node(id)?.kind {
            OperandKind::Equality(clause) => {
                let candidates = lookup(clause, store, column_family, select, &options.read)?;
                Ok(vec![(id, candidates)])
            }
            OperandKind::Or { left, right, .. } if threads > 0 => {
                let (left, right) = (*left, *right);
                let spare = threads - 1;
                let left_threads = spare / 2;
                let right_threads = spare - left_threads;
                let (left_rows, right_rows) = thread::scope(|scope| {
                    let handle = scope.spawn(move || {
                        self.fetch(left, store, column_family, select, options, left_threads)
                    });
                    let right_rows =
                        self.fetch(right, store, column_family, select, options, right_threads);
                    let left_rows = handle.join().unwrap_or_else(|_| {
                        Err(QueryError::invalid_tree_operation(format!(
                            "branch {} panicked",
                            left
                        )))
                    });
                    (left_rows, right_rows)
                });
                let mut rows = left_rows?;
                rows.extend(right_rows?);
                Ok(rows)
            }
            OperandKind::Or { left, right, .. } => {
                let mut rows = self.fetch(*left, store, column_family, select, options, 0)?;
                rows.extend(self.fetch(*right, store, column_family, select, options, 0)?);
                Ok(rows)
            }
        }
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// CQL-like rendering of the subtree at `id`
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render_into(id, &mut out);
        out
    }

    fn render_into(&self, id: NodeId, out: &mut String) {
        match self.get(id).map(Node::kind) {
            Some(OperandKind::Equality(clause)) => out.push_str(&clause.to_string()),
            Some(OperandKind::Or { left, right, .. }) => {
                out.push('(');
                self.render_into(*left, out);
                out.push_str(") OR (");
                self.render_into(*right, out);
                out.push(')');
            }
            None => {}
        }
    }
}

impl fmt::Display for OperandTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => f.write_str(&self.render(root)),
            None => Ok(()),
        }
    }
}

/// One index lookup for `clause`; rows without any selected column are dropped
fn lookup<S>(
    clause: &IndexClause,
    store: &S,
    column_family: &str,
    select: &ColumnSelection,
    options: &ReadOptions,
) -> QueryResult<CandidateKeys>
where
    S: StoreClient + ?Sized,
{
    let rows = store
        .get_indexed_columns(column_family, clause, select, options)
        .map_err(|err| QueryError::store(column_family, clause.to_string(), err))?;

    let candidates: CandidateKeys = rows.into_iter().filter_map(|row| row.into_columns()).collect();

    if Logger::enabled(Severity::Trace) {
        let rendered = clause.to_string();
        let rows = candidates.len().to_string();
        Logger::trace(
            "INDEX_LOOKUP",
            &[
                ("clause", rendered.as_str()),
                ("column_family", column_family),
                ("rows", rows.as_str()),
            ],
        );
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::store::{KeyRange, KeySlice, MemoryStore, StoreError, StoreResult};

    /// Records the largest number of index lookups in flight at once
    struct InFlightStore {
        inner: MemoryStore,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl StoreClient for InFlightStore {
        fn get_indexed_columns(
            &self,
            column_family: &str,
            clause: &IndexClause,
            select: &ColumnSelection,
            options: &ReadOptions,
        ) -> StoreResult<Vec<KeySlice>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            let rows = self
                .inner
                .get_indexed_columns(column_family, clause, select, options);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            rows
        }

        fn get_columns_from_rows(
            &self,
            column_family: &str,
            range: &KeyRange,
            select: &ColumnSelection,
            options: &ReadOptions,
        ) -> StoreResult<Vec<KeySlice>> {
            self.inner
                .get_columns_from_rows(column_family, range, select, options)
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_column_family("users").unwrap();
        store
            .insert_row("users", "u1", [("id", "1"), ("status", "active"), ("plan", "pro")])
            .unwrap();
        store
            .insert_row("users", "u2", [("id", "2"), ("status", "active"), ("plan", "free")])
            .unwrap();
        store
            .insert_row("users", "u3", [("id", "3"), ("status", "banned"), ("plan", "pro")])
            .unwrap();
        store
    }

    fn select() -> ColumnSelection {
        ColumnSelection::new(["id"])
    }

    fn leaf(tree: &mut OperandTree, column: &str, value: &str) -> NodeId {
        let id = tree.equality(100);
        tree.add_expression(id, IndexExpression::eq(column, value)).unwrap();
        id
    }

    #[test]
    fn test_all_scan_is_not_indexed() {
        let mut tree = OperandTree::new();
        let scan = tree.all_scan(1000);
        assert!(!tree.is_indexed(scan));

        let indexed = leaf(&mut tree, "status", "active");
        assert!(tree.is_indexed(indexed));

        let or = tree.or(indexed, scan).unwrap();
        assert!(!tree.is_indexed(or));
    }

    #[test]
    fn test_equality_rejects_children() {
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let b = leaf(&mut tree, "status", "banned");

        let err = tree.set_left(a, b).unwrap_err();
        assert_eq!(err.code(), "CQ_QUERY_INVALID_TREE_OPERATION");
        assert_eq!(err.severity(), Severity::Fatal);
    }

    #[test]
    fn test_complete_on_equality_fails() {
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let b = leaf(&mut tree, "status", "banned");

        let err = tree.complete(a, b).unwrap_err();
        assert!(matches!(err, QueryError::InvalidTreeOperation(_)));
    }

    #[test]
    fn test_add_expression_on_or_fails() {
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let b = leaf(&mut tree, "status", "banned");
        let or = tree.or(a, b).unwrap();

        assert!(tree
            .add_expression(or, IndexExpression::eq("plan", "pro"))
            .is_err());
    }

    #[test]
    fn test_set_child_relinks_parent() {
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let b = leaf(&mut tree, "status", "banned");
        let c = leaf(&mut tree, "plan", "pro");
        let or = tree.or(a, b).unwrap();

        tree.set_right(or, c).unwrap();

        assert_eq!(tree.get(c).unwrap().parent(), Some(or));
        assert_eq!(tree.get(b).unwrap().parent(), None);
        assert_eq!(tree.leaves(or), vec![a, c]);
    }

    #[test]
    fn test_render_or_tree() {
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let b = tree.equality(100);
        tree.add_expression(b, IndexExpression::eq("status", "banned")).unwrap();
        tree.add_expression(b, IndexExpression::gte("plan", "free")).unwrap();
        let or = tree.or(a, b).unwrap();
        tree.set_root(or);

        assert_eq!(
            tree.to_string(),
            "(status = 'active') OR (status = 'banned' AND plan >= 'free')"
        );
    }

    #[test]
    fn test_perform_query_on_leaf() {
        let store = store();
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");

        assert_eq!(tree.state(a), Some(NodeState::Unexecuted));
        assert!(tree.candidate_keys(a).unwrap().is_empty());

        tree.perform_query(a, &store, "users", &select(), &ExecutionOptions::default())
            .unwrap();

        assert_eq!(tree.state(a), Some(NodeState::Complete));
        let keys: Vec<_> = tree.candidate_keys(a).unwrap().keys().collect();
        assert_eq!(keys, vec![&b"u1"[..], &b"u2"[..]]);
    }

    #[test]
    fn test_or_unions_overlapping_rows_once() {
        let store = store();
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let b = leaf(&mut tree, "plan", "pro");
        let or = tree.or(a, b).unwrap();

        tree.perform_query(or, &store, "users", &select(), &ExecutionOptions::default())
            .unwrap();

        assert_eq!(tree.state(or), Some(NodeState::Complete));
        let keys: Vec<_> = tree.candidate_keys(or).unwrap().keys().collect();
        assert_eq!(keys, vec![&b"u1"[..], &b"u2"[..], &b"u3"[..]]);
    }

    #[test]
    fn test_parallel_execution_matches_sequential() {
        let store = store();
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let b = leaf(&mut tree, "plan", "pro");
        let c = leaf(&mut tree, "status", "banned");
        let inner = tree.or(a, b).unwrap();
        let root = tree.or(inner, c).unwrap();

        let options = ExecutionOptions {
            parallel: true,
            ..ExecutionOptions::default()
        };
        tree.perform_query(root, &store, "users", &select(), &options)
            .unwrap();

        assert_eq!(tree.candidate_keys(root).unwrap().len(), 3);
        assert_eq!(store.indexed_calls(), 3);
    }

    #[test]
    fn test_subtree_completion_notifies_parent() {
        let store = store();
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let b = leaf(&mut tree, "plan", "pro");
        let or = tree.or(a, b).unwrap();
        let options = ExecutionOptions::default();

        tree.perform_query(a, &store, "users", &select(), &options).unwrap();
        assert_ne!(tree.state(or), Some(NodeState::Complete));

        tree.perform_query(b, &store, "users", &select(), &options).unwrap();
        assert_eq!(tree.state(or), Some(NodeState::Complete));
        assert_eq!(tree.candidate_keys(or).unwrap().len(), 3);
    }

    #[test]
    fn test_store_failure_is_wrapped_with_clause() {
        let store = store();
        store.fail_with(StoreError::Unavailable("node down".into()));
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");

        let err = tree
            .perform_query(a, &store, "users", &select(), &ExecutionOptions::default())
            .unwrap_err();

        match err {
            QueryError::Store {
                column_family,
                clause,
                source,
            } => {
                assert_eq!(column_family, "users");
                assert_eq!(clause, "status = 'active'");
                assert_eq!(source, StoreError::Unavailable("node down".into()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_depth_and_leaves() {
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "x", "1");
        let b = leaf(&mut tree, "x", "2");
        let c = leaf(&mut tree, "x", "3");
        let ab = tree.or(a, b).unwrap();
        let root = tree.or(ab, c).unwrap();

        assert_eq!(tree.depth(a), 1);
        assert_eq!(tree.depth(root), 3);
        assert_eq!(tree.leaves(root), vec![a, b, c]);
    }

    #[test]
    fn test_or_rejects_child_owned_elsewhere() {
        let store = store();
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let b = leaf(&mut tree, "plan", "pro");
        let c = leaf(&mut tree, "status", "banned");
        let first = tree.or(a, b).unwrap();

        let err = tree.or(a, c).unwrap_err();
        assert_eq!(err.code(), "CQ_QUERY_INVALID_TREE_OPERATION");
        assert_eq!(tree.get(a).unwrap().parent(), Some(first));

        tree.perform_query(first, &store, "users", &select(), &ExecutionOptions::default())
            .unwrap();
        assert_eq!(tree.state(first), Some(NodeState::Complete));
        assert_eq!(tree.candidate_keys(first).unwrap().len(), 3);
    }

    #[test]
    fn test_set_child_rejects_shared_and_cyclic_links() {
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "x", "1");
        let b = leaf(&mut tree, "x", "2");
        let c = leaf(&mut tree, "x", "3");
        let d = leaf(&mut tree, "x", "4");
        let inner = tree.or(a, b).unwrap();
        let root = tree.or(inner, c).unwrap();
        let spare = tree.equality(1);
        let other = tree.or(spare, d).unwrap();

        // owned by another Or
        assert!(tree.set_left(other, a).is_err());
        // already the sibling
        assert!(tree.set_left(inner, b).is_err());
        // itself
        assert!(tree.set_right(inner, inner).is_err());
        // an ancestor
        assert!(tree.set_left(inner, root).is_err());

        assert_eq!(tree.leaves(root), vec![a, b, c]);
        assert_eq!(tree.depth(root), 3);

        // re-attaching a child to the slot it already holds is a no-op
        tree.set_right(root, c).unwrap();
        assert_eq!(tree.get(c).unwrap().parent(), Some(root));
    }

    #[test]
    fn test_parallel_fan_out_is_bounded() {
        let store = InFlightStore {
            inner: store(),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let mut tree = OperandTree::new();
        let a = leaf(&mut tree, "status", "active");
        let mut plans = vec![b"pro".to_vec(), b"free".to_vec()];
        plans.extend((2..16).map(|i| format!("p{}", i).into_bytes()));
        let root = tree.optimize_discriminator(a, b"plan", &plans).unwrap();

        let options = ExecutionOptions {
            parallel: true,
            max_threads: 2,
            ..ExecutionOptions::default()
        };
        tree.perform_query(root, &store, "users", &select(), &options)
            .unwrap();

        let keys: Vec<_> = tree.candidate_keys(root).unwrap().keys().collect();
        assert_eq!(keys, vec![&b"u1"[..], &b"u2"[..]]);
        assert_eq!(store.inner.indexed_calls(), 16);
        // two spawned threads plus the caller
        assert!(store.peak.load(Ordering::SeqCst) <= 3);
    }
}
