//! Explain output for compiled operand trees
//!
//! Produces deterministic, human-readable descriptions of how a query will
//! reach the store.

use std::fmt;

use serde::Serialize;

use crate::query::{NodeId, OperandTree};

/// How a compiled tree reads the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanKind {
    /// One secondary-index lookup per leaf
    IndexClause,
    /// Paginated read of every row
    FullScan,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::IndexClause => "INDEX_CLAUSE",
            ScanKind::FullScan => "FULL_SCAN",
        }
    }
}

/// Explain plan for one operand tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainPlan {
    pub scan: ScanKind,
    /// Index lookups issued; zero for a full scan
    pub leaf_count: usize,
    pub depth: usize,
    /// Largest row count of any leaf
    pub row_limit: u32,
    /// Rendered clause of every leaf, left to right
    pub clauses: Vec<String>,
    /// Full rendering of the tree
    pub rendered: String,
}

impl ExplainPlan {
    /// Describe the tree rooted at `tree.root()`; an empty tree explains as an
    /// unlimited full scan
    pub fn from_tree(tree: &OperandTree) -> Self {
        match tree.root() {
            Some(root) => Self::from_node(tree, root),
            None => Self {
                scan: ScanKind::FullScan,
                leaf_count: 0,
                depth: 0,
                row_limit: 0,
                clauses: Vec::new(),
                rendered: String::new(),
            },
        }
    }

    pub fn from_node(tree: &OperandTree, root: NodeId) -> Self {
        let leaves = tree.leaves(root);
        let row_limit = leaves
            .iter()
            .filter_map(|leaf| tree.clause(*leaf))
            .map(|clause| clause.count())
            .max()
            .unwrap_or(0);

        if tree.is_indexed(root) {
            Self {
                scan: ScanKind::IndexClause,
                leaf_count: leaves.len(),
                depth: tree.depth(root),
                row_limit,
                clauses: leaves.iter().map(|leaf| tree.render(*leaf)).collect(),
                rendered: tree.render(root),
            }
        } else {
            Self {
                scan: ScanKind::FullScan,
                leaf_count: 0,
                depth: tree.depth(root),
                row_limit,
                clauses: Vec::new(),
                rendered: tree.render(root),
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;
        writeln!(f, "Scan Type: {}", self.scan.as_str())?;

        if self.scan == ScanKind::IndexClause {
            writeln!(f, "Lookups: {}", self.leaf_count)?;
            writeln!(f, "Depth: {}", self.depth)?;
            writeln!(f, "Clauses:")?;
            for clause in &self.clauses {
                writeln!(f, "  - {}", clause)?;
            }
        }
        writeln!(f, "Row Limit: {}", self.row_limit)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::IndexExpression;

    fn status_tree() -> OperandTree {
        let mut tree = OperandTree::new();
        let leaf = tree.equality(200);
        tree.add_expression(leaf, IndexExpression::eq("status", "active"))
            .unwrap();
        let root = tree
            .optimize_discriminator(leaf, b"type", &[b"A".to_vec(), b"B".to_vec()])
            .unwrap();
        tree.set_root(root);
        tree
    }

    #[test]
    fn test_explain_index_plan() {
        let explain = ExplainPlan::from_tree(&status_tree());

        assert_eq!(explain.scan, ScanKind::IndexClause);
        assert_eq!(explain.leaf_count, 2);
        assert_eq!(explain.depth, 2);
        assert_eq!(explain.row_limit, 200);
        assert_eq!(
            explain.clauses,
            vec![
                "status = 'active' AND type = 'A'".to_string(),
                "status = 'active' AND type = 'B'".to_string(),
            ]
        );

        let output = format!("{}", explain);
        assert!(output.contains("INDEX_CLAUSE"));
        assert!(output.contains("type = 'B'"));
    }

    #[test]
    fn test_explain_full_scan() {
        let mut tree = OperandTree::new();
        let scan = tree.all_scan(1000);
        tree.set_root(scan);

        let explain = ExplainPlan::from_tree(&tree);
        assert_eq!(explain.scan, ScanKind::FullScan);
        assert_eq!(explain.leaf_count, 0);
        assert_eq!(explain.row_limit, 1000);
        assert!(format!("{}", explain).contains("FULL_SCAN"));
        assert_eq!(explain.to_json()["scan"], "FULL_SCAN");
    }

    #[test]
    fn test_explain_deterministic() {
        let tree = status_tree();
        let first = format!("{}", ExplainPlan::from_tree(&tree));
        let second = format!("{}", ExplainPlan::from_tree(&tree));
        assert_eq!(first, second);
    }
}
