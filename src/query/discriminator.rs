//! Discriminator expansion
//!
//! With single-table inheritance every row carries a discriminator column
//! naming its concrete class. A query for a class must also restrict that
//! column to the class and its subclasses, so each `Equality` leaf `E` is
//! rewritten into `E AND disc IN (v1..vN)`. Secondary-index lookups cannot
//! express `IN`, so the rewrite is a balanced `Or` over N copies of `E`,
//! each with one extra `disc = vi` expression.

use std::collections::VecDeque;

use super::clause::{IndexClause, IndexExpression};
use super::errors::{QueryError, QueryResult};
use super::operand::{NodeId, OperandKind, OperandTree};
use crate::observability::{hex, Logger, Severity};

impl OperandTree {
    /// Restrict the subtree at `id` to rows whose `column` holds one of `values`.
    ///
    /// Returns the root of the rewritten subtree, which differs from `id` when
    /// a leaf is expanded into an `Or`. `Or` nodes are rewritten in place and
    /// re-linked to their new children.
    pub fn optimize_discriminator(
        &mut self,
        id: NodeId,
        column: &[u8],
        values: &[Vec<u8>],
    ) -> QueryResult<NodeId> {
        let kind = self
            .get(id)
            .map(|node| node.kind().clone())
            .ok_or_else(|| QueryError::invalid_tree_operation(format!("unknown node {}", id)))?;

        match kind {
            OperandKind::Equality(clause) => self.expand_leaf(id, &clause, column, values),
            OperandKind::Or { left, right, .. } => {
                let new_left = self.optimize_discriminator(left, column, values)?;
                if new_left != left {
                    self.set_left(id, new_left)?;
                }
                let new_right = self.optimize_discriminator(right, column, values)?;
                if new_right != right {
                    self.set_right(id, new_right)?;
                }
                Ok(id)
            }
        }
    }

    fn expand_leaf(
        &mut self,
        id: NodeId,
        clause: &IndexClause,
        column: &[u8],
        values: &[Vec<u8>],
    ) -> QueryResult<NodeId> {
        match values {
            [] => Err(QueryError::invalid_tree_operation(format!(
                "no discriminator values for column {}",
                String::from_utf8_lossy(column)
            ))),
            [value] => {
                self.add_expression(id, IndexExpression::eq(column, value.clone()))?;
                Ok(id)
            }
            _ => {
                let mut pending: VecDeque<NodeId> = VecDeque::with_capacity(values.len());
                for value in values {
                    let mut expanded =
                        IndexClause::new(clause.count()).with_start_key(clause.start_key());
                    expanded.extend_from_slice(clause.expressions());
                    expanded.push(IndexExpression::eq(column, value.clone()));
                    pending.push_back(self.equality_with(expanded));
                }

                // pair from the front and queue each Or at the back; an odd
                // node left at the end of a level pairs with the first Or of
                // the next one
                while pending.len() > 1 {
                    let (Some(left), Some(right)) = (pending.pop_front(), pending.pop_front())
                    else {
                        break;
                    };
                    let or = self.or(left, right)?;
                    pending.push_back(or);
                }

                let root = pending.pop_front().ok_or_else(|| {
                    QueryError::invalid_tree_operation("discriminator expansion produced no root")
                })?;

                if Logger::enabled(Severity::Trace) {
                    let column = hex(column);
                    let leaves = values.len().to_string();
                    Logger::trace(
                        "DISCRIMINATOR_EXPANDED",
                        &[
                            ("column", column.as_str()),
                            ("leaves", leaves.as_str()),
                            ("replaced", clause.to_string().as_str()),
                        ],
                    );
                }

                Ok(root)
            }
        }
    }
}
