//! Index clauses
//!
//! An [`IndexClause`] is a conjunction of `(column, operator, value)`
//! expressions plus a start key and a row count: the unit the store's
//! secondary-index lookup executes directly.

use std::fmt;

use crate::observability::{hex, Logger, Severity};

/// Comparison operators supported by secondary-index lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexOperator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl IndexOperator {
    /// Returns the CQL operator symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            IndexOperator::Eq => "=",
            IndexOperator::Gt => ">",
            IndexOperator::Gte => ">=",
            IndexOperator::Lt => "<",
            IndexOperator::Lte => "<=",
        }
    }

    /// The operator to use when the operands are swapped (`5 < x` => `x > 5`)
    pub fn mirrored(&self) -> Self {
        match self {
            IndexOperator::Eq => IndexOperator::Eq,
            IndexOperator::Gt => IndexOperator::Lt,
            IndexOperator::Gte => IndexOperator::Lte,
            IndexOperator::Lt => IndexOperator::Gt,
            IndexOperator::Lte => IndexOperator::Gte,
        }
    }

    /// Evaluate the operator against already-encoded bytes
    pub fn matches(&self, stored: &[u8], value: &[u8]) -> bool {
        match self {
            IndexOperator::Eq => stored == value,
            IndexOperator::Gt => stored > value,
            IndexOperator::Gte => stored >= value,
            IndexOperator::Lt => stored < value,
            IndexOperator::Lte => stored <= value,
        }
    }
}

impl fmt::Display for IndexOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One `(column, operator, value)` constraint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexExpression {
    pub column: Vec<u8>,
    pub op: IndexOperator,
    pub value: Vec<u8>,
}

impl IndexExpression {
    pub fn new(column: impl Into<Vec<u8>>, op: IndexOperator, value: impl Into<Vec<u8>>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(column, IndexOperator::Eq, value)
    }

    pub fn gt(column: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(column, IndexOperator::Gt, value)
    }

    pub fn gte(column: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(column, IndexOperator::Gte, value)
    }

    pub fn lt(column: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(column, IndexOperator::Lt, value)
    }

    pub fn lte(column: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::new(column, IndexOperator::Lte, value)
    }
}

impl fmt::Display for IndexExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            String::from_utf8_lossy(&self.column),
            self.op,
            render_value(&self.value)
        )
    }
}

/// Render a value as a quoted literal when it is printable ASCII,
/// otherwise as `hex('..')`.
pub fn render_value(value: &[u8]) -> String {
    if value.iter().all(|b| (0x20..=0x7E).contains(b)) {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('\'');
        for &b in value {
            match b {
                b'\\' => out.push_str("\\\\"),
                b'\'' => out.push_str("\\'"),
                b => out.push(b as char),
            }
        }
        out.push('\'');
        out
    } else {
        format!("hex('{}')", hex(value))
    }
}

/// Conjunction of index expressions executed as one store lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexClause {
    expressions: Vec<IndexExpression>,
    start_key: Vec<u8>,
    count: u32,
}

impl IndexClause {
    /// Empty clause returning at most `count` rows, starting at the first key
    pub fn new(count: u32) -> Self {
        Self {
            expressions: Vec::new(),
            start_key: Vec::new(),
            count,
        }
    }

    pub fn with_start_key(mut self, start_key: impl Into<Vec<u8>>) -> Self {
        self.start_key = start_key.into();
        self
    }

    pub fn with_expression(mut self, expression: IndexExpression) -> Self {
        self.push(expression);
        self
    }

    /// Append one expression. Only used while a tree is being built.
    pub fn push(&mut self, expression: IndexExpression) {
        if Logger::enabled(Severity::Trace) {
            let column = hex(&expression.column);
            let value = hex(&expression.value);
            Logger::trace(
                "CLAUSE_EXPRESSION_ADDED",
                &[
                    ("column", column.as_str()),
                    ("op", expression.op.symbol()),
                    ("value", value.as_str()),
                ],
            );
        }
        self.expressions.push(expression);
    }

    pub fn extend_from_slice(&mut self, expressions: &[IndexExpression]) {
        for expression in expressions {
            self.push(expression.clone());
        }
    }

    pub fn expressions(&self) -> &[IndexExpression] {
        &self.expressions
    }

    pub fn start_key(&self) -> &[u8] {
        &self.start_key
    }

    /// Maximum number of rows the lookup returns
    pub fn count(&self) -> u32 {
        self.count
    }

    /// True for the all-scan placeholder
    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }

    /// True if some expression is an equality, which secondary-index lookups need
    pub fn has_equality(&self) -> bool {
        self.expressions.iter().any(|e| e.op == IndexOperator::Eq)
    }

    /// Whether a row satisfies every expression; `column_value` looks up a
    /// stored column, a missing column never matches.
    pub fn matches<'a, F>(&self, mut column_value: F) -> bool
    where
        F: FnMut(&[u8]) -> Option<&'a [u8]>,
    {
        self.expressions.iter().all(|e| match column_value(&e.column) {
            Some(stored) => e.op.matches(stored, &e.value),
            None => false,
        })
    }
}

impl fmt::Display for IndexClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, expression) in self.expressions.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{}", expression)?;
        }
        Ok(())
    }
}
