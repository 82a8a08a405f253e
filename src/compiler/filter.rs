//! Filter expressions and their evaluation into operand trees
//!
//! [`FilterExpr`] is the parsed form of a query filter. A [`FilterEvaluator`]
//! turns it into an [`OperandTree`] of index lookups, or reports that the
//! shape has no index-clause form. The default [`IndexedFilterEvaluator`]
//! accepts:
//!
//! - comparisons of an indexed field with a literal or bound parameter
//! - conjunctions where at most one side is a disjunction
//! - disjunctions of accepted filters

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use super::errors::{EvalError, EvalResult};
use super::metadata::ClassMetadata;
use crate::codec::{
    AsciiCodec, BoolCodec, BytesCodec, CodecError, CodecResult, ComparatorType, ElementCodec,
    I32Codec, I64Codec, StringCodec, UuidCodec,
};
use crate::query::{IndexExpression, IndexOperator, NodeId, OperandTree};

/// Comparison operators of the filter language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Gte => ">=",
            FilterOp::Lt => "<",
            FilterOp::Lte => "<=",
        }
    }

    /// The index operator, if secondary indexes support this comparison
    pub fn index_operator(&self) -> Option<IndexOperator> {
        match self {
            FilterOp::Eq => Some(IndexOperator::Eq),
            FilterOp::Gt => Some(IndexOperator::Gt),
            FilterOp::Gte => Some(IndexOperator::Gte),
            FilterOp::Lt => Some(IndexOperator::Lt),
            FilterOp::Lte => Some(IndexOperator::Lte),
            FilterOp::Ne => None,
        }
    }
}

/// Literal values appearing in filters or bound as parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    String(String),
    Bytes(Vec<u8>),
}

impl Literal {
    /// Encode for a column with the given comparator
    pub fn encode(&self, comparator: ComparatorType) -> CodecResult<Vec<u8>> {
        match (self, comparator) {
            (Literal::Null, _) => Err(CodecError::invalid_element("null has no index encoding")),

            (Literal::Bytes(bytes), ComparatorType::Uuid) if bytes.len() != 16 => Err(
                CodecError::invalid_element(format!("uuid needs 16 bytes, got {}", bytes.len())),
            ),
            (Literal::Bytes(bytes), _) => BytesCodec.encode_to_vec(&Some(bytes.clone())),

            (Literal::String(s), ComparatorType::Uuid) => {
                let id = Uuid::parse_str(s)
                    .map_err(|e| CodecError::invalid_element(format!("invalid uuid: {}", e)))?;
                UuidCodec.encode_to_vec(&Some(id))
            }
            (Literal::String(s), ComparatorType::Ascii) => {
                AsciiCodec.encode_to_vec(&Some(s.clone()))
            }
            (Literal::String(s), ComparatorType::Long | ComparatorType::Integer) => {
                Err(CodecError::invalid_element(format!(
                    "string '{}' compared with a {} column",
                    s, comparator
                )))
            }
            (Literal::String(s), _) => StringCodec.encode_to_vec(&Some(s.clone())),

            (Literal::Int(v), ComparatorType::Long) => I64Codec.encode_to_vec(&Some(i64::from(*v))),
            (Literal::Long(v), ComparatorType::Long) => I64Codec.encode_to_vec(&Some(*v)),
            (Literal::Int(v), ComparatorType::Integer | ComparatorType::Bytes) => {
                I32Codec.encode_to_vec(&Some(*v))
            }
            (Literal::Long(v), ComparatorType::Integer) => {
                let narrowed = i32::try_from(*v).map_err(|_| {
                    CodecError::invalid_element(format!("{} does not fit an integer column", v))
                })?;
                I32Codec.encode_to_vec(&Some(narrowed))
            }
            (Literal::Long(v), ComparatorType::Bytes) => I64Codec.encode_to_vec(&Some(*v)),
            (Literal::Bool(b), ComparatorType::Bytes) => BoolCodec.encode_to_vec(&Some(*b)),

            (other, comparator) => Err(CodecError::invalid_element(format!(
                "{} cannot be stored in a {} column",
                other, comparator
            ))),
        }
    }

    /// Convert a JSON scalar; arrays, objects and fractional numbers have no
    /// literal form
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Literal::Null),
            serde_json::Value::Bool(b) => Some(Literal::Bool(*b)),
            serde_json::Value::Number(n) => {
                let v = n.as_i64()?;
                Some(match i32::try_from(v) {
                    Ok(small) => Literal::Int(small),
                    Err(_) => Literal::Long(v),
                })
            }
            serde_json::Value::String(s) => Some(Literal::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => f.write_str("null"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Long(v) => write!(f, "{}L", v),
            Literal::String(s) => write!(f, "\"{}\"", s),
            Literal::Bytes(b) => write!(f, "0x{}", crate::observability::hex(b)),
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Long(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<Vec<u8>> for Literal {
    fn from(value: Vec<u8>) -> Self {
        Literal::Bytes(value)
    }
}

/// Parsed filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// A persistent field of the candidate class
    Field(String),
    /// A named parameter, bound at execution
    Parameter(String),
    Literal(Literal),
    Compare {
        left: Box<FilterExpr>,
        op: FilterOp,
        right: Box<FilterExpr>,
    },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    /// Method invocation such as `name.startsWith(p)`
    Method {
        target: Box<FilterExpr>,
        name: String,
        args: Vec<FilterExpr>,
    },
}

impl FilterExpr {
    pub fn field(name: impl Into<String>) -> Self {
        FilterExpr::Field(name.into())
    }

    pub fn param(name: impl Into<String>) -> Self {
        FilterExpr::Parameter(name.into())
    }

    pub fn literal(value: impl Into<Literal>) -> Self {
        FilterExpr::Literal(value.into())
    }

    pub fn compare(left: FilterExpr, op: FilterOp, right: FilterExpr) -> Self {
        FilterExpr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(Self::field(field), FilterOp::Eq, Self::literal(value))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(Self::field(field), FilterOp::Ne, Self::literal(value))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(Self::field(field), FilterOp::Gt, Self::literal(value))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(Self::field(field), FilterOp::Gte, Self::literal(value))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(Self::field(field), FilterOp::Lt, Self::literal(value))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::compare(Self::field(field), FilterOp::Lte, Self::literal(value))
    }

    pub fn and(self, other: FilterExpr) -> Self {
        FilterExpr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: FilterExpr) -> Self {
        FilterExpr::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        FilterExpr::Not(Box::new(self))
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Field(name) => f.write_str(name),
            FilterExpr::Parameter(name) => write!(f, ":{}", name),
            FilterExpr::Literal(value) => write!(f, "{}", value),
            FilterExpr::Compare { left, op, right } => {
                write!(f, "{} {} {}", left, op.symbol(), right)
            }
            FilterExpr::And(a, b) => write!(f, "({} && {})", a, b),
            FilterExpr::Or(a, b) => write!(f, "({} || {})", a, b),
            FilterExpr::Not(inner) => write!(f, "!({})", inner),
            FilterExpr::Method { target, name, args } => {
                write!(f, "{}.{}(", target, name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// State shared by one evaluation
pub struct EvalContext<'a> {
    pub tree: &'a mut OperandTree,
    pub metadata: &'a dyn ClassMetadata,
    pub parameters: &'a HashMap<String, Literal>,
    /// Row count given to every leaf
    pub row_limit: u32,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        tree: &'a mut OperandTree,
        metadata: &'a dyn ClassMetadata,
        parameters: &'a HashMap<String, Literal>,
        row_limit: u32,
    ) -> Self {
        Self {
            tree,
            metadata,
            parameters,
            row_limit,
        }
    }

    fn resolve(&self, operand: &FilterExpr) -> EvalResult<Literal> {
        match operand {
            FilterExpr::Literal(value) => Ok(value.clone()),
            FilterExpr::Parameter(name) => self
                .parameters
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::MissingParameter(name.clone())),
            other => Err(EvalError::unsupported(format!(
                "'{}' is not a literal or parameter",
                other
            ))),
        }
    }
}

/// Builds operand trees from filters
pub trait FilterEvaluator: Send + Sync {
    /// Add the tree for `expr` to `ctx.tree` and return its root
    fn evaluate(&self, expr: &FilterExpr, ctx: &mut EvalContext<'_>) -> EvalResult<NodeId>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedFilterEvaluator;

impl IndexedFilterEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn comparison(
        &self,
        left: &FilterExpr,
        op: FilterOp,
        right: &FilterExpr,
        ctx: &mut EvalContext<'_>,
    ) -> EvalResult<NodeId> {
        let (field, value, op) = match (left, right) {
            (FilterExpr::Field(field), value) => (field, value, op),
            // literal on the left: `5 < age` is `age > 5`
            (value, FilterExpr::Field(field)) => (field, value, mirror(op)),
            _ => {
                return Err(EvalError::unsupported(format!(
                    "comparison without a field: {} {} {}",
                    left,
                    op.symbol(),
                    right
                )))
            }
        };

        let index_op = op
            .index_operator()
            .ok_or_else(|| EvalError::unsupported(format!("operator {} on {}", op.symbol(), field)))?;

        if !ctx.metadata.is_indexed(field) {
            return Err(EvalError::unsupported(format!("field {} is not indexed", field)));
        }
        let column = ctx
            .metadata
            .column_for_field(field)
            .ok_or_else(|| EvalError::unsupported(format!("field {} has no column", field)))?;

        let literal = ctx.resolve(value)?;
        if literal.is_null() {
            return Err(EvalError::unsupported(format!(
                "null comparison on {}",
                field
            )));
        }

        let comparator = ctx.metadata.comparator_for_column(&column);
        let bytes = literal.encode(comparator).map_err(|source| EvalError::Encoding {
            field: field.clone(),
            source,
        })?;

        let leaf = ctx.tree.equality(ctx.row_limit);
        ctx.tree
            .add_expression(leaf, IndexExpression::new(column, index_op, bytes))?;
        Ok(leaf)
    }

    fn conjunction(&self, left: NodeId, right: NodeId, ctx: &mut EvalContext<'_>) -> EvalResult<NodeId> {
        let left_clause = ctx.tree.clause(left).map(|c| c.expressions().to_vec());
        let right_clause = ctx.tree.clause(right).map(|c| c.expressions().to_vec());

        // the disjunction side keeps its shape; the leaf's expressions are
        // copied into each of its leaves
        let (target, expressions) = match (left_clause, right_clause) {
            (Some(_), Some(expressions)) => (left, expressions),
            (Some(expressions), None) => (right, expressions),
            (None, Some(expressions)) => (left, expressions),
            (None, None) => {
                return Err(EvalError::unsupported(
                    "conjunction of two disjunctions",
                ))
            }
        };

        for leaf in ctx.tree.leaves(target) {
            for expression in &expressions {
                ctx.tree.add_expression(leaf, expression.clone())?;
            }
        }
        Ok(target)
    }
}

fn mirror(op: FilterOp) -> FilterOp {
    match op {
        FilterOp::Gt => FilterOp::Lt,
        FilterOp::Gte => FilterOp::Lte,
        FilterOp::Lt => FilterOp::Gt,
        FilterOp::Lte => FilterOp::Gte,
        other => other,
    }
}

impl FilterEvaluator for IndexedFilterEvaluator {
    fn evaluate(&self, expr: &FilterExpr, ctx: &mut EvalContext<'_>) -> EvalResult<NodeId> {
        match expr {
            FilterExpr::Compare { left, op, right } => self.comparison(left, *op, right, ctx),
            FilterExpr::And(a, b) => {
                let left = self.evaluate(a, ctx)?;
                let right = self.evaluate(b, ctx)?;
                self.conjunction(left, right, ctx)
            }
            FilterExpr::Or(a, b) => {
                let left = self.evaluate(a, ctx)?;
                let right = self.evaluate(b, ctx)?;
                Ok(ctx.tree.or(left, right)?)
            }
            FilterExpr::Not(_) => Err(EvalError::unsupported("negation")),
            FilterExpr::Method { name, .. } => {
                Err(EvalError::unsupported(format!("method {}", name)))
            }
            other => Err(EvalError::unsupported(format!(
                "'{}' is not a boolean expression",
                other
            ))),
        }
    }
}
