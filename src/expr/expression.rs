use std::fmt;

use crate::error::{Error, Result};
use crate::types::{Kwargs, Row, Value};

use super::eval::Evaluator;
use super::functions::FunctionRegistry;
use super::node::Node;

/// A predicate (or projection) over one row per parameter.
///
/// Built once and immutable afterwards. Values captured by the building
/// closure are bound early, as constants; values that must vary between
/// compilations go through [`Node::kwarg`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    params: Vec<String>,
    body: Node,
}

impl Expression {
    pub fn new(params: Vec<String>, body: Node) -> Result<Self> {
        let referenced = body.arity();
        if referenced > params.len() {
            return Err(Error::ArityMismatch {
                expected: referenced,
                found: params.len(),
            });
        }
        Ok(Self { params, body })
    }

    /// Build an expression from a closure over row placeholders:
    ///
    /// ```
    /// use sqlsieve::expr::Expression;
    /// let adults = Expression::lambda(["p"], |[p]| p.attr("age").ge(18));
    /// assert_eq!(adults.to_string(), "lambda p: (p.age >= 18)");
    /// ```
    pub fn lambda<const N: usize>(params: [&str; N], build: impl FnOnce([Node; N]) -> Node) -> Self {
        let placeholders: [Node; N] = std::array::from_fn(Node::Param);
        Self {
            params: params.iter().map(|p| p.to_string()).collect(),
            body: build(placeholders),
        }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn body(&self) -> &Node {
        &self.body
    }

    /// Unambiguous rendering, part of compile-cache keys.
    pub fn repr(&self) -> String {
        self.body.repr(&self.params)
    }

    pub fn and(&self, other: &Expression) -> Result<Expression> {
        self.combine(other, |a, b| a.and(b))
    }

    pub fn or(&self, other: &Expression) -> Result<Expression> {
        self.combine(other, |a, b| a.or(b))
    }

    fn combine(&self, other: &Expression, join: impl FnOnce(Node, Node) -> Node) -> Result<Expression> {
        if self.arity() != other.arity() {
            return Err(Error::ArityMismatch {
                expected: self.arity(),
                found: other.arity(),
            });
        }
        Ok(Expression {
            params: self.params.clone(),
            body: join(self.body.clone(), other.body.clone()),
        })
    }

    /// Evaluate in process against one row per parameter.
    pub fn evaluate(&self, rows: &[&Row], kwargs: &Kwargs, functions: &FunctionRegistry) -> Result<Value> {
        if rows.len() != self.arity() {
            return Err(Error::ArityMismatch {
                expected: self.arity(),
                found: rows.len(),
            });
        }
        Evaluator::new(rows, kwargs, functions).eval(&self.body)
    }

    /// Truthiness of [`Expression::evaluate`].
    pub fn matches(&self, rows: &[&Row], kwargs: &Kwargs, functions: &FunctionRegistry) -> Result<bool> {
        Ok(self.evaluate(rows, kwargs, functions)?.truthy())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lambda {}: {}", self.params.join(", "), self.repr())
    }
}
