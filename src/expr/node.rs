use std::ops;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

use crate::types::Value;

use super::ops::{BinaryOp, CompareOp};

/// Name of the function call that marks a descending ORDER BY term.
pub const DESC: &str = "desc";

/// A predicate or projection expression tree.
///
/// Trees are built with the combinators below, usually inside
/// [`super::Expression::lambda`], where the row parameters are handed to
/// the closure as [`Node::Param`] placeholders. Anything else the closure
/// captures becomes a [`Node::Const`] at build time.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// The n-th row parameter.
    Param(usize),
    Attr(Box<Node>, String),
    Const(Value),
    /// Late-bound keyword argument, supplied at compile time.
    Kwarg(String),
    Subscript(Box<Node>, Box<Node>),
    Tuple(Vec<Node>),
    /// Free function call, dispatched by name.
    Call { name: String, args: Vec<Node> },
    /// Method-style call, `target.name(args)`.
    Method {
        target: Box<Node>,
        name: String,
        args: Vec<Node>,
    },
    Compare(Box<Node>, CompareOp, Box<Node>),
    /// `item in collection` / `item not in collection`.
    In {
        item: Box<Node>,
        collection: Box<Node>,
        negated: bool,
    },
    Binary(Box<Node>, BinaryOp, Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Neg(Box<Node>),
    /// Output name for a projected expression.
    Alias(Box<Node>, String),
}

#[allow(clippy::should_implement_trait)]
impl Node {
    pub fn constant(value: impl Into<Value>) -> Self {
        Node::Const(value.into())
    }

    pub fn null() -> Self {
        Node::Const(Value::Null)
    }

    pub fn kwarg(name: impl Into<String>) -> Self {
        Node::Kwarg(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Node>) -> Self {
        Node::Call {
            name: name.into(),
            args,
        }
    }

    pub fn tuple(items: Vec<Node>) -> Self {
        Node::Tuple(items)
    }

    /// `self.name`. On a row parameter this is a column reference.
    pub fn attr(&self, name: impl Into<String>) -> Node {
        Node::Attr(Box::new(self.clone()), name.into())
    }

    pub fn method(self, name: impl Into<String>, args: Vec<Node>) -> Node {
        Node::Method {
            target: Box::new(self),
            name: name.into(),
            args,
        }
    }

    pub fn index(self, key: impl Into<Node>) -> Node {
        Node::Subscript(Box::new(self), Box::new(key.into()))
    }

    pub fn alias(self, name: impl Into<String>) -> Node {
        Node::Alias(Box::new(self), name.into())
    }

    /// Descending sort marker, for ORDER BY expressions.
    pub fn desc(self) -> Node {
        Node::call(DESC, vec![self])
    }

    fn compare(self, op: CompareOp, other: impl Into<Node>) -> Node {
        Node::Compare(Box::new(self), op, Box::new(other.into()))
    }

    pub fn eq(self, other: impl Into<Node>) -> Node {
        self.compare(CompareOp::Eq, other)
    }

    pub fn ne(self, other: impl Into<Node>) -> Node {
        self.compare(CompareOp::Ne, other)
    }

    pub fn lt(self, other: impl Into<Node>) -> Node {
        self.compare(CompareOp::Lt, other)
    }

    pub fn le(self, other: impl Into<Node>) -> Node {
        self.compare(CompareOp::Le, other)
    }

    pub fn gt(self, other: impl Into<Node>) -> Node {
        self.compare(CompareOp::Gt, other)
    }

    pub fn ge(self, other: impl Into<Node>) -> Node {
        self.compare(CompareOp::Ge, other)
    }

    pub fn is_in(self, collection: impl Into<Node>) -> Node {
        Node::In {
            item: Box::new(self),
            collection: Box::new(collection.into()),
            negated: false,
        }
    }

    pub fn not_in(self, collection: impl Into<Node>) -> Node {
        Node::In {
            item: Box::new(self),
            collection: Box::new(collection.into()),
            negated: true,
        }
    }

    /// `item in self`.
    pub fn contains(self, item: impl Into<Node>) -> Node {
        item.into().is_in(self)
    }

    pub fn startswith(self, prefix: impl Into<Node>) -> Node {
        self.method("startswith", vec![prefix.into()])
    }

    pub fn endswith(self, suffix: impl Into<Node>) -> Node {
        self.method("endswith", vec![suffix.into()])
    }

    pub fn lower(self) -> Node {
        self.method("lower", Vec::new())
    }

    pub fn upper(self) -> Node {
        self.method("upper", Vec::new())
    }

    /// Logical AND; nested conjunctions are flattened.
    pub fn and(self, other: impl Into<Node>) -> Node {
        match (self, other.into()) {
            (Node::And(mut a), Node::And(b)) => {
                a.extend(b);
                Node::And(a)
            }
            (Node::And(mut a), b) => {
                a.push(b);
                Node::And(a)
            }
            (a, b) => Node::And(vec![a, b]),
        }
    }

    /// Logical OR; nested disjunctions are flattened.
    pub fn or(self, other: impl Into<Node>) -> Node {
        match (self, other.into()) {
            (Node::Or(mut a), Node::Or(b)) => {
                a.extend(b);
                Node::Or(a)
            }
            (Node::Or(mut a), b) => {
                a.push(b);
                Node::Or(a)
            }
            (a, b) => Node::Or(vec![a, b]),
        }
    }

    /// Highest parameter index referenced, plus one.
    pub fn arity(&self) -> usize {
        let mut max = 0;
        self.visit(&mut |node| {
            if let Node::Param(i) = node {
                max = max.max(i + 1);
            }
        });
        max
    }

    /// True if any late-bound keyword argument occurs in the tree.
    pub fn has_kwargs(&self) -> bool {
        let mut found = false;
        self.visit(&mut |node| found |= matches!(node, Node::Kwarg(_)));
        found
    }

    fn visit(&self, f: &mut dyn FnMut(&Node)) {
        f(self);
        match self {
            Node::Param(_) | Node::Const(_) | Node::Kwarg(_) => {}
            Node::Attr(inner, _) | Node::Not(inner) | Node::Neg(inner) | Node::Alias(inner, _) => {
                inner.visit(f)
            }
            Node::Subscript(a, b) | Node::Compare(a, _, b) | Node::Binary(a, _, b) => {
                a.visit(f);
                b.visit(f);
            }
            Node::In {
                item, collection, ..
            } => {
                item.visit(f);
                collection.visit(f);
            }
            Node::Method { target, args, .. } => {
                target.visit(f);
                args.iter().for_each(|a| a.visit(f));
            }
            Node::Tuple(items) | Node::Call { args: items, .. } | Node::And(items) | Node::Or(items) => {
                items.iter().for_each(|a| a.visit(f))
            }
        }
    }

    /// Source-like rendering with the given parameter names. Used for
    /// display and as the expression part of compile-cache keys, so it
    /// must be unambiguous.
    pub fn repr(&self, params: &[String]) -> String {
        let list = |items: &[Node]| {
            items
                .iter()
                .map(|n| n.repr(params))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            Node::Param(i) => params
                .get(*i)
                .cloned()
                .unwrap_or_else(|| format!("_{}", i)),
            Node::Attr(target, name) => format!("{}.{}", target.repr(params), name),
            Node::Const(v) => v.repr(),
            Node::Kwarg(name) => format!("kwargs[{:?}]", name),
            Node::Subscript(target, key) => {
                format!("{}[{}]", target.repr(params), key.repr(params))
            }
            Node::Tuple(items) => format!("({},)", list(items)),
            Node::Call { name, args } => format!("{}({})", name, list(args)),
            Node::Method { target, name, args } => {
                format!("{}.{}({})", target.repr(params), name, list(args))
            }
            Node::Compare(l, op, r) => {
                format!("({} {} {})", l.repr(params), op.symbol(), r.repr(params))
            }
            Node::In {
                item,
                collection,
                negated,
            } => format!(
                "({} {} {})",
                item.repr(params),
                if *negated { "not in" } else { "in" },
                collection.repr(params)
            ),
            Node::Binary(l, op, r) => {
                format!("({} {} {})", l.repr(params), op.symbol(), r.repr(params))
            }
            Node::And(items) => {
                let parts: Vec<String> = items.iter().map(|n| n.repr(params)).collect();
                format!("({})", parts.join(" and "))
            }
            Node::Or(items) => {
                let parts: Vec<String> = items.iter().map(|n| n.repr(params)).collect();
                format!("({})", parts.join(" or "))
            }
            Node::Not(inner) => format!("(not {})", inner.repr(params)),
            Node::Neg(inner) => format!("(-{})", inner.repr(params)),
            Node::Alias(inner, name) => format!("{} as {}", inner.repr(params), name),
        }
    }
}

macro_rules! node_from_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Node {
                fn from(v: $t) -> Self {
                    Node::Const(Value::from(v))
                }
            }
        )*
    };
}

node_from_value!(
    bool,
    i32,
    i64,
    u32,
    f64,
    Decimal,
    &str,
    String,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    Duration,
    serde_json::Value,
);

impl From<Value> for Node {
    fn from(v: Value) -> Self {
        Node::Const(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Node {
    fn from(v: Vec<T>) -> Self {
        Node::Const(Value::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Node {
    fn from(v: Option<T>) -> Self {
        Node::Const(Value::from(v))
    }
}

impl From<&Node> for Node {
    fn from(n: &Node) -> Self {
        n.clone()
    }
}

macro_rules! binary_operator {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<Node>> ops::$trait<R> for Node {
            type Output = Node;

            fn $method(self, rhs: R) -> Node {
                Node::Binary(Box::new(self), $op, Box::new(rhs.into()))
            }
        }
    };
}

binary_operator!(Add, add, BinaryOp::Add);
binary_operator!(Sub, sub, BinaryOp::Sub);
binary_operator!(Mul, mul, BinaryOp::Mul);
binary_operator!(Div, div, BinaryOp::Div);
binary_operator!(Rem, rem, BinaryOp::Mod);

impl<R: Into<Node>> ops::BitAnd<R> for Node {
    type Output = Node;

    fn bitand(self, rhs: R) -> Node {
        self.and(rhs)
    }
}

impl<R: Into<Node>> ops::BitOr<R> for Node {
    type Output = Node;

    fn bitor(self, rhs: R) -> Node {
        self.or(rhs)
    }
}

impl ops::Not for Node {
    type Output = Node;

    fn not(self) -> Node {
        Node::Not(Box::new(self))
    }
}

impl ops::Neg for Node {
    type Output = Node;

    fn neg(self) -> Node {
        Node::Neg(Box::new(self))
    }
}
