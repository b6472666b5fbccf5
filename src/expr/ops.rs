/// Operators and the static operand tables the compiler consults before
/// dispatching to an adapter.
use std::fmt;

use crate::types::HostType;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Host spelling, used in expression reprs.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// The operator that gives the same answer with operands swapped.
    pub fn mirror(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    /// True division: `int / int` yields a float.
    Div,
    Mod,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Whether `lhs op rhs` is a meaningful comparison. NULL operands are
/// handled before this table is consulted.
pub fn comparable(lhs: HostType, op: CompareOp, rhs: HostType) -> bool {
    use HostType::*;
    match (lhs, rhs) {
        (a, b) if a.is_numeric() && b.is_numeric() => true,
        (Bool, Bool) | (Str, Str) | (Bytes, Bytes) => true,
        (Date, Date) | (Time, Time) | (DateTime, DateTime) | (Interval, Interval) => true,
        (Json, Json) | (List, List) => op.is_equality(),
        _ => false,
    }
}

/// Result host type of `lhs op rhs`, or `None` when the operation is
/// undefined for those types.
pub fn binary_result(lhs: HostType, op: BinaryOp, rhs: HostType) -> Option<HostType> {
    use BinaryOp::*;
    use HostType::*;
    match (lhs, op, rhs) {
        (Int, Div, Int) => Some(Float),
        (Int, _, Int) => Some(Int),
        (Int | Float, _, Int | Float) => Some(Float),
        (Decimal, _, Int | Decimal) | (Int, _, Decimal) => Some(Decimal),

        (Str, Add, Str) => Some(Str),
        (Bytes, Add, Bytes) => Some(Bytes),

        (Date, Add | Sub, Interval) => Some(Date),
        (Interval, Add, Date) => Some(Date),
        (Date, Sub, Date) => Some(Interval),
        (DateTime, Add | Sub, Interval) => Some(DateTime),
        (Interval, Add, DateTime) => Some(DateTime),
        (DateTime, Sub, DateTime) => Some(Interval),
        (Interval, Add | Sub, Interval) => Some(Interval),
        (Interval, Div, Interval) => Some(Float),
        (Interval, Mul | Div, Int | Float) => Some(Interval),
        (Int | Float, Mul, Interval) => Some(Interval),
        _ => None,
    }
}
