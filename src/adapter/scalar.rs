use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::dialect::Dialect;
use crate::error::{CannotRepresent, Error, Result};
use crate::expr::{BinaryOp, CompareOp, SqlExpression};
use crate::types::{DatabaseType, HostType, TypeFamily, Value, WireValue};

use super::{operand_sql, pull_error, push_error, Adapter, OpResult};

/// Placeholder for host types with no storage (`NULL`, lists). Encodes
/// only `NULL`.
#[derive(Debug)]
pub struct OpaqueAdapter(pub HostType);

impl Adapter for OpaqueAdapter {
    fn host_type(&self) -> HostType {
        self.0
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, _dialect: &dyn Dialect) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            other => Err(push_error(other, dbtype)),
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        match wire {
            WireValue::Null => Ok(Value::Null),
            other => Err(pull_error(other, dbtype, self.0)),
        }
    }

    fn compare_op(
        &self,
        _lhs: &SqlExpression,
        _op: CompareOp,
        _rhs: &SqlExpression,
        _dialect: &dyn Dialect,
    ) -> OpResult {
        Err(CannotRepresent)
    }
}

#[derive(Debug)]
pub struct BoolAdapter;

impl Adapter for BoolAdapter {
    fn host_type(&self) -> HostType {
        HostType::Bool
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, dialect: &dyn Dialect) -> Result<String> {
        let b = match value {
            Value::Null => return Ok("NULL".to_string()),
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            other => return Err(push_error(other, dbtype)),
        };
        if dbtype.family == TypeFamily::Integer {
            Ok((if b { "1" } else { "0" }).to_string())
        } else {
            Ok(dialect.bool_literal(b))
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Bool(b) => Ok(Value::Bool(*b)),
            WireValue::Int(i) => Ok(Value::Bool(*i != 0)),
            WireValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "y" | "yes" | "on" => Ok(Value::Bool(true)),
                "f" | "false" | "0" | "n" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(pull_error(wire, dbtype, HostType::Bool)),
            },
            other => Err(pull_error(other, dbtype, HostType::Bool)),
        }
    }
}

#[derive(Debug)]
pub struct IntAdapter;

impl Adapter for IntAdapter {
    fn host_type(&self) -> HostType {
        HostType::Int
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, _dialect: &dyn Dialect) -> Result<String> {
        let i = match value {
            Value::Null => return Ok("NULL".to_string()),
            Value::Int(i) => *i,
            Value::Bool(b) => i64::from(*b),
            Value::Decimal(d) if d.fract().is_zero() => {
                d.to_i64().ok_or_else(|| push_error(value, dbtype))?
            }
            other => return Err(push_error(other, dbtype)),
        };
        if let Some(range) = dbtype.range {
            if !range.contains(i128::from(i)) {
                return Err(Error::value(format!("{} is out of range for {}", i, dbtype)));
            }
        }
        Ok(i.to_string())
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        let fail = || pull_error(wire, dbtype, HostType::Int);
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Int(i) => Ok(Value::Int(*i)),
            WireValue::IntPair(high, low) => {
                Ok(Value::Int((i64::from(*high) << 32) | i64::from(*low)))
            }
            WireValue::Bool(b) => Ok(Value::Int(i64::from(*b))),
            WireValue::Float(f) if f.fract() == 0.0 => {
                Decimal::from_f64(*f).and_then(|d| d.to_i64()).map(Value::Int).ok_or_else(fail)
            }
            WireValue::Text(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Ok(Value::Int(i));
                }
                // NUMERIC-backed integers come back as "42.000".
                Decimal::from_str(s)
                    .ok()
                    .filter(|d| d.fract().is_zero())
                    .and_then(|d| d.to_i64())
                    .map(Value::Int)
                    .ok_or_else(fail)
            }
            _ => Err(fail()),
        }
    }

    fn compare_op(
        &self,
        lhs: &SqlExpression,
        op: CompareOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        numeric_compare(lhs, op, rhs, dialect)
    }

    fn binary_op(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        numeric_binary(lhs, op, rhs, dialect)
    }
}

#[derive(Debug)]
pub struct FloatAdapter;

impl Adapter for FloatAdapter {
    fn host_type(&self) -> HostType {
        HostType::Float
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, _dialect: &dyn Dialect) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Float(f) if !f.is_finite() => Err(Error::value(format!(
                "{} has no portable SQL literal",
                value.repr()
            ))),
            // Debug formatting is the shortest text that reads back exactly.
            Value::Float(f) => Ok(format!("{:?}", f)),
            Value::Int(i) => Ok(i.to_string()),
            other => Err(push_error(other, dbtype)),
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Float(f) => Ok(Value::Float(*f)),
            WireValue::Int(i) => Ok(Value::Float(*i as f64)),
            WireValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| pull_error(wire, dbtype, HostType::Float)),
            other => Err(pull_error(other, dbtype, HostType::Float)),
        }
    }

    fn compare_op(
        &self,
        lhs: &SqlExpression,
        op: CompareOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        numeric_compare(lhs, op, rhs, dialect)
    }

    fn binary_op(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        numeric_binary(lhs, op, rhs, dialect)
    }
}

#[derive(Debug)]
pub struct DecimalAdapter;

impl DecimalAdapter {
    fn check_precision(&self, d: Decimal, dbtype: &DatabaseType) -> Result<()> {
        let Some(p) = dbtype.precision else {
            return Ok(());
        };
        if p.frozen {
            return Ok(());
        }
        let whole = d.trunc().abs();
        let digits = if whole.is_zero() {
            0
        } else {
            whole.to_string().len() as u32
        };
        if digits > p.precision.saturating_sub(p.scale) {
            return Err(Error::value(format!("{} does not fit {}", d, dbtype)));
        }
        Ok(())
    }
}

impl Adapter for DecimalAdapter {
    fn host_type(&self) -> HostType {
        HostType::Decimal
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, _dialect: &dyn Dialect) -> Result<String> {
        let d = match value {
            Value::Null => return Ok("NULL".to_string()),
            Value::Decimal(d) => *d,
            Value::Int(i) => Decimal::from(*i),
            Value::Float(f) => Decimal::from_f64(*f).ok_or_else(|| push_error(value, dbtype))?,
            other => return Err(push_error(other, dbtype)),
        };
        self.check_precision(d, dbtype)?;
        Ok(d.to_string())
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        let fail = || pull_error(wire, dbtype, HostType::Decimal);
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Int(i) => Ok(Value::Decimal(Decimal::from(*i))),
            WireValue::IntPair(high, low) => Ok(Value::Decimal(Decimal::from(
                (i64::from(*high) << 32) | i64::from(*low),
            ))),
            WireValue::Float(f) => Decimal::from_f64(*f).map(Value::Decimal).ok_or_else(fail),
            WireValue::Text(s) => {
                let s = s.trim();
                Decimal::from_str(s)
                    .or_else(|_| Decimal::from_scientific(s))
                    .map(Value::Decimal)
                    .map_err(|_| fail())
            }
            _ => Err(fail()),
        }
    }

    fn compare_op(
        &self,
        lhs: &SqlExpression,
        op: CompareOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        numeric_compare(lhs, op, rhs, dialect)
    }

    fn binary_op(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        numeric_binary(lhs, op, rhs, dialect)
    }
}

fn numeric_compare(
    lhs: &SqlExpression,
    op: CompareOp,
    rhs: &SqlExpression,
    dialect: &dyn Dialect,
) -> OpResult {
    if !rhs.host_type.is_numeric() {
        return Err(CannotRepresent);
    }
    Ok(dialect.compare(&lhs.sql, op, &operand_sql(lhs, rhs, dialect)))
}

fn numeric_binary(
    lhs: &SqlExpression,
    op: BinaryOp,
    rhs: &SqlExpression,
    dialect: &dyn Dialect,
) -> OpResult {
    if rhs.host_type == HostType::Interval && op == BinaryOp::Mul {
        // Scaling an interval.
        return if rhs.dbtype.family == TypeFamily::Interval {
            dialect.date_arithmetic(lhs, op, rhs).ok_or(CannotRepresent)
        } else {
            Ok(dialect.arithmetic(&lhs.sql, op, &rhs.sql))
        };
    }
    if !rhs.host_type.is_numeric() {
        return Err(CannotRepresent);
    }
    let r = operand_sql(lhs, rhs, dialect);
    let both_int = lhs.host_type == HostType::Int && rhs.host_type == HostType::Int;
    match op {
        BinaryOp::Div if both_int => Ok(dialect.true_divide(&lhs.sql, &r)),
        BinaryOp::Mod if both_int => Ok(dialect.floor_modulo(&lhs.sql, &r)),
        // Non-integer modulo differs in sign handling between engines.
        BinaryOp::Mod => Err(CannotRepresent),
        _ => Ok(dialect.arithmetic(&lhs.sql, op, &r)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{GenericDialect, SqliteDialect};
    use crate::types::{FixedRange, TypeHints};

    fn column(name: &str, host: HostType) -> SqlExpression {
        let dbtype = GenericDialect
            .type_set()
            .resolve(host, &TypeHints::default())
            .unwrap();
        SqlExpression::new(format!("\"{}\"", name), host, dbtype)
    }

    #[test]
    fn test_int_division_is_true_division() {
        let a = column("a", HostType::Int);
        let b = column("b", HostType::Int);
        assert_eq!(
            IntAdapter.binary_op(&a, BinaryOp::Div, &b, &GenericDialect).unwrap(),
            "(CAST(\"a\" AS DOUBLE PRECISION) / \"b\")"
        );
        let f = column("f", HostType::Float);
        assert_eq!(
            IntAdapter.binary_op(&a, BinaryOp::Div, &f, &GenericDialect).unwrap(),
            "(\"a\" / \"f\")"
        );
    }

    #[test]
    fn test_int_modulo_follows_divisor_sign() {
        let a = column("a", HostType::Int);
        let b = column("b", HostType::Int);
        assert_eq!(
            IntAdapter.binary_op(&a, BinaryOp::Mod, &b, &GenericDialect).unwrap(),
            "(((\"a\" % \"b\") + \"b\") % \"b\")"
        );
        let f = column("f", HostType::Float);
        assert_eq!(
            FloatAdapter.binary_op(&f, BinaryOp::Mod, &b, &GenericDialect),
            Err(CannotRepresent)
        );
    }

    #[test]
    fn test_numeric_compare_rejects_strings() {
        let a = column("a", HostType::Int);
        let s = column("s", HostType::Str);
        assert_eq!(
            IntAdapter.compare_op(&a, CompareOp::Eq, &s, &GenericDialect),
            Err(CannotRepresent)
        );
        let d = column("d", HostType::Decimal);
        assert_eq!(
            IntAdapter.compare_op(&a, CompareOp::Lt, &d, &GenericDialect).unwrap(),
            "\"a\" < \"d\""
        );
    }

    #[test]
    fn test_bool_in_integer_column() {
        let int = DatabaseType::new("INTEGER", TypeFamily::Integer)
            .with_range(FixedRange::signed_bytes(4));
        assert_eq!(BoolAdapter.push(&Value::Bool(true), &int, &GenericDialect).unwrap(), "1");
        let boolean = DatabaseType::new("BOOLEAN", TypeFamily::Boolean);
        assert_eq!(
            BoolAdapter.push(&Value::Bool(false), &boolean, &SqliteDialect).unwrap(),
            "0"
        );
        assert_eq!(
            BoolAdapter.pull(&WireValue::from("t"), &boolean).unwrap(),
            Value::Bool(true)
        );
        assert!(BoolAdapter.pull(&WireValue::from("maybe"), &boolean).is_err());
    }

    #[test]
    fn test_float_literals() {
        let t = DatabaseType::new("DOUBLE PRECISION", TypeFamily::Float);
        assert_eq!(FloatAdapter.push(&Value::Float(3.0), &t, &GenericDialect).unwrap(), "3.0");
        assert_eq!(FloatAdapter.push(&Value::Float(1e-7), &t, &GenericDialect).unwrap(), "1e-7");
        assert!(FloatAdapter.push(&Value::Float(f64::NAN), &t, &GenericDialect).is_err());
    }

    #[test]
    fn test_decimal_precision_is_checked() {
        let mut t = DatabaseType::new("NUMERIC", TypeFamily::Numeric).adjustable_precision(38, 38);
        t.set_precision(5, 2);
        assert_eq!(
            DecimalAdapter.push(&Value::Decimal(Decimal::new(99999, 2)), &t, &GenericDialect).unwrap(),
            "999.99"
        );
        assert!(DecimalAdapter
            .push(&Value::Decimal(Decimal::new(100000, 2)), &t, &GenericDialect)
            .is_err());
    }

    #[test]
    fn test_integer_pulled_from_numeric_text() {
        let t = DatabaseType::new("NUMERIC", TypeFamily::Numeric);
        assert_eq!(IntAdapter.pull(&WireValue::from("42.000"), &t).unwrap(), Value::Int(42));
        assert!(IntAdapter.pull(&WireValue::from("42.5"), &t).is_err());
    }
}
