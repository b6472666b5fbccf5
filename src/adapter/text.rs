use crate::dialect::{hex_decode, Dialect};
use crate::error::{CannotRepresent, Result};
use crate::expr::{BinaryOp, CompareOp, SqlExpression};
use crate::types::{DatabaseType, HostType, TypeFamily, Value, WireValue};

use super::{operand_sql, pull_error, push_error, Adapter, OpResult};

#[derive(Debug)]
pub struct StrAdapter;

impl Adapter for StrAdapter {
    fn host_type(&self) -> HostType {
        HostType::Str
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, dialect: &dyn Dialect) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Str(s) => Ok(dialect.quote_string(s)),
            other => Err(push_error(other, dbtype)),
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Text(s) => Ok(Value::Str(s.clone())),
            WireValue::Bytes(b) => String::from_utf8(b.clone())
                .map(Value::Str)
                .map_err(|_| pull_error(wire, dbtype, HostType::Str)),
            // Dynamically typed stores may hand back numbers for text columns.
            WireValue::Int(i) => Ok(Value::Str(i.to_string())),
            WireValue::Float(f) => Ok(Value::Str(f.to_string())),
            other => Err(pull_error(other, dbtype, HostType::Str)),
        }
    }

    fn compare_op(
        &self,
        lhs: &SqlExpression,
        op: CompareOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        if rhs.host_type != HostType::Str {
            return Err(CannotRepresent);
        }
        Ok(dialect.text_compare(&lhs.sql, op, &operand_sql(lhs, rhs, dialect)))
    }

    fn binary_op(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        match (op, rhs.host_type) {
            (BinaryOp::Add, HostType::Str) => {
                Ok(dialect.concat(&lhs.sql, &operand_sql(lhs, rhs, dialect)))
            }
            _ => Err(CannotRepresent),
        }
    }
}

#[derive(Debug)]
pub struct BytesAdapter;

impl Adapter for BytesAdapter {
    fn host_type(&self) -> HostType {
        HostType::Bytes
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, dialect: &dyn Dialect) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Bytes(b) => Ok(dialect.bytes_literal(b)),
            other => Err(push_error(other, dbtype)),
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Bytes(b) => Ok(Value::Bytes(b.clone())),
            // PostgreSQL text output for bytea is `\x` followed by hex.
            WireValue::Text(s) => match s.strip_prefix("\\x") {
                Some(hex) => hex_decode(hex)
                    .map(Value::Bytes)
                    .ok_or_else(|| pull_error(wire, dbtype, HostType::Bytes)),
                None => Ok(Value::Bytes(s.as_bytes().to_vec())),
            },
            other => Err(pull_error(other, dbtype, HostType::Bytes)),
        }
    }

    fn binary_op(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        match (op, rhs.host_type) {
            (BinaryOp::Add, HostType::Bytes) => {
                Ok(dialect.concat(&lhs.sql, &operand_sql(lhs, rhs, dialect)))
            }
            _ => Err(CannotRepresent),
        }
    }
}

/// JSON documents, in a native JSON column or pickled into text.
#[derive(Debug)]
pub struct JsonAdapter;

impl Adapter for JsonAdapter {
    fn host_type(&self) -> HostType {
        HostType::Json
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, dialect: &dyn Dialect) -> Result<String> {
        let json = match value {
            Value::Null => return Ok("NULL".to_string()),
            Value::Json(j) => j,
            other => return Err(push_error(other, dbtype)),
        };
        let text = serde_json::to_string(json).map_err(|_| push_error(value, dbtype))?;
        if dbtype.family == TypeFamily::Json {
            Ok(dialect.json_literal(&text))
        } else {
            Ok(dialect.quote_string(&text))
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        let fail = || pull_error(wire, dbtype, HostType::Json);
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Text(s) => serde_json::from_str(s).map(Value::Json).map_err(|_| fail()),
            WireValue::Bytes(b) => serde_json::from_slice(b).map(Value::Json).map_err(|_| fail()),
            _ => Err(fail()),
        }
    }

    /// Stored text depends on the engine's serialization, so equality
    /// is only decided in process.
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
