/// Value codecs between host values and SQL.
///
/// An [`Adapter`] is chosen per (host type, database type) pair. It
/// renders literals for inline SQL, decodes driver output back into host
/// values, and knows which operators it can express against which other
/// operand types. Declining an operator is not an error: it returns
/// [`CannotRepresent`] and the compiler degrades the enclosing clause.
mod scalar;
mod temporal;
mod text;

use std::fmt;

use crate::dialect::Dialect;
use crate::error::{CannotRepresent, Error, Result};
use crate::expr::{BinaryOp, CompareOp, SqlExpression};
use crate::types::{DatabaseType, HostType, TypeFamily, Value, WireValue};

pub use scalar::{BoolAdapter, DecimalAdapter, FloatAdapter, IntAdapter, OpaqueAdapter};
pub use temporal::{
    interval_seconds, parse_datetime, parse_interval, DateAdapter, DateTimeAdapter,
    IntervalAdapter, IntervalSecondsAdapter, TimeAdapter,
};
pub use text::{BytesAdapter, JsonAdapter, StrAdapter};

/// Result of operator rendering: SQL text, or a local refusal.
pub type OpResult = std::result::Result<String, CannotRepresent>;

pub trait Adapter: Send + Sync + fmt::Debug {
    /// Host type this adapter encodes.
    fn host_type(&self) -> HostType;

    /// Render `value` as an inline SQL literal. `Value::Null` is always `NULL`.
    fn push(&self, value: &Value, dbtype: &DatabaseType, dialect: &dyn Dialect) -> Result<String>;

    /// Decode a driver value.
    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value>;

    /// Render `lhs op rhs` where `lhs` is encoded by this adapter.
    fn compare_op(
        &self,
        lhs: &SqlExpression,
        op: CompareOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        if rhs.host_type != self.host_type() {
            return Err(CannotRepresent);
        }
        Ok(dialect.compare(&lhs.sql, op, &operand_sql(lhs, rhs, dialect)))
    }

    /// Render arithmetic `lhs op rhs` where `lhs` is encoded by this adapter.
    fn binary_op(
        &self,
        _lhs: &SqlExpression,
        _op: BinaryOp,
        _rhs: &SqlExpression,
        _dialect: &dyn Dialect,
    ) -> OpResult {
        Err(CannotRepresent)
    }
}

static NULL: OpaqueAdapter = OpaqueAdapter(HostType::Null);
static LIST: OpaqueAdapter = OpaqueAdapter(HostType::List);
static BOOL: BoolAdapter = BoolAdapter;
static INT: IntAdapter = IntAdapter;
static FLOAT: FloatAdapter = FloatAdapter;
static DECIMAL: DecimalAdapter = DecimalAdapter;
static STR: StrAdapter = StrAdapter;
static BYTES: BytesAdapter = BytesAdapter;
static JSON: JsonAdapter = JsonAdapter;
static DATE: DateAdapter = DateAdapter;
static TIME: TimeAdapter = TimeAdapter;
static DATETIME: DateTimeAdapter = DateTimeAdapter;
static INTERVAL: IntervalAdapter = IntervalAdapter;
static INTERVAL_SECONDS: IntervalSecondsAdapter = IntervalSecondsAdapter;

/// The adapter for `host` values stored in `dbtype`.
pub fn for_type(host: HostType, dbtype: &DatabaseType) -> &'static dyn Adapter {
    match host {
        HostType::Null => &NULL,
        HostType::List => &LIST,
        HostType::Bool => &BOOL,
        HostType::Int => &INT,
        HostType::Float => &FLOAT,
        HostType::Decimal => &DECIMAL,
        HostType::Str => &STR,
        HostType::Bytes => &BYTES,
        HostType::Json => &JSON,
        HostType::Date => &DATE,
        HostType::Time => &TIME,
        HostType::DateTime => &DATETIME,
        HostType::Interval if dbtype.family == TypeFamily::Interval => &INTERVAL,
        HostType::Interval => &INTERVAL_SECONDS,
    }
}

/// SQL for `rhs` as an operand against `lhs`. A constant of the same host
/// type is re-encoded through `lhs`'s type so both sides agree on storage
/// (booleans stored as integers, intervals stored as seconds, ...).
pub fn operand_sql(lhs: &SqlExpression, rhs: &SqlExpression, dialect: &dyn Dialect) -> String {
    match &rhs.constant {
        Some(value) if !value.is_null() && value.host_type() == lhs.host_type => lhs
            .adapter()
            .push(value, &lhs.dbtype, dialect)
            .unwrap_or_else(|_| rhs.sql.clone()),
        _ => rhs.sql.clone(),
    }
}

pub(crate) fn push_error(value: &Value, dbtype: &DatabaseType) -> Error {
    Error::value(format!("cannot encode {} as {}", value.repr(), dbtype))
}

pub(crate) fn pull_error(wire: &WireValue, dbtype: &DatabaseType, host: HostType) -> Error {
    Error::value(format!("cannot decode {:?} from {} as {}", wire, dbtype, host))
}
