//! Host-side values and the raw shapes drivers hand back.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A decoded row, keyed by column key.
pub type Row = BTreeMap<String, Value>;

/// Late-bound keyword arguments, resolved when a predicate is compiled.
pub type Kwargs = BTreeMap<String, Value>;

/// The host type of a value. Drives type selection and adapter lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostType {
    Null,
    Bool,
    Int,
    Float,
    Decimal,
    #[serde(alias = "string", alias = "text")]
    Str,
    Bytes,
    Date,
    Time,
    #[serde(alias = "timestamp")]
    DateTime,
    #[serde(alias = "timedelta")]
    Interval,
    Json,
    List,
}

impl HostType {
    pub fn is_numeric(self) -> bool {
        matches!(self, HostType::Int | HostType::Float | HostType::Decimal)
    }

    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            HostType::Date | HostType::Time | HostType::DateTime | HostType::Interval
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            HostType::Null => "null",
            HostType::Bool => "bool",
            HostType::Int => "int",
            HostType::Float => "float",
            HostType::Decimal => "decimal",
            HostType::Str => "str",
            HostType::Bytes => "bytes",
            HostType::Date => "date",
            HostType::Time => "time",
            HostType::DateTime => "datetime",
            HostType::Interval => "interval",
            HostType::Json => "json",
            HostType::List => "list",
        }
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A host value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Interval(Duration),
    Json(serde_json::Value),
    List(Vec<Value>),
}

impl Value {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(data.into())
    }

    pub fn host_type(&self) -> HostType {
        match self {
            Value::Null => HostType::Null,
            Value::Bool(_) => HostType::Bool,
            Value::Int(_) => HostType::Int,
            Value::Float(_) => HostType::Float,
            Value::Decimal(_) => HostType::Decimal,
            Value::Str(_) => HostType::Str,
            Value::Bytes(_) => HostType::Bytes,
            Value::Date(_) => HostType::Date,
            Value::Time(_) => HostType::Time,
            Value::DateTime(_) => HostType::DateTime,
            Value::Interval(_) => HostType::Interval,
            Value::Json(_) => HostType::Json,
            Value::List(_) => HostType::List,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    /// Host truthiness: empty strings, zero and empty lists are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Decimal(d) => !d.is_zero(),
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Interval(d) => !d.is_zero(),
            Value::List(l) => !l.is_empty(),
            Value::Json(j) => !j.is_null(),
            Value::Date(_) | Value::Time(_) | Value::DateTime(_) => true,
        }
    }

    /// Ordering across comparable host types. Numbers compare across
    /// int/float/decimal; everything else only within its own type.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Int(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Value::Int(a), Value::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Value::Decimal(a), Value::Float(b)) => {
                Decimal::from_f64(*b).map(|b| a.cmp(&b))
            }
            (Value::Float(a), Value::Decimal(b)) => {
                Decimal::from_f64(*a).map(|a| a.cmp(b))
            }
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Interval(a), Value::Interval(b)) => Some(a.cmp(b)),
            (Value::Json(a), Value::Json(b)) if a == b => Some(Ordering::Equal),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Equality with numeric promotion (`1 == 1.0`).
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// A stable, unambiguous rendering used in expression reprs and cache keys.
    pub fn repr(&self) -> String {
        match self {
            Value::Null => "None".to_string(),
            Value::Bool(b) => (if *b { "True" } else { "False" }).to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{:?}", f),
            Value::Decimal(d) => format!("Decimal('{}')", d),
            Value::Str(s) => format!("{:?}", s),
            Value::Bytes(b) => format!("b{:?}", b),
            Value::Date(d) => format!("date({})", d),
            Value::Time(t) => format!("time({})", t),
            Value::DateTime(dt) => format!("datetime({})", dt),
            Value::Interval(d) => {
                format!("interval({}us)", d.num_microseconds().unwrap_or(i64::MAX))
            }
            Value::Json(j) => format!("json({})", j),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Interval(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A value as returned by a driver, before an adapter decodes it.
///
/// Drivers disagree about shapes: some return text for everything, some
/// split 64-bit integers into (high, low) pairs, some return native numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    /// A 64-bit integer split into its high and low 32-bit halves.
    IntPair(i32, u32),
}

impl WireValue {
    pub fn is_null(&self) -> bool {
        matches!(self, WireValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            WireValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Option<&str>> for WireValue {
    fn from(v: Option<&str>) -> Self {
        match v {
            Some(s) => WireValue::Text(s.to_string()),
            None => WireValue::Null,
        }
    }
}

impl From<&str> for WireValue {
    fn from(v: &str) -> Self {
        WireValue::Text(v.to_string())
    }
}

impl From<i64> for WireValue {
    fn from(v: i64) -> Self {
        WireValue::Int(v)
    }
}
