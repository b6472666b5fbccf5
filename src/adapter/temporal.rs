use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::dialect::Dialect;
use crate::error::{CannotRepresent, Error, Result};
use crate::expr::{BinaryOp, CompareOp, SqlExpression};
use crate::types::{DatabaseType, HostType, Value, WireValue};

use super::{operand_sql, pull_error, push_error, Adapter, OpResult};

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Decimal seconds of an interval, at microsecond resolution.
pub fn interval_seconds(interval: Duration) -> Decimal {
    match interval.num_microseconds() {
        Some(us) => Decimal::new(us, 6).normalize(),
        None => Decimal::from(interval.num_seconds()),
    }
}

fn seconds_to_interval(seconds: Decimal) -> Option<Duration> {
    let micros = (seconds * Decimal::from(MICROS_PER_SECOND)).round().to_i64()?;
    Some(Duration::microseconds(micros))
}

/// Parse a timestamp as drivers return it: space or `T` separated,
/// optional fraction, optional UTC offset (converted to UTC), or a bare
/// date (midnight).
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.naive_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(d);
    }
    parse_datetime(text).map(|dt| dt.date())
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
}

/// Parse interval text: plain decimal seconds, or PostgreSQL output such
/// as `1 year 2 mons 3 days 04:05:06.5` / `-1 days +02:00:00`. Months and
/// years are taken as 30 and 365 days.
pub fn parse_interval(text: &str) -> Option<Duration> {
    let text = text.trim();
    if let Ok(seconds) = Decimal::from_str(text) {
        return seconds_to_interval(seconds);
    }

    let mut total = Duration::zero();
    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.contains(':') {
            total = total + parse_clock(token)?;
            continue;
        }
        let amount = Decimal::from_str(token).ok()?;
        let unit = tokens.next()?.to_ascii_lowercase();
        let seconds_per_unit: i64 = match unit.trim_end_matches(',').trim_end_matches('s') {
            "year" => 365 * 86_400,
            "mon" | "month" => 30 * 86_400,
            "week" => 7 * 86_400,
            "day" => 86_400,
            "hour" => 3_600,
            "min" | "minute" => 60,
            "sec" | "second" => 1,
            _ => return None,
        };
        total = total + seconds_to_interval(amount * Decimal::from(seconds_per_unit))?;
    }
    Some(total)
}

fn parse_clock(token: &str) -> Option<Duration> {
    let (negative, body) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.trim_start_matches('+')),
    };
    let mut parts = body.splitn(3, ':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds = Decimal::from_str(parts.next().unwrap_or("0")).ok()?;
    let clock = Duration::hours(hours) + Duration::minutes(minutes) + seconds_to_interval(seconds)?;
    Some(if negative { -clock } else { clock })
}

fn temporal_compare(
    lhs: &SqlExpression,
    op: CompareOp,
    rhs: &SqlExpression,
    dialect: &dyn Dialect,
) -> OpResult {
    if rhs.host_type != lhs.host_type {
        return Err(CannotRepresent);
    }
    Ok(dialect.compare(&lhs.sql, op, &operand_sql(lhs, rhs, dialect)))
}

#[derive(Debug)]
pub struct DateAdapter;

impl Adapter for DateAdapter {
    fn host_type(&self) -> HostType {
        HostType::Date
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, dialect: &dyn Dialect) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Date(d) => Ok(dialect.date_literal(*d)),
            other => Err(push_error(other, dbtype)),
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Text(s) => parse_date(s)
                .map(Value::Date)
                .ok_or_else(|| pull_error(wire, dbtype, HostType::Date)),
            other => Err(pull_error(other, dbtype, HostType::Date)),
        }
    }

    fn compare_op(
        &self,
        lhs: &SqlExpression,
        op: CompareOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        temporal_compare(lhs, op, rhs, dialect)
    }

    fn binary_op(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        dialect.date_arithmetic(lhs, op, rhs).ok_or(CannotRepresent)
    }
}

#[derive(Debug)]
pub struct TimeAdapter;

impl Adapter for TimeAdapter {
    fn host_type(&self) -> HostType {
        HostType::Time
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, dialect: &dyn Dialect) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Time(t) => Ok(dialect.time_literal(*t)),
            other => Err(push_error(other, dbtype)),
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Text(s) => parse_time(s)
                .map(Value::Time)
                .ok_or_else(|| pull_error(wire, dbtype, HostType::Time)),
            other => Err(pull_error(other, dbtype, HostType::Time)),
        }
    }

    fn compare_op(
        &self,
        lhs: &SqlExpression,
        op: CompareOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        temporal_compare(lhs, op, rhs, dialect)
    }
}

#[derive(Debug)]
pub struct DateTimeAdapter;

impl Adapter for DateTimeAdapter {
    fn host_type(&self) -> HostType {
        HostType::DateTime
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, dialect: &dyn Dialect) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::DateTime(dt) => Ok(dialect.datetime_literal(*dt)),
            other => Err(push_error(other, dbtype)),
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Text(s) => parse_datetime(s)
                .map(Value::DateTime)
                .ok_or_else(|| pull_error(wire, dbtype, HostType::DateTime)),
            // Unix seconds, as some embedded stores keep them.
            WireValue::Int(secs) => DateTime::from_timestamp(*secs, 0)
                .map(|dt| Value::DateTime(dt.naive_utc()))
                .ok_or_else(|| pull_error(wire, dbtype, HostType::DateTime)),
            other => Err(pull_error(other, dbtype, HostType::DateTime)),
        }
    }

    fn compare_op(
        &self,
        lhs: &SqlExpression,
        op: CompareOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        temporal_compare(lhs, op, rhs, dialect)
    }

    fn binary_op(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        dialect.date_arithmetic(lhs, op, rhs).ok_or(CannotRepresent)
    }
}

/// Intervals in a native interval column.
#[derive(Debug)]
pub struct IntervalAdapter;

impl Adapter for IntervalAdapter {
    fn host_type(&self) -> HostType {
        HostType::Interval
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, dialect: &dyn Dialect) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Interval(d) => dialect.interval_literal(*d).ok_or_else(|| {
                Error::Unsupported(format!("{} has no interval literal", dialect.name()))
            }),
            other => Err(push_error(other, dbtype)),
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        let fail = || pull_error(wire, dbtype, HostType::Interval);
        match wire {
            WireValue::Null => Ok(Value::Null),
            WireValue::Text(s) => parse_interval(s).map(Value::Interval).ok_or_else(fail),
            WireValue::Int(secs) => Ok(Value::Interval(Duration::seconds(*secs))),
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
        temporal_compare(lhs, op, rhs, dialect)
    }

    fn binary_op(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        dialect.date_arithmetic(lhs, op, rhs).ok_or(CannotRepresent)
    }
}

/// Intervals stored as decimal seconds, for databases without an
/// interval type.
#[derive(Debug)]
pub struct IntervalSecondsAdapter;

impl Adapter for IntervalSecondsAdapter {
    fn host_type(&self) -> HostType {
        HostType::Interval
    }

    fn push(&self, value: &Value, dbtype: &DatabaseType, _dialect: &dyn Dialect) -> Result<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Interval(d) => Ok(interval_seconds(*d).to_string()),
            other => Err(push_error(other, dbtype)),
        }
    }

    fn pull(&self, wire: &WireValue, dbtype: &DatabaseType) -> Result<Value> {
        let fail = || pull_error(wire, dbtype, HostType::Interval);
        let seconds = match wire {
            WireValue::Null => return Ok(Value::Null),
            WireValue::Int(i) => Decimal::from(*i),
            WireValue::Float(f) => Decimal::try_from(*f).map_err(|_| fail())?,
            WireValue::Text(s) => Decimal::from_str(s.trim()).map_err(|_| fail())?,
            _ => return Err(fail()),
        };
        seconds_to_interval(seconds)
            .map(Value::Interval)
            .ok_or_else(fail)
    }

    fn compare_op(
        &self,
        lhs: &SqlExpression,
        op: CompareOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        temporal_compare(lhs, op, rhs, dialect)
    }

    fn binary_op(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
        dialect: &dyn Dialect,
    ) -> OpResult {
        match (op, rhs.host_type) {
            (BinaryOp::Add | BinaryOp::Sub | BinaryOp::Div, HostType::Interval) => Ok(
                dialect.arithmetic(&lhs.sql, op, &operand_sql(lhs, rhs, dialect)),
            ),
            (BinaryOp::Mul | BinaryOp::Div, HostType::Int | HostType::Float) => {
                Ok(dialect.arithmetic(&lhs.sql, op, &rhs.sql))
            }
            (BinaryOp::Add, HostType::Date | HostType::DateTime) => {
                dialect.date_arithmetic(lhs, op, rhs).ok_or(CannotRepresent)
            }
            _ => Err(CannotRepresent),
        }
    }
}
