/// In-process evaluation of expression trees.
///
/// Used to re-filter rows fetched with an imperfect restriction and, by
/// the compiler, to fold operations whose operands are all constants.
/// Division always yields a float and `%` takes the sign of the divisor.
/// `in` on strings is a substring test.
use std::cmp::Ordering;

use chrono::{Datelike, Duration, Timelike};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::types::{Kwargs, Row, Value};

use super::functions::FunctionRegistry;
use super::node::Node;
use super::ops::{comparable, BinaryOp, CompareOp};

/// Evaluates a tree against one row per expression parameter.
pub struct Evaluator<'a> {
    rows: &'a [&'a Row],
    kwargs: &'a Kwargs,
    functions: &'a FunctionRegistry,
}

impl<'a> Evaluator<'a> {
    pub fn new(rows: &'a [&'a Row], kwargs: &'a Kwargs, functions: &'a FunctionRegistry) -> Self {
        Self {
            rows,
            kwargs,
            functions,
        }
    }

    /// Evaluates `node`. A NULL read from a row is SQL's UNKNOWN: it
    /// propagates through operators and calls, fails every comparison, and
    /// NOT/AND/OR follow three-valued logic. A NULL literal keeps the
    /// `IS NULL` meaning it has in compiled SQL.
    pub fn eval(&self, node: &Node) -> Result<Value> {
        match node {
            Node::Param(i) => Err(Error::programmer(format!(
                "row parameter {} used as a value",
                i
            ))),
            Node::Attr(target, name) => match target.as_ref() {
                Node::Param(i) => {
                    let row = self.rows.get(*i).ok_or(Error::ArityMismatch {
                        expected: i + 1,
                        found: self.rows.len(),
                    })?;
                    row.get(name)
                        .cloned()
                        .ok_or_else(|| Error::mapping(format!("row has no column {:?}", name)))
                }
                other => match self.operands([other])? {
                    Some(values) => attribute(&values[0], name),
                    None => Ok(Value::Null),
                },
            },
            Node::Const(v) => Ok(v.clone()),
            Node::Kwarg(name) => kwarg(self.kwargs, name),
            Node::Subscript(target, key) => match self.operands([target.as_ref(), key.as_ref()])? {
                Some(values) => subscript(&values[0], &values[1]),
                None => Ok(Value::Null),
            },
            Node::Tuple(items) => Ok(Value::List(
                items.iter().map(|n| self.eval(n)).collect::<Result<_>>()?,
            )),
            Node::Call { name, args } => {
                let def = self
                    .functions
                    .function(name)
                    .ok_or_else(|| Error::Unsupported(format!("unknown function {}", name)))?;
                match self.operands(args)? {
                    Some(values) => def.evaluate(name, &values),
                    None => Ok(Value::Null),
                }
            }
            Node::Method { target, name, args } => {
                let def = self
                    .functions
                    .method(name)
                    .ok_or_else(|| Error::Unsupported(format!("unknown method {}", name)))?;
                match self.operands(std::iter::once(target.as_ref()).chain(args))? {
                    Some(values) => def.evaluate(name, &values),
                    None => Ok(Value::Null),
                }
            }
            Node::Compare(l, op, r) => {
                let (lhs, rhs) = (self.eval(l)?, self.eval(r)?);
                let literal_null = (lhs.is_null() && !from_row(l)) || (rhs.is_null() && !from_row(r));
                if !literal_null && (unknown(l, &lhs) || unknown(r, &rhs)) {
                    return Ok(Value::Null);
                }
                Ok(Value::Bool(compare(&lhs, *op, &rhs)?))
            }
            Node::In {
                item,
                collection,
                negated,
            } => Ok(match self.membership(item, collection)? {
                Value::Bool(found) => Value::Bool(found != *negated),
                other => other,
            }),
            Node::Binary(l, op, r) => match self.operands([l.as_ref(), r.as_ref()])? {
                Some(values) => arithmetic(&values[0], *op, &values[1]),
                None => Ok(Value::Null),
            },
            Node::And(items) => {
                let mut undecided = false;
                for item in items {
                    match self.eval(item)? {
                        Value::Null => undecided = true,
                        v if !v.truthy() => return Ok(Value::Bool(false)),
                        _ => {}
                    }
                }
                Ok(if undecided { Value::Null } else { Value::Bool(true) })
            }
            Node::Or(items) => {
                let mut undecided = false;
                for item in items {
                    match self.eval(item)? {
                        Value::Null => undecided = true,
                        v if v.truthy() => return Ok(Value::Bool(true)),
                        _ => {}
                    }
                }
                Ok(if undecided { Value::Null } else { Value::Bool(false) })
            }
            Node::Not(inner) => Ok(match self.eval(inner)? {
                Value::Null => Value::Null,
                v => Value::Bool(!v.truthy()),
            }),
            Node::Neg(inner) => match self.operands([inner.as_ref()])? {
                Some(values) => negate(&values[0]),
                None => Ok(Value::Null),
            },
            Node::Alias(inner, _) => self.eval(inner),
        }
    }

    /// Operand values, or `None` once one of them is UNKNOWN.
    fn operands<'n>(&self, nodes: impl IntoIterator<Item = &'n Node>) -> Result<Option<Vec<Value>>> {
        let mut values = Vec::new();
        for node in nodes {
            let value = self.eval(node)?;
            if unknown(node, &value) {
                return Ok(None);
            }
            values.push(value);
        }
        Ok(Some(values))
    }

    /// `item in collection` before negation; NULL when the answer is UNKNOWN.
    fn membership(&self, item: &Node, collection: &Node) -> Result<Value> {
        let needle = self.eval(item)?;
        // Each member paired with whether it was read from a row.
        let members: Vec<(Value, bool)> = match collection {
            Node::Tuple(nodes) => nodes
                .iter()
                .map(|n| Ok((self.eval(n)?, from_row(n))))
                .collect::<Result<_>>()?,
            other => match self.eval(other)? {
                haystack if unknown(other, &haystack) => return Ok(Value::Null),
                Value::List(values) => {
                    let row_list = from_row(other);
                    values.into_iter().map(|v| (v, row_list)).collect()
                }
                haystack => {
                    if unknown(item, &needle) {
                        return Ok(Value::Null);
                    }
                    return contains(&haystack, &needle).map(Value::Bool);
                }
            },
        };
        if unknown(item, &needle) {
            // Only a NULL literal member answers for an unknown item, as `IS NULL`.
            let literal_null = members.iter().any(|(v, row)| v.is_null() && !row);
            return Ok(if literal_null { Value::Bool(true) } else { Value::Null });
        }
        if members.iter().any(|(v, _)| v.loose_eq(&needle)) {
            Ok(Value::Bool(true))
        } else if members.iter().any(|(v, row)| v.is_null() && *row) {
            Ok(Value::Null)
        } else {
            Ok(Value::Bool(false))
        }
    }
}

fn from_row(node: &Node) -> bool {
    node.arity() > 0
}

/// A NULL that came from row data rather than a literal.
fn unknown(node: &Node, value: &Value) -> bool {
    value.is_null() && from_row(node)
}

pub(crate) fn kwarg(kwargs: &Kwargs, name: &str) -> Result<Value> {
    kwargs
        .get(name)
        .cloned()
        .ok_or_else(|| Error::programmer(format!("missing keyword argument {:?}", name)))
}

/// `lhs op rhs`. Ordering against NULL is an error; equality across
/// unrelated types is simply false.
pub fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> Result<bool> {
    if lhs.is_null() || rhs.is_null() {
        if !op.is_equality() {
            return Err(Error::IllegalNullComparison(format!(
                "{} {} {}",
                lhs.repr(),
                op,
                rhs.repr()
            )));
        }
        let equal = lhs.is_null() && rhs.is_null();
        return Ok(equal == (op == CompareOp::Eq));
    }
    if !comparable(lhs.host_type(), op, rhs.host_type()) {
        if op.is_equality() {
            return Ok(op == CompareOp::Ne);
        }
        return Err(Error::value(format!(
            "'{}' not supported between {} and {}",
            op,
            lhs.host_type(),
            rhs.host_type()
        )));
    }
    let ordering = lhs.compare(rhs);
    Ok(match op {
        CompareOp::Eq => ordering == Some(Ordering::Equal),
        CompareOp::Ne => ordering != Some(Ordering::Equal),
        CompareOp::Lt => ordering == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => ordering == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
    })
}

fn operand_error(lhs: &Value, op: BinaryOp, rhs: &Value) -> Error {
    Error::value(format!(
        "unsupported operand types for {}: {} and {}",
        op,
        lhs.host_type(),
        rhs.host_type()
    ))
}

fn zero_division() -> Error {
    Error::value("division by zero")
}

fn overflow(op: BinaryOp) -> Error {
    Error::value(format!("overflow in {}", op))
}

fn int_arithmetic(a: i64, op: BinaryOp, b: i64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(zero_division());
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(zero_division());
            }
            a.checked_rem(b)
                .map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
    };
    result.map(Value::Int).ok_or_else(|| overflow(op))
}

fn float_arithmetic(a: f64, op: BinaryOp, b: f64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => return Err(zero_division()),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
    };
    Ok(Value::Float(result))
}

fn decimal_arithmetic(a: Decimal, op: BinaryOp, b: Decimal) -> Result<Value> {
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b.is_zero() {
        return Err(zero_division());
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Mod => a.checked_rem(b),
    };
    result.map(Value::Decimal).ok_or_else(|| overflow(op))
}

fn micros(interval: &Duration) -> Result<i64> {
    interval
        .num_microseconds()
        .ok_or_else(|| Error::value("interval out of range"))
}

fn scale_interval(interval: &Duration, factor: f64) -> Result<Value> {
    let scaled = micros(interval)? as f64 * factor;
    if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
        return Err(Error::value("interval out of range"));
    }
    Ok(Value::Interval(Duration::microseconds(scaled.round() as i64)))
}

/// `lhs op rhs` with host semantics.
pub fn arithmetic(lhs: &Value, op: BinaryOp, rhs: &Value) -> Result<Value> {
    use BinaryOp::*;
    let out_of_range = || Error::value(format!("result of {} out of range", op));
    match (lhs, op, rhs) {
        (Value::Int(a), _, Value::Int(b)) => int_arithmetic(*a, op, *b),
        (Value::Int(_) | Value::Float(_), _, Value::Int(_) | Value::Float(_)) => {
            match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => float_arithmetic(a, op, b),
                _ => Err(operand_error(lhs, op, rhs)),
            }
        }
        (Value::Decimal(a), _, Value::Decimal(b)) => decimal_arithmetic(*a, op, *b),
        (Value::Decimal(a), _, Value::Int(b)) => decimal_arithmetic(*a, op, Decimal::from(*b)),
        (Value::Int(a), _, Value::Decimal(b)) => decimal_arithmetic(Decimal::from(*a), op, *b),

        (Value::Str(a), Add, Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (Value::Bytes(a), Add, Value::Bytes(b)) => {
            Ok(Value::Bytes(a.iter().chain(b.iter()).copied().collect()))
        }

        (Value::Date(d), Add, Value::Interval(i)) | (Value::Interval(i), Add, Value::Date(d)) => d
            .checked_add_signed(*i)
            .map(Value::Date)
            .ok_or_else(out_of_range),
        (Value::Date(d), Sub, Value::Interval(i)) => d
            .checked_sub_signed(*i)
            .map(Value::Date)
            .ok_or_else(out_of_range),
        (Value::Date(a), Sub, Value::Date(b)) => Ok(Value::Interval(a.signed_duration_since(*b))),
        (Value::DateTime(d), Add, Value::Interval(i))
        | (Value::Interval(i), Add, Value::DateTime(d)) => d
            .checked_add_signed(*i)
            .map(Value::DateTime)
            .ok_or_else(out_of_range),
        (Value::DateTime(d), Sub, Value::Interval(i)) => d
            .checked_sub_signed(*i)
            .map(Value::DateTime)
            .ok_or_else(out_of_range),
        (Value::DateTime(a), Sub, Value::DateTime(b)) => {
            Ok(Value::Interval(a.signed_duration_since(*b)))
        }
        (Value::Interval(a), Add, Value::Interval(b)) => a
            .checked_add(b)
            .map(Value::Interval)
            .ok_or_else(out_of_range),
        (Value::Interval(a), Sub, Value::Interval(b)) => a
            .checked_sub(b)
            .map(Value::Interval)
            .ok_or_else(out_of_range),
        (Value::Interval(a), Div, Value::Interval(b)) => {
            let divisor = micros(b)?;
            if divisor == 0 {
                return Err(zero_division());
            }
            Ok(Value::Float(micros(a)? as f64 / divisor as f64))
        }
        (Value::Interval(i), Mul, Value::Int(_) | Value::Float(_))
        | (Value::Int(_) | Value::Float(_), Mul, Value::Interval(i)) => {
            let factor = if matches!(lhs, Value::Interval(_)) { rhs } else { lhs };
            scale_interval(i, factor.as_f64().unwrap_or_default())
        }
        (Value::Interval(i), Div, Value::Int(_) | Value::Float(_)) => {
            let divisor = rhs.as_f64().unwrap_or_default();
            if divisor == 0.0 {
                return Err(zero_division());
            }
            scale_interval(i, 1.0 / divisor)
        }
        _ => Err(operand_error(lhs, op, rhs)),
    }
}

/// `item in collection`.
pub fn contains(collection: &Value, item: &Value) -> Result<bool> {
    match (collection, item) {
        (Value::List(items), _) => Ok(items.iter().any(|v| v.loose_eq(item))),
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Bytes(haystack), Value::Bytes(needle)) => Ok(needle.is_empty()
            || haystack
                .windows(needle.len())
                .any(|w| w == needle.as_slice())),
        (Value::Json(serde_json::Value::Object(map)), Value::Str(key)) => Ok(map.contains_key(key)),
        (Value::Json(serde_json::Value::Array(items)), _) => {
            Ok(items.iter().any(|v| json_to_value(v).loose_eq(item)))
        }
        _ => Err(Error::value(format!(
            "'in' not supported between {} and {}",
            item.host_type(),
            collection.host_type()
        ))),
    }
}

/// Named attribute of a value: date and time fields.
pub fn attribute(value: &Value, name: &str) -> Result<Value> {
    let field = match (value, name) {
        (Value::Date(d), "year") => d.year() as i64,
        (Value::Date(d), "month") => i64::from(d.month()),
        (Value::Date(d), "day") => i64::from(d.day()),
        (Value::DateTime(d), "year") => d.year() as i64,
        (Value::DateTime(d), "month") => i64::from(d.month()),
        (Value::DateTime(d), "day") => i64::from(d.day()),
        (Value::DateTime(d), "hour") => i64::from(d.hour()),
        (Value::DateTime(d), "minute") => i64::from(d.minute()),
        (Value::DateTime(d), "second") => i64::from(d.second()),
        (Value::Time(t), "hour") => i64::from(t.hour()),
        (Value::Time(t), "minute") => i64::from(t.minute()),
        (Value::Time(t), "second") => i64::from(t.second()),
        _ => {
            return Err(Error::value(format!(
                "{} has no attribute {:?}",
                value.host_type(),
                name
            )))
        }
    };
    Ok(Value::Int(field))
}

fn index_of(len: usize, index: i64) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let i = if index < 0 { len + index } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

/// `value[key]` for lists, strings and JSON documents.
pub fn subscript(value: &Value, key: &Value) -> Result<Value> {
    let missing = || Error::value(format!("{} has no item {}", value.repr(), key.repr()));
    match (value, key) {
        (Value::List(items), Value::Int(i)) => index_of(items.len(), *i)
            .map(|i| items[i].clone())
            .ok_or_else(missing),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            index_of(chars.len(), *i)
                .map(|i| Value::Str(chars[i].to_string()))
                .ok_or_else(missing)
        }
        (Value::Json(serde_json::Value::Object(map)), Value::Str(k)) => {
            map.get(k).map(json_to_value).ok_or_else(missing)
        }
        (Value::Json(serde_json::Value::Array(items)), Value::Int(i)) => index_of(items.len(), *i)
            .map(|i| json_to_value(&items[i]))
            .ok_or_else(missing),
        _ => Err(missing()),
    }
}

pub fn negate(value: &Value) -> Result<Value> {
    match value {
        Value::Int(i) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| Error::value("integer overflow")),
        Value::Float(f) => Ok(Value::Float(-f)),
        Value::Decimal(d) => Ok(Value::Decimal(-*d)),
        Value::Interval(d) => Ok(Value::Interval(-*d)),
        other => Err(Error::value(format!(
            "bad operand type for unary -: {}",
            other.host_type()
        ))),
    }
}

/// JSON scalars become plain values; containers stay JSON.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::Str(s.clone()),
        other => Value::Json(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_host_division_and_modulo() {
        assert_eq!(
            arithmetic(&Value::Int(7), BinaryOp::Div, &Value::Int(2)).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            arithmetic(&Value::Int(-7), BinaryOp::Mod, &Value::Int(3)).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            arithmetic(&Value::Int(7), BinaryOp::Mod, &Value::Int(-3)).unwrap(),
            Value::Int(-2)
        );
        assert!(arithmetic(&Value::Int(1), BinaryOp::Div, &Value::Int(0)).is_err());
        assert!(arithmetic(&Value::Int(i64::MAX), BinaryOp::Add, &Value::Int(1)).is_err());
    }

    #[test]
    fn test_temporal_arithmetic() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        assert_eq!(
            arithmetic(&Value::Date(d), BinaryOp::Add, &Value::Interval(Duration::days(2)))
                .unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            arithmetic(
                &Value::Interval(Duration::hours(3)),
                BinaryOp::Div,
                &Value::Interval(Duration::hours(2))
            )
            .unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(
            arithmetic(&Value::Int(3), BinaryOp::Mul, &Value::Interval(Duration::minutes(1)))
                .unwrap(),
            Value::Interval(Duration::minutes(3))
        );
        assert!(arithmetic(&Value::Date(d), BinaryOp::Add, &Value::Date(d)).is_err());
    }

    #[test]
    fn test_null_comparisons() {
        assert!(compare(&Value::Null, CompareOp::Eq, &Value::Null).unwrap());
        assert!(compare(&Value::Int(1), CompareOp::Ne, &Value::Null).unwrap());
        assert!(matches!(
            compare(&Value::Int(1), CompareOp::Lt, &Value::Null),
            Err(Error::IllegalNullComparison(_))
        ));
    }

    #[test]
    fn test_cross_type_equality_is_false() {
        assert!(!compare(&Value::Int(1), CompareOp::Eq, &Value::from("1")).unwrap());
        assert!(compare(&Value::Int(1), CompareOp::Eq, &Value::Float(1.0)).unwrap());
        assert!(compare(&Value::Int(1), CompareOp::Lt, &Value::from("1")).is_err());
    }

    #[test]
    fn test_containment() {
        assert!(contains(&Value::from("hello"), &Value::from("ell")).unwrap());
        assert!(contains(&Value::from(vec![1, 2]), &Value::Float(2.0)).unwrap());
        assert!(!contains(&Value::List(vec![]), &Value::Int(1)).unwrap());
        assert!(contains(&Value::Int(3), &Value::Int(3)).is_err());
    }

    #[test]
    fn test_evaluate_over_rows() {
        let functions = FunctionRegistry::default();
        let kwargs = Kwargs::new();
        let person = row(&[("name", Value::from("Ada")), ("age", Value::Int(36))]);
        let rows = [&person];
        let eval = Evaluator::new(&rows, &kwargs, &functions);
        let r = Node::Param(0);

        let node = r.attr("age").gt(30) & r.attr("name").startswith("A");
        assert_eq!(eval.eval(&node).unwrap(), Value::Bool(true));

        let node = r.attr("name").lower().eq("ada");
        assert_eq!(eval.eval(&node).unwrap(), Value::Bool(true));

        let node = r.attr("missing").eq(1);
        assert!(matches!(eval.eval(&node), Err(Error::Mapping(_))));
    }

    #[test]
    fn test_row_null_is_unknown() {
        let functions = FunctionRegistry::standard();
        let kwargs = Kwargs::new();
        let person = row(&[("name", Value::from("Alice")), ("age", Value::Null)]);
        let rows = [&person];
        let eval = Evaluator::new(&rows, &kwargs, &functions);
        let r = Node::Param(0);

        assert_eq!(eval.eval(&r.attr("age").gt(3)).unwrap(), Value::Null);
        assert_eq!(eval.eval(&!r.attr("age").gt(3)).unwrap(), Value::Null);
        assert_eq!(eval.eval(&(r.attr("age") + 1).eq(2)).unwrap(), Value::Null);
        assert_eq!(
            eval.eval(&(r.attr("age").gt(3) | r.attr("name").startswith("Al"))).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval.eval(&(r.attr("age").gt(3) & r.attr("name").startswith("Bo"))).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval.eval(&(r.attr("age").gt(3) | r.attr("name").startswith("Bo"))).unwrap(),
            Value::Null
        );

        // NULL literals keep IS NULL semantics.
        assert_eq!(eval.eval(&r.attr("age").eq(Node::null())).unwrap(), Value::Bool(true));
        assert_eq!(eval.eval(&r.attr("age").ne(Node::null())).unwrap(), Value::Bool(false));
        assert!(matches!(
            eval.eval(&r.attr("age").lt(Node::null())),
            Err(Error::IllegalNullComparison(_))
        ));

        assert_eq!(eval.eval(&r.attr("age").is_in(vec![1i64, 2])).unwrap(), Value::Null);
        assert_eq!(
            eval.eval(&r.attr("age").is_in(vec![Some(1i64), None])).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            eval.eval(&r.attr("age").not_in(vec![Some(1i64), None])).unwrap(),
            Value::Bool(false)
        );
        let names = Node::tuple(vec![r.attr("age"), Node::constant("Alice")]);
        assert_eq!(eval.eval(&r.attr("name").is_in(names.clone())).unwrap(), Value::Bool(true));
        assert_eq!(eval.eval(&Node::constant("Bob").is_in(names)).unwrap(), Value::Null);
    }

    #[test]
    fn test_missing_kwarg_is_programmer_error() {
        let functions = FunctionRegistry::default();
        let kwargs = Kwargs::new();
        let eval = Evaluator::new(&[], &kwargs, &functions);
        let err = eval.eval(&Node::kwarg("x")).unwrap_err();
        assert!(err.is_programmer_error());
    }

    #[test]
    fn test_subscript_and_attributes() {
        let doc = Value::Json(serde_json::json!({"tags": ["a", "b"], "n": 2}));
        assert_eq!(subscript(&doc, &Value::from("n")).unwrap(), Value::Int(2));
        assert_eq!(
            subscript(&Value::from(vec![1, 2, 3]), &Value::Int(-1)).unwrap(),
            Value::Int(3)
        );
        let d = NaiveDate::from_ymd_opt(2020, 5, 17).unwrap();
        assert_eq!(attribute(&Value::Date(d), "month").unwrap(), Value::Int(5));
        assert!(attribute(&Value::Date(d), "hour").is_err());
    }
}
