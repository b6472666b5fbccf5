use std::fmt;

use crate::adapter::Adapter;
use crate::types::{DatabaseType, HostType, Value};

/// A compiled SQL fragment with its inferred type.
///
/// `dbtype` is authoritative: any further literal encoded against this
/// fragment goes through `dbtype.adapter(host_type)`. `constant` is set
/// only when the fragment is provably a compile-time constant.
#[derive(Debug, Clone)]
pub struct SqlExpression {
    pub sql: String,
    /// Output alias when the fragment is projected.
    pub name: Option<String>,
    pub dbtype: DatabaseType,
    pub host_type: HostType,
    pub constant: Option<Value>,
    pub aggregate: bool,
}

impl SqlExpression {
    pub fn new(sql: impl Into<String>, host_type: HostType, dbtype: DatabaseType) -> Self {
        Self {
            sql: sql.into(),
            name: None,
            dbtype,
            host_type,
            constant: None,
            aggregate: false,
        }
    }

    /// A literal whose value is known at compile time.
    pub fn constant(sql: impl Into<String>, value: Value, dbtype: DatabaseType) -> Self {
        let host_type = value.host_type();
        Self {
            sql: sql.into(),
            name: None,
            dbtype,
            host_type,
            constant: Some(value),
            aggregate: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_aggregate(mut self, aggregate: bool) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }

    pub fn is_null(&self) -> bool {
        matches!(self.constant, Some(Value::Null))
    }

    pub fn adapter(&self) -> &'static dyn Adapter {
        self.dbtype.adapter(self.host_type)
    }
}

impl PartialEq for SqlExpression {
    fn eq(&self, other: &Self) -> bool {
        self.sql == other.sql
    }
}

impl Eq for SqlExpression {}

impl fmt::Display for SqlExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeFamily;

    #[test]
    fn test_equality_is_by_sql_text() {
        let int = DatabaseType::new("INTEGER", TypeFamily::Integer);
        let text = DatabaseType::new("TEXT", TypeFamily::Varchar);
        let a = SqlExpression::new("\"age\"", HostType::Int, int);
        let b = SqlExpression::new("\"age\"", HostType::Str, text).named("age");
        assert_eq!(a, b);
    }

    #[test]
    fn test_constant_carries_host_type() {
        let int = DatabaseType::new("INTEGER", TypeFamily::Integer);
        let c = SqlExpression::constant("3", Value::Int(3), int);
        assert!(c.is_constant());
        assert_eq!(c.host_type, HostType::Int);
        assert!(!c.aggregate);
    }
}
