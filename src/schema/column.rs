use crate::adapter::Adapter;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::types::{DatabaseType, DatabaseTypeSet, HostType, TypeHints, Value, WireValue};

/// A column with its resolved type.
///
/// `key` is how expressions and rows address the column; `name` is what
/// the database calls it. The two only differ when a column is renamed
/// in the database under an existing key.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub key: String,
    pub name: String,
    pub quoted_name: String,
    pub host_type: HostType,
    /// Owned by this column; cloning the column clones the type.
    pub dbtype: DatabaseType,
    pub default: Option<Value>,
    pub is_key: bool,
    pub autoincrement: bool,
    pub sequence_name: Option<String>,
}

impl Column {
    pub fn adapter(&self) -> &'static dyn Adapter {
        self.dbtype.adapter(self.host_type)
    }

    /// Encode `value` as a literal for this column.
    pub fn push(&self, value: &Value, dialect: &dyn Dialect) -> Result<String> {
        self.adapter().push(value, &self.dbtype, dialect)
    }

    /// Decode a driver value stored in this column.
    pub fn pull(&self, wire: &WireValue) -> Result<Value> {
        self.adapter().pull(wire, &self.dbtype)
    }
}

/// Declaration of a column, resolved into a [`Column`] by its table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub key: String,
    pub name: Option<String>,
    pub host_type: HostType,
    pub hints: TypeHints,
    pub is_key: bool,
    pub autoincrement: bool,
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(key: impl Into<String>, host_type: HostType) -> Self {
        Self {
            key: key.into(),
            name: None,
            host_type,
            hints: TypeHints::default(),
            is_key: false,
            autoincrement: false,
            default: None,
        }
    }

    pub fn hints(mut self, hints: TypeHints) -> Self {
        self.hints = hints;
        self
    }

    /// Database name, when it differs from the key.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_key = true;
        self
    }

    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub(crate) fn build(self, table: &str, dialect: &dyn Dialect, typeset: &DatabaseTypeSet) -> Result<Column> {
        let name = self.name.unwrap_or_else(|| self.key.clone());
        if dialect
            .reserved_column_names()
            .iter()
            .any(|r| r.eq_ignore_ascii_case(&name))
        {
            return Err(Error::ReservedIdentifier(format!(
                "{} is reserved by {} (table {})",
                name,
                dialect.name(),
                table
            )));
        }
        if self.autoincrement && self.host_type != HostType::Int {
            return Err(Error::programmer(format!(
                "autoincrement column {}.{} must hold int values, not {}",
                table, name, self.host_type
            )));
        }

        if self.autoincrement && self.default.as_ref().is_some_and(|d| !d.is_null()) {
            return Err(Error::programmer(format!(
                "autoincrement column {}.{} cannot also declare a default",
                table, name
            )));
        }

        let dbtype = typeset.resolve(self.host_type, &self.hints)?;
        let sequence_name = if self.autoincrement {
            dialect.sequence_name(table, &name)
        } else {
            None
        };
        let column = Column {
            key: self.key,
            quoted_name: dialect.quote_identifier(&name),
            name,
            host_type: self.host_type,
            dbtype,
            default: self.default.filter(|d| !d.is_null()),
            is_key: self.is_key,
            autoincrement: self.autoincrement,
            sequence_name,
        };
        if let Some(default) = &column.default {
            column.push(default, dialect)?;
        }
        Ok(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{GenericDialect, PostgresDialect, SqliteDialect};

    #[test]
    fn test_build_resolves_type_and_quotes_name() {
        let d = GenericDialect;
        let set = d.type_set();
        let c = ColumnDef::new("title", HostType::Str)
            .hints(TypeHints::bytes(40))
            .build("books", &d, &set)
            .unwrap();
        assert_eq!(c.quoted_name, "\"title\"");
        assert_eq!(c.dbtype.ddl_name(), "VARCHAR(40)");
        assert_eq!(c.push(&Value::from("it's"), &d).unwrap(), "'it''s'");
        assert_eq!(c.pull(&WireValue::from("x")).unwrap(), Value::from("x"));
    }

    #[test]
    fn test_reserved_names_rejected() {
        let d = SqliteDialect;
        let set = d.type_set();
        let err = ColumnDef::new("RowId", HostType::Int).build("t", &d, &set).unwrap_err();
        assert!(matches!(err, Error::ReservedIdentifier(_)));
        assert!(err.is_programmer_error());
    }

    #[test]
    fn test_autoincrement_sequence_name() {
        let d = PostgresDialect;
        let set = d.type_set();
        let c = ColumnDef::new("id", HostType::Int)
            .primary_key()
            .autoincrement()
            .build("people", &d, &set)
            .unwrap();
        assert_eq!(c.sequence_name.as_deref(), Some("people_id_seq"));

        let err = ColumnDef::new("id", HostType::Str)
            .autoincrement()
            .build("people", &d, &set)
            .unwrap_err();
        assert!(matches!(err, Error::Programmer(_)));
    }

    #[test]
    fn test_autoincrement_excludes_default() {
        let d = PostgresDialect;
        let set = d.type_set();
        let err = ColumnDef::new("id", HostType::Int)
            .autoincrement()
            .default_value(5i64)
            .build("people", &d, &set)
            .unwrap_err();
        assert!(matches!(err, Error::Programmer(_)));

        let c = ColumnDef::new("id", HostType::Int)
            .autoincrement()
            .build("people", &d, &set)
            .unwrap();
        let sql = d.column_definition(&c).unwrap();
        assert_eq!(sql.matches(" DEFAULT ").count(), 1, "{}", sql);

        let mut both = c.clone();
        both.default = Some(Value::Int(5));
        assert!(d.column_definition(&both).is_err());
    }

    #[test]
    fn test_default_must_encode() {
        let d = GenericDialect;
        let set = d.type_set();
        assert!(ColumnDef::new("n", HostType::Int)
            .default_value("seven")
            .build("t", &d, &set)
            .is_err());
        let c = ColumnDef::new("n", HostType::Int)
            .default_value(Value::Null)
            .build("t", &d, &set)
            .unwrap();
        assert_eq!(c.default, None);
    }
}
