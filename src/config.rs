//! TOML configuration: runtime settings and schema definition files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::ConnectionConfig;
use crate::dialect::{Dialect, DialectKind};
use crate::error::{Error, Result};
use crate::expr::DEFAULT_CACHE_CAPACITY;
use crate::schema::{ColumnDef, Table};
use crate::types::{DatabaseTypeSet, HostType, TypeHints, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub dialect: DialectKind,
    pub cache_capacity: usize,
    /// Fail imperfect SELECT restrictions instead of re-filtering rows.
    pub strict: bool,
    pub connections: Vec<ConnectionConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            strict: false,
            connections: Vec::new(),
        }
    }
}

impl Settings {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sqlsieve")
            .join("config.toml")
    }

    /// Settings from the default location, or defaults if there is no file.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file; using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(toml::from_str(&content)?)
    }

    /// The connection called `name`, or the first one when `name` is None.
    pub fn connection(&self, name: Option<&str>) -> Result<&ConnectionConfig> {
        match name {
            Some(name) => self
                .connections
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| Error::Config(format!("no connection named {}", name))),
            None => self
                .connections
                .first()
                .ok_or_else(|| Error::Config("no connections configured".into())),
        }
    }
}

/// A schema definition file.
///
/// ```toml
/// [[tables]]
/// name = "people"
///
/// [[tables.columns]]
/// name = "id"
/// type = "int"
/// key = true
/// autoincrement = true
///
/// [[tables.columns]]
/// name = "name"
/// type = "str"
/// bytes = 64
///
/// [[tables.indices]]
/// column = "name"
/// unique = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaFile {
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSpec {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default)]
    pub indices: Vec<IndexSpec>,
    #[serde(default)]
    pub references: Vec<ReferenceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub host_type: HostType,
    pub bytes: Option<u64>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub signed: Option<bool>,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub autoincrement: bool,
    pub default: Option<toml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSpec {
    pub column: String,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceSpec {
    pub column: String,
    pub table: String,
    pub foreign_column: String,
}

impl SchemaFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build the declared tables, in file order. References may point at
    /// tables declared later in the file.
    pub fn into_tables(self, dialect: &dyn Dialect, typeset: &DatabaseTypeSet) -> Result<Vec<Table>> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for spec in &self.tables {
            let mut table = Table::new(dialect, spec.name.clone());
            for column in &spec.columns {
                table.define(dialect, typeset, column.to_def()?)?;
            }
            for index in &spec.indices {
                table.define_index(dialect, &index.column, index.unique)?;
            }
            tables.push(table);
        }

        for (i, spec) in self.tables.iter().enumerate() {
            for reference in &spec.references {
                let far = tables
                    .iter()
                    .find(|t| t.name == reference.table)
                    .cloned()
                    .ok_or_else(|| Error::mapping(format!("reference to unknown table {}", reference.table)))?;
                tables[i].reference(&reference.column, &far, &reference.foreign_column)?;
            }
        }
        Ok(tables)
    }
}

impl ColumnSpec {
    fn to_def(&self) -> Result<ColumnDef> {
        let hints = TypeHints {
            bytes: self.bytes,
            precision: self.precision,
            scale: self.scale,
            signed: self.signed,
            explicit: None,
        };
        let mut def = ColumnDef::new(self.name.clone(), self.host_type).hints(hints);
        if self.key {
            def = def.primary_key();
        }
        if self.autoincrement {
            def = def.autoincrement();
        }
        if let Some(default) = &self.default {
            def = def.default_value(toml_value(default)?);
        }
        Ok(def)
    }
}

fn toml_value(value: &toml::Value) -> Result<Value> {
    Ok(match value {
        toml::Value::String(s) => Value::from(s.as_str()),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Array(items) => Value::List(items.iter().map(toml_value).collect::<Result<_>>()?),
        toml::Value::Datetime(dt) => {
            let text = dt.to_string();
            match (dt.date.is_some(), dt.time.is_some()) {
                (true, true) => chrono::NaiveDateTime::parse_from_str(&text.replace('T', " "), "%Y-%m-%d %H:%M:%S%.f")
                    .map(Value::from)
                    .map_err(|e| Error::Config(format!("default {}: {}", text, e)))?,
                (true, false) => chrono::NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                    .map(Value::from)
                    .map_err(|e| Error::Config(format!("default {}: {}", text, e)))?,
                _ => chrono::NaiveTime::parse_from_str(&text, "%H:%M:%S%.f")
                    .map(Value::from)
                    .map_err(|e| Error::Config(format!("default {}: {}", text, e)))?,
            }
        }
        toml::Value::Table(_) => {
            return Err(Error::Config("table values cannot be column defaults".into()));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;

    const SCHEMA: &str = r#"
        [[tables]]
        name = "animals"

        [[tables.columns]]
        name = "id"
        type = "int"
        key = true
        autoincrement = true

        [[tables.columns]]
        name = "zoo_id"
        type = "int"

        [[tables.columns]]
        name = "born"
        type = "date"
        default = 2020-01-31

        [[tables.references]]
        column = "zoo_id"
        table = "zoos"
        foreign_column = "id"

        [[tables]]
        name = "zoos"

        [[tables.columns]]
        name = "id"
        type = "int"
        key = true

        [[tables.columns]]
        name = "name"
        type = "string"
        bytes = 80
        default = "unnamed"

        [[tables.indices]]
        column = "name"
        unique = true
    "#;

    #[test]
    fn test_schema_file_builds_tables() {
        let d = PostgresDialect;
        let set = d.type_set();
        let tables = SchemaFile::parse(SCHEMA).unwrap().into_tables(&d, &set).unwrap();
        assert_eq!(tables.len(), 2);

        let animals = &tables[0];
        assert_eq!(animals.references_to("zoos").count(), 1);
        assert_eq!(
            animals.column("born").unwrap().default,
            Some(Value::from(chrono::NaiveDate::from_ymd_opt(2020, 1, 31).unwrap()))
        );
        assert!(animals.column("id").unwrap().autoincrement);

        let zoos = &tables[1];
        assert_eq!(zoos.column("name").unwrap().host_type, HostType::Str);
        assert_eq!(zoos.indices()[0].name, "zoos_name_idx");
    }

    #[test]
    fn test_unknown_reference_target() {
        let d = PostgresDialect;
        let text = r#"
            [[tables]]
            name = "a"
            [[tables.columns]]
            name = "b_id"
            type = "int"
            [[tables.references]]
            column = "b_id"
            table = "b"
            foreign_column = "id"
        "#;
        let err = SchemaFile::parse(text).unwrap().into_tables(&d, &d.type_set()).unwrap_err();
        assert!(matches!(err, Error::Mapping(_)));
    }

    #[test]
    fn test_settings_defaults_and_lookup() {
        let missing = Settings::load_from(Path::new("/nonexistent/sqlsieve.toml")).unwrap();
        assert_eq!(missing, Settings::default());
        assert!(missing.connection(None).is_err());

        let settings: Settings = toml::from_str(
            r#"
            dialect = "postgresql"
            strict = true

            [[connections]]
            name = "prod"
            host = "db.internal"
            port = 5433
            database = "app"
            username = "app"
            ssl_mode = "VerifyFull"
            "#,
        )
        .unwrap();
        assert_eq!(settings.dialect, DialectKind::Postgres);
        assert_eq!(settings.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert_eq!(settings.connection(Some("prod")).unwrap().port, 5433);
        assert_eq!(settings.connection(None).unwrap().name, "prod");
        assert!(matches!(settings.connection(Some("dev")), Err(Error::Config(_))));
    }
}
