/// Dialect plugin contract.
///
/// Everything that differs between databases goes through [`Dialect`]:
/// identifier and literal escaping, operator spellings, LIMIT syntax, DDL
/// text, discovery queries and the set of column types on offer. Default
/// method bodies produce ANSI SQL; each backend overrides what it must.
mod generic;
mod mysql;
mod postgres;
mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expr::{BinaryOp, CompareOp, SqlExpression};
use crate::schema::{Column, Index, Table};
use crate::types::DatabaseTypeSet;

pub use generic::GenericDialect;
pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Escape character used in every LIKE pattern this crate emits.
pub const LIKE_ESCAPE: char = '\\';

/// How a dialect spells row limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// `... LIMIT n OFFSET m`
    LimitOffset,
    /// `SELECT TOP n ...`; no offset support.
    Top,
}

/// Fields understood by [`Dialect::extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub fn keyword(self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "year" => Some(DatePart::Year),
            "month" => Some(DatePart::Month),
            "day" => Some(DatePart::Day),
            "hour" => Some(DatePart::Hour),
            "minute" => Some(DatePart::Minute),
            "second" => Some(DatePart::Second),
            _ => None,
        }
    }
}

/// Per-database specialization of SQL text generation.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Short identifier, part of compile-cache keys.
    fn name(&self) -> &str;

    /// The column types this database offers.
    fn type_set(&self) -> DatabaseTypeSet;

    /// Parser dialect used to syntax-check generated statements.
    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect>;

    // ---- identifiers and literals ----

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Boolean value literal, as stored in a column.
    fn bool_literal(&self, value: bool) -> String {
        (if value { "TRUE" } else { "FALSE" }).to_string()
    }

    /// Boolean in predicate position (WHERE, ON, AND/OR operands).
    fn boolean_clause(&self, value: bool) -> String {
        self.bool_literal(value)
    }

    fn bytes_literal(&self, data: &[u8]) -> String {
        format!("X'{}'", hex_encode(data))
    }

    fn date_literal(&self, date: NaiveDate) -> String {
        format!("DATE '{}'", date.format("%Y-%m-%d"))
    }

    fn time_literal(&self, time: NaiveTime) -> String {
        format!("TIME '{}'", time.format("%H:%M:%S%.f"))
    }

    fn datetime_literal(&self, datetime: NaiveDateTime) -> String {
        format!("TIMESTAMP '{}'", datetime.format("%Y-%m-%d %H:%M:%S%.f"))
    }

    /// Native interval literal, if the database has an interval type.
    fn interval_literal(&self, _interval: chrono::Duration) -> Option<String> {
        None
    }

    /// Literal for serialized JSON stored in a native JSON column.
    fn json_literal(&self, json: &str) -> String {
        self.quote_string(json)
    }

    // ---- operators ----

    fn compare(&self, lhs: &str, op: CompareOp, rhs: &str) -> String {
        format!("{} {} {}", lhs, op.sql(), rhs)
    }

    /// Case- and accent-sensitive string comparison.
    fn text_compare(&self, lhs: &str, op: CompareOp, rhs: &str) -> String {
        self.compare(lhs, op, rhs)
    }

    fn concat(&self, lhs: &str, rhs: &str) -> String {
        format!("({} || {})", lhs, rhs)
    }

    fn arithmetic(&self, lhs: &str, op: BinaryOp, rhs: &str) -> String {
        format!("({} {} {})", lhs, op.symbol(), rhs)
    }

    /// Division of two integers yielding a float.
    fn true_divide(&self, lhs: &str, rhs: &str) -> String {
        format!("(CAST({} AS DOUBLE PRECISION) / {})", lhs, rhs)
    }

    /// Integer modulo with the sign of the divisor.
    fn floor_modulo(&self, lhs: &str, rhs: &str) -> String {
        format!("((({} % {}) + {}) % {})", lhs, rhs, rhs, rhs)
    }

    /// Date/time arithmetic involving at least one temporal operand.
    /// `None` when the database cannot express it exactly.
    fn date_arithmetic(
        &self,
        _lhs: &SqlExpression,
        _op: BinaryOp,
        _rhs: &SqlExpression,
    ) -> Option<String> {
        None
    }

    /// Whether `LOWER()` and case-insensitive LIKE fold case beyond ASCII.
    fn folds_unicode_case(&self) -> bool {
        true
    }

    /// Render a LIKE test. Returns the SQL and whether it matches exactly
    /// the host semantics (`false` means it may match extra rows).
    fn like(&self, expr: &str, pattern: &str, case_insensitive: bool) -> (String, bool) {
        let escape = self.quote_string(&LIKE_ESCAPE.to_string());
        if case_insensitive {
            (
                format!("LOWER({}) LIKE LOWER({}) ESCAPE {}", expr, pattern, escape),
                true,
            )
        } else {
            (format!("{} LIKE {} ESCAPE {}", expr, pattern, escape), true)
        }
    }

    /// Escape LIKE metacharacters inside an SQL string expression.
    fn escape_like_sql(&self, expr: &str) -> String {
        let esc = self.quote_string(&LIKE_ESCAPE.to_string());
        let esc2 = self.quote_string(&format!("{0}{0}", LIKE_ESCAPE));
        format!(
            "REPLACE(REPLACE(REPLACE({}, {}, {}), {}, {}), {}, {})",
            expr,
            esc,
            esc2,
            self.quote_string("%"),
            self.quote_string(&format!("{}%", LIKE_ESCAPE)),
            self.quote_string("_"),
            self.quote_string(&format!("{}_", LIKE_ESCAPE)),
        )
    }

    fn lower(&self, expr: &str) -> String {
        format!("LOWER({})", expr)
    }

    fn upper(&self, expr: &str) -> String {
        format!("UPPER({})", expr)
    }

    fn length(&self, expr: &str) -> String {
        format!("CHAR_LENGTH({})", expr)
    }

    fn now(&self) -> String {
        "CURRENT_TIMESTAMP".to_string()
    }

    fn today(&self) -> String {
        "CURRENT_DATE".to_string()
    }

    fn extract(&self, part: DatePart, expr: &str) -> String {
        match part {
            DatePart::Second => format!("FLOOR(EXTRACT(SECOND FROM {}))", expr),
            _ => format!("EXTRACT({} FROM {})", part.keyword(), expr),
        }
    }

    // ---- statements ----

    fn limit_style(&self) -> LimitStyle {
        LimitStyle::LimitOffset
    }

    /// Trailing LIMIT/OFFSET clause for [`LimitStyle::LimitOffset`].
    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (Some(l), Some(o)) => Some(format!("LIMIT {} OFFSET {}", l, o)),
            (Some(l), None) => Some(format!("LIMIT {}", l)),
            (None, Some(o)) => Some(format!("OFFSET {}", o)),
            (None, None) => None,
        }
    }

    fn supports_right_join(&self) -> bool {
        true
    }

    fn supports_returning(&self) -> bool {
        false
    }

    /// Query for the key generated by the last INSERT on this session,
    /// for databases without RETURNING.
    fn last_insert_id_sql(&self) -> Option<String> {
        None
    }

    /// INSERT of a row made only of defaults.
    fn empty_insert_sql(&self, quoted_table: &str) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", quoted_table)
    }

    // ---- DDL ----

    /// Column names the database keeps for itself.
    fn reserved_column_names(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether primary key columns need an explicit index.
    fn index_primary_keys(&self) -> bool {
        false
    }

    /// Name of the sequence backing an autoincrement column, for databases
    /// that implement autoincrement through sequences.
    fn sequence_name(&self, _table: &str, _column: &str) -> Option<String> {
        None
    }

    fn create_sequence_sql(&self, name: &str) -> String {
        format!("CREATE SEQUENCE {}", self.quote_identifier(name))
    }

    fn drop_sequence_sql(&self, name: &str) -> String {
        format!("DROP SEQUENCE {}", self.quote_identifier(name))
    }

    /// Column default drawing from a sequence.
    fn sequence_default(&self, name: &str) -> String {
        format!("nextval({})", self.quote_string(&self.quote_identifier(name)))
    }

    /// Suffix for autoincrement columns not backed by a sequence.
    fn autoincrement_clause(&self) -> Option<&'static str> {
        Some(" GENERATED BY DEFAULT AS IDENTITY")
    }

    /// True if the primary key is declared inline on a column rather than
    /// as a table constraint.
    fn inline_primary_key(&self, _table: &Table) -> bool {
        false
    }

    fn column_definition(&self, column: &Column) -> Result<String> {
        let default = column.default.as_ref().filter(|d| !d.is_null());
        if column.autoincrement && default.is_some() {
            return Err(Error::programmer(format!(
                "column {} is autoincrement and has a default",
                column.name
            )));
        }
        let mut def = format!("{} {}", column.quoted_name, column.dbtype.ddl_name());
        if let Some(sequence) = &column.sequence_name {
            def.push_str(" DEFAULT ");
            def.push_str(&self.sequence_default(sequence));
        } else if column.autoincrement {
            if let Some(clause) = self.autoincrement_clause() {
                def.push_str(clause);
            }
        }
        if let Some(default) = default {
            def.push_str(" DEFAULT ");
            def.push_str(&column.push(default, self.as_dyn())?);
        }
        Ok(def)
    }

    fn create_table_sql(&self, table: &Table) -> Result<Vec<String>> {
        let mut statements: Vec<String> = table
            .columns()
            .filter_map(|c| c.sequence_name.as_deref())
            .map(|s| self.create_sequence_sql(s))
            .collect();

        let mut defs = table
            .columns()
            .map(|c| self.column_definition(c))
            .collect::<Result<Vec<_>>>()?;
        let keys: Vec<&str> = table
            .key_columns()
            .map(|c| c.quoted_name.as_str())
            .collect();
        if !keys.is_empty() && !self.inline_primary_key(table) {
            defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }
        statements.push(format!(
            "CREATE TABLE {} ({})",
            table.quoted_name,
            defs.join(", ")
        ));

        statements.extend(table.indices().iter().map(|i| self.create_index_sql(i)));
        Ok(statements)
    }

    fn drop_table_sql(&self, table: &Table) -> Vec<String> {
        let mut statements = vec![format!("DROP TABLE {}", table.quoted_name)];
        statements.extend(
            table
                .columns()
                .filter_map(|c| c.sequence_name.as_deref())
                .map(|s| self.drop_sequence_sql(s)),
        );
        statements
    }

    fn rename_table_sql(&self, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(old),
            self.quote_identifier(new)
        )
    }

    fn add_column_sql(&self, table: &Table, column: &Column) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        if let Some(sequence) = &column.sequence_name {
            statements.push(self.create_sequence_sql(sequence));
        }
        statements.push(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table.quoted_name,
            self.column_definition(column)?
        ));
        Ok(statements)
    }

    fn drop_column_sql(&self, table: &Table, column: &Column) -> Vec<String> {
        let mut statements = vec![format!(
            "ALTER TABLE {} DROP COLUMN {}",
            table.quoted_name, column.quoted_name
        )];
        if let Some(sequence) = &column.sequence_name {
            statements.push(self.drop_sequence_sql(sequence));
        }
        statements
    }

    fn rename_column_sql(&self, table: &Table, column: &Column, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            table.quoted_name,
            column.quoted_name,
            self.quote_identifier(new_name)
        )
    }

    fn create_index_sql(&self, index: &Index) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            index.quoted_name,
            self.quote_identifier(&index.table_name),
            self.quote_identifier(&index.column_name)
        )
    }

    fn drop_index_sql(&self, index: &Index) -> String {
        format!("DROP INDEX {}", index.quoted_name)
    }

    fn create_view_sql(&self, name: &str, select: &str) -> String {
        format!("CREATE VIEW {} AS {}", self.quote_identifier(name), select)
    }

    fn drop_view_sql(&self, name: &str) -> String {
        format!("DROP VIEW {}", self.quote_identifier(name))
    }

    // ---- discovery ----
    //
    // Discovery queries return a normalized shape:
    //   tables:  (name)
    //   columns: (name, type, length, precision, scale, is_key, default, autoincrement)
    //   indices: (index name, column name, unique)

    fn discover_tables_sql(&self) -> String {
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = CURRENT_SCHEMA AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
            .to_string()
    }

    fn discover_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT column_name, data_type, character_maximum_length, numeric_precision, \
             numeric_scale, 0, column_default, 0 \
             FROM information_schema.columns \
             WHERE table_schema = CURRENT_SCHEMA AND table_name = {} \
             ORDER BY ordinal_position",
            self.quote_string(table)
        )
    }

    /// `None` when the database has no standard way to list indices.
    fn discover_indices_sql(&self, _table: &str) -> Option<String> {
        None
    }

    /// Upcast helper for default methods that need `&dyn Dialect`.
    fn as_dyn(&self) -> &dyn Dialect;
}

/// Built-in dialects, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Generic,
    #[serde(alias = "postgresql")]
    Postgres,
    Sqlite,
    #[serde(alias = "mariadb")]
    Mysql,
}

impl DialectKind {
    pub fn build(self) -> Arc<dyn Dialect> {
        match self {
            DialectKind::Generic => Arc::new(GenericDialect),
            DialectKind::Postgres => Arc::new(PostgresDialect),
            DialectKind::Sqlite => Arc::new(SqliteDialect),
            DialectKind::Mysql => Arc::new(MySqlDialect),
        }
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" | "ansi" => Ok(DialectKind::Generic),
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            "mysql" | "mariadb" => Ok(DialectKind::Mysql),
            other => Err(format!("unknown dialect: {}", other)),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialectKind::Generic => "generic",
            DialectKind::Postgres => "postgres",
            DialectKind::Sqlite => "sqlite",
            DialectKind::Mysql => "mysql",
        };
        f.write_str(name)
    }
}

/// Escape LIKE metacharacters in a literal fragment.
pub fn escape_like(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

pub(crate) fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

pub(crate) fn hex_decode(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_metacharacters() {
        assert_eq!(escape_like("50%"), "50\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_hex_round_trip() {
        let data = vec![0u8, 1, 0xab, 0xff];
        assert_eq!(hex_encode(&data), "0001abff");
        assert_eq!(hex_decode("0001abff"), Some(data));
        assert_eq!(hex_decode("abc"), None);
        assert_eq!(hex_decode("zz"), None);
    }

    #[test]
    fn test_dialect_kind_parsing() {
        assert_eq!("PostgreSQL".parse::<DialectKind>(), Ok(DialectKind::Postgres));
        assert_eq!("sqlite3".parse::<DialectKind>(), Ok(DialectKind::Sqlite));
        assert!("oracle".parse::<DialectKind>().is_err());
        assert_eq!(DialectKind::Mysql.build().name(), "mysql");
    }

    #[test]
    fn test_date_part_names() {
        assert_eq!(DatePart::from_name("year"), Some(DatePart::Year));
        assert_eq!(DatePart::from_name("week"), None);
        assert_eq!(DatePart::Minute.keyword(), "MINUTE");
    }
}
