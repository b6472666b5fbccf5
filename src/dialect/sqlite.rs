use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::expr::{BinaryOp, SqlExpression};
use crate::schema::{Column, Table};
use crate::types::{DatabaseType, DatabaseTypeSet, FixedRange, HostType, TypeFamily};

use super::{DatePart, Dialect, LIKE_ESCAPE};

/// SQLite 3.
///
/// Booleans are integers, temporal values are ISO-8601 text and there is
/// one integer type. LIKE folds ASCII case, so a case-sensitive LIKE can
/// only over-approximate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    fn seconds_modifier(&self, seconds: &str, negate: bool) -> String {
        let sign = if negate { "-" } else { "" };
        format!("printf('%+.6f seconds', {}{})", sign, seconds)
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn type_set(&self) -> DatabaseTypeSet {
        DatabaseTypeSet::new("sqlite")
            .with(DatabaseType::new("BOOLEAN", TypeFamily::Boolean).with_synonyms(&["bool"]))
            .with(
                DatabaseType::new("INTEGER", TypeFamily::Integer)
                    .with_synonyms(&["int", "bigint", "smallint", "tinyint"])
                    .fixed_bytes(8)
                    .with_range(FixedRange::signed_bytes(8)),
            )
            .with(
                DatabaseType::new("REAL", TypeFamily::Float)
                    .with_synonyms(&["double", "float", "double precision"])
                    .fixed_precision(53),
            )
            .with(
                DatabaseType::new("NUMERIC", TypeFamily::Numeric)
                    .with_synonyms(&["decimal"])
                    .adjustable_precision(1000, 1000),
            )
            .with(
                DatabaseType::new("VARCHAR", TypeFamily::Varchar)
                    .with_synonyms(&["character varying", "nvarchar"])
                    .adjustable_bytes(1 << 30, 255),
            )
            .with(
                DatabaseType::new("TEXT", TypeFamily::Varchar)
                    .with_synonyms(&["clob"])
                    .fixed_bytes(1 << 30),
            )
            .with(DatabaseType::new("BLOB", TypeFamily::Binary).fixed_bytes(1 << 30))
            .with(DatabaseType::new("DATE", TypeFamily::Date))
            .with(DatabaseType::new("TIME", TypeFamily::Time))
            .with(DatabaseType::new("DATETIME", TypeFamily::DateTime).with_synonyms(&["timestamp"]))
    }

    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        Box::new(sqlparser::dialect::SQLiteDialect {})
    }

    fn bool_literal(&self, value: bool) -> String {
        (if value { "1" } else { "0" }).to_string()
    }

    fn boolean_clause(&self, value: bool) -> String {
        (if value { "1=1" } else { "1=0" }).to_string()
    }

    fn date_literal(&self, date: NaiveDate) -> String {
        self.quote_string(&date.format("%Y-%m-%d").to_string())
    }

    fn time_literal(&self, time: NaiveTime) -> String {
        self.quote_string(&time.format("%H:%M:%S%.f").to_string())
    }

    fn datetime_literal(&self, datetime: NaiveDateTime) -> String {
        self.quote_string(&datetime.format("%Y-%m-%d %H:%M:%S%.f").to_string())
    }

    fn true_divide(&self, lhs: &str, rhs: &str) -> String {
        format!("(CAST({} AS REAL) / {})", lhs, rhs)
    }

    fn date_arithmetic(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
    ) -> Option<String> {
        // Only date +/- interval is exact: date() truncates the way the
        // host does, datetime() drops fractional seconds.
        match (lhs.host_type, op, rhs.host_type) {
            (HostType::Date, BinaryOp::Add | BinaryOp::Sub, HostType::Interval) => Some(format!(
                "date({}, {})",
                lhs.sql,
                self.seconds_modifier(&rhs.sql, op == BinaryOp::Sub)
            )),
            (HostType::Interval, BinaryOp::Add, HostType::Date) => Some(format!(
                "date({}, {})",
                rhs.sql,
                self.seconds_modifier(&lhs.sql, false)
            )),
            (HostType::Date, BinaryOp::Sub, HostType::Date) => Some(format!(
                "(CAST((julianday({}) - julianday({})) AS INTEGER) * 86400)",
                lhs.sql, rhs.sql
            )),
            _ => None,
        }
    }

    fn folds_unicode_case(&self) -> bool {
        false
    }

    fn like(&self, expr: &str, pattern: &str, case_insensitive: bool) -> (String, bool) {
        let sql = format!(
            "{} LIKE {} ESCAPE {}",
            expr,
            pattern,
            self.quote_string(&LIKE_ESCAPE.to_string())
        );
        (sql, case_insensitive)
    }

    fn length(&self, expr: &str) -> String {
        format!("LENGTH({})", expr)
    }

    fn now(&self) -> String {
        "datetime('now', 'localtime')".to_string()
    }

    fn today(&self) -> String {
        "date('now', 'localtime')".to_string()
    }

    fn extract(&self, part: DatePart, expr: &str) -> String {
        let code = match part {
            DatePart::Year => "%Y",
            DatePart::Month => "%m",
            DatePart::Day => "%d",
            DatePart::Hour => "%H",
            DatePart::Minute => "%M",
            DatePart::Second => "%S",
        };
        format!("CAST(strftime('{}', {}) AS INTEGER)", code, expr)
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, Some(o)) => Some(format!("LIMIT -1 OFFSET {}", o)),
            (Some(l), Some(o)) => Some(format!("LIMIT {} OFFSET {}", l, o)),
            (Some(l), None) => Some(format!("LIMIT {}", l)),
            (None, None) => None,
        }
    }

    fn supports_right_join(&self) -> bool {
        false
    }

    fn last_insert_id_sql(&self) -> Option<String> {
        Some("SELECT last_insert_rowid()".to_string())
    }

    fn reserved_column_names(&self) -> &'static [&'static str] {
        &["rowid", "oid", "_rowid_"]
    }

    fn autoincrement_clause(&self) -> Option<&'static str> {
        None
    }

    fn inline_primary_key(&self, table: &Table) -> bool {
        let keys: Vec<&Column> = table.key_columns().collect();
        keys.len() == 1 && keys[0].autoincrement
    }

    fn column_definition(&self, column: &Column) -> crate::error::Result<String> {
        // An autoincrement key must be spelled exactly this way.
        if column.autoincrement && column.is_key {
            return Ok(format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                column.quoted_name
            ));
        }
        let mut def = format!("{} {}", column.quoted_name, column.dbtype.ddl_name());
        if let Some(default) = column.default.as_ref().filter(|d| !d.is_null()) {
            def.push_str(" DEFAULT ");
            def.push_str(&column.push(default, self)?);
        }
        Ok(def)
    }

    fn discover_tables_sql(&self) -> String {
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
         ORDER BY name"
            .to_string()
    }

    fn discover_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT name, type, NULL, NULL, NULL, pk, dflt_value, \
                CASE WHEN pk = 1 AND upper(type) = 'INTEGER' THEN 1 ELSE 0 END \
             FROM pragma_table_info({}) ORDER BY cid",
            self.quote_string(table)
        )
    }

    fn discover_indices_sql(&self, table: &str) -> Option<String> {
        Some(format!(
            "SELECT il.name, ii.name, il.\"unique\" \
             FROM pragma_index_list({}) AS il, pragma_index_info(il.name) AS ii \
             WHERE il.origin = 'c' ORDER BY il.name",
            self.quote_string(table)
        ))
    }

    fn as_dyn(&self) -> &dyn Dialect {
        self
    }
}
