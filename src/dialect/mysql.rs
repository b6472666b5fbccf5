use crate::expr::{BinaryOp, CompareOp, SqlExpression};
use crate::schema::Index;
use crate::types::{DatabaseType, DatabaseTypeSet, FixedRange, HostType, TypeFamily};

use super::{Dialect, LIKE_ESCAPE};

/// MySQL / MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    fn add_micros(&self, datetime: &str, seconds: &str, negate: bool) -> String {
        let sign = if negate { "-" } else { "" };
        format!(
            "TIMESTAMPADD(MICROSECOND, {}ROUND({} * 1000000), {})",
            sign, seconds, datetime
        )
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn type_set(&self) -> DatabaseTypeSet {
        let int = |name: &str, bytes: u32| {
            DatabaseType::new(name, TypeFamily::Integer)
                .fixed_bytes(u64::from(bytes))
                .with_range(FixedRange::signed_bytes(bytes))
        };
        DatabaseTypeSet::new("mysql")
            .with(
                DatabaseType::new("BOOLEAN", TypeFamily::Boolean)
                    .with_synonyms(&["bool", "tinyint(1)"]),
            )
            .with(int("TINYINT", 1))
            .with(int("SMALLINT", 2))
            .with(int("MEDIUMINT", 3))
            .with(int("INT", 4).with_synonyms(&["integer"]))
            .with(int("BIGINT", 8))
            .with(DatabaseType::new("FLOAT", TypeFamily::Float).fixed_precision(24))
            .with(
                DatabaseType::new("DOUBLE", TypeFamily::Float)
                    .with_synonyms(&["double precision", "real"])
                    .fixed_precision(53),
            )
            .with(
                DatabaseType::new("DECIMAL", TypeFamily::Numeric)
                    .with_synonyms(&["numeric"])
                    .adjustable_precision(65, 30),
            )
            .with(DatabaseType::new("VARCHAR", TypeFamily::Varchar).adjustable_bytes(16383, 255))
            .with(DatabaseType::new("TEXT", TypeFamily::Varchar).fixed_bytes(65_535))
            .with(DatabaseType::new("MEDIUMTEXT", TypeFamily::Varchar).fixed_bytes(16_777_215))
            .with(DatabaseType::new("LONGTEXT", TypeFamily::Varchar).fixed_bytes(4_294_967_295))
            .with(DatabaseType::new("VARBINARY", TypeFamily::Binary).adjustable_bytes(65_535, 255))
            .with(DatabaseType::new("MEDIUMBLOB", TypeFamily::Binary).fixed_bytes(16_777_215))
            .with(DatabaseType::new("LONGBLOB", TypeFamily::Binary).fixed_bytes(4_294_967_295))
            .with(DatabaseType::new("DATE", TypeFamily::Date))
            .with(DatabaseType::new("TIME(6)", TypeFamily::Time).with_synonyms(&["time"]))
            .with(
                DatabaseType::new("DATETIME(6)", TypeFamily::DateTime)
                    .with_synonyms(&["datetime", "timestamp"]),
            )
            .with(DatabaseType::new("JSON", TypeFamily::Json))
    }

    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        Box::new(sqlparser::dialect::MySqlDialect {})
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn quote_string(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn text_compare(&self, lhs: &str, op: CompareOp, rhs: &str) -> String {
        // Default collations ignore case and trailing spaces.
        format!("CAST({} AS BINARY) {} CAST({} AS BINARY)", lhs, op.sql(), rhs)
    }

    fn concat(&self, lhs: &str, rhs: &str) -> String {
        format!("CONCAT({}, {})", lhs, rhs)
    }

    fn true_divide(&self, lhs: &str, rhs: &str) -> String {
        format!("({} / {})", lhs, rhs)
    }

    fn date_arithmetic(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
    ) -> Option<String> {
        use HostType::*;
        let (l, r) = (lhs.sql.as_str(), rhs.sql.as_str());
        let sub = op == BinaryOp::Sub;
        match (lhs.host_type, op, rhs.host_type) {
            (DateTime, BinaryOp::Add | BinaryOp::Sub, Interval) => Some(self.add_micros(l, r, sub)),
            (Interval, BinaryOp::Add, DateTime) => Some(self.add_micros(r, l, false)),
            (Date, BinaryOp::Add | BinaryOp::Sub, Interval) => {
                Some(format!("DATE({})", self.add_micros(l, r, sub)))
            }
            (Interval, BinaryOp::Add, Date) => {
                Some(format!("DATE({})", self.add_micros(r, l, false)))
            }
            (DateTime, BinaryOp::Sub, DateTime) => Some(format!(
                "(TIMESTAMPDIFF(MICROSECOND, {}, {}) / 1000000)",
                r, l
            )),
            (Date, BinaryOp::Sub, Date) => Some(format!("(DATEDIFF({}, {}) * 86400)", l, r)),
            _ => None,
        }
    }

    fn like(&self, expr: &str, pattern: &str, case_insensitive: bool) -> (String, bool) {
        let escape = self.quote_string(&LIKE_ESCAPE.to_string());
        if case_insensitive {
            (
                format!("LOWER({}) LIKE LOWER({}) ESCAPE {}", expr, pattern, escape),
                true,
            )
        } else {
            (
                format!("CAST({} AS BINARY) LIKE {} ESCAPE {}", expr, pattern, escape),
                true,
            )
        }
    }

    fn now(&self) -> String {
        "NOW(6)".to_string()
    }

    fn today(&self) -> String {
        "CURDATE()".to_string()
    }

    fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        match (limit, offset) {
            (None, Some(o)) => Some(format!("LIMIT 18446744073709551615 OFFSET {}", o)),
            (Some(l), Some(o)) => Some(format!("LIMIT {} OFFSET {}", l, o)),
            (Some(l), None) => Some(format!("LIMIT {}", l)),
            (None, None) => None,
        }
    }

    fn last_insert_id_sql(&self) -> Option<String> {
        Some("SELECT LAST_INSERT_ID()".to_string())
    }

    fn empty_insert_sql(&self, quoted_table: &str) -> String {
        format!("INSERT INTO {} () VALUES ()", quoted_table)
    }

    fn autoincrement_clause(&self) -> Option<&'static str> {
        Some(" AUTO_INCREMENT")
    }

    fn rename_table_sql(&self, old: &str, new: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.quote_identifier(old),
            self.quote_identifier(new)
        )
    }

    fn drop_index_sql(&self, index: &Index) -> String {
        format!(
            "DROP INDEX {} ON {}",
            index.quoted_name,
            self.quote_identifier(&index.table_name)
        )
    }

    fn discover_tables_sql(&self) -> String {
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
         ORDER BY table_name"
            .to_string()
    }

    fn discover_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT column_name, column_type, character_maximum_length, numeric_precision, \
                numeric_scale, CASE WHEN column_key = 'PRI' THEN 1 ELSE 0 END, column_default, \
                CASE WHEN extra LIKE '%auto_increment%' THEN 1 ELSE 0 END \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = {} \
             ORDER BY ordinal_position",
            self.quote_string(table)
        )
    }

    fn discover_indices_sql(&self, table: &str) -> Option<String> {
        Some(format!(
            "SELECT index_name, column_name, CASE WHEN non_unique = 0 THEN 1 ELSE 0 END \
             FROM information_schema.statistics \
             WHERE table_schema = DATABASE() AND table_name = {} AND index_name <> 'PRIMARY' \
             ORDER BY index_name, seq_in_index",
            self.quote_string(table)
        ))
    }

    fn as_dyn(&self) -> &dyn Dialect {
        self
    }
}
