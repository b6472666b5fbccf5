use chrono::Duration;

use crate::adapter::interval_seconds;
use crate::expr::{BinaryOp, SqlExpression};
use crate::types::{DatabaseType, DatabaseTypeSet, FixedRange, HostType, TypeFamily};

use super::{hex_encode, DatePart, Dialect, LIKE_ESCAPE};

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn type_set(&self) -> DatabaseTypeSet {
        DatabaseTypeSet::new("postgres")
            .with(DatabaseType::new("BOOLEAN", TypeFamily::Boolean).with_synonyms(&["bool"]))
            .with(
                DatabaseType::new("SMALLINT", TypeFamily::Integer)
                    .with_synonyms(&["int2", "smallserial"])
                    .fixed_bytes(2)
                    .with_range(FixedRange::signed_bytes(2)),
            )
            .with(
                DatabaseType::new("INTEGER", TypeFamily::Integer)
                    .with_synonyms(&["int", "int4", "serial"])
                    .fixed_bytes(4)
                    .with_range(FixedRange::signed_bytes(4)),
            )
            .with(
                DatabaseType::new("BIGINT", TypeFamily::Integer)
                    .with_synonyms(&["int8", "bigserial"])
                    .fixed_bytes(8)
                    .with_range(FixedRange::signed_bytes(8)),
            )
            .with(
                DatabaseType::new("REAL", TypeFamily::Float)
                    .with_synonyms(&["float4"])
                    .fixed_precision(24),
            )
            .with(
                DatabaseType::new("DOUBLE PRECISION", TypeFamily::Float)
                    .with_synonyms(&["float8", "float"])
                    .fixed_precision(53),
            )
            .with(
                DatabaseType::new("NUMERIC", TypeFamily::Numeric)
                    .with_synonyms(&["decimal"])
                    .adjustable_precision(1000, 1000),
            )
            .with(
                DatabaseType::new("VARCHAR", TypeFamily::Varchar)
                    .with_synonyms(&["character varying"])
                    .adjustable_bytes(10_485_760, 255),
            )
            .with(DatabaseType::new("TEXT", TypeFamily::Varchar).fixed_bytes(1 << 30))
            .with(DatabaseType::new("BYTEA", TypeFamily::Binary).fixed_bytes(1 << 30))
            .with(DatabaseType::new("DATE", TypeFamily::Date))
            .with(
                DatabaseType::new("TIME", TypeFamily::Time)
                    .with_synonyms(&["time without time zone"]),
            )
            .with(
                DatabaseType::new("TIMESTAMP", TypeFamily::DateTime).with_synonyms(&[
                    "timestamp without time zone",
                    "timestamp with time zone",
                    "timestamptz",
                ]),
            )
            .with(DatabaseType::new("INTERVAL", TypeFamily::Interval))
            .with(DatabaseType::new("JSONB", TypeFamily::Json).with_synonyms(&["json"]))
    }

    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        Box::new(sqlparser::dialect::PostgreSqlDialect {})
    }

    fn bytes_literal(&self, data: &[u8]) -> String {
        format!("'\\x{}'::bytea", hex_encode(data))
    }

    fn interval_literal(&self, interval: Duration) -> Option<String> {
        Some(format!("INTERVAL '{} seconds'", interval_seconds(interval)))
    }

    fn json_literal(&self, json: &str) -> String {
        format!("{}::jsonb", self.quote_string(json))
    }

    fn date_arithmetic(
        &self,
        lhs: &SqlExpression,
        op: BinaryOp,
        rhs: &SqlExpression,
    ) -> Option<String> {
        use HostType::*;
        let (l, r) = (lhs.sql.as_str(), rhs.sql.as_str());
        match (lhs.host_type, op, rhs.host_type) {
            (DateTime, BinaryOp::Add | BinaryOp::Sub, Interval)
            | (Interval, BinaryOp::Add, DateTime)
            | (DateTime, BinaryOp::Sub, DateTime)
            | (Interval, BinaryOp::Add | BinaryOp::Sub, Interval)
            | (Interval, BinaryOp::Mul | BinaryOp::Div, Int | Float) => {
                Some(self.arithmetic(l, op, r))
            }
            (Int | Float, BinaryOp::Mul, Interval) => Some(self.arithmetic(l, op, r)),
            (Date, BinaryOp::Add | BinaryOp::Sub, Interval) | (Interval, BinaryOp::Add, Date) => {
                Some(format!("CAST({} AS DATE)", self.arithmetic(l, op, r)))
            }
            (Date, BinaryOp::Sub, Date) => Some(format!("(({} - {}) * INTERVAL '1 day')", l, r)),
            (Interval, BinaryOp::Div, Interval) => Some(format!(
                "(EXTRACT(EPOCH FROM {}) / EXTRACT(EPOCH FROM {}))",
                l, r
            )),
            _ => None,
        }
    }

    fn like(&self, expr: &str, pattern: &str, case_insensitive: bool) -> (String, bool) {
        let keyword = if case_insensitive { "ILIKE" } else { "LIKE" };
        (
            format!(
                "{} {} {} ESCAPE {}",
                expr,
                keyword,
                pattern,
                self.quote_string(&LIKE_ESCAPE.to_string())
            ),
            true,
        )
    }

    fn now(&self) -> String {
        "LOCALTIMESTAMP".to_string()
    }

    fn extract(&self, part: DatePart, expr: &str) -> String {
        let inner = format!("EXTRACT({} FROM {})", part.keyword(), expr);
        match part {
            DatePart::Second => format!("CAST(FLOOR({}) AS INTEGER)", inner),
            _ => format!("CAST({} AS INTEGER)", inner),
        }
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn reserved_column_names(&self) -> &'static [&'static str] {
        &["oid", "tableoid", "xmin", "xmax", "cmin", "cmax", "ctid"]
    }

    fn sequence_name(&self, table: &str, column: &str) -> Option<String> {
        Some(format!("{}_{}_seq", table, column))
    }

    fn autoincrement_clause(&self) -> Option<&'static str> {
        None
    }

    fn discover_tables_sql(&self) -> String {
        // Ordinary and partitioned tables in the current schema.
        "SELECT c.relname \
         FROM pg_catalog.pg_class c \
         JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
         WHERE n.nspname = current_schema() AND c.relkind IN ('r', 'p') \
         ORDER BY c.relname"
            .to_string()
    }

    fn discover_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT c.column_name, c.data_type, c.character_maximum_length, \
                c.numeric_precision, c.numeric_scale, \
                CASE WHEN kcu.column_name IS NOT NULL THEN 1 ELSE 0 END, \
                c.column_default, \
                CASE WHEN c.column_default LIKE 'nextval(%' THEN 1 ELSE 0 END \
             FROM information_schema.columns c \
             LEFT JOIN information_schema.table_constraints tc \
                ON tc.table_schema = c.table_schema \
                AND tc.table_name = c.table_name \
                AND tc.constraint_type = 'PRIMARY KEY' \
             LEFT JOIN information_schema.key_column_usage kcu \
                ON kcu.constraint_name = tc.constraint_name \
                AND kcu.table_schema = tc.table_schema \
                AND kcu.column_name = c.column_name \
             WHERE c.table_schema = current_schema() AND c.table_name = {} \
             ORDER BY c.ordinal_position",
            self.quote_string(table)
        )
    }

    fn discover_indices_sql(&self, table: &str) -> Option<String> {
        Some(format!(
            "SELECT i.relname, a.attname, CASE WHEN ix.indisunique THEN 1 ELSE 0 END \
             FROM pg_catalog.pg_index ix \
             JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid \
             JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
             WHERE n.nspname = current_schema() AND t.relname = {} AND NOT ix.indisprimary \
             ORDER BY i.relname",
            self.quote_string(table)
        ))
    }

    fn as_dyn(&self) -> &dyn Dialect {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeHints;

    fn expr(sql: &str, host: HostType) -> SqlExpression {
        let set = PostgresDialect.type_set();
        let dbtype = set.resolve(host, &TypeHints::default()).unwrap();
        SqlExpression::new(sql, host, dbtype)
    }

    #[test]
    fn test_interval_literal_in_seconds() {
        let d = PostgresDialect;
        assert_eq!(
            d.interval_literal(Duration::hours(1)).as_deref(),
            Some("INTERVAL '3600 seconds'")
        );
        assert_eq!(
            d.interval_literal(Duration::milliseconds(-1500)).as_deref(),
            Some("INTERVAL '-1.5 seconds'")
        );
    }

    #[test]
    fn test_bytea_literal() {
        assert_eq!(PostgresDialect.bytes_literal(&[0xde, 0xad]), "'\\xdead'::bytea");
    }

    #[test]
    fn test_date_arithmetic() {
        let d = PostgresDialect;
        let born = expr("\"born\"", HostType::Date);
        let span = expr("INTERVAL '86400 seconds'", HostType::Interval);
        assert_eq!(
            d.date_arithmetic(&born, BinaryOp::Add, &span).as_deref(),
            Some("CAST((\"born\" + INTERVAL '86400 seconds') AS DATE)")
        );
        let at = expr("\"at\"", HostType::DateTime);
        assert_eq!(
            d.date_arithmetic(&at, BinaryOp::Sub, &at).as_deref(),
            Some("(\"at\" - \"at\")")
        );
        let time = expr("\"t\"", HostType::Time);
        assert_eq!(d.date_arithmetic(&time, BinaryOp::Add, &span), None);
    }

    #[test]
    fn test_sequence_backed_autoincrement() {
        let d = PostgresDialect;
        assert_eq!(d.sequence_name("people", "id").as_deref(), Some("people_id_seq"));
        assert_eq!(d.sequence_default("people_id_seq"), "nextval('\"people_id_seq\"')");
        assert_eq!(d.autoincrement_clause(), None);
    }

    #[test]
    fn test_ilike_for_case_insensitive_matching() {
        let (sql, exact) = PostgresDialect.like("\"name\"", "'a%'", true);
        assert_eq!(sql, "\"name\" ILIKE 'a%' ESCAPE '\\'");
        assert!(exact);
    }

    #[test]
    fn test_type_synonyms_from_catalog() {
        let set = PostgresDialect.type_set();
        assert_eq!(set.from_type_name("int4", None, None, None).unwrap().name, "INTEGER");
        assert_eq!(
            set.from_type_name("timestamp without time zone", None, None, None)
                .unwrap()
                .name,
            "TIMESTAMP"
        );
        assert_eq!(
            set.from_type_name("character varying", Some(40), None, None)
                .unwrap()
                .ddl_name(),
            "VARCHAR(40)"
        );
    }
}
