use crate::types::{DatabaseType, DatabaseTypeSet, FixedRange, TypeFamily};

use super::Dialect;

/// ANSI SQL with no vendor extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &str {
        "generic"
    }

    fn type_set(&self) -> DatabaseTypeSet {
        DatabaseTypeSet::new("generic")
            .with(DatabaseType::new("BOOLEAN", TypeFamily::Boolean))
            .with(
                DatabaseType::new("SMALLINT", TypeFamily::Integer)
                    .fixed_bytes(2)
                    .with_range(FixedRange::signed_bytes(2)),
            )
            .with(
                DatabaseType::new("INTEGER", TypeFamily::Integer)
                    .with_synonyms(&["int"])
                    .fixed_bytes(4)
                    .with_range(FixedRange::signed_bytes(4)),
            )
            .with(
                DatabaseType::new("BIGINT", TypeFamily::Integer)
                    .fixed_bytes(8)
                    .with_range(FixedRange::signed_bytes(8)),
            )
            .with(DatabaseType::new("REAL", TypeFamily::Float).fixed_precision(24))
            .with(
                DatabaseType::new("DOUBLE PRECISION", TypeFamily::Float)
                    .with_synonyms(&["double", "float"])
                    .fixed_precision(53),
            )
            .with(
                DatabaseType::new("NUMERIC", TypeFamily::Numeric)
                    .with_synonyms(&["decimal"])
                    .adjustable_precision(38, 38),
            )
            .with(
                DatabaseType::new("VARCHAR", TypeFamily::Varchar)
                    .with_synonyms(&["character varying"])
                    .adjustable_bytes(32672, 255),
            )
            .with(
                DatabaseType::new("CLOB", TypeFamily::Varchar)
                    .with_synonyms(&["text", "character large object"])
                    .fixed_bytes(1 << 31),
            )
            .with(
                DatabaseType::new("VARBINARY", TypeFamily::Binary)
                    .with_synonyms(&["binary varying"])
                    .adjustable_bytes(32672, 255),
            )
            .with(
                DatabaseType::new("BLOB", TypeFamily::Binary)
                    .with_synonyms(&["binary large object"])
                    .fixed_bytes(1 << 31),
            )
            .with(DatabaseType::new("DATE", TypeFamily::Date))
            .with(DatabaseType::new("TIME", TypeFamily::Time))
            .with(DatabaseType::new("TIMESTAMP", TypeFamily::DateTime))
    }

    fn parser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        Box::new(sqlparser::dialect::GenericDialect {})
    }

    fn as_dyn(&self) -> &dyn Dialect {
        self
    }
}
