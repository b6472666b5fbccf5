use sqlparser::parser::Parser as SqlParser;

use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// Check that `sql` parses under the dialect's grammar.
pub fn verify(dialect: &dyn Dialect, sql: &str) -> Result<()> {
    let grammar = dialect.parser_dialect();
    SqlParser::parse_sql(grammar.as_ref(), sql)
        .map(|_| ())
        .map_err(|e| Error::Translation(format!("generated SQL does not parse ({}): {}", e, sql)))
}

/// [`verify`] every statement, stopping at the first failure.
pub fn verify_all<S: AsRef<str>>(dialect: &dyn Dialect, statements: &[S]) -> Result<()> {
    statements.iter().try_for_each(|s| verify(dialect, s.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{GenericDialect, MySqlDialect, PostgresDialect};

    #[test]
    fn test_accepts_dialect_syntax() {
        verify(&GenericDialect, "SELECT \"a\" FROM \"t\" WHERE \"a\" > 1 LIMIT 5").unwrap();
        verify(&MySqlDialect, "SELECT `a` FROM `t`").unwrap();
        verify(&PostgresDialect, "SELECT \"a\" FROM \"t\" WHERE \"a\" ILIKE 'x%'").unwrap();
    }

    #[test]
    fn test_rejects_garbage() {
        let err = verify(&GenericDialect, "SELEC a FROM").unwrap_err();
        assert!(matches!(err, Error::Translation(_)));
        assert!(verify_all(&GenericDialect, &["SELECT 1", "DROP"]).is_err());
    }
}
