use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers.
///
/// Local translation failures never show up here: they travel as
/// [`CannotRepresent`] inside the compiler and end up as the `imperfect`
/// flag on the compiled predicate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The restriction could not be translated exactly and the caller
    /// needed it to be (strict mode, LIMIT/OFFSET, UPDATE/DELETE, ...).
    #[error("Translation error: {0}")]
    Translation(String),

    /// A requested byte length or precision exceeds every registered type.
    #[error("Capacity error: {0}")]
    Capacity(String),

    /// No foreign key or explicit path joins two tables.
    #[error("Reference error: no path between {near} and {far}")]
    Reference { near: String, far: String },

    /// A table, column or type name could not be mapped.
    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Illegal NULL comparison: only == and != may compare with None ({0})")]
    IllegalNullComparison(String),

    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(String),

    #[error("Reserved identifier: {0}")]
    ReservedIdentifier(String),

    /// Expression parameters do not line up with the relation's tables.
    #[error("Arity mismatch: expression takes {expected} row(s), relation provides {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// Any other misuse of the API.
    #[error("Programmer error: {0}")]
    Programmer(String),

    /// A value could not be encoded or decoded.
    #[error("Value error: {0}")]
    Value(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Object has been dropped: {0}")]
    Dropped(String),

    #[error("Locked: {0}")]
    Locked(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn value(msg: impl Into<String>) -> Self {
        Error::Value(msg.into())
    }

    pub fn mapping(msg: impl Into<String>) -> Self {
        Error::Mapping(msg.into())
    }

    pub fn programmer(msg: impl Into<String>) -> Self {
        Error::Programmer(msg.into())
    }

    /// True for the categories that come from misuse of the API rather than
    /// from data or environment.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Error::IllegalNullComparison(_)
                | Error::DuplicateIdentifier(_)
                | Error::ReservedIdentifier(_)
                | Error::ArityMismatch { .. }
                | Error::Programmer(_)
        )
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_err) => Error::Connection(format!(
                "{} ({})",
                db_err.message(),
                db_err.code().code()
            )),
            None => Error::Connection(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Local compiler signal: this subexpression has no SQL equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CannotRepresent;

impl fmt::Display for CannotRepresent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expression cannot be represented in SQL")
    }
}

impl std::error::Error for CannotRepresent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_programmer_error_classification() {
        assert!(Error::IllegalNullComparison("<".into()).is_programmer_error());
        assert!(Error::ArityMismatch {
            expected: 2,
            found: 1
        }
        .is_programmer_error());
        assert!(!Error::Capacity("too wide".into()).is_programmer_error());
        assert!(!Error::Reference {
            near: "a".into(),
            far: "b".into()
        }
        .is_programmer_error());
    }

    #[test]
    fn test_error_display() {
        let err = Error::Reference {
            near: "people".into(),
            far: "zoos".into(),
        };
        assert_eq!(
            err.to_string(),
            "Reference error: no path between people and zoos"
        );
        assert_eq!(
            CannotRepresent.to_string(),
            "expression cannot be represented in SQL"
        );
    }
}
