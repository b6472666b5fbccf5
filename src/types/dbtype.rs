//! Database-side type descriptors.
//!
//! A [`DatabaseType`] is a plain value: a name, a family, and optional
//! capability facets (byte limit, precision/scale, fixed range). A type
//! that can be parameterized carries the facet unfrozen; a fixed-width type
//! carries it frozen.

use std::fmt;

use crate::adapter::{self, Adapter};

use super::value::HostType;

/// The category a type belongs to. Types within a family are ordered by
/// capacity inside a [`super::DatabaseTypeSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeFamily {
    Boolean,
    Integer,
    Float,
    Numeric,
    Varchar,
    Binary,
    Date,
    Time,
    DateTime,
    Interval,
    Json,
}

impl TypeFamily {
    /// The host type values of this family decode to by default.
    pub fn default_host(self) -> HostType {
        match self {
            TypeFamily::Boolean => HostType::Bool,
            TypeFamily::Integer => HostType::Int,
            TypeFamily::Float => HostType::Float,
            TypeFamily::Numeric => HostType::Decimal,
            TypeFamily::Varchar => HostType::Str,
            TypeFamily::Binary => HostType::Bytes,
            TypeFamily::Date => HostType::Date,
            TypeFamily::Time => HostType::Time,
            TypeFamily::DateTime => HostType::DateTime,
            TypeFamily::Interval => HostType::Interval,
            TypeFamily::Json => HostType::Json,
        }
    }
}

/// Storage size in bytes. `max` is the ceiling of the type; `bytes` is
/// the size requested for this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteLimit {
    pub max: u64,
    pub bytes: u64,
    pub frozen: bool,
}

/// Precision and scale. For float types `precision` is binary digits and
/// `scale` is unused; for numeric types both are decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    pub max_precision: u32,
    pub max_scale: u32,
    pub precision: u32,
    pub scale: u32,
    pub frozen: bool,
}

/// Inclusive value range of an integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedRange {
    pub min: i128,
    pub max: i128,
}

impl FixedRange {
    pub fn signed_bytes(bytes: u32) -> Self {
        let bits = bytes * 8;
        Self {
            min: -(1i128 << (bits - 1)),
            max: (1i128 << (bits - 1)) - 1,
        }
    }

    pub fn unsigned_bytes(bytes: u32) -> Self {
        Self {
            min: 0,
            max: (1i128 << (bytes * 8)) - 1,
        }
    }

    pub fn contains(&self, value: i128) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A database column type.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseType {
    pub name: String,
    pub family: TypeFamily,
    pub synonyms: Vec<String>,
    pub byte_limit: Option<ByteLimit>,
    pub precision: Option<Precision>,
    pub range: Option<FixedRange>,
}

impl DatabaseType {
    pub fn new(name: impl Into<String>, family: TypeFamily) -> Self {
        Self {
            name: name.into(),
            family,
            synonyms: Vec::new(),
            byte_limit: None,
            precision: None,
            range: None,
        }
    }

    pub fn with_synonyms(mut self, synonyms: &[&str]) -> Self {
        self.synonyms = synonyms.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Fixed storage size, e.g. `INTEGER` (4 bytes).
    pub fn fixed_bytes(mut self, bytes: u64) -> Self {
        self.byte_limit = Some(ByteLimit {
            max: bytes,
            bytes,
            frozen: true,
        });
        self
    }

    /// Adjustable storage size up to `max`, rendered as `NAME(n)`.
    pub fn adjustable_bytes(mut self, max: u64, default: u64) -> Self {
        self.byte_limit = Some(ByteLimit {
            max,
            bytes: default.min(max),
            frozen: false,
        });
        self
    }

    /// Fixed binary precision, e.g. `REAL` (24 bits).
    pub fn fixed_precision(mut self, precision: u32) -> Self {
        self.precision = Some(Precision {
            max_precision: precision,
            max_scale: 0,
            precision,
            scale: 0,
            frozen: true,
        });
        self
    }

    /// Adjustable decimal precision and scale, rendered as `NAME(p,s)`.
    pub fn adjustable_precision(mut self, max_precision: u32, max_scale: u32) -> Self {
        self.precision = Some(Precision {
            max_precision,
            max_scale,
            precision: max_precision.min(18),
            scale: max_scale.min(6),
            frozen: false,
        });
        self
    }

    pub fn with_range(mut self, range: FixedRange) -> Self {
        self.range = Some(range);
        self
    }

    /// True if `name` is this type's name or one of its synonyms.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.synonyms.iter().any(|s| s.eq_ignore_ascii_case(name))
    }

    /// Largest size this type can hold; unbounded types report `u64::MAX`.
    pub fn max_bytes(&self) -> u64 {
        self.byte_limit.map(|b| b.max).unwrap_or(u64::MAX)
    }

    pub fn max_precision(&self) -> u32 {
        self.precision.map(|p| p.max_precision).unwrap_or(0)
    }

    /// Set the instance byte length. Frozen types ignore the request.
    pub fn set_bytes(&mut self, bytes: u64) {
        if let Some(limit) = self.byte_limit.as_mut() {
            if !limit.frozen {
                limit.bytes = bytes.min(limit.max);
            }
        }
    }

    /// Set the instance precision and scale. Frozen types ignore the request.
    pub fn set_precision(&mut self, precision: u32, scale: u32) {
        if let Some(p) = self.precision.as_mut() {
            if !p.frozen {
                p.precision = precision.min(p.max_precision);
                p.scale = scale.min(p.max_scale).min(p.precision);
            }
        }
    }

    /// Host type values of this type decode to.
    pub fn default_host(&self) -> HostType {
        self.family.default_host()
    }

    /// The adapter encoding `host` values into this type.
    pub fn adapter(&self, host: HostType) -> &'static dyn Adapter {
        adapter::for_type(host, self)
    }

    /// The type as written in DDL, including any adjustable parameters.
    pub fn ddl_name(&self) -> String {
        if let Some(limit) = self.byte_limit {
            if !limit.frozen {
                return format!("{}({})", self.name, limit.bytes);
            }
        }
        if let Some(p) = self.precision {
            if !p.frozen {
                return format!("{}({}, {})", self.name, p.precision, p.scale);
            }
        }
        self.name.clone()
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ddl_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_name_renders_adjustable_facets() {
        let mut varchar = DatabaseType::new("VARCHAR", TypeFamily::Varchar).adjustable_bytes(65535, 255);
        assert_eq!(varchar.ddl_name(), "VARCHAR(255)");
        varchar.set_bytes(40);
        assert_eq!(varchar.ddl_name(), "VARCHAR(40)");

        let mut numeric = DatabaseType::new("NUMERIC", TypeFamily::Numeric).adjustable_precision(1000, 1000);
        numeric.set_precision(10, 2);
        assert_eq!(numeric.ddl_name(), "NUMERIC(10, 2)");

        let int = DatabaseType::new("INTEGER", TypeFamily::Integer).fixed_bytes(4);
        assert_eq!(int.ddl_name(), "INTEGER");
    }

    #[test]
    fn test_frozen_facets_ignore_requests() {
        let mut real = DatabaseType::new("REAL", TypeFamily::Float).fixed_precision(24);
        real.set_precision(53, 0);
        assert_eq!(real.max_precision(), 24);
        assert_eq!(real.precision.unwrap().precision, 24);
    }

    #[test]
    fn test_fixed_range_bounds() {
        let r = FixedRange::signed_bytes(2);
        assert_eq!(r.min, -32768);
        assert_eq!(r.max, 32767);
        assert!(!r.contains(32768));
        let u = FixedRange::unsigned_bytes(1);
        assert_eq!(u.max, 255);
    }

    #[test]
    fn test_synonym_lookup_is_case_insensitive() {
        let t = DatabaseType::new("VARCHAR", TypeFamily::Varchar).with_synonyms(&["character varying"]);
        assert!(t.answers_to("varchar"));
        assert!(t.answers_to("CHARACTER VARYING"));
        assert!(!t.answers_to("text"));
    }

    #[test]
    fn test_copy_is_deep() {
        let original = DatabaseType::new("VARCHAR", TypeFamily::Varchar).adjustable_bytes(65535, 255);
        let mut copy = original.clone();
        copy.set_bytes(10);
        assert_eq!(original.byte_limit.unwrap().bytes, 255);
        assert_eq!(copy.byte_limit.unwrap().bytes, 10);
    }
}
