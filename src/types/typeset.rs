//! Type selection: from a host type plus hints to a concrete [`DatabaseType`].

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::{Error, Result};

use super::dbtype::{DatabaseType, TypeFamily};
use super::value::HostType;

/// log10(2): decimal digits per binary digit.
const DIGITS_PER_BIT: f64 = 0.30103;

/// Default sizes used when a hint is absent.
pub const DEFAULT_INT_BYTES: u32 = 4;
pub const DEFAULT_FLOAT_PRECISION: u32 = 53;
pub const DEFAULT_STR_BYTES: u64 = 255;
pub const DEFAULT_NUMERIC_PRECISION: u32 = 18;
pub const DEFAULT_NUMERIC_SCALE: u32 = 6;

/// Hints that narrow type selection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeHints {
    /// Storage size in bytes. For strings and binaries `Some(0)` asks for
    /// the largest type available.
    pub bytes: Option<u64>,
    /// Binary precision for floats, decimal precision for decimals.
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub signed: Option<bool>,
    /// Skip selection and use this type as-is.
    pub explicit: Option<DatabaseType>,
}

impl TypeHints {
    pub fn bytes(bytes: u64) -> Self {
        Self {
            bytes: Some(bytes),
            ..Default::default()
        }
    }

    pub fn precision(precision: u32, scale: u32) -> Self {
        Self {
            precision: Some(precision),
            scale: Some(scale),
            ..Default::default()
        }
    }

    pub fn explicit(dbtype: DatabaseType) -> Self {
        Self {
            explicit: Some(dbtype),
            ..Default::default()
        }
    }
}

/// The types a database offers, grouped by family and ordered by capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseTypeSet {
    name: String,
    families: BTreeMap<TypeFamily, Vec<DatabaseType>>,
}

impl DatabaseTypeSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            families: BTreeMap::new(),
        }
    }

    /// Identity of this set, used in compile-cache keys.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a type. Within a family, types must be registered in order
    /// of increasing capacity; registration order is selection order.
    pub fn register(&mut self, dbtype: DatabaseType) -> &mut Self {
        self.families.entry(dbtype.family).or_default().push(dbtype);
        self
    }

    pub fn with(mut self, dbtype: DatabaseType) -> Self {
        self.register(dbtype);
        self
    }

    pub fn family(&self, family: TypeFamily) -> &[DatabaseType] {
        self.families.get(&family).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every registered type, family by family.
    pub fn types(&self) -> impl Iterator<Item = &DatabaseType> {
        self.families.values().flatten()
    }

    /// Find a type by name or synonym.
    pub fn lookup(&self, name: &str) -> Option<&DatabaseType> {
        self.types().find(|t| t.answers_to(name))
    }

    /// Map a discovered type name (possibly with `(n)` / `(p, s)`
    /// parameters) back to a type instance.
    pub fn from_type_name(
        &self,
        type_name: &str,
        bytes: Option<u64>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> Result<DatabaseType> {
        let trimmed = type_name.trim();
        let (base, params) = match trimmed.find('(') {
            Some(open) => {
                let close = trimmed.rfind(')').unwrap_or(trimmed.len());
                (trimmed[..open].trim(), Some(&trimmed[open + 1..close.max(open + 1)]))
            }
            None => (trimmed, None),
        };

        let mut dbtype = self
            .lookup(trimmed)
            .or_else(|| self.lookup(base))
            .cloned()
            .ok_or_else(|| Error::mapping(format!("unknown column type {:?}", type_name)))?;

        let mut nums = params
            .into_iter()
            .flat_map(|p| p.split(','))
            .filter_map(|n| n.trim().parse::<u64>().ok());
        let first = nums.next();
        let second = nums.next();

        if dbtype.byte_limit.is_some() {
            if let Some(n) = bytes.or(first) {
                dbtype.set_bytes(n);
            }
        }
        if dbtype.precision.is_some() {
            let p = precision.or(first.map(|n| n as u32));
            let s = scale.or(second.map(|n| n as u32)).unwrap_or(0);
            if let Some(p) = p {
                dbtype.set_precision(p, s);
            }
        }
        Ok(dbtype)
    }

    /// Select the database type for values of `host`.
    pub fn resolve(&self, host: HostType, hints: &TypeHints) -> Result<DatabaseType> {
        if let Some(explicit) = &hints.explicit {
            return Ok(explicit.clone());
        }

        match host {
            HostType::Bool => self.resolve_bool(),
            HostType::Int => self.resolve_int(hints),
            HostType::Float => self.resolve_float(hints),
            HostType::Decimal => self.resolve_numeric(
                hints.precision.unwrap_or(DEFAULT_NUMERIC_PRECISION),
                hints.scale.unwrap_or(DEFAULT_NUMERIC_SCALE),
            ),
            HostType::Str => {
                self.resolve_sized(TypeFamily::Varchar, hints.bytes.unwrap_or(DEFAULT_STR_BYTES))
            }
            HostType::Bytes => {
                self.resolve_sized(TypeFamily::Binary, hints.bytes.unwrap_or(DEFAULT_STR_BYTES))
            }
            HostType::Date => self.first_of(TypeFamily::Date, host),
            HostType::Time => self.first_of(TypeFamily::Time, host),
            HostType::DateTime => self.first_of(TypeFamily::DateTime, host),
            HostType::Interval => self.resolve_interval(),
            HostType::Json => self.resolve_json(),
            HostType::Null | HostType::List => Err(Error::Unsupported(format!(
                "no database type stores {} values",
                host
            ))),
        }
    }

    fn first_of(&self, family: TypeFamily, host: HostType) -> Result<DatabaseType> {
        self.family(family)
            .first()
            .cloned()
            .ok_or_else(|| Error::Unsupported(format!("{} has no type for {} values", self.name, host)))
    }

    fn resolve_bool(&self) -> Result<DatabaseType> {
        if let Some(t) = self.family(TypeFamily::Boolean).first() {
            return Ok(t.clone());
        }
        warn!(typeset = %self.name, "no boolean type; storing booleans as the smallest integer");
        self.family(TypeFamily::Integer)
            .first()
            .cloned()
            .ok_or_else(|| Error::Unsupported(format!("{} has no boolean or integer type", self.name)))
    }

    fn resolve_int(&self, hints: &TypeHints) -> Result<DatabaseType> {
        let too_wide = || Error::Capacity(format!("{:?} bytes is too wide for an integer", hints.bytes));
        let bytes = match hints.bytes {
            Some(b) => u32::try_from(b).map_err(|_| too_wide())?,
            None => DEFAULT_INT_BYTES,
        }
        .max(1);
        let signed = hints.signed.unwrap_or(true);
        let wanted = if signed {
            super::dbtype::FixedRange::signed_bytes(bytes.min(8))
        } else {
            super::dbtype::FixedRange::unsigned_bytes(bytes.min(8))
        };

        let fits = |t: &&DatabaseType| match t.range {
            Some(r) => bytes <= 8 && r.min <= wanted.min && r.max >= wanted.max,
            None => t.max_bytes() >= u64::from(bytes),
        };
        if let Some(t) = self.family(TypeFamily::Integer).iter().find(fits) {
            return Ok(t.clone());
        }

        // Scaled-decimal fallback: enough digits for the requested width.
        let bits = bytes.checked_mul(8).ok_or_else(too_wide)?;
        let digits = (f64::from(bits) * DIGITS_PER_BIT).ceil() as u32 + 1;
        warn!(
            typeset = %self.name,
            bytes,
            digits,
            "no integer type is wide enough; falling back to NUMERIC"
        );
        self.resolve_numeric(digits, 0)
    }

    fn resolve_float(&self, hints: &TypeHints) -> Result<DatabaseType> {
        let precision = hints.precision.unwrap_or(DEFAULT_FLOAT_PRECISION);
        if let Some(t) = self
            .family(TypeFamily::Float)
            .iter()
            .find(|t| t.max_precision() >= precision)
        {
            return Ok(t.clone());
        }

        // Doubled so the decimal covers both very small and very large magnitudes.
        let digits = (precision as f64 * DIGITS_PER_BIT).ceil() as u32;
        warn!(
            typeset = %self.name,
            precision,
            "no float type covers the requested precision; falling back to NUMERIC({}, {})",
            digits * 2,
            digits
        );
        self.resolve_numeric(digits * 2, digits)
    }

    fn resolve_numeric(&self, precision: u32, scale: u32) -> Result<DatabaseType> {
        let candidate = self
            .family(TypeFamily::Numeric)
            .iter()
            .find(|t| t.max_precision() >= precision);
        match candidate {
            Some(t) => {
                let mut t = t.clone();
                t.set_precision(precision, scale);
                Ok(t)
            }
            None => Err(Error::Capacity(format!(
                "precision {} exceeds every numeric type in {}",
                precision, self.name
            ))),
        }
    }

    fn resolve_sized(&self, family: TypeFamily, bytes: u64) -> Result<DatabaseType> {
        let types = self.family(family);
        let chosen = if bytes == 0 {
            types.last()
        } else {
            types.iter().find(|t| t.max_bytes() >= bytes)
        };
        match chosen {
            Some(t) => {
                let mut t = t.clone();
                if bytes > 0 {
                    t.set_bytes(bytes);
                }
                Ok(t)
            }
            None => Err(Error::Capacity(format!(
                "{} bytes exceeds every {:?} type in {}",
                bytes, family, self.name
            ))),
        }
    }

    fn resolve_interval(&self) -> Result<DatabaseType> {
        if let Some(t) = self.family(TypeFamily::Interval).first() {
            return Ok(t.clone());
        }
        warn!(typeset = %self.name, "no interval type; storing intervals as decimal seconds");
        // Microsecond resolution over roughly +/- 3 million years.
        self.resolve_numeric(20, 6)
    }

    fn resolve_json(&self) -> Result<DatabaseType> {
        if let Some(t) = self.family(TypeFamily::Json).first() {
            return Ok(t.clone());
        }
        warn!(typeset = %self.name, "no JSON type; pickling JSON into the largest string type");
        self.resolve_sized(TypeFamily::Varchar, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FixedRange;

    fn sample_set() -> DatabaseTypeSet {
        DatabaseTypeSet::new("sample")
            .with(DatabaseType::new("BOOLEAN", TypeFamily::Boolean))
            .with(
                DatabaseType::new("SMALLINT", TypeFamily::Integer)
                    .fixed_bytes(2)
                    .with_range(FixedRange::signed_bytes(2)),
            )
            .with(
                DatabaseType::new("INTEGER", TypeFamily::Integer)
                    .fixed_bytes(4)
                    .with_range(FixedRange::signed_bytes(4)),
            )
            .with(
                DatabaseType::new("BIGINT", TypeFamily::Integer)
                    .fixed_bytes(8)
                    .with_range(FixedRange::signed_bytes(8)),
            )
            .with(DatabaseType::new("REAL", TypeFamily::Float).fixed_precision(24))
            .with(DatabaseType::new("DOUBLE PRECISION", TypeFamily::Float).fixed_precision(53))
            .with(DatabaseType::new("NUMERIC", TypeFamily::Numeric).adjustable_precision(38, 38))
            .with(
                DatabaseType::new("VARCHAR", TypeFamily::Varchar)
                    .adjustable_bytes(4000, 255)
                    .with_synonyms(&["character varying"]),
            )
            .with(DatabaseType::new("TEXT", TypeFamily::Varchar).fixed_bytes(1 << 30))
            .with(DatabaseType::new("DATE", TypeFamily::Date))
    }

    #[test]
    fn test_int_picks_smallest_fitting_type() {
        let set = sample_set();
        assert_eq!(set.resolve(HostType::Int, &TypeHints::bytes(2)).unwrap().name, "SMALLINT");
        assert_eq!(set.resolve(HostType::Int, &TypeHints::default()).unwrap().name, "INTEGER");
        assert_eq!(set.resolve(HostType::Int, &TypeHints::bytes(8)).unwrap().name, "BIGINT");
    }

    #[test]
    fn test_unsigned_int_needs_next_size_up() {
        let set = sample_set();
        let hints = TypeHints {
            bytes: Some(2),
            signed: Some(false),
            ..Default::default()
        };
        assert_eq!(set.resolve(HostType::Int, &hints).unwrap().name, "INTEGER");
    }

    #[test]
    fn test_oversized_int_falls_back_to_numeric() {
        let set = sample_set();
        let hints = TypeHints {
            bytes: Some(8),
            signed: Some(false),
            ..Default::default()
        };
        let t = set.resolve(HostType::Int, &hints).unwrap();
        assert_eq!(t.family, TypeFamily::Numeric);
        assert_eq!(t.precision.unwrap().scale, 0);
        assert!(t.precision.unwrap().precision >= 20);
    }

    #[test]
    fn test_absurd_int_width_is_capacity_error() {
        let set = sample_set();
        for bytes in [u64::MAX, u64::from(u32::MAX) + 1, u64::from(u32::MAX), 1 << 30] {
            let err = set.resolve(HostType::Int, &TypeHints::bytes(bytes)).unwrap_err();
            assert!(matches!(err, Error::Capacity(_)), "{} bytes: {:?}", bytes, err);
        }
    }

    #[test]
    fn test_float_precision_selection() {
        let set = sample_set();
        assert_eq!(
            set.resolve(HostType::Float, &TypeHints::precision(20, 0)).unwrap().name,
            "REAL"
        );
        assert_eq!(
            set.resolve(HostType::Float, &TypeHints::default()).unwrap().name,
            "DOUBLE PRECISION"
        );
    }

    #[test]
    fn test_float_fallback_doubles_decimal_digits() {
        let set = sample_set();
        let t = set.resolve(HostType::Float, &TypeHints::precision(60, 0)).unwrap();
        assert_eq!(t.family, TypeFamily::Numeric);
        // ceil(60 * 0.30103) = 19 digits, doubled for range.
        assert_eq!(t.ddl_name(), "NUMERIC(38, 19)");
    }

    #[test]
    fn test_float_fallback_capacity_error() {
        let set = sample_set();
        let err = set.resolve(HostType::Float, &TypeHints::precision(200, 0)).unwrap_err();
        assert!(matches!(err, Error::Capacity(_)));
    }

    #[test]
    fn test_string_sizes() {
        let set = sample_set();
        assert_eq!(
            set.resolve(HostType::Str, &TypeHints::bytes(100)).unwrap().ddl_name(),
            "VARCHAR(100)"
        );
        assert_eq!(set.resolve(HostType::Str, &TypeHints::bytes(10_000)).unwrap().name, "TEXT");
        assert_eq!(set.resolve(HostType::Str, &TypeHints::bytes(0)).unwrap().name, "TEXT");
        let err = set.resolve(HostType::Str, &TypeHints::bytes(1 << 31)).unwrap_err();
        assert!(matches!(err, Error::Capacity(_)));
    }

    #[test]
    fn test_interval_falls_back_to_decimal_seconds() {
        let set = sample_set();
        let t = set.resolve(HostType::Interval, &TypeHints::default()).unwrap();
        assert_eq!(t.ddl_name(), "NUMERIC(20, 6)");
    }

    #[test]
    fn test_json_is_pickled_into_text() {
        let set = sample_set();
        assert_eq!(set.resolve(HostType::Json, &TypeHints::default()).unwrap().name, "TEXT");
    }

    #[test]
    fn test_missing_temporal_type_is_unsupported() {
        let set = sample_set();
        assert!(matches!(
            set.resolve(HostType::Time, &TypeHints::default()),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_explicit_override_wins() {
        let set = sample_set();
        let explicit = DatabaseType::new("CITEXT", TypeFamily::Varchar);
        let t = set.resolve(HostType::Str, &TypeHints::explicit(explicit.clone())).unwrap();
        assert_eq!(t, explicit);
    }

    #[test]
    fn test_from_type_name_with_parameters() {
        let set = sample_set();
        let t = set.from_type_name("character varying(40)", None, None, None).unwrap();
        assert_eq!(t.ddl_name(), "VARCHAR(40)");
        let n = set.from_type_name("numeric(10,2)", None, None, None).unwrap();
        assert_eq!(n.ddl_name(), "NUMERIC(10, 2)");
        assert!(matches!(
            set.from_type_name("geometry", None, None, None),
            Err(Error::Mapping(_))
        ));
    }
}
