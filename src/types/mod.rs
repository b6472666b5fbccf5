/// Type registry: host values, database type descriptors and the
/// selection policy that maps one onto the other.
mod dbtype;
mod typeset;
mod value;

pub use dbtype::{ByteLimit, DatabaseType, FixedRange, Precision, TypeFamily};
pub use typeset::{
    DatabaseTypeSet, TypeHints, DEFAULT_FLOAT_PRECISION, DEFAULT_INT_BYTES,
    DEFAULT_NUMERIC_PRECISION, DEFAULT_NUMERIC_SCALE, DEFAULT_STR_BYTES,
};
pub use value::{HostType, Kwargs, Row, Value, WireValue};
