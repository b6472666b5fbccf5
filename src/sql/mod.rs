/// Statement assembly: relations, joins and SELECT/UPDATE/DELETE/INSERT.
mod builder;
mod join;
mod query;
mod verify;

pub use builder::SqlBuilder;
pub use join::{aliases, FromClause};
pub use query::{
    Assignment, Attributes, Bias, CompiledStatement, Join, Order, OutputColumn, Query, Relation,
    Statement,
};
pub use verify::{verify, verify_all};
