/// Schema model: columns, tables, views and the catalog holding them.
///
/// A [`Table`] only edits memory until it is created; after that every
/// structural change is issued as DDL first and applied to memory once
/// the database accepted it.
mod catalog;
mod column;
mod crud;
mod table;
mod view;

pub use catalog::Schema;
pub use column::{Column, ColumnDef};
pub use table::{Index, Reference, Table, TableState};
pub use view::View;
