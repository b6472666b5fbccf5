use crate::db::Database;
use crate::error::{Error, Result};
use crate::sql::Statement;
use crate::types::TypeHints;

use super::column::ColumnDef;
use super::table::{Table, TableState};

/// A named SELECT. Its columns follow the statement's output order and
/// keep the output types, so a view can be queried like a table.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    table: Table,
    select_sql: String,
}

impl View {
    pub fn new(db: &Database, name: impl Into<String>, statement: &Statement<'_>) -> Result<Self> {
        let name = name.into();
        let compiled = db.builder().select(statement)?;
        if compiled.imperfect {
            return Err(Error::Translation(format!(
                "view {} needs an exact restriction",
                name
            )));
        }
        let mut table = Table::new(db.dialect(), name);
        for output in &compiled.columns {
            let def = ColumnDef::new(output.name.clone(), output.host_type)
                .hints(TypeHints::explicit(output.dbtype.clone()));
            table.define(db.dialect(), db.typeset(), def)?;
        }
        Ok(Self {
            table,
            select_sql: compiled.sql,
        })
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    pub fn select_sql(&self) -> &str {
        &self.select_sql
    }

    /// The view's columns, for use as a query relation.
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn state(&self) -> TableState {
        self.table.state()
    }

    pub async fn create(&mut self, db: &Database) -> Result<()> {
        self.table.ensure_live()?;
        if self.table.is_created() {
            return Err(Error::programmer(format!("view {} already exists", self.name())));
        }
        db.ddl(&[db.dialect().create_view_sql(self.name(), &self.select_sql)])
            .await?;
        self.table.mark_created();
        Ok(())
    }

    pub async fn drop(&mut self, db: &Database) -> Result<()> {
        self.table.ensure_live()?;
        if self.table.is_created() {
            db.ddl(&[db.dialect().drop_view_sql(self.name())]).await?;
        }
        self.table.mark_dropped();
        Ok(())
    }
}
