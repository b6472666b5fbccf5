use tracing::debug;

use crate::db::Database;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::types::DatabaseTypeSet;

use super::column::{Column, ColumnDef};

/// A foreign key from `near` (a column key of the owning table) to
/// column `far` of table `far_table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub near: String,
    pub far_table: String,
    pub far: String,
}

/// Single-column index, named `{table}_{column}_idx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub quoted_name: String,
    pub table_name: String,
    pub column_name: String,
    pub unique: bool,
}

impl Index {
    fn new(dialect: &dyn Dialect, table: &str, column: &str, unique: bool) -> Self {
        let name = format!("{}_{}_idx", table, column);
        Self {
            quoted_name: dialect.quote_identifier(&name),
            name,
            table_name: table.to_string(),
            column_name: column.to_string(),
            unique,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// Declared only; schema changes stay in memory.
    Uncreated,
    /// Exists in the database; schema changes are issued as DDL.
    Created,
    Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub quoted_name: String,
    columns: Vec<Column>,
    indices: Vec<Index>,
    references: Vec<Reference>,
    state: TableState,
}

impl Table {
    pub fn new(dialect: &dyn Dialect, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            quoted_name: dialect.quote_identifier(&name),
            name,
            columns: Vec::new(),
            indices: Vec::new(),
            references: Vec::new(),
            state: TableState::Uncreated,
        }
    }

    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.key == key)
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_key)
    }

    pub fn indices(&self) -> &[Index] {
        &self.indices
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn references_to<'s>(&'s self, far_table: &'s str) -> impl Iterator<Item = &'s Reference> {
        self.references.iter().filter(move |r| r.far_table == far_table)
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn is_created(&self) -> bool {
        self.state == TableState::Created
    }

    pub(crate) fn mark_created(&mut self) {
        self.state = TableState::Created;
    }

    pub(crate) fn mark_dropped(&mut self) {
        self.state = TableState::Dropped;
    }

    /// Declare a column on a table that does not exist yet. Use
    /// [`Table::add_column`] once the table is created.
    pub fn define(&mut self, dialect: &dyn Dialect, typeset: &DatabaseTypeSet, def: ColumnDef) -> Result<()> {
        self.ensure_live()?;
        if self.is_created() {
            return Err(Error::programmer(format!(
                "table {} already exists; use add_column",
                self.name
            )));
        }
        self.push_column(dialect, typeset, def).map(|_| ())
    }

    fn push_column(&mut self, dialect: &dyn Dialect, typeset: &DatabaseTypeSet, def: ColumnDef) -> Result<&Column> {
        if self.column(&def.key).is_some() {
            return Err(Error::DuplicateIdentifier(format!("{}.{}", self.name, def.key)));
        }
        let column = def.build(&self.name, dialect, typeset)?;
        if self.columns.iter().any(|c| c.name == column.name) {
            return Err(Error::DuplicateIdentifier(format!("{}.{}", self.name, column.name)));
        }
        if column.is_key && dialect.index_primary_keys() {
            self.indices.push(Index::new(dialect, &self.name, &column.name, true));
        }
        self.columns.push(column);
        Ok(&self.columns[self.columns.len() - 1])
    }

    /// Declare an index on a table that does not exist yet.
    pub fn define_index(&mut self, dialect: &dyn Dialect, column_key: &str, unique: bool) -> Result<()> {
        self.ensure_live()?;
        let index = self.new_index(dialect, column_key, unique)?;
        self.indices.push(index);
        Ok(())
    }

    fn new_index(&self, dialect: &dyn Dialect, column_key: &str, unique: bool) -> Result<Index> {
        let column = self.require(column_key)?;
        let index = Index::new(dialect, &self.name, &column.name, unique);
        if self.indices.iter().any(|i| i.name == index.name) {
            return Err(Error::DuplicateIdentifier(index.name));
        }
        Ok(index)
    }

    /// Record that column `near` refers to column `far` of `far_table`.
    pub fn reference(&mut self, near: &str, far_table: &Table, far: &str) -> Result<()> {
        self.require(near)?;
        far_table.require(far)?;
        self.references.push(Reference {
            near: near.to_string(),
            far_table: far_table.name.clone(),
            far: far.to_string(),
        });
        Ok(())
    }

    pub(crate) fn column_mut(&mut self, key: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.key == key)
    }

    /// Attach an index that already exists under its own name.
    pub(crate) fn attach_index(&mut self, index: Index) {
        self.indices.retain(|i| i.name != index.name);
        self.indices.push(index);
    }

    pub(crate) fn retarget_references(&mut self, old: &str, new: &str) {
        for r in self.references.iter_mut().filter(|r| r.far_table == old) {
            r.far_table = new.to_string();
        }
    }

    pub(crate) fn require(&self, key: &str) -> Result<&Column> {
        self.column(key)
            .ok_or_else(|| Error::mapping(format!("no column {} in table {}", key, self.name)))
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.state == TableState::Dropped {
            return Err(Error::Dropped(format!("table {}", self.name)));
        }
        Ok(())
    }

    // ---- DDL ----

    pub async fn create(&mut self, db: &Database) -> Result<()> {
        self.ensure_live()?;
        if self.is_created() {
            return Err(Error::programmer(format!("table {} already exists", self.name)));
        }
        db.ddl(&db.dialect().create_table_sql(self)?).await?;
        debug!(table = %self.name, "created");
        self.state = TableState::Created;
        Ok(())
    }

    pub async fn drop(&mut self, db: &Database) -> Result<()> {
        self.ensure_live()?;
        if self.is_created() {
            db.ddl(&db.dialect().drop_table_sql(self)).await?;
        }
        self.state = TableState::Dropped;
        Ok(())
    }

    pub async fn rename(&mut self, db: &Database, new_name: impl Into<String>) -> Result<()> {
        self.ensure_live()?;
        let new_name = new_name.into();
        if self.is_created() {
            db.ddl(&[db.dialect().rename_table_sql(&self.name, &new_name)]).await?;
        }
        for index in &mut self.indices {
            index.table_name = new_name.clone();
        }
        self.quoted_name = db.dialect().quote_identifier(&new_name);
        self.name = new_name;
        Ok(())
    }

    pub async fn add_column(&mut self, db: &Database, def: ColumnDef) -> Result<()> {
        self.ensure_live()?;
        let key = def.key.clone();
        self.push_column(db.dialect(), db.typeset(), def)?;
        if self.is_created() {
            let statements = self
                .require(&key)
                .and_then(|c| db.dialect().add_column_sql(self, c));
            let result = match statements {
                Ok(statements) => db.ddl(&statements).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                self.forget_column(&key);
                return Err(err);
            }
        }
        Ok(())
    }

    pub async fn drop_column(&mut self, db: &Database, key: &str) -> Result<()> {
        self.ensure_live()?;
        let column = self.require(key)?;
        if self.is_created() {
            db.ddl(&db.dialect().drop_column_sql(self, column)).await?;
        }
        self.forget_column(key);
        Ok(())
    }

    fn forget_column(&mut self, key: &str) {
        if let Some(pos) = self.columns.iter().position(|c| c.key == key) {
            let column = self.columns.remove(pos);
            self.indices.retain(|i| i.column_name != column.name);
            self.references.retain(|r| r.near != key);
        }
    }

    /// Rename the database column behind `key`. The key is kept, so
    /// expressions written against it stay valid.
    pub async fn rename_column(&mut self, db: &Database, key: &str, new_name: &str) -> Result<()> {
        self.ensure_live()?;
        let column = self.require(key)?;
        if self.columns.iter().any(|c| c.name == new_name) {
            return Err(Error::DuplicateIdentifier(format!("{}.{}", self.name, new_name)));
        }
        if self.is_created() {
            db.ddl(&[db.dialect().rename_column_sql(self, column, new_name)]).await?;
        }
        let old_name = column.name.clone();
        let quoted = db.dialect().quote_identifier(new_name);
        if let Some(column) = self.columns.iter_mut().find(|c| c.key == key) {
            column.name = new_name.to_string();
            column.quoted_name = quoted;
        }
        for index in self.indices.iter_mut().filter(|i| i.column_name == old_name) {
            index.column_name = new_name.to_string();
        }
        Ok(())
    }

    pub async fn add_index(&mut self, db: &Database, column_key: &str, unique: bool) -> Result<()> {
        self.ensure_live()?;
        let index = self.new_index(db.dialect(), column_key, unique)?;
        if self.is_created() {
            db.ddl(&[db.dialect().create_index_sql(&index)]).await?;
        }
        self.indices.push(index);
        Ok(())
    }

    pub async fn drop_index(&mut self, db: &Database, name: &str) -> Result<()> {
        self.ensure_live()?;
        let pos = self
            .indices
            .iter()
            .position(|i| i.name == name)
            .ok_or_else(|| Error::mapping(format!("no index {} on table {}", name, self.name)))?;
        if self.is_created() {
            db.ddl(&[db.dialect().drop_index_sql(&self.indices[pos])]).await?;
        }
        self.indices.remove(pos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RecordingManager;
    use crate::dialect::{GenericDialect, PostgresDialect};
    use crate::types::{HostType, TypeHints};
    use std::sync::Arc;

    fn people(db: &Database) -> Table {
        let mut t = Table::new(db.dialect(), "people");
        t.define(
            db.dialect(),
            db.typeset(),
            ColumnDef::new("id", HostType::Int).primary_key().autoincrement(),
        )
        .unwrap();
        t.define(
            db.dialect(),
            db.typeset(),
            ColumnDef::new("name", HostType::Str).hints(TypeHints::bytes(64)),
        )
        .unwrap();
        t
    }

    #[test]
    fn test_define_rejects_duplicates() {
        let d = GenericDialect;
        let set = d.type_set();
        let mut t = Table::new(&d, "t");
        t.define(&d, &set, ColumnDef::new("a", HostType::Int)).unwrap();
        assert!(matches!(
            t.define(&d, &set, ColumnDef::new("a", HostType::Str)),
            Err(Error::DuplicateIdentifier(_))
        ));
        assert!(matches!(
            t.define(&d, &set, ColumnDef::new("b", HostType::Str).named("a")),
            Err(Error::DuplicateIdentifier(_))
        ));
        t.define_index(&d, "a", false).unwrap();
        assert!(matches!(t.define_index(&d, "a", true), Err(Error::DuplicateIdentifier(_))));
        assert!(matches!(t.define_index(&d, "zz", true), Err(Error::Mapping(_))));
        assert_eq!(t.indices()[0].name, "t_a_idx");
    }

    #[test]
    fn test_reference_requires_both_columns() {
        let d = GenericDialect;
        let set = d.type_set();
        let mut zoos = Table::new(&d, "zoos");
        zoos.define(&d, &set, ColumnDef::new("id", HostType::Int).primary_key()).unwrap();
        let mut animals = Table::new(&d, "animals");
        animals.define(&d, &set, ColumnDef::new("zoo_id", HostType::Int)).unwrap();
        assert!(matches!(animals.reference("zoo_id", &zoos, "nope"), Err(Error::Mapping(_))));
        animals.reference("zoo_id", &zoos, "id").unwrap();
        assert_eq!(animals.references_to("zoos").count(), 1);
        assert_eq!(animals.references_to("cages").count(), 0);
    }

    #[tokio::test]
    async fn test_create_emits_sequence_and_table() {
        let manager = RecordingManager::new();
        let db = Database::new(Arc::new(manager.clone()), Arc::new(PostgresDialect));
        let mut t = people(&db);
        t.create(&db).await.unwrap();
        assert!(t.is_created());
        let statements = manager.statements();
        assert_eq!(statements[0], "CREATE SEQUENCE \"people_id_seq\"");
        assert!(statements[1].starts_with("CREATE TABLE \"people\" (\"id\" "));
        assert!(statements[1].ends_with("PRIMARY KEY (\"id\"))"));
        assert!(matches!(t.create(&db).await, Err(Error::Programmer(_))));
    }

    #[tokio::test]
    async fn test_changes_before_create_stay_in_memory() {
        let manager = RecordingManager::new();
        let db = Database::new(Arc::new(manager.clone()), Arc::new(GenericDialect));
        let mut t = people(&db);
        t.add_column(&db, ColumnDef::new("age", HostType::Int)).await.unwrap();
        t.add_index(&db, "name", false).await.unwrap();
        t.rename_column(&db, "name", "full_name").await.unwrap();
        assert!(manager.statements().is_empty());
        assert_eq!(t.column("name").unwrap().name, "full_name");
        assert_eq!(t.indices()[0].column_name, "full_name");
    }

    #[tokio::test]
    async fn test_schema_changes_on_created_table() {
        let manager = RecordingManager::new();
        let db = Database::new(Arc::new(manager.clone()), Arc::new(GenericDialect));
        let mut t = people(&db);
        t.create(&db).await.unwrap();
        manager.clear();

        t.add_column(&db, ColumnDef::new("age", HostType::Int)).await.unwrap();
        t.rename_column(&db, "age", "years").await.unwrap();
        t.add_index(&db, "age", true).await.unwrap();
        t.drop_index(&db, "people_years_idx").await.unwrap();
        t.drop_column(&db, "age").await.unwrap();
        t.rename(&db, "persons").await.unwrap();

        let statements = manager.statements();
        assert!(statements[0].starts_with("ALTER TABLE \"people\" ADD COLUMN \"age\" "));
        assert_eq!(
            &statements[1..],
            &[
                "ALTER TABLE \"people\" RENAME COLUMN \"age\" TO \"years\"",
                "CREATE UNIQUE INDEX \"people_years_idx\" ON \"people\" (\"years\")",
                "DROP INDEX \"people_years_idx\"",
                "ALTER TABLE \"people\" DROP COLUMN \"years\"",
                "ALTER TABLE \"people\" RENAME TO \"persons\"",
            ]
        );
        assert!(t.column("age").is_none());
        assert_eq!(t.quoted_name, "\"persons\"");
    }

    #[tokio::test]
    async fn test_failed_add_column_is_rolled_back() {
        let manager = RecordingManager::new();
        let db = Database::new(Arc::new(manager.clone()), Arc::new(GenericDialect));
        let mut t = people(&db);
        t.create(&db).await.unwrap();
        manager.fail("ALTER", Error::Connection("denied".into()));
        assert!(t.add_column(&db, ColumnDef::new("age", HostType::Int)).await.is_err());
        assert!(t.column("age").is_none());
    }

    #[tokio::test]
    async fn test_dropped_table_refuses_changes() {
        let manager = RecordingManager::new();
        let db = Database::new(Arc::new(manager.clone()), Arc::new(GenericDialect));
        let mut t = people(&db);
        t.create(&db).await.unwrap();
        t.drop(&db).await.unwrap();
        assert_eq!(t.state(), TableState::Dropped);
        assert_eq!(manager.statements().last().unwrap(), "DROP TABLE \"people\"");
        assert!(matches!(t.drop(&db).await, Err(Error::Dropped(_))));
        assert!(matches!(
            t.add_column(&db, ColumnDef::new("x", HostType::Int)).await,
            Err(Error::Dropped(_))
        ));
    }
}
