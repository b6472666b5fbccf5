use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::{TypeHints, WireValue};

use super::column::ColumnDef;
use super::table::{Index, Table, TableState};
use super::view::View;

/// Tables and views of one database, keyed by name.
#[derive(Debug)]
pub struct Schema {
    db: Arc<Database>,
    tables: BTreeMap<String, Table>,
    views: BTreeMap<String, View>,
}

impl Schema {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            tables: BTreeMap::new(),
            views: BTreeMap::new(),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    fn ensure_unused(&self, name: &str) -> Result<()> {
        if self.tables.contains_key(name) || self.views.contains_key(name) {
            return Err(Error::DuplicateIdentifier(name.to_string()));
        }
        Ok(())
    }

    pub fn add_table(&mut self, table: Table) -> Result<()> {
        self.ensure_unused(&table.name)?;
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn add_view(&mut self, view: View) -> Result<()> {
        self.ensure_unused(view.name())?;
        self.views.insert(view.name().to_string(), view);
        Ok(())
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.views.values()
    }

    /// Create every table and view not created yet, tables first.
    pub async fn create_all(&mut self) -> Result<()> {
        for table in self.tables.values_mut().filter(|t| !t.is_created()) {
            table.create(&self.db).await?;
        }
        for view in self.views.values_mut() {
            if view.state() != TableState::Created {
                view.create(&self.db).await?;
            }
        }
        Ok(())
    }

    /// Drop every view, then every table, and forget them.
    pub async fn drop_all(&mut self) -> Result<()> {
        while let Some((_, mut view)) = self.views.pop_first() {
            view.drop(&self.db).await?;
        }
        while let Some((_, mut table)) = self.tables.pop_first() {
            table.drop(&self.db).await?;
        }
        Ok(())
    }

    pub async fn drop_table(&mut self, name: &str) -> Result<()> {
        let table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| Error::mapping(format!("no table {}", name)))?;
        table.drop(&self.db).await?;
        self.tables.remove(name);
        Ok(())
    }

    /// Rename a table and every reference pointing at it.
    pub async fn rename_table(&mut self, old: &str, new: &str) -> Result<()> {
        self.ensure_unused(new)?;
        let mut table = self
            .tables
            .remove(old)
            .ok_or_else(|| Error::mapping(format!("no table {}", old)))?;
        if let Err(err) = table.rename(&self.db, new).await {
            self.tables.insert(old.to_string(), table);
            return Err(err);
        }
        self.tables.insert(new.to_string(), table);
        for table in self.tables.values_mut() {
            table.retarget_references(old, new);
        }
        Ok(())
    }

    /// Rebuild the tables of an existing database from its catalog.
    pub async fn discover(db: Arc<Database>) -> Result<Self> {
        let dialect = db.dialect();
        let names: Vec<String> = db
            .execute(&dialect.discover_tables_sql())
            .await?
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(text))
            .collect();
        info!(tables = names.len(), "discovering schema");

        let mut schema = Schema::new(Arc::clone(&db));
        for name in names {
            let table = discover_table(&db, &name).await?;
            schema.add_table(table)?;
        }
        Ok(schema)
    }
}

static NULL_CELL: WireValue = WireValue::Null;

async fn discover_table(db: &Database, name: &str) -> Result<Table> {
    let dialect = db.dialect();
    let mut table = Table::new(dialect, name);

    let columns = db.execute(&dialect.discover_columns_sql(name)).await?;
    for row in &columns.rows {
        let cell = |i: usize| row.get(i).unwrap_or(&NULL_CELL);
        let column_name = text(cell(0)).ok_or_else(|| Error::mapping(format!("unnamed column in {}", name)))?;
        let type_name = text(cell(1)).unwrap_or_default();
        let dbtype = db.typeset().from_type_name(
            &type_name,
            number(cell(2)),
            number(cell(3)).map(|p| p as u32),
            number(cell(4)).map(|s| s as u32),
        )?;
        let default = text(cell(6));
        let sequence = default.as_deref().and_then(sequence_from_default);
        let autoincrement = flag(cell(7)) || sequence.is_some();

        let mut def = ColumnDef::new(column_name.clone(), dbtype.default_host())
            .hints(TypeHints::explicit(dbtype));
        if flag(cell(5)) {
            def = def.primary_key();
        }
        if autoincrement && def.host_type == crate::types::HostType::Int {
            def = def.autoincrement();
        }
        table.define(dialect, db.typeset(), def)?;

        if let Some(column) = table.column_mut(&column_name) {
            if sequence.is_some() {
                column.sequence_name = sequence;
            } else if let Some(raw) = default.as_deref().filter(|_| !column.autoincrement) {
                match column.pull(&WireValue::Text(strip_default(raw))) {
                    Ok(value) if !value.is_null() => column.default = Some(value),
                    Ok(_) => {}
                    Err(err) => debug!(table = name, column = %column_name, default = raw, %err, "default not kept"),
                }
            }
        }
    }

    if let Some(sql) = dialect.discover_indices_sql(name) {
        let indices = db.execute(&sql).await?;
        let mut seen = Vec::new();
        for row in &indices.rows {
            let cell = |i: usize| row.get(i).unwrap_or(&NULL_CELL);
            let (Some(index_name), Some(column_name)) = (text(cell(0)), text(cell(1))) else {
                continue;
            };
            // Multi-column indices keep their first column only.
            if seen.contains(&index_name) {
                continue;
            }
            if !table.columns().any(|c| c.name == column_name) {
                return Err(Error::mapping(format!(
                    "index {} names unknown column {}.{}",
                    index_name, name, column_name
                )));
            }
            table.attach_index(Index {
                quoted_name: dialect.quote_identifier(&index_name),
                name: index_name.clone(),
                table_name: name.to_string(),
                column_name,
                unique: flag(cell(2)),
            });
            seen.push(index_name);
        }
    }

    table.mark_created();
    debug!(table = name, columns = table.columns().count(), "discovered");
    Ok(table)
}

fn text(wire: &WireValue) -> Option<String> {
    match wire {
        WireValue::Null => None,
        WireValue::Text(s) => Some(s.clone()),
        WireValue::Int(i) => Some(i.to_string()),
        WireValue::Float(f) => Some(f.to_string()),
        WireValue::Bool(b) => Some(b.to_string()),
        WireValue::Bytes(b) => String::from_utf8(b.clone()).ok(),
        WireValue::IntPair(hi, lo) => Some((((*hi as i64) << 32) | *lo as i64).to_string()),
    }
}

fn number(wire: &WireValue) -> Option<u64> {
    text(wire).and_then(|s| s.trim().parse().ok())
}

fn flag(wire: &WireValue) -> bool {
    match wire {
        WireValue::Bool(b) => *b,
        WireValue::Int(i) => *i != 0,
        other => text(other).is_some_and(|s| {
            matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "t" | "true" | "yes" | "y")
        }),
    }
}

/// `nextval('"people_id_seq"'::regclass)` -> `people_id_seq`
fn sequence_from_default(default: &str) -> Option<String> {
    let rest = default.trim().strip_prefix("nextval(")?;
    let start = rest.find('\'')? + 1;
    let len = rest[start..].find('\'')?;
    Some(rest[start..start + len].trim_matches('"').to_string())
}

/// Turn a catalog default into the text a driver would return: quoted
/// literals lose their quotes and casts are dropped.
fn strip_default(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(body) = raw.strip_prefix('\'') {
        let mut out = String::new();
        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push('\'');
                    continue;
                }
                break;
            }
            out.push(c);
        }
        return out;
    }
    let bare = raw.split("::").next().unwrap_or(raw).trim();
    bare.trim_start_matches('(').trim_end_matches(')').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{QueryOutput, RecordingManager};
    use crate::dialect::{GenericDialect, PostgresDialect};
    use crate::types::{HostType, Value};

    fn cells(values: &[Option<&str>]) -> Vec<WireValue> {
        values.iter().map(|v| WireValue::from(*v)).collect()
    }

    #[test]
    fn test_strip_default() {
        assert_eq!(strip_default("'O''Brien'::character varying"), "O'Brien");
        assert_eq!(strip_default("42"), "42");
        assert_eq!(strip_default("(-1)::integer"), "-1");
        assert_eq!(
            sequence_from_default("nextval('people_id_seq'::regclass)"),
            Some("people_id_seq".to_string())
        );
        assert_eq!(sequence_from_default("now()"), None);
    }

    #[tokio::test]
    async fn test_discover_postgres_catalog() {
        let manager = RecordingManager::new();
        manager
            .reply("SELECT c.relname", QueryOutput::rows(vec![cells(&[Some("people")])]))
            .reply(
                "SELECT c.column_name",
                QueryOutput::rows(vec![
                    cells(&[Some("id"), Some("integer"), None, Some("32"), Some("0"), Some("1"),
                        Some("nextval('people_id_seq'::regclass)"), Some("1")]),
                    cells(&[Some("name"), Some("character varying"), Some("64"), None, None, Some("0"),
                        Some("'nobody'::character varying"), Some("0")]),
                    cells(&[Some("seen"), Some("timestamp without time zone"), None, None, None, Some("0"),
                        Some("now()"), Some("0")]),
                ]),
            )
            .reply(
                "SELECT i.relname",
                QueryOutput::rows(vec![cells(&[Some("people_name_key"), Some("name"), Some("1")])]),
            );
        let db = Arc::new(Database::new(Arc::new(manager.clone()), Arc::new(PostgresDialect)));
        let schema = Schema::discover(db).await.unwrap();

        let people = schema.table("people").unwrap();
        assert!(people.is_created());
        let id = people.column("id").unwrap();
        assert!(id.is_key && id.autoincrement);
        assert_eq!(id.sequence_name.as_deref(), Some("people_id_seq"));
        let name = people.column("name").unwrap();
        assert_eq!(name.host_type, HostType::Str);
        assert_eq!(name.default, Some(Value::from("nobody")));
        assert_eq!(people.column("seen").unwrap().default, None);
        assert_eq!(people.indices()[0].name, "people_name_key");
        assert!(people.indices()[0].unique);
    }

    #[tokio::test]
    async fn test_discover_unknown_type_is_mapping_error() {
        let manager = RecordingManager::new();
        manager
            .reply("SELECT table_name", QueryOutput::rows(vec![cells(&[Some("t")])]))
            .reply(
                "SELECT column_name",
                QueryOutput::rows(vec![cells(&[Some("a"), Some("hologram"), None, None, None, Some("0"), None, Some("0")])]),
            );
        let db = Arc::new(Database::new(Arc::new(manager), Arc::new(GenericDialect)));
        assert!(matches!(Schema::discover(db).await, Err(Error::Mapping(_))));
    }

    #[tokio::test]
    async fn test_rename_table_retargets_references() {
        let manager = RecordingManager::new();
        let db = Arc::new(Database::new(Arc::new(manager.clone()), Arc::new(GenericDialect)));
        let mut zoos = Table::new(db.dialect(), "zoos");
        zoos.define(db.dialect(), db.typeset(), ColumnDef::new("id", HostType::Int).primary_key())
            .unwrap();
        let mut animals = Table::new(db.dialect(), "animals");
        animals
            .define(db.dialect(), db.typeset(), ColumnDef::new("zoo_id", HostType::Int))
            .unwrap();
        animals.reference("zoo_id", &zoos, "id").unwrap();

        let mut schema = Schema::new(Arc::clone(&db));
        schema.add_table(zoos).unwrap();
        schema.add_table(animals).unwrap();
        assert!(matches!(
            schema.add_table(Table::new(db.dialect(), "zoos")),
            Err(Error::DuplicateIdentifier(_))
        ));
        schema.create_all().await.unwrap();
        schema.rename_table("zoos", "parks").await.unwrap();

        assert!(schema.table("zoos").is_none());
        let animals = schema.table("animals").unwrap();
        assert_eq!(animals.references()[0].far_table, "parks");
        assert_eq!(
            manager.statements().last().unwrap(),
            "ALTER TABLE \"zoos\" RENAME TO \"parks\""
        );

        schema.drop_all().await.unwrap();
        assert_eq!(schema.tables().count(), 0);
        assert_eq!(manager.statements().last().unwrap(), "DROP TABLE \"parks\"");
    }
}
