use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Settings;
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::expr::{CompileCache, Env, FunctionRegistry};
use crate::sql::{Attributes, CompiledStatement, SqlBuilder, Statement};
use crate::types::{DatabaseTypeSet, Row};

use super::manager::{Connection, ConnectionManager, QueryOutput};

/// Everything needed to compile and run statements against one database.
///
/// Statements run on a pooled connection each, or on the transaction's
/// connection while one is open. While the DDL lock is held no new
/// transaction may start.
pub struct Database {
    manager: Arc<dyn ConnectionManager>,
    dialect: Arc<dyn Dialect>,
    typeset: DatabaseTypeSet,
    functions: FunctionRegistry,
    cache: CompileCache,
    strict: bool,
    transaction: Mutex<Option<Box<dyn Connection>>>,
    ddl_locked: AtomicBool,
}

impl Database {
    pub fn new(manager: Arc<dyn ConnectionManager>, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            manager,
            typeset: dialect.type_set(),
            dialect,
            functions: FunctionRegistry::standard(),
            cache: CompileCache::default(),
            strict: false,
            transaction: Mutex::new(None),
            ddl_locked: AtomicBool::new(false),
        }
    }

    pub fn from_settings(manager: Arc<dyn ConnectionManager>, settings: &Settings) -> Self {
        let mut db = Self::new(manager, settings.dialect.build());
        db.cache = CompileCache::new(settings.cache_capacity);
        db.strict = settings.strict;
        db
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Refuse imperfect SELECT restrictions instead of re-filtering.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn typeset(&self) -> &DatabaseTypeSet {
        &self.typeset
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    pub fn env(&self) -> Env<'_> {
        Env::new(self.dialect.as_ref(), &self.typeset, &self.functions).with_cache(&self.cache)
    }

    pub fn builder(&self) -> SqlBuilder<'_> {
        SqlBuilder::new(self.env()).strict(self.strict)
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryOutput> {
        let mut outputs = self.run(&[sql]).await?;
        outputs
            .pop()
            .ok_or_else(|| Error::Connection(format!("no result for {}", sql)))
    }

    /// Run `statements` in order on a single connection.
    pub async fn execute_all<S: AsRef<str> + Sync>(&self, statements: &[S]) -> Result<Vec<QueryOutput>> {
        let statements: Vec<&str> = statements.iter().map(AsRef::as_ref).collect();
        self.run(&statements).await
    }

    async fn run(&self, statements: &[&str]) -> Result<Vec<QueryOutput>> {
        let mut transaction = self.transaction.lock().await;
        if let Some(conn) = transaction.as_mut() {
            return run_on(conn.as_mut(), statements).await;
        }
        drop(transaction);

        let mut conn = self.manager.acquire().await?;
        let result = run_on(conn.as_mut(), statements).await;
        self.manager.release(conn).await?;
        result
    }

    pub async fn begin(&self) -> Result<()> {
        // The lock flag is only read or set with the transaction slot held.
        let mut transaction = self.transaction.lock().await;
        if self.ddl_locked.load(Ordering::Acquire) {
            return Err(Error::Locked("schema change in progress; cannot begin a transaction".into()));
        }
        if transaction.is_some() {
            return Err(Error::programmer("a transaction is already open"));
        }
        let mut conn = self.manager.acquire().await?;
        if let Err(err) = conn.execute("BEGIN").await {
            self.manager.release(conn).await?;
            return Err(err);
        }
        debug!(manager = %self.manager.describe(), "transaction started");
        *transaction = Some(conn);
        Ok(())
    }

    pub async fn commit(&self) -> Result<()> {
        self.finish("COMMIT").await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&self, keyword: &str) -> Result<()> {
        let taken = self.transaction.lock().await.take();
        let conn = taken.ok_or_else(|| Error::programmer(format!("{} without a transaction", keyword)))?;
        self.close(conn, keyword).await
    }

    async fn close(&self, mut conn: Box<dyn Connection>, keyword: &str) -> Result<()> {
        let result = conn.execute(keyword).await;
        self.manager.release(conn).await?;
        debug!(keyword, "transaction finished");
        result.map(|_| ())
    }

    pub async fn in_transaction(&self) -> bool {
        self.transaction.lock().await.is_some()
    }

    pub fn ddl_locked(&self) -> bool {
        self.ddl_locked.load(Ordering::Acquire)
    }

    /// Take the schema lock, committing any open transaction first. The
    /// lock is released when the guard drops.
    pub async fn lock_ddl(&self) -> Result<DdlLock<'_>> {
        let mut transaction = self.transaction.lock().await;
        if self.ddl_locked.swap(true, Ordering::AcqRel) {
            return Err(Error::Locked("schema lock already held".into()));
        }
        let lock = DdlLock { db: self };
        if let Some(conn) = transaction.take() {
            info!("committing open transaction before schema change");
            self.close(conn, "COMMIT").await?;
        }
        Ok(lock)
    }

    /// Run schema statements under the DDL lock. Compiled predicates are
    /// forgotten afterwards since they may name changed columns.
    pub async fn ddl<S: AsRef<str> + Sync>(&self, statements: &[S]) -> Result<()> {
        let _lock = self.lock_ddl().await?;
        for statement in statements {
            info!(sql = %statement.as_ref(), "ddl");
        }
        self.execute_all(statements).await?;
        self.cache.clear();
        Ok(())
    }

    /// Run a SELECT and decode its rows. Rows matched only by an imperfect
    /// restriction are re-filtered here.
    pub async fn select(&self, statement: &Statement<'_>) -> Result<Vec<Row>> {
        let compiled = self.builder().select(statement)?;
        if compiled.imperfect && !matches!(statement.query.attributes, Attributes::All) {
            return Err(Error::Translation(
                "an imperfect restriction needs every column selected to re-filter rows".into(),
            ));
        }
        let output = self.execute(&compiled.sql).await?;
        let rows = output
            .rows
            .iter()
            .map(|cells| compiled.decode_row(cells))
            .collect::<Result<Vec<_>>>()?;
        if compiled.imperfect {
            return self.refilter(statement, &compiled, rows);
        }
        Ok(rows)
    }

    fn refilter(&self, statement: &Statement<'_>, compiled: &CompiledStatement, rows: Vec<Row>) -> Result<Vec<Row>> {
        let Some(restriction) = &statement.query.restriction else {
            return Ok(rows);
        };
        let tables = statement.query.relation.table_count();
        let fetched = rows.len();
        let mut kept = Vec::with_capacity(fetched);
        for row in rows {
            let parts = compiled.split_row(&row, tables);
            let refs: Vec<&Row> = parts.iter().collect();
            if restriction.matches(&refs, &statement.kwargs, &self.functions)? {
                kept.push(row);
            }
        }
        debug!(fetched, kept = kept.len(), "re-filtered imperfect result");
        Ok(kept)
    }
}

async fn run_on(conn: &mut dyn Connection, statements: &[&str]) -> Result<Vec<QueryOutput>> {
    let mut outputs = Vec::with_capacity(statements.len());
    for sql in statements {
        debug!(sql = %sql, "execute");
        outputs.push(conn.execute(sql).await?);
    }
    Ok(outputs)
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("manager", &self.manager.describe())
            .field("dialect", &self.dialect.name())
            .field("strict", &self.strict)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Held while schema statements run.
pub struct DdlLock<'a> {
    db: &'a Database,
}

impl Drop for DdlLock<'_> {
    fn drop(&mut self) {
        self.db.ddl_locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RecordingManager;
    use crate::dialect::{GenericDialect, SqliteDialect};
    use crate::expr::{Expression, Node};
    use crate::schema::{ColumnDef, Table};
    use crate::sql::Query;
    use crate::types::{HostType, Value, WireValue};
    use async_trait::async_trait;

    fn database(manager: &RecordingManager) -> Database {
        Database::new(Arc::new(manager.clone()), Arc::new(GenericDialect))
    }

    #[tokio::test]
    async fn test_transaction_uses_one_connection() {
        let manager = RecordingManager::new();
        let db = database(&manager);
        db.begin().await.unwrap();
        assert!(db.in_transaction().await);
        db.execute("UPDATE t SET a = 1").await.unwrap();
        assert_eq!(manager.outstanding(), 1);
        db.commit().await.unwrap();
        assert!(!db.in_transaction().await);
        assert_eq!(manager.outstanding(), 0);
        assert_eq!(manager.statements(), vec!["BEGIN", "UPDATE t SET a = 1", "COMMIT"]);
        assert!(matches!(db.rollback().await, Err(Error::Programmer(_))));
    }

    #[tokio::test]
    async fn test_ddl_lock_commits_and_blocks_begin() {
        let manager = RecordingManager::new();
        let db = database(&manager);
        db.begin().await.unwrap();
        let lock = db.lock_ddl().await.unwrap();
        assert!(!db.in_transaction().await);
        assert!(matches!(db.begin().await, Err(Error::Locked(_))));
        assert!(matches!(db.lock_ddl().await, Err(Error::Locked(_))));
        drop(lock);
        assert!(!db.ddl_locked());
        db.begin().await.unwrap();
        db.rollback().await.unwrap();
        assert_eq!(
            manager.statements(),
            vec!["BEGIN", "COMMIT", "BEGIN", "ROLLBACK"]
        );
    }

    /// Yields before handing out a connection so concurrent callers interleave.
    struct YieldingManager(RecordingManager);

    #[async_trait]
    impl ConnectionManager for YieldingManager {
        async fn acquire(&self) -> Result<Box<dyn Connection>> {
            tokio::task::yield_now().await;
            self.0.acquire().await
        }

        async fn release(&self, connection: Box<dyn Connection>) -> Result<()> {
            tokio::task::yield_now().await;
            self.0.release(connection).await
        }

        fn describe(&self) -> String {
            self.0.describe()
        }
    }

    #[tokio::test]
    async fn test_concurrent_begin_and_ddl_lock() {
        let manager = RecordingManager::new();
        let db = Database::new(Arc::new(YieldingManager(manager.clone())), Arc::new(GenericDialect));
        let (begun, lock) = tokio::join!(db.begin(), db.lock_ddl());
        let lock = lock.unwrap();
        assert!(!db.in_transaction().await);
        match begun {
            Ok(()) => assert_eq!(manager.statements(), vec!["BEGIN", "COMMIT"]),
            Err(err) => {
                assert!(matches!(err, Error::Locked(_)));
                assert!(manager.statements().is_empty());
            }
        }
        drop(lock);
        assert_eq!(manager.outstanding(), 0);

        let manager = RecordingManager::new();
        let db = Database::new(Arc::new(YieldingManager(manager.clone())), Arc::new(GenericDialect));
        let (lock, begun) = tokio::join!(db.lock_ddl(), db.begin());
        let _lock = lock.unwrap();
        assert!(matches!(begun, Err(Error::Locked(_))));
        assert!(!db.in_transaction().await);
        assert!(manager.statements().is_empty());
    }

    #[tokio::test]
    async fn test_ddl_clears_compile_cache() {
        let manager = RecordingManager::new();
        let db = database(&manager);
        let mut t = Table::new(db.dialect(), "t");
        t.define(db.dialect(), db.typeset(), ColumnDef::new("a", HostType::Int)).unwrap();
        let expr = Expression::lambda(["r"], |[r]| r.attr("a").eq(1));
        db.select(&Statement::new(Query::new(&t).filter(expr))).await.unwrap();
        assert_eq!(db.cache().len(), 1);
        db.ddl(&["DROP TABLE \"t\""]).await.unwrap();
        assert!(db.cache().is_empty());
        assert!(!db.ddl_locked());
    }

    #[tokio::test]
    async fn test_imperfect_select_is_refiltered() {
        let manager = RecordingManager::new();
        let db = Database::new(Arc::new(manager.clone()), Arc::new(SqliteDialect));
        let mut t = Table::new(db.dialect(), "people");
        t.define(db.dialect(), db.typeset(), ColumnDef::new("name", HostType::Str)).unwrap();
        manager.reply(
            "SELECT",
            QueryOutput::rows(vec![vec![WireValue::from("Alice")], vec![WireValue::from("alan")]]),
        );

        // SQLite LIKE ignores case, so the SQL matches both rows.
        let expr = Expression::lambda(["p"], |[p]| p.attr("name").startswith("Al"));
        let rows = db.select(&Statement::new(Query::new(&t).filter(expr.clone()))).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], Value::from("Alice"));

        let strict = Database::new(Arc::new(manager.clone()), Arc::new(SqliteDialect)).strict(true);
        let err = strict
            .select(&Statement::new(Query::new(&t).filter(expr)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Translation(_)));

        let fields = Expression::lambda(["p"], |[p]| Node::tuple(vec![p.attr("name")]));
        let fuzzy = Expression::lambda(["p"], |[p]| Node::call("fuzzy", vec![p.attr("name")]));
        let projected = Statement::new(
            Query::new(&t)
                .select(Attributes::Computed(fields))
                .filter(fuzzy),
        );
        assert!(matches!(db.select(&projected).await, Err(Error::Translation(_))));
    }

    #[tokio::test]
    async fn test_null_column_under_or_is_unknown_not_an_error() {
        let manager = RecordingManager::new();
        let db = Database::new(Arc::new(manager.clone()), Arc::new(SqliteDialect));
        let mut t = Table::new(db.dialect(), "people");
        t.define(db.dialect(), db.typeset(), ColumnDef::new("name", HostType::Str)).unwrap();
        t.define(db.dialect(), db.typeset(), ColumnDef::new("age", HostType::Int)).unwrap();
        manager.reply(
            "SELECT",
            QueryOutput::rows(vec![
                vec![WireValue::from("Alice"), WireValue::Null],
                vec![WireValue::from("alan"), WireValue::Null],
                vec![WireValue::from("bob"), WireValue::from(7i64)],
            ]),
        );

        let expr = Expression::lambda(["p"], |[p]| p.attr("age").gt(3) | p.attr("name").startswith("Al"));
        let rows = db.select(&Statement::new(Query::new(&t).filter(expr))).await.unwrap();
        let names: Vec<_> = rows.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![Value::from("Alice"), Value::from("bob")]);
    }
}
