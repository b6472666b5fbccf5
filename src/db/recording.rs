use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::manager::{Connection, ConnectionManager, QueryOutput};

#[derive(Debug, Default)]
struct Journal {
    statements: Vec<String>,
    /// (statement prefix, reply), consumed first match first.
    script: VecDeque<(String, Result<QueryOutput>)>,
    acquired: usize,
    released: usize,
}

/// In-memory manager: records every statement and answers from a script.
///
/// Used for dry runs and tests. Unscripted statements succeed with no rows
/// and zero affected rows.
#[derive(Debug, Clone, Default)]
pub struct RecordingManager {
    journal: Arc<Mutex<Journal>>,
}

impl RecordingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next statement starting with `prefix` with `output`.
    pub fn reply(&self, prefix: impl Into<String>, output: QueryOutput) -> &Self {
        self.lock().script.push_back((prefix.into(), Ok(output)));
        self
    }

    /// Fail the next statement starting with `prefix`.
    pub fn fail(&self, prefix: impl Into<String>, error: Error) -> &Self {
        self.lock().script.push_back((prefix.into(), Err(error)));
        self
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    pub fn clear(&self) {
        self.lock().statements.clear();
    }

    /// Connections currently handed out.
    pub fn outstanding(&self) -> usize {
        let journal = self.lock();
        journal.acquired - journal.released
    }

    fn lock(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct RecordingConnection {
    journal: Arc<Mutex<Journal>>,
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn execute(&mut self, sql: &str) -> Result<QueryOutput> {
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        journal.statements.push(sql.to_string());
        let hit = journal
            .script
            .iter()
            .position(|(prefix, _)| sql.starts_with(prefix.as_str()));
        match hit.and_then(|i| journal.script.remove(i)) {
            Some((_, reply)) => reply,
            None => Ok(QueryOutput::affected(0)),
        }
    }
}

#[async_trait]
impl ConnectionManager for RecordingManager {
    async fn acquire(&self) -> Result<Box<dyn Connection>> {
        self.lock().acquired += 1;
        Ok(Box::new(RecordingConnection {
            journal: Arc::clone(&self.journal),
        }))
    }

    async fn release(&self, _connection: Box<dyn Connection>) -> Result<()> {
        self.lock().released += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WireValue;

    #[tokio::test]
    async fn test_records_and_replies_in_order() {
        let manager = RecordingManager::new();
        manager
            .reply("SELECT", QueryOutput::rows(vec![vec![WireValue::from(1)]]))
            .reply("SELECT", QueryOutput::rows(vec![vec![WireValue::from(2)]]));

        let mut conn = manager.acquire().await.unwrap();
        let update = conn.execute("UPDATE t SET a = 1").await.unwrap();
        assert_eq!(update.affected, Some(0));
        let first = conn.execute("SELECT 1").await.unwrap();
        assert_eq!(first.scalar(), Some(&WireValue::Int(1)));
        let second = conn.execute("SELECT 2").await.unwrap();
        assert_eq!(second.scalar(), Some(&WireValue::Int(2)));
        assert_eq!(manager.outstanding(), 1);
        manager.release(conn).await.unwrap();
        assert_eq!(manager.outstanding(), 0);

        assert_eq!(
            manager.statements(),
            vec!["UPDATE t SET a = 1", "SELECT 1", "SELECT 2"]
        );
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let manager = RecordingManager::new();
        manager.fail("DROP", Error::Connection("gone".into()));
        let mut conn = manager.acquire().await.unwrap();
        assert!(matches!(
            conn.execute("DROP TABLE t").await,
            Err(Error::Connection(_))
        ));
        assert!(conn.execute("DROP TABLE t").await.is_ok());
    }
}
