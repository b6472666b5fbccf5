use async_trait::async_trait;

use crate::error::Result;
use crate::types::WireValue;

/// What a statement returned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<WireValue>>,
    /// Rows touched by INSERT/UPDATE/DELETE, when the driver reports it.
    pub affected: Option<u64>,
}

impl QueryOutput {
    pub fn rows(rows: Vec<Vec<WireValue>>) -> Self {
        Self {
            columns: Vec::new(),
            rows,
            affected: None,
        }
    }

    pub fn affected(count: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected: Some(count),
        }
    }

    /// First cell of the first row.
    pub fn scalar(&self) -> Option<&WireValue> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// A live database session.
#[async_trait]
pub trait Connection: Send {
    async fn execute(&mut self, sql: &str) -> Result<QueryOutput>;
}

/// Hands out connections and takes them back.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn Connection>>;

    async fn release(&self, connection: Box<dyn Connection>) -> Result<()>;

    /// Short label for log lines.
    fn describe(&self) -> String;
}
