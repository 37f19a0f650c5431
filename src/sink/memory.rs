use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{target_table, BatchHandle, Sink};
use crate::db::error::{AppendError, SinkError};
use crate::db::models::BlockRecord;

const CREATE_PREFIX: &str = "CREATE TABLE IF NOT EXISTS ";
const DROP_PREFIX: &str = "DROP TABLE IF EXISTS ";

#[derive(Debug, Default)]
struct MemoryState {
    statements: Vec<String>,
    prepared: Vec<String>,
    append_calls: usize,
    send_calls: usize,
    tables: HashMap<String, Vec<BlockRecord>>,
    fail_execute: Option<String>,
    fail_prepare: Option<String>,
    fail_send: Option<String>,
}

/// In-process sink that keeps tables in memory and records every call.
///
/// Understands the `CREATE TABLE IF NOT EXISTS` and `DROP TABLE IF EXISTS`
/// statements the writer issues; any other statement is only recorded.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
    latency: Option<Duration>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every round trip, for exercising deadlines.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_table(self, table: &str) -> Self {
        self.state.lock().tables.entry(table.to_string()).or_default();
        self
    }

    pub fn fail_execute(&self, message: &str) {
        self.state.lock().fail_execute = Some(message.to_string());
    }

    pub fn fail_prepare(&self, message: &str) {
        self.state.lock().fail_prepare = Some(message.to_string());
    }

    pub fn fail_send(&self, message: &str) {
        self.state.lock().fail_send = Some(message.to_string());
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    pub fn prepared_targets(&self) -> Vec<String> {
        self.state.lock().prepared.clone()
    }

    pub fn append_calls(&self) -> usize {
        self.state.lock().append_calls
    }

    pub fn send_calls(&self) -> usize {
        self.state.lock().send_calls
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().tables.contains_key(table)
    }

    /// Rows stored in `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<BlockRecord> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    async fn round_trip(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn statement_table<'a>(statement: &'a str, prefix: &str) -> Option<&'a str> {
    statement
        .strip_prefix(prefix)
        .and_then(|rest| rest.split_whitespace().next())
}

#[async_trait]
impl Sink for MemorySink {
    type Batch = MemoryBatch;

    async fn execute(&self, statement: &str) -> Result<(), SinkError> {
        self.round_trip().await;
        let mut state = self.state.lock();
        state.statements.push(statement.to_string());
        if let Some(message) = state.fail_execute.take() {
            return Err(SinkError::Rejected(message));
        }
        if let Some(table) = statement_table(statement, CREATE_PREFIX) {
            state.tables.entry(table.to_string()).or_default();
        } else if let Some(table) = statement_table(statement, DROP_PREFIX) {
            state.tables.remove(table);
        }
        Ok(())
    }

    async fn prepare_batch(&self, insert_target: &str) -> Result<Self::Batch, SinkError> {
        self.round_trip().await;
        let mut state = self.state.lock();
        state.prepared.push(insert_target.to_string());
        if let Some(message) = state.fail_prepare.take() {
            return Err(SinkError::Rejected(message));
        }
        let table = target_table(insert_target)?;
        if !state.tables.contains_key(table) {
            return Err(SinkError::Rejected(format!("table {} does not exist", table)));
        }
        Ok(MemoryBatch {
            sink: self.clone(),
            table: table.to_string(),
            rows: Vec::new(),
        })
    }
}

pub struct MemoryBatch {
    sink: MemorySink,
    table: String,
    rows: Vec<BlockRecord>,
}

#[async_trait]
impl BatchHandle for MemoryBatch {
    fn append(&mut self, record: &BlockRecord) -> Result<(), AppendError> {
        self.sink.state.lock().append_calls += 1;
        record.validate()?;
        self.rows.push(record.clone());
        Ok(())
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    async fn send(self) -> Result<(), SinkError> {
        self.sink.round_trip().await;
        let mut state = self.sink.state.lock();
        state.send_calls += 1;
        if let Some(message) = state.fail_send.take() {
            return Err(SinkError::Rejected(message));
        }
        match state.tables.get_mut(&self.table) {
            Some(rows) => {
                rows.extend(self.rows);
                Ok(())
            }
            None => Err(SinkError::Rejected(format!(
                "table {} was dropped",
                self.table
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{create_table_statement, drop_table_statement, CBLOCK_DDL};
    use crate::db::test_helpers::sample_record;

    #[tokio::test]
    async fn test_ddl_creates_and_drops_tables() {
        let sink = MemorySink::new();
        sink.execute(CBLOCK_DDL).await.unwrap();
        sink.execute(&create_table_statement("blocks_test")).await.unwrap();
        assert!(sink.has_table("cblock"));
        assert!(sink.has_table("blocks_test"));

        sink.execute(&drop_table_statement("cblock")).await.unwrap();
        assert!(!sink.has_table("cblock"));
        assert_eq!(sink.statements().len(), 3);
    }

    #[tokio::test]
    async fn test_prepare_requires_existing_table() {
        let sink = MemorySink::new();
        let result = sink.prepare_batch("INSERT INTO missing").await;
        assert!(matches!(result, Err(SinkError::Rejected(_))));
        assert_eq!(sink.prepared_targets(), vec!["INSERT INTO missing"]);
    }

    #[tokio::test]
    async fn test_rows_visible_only_after_send() {
        let sink = MemorySink::new().with_table("cblock");
        let mut batch = sink.prepare_batch("INSERT INTO cblock").await.unwrap();
        batch.append(&sample_record(1)).unwrap();
        batch.append(&sample_record(2)).unwrap();
        assert!(sink.rows("cblock").is_empty());

        batch.send().await.unwrap();
        assert_eq!(sink.rows("cblock"), vec![sample_record(1), sample_record(2)]);
        assert_eq!(sink.append_calls(), 2);
        assert_eq!(sink.send_calls(), 1);
    }

    #[tokio::test]
    async fn test_injected_failures_fire_once() {
        let sink = MemorySink::new().with_table("cblock");
        sink.fail_execute("boom");
        assert!(sink.execute("SELECT 1").await.is_err());
        assert!(sink.execute("SELECT 1").await.is_ok());

        sink.fail_send("connection reset");
        let batch = sink.prepare_batch("INSERT INTO cblock").await.unwrap();
        assert!(matches!(batch.send().await, Err(SinkError::Rejected(m)) if m == "connection reset"));
        assert!(sink.rows("cblock").is_empty());
    }
}
