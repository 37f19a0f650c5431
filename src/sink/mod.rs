//! The columnar store the writer talks to.
//!
//! A [`Sink`] runs DDL statements and hands out [`BatchHandle`]s. A handle
//! buffers rows locally and is consumed by [`BatchHandle::send`], so one
//! prepared batch can be sent at most once.

mod clickhouse_sink;
mod memory;

use async_trait::async_trait;

use crate::db::error::{AppendError, SinkError};
use crate::db::models::BlockRecord;

pub use self::clickhouse_sink::{CBlockRow, ClickHouseBatch, ClickHouseSink, FixedString64};
pub use self::memory::{MemoryBatch, MemorySink};

const INSERT_PREFIX: &str = "INSERT INTO ";

#[async_trait]
pub trait Sink: Send + Sync {
    type Batch: BatchHandle;

    /// Run a single statement that returns no rows.
    async fn execute(&self, statement: &str) -> Result<(), SinkError>;

    /// Allocate a batch for an `INSERT INTO <table>` target.
    async fn prepare_batch(&self, insert_target: &str) -> Result<Self::Batch, SinkError>;
}

#[async_trait]
pub trait BatchHandle: Send {
    /// Encode one record into the batch. Does not touch the network.
    fn append(&mut self, record: &BlockRecord) -> Result<(), AppendError>;

    /// Number of rows appended so far.
    fn len(&self) -> usize;

    /// Write every appended row as one request.
    async fn send(self) -> Result<(), SinkError>;
}

/// Extracts the table from an `INSERT INTO <table>` target.
pub(crate) fn target_table(insert_target: &str) -> Result<&str, SinkError> {
    match insert_target.strip_prefix(INSERT_PREFIX).map(str::trim) {
        Some(table) if !table.is_empty() && !table.contains(char::is_whitespace) => Ok(table),
        _ => Err(SinkError::Rejected(format!(
            "unsupported insert target: {:?}",
            insert_target
        ))),
    }
}
