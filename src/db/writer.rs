use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::db::error::{ConfigError, SinkError, WriterError};
use crate::db::models::BlockRecord;
use crate::db::schema::{
    create_table_statement, drop_table_statement, insert_target, validate_table_name, CBLOCK_DDL,
    CBLOCK_TABLE,
};
use crate::sink::{BatchHandle, Sink};

/// Writes a list of [`BlockRecord`]s to one table through a [`Sink`].
///
/// Lifecycle: optionally `drop_table` / `create_table`, then `prepare_batch`
/// and `bulk_insert`. A prepared batch is consumed by `bulk_insert` whatever
/// the outcome, so every insert needs its own `prepare_batch`.
///
/// `create_table` always creates the `cblock` table. Use
/// `create_target_table` to create the table this writer inserts into.
pub struct BlockBatchWriter<S: Sink> {
    table: String,
    batch: Option<S::Batch>,
    blocks: Vec<BlockRecord>,
    deadline: Option<Duration>,
}

impl<S: Sink> BlockBatchWriter<S> {
    pub fn new(table: impl Into<String>, blocks: Vec<BlockRecord>) -> Self {
        Self {
            table: table.into(),
            batch: None,
            blocks,
            deadline: None,
        }
    }

    /// Bound every sink round trip by `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn blocks(&self) -> &[BlockRecord] {
        &self.blocks
    }

    /// Replace the pending records, returning the previous ones.
    pub fn set_blocks(&mut self, blocks: Vec<BlockRecord>) -> Vec<BlockRecord> {
        std::mem::replace(&mut self.blocks, blocks)
    }

    pub fn has_batch(&self) -> bool {
        self.batch.is_some()
    }

    pub async fn drop_table(&self, sink: &S) -> Result<(), WriterError> {
        self.drop_table_inner(sink, self.deadline).await
    }

    pub async fn drop_table_within(&self, sink: &S, deadline: Duration) -> Result<(), WriterError> {
        self.drop_table_inner(sink, Some(deadline)).await
    }

    pub async fn create_table(&self, sink: &S) -> Result<(), WriterError> {
        self.create_table_inner(sink, self.deadline).await
    }

    pub async fn create_table_within(
        &self,
        sink: &S,
        deadline: Duration,
    ) -> Result<(), WriterError> {
        self.create_table_inner(sink, Some(deadline)).await
    }

    /// Create the table named by this writer, with the `cblock` columns.
    pub async fn create_target_table(&self, sink: &S) -> Result<(), WriterError> {
        self.create_target_table_inner(sink, self.deadline).await
    }

    pub async fn create_target_table_within(
        &self,
        sink: &S,
        deadline: Duration,
    ) -> Result<(), WriterError> {
        self.create_target_table_inner(sink, Some(deadline)).await
    }

    pub async fn prepare_batch(&mut self, sink: &S) -> Result<(), WriterError> {
        self.prepare_batch_inner(sink, self.deadline).await
    }

    pub async fn prepare_batch_within(
        &mut self,
        sink: &S,
        deadline: Duration,
    ) -> Result<(), WriterError> {
        self.prepare_batch_inner(sink, Some(deadline)).await
    }

    /// Append every pending record to the prepared batch, in order, and send
    /// it as one write. Returns the number of rows sent.
    pub async fn bulk_insert(&mut self) -> Result<usize, WriterError> {
        self.bulk_insert_inner(self.deadline).await
    }

    pub async fn bulk_insert_within(&mut self, deadline: Duration) -> Result<usize, WriterError> {
        self.bulk_insert_inner(Some(deadline)).await
    }

    async fn drop_table_inner(&self, sink: &S, deadline: Option<Duration>) -> Result<(), WriterError> {
        validate_table_name(&self.table)?;
        let statement = drop_table_statement(&self.table);
        within(deadline, sink.execute(&statement)).await?;
        debug!("Dropped table {}", self.table);
        Ok(())
    }

    async fn create_table_inner(
        &self,
        sink: &S,
        deadline: Option<Duration>,
    ) -> Result<(), WriterError> {
        if self.table != CBLOCK_TABLE {
            warn!(
                "create_table creates {} but this writer inserts into {}",
                CBLOCK_TABLE, self.table
            );
        }
        within(deadline, sink.execute(CBLOCK_DDL)).await?;
        debug!("Created table {}", CBLOCK_TABLE);
        Ok(())
    }

    async fn create_target_table_inner(
        &self,
        sink: &S,
        deadline: Option<Duration>,
    ) -> Result<(), WriterError> {
        validate_table_name(&self.table)?;
        let statement = create_table_statement(&self.table);
        within(deadline, sink.execute(&statement)).await?;
        debug!("Created table {}", self.table);
        Ok(())
    }

    async fn prepare_batch_inner(
        &mut self,
        sink: &S,
        deadline: Option<Duration>,
    ) -> Result<(), WriterError> {
        validate_table_name(&self.table)?;
        self.batch = None;
        let target = insert_target(&self.table);
        let batch = within(deadline, sink.prepare_batch(&target)).await?;
        self.batch = Some(batch);
        debug!("Prepared batch for {}", self.table);
        Ok(())
    }

    async fn bulk_insert_inner(&mut self, deadline: Option<Duration>) -> Result<usize, WriterError> {
        let mut batch = self.batch.take().ok_or(ConfigError::MissingBatch)?;

        // Nothing is appended unless every record encodes.
        for record in &self.blocks {
            record.validate()?;
        }
        for record in &self.blocks {
            batch.append(record)?;
        }

        let rows = batch.len();
        within(deadline, batch.send()).await?;
        debug!("Inserted {} rows into {}", rows, self.table);
        Ok(rows)
    }
}

async fn within<T, F>(deadline: Option<Duration>, round_trip: F) -> Result<T, SinkError>
where
    F: Future<Output = Result<T, SinkError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, round_trip)
            .await
            .map_err(|_| SinkError::DeadlineExceeded(limit))?,
        None => round_trip.await,
    }
}
