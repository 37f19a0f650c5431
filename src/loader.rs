use std::io::BufRead;

use thiserror::Error;
use tracing::info;

use crate::config::WriterSettings;
use crate::db::error::WriterError;
use crate::db::models::BlockRecord;
use crate::db::writer::BlockBatchWriter;
use crate::sink::Sink;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub batches: usize,
    pub rows: usize,
}

/// Parses newline-delimited JSON block records. Blank lines are skipped.
pub fn read_blocks<R: BufRead>(reader: R) -> Result<Vec<BlockRecord>, LoadError> {
    let mut blocks = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| LoadError::Parse {
            line: index + 1,
            source,
        })?;
        blocks.push(record);
    }
    Ok(blocks)
}

/// Writes `blocks` in chunks of `settings.batch_size`, one prepared batch per
/// chunk. Stops at the first failing chunk; earlier chunks stay written.
pub async fn load_blocks<S: Sink>(
    sink: &S,
    settings: &WriterSettings,
    blocks: Vec<BlockRecord>,
) -> Result<LoadSummary, WriterError> {
    let mut writer = BlockBatchWriter::<S>::new(settings.table.clone(), Vec::new());
    if let Some(deadline) = settings.deadline() {
        writer = writer.with_deadline(deadline);
    }

    let mut summary = LoadSummary::default();
    for chunk in blocks.chunks(settings.batch_size.max(1)) {
        writer.set_blocks(chunk.to_vec());
        writer.prepare_batch(sink).await?;
        summary.rows += writer.bulk_insert().await?;
        summary.batches += 1;
        info!(
            "Loaded batch {} ({} rows total) into {}",
            summary.batches, summary.rows, settings.table
        );
    }
    Ok(summary)
}
