pub mod config;
pub mod db;
pub mod loader;
pub mod metrics;
pub mod sink;

pub use config::Settings;
pub use db::error::{AppendError, ConfigError, SinkError, WriterError};
pub use db::models::BlockRecord;
pub use db::writer::BlockBatchWriter;
pub use sink::{BatchHandle, ClickHouseSink, MemorySink, Sink};
