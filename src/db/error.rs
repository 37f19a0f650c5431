use std::time::Duration;
use thiserror::Error;

/// Caller misuse. Never retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("table is missing")]
    MissingTable,
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),
    #[error("no prepared batch, call prepare_batch first")]
    MissingBatch,
}

/// A record could not be encoded for the sink. Fix the record before retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppendError {
    #[error("{field} must be exactly 64 characters, got {len}")]
    FixedWidth { field: &'static str, len: usize },
    #[error("{field} is not hex-encoded")]
    NotHex { field: &'static str },
    #[error("{field} is {len} bytes, column allows at most {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{field} value {value} exceeds column maximum {max}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("{field} has sub-millisecond precision ({nanos} ns), column stores milliseconds")]
    SubMillisecond { field: &'static str, nanos: u32 },
    #[error("encode error: {0}")]
    Encode(String),
}

/// Network or server side failure. Safe to retry at the caller's discretion,
/// though a retried send after an ambiguous failure may duplicate rows.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink rejected request: {0}")]
    Rejected(String),
    #[error("clickhouse error: {0}")]
    Client(#[from] clickhouse::error::Error),
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Append error: {0}")]
    Append(#[from] AppendError),
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

impl WriterError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, WriterError::Sink(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_sink_errors_are_retryable() {
        assert!(!WriterError::from(ConfigError::MissingBatch).is_retryable());
        assert!(!WriterError::from(AppendError::NotHex { field: "hash" }).is_retryable());
        assert!(WriterError::from(SinkError::Rejected("down".into())).is_retryable());
        assert!(
            WriterError::from(SinkError::DeadlineExceeded(Duration::from_millis(5))).is_retryable()
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ConfigError::MissingTable.to_string(), "table is missing");
        let err = AppendError::OutOfRange {
            field: "mint_count",
            value: 5_000_000_000,
            max: u32::MAX as u64,
        };
        assert_eq!(
            err.to_string(),
            "mint_count value 5000000000 exceeds column maximum 4294967295"
        );
    }
}
