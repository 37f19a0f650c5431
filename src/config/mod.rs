mod settings;
pub mod validation;

pub use settings::{ClickHouseSettings, MetricsSettings, Settings, WriterSettings};
pub use validation::{validate_clickhouse_settings, validate_settings, validate_writer_settings};
