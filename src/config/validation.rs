use anyhow::{anyhow, Result};

use crate::config::{ClickHouseSettings, Settings, WriterSettings};
use crate::db::schema::validate_table_name;

pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_clickhouse_settings(&settings.clickhouse)?;
    validate_writer_settings(&settings.writer)?;
    Ok(())
}

pub fn validate_clickhouse_settings(settings: &ClickHouseSettings) -> Result<()> {
    let parsed = url::Url::parse(&settings.url)
        .map_err(|e| anyhow!("clickhouse.url {:?} is not a valid URL: {}", settings.url, e))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!(
            "clickhouse.url must use http or https, got {}",
            parsed.scheme()
        ));
    }

    Ok(())
}

pub fn validate_writer_settings(settings: &WriterSettings) -> Result<()> {
    validate_table_name(&settings.table).map_err(|e| anyhow!("writer.table: {}", e))?;

    if settings.batch_size == 0 {
        return Err(anyhow!("writer.batch_size must be greater than 0"));
    }

    if settings.deadline_ms == Some(0) {
        return Err(anyhow!("writer.deadline_ms must be greater than 0 when set"));
    }

    Ok(())
}
