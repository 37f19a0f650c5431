use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::db::schema::CBLOCK_TABLE;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub clickhouse: ClickHouseSettings,
    #[serde(default)]
    pub writer: WriterSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClickHouseSettings {
    pub url: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_username() -> String {
    "default".to_string()
}

fn default_database() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WriterSettings {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per round trip, in milliseconds. Unbounded when unset.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            table: default_table(),
            batch_size: default_batch_size(),
            deadline_ms: None,
        }
    }
}

impl WriterSettings {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

fn default_table() -> String {
    CBLOCK_TABLE.to_string()
}

fn default_batch_size() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MetricsSettings {
    #[serde(default)]
    pub enabled: bool,
}

impl Settings {
    /// Loads `config.yaml` (optional), then `CBLOCK__*` environment
    /// variables, then `CLICKHOUSE_URL` and `CBLOCK_TABLE`.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(Environment::with_prefix("CBLOCK").separator("__"));

        Self::from_builder(builder, env::var("CLICKHOUSE_URL").ok(), env::var("CBLOCK_TABLE").ok())
    }

    fn from_builder(
        mut builder: config::ConfigBuilder<config::builder::DefaultState>,
        clickhouse_url: Option<String>,
        table: Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(clickhouse_url) = clickhouse_url {
            // Credentials and database embedded in the URL override the file.
            if let Ok(mut parsed_url) = url::Url::parse(&clickhouse_url) {
                if !parsed_url.username().is_empty() {
                    builder = builder
                        .set_override("clickhouse.username", parsed_url.username())?;
                }
                if let Some(password) = parsed_url.password() {
                    builder = builder.set_override("clickhouse.password", password)?;
                }
                let database = parsed_url.path().trim_start_matches('/').to_string();
                if !database.is_empty() {
                    builder = builder.set_override("clickhouse.database", database)?;
                }

                let _ = parsed_url.set_username("");
                let _ = parsed_url.set_password(None);
                parsed_url.set_path("");
                builder = builder.set_override(
                    "clickhouse.url",
                    parsed_url.as_str().trim_end_matches('/'),
                )?;
            } else {
                builder = builder.set_override("clickhouse.url", clickhouse_url)?;
            }
        }

        if let Some(table) = table {
            builder = builder.set_override("writer.table", table)?;
        }

        builder.build()?.try_deserialize()
    }
}
