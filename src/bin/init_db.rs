use anyhow::Result;
use cblock_writer::config::{validate_settings, Settings};
use cblock_writer::{BlockBatchWriter, ClickHouseSink};
use dotenv::dotenv;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = Settings::load()?;
    validate_settings(&settings)?;

    let sink = ClickHouseSink::new(&settings.clickhouse);
    let writer = BlockBatchWriter::<ClickHouseSink>::new(settings.writer.table.clone(), Vec::new());
    writer.create_target_table(&sink).await?;

    println!("Table {} initialized successfully", writer.table());

    Ok(())
}
