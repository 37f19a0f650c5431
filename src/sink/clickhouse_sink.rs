use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::{Client, Row};
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::{target_table, BatchHandle, Sink};
use crate::config::ClickHouseSettings;
use crate::db::error::{AppendError, SinkError};
use crate::db::models::{BlockRecord, HASH_LEN};
use crate::metrics;

/// A `FixedString(64)` value. RowBinary writes it as 64 raw bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedString64([u8; HASH_LEN]);

impl FixedString64 {
    fn encode(field: &'static str, value: &str) -> Result<Self, AppendError> {
        let bytes: [u8; HASH_LEN] =
            value
                .as_bytes()
                .try_into()
                .map_err(|_| AppendError::FixedWidth {
                    field,
                    len: value.len(),
                })?;
        Ok(Self(bytes))
    }

    fn to_string_lossy(self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Debug for FixedString64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl Serialize for FixedString64 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(HASH_LEN)?;
        for byte in &self.0 {
            tuple.serialize_element(byte)?;
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for FixedString64 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FixedVisitor;

        impl<'de> Visitor<'de> for FixedVisitor {
            type Value = FixedString64;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} bytes", HASH_LEN)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut bytes = [0u8; HASH_LEN];
                for (i, byte) in bytes.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(FixedString64(bytes))
            }
        }

        deserializer.deserialize_tuple(HASH_LEN, FixedVisitor)
    }
}

/// Wire form of a [`BlockRecord`] for the `cblock` table.
#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct CBlockRow {
    #[serde(rename = "BodySize")]
    pub body_size: u32,
    #[serde(rename = "Epoch")]
    pub epoch: u32,
    #[serde(rename = "EpochSlot")]
    pub epoch_slot: u32,
    #[serde(rename = "Era")]
    pub era: String,
    #[serde(rename = "Hash")]
    pub hash: FixedString64,
    #[serde(rename = "IssuerVkey")]
    pub issuer_vkey: FixedString64,
    #[serde(rename = "Number")]
    pub number: u64,
    #[serde(rename = "Slot")]
    pub slot: u64,
    #[serde(rename = "SlotLeader")]
    pub slot_leader: String,
    #[serde(rename = "TxCount")]
    pub tx_count: u32,
    #[serde(rename = "Fees")]
    pub fees: u64,
    #[serde(rename = "TotalOutput")]
    pub total_output: u64,
    #[serde(rename = "InputCount")]
    pub input_count: u32,
    #[serde(rename = "OutputCount")]
    pub output_count: u32,
    #[serde(rename = "MintCount")]
    pub mint_count: u32,
    #[serde(rename = "MetaCount")]
    pub meta_count: u32,
    #[serde(rename = "NativeWitnessesCount")]
    pub native_witnesses_count: u32,
    #[serde(rename = "PlutusDatumCount")]
    pub plutus_datum_count: u32,
    #[serde(rename = "PlutusRdmrCount")]
    pub plutus_redeemer_count: u32,
    #[serde(rename = "PlutusWitnessesCount")]
    pub plutus_witnesses_count: u32,
    #[serde(rename = "Cip25AssetCount")]
    pub cip25_asset_count: u32,
    #[serde(rename = "Cip20Count")]
    pub cip20_count: u32,
    #[serde(rename = "PoolRegistrationCount")]
    pub pool_registration_count: u32,
    #[serde(rename = "PoolRetirementCount")]
    pub pool_retirement_count: u32,
    #[serde(rename = "StakeDelegationCount")]
    pub stake_delegation_count: u32,
    #[serde(rename = "StakeRegistrationCount")]
    pub stake_registration_count: u32,
    #[serde(rename = "StakeDeregistrationCount")]
    pub stake_deregistration_count: u32,
    #[serde(rename = "Confirmations")]
    pub confirmations: u32,
    // DateTime64 without explicit precision is DateTime64(3).
    #[serde(rename = "TimeStamp", with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<&BlockRecord> for CBlockRow {
    type Error = AppendError;

    fn try_from(record: &BlockRecord) -> Result<Self, Self::Error> {
        record.validate()?;
        Ok(Self {
            body_size: record.body_size,
            epoch: record.epoch,
            epoch_slot: record.epoch_slot,
            era: record.era.clone(),
            hash: FixedString64::encode("hash", &record.hash)?,
            issuer_vkey: FixedString64::encode("issuer_vkey", &record.issuer_vkey)?,
            number: record.number,
            slot: record.slot,
            slot_leader: record.slot_leader.clone(),
            tx_count: record.tx_count,
            fees: record.fees,
            total_output: record.total_output,
            input_count: record.input_count,
            output_count: record.output_count,
            mint_count: record.narrow_mint_count()?,
            meta_count: record.meta_count,
            native_witnesses_count: record.native_witnesses_count,
            plutus_datum_count: record.plutus_datum_count,
            plutus_redeemer_count: record.plutus_redeemer_count,
            plutus_witnesses_count: record.plutus_witnesses_count,
            cip25_asset_count: record.cip25_asset_count,
            cip20_count: record.cip20_count,
            pool_registration_count: record.pool_registration_count,
            pool_retirement_count: record.pool_retirement_count,
            stake_delegation_count: record.stake_delegation_count,
            stake_registration_count: record.stake_registration_count,
            stake_deregistration_count: record.stake_deregistration_count,
            confirmations: record.confirmations,
            timestamp: record.datetime.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        })
    }
}

impl From<CBlockRow> for BlockRecord {
    fn from(row: CBlockRow) -> Self {
        Self {
            body_size: row.body_size,
            epoch: row.epoch,
            epoch_slot: row.epoch_slot,
            era: row.era,
            hash: row.hash.to_string_lossy(),
            issuer_vkey: row.issuer_vkey.to_string_lossy(),
            number: row.number,
            slot: row.slot,
            slot_leader: row.slot_leader,
            tx_count: row.tx_count,
            fees: row.fees,
            total_output: row.total_output,
            input_count: row.input_count,
            output_count: row.output_count,
            mint_count: u64::from(row.mint_count),
            meta_count: row.meta_count,
            native_witnesses_count: row.native_witnesses_count,
            plutus_datum_count: row.plutus_datum_count,
            plutus_redeemer_count: row.plutus_redeemer_count,
            plutus_witnesses_count: row.plutus_witnesses_count,
            cip25_asset_count: row.cip25_asset_count,
            cip20_count: row.cip20_count,
            pool_registration_count: row.pool_registration_count,
            pool_retirement_count: row.pool_retirement_count,
            stake_delegation_count: row.stake_delegation_count,
            stake_registration_count: row.stake_registration_count,
            stake_deregistration_count: row.stake_deregistration_count,
            confirmations: row.confirmations,
            // The epoch stands for "no timestamp", so Some(UNIX_EPOCH) reads back as None.
            datetime: (row.timestamp != DateTime::<Utc>::UNIX_EPOCH).then_some(row.timestamp),
        }
    }
}

/// ClickHouse over HTTP.
#[derive(Clone)]
pub struct ClickHouseSink {
    client: Client,
}

impl ClickHouseSink {
    pub fn new(settings: &ClickHouseSettings) -> Self {
        let client = Client::default()
            .with_url(&settings.url)
            .with_user(&settings.username)
            .with_password(&settings.password)
            .with_database(&settings.database);
        Self { client }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Sink for ClickHouseSink {
    type Batch = ClickHouseBatch;

    async fn execute(&self, statement: &str) -> Result<(), SinkError> {
        self.client.query(statement).execute().await?;
        Ok(())
    }

    async fn prepare_batch(&self, insert_target: &str) -> Result<Self::Batch, SinkError> {
        let table = target_table(insert_target)?;
        let exists = self
            .client
            .query(&format!("EXISTS TABLE {}", table))
            .fetch_one::<u8>()
            .await?;
        if exists == 0 {
            return Err(SinkError::Rejected(format!("table {} does not exist", table)));
        }
        Ok(ClickHouseBatch {
            client: self.client.clone(),
            table: table.to_string(),
            rows: Vec::new(),
        })
    }
}

/// Rows are encoded on append and buffered until [`BatchHandle::send`],
/// which streams them in a single INSERT.
pub struct ClickHouseBatch {
    client: Client,
    table: String,
    rows: Vec<CBlockRow>,
}

#[async_trait]
impl BatchHandle for ClickHouseBatch {
    fn append(&mut self, record: &BlockRecord) -> Result<(), AppendError> {
        self.rows.push(CBlockRow::try_from(record)?);
        Ok(())
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    async fn send(self) -> Result<(), SinkError> {
        let started = Instant::now();
        let mut insert = self.client.insert::<CBlockRow>(&self.table)?;
        for row in &self.rows {
            insert.write(row).await?;
        }
        insert.end().await?;

        metrics::record_batch_sent(self.rows.len(), started.elapsed());
        debug!("Sent {} rows to {}", self.rows.len(), self.table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MINT_COUNT_MAX;
    use crate::db::schema::create_table_statement;
    use crate::db::test_helpers::sample_record;
    use clickhouse::test::{self, handlers, Mock};
    use clickhouse::Compression;

    fn mock_sink(mock: &Mock) -> ClickHouseSink {
        ClickHouseSink::from_client(
            Client::default()
                .with_url(mock.url())
                .with_compression(Compression::None),
        )
    }

    #[test]
    fn test_row_round_trip_preserves_record() {
        let record = sample_record(42);
        let row = CBlockRow::try_from(&record).unwrap();
        assert_eq!(row.hash.0, record.hash.as_bytes());
        assert_eq!(BlockRecord::from(row), record);
    }

    #[test]
    fn test_missing_timestamp_maps_to_epoch_and_back() {
        let mut record = sample_record(7);
        record.datetime = None;
        let row = CBlockRow::try_from(&record).unwrap();
        assert_eq!(row.timestamp, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(BlockRecord::from(row).datetime, None);
    }

    #[test]
    fn test_row_rejects_wide_mint_count() {
        let mut record = sample_record(7);
        record.mint_count = u64::from(u32::MAX) + 10;
        assert!(matches!(
            CBlockRow::try_from(&record),
            Err(AppendError::OutOfRange {
                field: "mint_count",
                ..
            })
        ));
    }

    #[test]
    fn test_fixed_string_serializes_as_raw_bytes() {
        let value = FixedString64::encode("hash", &"ab".repeat(32)).unwrap();
        let json = serde_json::to_value(value).unwrap();
        let bytes = json.as_array().unwrap();
        assert_eq!(bytes.len(), HASH_LEN);
        assert_eq!(bytes[0], serde_json::json!(b'a'));
        assert_eq!(bytes[1], serde_json::json!(b'b'));

        let back: FixedString64 = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_fixed_string_rejects_short_input() {
        assert_eq!(
            FixedString64::encode("issuer_vkey", "abc"),
            Err(AppendError::FixedWidth {
                field: "issuer_vkey",
                len: 3
            })
        );
    }

    #[test]
    fn test_epoch_timestamp_reads_back_as_none() {
        let mut record = sample_record(8);
        record.datetime = Some(DateTime::<Utc>::UNIX_EPOCH);
        let row = CBlockRow::try_from(&record).unwrap();
        assert_eq!(BlockRecord::from(row).datetime, None);
    }

    #[tokio::test]
    async fn test_execute_sends_statement() {
        let mock = Mock::new();
        let sink = mock_sink(&mock);

        let recording = mock.add(handlers::record_ddl());
        sink.execute(&create_table_statement("blocks_test"))
            .await
            .unwrap();
        assert!(recording
            .query()
            .await
            .contains("CREATE TABLE IF NOT EXISTS blocks_test"));
    }

    #[tokio::test]
    async fn test_prepare_batch_rejects_missing_table() {
        let mock = Mock::new();
        let sink = mock_sink(&mock);

        mock.add(handlers::provide(vec![0u8]));
        let result = sink.prepare_batch("INSERT INTO blocks_test").await;
        assert!(matches!(result, Err(SinkError::Rejected(msg)) if msg.contains("blocks_test")));
    }

    #[tokio::test]
    async fn test_prepare_batch_surfaces_server_error() {
        let mock = Mock::new();
        let sink = mock_sink(&mock);

        mock.add(handlers::failure(test::status::INTERNAL_SERVER_ERROR));
        let result = sink.prepare_batch("INSERT INTO cblock").await;
        assert!(matches!(result, Err(SinkError::Client(_))));
    }

    #[tokio::test]
    async fn test_send_writes_rows_in_order() {
        let mock = Mock::new();
        let sink = mock_sink(&mock);

        let mut records: Vec<_> = (1..=3).map(sample_record).collect();
        records[1].datetime = Some("2023-05-01T12:00:00.123Z".parse().unwrap());
        records[2].mint_count = MINT_COUNT_MAX;

        mock.add(handlers::provide(vec![1u8]));
        let mut batch = sink.prepare_batch("INSERT INTO blocks_test").await.unwrap();
        assert_eq!(batch.table, "blocks_test");
        for record in &records {
            batch.append(record).unwrap();
        }

        let recording = mock.add(handlers::record());
        batch.send().await.unwrap();

        let rows: Vec<CBlockRow> = recording.collect().await;
        let written: Vec<BlockRecord> = rows.into_iter().map(BlockRecord::from).collect();
        assert_eq!(written, records);
    }

    #[tokio::test]
    async fn test_failed_send_is_client_error() {
        let mock = Mock::new();
        let sink = mock_sink(&mock);

        mock.add(handlers::provide(vec![1u8]));
        let mut batch = sink.prepare_batch("INSERT INTO cblock").await.unwrap();
        batch.append(&sample_record(1)).unwrap();

        mock.add(handlers::failure(test::status::INTERNAL_SERVER_ERROR));
        let result = batch.send().await;
        assert!(matches!(result, Err(SinkError::Client(_))));
    }

    #[tokio::test]
    async fn test_batch_append_does_not_touch_network() {
        // Unroutable URL: append must succeed without a connection.
        let client = Client::default().with_url("http://127.0.0.1:9");
        let mut batch = ClickHouseBatch {
            client,
            table: "cblock".to_string(),
            rows: Vec::new(),
        };
        batch.append(&sample_record(1)).unwrap();
        batch.append(&sample_record(2)).unwrap();
        assert_eq!(batch.len(), 2);

        let mut bad = sample_record(3);
        bad.hash.pop();
        assert!(batch.append(&bad).is_err());
        assert_eq!(batch.len(), 2);
    }
}
