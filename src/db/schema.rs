use crate::db::error::ConfigError;

pub const CBLOCK_TABLE: &str = "cblock";

macro_rules! cblock_body {
    () => {
        " (
  BodySize UInt32, Epoch UInt32, EpochSlot UInt32, Era VARCHAR(16),
  Hash FixedString(64), IssuerVkey FixedString(64), Number UInt64,
  Slot UInt64, SlotLeader VARCHAR(56), TxCount UInt32, Fees UInt64,
  TotalOutput UInt64, InputCount UInt32, OutputCount UInt32,
  MintCount UInt32, MetaCount UInt32, NativeWitnessesCount UInt32,
  PlutusDatumCount UInt32, PlutusRdmrCount UInt32,
  PlutusWitnessesCount UInt32, Cip25AssetCount UInt32, Cip20Count UInt32,
  PoolRegistrationCount UInt32, PoolRetirementCount UInt32,
  StakeDelegationCount UInt32, StakeRegistrationCount UInt32,
  StakeDeregistrationCount UInt32, Confirmations UInt32,
  TimeStamp DateTime64
) ENGINE = MergeTree()
PARTITION BY toYYYYMM(TimeStamp)
ORDER BY (TimeStamp, Number);"
    };
}

/// DDL for the `cblock` table. Partitioned by month of `TimeStamp`.
pub const CBLOCK_DDL: &str = concat!("CREATE TABLE IF NOT EXISTS cblock", cblock_body!());

/// Column order of the table, matching the DDL.
#[cfg(test)]
pub(crate) const CBLOCK_COLUMNS: [&str; 29] = [
    "BodySize",
    "Epoch",
    "EpochSlot",
    "Era",
    "Hash",
    "IssuerVkey",
    "Number",
    "Slot",
    "SlotLeader",
    "TxCount",
    "Fees",
    "TotalOutput",
    "InputCount",
    "OutputCount",
    "MintCount",
    "MetaCount",
    "NativeWitnessesCount",
    "PlutusDatumCount",
    "PlutusRdmrCount",
    "PlutusWitnessesCount",
    "Cip25AssetCount",
    "Cip20Count",
    "PoolRegistrationCount",
    "PoolRetirementCount",
    "StakeDelegationCount",
    "StakeRegistrationCount",
    "StakeDeregistrationCount",
    "Confirmations",
    "TimeStamp",
];

/// Same DDL as [`CBLOCK_DDL`] with the table name substituted.
pub fn create_table_statement(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {}{}", table, cblock_body!())
}

pub fn drop_table_statement(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", table)
}

pub fn insert_target(table: &str) -> String {
    format!("INSERT INTO {}", table)
}

/// Accepts `name` or `database.name` made of ASCII alphanumerics and `_`.
pub fn validate_table_name(table: &str) -> Result<(), ConfigError> {
    if table.is_empty() {
        return Err(ConfigError::MissingTable);
    }
    let valid = table.split('.').count() <= 2
        && table.split('.').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if !valid {
        return Err(ConfigError::InvalidTable(table.to_string()));
    }
    Ok(())
}
