use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::error::AppendError;

pub const HASH_LEN: usize = 64;
pub const ERA_MAX_LEN: usize = 16;
pub const SLOT_LEADER_MAX_LEN: usize = 56;
/// `MintCount` is a `UInt32` column even though the record carries a `u64`.
pub const MINT_COUNT_MAX: u64 = u32::MAX as u64;

/// One row of block metadata, as produced by the upstream indexer.
///
/// JSON field names follow the indexer's output (`metadata_count`,
/// `plutus_redeemer_count`, `time_stamp`). Extra fields such as `cbor_hex`
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub body_size: u32,
    pub epoch: u32,
    pub epoch_slot: u32,
    pub era: String,
    pub hash: String,
    pub issuer_vkey: String,
    pub number: u64,
    pub slot: u64,
    pub slot_leader: String,
    pub tx_count: u32,
    pub fees: u64,
    pub total_output: u64,
    pub input_count: u32,
    pub output_count: u32,
    pub mint_count: u64,
    #[serde(rename = "metadata_count", alias = "meta_count")]
    pub meta_count: u32,
    pub native_witnesses_count: u32,
    pub plutus_datum_count: u32,
    #[serde(alias = "plutus_rdmr_count")]
    pub plutus_redeemer_count: u32,
    pub plutus_witnesses_count: u32,
    pub cip25_asset_count: u32,
    pub cip20_count: u32,
    pub pool_registration_count: u32,
    pub pool_retirement_count: u32,
    pub stake_delegation_count: u32,
    pub stake_registration_count: u32,
    pub stake_deregistration_count: u32,
    pub confirmations: u32,
    #[serde(rename = "time_stamp", alias = "datetime", default)]
    pub datetime: Option<DateTime<Utc>>,
}

impl BlockRecord {
    /// Checks the record against the column widths of the `cblock` table.
    pub fn validate(&self) -> Result<(), AppendError> {
        check_max_len("era", &self.era, ERA_MAX_LEN)?;
        check_fixed_hex("hash", &self.hash)?;
        check_fixed_hex("issuer_vkey", &self.issuer_vkey)?;
        check_max_len("slot_leader", &self.slot_leader, SLOT_LEADER_MAX_LEN)?;
        self.narrow_mint_count()?;
        if let Some(datetime) = &self.datetime {
            check_millis("datetime", datetime)?;
        }
        Ok(())
    }

    /// `mint_count` as stored in the `UInt32` column. Never truncates.
    pub fn narrow_mint_count(&self) -> Result<u32, AppendError> {
        u32::try_from(self.mint_count).map_err(|_| AppendError::OutOfRange {
            field: "mint_count",
            value: self.mint_count,
            max: MINT_COUNT_MAX,
        })
    }
}

fn check_max_len(field: &'static str, value: &str, max: usize) -> Result<(), AppendError> {
    if value.len() > max {
        return Err(AppendError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

// `TimeStamp` is DateTime64(3); finer precision would be dropped on write.
fn check_millis(field: &'static str, value: &DateTime<Utc>) -> Result<(), AppendError> {
    let nanos = value.timestamp_subsec_nanos();
    if nanos % 1_000_000 != 0 {
        return Err(AppendError::SubMillisecond { field, nanos });
    }
    Ok(())
}

fn check_fixed_hex(field: &'static str, value: &str) -> Result<(), AppendError> {
    if value.len() != HASH_LEN {
        return Err(AppendError::FixedWidth {
            field,
            len: value.len(),
        });
    }
    hex::decode(value).map_err(|_| AppendError::NotHex { field })?;
    Ok(())
}
