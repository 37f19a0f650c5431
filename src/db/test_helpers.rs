use chrono::{TimeZone, Utc};

use crate::db::models::BlockRecord;

/// A valid record whose fields are derived from `number`.
pub fn sample_record(number: u64) -> BlockRecord {
    BlockRecord {
        body_size: 2048,
        epoch: 410,
        epoch_slot: (number % 432_000) as u32,
        era: "Babbage".to_string(),
        hash: format!("{:064x}", number),
        issuer_vkey: "c0ffee".repeat(10) + "beef",
        number,
        slot: number * 20,
        slot_leader: "pool1pu5jlj4q9w9jlxeu370a3c9myx47md5j5m2str0naunn2q3lkdy".to_string(),
        tx_count: 3,
        fees: 512_345,
        total_output: 1_000_000_000,
        input_count: 7,
        output_count: 9,
        mint_count: 1,
        meta_count: 2,
        native_witnesses_count: 0,
        plutus_datum_count: 1,
        plutus_redeemer_count: 1,
        plutus_witnesses_count: 1,
        cip25_asset_count: 0,
        cip20_count: 1,
        pool_registration_count: 0,
        pool_retirement_count: 0,
        stake_delegation_count: 1,
        stake_registration_count: 1,
        stake_deregistration_count: 0,
        confirmations: 10,
        datetime: Some(Utc.timestamp_opt(1_682_942_400 + number as i64, 0).unwrap()),
    }
}
