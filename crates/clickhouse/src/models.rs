use alloy_primitives::U256;
use clickhouse::Row;
use eyre::{Result, WrapErr};
use primitives::{BurnEvent, StoredBurn};
use serde::{Deserialize, Serialize};

use crate::types::{AddressBytes, HashBytes};

/// Row of the `burns` table
#[derive(Debug, Clone, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct BurnRow {
    /// Surrogate identifier (UUIDv4)
    pub id: String,
    /// Transaction hash
    pub tx_hash: HashBytes,
    /// Block number
    pub block_number: u64,
    /// Block timestamp
    pub block_ts: u64,
    /// Raw amount as a decimal string
    pub amount_raw: String,
    /// Amount scaled by token decimals
    pub amount_formatted: String,
    /// Transaction signer
    pub initiator: AddressBytes,
    /// `Transfer.from` of the event
    pub transfer_from: AddressBytes,
    /// Burn sink identifier
    pub destination: String,
    /// Gas used
    pub gas_used: Option<String>,
    /// Effective gas price
    pub gas_price: Option<String>,
    /// Time of persistence in milliseconds
    pub notified_at_ms: u64,
}

impl From<&StoredBurn> for BurnRow {
    fn from(burn: &StoredBurn) -> Self {
        let event = &burn.event;
        Self {
            id: burn.id.clone(),
            tx_hash: event.tx_hash.into(),
            block_number: event.block_number,
            block_ts: event.timestamp,
            amount_raw: event.amount_raw.to_string(),
            amount_formatted: event.amount_formatted.clone(),
            initiator: event.initiator.into(),
            transfer_from: event.transfer_from.into(),
            destination: event.destination.as_str().to_owned(),
            gas_used: event.gas_used.clone(),
            gas_price: event.gas_price.clone(),
            notified_at_ms: burn.notified_at_ms,
        }
    }
}

impl TryFrom<BurnRow> for StoredBurn {
    type Error = eyre::Report;

    fn try_from(row: BurnRow) -> Result<Self> {
        let amount_raw = row
            .amount_raw
            .parse::<U256>()
            .wrap_err_with(|| format!("invalid amount_raw `{}`", row.amount_raw))?;
        Ok(Self {
            id: row.id,
            event: BurnEvent {
                tx_hash: row.tx_hash.into(),
                block_number: row.block_number,
                timestamp: row.block_ts,
                amount_raw,
                amount_formatted: row.amount_formatted,
                initiator: row.initiator.into(),
                transfer_from: row.transfer_from.into(),
                destination: row.destination.parse()?,
                gas_used: row.gas_used,
                gas_price: row.gas_price,
            },
            notified_at_ms: row.notified_at_ms,
        })
    }
}

/// Row of the `scanner_state` table
#[derive(Debug, Clone, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateRow {
    /// State key
    pub key: String,
    /// Stored value
    pub value: u64,
    /// Write time in milliseconds; the newest row per key wins
    pub updated_at_ms: u64,
}

/// Burn totals over the whole table
#[derive(Debug, Clone, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct BurnTotalsRow {
    /// Sum of all raw amounts, as a decimal string
    pub total_raw: String,
    /// Number of recorded burns
    pub burn_count: u64,
    /// Timestamp of the earliest burn
    pub first_ts: u64,
    /// Timestamp of the latest burn
    pub last_ts: u64,
    /// Number of distinct initiators
    pub unique_initiators: u64,
}

/// Burn totals of one initiator
#[derive(Debug, Clone, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct InitiatorTotalRow {
    /// Initiator address
    pub initiator: AddressBytes,
    /// Sum of raw amounts, as a decimal string
    pub total_raw: String,
    /// Number of burns
    pub burn_count: u64,
}
