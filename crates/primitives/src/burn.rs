use std::{fmt, str::FromStr};

use alloy_primitives::{Address, B256, U256};
use chrono::Utc;
use eyre::{Result, bail};
use serde::{Deserialize, Serialize};

/// The burn sink a transfer was sent to.
///
/// A transaction that transfers to both sinks is recorded once, under the sink
/// registered first ([`Sink::Dead`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sink {
    /// The dead address (tokens are unrecoverable).
    Dead,
    /// The designated collection contract.
    Collector,
}

impl Sink {
    /// Stable identifier used in storage.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dead => "dead",
            Self::Collector => "collector",
        }
    }

    /// Human readable label used in notifications.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Dead => "dead address",
            Self::Collector => "collector contract",
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sink {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dead" => Ok(Self::Dead),
            "collector" => Ok(Self::Collector),
            other => bail!("unknown sink `{other}`"),
        }
    }
}

/// Addresses of the two monitored burn sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkAddresses {
    /// Dead address, registered first
    pub dead: Address,
    /// Collection contract, registered second
    pub collector: Address,
}

impl SinkAddresses {
    /// Create a new pair of sink addresses. Both sinks must be distinct.
    pub fn new(dead: Address, collector: Address) -> Result<Self> {
        if dead == collector {
            bail!("dead and collector sink addresses must differ (both are {dead})");
        }
        Ok(Self { dead, collector })
    }
}

/// A token transfer into one of the burn sinks, enriched with transaction metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnEvent {
    /// Hash of the originating transaction
    pub tx_hash: B256,
    /// Block containing the transaction
    pub block_number: u64,
    /// Unix timestamp (seconds) of the block
    pub timestamp: u64,
    /// Amount in the token's smallest unit
    pub amount_raw: U256,
    /// Amount scaled by the token decimals
    pub amount_formatted: String,
    /// Account that signed the transaction
    pub initiator: Address,
    /// Source address reported by the `Transfer` event
    pub transfer_from: Address,
    /// Sink that received the transfer
    pub destination: Sink,
    /// Gas used by the transaction, as a decimal string
    pub gas_used: Option<String>,
    /// Effective gas price in wei, as a decimal string
    pub gas_price: Option<String>,
}

impl BurnEvent {
    /// Whether the burn reaches the notification threshold.
    pub fn meets_threshold(&self, threshold: U256) -> bool {
        self.amount_raw >= threshold
    }

    /// Whether the transfer was routed through an intermediary contract.
    pub fn via_intermediary(&self) -> bool {
        self.transfer_from != self.initiator
    }
}

/// A burn as persisted in the store. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBurn {
    /// Surrogate identifier
    pub id: String,
    /// The recorded event
    pub event: BurnEvent,
    /// Wall-clock time of persistence, in milliseconds since the Unix epoch
    pub notified_at_ms: u64,
}

impl StoredBurn {
    /// Stamp `event` with a fresh identifier and the current time.
    pub fn new(event: BurnEvent) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), event, notified_at_ms: now_ms() }
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_round_trips_through_str() {
        for sink in [Sink::Dead, Sink::Collector] {
            assert_eq!(sink.as_str().parse::<Sink>().unwrap(), sink);
        }
        assert!("burn".parse::<Sink>().is_err());
    }

    #[test]
    fn sink_addresses_reject_duplicates() {
        let addr = Address::repeat_byte(7);
        assert!(SinkAddresses::new(addr, addr).is_err());

        let sinks = SinkAddresses::new(Address::repeat_byte(1), Address::repeat_byte(2)).unwrap();
        assert_eq!(sinks.dead, Address::repeat_byte(1));
        assert_eq!(sinks.collector, Address::repeat_byte(2));
    }

    #[test]
    fn stored_burn_gets_unique_ids() {
        let event = BurnEvent {
            tx_hash: B256::repeat_byte(1),
            block_number: 1,
            timestamp: 1,
            amount_raw: U256::from(1),
            amount_formatted: "1".to_owned(),
            initiator: Address::repeat_byte(3),
            transfer_from: Address::repeat_byte(3),
            destination: Sink::Dead,
            gas_used: None,
            gas_price: None,
        };
        let a = StoredBurn::new(event.clone());
        let b = StoredBurn::new(event);
        assert_ne!(a.id, b.id);
        assert!(a.notified_at_ms > 0);
        assert!(!a.event.via_intermediary());
    }
}
