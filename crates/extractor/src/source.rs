//! The log source abstraction the scanner and backfill read the chain through.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use eyre::Result;

/// Selects ERC-20 `Transfer` events of `token` sent to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferFilter {
    /// Token contract emitting the events
    pub token: Address,
    /// Indexed recipient the events must match
    pub to: Address,
}

/// A `Transfer` log as returned by the provider.
///
/// Every field is optional: providers occasionally return pending or partially
/// decoded logs, and those are dropped during reconciliation instead of failing
/// the whole range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTransferLog {
    /// Hash of the transaction that emitted the log
    pub tx_hash: Option<B256>,
    /// Block the log was included in
    pub block_number: Option<u64>,
    /// Position of the log in its block
    pub log_index: Option<u64>,
    /// Decoded `from` argument
    pub from: Option<Address>,
    /// Decoded `to` argument
    pub to: Option<Address>,
    /// Decoded `value` argument
    pub value: Option<U256>,
}

/// Transaction fields needed for enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionInfo {
    /// Recovered signer of the transaction
    pub from: Address,
    /// Legacy gas price, if the transaction carries one
    pub gas_price: Option<u128>,
}

/// Receipt fields needed for enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptInfo {
    /// Gas consumed by the transaction
    pub gas_used: u64,
    /// Price actually paid per unit of gas
    pub effective_gas_price: u128,
}

/// Block fields needed for enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Block height
    pub number: u64,
    /// Unix timestamp in seconds
    pub timestamp: u64,
}

/// Range-bounded event queries plus the detail lookups used for enrichment.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Latest block height known to the provider.
    async fn current_head(&self) -> Result<u64>;

    /// Transfer logs matching `filter` in `[from_block, to_block]`, in provider order.
    ///
    /// Callers are responsible for keeping the range within provider limits.
    async fn get_transfer_logs(
        &self,
        filter: &TransferFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawTransferLog>>;

    /// Look up a transaction by hash.
    async fn get_transaction(&self, tx_hash: B256) -> Result<Option<TransactionInfo>>;

    /// Look up a transaction receipt by hash.
    async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptInfo>>;

    /// Look up a block header by number.
    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>>;
}
