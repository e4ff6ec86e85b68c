use alloy::{
    consensus::Transaction as _,
    providers::Provider,
    rpc::types::{BlockNumberOrTag, Log},
};
use alloy_primitives::B256;
use async_trait::async_trait;
use chainio::{DefaultProvider, IERC20::Transfer, http_provider, transfers_to_filter};
use derive_more::Debug;
use eyre::{Result, WrapErr};
use primitives::retries::RpcRetryConfig;
use tracing::warn;
use url::Url;

use crate::source::{
    BlockInfo, LogSource, RawTransferLog, ReceiptInfo, TransactionInfo, TransferFilter,
};

/// [`LogSource`] backed by a JSON-RPC provider.
#[derive(Debug, Clone)]
pub struct RpcLogSource {
    #[debug(skip)]
    provider: DefaultProvider,
}

impl RpcLogSource {
    /// Connect to the HTTP RPC endpoint at `rpc_url`.
    pub fn new(rpc_url: Url, retry: RpcRetryConfig) -> Self {
        Self { provider: http_provider(rpc_url, retry) }
    }
}

#[async_trait]
impl LogSource for RpcLogSource {
    async fn current_head(&self) -> Result<u64> {
        self.provider.get_block_number().await.wrap_err("failed to get block number")
    }

    async fn get_transfer_logs(
        &self,
        filter: &TransferFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawTransferLog>> {
        let query =
            transfers_to_filter(filter.token, filter.to).from_block(from_block).to_block(to_block);
        let logs = self
            .provider
            .get_logs(&query)
            .await
            .wrap_err_with(|| format!("eth_getLogs failed for blocks {from_block}-{to_block}"))?;
        Ok(logs.iter().map(decode_transfer_log).collect())
    }

    async fn get_transaction(&self, tx_hash: B256) -> Result<Option<TransactionInfo>> {
        let tx = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .wrap_err_with(|| format!("failed to get transaction {tx_hash}"))?;
        Ok(tx.map(|tx| TransactionInfo { from: tx.inner.signer(), gas_price: tx.gas_price() }))
    }

    async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptInfo>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .wrap_err_with(|| format!("failed to get receipt for {tx_hash}"))?;
        Ok(receipt.map(|r| ReceiptInfo {
            gas_used: r.gas_used,
            effective_gas_price: r.effective_gas_price,
        }))
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .wrap_err_with(|| format!("failed to get block {number}"))?;
        Ok(block.map(|b| BlockInfo { number: b.header.number, timestamp: b.header.timestamp }))
    }
}

/// Convert a provider log into a [`RawTransferLog`]. Undecodable payloads keep
/// their location fields but lose the decoded arguments.
pub(crate) fn decode_transfer_log(log: &Log) -> RawTransferLog {
    let mut raw = RawTransferLog {
        tx_hash: log.transaction_hash,
        block_number: log.block_number,
        log_index: log.log_index,
        ..Default::default()
    };

    match log.log_decode::<Transfer>() {
        Ok(decoded) => {
            let transfer = decoded.data();
            raw.from = Some(transfer.from);
            raw.to = Some(transfer.to);
            raw.value = Some(transfer.value);
        }
        Err(err) => {
            warn!(tx_hash = ?log.transaction_hash, error = %err, "Failed to decode Transfer log");
        }
    }

    raw
}
