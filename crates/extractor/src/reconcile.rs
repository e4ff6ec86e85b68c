use std::{collections::HashSet, error::Error as StdError};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use eyre::{Result, eyre};
use futures::{StreamExt, stream};
use primitives::{BurnEvent, Sink, amount::format_amount};
use thiserror::Error;
use tracing::{debug, warn};

use crate::source::{LogSource, RawTransferLog};

/// Transaction-level details attached to a burn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMetadata {
    /// Signer of the transaction
    pub initiator: Address,
    /// Gas used, as a decimal string
    pub gas_used: Option<String>,
    /// Effective gas price in wei, as a decimal string
    pub gas_price: Option<String>,
    /// Timestamp of the containing block
    pub timestamp: u64,
}

/// Resolves [`TxMetadata`] for a transaction.
#[async_trait]
pub trait Enrich: Send + Sync {
    /// Look up the metadata of `tx_hash`, mined in `block_number`.
    async fn enrich(&self, tx_hash: B256, block_number: u64) -> Result<TxMetadata>;
}

/// [`Enrich`] implementation querying a [`LogSource`].
#[derive(Debug)]
pub struct SourceEnricher<'a, L: ?Sized> {
    source: &'a L,
}

impl<'a, L: LogSource + ?Sized> SourceEnricher<'a, L> {
    /// Enrich through `source`.
    pub const fn new(source: &'a L) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<L: LogSource + ?Sized> Enrich for SourceEnricher<'_, L> {
    async fn enrich(&self, tx_hash: B256, block_number: u64) -> Result<TxMetadata> {
        let (tx, receipt, block) = tokio::try_join!(
            self.source.get_transaction(tx_hash),
            self.source.get_transaction_receipt(tx_hash),
            self.source.get_block(block_number),
        )?;

        let tx = tx.ok_or_else(|| eyre!("transaction {tx_hash} not found"))?;
        let block = block.ok_or_else(|| eyre!("block {block_number} not found"))?;
        let gas_price = receipt.map(|r| r.effective_gas_price).or(tx.gas_price);

        Ok(TxMetadata {
            initiator: tx.from,
            gas_used: receipt.map(|r| r.gas_used.to_string()),
            gas_price: gas_price.map(|p| p.to_string()),
            timestamp: block.timestamp,
        })
    }
}

/// Enrichment of a single transaction failed. Other transactions are unaffected.
#[derive(Debug, Error)]
#[error("failed to enrich transaction {tx_hash} in block {block_number}")]
pub struct EnrichFailure {
    /// Transaction that could not be enriched
    pub tx_hash: B256,
    /// Block of the transaction
    pub block_number: u64,
    /// Lookup error
    #[source]
    pub cause: Box<dyn StdError + Send + Sync>,
}

/// Output of [`reconcile`].
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Enriched burns, ascending by block
    pub events: Vec<BurnEvent>,
    /// Transactions whose enrichment failed, ascending by block
    pub failures: Vec<EnrichFailure>,
}

impl Reconciliation {
    /// Lowest block containing a transaction that could not be enriched.
    pub fn first_failed_block(&self) -> Option<u64> {
        self.failures.iter().map(|f| f.block_number).min()
    }
}

#[derive(Debug)]
struct Candidate {
    tx_hash: B256,
    block_number: u64,
    from: Address,
    value: U256,
    destination: Sink,
}

/// Collapse the per-sink logs into one candidate per transaction.
///
/// Dead-address logs are registered before collector logs, so a transaction
/// transferring to both sinks keeps [`Sink::Dead`].
fn merge(dead: Vec<RawTransferLog>, collector: Vec<RawTransferLog>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    let tagged = dead
        .into_iter()
        .map(|log| (log, Sink::Dead))
        .chain(collector.into_iter().map(|log| (log, Sink::Collector)));

    for (log, destination) in tagged {
        let (Some(tx_hash), Some(block_number), Some(from), Some(value)) =
            (log.tx_hash, log.block_number, log.from, log.value)
        else {
            debug!(?log, sink = %destination, "Dropping incomplete transfer log");
            continue;
        };
        if seen.insert(tx_hash) {
            candidates.push(Candidate { tx_hash, block_number, from, value, destination });
        }
    }

    candidates
}

/// Merge the logs of both sinks into one [`BurnEvent`] per transaction and
/// enrich each with up to `concurrency` lookups in flight.
///
/// Events and failures come back sorted by block; ties keep fetch order.
pub async fn reconcile<E>(
    dead: Vec<RawTransferLog>,
    collector: Vec<RawTransferLog>,
    enricher: &E,
    decimals: u8,
    concurrency: usize,
) -> Reconciliation
where
    E: Enrich + ?Sized,
{
    let candidates = merge(dead, collector);

    let enriched: Vec<_> = stream::iter(candidates)
        .map(|candidate| async move {
            let metadata = enricher.enrich(candidate.tx_hash, candidate.block_number).await;
            (candidate, metadata)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut reconciliation = Reconciliation::default();
    for (candidate, metadata) in enriched {
        match metadata {
            Ok(meta) => reconciliation.events.push(BurnEvent {
                tx_hash: candidate.tx_hash,
                block_number: candidate.block_number,
                timestamp: meta.timestamp,
                amount_raw: candidate.value,
                amount_formatted: format_amount(candidate.value, decimals),
                initiator: meta.initiator,
                transfer_from: candidate.from,
                destination: candidate.destination,
                gas_used: meta.gas_used,
                gas_price: meta.gas_price,
            }),
            Err(cause) => {
                warn!(
                    tx_hash = %candidate.tx_hash,
                    block_number = candidate.block_number,
                    error = %cause,
                    "Failed to enrich burn transaction"
                );
                reconciliation.failures.push(EnrichFailure {
                    tx_hash: candidate.tx_hash,
                    block_number: candidate.block_number,
                    cause: cause.into(),
                });
            }
        }
    }

    reconciliation.events.sort_by_key(|e| e.block_number);
    reconciliation.failures.sort_by_key(|f| f.block_number);
    reconciliation
}
