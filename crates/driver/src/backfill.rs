//! One-shot historical import of burns.

use std::{error::Error as StdError, time::Duration};

use alloy_primitives::{Address, B256};
use clickhouse::{BurnStore, InsertOutcome};
use extractor::{ChunkedLogFetcher, LogSource, SourceEnricher, chunk_ranges, reconcile};
use eyre::Result;
use primitives::{BurnEvent, SinkAddresses, StoredBurn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Settings of a [`BackfillRunner`].
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// Token contract emitting the transfers
    pub token: Address,
    /// Burn sinks watched
    pub sinks: SinkAddresses,
    /// Token decimal count
    pub decimals: u8,
    /// First block to import
    pub deployment_block: u64,
    /// Blocks per chunk
    pub chunk_size: u64,
    /// Pause between chunks
    pub chunk_delay: Duration,
    /// Pause before retrying a failed chunk
    pub retry_delay: Duration,
    /// Transaction lookups in flight while enriching
    pub enrich_concurrency: usize,
}

/// Counts reported at the end of a backfill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    /// Chunks processed
    pub chunks: usize,
    /// Burns found
    pub discovered: usize,
    /// Burns newly stored
    pub saved: usize,
    /// Burns that were already stored
    pub skipped: usize,
}

/// The backfill stopped before reaching the head.
#[derive(Debug, Error)]
pub enum BackfillError {
    /// The chain head could not be read.
    #[error("failed to read chain head")]
    Head(#[source] Box<dyn StdError + Send + Sync>),
    /// A chunk failed twice in a row.
    #[error("chunk {from_block}-{to_block} failed after retry")]
    Chunk {
        /// First block of the chunk
        from_block: u64,
        /// Last block of the chunk
        to_block: u64,
        /// Error of the second attempt
        #[source]
        cause: Box<dyn StdError + Send + Sync>,
    },
    /// A burn could not be stored.
    #[error("failed to store burn {tx_hash}")]
    Persist {
        /// Burn transaction
        tx_hash: B256,
        /// Underlying store error
        #[source]
        cause: Box<dyn StdError + Send + Sync>,
    },
    /// A shutdown was requested.
    #[error("interrupted before block {next_block}")]
    Interrupted {
        /// First block not yet imported
        next_block: u64,
        /// Progress made so far
        summary: BackfillSummary,
    },
}

/// Walks `[deployment_block, head]` in fixed chunks and stores every burn found.
///
/// Nothing is announced. Re-running over an imported range only finds
/// duplicates, so an interrupted run can simply be started again.
#[derive(Debug)]
pub struct BackfillRunner<L, S> {
    source: L,
    store: S,
    config: BackfillConfig,
}

impl<L: LogSource, S: BurnStore> BackfillRunner<L, S> {
    /// Create a runner over the given collaborators.
    pub const fn new(source: L, store: S, config: BackfillConfig) -> Self {
        Self { source, store, config }
    }

    /// Import every chunk up to the current head.
    ///
    /// `cancel` cuts short any pause or chunk fetch in progress. Chunks already
    /// stored stay stored.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<BackfillSummary, BackfillError> {
        let head = self.source.current_head().await.map_err(|e| BackfillError::Head(e.into()))?;
        let ranges = chunk_ranges(self.config.deployment_block, head, self.config.chunk_size);
        info!(
            from_block = self.config.deployment_block,
            to_block = head,
            chunks = ranges.len(),
            "Starting backfill"
        );

        let mut summary = BackfillSummary::default();
        for (i, (from_block, to_block)) in ranges.into_iter().enumerate() {
            let interrupted = BackfillError::Interrupted { next_block: from_block, summary };

            if i > 0 && !sleep_or_cancel(self.config.chunk_delay, cancel).await {
                return Err(interrupted);
            }
            let Some(first) = self.attempt_or_cancel(from_block, to_block, cancel).await else {
                return Err(interrupted);
            };
            let events = match first {
                Ok(events) => events,
                Err(err) => {
                    warn!(from_block, to_block, err = %err, "Chunk failed, retrying once");
                    if !sleep_or_cancel(self.config.retry_delay, cancel).await {
                        return Err(interrupted);
                    }
                    self.attempt_or_cancel(from_block, to_block, cancel)
                        .await
                        .ok_or(interrupted)?
                        .map_err(|e| BackfillError::Chunk { from_block, to_block, cause: e.into() })?
                }
            };

            summary.chunks += 1;
            summary.discovered += events.len();
            for event in &events {
                let burn = StoredBurn::new(event.clone());
                match self.store.insert_record(&burn).await {
                    Ok(InsertOutcome::Inserted) => summary.saved += 1,
                    Ok(InsertOutcome::Duplicate) => summary.skipped += 1,
                    Err(e) => {
                        return Err(BackfillError::Persist { tx_hash: event.tx_hash, cause: e.into() });
                    }
                }
            }
            info!(from_block, to_block, found = events.len(), "Chunk imported");
        }

        info!(
            chunks = summary.chunks,
            discovered = summary.discovered,
            saved = summary.saved,
            skipped = summary.skipped,
            "Backfill complete"
        );
        Ok(summary)
    }

    /// [`Self::attempt`], or `None` once `cancel` fires.
    async fn attempt_or_cancel(
        &self,
        from_block: u64,
        to_block: u64,
        cancel: &CancellationToken,
    ) -> Option<Result<Vec<BurnEvent>>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.attempt(from_block, to_block) => Some(result),
        }
    }

    /// Fetch and enrich one chunk. Any failure fails the whole attempt.
    async fn attempt(&self, from_block: u64, to_block: u64) -> Result<Vec<BurnEvent>> {
        let fetcher = ChunkedLogFetcher::new(self.config.chunk_size);
        let logs = fetcher
            .fetch_sinks(&self.source, self.config.token, &self.config.sinks, from_block, to_block)
            .await?;
        let enricher = SourceEnricher::new(&self.source);
        let mut reconciliation = reconcile(
            logs.dead,
            logs.collector,
            &enricher,
            self.config.decimals,
            self.config.enrich_concurrency,
        )
        .await;

        if !reconciliation.failures.is_empty() {
            return Err(reconciliation.failures.swap_remove(0).into());
        }
        Ok(reconciliation.events)
    }
}

/// Wait `delay`. Returns `false` if `cancel` fired first.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
