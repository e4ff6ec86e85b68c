use std::error::Error as StdError;

use alloy_primitives::Address;
use futures::{StreamExt, TryStreamExt, stream};
use primitives::SinkAddresses;
use thiserror::Error;
use tracing::{debug, warn};

use crate::source::{LogSource, RawTransferLog, TransferFilter};

/// A sub-range query that the log source rejected. No logs of the sub-range are kept.
#[derive(Debug, Error)]
#[error("failed to fetch transfer logs to {recipient} for blocks {from_block}-{to_block}")]
pub struct FetchError {
    /// Recipient the query filtered on
    pub recipient: Address,
    /// First block of the failed sub-range
    pub from_block: u64,
    /// Last block of the failed sub-range
    pub to_block: u64,
    /// Provider error
    #[source]
    pub cause: Box<dyn StdError + Send + Sync>,
}

/// Transfer logs of one range, split per burn sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkLogs {
    /// Logs of transfers to the dead address
    pub dead: Vec<RawTransferLog>,
    /// Logs of transfers to the collector contract
    pub collector: Vec<RawTransferLog>,
}

impl SinkLogs {
    /// Total number of logs across both sinks.
    pub fn len(&self) -> usize {
        self.dead.len() + self.collector.len()
    }

    /// Whether no log was found for either sink.
    pub fn is_empty(&self) -> bool {
        self.dead.is_empty() && self.collector.is_empty()
    }
}

/// Split `[from_block, to_block]` into consecutive inclusive sub-ranges spanning at
/// most `max_blocks` blocks each. The last sub-range is clipped to `to_block`.
///
/// Returns nothing when `from_block > to_block`.
pub fn chunk_ranges(from_block: u64, to_block: u64, max_blocks: u64) -> Vec<(u64, u64)> {
    let width = max_blocks.max(1);
    let mut ranges = Vec::new();
    let mut start = from_block;
    while start <= to_block {
        let end = start.saturating_add(width - 1).min(to_block);
        ranges.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Issues provider-compliant `eth_getLogs` queries over arbitrary block ranges.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedLogFetcher {
    max_blocks_per_query: u64,
    concurrency: usize,
}

impl ChunkedLogFetcher {
    /// Create a fetcher issuing sub-ranges of at most `max_blocks_per_query` blocks.
    pub const fn new(max_blocks_per_query: u64) -> Self {
        Self { max_blocks_per_query, concurrency: 1 }
    }

    /// Query up to `concurrency` sub-ranges at once. Results keep range order.
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Fetch all transfer logs matching `filter` in `[from_block, to_block]`.
    pub async fn fetch<L>(
        &self,
        source: &L,
        filter: &TransferFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawTransferLog>, FetchError>
    where
        L: LogSource + ?Sized,
    {
        let ranges = chunk_ranges(from_block, to_block, self.max_blocks_per_query);
        let query = |(start, end): (u64, u64)| async move {
            debug!(recipient = %filter.to, from_block = start, to_block = end, "Querying transfer logs");
            source.get_transfer_logs(filter, start, end).await.map_err(|cause| {
                warn!(recipient = %filter.to, from_block = start, to_block = end, error = %cause, "Log query failed");
                FetchError { recipient: filter.to, from_block: start, to_block: end, cause: cause.into() }
            })
        };

        let chunks: Vec<Vec<RawTransferLog>> = stream::iter(ranges)
            .map(query)
            .buffered(self.concurrency.max(1))
            .try_collect()
            .await?;
        Ok(chunks.into_iter().flatten().collect())
    }

    /// Fetch transfers of `token` to both burn sinks over the same range, concurrently.
    pub async fn fetch_sinks<L>(
        &self,
        source: &L,
        token: Address,
        sinks: &SinkAddresses,
        from_block: u64,
        to_block: u64,
    ) -> Result<SinkLogs, FetchError>
    where
        L: LogSource + ?Sized,
    {
        let dead_filter = TransferFilter { token, to: sinks.dead };
        let collector_filter = TransferFilter { token, to: sinks.collector };
        let (dead, collector) = tokio::try_join!(
            self.fetch(source, &dead_filter, from_block, to_block),
            self.fetch(source, &collector_filter, from_block, to_block),
        )?;
        Ok(SinkLogs { dead, collector })
    }
}
