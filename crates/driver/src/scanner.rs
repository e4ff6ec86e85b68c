//! Incremental burn scanner driven by the stored checkpoint.
//!
//! A cycle reads the checkpoint and the chain head, fetches both sinks over the
//! delta, reconciles the logs and handles every burn in ascending block order:
//! already recorded burns are skipped, burns above the notification threshold
//! are delivered, and every handled burn is persisted. The checkpoint only ever
//! covers a contiguous run of handled blocks starting at the beginning of the
//! cycle, so a burn that failed is picked up again by the next cycle.

use std::error::Error as StdError;

use alloy_primitives::{Address, B256, U256};
use clickhouse::{BurnStore, InsertOutcome};
use extractor::{ChunkedLogFetcher, FetchError, LogSource, SourceEnricher, reconcile};
use notifier::{DeliveryError, MessageContext, NotificationSink, format_burn_message};
use primitives::{BurnEvent, SinkAddresses, StoredBurn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Static settings of a [`CheckpointedScanner`].
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Token contract emitting the transfers
    pub token: Address,
    /// Burn sinks watched
    pub sinks: SinkAddresses,
    /// Token decimal count
    pub decimals: u8,
    /// Blocks behind head scanned on a cold start
    pub initial_lookback_blocks: u64,
    /// Widest range sent to the provider in one log query
    pub max_blocks_per_query: u64,
    /// Log queries in flight per sink
    pub fetch_concurrency: usize,
    /// Transaction lookups in flight while enriching
    pub enrich_concurrency: usize,
    /// Raw amount a burn needs to be announced
    pub min_notify_raw: U256,
    /// Channel notifications are delivered to
    pub channel: String,
    /// Message rendering settings
    pub message: MessageContext,
}

/// How the start of a cycle's range was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    /// No checkpoint stored; start `initial_lookback_blocks` behind head.
    ColdStart,
    /// Continue right after the stored checkpoint.
    Resuming,
}

/// Outcome of one scan cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// How `from_block` was derived
    pub mode: CycleMode,
    /// First block of the scanned range
    pub from_block: u64,
    /// Last block of the scanned range (the head at cycle start)
    pub to_block: u64,
    /// Burns found in the range, including failed enrichments
    pub discovered: usize,
    /// Burns announced and persisted
    pub delivered: usize,
    /// Burns below the threshold, persisted without a notification
    pub suppressed: usize,
    /// Burns already recorded by an earlier cycle or the backfill
    pub duplicates: usize,
    /// Burns that failed and will be retried next cycle
    pub failed: usize,
    /// Checkpoint once the cycle finished
    pub checkpoint: Option<u64>,
    /// Whether the cycle stopped early because of a shutdown request
    pub cancelled: bool,
}

impl CycleReport {
    const fn new(mode: CycleMode, from_block: u64, to_block: u64, checkpoint: Option<u64>) -> Self {
        Self {
            mode,
            from_block,
            to_block,
            discovered: 0,
            delivered: 0,
            suppressed: 0,
            duplicates: 0,
            failed: 0,
            checkpoint,
            cancelled: false,
        }
    }

    const fn record(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Delivered => self.delivered += 1,
            EventOutcome::Suppressed => self.suppressed += 1,
            EventOutcome::Duplicate => self.duplicates += 1,
        }
    }
}

/// A scan cycle could not run to completion. The next cycle starts over.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The chain head could not be read.
    #[error("failed to read chain head")]
    Head(#[source] Box<dyn StdError + Send + Sync>),
    /// The checkpoint could not be read.
    #[error("failed to read checkpoint")]
    CheckpointRead(#[source] Box<dyn StdError + Send + Sync>),
    /// The checkpoint could not be written.
    #[error("failed to advance checkpoint to block {block}")]
    CheckpointWrite {
        /// Block the checkpoint should have moved to
        block: u64,
        /// Underlying store error
        #[source]
        cause: Box<dyn StdError + Send + Sync>,
    },
    /// Logs for the range could not be fetched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Handling of a single burn failed. Only that burn is affected.
#[derive(Debug, Error)]
pub enum EventError {
    /// The dedup lookup failed.
    #[error("failed to check whether {tx_hash} is recorded")]
    Lookup {
        /// Burn transaction
        tx_hash: B256,
        /// Underlying store error
        #[source]
        cause: Box<dyn StdError + Send + Sync>,
    },
    /// The notification was not delivered.
    #[error("failed to deliver notification for {tx_hash}")]
    Delivery {
        /// Burn transaction
        tx_hash: B256,
        /// Delivery failure
        #[source]
        cause: DeliveryError,
    },
    /// The burn could not be persisted.
    #[error("failed to persist burn {tx_hash}")]
    Persist {
        /// Burn transaction
        tx_hash: B256,
        /// Underlying store error
        #[source]
        cause: Box<dyn StdError + Send + Sync>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOutcome {
    Delivered,
    Suppressed,
    Duplicate,
}

/// Scans the chain for burns, announces them and tracks progress in the store.
#[derive(Debug)]
pub struct CheckpointedScanner<L, S, N> {
    source: L,
    store: S,
    sink: N,
    config: ScannerConfig,
    fetcher: ChunkedLogFetcher,
}

impl<L, S, N> CheckpointedScanner<L, S, N>
where
    L: LogSource,
    S: BurnStore,
    N: NotificationSink,
{
    /// Create a scanner over the given collaborators.
    pub fn new(source: L, store: S, sink: N, config: ScannerConfig) -> Self {
        let fetcher = ChunkedLogFetcher::new(config.max_blocks_per_query)
            .with_concurrency(config.fetch_concurrency);
        Self { source, store, sink, config, fetcher }
    }

    /// Run one scan cycle.
    ///
    /// `cancel` is honoured while fetching and between block groups. A burn
    /// whose notification went out is always persisted before the cycle stops.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, ScanError> {
        let head = self.source.current_head().await.map_err(|e| ScanError::Head(e.into()))?;
        let stored =
            self.store.get_checkpoint().await.map_err(|e| ScanError::CheckpointRead(e.into()))?;

        let (mode, from_block) = match stored {
            None => (CycleMode::ColdStart, head.saturating_sub(self.config.initial_lookback_blocks)),
            Some(checkpoint) => (CycleMode::Resuming, checkpoint.saturating_add(1)),
        };
        let to_block = head;
        let mut report = CycleReport::new(mode, from_block, to_block, stored);

        if from_block > to_block {
            debug!(from_block, to_block, "No new blocks");
            report.checkpoint = self.advance(stored, to_block).await?;
            return Ok(report);
        }
        debug!(?mode, from_block, to_block, "Scanning blocks");

        let fetch_and_reconcile = async {
            let logs = self
                .fetcher
                .fetch_sinks(&self.source, self.config.token, &self.config.sinks, from_block, to_block)
                .await?;
            let enricher = SourceEnricher::new(&self.source);
            let reconciliation = reconcile(
                logs.dead,
                logs.collector,
                &enricher,
                self.config.decimals,
                self.config.enrich_concurrency,
            )
            .await;
            Ok::<_, FetchError>(reconciliation)
        };
        let reconciliation = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(from_block, to_block, "Scan cancelled before processing");
                report.cancelled = true;
                return Ok(report);
            }
            result = fetch_and_reconcile => result?,
        };

        report.discovered = reconciliation.events.len() + reconciliation.failures.len();
        report.failed = reconciliation.failures.len();

        // lowest block that must be seen again next cycle
        let mut held_at = reconciliation.first_failed_block();
        let mut committed = stored;

        for group in reconciliation.events.chunk_by(|a, b| a.block_number == b.block_number) {
            let block_number = group[0].block_number;
            if cancel.is_cancelled() {
                info!(block_number, "Scan cancelled between blocks");
                report.cancelled = true;
                held_at = Some(held_at.map_or(block_number, |held| held.min(block_number)));
                break;
            }

            let mut group_ok = true;
            for event in group {
                match self.handle_event(event).await {
                    Ok(outcome) => report.record(outcome),
                    Err(err) => {
                        warn!(
                            tx_hash = %event.tx_hash,
                            block_number,
                            err = ?err,
                            "Burn handling failed, will retry next cycle"
                        );
                        report.failed += 1;
                        group_ok = false;
                    }
                }
            }

            if !group_ok {
                held_at = Some(held_at.map_or(block_number, |held| held.min(block_number)));
            } else if held_at.is_none_or(|held| block_number < held) {
                committed = self.advance(committed, block_number).await?;
            }
        }

        let target = match held_at {
            None => Some(to_block),
            Some(held) => held.checked_sub(1),
        };
        if let Some(target) = target {
            committed = self.advance(committed, target).await?;
        }
        report.checkpoint = committed;
        Ok(report)
    }

    async fn handle_event(&self, event: &BurnEvent) -> Result<EventOutcome, EventError> {
        let tx_hash = event.tx_hash;
        let recorded = self
            .store
            .has_record(tx_hash)
            .await
            .map_err(|e| EventError::Lookup { tx_hash, cause: e.into() })?;
        if recorded {
            debug!(%tx_hash, "Burn already recorded");
            return Ok(EventOutcome::Duplicate);
        }

        let outcome = if event.meets_threshold(self.config.min_notify_raw) {
            let text = format_burn_message(event, &self.config.message);
            self.sink
                .deliver(&self.config.channel, &text)
                .await
                .map_err(|cause| EventError::Delivery { tx_hash, cause })?;
            EventOutcome::Delivered
        } else {
            debug!(%tx_hash, amount = %event.amount_formatted, "Burn below notification threshold");
            EventOutcome::Suppressed
        };

        let burn = StoredBurn::new(event.clone());
        match self.store.insert_record(&burn).await {
            Ok(InsertOutcome::Inserted) => {
                info!(
                    %tx_hash,
                    block_number = event.block_number,
                    sink = %event.destination,
                    amount = %event.amount_formatted,
                    "Burn recorded"
                );
            }
            Ok(InsertOutcome::Duplicate) => debug!(%tx_hash, "Burn recorded concurrently"),
            Err(e) => return Err(EventError::Persist { tx_hash, cause: e.into() }),
        }
        Ok(outcome)
    }

    /// Move the checkpoint to `block` if that is past `current`.
    async fn advance(&self, current: Option<u64>, block: u64) -> Result<Option<u64>, ScanError> {
        if current.is_some_and(|c| block <= c) {
            return Ok(current);
        }
        self.store
            .set_checkpoint(block)
            .await
            .map_err(|e| ScanError::CheckpointWrite { block, cause: e.into() })?;
        debug!(checkpoint = block, "Checkpoint advanced");
        Ok(Some(block))
    }
}

#[cfg(test)]
mod tests {
    use primitives::Sink;

    use super::*;
    use crate::test_utils::{COLLECTOR, DEAD, Fixture, tx};

    async fn checkpoint(fixture: &Fixture) -> Option<u64> {
        fixture.store.get_checkpoint().await.unwrap()
    }

    #[tokio::test]
    async fn cold_start_scans_lookback_window() {
        let fixture = Fixture::new();
        fixture.source.set_head(100_000);

        let report = fixture.scanner().run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.mode, CycleMode::ColdStart);
        assert_eq!(report.from_block, 99_400);
        assert_eq!(report.to_block, 100_000);
        assert!(fixture.source.queries().iter().all(|q| q.from_block >= 99_400));
        assert_eq!(checkpoint(&fixture).await, Some(100_000));
    }

    #[tokio::test]
    async fn resumes_after_checkpoint_and_delivers() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(500));
        fixture.source.push_transfer(DEAD, tx(1), 505, U256::from(10u64));
        fixture.source.set_head(510);

        let report = fixture.scanner().run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.mode, CycleMode::Resuming);
        assert_eq!(report.from_block, 501);
        assert_eq!(report.delivered, 1);
        assert_eq!(fixture.sink.delivered().len(), 1);
        assert_eq!(fixture.store.burns().len(), 1);
        assert_eq!(report.checkpoint, Some(510));
        assert_eq!(fixture.store.checkpoint_writes(), vec![505, 510]);
    }

    #[tokio::test]
    async fn idle_cycle_advances_to_head() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(100));
        fixture.source.set_head(100);

        let scanner = fixture.scanner();
        scanner.run_cycle(&CancellationToken::new()).await.unwrap();
        assert!(fixture.store.checkpoint_writes().is_empty());

        fixture.source.set_head(120);
        let report = scanner.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.checkpoint, Some(120));
        assert_eq!(checkpoint(&fixture).await, Some(120));
    }

    #[tokio::test]
    async fn lagging_head_never_moves_checkpoint_back() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(130));
        fixture.source.set_head(120);

        let report = fixture.scanner().run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.checkpoint, Some(130));
        assert!(fixture.store.checkpoint_writes().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_holds_checkpoint_before_failed_block() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(999));
        fixture.source.push_transfer(DEAD, tx(1), 1_005, U256::from(10u64));
        fixture.source.push_transfer(DEAD, tx(2), 1_010, U256::from(20u64));
        fixture.source.set_head(1_020);
        fixture.sink.fail_for(tx(1));

        let scanner = fixture.scanner();
        let report = scanner.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.checkpoint, Some(1_004));
        assert!(!fixture.store.has_record(tx(1)).await.unwrap());
        assert!(fixture.store.has_record(tx(2)).await.unwrap());

        fixture.sink.heal();
        let report = scanner.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.from_block, 1_005);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.checkpoint, Some(1_020));
        // the later burn is not announced twice
        assert_eq!(fixture.sink.delivered().len(), 2);
        assert_eq!(fixture.store.burns().len(), 2);
    }

    #[tokio::test]
    async fn persist_failure_holds_checkpoint() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(9));
        fixture.source.push_transfer(DEAD, tx(1), 12, U256::from(10u64));
        fixture.source.set_head(20);
        fixture.store.fail_insert_of(tx(1));

        let report = fixture.scanner().run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.checkpoint, Some(11));
        assert!(fixture.store.burns().is_empty());
    }

    #[tokio::test]
    async fn enrichment_failure_holds_checkpoint() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(1_000));
        fixture.source.push_transfer(DEAD, tx(1), 1_003, U256::from(10u64));
        fixture.source.push_transfer(COLLECTOR, tx(2), 1_008, U256::from(10u64));
        fixture.source.set_head(1_010);
        fixture.source.fail_transaction(tx(1));

        let report = fixture.scanner().run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.discovered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.checkpoint, Some(1_002));
        assert_eq!(fixture.store.burns().len(), 1);
        assert_eq!(fixture.store.burns()[0].event.destination, Sink::Collector);
    }

    #[tokio::test]
    async fn below_threshold_is_recorded_without_notification() {
        let fixture = Fixture::with_threshold(U256::from(100u64));
        fixture.store.reset_checkpoint(Some(0));
        fixture.source.push_transfer(DEAD, tx(1), 3, U256::from(50u64));
        fixture.source.push_transfer(DEAD, tx(2), 4, U256::from(100u64));
        fixture.source.set_head(5);

        let report = fixture.scanner().run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.suppressed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(fixture.store.burns().len(), 2);
        let delivered = fixture.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains(&tx(2).to_string()));
    }

    #[tokio::test]
    async fn transfer_to_both_sinks_is_recorded_once_as_dead() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(0));
        fixture.source.push_transfer(COLLECTOR, tx(1), 7, U256::from(5u64));
        fixture.source.push_transfer(DEAD, tx(1), 7, U256::from(6u64));
        fixture.source.set_head(8);

        let report = fixture.scanner().run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.discovered, 1);
        let burns = fixture.store.burns();
        assert_eq!(burns.len(), 1);
        assert_eq!(burns[0].event.destination, Sink::Dead);
        assert_eq!(burns[0].event.amount_raw, U256::from(6u64));
    }

    #[tokio::test]
    async fn fetch_failure_fails_cycle_without_moving_checkpoint() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(10));
        fixture.source.set_head(50);
        fixture.source.fail_next_log_queries(1);

        let err = fixture.scanner().run_cycle(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, ScanError::Fetch(_)));
        assert!(fixture.store.checkpoint_writes().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_read_failure_fails_cycle() {
        let fixture = Fixture::new();
        fixture.store.fail_next_checkpoint_reads(1);

        let err = fixture.scanner().run_cycle(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ScanError::CheckpointRead(_)));
    }

    #[tokio::test]
    async fn cancelled_cycle_does_no_work() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(0));
        fixture.source.push_transfer(DEAD, tx(1), 3, U256::from(5u64));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = fixture.scanner().run_cycle(&cancel).await.unwrap();

        assert!(report.cancelled);
        assert!(fixture.sink.delivered().is_empty());
        assert!(fixture.store.checkpoint_writes().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_delivery_finishes_current_burn() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(0));
        fixture.source.set_head(10);
        fixture.source.push_transfer(DEAD, tx(1), 5, U256::from(5u64));
        fixture.source.push_transfer(DEAD, tx(2), 7, U256::from(7u64));
        let cancel = CancellationToken::new();
        fixture.sink.cancel_on_delivery(cancel.clone());

        let report = fixture.scanner().run_cycle(&cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.delivered, 1);
        assert!(fixture.sink.delivered()[0].contains(&tx(1).to_string()));
        assert!(fixture.store.has_record(tx(1)).await.unwrap());
        assert!(!fixture.store.has_record(tx(2)).await.unwrap());
        assert_eq!(checkpoint(&fixture).await, Some(6));
    }

    #[tokio::test]
    async fn manual_checkpoint_reset_is_honoured() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(0));
        fixture.source.push_transfer(DEAD, tx(1), 160, U256::from(5u64));
        fixture.source.set_head(200);

        let scanner = fixture.scanner();
        scanner.run_cycle(&CancellationToken::new()).await.unwrap();
        fixture.store.reset_checkpoint(Some(150));

        let report = scanner.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.from_block, 151);
        assert_eq!(report.duplicates, 1);
        assert_eq!(fixture.sink.delivered().len(), 1);
    }

    #[tokio::test]
    async fn repeated_cycles_leave_no_gaps() {
        let fixture = Fixture::new();
        fixture.store.reset_checkpoint(Some(0));
        let scanner = fixture.scanner();

        for (i, block) in [5u64, 17, 17, 40, 41].into_iter().enumerate() {
            let sink = if i % 2 == 0 { DEAD } else { COLLECTOR };
            fixture.source.push_transfer(sink, tx(i as u8 + 1), block, U256::from(1u64));
        }
        fixture.source.set_head(20);
        fixture.sink.fail_for(tx(2));
        scanner.run_cycle(&CancellationToken::new()).await.unwrap();
        assert_eq!(checkpoint(&fixture).await, Some(16));

        fixture.sink.heal();
        fixture.source.set_head(45);
        let report = scanner.run_cycle(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.checkpoint, Some(45));
        let mut stored: Vec<B256> = fixture.store.burns().iter().map(|b| b.event.tx_hash).collect();
        stored.sort();
        assert_eq!(stored, (1..=5).map(tx).collect::<Vec<_>>());
        assert_eq!(fixture.sink.delivered().len(), 5);
    }
}
