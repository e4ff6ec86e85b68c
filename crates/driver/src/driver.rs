//! Burnwatch driver: startup checks and the scanner poll loop.

use std::time::Duration;

use clickhouse::{BurnStore, ClickhouseStore};
use config::Opts;
use extractor::{LogSource, RpcLogSource};
use eyre::{Result, WrapErr};
use notifier::{MessageContext, NotificationSink, RetryPolicy, TelegramClient};
use primitives::retries::RpcRetryConfig;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::scanner::{CheckpointedScanner, CycleReport, ScannerConfig};

/// Driver wired to the production collaborators.
pub type LiveDriver = Driver<RpcLogSource, ClickhouseStore, TelegramClient>;

/// Runs scan cycles on a fixed interval until cancelled.
#[derive(Debug)]
pub struct Driver<L, S, N> {
    scanner: CheckpointedScanner<L, S, N>,
    poll_interval: Duration,
}

impl LiveDriver {
    /// Validate `opts`, prepare the database and check that the RPC endpoint
    /// and the Telegram bot are usable.
    pub async fn from_opts(opts: &Opts) -> Result<Self> {
        info!("Initializing driver");
        opts.validate().wrap_err("invalid configuration")?;

        let sinks = opts.token.sinks()?;
        let min_notify_raw = opts.scanner.min_notify_raw(opts.token.token_decimals)?;

        let store = ClickhouseStore::new(
            opts.clickhouse.url.clone(),
            opts.clickhouse.db.clone(),
            opts.clickhouse.username.clone(),
            opts.clickhouse.password.clone(),
        );
        if opts.skip_migrations {
            info!("Skipping database migrations");
        } else {
            info!("Running database migrations");
            store.writer().init_db(opts.reset_db).await?;
        }

        let source = RpcLogSource::new(opts.rpc.url.clone(), RpcRetryConfig::default());
        let head = source.current_head().await.wrap_err("RPC endpoint is not reachable")?;
        info!(head, "Connected to RPC endpoint");

        let telegram = TelegramClient::new(
            opts.telegram.api_url.clone(),
            opts.telegram.bot_token.clone(),
            RetryPolicy::default(),
        )?;
        telegram.verify().await.wrap_err("Telegram bot verification failed")?;

        let config = ScannerConfig {
            token: opts.token.token_address,
            sinks,
            decimals: opts.token.token_decimals,
            initial_lookback_blocks: opts.scanner.initial_lookback_blocks,
            max_blocks_per_query: opts.scanner.max_blocks_per_query,
            fetch_concurrency: opts.scanner.fetch_concurrency,
            enrich_concurrency: opts.scanner.enrich_concurrency,
            min_notify_raw,
            channel: opts.telegram.chat_id.clone(),
            message: MessageContext {
                symbol: opts.token.token_symbol.clone(),
                explorer_url: opts.telegram.explorer_url.clone(),
            },
        };
        info!(
            token = %config.token,
            dead = %config.sinks.dead,
            collector = %config.sinks.collector,
            "Watching burns"
        );

        Ok(Self::new(CheckpointedScanner::new(source, store, telegram, config), opts.scanner.poll_interval()))
    }
}

impl<L, S, N> Driver<L, S, N>
where
    L: LogSource,
    S: BurnStore,
    N: NotificationSink,
{
    /// Create a driver running `scanner` every `poll_interval`.
    pub const fn new(scanner: CheckpointedScanner<L, S, N>, poll_interval: Duration) -> Self {
        Self { scanner, poll_interval }
    }

    /// Poll until `cancel` fires. Cycles never overlap; ticks missed while a
    /// cycle runs are skipped. Failed cycles are logged and retried on the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.scanner.run_cycle(&cancel).await {
                Ok(report) => log_report(&report),
                Err(err) => error!(err = ?err, "Scan cycle failed"),
            }
        }
        info!("Scanner stopped");
    }
}

fn log_report(report: &CycleReport) {
    if report.failed > 0 {
        warn!(
            from_block = report.from_block,
            to_block = report.to_block,
            failed = report.failed,
            checkpoint = ?report.checkpoint,
            "Scan cycle finished with failures"
        );
    } else {
        info!(
            mode = ?report.mode,
            from_block = report.from_block,
            to_block = report.to_block,
            discovered = report.discovered,
            delivered = report.delivered,
            suppressed = report.suppressed,
            duplicates = report.duplicates,
            checkpoint = ?report.checkpoint,
            cancelled = report.cancelled,
            "Scan cycle finished"
        );
    }
}
