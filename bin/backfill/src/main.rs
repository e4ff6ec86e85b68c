//! Imports every burn between the token's deployment block and the chain head.

use std::time::Duration;

use clap::Parser;
use clickhouse::ClickhouseStore;
use config::BackfillCliOpts;
use dotenvy::dotenv;
use driver::{BackfillConfig, BackfillError, BackfillRunner};
use extractor::RpcLogSource;
use eyre::WrapErr;
use primitives::retries::RpcRetryConfig;
use runtime::spawn_shutdown_listener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        dotenvy::from_filename(custom_env_file)?;
    } else {
        dotenv().ok();
    }

    let opts = BackfillCliOpts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    opts.validate().wrap_err("invalid configuration")?;

    let store = ClickhouseStore::new(
        opts.clickhouse.url.clone(),
        opts.clickhouse.db.clone(),
        opts.clickhouse.username.clone(),
        opts.clickhouse.password.clone(),
    );
    if !opts.skip_migrations {
        store.writer().init_db(false).await?;
    }

    let source = RpcLogSource::new(opts.rpc.url.clone(), RpcRetryConfig::default());
    let config = BackfillConfig {
        token: opts.token.token_address,
        sinks: opts.token.sinks()?,
        decimals: opts.token.token_decimals,
        deployment_block: opts.backfill.deployment_block,
        chunk_size: opts.backfill.chunk_size,
        chunk_delay: Duration::from_millis(opts.backfill.chunk_delay_ms),
        retry_delay: Duration::from_millis(opts.backfill.retry_delay_ms),
        enrich_concurrency: opts.backfill.enrich_concurrency,
    };
    let runner = BackfillRunner::new(source, store, config);

    let cancel = CancellationToken::new();
    let listener = spawn_shutdown_listener(cancel.clone());
    let result = runner.run(&cancel).await;
    cancel.cancel();
    listener.await?;

    match result {
        Ok(summary) => {
            info!(
                chunks = summary.chunks,
                discovered = summary.discovered,
                saved = summary.saved,
                skipped = summary.skipped,
                "Backfill finished"
            );
            Ok(())
        }
        Err(BackfillError::Interrupted { next_block, summary }) => {
            warn!(
                next_block,
                saved = summary.saved,
                skipped = summary.skipped,
                "Backfill interrupted; run again to resume"
            );
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
