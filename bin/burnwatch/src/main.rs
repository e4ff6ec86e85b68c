//! Entrypoint.

use std::time::Duration;

use clap::Parser;
use config::Opts;
use dotenvy::dotenv;
use driver::LiveDriver;
use runtime::{run_until_cancelled, spawn_shutdown_listener};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

/// Time the scanner gets to finish the burn it is handling after a shutdown request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> eyre::Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        dotenvy::from_filename(custom_env_file)?;
    } else {
        // Try the default .env file, and ignore if it doesn't exist.
        dotenv().ok();
    }

    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("🔥 Burnwatch starting...");

    let driver = LiveDriver::from_opts(&opts).await?;

    let cancel = CancellationToken::new();
    let listener = spawn_shutdown_listener(cancel.clone());
    if run_until_cancelled(driver.run(cancel.clone()), cancel.clone(), SHUTDOWN_GRACE).await.is_none() {
        warn!("Scanner did not stop in time");
    }
    cancel.cancel();
    listener.await?;

    info!("Burnwatch stopped");
    Ok(())
}
