//! Prints aggregate burn statistics and the latest burns.

use chrono::{DateTime, Utc};
use clap::Parser;
use clickhouse::ClickhouseReader;
use config::StatsOpts;
use dotenvy::dotenv;
use primitives::amount::format_amount;
use tracing_subscriber::filter::EnvFilter;

fn format_ts(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map_or_else(|| secs.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        dotenvy::from_filename(custom_env_file)?;
    } else {
        dotenv().ok();
    }

    let opts = StatsOpts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let reader = ClickhouseReader::new(
        opts.clickhouse.url,
        opts.clickhouse.db,
        opts.clickhouse.username,
        opts.clickhouse.password,
    );
    let symbol = opts.token_symbol;
    let decimals = opts.token_decimals;

    let stats = reader.aggregate_stats(opts.top).await?;
    println!("Burns:             {}", stats.count);
    println!("Total burned:      {} {symbol}", format_amount(stats.total_amount, decimals));
    println!("Total (raw):       {}", stats.total_amount);
    println!("Unique initiators: {}", stats.unique_initiators);
    if let Some(ts) = stats.last_timestamp {
        println!("Last burn:         {}", format_ts(ts));
    }
    if let Some(secs) = stats.average_interval_secs {
        println!("Average interval:  {secs}s");
    }

    if !stats.top_initiators.is_empty() {
        println!("\nTop initiators:");
        for (rank, top) in stats.top_initiators.iter().enumerate() {
            println!(
                "{:>3}. {} {} {symbol} ({} burns)",
                rank + 1,
                top.initiator,
                format_amount(top.total, decimals),
                top.count
            );
        }
    }

    let recent = reader.recent_burns(opts.recent).await?;
    if !recent.is_empty() {
        println!("\nRecent burns:");
        for burn in &recent {
            let event = &burn.event;
            println!(
                "  {}  block {}  {} {symbol} -> {}  {}",
                format_ts(event.timestamp),
                event.block_number,
                event.amount_formatted,
                event.destination,
                event.tx_hash
            );
        }
    }
    Ok(())
}
