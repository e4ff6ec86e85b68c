//! Burnwatch configuration
use std::time::Duration;

use alloy_primitives::{Address, U256};
use clap::Parser;
use eyre::{Result, WrapErr, ensure};
use primitives::{SinkAddresses, amount::parse_amount};
use url::Url;

/// Clickhouse database configuration options
#[derive(Debug, Clone, Parser)]
pub struct ClickhouseOpts {
    /// Clickhouse URL
    #[clap(long, env = "CLICKHOUSE_URL")]
    pub url: Url,
    /// Clickhouse database
    #[clap(long, env = "CLICKHOUSE_DB")]
    pub db: String,
    /// Clickhouse username
    #[clap(long, env = "CLICKHOUSE_USERNAME")]
    pub username: String,
    /// Clickhouse password
    #[clap(long, env = "CLICKHOUSE_PASSWORD")]
    pub password: String,
}

/// RPC endpoint configuration options
#[derive(Debug, Clone, Parser)]
pub struct RpcOpts {
    /// HTTP RPC URL of the chain the token lives on
    #[clap(id = "rpc_url", long = "rpc-url", value_name = "URL", env = "RPC_URL")]
    pub url: Url,
}

/// Token and burn sink configuration options
#[derive(Debug, Clone, Parser)]
pub struct TokenOpts {
    /// ERC-20 token contract address
    #[clap(long, env = "TOKEN_ADDRESS")]
    pub token_address: Address,
    /// Token decimal count
    #[clap(long, env = "TOKEN_DECIMALS", default_value = "18")]
    pub token_decimals: u8,
    /// Token ticker used in messages
    #[clap(long, env = "TOKEN_SYMBOL")]
    pub token_symbol: String,
    /// Dead address burns are sent to
    #[clap(long, env = "DEAD_ADDRESS", default_value = "0x000000000000000000000000000000000000dEaD")]
    pub dead_address: Address,
    /// Collector contract burns are sent to
    #[clap(long, env = "COLLECTOR_ADDRESS")]
    pub collector_address: Address,
}

impl TokenOpts {
    /// The two burn sinks. Fails if they are the same address.
    pub fn sinks(&self) -> Result<SinkAddresses> {
        SinkAddresses::new(self.dead_address, self.collector_address)
    }
}

/// Live scanner configuration options
#[derive(Debug, Clone, Parser)]
pub struct ScannerOpts {
    /// Seconds between poll cycles
    #[clap(long, env = "POLL_INTERVAL_SECS", default_value = "30")]
    pub poll_interval_secs: u64,
    /// Blocks behind head to start from when no checkpoint exists
    #[clap(long, env = "INITIAL_LOOKBACK_BLOCKS", default_value = "600")]
    pub initial_lookback_blocks: u64,
    /// Widest block range the RPC provider accepts in one log query
    #[clap(long, env = "MAX_BLOCKS_PER_QUERY", default_value = "2000")]
    pub max_blocks_per_query: u64,
    /// Log queries in flight per sink
    #[clap(long, env = "FETCH_CONCURRENCY", default_value = "2")]
    pub fetch_concurrency: usize,
    /// Transaction lookups in flight while enriching
    #[clap(long, env = "ENRICH_CONCURRENCY", default_value = "4")]
    pub enrich_concurrency: usize,
    /// Smallest burn, in whole tokens, that triggers a notification
    #[clap(long, env = "MIN_NOTIFY_AMOUNT", default_value = "0")]
    pub min_notify_amount: String,
}

impl ScannerOpts {
    /// Poll interval as a [`Duration`].
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Notification threshold in the token's smallest unit.
    pub fn min_notify_raw(&self, decimals: u8) -> Result<U256> {
        parse_amount(&self.min_notify_amount, decimals)
            .wrap_err_with(|| format!("invalid MIN_NOTIFY_AMOUNT {:?}", self.min_notify_amount))
    }

    /// Reject settings the scanner cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.poll_interval_secs > 0, "POLL_INTERVAL_SECS must be greater than zero");
        ensure!(self.max_blocks_per_query > 0, "MAX_BLOCKS_PER_QUERY must be greater than zero");
        Ok(())
    }
}

/// Telegram notification configuration options
#[derive(Debug, Clone, Parser)]
pub struct TelegramOpts {
    /// Telegram bot token
    #[clap(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,
    /// Chat or channel id notifications are sent to
    #[clap(long, env = "TELEGRAM_CHAT_ID", allow_hyphen_values = true)]
    pub chat_id: String,
    /// Telegram Bot API base URL
    #[clap(long, env = "TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    pub api_url: Url,
    /// Block explorer base URL for transaction links
    #[clap(long, env = "EXPLORER_URL")]
    pub explorer_url: Option<Url>,
}

/// Historical import configuration options
#[derive(Debug, Clone, Parser)]
pub struct BackfillOpts {
    /// Block the token contract was deployed in
    #[clap(long, env = "DEPLOYMENT_BLOCK")]
    pub deployment_block: u64,
    /// Blocks per backfill log query
    #[clap(long, env = "BACKFILL_CHUNK_SIZE", default_value = "500")]
    pub chunk_size: u64,
    /// Milliseconds to wait between chunk requests
    #[clap(long, env = "BACKFILL_CHUNK_DELAY_MS", default_value = "250")]
    pub chunk_delay_ms: u64,
    /// Milliseconds to wait before retrying a failed chunk
    #[clap(long, env = "BACKFILL_RETRY_DELAY_MS", default_value = "5000")]
    pub retry_delay_ms: u64,
    /// Transaction lookups in flight while enriching
    #[clap(long, env = "ENRICH_CONCURRENCY", default_value = "4")]
    pub enrich_concurrency: usize,
}

impl BackfillOpts {
    /// Reject settings the backfill cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.chunk_size > 0, "BACKFILL_CHUNK_SIZE must be greater than zero");
        Ok(())
    }
}

/// CLI options for the burnwatch scanner
#[derive(Debug, Clone, Parser)]
pub struct Opts {
    /// Clickhouse database configuration
    #[clap(flatten)]
    pub clickhouse: ClickhouseOpts,

    /// RPC endpoint configuration
    #[clap(flatten)]
    pub rpc: RpcOpts,

    /// Token and sink configuration
    #[clap(flatten)]
    pub token: TokenOpts,

    /// Scanner configuration
    #[clap(flatten)]
    pub scanner: ScannerOpts,

    /// Telegram configuration
    #[clap(flatten)]
    pub telegram: TelegramOpts,

    /// If set, drop & re-create all tables (local/dev only)
    #[clap(long)]
    pub reset_db: bool,

    /// If set, do not create the database and tables on startup
    #[clap(long, env = "SKIP_MIGRATIONS")]
    pub skip_migrations: bool,
}

impl Opts {
    /// Check cross-field constraints clap cannot express.
    pub fn validate(&self) -> Result<()> {
        self.token.sinks()?;
        self.scanner.validate()?;
        self.scanner.min_notify_raw(self.token.token_decimals)?;
        Ok(())
    }
}

/// CLI options for the backfill tool
#[derive(Debug, Clone, Parser)]
pub struct BackfillCliOpts {
    /// Clickhouse database configuration
    #[clap(flatten)]
    pub clickhouse: ClickhouseOpts,

    /// RPC endpoint configuration
    #[clap(flatten)]
    pub rpc: RpcOpts,

    /// Token and sink configuration
    #[clap(flatten)]
    pub token: TokenOpts,

    /// Backfill configuration
    #[clap(flatten)]
    pub backfill: BackfillOpts,

    /// If set, do not create the database and tables on startup
    #[clap(long, env = "SKIP_MIGRATIONS")]
    pub skip_migrations: bool,
}

impl BackfillCliOpts {
    /// Check cross-field constraints clap cannot express.
    pub fn validate(&self) -> Result<()> {
        self.token.sinks()?;
        self.backfill.validate()
    }
}

/// CLI options for the statistics report
#[derive(Debug, Clone, Parser)]
pub struct StatsOpts {
    /// Clickhouse database configuration
    #[clap(flatten)]
    pub clickhouse: ClickhouseOpts,

    /// Token decimal count
    #[clap(long, env = "TOKEN_DECIMALS", default_value = "18")]
    pub token_decimals: u8,

    /// Token ticker
    #[clap(long, env = "TOKEN_SYMBOL", default_value = "")]
    pub token_symbol: String,

    /// Number of top initiators to list
    #[clap(long, default_value = "5")]
    pub top: u64,

    /// Number of recent burns to list
    #[clap(long, default_value = "10")]
    pub recent: u64,
}
