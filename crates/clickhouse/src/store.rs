use alloy_primitives::B256;
use async_trait::async_trait;
use eyre::Result;
use primitives::{StoredBurn, now_ms};
use tracing::debug;
use url::Url;

use crate::{
    models::{BurnRow, StateRow},
    reader::ClickhouseReader,
    writer::ClickhouseWriter,
};

/// Scanner state key holding the last fully processed block.
pub const CHECKPOINT_KEY: &str = "lastProcessedBlock";

/// Result of [`BurnStore::insert_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The burn was written.
    Inserted,
    /// A burn with the same transaction hash already exists; nothing was written.
    Duplicate,
}

/// Durable checkpoint plus the set of recorded burns.
#[async_trait]
pub trait BurnStore: Send + Sync {
    /// Whether a burn for `tx_hash` has been recorded.
    async fn has_record(&self, tx_hash: B256) -> Result<bool>;

    /// Record `burn` unless its transaction hash is already present.
    async fn insert_record(&self, burn: &StoredBurn) -> Result<InsertOutcome>;

    /// Last fully processed block, absent before the first cycle.
    async fn get_checkpoint(&self) -> Result<Option<u64>>;

    /// Store a new checkpoint. Callers never move it backwards.
    async fn set_checkpoint(&self, block: u64) -> Result<()>;
}

/// [`BurnStore`] backed by `ClickHouse`.
#[derive(Debug, Clone)]
pub struct ClickhouseStore {
    reader: ClickhouseReader,
    writer: ClickhouseWriter,
}

impl ClickhouseStore {
    /// Connect reader and writer to the same database.
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Self {
        Self {
            reader: ClickhouseReader::new(url.clone(), db_name.clone(), username.clone(), password.clone()),
            writer: ClickhouseWriter::new(url, db_name, username, password),
        }
    }

    /// Read-only half of the store.
    pub const fn reader(&self) -> &ClickhouseReader {
        &self.reader
    }

    /// Write half of the store.
    pub const fn writer(&self) -> &ClickhouseWriter {
        &self.writer
    }
}

#[async_trait]
impl BurnStore for ClickhouseStore {
    async fn has_record(&self, tx_hash: B256) -> Result<bool> {
        self.reader.has_burn(tx_hash).await
    }

    async fn insert_record(&self, burn: &StoredBurn) -> Result<InsertOutcome> {
        if self.reader.has_burn(burn.event.tx_hash).await? {
            debug!(tx_hash = %burn.event.tx_hash, "Burn already recorded");
            return Ok(InsertOutcome::Duplicate);
        }
        self.writer.insert_burn(&BurnRow::from(burn)).await?;
        Ok(InsertOutcome::Inserted)
    }

    async fn get_checkpoint(&self) -> Result<Option<u64>> {
        self.reader.get_state(CHECKPOINT_KEY).await
    }

    async fn set_checkpoint(&self, block: u64) -> Result<()> {
        let row = StateRow { key: CHECKPOINT_KEY.to_owned(), value: block, updated_at_ms: now_ms() };
        self.writer.insert_state(&row).await
    }
}
