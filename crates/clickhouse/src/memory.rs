//! In-memory [`BurnStore`] for tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::B256;
use async_trait::async_trait;
use eyre::{Result, bail};
use primitives::StoredBurn;

use crate::store::{BurnStore, InsertOutcome};

#[derive(Debug, Default)]
struct State {
    burns: Vec<StoredBurn>,
    checkpoint: Option<u64>,
    checkpoint_writes: Vec<u64>,
    failing_inserts: HashSet<B256>,
    failing_checkpoint_reads: usize,
}

/// A store held in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryBurnStore {
    state: Arc<Mutex<State>>,
}

impl MemoryBurnStore {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded burns in insertion order.
    pub fn burns(&self) -> Vec<StoredBurn> {
        self.state().burns.clone()
    }

    /// Every checkpoint value written so far.
    pub fn checkpoint_writes(&self) -> Vec<u64> {
        self.state().checkpoint_writes.clone()
    }

    /// Overwrite the checkpoint out of band, like a manual admin reset.
    pub fn reset_checkpoint(&self, block: Option<u64>) {
        self.state().checkpoint = block;
    }

    /// Fail persisting the burn of `tx_hash` until [`Self::heal`] is called.
    pub fn fail_insert_of(&self, tx_hash: B256) {
        self.state().failing_inserts.insert(tx_hash);
    }

    /// Fail the next `count` checkpoint reads.
    pub fn fail_next_checkpoint_reads(&self, count: usize) {
        self.state().failing_checkpoint_reads = count;
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        let mut state = self.state();
        state.failing_inserts.clear();
        state.failing_checkpoint_reads = 0;
    }
}

#[async_trait]
impl BurnStore for MemoryBurnStore {
    async fn has_record(&self, tx_hash: B256) -> Result<bool> {
        Ok(self.state().burns.iter().any(|b| b.event.tx_hash == tx_hash))
    }

    async fn insert_record(&self, burn: &StoredBurn) -> Result<InsertOutcome> {
        let mut state = self.state();
        let tx_hash = burn.event.tx_hash;
        if state.failing_inserts.contains(&tx_hash) {
            bail!("injected insert failure for {tx_hash}");
        }
        if state.burns.iter().any(|b| b.event.tx_hash == tx_hash) {
            return Ok(InsertOutcome::Duplicate);
        }
        state.burns.push(burn.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_checkpoint(&self) -> Result<Option<u64>> {
        let mut state = self.state();
        if state.failing_checkpoint_reads > 0 {
            state.failing_checkpoint_reads -= 1;
            bail!("injected checkpoint read failure");
        }
        Ok(state.checkpoint)
    }

    async fn set_checkpoint(&self, block: u64) -> Result<()> {
        let mut state = self.state();
        state.checkpoint = Some(block);
        state.checkpoint_writes.push(block);
        Ok(())
    }
}
