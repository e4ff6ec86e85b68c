//! In-memory [`LogSource`] for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use eyre::{Result, bail};

use crate::source::{
    BlockInfo, LogSource, RawTransferLog, ReceiptInfo, TransactionInfo, TransferFilter,
};

/// A recorded `get_transfer_logs` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    /// Recipient filtered on
    pub to: Address,
    /// First block queried
    pub from_block: u64,
    /// Last block queried
    pub to_block: u64,
}

#[derive(Debug, Default)]
struct State {
    head: u64,
    logs: Vec<(Address, RawTransferLog)>,
    transactions: HashMap<B256, TransactionInfo>,
    receipts: HashMap<B256, ReceiptInfo>,
    blocks: HashMap<u64, BlockInfo>,
    queries: Vec<LogQuery>,
    failing_blocks: HashSet<u64>,
    failing_log_queries: usize,
    failing_transactions: HashSet<B256>,
}

/// A chain held in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSource {
    state: Arc<Mutex<State>>,
}

impl MemoryLogSource {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the chain head.
    pub fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    /// Add a transfer of `value` to `to`, signed and sent by the same account,
    /// together with its transaction, receipt and block.
    pub fn push_transfer(&self, to: Address, tx_hash: B256, block_number: u64, value: U256) {
        self.push_routed_transfer(to, tx_hash, block_number, value, Address::repeat_byte(0x11), None);
    }

    /// Add a transfer whose `Transfer.from` is `via` (or the signer when `None`).
    pub fn push_routed_transfer(
        &self,
        to: Address,
        tx_hash: B256,
        block_number: u64,
        value: U256,
        signer: Address,
        via: Option<Address>,
    ) {
        let mut state = self.state();
        let log_index = state.logs.iter().filter(|(_, l)| l.block_number == Some(block_number)).count();
        state.logs.push((
            to,
            RawTransferLog {
                tx_hash: Some(tx_hash),
                block_number: Some(block_number),
                log_index: Some(log_index as u64),
                from: Some(via.unwrap_or(signer)),
                to: Some(to),
                value: Some(value),
            },
        ));
        state.transactions.insert(tx_hash, TransactionInfo { from: signer, gas_price: None });
        state
            .receipts
            .insert(tx_hash, ReceiptInfo { gas_used: 21_000, effective_gas_price: 1_000_000_000 });
        state
            .blocks
            .insert(block_number, BlockInfo { number: block_number, timestamp: block_number * 12 });
        state.head = state.head.max(block_number);
    }

    /// Fail every log query whose range contains `block`.
    pub fn fail_log_queries_in(&self, block: u64) {
        self.state().failing_blocks.insert(block);
    }

    /// Fail the next `count` log queries regardless of range.
    pub fn fail_next_log_queries(&self, count: usize) {
        self.state().failing_log_queries = count;
    }

    /// Make lookups for `tx_hash` fail until [`Self::heal`] is called.
    pub fn fail_transaction(&self, tx_hash: B256) {
        self.state().failing_transactions.insert(tx_hash);
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        let mut state = self.state();
        state.failing_blocks.clear();
        state.failing_log_queries = 0;
        state.failing_transactions.clear();
    }

    /// Log queries issued so far.
    pub fn queries(&self) -> Vec<LogQuery> {
        self.state().queries.clone()
    }
}

#[async_trait]
impl LogSource for MemoryLogSource {
    async fn current_head(&self) -> Result<u64> {
        Ok(self.state().head)
    }

    async fn get_transfer_logs(
        &self,
        filter: &TransferFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawTransferLog>> {
        let mut state = self.state();
        state.queries.push(LogQuery { to: filter.to, from_block, to_block });

        if state.failing_log_queries > 0 {
            state.failing_log_queries -= 1;
            bail!("injected log query failure");
        }
        if state.failing_blocks.iter().any(|b| (from_block..=to_block).contains(b)) {
            bail!("query returned more than 10000 results");
        }

        Ok(state
            .logs
            .iter()
            .filter(|(to, log)| {
                *to == filter.to &&
                    log.block_number.is_none_or(|b| (from_block..=to_block).contains(&b))
            })
            .map(|(_, log)| log.clone())
            .collect())
    }

    async fn get_transaction(&self, tx_hash: B256) -> Result<Option<TransactionInfo>> {
        let state = self.state();
        if state.failing_transactions.contains(&tx_hash) {
            bail!("injected transaction lookup failure for {tx_hash}");
        }
        Ok(state.transactions.get(&tx_hash).copied())
    }

    async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<ReceiptInfo>> {
        Ok(self.state().receipts.get(&tx_hash).copied())
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>> {
        Ok(self.state().blocks.get(&number).copied())
    }
}
