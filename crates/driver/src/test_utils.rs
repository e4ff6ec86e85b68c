//! Fake collaborators shared by the driver tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use clickhouse::memory::MemoryBurnStore;
use extractor::memory::MemoryLogSource;
use notifier::{DeliveryError, MessageContext, NotificationSink};
use primitives::SinkAddresses;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::scanner::{CheckpointedScanner, ScannerConfig};

pub(crate) const TOKEN: Address = Address::repeat_byte(0x70);
pub(crate) const DEAD: Address = Address::repeat_byte(0xde);
pub(crate) const COLLECTOR: Address = Address::repeat_byte(0xc0);

pub(crate) const fn tx(n: u8) -> B256 {
    B256::repeat_byte(n)
}

#[derive(Debug, Default)]
struct SinkState {
    delivered: Vec<String>,
    failing: Vec<B256>,
    cancel_on_delivery: Option<CancellationToken>,
}

/// Records delivered messages; fails those mentioning a configured transaction.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    fn state(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn fail_for(&self, tx_hash: B256) {
        self.state().failing.push(tx_hash);
    }

    /// Cancel `token` once a message has been accepted.
    pub(crate) fn cancel_on_delivery(&self, token: CancellationToken) {
        self.state().cancel_on_delivery = Some(token);
    }

    pub(crate) fn heal(&self) {
        self.state().failing.clear();
    }

    pub(crate) fn delivered(&self) -> Vec<String> {
        self.state().delivered.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, _channel: &str, text: &str) -> Result<(), DeliveryError> {
        let mut state = self.state();
        if state.failing.iter().any(|tx| text.contains(&tx.to_string())) {
            return Err(DeliveryError::Rejected {
                status: StatusCode::BAD_GATEWAY,
                description: "injected failure".to_owned(),
            });
        }
        state.delivered.push(text.to_owned());
        if let Some(token) = &state.cancel_on_delivery {
            token.cancel();
        }
        Ok(())
    }
}

pub(crate) struct Fixture {
    pub(crate) source: MemoryLogSource,
    pub(crate) store: MemoryBurnStore,
    pub(crate) sink: RecordingSink,
    threshold: U256,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::with_threshold(U256::ZERO)
    }

    pub(crate) fn with_threshold(threshold: U256) -> Self {
        Self {
            source: MemoryLogSource::default(),
            store: MemoryBurnStore::default(),
            sink: RecordingSink::default(),
            threshold,
        }
    }

    pub(crate) fn sinks() -> SinkAddresses {
        SinkAddresses { dead: DEAD, collector: COLLECTOR }
    }

    pub(crate) fn scanner(&self) -> CheckpointedScanner<MemoryLogSource, MemoryBurnStore, RecordingSink> {
        let config = ScannerConfig {
            token: TOKEN,
            sinks: Self::sinks(),
            decimals: 0,
            initial_lookback_blocks: 600,
            max_blocks_per_query: 9,
            fetch_concurrency: 2,
            enrich_concurrency: 3,
            min_notify_raw: self.threshold,
            channel: "-100".to_owned(),
            message: MessageContext { symbol: "TKN".to_owned(), explorer_url: None },
        };
        CheckpointedScanner::new(self.source.clone(), self.store.clone(), self.sink.clone(), config)
    }
}
