//! Burnwatch extractor: reads burn transfers from the chain.
//!
//! [`ChunkedLogFetcher`] turns arbitrary block ranges into provider-compliant log
//! queries and [`reconcile`] folds the per-sink logs into enriched [`BurnEvent`]s.
//!
//! [`BurnEvent`]: primitives::BurnEvent

mod fetcher;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod reconcile;
mod rpc;
mod source;

pub use fetcher::{ChunkedLogFetcher, FetchError, SinkLogs, chunk_ranges};
pub use reconcile::{EnrichFailure, Enrich, Reconciliation, SourceEnricher, TxMetadata, reconcile};
pub use rpc::RpcLogSource;
pub use source::{
    BlockInfo, LogSource, RawTransferLog, ReceiptInfo, TransactionInfo, TransferFilter,
};
