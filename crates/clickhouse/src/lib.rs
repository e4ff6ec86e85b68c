//! Burnwatch `ClickHouse` store: recorded burns and scanner checkpoint.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
/// Row models
pub mod models;
/// Read-only queries
pub mod reader;
/// Table definitions
pub mod schema;
mod store;
/// Fixed-size byte columns
pub mod types;
/// Schema management and inserts
pub mod writer;

pub use reader::{BurnStats, ClickhouseReader, InitiatorTotal};
pub use store::{BurnStore, CHECKPOINT_KEY, ClickhouseStore, InsertOutcome};
pub use writer::ClickhouseWriter;
