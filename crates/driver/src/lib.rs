//! Burnwatch driver crate root
//!
//! Wires the log source, the store and the notification sink into the
//! [`scanner::CheckpointedScanner`] poll loop and the [`backfill::BackfillRunner`].

pub mod backfill;
pub mod driver;
pub mod scanner;
#[cfg(test)]
mod test_utils;

pub use backfill::{BackfillConfig, BackfillError, BackfillRunner, BackfillSummary};
pub use driver::{Driver, LiveDriver};
pub use scanner::{CheckpointedScanner, CycleMode, CycleReport, EventError, ScanError, ScannerConfig};
