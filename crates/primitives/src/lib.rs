//! Core primitives for the burnwatch project.

/// Token amount formatting and threshold parsing
pub mod amount;
/// Burn event and stored burn types
pub mod burn;
/// Transport retry policies
pub mod retries;

pub use burn::{BurnEvent, Sink, SinkAddresses, StoredBurn, now_ms};
