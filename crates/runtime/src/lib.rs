//! Runtime utilities for burnwatch binaries.

pub mod shutdown;

pub use shutdown::{ShutdownSignal, run_until_cancelled, spawn_shutdown_listener};
