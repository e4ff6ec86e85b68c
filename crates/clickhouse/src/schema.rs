//! Schema definitions for ClickHouse tables

/// Table schema definition
#[derive(Debug)]
pub struct TableSchema {
    /// Table name
    pub name: &'static str,
    /// Column definitions
    pub columns: &'static str,
    /// Table engine
    pub engine: &'static str,
    /// Sorting key; rows sharing it are collapsed by the replacing engine
    pub order_by: &'static str,
}

/// Table holding one row per recorded burn transaction
pub const BURNS_TABLE: &str = "burns";

/// Table holding the scanner's durable key/value state
pub const SCANNER_STATE_TABLE: &str = "scanner_state";

/// Names of all tables
pub const TABLES: &[&str] = &[BURNS_TABLE, SCANNER_STATE_TABLE];

/// Schema definitions for tables
pub const TABLE_SCHEMAS: &[TableSchema] = &[
    TableSchema {
        name: BURNS_TABLE,
        columns: "id String,
                 tx_hash FixedString(32),
                 block_number UInt64,
                 block_ts UInt64,
                 amount_raw String,
                 amount_formatted String,
                 initiator FixedString(20),
                 transfer_from FixedString(20),
                 destination LowCardinality(String),
                 gas_used Nullable(String),
                 gas_price Nullable(String),
                 notified_at_ms UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree()",
        order_by: "tx_hash",
    },
    TableSchema {
        name: SCANNER_STATE_TABLE,
        columns: "key String,
                 value UInt64,
                 updated_at_ms UInt64",
        engine: "ReplacingMergeTree(updated_at_ms)",
        order_by: "key",
    },
];
