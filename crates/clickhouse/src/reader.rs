//! `ClickHouse` reader functionality.
//! Handles dedup lookups, checkpoint reads and reporting queries.

use std::time::Instant;

use alloy_primitives::{Address, B256, U256};
use clickhouse::{Client, Row};
use derive_more::Debug;
use eyre::{Result, WrapErr};
use primitives::StoredBurn;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::{
    models::{BurnRow, BurnTotalsRow, InitiatorTotalRow},
    schema::{BURNS_TABLE, SCANNER_STATE_TABLE},
    types::HashBytes,
};

/// Burn totals of one initiator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiatorTotal {
    /// Initiator address
    pub initiator: Address,
    /// Raw amount burned
    pub total: U256,
    /// Number of burns
    pub count: u64,
}

/// Aggregate statistics over every recorded burn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BurnStats {
    /// Raw amount burned
    pub total_amount: U256,
    /// Number of recorded burns
    pub count: u64,
    /// Timestamp of the latest burn
    pub last_timestamp: Option<u64>,
    /// Largest initiators by amount burned
    pub top_initiators: Vec<InitiatorTotal>,
    /// Number of distinct initiators
    pub unique_initiators: u64,
    /// Mean number of seconds between consecutive burns
    pub average_interval_secs: Option<u64>,
}

/// `ClickHouse` reader client (read-only operations)
#[derive(Clone, Debug)]
pub struct ClickhouseReader {
    /// Base client
    #[debug(skip)]
    base: Client,
    /// Database name
    db_name: String,
}

impl ClickhouseReader {
    /// Create a new `ClickHouse` reader client
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_database(db_name.clone())
            .with_user(username)
            .with_password(password);

        Self { base: client, db_name }
    }

    async fn execute<R>(&self, query: &str) -> Result<Vec<R>>
    where
        R: Row + for<'b> Deserialize<'b>,
    {
        let start = Instant::now();
        let result = self.base.query(query).fetch_all::<R>().await;

        let duration_ms = start.elapsed().as_millis();
        match &result {
            Ok(rows) => {
                debug!(query = %query, duration_ms, rows = rows.len(), "ClickHouse query executed")
            }
            Err(e) => error!(query = %query, duration_ms, error = %e, "ClickHouse query failed"),
        }
        result.map_err(Into::into)
    }

    /// Whether a burn with `tx_hash` has been recorded
    pub async fn has_burn(&self, tx_hash: B256) -> Result<bool> {
        #[derive(Row, Deserialize)]
        struct Count {
            count: u64,
        }

        let query = format!(
            "SELECT count() AS count FROM {db}.{BURNS_TABLE} WHERE tx_hash = unhex('{hash}')",
            db = self.db_name,
            hash = HashBytes::from(tx_hash).to_hex(),
        );
        let rows = self.execute::<Count>(&query).await.wrap_err("checking for burn failed")?;
        Ok(rows.first().is_some_and(|r| r.count > 0))
    }

    /// Latest value stored under `key`, if any
    pub async fn get_state(&self, key: &str) -> Result<Option<u64>> {
        #[derive(Row, Deserialize)]
        struct Value {
            value: u64,
        }

        let query = latest_state_query(&self.db_name, key);
        let rows = self.execute::<Value>(&query).await.wrap_err("reading scanner state failed")?;
        Ok(rows.into_iter().next().map(|r| r.value))
    }

    /// Most recent burns, newest first
    pub async fn recent_burns(&self, limit: u64) -> Result<Vec<StoredBurn>> {
        let query = format!(
            "SELECT id, tx_hash, block_number, block_ts, amount_raw, amount_formatted, \
                    initiator, transfer_from, destination, gas_used, gas_price, notified_at_ms \
             FROM {db}.{BURNS_TABLE} FINAL \
             ORDER BY block_number DESC LIMIT {limit}",
            db = self.db_name,
        );
        let rows = self.execute::<BurnRow>(&query).await.wrap_err("fetching recent burns failed")?;
        rows.into_iter().map(StoredBurn::try_from).collect()
    }

    /// Aggregate statistics with the `top_n` largest initiators
    pub async fn aggregate_stats(&self, top_n: u64) -> Result<BurnStats> {
        let totals_query = format!(
            "SELECT toString(sum(toUInt256(amount_raw))) AS total_raw, \
                    count() AS burn_count, \
                    min(block_ts) AS first_ts, \
                    max(block_ts) AS last_ts, \
                    uniqExact(initiator) AS unique_initiators \
             FROM {db}.{BURNS_TABLE} FINAL",
            db = self.db_name,
        );
        let top_query = format!(
            "SELECT initiator, \
                    toString(sum(toUInt256(amount_raw))) AS total_raw, \
                    count() AS burn_count \
             FROM {db}.{BURNS_TABLE} FINAL \
             GROUP BY initiator \
             ORDER BY sum(toUInt256(amount_raw)) DESC \
             LIMIT {top_n}",
            db = self.db_name,
        );

        let totals = self
            .execute::<BurnTotalsRow>(&totals_query)
            .await
            .wrap_err("fetching burn totals failed")?;
        let Some(totals) = totals.into_iter().next().filter(|t| t.burn_count > 0) else {
            return Ok(BurnStats::default());
        };

        let top = self
            .execute::<InitiatorTotalRow>(&top_query)
            .await
            .wrap_err("fetching top initiators failed")?;
        let top_initiators = top
            .into_iter()
            .map(|row| {
                Ok(InitiatorTotal {
                    initiator: row.initiator.into(),
                    total: parse_sum(&row.total_raw)?,
                    count: row.burn_count,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let average_interval_secs = (totals.burn_count > 1)
            .then(|| totals.last_ts.saturating_sub(totals.first_ts) / (totals.burn_count - 1));

        Ok(BurnStats {
            total_amount: parse_sum(&totals.total_raw)?,
            count: totals.burn_count,
            last_timestamp: Some(totals.last_ts),
            top_initiators,
            unique_initiators: totals.unique_initiators,
            average_interval_secs,
        })
    }
}

/// Newest row under `key`. Rows written in the same millisecond resolve to the
/// larger value, so an unmerged table never yields an older checkpoint.
fn latest_state_query(db_name: &str, key: &str) -> String {
    format!(
        "SELECT value FROM {db_name}.{SCANNER_STATE_TABLE} \
         WHERE key = '{key}' ORDER BY updated_at_ms DESC, value DESC LIMIT 1",
        key = key.replace('\'', "\\'"),
    )
}

fn parse_sum(raw: &str) -> Result<U256> {
    raw.parse::<U256>().wrap_err_with(|| format!("invalid amount sum `{raw}`"))
}

#[cfg(test)]
mod tests {
    use clickhouse::test::{Mock, handlers};
    use serde::Serialize;

    use super::*;
    use crate::types::AddressBytes;

    #[derive(Row, Serialize)]
    struct CountRow {
        count: u64,
    }

    #[derive(Row, Serialize)]
    struct ValueRow {
        value: u64,
    }

    fn reader(mock: &Mock) -> ClickhouseReader {
        let url = Url::parse(mock.url()).unwrap();
        ClickhouseReader::new(url, "burnwatch".to_owned(), "user".into(), "pass".into())
    }

    #[tokio::test]
    async fn has_burn_reflects_count() {
        let mock = Mock::new();
        mock.add(handlers::provide(vec![CountRow { count: 1 }]));
        mock.add(handlers::provide(vec![CountRow { count: 0 }]));

        let reader = reader(&mock);
        assert!(reader.has_burn(B256::repeat_byte(1)).await.unwrap());
        assert!(!reader.has_burn(B256::repeat_byte(2)).await.unwrap());
    }

    #[tokio::test]
    async fn missing_state_is_none() {
        let mock = Mock::new();
        mock.add(handlers::provide(Vec::<ValueRow>::new()));
        mock.add(handlers::provide(vec![ValueRow { value: 99 }]));

        let reader = reader(&mock);
        assert_eq!(reader.get_state("lastProcessedBlock").await.unwrap(), None);
        assert_eq!(reader.get_state("lastProcessedBlock").await.unwrap(), Some(99));
    }

    #[test]
    fn state_query_breaks_timestamp_ties_by_value() {
        let query = latest_state_query("burnwatch", "lastProcessedBlock");
        assert!(query.contains("FROM burnwatch.scanner_state"));
        assert!(query.contains("WHERE key = 'lastProcessedBlock'"));
        assert!(query.contains("ORDER BY updated_at_ms DESC, value DESC LIMIT 1"));
    }

    #[test]
    fn state_query_escapes_key() {
        let query = latest_state_query("burnwatch", "it's");
        assert!(query.contains("WHERE key = 'it\\'s'"));
    }

    #[tokio::test]
    async fn aggregate_stats_combines_totals_and_top_initiators() {
        let mock = Mock::new();
        let big = "340282366920938463463374607431768211456";
        mock.add(handlers::provide(vec![BurnTotalsRow {
            total_raw: big.to_owned(),
            burn_count: 5,
            first_ts: 1_000,
            last_ts: 1_400,
            unique_initiators: 2,
        }]));
        mock.add(handlers::provide(vec![InitiatorTotalRow {
            initiator: AddressBytes([7u8; 20]),
            total_raw: "300".to_owned(),
            burn_count: 3,
        }]));

        let stats = reader(&mock).aggregate_stats(5).await.unwrap();
        assert_eq!(stats.total_amount, big.parse::<U256>().unwrap());
        assert_eq!(stats.count, 5);
        assert_eq!(stats.last_timestamp, Some(1_400));
        assert_eq!(stats.unique_initiators, 2);
        assert_eq!(stats.average_interval_secs, Some(100));
        assert_eq!(
            stats.top_initiators,
            vec![InitiatorTotal {
                initiator: Address::repeat_byte(7),
                total: U256::from(300),
                count: 3
            }]
        );
    }

    #[tokio::test]
    async fn aggregate_stats_of_empty_table() {
        let mock = Mock::new();
        mock.add(handlers::provide(vec![BurnTotalsRow {
            total_raw: "0".to_owned(),
            burn_count: 0,
            first_ts: 0,
            last_ts: 0,
            unique_initiators: 0,
        }]));

        let stats = reader(&mock).aggregate_stats(5).await.unwrap();
        assert_eq!(stats, BurnStats::default());
    }
}
