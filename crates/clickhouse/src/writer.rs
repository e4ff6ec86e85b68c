//! `ClickHouse` writer functionality for burnwatch.
//! Handles database initialization and row insertion.

use clickhouse::Client;
use derive_more::Debug;
use eyre::{Result, WrapErr};
use tracing::info;
use url::Url;

use crate::{
    models::{BurnRow, StateRow},
    schema::{BURNS_TABLE, SCANNER_STATE_TABLE, TABLE_SCHEMAS, TABLES, TableSchema},
};

/// `ClickHouse` writer client (schema management and inserts)
#[derive(Clone, Debug)]
pub struct ClickhouseWriter {
    /// Base client
    #[debug(skip)]
    base: Client,
    /// Database name
    db_name: String,
}

impl ClickhouseWriter {
    /// Create a new `ClickHouse` writer client
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_database(db_name.clone())
            .with_user(username)
            .with_password(password);

        Self { base: client, db_name }
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                {}
            ) ENGINE = {}
            ORDER BY ({})",
            self.db_name, schema.name, schema.columns, schema.engine, schema.order_by
        );

        self.base
            .query(&query)
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to create {} table", schema.name))
    }

    async fn drop_table(&self, table_name: &str) -> Result<()> {
        self.base
            .query(&format!("DROP TABLE IF EXISTS {}.{}", self.db_name, table_name))
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to drop {table_name} table"))
    }

    /// Create the database and tables, dropping existing tables first if `reset` is set
    pub async fn init_db(&self, reset: bool) -> Result<()> {
        self.base
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.db_name))
            .execute()
            .await
            .wrap_err("Failed to create database")?;

        if reset {
            for table in TABLES {
                self.drop_table(table).await?;
            }
            info!(db_name = %self.db_name, "Database reset complete");
        }

        for schema in TABLE_SCHEMAS {
            self.create_table(schema).await?;
        }
        info!(db_name = %self.db_name, tables = TABLE_SCHEMAS.len(), "Database schema ready");
        Ok(())
    }

    /// Insert a burn row
    pub async fn insert_burn(&self, row: &BurnRow) -> Result<()> {
        let client = self.base.clone().with_database(&self.db_name);
        let mut insert = client.insert(BURNS_TABLE)?;
        insert.write(row).await?;
        insert.end().await?;
        Ok(())
    }

    /// Insert a scanner state row
    pub async fn insert_state(&self, row: &StateRow) -> Result<()> {
        let client = self.base.clone().with_database(&self.db_name);
        let mut insert = client.insert(SCANNER_STATE_TABLE)?;
        insert.write(row).await?;
        insert.end().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clickhouse::test::{Mock, handlers};

    use super::*;

    fn writer(mock: &Mock) -> ClickhouseWriter {
        let url = Url::parse(mock.url()).unwrap();
        ClickhouseWriter::new(url, "burnwatch".to_owned(), "user".into(), "pass".into())
    }

    #[tokio::test]
    async fn insert_state_writes_row() {
        let mock = Mock::new();
        let recorder = mock.add(handlers::record::<StateRow>());

        let row = StateRow { key: "lastProcessedBlock".to_owned(), value: 42, updated_at_ms: 7 };
        writer(&mock).insert_state(&row).await.unwrap();

        let rows: Vec<StateRow> = recorder.collect().await;
        assert_eq!(rows, vec![row]);
    }

    #[tokio::test]
    async fn init_db_creates_every_table() {
        let mock = Mock::new();
        let database = mock.add(handlers::record_ddl());
        let tables: Vec<_> = TABLE_SCHEMAS.iter().map(|_| mock.add(handlers::record_ddl())).collect();

        writer(&mock).init_db(false).await.unwrap();

        assert!(database.query().await.contains("CREATE DATABASE IF NOT EXISTS burnwatch"));
        let mut ddl = Vec::new();
        for table in tables {
            ddl.push(table.query().await);
        }
        assert!(ddl[0].contains("burnwatch.burns"));
        assert!(ddl[0].contains("ReplacingMergeTree()"));
        assert!(ddl[1].contains("ReplacingMergeTree(updated_at_ms)"));
    }
}
