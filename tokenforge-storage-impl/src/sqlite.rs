#![cfg(feature = "sqlite")]

use anyhow::Context;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::runtime::Runtime;

use tokenforge_core::error::StorageError;

use crate::storage_traits::{record_id, ConditionalUpdate, Filter, Record, RecordStore, Table};

/// Rounds of read-merge-swap before `update` gives up on a contended row
const MAX_UPDATE_ATTEMPTS: usize = 32;

/// A SQLite-based implementation of the RecordStore interface using sqlx.
///
/// Every logical table lives in one `records` table keyed by
/// `(table_name, id)`, with the row body stored as JSON text.
pub struct SqliteRecordStore {
    pool: SqlitePool,
    rt: Arc<Runtime>,
    db_path: PathBuf,
}

impl SqliteRecordStore {
    /// Creates a new SQLite record store
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db_path = path.as_ref().to_path_buf();
        let db_url = format!("sqlite:{}", db_path.to_string_lossy());

        // Create a runtime for async operations
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map(Arc::new)
            .context("Failed to create runtime")?;

        let options = SqliteConnectOptions::from_str(&db_url)
            .with_context(|| format!("Invalid database URL: {db_url}"))?
            .create_if_missing(true);

        let pool = rt
            .block_on(async {
                SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect_with(options)
                    .await
            })
            .with_context(|| format!("Failed to connect to database at {}", db_path.display()))?;

        rt.block_on(Self::initialize_schema(&pool))
            .context("Failed to initialize database schema")?;

        log::debug!("opened record store at {}", db_path.display());
        Ok(Self { pool, rt, db_path })
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Creates the records table
    async fn initialize_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                table_name TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (table_name, id)
            )",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn decode(data: &str) -> Result<Record, StorageError> {
        Ok(serde_json::from_str(data)?)
    }

    fn encode(record: &Record) -> Result<String, StorageError> {
        Ok(serde_json::to_string(record)?)
    }

    async fn fetch(&self, table: Table, id: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT data FROM records WHERE table_name = ? AND id = ?")
            .bind(table.name())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch {table} row {id}"))?;
        Ok(row.map(|row| row.get::<String, _>(0)))
    }

    /// Replace the row body only if it still reads `current`.
    ///
    /// Returns false if another writer got there first.
    async fn swap(
        &self,
        table: Table,
        id: &str,
        current: &str,
        next: &str,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE records SET data = ? WHERE table_name = ? AND id = ? AND data = ?",
        )
        .bind(next)
        .bind(table.name())
        .bind(id)
        .bind(current)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to update {table} row {id}"))?;
        Ok(result.rows_affected() == 1)
    }

    async fn fetch_existing(&self, table: Table, id: &str) -> Result<String, StorageError> {
        self.fetch(table, id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("{table} row {id}")))
    }
}

impl RecordStore for SqliteRecordStore {
    fn get(&self, table: Table, id: &str) -> Result<Option<Record>, StorageError> {
        self.rt.block_on(async {
            match self.fetch(table, id).await? {
                Some(data) => Ok(Some(Self::decode(&data)?)),
                None => Ok(None),
            }
        })
    }

    fn list(&self, table: Table, filter: &Filter) -> Result<Vec<Record>, StorageError> {
        self.rt.block_on(async {
            let rows = sqlx::query("SELECT data FROM records WHERE table_name = ? ORDER BY id")
                .bind(table.name())
                .fetch_all(&self.pool)
                .await
                .with_context(|| format!("Failed to list {table}"))?;

            let mut records = Vec::new();
            for row in rows {
                let record = Self::decode(&row.get::<String, _>(0))?;
                if filter.matches(&record) {
                    records.push(record);
                }
            }
            Ok(records)
        })
    }

    fn insert(&self, table: Table, record: Record) -> Result<(), StorageError> {
        let id = record_id(&record)?.to_string();
        let data = Self::encode(&record)?;
        self.rt.block_on(async {
            let result = sqlx::query("INSERT INTO records (table_name, id, data) VALUES (?, ?, ?)")
                .bind(table.name())
                .bind(id.as_str())
                .bind(data.as_str())
                .execute(&self.pool)
                .await;
            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    Err(StorageError::Duplicate(format!("{table} row {id}")))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn update(&self, table: Table, id: &str, fields: Record) -> Result<Record, StorageError> {
        self.rt.block_on(async move {
            // Merge onto the latest body; a concurrent write restarts the merge
            for _ in 0..MAX_UPDATE_ATTEMPTS {
                let current = self.fetch_existing(table, id).await?;
                let mut record = Self::decode(&current)?;
                record.extend(fields.clone());
                if self.swap(table, id, &current, &Self::encode(&record)?).await? {
                    return Ok(record);
                }
                log::debug!("{table} row {id} changed during update, retrying");
            }
            Err(StorageError::Other(format!(
                "{table} row {id} kept changing; gave up after {MAX_UPDATE_ATTEMPTS} attempts"
            )))
        })
    }

    fn update_if(
        &self,
        table: Table,
        id: &str,
        expected: &Filter,
        fields: Record,
    ) -> Result<ConditionalUpdate, StorageError> {
        self.rt.block_on(async move {
            let current = self.fetch_existing(table, id).await?;
            let mut record = Self::decode(&current)?;
            if !expected.matches(&record) {
                return Ok(ConditionalUpdate::Rejected(record));
            }
            record.extend(fields);

            if self.swap(table, id, &current, &Self::encode(&record)?).await? {
                return Ok(ConditionalUpdate::Applied(record));
            }
            let now = self.fetch_existing(table, id).await?;
            Ok(ConditionalUpdate::Rejected(Self::decode(&now)?))
        })
    }

    fn delete(&self, table: Table, id: &str) -> Result<bool, StorageError> {
        self.rt.block_on(async {
            let result = sqlx::query("DELETE FROM records WHERE table_name = ? AND id = ?")
                .bind(table.name())
                .bind(id)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to delete {table} row {id}"))?;
            Ok(result.rows_affected() > 0)
        })
    }
}
