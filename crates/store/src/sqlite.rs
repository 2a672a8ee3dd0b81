//! SQLite backend.
//!
//! A single `entries` table keyed by `(collection, key)` with an integer
//! `version` column. Compare-and-set is a conditional `UPDATE` (or an
//! `INSERT … ON CONFLICT DO NOTHING` for version 0), so the check and the
//! write happen in one statement.

use async_trait::async_trait;
use chrono::Utc;
use deepdive_core::error::StoreError;
use deepdive_core::store::{Collection, StateStore, Versioned, version_conflict};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed state store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to `:memory:` is its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                collection  TEXT NOT NULL,
                key         TEXT NOT NULL,
                version     INTEGER NOT NULL,
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("entries table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn current_version(&self, collection: Collection, key: &str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT version FROM entries WHERE collection = ?1 AND key = ?2")
            .bind(collection.name())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Version lookup failed: {e}")))?;

        match row {
            Some(row) => Self::version_of(&row),
            None => Ok(0),
        }
    }

    fn version_of(row: &sqlx::sqlite::SqliteRow) -> Result<u64, StoreError> {
        let version: i64 = row
            .try_get("version")
            .map_err(|e| StoreError::Storage(format!("version column: {e}")))?;
        Ok(version as u64)
    }

    fn encode(value: &serde_json::Value) -> Result<String, StoreError> {
        serde_json::to_string(value)
            .map_err(|e| StoreError::Storage(format!("Value serialization: {e}")))
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Versioned>, StoreError> {
        let row = sqlx::query("SELECT version, value FROM entries WHERE collection = ?1 AND key = ?2")
            .bind(collection.name())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row
            .try_get("value")
            .map_err(|e| StoreError::Storage(format!("value column: {e}")))?;
        let value = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Storage(format!("Corrupted value for {collection}/{key}: {e}")))?;

        Ok(Some(Versioned {
            value,
            version: Self::version_of(&row)?,
        }))
    }

    async fn set(
        &self,
        collection: Collection,
        key: &str,
        value: serde_json::Value,
    ) -> Result<u64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO entries (collection, key, version, value, updated_at)
            VALUES (?1, ?2, 1, ?3, ?4)
            ON CONFLICT(collection, key) DO UPDATE SET
                version = entries.version + 1,
                value = excluded.value,
                updated_at = excluded.updated_at
            RETURNING version
            "#,
        )
        .bind(collection.name())
        .bind(key)
        .bind(Self::encode(&value)?)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT failed: {e}")))?;

        Self::version_of(&row)
    }

    async fn compare_and_set(
        &self,
        collection: Collection,
        key: &str,
        expected_version: u64,
        value: serde_json::Value,
    ) -> Result<u64, StoreError> {
        let encoded = Self::encode(&value)?;
        let now = Utc::now().to_rfc3339();

        let result = if expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO entries (collection, key, version, value, updated_at)
                VALUES (?1, ?2, 1, ?3, ?4)
                ON CONFLICT(collection, key) DO NOTHING
                "#,
            )
            .bind(collection.name())
            .bind(key)
            .bind(&encoded)
            .bind(&now)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE entries
                SET version = version + 1, value = ?3, updated_at = ?4
                WHERE collection = ?1 AND key = ?2 AND version = ?5
                "#,
            )
            .bind(collection.name())
            .bind(key)
            .bind(&encoded)
            .bind(&now)
            .bind(expected_version as i64)
            .execute(&self.pool)
            .await
        };
        let result =
            result.map_err(|e| StoreError::Storage(format!("Conditional write failed: {e}")))?;

        if result.rows_affected() == 1 {
            return Ok(expected_version + 1);
        }

        let actual = self.current_version(collection, key).await?;
        Err(version_conflict(collection, key, expected_version, actual))
    }
}
