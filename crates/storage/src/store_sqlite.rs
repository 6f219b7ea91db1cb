//! SQLite-backed store using sqlx.

use std::{path::Path, str::FromStr};

use {
    async_trait::async_trait,
    serde_json::Value,
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    store::{Store, StoreOp, validate_key},
};

/// SQLite-backed persistence: one `kv` table of JSON documents.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// The special path `:memory:` opens a private in-memory database.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = if path.as_os_str() == ":memory:" {
            // A second connection would see a different empty database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
                .await?
        } else {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        crate::run_migrations(&pool).await?;
        info!(path = %path.display(), "storage opened");
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let data: String = row.get("value");
                Ok(Some(serde_json::from_str(&data)?))
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        validate_key(key)?;
        let data = serde_json::to_string(&value)?;
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let result = sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let rows = sqlx::query("SELECT key, value FROM kv WHERE instr(key, ?) = 1 ORDER BY key")
            .bind(prefix)
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("key");
            let data: String = row.get("value");
            entries.push((key, serde_json::from_str(&data)?));
        }
        Ok(entries)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM kv WHERE instr(key, ?) = 1")
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn transaction(&self, ops: Vec<StoreOp>) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::transaction)?;
        for op in ops {
            // Dropping `tx` on an early return rolls everything back.
            validate_key(op.key()).map_err(Error::transaction)?;
            match op {
                StoreOp::Set { key, value } => {
                    let data = serde_json::to_string(&value)?;
                    sqlx::query(
                        "INSERT INTO kv (key, value) VALUES (?, ?)
                         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    )
                    .bind(&key)
                    .bind(&data)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::transaction)?;
                },
                StoreOp::Delete { key } => {
                    sqlx::query("DELETE FROM kv WHERE key = ?")
                        .bind(&key)
                        .execute(&mut *tx)
                        .await
                        .map_err(Error::transaction)?;
                },
            }
        }
        tx.commit().await.map_err(Error::transaction)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        debug!("storage closed");
        Ok(())
    }
}
