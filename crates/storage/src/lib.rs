//! Key/value storage shared by every gateway component.
//!
//! Values are JSON documents addressed by string keys. Collections are
//! modelled as key prefixes (`scheduler:job:`, `plugin:<name>:`) and queried
//! with [`Store::scan_prefix`].

pub mod error;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;

pub use {
    error::{Error, Result},
    store::{Store, StoreOp},
    store_memory::MemoryStore,
    store_sqlite::SqliteStore,
};

/// Run database migrations for the key/value table.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
