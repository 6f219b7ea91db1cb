//! Storage trait.

use {async_trait::async_trait, serde_json::Value};

use crate::{Error, Result};

/// One step of a [`Store::transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Set { key: String, value: Value },
    Delete { key: String },
}

impl StoreOp {
    pub fn set(key: impl Into<String>, value: Value) -> Self {
        Self::Set {
            key: key.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Atomic get/set/delete/query against a single logical store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;
    /// All entries whose key starts with `prefix`, ordered by key.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Value)>>;
    /// Delete every entry whose key starts with `prefix`; returns the count.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize>;
    /// Apply every op or none of them.
    async fn transaction(&self, ops: Vec<StoreOp>) -> Result<()>;
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_key("key must not be empty"));
    }
    if key.chars().any(char::is_control) {
        return Err(Error::invalid_key(format!(
            "key contains control characters: {key:?}"
        )));
    }
    Ok(())
}
