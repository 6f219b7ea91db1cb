//! Provider traits and the registries that hold them.
//!
//! Providers are keyed by their own name, not by the plugin that registered
//! them; two plugins may not claim the same provider name.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use {async_trait::async_trait, serde_json::Value};

use crate::error::{Error, Result};

/// Common surface of every provider.
pub trait Provider: Send + Sync {
    /// Registry key, e.g. `"telegram"` or `"openai"`.
    fn name(&self) -> &str;
}

/// A messaging channel (chat bridge, email, ...).
#[async_trait]
pub trait ChannelProvider: Provider {
    async fn send(&self, recipient: &str, text: &str) -> anyhow::Result<()>;
}

/// A language-model backend.
#[async_trait]
pub trait ModelProvider: Provider {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// A callable tool.
#[async_trait]
pub trait ToolProvider: Provider {
    fn description(&self) -> &str {
        ""
    }

    async fn invoke(&self, input: Value) -> anyhow::Result<Value>;
}

struct Entry<P: ?Sized> {
    owner: String,
    provider: Arc<P>,
}

/// Thread-safe provider map owned by the plugin loader.
pub struct ProviderRegistry<P: ?Sized> {
    kind: &'static str,
    entries: RwLock<BTreeMap<String, Entry<P>>>,
}

impl<P: ?Sized + Provider> ProviderRegistry<P> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register `provider` on behalf of plugin `owner`.
    pub fn insert(&self, owner: &str, provider: Arc<P>) -> Result<()> {
        let name = provider.name().to_string();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = entries.get(&name) {
            return Err(Error::ProviderConflict {
                kind: self.kind,
                name,
                owner: existing.owner.clone(),
            });
        }
        entries.insert(
            name,
            Entry {
                owner: owner.to_string(),
                provider,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<P>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(name).map(|e| Arc::clone(&e.provider))
    }

    /// Provider names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.keys().cloned().collect()
    }

    /// Drop every provider registered by `owner`; returns how many were removed.
    pub fn remove_owned_by(&self, owner: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.owner != owner);
        before - entries.len()
    }
}

/// Kind-gated registration hook handed to a plugin through its `PluginApi`.
pub struct Registrar<P: ?Sized> {
    plugin: String,
    registry: Arc<ProviderRegistry<P>>,
}

impl<P: ?Sized + Provider> Registrar<P> {
    pub(crate) fn new(plugin: &str, registry: Arc<ProviderRegistry<P>>) -> Self {
        Self {
            plugin: plugin.to_string(),
            registry,
        }
    }

    pub fn register(&self, provider: Arc<P>) -> Result<()> {
        tracing::debug!(
            plugin = %self.plugin,
            kind = self.registry.kind(),
            provider = provider.name(),
            "provider registered"
        );
        self.registry.insert(&self.plugin, provider)
    }
}

pub type ChannelRegistry = ProviderRegistry<dyn ChannelProvider>;
pub type ModelRegistry = ProviderRegistry<dyn ModelProvider>;
pub type ToolRegistry = ProviderRegistry<dyn ToolProvider>;
