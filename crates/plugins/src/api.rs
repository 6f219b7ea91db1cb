//! The capability surface handed to a plugin when it is loaded.
//!
//! Everything a plugin can touch goes through here: a storage view confined
//! to its own key prefix, an event handle whose subscriptions are tracked so
//! they can be dropped on unload, its own config slice, a tagged logger, and
//! only the registration hook matching its kind.

use std::sync::{Arc, Mutex};

use {
    hive_events::{Event, EventBus, EventHandler, EventKind, SubscriptionId},
    hive_storage::Store,
    serde_json::Value,
};

use crate::{
    error::Result,
    manifest::{PluginKind, PluginManifest},
    provider::{ChannelProvider, ModelProvider, Registrar, ToolProvider},
};

// ── Storage ─────────────────────────────────────────────────────────────────

/// Key/value access scoped to `plugin:<name>:`.
#[derive(Clone)]
pub struct PluginStorage {
    prefix: String,
    store: Arc<dyn Store>,
}

impl PluginStorage {
    pub(crate) fn new(plugin: &str, store: Arc<dyn Store>) -> Self {
        Self {
            prefix: storage_prefix(plugin),
            store,
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.store.get(&self.key(key)).await?)
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        Ok(self.store.set(&self.key(key), value).await?)
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.store.delete(&self.key(key)).await?)
    }

    /// Keys (without the namespace prefix) starting with `prefix`.
    pub async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = self.store.scan_prefix(&self.key(prefix)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(k, _)| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }
}

/// Storage namespace prefix for a plugin.
pub fn storage_prefix(plugin: &str) -> String {
    format!("plugin:{plugin}:")
}

// ── Events ──────────────────────────────────────────────────────────────────

/// Event bus handle that remembers what the plugin subscribed to.
#[derive(Clone)]
pub struct PluginEvents {
    bus: Arc<EventBus>,
    subscriptions: Arc<Mutex<Vec<(EventKind, SubscriptionId)>>>,
}

impl PluginEvents {
    pub(crate) fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = self.bus.subscribe(kind, handler);
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((kind, id));
        id
    }

    /// Subscribe by plain event name, e.g. `"message:received"`.
    pub fn subscribe_named(
        &self,
        name: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId> {
        let kind: EventKind = name.parse()?;
        Ok(self.subscribe(kind, handler))
    }

    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) {
        self.bus.unsubscribe(kind, id);
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(k, i)| !(*k == kind && *i == id));
    }

    pub async fn publish(&self, event: Event) {
        self.bus.publish(event).await;
    }

    /// Remove every subscription made through this handle.
    pub(crate) fn clear(&self) -> usize {
        let drained: Vec<_> = self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for (kind, id) in &drained {
            self.bus.unsubscribe(*kind, *id);
        }
        drained.len()
    }
}

// ── Logger ──────────────────────────────────────────────────────────────────

/// Logger that stamps every record with the plugin name.
#[derive(Clone)]
pub struct PluginLogger {
    plugin: Arc<str>,
}

impl PluginLogger {
    pub(crate) fn new(plugin: &str) -> Self {
        Self {
            plugin: Arc::from(plugin),
        }
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(plugin = %self.plugin, "{message}");
    }

    pub fn info(&self, message: &str) {
        tracing::info!(plugin = %self.plugin, "{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(plugin = %self.plugin, "{message}");
    }

    pub fn error(&self, message: &str) {
        tracing::error!(plugin = %self.plugin, "{message}");
    }
}

// ── PluginApi ───────────────────────────────────────────────────────────────

/// Everything a plugin receives in [`crate::Plugin::register`].
pub struct PluginApi {
    name: String,
    storage: PluginStorage,
    events: PluginEvents,
    config: Value,
    logger: PluginLogger,
    channels: Option<Registrar<dyn ChannelProvider>>,
    models: Option<Registrar<dyn ModelProvider>>,
    tools: Option<Registrar<dyn ToolProvider>>,
}

/// Shared pieces the loader passes in when building a [`PluginApi`].
pub(crate) struct ApiParts<'a> {
    pub store: Arc<dyn Store>,
    pub bus: Arc<EventBus>,
    pub config: Value,
    pub registries: &'a crate::loader::Registries,
}

impl PluginApi {
    pub(crate) fn new(manifest: &PluginManifest, parts: ApiParts<'_>) -> Self {
        let name = manifest.name.as_str();
        let regs = parts.registries;
        Self {
            name: name.to_string(),
            storage: PluginStorage::new(name, parts.store),
            events: PluginEvents::new(parts.bus),
            config: parts.config,
            logger: PluginLogger::new(name),
            channels: (manifest.kind == PluginKind::Channel)
                .then(|| Registrar::new(name, Arc::clone(&regs.channels))),
            models: (manifest.kind == PluginKind::Model)
                .then(|| Registrar::new(name, Arc::clone(&regs.models))),
            tools: (manifest.kind == PluginKind::Tool)
                .then(|| Registrar::new(name, Arc::clone(&regs.tools))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &PluginStorage {
        &self.storage
    }

    pub fn events(&self) -> &PluginEvents {
        &self.events
    }

    /// This plugin's `[plugins.config.<name>]` section, or `Null`.
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    /// Present only for `channel` plugins.
    pub fn channels(&self) -> Option<&Registrar<dyn ChannelProvider>> {
        self.channels.as_ref()
    }

    /// Present only for `model` plugins.
    pub fn models(&self) -> Option<&Registrar<dyn ModelProvider>> {
        self.models.as_ref()
    }

    /// Present only for `tool` plugins.
    pub fn tools(&self) -> Option<&Registrar<dyn ToolProvider>> {
        self.tools.as_ref()
    }
}
