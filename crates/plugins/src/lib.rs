//! Plugin system: manifests, installation, capability-scoped loading.
//!
//! Installed plugins are tracked in `installed-plugins.json`. Loading goes
//! through a [`PluginCatalog`] of plugins linked into the binary; each loaded
//! plugin receives a [`PluginApi`] that confines what it can reach.

pub mod api;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod plugin;
pub mod provider;
pub mod record;
pub mod source;

pub use {
    api::{PluginApi, PluginEvents, PluginLogger, PluginStorage},
    error::{Error, Result},
    loader::{LoadReport, PluginLoader},
    manifest::{MANIFEST_FILE, Permissions, PluginKind, PluginManifest},
    plugin::{Plugin, PluginCatalog, PluginFactory},
    provider::{ChannelProvider, ModelProvider, Provider, Registrar, ToolProvider},
    record::InstalledPlugin,
    source::PluginSource,
};
