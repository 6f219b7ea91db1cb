//! The plugin contract and the catalog of plugins compiled into the binary.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;

use crate::{api::PluginApi, manifest::PluginManifest};

/// A loadable plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> &PluginManifest;

    /// Called once per load with the plugin's capability surface.
    async fn register(&self, api: &PluginApi) -> anyhow::Result<()>;

    /// Called before the plugin is dropped from the loaded set.
    async fn unload(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Builds a fresh plugin instance.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Plugins linked into this build, by manifest name.
///
/// An installed record can only be loaded if the catalog knows its name.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: BTreeMap<String, PluginFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn create(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.factories.get(name).map(|f| f())
    }
}
