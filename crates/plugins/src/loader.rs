//! Plugin loader: install, load, unload, and uninstall.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::{Arc, Mutex, RwLock},
};

use {
    hive_common::now_ms,
    hive_events::{Event, EventBus},
    hive_storage::Store,
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::{
    api::{ApiParts, PluginApi, PluginEvents, storage_prefix},
    error::{Error, Result},
    manifest::PluginManifest,
    plugin::{Plugin, PluginCatalog},
    provider::{
        ChannelProvider, ChannelRegistry, ModelProvider, ModelRegistry, ToolProvider, ToolRegistry,
    },
    record::{InstalledPlugin, RecordStore},
    source::PluginSource,
};

/// Default base for raw repository files.
pub const DEFAULT_RAW_BASE_URL: &str = "https://raw.githubusercontent.com";

/// Channel, model, and tool providers registered by loaded plugins.
pub struct Registries {
    pub(crate) channels: Arc<ChannelRegistry>,
    pub(crate) models: Arc<ModelRegistry>,
    pub(crate) tools: Arc<ToolRegistry>,
}

impl Registries {
    fn new() -> Self {
        Self {
            channels: Arc::new(ChannelRegistry::new("channel")),
            models: Arc::new(ModelRegistry::new("model")),
            tools: Arc::new(ToolRegistry::new("tool")),
        }
    }

    fn remove_owned_by(&self, plugin: &str) -> usize {
        self.channels.remove_owned_by(plugin)
            + self.models.remove_owned_by(plugin)
            + self.tools.remove_owned_by(plugin)
    }
}

/// A name claimed by an in-flight load. Released on drop.
struct LoadSlot<'a> {
    loading: &'a Mutex<BTreeSet<String>>,
    name: String,
}

impl Drop for LoadSlot<'_> {
    fn drop(&mut self) {
        self.loading
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.name);
    }
}

struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    manifest: PluginManifest,
    events: PluginEvents,
}

/// Outcome of [`PluginLoader::load_all`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    /// `(plugin name, error message)`
    pub failed: Vec<(String, String)>,
}

/// Owns the installed-plugin records, the loaded plugin set, and the
/// provider registries.
pub struct PluginLoader {
    records: RecordStore,
    catalog: PluginCatalog,
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    plugin_config: BTreeMap<String, Value>,
    raw_base_url: String,
    core_version: String,
    http: reqwest::Client,
    loaded: RwLock<BTreeMap<String, LoadedPlugin>>,
    loading: Mutex<BTreeSet<String>>,
    registries: Registries,
}

impl PluginLoader {
    pub fn new(records_path: impl Into<PathBuf>, store: Arc<dyn Store>, bus: Arc<EventBus>) -> Self {
        Self {
            records: RecordStore::new(records_path),
            catalog: PluginCatalog::new(),
            store,
            bus,
            plugin_config: BTreeMap::new(),
            raw_base_url: DEFAULT_RAW_BASE_URL.to_string(),
            core_version: env!("CARGO_PKG_VERSION").to_string(),
            http: reqwest::Client::new(),
            loaded: RwLock::new(BTreeMap::new()),
            loading: Mutex::new(BTreeSet::new()),
            registries: Registries::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Per-plugin config slices, keyed by plugin name.
    pub fn with_plugin_config(mut self, config: BTreeMap<String, Value>) -> Self {
        self.plugin_config = config;
        self
    }

    pub fn with_raw_base_url(mut self, url: impl Into<String>) -> Self {
        self.raw_base_url = url.into();
        self
    }

    pub fn with_core_version(mut self, version: impl Into<String>) -> Self {
        self.core_version = version.into();
        self
    }

    // ── Install / uninstall ─────────────────────────────────────────────────

    /// Resolve `source`, validate its manifest, and record it as installed.
    ///
    /// Re-installing a name overwrites the previous record.
    pub async fn install(&self, source: &str) -> Result<InstalledPlugin> {
        let manifest = match PluginSource::parse(source)? {
            PluginSource::Local(path) => {
                let manifest_path = PluginSource::local_manifest_path(&path);
                let raw = tokio::fs::read_to_string(&manifest_path)
                    .await
                    .map_err(|e| Error::manifest_fetch(manifest_path.display().to_string(), e))?;
                PluginManifest::from_json(&raw)?
            },
            remote => {
                let url = remote
                    .raw_manifest_url(&self.raw_base_url)
                    .ok_or_else(|| Error::invalid_source(source, "not a remote source"))?;
                self.fetch_manifest(&url).await?
            },
        };

        let record = InstalledPlugin {
            source: source.to_string(),
            manifest,
            installed_at_ms: now_ms(),
        };
        let replaced = self.records.update(|records| {
            records
                .insert(record.name().to_string(), record.clone())
                .is_some()
        })?;

        info!(
            plugin = %record.name(),
            version = %record.manifest.version,
            %source,
            replaced,
            "plugin installed"
        );
        Ok(record)
    }

    async fn fetch_manifest(&self, url: &str) -> Result<PluginManifest> {
        debug!(%url, "fetching plugin manifest");
        let resp = self
            .http
            .get(url)
            .header("User-Agent", "hive-plugins")
            .send()
            .await
            .map_err(|e| Error::manifest_fetch(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::manifest_fetch(url, format!("HTTP {status}")));
        }
        let body = resp.text().await.map_err(|e| Error::manifest_fetch(url, e))?;
        PluginManifest::from_json(&body)
    }

    /// Unload (if loaded), drop the installed record, and purge the
    /// plugin's storage namespace.
    pub async fn uninstall(&self, name: &str) -> Result<()> {
        let installed = self.records.load()?.contains_key(name);
        let was_loaded = self.is_loaded(name);
        if !installed && !was_loaded {
            return Err(Error::not_found(name));
        }

        if was_loaded {
            self.unload(name).await?;
        }
        if installed {
            self.records.update(|records| records.remove(name))?;
        }
        let purged = self.store.delete_prefix(&storage_prefix(name)).await?;

        info!(plugin = %name, purged_keys = purged, "plugin uninstalled");
        Ok(())
    }

    /// All installed records, sorted by name.
    pub fn installed(&self) -> Result<Vec<InstalledPlugin>> {
        Ok(self.records.load()?.into_values().collect())
    }

    // ── Load / unload ───────────────────────────────────────────────────────

    /// Load an installed record through the plugin catalog.
    pub async fn load(&self, record: &InstalledPlugin) -> Result<()> {
        let name = record.name();
        let plugin = self
            .catalog
            .create(name)
            .ok_or_else(|| Error::load(name, "no plugin with this name is linked into this build"))?;
        let linked = &plugin.manifest().name;
        if linked != name {
            return Err(Error::load(
                name,
                format!("linked plugin declares a different name '{linked}'"),
            ));
        }
        self.load_plugin(plugin).await
    }

    /// Load a plugin instance directly.
    pub async fn load_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let manifest = plugin.manifest().clone();
        let name = manifest.name.clone();

        manifest.validate().map_err(|e| Error::load(&name, e))?;
        if !manifest.is_compatible_with(&self.core_version) {
            return Err(Error::load(
                &name,
                format!(
                    "requires core >= {}, running {}",
                    manifest.min_core_version, self.core_version
                ),
            ));
        }
        let _slot = self.reserve(&name)?;

        let api = PluginApi::new(&manifest, ApiParts {
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            config: self.plugin_config.get(&name).cloned().unwrap_or(Value::Null),
            registries: &self.registries,
        });

        if let Err(e) = plugin.register(&api).await {
            self.discard(&name, api.events());
            return Err(Error::load(&name, format!("register failed: {e:#}")));
        }

        self.loaded
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.clone(), LoadedPlugin {
                plugin,
                manifest: manifest.clone(),
                events: api.events().clone(),
            });

        info!(plugin = %name, version = %manifest.version, kind = %manifest.kind, "plugin loaded");
        self.bus
            .publish(Event::PluginLoaded {
                name,
                version: manifest.version,
            })
            .await;
        Ok(())
    }

    /// Load every installed record. Failures are reported as `plugin:error`
    /// events and collected in the report instead of aborting the batch.
    pub async fn load_all(&self) -> Result<LoadReport> {
        let records = self.records.load()?;
        let mut report = LoadReport::default();

        for (name, record) in records {
            if self.is_loaded(&name) {
                continue;
            }
            match self.load(&record).await {
                Ok(()) => report.loaded.push(name),
                Err(e) => {
                    let error = e.to_string();
                    warn!(plugin = %name, %error, "plugin failed to load");
                    self.bus
                        .publish(Event::PluginError {
                            name: name.clone(),
                            error: error.clone(),
                        })
                        .await;
                    report.failed.push((name, error));
                },
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "plugins loaded"
        );
        Ok(report)
    }

    /// Run the plugin's unload hook and drop its providers and subscriptions.
    /// The installed record is kept.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let entry = self
            .loaded
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .ok_or_else(|| Error::not_found(name))?;

        if let Err(e) = entry.plugin.unload().await {
            warn!(plugin = %name, error = %format!("{e:#}"), "plugin unload hook failed");
        }
        let subscriptions = entry.events.clear();
        let providers = self.registries.remove_owned_by(name);
        info!(
            plugin = %name,
            version = %entry.manifest.version,
            subscriptions,
            providers,
            "plugin unloaded"
        );

        self.bus
            .publish(Event::PluginUnloaded {
                name: name.to_string(),
            })
            .await;
        Ok(())
    }

    /// Unload every loaded plugin.
    pub async fn unload_all(&self) {
        for name in self.loaded_names() {
            if let Err(e) = self.unload(&name).await {
                debug!(plugin = %name, error = %e, "plugin already unloaded");
            }
        }
    }

    /// Claim `name` for one load attempt. Providers are owned by plugin name,
    /// so a second concurrent load must never reach `register`.
    fn reserve(&self, name: &str) -> Result<LoadSlot<'_>> {
        let loaded = self.loaded.read().unwrap_or_else(|e| e.into_inner());
        let mut loading = self.loading.lock().unwrap_or_else(|e| e.into_inner());
        if loaded.contains_key(name) || !loading.insert(name.to_string()) {
            return Err(Error::load(name, "already loaded"));
        }
        Ok(LoadSlot {
            loading: &self.loading,
            name: name.to_string(),
        })
    }

    fn discard(&self, name: &str, events: &PluginEvents) {
        events.clear();
        self.registries.remove_owned_by(name);
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn loaded_names(&self) -> Vec<String> {
        self.loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    pub fn channel(&self, name: &str) -> Option<Arc<dyn ChannelProvider>> {
        self.registries.channels.get(name)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.registries.channels.names()
    }

    pub fn model(&self, name: &str) -> Option<Arc<dyn ModelProvider>> {
        self.registries.models.get(name)
    }

    pub fn model_names(&self) -> Vec<String> {
        self.registries.models.names()
    }

    pub fn tool(&self, name: &str) -> Option<Arc<dyn ToolProvider>> {
        self.registries.tools.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registries.tools.names()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use {
        super::*,
        crate::{
            api::PluginStorage,
            manifest::{Permissions, PluginKind},
            provider::Provider,
        },
        async_trait::async_trait,
        hive_common::ErrorCode,
        hive_events::EventKind,
        hive_storage::MemoryStore,
        serde_json::json,
    };

    type OnRegister = Box<dyn Fn(&PluginApi) -> anyhow::Result<()> + Send + Sync>;

    struct TestPlugin {
        manifest: PluginManifest,
        on_register: OnRegister,
        unloaded: Arc<AtomicBool>,
    }

    impl TestPlugin {
        fn new(name: &str, kind: PluginKind) -> Self {
            Self {
                manifest: manifest(name, kind),
                on_register: Box::new(|_| Ok(())),
                unloaded: Arc::new(AtomicBool::new(false)),
            }
        }

        fn on_register(
            mut self,
            f: impl Fn(&PluginApi) -> anyhow::Result<()> + Send + Sync + 'static,
        ) -> Self {
            self.on_register = Box::new(f);
            self
        }
    }

    #[async_trait]
    impl Plugin for TestPlugin {
        fn manifest(&self) -> &PluginManifest {
            &self.manifest
        }

        async fn register(&self, api: &PluginApi) -> anyhow::Result<()> {
            (self.on_register)(api)
        }

        async fn unload(&self) -> anyhow::Result<()> {
            self.unloaded.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Named(&'static str);

    impl Provider for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[async_trait]
    impl ToolProvider for Named {
        async fn invoke(&self, input: Value) -> anyhow::Result<Value> {
            Ok(input)
        }
    }

    #[async_trait]
    impl ChannelProvider for Named {
        async fn send(&self, _recipient: &str, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn manifest(name: &str, kind: PluginKind) -> PluginManifest {
        PluginManifest {
            name: name.into(),
            version: "1.0.0".into(),
            description: format!("{name} plugin"),
            author: "tests".into(),
            repository: format!("https://github.com/hive-org/{name}"),
            kind,
            permissions: Permissions::default(),
            min_core_version: "0.1.0".into(),
        }
    }

    fn manifest_json(name: &str, kind: &str) -> String {
        json!({
            "name": name,
            "version": "1.0.0",
            "description": "test",
            "author": "tests",
            "repository": "https://github.com/hive-org/test",
            "kind": kind,
            "permissions": {},
            "minCoreVersion": "0.1.0"
        })
        .to_string()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        dir: PathBuf,
        store: Arc<MemoryStore>,
        bus: Arc<EventBus>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                dir: dir.path().to_path_buf(),
                _dir: dir,
                store: Arc::new(MemoryStore::new()),
                bus: Arc::new(EventBus::new()),
            }
        }

        fn loader(&self) -> PluginLoader {
            PluginLoader::new(
                self.dir.join("installed-plugins.json"),
                Arc::clone(&self.store) as Arc<dyn Store>,
                Arc::clone(&self.bus),
            )
        }

        fn count(&self, kind: EventKind) -> Arc<AtomicUsize> {
            let count = Arc::new(AtomicUsize::new(0));
            let c = Arc::clone(&count);
            self.bus.subscribe_fn(kind, "counter", move |_| {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            });
            count
        }
    }

    // ── Install ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn install_from_local_path_keys_by_manifest_name() {
        let fx = Fixture::new();
        let plugin_dir = fx.dir.join("some-dir");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(
            plugin_dir.join("plugin.json"),
            manifest_json("echo", "tool"),
        )
        .unwrap();

        let source = plugin_dir.display().to_string();
        let loader = fx.loader();
        let record = loader.install(&source).await.unwrap();
        assert_eq!(record.name(), "echo");
        assert_eq!(record.source, source);

        let installed = loader.installed().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].source, source);
        assert_eq!(installed[0].manifest.kind, PluginKind::Tool);
    }

    #[tokio::test]
    async fn reinstall_overwrites_record() {
        let fx = Fixture::new();
        let a = fx.dir.join("a");
        let b = fx.dir.join("b");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();
        std::fs::write(a.join("plugin.json"), manifest_json("echo", "tool")).unwrap();
        std::fs::write(b.join("plugin.json"), manifest_json("echo", "custom")).unwrap();

        let loader = fx.loader();
        loader.install(&a.display().to_string()).await.unwrap();
        loader.install(&b.display().to_string()).await.unwrap();

        let installed = loader.installed().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].manifest.kind, PluginKind::Custom);
    }

    #[tokio::test]
    async fn install_rejects_invalid_manifest() {
        let fx = Fixture::new();
        std::fs::write(fx.dir.join("plugin.json"), r#"{"name":"x"}"#).unwrap();

        let err = fx
            .loader()
            .install(&fx.dir.display().to_string())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PLUGIN_MANIFEST_INVALID");
    }

    #[tokio::test]
    async fn install_from_remote_repository() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/hive-org/weather/v1.2.0/plugin.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(manifest_json("weather", "tool"))
            .create_async()
            .await;

        let fx = Fixture::new();
        let loader = fx.loader().with_raw_base_url(server.url());
        let record = loader
            .install("github:hive-org/weather#v1.2.0")
            .await
            .unwrap();

        assert_eq!(record.name(), "weather");
        assert_eq!(record.source, "github:hive-org/weather#v1.2.0");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn remote_fetch_failure_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/hive-org/missing/main/plugin.json")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let fx = Fixture::new();
        let loader = fx.loader().with_raw_base_url(server.url());
        let err = loader.install("hive-org/missing").await.unwrap_err();
        assert_eq!(err.code(), "PLUGIN_MANIFEST_FETCH");
        assert!(err.to_string().contains("404"));
        assert!(loader.installed().unwrap().is_empty());
    }

    // ── Capability surface ──────────────────────────────────────────────────

    #[tokio::test]
    async fn registration_hooks_follow_plugin_kind() {
        let fx = Fixture::new();
        let loader = fx.loader();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for (name, kind) in [("chat", PluginKind::Channel), ("llm", PluginKind::Model)] {
            let seen = Arc::clone(&seen);
            let plugin = TestPlugin::new(name, kind).on_register(move |api| {
                seen.lock().unwrap().push((
                    api.name().to_string(),
                    api.channels().is_some(),
                    api.models().is_some(),
                    api.tools().is_some(),
                ));
                Ok(())
            });
            loader.load_plugin(Arc::new(plugin)).await.unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], ("chat".into(), true, false, false));
        assert_eq!(seen[1], ("llm".into(), false, true, false));
    }

    #[tokio::test]
    async fn plugin_storage_is_namespaced() {
        let fx = Fixture::new();
        let loader = fx.loader();
        let slots: Arc<Mutex<Vec<PluginStorage>>> = Arc::new(Mutex::new(Vec::new()));

        for name in ["alpha", "beta"] {
            let slots = Arc::clone(&slots);
            let plugin = TestPlugin::new(name, PluginKind::Custom).on_register(move |api| {
                slots.lock().unwrap().push(api.storage().clone());
                Ok(())
            });
            loader.load_plugin(Arc::new(plugin)).await.unwrap();
        }

        let (alpha, beta) = {
            let slots = slots.lock().unwrap();
            (slots[0].clone(), slots[1].clone())
        };
        alpha.set("x", json!("secret")).await.unwrap();
        assert_eq!(beta.get("x").await.unwrap(), None);
        assert_eq!(alpha.get("x").await.unwrap(), Some(json!("secret")));
        assert_eq!(alpha.keys("").await.unwrap(), vec!["x"]);
        assert_eq!(
            fx.store.get("plugin:alpha:x").await.unwrap(),
            Some(json!("secret"))
        );
    }

    #[tokio::test]
    async fn config_slice_is_per_plugin() {
        let fx = Fixture::new();
        let loader = fx.loader().with_plugin_config(BTreeMap::from([(
            "chat".to_string(),
            json!({ "token": "t-1" }),
        )]));
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["chat", "other"] {
            let seen = Arc::clone(&seen);
            let plugin = TestPlugin::new(name, PluginKind::Custom).on_register(move |api| {
                seen.lock().unwrap().push(api.config().clone());
                Ok(())
            });
            loader.load_plugin(Arc::new(plugin)).await.unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], json!({ "token": "t-1" }));
        assert_eq!(seen[1], Value::Null);
    }

    #[tokio::test]
    async fn provider_names_cannot_collide() {
        let fx = Fixture::new();
        let loader = fx.loader();

        let first = TestPlugin::new("first", PluginKind::Tool).on_register(|api| {
            api.tools().unwrap().register(Arc::new(Named("search")))?;
            Ok(())
        });
        let second = TestPlugin::new("second", PluginKind::Tool).on_register(|api| {
            api.tools().unwrap().register(Arc::new(Named("search")))?;
            Ok(())
        });

        loader.load_plugin(Arc::new(first)).await.unwrap();
        let err = loader.load_plugin(Arc::new(second)).await.unwrap_err();
        assert_eq!(err.code(), "PLUGIN_LOAD");
        assert!(err.to_string().contains("already registered"));
        assert_eq!(loader.tool_names(), vec!["search"]);
        assert_eq!(loader.loaded_names(), vec!["first"]);
    }

    #[tokio::test]
    async fn failed_register_rolls_back() {
        let fx = Fixture::new();
        let loader = fx.loader();

        let plugin = TestPlugin::new("flaky", PluginKind::Channel).on_register(|api| {
            api.channels().unwrap().register(Arc::new(Named("irc")))?;
            api.events()
                .subscribe_named("message:received", Arc::new(NoopHandler))?;
            anyhow::bail!("token missing")
        });

        let err = loader.load_plugin(Arc::new(plugin)).await.unwrap_err();
        assert!(err.to_string().contains("token missing"));
        assert!(loader.channel("irc").is_none());
        assert!(!loader.is_loaded("flaky"));
        assert_eq!(fx.bus.listener_count(EventKind::MessageReceived), 0);
    }

    struct NoopHandler;

    #[async_trait]
    impl hive_events::EventHandler for NoopHandler {
        async fn handle(&self, _event: &Event) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn incompatible_core_version_is_rejected() {
        let fx = Fixture::new();
        let loader = fx.loader().with_core_version("0.0.9");
        let err = loader
            .load_plugin(Arc::new(TestPlugin::new("new", PluginKind::Tool)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PLUGIN_LOAD");
        assert!(err.to_string().contains("requires core >= 0.1.0"));
    }

    #[tokio::test]
    async fn loading_twice_fails() {
        let fx = Fixture::new();
        let loader = fx.loader();
        loader
            .load_plugin(Arc::new(TestPlugin::new("once", PluginKind::Ui)))
            .await
            .unwrap();
        let err = loader
            .load_plugin(Arc::new(TestPlugin::new("once", PluginKind::Ui)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already loaded"));
    }

    struct GatedPlugin {
        manifest: PluginManifest,
        registered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    impl GatedPlugin {
        fn new(registered: &Arc<tokio::sync::Notify>, release: &Arc<tokio::sync::Notify>) -> Self {
            Self {
                manifest: manifest("gated", PluginKind::Tool),
                registered: Arc::clone(registered),
                release: Arc::clone(release),
            }
        }
    }

    #[async_trait]
    impl Plugin for GatedPlugin {
        fn manifest(&self) -> &PluginManifest {
            &self.manifest
        }

        async fn register(&self, api: &PluginApi) -> anyhow::Result<()> {
            api.tools().unwrap().register(Arc::new(Named("lookup")))?;
            self.registered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_load_keeps_first_providers() {
        let fx = Fixture::new();
        let loader = fx.loader();
        let registered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let first = GatedPlugin::new(&registered, &release);
        let second = GatedPlugin::new(
            &Arc::new(tokio::sync::Notify::new()),
            &Arc::new(tokio::sync::Notify::new()),
        );

        let (a, b) = tokio::join!(loader.load_plugin(Arc::new(first)), async {
            registered.notified().await;
            let result = loader.load_plugin(Arc::new(second)).await;
            release.notify_one();
            result
        });

        a.unwrap();
        assert!(b.unwrap_err().to_string().contains("already loaded"));
        assert!(loader.tool("lookup").is_some());
        assert_eq!(loader.loaded_names(), vec!["gated"]);
    }

    #[tokio::test]
    async fn failed_load_releases_the_name() {
        let fx = Fixture::new();
        let loader = fx.loader();
        let flaky = TestPlugin::new("retry", PluginKind::Custom)
            .on_register(|_| Err(anyhow::anyhow!("not yet")));
        loader.load_plugin(Arc::new(flaky)).await.unwrap_err();

        loader
            .load_plugin(Arc::new(TestPlugin::new("retry", PluginKind::Custom)))
            .await
            .unwrap();
        assert!(loader.is_loaded("retry"));
    }

    // ── Bulk load ───────────────────────────────────────────────────────────

    fn install_record(loader: &PluginLoader, name: &str, kind: PluginKind) {
        loader
            .records
            .update(|r| {
                r.insert(name.to_string(), InstalledPlugin {
                    source: format!("./{name}"),
                    manifest: manifest(name, kind),
                    installed_at_ms: 1,
                })
            })
            .unwrap();
    }

    #[tokio::test]
    async fn load_all_isolates_failures() {
        let fx = Fixture::new();
        let loaded_events = fx.count(EventKind::PluginLoaded);
        let error_events = fx.count(EventKind::PluginError);

        let mut catalog = PluginCatalog::new();
        catalog.register("good", || -> Arc<dyn Plugin> {
            Arc::new(TestPlugin::new("good", PluginKind::Tool))
        });
        catalog.register("also-good", || -> Arc<dyn Plugin> {
            Arc::new(TestPlugin::new("also-good", PluginKind::Custom))
        });
        let loader = fx.loader().with_catalog(catalog);

        install_record(&loader, "good", PluginKind::Tool);
        install_record(&loader, "missing", PluginKind::Tool);
        install_record(&loader, "also-good", PluginKind::Custom);

        let report = loader.load_all().await.unwrap();
        assert_eq!(report.loaded, vec!["also-good", "good"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "missing");
        assert!(report.failed[0].1.contains("failed to load plugin 'missing'"));

        assert_eq!(loaded_events.load(Ordering::SeqCst), 2);
        assert_eq!(error_events.load(Ordering::SeqCst), 1);
        assert_eq!(loader.loaded_names(), vec!["also-good", "good"]);
    }

    #[tokio::test]
    async fn catalog_name_mismatch_is_a_load_error() {
        let fx = Fixture::new();
        let mut catalog = PluginCatalog::new();
        catalog.register("alias", || -> Arc<dyn Plugin> {
            Arc::new(TestPlugin::new("real", PluginKind::Tool))
        });
        let loader = fx.loader().with_catalog(catalog);
        install_record(&loader, "alias", PluginKind::Tool);

        let record = loader.installed().unwrap().remove(0);
        let err = loader.load(&record).await.unwrap_err();
        assert!(err.to_string().contains("different name 'real'"));
    }

    // ── Unload / uninstall ──────────────────────────────────────────────────

    #[tokio::test]
    async fn uninstall_cleans_everything() {
        let fx = Fixture::new();
        let unloaded_events = fx.count(EventKind::PluginUnloaded);

        let plugin = TestPlugin::new("notes", PluginKind::Tool).on_register(|api| {
            api.tools().unwrap().register(Arc::new(Named("notes")))?;
            api.events()
                .subscribe(EventKind::TaskCreated, Arc::new(NoopHandler));
            Ok(())
        });
        let unloaded = Arc::clone(&plugin.unloaded);
        let plugin: Arc<dyn Plugin> = Arc::new(plugin);

        let mut catalog = PluginCatalog::new();
        catalog.register("notes", move || Arc::clone(&plugin));
        let loader = fx.loader().with_catalog(catalog);
        install_record(&loader, "notes", PluginKind::Tool);
        loader.load_all().await.unwrap();

        fx.store
            .set("plugin:notes:draft", json!("hello"))
            .await
            .unwrap();
        fx.store.set("plugin:notesy:keep", json!(1)).await.unwrap();
        assert_eq!(fx.bus.listener_count(EventKind::TaskCreated), 1);

        loader.uninstall("notes").await.unwrap();

        assert!(unloaded.load(Ordering::SeqCst));
        assert!(!loader.is_loaded("notes"));
        assert!(loader.tool("notes").is_none());
        assert_eq!(fx.bus.listener_count(EventKind::TaskCreated), 0);
        assert!(loader.installed().unwrap().is_empty());
        assert_eq!(fx.store.get("plugin:notes:draft").await.unwrap(), None);
        assert_eq!(
            fx.store.get("plugin:notesy:keep").await.unwrap(),
            Some(json!(1))
        );
        assert_eq!(unloaded_events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unload_keeps_record() {
        let fx = Fixture::new();
        let mut catalog = PluginCatalog::new();
        catalog.register("keep", || -> Arc<dyn Plugin> {
            Arc::new(TestPlugin::new("keep", PluginKind::Tool))
        });
        let loader = fx.loader().with_catalog(catalog);
        install_record(&loader, "keep", PluginKind::Tool);
        loader.load_all().await.unwrap();

        loader.unload_all().await;
        assert!(loader.loaded_names().is_empty());
        assert_eq!(loader.installed().unwrap().len(), 1);

        let err = loader.unload("keep").await.unwrap_err();
        assert_eq!(err.code(), "PLUGIN_NOT_FOUND");
    }

    #[tokio::test]
    async fn uninstall_unknown_plugin() {
        let fx = Fixture::new();
        let err = fx.loader().uninstall("ghost").await.unwrap_err();
        assert_eq!(err.code(), "PLUGIN_NOT_FOUND");
    }
}
