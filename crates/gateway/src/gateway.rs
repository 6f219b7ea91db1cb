//! The gateway: composes storage, scheduler, plugins, and the event bus, and
//! answers control commands.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock, Weak},
    time::{Duration, Instant},
};

use {
    chrono_tz::Tz,
    hive_config::HiveConfig,
    hive_cron::{ScheduledJob, Scheduler, parse_timezone},
    hive_events::{Event, EventBus},
    hive_plugins::{PluginCatalog, PluginLoader},
    hive_protocol::{ControlAction, ControlResponse, StatusSnapshot, endpoint},
    hive_storage::{SqliteStore, Store},
    serde_json::json,
    tokio::sync::{Mutex, watch},
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    server,
    state::{GatewayState, Running},
};

/// Delay between acknowledging a `stop` command and starting teardown, so
/// the acknowledgement reaches the caller first.
pub const STOP_DELAY: Duration = Duration::from_millis(100);

pub(crate) struct Inner {
    bus: Arc<EventBus>,
    catalog: PluginCatalog,
    /// Serializes start, stop, and reload.
    lifecycle: Mutex<()>,
    state: watch::Sender<GatewayState>,
    running: RwLock<Option<Running>>,
}

/// Cheap to clone; clones share the same gateway.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    pub fn new() -> Self {
        Self::with_catalog(PluginCatalog::new())
    }

    /// A gateway able to load the plugins in `catalog`.
    pub fn with_catalog(catalog: PluginCatalog) -> Self {
        let (state, _) = watch::channel(GatewayState::Stopped);
        Self {
            inner: Arc::new(Inner {
                bus: Arc::new(EventBus::new()),
                catalog,
                lifecycle: Mutex::new(()),
                state,
                running: RwLock::new(None),
            }),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// The bus lives as long as the gateway, so subscribers may register
    /// before `start`.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn state(&self) -> GatewayState {
        *self.inner.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == GatewayState::Running
    }

    fn set_state(&self, state: GatewayState) {
        debug!(%state, "gateway state changed");
        self.inner.state.send_replace(state);
    }

    fn with_running<T>(&self, f: impl FnOnce(&Running) -> T) -> Option<T> {
        self.inner
            .running
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(f)
    }

    pub fn socket_path(&self) -> Option<PathBuf> {
        self.with_running(|r| r.socket.clone())
    }

    pub fn config(&self) -> Option<HiveConfig> {
        self.with_running(|r| r.config.clone())
    }

    pub fn store(&self) -> Option<Arc<dyn Store>> {
        self.with_running(|r| Arc::clone(&r.store))
    }

    pub fn scheduler(&self) -> Option<Arc<Scheduler>> {
        self.with_running(|r| Arc::clone(&r.scheduler))
    }

    pub fn plugins(&self) -> Option<Arc<PluginLoader>> {
        self.with_running(|r| Arc::clone(&r.plugins))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Bring the gateway up and start answering on `socket_path`.
    ///
    /// Anything opened before a failure is released again.
    pub async fn start(&self, config_path: &Path, socket_path: &Path) -> Result<()> {
        let _guard = self.inner.lifecycle.lock().await;
        if self.state() != GatewayState::Stopped {
            return Err(Error::AlreadyRunning);
        }
        self.set_state(GatewayState::Starting);

        match self.boot(config_path, socket_path).await {
            Ok(running) => {
                let socket = running.socket.clone();
                *self.inner.running.write().unwrap_or_else(|e| e.into_inner()) = Some(running);
                self.set_state(GatewayState::Running);
                info!(socket = %socket.display(), pid = std::process::id(), "gateway started");
                self.inner.bus.publish(Event::GatewayStarted).await;
                Ok(())
            },
            Err(e) => {
                self.set_state(GatewayState::Stopped);
                error!(error = %e, "gateway failed to start");
                Err(e)
            },
        }
    }

    async fn boot(&self, config_path: &Path, socket_path: &Path) -> Result<Running> {
        let config = hive_config::load_config(config_path)?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&config.storage.path).await?);

        let (scheduler, plugins) = match self.start_services(&config, &store).await {
            Ok(services) => services,
            Err(e) => {
                close_store(&store).await;
                return Err(e);
            },
        };

        let prepared = match server::clear_stale_endpoint(socket_path).await {
            Ok(()) => server::bind(socket_path),
            Err(e) => Err(e),
        };
        let listener = match prepared {
            Ok(listener) => listener,
            Err(e) => {
                stop_services(&scheduler, &plugins).await;
                close_store(&store).await;
                return Err(e);
            },
        };

        let cancel = CancellationToken::new();
        let accept_task =
            server::spawn_accept_loop(listener, Arc::downgrade(&self.inner), cancel.clone());

        if let Err(e) = endpoint::write_pid_file(socket_path, std::process::id()) {
            cancel.cancel();
            let _ = accept_task.await;
            endpoint::remove_endpoint_files(socket_path);
            stop_services(&scheduler, &plugins).await;
            close_store(&store).await;
            return Err(e.into());
        }

        Ok(Running {
            config,
            config_path: config_path.to_path_buf(),
            socket: socket_path.to_path_buf(),
            started: Instant::now(),
            store,
            scheduler,
            plugins,
            cancel,
            accept_task,
        })
    }

    async fn start_services(
        &self,
        config: &HiveConfig,
        store: &Arc<dyn Store>,
    ) -> Result<(Arc<Scheduler>, Arc<PluginLoader>)> {
        let tz = match config.scheduler.timezone.as_deref() {
            Some(name) => parse_timezone(name)?,
            None => Tz::UTC,
        };
        let scheduler = Arc::new(
            Scheduler::new(Arc::clone(store), Arc::clone(&self.inner.bus)).with_timezone(tz),
        );
        scheduler.start().await?;

        for job in &config.jobs {
            if let Err(e) = scheduler.add_job(ScheduledJob::from(job)).await {
                scheduler.stop().await;
                return Err(e.into());
            }
        }

        let plugins = Arc::new(
            PluginLoader::new(
                &config.plugins.registry,
                Arc::clone(store),
                Arc::clone(&self.inner.bus),
            )
            .with_catalog(self.inner.catalog.clone())
            .with_plugin_config(config.plugins.config.clone())
            .with_raw_base_url(&config.plugins.raw_base_url),
        );
        match plugins.load_all().await {
            Ok(report) if !report.failed.is_empty() => {
                warn!(failed = report.failed.len(), "some plugins failed to load");
            },
            Ok(_) => {},
            Err(e) => {
                scheduler.stop().await;
                return Err(e.into());
            },
        }

        Ok((scheduler, plugins))
    }

    /// Shut down. A no-op unless running.
    ///
    /// `gateway:stopping` handlers get at most `gateway.shutdownGraceMs`;
    /// ones still running after that are left to finish on their own.
    pub async fn stop(&self) {
        let _guard = self.inner.lifecycle.lock().await;
        if self.state() != GatewayState::Running {
            debug!("stop requested but gateway is not running");
            return;
        }
        self.set_state(GatewayState::Stopping);

        let grace = self
            .with_running(|r| Duration::from_millis(r.config.gateway.shutdown_grace_ms))
            .unwrap_or_default();
        let bus = Arc::clone(&self.inner.bus);
        let stopping = tokio::spawn(async move { bus.publish(Event::GatewayStopping).await });
        if tokio::time::timeout(grace, stopping).await.is_err() {
            warn!(
                grace_ms = grace.as_millis(),
                "shutdown handlers exceeded the grace period"
            );
        }

        let running = self
            .inner
            .running
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(running) = running {
            stop_services(&running.scheduler, &running.plugins).await;
            close_store(&running.store).await;
            running.cancel.cancel();
            if let Err(e) = running.accept_task.await {
                warn!(error = %e, "control accept loop ended abnormally");
            }
            endpoint::remove_endpoint_files(&running.socket);
        }

        self.set_state(GatewayState::Stopped);
        info!("gateway stopped");
    }

    /// Resolves once the gateway is stopped; immediately if it already is.
    pub async fn wait_stopped(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|s| *s == GatewayState::Stopped).await;
    }

    /// Re-read the configuration file given to `start`. On failure the
    /// current configuration stays in place.
    pub async fn reload(&self) -> Result<()> {
        let _guard = self.inner.lifecycle.lock().await;
        let path = self
            .with_running(|r| r.config_path.clone())
            .ok_or(Error::NotRunning)?;

        let config = hive_config::load_config(&path)?;
        if let Some(running) = self
            .inner
            .running
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .as_mut()
        {
            running.config = config;
        }
        info!(path = %path.display(), "configuration reloaded");
        self.inner.bus.publish(Event::GatewayReloaded).await;
        Ok(())
    }

    // ── Control ─────────────────────────────────────────────────────────────

    /// Snapshot of current in-memory state. Never mutates anything.
    pub fn status(&self) -> StatusSnapshot {
        let running = self.is_running();
        let (uptime_ms, config) = self
            .with_running(|r| {
                let uptime = u64::try_from(r.started.elapsed().as_millis()).unwrap_or(u64::MAX);
                (uptime, serde_json::to_value(&r.config).ok())
            })
            .filter(|_| running)
            .unwrap_or((0, None));
        let plugins = self
            .with_running(|r| r.plugins.loaded_names())
            .unwrap_or_default();

        StatusSnapshot {
            running,
            pid: std::process::id(),
            uptime_ms,
            config,
            plugins,
        }
    }

    /// Dispatch one control command by name.
    pub async fn handle_command(&self, action: &str) -> ControlResponse {
        let Some(action) = ControlAction::parse(action) else {
            return ControlResponse::unknown_action(action);
        };
        debug!(%action, "control command");

        match action {
            ControlAction::Status => match serde_json::to_value(self.status()) {
                Ok(data) => ControlResponse::success(data),
                Err(e) => ControlResponse::failure(e.to_string()),
            },
            ControlAction::Stop => {
                let gateway = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(STOP_DELAY).await;
                    gateway.stop().await;
                });
                ControlResponse::success(json!({ "message": "Stopping" }))
            },
            ControlAction::Reload => match self.reload().await {
                Ok(()) => ControlResponse::success(json!({ "message": "Configuration reloaded" })),
                Err(e) => ControlResponse::failure(e.to_string()),
            },
        }
    }
}

async fn stop_services(scheduler: &Scheduler, plugins: &PluginLoader) {
    scheduler.stop().await;
    plugins.unload_all().await;
}

async fn close_store(store: &Arc<dyn Store>) {
    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close storage");
    }
}
