//! Lifecycle state and the resources a running gateway owns.

use std::{fmt, path::PathBuf, sync::Arc, time::Instant};

use {
    hive_config::HiveConfig, hive_cron::Scheduler, hive_plugins::PluginLoader,
    hive_storage::Store, tokio::task::JoinHandle, tokio_util::sync::CancellationToken,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl GatewayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for GatewayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything created by `start` and released by `stop`.
pub(crate) struct Running {
    pub config: HiveConfig,
    pub config_path: PathBuf,
    pub socket: PathBuf,
    pub started: Instant,
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<Scheduler>,
    pub plugins: Arc<PluginLoader>,
    pub cancel: CancellationToken,
    pub accept_task: JoinHandle<()>,
}
