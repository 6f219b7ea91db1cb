//! Config schema types.

use std::{collections::BTreeMap, path::PathBuf};

use {
    hive_events::HeartbeatAction,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

/// Root configuration (`hive.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HiveConfig {
    pub storage: StorageConfig,
    pub gateway: GatewayConfig,
    pub plugins: PluginsConfig,
    pub scheduler: SchedulerConfig,
    /// Scheduled jobs declared up front; upserted when the gateway starts.
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// SQLite database file, or `:memory:`.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: crate::data_dir().join("hive.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Control socket path. `None` falls back to the data directory.
    pub socket: Option<PathBuf>,
    /// Upper bound on how long `gateway:stopping` handlers may delay shutdown.
    pub shutdown_grace_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            socket: None,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl GatewayConfig {
    /// The configured socket path, or the default one.
    pub fn socket_path(&self) -> PathBuf {
        self.socket
            .clone()
            .unwrap_or_else(crate::default_socket_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginsConfig {
    /// Installed-plugins record file.
    pub registry: PathBuf,
    /// Base URL used to fetch `plugin.json` from remote repositories.
    pub raw_base_url: String,
    /// Per-plugin configuration, handed read-only to each plugin.
    pub config: BTreeMap<String, Value>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            registry: crate::data_dir().join("installed-plugins.json"),
            raw_base_url: "https://raw.githubusercontent.com".into(),
            config: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// IANA timezone used to evaluate cron expressions. UTC when unset.
    pub timezone: Option<String>,
}

/// A job declared in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub cron: String,
    pub agent_id: String,
    #[serde(default)]
    pub action: HeartbeatAction,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}
