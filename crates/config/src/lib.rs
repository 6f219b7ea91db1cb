//! Configuration loading, validation, and env substitution.
//!
//! Config files: `hive.toml`, `hive.yaml`, `hive.yml`, or `hive.json`.
//! Searched in `./` then the user config directory.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{
        config_dir, data_dir, default_socket_path, discover_config, load_config, parse_config,
    },
    schema::{GatewayConfig, HiveConfig, JobConfig, PluginsConfig, SchedulerConfig, StorageConfig},
    validate::validate,
};
