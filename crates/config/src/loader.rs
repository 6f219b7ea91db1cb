use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::HiveConfig,
    validate::validate,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["hive.toml", "hive.yaml", "hive.yml", "hive.json"];

/// Load, resolve, and validate the config at `path` (any supported format).
///
/// Relative paths inside the file are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<HiveConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)?;

    if let Some(base) = path.parent() {
        resolve_relative_paths(&mut config, base);
    }
    validate(&config)?;
    debug!(path = %path.display(), jobs = config.jobs.len(), "config loaded");
    Ok(config)
}

/// Parse raw config text, picking the format from `path`'s extension.
pub fn parse_config(raw: &str, path: &Path) -> Result<HiveConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(path, e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(path, e)),
        _ => Err(Error::UnsupportedFormat {
            ext: ext.to_string(),
        }),
    }
}

/// Find the first config file in standard locations.
///
/// Search order:
/// 1. `./hive.{toml,yaml,yml,json}` (project-local)
/// 2. `<user config dir>/hive.{toml,yaml,yml,json}` (user-global)
pub fn discover_config() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/hive/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "hive").map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory used for default storage, socket, and plugin paths.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "hive")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".hive"))
}

/// Default control socket location.
pub fn default_socket_path() -> PathBuf {
    data_dir().join("hive.sock")
}

fn resolve_relative_paths(config: &mut HiveConfig, base: &Path) {
    let resolve = |p: &mut PathBuf| {
        if p.is_relative() && p.as_os_str() != ":memory:" && !p.as_os_str().is_empty() {
            *p = base.join(&*p);
        }
    };
    resolve(&mut config.storage.path);
    resolve(&mut config.plugins.registry);
    if let Some(socket) = config.gateway.socket.as_mut() {
        resolve(socket);
    }
}
