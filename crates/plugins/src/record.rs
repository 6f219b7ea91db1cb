//! Installed-plugins record file.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Mutex,
};

use serde::{Deserialize, Serialize};

use crate::{error::Result, manifest::PluginManifest};

/// One installed plugin: what it is, where it came from, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledPlugin {
    /// The source string exactly as given to `install`.
    pub source: String,
    pub manifest: PluginManifest,
    pub installed_at_ms: u64,
}

impl InstalledPlugin {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}

/// Name → record, persisted as one JSON document.
pub type InstalledPlugins = BTreeMap<String, InstalledPlugin>;

/// Persistent record storage with atomic writes.
///
/// The file is read in full and rewritten in full on every change.
pub struct RecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Load all records, returning an empty map if the file is missing.
    pub fn load(&self) -> Result<InstalledPlugins> {
        if !self.path.exists() {
            return Ok(InstalledPlugins::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(InstalledPlugins::new());
        }
        Ok(serde_json::from_str(&data)?)
    }

    /// Read-modify-write under a lock, then save atomically.
    pub fn update<T>(&self, f: impl FnOnce(&mut InstalledPlugins) -> T) -> Result<T> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = self.load()?;
        let out = f(&mut records);
        self.save(&records)?;
        Ok(out)
    }

    fn save(&self, records: &InstalledPlugins) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(records)?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
