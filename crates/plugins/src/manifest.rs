//! Plugin manifest (`plugin.json`) model and structural validation.

use std::fmt;

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::error::{Error, Result};

/// Conventional manifest file name, both on disk and in remote repositories.
pub const MANIFEST_FILE: &str = "plugin.json";

const REQUIRED_STRINGS: &[&str] = &[
    "name",
    "version",
    "description",
    "author",
    "repository",
    "kind",
    "minCoreVersion",
];

const PERMISSION_LISTS: &[&str] = &["net", "read", "write", "env", "run"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Channel,
    #[serde(alias = "llm")]
    Model,
    Storage,
    Tool,
    Ui,
    Custom,
}

impl PluginKind {
    pub const ALL: &'static [PluginKind] = &[
        Self::Channel,
        Self::Model,
        Self::Storage,
        Self::Tool,
        Self::Ui,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Model => "model",
            Self::Storage => "storage",
            Self::Tool => "tool",
            Self::Ui => "ui",
            Self::Custom => "custom",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "llm" => Some(Self::Model),
            _ => Self::ALL.iter().copied().find(|k| k.as_str() == s),
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared permissions. Recorded for auditing; not enforced at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// Network domains the plugin talks to.
    pub net: Vec<String>,
    pub read: Vec<String>,
    pub write: Vec<String>,
    /// Environment variables the plugin requires.
    pub env: Vec<String>,
    /// Executables the plugin spawns.
    pub run: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub repository: String,
    pub kind: PluginKind,
    pub permissions: Permissions,
    pub min_core_version: String,
}

impl PluginManifest {
    /// Parse and validate a manifest from raw JSON text.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| Error::manifest_invalid("manifest", format!("not valid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Validate a JSON document field by field, then build the manifest.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::manifest_invalid("manifest", "expected a JSON object"))?;

        for field in REQUIRED_STRINGS {
            match obj.get(*field) {
                None | Some(Value::Null) => {
                    return Err(Error::manifest_invalid(*field, "missing required field"));
                },
                Some(Value::String(_)) => {},
                Some(_) => return Err(Error::manifest_invalid(*field, "expected a string")),
            }
        }

        let permissions = match obj.get("permissions") {
            None | Some(Value::Null) => {
                return Err(Error::manifest_invalid(
                    "permissions",
                    "missing required field",
                ));
            },
            Some(Value::Object(p)) => p,
            Some(_) => return Err(Error::manifest_invalid("permissions", "expected an object")),
        };
        for list in PERMISSION_LISTS {
            if let Some(v) = permissions.get(*list) {
                let ok = v
                    .as_array()
                    .is_some_and(|items| items.iter().all(Value::is_string));
                if !ok {
                    return Err(Error::manifest_invalid(
                        format!("permissions.{list}"),
                        "expected an array of strings",
                    ));
                }
            }
        }

        let kind = obj.get("kind").and_then(Value::as_str).unwrap_or_default();
        if PluginKind::parse(kind).is_none() {
            return Err(Error::manifest_invalid(
                "kind",
                format!("unknown plugin kind '{kind}'"),
            ));
        }

        let manifest: Self = serde_json::from_value(value.clone())
            .map_err(|e| Error::manifest_invalid("manifest", e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks that apply to already-typed manifests (e.g. ones compiled in).
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if Version::parse(&self.version).is_none() {
            return Err(Error::manifest_invalid(
                "version",
                format!("'{}' is not MAJOR.MINOR.PATCH", self.version),
            ));
        }
        if Version::parse(&self.min_core_version).is_none() {
            return Err(Error::manifest_invalid(
                "minCoreVersion",
                format!("'{}' is not MAJOR.MINOR.PATCH", self.min_core_version),
            ));
        }
        Ok(())
    }

    /// Whether this plugin can run on `core_version`.
    pub fn is_compatible_with(&self, core_version: &str) -> bool {
        match (
            Version::parse(&self.min_core_version),
            Version::parse(core_version),
        ) {
            (Some(min), Some(core)) => core >= min,
            _ => false,
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::manifest_invalid("name", "must not be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(Error::manifest_invalid(
            "name",
            format!("'{name}' may only contain [a-z0-9-_]"),
        ));
    }
    Ok(())
}

/// `MAJOR.MINOR.PATCH`, compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Version(u64, u64, u64);

impl Version {
    fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self(major, minor, patch))
    }
}
