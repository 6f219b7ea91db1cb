use {hive_common::ErrorCode, hive_events::UnknownEventKind, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] hive_storage::Error),

    #[error(transparent)]
    UnknownEvent(#[from] UnknownEventKind),

    #[error("invalid plugin manifest: {field}: {reason}")]
    ManifestInvalid { field: String, reason: String },

    #[error("failed to fetch plugin manifest from {url}: {reason}")]
    ManifestFetch { url: String, reason: String },

    #[error("invalid plugin source '{input}': {reason}")]
    InvalidSource { input: String, reason: String },

    #[error("failed to load plugin '{name}': {reason}")]
    Load { name: String, reason: String },

    #[error("plugin '{name}' not found")]
    NotFound { name: String },

    #[error("{kind} provider '{name}' is already registered by plugin '{owner}'")]
    ProviderConflict {
        kind: &'static str,
        name: String,
        owner: String,
    },
}

impl Error {
    #[must_use]
    pub fn manifest_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn manifest_fetch(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ManifestFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_source(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            input: input.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn load(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}

impl ErrorCode for Error {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) | Self::Json(_) => "PLUGIN_RECORD",
            Self::Storage(e) => e.code(),
            Self::UnknownEvent(_) => "UNKNOWN_EVENT",
            Self::ManifestInvalid { .. } => "PLUGIN_MANIFEST_INVALID",
            Self::ManifestFetch { .. } => "PLUGIN_MANIFEST_FETCH",
            Self::InvalidSource { .. } => "PLUGIN_SOURCE_INVALID",
            Self::Load { .. } => "PLUGIN_LOAD",
            Self::NotFound { .. } => "PLUGIN_NOT_FOUND",
            Self::ProviderConflict { .. } => "PROVIDER_CONFLICT",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
