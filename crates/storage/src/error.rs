use {hive_common::ErrorCode, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid storage key: {reason}")]
    InvalidKey { reason: String },

    #[error("storage transaction failed: {reason}")]
    Transaction { reason: String },
}

impl Error {
    #[must_use]
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn transaction(reason: impl std::fmt::Display) -> Self {
        Self::Transaction {
            reason: reason.to_string(),
        }
    }
}

impl ErrorCode for Error {
    fn code(&self) -> &'static str {
        match self {
            Self::Json(_) => "STORAGE_CORRUPT_VALUE",
            Self::Sqlx(_) | Self::Migrate(_) => "STORAGE_BACKEND",
            Self::InvalidKey { .. } => "STORAGE_INVALID_KEY",
            Self::Transaction { .. } => "STORAGE_TRANSACTION",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
