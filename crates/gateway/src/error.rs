use std::path::PathBuf;

use {hive_common::ErrorCode, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] hive_config::Error),

    #[error(transparent)]
    Storage(#[from] hive_storage::Error),

    #[error(transparent)]
    Scheduler(#[from] hive_cron::Error),

    #[error(transparent)]
    Plugins(#[from] hive_plugins::Error),

    #[error("gateway already running")]
    AlreadyRunning,

    #[error("another gateway is listening on {}", socket.display())]
    SocketInUse { socket: PathBuf, pid: Option<u32> },

    #[error("gateway is not running")]
    NotRunning,

    #[error("failed to bind control endpoint {}: {source}", socket.display())]
    Bind {
        socket: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn bind(socket: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Bind {
            socket: socket.into(),
            source,
        }
    }
}

impl ErrorCode for Error {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.code(),
            Self::Storage(e) => e.code(),
            Self::Scheduler(e) => e.code(),
            Self::Plugins(e) => e.code(),
            Self::AlreadyRunning | Self::SocketInUse { .. } => "GATEWAY_ALREADY_RUNNING",
            Self::NotRunning => "GATEWAY_NOT_RUNNING",
            Self::Bind { .. } => "GATEWAY_BIND",
            Self::Io(_) => "GATEWAY_IO",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
