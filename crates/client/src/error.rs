use {hive_common::ErrorCode, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    /// Nothing is listening at the control endpoint.
    #[error("gateway not reachable at {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The gateway answered with `ok: false`.
    #[error("{0}")]
    Remote(String),

    #[error("invalid response from gateway: {0}")]
    Protocol(String),

    #[error("gateway did not answer within {0} ms")]
    Timeout(u64),
}

impl Error {
    #[must_use]
    pub fn unreachable(endpoint: impl Into<String>, source: std::io::Error) -> Self {
        Self::Unreachable {
            endpoint: endpoint.into(),
            source,
        }
    }

    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

impl ErrorCode for Error {
    fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "GATEWAY_UNREACHABLE",
            Self::Remote(_) => "GATEWAY_ERROR",
            Self::Protocol(_) => "PROTOCOL",
            Self::Timeout(_) => "GATEWAY_TIMEOUT",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
