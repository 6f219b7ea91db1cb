//! Client side of the gateway control protocol.
//!
//! Every call opens a fresh connection, sends one request, half-closes, and
//! reads one response.

pub mod error;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use {
    hive_protocol::{
        ControlAction, ControlRequest, ControlResponse, MAX_RESPONSE_BYTES, StatusSnapshot,
    },
    serde_json::Value,
    tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    tracing::debug,
};

pub use error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct GatewayClient {
    socket: PathBuf,
    timeout: Duration,
}

impl GatewayClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let data = self.request(ControlAction::Status).await?;
        serde_json::from_value(data).map_err(|e| Error::protocol(e.to_string()))
    }

    pub async fn stop(&self) -> Result<Value> {
        self.request(ControlAction::Stop).await
    }

    pub async fn reload(&self) -> Result<Value> {
        self.request(ControlAction::Reload).await
    }

    /// Send `action` and return the response data, mapping `ok: false` to
    /// [`Error::Remote`].
    pub async fn request(&self, action: ControlAction) -> Result<Value> {
        let response = self.send(&ControlRequest::new(action)).await?;
        if response.ok {
            Ok(response.data.unwrap_or(Value::Null))
        } else {
            Err(Error::Remote(
                response
                    .error
                    .unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }

    /// Raw exchange: whatever envelope the gateway returns.
    pub async fn send(&self, request: &ControlRequest) -> Result<ControlResponse> {
        let body = serde_json::to_vec(request).map_err(|e| Error::protocol(e.to_string()))?;
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let raw = tokio::time::timeout(self.timeout, self.exchange(&body))
            .await
            .map_err(|_| Error::Timeout(timeout_ms))??;
        serde_json::from_slice(&raw).map_err(|e| Error::protocol(e.to_string()))
    }

    #[cfg(unix)]
    async fn exchange(&self, body: &[u8]) -> Result<Vec<u8>> {
        let stream = tokio::net::UnixStream::connect(&self.socket)
            .await
            .map_err(|e| Error::unreachable(self.socket.display().to_string(), e))?;
        debug!(socket = %self.socket.display(), "connected to gateway");
        roundtrip(stream, body).await
    }

    #[cfg(not(unix))]
    async fn exchange(&self, body: &[u8]) -> Result<Vec<u8>> {
        let port = hive_protocol::endpoint::read_port_file(&self.socket)
            .unwrap_or_else(|| hive_protocol::endpoint::fallback_port(&self.socket));
        let addr = format!("127.0.0.1:{port}");
        let stream = tokio::net::TcpStream::connect(&addr)
            .await
            .map_err(|e| Error::unreachable(addr.clone(), e))?;
        debug!(%addr, "connected to gateway");
        roundtrip(stream, body).await
    }
}

async fn roundtrip<S>(mut stream: S, body: &[u8]) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let io_err = |e: std::io::Error| Error::protocol(e.to_string());
    stream.write_all(body).await.map_err(io_err)?;
    stream.shutdown().await.map_err(io_err)?;

    let mut raw = Vec::new();
    (&mut stream)
        .take(MAX_RESPONSE_BYTES as u64 + 1)
        .read_to_end(&mut raw)
        .await
        .map_err(io_err)?;
    if raw.len() > MAX_RESPONSE_BYTES {
        return Err(Error::protocol("response too large"));
    }
    if raw.is_empty() {
        return Err(Error::protocol("connection closed without a response"));
    }
    Ok(raw)
}
