//! Control endpoint: binding, the accept loop, and per-connection handling.
//!
//! Unix builds listen on a socket file. Elsewhere a loopback TCP listener is
//! used, on a port derived from the socket path (or an ephemeral one if that
//! is taken), recorded in the `<socket>.port` side-car.

use std::{path::Path, sync::Weak, time::Duration};

use {
    hive_protocol::{
        ControlRequest, ControlResponse, MAX_REQUEST_BYTES,
        endpoint::{read_pid_file, remove_endpoint_files},
        process::is_process_alive,
    },
    serde_json::Value,
    tokio::{
        io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    gateway::{Gateway, Inner},
};

/// How long a client may take to send its request.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);
/// How long to wait for an existing endpoint to accept a connection.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(1);
const READ_CHUNK: usize = 4096;
/// Back-off after a failed `accept`.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

pub(crate) trait ControlStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ControlStream for T {}

pub(crate) enum ControlListener {
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
    #[cfg(not(unix))]
    Tcp(tokio::net::TcpListener),
}

impl ControlListener {
    async fn accept(&self) -> std::io::Result<Box<dyn ControlStream>> {
        match self {
            #[cfg(unix)]
            Self::Unix(l) => {
                let (stream, _) = l.accept().await?;
                Ok(Box::new(stream))
            },
            #[cfg(not(unix))]
            Self::Tcp(l) => {
                let (stream, _) = l.accept().await?;
                Ok(Box::new(stream))
            },
        }
    }
}

// ── Endpoint preparation ────────────────────────────────────────────────────

/// Remove leftovers of an unclean exit at `socket`.
///
/// Fails only when something still accepts connections on the endpoint. The
/// pid file is not trusted on its own: pids get reused across restarts.
pub(crate) async fn clear_stale_endpoint(socket: &Path) -> Result<()> {
    if endpoint_answers(socket).await {
        return Err(Error::SocketInUse {
            socket: socket.to_path_buf(),
            pid: read_pid_file(socket),
        });
    }
    if let Some(pid) = read_pid_file(socket)
        && pid != std::process::id()
        && is_process_alive(pid)
    {
        warn!(pid, socket = %socket.display(), "pid file names a live process but the endpoint is silent, reclaiming");
    }
    if socket.exists() {
        info!(socket = %socket.display(), "removing stale control socket");
    }
    remove_endpoint_files(socket);
    Ok(())
}

#[cfg(unix)]
async fn endpoint_answers(socket: &Path) -> bool {
    matches!(
        tokio::time::timeout(LIVENESS_TIMEOUT, tokio::net::UnixStream::connect(socket)).await,
        Ok(Ok(_))
    )
}

#[cfg(not(unix))]
async fn endpoint_answers(socket: &Path) -> bool {
    let Some(port) = hive_protocol::endpoint::read_port_file(socket) else {
        return false;
    };
    matches!(
        tokio::time::timeout(
            LIVENESS_TIMEOUT,
            tokio::net::TcpStream::connect(("127.0.0.1", port))
        )
        .await,
        Ok(Ok(_))
    )
}

#[cfg(unix)]
pub(crate) fn bind(socket: &Path) -> Result<ControlListener> {
    if let Some(parent) = socket.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| Error::bind(socket, e))?;
    }
    let listener = tokio::net::UnixListener::bind(socket).map_err(|e| Error::bind(socket, e))?;
    info!(socket = %socket.display(), "control socket listening");
    Ok(ControlListener::Unix(listener))
}

#[cfg(not(unix))]
pub(crate) fn bind(socket: &Path) -> Result<ControlListener> {
    use hive_protocol::endpoint::{fallback_port, write_port_file};

    if let Some(parent) = socket.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| Error::bind(socket, e))?;
    }
    let preferred = fallback_port(socket);
    let std_listener = std::net::TcpListener::bind(("127.0.0.1", preferred))
        .or_else(|e| {
            warn!(port = preferred, error = %e, "fallback port taken, using an ephemeral one");
            std::net::TcpListener::bind(("127.0.0.1", 0))
        })
        .map_err(|e| Error::bind(socket, e))?;
    std_listener
        .set_nonblocking(true)
        .map_err(|e| Error::bind(socket, e))?;
    let listener =
        tokio::net::TcpListener::from_std(std_listener).map_err(|e| Error::bind(socket, e))?;
    let port = listener.local_addr().map_err(|e| Error::bind(socket, e))?.port();
    write_port_file(socket, port).map_err(|e| Error::bind(socket, e))?;
    info!(socket = %socket.display(), port, "control endpoint listening on loopback");
    Ok(ControlListener::Tcp(listener))
}

// ── Accept loop ─────────────────────────────────────────────────────────────

/// Accept connections until `cancel` fires. Each connection runs in its own
/// task; failures are logged and never end the loop.
pub(crate) fn spawn_accept_loop(
    listener: ControlListener,
    gateway: Weak<Inner>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(stream) => {
                        let Some(gateway) = Gateway::upgrade(&gateway) else {
                            break;
                        };
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, &gateway).await {
                                warn!(error = %e, "control connection failed");
                            }
                        });
                    },
                    Err(e) => {
                        warn!(error = %e, "failed to accept control connection");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    },
                },
            }
        }
        debug!("control accept loop exited");
    })
}

/// Read one request, dispatch it, write one response, close.
pub(crate) async fn handle_connection<S>(mut stream: S, gateway: &Gateway) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = match read_request(&mut stream).await? {
        Ok(request) => gateway.handle_command(&request.action).await,
        Err(message) => {
            debug!(%message, "rejecting control request");
            ControlResponse::failure(message)
        },
    };
    stream.write_all(&response.encode()).await?;
    stream.shutdown().await
}

async fn read_request<S>(stream: &mut S) -> std::io::Result<std::result::Result<ControlRequest, String>>
where
    S: AsyncRead + Unpin,
{
    match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_payload(stream)).await {
        Ok(result) => result,
        Err(_) => Ok(Err("Request timed out".to_string())),
    }
}

/// Read until one JSON value is complete, the peer half-closes, or the
/// buffer outgrows [`MAX_REQUEST_BYTES`].
async fn read_payload<S>(stream: &mut S) -> std::io::Result<std::result::Result<ControlRequest, String>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(ControlRequest::decode(&buf));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > MAX_REQUEST_BYTES {
            return Ok(Err("Request too large".to_string()));
        }
        if let Some(end) = complete_prefix(&buf) {
            return Ok(ControlRequest::decode(&buf[..end]));
        }
    }
}

/// Length of the first complete JSON value in `buf`, or of the whole buffer
/// once it can no longer become valid. `None` while more input is needed.
fn complete_prefix(buf: &[u8]) -> Option<usize> {
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    match values.next() {
        Some(Ok(_)) => Some(values.byte_offset()),
        Some(Err(e)) if !e.is_eof() => Some(buf.len()),
        _ => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn exchange(request: Vec<u8>) -> Value {
        let gateway = Gateway::new();
        let (mut client, server) = tokio::io::duplex(256 * 1024);
        let task = tokio::spawn(async move { handle_connection(server, &gateway).await });

        client.write_all(&request).await.unwrap();
        client.shutdown().await.unwrap();
        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        task.await.unwrap().unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[tokio::test]
    async fn malformed_request_gets_error_envelope() {
        let v = exchange(b"{not json".to_vec()).await;
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"], "Invalid JSON");
    }

    #[tokio::test]
    async fn unknown_action_is_named() {
        let v = exchange(br#"{"action":"dance"}"#.to_vec()).await;
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"], "Unknown action: dance");
    }

    #[tokio::test]
    async fn oversized_request_is_rejected() {
        let mut body = br#"{"action":""#.to_vec();
        body.extend(std::iter::repeat_n(b'a', MAX_REQUEST_BYTES));
        body.extend(br#""}"#);
        let v = exchange(body).await;
        assert_eq!(v["error"], "Request too large");
    }

    #[tokio::test]
    async fn status_on_stopped_gateway() {
        let v = exchange(br#"{"action":"status"}"#.to_vec()).await;
        assert_eq!(v["ok"], true);
        assert_eq!(v["data"]["running"], false);
        assert_eq!(v["data"]["uptimeMs"], 0);
        assert_eq!(v["data"]["config"], Value::Null);
    }

    #[tokio::test]
    async fn request_without_half_close_is_answered() {
        let gateway = Gateway::new();
        let (mut client, server) = tokio::io::duplex(4096);
        let task = tokio::spawn(async move { handle_connection(server, &gateway).await });

        client.write_all(br#"{"action":"status"}"#).await.unwrap();
        let mut raw = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), client.read_to_end(&mut raw))
            .await
            .expect("no response before the client closed its side")
            .unwrap();
        task.await.unwrap().unwrap();

        let v: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(v["ok"], true);
        assert_eq!(v["data"]["running"], false);
    }

    #[test]
    fn partial_json_needs_more_input() {
        assert_eq!(complete_prefix(br#"{"action":"sta"#), None);
        assert_eq!(complete_prefix(b"  "), None);
        assert_eq!(complete_prefix(br#"{"action":"stop"} trailing"#), Some(17));
        assert_eq!(complete_prefix(b"{not json"), Some(9));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_socket_without_pid_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("hive.sock");
        std::fs::write(&socket, "").unwrap();
        clear_stale_endpoint(&socket).await.unwrap();
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn own_pid_in_a_stale_pid_file_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("hive.sock");
        std::fs::write(&socket, "").unwrap();
        hive_protocol::endpoint::write_pid_file(&socket, std::process::id()).unwrap();

        clear_stale_endpoint(&socket).await.unwrap();
        assert!(!socket.exists());
        assert!(read_pid_file(&socket).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listening_socket_blocks_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("hive.sock");
        let _listener = tokio::net::UnixListener::bind(&socket).unwrap();
        hive_protocol::endpoint::write_pid_file(&socket, 4242).unwrap();

        let err = clear_stale_endpoint(&socket).await.unwrap_err();
        assert!(matches!(err, Error::SocketInUse { pid: Some(4242), .. }));
        assert!(socket.exists());
    }

    #[tokio::test]
    async fn dead_pid_file_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("hive.sock");
        hive_protocol::endpoint::write_pid_file(&socket, 999_999_999).unwrap();
        clear_stale_endpoint(&socket).await.unwrap();
        assert!(read_pid_file(&socket).is_none());
    }
}
