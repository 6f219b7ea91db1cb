//! Control endpoint discovery.
//!
//! On Unix the control channel is a socket file at the configured path.
//! Elsewhere the gateway listens on loopback TCP and records the bound port
//! in a `<socket>.port` side-car file. Both write a `<socket>.pid` file.

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};

const FALLBACK_PORT_BASE: u16 = 20_000;
const FALLBACK_PORT_SPAN: u64 = 20_000;

fn with_suffix(socket: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(socket.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `<socket>.pid`
pub fn pid_file_path(socket: &Path) -> PathBuf {
    with_suffix(socket, ".pid")
}

/// `<socket>.port`
pub fn port_file_path(socket: &Path) -> PathBuf {
    with_suffix(socket, ".port")
}

/// Deterministic loopback port for a socket path: `20000 + sha256(path) mod 20000`.
pub fn fallback_port(socket: &Path) -> u16 {
    let digest = Sha256::digest(socket.as_os_str().as_encoded_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let offset = u64::from_be_bytes(head) % FALLBACK_PORT_SPAN;
    // offset < 20_000, so the sum stays below 40_000.
    FALLBACK_PORT_BASE + u16::try_from(offset).unwrap_or_default()
}

pub fn write_port_file(socket: &Path, port: u16) -> io::Result<()> {
    std::fs::write(port_file_path(socket), port.to_string())
}

/// The port recorded next to `socket`, if any.
pub fn read_port_file(socket: &Path) -> Option<u16> {
    std::fs::read_to_string(port_file_path(socket))
        .ok()?
        .trim()
        .parse()
        .ok()
}

pub fn write_pid_file(socket: &Path, pid: u32) -> io::Result<()> {
    std::fs::write(pid_file_path(socket), pid.to_string())
}

pub fn read_pid_file(socket: &Path) -> Option<u32> {
    std::fs::read_to_string(pid_file_path(socket))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Remove the socket file and its side-cars, ignoring ones that are absent.
pub fn remove_endpoint_files(socket: &Path) {
    for path in [
        socket.to_path_buf(),
        port_file_path(socket),
        pid_file_path(socket),
    ] {
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed endpoint file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove endpoint file"),
        }
    }
}
