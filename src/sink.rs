//! Notification sinks: fire-and-forget event delivery.
//!
//! `deliver` never fails outward: a sink that cannot deliver drops the
//! event and logs, so a slow or dead consumer can never stall the
//! dispatch loop.  `SocketSink` fans events out to local Unix-socket
//! clients as length-prefixed s-expression frames.

use std::collections::HashMap;
use std::io::{self, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::engine::CommandEvent;

// ── Trait ──────────────────────────────────────────────────

/// Receives emitted events. No acknowledgment, no retry.
pub trait NotificationSink {
    fn deliver(&mut self, event: &CommandEvent);
}

// ── Log sink ───────────────────────────────────────────────

/// Writes every event to the log. Always configured in the binary so a
/// bare run is observable.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&mut self, event: &CommandEvent) {
        info!(
            name = %event.name,
            timestamp = event.timestamp_s,
            pointing_transition = event.pointing_transition,
            "event"
        );
    }
}

// ── Socket sink ────────────────────────────────────────────

/// Maximum buffered bytes per client before events are dropped.
const MAX_WRITE_BUFFER: usize = 65_536;

/// Per-client connection state.
struct SinkClient {
    stream: UnixStream,
    write_buf: Vec<u8>,
    id: u64,
}

impl SinkClient {
    fn new(stream: UnixStream, id: u64) -> Self {
        stream.set_nonblocking(true).ok();
        Self {
            stream,
            write_buf: Vec::new(),
            id,
        }
    }

    /// Enqueue a framed event (length prefix + payload) unless the
    /// buffer is already over the cap, in which case the event is
    /// dropped for this client.
    fn enqueue_event(&mut self, payload: &str) {
        if self.write_buf.len() > MAX_WRITE_BUFFER {
            warn!(client_id = self.id, "write buffer overflow, dropping event");
            return;
        }
        let bytes = payload.as_bytes();
        let len = bytes.len() as u32;
        self.write_buf.extend_from_slice(&len.to_be_bytes());
        self.write_buf.extend_from_slice(bytes);
    }

    /// Attempt to flush pending writes without blocking.
    fn flush_writes(&mut self) -> io::Result<()> {
        while !self.write_buf.is_empty() {
            match self.stream.write(&self.write_buf) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "write zero")),
                Ok(n) => {
                    self.write_buf.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Unix-socket event fan-out. Clients connect and receive every event
/// emitted after their connection; there is no request channel.
pub struct SocketSink {
    listener: UnixListener,
    socket_path: PathBuf,
    clients: HashMap<u64, SinkClient>,
    next_client_id: u64,
    /// Log every broadcast payload at info level.
    pub trace_events: bool,
}

impl SocketSink {
    /// Compute the default socket path.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .unwrap_or_else(|_| format!("/tmp/gesturemote-{}", unsafe { libc::getuid() }));
        PathBuf::from(runtime_dir).join("gesturemote.sock")
    }

    /// Bind the listener, replacing any stale socket file.
    pub fn bind(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("removing stale socket {}", socket_path.display()))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("binding {}", socket_path.display()))?;
        listener.set_nonblocking(true)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o700))?;
        }

        info!(path = %socket_path.display(), "notification socket listening");
        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
            clients: HashMap::new(),
            next_client_id: 1,
            trace_events: false,
        })
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Accept any pending connections without blocking.
    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    let client_id = self.next_client_id;
                    self.next_client_id += 1;
                    info!(client_id, "notification client connected");
                    self.clients.insert(client_id, SinkClient::new(stream, client_id));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept error: {}", e);
                    break;
                }
            }
        }
    }
}

impl NotificationSink for SocketSink {
    fn deliver(&mut self, event: &CommandEvent) {
        self.accept_clients();
        if self.clients.is_empty() {
            return;
        }

        let payload = event.to_sexp();
        if self.trace_events {
            info!(">> {}", payload);
        }

        let mut disconnected = Vec::new();
        for client in self.clients.values_mut() {
            client.enqueue_event(&payload);
            if let Err(e) = client.flush_writes() {
                debug!(client_id = client.id, "write error: {}", e);
                disconnected.push(client.id);
            }
        }
        for id in disconnected {
            info!(client_id = id, "removing disconnected notification client");
            self.clients.remove(&id);
        }
    }
}

impl Drop for SocketSink {
    fn drop(&mut self) {
        info!(clients = self.client_count(), "notification socket closing");
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// ── Tests ──────────────────────────────────────────────────
