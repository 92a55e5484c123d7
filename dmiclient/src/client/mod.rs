//! Connection lifecycle for the process-manager socket.
//!
//! [`PmClient`] keeps a best-effort persistent connection to the single
//! Unix-domain-socket endpoint the process manager listens on. Connecting
//! runs as a background task that retries until it succeeds or an overall
//! timeout passes; a second background task reads newline-delimited
//! messages and feeds them into the inbound queue drained by the scene
//! state machine. Sends are fire-and-forget and never buffered across
//! reconnects.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::protocol::{PmCommand, PmEvent};
use crate::utils::{ClientError, Result};

/// Socket path of the reference cabinet deployment.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/dmicade_socket.s";

/// Status of the single logical link to the process manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection/message lifecycle notifications for the UI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Connected,
    Disconnected,
    /// The connect retry loop gave up after its overall timeout.
    ConnectionTimeout,
    MessageSent(String),
    MessageReceived(PmEvent),
}

/// Receiving ends handed out once at construction.
pub struct ClientChannels {
    /// Lifecycle notifications, in the order they occurred.
    pub events: UnboundedReceiver<ClientEvent>,
    /// Decoded protocol events for the scene state machine's tick to drain.
    pub inbound: UnboundedReceiver<PmEvent>,
}

/// Client for the process-manager Unix domain socket.
///
/// Cheap to clone; all clones share the same connection. The transport
/// halves are owned exclusively by the client (write) and its reader task
/// (read) while a connection is open.
#[derive(Clone)]
pub struct PmClient {
    socket_path: Arc<PathBuf>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    writer: Arc<Mutex<Option<OwnedWriteHalf>>>,
    // The handle is stored synchronously at spawn so disconnect() can
    // always cancel a retry loop that is still running.
    connect_task: Arc<StdMutex<Option<JoinHandle<()>>>>,
    reader_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    events_tx: UnboundedSender<ClientEvent>,
    inbound_tx: UnboundedSender<PmEvent>,
}

impl PmClient {
    /// Creates a disconnected client for `socket_path` along with the
    /// receiving ends of its event channels.
    pub fn new(socket_path: impl Into<PathBuf>) -> (Self, ClientChannels) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);

        let client = Self {
            socket_path: Arc::new(socket_path.into()),
            status: Arc::new(status),
            writer: Arc::new(Mutex::new(None)),
            connect_task: Arc::new(StdMutex::new(None)),
            reader_task: Arc::new(Mutex::new(None)),
            events_tx,
            inbound_tx,
        };

        (client, ClientChannels { events, inbound })
    }

    pub fn socket_path(&self) -> &Path {
        self.socket_path.as_path()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Starts connecting in the background, retrying every `retry_interval`
    /// until the endpoint accepts or `timeout` (if any) elapses. Returns
    /// immediately; the outcome surfaces as [`ClientEvent::Connected`] or
    /// [`ClientEvent::ConnectionTimeout`].
    ///
    /// A no-op if a connection attempt is already running or established.
    pub fn connect(&self, retry_interval: Duration, timeout: Option<Duration>) {
        if self.status() != ConnectionStatus::Disconnected {
            warn!(status = ?self.status(), "connect requested while not disconnected");
            return;
        }
        self.set_status(ConnectionStatus::Connecting);

        let client = self.clone();
        let task = tokio::spawn(async move {
            client.connect_loop(retry_interval, timeout).await;
        });
        if let Ok(mut slot) = self.connect_task.lock() {
            *slot = Some(task);
        }
    }

    async fn connect_loop(self, retry_interval: Duration, timeout: Option<Duration>) {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            match UnixStream::connect(self.socket_path.as_path()).await {
                Ok(stream) => {
                    info!(path = %self.socket_path.display(), "connected to process manager");
                    self.install(stream).await;
                    return;
                }
                Err(e) => {
                    debug!(path = %self.socket_path.display(), error = %e, "connect attempt failed");
                }
            }

            // Give up if the next attempt could not happen before the deadline.
            if let Some(deadline) = deadline {
                if Instant::now() + retry_interval >= deadline {
                    warn!(path = %self.socket_path.display(), "connect timed out, giving up");
                    self.set_status(ConnectionStatus::Disconnected);
                    self.emit(ClientEvent::ConnectionTimeout);
                    return;
                }
            }

            tokio::time::sleep(retry_interval).await;
        }
    }

    async fn install(&self, stream: UnixStream) {
        let (read_half, write_half) = stream.into_split();
        *self.writer.lock().await = Some(write_half);

        let client = self.clone();
        let handle = tokio::spawn(async move {
            client.receive_loop(read_half).await;
        });
        *self.reader_task.lock().await = Some(handle);

        self.set_status(ConnectionStatus::Connected);
        self.emit(ClientEvent::Connected);
    }

    async fn receive_loop(self, read_half: OwnedReadHalf) {
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                // Zero bytes means the process manager closed the connection.
                Ok(0) => {
                    info!("process manager closed the connection");
                    break;
                }
                Ok(_) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    let event = PmEvent::decode(text);
                    match &event {
                        PmEvent::Unrecognized(raw) => {
                            warn!(message = %raw, "unrecognized protocol message, ignoring");
                        }
                        recognized => debug!(event = ?recognized, "protocol event received"),
                    }
                    // Queue for the state machine before notifying, so an
                    // observer of MessageReceived can drain it right away.
                    let _ = self.inbound_tx.send(event.clone());
                    self.emit(ClientEvent::MessageReceived(event));
                }
                Err(e) => {
                    warn!(error = %e, "socket read failed, treating as disconnect");
                    break;
                }
            }
        }

        // Reader-initiated teardown: detach our own handle instead of
        // aborting it.
        self.reader_task.lock().await.take();
        self.writer.lock().await.take();
        self.mark_disconnected();
    }

    /// Sends a command over the current connection.
    ///
    /// Fails with [`ClientError::NotConnected`] when no connection is
    /// established; the command is dropped, never queued for later. A write
    /// error tears the connection down and is returned to the caller, who
    /// may re-issue the send after reconnecting.
    pub async fn send(&self, command: &PmCommand) -> Result<()> {
        let encoded = command.encode();

        let written = {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(ClientError::NotConnected)?;
            write_line(writer, &encoded).await
        };

        match written {
            Ok(()) => {
                debug!(command = %encoded, "command sent");
                self.emit(ClientEvent::MessageSent(encoded));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "socket write failed, disconnecting");
                self.disconnect().await;
                Err(ClientError::Io(e))
            }
        }
    }

    /// Cancels an in-flight connect attempt and tears down the active
    /// connection, firing [`ClientEvent::Disconnected`] if one was actually
    /// established. The client does not reconnect on its own afterwards;
    /// the owner re-invokes [`PmClient::connect`] when continued operation
    /// is wanted.
    pub async fn disconnect(&self) {
        // The retry loop goes first, so it cannot install a connection
        // while the rest is being torn down.
        let connect = self.connect_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = connect {
            handle.abort();
        }
        if let Some(handle) = self.reader_task.lock().await.take() {
            handle.abort();
        }
        self.writer.lock().await.take();
        self.mark_disconnected();
    }

    fn mark_disconnected(&self) {
        let previous = self.status.send_replace(ConnectionStatus::Disconnected);
        // A Disconnected notification is only meaningful for a link that
        // existed; cancelling a pending connect stays silent.
        if previous == ConnectionStatus::Connected {
            self.emit(ClientEvent::Disconnected);
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    fn emit(&self, event: ClientEvent) {
        // The receiver side may be gone during shutdown; that is fine.
        let _ = self.events_tx.send(event);
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, text: &str) -> std::io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
