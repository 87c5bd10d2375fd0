//! Unix domain socket server for IPC
//!
//! Provides request-response access to the feature controller and pushes
//! state events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::controller::{ControllerError, ControllerHandle};
use crate::events::{Audience, AudienceSeat, StateEvent};

use super::protocol::{Notification, Request, Response, MAX_MESSAGE_LEN};

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    controller: ControllerHandle,
    /// Source of state events for subscribed clients
    event_tx: broadcast::Sender<StateEvent>,
    /// Clients currently subscribed
    audience: Audience,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        controller: ControllerHandle,
        event_tx: broadcast::Sender<StateEvent>,
        audience: Audience,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            controller,
            event_tx,
            audience,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let controller = self.controller.clone();
                    let event_tx = self.event_tx.clone();
                    let audience = self.audience.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, controller, event_tx, audience) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        controller: ControllerHandle,
        event_tx: broadcast::Sender<StateEvent>,
        audience: Audience,
    ) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let writer: SharedWriter = Arc::new(Mutex::new(writer));
        let mut forwarder: Option<JoinHandle<()>> = None;

        let result = async {
            while let Some(msg_buf) = Self::read_message(&mut reader).await? {
                let request: Request =
                    serde_json::from_slice(&msg_buf).context("failed to parse request")?;
                debug!(?request, "received request");

                let (response, subscribe) = Self::process_request(request, &controller).await;

                // Seat the client before confirming, so it counts as soon as it is told so
                let seat = (subscribe && forwarder.is_none()).then(|| audience.join());
                Self::send_message(&writer, &response).await?;

                if let Some(seat) = seat {
                    debug!(clients = audience.count(), "client subscribed to notifications");
                    forwarder = Some(tokio::spawn(Self::forward_events(
                        event_tx.subscribe(),
                        Arc::clone(&writer),
                        seat,
                    )));
                }
            }
            Ok::<(), anyhow::Error>(())
        }
        .await;

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        result
    }

    /// Read one length-prefixed message; `None` when the client hung up
    async fn read_message(reader: &mut OwnedReadHalf) -> Result<Option<Vec<u8>>> {
        // Read message length (4-byte little-endian)
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("client disconnected");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_LEN {
            warn!(len, "message too large, disconnecting");
            return Ok(None);
        }

        let mut msg_buf = vec![0u8; len];
        reader.read_exact(&mut msg_buf).await?;
        Ok(Some(msg_buf))
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(writer: &SharedWriter, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        let mut writer = writer.lock().await;
        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Push state events to a subscribed client until it goes away
    ///
    /// The client stays in the audience while this runs.
    async fn forward_events(
        mut event_rx: broadcast::Receiver<StateEvent>,
        writer: SharedWriter,
        _seat: AudienceSeat,
    ) {
        loop {
            match event_rx.recv().await {
                Ok(event) => {
                    let notification = Notification::Event { event };
                    if let Err(e) = Self::send_message(&writer, &notification).await {
                        debug!(?e, "notification write failed, dropping subscription");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, controller: &ControllerHandle) -> (Response, bool) {
        let response = match request {
            Request::Ping => Response::Pong,

            Request::Subscribe => return (Response::Subscribed, true),

            Request::GetStatus => match controller.status().await {
                Ok(status) => Response::Status(status.into()),
                Err(e) => unavailable(e),
            },

            Request::SetFeature { enabled } => match controller.set_feature(enabled).await {
                Ok(gate) => gate.into(),
                Err(e) => unavailable(e),
            },

            Request::SetListening { enabled } => match controller.set_listening(enabled).await {
                Ok(Ok(gate)) => gate.into(),
                Ok(Err(e)) => {
                    info!(code = e.code(), "listening request refused");
                    e.into()
                }
                Err(e) => unavailable(e),
            },

            Request::SelectContact { contact } => match controller.select_contact(contact).await {
                Ok(()) => Response::Ok,
                Err(e) => unavailable(e),
            },

            Request::FocusLost => match controller.focus_lost().await {
                Ok(gate) => gate.into(),
                Err(e) => unavailable(e),
            },

            Request::AddTrigger { word } => match controller.add_trigger(word).await {
                Ok(Ok(update)) => update.into(),
                Ok(Err(e)) => Response::error("invalid_trigger", e.to_string()),
                Err(e) => unavailable(e),
            },

            Request::RemoveTrigger { word } => match controller.remove_trigger(word).await {
                Ok(update) => update.into(),
                Err(e) => unavailable(e),
            },
        };
        (response, false)
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn unavailable(e: ControllerError) -> Response {
    Response::error("unavailable", e.to_string())
}
