//! Async Unix socket IPC server for daemon control.
//!
//! One JSON command per connection, one JSON response back.

use crate::error::{ChatRelayError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

/// Handler trait for processing IPC commands.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a command and return a response.
    async fn handle(&self, command: Command) -> Response;
}

/// IPC server for handling daemon control commands via Unix socket.
pub struct IpcServer {
    socket_path: PathBuf,
    shutdown: watch::Sender<bool>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        let (shutdown, _rx) = watch::channel(false);
        Self {
            socket_path,
            shutdown,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Get the default socket path based on XDG_RUNTIME_DIR or fallback.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(xdg_runtime) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(xdg_runtime).join("chatrelay.sock")
        } else {
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/chatrelay-{}.sock", uid))
        }
    }

    /// Accept connections until [`IpcServer::stop`] is called.
    pub async fn start(&self, handler: Arc<dyn CommandHandler>) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ChatRelayError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ChatRelayError::IpcSocket {
                message: format!("Failed to bind to socket: {}", e),
            })?;
        tracing::info!(socket = %self.socket_path.display(), "IPC server listening");

        let mut shutdown = self.shutdown.subscribe();
        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.wait_for(|stop| *stop) => break,
            };

            match accepted {
                Ok((stream, _)) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler.as_ref()).await {
                            tracing::warn!(error = %e, "IPC client error");
                        }
                    });
                }
                Err(e) => {
                    return Err(ChatRelayError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
            }
        }

        tracing::debug!("IPC server stopped accepting");
        Ok(())
    }

    /// Stop accepting and remove the socket file.
    pub fn stop(&self) -> Result<()> {
        self.shutdown.send_replace(true);

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ChatRelayError::IpcSocket {
                message: format!("Failed to remove socket file: {}", e),
            })?;
        }

        Ok(())
    }
}

/// Handle a single client connection.
///
/// A command that does not parse is answered with [`Response::Error`].
async fn handle_client(stream: UnixStream, handler: &dyn CommandHandler) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reader
        .read_line(&mut line)
        .await
        .map_err(|e| ChatRelayError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    let response = match Command::from_json(line.trim()) {
        Ok(command) => {
            tracing::debug!(?command, "IPC command");
            handler.handle(command).await
        }
        Err(e) => Response::error(format!("Failed to parse command: {}", e)),
    };

    let mut response_json = response.to_json().map_err(|e| ChatRelayError::IpcProtocol {
        message: format!("Failed to serialize response: {}", e),
    })?;
    response_json.push('\n');

    writer
        .write_all(response_json.as_bytes())
        .await
        .map_err(|e| ChatRelayError::IpcConnection {
            message: format!("Failed to write to client: {}", e),
        })?;
    writer
        .flush()
        .await
        .map_err(|e| ChatRelayError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    Ok(())
}
