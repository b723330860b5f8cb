//! Command handler implementation for the daemon.

use crate::backend::recognition::clip::decode_wav;
use crate::daemon::DaemonState;
use crate::events::{TextEvent, TextEventSource};
use crate::ipc::protocol::{BackendTarget, Command, Response};
use crate::ipc::server::CommandHandler;
use std::path::Path;
use std::sync::Arc;

/// Command handler for daemon IPC commands.
pub struct DaemonCommandHandler {
    state: Arc<DaemonState>,
}

impl DaemonCommandHandler {
    pub fn new(state: Arc<DaemonState>) -> Self {
        Self { state }
    }

    async fn status(&self) -> Response {
        Response::Status {
            session: self.state.session.snapshot(),
            queue: self.state.session.queue().snapshot().await,
            translation: self.state.translation.state(),
            recognition: self.state.recognition.state(),
        }
    }

    fn say(&self, text: String) -> Response {
        if text.trim().is_empty() {
            return Response::error("Nothing to say");
        }
        self.state
            .bus
            .publish(TextEventSource::Input, TextEvent::final_text(text));
        Response::Ok
    }

    async fn feed(&self, path: &Path) -> Response {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Response::error(format!("Failed to read {}: {}", path.display(), e));
            }
        };
        let samples = match decode_wav(&bytes) {
            Ok(samples) => samples,
            Err(e) => return Response::error(e),
        };
        match self.state.recognition.feed(&samples).await {
            0 if !samples.is_empty() => Response::error("Recognition backend is not running"),
            clips => Response::Fed { clips },
        }
    }

    async fn start_backend(&self, backend: BackendTarget) -> Response {
        match backend {
            BackendTarget::Translation => self.state.translation.start().await,
            BackendTarget::Recognition => self.state.recognition.start().await,
        }
        let state = match backend {
            BackendTarget::Translation => self.state.translation.state(),
            BackendTarget::Recognition => self.state.recognition.state(),
        };
        match state.error {
            Some(message) => Response::Error { message },
            None => Response::Ok,
        }
    }

    async fn stop_backend(&self, backend: BackendTarget) -> Response {
        match backend {
            BackendTarget::Translation => self.state.translation.stop().await,
            BackendTarget::Recognition => self.state.recognition.stop().await,
        }
        Response::Ok
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Login => match self.state.session.login().await {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(e),
            },
            Command::Logout => {
                self.state.session.logout().await;
                Response::Ok
            }
            Command::Connect => match self.state.session.connect().await {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(e),
            },
            Command::Disconnect => {
                self.state.session.disconnect().await;
                Response::Ok
            }
            Command::Status => self.status().await,
            Command::Say { text } => self.say(text),
            Command::Feed { path } => self.feed(&path).await,
            Command::ClearQueue => {
                self.state.session.queue().clear().await;
                Response::Ok
            }
            Command::StartBackend { backend } => self.start_backend(backend).await,
            Command::StopBackend { backend } => self.stop_backend(backend).await,
            Command::Reload => match self.state.config.reload() {
                Ok(()) => Response::Ok,
                Err(e) => Response::error(format!("{:#}", e)),
            },
            Command::Shutdown => {
                self.state.request_shutdown();
                Response::Ok
            }
        }
    }
}
