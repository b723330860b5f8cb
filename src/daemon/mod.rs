//! Daemon mode: wires the relay together and serves IPC commands.

pub mod handler;

use crate::backend::recognition::service::RecognitionService;
use crate::backend::translation::service::TranslationService;
use crate::config::{ConfigStore, SharedConfig};
use crate::defaults;
use crate::delivery::DeliveryQueue;
use crate::error::{ChatRelayError, Result};
use crate::events::EventBus;
use crate::ipc::server::IpcServer;
use crate::platform::{BilibiliClient, PlatformApi};
use crate::router;
use crate::session::SessionController;
use crate::session::surface::{SurfaceLauncher, TerminalLauncher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Everything the daemon owns for its lifetime.
pub struct DaemonState {
    pub config: Arc<SharedConfig>,
    pub bus: EventBus,
    pub session: Arc<SessionController>,
    pub translation: Arc<TranslationService>,
    pub recognition: Arc<RecognitionService>,
    shutdown: watch::Sender<bool>,
}

impl DaemonState {
    pub fn new(
        config: Arc<SharedConfig>,
        platform: Arc<dyn PlatformApi>,
        launcher: Arc<dyn SurfaceLauncher>,
        http: reqwest::Client,
    ) -> Self {
        let bus = EventBus::new();
        let store: Arc<dyn ConfigStore> = config.clone();
        let queue = Arc::new(DeliveryQueue::new(platform.clone(), store.clone()));
        let session = SessionController::new(platform, store.clone(), queue, launcher);
        let translation = Arc::new(TranslationService::new(
            store.clone(),
            bus.clone(),
            http.clone(),
        ));
        let recognition = Arc::new(RecognitionService::new(store, bus.clone(), http));
        let (shutdown, _rx) = watch::channel(false);

        Self {
            config,
            bus,
            session,
            translation,
            recognition,
            shutdown,
        }
    }

    /// Start the long-running tasks and restore the previous session.
    pub async fn start(&self) -> Vec<JoinHandle<()>> {
        let store: Arc<dyn ConfigStore> = self.config.clone();
        let tasks = vec![
            router::spawn(&self.bus, store, self.session.clone()),
            self.translation.spawn(),
            spawn_enable_watcher(&self.config, self.session.clone()),
        ];
        self.recognition.init().await;

        match self.session.restore().await {
            Ok(true) => tracing::info!("previous session restored"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "could not restore previous session"),
        }
        tasks
    }

    /// Ask [`run_daemon`] to exit.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_requested(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Stop backends and go offline.
    pub async fn stop(&self) {
        self.translation.stop().await;
        self.recognition.stop().await;
        self.session.disconnect().await;
    }
}

/// Follow `chat.enable` flips in the live configuration.
fn spawn_enable_watcher(config: &SharedConfig, session: Arc<SessionController>) -> JoinHandle<()> {
    let mut rx = config.subscribe();
    let mut enabled = rx.borrow_and_update().chat.enable;
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let now = rx.borrow_and_update().chat.enable;
            if now == enabled {
                continue;
            }
            enabled = now;
            tracing::info!(enabled, "chat switch changed");
            if let Err(e) = session.on_chat_enable_changed(enabled).await {
                tracing::warn!(error = %e, "could not follow chat switch");
            }
        }
    })
}

/// Run the daemon until SIGINT, SIGTERM or a `shutdown` command.
pub async fn run_daemon(config: Arc<SharedConfig>, socket_path: Option<PathBuf>) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(defaults::HTTP_TIMEOUT)
        .build()?;
    let platform: Arc<dyn PlatformApi> = Arc::new(BilibiliClient::new()?);
    let state = Arc::new(DaemonState::new(
        config,
        platform,
        Arc::new(TerminalLauncher),
        http,
    ));
    let tasks = state.start().await;

    let socket_path = socket_path.unwrap_or_else(IpcServer::default_socket_path);
    let server = Arc::new(IpcServer::new(socket_path));
    let handler = Arc::new(handler::DaemonCommandHandler::new(Arc::clone(&state)));
    let server_handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.start(handler).await })
    };
    tracing::info!(socket = %server.socket_path().display(), "daemon ready");

    let mut shutdown = state.shutdown_requested();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                tracing::error!(error = %e, "signal handler failed");
            }
            tracing::info!("received SIGTERM, shutting down");
        }
        _ = shutdown.wait_for(|stop| *stop) => {
            tracing::info!("shutdown requested over IPC");
        }
    }

    server.stop()?;
    match server_handle.await {
        Ok(Err(e)) => tracing::error!(error = %e, "IPC server failed"),
        Err(e) => tracing::error!(error = %e, "IPC server task failed"),
        Ok(Ok(())) => {}
    }

    state.stop().await;
    for task in tasks {
        task.abort();
    }
    tracing::info!("daemon stopped");
    Ok(())
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
        ChatRelayError::Other(format!("Failed to register SIGTERM handler: {}", e))
    })?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await
}
