//! Host for the active translation backend.
//!
//! Listens to recognition output (and operator input when enabled), hands
//! each event to the backend under a fresh request id, and republishes only
//! the answer to the most recent request as a `translation` event.

use super::TranslationBackend;
use crate::backend::{
    BackendReceiver, BackendState, BackendStateCell, RequestId, RequestTracker,
    TranslationBackendKind, TranslationReceiver, create_translation_backend,
};
use crate::config::ConfigStore;
use crate::events::{EventBus, TextEvent, TextEventSource};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;

/// Builds a backend for a kind. Swappable so tests can inject mocks.
pub type TranslationFactory = Arc<
    dyn Fn(TranslationBackendKind, Arc<dyn TranslationReceiver>) -> Box<dyn TranslationBackend>
        + Send
        + Sync,
>;

/// Receiver side of the host: applies the stale filter and publishes.
struct Host {
    bus: EventBus,
    tracker: RequestTracker,
    state: BackendStateCell,
}

impl BackendReceiver for Host {
    fn on_start(&self) {
        tracing::info!("translation backend started");
        self.state.started();
    }

    fn on_stop(&self, error: Option<String>) {
        match &error {
            Some(reason) => tracing::error!(%reason, "translation backend stopped"),
            None => tracing::info!("translation backend stopped"),
        }
        self.state.stopped(error);
    }
}

impl TranslationReceiver for Host {
    fn on_translation(&self, id: RequestId, original: &TextEvent, translated: String) {
        if !self.tracker.is_current(id) {
            tracing::debug!(%id, next = %self.tracker.next_id(), "dropping stale translation");
            return;
        }
        self.bus.publish(
            TextEventSource::Translation,
            TextEvent {
                kind: original.kind,
                value: translated,
            },
        );
    }
}

pub struct TranslationService {
    config: Arc<dyn ConfigStore>,
    host: Arc<Host>,
    backend: Mutex<Option<Arc<dyn TranslationBackend>>>,
    factory: TranslationFactory,
}

impl TranslationService {
    pub fn new(config: Arc<dyn ConfigStore>, bus: EventBus, http: reqwest::Client) -> Self {
        let factory: TranslationFactory = Arc::new(
            move |kind: TranslationBackendKind, receiver: Arc<dyn TranslationReceiver>| {
                create_translation_backend(kind, receiver, http.clone())
            },
        );
        Self::with_factory(config, bus, factory)
    }

    pub fn with_factory(
        config: Arc<dyn ConfigStore>,
        bus: EventBus,
        factory: TranslationFactory,
    ) -> Self {
        Self {
            config,
            host: Arc::new(Host {
                bus,
                tracker: RequestTracker::new(),
                state: BackendStateCell::default(),
            }),
            backend: Mutex::new(None),
            factory,
        }
    }

    pub fn state(&self) -> BackendState {
        self.host.state.snapshot()
    }

    /// (Re)start with the backend named in config.
    pub async fn start(&self) {
        self.stop().await;

        let config = self.config.config().translation;
        let receiver: Arc<dyn TranslationReceiver> = self.host.clone();
        let backend: Arc<dyn TranslationBackend> = Arc::from((self.factory)(config.backend, receiver));
        tracing::info!(backend = backend.name(), "starting translation backend");

        self.host.state.connecting();
        *self.backend.lock().await = Some(backend.clone());
        backend.start(&config).await;
    }

    pub async fn stop(&self) {
        let previous = self.backend.lock().await.take();
        if let Some(backend) = previous {
            backend.stop().await;
            backend.dispose().await;
        }
    }

    /// Send `event` to the backend under a fresh request id.
    ///
    /// Ignored unless a backend is connected. The call runs on its own task so
    /// a slow answer never holds up later events.
    pub async fn translate(&self, event: TextEvent) -> Option<RequestId> {
        if !self.host.state.is_connected() {
            return None;
        }
        let backend = self.backend.lock().await.clone()?;
        let id = self.host.tracker.issue();
        tokio::spawn(async move { backend.translate(id, event).await });
        Some(id)
    }

    /// Start when configured to, then translate bus events until aborted.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.host.bus.subscribe();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if service.config.config().translation.auto_start {
                service.start().await;
            }
            loop {
                match rx.recv().await {
                    Ok(sourced) => {
                        let wanted = match sourced.source {
                            TextEventSource::Stt => true,
                            TextEventSource::Input => service.config.config().translation.input_field,
                            TextEventSource::Translation => false,
                        };
                        if wanted {
                            service.translate(sourced.event).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "translation host lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
