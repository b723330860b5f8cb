//! Host for the active recognition backend.
//!
//! Results are published on the bus as `stt` events.

use super::RecognitionBackend;
use super::clip::split_clips;
use crate::backend::{
    BackendReceiver, BackendState, BackendStateCell, RecognitionBackendKind, RecognitionReceiver,
    create_recognition_backend,
};
use crate::config::ConfigStore;
use crate::events::{EventBus, TextEvent, TextEventSource};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type RecognitionFactory = Arc<
    dyn Fn(RecognitionBackendKind, Arc<dyn RecognitionReceiver>) -> Box<dyn RecognitionBackend>
        + Send
        + Sync,
>;

struct Host {
    bus: EventBus,
    state: BackendStateCell,
}

impl BackendReceiver for Host {
    fn on_start(&self) {
        tracing::info!("recognition backend started");
        self.state.started();
    }

    fn on_stop(&self, error: Option<String>) {
        match &error {
            Some(reason) => tracing::error!(%reason, "recognition backend stopped"),
            None => tracing::info!("recognition backend stopped"),
        }
        self.state.stopped(error);
    }
}

impl RecognitionReceiver for Host {
    fn on_interim(&self, text: &str) {
        self.bus
            .publish(TextEventSource::Stt, TextEvent::interim(text));
    }

    fn on_final(&self, text: &str) {
        self.bus
            .publish(TextEventSource::Stt, TextEvent::final_text(text));
    }
}

pub struct RecognitionService {
    config: Arc<dyn ConfigStore>,
    host: Arc<Host>,
    backend: Mutex<Option<Arc<dyn RecognitionBackend>>>,
    factory: RecognitionFactory,
}

impl RecognitionService {
    pub fn new(config: Arc<dyn ConfigStore>, bus: EventBus, http: reqwest::Client) -> Self {
        let factory: RecognitionFactory = Arc::new(
            move |kind: RecognitionBackendKind, receiver: Arc<dyn RecognitionReceiver>| {
                create_recognition_backend(kind, receiver, http.clone())
            },
        );
        Self::with_factory(config, bus, factory)
    }

    pub fn with_factory(
        config: Arc<dyn ConfigStore>,
        bus: EventBus,
        factory: RecognitionFactory,
    ) -> Self {
        Self {
            config,
            host: Arc::new(Host {
                bus,
                state: BackendStateCell::default(),
            }),
            backend: Mutex::new(None),
            factory,
        }
    }

    pub fn state(&self) -> BackendState {
        self.host.state.snapshot()
    }

    pub async fn start(&self) {
        self.stop().await;

        let config = self.config.config().recognition;
        let receiver: Arc<dyn RecognitionReceiver> = self.host.clone();
        let backend: Arc<dyn RecognitionBackend> =
            Arc::from((self.factory)(config.backend, receiver));
        tracing::info!(backend = backend.name(), "starting recognition backend");

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

    /// Feed audio, split into clips, in order. Returns the number of clips
    /// handed to the backend.
    pub async fn feed(&self, samples: &[i16]) -> usize {
        let mut fed = 0;
        for clip in split_clips(samples) {
            if !self.host.state.is_connected() {
                break;
            }
            let Some(backend) = self.backend.lock().await.clone() else {
                break;
            };
            backend.feed(clip.to_vec()).await;
            fed += 1;
        }
        fed
    }

    /// Start the backend when configured to auto start.
    pub async fn init(&self) {
        if self.config.config().recognition.auto_start {
            self.start().await;
        }
    }
}
