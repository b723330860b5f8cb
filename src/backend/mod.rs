//! Pluggable recognition and translation backends.
//!
//! Every backend variant follows the same lifecycle: `start` validates its
//! options and reports through [`BackendReceiver::on_start`] or
//! [`BackendReceiver::on_stop`], `stop` ends the ongoing work and reports
//! `on_stop`, and `dispose` releases held resources without any callback.
//!
//! Variants are selected through the typed kinds in [`registry`], so callers
//! never branch on which backend is active.

pub mod mock;
pub mod recognition;
pub mod registry;
pub mod stale;
pub mod translation;

use crate::events::TextEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use registry::{
    RecognitionBackendKind, TranslationBackendKind, create_recognition_backend,
    create_translation_backend,
};
pub use stale::{RequestId, RequestTracker};

/// Lifecycle callbacks shared by every backend variant.
pub trait BackendReceiver: Send + Sync {
    /// The backend is up and accepting work.
    fn on_start(&self);

    /// The backend stopped. `error` is set when it stopped because of a failure
    /// (including missing options at start).
    fn on_stop(&self, error: Option<String>);
}

/// Callbacks for speech recognition results.
pub trait RecognitionReceiver: BackendReceiver {
    /// A partial hypothesis that may still change.
    fn on_interim(&self, text: &str);

    /// A settled recognition result.
    fn on_final(&self, text: &str);
}

/// Callbacks for translation results.
pub trait TranslationReceiver: BackendReceiver {
    /// Answer to request `id`, which was issued for `original`.
    fn on_translation(&self, id: RequestId, original: &TextEvent, translated: String);
}

/// Connection state of a backend host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Snapshot of a backend host for observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackendState {
    pub status: BackendStatus,
    /// Reason of the last failed start or stop.
    pub error: Option<String>,
}

/// Status cell shared by a host and the receiver it hands to its backend.
#[derive(Debug)]
pub struct BackendStateCell {
    tx: watch::Sender<BackendState>,
}

impl Default for BackendStateCell {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(BackendState::default());
        Self { tx }
    }
}

impl BackendStateCell {
    pub fn snapshot(&self) -> BackendState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BackendState> {
        self.tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.tx.borrow().status == BackendStatus::Connected
    }

    /// A start is in progress; clears the previous error.
    pub fn connecting(&self) {
        self.tx.send_replace(BackendState {
            status: BackendStatus::Connecting,
            error: None,
        });
    }

    pub fn started(&self) {
        self.tx
            .send_modify(|state| state.status = BackendStatus::Connected);
    }

    pub fn stopped(&self, error: Option<String>) {
        self.tx.send_modify(|state| {
            state.status = BackendStatus::Disconnected;
            if error.is_some() {
                state.error = error;
            }
        });
    }
}

/// Collect the names of empty required options.
///
/// Backends call this at `start` and refuse to run when anything is listed.
pub fn missing_options<'a>(required: &[(&'a str, &str)]) -> Vec<&'a str> {
    required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect()
}

/// Stop reason reported when required options are empty.
pub fn options_missing_reason(backend: &str, missing: &[&str]) -> String {
    format!("[{}] options missing: {}", backend, missing.join(", "))
}
