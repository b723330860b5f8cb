//! Translation backends and their host service.

pub mod azure;
pub mod openai;
pub mod service;

use super::{RequestId, TranslationReceiver};
use crate::config::TranslationConfig;
use crate::events::{TextEvent, TextEventType};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub use service::TranslationService;

/// A translation variant.
///
/// `translate` may be called again before an earlier call finished; the host
/// sorts out which answer is current.
#[async_trait::async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Name used in logs and stop reasons.
    fn name(&self) -> &'static str;

    /// Validate options and report `on_start`, or `on_stop` with a reason.
    async fn start(&self, config: &TranslationConfig);

    /// Stop translating and report `on_stop`.
    async fn stop(&self);

    /// Release resources. No callbacks.
    async fn dispose(&self);

    /// Translate `event`, reporting the answer tagged with `id`.
    async fn translate(&self, id: RequestId, event: TextEvent);
}

/// Mock translator for testing
///
/// Answers every request with `"<prefix><text>"` after an optional delay.
pub struct MockTranslator {
    receiver: Arc<dyn TranslationReceiver>,
    prefix: String,
    delay: Duration,
    skip_interim: bool,
    fail_start: bool,
    started: AtomicBool,
}

impl MockTranslator {
    pub fn new(receiver: Arc<dyn TranslationReceiver>) -> Self {
        Self {
            receiver,
            prefix: "translated: ".to_string(),
            delay: Duration::ZERO,
            skip_interim: false,
            fail_start: false,
            started: AtomicBool::new(false),
        }
    }

    /// Configure the text put in front of every answer
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Configure how long each answer takes
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Ignore interim events
    pub fn final_only(mut self) -> Self {
        self.skip_interim = true;
        self
    }

    /// Refuse to start, as if options were missing
    pub fn with_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

#[async_trait::async_trait]
impl TranslationBackend for MockTranslator {
    fn name(&self) -> &'static str {
        "Mock translator"
    }

    async fn start(&self, _config: &TranslationConfig) {
        if self.fail_start {
            self.receiver
                .on_stop(Some(super::options_missing_reason(self.name(), &["key"])));
            return;
        }
        self.started.store(true, Ordering::SeqCst);
        self.receiver.on_start();
    }

    async fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
        self.receiver.on_stop(None);
    }

    async fn dispose(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    async fn translate(&self, id: RequestId, event: TextEvent) {
        if !self.started.load(Ordering::SeqCst)
            || (self.skip_interim && event.kind == TextEventType::Interim)
        {
            return;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let translated = format!("{}{}", self.prefix, event.value);
        self.receiver.on_translation(id, &event, translated);
    }
}
