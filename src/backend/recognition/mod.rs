//! Recognition backends and their host service.

pub mod clip;
pub mod openai;
pub mod service;

use crate::config::RecognitionConfig;

pub use service::RecognitionService;

/// A speech recognition variant fed with audio clips.
#[async_trait::async_trait]
pub trait RecognitionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validate options and report `on_start`, or `on_stop` with a reason.
    async fn start(&self, config: &RecognitionConfig);

    /// Stop recognizing and report `on_stop`.
    async fn stop(&self);

    /// Release resources. No callbacks.
    async fn dispose(&self);

    /// Recognize one clip of 16 kHz mono samples.
    async fn feed(&self, samples: Vec<i16>);
}
