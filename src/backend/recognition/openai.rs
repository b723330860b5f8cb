//! OpenAI-compatible audio transcription backend.
//!
//! Each clip is encoded as WAV and posted to `/audio/transcriptions`. A
//! watchdog stops the backend once no clip has arrived for the configured
//! silence timeout.

use super::RecognitionBackend;
use super::clip::encode_wav;
use crate::backend::{RecognitionReceiver, missing_options, options_missing_reason};
use crate::config::{OpenAiRecognitionConfig, RecognitionConfig};
use crate::defaults;
use crate::error::{ChatRelayError, Result};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const BACKEND: &str = "OpenAI STT";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

struct Inner {
    receiver: Arc<dyn RecognitionReceiver>,
    http: reqwest::Client,
    options: RwLock<Option<OpenAiRecognitionConfig>>,
    last_clip: Mutex<Instant>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

pub struct OpenAiRecognizer {
    inner: Arc<Inner>,
}

impl OpenAiRecognizer {
    pub fn new(receiver: Arc<dyn RecognitionReceiver>, http: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                receiver,
                http,
                options: RwLock::new(None),
                last_clip: Mutex::new(Instant::now()),
                watchdog: Mutex::new(None),
            }),
        }
    }

    /// Transcribe one clip and return the trimmed text.
    pub async fn request(&self, options: &OpenAiRecognitionConfig, samples: &[i16]) -> Result<String> {
        let base_url = if options.base_url.trim().is_empty() {
            defaults::OPENAI_BASE_URL
        } else {
            options.base_url.trim_end_matches('/')
        };
        let model = if options.model.trim().is_empty() {
            defaults::OPENAI_TRANSCRIPTION_MODEL.to_string()
        } else {
            options.model.clone()
        };

        let file = reqwest::multipart::Part::bytes(encode_wav(samples)?)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", model);

        let response = self
            .inner
            .http
            .post(format!("{base_url}/audio/transcriptions"))
            .bearer_auth(&options.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatRelayError::Backend {
                backend: BACKEND,
                message: format!("HTTP status {}", status),
            });
        }
        let parsed: TranscriptionResponse = response.json().await?;
        Ok(parsed.text.trim().to_string())
    }
}

impl Inner {
    fn touch(&self) {
        *self.last_clip.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn last_clip(&self) -> Instant {
        *self.last_clip.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn abort_watchdog(&self) {
        if let Some(handle) = self.watchdog.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    /// Stop the backend if no clip arrived within `timeout`.
    fn spawn_watchdog(self: &Arc<Self>, timeout: std::time::Duration) {
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let deadline = inner.last_clip() + timeout;
                tokio::time::sleep_until(deadline).await;
                if inner.last_clip() + timeout <= Instant::now() {
                    break;
                }
            }
            tracing::info!(timeout_secs = timeout.as_secs(), "no audio within silence timeout");
            inner.options.write().await.take();
            inner.watchdog.lock().unwrap_or_else(|e| e.into_inner()).take();
            inner.receiver.on_stop(None);
        });
        *self.watchdog.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for OpenAiRecognizer {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn start(&self, config: &RecognitionConfig) {
        let options = &config.openai;
        let missing = missing_options(&[("api_key", &options.api_key)]);
        if !missing.is_empty() {
            self.inner
                .receiver
                .on_stop(Some(options_missing_reason(BACKEND, &missing)));
            return;
        }
        *self.inner.options.write().await = Some(options.clone());
        self.inner.touch();
        self.inner.abort_watchdog();
        self.inner.spawn_watchdog(options.silence_timeout());
        self.inner.receiver.on_start();
    }

    async fn stop(&self) {
        self.inner.abort_watchdog();
        self.inner.options.write().await.take();
        self.inner.receiver.on_stop(None);
    }

    async fn dispose(&self) {
        self.inner.abort_watchdog();
        self.inner.options.write().await.take();
    }

    #[tracing::instrument(skip_all, fields(samples = samples.len()))]
    async fn feed(&self, samples: Vec<i16>) {
        let Some(options) = self.inner.options.read().await.clone() else {
            return;
        };
        if samples.is_empty() {
            return;
        }
        self.inner.touch();
        match self.request(&options, &samples).await {
            Ok(text) if !text.is_empty() => self.inner.receiver.on_final(&text),
            Ok(_) => tracing::debug!("clip produced no text"),
            Err(e) => tracing::warn!(error = %e, "transcription request failed"),
        }
    }
}
