//! OpenAI-compatible chat-completions translator.

use super::TranslationBackend;
use crate::backend::{RequestId, TranslationReceiver, missing_options, options_missing_reason};
use crate::config::{OpenAiTranslationConfig, TranslationConfig};
use crate::defaults;
use crate::error::{ChatRelayError, Result};
use crate::events::{TextEvent, TextEventType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

const BACKEND: &str = "OpenAI translator";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

pub struct OpenAiTranslator {
    receiver: Arc<dyn TranslationReceiver>,
    http: reqwest::Client,
    options: RwLock<Option<OpenAiTranslationConfig>>,
}

impl OpenAiTranslator {
    pub fn new(receiver: Arc<dyn TranslationReceiver>, http: reqwest::Client) -> Self {
        Self {
            receiver,
            http,
            options: RwLock::new(None),
        }
    }

    fn user_prompt(language: &str, text: &str) -> String {
        format!(
            "Translate the following source text to {language}, Output translation directly without any additional text.\nSource Text: {text}\nTranslated Text:"
        )
    }

    /// Run one chat-completions request and return the trimmed answer.
    pub async fn request(&self, options: &OpenAiTranslationConfig, text: &str) -> Result<String> {
        let base_url = if options.base_url.trim().is_empty() {
            defaults::OPENAI_BASE_URL
        } else {
            options.base_url.trim_end_matches('/')
        };
        let model = if options.model.trim().is_empty() {
            defaults::OPENAI_TRANSLATION_MODEL
        } else {
            options.model.as_str()
        };
        let prompt = Self::user_prompt(&options.language, text);
        let body = ChatRequest {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &options.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self
            .http
            .post(format!("{base_url}/chat/completions"))
            .bearer_auth(&options.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatRelayError::Backend {
                backend: BACKEND,
                message: format!("HTTP status {}", status),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| ChatRelayError::Backend {
                backend: BACKEND,
                message: "response contained no choices".to_string(),
            })
    }
}

#[async_trait::async_trait]
impl TranslationBackend for OpenAiTranslator {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn start(&self, config: &TranslationConfig) {
        let options = &config.openai;
        let missing = missing_options(&[
            ("api_key", &options.api_key),
            ("language", &options.language),
        ]);
        if !missing.is_empty() {
            self.receiver
                .on_stop(Some(options_missing_reason(BACKEND, &missing)));
            return;
        }
        *self.options.write().await = Some(options.clone());
        self.receiver.on_start();
    }

    async fn stop(&self) {
        self.options.write().await.take();
        self.receiver.on_stop(None);
    }

    async fn dispose(&self) {
        self.options.write().await.take();
    }

    #[tracing::instrument(skip_all, fields(id = %id))]
    async fn translate(&self, id: RequestId, event: TextEvent) {
        let Some(options) = self.options.read().await.clone() else {
            return;
        };
        if event.kind == TextEventType::Interim && !options.interim {
            return;
        }
        match self.request(&options, &event.value).await {
            Ok(translated) => self.receiver.on_translation(id, &event, translated),
            Err(e) => tracing::warn!(error = %e, "translation request failed"),
        }
    }
}
