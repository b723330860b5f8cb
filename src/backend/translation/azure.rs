//! Azure Translator (v3) backend.

use super::TranslationBackend;
use crate::backend::{RequestId, TranslationReceiver, missing_options, options_missing_reason};
use crate::config::{AzureTranslationConfig, TranslationConfig};
use crate::defaults;
use crate::error::{ChatRelayError, Result};
use crate::events::{TextEvent, TextEventType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

const BACKEND: &str = "Azure translator";
const API_VERSION: &str = "3.0";

#[derive(Debug, Serialize)]
struct TranslateItem<'a> {
    #[serde(rename = "Text")]
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResult {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

pub struct AzureTranslator {
    receiver: Arc<dyn TranslationReceiver>,
    http: reqwest::Client,
    options: RwLock<Option<AzureTranslationConfig>>,
}

impl AzureTranslator {
    pub fn new(receiver: Arc<dyn TranslationReceiver>, http: reqwest::Client) -> Self {
        Self {
            receiver,
            http,
            options: RwLock::new(None),
        }
    }

    pub async fn request(&self, options: &AzureTranslationConfig, text: &str) -> Result<String> {
        let endpoint = if options.endpoint.trim().is_empty() {
            defaults::AZURE_TRANSLATOR_ENDPOINT
        } else {
            options.endpoint.trim_end_matches('/')
        };

        let mut query = vec![
            ("api-version", API_VERSION),
            ("to", options.language.as_str()),
            ("profanityAction", options.profanity.as_str()),
        ];
        if !options.language_from.trim().is_empty() {
            query.push(("from", options.language_from.as_str()));
        }

        let response = self
            .http
            .post(format!("{endpoint}/translate"))
            .query(&query)
            .header("Ocp-Apim-Subscription-Key", &options.key)
            .header("Ocp-Apim-Subscription-Region", &options.location)
            .json(&[TranslateItem { text }])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatRelayError::Backend {
                backend: BACKEND,
                message: format!("HTTP status {}", status),
            });
        }

        let results: Vec<TranslateResult> = response.json().await?;
        results
            .into_iter()
            .next()
            .and_then(|result| result.translations.into_iter().next())
            .map(|translation| translation.text)
            .ok_or_else(|| ChatRelayError::Backend {
                backend: BACKEND,
                message: "response contained no translations".to_string(),
            })
    }
}

#[async_trait::async_trait]
impl TranslationBackend for AzureTranslator {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn start(&self, config: &TranslationConfig) {
        let options = &config.azure;
        let missing = missing_options(&[
            ("key", &options.key),
            ("location", &options.location),
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
