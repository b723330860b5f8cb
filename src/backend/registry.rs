//! Typed backend registry.
//!
//! Config names a backend through one of the kinds below; the `create_*`
//! functions are the single place that maps a kind to its implementation.

use super::recognition::{RecognitionBackend, openai::OpenAiRecognizer};
use super::translation::{TranslationBackend, azure::AzureTranslator, openai::OpenAiTranslator};
use super::{RecognitionReceiver, TranslationReceiver};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TranslationBackendKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[default]
    #[serde(rename = "azure")]
    Azure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RecognitionBackendKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
}

impl TranslationBackendKind {
    pub const ALL: [TranslationBackendKind; 2] =
        [TranslationBackendKind::OpenAi, TranslationBackendKind::Azure];

    pub fn name(self) -> &'static str {
        match self {
            TranslationBackendKind::OpenAi => "openai",
            TranslationBackendKind::Azure => "azure",
        }
    }
}

impl RecognitionBackendKind {
    pub fn name(self) -> &'static str {
        match self {
            RecognitionBackendKind::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for TranslationBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::fmt::Display for RecognitionBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the translation backend for `kind`, reporting to `receiver`.
pub fn create_translation_backend(
    kind: TranslationBackendKind,
    receiver: Arc<dyn TranslationReceiver>,
    http: reqwest::Client,
) -> Box<dyn TranslationBackend> {
    match kind {
        TranslationBackendKind::OpenAi => Box::new(OpenAiTranslator::new(receiver, http)),
        TranslationBackendKind::Azure => Box::new(AzureTranslator::new(receiver, http)),
    }
}

/// Build the recognition backend for `kind`, reporting to `receiver`.
pub fn create_recognition_backend(
    kind: RecognitionBackendKind,
    receiver: Arc<dyn RecognitionReceiver>,
    http: reqwest::Client,
) -> Box<dyn RecognitionBackend> {
    match kind {
        RecognitionBackendKind::OpenAi => Box::new(OpenAiRecognizer::new(receiver, http)),
    }
}
