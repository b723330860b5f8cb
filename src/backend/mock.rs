//! Recording receiver for testing backends.

use super::{BackendReceiver, RecognitionReceiver, RequestId, TranslationReceiver};
use crate::events::TextEvent;
use std::sync::Mutex;

/// One callback observed by a [`RecordingReceiver`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReceivedCall {
    Start,
    Stop(Option<String>),
    Interim(String),
    Final(String),
    Translation {
        id: RequestId,
        original: TextEvent,
        translated: String,
    },
}

/// Receiver that records every callback in order
#[derive(Debug, Default)]
pub struct RecordingReceiver {
    calls: Mutex<Vec<ReceivedCall>>,
}

impl RecordingReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ReceivedCall> {
        self.lock().clone()
    }

    /// Translated texts in arrival order.
    pub fn translations(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                ReceivedCall::Translation { translated, .. } => Some(translated.clone()),
                _ => None,
            })
            .collect()
    }

    /// Final recognition results in arrival order.
    pub fn finals(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                ReceivedCall::Final(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Reason of the most recent stop, if any stop happened.
    pub fn last_stop(&self) -> Option<Option<String>> {
        self.lock().iter().rev().find_map(|call| match call {
            ReceivedCall::Stop(reason) => Some(reason.clone()),
            _ => None,
        })
    }

    fn push(&self, call: ReceivedCall) {
        self.lock().push(call);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ReceivedCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BackendReceiver for RecordingReceiver {
    fn on_start(&self) {
        self.push(ReceivedCall::Start);
    }

    fn on_stop(&self, error: Option<String>) {
        self.push(ReceivedCall::Stop(error));
    }
}

impl RecognitionReceiver for RecordingReceiver {
    fn on_interim(&self, text: &str) {
        self.push(ReceivedCall::Interim(text.to_string()));
    }

    fn on_final(&self, text: &str) {
        self.push(ReceivedCall::Final(text.to_string()));
    }
}

impl TranslationReceiver for RecordingReceiver {
    fn on_translation(&self, id: RequestId, original: &TextEvent, translated: String) {
        self.push(ReceivedCall::Translation {
            id,
            original: original.clone(),
            translated,
        });
    }
}
