//! Text events and the in-process event bus.
//!
//! Recognition, translation and manual input all publish [`TextEvent`]s here;
//! the subscription router and the translation host consume them.

use crate::defaults;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Whether a text event is a partial hypothesis or a settled result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEventType {
    Interim,
    Final,
}

/// Named producer of text events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextEventSource {
    /// Speech recognition output.
    #[default]
    Stt,
    /// Translation output.
    Translation,
    /// Text typed by the operator.
    Input,
}

impl std::fmt::Display for TextEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TextEventSource::Stt => "stt",
            TextEventSource::Translation => "translation",
            TextEventSource::Input => "input",
        };
        f.write_str(name)
    }
}

/// A single piece of text flowing through the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEvent {
    #[serde(rename = "type")]
    pub kind: TextEventType,
    pub value: String,
}

impl TextEvent {
    pub fn interim(value: impl Into<String>) -> Self {
        Self {
            kind: TextEventType::Interim,
            value: value.into(),
        }
    }

    pub fn final_text(value: impl Into<String>) -> Self {
        Self {
            kind: TextEventType::Final,
            value: value.into(),
        }
    }

    pub fn is_final(&self) -> bool {
        self.kind == TextEventType::Final
    }
}

/// A text event tagged with the source that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedEvent {
    pub source: TextEventSource,
    pub event: TextEvent,
}

/// Broadcast bus shared by every producer and consumer of text events.
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SourcedEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(defaults::EVENT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Returns the number of subscribers that will see it.
    pub fn publish(&self, source: TextEventSource, event: TextEvent) -> usize {
        tracing::trace!(%source, kind = ?event.kind, value = %event.value, "bus publish");
        // No receivers is fine: nobody is listening to this source yet.
        self.tx.send(SourcedEvent { source, event }).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SourcedEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
