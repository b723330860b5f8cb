//! Subscription router: decides which bus events become chat messages.
//!
//! Two paths feed the delivery queue. The *source* path carries final events
//! of the configured `chat.post_source`; the *input* path carries text typed
//! by the operator and is active only with `chat.post_input`. Both go through
//! the same [`route`] decision.

use crate::config::{ChatConfig, ConfigStore, LiveGatePolicy};
use crate::events::{EventBus, SourcedEvent, TextEvent, TextEventSource};
use crate::session::{SessionController, SessionStatus};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePath {
    Source,
    Input,
}

/// Why an event was not posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Input path while `post_input` is off.
    InputDisabled,
    /// Live gate on and the session is not connected.
    NotLive,
    NotFinal,
    Empty,
    ChatDisabled,
    PostingDisabled,
    NoRoom,
    /// The live flag is on and the observed policy refuses to post.
    LiveFlagSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Enqueue,
    Discard(DiscardReason),
}

/// Pick the path for an event from `source`, if any.
///
/// An event from the configured post source always takes the source path,
/// even when that source is `input`, so no event is posted twice.
pub fn path_for(source: TextEventSource, config: &ChatConfig) -> Option<RoutePath> {
    if source == config.post_source {
        Some(RoutePath::Source)
    } else if source == TextEventSource::Input {
        Some(RoutePath::Input)
    } else {
        None
    }
}

pub fn route(
    path: RoutePath,
    event: &TextEvent,
    config: &ChatConfig,
    status: SessionStatus,
) -> RouteDecision {
    use DiscardReason::*;

    if path == RoutePath::Input && !config.post_input {
        return RouteDecision::Discard(InputDisabled);
    }
    if config.post_live && status != SessionStatus::Connected {
        return RouteDecision::Discard(NotLive);
    }
    if !event.is_final() {
        return RouteDecision::Discard(NotFinal);
    }
    if event.value.is_empty() {
        return RouteDecision::Discard(Empty);
    }
    if !config.enable {
        return RouteDecision::Discard(ChatDisabled);
    }
    if !config.post_enable {
        return RouteDecision::Discard(PostingDisabled);
    }
    if config.room_id.is_empty() {
        return RouteDecision::Discard(NoRoom);
    }
    if config.post_live && config.live_gate == LiveGatePolicy::Observed {
        return RouteDecision::Discard(LiveFlagSet);
    }
    RouteDecision::Enqueue
}

/// Subscribe to the bus and enqueue every event [`route`] accepts.
///
/// Configuration and session status are read per event.
pub fn spawn(
    bus: &EventBus,
    config: Arc<dyn ConfigStore>,
    session: Arc<SessionController>,
) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let SourcedEvent { source, event } = match events.recv().await {
                Ok(sourced) => sourced,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "router fell behind, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let chat = config.config().chat;
            let Some(path) = path_for(source, &chat) else {
                continue;
            };
            match route(path, &event, &chat, session.status()) {
                RouteDecision::Enqueue => {
                    let pieces = session.queue().enqueue(&event.value).await;
                    tracing::debug!(?path, %source, pieces, "event queued for chat");
                }
                RouteDecision::Discard(reason) => {
                    tracing::trace!(?path, %source, ?reason, "event not posted");
                }
            }
        }
        tracing::debug!("event bus closed, router exiting");
    })
}
