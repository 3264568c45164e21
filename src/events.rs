// View-state change events for frontend notification
// Defines event payloads and emission traits for testability

use serde::Serialize;

use crate::auth::SessionStatus;
use crate::engine::{EventRecord, Topic};

/// Event names as constants for consistency
pub mod event_names {
    pub const SESSION_CHANGED: &str = "session_changed";
    pub const TOPICS_UPDATED: &str = "topics_updated";
    pub const SELECTION_CHANGED: &str = "selection_changed";
    pub const HEADERS_UPDATED: &str = "headers_updated";
    pub const EVENTS_UPDATED: &str = "events_updated";
    pub const ERROR_CHANGED: &str = "error_changed";
    pub const LOADING_CHANGED: &str = "loading_changed";
}

/// Payload for session_changed event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionChangedPayload {
    /// New session status
    pub status: SessionStatus,
    /// Signed-in user's email, when known
    pub email: Option<String>,
}

/// Payload for topics_updated event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicsUpdatedPayload {
    pub topics: Vec<Topic>,
}

/// Payload for selection_changed event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChangedPayload {
    /// Title of the newly selected topic, None when selection was cleared
    pub selected: Option<String>,
}

/// Payload for headers_updated event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeadersUpdatedPayload {
    pub topic: String,
    pub headers: Vec<String>,
}

/// Payload for events_updated event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventsUpdatedPayload {
    pub topic: String,
    pub events: Vec<EventRecord>,
}

/// Payload for error_changed event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorChangedPayload {
    /// Current user-facing message, None when the error was dismissed
    pub message: Option<String>,
}

/// Which loading flag changed
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadingKind {
    Initial,
    Topics,
    Headers,
    Events,
}

/// Payload for loading_changed event
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadingChangedPayload {
    pub kind: LoadingKind,
    pub active: bool,
}

/// Trait for emitting session lifecycle events
/// Allows mocking in tests while wiring a real frontend bridge in production
pub trait SessionEventEmitter: Send + Sync {
    /// Emit session_changed event
    fn emit_session_changed(&self, payload: SessionChangedPayload);
}

/// Trait for emitting view-state events
/// Allows mocking in tests while wiring a real frontend bridge in production
pub trait ViewEventEmitter: Send + Sync {
    /// Emit topics_updated event
    fn emit_topics_updated(&self, payload: TopicsUpdatedPayload);

    /// Emit selection_changed event
    fn emit_selection_changed(&self, payload: SelectionChangedPayload);

    /// Emit headers_updated event
    fn emit_headers_updated(&self, payload: HeadersUpdatedPayload);

    /// Emit events_updated event
    fn emit_events_updated(&self, payload: EventsUpdatedPayload);

    /// Emit error_changed event
    fn emit_error_changed(&self, payload: ErrorChangedPayload);

    /// Emit loading_changed event
    fn emit_loading_changed(&self, payload: LoadingChangedPayload);
}

/// Default emitter that logs every event at debug level.
///
/// Useful for headless runs and as a stand-in until a frontend bridge is
/// attached.
pub struct LogEmitter;

impl SessionEventEmitter for LogEmitter {
    fn emit_session_changed(&self, payload: SessionChangedPayload) {
        crate::debug!("{}: {:?}", event_names::SESSION_CHANGED, payload);
    }
}

impl ViewEventEmitter for LogEmitter {
    fn emit_topics_updated(&self, payload: TopicsUpdatedPayload) {
        crate::debug!("{}: {} topics", event_names::TOPICS_UPDATED, payload.topics.len());
    }

    fn emit_selection_changed(&self, payload: SelectionChangedPayload) {
        crate::debug!("{}: {:?}", event_names::SELECTION_CHANGED, payload.selected);
    }

    fn emit_headers_updated(&self, payload: HeadersUpdatedPayload) {
        crate::debug!(
            "{}: {} ({} columns)",
            event_names::HEADERS_UPDATED,
            payload.topic,
            payload.headers.len()
        );
    }

    fn emit_events_updated(&self, payload: EventsUpdatedPayload) {
        crate::debug!(
            "{}: {} ({} events)",
            event_names::EVENTS_UPDATED,
            payload.topic,
            payload.events.len()
        );
    }

    fn emit_error_changed(&self, payload: ErrorChangedPayload) {
        crate::debug!("{}: {:?}", event_names::ERROR_CHANGED, payload.message);
    }

    fn emit_loading_changed(&self, payload: LoadingChangedPayload) {
        crate::debug!(
            "{}: {:?} -> {}",
            event_names::LOADING_CHANGED,
            payload.kind,
            payload.active
        );
    }
}

#[cfg(test)]
#[path = "events_test.rs"]
pub(crate) mod tests;
