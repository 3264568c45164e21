//! Schema-aware CRUD synchronization engine.
//!
//! The engine keeps the topic list, selected topic, header schema, and event
//! collection consistent with the remote store as the session and selection
//! change. It is event-driven: nothing polls, every rule runs in response to
//! a session transition or a user operation.
//!
//! Overlapping fetches are resolved with a generation counter: every
//! selection change bumps it, and a response captured under an older
//! generation is discarded instead of clobbering newer state.

pub mod view;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::auth::{SessionError, SessionManager};
use crate::config::{AppConfig, ConfigStore, EventWindow};
use crate::events::{
    ErrorChangedPayload, EventsUpdatedPayload, HeadersUpdatedPayload, LoadingChangedPayload,
    LoadingKind, SelectionChangedPayload, TopicsUpdatedPayload, ViewEventEmitter,
};
use crate::sheets::{classify, ErrorClass, ReadWindow, RemoteStore, StoreOp};

pub use view::{
    build_event_row, compose_header_row, map_event_rows, sort_events_newest_first, EventDraft,
    EventRecord, Topic, ViewState, DEFAULT_EVENT_COLUMN, TIMESTAMP_HEADER,
};

/// Errors surfaced to callers of engine operations.
///
/// Every variant's message is also recorded as the view's dismissible error,
/// so callers may ignore the Result and rely on the emitter.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Rejected before any network call.
    #[error("{0}")]
    Validation(String),

    /// A store call failed; message already classified and surfaced.
    #[error("{0}")]
    Store(String),

    #[error("not signed in")]
    NotSignedIn,

    #[error("Spreadsheet ID is not set.")]
    StoreIdMissing,
}

/// What a successful topic-list fetch decided about the selection.
enum SelectionDecision {
    /// Current selection still exists; leave it alone.
    Keep,
    /// Select this topic (or clear, when None).
    Select(Option<String>),
}

/// Orchestrates SessionManager and the remote store into consistent view
/// state.
pub struct SyncEngine {
    store: Arc<dyn RemoteStore>,
    session: Arc<SessionManager>,
    config_store: Arc<dyn ConfigStore>,
    emitter: Arc<dyn ViewEventEmitter>,
    view: Mutex<ViewState>,
    /// Bumped on every selection change, sign-out, and store-id change;
    /// fetch results from older generations are dropped.
    generation: AtomicU64,
    event_window: EventWindow,
    store_id: Mutex<Option<String>>,
}

impl SyncEngine {
    /// Build the engine. The store identifier is read from the config store
    /// once, here.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn RemoteStore>,
        session: Arc<SessionManager>,
        config_store: Arc<dyn ConfigStore>,
        emitter: Arc<dyn ViewEventEmitter>,
    ) -> Self {
        let store_id = config_store.get();
        Self {
            store,
            session,
            config_store,
            emitter,
            view: Mutex::new(ViewState::default()),
            generation: AtomicU64::new(0),
            event_window: config.event_window,
            store_id: Mutex::new(store_id),
        }
    }

    // ============================================================
    // State accessors
    // ============================================================

    pub fn store_id(&self) -> Option<String> {
        self.store_id.lock().clone()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.view.lock().topics.clone()
    }

    pub fn selected_topic(&self) -> Option<String> {
        self.view.lock().selected_topic.clone()
    }

    pub fn headers(&self) -> Vec<String> {
        self.view.lock().headers.clone()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.view.lock().events.clone()
    }

    pub fn draft(&self) -> EventDraft {
        self.view.lock().draft.clone()
    }

    /// The current dismissible error message.
    pub fn error(&self) -> Option<String> {
        self.view.lock().error.clone()
    }

    pub fn is_initial_loading(&self) -> bool {
        self.view.lock().initial_loading
    }

    // ============================================================
    // Reactive rules
    // ============================================================

    /// Rule 1: the session reached SignedIn.
    ///
    /// Fetches profile and topic list concurrently; the two are independent
    /// and a failure of one never cancels the other. The aggregate initial
    /// loading flag clears once both settle; selection fallout (rule 2)
    /// then runs under its own flags.
    pub async fn handle_signed_in(&self) {
        if self.store_id().is_none() {
            crate::debug!("Initial fetch skipped: store identifier not configured");
            return;
        }
        self.set_loading(LoadingKind::Initial, true);
        let (_, decision) = tokio::join!(self.fetch_profile(), self.fetch_topic_list(false));
        self.set_loading(LoadingKind::Initial, false);
        if let Some(SelectionDecision::Select(selection)) = decision {
            self.select_topic(selection).await;
        }
    }

    /// Rule 2: the selected topic changed.
    ///
    /// Fetches the header row and event rows concurrently under their own
    /// loading flags and clears the pending draft. Clearing the selection
    /// drops header and event state locally without a network call.
    pub async fn select_topic(&self, title: Option<String>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut view = self.view.lock();
            view.selected_topic = title.clone();
            view.draft = EventDraft::default();
        }
        self.emitter.emit_selection_changed(SelectionChangedPayload {
            selected: title.clone(),
        });

        match title {
            Some(topic) if self.session.is_signed_in() && self.store_id().is_some() => {
                tokio::join!(
                    self.fetch_headers(topic.clone(), generation),
                    self.fetch_events(topic.clone(), generation)
                );
            }
            _ => {
                let mut view = self.view.lock();
                view.headers.clear();
                view.events.clear();
                view.fetching_headers = false;
                view.fetching_events = false;
            }
        }
    }

    /// Manual topic-list refresh, using the topics loading flag.
    pub async fn refresh_topics(&self) {
        if let Some(SelectionDecision::Select(selection)) = self.fetch_topic_list(true).await {
            self.select_topic(selection).await;
        }
    }

    /// Sign out and clear every piece of derived state.
    pub async fn sign_out(&self) {
        self.session.sign_out().await;
        self.handle_signed_out();
    }

    /// Clear all derived state after the session left SignedIn.
    pub fn handle_signed_out(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut view = self.view.lock();
            view.clear_derived();
            view.error = None;
            view.initial_loading = false;
            view.fetching_topics = false;
            view.fetching_headers = false;
            view.fetching_events = false;
        }
        self.emitter
            .emit_topics_updated(TopicsUpdatedPayload { topics: vec![] });
        self.emitter
            .emit_selection_changed(SelectionChangedPayload { selected: None });
        self.emitter
            .emit_error_changed(ErrorChangedPayload { message: None });
    }

    // ============================================================
    // User operations
    // ============================================================

    /// Rule 3: create a topic.
    ///
    /// Title uniqueness is checked against the in-memory collection before
    /// any network call. On success the topic joins the collection and
    /// becomes the selection.
    pub async fn create_topic(&self, name: &str, columns: &str) -> Result<(), EngineError> {
        let title = name.trim().to_string();
        let (token, store_id) = self.require_session()?;

        if title.is_empty() {
            return Err(self.validation_error("Topic name cannot be empty."));
        }
        if self.view.lock().topics.iter().any(|t| t.title == title) {
            return Err(self.validation_error(format!("Topic \"{title}\" already exists.")));
        }

        let header_row = compose_header_row(columns);
        self.clear_error();
        self.set_loading(LoadingKind::Initial, true);
        let result = self
            .store
            .create_topic(&token, &store_id, &title, &header_row)
            .await;
        self.set_loading(LoadingKind::Initial, false);

        match result {
            Ok(sheet_id) => {
                {
                    let mut view = self.view.lock();
                    view.topics.push(Topic {
                        title: title.clone(),
                        sheet_id,
                    });
                }
                self.emitter.emit_topics_updated(TopicsUpdatedPayload {
                    topics: self.topics(),
                });
                self.select_topic(Some(title)).await;
                Ok(())
            }
            Err(err) => {
                Err(self
                    .handle_store_error(err, StoreOp::CreateTopic, "adding topic")
                    .await)
            }
        }
    }

    /// Update one draft field by header name.
    pub fn update_draft_field(&self, header: &str, value: &str) {
        let mut view = self.view.lock();
        view.draft
            .fields
            .insert(header.to_string(), value.to_string());
    }

    /// Set the draft's custom timestamp (blank means "now").
    pub fn set_draft_timestamp(&self, value: &str) {
        self.view.lock().draft.custom_timestamp = value.to_string();
    }

    /// Discard the pending draft.
    pub fn cancel_draft(&self) {
        self.view.lock().draft = EventDraft::default();
    }

    /// Rule 4: append the drafted event to the selected topic.
    ///
    /// Validation happens before any network call. On success the event
    /// collection is re-fetched; the store owns row numbering, so there is
    /// no optimistic local insert.
    pub async fn submit_event(&self) -> Result<(), EngineError> {
        let (token, store_id) = self.require_session()?;
        let (topic, headers, draft) = {
            let view = self.view.lock();
            (
                view.selected_topic.clone(),
                view.headers.clone(),
                view.draft.clone(),
            )
        };
        let Some(topic) = topic else {
            return Err(self.validation_error("Cannot add event: no topic selected."));
        };

        if headers.is_empty() {
            return Err(self.validation_error(
                "Topic headers not loaded. Cannot determine event structure.",
            ));
        }
        let has_field_data = draft
            .fields
            .values()
            .any(|value| !value.trim().is_empty());
        if headers.len() > 1 && !has_field_data {
            return Err(self.validation_error("Please fill in at least one event detail."));
        }

        let custom = draft.custom_timestamp.trim();
        let timestamp = if custom.is_empty() {
            crate::util::time::now_timestamp()
        } else {
            match crate::util::time::validate_custom_timestamp(custom) {
                Some(normalized) => normalized,
                None => {
                    return Err(self.validation_error(
                        "Invalid custom date format. Please use YYYY-MM-DD HH:MM:SS.",
                    ));
                }
            }
        };

        let row = build_event_row(&headers, &timestamp, &draft.fields);
        let generation = self.generation.load(Ordering::SeqCst);
        self.clear_error();
        self.set_loading(LoadingKind::Initial, true);
        let result = self
            .store
            .append_event_row(&token, &store_id, &topic, row)
            .await;
        self.set_loading(LoadingKind::Initial, false);

        match result {
            Ok(()) => {
                self.cancel_draft();
                // Selection may have moved on while the append was in
                // flight; the new selection's own fetch is authoritative
                // then.
                if !self.is_stale(generation) {
                    self.fetch_events(topic, generation).await;
                }
                Ok(())
            }
            Err(err) => {
                Err(self
                    .handle_store_error(err, StoreOp::AppendRow, "adding event")
                    .await)
            }
        }
    }

    /// Rule 5: delete an event by identity.
    ///
    /// The caller has already taken the user through the confirmation gate;
    /// the engine issues the row delete and removes the event locally
    /// without a full re-fetch.
    pub async fn delete_event(&self, event_id: &str) -> Result<(), EngineError> {
        let (token, store_id) = self.require_session()?;
        let (target, sheet_id) = {
            let view = self.view.lock();
            (
                view.events.iter().find(|e| e.id == event_id).cloned(),
                view.selected_sheet_id(),
            )
        };
        let (Some(target), Some(sheet_id)) = (target, sheet_id) else {
            return Err(self.validation_error(
                "Cannot delete event: missing required data or not signed in/ready.",
            ));
        };

        self.clear_error();
        self.set_loading(LoadingKind::Initial, true);
        let result = self
            .store
            .delete_event_row(&token, &store_id, sheet_id, target.row_number)
            .await;
        self.set_loading(LoadingKind::Initial, false);

        match result {
            Ok(()) => {
                let (topic, events) = {
                    let mut view = self.view.lock();
                    view.events.retain(|e| e.id != event_id);
                    (
                        view.selected_topic.clone().unwrap_or_default(),
                        view.events.clone(),
                    )
                };
                self.emitter
                    .emit_events_updated(EventsUpdatedPayload { topic, events });
                Ok(())
            }
            Err(err) => {
                Err(self
                    .handle_store_error(err, StoreOp::DeleteRow, "deleting event")
                    .await)
            }
        }
    }

    /// Persist a new store identifier, reset derived state, and re-fetch
    /// when signed in.
    pub async fn set_store_id(&self, id: &str) -> Result<(), EngineError> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(self.validation_error("Please enter a valid Spreadsheet ID."));
        }
        if let Err(e) = self.config_store.set(trimmed) {
            crate::warn!("Failed to persist store identifier: {}", e);
        }
        *self.store_id.lock() = Some(trimmed.to_string());

        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut view = self.view.lock();
            view.clear_derived();
            view.error = None;
            view.fetching_topics = false;
            view.fetching_headers = false;
            view.fetching_events = false;
        }
        self.emitter
            .emit_topics_updated(TopicsUpdatedPayload { topics: vec![] });
        self.emitter
            .emit_selection_changed(SelectionChangedPayload { selected: None });
        self.emitter
            .emit_error_changed(ErrorChangedPayload { message: None });

        if self.session.is_signed_in() {
            if let Some(SelectionDecision::Select(selection)) = self.fetch_topic_list(false).await {
                self.select_topic(selection).await;
            }
        }
        Ok(())
    }

    /// Dismiss the current error message.
    pub fn clear_error(&self) {
        let changed = {
            let mut view = self.view.lock();
            view.error.take().is_some()
        };
        if changed {
            self.emitter
                .emit_error_changed(ErrorChangedPayload { message: None });
        }
    }

    // ============================================================
    // Fetch plumbing
    // ============================================================

    async fn fetch_profile(&self) {
        match self.session.fetch_profile().await {
            Ok(profile) => {
                crate::debug!("Signed in as {}", profile.email);
            }
            Err(SessionError::AuthExpired { status }) => {
                // The session manager already signed out; drop our state.
                self.handle_signed_out();
                self.set_error(format!("Auth error fetching profile ({status})."));
            }
            Err(SessionError::Provider(message)) => {
                self.set_error(format!("Could not fetch profile: {message}"));
            }
            Err(SessionError::NotSignedIn) => {
                crate::debug!("Profile fetch skipped: not signed in");
            }
        }
    }

    /// Fetch and apply the topic list. Returns None when the fetch was
    /// skipped or failed; the selection decision otherwise.
    async fn fetch_topic_list(&self, use_flag: bool) -> Option<SelectionDecision> {
        let Some(token) = self.session.access_token() else {
            crate::debug!("Topic fetch skipped: not signed in");
            return None;
        };
        let Some(store_id) = self.store_id() else {
            crate::debug!("Topic fetch skipped: store identifier not configured");
            return None;
        };

        if use_flag {
            self.set_loading(LoadingKind::Topics, true);
        }
        self.clear_error();
        let result = self.store.list_topics(&token, &store_id).await;
        if use_flag {
            self.set_loading(LoadingKind::Topics, false);
        }

        match result {
            Ok(topics) => {
                let decision = {
                    let mut view = self.view.lock();
                    view.topics = topics;
                    let selected_exists = view
                        .selected_topic
                        .as_ref()
                        .map(|s| view.topics.iter().any(|t| &t.title == s))
                        .unwrap_or(false);
                    if selected_exists {
                        SelectionDecision::Keep
                    } else if let Some(first) = view.topics.first() {
                        SelectionDecision::Select(Some(first.title.clone()))
                    } else if view.selected_topic.is_some() {
                        SelectionDecision::Select(None)
                    } else {
                        SelectionDecision::Keep
                    }
                };
                self.emitter.emit_topics_updated(TopicsUpdatedPayload {
                    topics: self.topics(),
                });
                Some(decision)
            }
            Err(err) => {
                self.handle_store_error(err, StoreOp::ListTopics, "fetching topics")
                    .await;
                None
            }
        }
    }

    async fn fetch_headers(&self, topic: String, generation: u64) {
        let Some((token, store_id)) = self.session_context() else {
            return;
        };
        self.set_loading(LoadingKind::Headers, true);
        let result = self.store.get_header_row(&token, &store_id, &topic).await;
        if self.is_stale(generation) {
            crate::debug!("Discarding stale header response for {}", topic);
            return;
        }
        self.set_loading(LoadingKind::Headers, false);

        match result {
            Ok(headers) => {
                self.view.lock().headers = headers.clone();
                self.emitter
                    .emit_headers_updated(HeadersUpdatedPayload { topic, headers });
            }
            Err(err) => match classify(&err, StoreOp::ReadHeader) {
                ErrorClass::EmptyRangeBenign => {
                    self.view.lock().headers.clear();
                    self.emitter.emit_headers_updated(HeadersUpdatedPayload {
                        topic,
                        headers: vec![],
                    });
                }
                _ => {
                    self.view.lock().headers.clear();
                    self.handle_store_error(err, StoreOp::ReadHeader, "fetching headers")
                        .await;
                }
            },
        }
    }

    async fn fetch_events(&self, topic: String, generation: u64) {
        let Some((token, store_id)) = self.session_context() else {
            return;
        };
        let window = match self.event_window {
            EventWindow::TwoColumn => ReadWindow::TwoColumn,
            EventWindow::FullSchema => ReadWindow::FullSheet,
        };
        self.set_loading(LoadingKind::Events, true);
        let result = self
            .store
            .get_event_rows(&token, &store_id, &topic, window)
            .await;
        if self.is_stale(generation) {
            crate::debug!("Discarding stale event response for {}", topic);
            return;
        }
        self.set_loading(LoadingKind::Events, false);

        match result {
            Ok(rows) => {
                let events = {
                    let mut view = self.view.lock();
                    let mut events = map_event_rows(&topic, &view.headers, rows);
                    sort_events_newest_first(&mut events);
                    view.events = events.clone();
                    events
                };
                self.emitter
                    .emit_events_updated(EventsUpdatedPayload { topic, events });
            }
            Err(err) => match classify(&err, StoreOp::ReadEvents) {
                ErrorClass::EmptyRangeBenign => {
                    crate::debug!("Topic {} has no data rows yet", topic);
                    self.view.lock().events.clear();
                    self.emitter.emit_events_updated(EventsUpdatedPayload {
                        topic,
                        events: vec![],
                    });
                }
                _ => {
                    self.handle_store_error(err, StoreOp::ReadEvents, "fetching events")
                        .await;
                }
            },
        }
    }

    // ============================================================
    // Shared helpers
    // ============================================================

    /// Classify a failed store call and apply its session/view fallout.
    ///
    /// Auth failures force sign-out with a terse message; everything else
    /// surfaces without touching the session. Benign empty-range reads are
    /// handled at the call sites and never reach here.
    async fn handle_store_error(
        &self,
        err: crate::sheets::StoreError,
        op: StoreOp,
        context: &str,
    ) -> EngineError {
        match classify(&err, op) {
            ErrorClass::AuthExpired => {
                crate::warn!("Auth error {} ({:?}), signing out", context, err.status);
                self.sign_out().await;
                let message = format!("Auth error {context}.");
                self.set_error(message.clone());
                EngineError::Store(message)
            }
            ErrorClass::StoreNotFound => {
                let message = "Spreadsheet not found or permission denied. Check ID.".to_string();
                self.set_error(message.clone());
                EngineError::Store(message)
            }
            ErrorClass::EmptyRangeBenign => {
                // Call sites intercept this class; reaching here means a
                // non-read op matched, which classify() prevents.
                EngineError::Store(err.message)
            }
            ErrorClass::Other(message) => {
                let message = format!("Error {context}: {message}");
                self.set_error(message.clone());
                EngineError::Store(message)
            }
        }
    }

    fn validation_error(&self, message: impl Into<String>) -> EngineError {
        let message = message.into();
        self.set_error(message.clone());
        EngineError::Validation(message)
    }

    fn require_session(&self) -> Result<(String, String), EngineError> {
        let Some(token) = self.session.access_token() else {
            self.set_error("Not signed in.");
            return Err(EngineError::NotSignedIn);
        };
        let Some(store_id) = self.store_id() else {
            self.set_error("Spreadsheet ID is not set.");
            return Err(EngineError::StoreIdMissing);
        };
        Ok((token, store_id))
    }

    fn session_context(&self) -> Option<(String, String)> {
        Some((self.session.access_token()?, self.store_id()?))
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.view.lock().error = Some(message.clone());
        self.emitter.emit_error_changed(ErrorChangedPayload {
            message: Some(message),
        });
    }

    fn set_loading(&self, kind: LoadingKind, active: bool) {
        {
            let mut view = self.view.lock();
            match kind {
                LoadingKind::Initial => view.initial_loading = active,
                LoadingKind::Topics => view.fetching_topics = active,
                LoadingKind::Headers => view.fetching_headers = active,
                LoadingKind::Events => view.fetching_events = active,
            }
        }
        self.emitter
            .emit_loading_changed(LoadingChangedPayload { kind, active });
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
