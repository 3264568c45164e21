use super::*;
use crate::auth::{
    IdentityProvider, Prompt, ProviderError, SessionManager, SessionStatus, TokenFailure,
    UserProfile,
};
use crate::config::{AppConfig, MemoryConfigStore};
use crate::events::tests::MockEventEmitter;
use crate::sheets::{ReadWindow, RemoteStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::Notify;

/// Identity provider that always signs in successfully
struct FixedProvider;

#[async_trait::async_trait]
impl IdentityProvider for FixedProvider {
    async fn request_token(&self, _prompt: Prompt) -> Result<String, TokenFailure> {
        Ok("tok".to_string())
    }

    async fn revoke_token(&self, _token: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn fetch_profile(&self, _token: &str) -> Result<UserProfile, ProviderError> {
        Ok(UserProfile {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
        })
    }
}

/// Mock remote store with scripted per-operation results and a call log
struct MockStore {
    topics_result: StdMutex<Result<Vec<Topic>, StoreError>>,
    header_result: StdMutex<Result<Vec<String>, StoreError>>,
    events_results: StdMutex<HashMap<String, Result<Vec<Vec<String>>, StoreError>>>,
    append_result: StdMutex<Result<(), StoreError>>,
    delete_result: StdMutex<Result<(), StoreError>>,
    create_result: StdMutex<Result<i64, StoreError>>,
    calls: StdMutex<Vec<String>>,
    last_append: StdMutex<Option<(String, Vec<String>)>>,
    last_delete: StdMutex<Option<(i64, u32)>>,
    last_create: StdMutex<Option<(String, Vec<String>)>>,
    /// When set, get_event_rows for this topic parks until notified.
    hold_events_for: StdMutex<Option<(String, Arc<Notify>)>>,
}

impl MockStore {
    fn new() -> Self {
        Self {
            topics_result: StdMutex::new(Ok(vec![])),
            header_result: StdMutex::new(Ok(vec![
                "Timestamp".to_string(),
                "Event Description".to_string(),
            ])),
            events_results: StdMutex::new(HashMap::new()),
            append_result: StdMutex::new(Ok(())),
            delete_result: StdMutex::new(Ok(())),
            create_result: StdMutex::new(Ok(7)),
            calls: StdMutex::new(vec![]),
            last_append: StdMutex::new(None),
            last_delete: StdMutex::new(None),
            last_create: StdMutex::new(None),
            hold_events_for: StdMutex::new(None),
        }
    }

    fn with_topics(topics: Vec<(&str, i64)>) -> Self {
        let store = Self::new();
        store.set_topics(topics);
        store
    }

    fn set_topics(&self, topics: Vec<(&str, i64)>) {
        *self.topics_result.lock().unwrap() = Ok(topics
            .into_iter()
            .map(|(title, sheet_id)| Topic {
                title: title.to_string(),
                sheet_id,
            })
            .collect());
    }

    fn set_events(&self, topic: &str, rows: Vec<Vec<&str>>) {
        self.events_results.lock().unwrap().insert(
            topic.to_string(),
            Ok(rows
                .into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect()),
        );
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait::async_trait]
impl RemoteStore for MockStore {
    async fn list_topics(&self, _token: &str, _store_id: &str) -> Result<Vec<Topic>, StoreError> {
        self.log("list_topics".to_string());
        self.topics_result.lock().unwrap().clone()
    }

    async fn get_header_row(
        &self,
        _token: &str,
        _store_id: &str,
        topic: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.log(format!("get_header_row:{topic}"));
        self.header_result.lock().unwrap().clone()
    }

    async fn get_event_rows(
        &self,
        _token: &str,
        _store_id: &str,
        topic: &str,
        _window: ReadWindow,
    ) -> Result<Vec<Vec<String>>, StoreError> {
        self.log(format!("get_event_rows:{topic}"));
        let hold = {
            let guard = self.hold_events_for.lock().unwrap();
            guard
                .as_ref()
                .filter(|(held, _)| held == topic)
                .map(|(_, notify)| notify.clone())
        };
        if let Some(notify) = hold {
            notify.notified().await;
        }
        self.events_results
            .lock()
            .unwrap()
            .get(topic)
            .cloned()
            .unwrap_or(Ok(vec![]))
    }

    async fn append_event_row(
        &self,
        _token: &str,
        _store_id: &str,
        topic: &str,
        values: Vec<String>,
    ) -> Result<(), StoreError> {
        self.log(format!("append:{topic}"));
        *self.last_append.lock().unwrap() = Some((topic.to_string(), values));
        self.append_result.lock().unwrap().clone()
    }

    async fn delete_event_row(
        &self,
        _token: &str,
        _store_id: &str,
        sheet_id: i64,
        row_number: u32,
    ) -> Result<(), StoreError> {
        self.log(format!("delete:{sheet_id}:{row_number}"));
        *self.last_delete.lock().unwrap() = Some((sheet_id, row_number));
        self.delete_result.lock().unwrap().clone()
    }

    async fn create_topic(
        &self,
        _token: &str,
        _store_id: &str,
        title: &str,
        header_row: &[String],
    ) -> Result<i64, StoreError> {
        self.log(format!("create:{title}"));
        *self.last_create.lock().unwrap() = Some((title.to_string(), header_row.to_vec()));
        self.create_result.lock().unwrap().clone()
    }
}

struct Harness {
    engine: Arc<SyncEngine>,
    store: Arc<MockStore>,
    session: Arc<SessionManager>,
    emitter: Arc<MockEventEmitter>,
    config: Arc<MemoryConfigStore>,
}

async fn harness(store: MockStore, store_id: Option<&str>) -> Harness {
    let store = Arc::new(store);
    let emitter = Arc::new(MockEventEmitter::new());
    let config = Arc::new(MemoryConfigStore::new(store_id.map(str::to_string)));
    let app_config = AppConfig::new("client-1");
    let session = Arc::new(SessionManager::initialize(
        &app_config,
        Arc::new(FixedProvider),
        emitter.clone(),
    ));
    let engine = Arc::new(SyncEngine::new(
        &app_config,
        store.clone(),
        session.clone(),
        config.clone(),
        emitter.clone(),
    ));
    Harness {
        engine,
        store,
        session,
        emitter,
        config,
    }
}

/// Harness already signed in with the initial fetch applied.
async fn signed_in_harness(store: MockStore) -> Harness {
    let h = harness(store, Some("sheet-1")).await;
    h.session.attempt_silent_sign_in().await;
    h.engine.handle_signed_in().await;
    h
}

// ============================================================
// Rule 1: signed-in fan-out
// ============================================================

#[tokio::test]
async fn test_signed_in_fetches_profile_and_topics_and_selects_first() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0), ("Health", 42)])).await;

    assert_eq!(h.engine.topics().len(), 2);
    assert_eq!(h.engine.selected_topic().as_deref(), Some("Work"));
    assert_eq!(h.session.profile().unwrap().email, "ada@example.com");
    assert!(!h.engine.is_initial_loading());

    // Rule 2 fallout: headers and events were fetched for the selection.
    assert_eq!(h.store.count("get_header_row:Work"), 1);
    assert_eq!(h.store.count("get_event_rows:Work"), 1);
    assert_eq!(h.engine.headers(), vec!["Timestamp", "Event Description"]);
}

#[tokio::test]
async fn test_signed_in_with_empty_store_clears_selection() {
    let h = signed_in_harness(MockStore::with_topics(vec![])).await;

    assert!(h.engine.topics().is_empty());
    assert_eq!(h.engine.selected_topic(), None);
    assert_eq!(h.store.count("get_header_row"), 0);
    assert_eq!(h.store.count("get_event_rows"), 0);
}

#[tokio::test]
async fn test_signed_in_without_store_id_skips_fetches() {
    let h = harness(MockStore::with_topics(vec![("Work", 0)]), None).await;
    h.session.attempt_silent_sign_in().await;
    h.engine.handle_signed_in().await;

    assert_eq!(h.store.count("list_topics"), 0);
    assert!(h.engine.topics().is_empty());
}

#[tokio::test]
async fn test_refresh_keeps_existing_selection() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0), ("Health", 42)])).await;
    h.engine.select_topic(Some("Health".to_string())).await;
    let header_fetches = h.store.count("get_header_row:Health");

    h.engine.refresh_topics().await;
    assert_eq!(h.engine.selected_topic().as_deref(), Some("Health"));
    // Unchanged selection does not refetch headers/events.
    assert_eq!(h.store.count("get_header_row:Health"), header_fetches);
}

#[tokio::test]
async fn test_refresh_reselects_when_topic_disappeared() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0), ("Health", 42)])).await;
    h.engine.select_topic(Some("Health".to_string())).await;

    h.store.set_topics(vec![("Work", 0)]);
    h.engine.refresh_topics().await;
    assert_eq!(h.engine.selected_topic().as_deref(), Some("Work"));

    h.store.set_topics(vec![]);
    h.engine.refresh_topics().await;
    assert_eq!(h.engine.selected_topic(), None);
    assert!(h.engine.headers().is_empty());
    assert!(h.engine.events().is_empty());
}

// ============================================================
// Error classification fallout
// ============================================================

#[tokio::test]
async fn test_store_not_found_surfaces_and_keeps_session() {
    let store = MockStore::new();
    *store.topics_result.lock().unwrap() =
        Err(StoreError::new(Some(404), "Requested entity was not found."));
    let h = signed_in_harness(store).await;

    assert_eq!(
        h.engine.error().as_deref(),
        Some("Spreadsheet not found or permission denied. Check ID.")
    );
    assert_eq!(h.session.status(), SessionStatus::SignedIn);
}

#[tokio::test]
async fn test_auth_error_on_topics_forces_sign_out() {
    let store = MockStore::new();
    *store.topics_result.lock().unwrap() = Err(StoreError::new(Some(401), "expired"));
    let h = signed_in_harness(store).await;

    assert_eq!(h.session.status(), SessionStatus::SignedOut);
    assert!(h.engine.topics().is_empty());
    assert_eq!(h.engine.error().as_deref(), Some("Auth error fetching topics."));
}

#[tokio::test]
async fn test_other_error_surfaces_verbatim_message() {
    let store = MockStore::with_topics(vec![("Work", 0)]);
    store.events_results.lock().unwrap().insert(
        "Work".to_string(),
        Err(StoreError::new(Some(500), "Internal error encountered.")),
    );
    let h = signed_in_harness(store).await;

    assert_eq!(
        h.engine.error().as_deref(),
        Some("Error fetching events: Internal error encountered.")
    );
    assert_eq!(h.session.status(), SessionStatus::SignedIn);
}

/// A fresh, empty sheet reads as an out-of-bounds range; that is data, not
/// an error.
#[tokio::test]
async fn test_empty_range_read_is_benign() {
    let store = MockStore::with_topics(vec![("Work", 0)]);
    store.events_results.lock().unwrap().insert(
        "Work".to_string(),
        Err(StoreError::new(
            Some(400),
            "Unable to parse range: Work!A2:B",
        )),
    );
    *store.header_result.lock().unwrap() = Err(StoreError::new(
        Some(400),
        "Range (Work!1:1) exceeds grid limits",
    ));
    let h = signed_in_harness(store).await;

    assert_eq!(h.engine.error(), None);
    assert!(h.engine.events().is_empty());
    assert!(h.engine.headers().is_empty());
    assert_eq!(h.session.status(), SessionStatus::SignedIn);
}

// ============================================================
// Rule 2: selection changes
// ============================================================

#[tokio::test]
async fn test_select_topic_fetches_and_clears_draft() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0), ("Health", 42)])).await;
    h.engine.update_draft_field("Event Description", "left over");
    h.engine.set_draft_timestamp("2024-01-01 10:00:00");

    h.engine.select_topic(Some("Health".to_string())).await;
    assert!(h.engine.draft().is_empty());
    assert_eq!(h.store.count("get_header_row:Health"), 1);
    assert_eq!(h.store.count("get_event_rows:Health"), 1);
}

#[tokio::test]
async fn test_clearing_selection_needs_no_network() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0)])).await;
    let calls_before = h.store.calls.lock().unwrap().len();

    h.engine.select_topic(None).await;
    assert_eq!(h.store.calls.lock().unwrap().len(), calls_before);
    assert!(h.engine.headers().is_empty());
    assert!(h.engine.events().is_empty());
}

#[tokio::test]
async fn test_events_sorted_newest_first_with_invalid_last() {
    let store = MockStore::with_topics(vec![("Work", 0)]);
    store.set_events(
        "Work",
        vec![
            vec!["2024-01-01 10:00:00", "a"],
            vec!["not-a-date", "b"],
            vec!["2024-02-01 09:00:00", "c"],
        ],
    );
    let h = signed_in_harness(store).await;

    let timestamps: Vec<String> = h
        .engine
        .events()
        .iter()
        .map(|e| e.timestamp.clone())
        .collect();
    assert_eq!(
        timestamps,
        vec!["2024-02-01 09:00:00", "2024-01-01 10:00:00", "not-a-date"]
    );
    // Physical row numbers follow the store order, not the sort order.
    assert_eq!(h.engine.events()[0].row_number, 4);
    assert_eq!(h.engine.events()[2].row_number, 3);
}

/// A response for a superseded selection must not clobber the current one.
#[tokio::test]
async fn test_stale_event_response_is_discarded() {
    // Fast is first so the initial auto-selection completes immediately.
    let store = MockStore::with_topics(vec![("Fast", 1), ("Slow", 0)]);
    store.set_events("Slow", vec![vec!["2024-01-01 10:00:00", "slow-row"]]);
    store.set_events("Fast", vec![vec!["2024-01-02 10:00:00", "fast-row"]]);
    let gate = Arc::new(Notify::new());
    *store.hold_events_for.lock().unwrap() = Some(("Slow".to_string(), gate.clone()));

    let h = signed_in_harness(store).await;
    let engine = h.engine.clone();
    let slow_selection = tokio::spawn(async move {
        engine.select_topic(Some("Slow".to_string())).await;
    });
    // Let the Slow selection reach the store and park on its event fetch.
    while h.store.count("get_event_rows:Slow") == 0 {
        tokio::task::yield_now().await;
    }

    // The user moves on before the Slow response arrives.
    h.engine.select_topic(Some("Fast".to_string())).await;
    gate.notify_one();
    slow_selection.await.unwrap();

    let events = h.engine.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].fields.values().any(|v| v == "fast-row"));
    assert_eq!(h.engine.selected_topic().as_deref(), Some("Fast"));
}

// ============================================================
// Rule 3: topic creation
// ============================================================

#[tokio::test]
async fn test_create_topic_composes_header_row() {
    let h = signed_in_harness(MockStore::with_topics(vec![])).await;

    h.engine
        .create_topic("Work", "Description, Duration")
        .await
        .unwrap();
    let (title, header_row) = h.store.last_create.lock().unwrap().clone().unwrap();
    assert_eq!(title, "Work");
    assert_eq!(header_row, vec!["Timestamp", "Description", "Duration"]);

    // The new topic joins the collection and becomes the selection.
    assert_eq!(h.engine.topics().len(), 1);
    assert_eq!(h.engine.topics()[0].sheet_id, 7);
    assert_eq!(h.engine.selected_topic().as_deref(), Some("Work"));
    assert_eq!(h.store.count("get_event_rows:Work"), 1);
}

#[tokio::test]
async fn test_create_topic_defaults_columns() {
    let h = signed_in_harness(MockStore::with_topics(vec![])).await;
    h.engine.create_topic("Notes", "   ").await.unwrap();
    let (_, header_row) = h.store.last_create.lock().unwrap().clone().unwrap();
    assert_eq!(header_row, vec!["Timestamp", "Event Description"]);
}

#[tokio::test]
async fn test_create_duplicate_topic_rejected_before_network() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0)])).await;

    let err = h.engine.create_topic(" Work ", "").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.store.count("create:"), 0);
    assert_eq!(
        h.engine.error().as_deref(),
        Some("Topic \"Work\" already exists.")
    );
}

#[tokio::test]
async fn test_create_topic_rejects_blank_title() {
    let h = signed_in_harness(MockStore::with_topics(vec![])).await;
    let err = h.engine.create_topic("   ", "").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.store.count("create:"), 0);
}

// ============================================================
// Rule 4: event append
// ============================================================

#[tokio::test]
async fn test_submit_event_with_custom_timestamp() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0)])).await;
    h.engine.set_draft_timestamp("2024-03-01 08:30:00");
    h.engine.update_draft_field("Event Description", "standup");

    h.engine.submit_event().await.unwrap();
    let (topic, row) = h.store.last_append.lock().unwrap().clone().unwrap();
    assert_eq!(topic, "Work");
    assert_eq!(row, vec!["2024-03-01 08:30:00", "standup"]);

    // Draft cleared and events re-fetched; no optimistic insert.
    assert!(h.engine.draft().is_empty());
    assert_eq!(h.store.count("get_event_rows:Work"), 2);
}

#[tokio::test]
async fn test_submit_event_uses_now_when_no_custom_timestamp() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0)])).await;
    h.engine.update_draft_field("Event Description", "lunch");

    h.engine.submit_event().await.unwrap();
    let (_, row) = h.store.last_append.lock().unwrap().clone().unwrap();
    assert!(crate::util::time::parse_timestamp(&row[0]).is_some());
    assert_eq!(row[1], "lunch");
}

/// A malformed custom timestamp is rejected before any network call.
#[tokio::test]
async fn test_submit_event_rejects_malformed_timestamp() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0)])).await;
    h.engine.set_draft_timestamp("2024-13-40 99:99:99");
    h.engine.update_draft_field("Event Description", "bad time");

    let err = h.engine.submit_event().await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.store.count("append:"), 0);
    assert!(h.engine.error().unwrap().contains("YYYY-MM-DD HH:MM:SS"));
}

#[tokio::test]
async fn test_submit_event_requires_loaded_headers() {
    let store = MockStore::with_topics(vec![("Work", 0)]);
    *store.header_result.lock().unwrap() = Ok(vec![]);
    let h = signed_in_harness(store).await;

    let err = h.engine.submit_event().await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.store.count("append:"), 0);
}

#[tokio::test]
async fn test_submit_event_requires_a_field_unless_timestamp_only() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0)])).await;
    h.engine.update_draft_field("Event Description", "   ");
    let err = h.engine.submit_event().await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    // A schema with only the timestamp column may append bare timestamps.
    let store = MockStore::with_topics(vec![("Pings", 3)]);
    *store.header_result.lock().unwrap() = Ok(vec!["Timestamp".to_string()]);
    let h = signed_in_harness(store).await;
    h.engine.submit_event().await.unwrap();
    let (_, row) = h.store.last_append.lock().unwrap().clone().unwrap();
    assert_eq!(row.len(), 1);
}

// ============================================================
// Rule 5: event delete
// ============================================================

#[tokio::test]
async fn test_delete_event_removes_locally_without_refetch() {
    let store = MockStore::with_topics(vec![("Work", 9)]);
    store.set_events(
        "Work",
        vec![
            vec!["2024-01-01 10:00:00", "a"],
            vec!["2024-01-02 11:00:00", "b"],
        ],
    );
    let h = signed_in_harness(store).await;
    let fetches_before = h.store.count("get_event_rows:Work");

    // "Work-0" is the first physical data row (row 2).
    h.engine.delete_event("Work-0").await.unwrap();
    assert_eq!(*h.store.last_delete.lock().unwrap(), Some((9, 2)));
    assert_eq!(h.store.count("get_event_rows:Work"), fetches_before);

    let events = h.engine.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "Work-1");
}

#[tokio::test]
async fn test_delete_unknown_event_is_rejected() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0)])).await;
    let err = h.engine.delete_event("Work-99").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(h.store.count("delete:"), 0);
}

#[tokio::test]
async fn test_delete_auth_error_signs_out() {
    let store = MockStore::with_topics(vec![("Work", 9)]);
    store.set_events("Work", vec![vec!["2024-01-01 10:00:00", "a"]]);
    *store.delete_result.lock().unwrap() = Err(StoreError::new(Some(403), "forbidden"));
    let h = signed_in_harness(store).await;

    let err = h.engine.delete_event("Work-0").await.unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
    assert_eq!(h.session.status(), SessionStatus::SignedOut);
    assert_eq!(h.engine.error().as_deref(), Some("Auth error deleting event."));
}

// ============================================================
// Sign-out and store-id changes
// ============================================================

/// Regardless of prior state, sign-out ends SignedOut with every piece of
/// derived state empty.
#[tokio::test]
async fn test_sign_out_clears_everything() {
    let store = MockStore::with_topics(vec![("Work", 0)]);
    store.set_events("Work", vec![vec!["2024-01-01 10:00:00", "a"]]);
    let h = signed_in_harness(store).await;
    h.engine.update_draft_field("Event Description", "pending");

    h.engine.sign_out().await;
    assert_eq!(h.session.status(), SessionStatus::SignedOut);
    assert_eq!(h.session.profile(), None);
    assert!(h.engine.topics().is_empty());
    assert_eq!(h.engine.selected_topic(), None);
    assert!(h.engine.headers().is_empty());
    assert!(h.engine.events().is_empty());
    assert!(h.engine.draft().is_empty());
    assert_eq!(h.engine.error(), None);
}

#[tokio::test]
async fn test_set_store_id_persists_and_refetches() {
    let h = signed_in_harness(MockStore::with_topics(vec![("Work", 0)])).await;
    let list_calls = h.store.count("list_topics");

    h.engine.set_store_id(" sheet-2 ").await.unwrap();
    assert_eq!(h.config.get().as_deref(), Some("sheet-2"));
    assert_eq!(h.engine.store_id().as_deref(), Some("sheet-2"));
    assert_eq!(h.store.count("list_topics"), list_calls + 1);
    assert_eq!(h.engine.selected_topic().as_deref(), Some("Work"));
}

#[tokio::test]
async fn test_set_store_id_rejects_blank() {
    let h = signed_in_harness(MockStore::with_topics(vec![])).await;
    let err = h.engine.set_store_id("   ").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn test_clear_error_dismisses_message() {
    let store = MockStore::new();
    *store.topics_result.lock().unwrap() = Err(StoreError::new(Some(404), "nope"));
    let h = signed_in_harness(store).await;
    assert!(h.engine.error().is_some());

    h.engine.clear_error();
    assert_eq!(h.engine.error(), None);
    assert_eq!(h.emitter.last_error(), None);
}
