//! sheetlog: session and sync core for a spreadsheet-backed event log.
//!
//! A signed-in user keeps append-only event logs inside a remote
//! spreadsheet, one sheet per topic, with a user-defined column schema. This
//! crate is the core behind that: an OAuth session state machine
//! ([`auth::SessionManager`]), a typed store client
//! ([`sheets::SheetsClient`]), and a reactive sync engine
//! ([`engine::SyncEngine`]) that keeps topics, headers, and events
//! consistent as the session and selection change. Rendering and form
//! handling live elsewhere; state changes reach them through the emitter
//! traits in [`events`].

// Enable coverage attribute on nightly for explicit exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod auth;
pub mod config;
pub mod engine;
pub mod events;
pub mod loader;
pub mod sheets;
pub mod util;

use std::sync::Arc;

// Re-export log macros for use throughout the crate
pub use log::{debug, error, info, trace, warn};

pub use auth::{
    GoogleIdentityProvider, IdentityProvider, SessionManager, SessionStatus, SignInOutcome,
    UserProfile,
};
pub use config::{AppConfig, ConfigStore, EventWindow, JsonFileConfigStore, MemoryConfigStore};
pub use engine::{EventDraft, EventRecord, SyncEngine, Topic};
pub use events::{LogEmitter, SessionEventEmitter, ViewEventEmitter};
pub use loader::{LoadError, SdkLoader, StaticLoader};
pub use sheets::{RemoteStore, SheetsClient};

/// Wire the core together and run the startup sequence.
///
/// Loads the SDK surfaces, initializes the session, attempts a silent
/// sign-in, and (when the user was already signed in) runs the initial
/// profile/topic fetch. Returns the session manager and engine for the
/// caller to drive from its UI.
pub async fn bootstrap(
    config: AppConfig,
    loader: Arc<dyn SdkLoader>,
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn RemoteStore>,
    config_store: Arc<dyn ConfigStore>,
    session_emitter: Arc<dyn SessionEventEmitter>,
    view_emitter: Arc<dyn ViewEventEmitter>,
) -> Result<(Arc<SessionManager>, Arc<SyncEngine>), LoadError> {
    loader.load().await?;

    let session = Arc::new(SessionManager::initialize(
        &config,
        provider,
        session_emitter,
    ));
    let engine = Arc::new(SyncEngine::new(
        &config,
        store,
        session.clone(),
        config_store,
        view_emitter,
    ));

    if session.attempt_silent_sign_in().await == SignInOutcome::SignedIn {
        engine.handle_signed_in().await;
    }

    Ok((session, engine))
}

/// [`bootstrap`] with the production stack: Google identity provider,
/// Sheets client, JSON-file config store, and log-only emitters.
pub async fn bootstrap_with_defaults(
    config: AppConfig,
) -> Result<(Arc<SessionManager>, Arc<SyncEngine>), LoadError> {
    let provider = Arc::new(GoogleIdentityProvider::new(
        config.client_id.clone(),
        config.scopes.clone(),
    ));
    let mut client = SheetsClient::new();
    if let Some(key) = &config.api_key {
        client = client.with_api_key(key.clone());
    }
    let config_store: Arc<dyn ConfigStore> = match JsonFileConfigStore::default_location() {
        Some(store) => Arc::new(store),
        None => Arc::new(MemoryConfigStore::default()),
    };
    let emitter = Arc::new(LogEmitter);

    bootstrap(
        config,
        Arc::new(StaticLoader),
        provider,
        Arc::new(client),
        config_store,
        emitter.clone(),
        emitter,
    )
    .await
}
