//! OAuth session management.
//!
//! The session is a small state machine: silent or interactive token
//! acquisition, a signed-in steady state, and an unconditional sign-out.
//! Acquisition is single-flight; a second request while one is outstanding
//! is dropped, not queued. Failure classification follows the attempt type:
//! a silent attempt hitting the expected "never consented" reasons stays
//! quiet, everything else surfaces.

pub mod google;
pub mod provider;
pub mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::AppConfig;
use crate::events::{SessionChangedPayload, SessionEventEmitter};

pub use google::GoogleIdentityProvider;
pub use provider::{IdentityProvider, Prompt, ProviderError, TokenFailure};
pub use state::{Session, SessionStateError, SessionStatus, UserProfile};

/// Result of a sign-in attempt, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    /// A token was obtained; the session is SignedIn.
    SignedIn,
    /// A silent attempt failed in the expected never-consented way. Not a
    /// user-visible error.
    QuietFailure(String),
    /// The attempt failed with a user-facing message.
    Failed(String),
    /// The request was dropped: another acquisition was outstanding or the
    /// session state does not allow one.
    Ignored,
}

/// Errors from session operations other than sign-in.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,

    /// The provider rejected the token; the session has been signed out.
    #[error("auth error ({status})")]
    AuthExpired { status: u16 },

    #[error("{0}")]
    Provider(String),
}

/// Owner of the one [`Session`] per running client.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    session: Mutex<Session>,
    /// Single-flight guard: set while a token request is outstanding.
    acquiring: AtomicBool,
    emitter: Arc<dyn SessionEventEmitter>,
}

impl SessionManager {
    /// Prepare the token-acquisition capability.
    ///
    /// A config without a client id yields a session stuck in
    /// `ConfigInvalid`; every sign-in attempt on it is ignored.
    pub fn initialize(
        config: &AppConfig,
        provider: Arc<dyn IdentityProvider>,
        emitter: Arc<dyn SessionEventEmitter>,
    ) -> Self {
        let session = if config.is_valid() {
            Session::new()
        } else {
            crate::error!("Configuration error: OAuth client id is not set");
            Session::config_invalid()
        };
        Self {
            provider,
            session: Mutex::new(session),
            acquiring: AtomicBool::new(false),
            emitter,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.session.lock().status()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session.lock().access_token().map(str::to_string)
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.session.lock().profile().cloned()
    }

    pub fn is_signed_in(&self) -> bool {
        self.status() == SessionStatus::SignedIn
    }

    /// Attempt a no-prompt sign-in.
    ///
    /// Allowed only from SignedOut; concurrent attempts are no-ops.
    pub async fn attempt_silent_sign_in(&self) -> SignInOutcome {
        self.sign_in(Prompt::None).await
    }

    /// Request an interactive, consent-prompting sign-in.
    pub async fn request_interactive_sign_in(&self) -> SignInOutcome {
        self.sign_in(Prompt::Consent).await
    }

    async fn sign_in(&self, prompt: Prompt) -> SignInOutcome {
        if self.acquiring.swap(true, Ordering::SeqCst) {
            crate::debug!("Token request dropped: another acquisition is outstanding");
            return SignInOutcome::Ignored;
        }

        let begun = {
            let mut session = self.session.lock();
            match prompt {
                Prompt::None => session.begin_silent(),
                Prompt::Consent => session.begin_interactive(),
            }
        };
        if begun.is_err() {
            self.acquiring.store(false, Ordering::SeqCst);
            crate::debug!("Token request dropped: session not SignedOut");
            return SignInOutcome::Ignored;
        }
        self.emit_session();

        let result = self.provider.request_token(prompt).await;
        let outcome = self.complete(result, prompt);
        self.acquiring.store(false, Ordering::SeqCst);
        self.emit_session();
        outcome
    }

    fn complete(&self, result: Result<String, TokenFailure>, prompt: Prompt) -> SignInOutcome {
        let mut session = self.session.lock();
        match result {
            Ok(token) if !token.is_empty() => match session.complete_with_token(token) {
                Ok(()) => SignInOutcome::SignedIn,
                Err(e) => {
                    // Sign-out raced the acquisition; the reset state wins.
                    crate::warn!("Discarding acquired token: {}", e);
                    SignInOutcome::Ignored
                }
            },
            Ok(_) => {
                session.complete_with_failure();
                self.failure_outcome(TokenFailure::MissingToken, prompt)
            }
            Err(failure) => {
                session.complete_with_failure();
                self.failure_outcome(failure, prompt)
            }
        }
    }

    fn failure_outcome(&self, failure: TokenFailure, prompt: Prompt) -> SignInOutcome {
        if prompt == Prompt::None && failure.is_quiet_for_silent() {
            crate::debug!("Silent sign-in requires user interaction ({})", failure.reason());
            return SignInOutcome::QuietFailure(failure.reason().to_string());
        }
        let message = match failure {
            TokenFailure::MissingToken => "Failed to obtain access token.".to_string(),
            other => format!("Sign-In Error: {}", other.reason()),
        };
        SignInOutcome::Failed(message)
    }

    /// Sign out from any state.
    ///
    /// Revokes the current token when one is held; revocation failure is
    /// logged, never surfaced. The session always ends up SignedOut.
    pub async fn sign_out(&self) {
        let token = self.access_token();
        if let Some(token) = token {
            if let Err(e) = self.provider.revoke_token(&token).await {
                crate::warn!("Token revocation failed: {}", e);
            } else {
                crate::info!("Access token revoked");
            }
        }
        self.session.lock().reset();
        self.acquiring.store(false, Ordering::SeqCst);
        self.emit_session();
    }

    /// Fetch the signed-in user's profile and record it on the session.
    ///
    /// An auth failure (401/403) signs the session out before returning.
    pub async fn fetch_profile(&self) -> Result<UserProfile, SessionError> {
        let Some(token) = self.access_token() else {
            return Err(SessionError::NotSignedIn);
        };

        match self.provider.fetch_profile(&token).await {
            Ok(profile) => {
                {
                    let mut session = self.session.lock();
                    if session.set_profile(profile.clone()).is_err() {
                        // Signed out while the fetch was in flight.
                        return Err(SessionError::NotSignedIn);
                    }
                }
                self.emit_session();
                Ok(profile)
            }
            Err(e) if e.is_auth_error() => {
                let status = e.status.unwrap_or(401);
                crate::warn!("Auth error fetching profile ({}), signing out", status);
                self.sign_out().await;
                Err(SessionError::AuthExpired { status })
            }
            Err(e) => Err(SessionError::Provider(e.message)),
        }
    }

    fn emit_session(&self) {
        let (status, email) = {
            let session = self.session.lock();
            (
                session.status(),
                session.profile().map(|p| p.email.clone()),
            )
        };
        self.emitter
            .emit_session_changed(SessionChangedPayload { status, email });
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
