// Session state management for the OAuth sign-in lifecycle

use serde::Serialize;
use thiserror::Error;

/// Session status enum representing the current state of the sign-in
/// process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    /// No valid token; sign-in may be attempted
    SignedOut,
    /// A no-prompt token request is outstanding
    AwaitingSilentToken,
    /// A consent-prompting token request is outstanding
    AwaitingInteractiveToken,
    /// A valid access token is held
    SignedIn,
    /// The client id is missing; nothing can run until reconfigured
    ConfigInvalid,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::SignedOut
    }
}

/// Errors that can occur during session transitions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionStateError {
    /// Invalid state transition attempted
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// Operation requires a signed-in session
    #[error("not signed in")]
    NotSignedIn,
}

/// Signed-in user's basic profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
}

/// The one session per running client.
///
/// Owned by the SessionManager and mutated only through the transition
/// functions below; the token and profile are only ever populated while
/// SignedIn.
#[derive(Debug, Default)]
pub struct Session {
    status: SessionStatus,
    access_token: Option<String>,
    profile: Option<UserProfile>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session that starts out unconfigured.
    pub fn config_invalid() -> Self {
        Self {
            status: SessionStatus::ConfigInvalid,
            access_token: None,
            profile: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    /// Begin a silent (no-prompt) token request.
    ///
    /// # Errors
    /// Returns error unless currently SignedOut.
    #[must_use = "this returns a Result that should be handled"]
    pub fn begin_silent(&mut self) -> Result<(), SessionStateError> {
        self.begin(SessionStatus::AwaitingSilentToken)
    }

    /// Begin an interactive (consent-prompting) token request.
    ///
    /// # Errors
    /// Returns error unless currently SignedOut.
    #[must_use = "this returns a Result that should be handled"]
    pub fn begin_interactive(&mut self) -> Result<(), SessionStateError> {
        self.begin(SessionStatus::AwaitingInteractiveToken)
    }

    fn begin(&mut self, to: SessionStatus) -> Result<(), SessionStateError> {
        if self.status != SessionStatus::SignedOut {
            return Err(SessionStateError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Whether a token request is currently outstanding.
    pub fn is_acquiring(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::AwaitingSilentToken | SessionStatus::AwaitingInteractiveToken
        )
    }

    /// Complete the outstanding token request with a token.
    ///
    /// # Errors
    /// Returns error if no request is outstanding.
    #[must_use = "this returns a Result that should be handled"]
    pub fn complete_with_token(&mut self, token: String) -> Result<(), SessionStateError> {
        if !self.is_acquiring() {
            return Err(SessionStateError::InvalidTransition {
                from: self.status,
                to: SessionStatus::SignedIn,
            });
        }
        self.status = SessionStatus::SignedIn;
        self.access_token = Some(token);
        Ok(())
    }

    /// Complete the outstanding token request with a failure, returning to
    /// SignedOut.
    pub fn complete_with_failure(&mut self) {
        self.status = SessionStatus::SignedOut;
        self.access_token = None;
        self.profile = None;
    }

    /// Record the fetched profile.
    ///
    /// # Errors
    /// Returns error unless SignedIn.
    #[must_use = "this returns a Result that should be handled"]
    pub fn set_profile(&mut self, profile: UserProfile) -> Result<(), SessionStateError> {
        if self.status != SessionStatus::SignedIn {
            return Err(SessionStateError::NotSignedIn);
        }
        self.profile = Some(profile);
        Ok(())
    }

    /// Unconditional reset to SignedOut, clearing token and profile.
    ///
    /// Used by sign-out, which must succeed from any state.
    pub fn reset(&mut self) {
        self.status = SessionStatus::SignedOut;
        self.access_token = None;
        self.profile = None;
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
