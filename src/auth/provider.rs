// Identity provider seam
//
// The OAuth SDK historically reported failures on two channels: protocol
// errors inside the token response and transport errors (popup blocked,
// user closed the window) on a side callback. Both are folded into
// TokenFailure here so the session manager classifies them with one rule.

use async_trait::async_trait;
use thiserror::Error;

use super::state::UserProfile;

/// Whether a token request may interact with the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Silent acquisition; must not show any UI.
    None,
    /// Interactive acquisition with a consent prompt.
    Consent,
}

/// Protocol error codes a silent attempt is expected to hit for a user who
/// never granted consent.
const QUIET_SILENT_PROTOCOL: &[&str] = &["interaction_required", "access_denied"];

/// Transport failure kinds treated the same way for silent attempts.
const QUIET_SILENT_TRANSPORT: &[&str] = &[
    "popup_closed",
    "immediate_failed",
    "user_cancel",
    "opt_out_or_no_session",
    "suppressed_by_user",
    "popup_failed_to_open",
];

/// A failed token acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenFailure {
    /// Token endpoint answered with an error code.
    #[error("{0}")]
    Protocol(String),
    /// The request never produced a token response (popup blocked, listener
    /// failure, network error, user walked away).
    #[error("{0}")]
    Transport(String),
    /// The endpoint reported success but the response carried no access
    /// token.
    #[error("missing access token")]
    MissingToken,
}

impl TokenFailure {
    /// The failure reason as surfaced to the user.
    pub fn reason(&self) -> &str {
        match self {
            TokenFailure::Protocol(code) => code,
            TokenFailure::Transport(kind) => kind,
            TokenFailure::MissingToken => "missing access token",
        }
    }

    /// Whether a **silent** attempt failing this way stays quiet.
    ///
    /// This is the expected steady state for a user who has never granted
    /// consent; surfacing it would alarm them for no reason. Interactive
    /// attempts never stay quiet.
    pub fn is_quiet_for_silent(&self) -> bool {
        match self {
            TokenFailure::Protocol(code) => QUIET_SILENT_PROTOCOL.contains(&code.as_str()),
            TokenFailure::Transport(kind) => QUIET_SILENT_TRANSPORT.contains(&kind.as_str()),
            TokenFailure::MissingToken => false,
        }
    }
}

/// Errors from the provider's non-token calls (revocation, profile).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// HTTP-like status, None for transport failures.
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Whether this failure means the session is no longer valid.
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }
}

/// Token-acquisition capability behind the session manager.
///
/// Implementations adapt whatever callback shapes the underlying SDK has
/// into plain futures; the session manager never sees callbacks.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Acquire an access token. A silent request must fail rather than
    /// show UI.
    async fn request_token(&self, prompt: Prompt) -> Result<String, TokenFailure>;

    /// Revoke an access token. Best-effort; callers log failures and move
    /// on.
    async fn revoke_token(&self, token: &str) -> Result<(), ProviderError>;

    /// Fetch the signed-in user's profile.
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ProviderError>;
}

#[cfg(test)]
#[path = "provider_test.rs"]
mod tests;
