// Google identity provider
//
// Silent acquisition is a refresh-token grant against a cached token, so it
// never shows UI; a user who has not granted consent yet fails with
// interaction_required, which the session manager keeps quiet. Interactive
// acquisition runs the auth-code flow against a loopback redirect listener
// and caches the resulting refresh token for future silent sign-ins.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::provider::{IdentityProvider, Prompt, ProviderError, TokenFailure};
use super::state::UserProfile;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// How long the interactive flow waits for the browser redirect.
const DEFAULT_REDIRECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Safety margin subtracted from token lifetimes so a cached token is never
/// used right at its expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Cached token material, one JSON file per client.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: String,
    expires_at: i64,
}

/// OAuth token endpoint response; either a token or an error code.
#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Userinfo endpoint response.
#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    name: Option<String>,
    email: Option<String>,
}

type AuthUrlHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Identity provider backed by Google's OAuth endpoints.
pub struct GoogleIdentityProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: Option<String>,
    scopes: Vec<String>,
    auth_url: String,
    token_url: String,
    revoke_url: String,
    userinfo_url: String,
    cache_path: Option<PathBuf>,
    redirect_timeout: Duration,
    auth_url_handler: AuthUrlHandler,
}

impl GoogleIdentityProvider {
    pub fn new(client_id: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: None,
            scopes,
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            revoke_url: REVOKE_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
            cache_path: default_cache_path(),
            redirect_timeout: DEFAULT_REDIRECT_TIMEOUT,
            auth_url_handler: Arc::new(|url| {
                crate::info!("Open this URL to sign in: {}", url);
            }),
        }
    }

    /// Set the client secret used by the code-exchange and refresh grants
    /// (builder pattern).
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Override the token cache location, or disable caching with `None`
    /// (builder pattern).
    pub fn with_cache_path(mut self, path: Option<PathBuf>) -> Self {
        self.cache_path = path;
        self
    }

    /// Override how the consent URL reaches the user (builder pattern).
    pub fn with_auth_url_handler(mut self, handler: AuthUrlHandler) -> Self {
        self.auth_url_handler = handler;
        self
    }

    /// Override how long the interactive flow waits for the redirect
    /// (builder pattern).
    pub fn with_redirect_timeout(mut self, timeout: Duration) -> Self {
        self.redirect_timeout = timeout;
        self
    }

    fn load_cached(&self) -> Option<StoredToken> {
        let path = self.cache_path.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn store_cached(&self, token: &StoredToken) {
        let Some(path) = self.cache_path.as_ref() else {
            return;
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string(token)?;
            std::fs::write(path, raw)
        };
        if let Err(e) = write() {
            crate::warn!("Failed to write token cache: {}", e);
        }
    }

    fn clear_cached(&self) {
        if let Some(path) = self.cache_path.as_ref() {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    crate::warn!("Failed to remove token cache: {}", e);
                }
            }
        }
    }

    async fn call_token_endpoint(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenEndpointResponse, TokenFailure> {
        let response = self
            .http
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| TokenFailure::Transport(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| TokenFailure::Transport(e.to_string()))
    }

    fn apply_token_response(
        &self,
        response: TokenEndpointResponse,
        refresh_token: Option<String>,
    ) -> Result<String, TokenFailure> {
        if let Some(code) = response.error {
            if let Some(detail) = response.error_description {
                crate::debug!("Token endpoint error {}: {}", code, detail);
            }
            return Err(TokenFailure::Protocol(code));
        }
        let access_token = match response.access_token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(TokenFailure::MissingToken),
        };
        // A refresh grant does not return the refresh token again; keep the
        // one we already had.
        let refresh_token = response.refresh_token.or(refresh_token);
        if let Some(refresh_token) = refresh_token {
            let lifetime = response.expires_in.unwrap_or(0);
            self.store_cached(&StoredToken {
                access_token: access_token.clone(),
                refresh_token,
                expires_at: chrono::Utc::now().timestamp() + lifetime - EXPIRY_MARGIN_SECS,
            });
        }
        Ok(access_token)
    }

    async fn silent_token(&self) -> Result<String, TokenFailure> {
        let Some(cached) = self.load_cached() else {
            // Nothing to refresh from; the same outcome as a no-session
            // silent request.
            return Err(TokenFailure::Protocol("interaction_required".to_string()));
        };

        if cached.expires_at > chrono::Utc::now().timestamp() {
            return Ok(cached.access_token);
        }

        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("refresh_token", cached.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        let response = self.call_token_endpoint(&params).await?;
        self.apply_token_response(response, Some(cached.refresh_token))
    }

    async fn interactive_token(&self) -> Result<String, TokenFailure> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|_| TokenFailure::Transport("popup_failed_to_open".to_string()))?;
        let port = listener
            .local_addr()
            .map_err(|e| TokenFailure::Transport(e.to_string()))?
            .port();
        let redirect_uri = format!("http://127.0.0.1:{port}");
        let state = uuid::Uuid::new_v4().to_string();

        let consent_url = build_consent_url(
            &self.auth_url,
            &self.client_id,
            &self.scopes,
            &redirect_uri,
            &state,
        )
        .map_err(|e| TokenFailure::Transport(e))?;
        (self.auth_url_handler)(&consent_url);

        let code = tokio::time::timeout(self.redirect_timeout, wait_for_redirect(&listener, &state))
            .await
            .map_err(|_| TokenFailure::Transport("user_cancel".to_string()))??;

        let mut params = vec![
            ("code", code.as_str()),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        let response = self.call_token_endpoint(&params).await?;
        self.apply_token_response(response, None)
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    async fn request_token(&self, prompt: Prompt) -> Result<String, TokenFailure> {
        match prompt {
            Prompt::None => self.silent_token().await,
            Prompt::Consent => self.interactive_token().await,
        }
    }

    async fn revoke_token(&self, token: &str) -> Result<(), ProviderError> {
        self.clear_cached();
        let response = self
            .http
            .post(&self.revoke_url)
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| ProviderError::new(None, e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::new(Some(status.as_u16()), body))
        }
    }

    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ProviderError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProviderError::new(None, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(Some(status.as_u16()), body));
        }
        let info: UserInfoResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(None, e.to_string()))?;
        Ok(UserProfile {
            name: info.name.unwrap_or_else(|| "User".to_string()),
            email: info.email.unwrap_or_else(|| "No email".to_string()),
        })
    }
}

/// Default token cache location, `<config dir>/sheetlog/token.json`.
fn default_cache_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sheetlog").join("token.json"))
}

/// Build the consent URL for the auth-code flow.
fn build_consent_url(
    auth_url: &str,
    client_id: &str,
    scopes: &[String],
    redirect_uri: &str,
    state: &str,
) -> Result<String, String> {
    let mut url = Url::parse(auth_url).map_err(|e| e.to_string())?;
    url.query_pairs_mut()
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &scopes.join(" "))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", state);
    Ok(url.into())
}

/// Accept one loopback connection and extract the authorization code from
/// the redirect.
async fn wait_for_redirect(listener: &TcpListener, expected_state: &str) -> Result<String, TokenFailure> {
    let (mut stream, _) = listener
        .accept()
        .await
        .map_err(|e| TokenFailure::Transport(e.to_string()))?;

    let mut buf = vec![0u8; 4096];
    let read = stream
        .read(&mut buf)
        .await
        .map_err(|e| TokenFailure::Transport(e.to_string()))?;
    let request = String::from_utf8_lossy(&buf[..read]);

    let outcome = parse_redirect_request(&request, expected_state);
    let page = match &outcome {
        Ok(_) => "Sign-in complete. You can close this window.",
        Err(_) => "Sign-in failed. You can close this window.",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        page.len(),
        page
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        crate::debug!("Failed to answer redirect request: {}", e);
    }

    outcome
}

/// Extract the authorization code from the redirect's request line.
fn parse_redirect_request(request: &str, expected_state: &str) -> Result<String, TokenFailure> {
    let line = request
        .lines()
        .next()
        .ok_or_else(|| TokenFailure::Transport("empty redirect request".to_string()))?;
    let target = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| TokenFailure::Transport("malformed redirect request".to_string()))?;
    let url = Url::parse(&format!("http://localhost{target}"))
        .map_err(|e| TokenFailure::Transport(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(reason) = error {
        return Err(TokenFailure::Protocol(reason));
    }
    if state.as_deref() != Some(expected_state) {
        return Err(TokenFailure::Transport("state_mismatch".to_string()));
    }
    code.ok_or_else(|| TokenFailure::Transport("redirect missing code".to_string()))
}

#[cfg(test)]
#[path = "google_test.rs"]
mod tests;
