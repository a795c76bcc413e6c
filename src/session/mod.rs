//! Authenticated controller session: token acquisition and lazy renewal.
//!
//! [`SessionManager`] owns one bearer token plus the credentials needed to
//! mint a new one, and hands out request headers that are valid at the moment
//! of return. Renewal is serialized behind an async mutex so concurrent tool
//! invocations that both observe an expired token trigger a single
//! re-authentication instead of a redundant pair.

pub mod jwt;

use crate::config::ControllerConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;

/// Tokens expiring within this window are treated as already expired, so a
/// token cannot lapse between the freshness check and the outbound call.
const EXPIRY_LEEWAY_SECS: u64 = 5;

/// Immutable credentials for the controller's password-grant token endpoint.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl From<&ControllerConfig> for Credentials {
    fn from(c: &ControllerConfig) -> Self {
        Self {
            base_url: c.base_url.trim_end_matches('/').to_string(),
            client_id: c.client_id.clone(),
            client_secret: c.client_secret.clone(),
            username: c.username.clone(),
            password: c.password.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("token response missing access_token")]
    MissingToken,
    #[error("could not decode token expiry: {0}")]
    BadToken(#[from] jwt::JwtDecodeError),
    #[error("could not build Authorization header from token")]
    BadHeaderValue,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// One minted token and everything derived from it.
struct TokenState {
    access_token: String,
    /// Exact `exp` decoded from the current token's claims, epoch seconds.
    expires_at: u64,
    headers: HeaderMap,
}

impl TokenState {
    fn is_fresh(&self, now: u64) -> bool {
        now + EXPIRY_LEEWAY_SECS < self.expires_at
    }
}

/// Process-wide session manager for one controller.
pub struct SessionManager {
    creds: Credentials,
    http: reqwest::Client,
    state: Mutex<Option<TokenState>>,
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn derive_headers(access_token: &str) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|_| AuthError::BadHeaderValue)?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
}

impl SessionManager {
    /// Build a session manager without contacting the controller.
    ///
    /// `insecure_tls` disables certificate validation for the token endpoint
    /// (self-signed internal controllers); the forwarder carries the same flag
    /// for data calls.
    pub fn new(creds: Credentials, insecure_tls: bool, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            creds,
            http,
            state: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.creds.base_url
    }

    /// Perform the initial password-grant authentication.
    pub async fn connect(&self) -> Result<(), AuthError> {
        let mut guard = self.state.lock().await;
        *guard = Some(self.authenticate().await?);
        Ok(())
    }

    /// Return headers valid for at least one outbound call, renewing the
    /// token first when it is expired or expiring within the leeway window.
    ///
    /// A fresh token never triggers a network call.
    pub async fn headers(&self) -> Result<HeaderMap, AuthError> {
        let mut guard = self.state.lock().await;

        if let Some(state) = guard.as_ref() {
            if state.is_fresh(now_epoch_secs()) {
                return Ok(state.headers.clone());
            }
        }

        // Expired, expiring, or never minted: renew while holding the lock so
        // concurrent callers wait for this renewal instead of duplicating it.
        let state = self.authenticate().await?;
        let headers = state.headers.clone();
        *guard = Some(state);
        Ok(headers)
    }

    async fn authenticate(&self) -> Result<TokenState, AuthError> {
        let payload = json!({
            "client_id": self.creds.client_id,
            "client_secret": self.creds.client_secret,
            "username": self.creds.username,
            "password": self.creds.password,
            "grant_type": "password",
        });

        tracing::debug!(url = %self.creds.base_url, "Requesting controller access token");

        let response = self
            .http
            .post(format!("{}/auth/token", self.creds.base_url))
            .header(ACCEPT, "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse =
            response.json().await.map_err(AuthError::Transport)?;
        let access_token = token_response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let expires_at = jwt::decode_exp_unverified(&access_token)?;
        let headers = derive_headers(&access_token)?;

        tracing::info!(expires_at, "Controller token acquired");

        Ok(TokenState {
            access_token,
            expires_at,
            headers,
        })
    }

    /// Seed a token directly, bypassing the network. Test use only.
    #[cfg(test)]
    pub(crate) async fn seed_token(&self, access_token: &str, expires_at: u64) {
        let mut guard = self.state.lock().await;
        *guard = Some(TokenState {
            access_token: access_token.to_string(),
            expires_at,
            headers: derive_headers(access_token).unwrap(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_session() -> SessionManager {
        // Reserved TEST-NET-1 address: any renewal attempt fails fast rather
        // than silently succeeding against something real.
        SessionManager::new(
            Credentials {
                base_url: "https://192.0.2.1:9183".into(),
                client_id: "cid".into(),
                client_secret: "cs".into(),
                username: "admin".into(),
                password: "pw".into(),
            },
            true,
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn credentials_from_config_strip_trailing_slash() {
        let config = ControllerConfig {
            base_url: "https://director.example.net/".into(),
            ..ControllerConfig::default()
        };
        let creds = Credentials::from(&config);
        assert_eq!(creds.base_url, "https://director.example.net");
    }

    #[test]
    fn derived_headers_follow_token() {
        let headers = derive_headers("tok-123").unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok-123");
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn token_freshness_honors_leeway() {
        let state = TokenState {
            access_token: "t".into(),
            expires_at: 1_000,
            headers: derive_headers("t").unwrap(),
        };
        assert!(state.is_fresh(994));
        // Within the 5s leeway window counts as expired.
        assert!(!state.is_fresh(995));
        assert!(!state.is_fresh(1_000));
        assert!(!state.is_fresh(2_000));
    }

    #[tokio::test]
    async fn fresh_token_returns_headers_without_network() {
        let session = unreachable_session();
        let far_future = now_epoch_secs() + 3_600;
        session.seed_token("fresh-token", far_future).await;

        // The base URL is unreachable, so this only succeeds if no renewal
        // was attempted.
        let headers = session.headers().await.unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer fresh-token");
    }

    #[tokio::test]
    async fn expired_token_triggers_renewal_and_failure_propagates() {
        let session = unreachable_session();
        session.seed_token("stale-token", 1).await;

        let err = session.headers().await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn connect_failure_is_auth_error() {
        let session = unreachable_session();
        assert!(session.connect().await.is_err());
    }
}
