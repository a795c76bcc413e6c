//! Generic request forwarding to the controller REST API.
//!
//! [`RequestForwarder`] turns a (path, method, query, body) tuple into an
//! authenticated HTTP call and normalizes the response into JSON-or-text.
//! Every outbound call pulls headers from the shared [`SessionManager`], so
//! token renewal happens lazily on the first call after expiry.

use crate::session::SessionManager;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// HTTP methods accepted by the controller surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => anyhow::bail!("Unsupported HTTP method: {other}"),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Drop query entries whose value is empty; the controller treats a bare
/// `key=` differently from an absent key, so omitted values are never sent.
pub fn filter_query(params: &[(&str, Option<String>)]) -> Vec<(String, String)> {
    params
        .iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| ((*key).to_string(), v.to_string()))
        })
        .collect()
}

/// Normalize a response body: JSON passes through parsed, anything else
/// becomes `{"text": ...}` (never an error), with `status_code` attached when
/// the controller signalled failure.
fn normalize_body(status: reqwest::StatusCode, text: String) -> Value {
    match serde_json::from_str::<Value>(&text) {
        Ok(parsed) => parsed,
        Err(_) if status.is_success() => json!({ "text": text }),
        Err(_) => json!({ "text": text, "status_code": status.as_u16() }),
    }
}

/// Authenticated forwarder for one controller.
pub struct RequestForwarder {
    session: Arc<SessionManager>,
    http: reqwest::Client,
}

impl RequestForwarder {
    pub fn new(
        session: Arc<SessionManager>,
        insecure_tls: bool,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { session, http })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Forward a call and normalize the response.
    ///
    /// `path` is relative to the controller base URL and may already carry a
    /// pre-encoded query string (the live-status command family embeds
    /// literal `%2F` sequences that must not be re-encoded); `query` entries
    /// are appended to whatever the path carries. JSON bodies apply to
    /// non-GET methods only.
    ///
    /// A body that parses as JSON is returned as-is. A non-JSON 2xx body
    /// becomes `{"text": <body>}`; a non-JSON error body additionally carries
    /// `"status_code"`. Only transport failures (refused, timeout) error.
    pub async fn forward(
        &self,
        path: &str,
        method: Method,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let (status, text) = self.dispatch(path, method, query, body).await?;
        Ok(normalize_body(status, text))
    }

    /// Forward a call and return the raw body string (resource façade).
    pub async fn forward_raw(
        &self,
        path: &str,
        method: Method,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<String> {
        let (_, text) = self.dispatch(path, method, query, body).await?;
        Ok(text)
    }

    async fn dispatch(
        &self,
        path: &str,
        method: Method,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<(reqwest::StatusCode, String)> {
        let headers = self.session.headers().await?;
        let url = format!("{}{}", self.session.base_url(), path);

        let mut request = self
            .http
            .request(method.as_reqwest(), &url)
            .headers(headers);

        if !query.is_empty() {
            request = request.query(query);
        }
        if method != Method::Get {
            if let Some(body) = body {
                request = request.json(body);
            }
        }

        tracing::debug!(%method, %url, "Forwarding controller request");

        let response = request
            .send()
            .await
            .with_context(|| format!("{method} {url} failed"))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("{method} {url}: failed to read response body"))?;

        if !status.is_success() {
            tracing::warn!(%method, %url, status = status.as_u16(), "Controller returned error status");
        }

        Ok((status, text))
    }
}
