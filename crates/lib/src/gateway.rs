//! Remote API gateway: the single HTTP client every other component calls through.
//!
//! Injects the session credential as a bearer header. A 401 on a request that carried a
//! credential clears the session (one `SessionEvent::Expired` on the session channel) and is
//! returned as `AuthError::Expired` instead of the server's body. No retries.

use crate::config::{self, Config};
use crate::error::{AuthError, ClientError, HttpError, Result};
use crate::session::SessionHandle;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 200;

/// Request payload: JSON (most endpoints) or form-encoded (`/auth/token`).
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

/// HTTP client bound to one API origin and one session.
#[derive(Clone)]
pub struct Gateway {
    base_url: String,
    client: reqwest::Client,
    session: SessionHandle,
}

impl Gateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration, session: SessionHandle) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpError::from)?;
        Ok(Self {
            base_url,
            client,
            session,
        })
    }

    /// Gateway for the configured origin (TASKTALK_API_URL wins) and timeout.
    pub fn from_config(config: &Config, session: SessionHandle) -> Result<Self> {
        Self::new(
            config::resolve_base_url(config),
            Duration::from_secs(config.api.timeout_secs.max(1)),
            session,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Perform one call and return the decoded JSON body (`null` for empty bodies).
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
        query: Option<&[(&str, String)]>,
    ) -> Result<Value> {
        self.execute(method, path, body, query, self.session.credential())
            .await
    }

    /// Same as [`call`](Self::call) but never sends the credential (login and registration),
    /// so a stale stored token cannot turn a bad password into a forced logout.
    pub async fn call_anonymous(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<Value> {
        self.execute(method, path, body, None, None).await
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
        query: Option<&[(&str, String)]>,
        credential: Option<String>,
    ) -> Result<Value> {
        let url = self.url(path);
        let mut req = self.client.request(method.clone(), &url);
        if let Some(q) = query {
            req = req.query(q);
        }
        if let Some(ref token) = credential {
            req = req.bearer_auth(token);
        }
        match body {
            Some(RequestBody::Json(v)) => req = req.json(&v),
            Some(RequestBody::Form(fields)) => req = req.form(&fields),
            None => {}
        }

        log::debug!("gateway: {} {}", method, url);
        let res = req.send().await.map_err(HttpError::from)?;
        let status = res.status();
        let text = res.text().await.map_err(HttpError::from)?;

        if !status.is_success() {
            let message = error_message(status, &text);
            if status == StatusCode::UNAUTHORIZED {
                if let Some(token) = credential {
                    return Err(self.credential_rejected(&token, message));
                }
            }
            log::debug!("gateway: {} {} -> {} {}", method, url, status.as_u16(), message);
            return Err(HttpError::new(status.as_u16(), message).into());
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(format!("{}: {}", url, e)))
    }

    /// A 401 for `token`. Only the current credential expires the session; a token already
    /// replaced by a newer login yields a plain 401 and leaves the new session alone.
    fn credential_rejected(&self, token: &str, message: String) -> ClientError {
        if self.session.expire(token) {
            AuthError::Expired.into()
        } else {
            log::debug!("gateway: 401 for a superseded credential, session kept");
            HttpError::new(StatusCode::UNAUTHORIZED.as_u16(), message).into()
        }
    }

    /// GET and decode.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let v = self.call(Method::GET, path, None, None).await?;
        decode(v)
    }

    /// Send a JSON body with the given method and decode the reply.
    pub async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        let v = self.call(method, path, Some(RequestBody::Json(body)), None).await?;
        decode(v)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

/// Decode a gateway result into a model type.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Human-readable error from a failed response: FastAPI `detail` (string or validation list),
/// `message`, the body text, or the status reason.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        match v.get("detail") {
            Some(Value::String(s)) => return s.clone(),
            Some(Value::Array(items)) => {
                let msgs: Vec<&str> = items
                    .iter()
                    .filter_map(|i| i.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if !msgs.is_empty() {
                    return msgs.join("; ");
                }
            }
            _ => {}
        }
        if let Some(s) = v.get("message").and_then(|m| m.as_str()) {
            return s.to_string();
        }
    }
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("error").to_string()
    } else {
        body.chars().take(MAX_ERROR_BODY).collect()
    }
}
