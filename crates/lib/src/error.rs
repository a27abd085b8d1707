//! Error taxonomy shared by the gateway and all controllers.
//!
//! Validation errors never reach the network. Auth errors cover bad credentials and
//! credential expiry (the latter is also published as a forced logout). Everything else
//! is an `HttpError` that callers classify by status.

/// Failure of a single gateway call: HTTP status (None for transport failures) and a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", display_http(.status, .message))]
pub struct HttpError {
    pub status: Option<u16>,
    pub message: String,
}

fn display_http(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(s) => format!("http {}: {}", s, message),
        None => format!("request failed: {}", message),
    }
}

impl HttpError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// 400 and 422 (FastAPI request validation).
    pub fn is_validation(&self) -> bool {
        matches!(self.status, Some(400) | Some(422))
    }

    pub fn is_server(&self) -> bool {
        matches!(self.status, Some(s) if s >= 500)
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(s) => HttpError::new(s.as_u16(), e.to_string()),
            None => HttpError::transport(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("account rejected: {0}")]
    Rejected(String),
    #[error("auth service unavailable: {0}")]
    Unavailable(String),
    #[error("session expired, log in again")]
    Expired,
    #[error("not logged in")]
    NotAuthenticated,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("a chat message is already being sent")]
    Busy,
    #[error("result discarded: the view changed while the request was in flight")]
    Discarded,
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// True when the failure is a credential expiry already handled by a forced logout.
    pub fn is_expired(&self) -> bool {
        matches!(self, ClientError::Auth(AuthError::Expired))
    }

    /// Map a 404 from the gateway to `NotFound` with the given entity label.
    pub(crate) fn not_found_as(self, what: impl FnOnce() -> String) -> Self {
        match self {
            ClientError::Http(ref e) if e.is_not_found() => ClientError::NotFound(what()),
            other => other,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(HttpError::from(e))
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
