//! Auth collaborator: account creation and token issuance.

use crate::config::Endpoints;
use crate::error::ClientError;
use crate::gateway::{decode, Gateway, RequestBody};
use crate::models::{RegisterRequest, TokenResponse, User};
use async_trait::async_trait;
use reqwest::Method;

/// Remote auth service used by the session store.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange username/password for a bearer token.
    async fn request_token(&self, username: &str, password: &str)
        -> Result<TokenResponse, ClientError>;

    /// Create an account.
    async fn create_account(&self, req: &RegisterRequest) -> Result<User, ClientError>;
}

/// Auth endpoints reached through the gateway (`/auth/register`, form-encoded `/auth/token`).
pub struct HttpAuth {
    gateway: Gateway,
    endpoints: Endpoints,
}

impl HttpAuth {
    pub fn new(gateway: Gateway, endpoints: Endpoints) -> Self {
        Self { gateway, endpoints }
    }
}

#[async_trait]
impl AuthBackend for HttpAuth {
    async fn request_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, ClientError> {
        let form = vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ];
        let v = self
            .gateway
            .call_anonymous(Method::POST, &self.endpoints.token, Some(RequestBody::Form(form)))
            .await?;
        decode(v)
    }

    async fn create_account(&self, req: &RegisterRequest) -> Result<User, ClientError> {
        let body = serde_json::to_value(req).map_err(|e| ClientError::Decode(e.to_string()))?;
        let v = self
            .gateway
            .call_anonymous(Method::POST, &self.endpoints.register, Some(RequestBody::Json(body)))
            .await?;
        decode(v)
    }
}
