//! Authenticated session: the bearer credential, its persistence, and the forced-logout signal.
//!
//! `SessionHandle` is the shared context object injected into the gateway and every controller.
//! `SessionStore` adds the account operations (login, register, logout) on top of it and
//! delegates the remote calls to an [`AuthBackend`](crate::auth::AuthBackend).

use crate::auth::AuthBackend;
use crate::credential::CredentialStore;
use crate::error::{AuthError, ClientError};
use crate::models::RegisterRequest;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Session transitions, published on one broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    /// Explicit logout by the user.
    LoggedOut,
    /// The server rejected the credential; the session was cleared and the user must log in again.
    Expired,
}

#[derive(Debug, Default)]
struct SessionState {
    credential: Option<String>,
    /// Bumped on every credential change; results requested under an older epoch are stale.
    epoch: u64,
}

/// Shared handle to the current credential. Cloning is cheap; all clones see the same session.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<RwLock<SessionState>>,
    store: Arc<dyn CredentialStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Build a session from whatever credential the store already holds.
    pub fn restore(store: Arc<dyn CredentialStore>) -> Self {
        let credential = store.load();
        if credential.is_some() {
            log::debug!("session: restored stored credential");
        }
        let (events, _) = broadcast::channel(16);
        Self {
            state: Arc::new(RwLock::new(SessionState {
                credential,
                epoch: 0,
            })),
            store,
            events,
        }
    }

    pub fn credential(&self) -> Option<String> {
        self.read(|s| s.credential.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read(|s| s.credential.as_deref().is_some_and(|t| !t.is_empty()))
    }

    pub fn epoch(&self) -> u64 {
        self.read(|s| s.epoch)
    }

    /// Receive session transitions (login, logout, expiry).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Install a freshly issued credential and persist it.
    pub(crate) fn establish(&self, token: &str) {
        self.write(|s| {
            s.credential = Some(token.to_string());
            s.epoch += 1;
        });
        if let Err(e) = self.store.save(token) {
            log::warn!("session: failed to persist credential: {}", e);
        }
        log::info!("session: logged in");
        let _ = self.events.send(SessionEvent::LoggedIn);
    }

    /// Clear the credential in memory and in storage. Idempotent.
    pub fn logout(&self) {
        let had = self.clear_if(|_| true);
        if let Err(e) = self.store.clear() {
            log::warn!("session: failed to remove stored credential: {}", e);
        }
        if had {
            log::info!("session: logged out");
            let _ = self.events.send(SessionEvent::LoggedOut);
        }
    }

    /// Forced logout after the server rejected `rejected`. A credential installed since that
    /// request was sent is left alone. Returns true when the session was cleared.
    pub(crate) fn expire(&self, rejected: &str) -> bool {
        let cleared = self.clear_if(|current| current == rejected);
        if cleared {
            if let Err(e) = self.store.clear() {
                log::warn!("session: failed to remove stored credential: {}", e);
            }
            log::warn!("session: credential rejected by server, logged out");
            let _ = self.events.send(SessionEvent::Expired);
        }
        cleared
    }

    fn clear_if(&self, pred: impl FnOnce(&str) -> bool) -> bool {
        self.write(|s| match s.credential.as_deref() {
            Some(current) if pred(current) => {
                s.credential = None;
                s.epoch += 1;
                true
            }
            _ => false,
        })
    }

    fn read<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        let g = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&g)
    }

    fn write<T>(&self, f: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut g = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut g)
    }
}

/// Account operations over a shared session.
pub struct SessionStore {
    handle: SessionHandle,
    auth: Arc<dyn AuthBackend>,
}

impl SessionStore {
    pub fn new(handle: SessionHandle, auth: Arc<dyn AuthBackend>) -> Self {
        Self { handle, auth }
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Exchange username/password for a token and make it the current credential.
    /// On failure the session is unchanged.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        let res = self
            .auth
            .request_token(username.trim(), password)
            .await
            .map_err(classify_login_error)?;
        let token = res.access_token.trim();
        if token.is_empty() {
            return Err(AuthError::Unavailable("empty access token".to_string()));
        }
        if !res.token_type.is_empty() && !res.token_type.eq_ignore_ascii_case("bearer") {
            log::debug!("session: unexpected token type {:?}", res.token_type);
        }
        self.handle.establish(token);
        Ok(())
    }

    /// Create an account, then log in with the same credentials.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<(), AuthError> {
        let email = email.trim();
        let username = username.trim();
        if email.is_empty() || username.is_empty() || password.is_empty() {
            return Err(AuthError::Rejected(
                "email, username and password are required".to_string(),
            ));
        }
        let req = RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            full_name: full_name
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        };
        let user = self
            .auth
            .create_account(&req)
            .await
            .map_err(classify_register_error)?;
        log::info!("session: registered account {}", user.username);
        self.login(username, password).await
    }

    pub fn logout(&self) {
        self.handle.logout();
    }

    pub fn is_authenticated(&self) -> bool {
        self.handle.is_authenticated()
    }
}

fn classify_login_error(e: ClientError) -> AuthError {
    match e {
        ClientError::Auth(a) => a,
        ClientError::Http(h) if matches!(h.status, Some(400) | Some(401) | Some(403)) => {
            AuthError::InvalidCredentials
        }
        other => AuthError::Unavailable(other.to_string()),
    }
}

fn classify_register_error(e: ClientError) -> AuthError {
    match e {
        ClientError::Auth(a) => a,
        ClientError::Http(h) if h.status.is_some_and(|s| (400..500).contains(&s)) => {
            AuthError::Rejected(h.message)
        }
        other => AuthError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::MemoryCredentialStore;
    use crate::error::HttpError;
    use crate::models::{TokenResponse, User};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeAuth {
        existing: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AuthBackend for FakeAuth {
        async fn request_token(
            &self,
            username: &str,
            password: &str,
        ) -> Result<TokenResponse, ClientError> {
            self.calls.lock().unwrap().push(format!("token:{}", username));
            if password == "secret" {
                Ok(TokenResponse {
                    access_token: format!("tok-{}", username),
                    token_type: "bearer".into(),
                })
            } else if password == "down" {
                Err(ClientError::Http(HttpError::transport("connection refused")))
            } else {
                Err(ClientError::Http(HttpError::new(401, "Incorrect username or password")))
            }
        }

        async fn create_account(&self, req: &RegisterRequest) -> Result<User, ClientError> {
            self.calls.lock().unwrap().push(format!("register:{}", req.username));
            let mut existing = self.existing.lock().unwrap();
            if existing.contains(&req.username) {
                return Err(ClientError::Http(HttpError::new(400, "Username already registered")));
            }
            existing.push(req.username.clone());
            Ok(User {
                id: 1,
                email: req.email.clone(),
                username: req.username.clone(),
                full_name: req.full_name.clone(),
                is_active: true,
                created_at: None,
            })
        }
    }

    fn store_with(auth: Arc<FakeAuth>, creds: Arc<MemoryCredentialStore>) -> SessionStore {
        SessionStore::new(SessionHandle::restore(creds), auth)
    }

    #[tokio::test]
    async fn login_persists_and_publishes() {
        let creds = Arc::new(MemoryCredentialStore::new());
        let store = store_with(Arc::new(FakeAuth::default()), creds.clone());
        let mut rx = store.handle().subscribe();
        assert!(!store.is_authenticated());
        store.login("ana", "secret").await.unwrap();
        assert!(store.is_authenticated());
        assert_eq!(creds.load().as_deref(), Some("tok-ana"));
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::LoggedIn);
    }

    #[tokio::test]
    async fn failed_login_leaves_session_unchanged() {
        let creds = Arc::new(MemoryCredentialStore::with_token("old"));
        let store = store_with(Arc::new(FakeAuth::default()), creds.clone());
        let epoch = store.handle().epoch();
        assert_eq!(
            store.login("ana", "wrong").await.unwrap_err(),
            AuthError::InvalidCredentials
        );
        assert!(matches!(
            store.login("ana", "down").await.unwrap_err(),
            AuthError::Unavailable(_)
        ));
        assert_eq!(store.handle().credential().as_deref(), Some("old"));
        assert_eq!(store.handle().epoch(), epoch);
        assert_eq!(creds.load().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn register_then_logs_in_and_rejects_duplicates() {
        let auth = Arc::new(FakeAuth::default());
        let store = store_with(auth.clone(), Arc::new(MemoryCredentialStore::new()));
        store
            .register("a@x.io", "ana", "secret", Some("Ana"))
            .await
            .unwrap();
        assert_eq!(store.handle().credential().as_deref(), Some("tok-ana"));
        assert_eq!(
            *auth.calls.lock().unwrap(),
            vec!["register:ana".to_string(), "token:ana".to_string()]
        );
        store.logout();
        let err = store
            .register("a@x.io", "ana", "secret", None)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Rejected("Username already registered".into()));
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_publishes_once() {
        let creds = Arc::new(MemoryCredentialStore::with_token("t"));
        let handle = SessionHandle::restore(creds.clone());
        let mut rx = handle.subscribe();
        handle.logout();
        handle.logout();
        assert!(!handle.is_authenticated());
        assert_eq!(creds.load(), None);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::LoggedOut);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn expire_ignores_a_newer_credential() {
        let handle = SessionHandle::restore(Arc::new(MemoryCredentialStore::with_token("new")));
        assert!(!handle.expire("old"));
        assert!(handle.is_authenticated());
        assert!(handle.expire("new"));
        assert!(!handle.is_authenticated());
        assert!(!handle.expire("new"));
    }
}
