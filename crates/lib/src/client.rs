//! Wiring: one session, one gateway, and the controllers built on them.

use crate::auth::HttpAuth;
use crate::chat::{ChatWorkspace, HttpChat};
use crate::config::{self, Config, Endpoints};
use crate::credential::{CredentialStore, FileCredentialStore};
use crate::error::ClientError;
use crate::gateway::Gateway;
use crate::session::{SessionEvent, SessionHandle, SessionStore};
use crate::tasks::{HttpTasks, TaskController};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Entry point for front ends: owns the session store and hands out controllers that share it.
pub struct Client {
    gateway: Gateway,
    endpoints: Endpoints,
    session: SessionStore,
}

impl Client {
    /// Client with the token persisted at the configured token path.
    pub fn from_config(config: &Config, config_path: &Path) -> Result<Self, ClientError> {
        let token_path = config::resolve_token_path(config, config_path);
        log::debug!("credential file: {}", token_path.display());
        Self::with_store(config, Arc::new(FileCredentialStore::new(token_path)))
    }

    pub fn with_store(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self, ClientError> {
        let handle = SessionHandle::restore(store);
        let gateway = Gateway::from_config(config, handle.clone())?;
        let endpoints = Endpoints::resolve(&config.api);
        let auth = Arc::new(HttpAuth::new(gateway.clone(), endpoints.clone()));
        Ok(Self {
            session: SessionStore::new(handle, auth),
            gateway,
            endpoints,
        })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Session transitions; `SessionEvent::Expired` is the forced-logout signal.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.handle().subscribe()
    }

    pub fn tasks(&self) -> TaskController {
        let backend = Arc::new(HttpTasks::new(self.gateway.clone(), self.endpoints.clone()));
        TaskController::new(backend, self.session.handle().clone())
    }

    pub fn chat(&self) -> ChatWorkspace {
        let backend = Arc::new(HttpChat::new(self.gateway.clone(), self.endpoints.clone()));
        ChatWorkspace::new(backend, self.session.handle().clone())
    }
}
