//! Conversation list controller: persisted threads, independent of the active transcript.

use super::api::ChatBackend;
use crate::error::{AuthError, ClientError, Result};
use crate::models::Conversation;
use crate::session::SessionHandle;
use std::sync::Arc;

pub struct ConversationListController {
    backend: Arc<dyn ChatBackend>,
    session: SessionHandle,
    items: Vec<Conversation>,
}

impl ConversationListController {
    pub fn new(backend: Arc<dyn ChatBackend>, session: SessionHandle) -> Self {
        Self {
            backend,
            session,
            items: Vec::new(),
        }
    }

    /// Last fetched listing.
    pub fn list(&self) -> &[Conversation] {
        &self.items
    }

    /// Re-fetch the listing. Discarded if the session changed meanwhile.
    pub async fn refresh(&mut self) -> Result<&[Conversation]> {
        self.ensure_authenticated()?;
        let epoch = self.session.epoch();
        let items = self.backend.conversations().await?;
        if self.session.epoch() != epoch {
            log::warn!("conversations: session changed while refreshing, discarding result");
            return Ok(&self.items);
        }
        self.items = items;
        Ok(&self.items)
    }

    /// Fetch one conversation with all of its messages.
    pub async fn get(&self, id: i64) -> Result<Conversation> {
        self.ensure_authenticated()?;
        self.backend.conversation(id).await
    }

    /// Delete on the server and drop it from the listing. A conversation the server no longer
    /// has is dropped from the listing too, and the `NotFound` is still returned.
    pub async fn delete(&mut self, id: i64) -> Result<()> {
        self.ensure_authenticated()?;
        match self.backend.delete_conversation(id).await {
            Ok(()) => {
                self.items.retain(|c| c.id != id);
                log::info!("conversations: deleted {}", id);
                Ok(())
            }
            Err(e @ ClientError::NotFound(_)) => {
                self.items.retain(|c| c.id != id);
                log::debug!("conversations: {} already gone on the server", id);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Forget the cached listing (e.g. after logout).
    pub fn reset(&mut self) {
        self.items.clear();
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(AuthError::NotAuthenticated.into())
        }
    }
}
