//! Chat workspace: the active transcript plus the conversation listing, kept consistent.
//!
//! Selecting a conversation re-derives the transcript from its persisted messages; deleting the
//! active conversation detaches the transcript; a newly created conversation refreshes the list.
//! Both views belong to one session: when the session epoch moves (logout, expiry, another
//! login) they are dropped before the next operation, and a reply that lands after the change
//! is discarded.

use super::api::ChatBackend;
use super::conversations::ConversationListController;
use super::transcript::{ConversationController, SendOutcome};
use crate::error::{AuthError, ClientError, Result};
use crate::models::{Conversation, ConversationId};
use crate::session::SessionHandle;
use std::sync::Arc;

pub struct ChatWorkspace {
    transcript: ConversationController,
    conversations: ConversationListController,
    session: SessionHandle,
    epoch: u64,
}

impl ChatWorkspace {
    pub fn new(backend: Arc<dyn ChatBackend>, session: SessionHandle) -> Self {
        Self {
            transcript: ConversationController::new(backend.clone()),
            conversations: ConversationListController::new(backend, session.clone()),
            epoch: session.epoch(),
            session,
        }
    }

    pub fn transcript(&self) -> &ConversationController {
        &self.transcript
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.conversations.list()
    }

    pub fn active(&self) -> ConversationId {
        self.transcript.conversation_id()
    }

    /// Send a turn on the active transcript. A newly created conversation triggers a list refresh.
    pub async fn send(&mut self, text: &str) -> Result<SendOutcome> {
        self.sync_session();
        if !text.trim().is_empty() && !self.session.is_authenticated() {
            return Err(AuthError::NotAuthenticated.into());
        }
        let outcome = self.transcript.send_message(text).await?;
        if self.sync_session() {
            log::warn!("chat: session changed while sending, discarding reply");
            return Err(ClientError::Discarded);
        }
        if outcome.adopted {
            if let Err(e) = self.conversations.refresh().await {
                log::warn!("chat: refreshing conversations after create failed: {}", e);
            }
        }
        Ok(outcome)
    }

    pub async fn refresh(&mut self) -> Result<&[Conversation]> {
        self.sync_session();
        self.conversations.refresh().await
    }

    /// Switch to a persisted conversation. The transcript is reset first, so on failure it is left
    /// empty rather than showing another conversation's messages.
    pub async fn select(&mut self, id: i64) -> Result<()> {
        self.sync_session();
        self.transcript.clear();
        let conversation = self.conversations.get(id).await?;
        if self.sync_session() {
            return Err(ClientError::Discarded);
        }
        self.transcript.load(&conversation);
        log::debug!(
            "chat: selected conversation {} ({} messages)",
            id,
            self.transcript.messages().len()
        );
        Ok(())
    }

    /// Delete a conversation; if it is the active one the transcript is detached. A conversation
    /// the server no longer has is detached the same way before `NotFound` is returned.
    pub async fn delete(&mut self, id: i64) -> Result<()> {
        self.sync_session();
        let result = self.conversations.delete(id).await;
        if matches!(result, Ok(()) | Err(ClientError::NotFound(_)))
            && self.transcript.conversation_id() == ConversationId::Existing(id)
        {
            self.transcript.clear();
        }
        result
    }

    /// Start a fresh thread; nothing is deleted on the server.
    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// Drop all local state (after logout or credential expiry).
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.conversations.reset();
    }

    /// Reset when the session epoch moved since the views were built. Returns true if it did.
    fn sync_session(&mut self) -> bool {
        let current = self.session.epoch();
        if current == self.epoch {
            return false;
        }
        log::debug!("chat: session changed, dropping transcript and listing");
        self.reset();
        self.epoch = current;
        true
    }
}
