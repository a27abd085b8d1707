//! Conversation controller: the active transcript and its send state machine.
//!
//! `Empty` (no messages, no id) → `Pending` (user turn appended optimistically, request in
//! flight) → `Settled` (assistant reply appended, id known) → `Pending` on the next turn.
//! A failed turn restores the pre-send snapshot wholesale. The first successful reply on a
//! `ConversationId::New` transcript adopts the server id; that happens once per transcript.

use super::api::ChatBackend;
use crate::error::{ClientError, Result};
use crate::models::{ChatRequest, ChatResponse, Conversation, ConversationId, Message};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptState {
    Empty,
    Pending,
    Settled,
}

#[derive(Debug, Clone)]
struct Snapshot {
    messages: Vec<Message>,
    id: ConversationId,
    state: TranscriptState,
}

/// A turn that has been appended optimistically and is waiting for the server.
#[derive(Debug)]
pub struct PendingTurn {
    request: ChatRequest,
    snapshot: Snapshot,
    generation: u64,
}

impl PendingTurn {
    /// Body to dispatch to the chat endpoint.
    pub fn request(&self) -> &ChatRequest {
        &self.request
    }
}

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub reply: Message,
    pub conversation_id: i64,
    /// True when this turn assigned the transcript its id (first reply of a new conversation).
    pub adopted: bool,
}

pub struct ConversationController {
    backend: Arc<dyn ChatBackend>,
    messages: Vec<Message>,
    id: ConversationId,
    state: TranscriptState,
    /// Bumped by `clear` and `load`; a turn begun under an older generation is not applied.
    generation: u64,
    last_error: Option<ClientError>,
}

impl ConversationController {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            messages: Vec::new(),
            id: ConversationId::New,
            state: TranscriptState::Empty,
            generation: 0,
            last_error: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.id
    }

    pub fn state(&self) -> TranscriptState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == TranscriptState::Pending
    }

    /// Error of the last failed turn, until dismissed or the next turn starts.
    pub fn last_error(&self) -> Option<&ClientError> {
        self.last_error.as_ref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Send one user turn and reconcile the reply. Dropping the returned future before it
    /// completes (timeout, `select!`, task abort) rolls the turn back as if it had failed.
    pub async fn send_message(&mut self, text: &str) -> Result<SendOutcome> {
        let backend = self.backend.clone();
        let turn = self.begin(text)?;
        let request = turn.request.clone();
        let mut in_flight = InFlight {
            controller: self,
            turn: Some(turn),
        };
        let result = backend.send(&request).await;
        in_flight.settle(result)
    }

    /// Validate and optimistically append a user turn. Fails with `Busy` while another turn is pending.
    pub fn begin(&mut self, text: &str) -> Result<PendingTurn> {
        if text.trim().is_empty() {
            return Err(ClientError::Validation("message is empty".to_string()));
        }
        if self.is_pending() {
            return Err(ClientError::Busy);
        }
        let snapshot = Snapshot {
            messages: self.messages.clone(),
            id: self.id,
            state: self.state,
        };
        self.messages.push(Message::user(text));
        self.state = TranscriptState::Pending;
        self.last_error = None;
        let request = ChatRequest {
            message: text.to_string(),
            conversation_history: self.messages.clone(),
            conversation_id: self.id.get(),
        };
        Ok(PendingTurn {
            request,
            snapshot,
            generation: self.generation,
        })
    }

    /// Apply the server's answer to a pending turn: append the reply (adopting the id if new) or roll back.
    pub fn finish(
        &mut self,
        turn: PendingTurn,
        result: Result<ChatResponse>,
    ) -> Result<SendOutcome> {
        if turn.generation != self.generation {
            log::debug!("chat: transcript was reset while sending, dropping reply");
            return Err(ClientError::Discarded);
        }
        match result {
            Ok(res) => {
                let reply = Message::assistant(res.message);
                self.messages.push(reply.clone());
                self.state = TranscriptState::Settled;
                let adopted = match self.id {
                    ConversationId::New => {
                        log::info!("chat: conversation {} created", res.conversation_id);
                        self.id = ConversationId::Existing(res.conversation_id);
                        true
                    }
                    ConversationId::Existing(known) => {
                        if known != res.conversation_id {
                            log::warn!(
                                "chat: server replied for conversation {} but transcript is {}, keeping {}",
                                res.conversation_id,
                                known,
                                known
                            );
                        }
                        false
                    }
                };
                let conversation_id = self.id.get().unwrap_or(res.conversation_id);
                Ok(SendOutcome {
                    reply,
                    conversation_id,
                    adopted,
                })
            }
            Err(e) => {
                self.restore(turn.snapshot);
                log::debug!("chat: send failed, rolled back: {}", e);
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Give up on a pending turn without a reply; the pre-send transcript comes back.
    pub fn cancel(&mut self, turn: PendingTurn) {
        if turn.generation != self.generation {
            return;
        }
        self.restore(turn.snapshot);
        log::debug!("chat: pending turn abandoned, rolled back");
    }

    fn restore(&mut self, snapshot: Snapshot) {
        let Snapshot {
            messages,
            id,
            state,
        } = snapshot;
        self.messages = messages;
        self.id = id;
        self.state = state;
    }

    /// Detach the local view and start a fresh thread. The server conversation is untouched.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.id = ConversationId::New;
        self.state = TranscriptState::Empty;
        self.last_error = None;
        self.generation += 1;
    }

    /// Replace the transcript with exactly this conversation's persisted messages.
    pub fn load(&mut self, conversation: &Conversation) {
        self.messages = conversation.transcript();
        self.id = ConversationId::Existing(conversation.id);
        self.state = TranscriptState::Settled;
        self.last_error = None;
        self.generation += 1;
    }
}

/// A turn whose request is on the wire. Rolls back on drop unless settled.
struct InFlight<'a> {
    controller: &'a mut ConversationController,
    turn: Option<PendingTurn>,
}

impl InFlight<'_> {
    fn settle(&mut self, result: Result<ChatResponse>) -> Result<SendOutcome> {
        match self.turn.take() {
            Some(turn) => self.controller.finish(turn, result),
            None => Err(ClientError::Discarded),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(turn) = self.turn.take() {
            self.controller.cancel(turn);
        }
    }
}
