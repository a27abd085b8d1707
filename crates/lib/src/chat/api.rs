//! Chat endpoints: send a turn, list/get/delete persisted conversations.

use crate::config::Endpoints;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::models::{ChatRequest, ChatResponse, Conversation};
use async_trait::async_trait;
use reqwest::Method;

/// Remote chat service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one turn with its full history; the reply carries the (possibly new) conversation id.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse>;
    async fn conversations(&self) -> Result<Vec<Conversation>>;
    async fn conversation(&self, id: i64) -> Result<Conversation>;
    async fn delete_conversation(&self, id: i64) -> Result<()>;
}

/// Chat endpoints reached through the gateway.
pub struct HttpChat {
    gateway: Gateway,
    endpoints: Endpoints,
}

impl HttpChat {
    pub fn new(gateway: Gateway, endpoints: Endpoints) -> Self {
        Self { gateway, endpoints }
    }
}

fn conversation_label(id: i64) -> impl FnOnce() -> String {
    move || format!("conversation {}", id)
}

#[async_trait]
impl ChatBackend for HttpChat {
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let res = self
            .gateway
            .send_json(Method::POST, &self.endpoints.chat, req)
            .await;
        match req.conversation_id {
            Some(id) => res.map_err(|e| e.not_found_as(conversation_label(id))),
            None => res,
        }
    }

    async fn conversations(&self) -> Result<Vec<Conversation>> {
        self.gateway.get(&self.endpoints.conversations).await
    }

    async fn conversation(&self, id: i64) -> Result<Conversation> {
        self.gateway
            .get(&self.endpoints.conversation(id))
            .await
            .map_err(|e| e.not_found_as(conversation_label(id)))
    }

    async fn delete_conversation(&self, id: i64) -> Result<()> {
        self.gateway
            .call(Method::DELETE, &self.endpoints.conversation(id), None, None)
            .await
            .map(|_| ())
            .map_err(|e| e.not_found_as(conversation_label(id)))
    }
}
