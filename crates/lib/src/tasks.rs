//! Task list controller: CRUD and completion against the server, with a cached snapshot.
//!
//! Every successful mutation is followed by a full refresh, so the cache is always the last
//! successful server snapshot; there is no local patching. Filters are pure projections over
//! that snapshot and never re-query the server.

use crate::config::Endpoints;
use crate::error::{AuthError, ClientError, Result};
use crate::gateway::{decode, Gateway};
use crate::models::{Task, TaskCreate, TaskListEnvelope, TaskUpdate};
use crate::session::SessionHandle;
use async_trait::async_trait;
use reqwest::Method;
use std::str::FromStr;
use std::sync::Arc;

/// Client-side view over the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TaskFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Active => !task.completed,
            TaskFilter::Completed => task.completed,
        }
    }
}

impl FromStr for TaskFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TaskFilter::All),
            "active" => Ok(TaskFilter::Active),
            "completed" | "done" => Ok(TaskFilter::Completed),
            other => Err(format!("unknown filter: {} (expected all, active, completed)", other)),
        }
    }
}

/// Counts per filter; `all == active + completed` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub all: usize,
    pub active: usize,
    pub completed: usize,
}

/// User confirmation for destructive actions (UI-level guard).
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Remote task operations.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// All tasks, optionally filtered by completion on the server.
    async fn list(&self, completed: Option<bool>) -> Result<Vec<Task>>;
    async fn get(&self, id: i64) -> Result<Task>;
    async fn create(&self, task: &TaskCreate) -> Result<Task>;
    async fn update(&self, id: i64, update: &TaskUpdate) -> Result<Task>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn set_completed(&self, id: i64, completed: bool) -> Result<Task>;
}

/// Task endpoints reached through the gateway.
pub struct HttpTasks {
    gateway: Gateway,
    endpoints: Endpoints,
}

impl HttpTasks {
    pub fn new(gateway: Gateway, endpoints: Endpoints) -> Self {
        Self { gateway, endpoints }
    }
}

fn task_label(id: i64) -> impl FnOnce() -> String {
    move || format!("task {}", id)
}

#[async_trait]
impl TaskBackend for HttpTasks {
    async fn list(&self, completed: Option<bool>) -> Result<Vec<Task>> {
        let query: Vec<(&str, String)> = completed
            .map(|c| vec![("completed", c.to_string())])
            .unwrap_or_default();
        let v = self
            .gateway
            .call(Method::GET, &self.endpoints.tasks, None, Some(&query))
            .await?;
        let envelope: TaskListEnvelope = decode(v)?;
        Ok(envelope.into_tasks())
    }

    async fn get(&self, id: i64) -> Result<Task> {
        self.gateway
            .get(&self.endpoints.task(id))
            .await
            .map_err(|e| e.not_found_as(task_label(id)))
    }

    async fn create(&self, task: &TaskCreate) -> Result<Task> {
        self.gateway
            .send_json(Method::POST, &self.endpoints.tasks, task)
            .await
    }

    async fn update(&self, id: i64, update: &TaskUpdate) -> Result<Task> {
        self.gateway
            .send_json(Method::PUT, &self.endpoints.task(id), update)
            .await
            .map_err(|e| e.not_found_as(task_label(id)))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.gateway
            .call(Method::DELETE, &self.endpoints.task(id), None, None)
            .await
            .map(|_| ())
            .map_err(|e| e.not_found_as(task_label(id)))
    }

    async fn set_completed(&self, id: i64, completed: bool) -> Result<Task> {
        let v = self
            .gateway
            .call(
                Method::PATCH,
                &self.endpoints.task_complete(id, completed),
                None,
                None,
            )
            .await
            .map_err(|e| e.not_found_as(task_label(id)))?;
        decode(v)
    }
}

/// Cached task list for the signed-in user.
pub struct TaskController {
    backend: Arc<dyn TaskBackend>,
    session: SessionHandle,
    snapshot: Vec<Task>,
}

impl TaskController {
    pub fn new(backend: Arc<dyn TaskBackend>, session: SessionHandle) -> Self {
        Self {
            backend,
            session,
            snapshot: Vec::new(),
        }
    }

    /// Last successful server snapshot.
    pub fn tasks(&self) -> &[Task] {
        &self.snapshot
    }

    pub fn visible(&self, filter: TaskFilter) -> Vec<&Task> {
        self.snapshot.iter().filter(|t| filter.matches(t)).collect()
    }

    pub fn counts(&self) -> TaskCounts {
        let completed = self.snapshot.iter().filter(|t| t.completed).count();
        TaskCounts {
            all: self.snapshot.len(),
            active: self.snapshot.len() - completed,
            completed,
        }
    }

    /// Fetch the full list and replace the snapshot. A result that arrives after the session
    /// changed (logout, expiry, another login) is discarded.
    pub async fn refresh(&mut self) -> Result<&[Task]> {
        self.ensure_authenticated()?;
        let epoch = self.session.epoch();
        let tasks = self.backend.list(None).await?;
        if self.session.epoch() != epoch {
            log::warn!("tasks: session changed while refreshing, discarding result");
            return Ok(&self.snapshot);
        }
        log::debug!("tasks: refreshed {} task(s)", tasks.len());
        self.snapshot = tasks;
        Ok(&self.snapshot)
    }

    /// Refresh, then project through `filter`.
    pub async fn list(&mut self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.refresh().await?;
        Ok(self.visible(filter).into_iter().cloned().collect())
    }

    pub async fn get(&self, id: i64) -> Result<Task> {
        self.ensure_authenticated()?;
        self.backend.get(id).await
    }

    /// Create a task. An empty or blank title fails before any request is made.
    pub async fn create(&mut self, title: &str, description: Option<&str>) -> Result<Task> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ClientError::Validation("title is required".to_string()));
        }
        self.ensure_authenticated()?;
        let body = TaskCreate {
            title: title.to_string(),
            description: non_blank(description),
            completed: None,
        };
        let task = self.backend.create(&body).await?;
        log::info!("tasks: created task {}", task.id);
        self.refresh_after_mutation().await;
        Ok(task)
    }

    /// Update title and/or description (and optionally completion).
    pub async fn update(&mut self, id: i64, fields: TaskUpdate) -> Result<Task> {
        let fields = TaskUpdate {
            title: match fields.title {
                Some(t) if t.trim().is_empty() => {
                    return Err(ClientError::Validation("title must not be empty".to_string()))
                }
                Some(t) => Some(t.trim().to_string()),
                None => None,
            },
            description: non_blank(fields.description.as_deref()),
            completed: fields.completed,
        };
        if fields.is_empty() {
            return Err(ClientError::Validation("nothing to update".to_string()));
        }
        self.ensure_authenticated()?;
        let task = self.backend.update(id, &fields).await?;
        self.refresh_after_mutation().await;
        Ok(task)
    }

    /// Delete after explicit confirmation. Returns false (and sends nothing) when declined.
    pub async fn delete(&mut self, id: i64, confirm: &dyn Confirm) -> Result<bool> {
        self.ensure_authenticated()?;
        let prompt = match self.snapshot.iter().find(|t| t.id == id) {
            Some(t) => format!("Delete task {} \"{}\"?", id, t.title),
            None => format!("Delete task {}?", id),
        };
        if !confirm.confirm(&prompt) {
            log::debug!("tasks: delete of {} declined", id);
            return Ok(false);
        }
        self.backend.delete(id).await?;
        log::info!("tasks: deleted task {}", id);
        self.refresh_after_mutation().await;
        Ok(true)
    }

    pub async fn set_completed(&mut self, id: i64, completed: bool) -> Result<Task> {
        self.ensure_authenticated()?;
        let task = self.backend.set_completed(id, completed).await?;
        self.refresh_after_mutation().await;
        Ok(task)
    }

    /// Flip completion of a task in the current snapshot.
    pub async fn toggle(&mut self, id: i64) -> Result<Task> {
        let current = self
            .snapshot
            .iter()
            .find(|t| t.id == id)
            .map(|t| t.completed)
            .ok_or_else(|| ClientError::NotFound(format!("task {}", id)))?;
        self.set_completed(id, !current).await
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(AuthError::NotAuthenticated.into())
        }
    }

    async fn refresh_after_mutation(&mut self) {
        if let Err(e) = self.refresh().await {
            log::warn!("tasks: refresh after update failed: {}", e);
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}
