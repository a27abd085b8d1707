//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.tasktalk/config.json`) and environment.
//! The API origin and endpoint paths are configurable because deployed backends disagree
//! on prefixes (`/api/tasks` vs `/tasks`, `/api/chat` vs `/chat/`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Remote API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Credential persistence.
    #[serde(default)]
    pub session: SessionConfig,
}

/// Remote API origin, endpoint profile, and request timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Origin of the backend (default http://127.0.0.1:8000). Overridden by TASKTALK_API_URL env.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Which path layout the backend uses.
    #[serde(default)]
    pub profile: EndpointProfile,

    /// Per-path overrides applied on top of the profile.
    #[serde(default)]
    pub endpoints: EndpointOverrides,

    /// Request timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            profile: EndpointProfile::default(),
            endpoints: EndpointOverrides::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointProfile {
    /// `/api/tasks`, `/api/chat`; tasks wrapped as `{"tasks": [...]}`.
    #[default]
    Api,
    /// `/tasks`, `/chat/`; tasks returned as a bare array.
    Legacy,
}

/// Optional overrides for individual paths. Empty strings are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointOverrides {
    pub register: Option<String>,
    pub token: Option<String>,
    pub tasks: Option<String>,
    pub chat: Option<String>,
    pub conversations: Option<String>,
}

/// Resolved endpoint paths used by the gateway clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub register: String,
    pub token: String,
    pub tasks: String,
    pub chat: String,
    pub conversations: String,
}

impl Endpoints {
    pub fn for_profile(profile: EndpointProfile) -> Self {
        let (tasks, chat) = match profile {
            EndpointProfile::Api => ("/api/tasks", "/api/chat"),
            EndpointProfile::Legacy => ("/tasks", "/chat/"),
        };
        Self {
            register: "/auth/register".to_string(),
            token: "/auth/token".to_string(),
            tasks: tasks.to_string(),
            chat: chat.to_string(),
            conversations: "/chat/conversations".to_string(),
        }
    }

    /// Profile paths with any non-empty overrides applied.
    pub fn resolve(api: &ApiConfig) -> Self {
        let mut e = Self::for_profile(api.profile);
        let o = &api.endpoints;
        for (slot, value) in [
            (&mut e.register, &o.register),
            (&mut e.token, &o.token),
            (&mut e.tasks, &o.tasks),
            (&mut e.chat, &o.chat),
            (&mut e.conversations, &o.conversations),
        ] {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *slot = v.to_string();
            }
        }
        e
    }

    pub fn task(&self, id: i64) -> String {
        format!("{}/{}", self.tasks.trim_end_matches('/'), id)
    }

    pub fn task_complete(&self, id: i64, completed: bool) -> String {
        let action = if completed { "complete" } else { "incomplete" };
        format!("{}/{}", self.task(id), action)
    }

    pub fn conversation(&self, id: i64) -> String {
        format!("{}/{}", self.conversations.trim_end_matches('/'), id)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::for_profile(EndpointProfile::default())
    }
}

/// Where the bearer token is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Token file. Relative paths are resolved against the config file's parent. Default: `token` next to the config file.
    pub token_path: Option<PathBuf>,
}

/// Resolve the API base URL: env TASKTALK_API_URL overrides config.
pub fn resolve_base_url(config: &Config) -> String {
    let url = std::env::var("TASKTALK_API_URL")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| {
            let c = config.api.base_url.trim();
            if c.is_empty() {
                DEFAULT_BASE_URL.to_string()
            } else {
                c.to_string()
            }
        });
    url.trim_end_matches('/').to_string()
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("TASKTALK_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".tasktalk").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve the token file: `session.tokenPath` if set (relative to the config file's parent), else `token` beside the config.
pub fn resolve_token_path(config: &Config, config_path: &Path) -> PathBuf {
    let parent = config_parent(config_path);
    match &config.session.token_path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                parent.join(p)
            }
        }
        _ => parent.join("token"),
    }
}

/// Load config from the given path (or TASKTALK_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Create the config directory and a default config file if missing. Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let dir = config_parent(config_path);
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating config directory {}", dir.display()))?;
    if !config_path.exists() {
        let body = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, body)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }
    Ok(dir.to_path_buf())
}
