//! Durable storage for the bearer token.
//!
//! The file store keeps the raw token in a single file (e.g. ~/.tasktalk/token); the memory
//! store is used by tests and by callers that do not want the login to outlive the process.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Load, save and clear a persisted credential.
pub trait CredentialStore: Send + Sync {
    /// Stored token, if any. Blank files count as absent.
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> Result<()>;
    /// Remove the stored token. Succeeds when nothing is stored.
    fn clear(&self) -> Result<()>;
}

/// Token persisted in a file.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<String> {
        let s = std::fs::read_to_string(&self.path).ok()?;
        let t = s.trim().to_string();
        if t.is_empty() {
            None
        } else {
            Some(t)
        }
    }

    fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<String> {
        self.token
            .lock()
            .ok()?
            .clone()
            .filter(|t| !t.trim().is_empty())
    }

    fn save(&self, token: &str) -> Result<()> {
        let mut g = self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("credential store poisoned"))?;
        *g = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut g = self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("credential store poisoned"))?;
        *g = None;
        Ok(())
    }
}
