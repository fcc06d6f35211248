//! Durable storage for the session token pair.
//!
//! The file survives restarts and is shared by every process running as
//! the same user. It is written with owner-only permissions through a
//! temporary file and a rename so a crash never leaves half a token behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mapleads_model::SessionTokens;
use parking_lot::Mutex;

use super::errors::SessionError;

#[async_trait]
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    async fn load(&self) -> Result<Option<SessionTokens>, SessionError>;
    async fn save(&self, tokens: &SessionTokens) -> Result<(), SessionError>;
    async fn clear(&self) -> Result<(), SessionError>;
}

/// JSON file holding `{"authToken": ..., "refreshToken": ...}`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<SessionTokens>, SessionError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => return Err(SessionError::read(&self.path, e)),
        };

        let tokens: SessionTokens = serde_json::from_str(&data)?;
        if tokens.auth_token.is_empty() {
            log::debug!("[SessionStore] stored session has no access token");
            return Ok(None);
        }
        Ok(Some(tokens))
    }

    async fn save(&self, tokens: &SessionTokens) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::write(parent, e))?;
        }

        let json = serde_json::to_string_pretty(tokens)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| SessionError::write(&tmp, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp, perms)
                .await
                .map_err(|e| SessionError::write(&tmp, e))?;
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SessionError::write(&self.path, e))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::write(&self.path, e)),
        }
    }
}

/// Process-local store for tests and one-shot tooling.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    tokens: Mutex<Option<SessionTokens>>,
    clears: Mutex<usize>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: SessionTokens) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
            clears: Mutex::new(0),
        }
    }

    pub fn snapshot(&self) -> Option<SessionTokens> {
        self.tokens.lock().clone()
    }

    /// How many times [`SessionStore::clear`] ran.
    pub fn clear_count(&self) -> usize {
        *self.clears.lock()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<SessionTokens>, SessionError> {
        Ok(self.snapshot())
    }

    async fn save(&self, tokens: &SessionTokens) -> Result<(), SessionError> {
        *self.tokens.lock() = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionError> {
        *self.tokens.lock() = None;
        *self.clears.lock() += 1;
        Ok(())
    }
}
