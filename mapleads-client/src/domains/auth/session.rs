//! Session service
//!
//! Sole owner of the access/refresh token pair. Everything else reads
//! tokens through this service; writes only happen at the login and logout
//! boundaries and inside the refresh critical section of the API client.

use std::sync::Arc;

use mapleads_model::SessionTokens;
use parking_lot::RwLock;
use tokio::sync::{Mutex, broadcast};

use super::errors::SessionError;
use super::storage::SessionStore;

const EVENT_CAPACITY: usize = 16;

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Established,
    Refreshed,
    SignedOut,
    /// The session was torn down because it could not be renewed.
    /// Front ends send the user back to login.
    Invalidated { reason: String },
}

#[derive(Debug)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    current: RwLock<Option<SessionTokens>>,
    /// Held across a memory change and its store write so writers never
    /// interleave.
    write_gate: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionService {
    /// Restore whatever session the store holds. A store that fails to
    /// load is treated as empty.
    pub async fn load(store: Arc<dyn SessionStore>) -> Arc<Self> {
        let current = match store.load().await {
            Ok(tokens) => tokens,
            Err(e) => {
                log::warn!("[Session] ignoring unreadable session: {}", e);
                None
            }
        };
        log::debug!(
            "[Session] restored, authenticated={}",
            current.is_some()
        );
        Arc::new(Self::with_tokens(store, current))
    }

    pub fn with_tokens(
        store: Arc<dyn SessionStore>,
        tokens: Option<SessionTokens>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            current: RwLock::new(tokens),
            write_gate: Mutex::new(()),
            events,
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|t| t.auth_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn on_session_invalidated(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Login boundary: adopt a freshly issued token pair.
    pub async fn establish(
        &self,
        tokens: SessionTokens,
    ) -> Result<(), SessionError> {
        let _gate = self.write_gate.lock().await;
        *self.current.write() = Some(tokens.clone());
        self.store.save(&tokens).await?;
        log::info!("[Session] established");
        let _ = self.events.send(SessionEvent::Established);
        Ok(())
    }

    /// Replace the access token after a successful refresh. A session that
    /// was signed out while the refresh was in flight stays signed out.
    pub(crate) async fn rotate_access(
        &self,
        access: String,
    ) -> Result<(), SessionError> {
        let _gate = self.write_gate.lock().await;
        let updated = {
            let mut guard = self.current.write();
            let Some(tokens) = guard.as_mut() else {
                return Err(SessionError::NotAuthenticated);
            };
            tokens.auth_token = access;
            tokens.clone()
        };
        if let Err(e) = self.store.save(&updated).await {
            log::warn!("[Session] refreshed token not persisted: {}", e);
        }
        let _ = self.events.send(SessionEvent::Refreshed);
        Ok(())
    }

    /// Logout boundary.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let _gate = self.write_gate.lock().await;
        self.current.write().take();
        self.store.clear().await?;
        log::info!("[Session] signed out");
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }

    /// Tear the session down after an unrecoverable refresh failure.
    /// Returns `false` when there was nothing to tear down.
    pub async fn invalidate(&self, reason: impl Into<String>) -> bool {
        let _gate = self.write_gate.lock().await;
        if self.current.write().take().is_none() {
            return false;
        }
        let reason = reason.into();
        log::warn!("[Session] invalidated: {}", reason);
        if let Err(e) = self.store.clear().await {
            log::error!("[Session] failed to clear stored session: {}", e);
        }
        let _ = self.events.send(SessionEvent::Invalidated { reason });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::auth::storage::MemorySessionStore;

    fn tokens(access: &str) -> SessionTokens {
        SessionTokens {
            auth_token: access.to_string(),
            refresh_token: Some("refresh".to_string()),
        }
    }

    #[tokio::test]
    async fn load_restores_stored_tokens() {
        let store = Arc::new(MemorySessionStore::with_tokens(tokens("a1")));
        let session = SessionService::load(store).await;
        assert!(session.is_authenticated());
        assert_eq!(session.access_token().as_deref(), Some("a1"));
        assert_eq!(session.refresh_token().as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn rotate_keeps_refresh_token_and_persists() {
        let store = Arc::new(MemorySessionStore::with_tokens(tokens("a1")));
        let session = SessionService::load(store.clone()).await;
        let mut events = session.on_session_invalidated();

        session.rotate_access("a2".into()).await.unwrap();

        assert_eq!(session.access_token().as_deref(), Some("a2"));
        assert_eq!(store.snapshot().unwrap().auth_token, "a2");
        assert_eq!(
            store.snapshot().unwrap().refresh_token.as_deref(),
            Some("refresh")
        );
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Refreshed);
    }

    #[tokio::test]
    async fn rotate_after_sign_out_is_rejected() {
        let store = Arc::new(MemorySessionStore::with_tokens(tokens("a1")));
        let session = SessionService::load(store.clone()).await;
        session.sign_out().await.unwrap();

        assert!(matches!(
            session.rotate_access("a2".into()).await,
            Err(SessionError::NotAuthenticated)
        ));
        assert!(store.snapshot().is_none());
    }

    #[tokio::test]
    async fn invalidate_runs_once() {
        let store = Arc::new(MemorySessionStore::with_tokens(tokens("a1")));
        let session = SessionService::load(store.clone()).await;
        let mut events = session.on_session_invalidated();

        assert!(session.invalidate("refresh rejected").await);
        assert!(!session.invalidate("refresh rejected").await);

        assert!(!session.is_authenticated());
        assert_eq!(store.clear_count(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Invalidated {
                reason: "refresh rejected".into()
            }
        );
        assert!(events.try_recv().is_err());
    }

    /// Store whose writes take a while to land.
    #[derive(Debug, Default)]
    struct SlowStore {
        inner: MemorySessionStore,
    }

    #[async_trait::async_trait]
    impl SessionStore for SlowStore {
        async fn load(&self) -> Result<Option<SessionTokens>, SessionError> {
            self.inner.load().await
        }

        async fn save(&self, tokens: &SessionTokens) -> Result<(), SessionError> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.inner.save(tokens).await
        }

        async fn clear(&self) -> Result<(), SessionError> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn sign_out_during_rotation_stays_signed_out() {
        let store = Arc::new(SlowStore {
            inner: MemorySessionStore::with_tokens(tokens("a1")),
        });
        let session = SessionService::load(store.clone()).await;

        let rotating = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.rotate_access("a2".into()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        session.sign_out().await.unwrap();
        let _ = rotating.await.unwrap();

        assert!(!session.is_authenticated());
        assert!(store.inner.snapshot().is_none());

        // A fresh process sees no session either.
        let restarted = SessionService::load(store).await;
        assert!(!restarted.is_authenticated());
    }

    #[tokio::test]
    async fn establish_persists_and_notifies() {
        let store = Arc::new(MemorySessionStore::new());
        let session = SessionService::load(store.clone()).await;
        let mut events = session.on_session_invalidated();
        assert!(!session.is_authenticated());

        session.establish(tokens("fresh")).await.unwrap();

        assert_eq!(store.snapshot(), Some(tokens("fresh")));
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Established);
    }
}
