//! Session context
//!
//! Holds the access token and the authenticated identity. The token store is a
//! `watch` channel, so every component that needs to react to login and logout
//! (the sync loop in particular) can subscribe to it.

use crate::{protocol, storage::Identity, transport::Backend, Error, Result};
use parking_lot::RwLock;
use std::{future::Future, sync::Arc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Access token store
///
/// Cloning shares the same underlying token.
#[derive(Debug, Clone)]
pub struct Credentials {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl Credentials {
    /// Create an empty (logged out) store
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Create a store holding `token`
    pub fn with_token(token: impl Into<String>) -> Self {
        let credentials = Self::new();
        credentials.login(token);
        credentials
    }

    /// Store a fresh token
    pub fn login(&self, token: impl Into<String>) {
        self.tx.send_replace(Some(token.into()));
    }

    /// Drop the token
    pub fn logout(&self) {
        self.tx.send_replace(None);
    }

    /// Drop the token only if it is still `token`
    ///
    /// Returns whether the store was cleared. A newer login is left alone.
    pub fn expire(&self, token: &str) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_deref() == Some(token) {
                *current = None;
                true
            } else {
                false
            }
        })
    }

    /// Current token, if any
    pub fn token(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Whether a token is present
    pub fn is_logged_in(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Subscribe to token changes
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new()
    }
}

/// Current authenticated identity, resolved lazily and cached
pub struct SessionContext {
    backend: Arc<dyn Backend>,
    credentials: Credentials,
    identity: RwLock<Option<Identity>>,
    /// Serializes identity resolution so concurrent ticks issue one fetch
    resolving: Mutex<()>,
}

impl SessionContext {
    /// Create a session context
    pub fn new(backend: Arc<dyn Backend>, credentials: Credentials) -> Self {
        Self {
            backend,
            credentials,
            identity: RwLock::new(None),
            resolving: Mutex::new(()),
        }
    }

    /// The token store
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Cached identity without resolving
    pub fn cached_identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    /// Current identity
    ///
    /// Returns `Ok(None)` when there is no valid credential, including when the
    /// backend rejects the token (which also triggers [`Self::report_auth_failure`]).
    /// Transient failures are returned as errors and leave the cache untouched.
    pub async fn current_identity(&self) -> Result<Option<Identity>> {
        let Some(token) = self.credentials.token() else {
            self.invalidate();
            return Ok(None);
        };

        if let Some(identity) = self.cached_identity() {
            return Ok(Some(identity));
        }

        let _guard = self.resolving.lock().await;
        if let Some(identity) = self.cached_identity() {
            return Ok(Some(identity));
        }

        let payload = match self.backend.fetch_me().await {
            Ok(payload) => payload,
            Err(e) if e.is_auth() => {
                self.report_auth_failure(&token);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let identity = protocol::normalize_identity(&payload)
            .ok_or_else(|| Error::Transient("Identity payload without a user id".to_string()))?;

        // The token may have changed while the fetch was in flight.
        if self.credentials.token().as_deref() != Some(token.as_str()) {
            debug!("Credential changed during identity fetch, discarding result");
            return Ok(None);
        }

        info!("Session identity resolved: {} ({})", identity.display_name, identity.id);
        *self.identity.write() = Some(identity.clone());
        Ok(Some(identity))
    }

    /// Forget the cached identity
    pub fn invalidate(&self) {
        self.identity.write().take();
    }

    /// React to the backend rejecting `token`
    ///
    /// Drops the identity and the token, unless the token has been replaced
    /// since the rejected request was sent. The token change is what halts
    /// polling.
    pub fn report_auth_failure(&self, token: &str) {
        if self.credentials.expire(token) {
            warn!("Authorization failed, clearing session");
            self.invalidate();
        } else {
            debug!("Ignoring authorization failure for a replaced token");
        }
    }

    /// Run a backend request, clearing the session if it fails with `Auth`
    ///
    /// The token is sampled before the request starts, so a rejection of an
    /// older token never logs out a newer one.
    pub async fn observe<T, F>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let token = self.credentials.token();
        let result = request.await;
        if let Err(e) = &result {
            if e.is_auth() {
                match &token {
                    Some(token) => self.report_auth_failure(token),
                    None => self.invalidate(),
                }
            }
        }
        result
    }
}
