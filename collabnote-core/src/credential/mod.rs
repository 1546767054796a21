//! Session-scoped bearer credential storage
//!
//! The store holds the caller's bearer credential for the lifetime of the
//! process. It is written only by explicit caller action and read by the
//! permission resolver and the token issuer bridge; no component owns it.

use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared slot for the caller's bearer credential
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<String>>>,
}

impl CredentialStore {
    /// Create an empty credential store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with a credential
    pub fn with_credential(credential: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(credential.into()))),
        }
    }

    /// Get the current credential, if any
    pub async fn get(&self) -> Option<String> {
        self.inner.read().await.clone()
    }

    /// Replace the stored credential
    pub async fn set(&self, credential: impl Into<String>) {
        *self.inner.write().await = Some(credential.into());
    }

    /// Clear the stored credential
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    /// Check whether a credential is present
    pub async fn is_present(&self) -> bool {
        self.inner.read().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_clear() {
        let store = CredentialStore::new();
        assert_eq!(store.get().await, None);

        store.set("bearer-abc").await;
        assert_eq!(store.get().await.as_deref(), Some("bearer-abc"));
        assert!(store.is_present().await);

        store.clear().await;
        assert_eq!(store.get().await, None);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = CredentialStore::with_credential("tok");
        let clone = store.clone();

        clone.set("replaced").await;
        assert_eq!(store.get().await.as_deref(), Some("replaced"));
    }
}
