//! Token expiry countdown
//!
//! Pure derived state: the deadline is taken from the token claims (or the
//! issuance TTL when the token is not JWT-shaped) once per new token, and
//! the remaining seconds are re-published on every tick of the session
//! controller's run loop. The countdown never goes negative and sticks at
//! zero until a new token is installed.

use super::{claims, CollabToken};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{watch, RwLock};
use tracing::debug;

#[derive(Debug)]
struct MonitorInner {
    deadline: RwLock<Option<SystemTime>>,
    time_left_tx: watch::Sender<u64>,
}

/// Live countdown over the most recently issued collaboration token
#[derive(Debug, Clone)]
pub struct ExpiryMonitor {
    inner: Arc<MonitorInner>,
}

impl ExpiryMonitor {
    /// Create a monitor with no active token (countdown fixed at zero)
    pub fn new() -> Self {
        let (time_left_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(MonitorInner {
                deadline: RwLock::new(None),
                time_left_tx,
            }),
        }
    }

    /// Subscribe to the remaining-seconds countdown
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.time_left_tx.subscribe()
    }

    /// Install a freshly issued token: re-decode claims and reset the
    /// deadline, then publish immediately
    pub async fn restart(&self, token: &CollabToken) {
        let deadline = claims::decode(&token.raw)
            .and_then(|c| c.exp)
            .map(|exp| UNIX_EPOCH + Duration::from_secs(exp))
            .unwrap_or(token.expires_at);

        debug!(?deadline, "expiry monitor restarted");
        *self.inner.deadline.write().await = Some(deadline);
        self.publish().await;
    }

    /// Drop the active deadline (countdown returns to zero)
    pub async fn clear(&self) {
        *self.inner.deadline.write().await = None;
        self.publish().await;
    }

    /// Re-derive and publish `max(0, expires_at - now)`
    pub async fn publish(&self) {
        let time_left = match *self.inner.deadline.read().await {
            Some(deadline) => deadline
                .duration_since(SystemTime::now())
                .map(|d| d.as_secs())
                .unwrap_or(0),
            None => 0,
        };
        self.inner.time_left_tx.send_replace(time_left);
    }
}

impl Default for ExpiryMonitor {
    fn default() -> Self {
        Self::new()
    }
}
