//! Append-only diagnostic trail
//!
//! Advisory log of lifecycle events, most recent first. Nothing in the
//! controller depends on its contents.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

/// Single diagnostic entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let since_epoch = self
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        write!(f, "[{}] {}", since_epoch.as_secs(), self.message)
    }
}

/// Shared prepend-only diagnostic trail
#[derive(Debug, Clone, Default)]
pub struct DebugLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl DebugLog {
    /// Create an empty debug log
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a new entry (most recent first)
    pub async fn push(&self, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: SystemTime::now(),
            message: message.into(),
        };
        self.entries.write().await.insert(0, entry);
    }

    /// Snapshot of all entries, most recent first
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.read().await.clone()
    }

    /// Number of recorded entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the log is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
