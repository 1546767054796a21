//! In-memory collaboration engine
//!
//! Implements the engine capability contract against process-local state.
//! Used by the loopback demo, the test harness, and the scenario tests: it
//! records the order of open/attach/detach/close operations, supports
//! injected failures, and exposes hooks that simulate another participant
//! (remote edits, sync updates, auth-error events).

use super::{CollabEngine, DocEvent, DocumentHandle, EngineError, EngineSession};
use crate::token::{CredentialProvider, TokenIssueError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Engine operation, recorded in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOp {
    Open,
    Attach(String),
    Detach(String),
    Close,
}

#[derive(Default)]
struct DocState {
    text: Option<String>,
    subscribers: Vec<mpsc::Sender<DocEvent>>,
}

#[derive(Default)]
struct EngineState {
    docs: HashMap<String, DocState>,
    ops: Vec<EngineOp>,
    // Provider of the open session; a real backend keeps it for re-auth.
    provider: Option<Arc<dyn CredentialProvider>>,
    open_count: usize,
    fail_open: bool,
    fail_attach: bool,
    fail_detach: bool,
    fail_close: bool,
}

/// Process-local engine with scripted failure modes
#[derive(Clone, Default)]
pub struct LocalEngine {
    state: Arc<Mutex<EngineState>>,
}

impl LocalEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fail_open = fail;
    }

    /// Make subsequent `attach` calls fail
    pub fn set_fail_attach(&self, fail: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fail_attach = fail;
    }

    /// Make subsequent `detach` calls fail (the detach is still recorded)
    pub fn set_fail_detach(&self, fail: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fail_detach = fail;
    }

    /// Make subsequent `close` calls fail (the close is still recorded)
    pub fn set_fail_close(&self, fail: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).fail_close = fail;
    }

    /// Operations recorded so far, in call order
    pub fn ops(&self) -> Vec<EngineOp> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ops
            .clone()
    }

    /// How many sessions have been opened
    pub fn open_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .open_count
    }

    /// Current text of a document, `None` when no container exists
    pub fn doc_text(&self, document_key: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .docs
            .get(document_key)
            .and_then(|d| d.text.clone())
    }

    /// Simulate another participant replacing the document text
    pub async fn remote_edit(&self, document_key: &str, text: &str) {
        let subscribers = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let doc = state.docs.entry(document_key.to_string()).or_default();
            doc.text = Some(text.to_string());
            doc.subscribers.clone()
        };
        for tx in subscribers {
            let _ = tx.send(DocEvent::RemoteChange).await;
        }
    }

    /// Emit a sync-status event to subscribers of a document
    pub async fn emit_sync(&self, document_key: &str, label: &str) {
        for tx in self.subscribers_of(document_key) {
            let _ = tx
                .send(DocEvent::Sync {
                    label: label.to_string(),
                })
                .await;
        }
    }

    /// Emit an auth-error event to subscribers of a document
    pub async fn emit_auth_error(&self, document_key: &str, method: &str, reason: &str) {
        for tx in self.subscribers_of(document_key) {
            let _ = tx
                .send(DocEvent::AuthError {
                    method: method.to_string(),
                    reason: reason.to_string(),
                })
                .await;
        }
    }

    /// Re-invoke the credential provider of the open session, as a backend
    /// would when it judges the current token invalid
    pub async fn trigger_reauth(&self, reason: &str) -> Result<String, TokenIssueError> {
        let provider = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .provider
            .clone();
        match provider {
            Some(provider) => provider.issue(Some(reason)).await,
            None => Err(TokenIssueError::Transport("no open session".to_string())),
        }
    }

    fn subscribers_of(&self, document_key: &str) -> Vec<mpsc::Sender<DocEvent>> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .docs
            .get(document_key)
            .map(|d| d.subscribers.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CollabEngine for LocalEngine {
    async fn open(
        &self,
        addr: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Box<dyn EngineSession>, EngineError> {
        if self.state.lock().unwrap_or_else(|e| e.into_inner()).fail_open {
            return Err(EngineError::Open(format!("connection refused: {}", addr)));
        }

        // A real backend authenticates at open time; surface token
        // issuance failures as open failures.
        credentials.issue(None).await?;

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.open_count += 1;
            state.provider = Some(credentials);
            state.ops.push(EngineOp::Open);
        }
        debug!(addr, "local engine session opened");

        Ok(Box::new(LocalSession {
            engine: self.clone(),
        }))
    }
}

struct LocalSession {
    engine: LocalEngine,
}

#[async_trait]
impl EngineSession for LocalSession {
    async fn attach(
        &self,
        document_key: &str,
        events: mpsc::Sender<DocEvent>,
    ) -> Result<Arc<dyn DocumentHandle>, EngineError> {
        {
            let mut state = self
                .engine
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if state.fail_attach {
                return Err(EngineError::Attach {
                    key: document_key.to_string(),
                    reason: "attach rejected".to_string(),
                });
            }
            let doc = state.docs.entry(document_key.to_string()).or_default();
            doc.subscribers.push(events);
            state.ops.push(EngineOp::Attach(document_key.to_string()));
        }
        debug!(document_key, "local engine document attached");

        Ok(Arc::new(LocalDocument {
            engine: self.engine.clone(),
            key: document_key.to_string(),
        }))
    }

    async fn detach(&self, document: Arc<dyn DocumentHandle>) -> Result<(), EngineError> {
        let key = document.key().to_string();
        let fail = {
            let mut state = self
                .engine
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(doc) = state.docs.get_mut(&key) {
                doc.subscribers.clear();
            }
            state.ops.push(EngineOp::Detach(key.clone()));
            state.fail_detach
        };
        if fail {
            return Err(EngineError::Detach("detach rejected".to_string()));
        }
        debug!(document_key = %key, "local engine document detached");
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        let fail = {
            let mut state = self
                .engine
                .state
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            state.provider = None;
            state.ops.push(EngineOp::Close);
            state.fail_close
        };
        if fail {
            return Err(EngineError::Close("close rejected".to_string()));
        }
        debug!("local engine session closed");
        Ok(())
    }
}

struct LocalDocument {
    engine: LocalEngine,
    key: String,
}

#[async_trait]
impl DocumentHandle for LocalDocument {
    fn key(&self) -> &str {
        &self.key
    }

    async fn snapshot(&self) -> Result<Option<String>, EngineError> {
        Ok(self
            .engine
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .docs
            .get(&self.key)
            .and_then(|d| d.text.clone()))
    }

    async fn replace_all(&self, text: &str) -> Result<(), EngineError> {
        let mut state = self
            .engine
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let doc = state.docs.entry(self.key.clone()).or_default();
        doc.text = Some(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenIssueError;

    struct StaticProvider;

    #[async_trait]
    impl CredentialProvider for StaticProvider {
        async fn issue(&self, _reason: Option<&str>) -> Result<String, TokenIssueError> {
            Ok("static-token".to_string())
        }
    }

    #[tokio::test]
    async fn test_open_attach_records_ops() {
        let engine = LocalEngine::new();
        let session = engine
            .open("local", Arc::new(StaticProvider))
            .await
            .unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let doc = session.attach("note-1", tx).await.unwrap();
        assert_eq!(doc.key(), "note-1");

        session.detach(doc).await.unwrap();
        session.close().await.unwrap();

        assert_eq!(
            engine.ops(),
            vec![
                EngineOp::Open,
                EngineOp::Attach("note-1".to_string()),
                EngineOp::Detach("note-1".to_string()),
                EngineOp::Close,
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_edit_notifies_subscriber() {
        let engine = LocalEngine::new();
        let session = engine
            .open("local", Arc::new(StaticProvider))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let doc = session.attach("note-1", tx).await.unwrap();

        engine.remote_edit("note-1", "hello").await;
        assert_eq!(rx.recv().await, Some(DocEvent::RemoteChange));
        assert_eq!(doc.snapshot().await.unwrap().as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_snapshot_none_before_first_write() {
        let engine = LocalEngine::new();
        let session = engine
            .open("local", Arc::new(StaticProvider))
            .await
            .unwrap();

        let (tx, _rx) = mpsc::channel(8);
        let doc = session.attach("note-fresh", tx).await.unwrap();
        assert_eq!(doc.snapshot().await.unwrap(), None);

        doc.replace_all("").await.unwrap();
        assert_eq!(doc.snapshot().await.unwrap().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_trigger_reauth_reinvokes_provider() {
        struct RecordingProvider {
            reasons: Mutex<Vec<String>>,
        }

        #[async_trait]
        impl CredentialProvider for RecordingProvider {
            async fn issue(&self, reason: Option<&str>) -> Result<String, TokenIssueError> {
                self.reasons
                    .lock()
                    .unwrap()
                    .push(reason.unwrap_or("").to_string());
                Ok("fresh-token".to_string())
            }
        }

        let engine = LocalEngine::new();
        assert!(engine.trigger_reauth("invalid-token").await.is_err());

        let provider = Arc::new(RecordingProvider {
            reasons: Mutex::new(Vec::new()),
        });
        let session = engine.open("local", provider.clone()).await.unwrap();

        let raw = engine.trigger_reauth("invalid-token").await.unwrap();
        assert_eq!(raw, "fresh-token");
        // open-time issuance first, then the reasoned re-auth
        assert_eq!(
            provider.reasons.lock().unwrap().as_slice(),
            ["", "invalid-token"]
        );

        session.close().await.unwrap();
        assert!(engine.trigger_reauth("invalid-token").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_close_is_still_recorded() {
        let engine = LocalEngine::new();
        let session = engine
            .open("local", Arc::new(StaticProvider))
            .await
            .unwrap();

        engine.set_fail_close(true);
        assert!(session.close().await.is_err());
        assert!(engine.ops().contains(&EngineOp::Close));
    }
}
