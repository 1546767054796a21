//! Collaboration engine capability contract
//!
//! The CRDT document engine (text merge, operation transforms, transport)
//! is an external collaborator. This module defines the seam the session
//! controller consumes it through:
//!
//! ```text
//! open(addr, credential_provider) -> EngineSession
//! attach(document_key, events)    -> DocumentHandle   (subscriptions
//!                                     installed atomically with attach)
//! detach(handle) / close()
//! ```
//!
//! Event subscriptions are not a separate call: the attach operation takes
//! the event sender, so there is no window where the attach has completed
//! but events are unobserved.

use crate::token::{CredentialProvider, TokenIssueError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod local;

pub use local::{EngineOp, LocalEngine};

/// Tagged event variant delivered by an attached document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocEvent {
    /// Another participant changed the document
    RemoteChange,
    /// Sync status changed (engine-supplied label)
    Sync { label: String },
    /// The backend rejected the active collaboration token
    AuthError { method: String, reason: String },
}

/// Errors surfaced by the engine seam
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open collaboration session: {0}")]
    Open(String),

    #[error("failed to attach document {key}: {reason}")]
    Attach { key: String, reason: String },

    #[error("failed to detach document: {0}")]
    Detach(String),

    #[error("failed to close collaboration session: {0}")]
    Close(String),

    /// Token issuance failed while opening the session
    #[error(transparent)]
    Token(#[from] TokenIssueError),
}

/// Entry point into the collaboration backend
#[async_trait]
pub trait CollabEngine: Send + Sync {
    /// Open an authenticated session against `addr`
    ///
    /// The engine holds on to `credentials` and re-invokes it with an
    /// optional reason whenever it judges the current token invalid.
    async fn open(
        &self,
        addr: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Box<dyn EngineSession>, EngineError>;
}

/// An opened collaboration session, independent of any document
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Bind this session to one synchronized document
    ///
    /// `events` receives remote-change, sync and auth-error notifications;
    /// it is wired before the attach result is returned.
    async fn attach(
        &self,
        document_key: &str,
        events: mpsc::Sender<DocEvent>,
    ) -> Result<Arc<dyn DocumentHandle>, EngineError>;

    /// Unbind a previously attached document
    async fn detach(&self, document: Arc<dyn DocumentHandle>) -> Result<(), EngineError>;

    /// Close the session
    async fn close(&self) -> Result<(), EngineError>;
}

/// Handle to one attached synchronized document
#[async_trait]
pub trait DocumentHandle: Send + Sync {
    /// The document key this handle is bound to
    fn key(&self) -> &str;

    /// Current text snapshot; `None` when no text container exists yet
    async fn snapshot(&self) -> Result<Option<String>, EngineError>;

    /// Replace the entire tracked range with `text`, creating the text
    /// container when missing
    async fn replace_all(&self, text: &str) -> Result<(), EngineError>;
}
