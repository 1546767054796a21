//! Document adapter: local buffer vs. synchronized document
//!
//! Bridges the synchronized document's text content and the local editable
//! buffer. Local edits are pushed as one full-range replace (deliberate
//! simplification: convergence to exactly the new text, not a minimal edit
//! script); remote updates overwrite the buffer from the document snapshot
//! and never re-trigger a local edit, so there is no echo loop.

use crate::engine::{DocumentHandle, EngineError};
use crate::metrics;
use crate::permission::Role;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Errors from buffer/document synchronization
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The caller's role does not permit edits
    #[error("document is read-only for role READER")]
    ReadOnly,

    /// The underlying engine rejected the operation
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Bridges one attached document and the local text buffer
///
/// Holds a non-owning reference to the document handle for the lifetime of
/// the attachment; the session controller owns the handle itself.
pub struct DocumentAdapter {
    handle: Arc<dyn DocumentHandle>,
    role: Role,
    buffer: String,
}

impl DocumentAdapter {
    /// Create an adapter over a freshly attached document
    pub fn new(handle: Arc<dyn DocumentHandle>, role: Role) -> Self {
        Self {
            handle,
            role,
            buffer: String::new(),
        }
    }

    /// Initial buffer fill after attach
    ///
    /// Creates an empty text container when the document has none yet;
    /// otherwise copies the document text into the buffer. Idempotent: no
    /// local-edit write is issued when the buffer already matches.
    pub async fn hydrate(&mut self) -> Result<(), DocumentError> {
        match self.handle.snapshot().await? {
            Some(text) => {
                if self.buffer != text {
                    self.buffer = text;
                }
            }
            None => {
                self.handle.replace_all("").await?;
                self.buffer.clear();
            }
        }
        trace!(key = self.handle.key(), len = self.buffer.len(), "hydrated");
        Ok(())
    }

    /// Push a local edit as a single full-range replace
    pub async fn apply_local_edit(&mut self, new_text: &str) -> Result<(), DocumentError> {
        if !self.role.can_edit() {
            return Err(DocumentError::ReadOnly);
        }

        self.handle.replace_all(new_text).await?;
        self.buffer.clear();
        self.buffer.push_str(new_text);
        metrics::local_edit();
        Ok(())
    }

    /// Overwrite the buffer from the document after a remote change
    ///
    /// Never issues a local edit; a missing container reads as empty.
    pub async fn on_remote_update(&mut self) -> Result<(), DocumentError> {
        self.buffer = self.handle.snapshot().await?.unwrap_or_default();
        metrics::remote_update();
        Ok(())
    }

    /// The text currently shown to the user
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Role this adapter was attached with
    pub fn role(&self) -> Role {
        self.role
    }
}
