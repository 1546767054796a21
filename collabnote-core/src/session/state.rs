//! Observable session state

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::permission::Role;

/// Lifecycle states of a document session.
///
/// Startup walks `Idle -> ResolvingPermission -> Connecting -> Attaching ->
/// Synced`. Any of the first four may fall into `Error`; `TornDown` is
/// terminal for the session instance (a new document identifier starts a
/// fresh one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    ResolvingPermission,
    Connecting,
    Attaching,
    Synced,
    Error,
    TornDown,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::ResolvingPermission => "resolving_permission",
            SessionState::Connecting => "connecting",
            SessionState::Attaching => "attaching",
            SessionState::Synced => "synced",
            SessionState::Error => "error",
            SessionState::TornDown => "torn_down",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of the most recent auth error reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthErrorInfo {
    /// Engine method that was rejected (e.g. `AttachDocument`).
    pub method: String,
    pub reason: String,
}

impl fmt::Display for AuthErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "auth error on {}: {}", self.method, self.reason)
    }
}

/// Snapshot of everything observable about the current session, published
/// through a `watch` channel on every change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Engine document key, present once a document identifier is set.
    pub document_key: Option<String>,
    /// Resolved role, present from `Connecting` onward.
    pub role: Option<Role>,
    /// True between a successful attach and the detach step of teardown.
    pub attached: bool,
    /// Label of the most recent sync report from the engine.
    pub sync_label: Option<String>,
    pub last_auth_error: Option<AuthErrorInfo>,
    /// Human-readable description of the most recent failure, cleared when
    /// the session reaches `Synced` or a sync report arrives.
    pub error: Option<String>,
}
