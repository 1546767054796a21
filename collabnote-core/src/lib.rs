//! CollabNote core: session and sync lifecycle for collaborative notes
//!
//! This crate brings a remotely synchronized note document up and down in
//! the correct order: it resolves the caller's permission, exchanges the
//! bearer credential for a short-lived collaboration token, opens a
//! collaboration session, attaches the document, and keeps a local text
//! buffer consistent with the synchronized document without echo loops.
//! The collaboration engine itself (merge algorithm, transport) is consumed
//! only through the capability traits in [`engine`].

pub mod config;
pub mod credential;
pub mod debuglog;
pub mod document;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod permission;
pub mod session;
pub mod shutdown;
pub mod token;

pub use config::Config;
pub use credential::CredentialStore;
pub use logging::{init_logging, LogLevel};
pub use permission::Role;
pub use session::{SessionController, SessionState, SessionStatus};
