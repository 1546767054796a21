//! Session & sync lifecycle controller
//!
//! The state machine that resolves the caller's permission, opens a
//! collaboration session, attaches the document, wires event subscriptions,
//! and guarantees ordered teardown (detach before close, both best-effort).
//! All mutable session state is confined to one owner task; the rest of the
//! application talks to it through the cloneable [`SessionController`]
//! handle and `watch` channels.

mod controller;
mod errors;
mod state;


pub use controller::{document_key, SessionController};
pub use errors::SessionError;
pub use state::{AuthErrorInfo, SessionState, SessionStatus};
