//! Session controller errors

use thiserror::Error;

/// Errors returned by [`SessionController`](super::SessionController) handle
/// methods. Failures inside a running session are reported through
/// [`SessionStatus`](super::SessionStatus) instead.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session controller is no longer running")]
    ControllerGone,
}
