//! Metrics for session lifecycle observability
//!
//! Thin helpers over the `metrics` facade. Hosts plug in their own recorder;
//! without one these calls are no-ops.

use metrics::{counter, describe_counter};

/// Register metric descriptions
pub fn init_metrics() {
    describe_counter!(
        "session.transitions.total",
        "Session controller state transitions"
    );
    describe_counter!("token.issued.total", "Collaboration tokens issued");
    describe_counter!("token.issue.failed.total", "Failed token issuances");
    describe_counter!("auth.errors.total", "Runtime auth-error events");
    describe_counter!(
        "document.remote_updates.total",
        "Remote document updates applied to the buffer"
    );
    describe_counter!(
        "document.local_edits.total",
        "Local edits pushed to the document"
    );
}

/// Record a session state transition
pub fn session_transition(state: &'static str) {
    counter!("session.transitions.total", "state" => state).increment(1);
}

/// Record a successful token issuance
pub fn token_issued() {
    counter!("token.issued.total").increment(1);
}

/// Record a failed token issuance
pub fn token_issue_failed() {
    counter!("token.issue.failed.total").increment(1);
}

/// Record a runtime auth-error event
pub fn auth_error() {
    counter!("auth.errors.total").increment(1);
}

/// Record a remote update applied to the buffer
pub fn remote_update() {
    counter!("document.remote_updates.total").increment(1);
}

/// Record a local edit pushed to the document
pub fn local_edit() {
    counter!("document.local_edits.total").increment(1);
}
