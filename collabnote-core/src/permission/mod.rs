//! Permission resolution for note documents
//!
//! Fetches the caller's role for a document identifier from the
//! authorization service. The request is issued even with an empty
//! credential; the service decides what an unauthenticated caller may do.
//! Resolution is never retried automatically; the session controller
//! surfaces the failure and halts startup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Role granted for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Owner,
    Writer,
    Reader,
}

impl Role {
    /// Whether this role may edit the document
    pub fn can_edit(&self) -> bool {
        !matches!(self, Role::Reader)
    }

    /// String form as used by the authorization service
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Writer => "WRITER",
            Role::Reader => "READER",
        }
    }

    /// Parse the role string returned by the authorization service
    pub fn parse(raw: &str) -> Result<Self, PermissionError> {
        match raw {
            "OWNER" => Ok(Role::Owner),
            "WRITER" => Ok(Role::Writer),
            "READER" => Ok(Role::Reader),
            other => Err(PermissionError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from permission resolution
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PermissionError {
    /// The authorization service answered with a non-success status
    #[error("permission lookup failed with HTTP status {status}")]
    Fetch { status: u16 },

    /// Transport-level failure reaching the authorization service
    #[error("permission lookup transport error: {0}")]
    Transport(String),

    /// The service returned a role this client does not know
    #[error("unknown role in permission response: {0}")]
    UnknownRole(String),
}

/// Capability contract for permission lookups
#[async_trait]
pub trait PermissionApi: Send + Sync {
    /// Resolve the caller's role for `document_id`
    ///
    /// `credential` may be `None`; the request is still issued and the
    /// service decides.
    async fn resolve(
        &self,
        document_id: &str,
        credential: Option<&str>,
    ) -> Result<Role, PermissionError>;
}

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    data: PermissionData,
}

#[derive(Debug, Deserialize)]
struct PermissionData {
    role: String,
}

/// HTTP-backed permission resolver
///
/// `GET {base}/permission/{documentId}/me` with an optional bearer
/// credential; the response body is `{ "data": { "role": "..." } }`.
pub struct HttpPermissionApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPermissionApi {
    /// Create a resolver against the given issuer base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PermissionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PermissionError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PermissionApi for HttpPermissionApi {
    async fn resolve(
        &self,
        document_id: &str,
        credential: Option<&str>,
    ) -> Result<Role, PermissionError> {
        let url = format!("{}/permission/{}/me", self.base_url, document_id);
        debug!(document_id, %url, "resolving permission");

        let mut request = self.client.get(&url);
        if let Some(credential) = credential.filter(|c| !c.is_empty()) {
            request = request.bearer_auth(credential);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PermissionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PermissionError::Fetch {
                status: status.as_u16(),
            });
        }

        let body: PermissionResponse = response
            .json()
            .await
            .map_err(|e| PermissionError::Transport(e.to_string()))?;

        Role::parse(&body.data.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("OWNER").unwrap(), Role::Owner);
        assert_eq!(Role::parse("WRITER").unwrap(), Role::Writer);
        assert_eq!(Role::parse("READER").unwrap(), Role::Reader);
        assert!(matches!(
            Role::parse("ADMIN"),
            Err(PermissionError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_role_can_edit() {
        assert!(Role::Owner.can_edit());
        assert!(Role::Writer.can_edit());
        assert!(!Role::Reader.can_edit());
    }

    #[test]
    fn test_error_display() {
        let err = PermissionError::Fetch { status: 403 };
        assert_eq!(
            err.to_string(),
            "permission lookup failed with HTTP status 403"
        );
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{ "data": { "role": "WRITER" } }"#;
        let parsed: PermissionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.role, "WRITER");
    }
}
