//! Collaboration token issuance
//!
//! Exchanges the bearer credential plus a document identifier for a
//! short-lived collaboration token, scoped to one document and capability
//! (key/verb). The [`TokenBridge`] is handed to the collaboration engine as
//! its credential provider; the engine re-invokes it with a reason string
//! whenever it judges the current token invalid.

use crate::credential::CredentialStore;
use crate::debuglog::DebugLog;
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

pub mod claims;
mod expiry;

pub use claims::TokenClaims;
pub use expiry::ExpiryMonitor;

/// Default TTL applied when the issuance response carries no expiry
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Short-lived collaboration token
///
/// Replaced wholesale on every successful issuance; superseded tokens are
/// discarded, no history is retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollabToken {
    /// Raw token string handed to the engine
    pub raw: String,
    /// When this token was issued (local clock)
    pub issued_at: SystemTime,
    /// Absolute expiry derived from the issuance TTL
    pub expires_at: SystemTime,
    /// Granted capability attribute key, if reported
    pub attribute_key: Option<String>,
    /// Granted capability attribute verb, if reported
    pub attribute_verb: Option<String>,
}

/// Errors from token issuance
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenIssueError {
    /// The token service answered with a non-success status
    #[error("token issuance failed with HTTP status {status}")]
    Issue { status: u16 },

    /// Transport-level failure reaching the token service
    #[error("token issuance transport error: {0}")]
    Transport(String),

    /// The response body did not contain a token
    #[error("token service response did not contain a token")]
    MissingToken,
}

/// Raw issuance result as reported by the token service
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: Duration,
    pub attribute_key: Option<String>,
    pub attribute_verb: Option<String>,
}

/// Capability contract for token issuance
#[async_trait]
pub trait TokenApi: Send + Sync {
    /// Exchange the bearer credential for a collaboration token
    async fn issue(
        &self,
        document_id: &str,
        credential: Option<&str>,
    ) -> Result<IssuedToken, TokenIssueError>;
}

/// Credential provider injected into the engine's session-open call
///
/// The engine re-invokes `issue` with an implementation-supplied reason
/// string whenever the previous token is invalid or expired.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn issue(&self, reason: Option<&str>) -> Result<String, TokenIssueError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    document_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    data: TokenData,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    #[serde(default, alias = "accessToken")]
    token: Option<String>,

    #[serde(default, rename = "expiresIn", alias = "ttlSeconds")]
    expires_in: Option<u64>,

    #[serde(default, rename = "documentAttributes")]
    document_attributes: Option<DocumentAttributes>,
}

#[derive(Debug, Deserialize)]
struct DocumentAttributes {
    key: String,
    verb: String,
}

/// HTTP-backed token issuer
///
/// `POST {base}/yorkie/token` with a bearer credential and body
/// `{ "documentId": ... }`.
pub struct HttpTokenApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTokenApi {
    /// Create an issuer client against the given base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TokenIssueError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TokenIssueError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TokenApi for HttpTokenApi {
    async fn issue(
        &self,
        document_id: &str,
        credential: Option<&str>,
    ) -> Result<IssuedToken, TokenIssueError> {
        let url = format!("{}/yorkie/token", self.base_url);
        debug!(document_id, %url, "requesting collaboration token");

        let mut request = self.client.post(&url).json(&TokenRequest { document_id });
        if let Some(credential) = credential.filter(|c| !c.is_empty()) {
            request = request.bearer_auth(credential);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TokenIssueError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenIssueError::Issue {
                status: status.as_u16(),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| TokenIssueError::Transport(e.to_string()))?;

        let token = body.data.token.ok_or(TokenIssueError::MissingToken)?;
        let expires_in = body
            .data
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TTL);
        let (attribute_key, attribute_verb) = match body.data.document_attributes {
            Some(attrs) => (Some(attrs.key), Some(attrs.verb)),
            None => (None, None),
        };

        Ok(IssuedToken {
            token,
            expires_in,
            attribute_key,
            attribute_verb,
        })
    }
}

/// Bridge between the token service and the collaboration engine
///
/// Owns the current-token slot. Each successful issuance replaces the slot
/// and restarts the expiry monitor; on failure the previous token is left
/// untouched and the error propagates to the caller. Concurrent issuance
/// (e.g. the engine signalling invalidity repeatedly) is serialized.
pub struct TokenBridge {
    api: Arc<dyn TokenApi>,
    credentials: CredentialStore,
    document_id: String,
    current: RwLock<Option<CollabToken>>,
    monitor: ExpiryMonitor,
    issue_guard: Mutex<()>,
    log: DebugLog,
}

impl TokenBridge {
    /// Create a bridge for one document
    pub fn new(
        api: Arc<dyn TokenApi>,
        credentials: CredentialStore,
        document_id: impl Into<String>,
        monitor: ExpiryMonitor,
        log: DebugLog,
    ) -> Self {
        Self {
            api,
            credentials,
            document_id: document_id.into(),
            current: RwLock::new(None),
            monitor,
            issue_guard: Mutex::new(()),
            log,
        }
    }

    /// The currently installed token, if any
    pub async fn current_token(&self) -> Option<CollabToken> {
        self.current.read().await.clone()
    }
}

#[async_trait]
impl CredentialProvider for TokenBridge {
    async fn issue(&self, reason: Option<&str>) -> Result<String, TokenIssueError> {
        // One issuance at a time per bridge; a burst of invalidity signals
        // from the engine collapses into sequential exchanges.
        let _guard = self.issue_guard.lock().await;

        match reason {
            Some(reason) => {
                self.log
                    .push(format!("re-issuing collaboration token: {}", reason))
                    .await
            }
            None => self.log.push("issuing collaboration token").await,
        }

        let credential = self.credentials.get().await;
        let issued = match self
            .api
            .issue(&self.document_id, credential.as_deref())
            .await
        {
            Ok(issued) => issued,
            Err(e) => {
                warn!(document_id = %self.document_id, error = %e, "token issuance failed");
                metrics::token_issue_failed();
                self.log.push(format!("token issuance failed: {}", e)).await;
                return Err(e);
            }
        };

        let issued_at = SystemTime::now();
        let token = CollabToken {
            raw: issued.token.clone(),
            issued_at,
            expires_at: issued_at + issued.expires_in,
            attribute_key: issued.attribute_key,
            attribute_verb: issued.attribute_verb,
        };

        self.monitor.restart(&token).await;
        *self.current.write().await = Some(token);
        metrics::token_issued();
        debug!(document_id = %self.document_id, "collaboration token installed");

        Ok(issued.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedTokenApi {
        result: Result<IssuedToken, TokenIssueError>,
        calls: AtomicUsize,
    }

    impl ScriptedTokenApi {
        fn ok(token: &str, ttl: u64) -> Self {
            Self {
                result: Ok(IssuedToken {
                    token: token.to_string(),
                    expires_in: Duration::from_secs(ttl),
                    attribute_key: Some("doc".to_string()),
                    attribute_verb: Some("rw".to_string()),
                }),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TokenApi for ScriptedTokenApi {
        async fn issue(
            &self,
            _document_id: &str,
            _credential: Option<&str>,
        ) -> Result<IssuedToken, TokenIssueError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn bridge_with(api: Arc<dyn TokenApi>) -> TokenBridge {
        TokenBridge::new(
            api,
            CredentialStore::with_credential("bearer"),
            "note-1",
            ExpiryMonitor::new(),
            DebugLog::new(),
        )
    }

    #[tokio::test]
    async fn test_issue_installs_token() {
        let bridge = bridge_with(Arc::new(ScriptedTokenApi::ok("tok-a", 60)));

        let raw = bridge.issue(None).await.unwrap();
        assert_eq!(raw, "tok-a");

        let current = bridge.current_token().await.unwrap();
        assert_eq!(current.raw, "tok-a");
        assert_eq!(current.attribute_key.as_deref(), Some("doc"));
        assert_eq!(current.attribute_verb.as_deref(), Some("rw"));
        assert!(current.expires_at > current.issued_at);
    }

    struct FailAfterFirst {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenApi for FailAfterFirst {
        async fn issue(
            &self,
            _document_id: &str,
            _credential: Option<&str>,
        ) -> Result<IssuedToken, TokenIssueError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(IssuedToken {
                    token: "tok-a".to_string(),
                    expires_in: Duration::from_secs(60),
                    attribute_key: None,
                    attribute_verb: None,
                })
            } else {
                Err(TokenIssueError::Issue { status: 500 })
            }
        }
    }

    #[tokio::test]
    async fn test_issue_failure_keeps_previous_token() {
        let bridge = bridge_with(Arc::new(FailAfterFirst {
            calls: AtomicUsize::new(0),
        }));
        bridge.issue(None).await.unwrap();

        let err = bridge.issue(Some("invalid-token")).await.unwrap_err();
        assert_eq!(err, TokenIssueError::Issue { status: 500 });

        // The previous token is left untouched.
        assert_eq!(bridge.current_token().await.unwrap().raw, "tok-a");
    }

    #[tokio::test]
    async fn test_reissue_replaces_token() {
        let api = Arc::new(ScriptedTokenApi::ok("tok-b", 30));
        let bridge = bridge_with(api.clone());

        bridge.issue(None).await.unwrap();
        bridge.issue(Some("token-expired")).await.unwrap();

        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.current_token().await.unwrap().raw, "tok-b");
    }

    #[tokio::test]
    async fn test_concurrent_issues_are_serialized() {
        let api = Arc::new(ScriptedTokenApi::ok("tok-c", 30));
        let bridge = Arc::new(bridge_with(api.clone()));

        let a = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.issue(Some("invalid-token")).await })
        };
        let b = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.issue(Some("invalid-token")).await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        assert!(bridge.current_token().await.is_some());
    }

    #[test]
    fn test_token_response_aliases() {
        let body = r#"{ "data": { "accessToken": "tok", "ttlSeconds": 120 } }"#;
        let parsed: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.token.as_deref(), Some("tok"));
        assert_eq!(parsed.data.expires_in, Some(120));

        let body = r#"{ "data": { "token": "tok2", "expiresIn": 60,
                        "documentAttributes": { "key": "note-1", "verb": "r" } } }"#;
        let parsed: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.token.as_deref(), Some("tok2"));
        let attrs = parsed.data.document_attributes.unwrap();
        assert_eq!(attrs.key, "note-1");
        assert_eq!(attrs.verb, "r");
    }

    #[test]
    fn test_missing_token_field() {
        let body = r#"{ "data": { "expiresIn": 60 } }"#;
        let parsed: TokenResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.data.token.is_none());
    }
}
