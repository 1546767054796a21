//! Collaboration token claims decoding
//!
//! Tokens issued by the service are JWT-shaped; only the payload segment is
//! inspected. There is no signature verification; expiry display is advisory.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

/// Claims carried by a collaboration token
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the Unix epoch
    #[serde(default)]
    pub exp: Option<u64>,

    /// Issued-at, seconds since the Unix epoch
    #[serde(default)]
    pub iat: Option<u64>,

    /// Subject (document or participant identifier)
    #[serde(default)]
    pub sub: Option<String>,
}

/// Decode the payload segment of a JWT-shaped token
///
/// Returns `None` when the token is not three dot-separated segments or the
/// payload is not valid base64url JSON. Callers fall back to the issuance
/// response TTL in that case.
pub fn decode(raw: &str) -> Option<TokenClaims> {
    let mut segments = raw.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_token(payload: &str) -> String {
        let encoded = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        format!("hdr.{}.sig", encoded)
    }

    #[test]
    fn test_decode_exp_and_iat() {
        let token = make_token(r#"{"exp":1700000600,"iat":1700000000,"sub":"note-1"}"#);
        let claims = decode(&token).unwrap();
        assert_eq!(claims.exp, Some(1_700_000_600));
        assert_eq!(claims.iat, Some(1_700_000_000));
        assert_eq!(claims.sub.as_deref(), Some("note-1"));
    }

    #[test]
    fn test_decode_missing_fields() {
        let token = make_token(r#"{"aud":"collab"}"#);
        let claims = decode(&token).unwrap();
        assert_eq!(claims.exp, None);
        assert_eq!(claims.iat, None);
    }

    #[test]
    fn test_decode_rejects_non_jwt() {
        assert_eq!(decode("opaque-token"), None);
        assert_eq!(decode("a.b"), None);
        assert_eq!(decode("a.b.c.d"), None);
        assert_eq!(decode("hdr.!!!.sig"), None);
    }
}
