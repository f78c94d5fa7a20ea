//! B2 API Error Types
//!
//! Maps B2 HTTP failures to specific variants, then onto the source error
//! taxonomy the adapter understands.

use serde::Deserialize;

use crate::source::SourceError;

/// B2 API error types
#[derive(Debug, thiserror::Error)]
pub enum B2Error {
    #[error("Authentication expired, token needs refresh")]
    AuthExpired,

    #[error("Authorization rejected: {0}")]
    Unauthorized(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout")]
    Timeout,

    #[error("Request error: {0}")]
    Request(String),

    #[error("Client has not been authorized")]
    NotAuthorized,
}

/// Error body B2 returns with every failed call
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl B2Error {
    /// Create a B2Error from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
        let code = parsed.as_ref().map(|b| b.code.as_str()).unwrap_or_default();
        let detail = match &parsed {
            Some(b) if !b.message.is_empty() => format!("{}: {}", b.code, b.message),
            _ => body.to_string(),
        };

        match (status, code) {
            // Key lacks the capability; renewing the token would not help
            (401, "unauthorized") => B2Error::Forbidden(detail),
            (401, _) => B2Error::AuthExpired,
            (403, _) => B2Error::Forbidden(detail),
            (404, _) => B2Error::NotFound(detail),
            (408, _) => B2Error::Timeout,
            (429, _) => B2Error::RateLimited,
            (500..=599, _) => B2Error::Server(status, detail),
            _ => B2Error::Request(format!("HTTP {}: {}", status, detail)),
        }
    }
}

impl From<reqwest::Error> for B2Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            B2Error::Timeout
        } else if e.is_decode() {
            B2Error::Request(e.to_string())
        } else {
            B2Error::Network(e.to_string())
        }
    }
}

impl From<B2Error> for SourceError {
    fn from(e: B2Error) -> Self {
        match e {
            B2Error::AuthExpired => SourceError::AuthExpired,
            B2Error::Unauthorized(msg) => SourceError::AuthError(msg),
            B2Error::NotAuthorized => SourceError::AuthExpired,
            other => SourceError::BackendUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(
            B2Error::from_status(401, r#"{"status":401,"code":"expired_auth_token","message":"expired"}"#),
            B2Error::AuthExpired
        ));
        assert!(matches!(
            B2Error::from_status(401, r#"{"status":401,"code":"bad_auth_token","message":"bad"}"#),
            B2Error::AuthExpired
        ));
        assert!(matches!(
            B2Error::from_status(401, r#"{"status":401,"code":"unauthorized","message":"no listFiles"}"#),
            B2Error::Forbidden(msg) if msg.contains("no listFiles")
        ));
        assert!(matches!(B2Error::from_status(429, ""), B2Error::RateLimited));
        assert!(matches!(B2Error::from_status(503, "busy"), B2Error::Server(503, _)));
        assert!(matches!(B2Error::from_status(400, "bad"), B2Error::Request(_)));
    }

    #[test]
    fn test_into_source_error() {
        assert_eq!(SourceError::from(B2Error::AuthExpired), SourceError::AuthExpired);
        assert_eq!(
            SourceError::from(B2Error::Unauthorized("bad key".into())),
            SourceError::AuthError("bad key".into())
        );
        assert!(matches!(
            SourceError::from(B2Error::Server(500, "oops".into())),
            SourceError::BackendUnavailable(_)
        ));
    }
}
