//! Microsoft Graph error types

use serde::Deserialize;

use crate::source::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Access token expired or invalid")]
    AuthExpired,

    #[error("Token request rejected: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Throttled by Microsoft Graph")]
    Throttled,

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Client has not been authorized")]
    NotAuthorized,
}

/// `{"error": {"code", "message"}}` envelope of Graph API failures
#[derive(Debug, Deserialize)]
struct ErrorWrapper {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl GraphError {
    /// Classify a failed Graph API response
    pub fn from_status(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorWrapper>(body).ok().map(|w| w.error);
        let detail = match &parsed {
            Some(e) => format!("{}: {}", e.code, e.message),
            None => body.to_string(),
        };
        if parsed.as_ref().is_some_and(|e| e.code == "InvalidAuthenticationToken") {
            return GraphError::AuthExpired;
        }

        match status {
            401 => GraphError::AuthExpired,
            404 => GraphError::NotFound(detail),
            429 => GraphError::Throttled,
            500..=599 => GraphError::Server(status, detail),
            _ => GraphError::Request(format!("HTTP {}: {}", status, detail)),
        }
    }
}

impl From<reqwest::Error> for GraphError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GraphError::Request(e.to_string())
        } else {
            GraphError::Network(e.to_string())
        }
    }
}

impl From<GraphError> for SourceError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::AuthExpired | GraphError::NotAuthorized => SourceError::AuthExpired,
            GraphError::Unauthorized(msg) => SourceError::AuthError(msg),
            other => SourceError::BackendUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_token_code_wins_over_status() {
        let body = r#"{"error":{"code":"InvalidAuthenticationToken","message":"Access token has expired."}}"#;
        assert!(matches!(GraphError::from_status(400, body), GraphError::AuthExpired));
        assert!(matches!(GraphError::from_status(401, "{}"), GraphError::AuthExpired));
    }

    #[test]
    fn test_other_statuses() {
        let body = r#"{"error":{"code":"itemNotFound","message":"gone"}}"#;
        assert!(matches!(GraphError::from_status(404, body), GraphError::NotFound(m) if m.contains("itemNotFound")));
        assert!(matches!(GraphError::from_status(429, ""), GraphError::Throttled));
        assert!(matches!(GraphError::from_status(503, "busy"), GraphError::Server(503, _)));
        assert!(matches!(GraphError::from_status(400, "bad"), GraphError::Request(_)));
    }

    #[test]
    fn test_into_source_error() {
        assert_eq!(SourceError::from(GraphError::AuthExpired), SourceError::AuthExpired);
        assert!(matches!(
            SourceError::from(GraphError::Throttled),
            SourceError::BackendUnavailable(_)
        ));
    }
}
