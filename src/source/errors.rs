//! Source error taxonomy
//!
//! Every backend adapter and the registry report failures through
//! `SourceError`. Only `AuthExpired` is treated as recoverable (one
//! reauthentication, then one more attempt).

/// Result type alias for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Unsupported source type: {0}")]
    UnsupportedSourceType(String),

    #[error("Source already registered: {0}")]
    SourceAlreadyRegistered(String),

    #[error("No cached file matches the hashes of {0}")]
    CachedFileNotFound(String),

    #[error("No mapping for request key {0}")]
    MappingNotFound(String),

    #[error("Authentication expired, session needs renewal")]
    AuthExpired,

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl SourceError {
    /// Whether a reauthentication may make the same call succeed
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, SourceError::AuthExpired)
    }
}
