//! Error taxonomy shared by every grant and token operation.

use thiserror::Error;

/// Protocol-level failure of a grant, token, revocation or introspection call.
///
/// Each variant maps onto one RFC 6749 error code via [`OAuthError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuthError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("client authentication failed")]
    InvalidClient,

    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("unauthorized client: {0}")]
    UnauthorizedClient(String),

    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("unsupported response type: {0}")]
    UnsupportedResponseType(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("the resource owner denied the request")]
    AccessDenied,

    #[error("redirect URI does not match any registered redirect URI")]
    MismatchingRedirectUri,

    #[error("invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    #[error("server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// RFC 6749 error code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnauthorizedClient(_) => "unauthorized_client",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType(_) => "unsupported_response_type",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::AccessDenied => "access_denied",
            OAuthError::MismatchingRedirectUri | OAuthError::InvalidRedirectUri(_) => {
                "invalid_request"
            }
            OAuthError::ServerError(_) => "server_error",
        }
    }

    /// Whether this error may be delivered to the client's redirect URI.
    ///
    /// Redirect URI problems and unknown clients are always rendered to the
    /// user agent directly; sending them to an unverified URI is an open redirect.
    pub fn is_redirectable(&self) -> bool {
        !matches!(
            self,
            OAuthError::MismatchingRedirectUri
                | OAuthError::InvalidRedirectUri(_)
                | OAuthError::InvalidClient
        )
    }

    /// Human readable description, omitted for server errors so store
    /// internals never reach a client.
    pub fn description(&self) -> Option<String> {
        match self {
            OAuthError::ServerError(_) => None,
            other => Some(other.to_string()),
        }
    }
}

/// Failure of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure while producing an ID token signature.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("no {0} signing key available")]
    MissingKey(&'static str),

    #[error("unsigned ID tokens are disabled")]
    UnsignedNotAllowed,

    #[error("JWT encoding failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("claims encoding failed: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Engine configuration that cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be between 1 and {max} seconds, got {value}")]
    LifetimeOutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
}

/// Failure of an Application Registry operation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("application not found: {0}")]
    NotFound(String),

    #[error("client_id already registered: {0}")]
    DuplicateClientId(String),

    #[error("invalid redirect URI: {0}")]
    InvalidRedirectUri(String),

    #[error("invalid application: {0}")]
    InvalidMetadata(String),

    #[error("public clients cannot be registered with a secret")]
    UnexpectedSecret,

    #[error("secret hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Store failure: {}", err);
        OAuthError::ServerError(err.to_string())
    }
}

impl From<SigningError> for OAuthError {
    fn from(err: SigningError) -> Self {
        tracing::error!("ID token signing failure: {}", err);
        OAuthError::ServerError(err.to_string())
    }
}

impl From<RegistryError> for OAuthError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(_) => OAuthError::InvalidClient,
            RegistryError::Store(e) => e.into(),
            other => OAuthError::ServerError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_uri_errors_are_not_redirectable() {
        assert!(!OAuthError::MismatchingRedirectUri.is_redirectable());
        assert!(!OAuthError::InvalidRedirectUri("x".into()).is_redirectable());
        assert!(!OAuthError::InvalidClient.is_redirectable());
        assert!(OAuthError::InvalidScope("write".into()).is_redirectable());
        assert!(OAuthError::AccessDenied.is_redirectable());
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(OAuthError::InvalidGrant("x".into()).code(), "invalid_grant");
        assert_eq!(OAuthError::UnsupportedGrantType("x".into()).code(), "unsupported_grant_type");
        assert_eq!(OAuthError::MismatchingRedirectUri.code(), "invalid_request");
    }

    #[test]
    fn test_server_error_hides_description() {
        assert_eq!(OAuthError::ServerError("disk full".into()).description(), None);
        assert!(OAuthError::InvalidScope("write".into()).description().is_some());
    }
}
