//! Standardized error types following the `error-portcullis-<domain>-<number>` format.

use thiserror::Error;

/// Configuration errors that occur during application startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when a required environment variable is not set
    #[error("error-portcullis-config-1 {0} must be set")]
    EnvVarRequired(String),

    /// Error when PORT cannot be parsed
    #[error("error-portcullis-config-2 Parsing PORT into u16 failed: {0:?}")]
    PortParsingFailed(std::num::ParseIntError),

    /// Error when version information is not available
    #[error("error-portcullis-config-3 One of GIT_HASH or CARGO_PKG_VERSION must be set")]
    VersionNotSet,

    /// Error when duration string cannot be parsed
    #[error("error-portcullis-config-4 Failed to parse duration '{0}': {1}")]
    DurationParsingFailed(String, String),

    /// Error when boolean string cannot be parsed
    #[error(
        "error-portcullis-config-5 Failed to parse boolean '{0}': expected true/false/1/0/yes/no/on/off"
    )]
    BoolParsingFailed(String),

    /// Error when a credential length is out of range
    #[error("error-portcullis-config-6 Invalid credential length '{0}': expected 8 to 64")]
    CredentialLengthInvalid(String),

    /// Error when the default redirect domain is not an absolute URL
    #[error("error-portcullis-config-7 Invalid redirect domain '{0}': {1}")]
    RedirectDomainInvalid(String, url::ParseError),

    /// Error when a scope value contains forbidden characters
    #[error("error-portcullis-config-8 Invalid scope '{0}'")]
    ScopeInvalid(String),
}

/// How an error must be surfaced and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or missing caller input.
    ClientError,
    /// Client or token could not be authenticated.
    AuthFailure,
    /// Store unavailable or generator exhausted. Never surfaced with detail.
    InternalFailure,
}

/// OAuth-related errors
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Invalid client credentials
    #[error("error-portcullis-oauth-1 Invalid client credentials: {0}")]
    InvalidClient(String),

    /// Invalid, expired, consumed or mismatched grant
    #[error("error-portcullis-oauth-2 Invalid grant: {0}")]
    InvalidGrant(String),

    /// Unsupported grant type
    #[error("error-portcullis-oauth-3 Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    /// Invalid request
    #[error("error-portcullis-oauth-4 Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid scope
    #[error("error-portcullis-oauth-5 Invalid scope: {0}")]
    InvalidScope(String),

    /// Server error
    #[error("error-portcullis-oauth-6 Server error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// Stable machine-readable error code (RFC 6749 Section 5.2).
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            OAuthError::InvalidRequest(_)
            | OAuthError::UnsupportedGrantType(_)
            | OAuthError::InvalidScope(_) => ErrorClass::ClientError,
            OAuthError::InvalidClient(_) | OAuthError::InvalidGrant(_) => ErrorClass::AuthFailure,
            OAuthError::ServerError(_) => ErrorClass::InternalFailure,
        }
    }

    /// Description safe to hand to the caller.
    ///
    /// Internal failures are reported without any detail.
    pub fn public_description(&self) -> Option<String> {
        match self {
            OAuthError::InvalidClient(_) => Some("Client authentication failed".to_string()),
            OAuthError::InvalidGrant(_) => Some("Invalid or expired grant".to_string()),
            OAuthError::UnsupportedGrantType(msg)
            | OAuthError::InvalidRequest(msg)
            | OAuthError::InvalidScope(msg) => Some(msg.clone()),
            OAuthError::ServerError(_) => None,
        }
    }
}

impl From<StorageError> for OAuthError {
    fn from(err: StorageError) -> Self {
        OAuthError::ServerError(err.to_string())
    }
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Error when the backend cannot be reached
    #[error("error-portcullis-storage-1 Storage unavailable: {0}")]
    Unavailable(String),

    /// Error when a requested entry does not exist
    #[error("error-portcullis-storage-2 Not found: {0}")]
    NotFound(String),

    /// Error when a requested entry existed but is past its expiry
    #[error("error-portcullis-storage-3 Expired: {0}")]
    Expired(String),

    /// Error when an overwrite would change the owner or kind of an entry
    #[error("error-portcullis-storage-4 Conflict: {0}")]
    Conflict(String),

    /// Error when data validation fails
    #[error("error-portcullis-storage-5 Invalid data: {0}")]
    InvalidData(String),

    /// Error when no unused value could be drawn
    #[error("error-portcullis-storage-6 Credential generator exhausted after {0} attempts")]
    GeneratorExhausted(usize),
}

/// Reasons a bearer credential is rejected by the resource server.
///
/// Kept internal to logs; every variant produces the same external response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// No credential was presented
    #[error("error-portcullis-token-1 Missing credential")]
    Missing,

    /// The credential does not have the shape of an issued token
    #[error("error-portcullis-token-2 Malformed credential")]
    Malformed,

    /// No live access token has this value
    #[error("error-portcullis-token-3 Unknown credential")]
    NotFound,

    /// The access token is past its expiry
    #[error("error-portcullis-token-4 Expired credential")]
    Expired,

    /// The token store could not answer
    #[error("error-portcullis-token-5 Token store unavailable")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            OAuthError::InvalidClient("x".to_string()).error_code(),
            "invalid_client"
        );
        assert_eq!(
            OAuthError::InvalidGrant("x".to_string()).error_code(),
            "invalid_grant"
        );
        assert_eq!(
            OAuthError::UnsupportedGrantType("x".to_string()).error_code(),
            "unsupported_grant_type"
        );
        assert_eq!(
            OAuthError::InvalidRequest("x".to_string()).error_code(),
            "invalid_request"
        );
    }

    #[test]
    fn test_invalid_client_description_does_not_leak_reason() {
        let unknown = OAuthError::InvalidClient("client not found".to_string());
        let mismatch = OAuthError::InvalidClient("secret mismatch".to_string());
        assert_eq!(unknown.public_description(), mismatch.public_description());
    }

    #[test]
    fn test_invalid_grant_description_does_not_leak_reason() {
        let unknown = OAuthError::InvalidGrant("token not found".to_string());
        let foreign = OAuthError::InvalidGrant("code issued to another client".to_string());
        let redirect = OAuthError::InvalidGrant("redirect uri mismatch".to_string());
        assert_eq!(unknown.public_description(), foreign.public_description());
        assert_eq!(unknown.public_description(), redirect.public_description());
    }

    #[test]
    fn test_server_error_has_no_public_description() {
        let err: OAuthError = StorageError::Unavailable("shard poisoned".to_string()).into();
        assert_eq!(err.class(), ErrorClass::InternalFailure);
        assert!(err.public_description().is_none());
    }
}
