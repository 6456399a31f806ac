//! OAuth 2 core types and data structures.
//!
//! Defines the client and token records, the abstract token and authorization
//! requests consumed by the engines, and the response shapes they produce.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::OAuthError;

/// OAuth 2 Grant Types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

impl FromStr for GrantType {
    type Err = OAuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(OAuthError::UnsupportedGrantType(other.to_string())),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
        };
        f.write_str(value)
    }
}

/// Kind of a stored token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    AuthorizationCode,
    AccessToken,
    RefreshToken,
}

/// OAuth 2 Token Types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Bearer,
}

/// Registered OAuth client
#[derive(Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Domain that redirect URIs must belong to
    pub redirect_domain: String,
    /// Default scope granted to this client
    pub scope: BTreeSet<String>,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("redirect_domain", &self.redirect_domain)
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Issued token: authorization code, access token or refresh token
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// The token value presented by the client
    pub value: String,
    pub kind: TokenKind,
    /// Client the token was issued to
    pub client_id: String,
    pub scope: BTreeSet<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Value of the token this one was derived from
    pub parent_token: Option<String>,
    /// Redirect URI bound at authorization time (authorization codes only)
    pub redirect_uri: Option<String>,
}

impl Token {
    /// Build a token issued at `now` that lives for `lifetime`.
    pub fn new(
        value: String,
        kind: TokenKind,
        client_id: String,
        scope: BTreeSet<String>,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            value,
            kind,
            client_id,
            scope,
            issued_at: now,
            expires_at: now + lifetime,
            parent_token: None,
            redirect_uri: None,
        }
    }

    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent_token = Some(parent.to_string());
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: &str) -> Self {
        self.redirect_uri = Some(redirect_uri.to_string());
        self
    }

    /// A token is expired strictly after `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole seconds of lifetime, as reported in `expires_in`.
    pub fn lifetime_seconds(&self) -> u64 {
        (self.expires_at - self.issued_at).num_seconds().max(0) as u64
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[redacted]")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("has_parent", &self.parent_token.is_some())
            .finish()
    }
}

/// Token endpoint request (RFC 6749 Section 4.1.3, 4.4.2, 6)
///
/// Every field is optional so that missing parameters are reported by the
/// grant engine with the right error code instead of failing deserialization.
#[derive(Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI (authorization_code grant)
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
    /// Requested scope
    pub scope: Option<String>,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("has_code", &self.code.is_some())
            .field("redirect_uri", &self.redirect_uri)
            .field("client_id", &self.client_id)
            .field("has_client_secret", &self.client_secret.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Authorization endpoint request (RFC 6749 Section 4.1.1)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
}

/// Issued authorization code and where to deliver it
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeResponse {
    pub code: String,
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Token type
    pub token_type: TokenType,
    /// Expires in seconds
    pub expires_in: u64,
    /// Refresh token (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn new(access_token: &Token, refresh_token: Option<&Token>) -> Self {
        let scope = join_scopes(&access_token.scope);
        Self {
            access_token: access_token.value.clone(),
            token_type: TokenType::Bearer,
            expires_in: access_token.lifetime_seconds(),
            refresh_token: refresh_token.map(|token| token.value.clone()),
            scope: (!scope.is_empty()).then_some(scope),
        }
    }
}

/// OAuth Error Response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// Error code
    pub error: String,
    /// Error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&OAuthError> for OAuthErrorResponse {
    fn from(err: &OAuthError) -> Self {
        Self {
            error: err.error_code().to_string(),
            error_description: err.public_description(),
        }
    }
}

impl OAuthErrorResponse {
    /// Response for a rejected bearer credential (RFC 6750 Section 3.1).
    pub fn invalid_token() -> Self {
        Self {
            error: "invalid_token".to_string(),
            error_description: None,
        }
    }
}

/// Client Registration Response
///
/// The only place a client secret is ever handed out.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientRegistrationResponse {
    pub client_id: String,
    pub client_secret: String,
}

impl From<&Client> for ClientRegistrationResponse {
    fn from(client: &Client) -> Self {
        Self {
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
        }
    }
}

/// Identity behind an accepted bearer credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub client_id: String,
    pub scope: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

/// Validate scope string
pub fn validate_scope(scope: &str) -> bool {
    scope.split_whitespace().all(|s| {
        s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.')
    })
}

/// Parse scope string into a set
pub fn parse_scope(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(|s| s.to_string()).collect()
}

/// Join scopes into a space-separated string
pub fn join_scopes(scopes: &BTreeSet<String>) -> String {
    scopes.iter().cloned().collect::<Vec<_>>().join(" ")
}
