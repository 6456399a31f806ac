//! OAuth 2 authorization and resource server core.
//!
//! Nothing in here knows about HTTP; the adapter in [`crate::http`] translates
//! requests into the types from [`types`] and back.

pub mod auth_server;
pub mod clients;
pub mod credentials;
pub mod resource_server;
pub mod types;

// Re-export frequently used items from each module
pub use auth_server::{AuthorizationServer, GrantSettings, redirect_matches};
pub use clients::ClientRegistry;
pub use credentials::CredentialGenerator;
pub use resource_server::{ResourceServer, bearer_credential};
pub use types::{
    AuthorizeRequest, AuthorizeResponse, Client, ClientRegistrationResponse, GrantType,
    OAuthErrorResponse, Principal, Token, TokenKind, TokenRequest, TokenResponse, TokenType,
    parse_scope,
};
