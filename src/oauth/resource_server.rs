//! Validation engine for bearer credentials presented to protected resources.

use std::sync::Arc;

use crate::errors::{RejectReason, StorageError};
use crate::oauth::credentials::CredentialGenerator;
use crate::oauth::types::*;
use crate::storage::traits::OAuthStorage;

/// OAuth Resource Server for protecting APIs
pub struct ResourceServer {
    storage: Arc<dyn OAuthStorage>,
}

impl ResourceServer {
    pub fn new(storage: Arc<dyn OAuthStorage>) -> Self {
        Self { storage }
    }

    /// Accept or reject a bearer credential.
    ///
    /// Never consumes the token. Storage failures reject.
    pub async fn validate(&self, bearer: Option<&str>) -> Result<Principal, RejectReason> {
        let bearer = bearer
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(RejectReason::Missing)?;

        if !CredentialGenerator::is_well_formed_token(bearer) {
            return Err(RejectReason::Malformed);
        }

        let token = match self.storage.get(bearer).await {
            Ok(token) => token,
            Err(StorageError::NotFound(_)) => return Err(RejectReason::NotFound),
            Err(StorageError::Expired(_)) => return Err(RejectReason::Expired),
            Err(e) => {
                tracing::error!(error = ?e, "token lookup failed");
                return Err(RejectReason::Unavailable);
            }
        };

        // Codes and refresh tokens never grant access
        if token.kind != TokenKind::AccessToken {
            return Err(RejectReason::NotFound);
        }

        Ok(Principal {
            client_id: token.client_id,
            scope: token.scope,
            expires_at: token.expires_at,
        })
    }
}

/// Pull the credential out of an `Authorization` header value (RFC 6750 Section 2.1).
///
/// The scheme is matched case-insensitively. Any other scheme yields `None`.
pub fn bearer_credential(authorization: &str) -> Option<&str> {
    let (scheme, credential) = authorization.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| credential.trim())
        .filter(|credential| !credential.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryOAuthStorage, TokenStore};
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn access_token(value: &str, lifetime: Duration) -> Token {
        Token::new(
            value.to_string(),
            TokenKind::AccessToken,
            "client01".to_string(),
            ["read".to_string()].into_iter().collect(),
            Utc::now(),
            lifetime,
        )
    }

    #[tokio::test]
    async fn test_valid_access_token() {
        let storage = Arc::new(MemoryOAuthStorage::new());
        let server = ResourceServer::new(storage.clone());
        let value = CredentialGenerator::default().new_secret_token();
        storage
            .put(&access_token(&value, Duration::hours(2)))
            .await
            .unwrap();

        let principal = server.validate(Some(&value)).await.unwrap();
        assert_eq!(principal.client_id, "client01");
        assert!(principal.scope.contains("read"));

        // Validation does not consume
        assert!(server.validate(Some(&value)).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejection_reasons() {
        let storage = Arc::new(MemoryOAuthStorage::new());
        let server = ResourceServer::new(storage.clone());

        assert_eq!(server.validate(None).await, Err(RejectReason::Missing));
        assert_eq!(server.validate(Some("  ")).await, Err(RejectReason::Missing));
        assert_eq!(
            server.validate(Some("not-a-token")).await,
            Err(RejectReason::Malformed)
        );

        let unknown = CredentialGenerator::default().new_secret_token();
        assert_eq!(
            server.validate(Some(&unknown)).await,
            Err(RejectReason::NotFound)
        );
    }

    #[tokio::test]
    async fn test_expired_access_token() {
        let storage = Arc::new(MemoryOAuthStorage::new());
        let server = ResourceServer::new(storage.clone());
        let value = CredentialGenerator::default().new_secret_token();

        let mut token = access_token(&value, Duration::hours(1));
        token.issued_at = Utc::now() - Duration::hours(2);
        token.expires_at = Utc::now() - Duration::seconds(1);
        storage.put(&token).await.unwrap();

        assert_eq!(
            server.validate(Some(&value)).await,
            Err(RejectReason::Expired)
        );
        // Reclaimed on first sight
        assert_eq!(
            server.validate(Some(&value)).await,
            Err(RejectReason::NotFound)
        );
    }

    #[tokio::test]
    async fn test_refresh_token_does_not_grant_access() {
        let storage = Arc::new(MemoryOAuthStorage::new());
        let server = ResourceServer::new(storage.clone());
        let value = CredentialGenerator::default().new_secret_token();

        let refresh = Token::new(
            value.clone(),
            TokenKind::RefreshToken,
            "client01".to_string(),
            BTreeSet::new(),
            Utc::now(),
            Duration::hours(72),
        );
        storage.put(&refresh).await.unwrap();

        assert_eq!(
            server.validate(Some(&value)).await,
            Err(RejectReason::NotFound)
        );
    }

    #[test]
    fn test_bearer_credential() {
        assert_eq!(bearer_credential("Bearer abc"), Some("abc"));
        assert_eq!(bearer_credential("bearer  abc "), Some("abc"));
        assert_eq!(bearer_credential("Basic abc"), None);
        assert_eq!(bearer_credential("Bearer"), None);
        assert_eq!(bearer_credential("Bearer   "), None);
    }
}
