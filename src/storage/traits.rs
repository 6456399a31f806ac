//! Storage trait definitions for OAuth clients and tokens.
//!
//! Defines async storage interfaces that can be implemented by various backend
//! providers. The in-memory backend is the reference implementation; a durable
//! backend only has to honor the same contracts.

use crate::errors::StorageError;
use crate::oauth::types::*;
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Trait for storing and retrieving OAuth clients
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Insert a client whose id is not yet taken.
    ///
    /// Fails with `Conflict` when the id already exists.
    async fn create_client(&self, client: &Client) -> Result<()>;

    /// Retrieve a client by ID
    async fn get_client(&self, client_id: &str) -> Result<Option<Client>>;

    /// Delete a client, returning whether it existed
    async fn delete_client(&self, client_id: &str) -> Result<bool>;
}

/// Trait for storing and retrieving issued tokens of every kind
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert or overwrite a token by value.
    ///
    /// Fails with `Conflict` when an existing entry belongs to another client
    /// or is of another kind, and with `InvalidData` when `expires_at` is not
    /// after `issued_at`.
    async fn put(&self, token: &Token) -> Result<()>;

    /// Retrieve a live token.
    ///
    /// Fails with `Expired` (and reclaims the entry) past `expires_at`, and
    /// with `NotFound` when no entry exists.
    async fn get(&self, value: &str) -> Result<Token>;

    /// Atomically retrieve and delete a token.
    ///
    /// Among concurrent callers for the same value exactly one succeeds; the
    /// others fail with `NotFound`.
    async fn consume(&self, value: &str) -> Result<Token>;

    /// Delete a token, returning it if this call removed it.
    ///
    /// Revoked refresh tokens are remembered until their original expiry so
    /// that a replay can be recognised with [`TokenStore::revoked`].
    async fn revoke(&self, value: &str) -> Result<Option<Token>>;

    /// Retrieve the record of a revoked refresh token, if still remembered.
    async fn revoked(&self, value: &str) -> Result<Option<Token>>;

    /// Whether the value is in use, live or revoked.
    async fn contains(&self, value: &str) -> Result<bool>;

    /// All live tokens issued to a client
    async fn client_tokens(&self, client_id: &str) -> Result<Vec<Token>>;

    /// All known tokens, live or revoked, whose `parent_token` is `parent`
    async fn children(&self, parent: &str) -> Result<Vec<Token>>;

    /// Remove expired tokens and revocation records, returning how many were removed
    async fn cleanup_expired(&self) -> Result<usize>;

    /// Revoke every live token derived, directly or transitively, from `value`.
    ///
    /// Revoked intermediate tokens are walked through, so a family is reached
    /// even after several rotations. Returns the number of live tokens revoked.
    /// `value` itself is left alone.
    async fn revoke_descendants(&self, value: &str) -> Result<usize> {
        let mut pending = vec![value.to_string()];
        let mut revoked = 0;

        while let Some(parent) = pending.pop() {
            for child in self.children(&parent).await? {
                if self.revoke(&child.value).await?.is_some() {
                    revoked += 1;
                }
                pending.push(child.value);
            }
        }

        Ok(revoked)
    }
}

/// Unified storage trait combining the client and token stores
pub trait OAuthStorage: ClientStore + TokenStore {}
