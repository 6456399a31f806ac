//! In-memory OAuth storage implementation
//!
//! Clients and tokens live in sharded concurrent maps, so operations on
//! distinct keys never wait on each other. Secondary indexes by owning client
//! and by parent token are kept in their own maps; no code path holds a guard
//! on one map while touching another.

use crate::errors::StorageError;
use crate::oauth::types::*;
use crate::storage::traits::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use std::collections::HashSet;

pub type Result<T> = std::result::Result<T, StorageError>;

/// In-memory implementation for OAuth storage
#[derive(Default)]
pub struct MemoryOAuthStorage {
    clients: DashMap<String, Client>,
    tokens: DashMap<String, Token>,
    // Revoked refresh tokens, kept until their original expiry
    revoked: DashMap<String, Token>,
    by_client: DashMap<String, HashSet<String>>, // client_id -> live token values
    by_parent: DashMap<String, HashSet<String>>, // parent value -> child values
}

impl MemoryOAuthStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(&self, token: &Token) {
        self.by_client
            .entry(token.client_id.clone())
            .or_default()
            .insert(token.value.clone());
        if let Some(parent) = &token.parent_token {
            self.by_parent
                .entry(parent.clone())
                .or_default()
                .insert(token.value.clone());
        }
    }

    fn unindex_client(&self, token: &Token) {
        if let Some(mut values) = self.by_client.get_mut(&token.client_id) {
            values.remove(&token.value);
        }
        self.by_client
            .remove_if(&token.client_id, |_, values| values.is_empty());
    }

    fn unindex_parent(&self, token: &Token) {
        let Some(parent) = &token.parent_token else {
            return;
        };
        if let Some(mut values) = self.by_parent.get_mut(parent) {
            values.remove(&token.value);
        }
        self.by_parent.remove_if(parent, |_, values| values.is_empty());
    }

    /// Drop every trace of a token that is neither live nor remembered.
    fn forget(&self, token: &Token) {
        self.unindex_client(token);
        self.unindex_parent(token);
    }

    /// Remove `value` if it is still expired at `now`.
    fn reclaim_expired(&self, value: &str, now: DateTime<Utc>) {
        if let Some((_, removed)) = self
            .tokens
            .remove_if(value, |_, token| token.is_expired_at(now))
        {
            self.forget(&removed);
        }
    }
}

#[async_trait]
impl ClientStore for MemoryOAuthStorage {
    async fn create_client(&self, client: &Client) -> Result<()> {
        match self.clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(
                "client id already registered".to_string(),
            )),
            Entry::Vacant(entry) => {
                entry.insert(client.clone());
                Ok(())
            }
        }
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        Ok(self
            .clients
            .get(client_id)
            .map(|entry| entry.value().clone()))
    }

    async fn delete_client(&self, client_id: &str) -> Result<bool> {
        Ok(self.clients.remove(client_id).is_some())
    }
}

#[async_trait]
impl TokenStore for MemoryOAuthStorage {
    async fn put(&self, token: &Token) -> Result<()> {
        if token.expires_at <= token.issued_at {
            return Err(StorageError::InvalidData(
                "token must expire after it is issued".to_string(),
            ));
        }

        let replaced = match self.tokens.entry(token.value.clone()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                if existing.client_id != token.client_id || existing.kind != token.kind {
                    return Err(StorageError::Conflict(
                        "token value already issued to another owner or kind".to_string(),
                    ));
                }
                Some(entry.insert(token.clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(token.clone());
                None
            }
        };

        if let Some(previous) = replaced {
            self.unindex_parent(&previous);
        }
        self.index(token);
        Ok(())
    }

    async fn get(&self, value: &str) -> Result<Token> {
        let now = Utc::now();
        let token = self
            .tokens
            .get(value)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound("token".to_string()))?;

        if token.is_expired_at(now) {
            self.reclaim_expired(value, now);
            return Err(StorageError::Expired("token".to_string()));
        }

        Ok(token)
    }

    async fn consume(&self, value: &str) -> Result<Token> {
        let (_, token) = self
            .tokens
            .remove(value)
            .ok_or_else(|| StorageError::NotFound("token".to_string()))?;
        self.unindex_client(&token);

        if token.is_expired_at(Utc::now()) {
            self.unindex_parent(&token);
            return Err(StorageError::Expired("token".to_string()));
        }

        Ok(token)
    }

    async fn revoke(&self, value: &str) -> Result<Option<Token>> {
        let Some((_, token)) = self.tokens.remove(value) else {
            return Ok(None);
        };
        self.unindex_client(&token);

        if token.kind == TokenKind::RefreshToken && !token.is_expired_at(Utc::now()) {
            self.revoked.insert(token.value.clone(), token.clone());
        } else {
            self.unindex_parent(&token);
        }

        Ok(Some(token))
    }

    async fn revoked(&self, value: &str) -> Result<Option<Token>> {
        let now = Utc::now();
        Ok(self
            .revoked
            .get(value)
            .map(|entry| entry.value().clone())
            .filter(|token| !token.is_expired_at(now)))
    }

    async fn contains(&self, value: &str) -> Result<bool> {
        Ok(self.tokens.contains_key(value) || self.revoked.contains_key(value))
    }

    async fn client_tokens(&self, client_id: &str) -> Result<Vec<Token>> {
        let values: Vec<String> = match self.by_client.get(client_id) {
            Some(values) => values.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };

        let now = Utc::now();
        Ok(values
            .iter()
            .filter_map(|value| self.tokens.get(value).map(|entry| entry.value().clone()))
            .filter(|token| !token.is_expired_at(now))
            .collect())
    }

    async fn children(&self, parent: &str) -> Result<Vec<Token>> {
        let values: Vec<String> = match self.by_parent.get(parent) {
            Some(values) => values.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };

        Ok(values
            .iter()
            .filter_map(|value| {
                self.tokens
                    .get(value)
                    .or_else(|| self.revoked.get(value))
                    .map(|entry| entry.value().clone())
            })
            .collect())
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;

        let expired: Vec<String> = self
            .tokens
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();
        for value in expired {
            if let Some((_, token)) = self
                .tokens
                .remove_if(&value, |_, token| token.is_expired_at(now))
            {
                self.forget(&token);
                removed += 1;
            }
        }

        let expired_revocations: Vec<String> = self
            .revoked
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();
        for value in expired_revocations {
            if let Some((_, token)) = self.revoked.remove(&value) {
                self.unindex_parent(&token);
                removed += 1;
            }
        }

        Ok(removed)
    }
}

impl OAuthStorage for MemoryOAuthStorage {}
