//! Client registration and authentication.

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::errors::StorageError;
use crate::oauth::credentials::{CredentialGenerator, MAX_MINT_ATTEMPTS};
use crate::oauth::types::Client;
use crate::storage::traits::OAuthStorage;

/// Issues and authenticates client credentials.
pub struct ClientRegistry {
    storage: Arc<dyn OAuthStorage>,
    generator: CredentialGenerator,
    /// Redirect domain given to every new client
    default_domain: String,
    /// Scope given to every new client
    default_scope: BTreeSet<String>,
}

impl ClientRegistry {
    pub fn new(
        storage: Arc<dyn OAuthStorage>,
        generator: CredentialGenerator,
        default_domain: String,
        default_scope: BTreeSet<String>,
    ) -> Self {
        Self {
            storage,
            generator,
            default_domain,
            default_scope,
        }
    }

    /// Register a new client with a fresh id and secret.
    ///
    /// The returned record is the only time the secret leaves the registry.
    pub async fn register(&self) -> Result<Client, StorageError> {
        for _ in 0..MAX_MINT_ATTEMPTS {
            let client = Client {
                client_id: self.generator.new_identifier(),
                client_secret: self.generator.new_identifier(),
                redirect_domain: self.default_domain.clone(),
                scope: self.default_scope.clone(),
                created_at: Utc::now(),
            };

            match self.storage.create_client(&client).await {
                Ok(()) => {
                    tracing::info!(client_id = %client.client_id, "registered client");
                    return Ok(client);
                }
                Err(StorageError::Conflict(_)) => {
                    tracing::warn!("client id collision, drawing again");
                }
                Err(e) => return Err(e),
            }
        }

        Err(StorageError::GeneratorExhausted(MAX_MINT_ATTEMPTS))
    }

    pub async fn lookup(&self, client_id: &str) -> Result<Client, StorageError> {
        self.storage
            .get_client(client_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("client {}", client_id)))
    }

    /// Resolve a client and check its secret in constant time.
    ///
    /// Returns `None` for an unknown id and for a wrong secret alike. An unknown
    /// id is compared against a dummy secret so both paths do the same work.
    pub async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Option<Client>, StorageError> {
        let client = self.storage.get_client(client_id).await?;

        let matched = match &client {
            Some(client) => secrets_match(&client.client_secret, client_secret),
            None => {
                let dummy = "0".repeat(self.generator.identifier_length());
                let _ = secrets_match(&dummy, client_secret);
                false
            }
        };

        Ok(client.filter(|_| matched))
    }

    /// Whether `client_secret` belongs to `client_id`.
    ///
    /// Storage failures deny.
    pub async fn verify(&self, client_id: &str, client_secret: &str) -> bool {
        match self.authenticate(client_id, client_secret).await {
            Ok(client) => client.is_some(),
            Err(e) => {
                tracing::error!(error = ?e, "client verification failed closed");
                false
            }
        }
    }

    /// Remove a client. Tokens already issued to it stay valid until they expire.
    pub async fn deregister(&self, client_id: &str) -> Result<bool, StorageError> {
        let removed = self.storage.delete_client(client_id).await?;
        if removed {
            tracing::info!(client_id = %client_id, "deregistered client");
        }
        Ok(removed)
    }
}

fn secrets_match(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}
