//! Random credential generation for client identities and token values.

use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};

use crate::errors::StorageError;
use crate::storage::traits::TokenStore;

/// Length of every token value: 43 base62 characters carry about 256 bits.
pub const TOKEN_LENGTH: usize = 43;

/// Default length of generated client ids and secrets
pub const DEFAULT_IDENTIFIER_LENGTH: usize = 8;

/// Attempts at drawing an unused token value before giving up
pub const MAX_MINT_ATTEMPTS: usize = 4;

/// Draws client identifiers, client secrets and token values from the OS CSPRNG.
///
/// Holds no state besides the configured lengths; `OsRng` is safe to share.
#[derive(Debug, Clone)]
pub struct CredentialGenerator {
    identifier_length: usize,
}

impl Default for CredentialGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTIFIER_LENGTH)
    }
}

impl CredentialGenerator {
    pub fn new(identifier_length: usize) -> Self {
        Self { identifier_length }
    }

    pub fn identifier_length(&self) -> usize {
        self.identifier_length
    }

    /// Fixed-length base62 identifier, used for client ids and client secrets.
    pub fn new_identifier(&self) -> String {
        random_base62(self.identifier_length)
    }

    /// Fixed-length base62 token value.
    pub fn new_secret_token(&self) -> String {
        random_base62(TOKEN_LENGTH)
    }

    /// Whether `value` has the exact shape of a value from [`Self::new_secret_token`].
    pub fn is_well_formed_token(value: &str) -> bool {
        value.len() == TOKEN_LENGTH && value.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    /// Draw a token value not yet known to `store`.
    pub async fn mint_token_value<S>(&self, store: &S) -> Result<String, StorageError>
    where
        S: TokenStore + ?Sized,
    {
        for _ in 0..MAX_MINT_ATTEMPTS {
            let value = self.new_secret_token();
            if !store.contains(&value).await? {
                return Ok(value);
            }
            tracing::warn!("token value collision, drawing again");
        }
        Err(StorageError::GeneratorExhausted(MAX_MINT_ATTEMPTS))
    }
}

fn random_base62(length: usize) -> String {
    OsRng
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryOAuthStorage;
    use std::collections::HashSet;

    #[test]
    fn test_identifier_shape() {
        let generator = CredentialGenerator::default();
        let id = generator.new_identifier();
        assert_eq!(id.len(), 8);
        assert!(id.bytes().all(|b| b.is_ascii_alphanumeric()));

        let long = CredentialGenerator::new(24).new_identifier();
        assert_eq!(long.len(), 24);
    }

    #[test]
    fn test_secret_tokens_are_distinct_and_well_formed() {
        let generator = CredentialGenerator::default();
        let values: HashSet<String> = (0..1000).map(|_| generator.new_secret_token()).collect();
        assert_eq!(values.len(), 1000);
        assert!(values.iter().all(|v| CredentialGenerator::is_well_formed_token(v)));
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(!CredentialGenerator::is_well_formed_token(""));
        assert!(!CredentialGenerator::is_well_formed_token("short"));
        let with_symbol = format!("{}!", "a".repeat(TOKEN_LENGTH - 1));
        assert!(!CredentialGenerator::is_well_formed_token(&with_symbol));
        let too_long = "a".repeat(TOKEN_LENGTH + 1);
        assert!(!CredentialGenerator::is_well_formed_token(&too_long));
    }

    #[tokio::test]
    async fn test_mint_token_value() {
        let storage = MemoryOAuthStorage::new();
        let value = CredentialGenerator::default()
            .mint_token_value(&storage)
            .await
            .unwrap();
        assert!(CredentialGenerator::is_well_formed_token(&value));
    }
}
