//! The engine facade: one registry, one token store, one grant engine and one
//! validation engine, built explicitly from configuration.

use std::sync::Arc;

use crate::config::Config;
use crate::errors::{ErrorClass, OAuthError, RejectReason, StorageError};
use crate::oauth::{
    AuthorizationServer, AuthorizeRequest, AuthorizeResponse, ClientRegistrationResponse,
    ClientRegistry, CredentialGenerator, GrantSettings, OAuthErrorResponse, Principal,
    ResourceServer, TokenRequest, TokenResponse,
};
use crate::storage::traits::OAuthStorage;

/// Defaults used when building an engine without a [`Config`]
pub struct EngineOptions {
    pub default_domain: String,
    pub default_scope: std::collections::BTreeSet<String>,
    pub credential_length: usize,
    pub grant_settings: GrantSettings,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_domain: "http://localhost:9094".to_string(),
            default_scope: Default::default(),
            credential_length: crate::oauth::credentials::DEFAULT_IDENTIFIER_LENGTH,
            grant_settings: GrantSettings::default(),
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            default_domain: config.client_default_domain.as_ref().clone(),
            default_scope: config.client_default_scope.as_ref().clone(),
            credential_length: *config.client_credential_length.as_ref(),
            grant_settings: config.grant_settings(),
        }
    }
}

pub struct OAuthEngine {
    storage: Arc<dyn OAuthStorage>,
    registry: Arc<ClientRegistry>,
    auth_server: AuthorizationServer,
    resource_server: ResourceServer,
}

impl OAuthEngine {
    pub fn new(config: &Config, storage: Arc<dyn OAuthStorage>) -> Self {
        Self::with_options(EngineOptions::from(config), storage)
    }

    pub fn with_options(options: EngineOptions, storage: Arc<dyn OAuthStorage>) -> Self {
        let generator = CredentialGenerator::new(options.credential_length);
        let registry = Arc::new(ClientRegistry::new(
            storage.clone(),
            generator.clone(),
            options.default_domain,
            options.default_scope,
        ));
        let auth_server = AuthorizationServer::new(
            storage.clone(),
            registry.clone(),
            generator,
            options.grant_settings,
        );
        let resource_server = ResourceServer::new(storage.clone());

        Self {
            storage,
            registry,
            auth_server,
            resource_server,
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Run a token request through the grant engine.
    pub async fn issue_token(
        &self,
        request: TokenRequest,
    ) -> Result<TokenResponse, OAuthErrorResponse> {
        let grant_type = request.grant_type.clone().unwrap_or_default();
        self.auth_server.token(request).await.map_err(|err| {
            log_oauth_error("token", &grant_type, &err);
            OAuthErrorResponse::from(&err)
        })
    }

    /// Accept or reject a bearer credential.
    pub async fn validate_request(&self, bearer: Option<&str>) -> Result<Principal, RejectReason> {
        self.resource_server.validate(bearer).await.inspect_err(|reason| {
            if *reason == RejectReason::Unavailable {
                tracing::error!(error = %reason, "bearer validation failed closed");
            } else {
                tracing::debug!(error = %reason, "bearer credential rejected");
            }
        })
    }

    /// Register a client. The secret is returned here and nowhere else.
    pub async fn register_client(&self) -> Result<ClientRegistrationResponse, OAuthErrorResponse> {
        self.registry
            .register()
            .await
            .map(|client| ClientRegistrationResponse::from(&client))
            .map_err(|err| {
                let err = OAuthError::from(err);
                log_oauth_error("register", "", &err);
                OAuthErrorResponse::from(&err)
            })
    }

    /// Issue an authorization code for an already approved request.
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
    ) -> Result<AuthorizeResponse, OAuthErrorResponse> {
        self.auth_server.authorize(request).await.map_err(|err| {
            log_oauth_error("authorize", "", &err);
            OAuthErrorResponse::from(&err)
        })
    }

    /// Sweep expired tokens and revocation records.
    pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
        let removed = self.storage.cleanup_expired().await?;
        if removed > 0 {
            tracing::debug!(removed, "swept expired tokens");
        }
        Ok(removed)
    }
}

fn log_oauth_error(operation: &str, grant_type: &str, err: &OAuthError) {
    match err.class() {
        ErrorClass::ClientError => {
            tracing::debug!(operation, grant_type, error = %err, "rejected malformed request")
        }
        ErrorClass::AuthFailure => {
            tracing::info!(operation, grant_type, error = %err, "authentication failed")
        }
        ErrorClass::InternalFailure => {
            tracing::error!(operation, grant_type, error = %err, "internal failure")
        }
    }
}
