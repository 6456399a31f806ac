//! Grant engine: authorization code issuance and the token endpoint state machine.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use url::Url;

use crate::errors::{OAuthError, StorageError};
use crate::oauth::clients::ClientRegistry;
use crate::oauth::credentials::CredentialGenerator;
use crate::oauth::types::*;
use crate::storage::traits::OAuthStorage;

/// Lifetimes and rotation policy applied by the grant engine
#[derive(Debug, Clone)]
pub struct GrantSettings {
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
    pub authorization_code_lifetime: Duration,
    /// Issue a refresh token alongside the access token on code exchange
    pub issue_refresh_tokens: bool,
    /// Revoke the access token paired with a refresh token when it is rotated
    pub refresh_revokes_access: bool,
    /// Revoke every descendant of a refresh token presented after revocation
    pub revoke_family_on_reuse: bool,
}

impl Default for GrantSettings {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::hours(2),
            refresh_token_lifetime: Duration::hours(72),
            authorization_code_lifetime: Duration::minutes(10),
            issue_refresh_tokens: true,
            refresh_revokes_access: true,
            revoke_family_on_reuse: true,
        }
    }
}

/// OAuth 2 Authorization Server
pub struct AuthorizationServer {
    storage: Arc<dyn OAuthStorage>,
    registry: Arc<ClientRegistry>,
    generator: CredentialGenerator,
    settings: GrantSettings,
}

impl AuthorizationServer {
    pub fn new(
        storage: Arc<dyn OAuthStorage>,
        registry: Arc<ClientRegistry>,
        generator: CredentialGenerator,
        settings: GrantSettings,
    ) -> Self {
        Self {
            storage,
            registry,
            generator,
            settings,
        }
    }

    /// Handle authorization requests (RFC 6749 Section 4.1.1)
    ///
    /// The resource owner is assumed to have approved the request.
    pub async fn authorize(&self, request: AuthorizeRequest) -> Result<AuthorizeResponse, OAuthError> {
        if let Some(response_type) = request.response_type.as_deref() {
            if response_type != "code" {
                return Err(OAuthError::InvalidRequest(format!(
                    "Unsupported response type: {}",
                    response_type
                )));
            }
        }

        let client_id = request
            .client_id
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidClient("Missing client_id".to_string()))?;

        let client = self
            .storage
            .get_client(client_id)
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("Client not found".to_string()))?;

        let redirect_uri = request
            .redirect_uri
            .unwrap_or_else(|| client.redirect_domain.clone());
        if !redirect_matches(&client.redirect_domain, &redirect_uri) {
            return Err(OAuthError::InvalidRequest(
                "Invalid redirect URI".to_string(),
            ));
        }

        let scope = requested_scope(request.scope.as_deref(), &client.scope)?;

        let now = Utc::now();
        let code = Token::new(
            self.generator.mint_token_value(self.storage.as_ref()).await?,
            TokenKind::AuthorizationCode,
            client.client_id.clone(),
            scope,
            now,
            self.settings.authorization_code_lifetime,
        )
        .with_redirect_uri(&redirect_uri);
        self.storage.put(&code).await?;

        tracing::debug!(client_id = %client.client_id, "issued authorization code");

        Ok(AuthorizeResponse {
            code: code.value,
            redirect_uri,
            state: request.state,
        })
    }

    /// Handle token requests (RFC 6749 Section 4.1.3, 4.4.2, 6)
    pub async fn token(&self, request: TokenRequest) -> Result<TokenResponse, OAuthError> {
        let grant_type: GrantType = request
            .grant_type
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing grant_type".to_string()))?
            .parse()?;

        let client = self.authenticate_client(&request).await?;

        match grant_type {
            GrantType::AuthorizationCode => {
                self.handle_authorization_code_grant(request, client).await
            }
            GrantType::ClientCredentials => {
                self.handle_client_credentials_grant(request, client).await
            }
            GrantType::RefreshToken => self.handle_refresh_token_grant(request, client).await,
        }
    }

    /// Handle authorization code grant
    async fn handle_authorization_code_grant(
        &self,
        request: TokenRequest,
        client: Client,
    ) -> Result<TokenResponse, OAuthError> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing authorization code".to_string()))?;

        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing redirect URI".to_string()))?;

        // Owner and kind never change for a value, so checking before consuming is race free
        let peeked = self.storage.get(code).await.map_err(grant_error)?;
        if peeked.kind != TokenKind::AuthorizationCode {
            return Err(OAuthError::InvalidGrant(
                "presented token is not an authorization code".to_string(),
            ));
        }
        if peeked.client_id != client.client_id {
            return Err(OAuthError::InvalidGrant(
                "authorization code issued to another client".to_string(),
            ));
        }

        let auth_code = self.storage.consume(code).await.map_err(grant_error)?;

        let bound_matches = auth_code
            .redirect_uri
            .as_deref()
            .is_none_or(|bound| bound == redirect_uri);
        if !bound_matches || !redirect_matches(&client.redirect_domain, redirect_uri) {
            return Err(OAuthError::InvalidGrant(
                "redirect uri mismatch".to_string(),
            ));
        }

        let now = Utc::now();
        let access_token = self
            .mint(
                TokenKind::AccessToken,
                &client,
                auth_code.scope.clone(),
                now,
                Some(&auth_code.value),
            )
            .await?;

        let refresh_token = if self.settings.issue_refresh_tokens {
            Some(
                self.mint(
                    TokenKind::RefreshToken,
                    &client,
                    auth_code.scope.clone(),
                    now,
                    Some(&auth_code.value),
                )
                .await?,
            )
        } else {
            None
        };

        tracing::debug!(client_id = %client.client_id, "exchanged authorization code");

        Ok(TokenResponse::new(&access_token, refresh_token.as_ref()))
    }

    /// Handle client credentials grant
    async fn handle_client_credentials_grant(
        &self,
        request: TokenRequest,
        client: Client,
    ) -> Result<TokenResponse, OAuthError> {
        let scope = requested_scope(request.scope.as_deref(), &client.scope)?;

        let access_token = self
            .mint(TokenKind::AccessToken, &client, scope, Utc::now(), None)
            .await?;

        tracing::debug!(client_id = %client.client_id, "issued client credentials token");

        Ok(TokenResponse::new(&access_token, None))
    }

    /// Handle refresh token grant
    async fn handle_refresh_token_grant(
        &self,
        request: TokenRequest,
        client: Client,
    ) -> Result<TokenResponse, OAuthError> {
        let value = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("Missing refresh token".to_string()))?;

        let old_refresh_token = match self.storage.get(value).await {
            Ok(token) => token,
            Err(StorageError::NotFound(_)) => {
                self.detect_reuse(value, &client).await?;
                return Err(OAuthError::InvalidGrant(
                    "refresh token not live".to_string(),
                ));
            }
            Err(e) => return Err(grant_error(e)),
        };

        if old_refresh_token.kind != TokenKind::RefreshToken
            || old_refresh_token.client_id != client.client_id
        {
            return Err(OAuthError::InvalidGrant(
                "token is not a refresh token of this client".to_string(),
            ));
        }

        let scope = requested_scope(request.scope.as_deref(), &old_refresh_token.scope)?;

        // Only the caller whose revoke removed the token may rotate it
        if self.storage.revoke(value).await?.is_none() {
            return Err(OAuthError::InvalidGrant(
                "refresh token already rotated".to_string(),
            ));
        }

        if self.settings.refresh_revokes_access {
            self.revoke_paired_access_tokens(&old_refresh_token).await?;
        }

        let now = Utc::now();
        let access_token = self
            .mint(TokenKind::AccessToken, &client, scope.clone(), now, Some(value))
            .await?;
        let refresh_token = self
            .mint(TokenKind::RefreshToken, &client, scope, now, Some(value))
            .await?;

        tracing::debug!(client_id = %client.client_id, "rotated refresh token");

        Ok(TokenResponse::new(&access_token, Some(&refresh_token)))
    }

    /// Authenticate the client named in the request.
    ///
    /// Every failure yields the same error so client ids cannot be enumerated.
    async fn authenticate_client(&self, request: &TokenRequest) -> Result<Client, OAuthError> {
        let client_id = request
            .client_id
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidClient("Missing client credentials".to_string()))?;
        let client_secret = request.client_secret.as_deref().unwrap_or_default();

        match self.registry.authenticate(client_id, client_secret).await? {
            Some(client) => Ok(client),
            None => {
                tracing::debug!(client_id = %client_id, "client authentication failed");
                Err(OAuthError::InvalidClient(
                    "Client authentication failed".to_string(),
                ))
            }
        }
    }

    /// React to a refresh token that is no longer live.
    ///
    /// A remembered revocation means the token was already rotated, so its
    /// descendants are treated as compromised. A concurrent refresh that loses
    /// the race after the winner's revoke lands here too, and may revoke the
    /// pair the winner is returning.
    async fn detect_reuse(&self, value: &str, client: &Client) -> Result<(), OAuthError> {
        let Some(revoked) = self.storage.revoked(value).await? else {
            return Ok(());
        };

        tracing::warn!(
            client_id = %client.client_id,
            owner_client_id = %revoked.client_id,
            "revoked refresh token presented again"
        );

        if self.settings.revoke_family_on_reuse {
            let count = self.storage.revoke_descendants(value).await?;
            tracing::warn!(
                owner_client_id = %revoked.client_id,
                revoked = count,
                "revoked token family after refresh token reuse"
            );
        }

        Ok(())
    }

    /// Revoke the access tokens issued together with `refresh_token`.
    async fn revoke_paired_access_tokens(&self, refresh_token: &Token) -> Result<(), OAuthError> {
        let Some(parent) = refresh_token.parent_token.as_deref() else {
            return Ok(());
        };

        for sibling in self.storage.children(parent).await? {
            if sibling.kind == TokenKind::AccessToken {
                self.storage.revoke(&sibling.value).await?;
            }
        }

        Ok(())
    }

    async fn mint(
        &self,
        kind: TokenKind,
        client: &Client,
        scope: BTreeSet<String>,
        now: DateTime<Utc>,
        parent: Option<&str>,
    ) -> Result<Token, OAuthError> {
        let lifetime = match kind {
            TokenKind::AuthorizationCode => self.settings.authorization_code_lifetime,
            TokenKind::AccessToken => self.settings.access_token_lifetime,
            TokenKind::RefreshToken => self.settings.refresh_token_lifetime,
        };

        let value = self.generator.mint_token_value(self.storage.as_ref()).await?;
        let mut token = Token::new(value, kind, client.client_id.clone(), scope, now, lifetime);
        if let Some(parent) = parent {
            token = token.with_parent(parent);
        }

        self.storage.put(&token).await?;
        Ok(token)
    }
}

/// Map a token lookup failure onto the grant error space.
fn grant_error(err: StorageError) -> OAuthError {
    match err {
        StorageError::NotFound(_) | StorageError::Expired(_) => {
            OAuthError::InvalidGrant("grant not found or expired".to_string())
        }
        other => other.into(),
    }
}

/// Resolve the scope of a request against what is allowed.
///
/// No request means everything allowed; a request may only narrow.
fn requested_scope(
    requested: Option<&str>,
    allowed: &BTreeSet<String>,
) -> Result<BTreeSet<String>, OAuthError> {
    let Some(requested) = requested.filter(|s| !s.trim().is_empty()) else {
        return Ok(allowed.clone());
    };

    if !validate_scope(requested) {
        return Err(OAuthError::InvalidScope(
            "Malformed scope".to_string(),
        ));
    }

    let requested = parse_scope(requested);
    if !requested.is_subset(allowed) {
        return Err(OAuthError::InvalidScope(
            "Requested scope exceeds allowed scope".to_string(),
        ));
    }

    Ok(requested)
}

/// Whether `candidate` is an acceptable redirect for a client registered with `registered`.
///
/// Scheme and port must be equal; the host must be the registered host or a
/// subdomain of it.
pub fn redirect_matches(registered: &str, candidate: &str) -> bool {
    let (Ok(registered), Ok(candidate)) = (Url::parse(registered), Url::parse(candidate)) else {
        return false;
    };

    if registered.scheme() != candidate.scheme()
        || registered.port_or_known_default() != candidate.port_or_known_default()
    {
        return false;
    }

    match (registered.host_str(), candidate.host_str()) {
        (Some(registered_host), Some(candidate_host)) => {
            let registered_host = registered_host.to_ascii_lowercase();
            let candidate_host = candidate_host.to_ascii_lowercase();
            candidate_host == registered_host
                || candidate_host.ends_with(&format!(".{}", registered_host))
        }
        _ => false,
    }
}
