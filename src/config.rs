//! Environment-based configuration types for the portcullis server.

use anyhow::Result;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::oauth::auth_server::GrantSettings;
use crate::oauth::types::{parse_scope, validate_scope};

/// HTTP server port configuration
#[derive(Clone, Debug)]
pub struct HttpPort(u16);

/// Lifetime of an issued token or code
#[derive(Clone, Debug)]
pub struct TokenExpiration(chrono::Duration);

/// Boolean switch
#[derive(Clone, Debug)]
pub struct Flag(bool);

/// Length of generated client ids and secrets
#[derive(Clone, Debug)]
pub struct CredentialLength(usize);

/// Redirect domain assigned to newly registered clients
#[derive(Clone, Debug)]
pub struct RedirectDomain(String);

/// Scope assigned to newly registered clients
#[derive(Clone, Debug, Default)]
pub struct DefaultScope(BTreeSet<String>);

/// Period of the expired token sweep
#[derive(Clone, Debug)]
pub struct CleanupInterval(Duration);

/// Main application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub version: String,
    pub http_port: HttpPort,
    pub storage_backend: String,
    pub client_default_domain: RedirectDomain,
    pub client_default_scope: DefaultScope,
    pub client_credential_length: CredentialLength,
    pub access_token_expiration: TokenExpiration,
    pub refresh_token_expiration: TokenExpiration,
    pub authorization_code_expiration: TokenExpiration,
    pub issue_refresh_tokens: Flag,
    pub refresh_revokes_access: Flag,
    pub revoke_family_on_reuse: Flag,
    pub token_cleanup_interval: CleanupInterval,
}

impl Config {
    /// Create a new configuration from environment variables
    pub fn new() -> Result<Self> {
        Self::from_lookup(optional_env)
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_env = |name: &str, default_value: &str| {
            lookup(name).unwrap_or_else(|| default_value.to_string())
        };

        let http_port: HttpPort = default_env("HTTP_PORT", "3000").try_into()?;
        let storage_backend = default_env("STORAGE_BACKEND", "memory");
        let client_default_domain: RedirectDomain =
            default_env("CLIENT_DEFAULT_DOMAIN", "http://localhost:9094").try_into()?;
        let client_default_scope: DefaultScope =
            default_env("CLIENT_DEFAULT_SCOPE", "").try_into()?;
        let client_credential_length: CredentialLength =
            default_env("CLIENT_CREDENTIAL_LENGTH", "8").try_into()?;
        let access_token_expiration: TokenExpiration =
            default_env("ACCESS_TOKEN_EXPIRATION", "2h").try_into()?;
        let refresh_token_expiration: TokenExpiration =
            default_env("REFRESH_TOKEN_EXPIRATION", "72h").try_into()?;
        let authorization_code_expiration: TokenExpiration =
            default_env("AUTHORIZATION_CODE_EXPIRATION", "10m").try_into()?;
        let issue_refresh_tokens: Flag = default_env("ISSUE_REFRESH_TOKENS", "true").try_into()?;
        let refresh_revokes_access: Flag =
            default_env("REFRESH_REVOKES_ACCESS", "true").try_into()?;
        let revoke_family_on_reuse: Flag =
            default_env("REVOKE_FAMILY_ON_REUSE", "true").try_into()?;
        let token_cleanup_interval: CleanupInterval =
            default_env("TOKEN_CLEANUP_INTERVAL", "1m").try_into()?;

        Ok(Self {
            version: version()?,
            http_port,
            storage_backend,
            client_default_domain,
            client_default_scope,
            client_credential_length,
            access_token_expiration,
            refresh_token_expiration,
            authorization_code_expiration,
            issue_refresh_tokens,
            refresh_revokes_access,
            revoke_family_on_reuse,
            token_cleanup_interval,
        })
    }

    /// Lifetimes and rotation policy for the grant engine
    pub fn grant_settings(&self) -> GrantSettings {
        GrantSettings {
            access_token_lifetime: *self.access_token_expiration.as_ref(),
            refresh_token_lifetime: *self.refresh_token_expiration.as_ref(),
            authorization_code_lifetime: *self.authorization_code_expiration.as_ref(),
            issue_refresh_tokens: *self.issue_refresh_tokens.as_ref(),
            refresh_revokes_access: *self.refresh_revokes_access.as_ref(),
            revoke_family_on_reuse: *self.revoke_family_on_reuse.as_ref(),
        }
    }
}

/// Get application version from build environment
pub fn version() -> Result<String> {
    option_env!("GIT_HASH")
        .or(option_env!("CARGO_PKG_VERSION"))
        .map(|val| val.to_string())
        .ok_or(ConfigError::VersionNotSet.into())
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl TryFrom<String> for HttpPort {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Ok(Self(3000))
        } else {
            value
                .parse::<u16>()
                .map(Self)
                .map_err(|err| ConfigError::PortParsingFailed(err).into())
        }
    }
}

impl AsRef<u16> for HttpPort {
    fn as_ref(&self) -> &u16 {
        &self.0
    }
}

impl TryFrom<String> for TokenExpiration {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value.clone(), e.to_string()))?;
        if duration.is_zero() {
            return Err(ConfigError::DurationParsingFailed(
                value,
                "must be longer than zero".to_string(),
            )
            .into());
        }
        Ok(Self(chrono::Duration::from_std(duration)?))
    }
}

impl AsRef<chrono::Duration> for TokenExpiration {
    fn as_ref(&self) -> &chrono::Duration {
        &self.0
    }
}

impl TryFrom<String> for Flag {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Self(true)),
            "false" | "0" | "no" | "off" => Ok(Self(false)),
            _ => Err(ConfigError::BoolParsingFailed(value).into()),
        }
    }
}

impl AsRef<bool> for Flag {
    fn as_ref(&self) -> &bool {
        &self.0
    }
}

impl TryFrom<String> for CredentialLength {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().parse::<usize>() {
            Ok(length) if (8..=64).contains(&length) => Ok(Self(length)),
            _ => Err(ConfigError::CredentialLengthInvalid(value).into()),
        }
    }
}

impl AsRef<usize> for CredentialLength {
    fn as_ref(&self) -> &usize {
        &self.0
    }
}

impl TryFrom<String> for RedirectDomain {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim().trim_end_matches('/').to_string();
        url::Url::parse(&trimmed)
            .map_err(|e| ConfigError::RedirectDomainInvalid(value.clone(), e))?;
        Ok(Self(trimmed))
    }
}

impl AsRef<String> for RedirectDomain {
    fn as_ref(&self) -> &String {
        &self.0
    }
}

impl TryFrom<String> for DefaultScope {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if !validate_scope(&value) {
            return Err(ConfigError::ScopeInvalid(value).into());
        }
        Ok(Self(parse_scope(&value)))
    }
}

impl AsRef<BTreeSet<String>> for DefaultScope {
    fn as_ref(&self) -> &BTreeSet<String> {
        &self.0
    }
}

impl TryFrom<String> for CleanupInterval {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let duration = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value.clone(), e.to_string()))?;
        if duration.is_zero() {
            return Err(ConfigError::DurationParsingFailed(
                value,
                "must be longer than zero".to_string(),
            )
            .into());
        }
        Ok(Self(duration))
    }
}

impl AsRef<Duration> for CleanupInterval {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_with(&[]).unwrap();
        assert_eq!(*config.http_port.as_ref(), 3000);
        assert_eq!(config.storage_backend, "memory");
        assert_eq!(config.client_default_domain.as_ref(), "http://localhost:9094");
        assert!(config.client_default_scope.as_ref().is_empty());
        assert_eq!(*config.client_credential_length.as_ref(), 8);
        assert_eq!(*config.token_cleanup_interval.as_ref(), Duration::from_secs(60));

        let settings = config.grant_settings();
        assert_eq!(settings.access_token_lifetime, chrono::Duration::hours(2));
        assert_eq!(settings.refresh_token_lifetime, chrono::Duration::hours(72));
        assert_eq!(
            settings.authorization_code_lifetime,
            chrono::Duration::minutes(10)
        );
        assert!(settings.issue_refresh_tokens);
        assert!(settings.refresh_revokes_access);
        assert!(settings.revoke_family_on_reuse);
    }

    #[test]
    fn test_overrides() {
        let config = config_with(&[
            ("HTTP_PORT", "9096"),
            ("CLIENT_DEFAULT_DOMAIN", "https://app.example.com/"),
            ("CLIENT_DEFAULT_SCOPE", "read write"),
            ("CLIENT_CREDENTIAL_LENGTH", "16"),
            ("ACCESS_TOKEN_EXPIRATION", "30m"),
            ("ISSUE_REFRESH_TOKENS", "off"),
        ])
        .unwrap();

        assert_eq!(*config.http_port.as_ref(), 9096);
        assert_eq!(
            config.client_default_domain.as_ref(),
            "https://app.example.com"
        );
        assert_eq!(config.client_default_scope.as_ref().len(), 2);
        assert_eq!(*config.client_credential_length.as_ref(), 16);

        let settings = config.grant_settings();
        assert_eq!(settings.access_token_lifetime, chrono::Duration::minutes(30));
        assert!(!settings.issue_refresh_tokens);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_with(&[("HTTP_PORT", "http")]).is_err());
        assert!(config_with(&[("ACCESS_TOKEN_EXPIRATION", "soon")]).is_err());
        assert!(config_with(&[("ACCESS_TOKEN_EXPIRATION", "0s")]).is_err());
        assert!(config_with(&[("REVOKE_FAMILY_ON_REUSE", "maybe")]).is_err());
        assert!(config_with(&[("CLIENT_CREDENTIAL_LENGTH", "4")]).is_err());
        assert!(config_with(&[("CLIENT_CREDENTIAL_LENGTH", "65")]).is_err());
        assert!(config_with(&[("CLIENT_DEFAULT_DOMAIN", "localhost")]).is_err());
        assert!(config_with(&[("CLIENT_DEFAULT_SCOPE", "read <admin>")]).is_err());
    }

    #[test]
    fn test_flag_parsing() {
        for value in ["true", "1", "YES", "on"] {
            assert!(*Flag::try_from(value.to_string()).unwrap().as_ref());
        }
        for value in ["false", "0", "no", "OFF"] {
            assert!(!*Flag::try_from(value.to_string()).unwrap().as_ref());
        }
    }
}
