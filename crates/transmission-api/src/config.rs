//! # Service Configuration
//!
//! Every option is a CLI flag with an environment variable fallback. Secrets
//! are redacted from `Debug` output.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use transmission_profiles::CollaboratorConfig;
use url::Url;

use crate::auth::JwtVerifier;
use crate::storage::StorageConfig;

/// Fixed secret used with `--insecure-dev-auth`.
const DEV_SECRET: &str = "transmission-insecure-dev-secret";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("exactly one of JWT_SECRET or JWT_PUBLIC_KEY_PEM must be set")]
    JwtKeyAmbiguous,

    #[error("no JWT key configured; set JWT_SECRET or JWT_PUBLIC_KEY_PEM, or pass --insecure-dev-auth")]
    JwtKeyMissing,

    #[error("invalid JWT public key: {0}")]
    JwtKeyInvalid(#[from] jsonwebtoken::errors::Error),

    #[error("STORAGE_SIGNING_SECRET must be set unless --insecure-dev-auth is passed")]
    StorageSecretMissing,

    #[error("failed to build collaborator HTTP client: {0}")]
    HttpClient(#[from] transmission_profiles::ProfilesError),
}

/// Transmission API server.
#[derive(Clone, Parser)]
#[command(name = "transmission-api", version, about)]
pub struct AppConfig {
    /// Port to bind.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Postgres connection URL. In-memory only when absent.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// HS256 shared secret for bearer tokens.
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// RS256 public key (PEM) for bearer tokens.
    #[arg(long, env = "JWT_PUBLIC_KEY_PEM")]
    pub jwt_public_key_pem: Option<String>,

    /// Expected `aud` claim.
    #[arg(long, env = "JWT_AUDIENCE")]
    pub jwt_audience: Option<String>,

    /// Accept tokens signed with a fixed development secret.
    #[arg(long, env = "INSECURE_DEV_AUTH", default_value_t = false)]
    pub insecure_dev_auth: bool,

    /// Profiles identity service.
    #[arg(long, env = "PROFILES_URL")]
    pub profiles_url: Option<Url>,

    /// Device certificate registry.
    #[arg(long, env = "DEVICE_REGISTRY_URL")]
    pub device_registry_url: Option<Url>,

    /// Device shadow service.
    #[arg(long, env = "DEVICE_SHADOW_URL")]
    pub device_shadow_url: Option<Url>,

    /// GTX validation engine.
    #[arg(long, env = "GTX_URL")]
    pub gtx_url: Option<Url>,

    #[arg(long, env = "DOCUMENT_BUCKET", default_value = "transmission-documents")]
    pub document_bucket: String,

    #[arg(long, env = "IMPORT_BUCKET", default_value = "transmission-imports")]
    pub import_bucket: String,

    /// Object storage endpoint that presigned URLs point at.
    #[arg(long, env = "STORAGE_BASE_URL", default_value = "http://localhost:9000")]
    pub storage_base_url: Url,

    /// Key presigned URLs are signed with.
    #[arg(long, env = "STORAGE_SIGNING_SECRET")]
    pub storage_signing_secret: Option<String>,

    /// Shared token storage notifications must present.
    #[arg(long, env = "STORAGE_EVENTS_TOKEN")]
    pub storage_events_token: Option<String>,

    /// Lifetime of presigned URLs.
    #[arg(long, env = "PRESIGN_TTL_SECS", default_value_t = 300)]
    pub presign_ttl_secs: u64,

    /// Timeout for every collaborator call.
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    pub upstream_timeout_secs: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() {
                "[REDACTED]"
            } else {
                "None"
            }
        }
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("database_url", &redact(&self.database_url))
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("jwt_public_key_pem", &self.jwt_public_key_pem.is_some())
            .field("jwt_audience", &self.jwt_audience)
            .field("insecure_dev_auth", &self.insecure_dev_auth)
            .field("profiles_url", &self.profiles_url)
            .field("device_registry_url", &self.device_registry_url)
            .field("device_shadow_url", &self.device_shadow_url)
            .field("gtx_url", &self.gtx_url)
            .field("document_bucket", &self.document_bucket)
            .field("import_bucket", &self.import_bucket)
            .field("storage_base_url", &self.storage_base_url)
            .field("storage_signing_secret", &redact(&self.storage_signing_secret))
            .field("storage_events_token", &redact(&self.storage_events_token))
            .field("presign_ttl_secs", &self.presign_ttl_secs)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Bearer token verifier from the configured key.
    pub fn jwt_verifier(&self) -> Result<JwtVerifier, ConfigError> {
        let audience = self.jwt_audience.as_deref();
        match (&self.jwt_secret, &self.jwt_public_key_pem) {
            (Some(_), Some(_)) => Err(ConfigError::JwtKeyAmbiguous),
            (Some(secret), None) => Ok(JwtVerifier::hs256(secret.as_bytes(), audience)),
            (None, Some(pem)) => Ok(JwtVerifier::rs256_pem(pem.as_bytes(), audience)?),
            (None, None) if self.insecure_dev_auth => {
                tracing::warn!("--insecure-dev-auth: accepting tokens signed with the development secret");
                Ok(JwtVerifier::hs256(DEV_SECRET.as_bytes(), audience))
            }
            (None, None) => Err(ConfigError::JwtKeyMissing),
        }
    }

    /// Collaborator base URLs and timeout.
    pub fn collaborators(&self) -> CollaboratorConfig {
        CollaboratorConfig {
            profiles_url: self.profiles_url.clone(),
            device_registry_url: self.device_registry_url.clone(),
            device_shadow_url: self.device_shadow_url.clone(),
            gtx_url: self.gtx_url.clone(),
            timeout_secs: self.upstream_timeout_secs,
        }
    }

    /// Object storage settings.
    pub fn storage(&self) -> Result<StorageConfig, ConfigError> {
        let secret = match &self.storage_signing_secret {
            Some(secret) => secret.clone(),
            None if self.insecure_dev_auth => DEV_SECRET.to_string(),
            None => return Err(ConfigError::StorageSecretMissing),
        };
        Ok(StorageConfig {
            base_url: self.storage_base_url.clone(),
            document_bucket: self.document_bucket.clone(),
            import_bucket: self.import_bucket.clone(),
            signing_secret: secret.into_bytes(),
            presign_ttl: Duration::from_secs(self.presign_ttl_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        let mut argv = vec!["transmission-api"];
        argv.extend_from_slice(args);
        AppConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(&["--jwt-secret", "s", "--storage-signing-secret", "k"]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.presign_ttl_secs, 300);
        assert_eq!(config.upstream_timeout_secs, 10);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.profiles_url.is_none());
        assert_eq!(config.collaborators().timeout_secs, 10);
        assert!(config.jwt_verifier().is_ok());
        assert!(config.storage().is_ok());
    }

    #[test]
    fn both_jwt_keys_is_an_error() {
        let config = parse(&["--jwt-secret", "s", "--jwt-public-key-pem", "pem"]);
        assert!(matches!(
            config.jwt_verifier(),
            Err(ConfigError::JwtKeyAmbiguous)
        ));
    }

    #[test]
    fn missing_keys_need_dev_flag() {
        let config = parse(&[]);
        assert!(matches!(config.jwt_verifier(), Err(ConfigError::JwtKeyMissing)));
        assert!(matches!(
            config.storage(),
            Err(ConfigError::StorageSecretMissing)
        ));

        let dev = parse(&["--insecure-dev-auth"]);
        assert!(dev.jwt_verifier().is_ok());
        assert!(dev.storage().is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = parse(&[
            "--jwt-secret",
            "super-secret",
            "--storage-signing-secret",
            "other-secret",
            "--log-format",
            "json",
        ]);
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("other-secret"));
        assert!(debug.contains("Json"));
    }
}
