//! S3 credential loading
//!
//! # Example
//!
//! ```
//! use tus_s3_store::s3::{Credentials, StaticCredentials, CredentialsProviderTrait};
//!
//! let provider = StaticCredentials::new("access-key", "secret-key");
//! let creds = provider.credentials();
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert_eq!(creds.secret_access_key(), "secret-key");
//! ```

use super::S3ClientConfig;
use thiserror::Error;

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Environment error: {0}")]
    EnvironmentError(String),
}

/// Credentials for AWS authentication
#[derive(Debug, Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Create credentials with session token (for temporary credentials)
    pub fn with_session_token(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: Some(session_token.into()),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }
}

/// Trait for credential providers
pub trait CredentialsProviderTrait: Send + Sync {
    fn credentials(&self) -> &Credentials;
}

/// Factory methods for creating credential providers
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Load credentials from environment variables
    ///
    /// Looks for:
    /// - `AWS_ACCESS_KEY_ID`
    /// - `AWS_SECRET_ACCESS_KEY`
    /// - `AWS_SESSION_TOKEN` (optional)
    pub async fn from_env() -> Result<Credentials, CredentialsError> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            CredentialsError::MissingCredentials("AWS_ACCESS_KEY_ID not set".into())
        })?;

        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            CredentialsError::MissingCredentials("AWS_SECRET_ACCESS_KEY not set".into())
        })?;

        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(match session_token {
            Some(token) => Credentials::with_session_token(access_key, secret_key, token),
            None => Credentials::new(access_key, secret_key),
        })
    }

    /// Load credentials from an [`S3ClientConfig`]'s `access_key`/`secret_key` fields.
    pub fn from_config(config: &S3ClientConfig) -> Result<Credentials, CredentialsError> {
        let access_key = config.access_key.as_ref().ok_or_else(|| {
            CredentialsError::MissingCredentials("access_key not set in config".into())
        })?;

        let secret_key = config.secret_key.as_ref().ok_or_else(|| {
            CredentialsError::MissingCredentials("secret_key not set in config".into())
        })?;

        Ok(Credentials::new(access_key.clone(), secret_key.clone()))
    }
}

/// Static credentials provider. Useful for testing or when credentials
/// are known ahead of time.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(access_key_id, secret_access_key),
        }
    }
}

impl CredentialsProviderTrait for StaticCredentials {
    fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// Environment credentials provider. Loads from the environment once at
/// construction time.
#[derive(Debug, Clone)]
pub struct EnvironmentCredentials {
    credentials: Credentials,
}

impl EnvironmentCredentials {
    pub async fn new() -> Result<Self, CredentialsError> {
        let credentials = CredentialsProvider::from_env().await?;
        Ok(Self { credentials })
    }
}

impl CredentialsProviderTrait for EnvironmentCredentials {
    fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(access_key: Option<&str>, secret_key: Option<&str>) -> S3ClientConfig {
        S3ClientConfig {
            bucket: "test".into(),
            region: "us-east-1".into(),
            endpoint: None,
            access_key: access_key.map(String::from),
            secret_key: secret_key.map(String::from),
            retry: None,
            timeout: None,
        }
    }

    #[test]
    fn test_credentials_creation() {
        let creds = Credentials::new("access", "secret");
        assert_eq!(creds.access_key_id(), "access");
        assert_eq!(creds.secret_access_key(), "secret");
        assert!(creds.session_token().is_none());
    }

    #[test]
    fn test_credentials_with_session_token() {
        let creds = Credentials::with_session_token("access", "secret", "token");
        assert_eq!(creds.access_key_id(), "access");
        assert_eq!(creds.secret_access_key(), "secret");
        assert_eq!(creds.session_token(), Some("token"));
    }

    #[test]
    fn test_static_credentials() {
        let provider = StaticCredentials::new("static-access", "static-secret");
        assert_eq!(provider.credentials().access_key_id(), "static-access");
        assert_eq!(provider.credentials().secret_access_key(), "static-secret");
    }

    #[test]
    fn test_from_config_missing_access_key() {
        let config = test_config(None, Some("secret"));
        let result = CredentialsProvider::from_config(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_missing_secret_key() {
        let config = test_config(Some("access"), None);
        let result = CredentialsProvider::from_config(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_config_success() {
        let config = test_config(Some("config-access"), Some("config-secret"));
        let result = CredentialsProvider::from_config(&config);
        assert!(result.is_ok());
        let creds = result.unwrap();
        assert_eq!(creds.access_key_id(), "config-access");
        assert_eq!(creds.secret_access_key(), "config-secret");
    }
}
