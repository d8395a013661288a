use std::fmt;
use thiserror::Error;
use url::Url;

/// Credentials and gateway address for a platform session.
///
/// Always constructed explicitly by the caller; environment variables are
/// read only in the CLI layer.
#[derive(Clone, Eq, PartialEq)]
pub(crate) struct SessionConfig {
    /// Application key, sent as the OAuth2 client id
    pub(crate) app_key: String,

    /// Machine or user account name
    pub(crate) username: String,

    /// Account password
    pub(crate) password: String,

    /// Base URL of the platform gateway
    pub(crate) host: String,
}

impl SessionConfig {
    /// Check that every credential field is nonempty and that `host` is an
    /// absolute http(s) URL.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.app_key.is_empty() {
            return Err(ConfigError::EmptyField { field: "app_key" });
        }
        if self.username.is_empty() {
            return Err(ConfigError::EmptyField { field: "username" });
        }
        if self.password.is_empty() {
            return Err(ConfigError::EmptyField { field: "password" });
        }
        let url = Url::parse(&self.host).map_err(|source| ConfigError::BadHost {
            host: self.host.clone(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::BadScheme {
                host: self.host.clone(),
            });
        }
        Ok(())
    }

    /// The gateway address without any trailing slash, suitable for joining
    /// endpoint paths onto
    pub(crate) fn host_base(&self) -> &str {
        self.host.strip_suffix('/').unwrap_or(&self.host)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("app_key", &self.app_key)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

/// Error returned when a session configuration is rejected
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub(crate) enum ConfigError {
    /// A credential field was empty
    #[error("received invalid (empty) {field} credential")]
    EmptyField { field: &'static str },

    /// The gateway address did not parse as a URL
    #[error("invalid platform host {host:?}")]
    BadHost { host: String, source: url::ParseError },

    /// The gateway address used a scheme other than http(s)
    #[error("platform host {host:?} is not an http(s) URL")]
    BadScheme { host: String },
}
