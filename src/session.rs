use crate::config::{ConfigError, SessionConfig};
use crate::consts::{AUTH_SCOPE, AUTH_TOKEN_PATH};
use crate::util::expand_path;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// An authenticated connection to the platform gateway.
///
/// Opening a session performs the OAuth2 password grant once; the bearer
/// token is then attached to every catalog request.  There is no token
/// refresh: a session is meant to live for the duration of a single
/// pipeline run.  All request methods take `&self`, so one session can
/// serve concurrent resolution runs.
pub(crate) struct PlatformSession {
    http: reqwest::Client,
    base: String,
    access_token: String,
}

impl PlatformSession {
    /// Authenticate against `{host}/auth/oauth2/v1/token` and return a live
    /// session.
    pub(crate) async fn open(config: &SessionConfig) -> Result<PlatformSession, SessionError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| SessionError::Transport {
                url: config.host.clone(),
                source,
            })?;
        let url = format!("{}{}", config.host_base(), AUTH_TOKEN_PATH);
        let form = [
            ("grant_type", "password"),
            ("username", config.username.as_str()),
            ("password", config.password.as_str()),
            ("client_id", config.app_key.as_str()),
            ("takeExclusiveSignOnControl", "True"),
            ("scope", AUTH_SCOPE),
        ];
        let resp = http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|source| SessionError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SessionError::AuthDenied { status, body });
        }
        let body = resp.text().await.map_err(|source| SessionError::Transport {
            url: url.clone(),
            source,
        })?;
        let grant: TokenGrant =
            serde_json::from_str(&body).map_err(|source| SessionError::Decode { url, source })?;
        match grant.expires_in_secs() {
            Some(secs) => tracing::debug!(expires_in = secs, "Access token granted"),
            None => tracing::debug!("Access token granted"),
        }
        Ok(PlatformSession {
            http,
            base: config.host_base().to_owned(),
            access_token: grant.access_token,
        })
    }

    /// Issue an authenticated GET against a catalog endpoint and decode the
    /// JSON response body.
    ///
    /// `{name}` placeholders in `path` are expanded from `path_params`
    /// before the request is built.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        path_params: &[(&str, &str)],
    ) -> Result<T, SessionError> {
        let url = format!("{}{}", self.base, expand_path(path, path_params));
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|source| SessionError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SessionError::ErrorResponse { url, status, body });
        }
        serde_json::from_str(&body).map_err(|source| SessionError::Decode { url, source })
    }

    /// The underlying HTTP client, for unauthenticated fetches that should
    /// share this session's connection pool
    pub(crate) fn plain_http(&self) -> &reqwest::Client {
        &self.http
    }

    /// End the session.  Sign-out is local only; the grant simply expires
    /// server-side.
    pub(crate) fn close(self) {
        tracing::debug!("Platform session closed");
    }
}

impl fmt::Debug for PlatformSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformSession")
            .field("base", &self.base)
            .field("access_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Subset of the token-endpoint response consumed here.  `expires_in`
/// arrives as a decimal string.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

impl TokenGrant {
    fn expires_in_secs(&self) -> Option<u64> {
        self.expires_in.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Error returned when opening a session or executing a request on it
#[derive(Debug, Error)]
pub(crate) enum SessionError {
    /// The configuration was rejected before any network use
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The token endpoint rejected the password grant
    #[error("authentication denied with HTTP {status}: {body}")]
    AuthDenied { status: StatusCode, body: String },

    /// The request could not be sent or the response never arrived
    #[error("failed to send request to {url}")]
    Transport { url: String, source: reqwest::Error },

    /// The endpoint answered with a non-success status
    #[error("{url} answered with HTTP {status}: {body}")]
    ErrorResponse {
        url: String,
        status: StatusCode,
        body: String,
    },

    /// The response body was not the expected JSON shape
    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(server: &MockServer) -> SessionConfig {
        SessionConfig {
            app_key: "key".into(),
            username: "machine-id".into(),
            password: "hunter2".into(),
            host: server.base_url(),
        }
    }

    fn mock_token_grant(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST).path("/auth/oauth2/v1/token");
            then.status(200).json_body(json!({
                "access_token": "tok-1",
                "refresh_token": "ref-1",
                "expires_in": "600",
            }));
        })
    }

    #[tokio::test]
    async fn open_sends_password_grant() {
        let server = MockServer::start();
        let token = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/oauth2/v1/token")
                .header("content-type", "application/x-www-form-urlencoded")
                .body_contains("grant_type=password")
                .body_contains("username=machine-id")
                .body_contains("client_id=key")
                .body_contains("takeExclusiveSignOnControl=True")
                .body_contains("scope=trapi");
            then.status(200).json_body(json!({
                "access_token": "tok-1",
                "refresh_token": "ref-1",
                "expires_in": "600",
            }));
        });
        assert_matches!(PlatformSession::open(&config(&server)).await, Ok(_));
        token.assert();
    }

    #[tokio::test]
    async fn open_rejects_bad_credentials_before_network() {
        let server = MockServer::start();
        let token = mock_token_grant(&server);
        let mut cfg = config(&server);
        cfg.password.clear();
        let r = PlatformSession::open(&cfg).await;
        assert_matches!(
            r,
            Err(SessionError::Config(ConfigError::EmptyField { field: "password" }))
        );
        assert_eq!(token.hits(), 0);
    }

    #[tokio::test]
    async fn open_surfaces_denied_grant() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/auth/oauth2/v1/token");
            then.status(401).body("invalid credentials");
        });
        let r = PlatformSession::open(&config(&server)).await;
        assert_matches!(
            r,
            Err(SessionError::AuthDenied { status, body })
                if status == StatusCode::UNAUTHORIZED && body == "invalid credentials"
        );
    }

    #[tokio::test]
    async fn get_json_attaches_bearer_token() {
        let server = MockServer::start();
        mock_token_grant(&server);
        let catalog = server.mock(|when, then| {
            when.method(GET)
                .path("/file-store/v1/packages")
                .query_param("bucketName", "bulk-greenrevenue")
                .header("authorization", "Bearer tok-1");
            then.status(200).json_body(json!({"value": []}));
        });
        let session = PlatformSession::open(&config(&server)).await.unwrap();
        let body: serde_json::Value = session
            .get_json(
                "/file-store/v1/packages",
                &[("bucketName", "bulk-greenrevenue")],
                &[],
            )
            .await
            .unwrap();
        catalog.assert();
        assert_eq!(body, json!({"value": []}));
    }

    #[tokio::test]
    async fn get_json_expands_path_params() {
        let server = MockServer::start();
        mock_token_grant(&server);
        let stream = server.mock(|when, then| {
            when.method(GET)
                .path("/file-store/v1/files/4e94-6d63/stream")
                .query_param("doNotRedirect", "true");
            then.status(200).json_body(json!({"url": "https://cdn/f.gz"}));
        });
        let session = PlatformSession::open(&config(&server)).await.unwrap();
        let body: serde_json::Value = session
            .get_json(
                "/file-store/v1/files/{file_id}/stream",
                &[("doNotRedirect", "true")],
                &[("file_id", "4e94-6d63")],
            )
            .await
            .unwrap();
        stream.assert();
        assert_eq!(body, json!({"url": "https://cdn/f.gz"}));
    }

    #[tokio::test]
    async fn get_json_surfaces_error_response() {
        let server = MockServer::start();
        mock_token_grant(&server);
        server.mock(|when, then| {
            when.method(GET).path("/file-store/v1/packages");
            then.status(500).body("catalog exploded");
        });
        let session = PlatformSession::open(&config(&server)).await.unwrap();
        let r = session
            .get_json::<serde_json::Value>("/file-store/v1/packages", &[], &[])
            .await;
        assert_matches!(
            r,
            Err(SessionError::ErrorResponse { status, body, .. })
                if status == StatusCode::INTERNAL_SERVER_ERROR && body == "catalog exploded"
        );
    }

    #[tokio::test]
    async fn get_json_surfaces_decode_failure() {
        let server = MockServer::start();
        mock_token_grant(&server);
        server.mock(|when, then| {
            when.method(GET).path("/file-store/v1/packages");
            then.status(200).body("not json");
        });
        let session = PlatformSession::open(&config(&server)).await.unwrap();
        let r = session
            .get_json::<serde_json::Value>("/file-store/v1/packages", &[], &[])
            .await;
        assert_matches!(r, Err(SessionError::Decode { .. }));
    }

    #[test]
    fn debug_redacts_access_token() {
        let session = PlatformSession {
            http: reqwest::Client::new(),
            base: "https://api.refinitiv.com".into(),
            access_token: "tok-secret".into(),
        };
        let repr = format!("{session:?}");
        assert!(!repr.contains("tok-secret"), "token leaked: {repr}");
    }
}
