/// Default platform gateway against which sessions are opened
pub(crate) static DEFAULT_HOST: &str = "https://api.refinitiv.com";

/// OAuth2 password-grant token endpoint, relative to the gateway
pub(crate) static AUTH_TOKEN_PATH: &str = "/auth/oauth2/v1/token";

/// OAuth scope requested when opening a session
pub(crate) static AUTH_SCOPE: &str = "trapi";

/// Version segment used in file-store endpoint paths
pub(crate) static CFS_API_VERSION: &str = "v1";
