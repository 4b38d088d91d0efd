//! OAuth2 client credentials and per-host bearer token cache

use crate::config_ext::RelaticsConfigExt;
use crate::error::{RelaticsError, Result};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};
use ureq::Agent;

/// Path of the token endpoint on a Relatics host
pub const TOKEN_PATH: &str = "/oauth2/token";

/// Default user agent, shown in the Relatics logs
pub const USER_AGENT: &str = concat!("rwsclient/", env!("CARGO_PKG_VERSION"));

/// Largest token endpoint answer read, in bytes
const MAX_TOKEN_RESPONSE_SIZE: u64 = 1024 * 1024;

/// A cached token is reused only while more than this many seconds remain
pub const TOKEN_REFRESH_MARGIN: i64 = 300;

/// JSON answer of the token endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Source of OAuth2 tokens
pub trait TokenEndpoint: Send + Sync {
    /// POSTs `grant_type=client_credentials` to `https://{hostname}/oauth2/token`
    ///
    /// `basic_credentials` is the base64 of `client_id:client_secret`.
    fn request_token(
        &self,
        hostname: &str,
        basic_credentials: &str,
        user_agent: &str,
    ) -> Result<TokenResponse>;
}

/// Token endpoint over HTTPS
pub struct HttpTokenEndpoint {
    agent: Agent,
}

impl HttpTokenEndpoint {
    pub fn new() -> Self {
        // Error answers carry a JSON body describing the failure.
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for HttpTokenEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn request_token(
        &self,
        hostname: &str,
        basic_credentials: &str,
        user_agent: &str,
    ) -> Result<TokenResponse> {
        let url = format!("https://{}{}", hostname, TOKEN_PATH);

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &format!("Basic {}", basic_credentials))
            .header("Content-Type", "text/plain")
            .header("User-Agent", user_agent)
            .send("grant_type=client_credentials")?;

        let status = response.status();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_TOKEN_RESPONSE_SIZE)
            .read_to_string()?;
        debug!(%status, "Response from {}: {}", TOKEN_PATH, body);

        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_on: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (self.expires_on - now).num_seconds() > TOKEN_REFRESH_MARGIN
    }
}

/// OAuth2 client credentials with a bearer token cache per hostname
///
/// One instance can be shared between webservices and threads: the token
/// cache is guarded by a mutex. Two threads finding a stale token at the
/// same time may both request a new one; the last answer wins.
pub struct ClientCredential {
    client_id: String,
    client_secret: String,
    tokens: Mutex<HashMap<String, CachedToken>>,
    endpoint: Box<dyn TokenEndpoint>,
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("hosts", &self.tokens.lock().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ClientCredential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_endpoint(client_id, client_secret, Box::new(HttpTokenEndpoint::new()))
    }

    /// Creates credentials using a custom token endpoint
    pub fn with_endpoint(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        endpoint: Box<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            tokens: Mutex::new(HashMap::new()),
            endpoint,
        }
    }

    /// Creates credentials from the global configuration
    ///
    /// Fails when `relatics.client_id` or `relatics.client_secret` is not set.
    pub fn from_config() -> Result<Self> {
        Self::from_config_with(&rwsconfig::get_config())
    }

    pub fn from_config_with(config: &rwsconfig::Config) -> Result<Self> {
        let (client_id, client_secret) = config
            .get_relatics_client_credentials()?
            .ok_or_else(|| {
                RelaticsError::Config(anyhow::anyhow!(
                    "Relatics client credentials not configured"
                ))
            })?;
        Ok(Self::new(client_id, client_secret))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns a bearer token for `hostname`
    ///
    /// A new token is requested when `force_refresh` is set, when none is
    /// cached for the host, or when the cached one expires in
    /// [`TOKEN_REFRESH_MARGIN`] seconds or less.
    pub fn get_token(&self, hostname: &str, force_refresh: bool) -> Result<String> {
        self.get_token_with_agent(hostname, force_refresh, USER_AGENT)
    }

    /// Same as [`get_token`](Self::get_token) with a custom user agent
    pub fn get_token_with_agent(
        &self,
        hostname: &str,
        force_refresh: bool,
        user_agent: &str,
    ) -> Result<String> {
        if !force_refresh {
            let tokens = self.tokens.lock();
            if let Some(cached) = tokens.get(hostname) {
                if cached.is_fresh(Utc::now()) {
                    info!("Reuse previous token for {}", hostname);
                    return Ok(cached.token.clone());
                }
            }
        }

        info!("No valid token for {}, retrieving new token", hostname);
        self.retrieve_token(hostname, user_agent)
    }

    /// Requests a new token for `hostname` and stores it in the cache
    pub fn retrieve_token(&self, hostname: &str, user_agent: &str) -> Result<String> {
        let requested_on = Utc::now();
        let credentials = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .endpoint
            .request_token(hostname, &credentials, user_agent)?;

        if let Some(error) = response.error {
            return Err(RelaticsError::Auth(format!(
                "{} ({})",
                error,
                response.error_description.unwrap_or_default()
            )));
        }

        let token = response
            .access_token
            .ok_or_else(|| RelaticsError::Auth("No access_token was given".to_string()))?;

        let expires_in = response.expires_in.unwrap_or_else(|| {
            warn!("Token response for {} has no expires_in", hostname);
            0
        });

        self.tokens.lock().insert(
            hostname.to_string(),
            CachedToken {
                token: token.clone(),
                expires_on: requested_on + Duration::seconds(expires_in),
            },
        );

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEndpoint {
        calls: Arc<AtomicUsize>,
        response: TokenResponse,
    }

    impl TokenEndpoint for FakeEndpoint {
        fn request_token(&self, hostname: &str, basic: &str, agent: &str) -> Result<TokenResponse> {
            assert_eq!(hostname, "acme.relaticsonline.com");
            assert_eq!(basic, "aWQ6c2VjcmV0"); // base64("id:secret")
            assert!(!agent.is_empty());
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut response = self.response.clone();
            if let Some(token) = &response.access_token {
                response.access_token = Some(format!("{}-{}", token, n));
            }
            Ok(response)
        }
    }

    fn credential(response: TokenResponse) -> (ClientCredential, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint = FakeEndpoint {
            calls: calls.clone(),
            response,
        };
        (
            ClientCredential::with_endpoint("id", "secret", Box::new(endpoint)),
            calls,
        )
    }

    fn token_response(expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: Some("tok".to_string()),
            expires_in: Some(expires_in),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_is_reused() {
        let (cred, calls) = credential(token_response(3600));

        let first = cred.get_token("acme.relaticsonline.com", false).unwrap();
        let second = cred.get_token("acme.relaticsonline.com", false).unwrap();

        assert_eq!(first, "tok-0");
        assert_eq!(second, "tok-0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_token_near_expiry_is_refreshed() {
        // 300 seconds of validity is inside the refresh margin
        let (cred, calls) = credential(token_response(300));

        cred.get_token("acme.relaticsonline.com", false).unwrap();
        let second = cred.get_token("acme.relaticsonline.com", false).unwrap();

        assert_eq!(second, "tok-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_force_refresh() {
        let (cred, calls) = credential(token_response(3600));

        cred.get_token("acme.relaticsonline.com", false).unwrap();
        let forced = cred.get_token("acme.relaticsonline.com", true).unwrap();

        assert_eq!(forced, "tok-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_freshness_margin() {
        let now = Utc::now();
        let cached = |secs| CachedToken {
            token: String::new(),
            expires_on: now + Duration::seconds(secs),
        };

        assert!(cached(3600).is_fresh(now));
        assert!(cached(301).is_fresh(now));
        assert!(!cached(300).is_fresh(now));
        assert!(!cached(-10).is_fresh(now));
    }

    #[test]
    fn test_error_response() {
        let (cred, _) = credential(TokenResponse {
            error: Some("invalid_client".to_string()),
            error_description: Some("Client not found.".to_string()),
            ..Default::default()
        });

        let err = cred
            .get_token("acme.relaticsonline.com", false)
            .unwrap_err();
        match err {
            RelaticsError::Auth(msg) => assert_eq!(msg, "invalid_client (Client not found.)"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_access_token() {
        let (cred, _) = credential(TokenResponse {
            expires_in: Some(3600),
            ..Default::default()
        });

        assert!(matches!(
            cred.get_token("acme.relaticsonline.com", false),
            Err(RelaticsError::Auth(_))
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let (cred, _) = credential(token_response(3600));
        let debug = format!("{:?}", cred);
        assert!(debug.contains("\"id\""));
        assert!(!debug.contains("\"secret\""));
    }
}
