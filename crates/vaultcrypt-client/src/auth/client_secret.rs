//! OAuth2 client-credentials flow against Microsoft Entra ID.
//!
//! `POST {authority}/{tenant}/oauth2/v2.0/token` with the service principal's
//! client id and secret, scoped to Key Vault. Tokens are cached until shortly
//! before they expire; concurrent callers share one refresh.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vaultcrypt_core::{AzureConfig, SecretValue};

use super::VAULT_SCOPE;
use super::credential::{AccessToken, AuthError, TokenCredential, TokenFuture};
use crate::endpoint::validate_url_scheme;

/// Tokens are refreshed this long before their reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Token endpoint response. `expires_in` is a number on the v2 endpoint and a
/// string on the legacy v1 endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: serde_json::Value,
}

impl TokenResponse {
    fn expires_in(&self) -> Option<Duration> {
        let secs = match &self.expires_in {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }?;
        Some(Duration::from_secs(secs))
    }
}

/// Service principal credential (tenant + client id + client secret).
pub struct ClientSecretCredential {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretValue,
    cache: Mutex<Option<AccessToken>>,
}

impl fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ClientSecretCredential {
    /// Create a credential for `tenant_id` at the given authority host
    /// (e.g. `https://login.microsoftonline.com`).
    pub fn new(
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: SecretValue,
    ) -> Result<Self, AuthError> {
        validate_url_scheme(authority_host)?;
        if tenant_id.is_empty()
            || !tenant_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            return Err(AuthError::InvalidTenant(tenant_id.to_owned()));
        }

        let http = reqwest::Client::builder()
            .user_agent(crate::user_agent())
            .timeout(crate::REQUEST_TIMEOUT)
            .build()
            .map_err(AuthError::Network)?;

        Ok(Self {
            http,
            token_url: format!(
                "{}/{tenant_id}/oauth2/v2.0/token",
                authority_host.trim_end_matches('/')
            ),
            client_id: client_id.to_owned(),
            client_secret,
            cache: Mutex::new(None),
        })
    }

    pub fn from_config(config: &AzureConfig) -> Result<Self, AuthError> {
        Self::new(
            &config.authority_host,
            &config.tenant_id,
            &config.client_id,
            config.client_secret.clone(),
        )
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    async fn request_token(&self) -> Result<AccessToken, AuthError> {
        debug!("requesting access token from {}", self.token_url);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str().unwrap_or_default()),
            ("scope", VAULT_SCOPE),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(AuthError::Network)?;

        let status = resp.status().as_u16();
        match status {
            200 => {
                let body = resp
                    .json::<TokenResponse>()
                    .await
                    .map_err(|_| AuthError::MalformedResponse("invalid token response body"))?;
                if body.access_token.is_empty() {
                    return Err(AuthError::MalformedResponse("empty access_token"));
                }
                if let Some(kind) = body.token_type.as_deref() {
                    if !kind.eq_ignore_ascii_case("bearer") {
                        return Err(AuthError::MalformedResponse("token_type is not Bearer"));
                    }
                }
                let expires_in = body
                    .expires_in()
                    .ok_or(AuthError::MalformedResponse("missing or invalid expires_in"))?;
                let token =
                    AccessToken::try_new(SecretValue::from_string(body.access_token), expires_in)
                        .ok_or(AuthError::MalformedResponse("expires_in out of range"))?;
                info!(
                    "acquired access token for client {} (expires in {}s)",
                    self.client_id,
                    expires_in.as_secs()
                );
                Ok(token)
            }
            400 | 401 => {
                warn!("token request rejected: status {status}");
                Err(AuthError::InvalidClient)
            }
            429 => Err(AuthError::RateLimited),
            500..=599 => Err(AuthError::ServerError),
            other => Err(AuthError::UnexpectedStatus(other)),
        }
    }
}

impl TokenCredential for ClientSecretCredential {
    fn get_token(&self) -> TokenFuture<'_> {
        Box::pin(async move {
            let mut cached = self.cache.lock().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expiring(REFRESH_MARGIN) {
                    return Ok(token.clone());
                }
                debug!("cached access token is expiring, refreshing");
            }
            let token = self.request_token().await?;
            *cached = Some(token.clone());
            Ok(token)
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential(server: &MockServer) -> ClientSecretCredential {
        ClientSecretCredential::new(
            &server.uri(),
            "tenant-123",
            "client-abc",
            SecretValue::from("s3cr3t"),
        )
        .unwrap()
    }

    fn token_body(token: &str, expires_in: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "token_type": "Bearer",
            "expires_in": expires_in,
            "ext_expires_in": 3599,
            "access_token": token,
        })
    }

    #[test]
    fn token_url_uses_authority_and_tenant() {
        let cred = ClientSecretCredential::new(
            "https://login.microsoftonline.com/",
            "contoso.onmicrosoft.com",
            "client",
            SecretValue::from("x"),
        )
        .unwrap();
        assert_eq!(
            cred.token_url(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
    }

    #[test]
    fn from_config_wires_authority_only_into_token_url() {
        let config = AzureConfig::from_lookup(|name| {
            match name {
                "AZURE_CLIENT_ID" => Some("client"),
                "AZURE_CLIENT_SECRET" => Some("secret"),
                "AZURE_TENANT_ID" => Some("tenant-1"),
                "AZURE_KEY_VAULT_KEY_IDENTIFIER" => {
                    Some("https://myvault.vault.azure.net/keys/myKey")
                }
                "AZURE_AUTHORITY_HOST" => Some("https://login.example.com"),
                _ => None,
            }
            .map(str::to_owned)
        })
        .unwrap();
        let cred = ClientSecretCredential::from_config(&config).unwrap();
        assert_eq!(
            cred.token_url(),
            "https://login.example.com/tenant-1/oauth2/v2.0/token"
        );
    }

    #[test]
    fn rejects_bad_tenant_and_insecure_authority() {
        let err = ClientSecretCredential::new(
            "https://login.microsoftonline.com",
            "../evil",
            "c",
            SecretValue::from("x"),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidTenant(_)));

        let err = ClientSecretCredential::new(
            "http://login.microsoftonline.com",
            "tenant",
            "c",
            SecretValue::from("x"),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::InsecureEndpoint(_)));
    }

    #[test]
    fn debug_hides_client_secret() {
        let cred = ClientSecretCredential::new(
            "https://login.microsoftonline.com",
            "tenant",
            "client",
            SecretValue::from("very-secret"),
        )
        .unwrap();
        let debug = format!("{cred:?}");
        assert!(debug.contains("client"));
        assert!(!debug.contains("very-secret"));
    }

    #[tokio::test]
    async fn sends_client_credentials_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-123/oauth2/v2.0/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=client-abc"))
            .and(body_string_contains("client_secret=s3cr3t"))
            .and(body_string_contains(
                "scope=https%3A%2F%2Fvault.azure.net%2F.default",
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("tok-1", serde_json::json!(3599))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = credential(&server).get_token().await.unwrap();
        assert_eq!(token.bearer(), "tok-1");
    }

    #[tokio::test]
    async fn caches_token_until_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-123/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("cached", serde_json::json!(3599))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cred = credential(&server);
        let first = cred.get_token().await.unwrap();
        let second = cred.get_token().await.unwrap();
        assert_eq!(first.bearer(), "cached");
        assert_eq!(second.bearer(), "cached");
    }

    #[tokio::test]
    async fn refreshes_token_inside_margin() {
        let server = MockServer::start().await;
        // Lifetime shorter than the refresh margin: never served from cache.
        Mock::given(method("POST"))
            .and(path("/tenant-123/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("short", serde_json::json!("60"))),
            )
            .expect(2)
            .mount(&server)
            .await;

        let cred = credential(&server);
        cred.get_token().await.unwrap();
        let again = cred.get_token().await.unwrap();
        assert_eq!(again.bearer(), "short");
    }

    #[tokio::test]
    async fn maps_rejected_client() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let err = credential(&server).get_token().await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidClient));
        // The authority's description is not echoed back.
        assert!(!err.to_string().contains("AADSTS"));
    }

    #[tokio::test]
    async fn maps_server_error_and_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let err = credential(&server).get_token().await.unwrap_err();
        assert!(matches!(err, AuthError::ServerError));

        server.reset().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        let err = credential(&server).get_token().await.unwrap_err();
        assert!(matches!(err, AuthError::UnexpectedStatus(409)));
    }

    #[tokio::test]
    async fn rejects_malformed_token_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "access_token": "tok"
            })))
            .mount(&server)
            .await;

        let err = credential(&server).get_token().await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn rejects_out_of_range_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("tok", serde_json::json!(u64::MAX))),
            )
            .mount(&server)
            .await;

        let cred = credential(&server);
        let err = cred.get_token().await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::MalformedResponse("expires_in out of range")
        ));
        // Nothing usable was cached.
        assert!(cred.cache.lock().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-123/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("shared", serde_json::json!(3599)))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cred = std::sync::Arc::new(credential(&server));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cred = std::sync::Arc::clone(&cred);
            handles.push(tokio::spawn(async move { cred.get_token().await }));
        }
        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.bearer(), "shared");
        }
    }
}
