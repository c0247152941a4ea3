//! OAuth2 access tokens for Google APIs
//!
//! A service account key is exchanged for short-lived tokens, cached until a
//! minute before they expire. A fixed bearer token from configuration or
//! `GOOGLE_ACCESS_TOKEN` is used as-is.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::ensure_success;
use crate::config::GoogleConfig;
use crate::error::{Error, Result};

const SCOPES: &str = "https://www.googleapis.com/auth/drive \
                      https://www.googleapis.com/auth/spreadsheets \
                      https://www.googleapis.com/auth/cloud-platform";
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

enum TokenSource {
    Static(String),
    ServiceAccount {
        key_path: PathBuf,
        cached: Mutex<Option<CachedToken>>,
    },
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(serde::Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

/// Token provider shared by the Google adapters
pub struct GoogleAuth {
    source: TokenSource,
    /// Client carrying the current token; rebuilt when the token changes
    client: parking_lot::Mutex<Option<(String, reqwest::Client)>>,
    client_builds: AtomicUsize,
}

impl GoogleAuth {
    fn with_source(source: TokenSource) -> Self {
        Self {
            source,
            client: parking_lot::Mutex::new(None),
            client_builds: AtomicUsize::new(0),
        }
    }

    /// Fixed bearer token, never refreshed
    pub fn from_token(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::Config("Google access token is empty".to_string()));
        }
        Ok(Self::with_source(TokenSource::Static(token.trim().to_string())))
    }

    /// Service account JSON key file, exchanged for tokens on demand
    pub fn from_service_account(key_path: impl AsRef<Path>) -> Result<Self> {
        let key_path = key_path.as_ref().to_path_buf();
        if !key_path.exists() {
            return Err(Error::Config(format!(
                "Service account key not found: {}",
                key_path.display()
            )));
        }
        Ok(Self::with_source(TokenSource::ServiceAccount {
            key_path,
            cached: Mutex::new(None),
        }))
    }

    /// Service account key wins over a fixed token
    pub fn from_config(config: &GoogleConfig) -> Result<Self> {
        match &config.service_account_key {
            Some(path) => Self::from_service_account(path),
            None => {
                tracing::warn!(
                    "Using a fixed Google access token; it is not refreshed when it expires"
                );
                Self::from_token(config.access_token.clone())
            }
        }
    }

    /// A token valid for at least another minute
    pub async fn get_token(&self) -> Result<String> {
        let (key_path, cached) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount { key_path, cached } => (key_path, cached),
        };

        let mut cached = cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.access_token.clone());
            }
        }

        let (access_token, lifetime) = Self::refresh_token(key_path).await?;
        tracing::debug!("Refreshed Google access token, valid for {}s", lifetime.as_secs());
        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(access_token)
    }

    /// Sign a JWT with the service account key and exchange it for an access token
    async fn refresh_token(key_path: &Path) -> Result<(String, Duration)> {
        let key_content = tokio::fs::read_to_string(key_path).await.map_err(|e| {
            Error::Config(format!(
                "Failed to read service account key {}: {}",
                key_path.display(),
                e
            ))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&key_content)
            .map_err(|e| Error::Config(format!("Invalid service account key format: {}", e)))?;

        let jwt = Self::signed_assertion(&key)?;

        let response = reqwest::Client::new()
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = ensure_success(response, "Token exchange")
            .await?
            .json()
            .await?;

        let lifetime =
            Duration::from_secs(token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        Ok((token.access_token, lifetime))
    }

    fn signed_assertion(key: &ServiceAccountKey) -> Result<String> {
        use base64::Engine;
        let encode = |bytes: &[u8]| base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);

        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": SCOPES,
            "aud": key.token_uri,
            "iat": now,
            "exp": now + DEFAULT_TOKEN_LIFETIME_SECS as i64,
        });

        let header = encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = encode(claims.to_string().as_bytes());
        let signing_input = format!("{}.{}", header, payload);

        let private_key = key.private_key.replace("\\n", "\n");
        let pem = pem::parse(&private_key)
            .map_err(|e| Error::Config(format!("Failed to parse private key PEM: {}", e)))?;
        let key_pair = ring::signature::RsaKeyPair::from_pkcs8(pem.contents())
            .map_err(|e| Error::Config(format!("Failed to parse private key: {:?}", e)))?;

        let mut signature = vec![0u8; key_pair.public().modulus_len()];
        key_pair
            .sign(
                &ring::signature::RSA_PKCS1_SHA256,
                &ring::rand::SystemRandom::new(),
                signing_input.as_bytes(),
                &mut signature,
            )
            .map_err(|e| Error::Config(format!("Failed to sign JWT: {:?}", e)))?;

        Ok(format!("{}.{}", signing_input, encode(&signature)))
    }

    /// HTTP client carrying the current token
    pub async fn authorized_client(&self) -> Result<reqwest::Client> {
        let token = self.get_token().await?;

        let mut cached = self.client.lock();
        if let Some((current, client)) = cached.as_ref() {
            if *current == token {
                return Ok(client.clone());
            }
        }

        let mut headers = reqwest::header::HeaderMap::new();
        let value = format!("Bearer {}", token)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid access token: {}", e)))?;
        headers.insert(reqwest::header::AUTHORIZATION, value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        self.client_builds.fetch_add(1, Ordering::SeqCst);
        *cached = Some((token, client.clone()));
        Ok(client)
    }

    #[cfg(test)]
    fn client_builds(&self) -> usize {
        self.client_builds.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use std::sync::Arc;

    const TEST_KEY: &str = include_str!("../../../testdata/service_account_key.pem");

    /// Token endpoint handing out `tok-1`, `tok-2`, ... with the given lifetime
    async fn token_server(lifetime_secs: u64) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/token",
            post(move |body: String| {
                let counter = counter.clone();
                async move {
                    assert!(body.contains("grant_type="));
                    assert!(body.contains("assertion="));
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Json(serde_json::json!({
                        "access_token": format!("tok-{}", n),
                        "expires_in": lifetime_secs,
                        "token_type": "Bearer",
                    }))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/token", addr), calls)
    }

    fn key_file(dir: &tempfile::TempDir, token_uri: &str) -> PathBuf {
        let path = dir.path().join("key.json");
        let key = serde_json::json!({
            "type": "service_account",
            "client_email": "ingest@example.iam.gserviceaccount.com",
            "private_key": TEST_KEY,
            "token_uri": token_uri,
        });
        std::fs::write(&path, key.to_string()).unwrap();
        path
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(GoogleAuth::from_token("  "), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_key_file_rejected() {
        let result = GoogleAuth::from_service_account("/nonexistent/key.json");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_static_token_reuses_client() {
        let auth = GoogleAuth::from_token(" ya29.fixed ").unwrap();
        assert_eq!(auth.get_token().await.unwrap(), "ya29.fixed");
        auth.authorized_client().await.unwrap();
        auth.authorized_client().await.unwrap();
        assert_eq!(auth.client_builds(), 1);
    }

    #[tokio::test]
    async fn test_header_unsafe_token() {
        let auth = GoogleAuth::from_token("bad\ntoken").unwrap();
        assert!(matches!(auth.authorized_client().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_service_account_token_is_cached() {
        let (uri, calls) = token_server(3600).await;
        let dir = tempfile::tempdir().unwrap();
        let auth = GoogleAuth::from_service_account(key_file(&dir, &uri)).unwrap();

        assert_eq!(auth.get_token().await.unwrap(), "tok-1");
        assert_eq!(auth.get_token().await.unwrap(), "tok-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed() {
        // Shorter than the refresh margin, so every request mints a new token
        let (uri, calls) = token_server(30).await;
        let dir = tempfile::tempdir().unwrap();
        let auth = GoogleAuth::from_service_account(key_file(&dir, &uri)).unwrap();

        assert_eq!(auth.get_token().await.unwrap(), "tok-1");
        assert_eq!(auth.get_token().await.unwrap(), "tok-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        auth.authorized_client().await.unwrap();
        auth.authorized_client().await.unwrap();
        assert_eq!(auth.client_builds(), 2);
    }

    #[tokio::test]
    async fn test_token_endpoint_failure_surfaces_status() {
        let app = Router::new().route(
            "/token",
            post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let uri = format!("http://{}/token", addr);
        let auth = GoogleAuth::from_service_account(key_file(&dir, &uri)).unwrap();

        let err = auth.get_token().await.unwrap_err();
        assert!(matches!(err, Error::Http { status: 503, .. }));
        assert!(err.is_transient());
    }
}
