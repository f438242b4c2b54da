//! # Session and Token Handling
//!
//! Bearer tokens come from an injected [`TokenSource`]. A [`Session`] caches
//! the current token and asks the source again once the token is close to
//! expiry, so token renewal is an explicit capability handed to the API
//! client rather than ambient global state.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no credentials configured; set SHIPIT_ACCESS_TOKEN or SHIPIT_ACCESS_TOKEN_FILE")]
    MissingCredentials,

    #[error("failed to read token file {path}: {source}")]
    TokenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("token source returned an empty token")]
    EmptyToken,

    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
}

/// A bearer token and its known expiry.
#[derive(Clone)]
pub struct AccessToken {
    pub secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    /// Wrap a raw token, reading its expiry from the JWT `exp` claim when present.
    pub fn from_secret(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        let expires_at = decode_claims(&secret).and_then(|claims| claims.expires_at());
        Self { secret, expires_at }
    }

    fn needs_renewal(&self, now: DateTime<Utc>, lead_time: Duration) -> bool {
        self.expires_at
            .map(|expires_at| expires_at - lead_time <= now)
            .unwrap_or(false)
    }
}

/// Identity claims carried by the identity provider's tokens.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl IdTokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// Decode JWT claims without verifying the signature.
///
/// The backend verifies tokens; the client only needs expiry and identity.
/// Opaque (non-JWT) tokens yield `None`.
pub fn decode_claims(token: &str) -> Option<IdTokenClaims> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<IdTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .ok()
}

/// Async capability that produces bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError>;
}

/// A fixed token, typically supplied through configuration.
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: AccessToken::from_secret(secret),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        if self.token.secret.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(self.token.clone())
    }
}

/// Reads the token from a file on every fetch so an external renewer can rotate it.
pub struct FileTokenSource {
    path: PathBuf,
}

impl FileTokenSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TokenSource for FileTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| AuthError::TokenFile {
                    path: self.path.clone(),
                    source,
                })?;
        let secret = contents.trim();
        if secret.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(AccessToken::from_secret(secret))
    }
}

/// Caches the current token and renews it through the token source.
pub struct Session {
    source: Arc<dyn TokenSource>,
    lead_time: Duration,
    current: Mutex<Option<AccessToken>>,
}

impl Session {
    pub fn new(source: Arc<dyn TokenSource>, lead_time: Duration) -> Self {
        Self {
            source,
            lead_time,
            current: Mutex::new(None),
        }
    }

    /// Build a session from configuration, if any credentials are configured.
    ///
    /// A token file wins over an inline token.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        let lead_time = Duration::seconds(config.token_lead_time_seconds as i64);
        let source: Arc<dyn TokenSource> = if let Some(path) = &config.access_token_file {
            Arc::new(FileTokenSource::new(path.clone()))
        } else if let Some(token) = &config.access_token {
            Arc::new(StaticTokenSource::new(token.clone()))
        } else {
            return None;
        };
        Some(Self::new(source, lead_time))
    }

    /// Return a usable bearer token, renewing it when it nears expiry.
    pub async fn bearer_token(&self) -> Result<String, AuthError> {
        // Held across the fetch so concurrent callers share a single renewal.
        let mut current = self.current.lock().await;
        let now = Utc::now();

        if let Some(token) = current.as_ref()
            && !token.needs_renewal(now, self.lead_time)
        {
            return Ok(token.secret.clone());
        }

        debug!("Fetching bearer token from token source");
        let token = self.source.fetch_token().await?;
        if let Some(expires_at) = token.expires_at
            && expires_at <= now
        {
            return Err(AuthError::Expired(expires_at));
        }

        let secret = token.secret.clone();
        *current = Some(token);
        Ok(secret)
    }

    /// Claims of the current token, fetching one if necessary.
    pub async fn claims(&self) -> Result<Option<IdTokenClaims>, AuthError> {
        let token = self.bearer_token().await?;
        let claims = decode_claims(&token);
        if let Some(email) = claims.as_ref().and_then(|c| c.email.as_deref()) {
            info!(email, "Using session credentials");
        }
        Ok(claims)
    }

    /// Drop the cached token so the next request fetches a fresh one.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        email: String,
        exp: i64,
    }

    fn make_jwt(exp: DateTime<Utc>) -> String {
        let claims = TestClaims {
            sub: "ad|Mozilla-LDAP|releng".to_string(),
            email: "releng@mozilla.com".to_string(),
            exp: exp.timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"not-the-backend-key"),
        )
        .unwrap()
    }

    struct CountingSource {
        calls: AtomicUsize,
        ttl: Duration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::from_secret(make_jwt(Utc::now() + self.ttl)))
        }
    }

    #[test]
    fn test_decode_claims_without_signature_check() {
        let exp = Utc::now() + Duration::hours(1);
        let claims = decode_claims(&make_jwt(exp)).unwrap();
        assert_eq!(claims.email.as_deref(), Some("releng@mozilla.com"));
        assert_eq!(claims.exp, Some(exp.timestamp()));
        assert!(decode_claims("opaque-token").is_none());
    }

    #[tokio::test]
    async fn test_session_caches_fresh_token() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            ttl: Duration::hours(1),
        });
        let session = Session::new(source.clone(), Duration::seconds(60));

        let first = session.bearer_token().await.unwrap();
        let second = session.bearer_token().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_renews_within_lead_time() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            ttl: Duration::seconds(30),
        });
        let session = Session::new(source.clone(), Duration::seconds(60));

        session.bearer_token().await.unwrap();
        session.bearer_token().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_static_token_is_rejected() {
        let source = Arc::new(StaticTokenSource::new(make_jwt(
            Utc::now() - Duration::minutes(5),
        )));
        let session = Session::new(source, Duration::seconds(0));
        assert!(matches!(
            session.bearer_token().await,
            Err(AuthError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_file_token_source_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "first-token\n").unwrap();

        let source = FileTokenSource::new(&path);
        assert_eq!(source.fetch_token().await.unwrap().secret, "first-token");

        std::fs::write(&path, "second-token").unwrap();
        assert_eq!(source.fetch_token().await.unwrap().secret, "second-token");

        std::fs::write(&path, "   ").unwrap();
        assert!(matches!(
            source.fetch_token().await,
            Err(AuthError::EmptyToken)
        ));
    }
}
