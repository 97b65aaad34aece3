//! Service credentials and OAuth2 access tokens.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth client id and secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read a credential file: client id on the first line, secret on the second.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid credentials file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut lines = content.lines().map(str::trim);
        let client_id = lines.next().unwrap_or_default();
        let client_secret = lines.next().unwrap_or_default();
        anyhow::ensure!(!client_id.is_empty(), "missing client id on line 1");
        anyhow::ensure!(!client_secret.is_empty(), "missing client secret on line 2");
        Ok(Self::new(client_id, client_secret))
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Client-credentials token source with a cached token.
pub struct TokenProvider {
    http: Client,
    token_url: String,
    credentials: Credentials,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: Client, token_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// A valid bearer token, fetching a new one when the cached one is close to expiry.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.access_token.clone());
        }

        debug!(url = %self.token_url, client_id = %self.credentials.client_id, "Requesting access token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret()),
            ])
            .send()
            .await
            .context("Token request failed")?
            .error_for_status()
            .context("Token request rejected")?;

        let body: TokenResponse = response.json().await.context("Invalid token response")?;
        let token = CachedToken {
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
            access_token: body.access_token,
        };
        info!(expires_at = %token.expires_at, "Obtained access token");

        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::credentials;

    #[test]
    fn test_parse_two_line_file() {
        let creds = Credentials::parse(credentials::VALID).unwrap();
        assert_eq!(creds.client_id, "test-client-id");
        assert_eq!(creds.client_secret(), "test-client-secret");
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        assert!(Credentials::parse(credentials::MISSING_SECRET).is_err());
        assert!(Credentials::parse("").is_err());
        assert!(Credentials::parse("\nsecret\n").is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let creds = Credentials::new("id", "hunter2");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("id"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn test_from_file() {
        let dir = test_utils::temp_store_dir();
        let path = dir.path().join("credentials.txt");
        std::fs::write(&path, credentials::VALID).unwrap();
        assert_eq!(Credentials::from_file(&path).unwrap().client_id, "test-client-id");
        assert!(Credentials::from_file(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_token_expiry_margin() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "abc".into(),
            expires_at: now + Duration::seconds(3600),
        };
        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::seconds(3600 - EXPIRY_MARGIN_SECS)));
    }
}
