//! OAuth2 access tokens for Google APIs.
//!
//! A service account signs a JWT (RS256) and exchanges it at the token URI for
//! an access token, cached until shortly before it expires.

use crate::google::GoogleError;
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// Scopes needed by the workspace tools.
pub const WORKSPACE_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/spreadsheets",
];

const TOKEN_LIFETIME_SECS: u64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Something that can produce a bearer token for Google APIs.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, GoogleError>;
}

/// A pre-minted access token (e.g. from `gcloud auth print-access-token`).
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, GoogleError> {
        Ok(self.0.clone())
    }
}

/// Service account credentials from the JSON key file.
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// JWT claims for the jwt-bearer grant.
#[derive(Debug, Serialize)]
struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
    /// User to impersonate (domain-wide delegation).
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

/// Authenticator that handles OAuth2 with service account credentials.
pub struct ServiceAccountAuth {
    credentials: ServiceAccountCredentials,
    key: EncodingKey,
    subject: Option<String>,
    client: reqwest::Client,
    cached_token: RwLock<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    /// Load credentials from a JSON key file.
    pub async fn from_file(path: &Path) -> Result<Self, GoogleError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GoogleError::Credentials(format!("reading {}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    /// Parse credentials from JSON key content. The private key is validated here.
    pub fn from_json(json: &str) -> Result<Self, GoogleError> {
        let credentials: ServiceAccountCredentials =
            serde_json::from_str(json).map_err(|e| GoogleError::Credentials(e.to_string()))?;
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())
            .map_err(|e| GoogleError::Credentials(format!("private_key: {}", e)))?;
        Ok(Self {
            credentials,
            key,
            subject: None,
            client: reqwest::Client::new(),
            cached_token: RwLock::new(None),
        })
    }

    /// Impersonate a workspace user (required for Gmail with domain-wide delegation).
    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    pub fn client_email(&self) -> &str {
        &self.credentials.client_email
    }

    fn claims(&self, now: u64) -> JwtClaims {
        JwtClaims {
            iss: self.credentials.client_email.clone(),
            scope: WORKSPACE_SCOPES.join(" "),
            aud: self.credentials.token_uri.clone(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
            sub: self.subject.clone(),
        }
    }

    async fn fetch_new_token(&self) -> Result<CachedToken, GoogleError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GoogleError::Auth(e.to_string()))?
            .as_secs();
        let jwt = encode(&Header::new(Algorithm::RS256), &self.claims(now), &self.key)
            .map_err(|e| GoogleError::Auth(e.to_string()))?;

        let res = self
            .client
            .post(&self.credentials.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(GoogleError::Auth(format!("token exchange failed ({}): {}", status, text)));
        }
        let token: TokenResponse = res.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(TOKEN_LIFETIME_SECS));
        Ok(CachedToken {
            token: token.access_token,
            expires_at: SystemTime::now() + lifetime,
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, GoogleError> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > SystemTime::now() + TOKEN_REFRESH_MARGIN {
                    return Ok(token.token.clone());
                }
            }
        }
        let fresh = self.fetch_new_token().await?;
        let token = fresh.token.clone();
        *self.cached_token.write().await = Some(fresh);
        log::debug!("google: refreshed access token for {}", self.credentials.client_email);
        Ok(token)
    }
}
