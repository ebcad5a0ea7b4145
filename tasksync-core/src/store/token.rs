//! Bearer tokens for the Sheets API.

use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Tokens printed by a command are reused for this long.
const COMMAND_TOKEN_TTL: Duration = Duration::from_secs(45 * 60);

const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Signed assertions are valid for an hour, the longest Google accepts.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Exchanged tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A token and the moment it stops being reused.
type Cached = Mutex<Option<(String, Instant)>>;

/// Where the store gets its OAuth access token from.
pub enum TokenSource {
    Static(String),
    /// A shell command that prints a token on stdout, e.g. `gcloud auth print-access-token`.
    Command { command: String, cached: Cached },
    /// A service account whose signed JWT is exchanged for an access token.
    ServiceAccount {
        email: String,
        key: EncodingKey,
        token_uri: String,
        http: reqwest::Client,
        cached: Cached,
    },
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS as u64
}

impl TokenSource {
    pub fn from_command(command: impl Into<String>) -> Self {
        TokenSource::Command {
            command: command.into(),
            cached: Mutex::new(None),
        }
    }

    /// Service account credentials as found in a downloaded key file.
    ///
    /// Keys pasted into `.env` files often carry literal `\n` sequences; those
    /// are turned back into newlines before the PEM is parsed.
    pub fn from_service_account(email: impl Into<String>, private_key: &str) -> StoreResult<Self> {
        let pem = private_key.trim().replace("\\n", "\n");
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| StoreError::Credentials(format!("Invalid service account key: {e}")))?;

        Ok(TokenSource::ServiceAccount {
            email: email.into(),
            key,
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        })
    }

    /// Exchange assertions somewhere other than Google's token endpoint.
    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        if let TokenSource::ServiceAccount { token_uri, .. } = &mut self {
            *token_uri = uri.into();
        }
        self
    }

    pub async fn token(&self) -> StoreResult<String> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Command { command, cached } => {
                let mut cached = cached.lock().await;
                if let Some(token) = still_valid(&cached) {
                    return Ok(token);
                }

                let token = run_token_command(command).await?;
                *cached = Some((token.clone(), Instant::now() + COMMAND_TOKEN_TTL));
                Ok(token)
            }
            TokenSource::ServiceAccount {
                email,
                key,
                token_uri,
                http,
                cached,
            } => {
                let mut cached = cached.lock().await;
                if let Some(token) = still_valid(&cached) {
                    return Ok(token);
                }

                let (token, lifetime) = exchange_assertion(http, email, key, token_uri).await?;
                let reuse_for = lifetime.saturating_sub(EXPIRY_MARGIN);
                *cached = Some((token.clone(), Instant::now() + reuse_for));
                Ok(token)
            }
        }
    }
}

fn still_valid(cached: &Option<(String, Instant)>) -> Option<String> {
    cached
        .as_ref()
        .filter(|(_, expires_at)| Instant::now() < *expires_at)
        .map(|(token, _)| token.clone())
}

async fn run_token_command(command: &str) -> StoreResult<String> {
    debug!(command, "refreshing access token");

    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(std::process::Stdio::null())
        .stderr(std::process::Stdio::inherit())
        .output()
        .await
        .map_err(|e| StoreError::Credentials(format!("Failed to run `{command}`: {e}")))?;

    if !output.status.success() {
        return Err(StoreError::Credentials(format!(
            "`{command}` exited with status {}",
            output.status.code().unwrap_or(-1)
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(StoreError::Credentials(format!("`{command}` printed no token")));
    }
    Ok(token)
}

async fn exchange_assertion(
    http: &reqwest::Client,
    email: &str,
    key: &EncodingKey,
    token_uri: &str,
) -> StoreResult<(String, Duration)> {
    debug!(service_account = email, "exchanging service account assertion");

    let assertion = sign_assertion(email, key, token_uri, chrono::Utc::now().timestamp())?;
    let resp = http
        .post(token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StoreError::Credentials(format!(
            "Token exchange for {email} failed ({}): {body}",
            status.as_u16()
        )));
    }

    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| StoreError::Malformed(e.to_string()))?;
    Ok((body.access_token, Duration::from_secs(body.expires_in)))
}

fn sign_assertion(email: &str, key: &EncodingKey, audience: &str, now: i64) -> StoreResult<String> {
    let claims = Claims {
        iss: email,
        scope: SHEETS_SCOPE,
        aud: audience,
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
        .map_err(|e| StoreError::Credentials(format!("Could not sign assertion: {e}")))
}
