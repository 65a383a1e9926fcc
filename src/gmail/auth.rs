//! OAuth authentication for Gmail API
//!
//! Handles OAuth 2.0 authentication flow including:
//! - Loading client credentials
//! - Interactive browser-based authentication with CSRF state checks
//! - Token storage and refresh

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{AuthError, GmailMcpError, Result};

/// How long an issued `state` value stays valid
const STATE_TTL: Duration = Duration::from_secs(5 * 60);

/// Refresh tokens this close to expiry
const EXPIRY_MARGIN_SECS: i64 = 300;

/// OAuth client credentials
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthKeys {
    /// Client ID
    pub client_id: String,

    /// Client secret
    pub client_secret: String,

    /// Auth URI
    pub auth_uri: String,

    /// Token URI
    pub token_uri: String,
}

/// OAuth keys file format (can be "installed" or "web")
#[derive(Debug, Deserialize)]
struct OAuthKeysFile {
    #[serde(alias = "web")]
    installed: Option<OAuthKeys>,
}

/// Stored credentials (tokens)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Access token
    pub access_token: String,

    /// Refresh token
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Expiry timestamp (Unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,

    /// Scopes
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token response from OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: Option<i64>,
    #[serde(default)]
    scope: String,
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Issued authorization `state` values and their expiry.
///
/// A state is accepted at most once and only before it expires.
#[derive(Debug, Default)]
pub struct StateStore {
    states: Mutex<HashMap<String, Instant>>,
}

impl StateStore {
    /// Issue a fresh random state, pruning expired ones
    pub fn issue(&self) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let state = URL_SAFE.encode(bytes);

        let now = Instant::now();
        if let Ok(mut states) = self.states.lock() {
            states.retain(|_, expiry| *expiry > now);
            states.insert(state.clone(), now + STATE_TTL);
        }

        state
    }

    /// Consume a state. Returns false if it was never issued, already used, or expired.
    pub fn validate(&self, state: &str) -> bool {
        if state.is_empty() {
            return false;
        }

        let Ok(mut states) = self.states.lock() else {
            return false;
        };

        match states.remove(state) {
            Some(expiry) => Instant::now() <= expiry,
            None => false,
        }
    }

    #[cfg(test)]
    fn insert_with_expiry(&self, state: &str, expiry: Instant) {
        if let Ok(mut states) = self.states.lock() {
            states.insert(state.to_string(), expiry);
        }
    }
}

/// OAuth authenticator
pub struct Authenticator {
    /// Configuration
    config: Config,

    /// HTTP client
    http_client: reqwest::Client,

    /// OAuth client credentials
    keys: OAuthKeys,

    /// Current credentials (tokens)
    credentials: Arc<RwLock<Option<StoredCredentials>>>,

    /// Outstanding authorization states
    states: Arc<StateStore>,
}

impl Authenticator {
    /// Create a new authenticator
    pub async fn new(config: Config) -> Result<Self> {
        // Try to find and copy OAuth keys from current directory
        config.find_and_copy_oauth_keys()?;

        let keys = Self::load_oauth_keys(&config.oauth_path)?;

        let auth = Self {
            config,
            http_client: reqwest::Client::new(),
            keys,
            credentials: Arc::new(RwLock::new(None)),
            states: Arc::new(StateStore::default()),
        };

        if auth.config.credentials_exist() {
            match auth.load_credentials().await {
                Ok(creds) => *auth.credentials.write().await = Some(creds),
                Err(e) => tracing::warn!("Ignoring unreadable credentials file: {}", e),
            }
        }

        Ok(auth)
    }

    /// Load OAuth keys from file
    fn load_oauth_keys(path: &Path) -> Result<OAuthKeys> {
        if !path.exists() {
            return Err(GmailMcpError::Auth(AuthError::KeysFileNotFound {
                path: path.display().to_string(),
            }));
        }

        let content = std::fs::read_to_string(path)?;
        let keys_file: OAuthKeysFile = serde_json::from_str(&content)?;

        keys_file
            .installed
            .ok_or(GmailMcpError::Auth(AuthError::InvalidKeysFormat))
    }

    /// Load stored credentials from file
    async fn load_credentials(&self) -> Result<StoredCredentials> {
        let content = tokio::fs::read_to_string(&self.config.credentials_path).await?;
        let creds: StoredCredentials = serde_json::from_str(&content)?;
        Ok(creds)
    }

    /// Save credentials to file
    async fn save_credentials(&self, credentials: &StoredCredentials) -> Result<()> {
        let content = serde_json::to_string_pretty(credentials)?;
        tokio::fs::write(&self.config.credentials_path, content).await?;
        Ok(())
    }

    /// Check if we have credentials loaded
    pub async fn is_authenticated(&self) -> bool {
        self.credentials.read().await.is_some()
    }

    /// Get a valid access token, refreshing if necessary
    pub async fn get_access_token(&self) -> Result<String> {
        {
            let creds = self.credentials.read().await;
            let Some(creds) = creds.as_ref() else {
                return Err(GmailMcpError::Auth(AuthError::CredentialsNotFound {
                    path: self.config.credentials_path.display().to_string(),
                }));
            };

            let expiring = creds
                .expiry_date
                .is_some_and(|expiry| expiry - unix_now() < EXPIRY_MARGIN_SECS);
            if !expiring {
                return Ok(creds.access_token.clone());
            }
        }

        tracing::debug!("Access token expired or expiring, refreshing");
        self.refresh_token().await
    }

    /// Refresh the access token using the refresh token
    async fn refresh_token(&self) -> Result<String> {
        let refresh_token = self
            .credentials
            .read()
            .await
            .as_ref()
            .and_then(|c| c.refresh_token.clone())
            .ok_or_else(|| {
                GmailMcpError::Auth(AuthError::TokenRefreshFailed {
                    message: "No refresh token available".to_string(),
                })
            })?;

        let params = [
            ("client_id", self.keys.client_id.as_str()),
            ("client_secret", self.keys.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.keys.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GmailMcpError::Auth(AuthError::TokenRefreshFailed {
                message: text,
            }));
        }

        let token_response: TokenResponse = response.json().await?;
        let new_credentials = Self::credentials_from(token_response, Some(refresh_token));

        self.save_credentials(&new_credentials).await?;
        *self.credentials.write().await = Some(new_credentials.clone());

        Ok(new_credentials.access_token)
    }

    fn credentials_from(
        token_response: TokenResponse,
        previous_refresh_token: Option<String>,
    ) -> StoredCredentials {
        StoredCredentials {
            access_token: token_response.access_token,
            refresh_token: token_response.refresh_token.or(previous_refresh_token),
            token_type: token_response.token_type,
            expiry_date: token_response.expires_in.map(|e| unix_now() + e),
            scope: token_response.scope,
        }
    }

    /// Generate the authorization URL for a given state
    fn auth_url(&self, state: &str) -> String {
        let scopes = self.config.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent&state={}",
            self.keys.auth_uri,
            urlencoding::encode(&self.keys.client_id),
            urlencoding::encode(&self.config.oauth_callback_url),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }

    /// Generate an authorization URL carrying a freshly issued state
    pub fn generate_auth_url(&self) -> String {
        let state = self.states.issue();
        self.auth_url(&state)
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<StoredCredentials> {
        let params = [
            ("client_id", self.keys.client_id.as_str()),
            ("client_secret", self.keys.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.oauth_callback_url.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.keys.token_uri)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GmailMcpError::Auth(AuthError::TokenExchangeFailed {
                message: text,
            }));
        }

        let token_response: TokenResponse = response.json().await?;
        let credentials = Self::credentials_from(token_response, None);

        self.save_credentials(&credentials).await?;
        *self.credentials.write().await = Some(credentials.clone());

        Ok(credentials)
    }

    /// Run interactive authentication flow with local HTTP server
    pub async fn authenticate_interactive(&self) -> Result<()> {
        use axum::{extract::Query, response::Html, routing::get, Router};
        use tokio::sync::oneshot;

        let auth_url = self.generate_auth_url();
        eprintln!("\nPlease visit this URL to authenticate:");
        eprintln!("{}\n", auth_url);

        if let Err(e) = open::that(&auth_url) {
            eprintln!("Could not open browser automatically: {}", e);
            eprintln!("Please open the URL manually.");
        }

        // Create channel for receiving the auth code
        let (tx, rx) = oneshot::channel::<String>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let states = self.states.clone();
        let callback_handler = move |Query(params): Query<HashMap<String, String>>| async move {
            let state = params.get("state").map(String::as_str).unwrap_or_default();
            if !states.validate(state) {
                tracing::warn!("Rejected OAuth callback: {}", AuthError::InvalidState);
                return Html("<html><body><h1>Authentication failed</h1><p>Invalid or expired state parameter.</p></body></html>");
            }

            match params.get("code").filter(|code| !code.is_empty()) {
                Some(code) => {
                    if let Some(tx) = tx.lock().ok().and_then(|mut guard| guard.take()) {
                        let _ = tx.send(code.clone());
                    }
                    Html("<html><body><h1>Authentication successful!</h1><p>You can close this window.</p></body></html>")
                }
                None => Html("<html><body><h1>Authentication failed</h1><p>No authorization code received.</p></body></html>"),
            }
        };

        let app = Router::new().route("/oauth2callback", get(callback_handler));

        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.config.oauth_callback_port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        eprintln!("Waiting for authentication callback on port {}...", self.config.oauth_callback_port);

        let server = axum::serve(listener, app);

        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    return Err(GmailMcpError::Auth(AuthError::CallbackError {
                        message: e.to_string(),
                    }));
                }
            }
            code = rx => {
                match code {
                    Ok(code) => {
                        eprintln!("Received authorization code, exchanging for tokens...");
                        self.exchange_code(&code).await?;
                        eprintln!("Authentication completed successfully!");
                    }
                    Err(_) => {
                        return Err(GmailMcpError::Auth(AuthError::NoAuthCode));
                    }
                }
            }
        }

        Ok(())
    }
}
