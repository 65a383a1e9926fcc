//! Configuration management for the Gmail MCP Reader
//!
//! Handles paths, environment variables, and converter settings.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, GmailMcpError, Result};

/// Configuration for the Gmail MCP Reader
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for storing configuration files
    pub config_dir: PathBuf,

    /// Path to OAuth keys file (client credentials)
    pub oauth_path: PathBuf,

    /// Path to stored credentials (access/refresh tokens)
    pub credentials_path: PathBuf,

    /// OAuth callback URL
    pub oauth_callback_url: String,

    /// OAuth callback port
    pub oauth_callback_port: u16,

    /// Gmail API scopes
    pub scopes: Vec<String>,

    /// External converter settings
    pub converter: ConverterConfig,
}

/// Settings for the external HTML and PDF converters
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// pandoc executable
    pub pandoc_bin: String,

    /// pdftotext executable
    pub pdftotext_bin: String,

    /// Upper bound for a single external tool run
    pub timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            pandoc_bin: "pandoc".to_string(),
            pdftotext_bin: "pdftotext".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ConverterConfig {
    /// Build converter settings from the environment
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let timeout = match std::env::var("GMAIL_MCP_CONVERT_TIMEOUT_SECS") {
            Ok(value) => {
                let secs: u64 = value.parse().map_err(|_| {
                    GmailMcpError::Config(ConfigError::InvalidValue {
                        var: "GMAIL_MCP_CONVERT_TIMEOUT_SECS".to_string(),
                        value: value.clone(),
                    })
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => defaults.timeout,
        };

        Ok(Self {
            pandoc_bin: std::env::var("GMAIL_MCP_PANDOC").unwrap_or(defaults.pandoc_bin),
            pdftotext_bin: std::env::var("GMAIL_MCP_PDFTOTEXT").unwrap_or(defaults.pdftotext_bin),
            timeout,
        })
    }
}

impl Config {
    /// Create a new configuration with default paths
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;

        let oauth_path = std::env::var("GMAIL_OAUTH_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir.join("gcp-oauth.keys.json"));

        let credentials_path = std::env::var("GMAIL_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir.join("credentials.json"));

        let oauth_callback_port = std::env::var("GMAIL_OAUTH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        Ok(Self {
            config_dir,
            oauth_path,
            credentials_path,
            oauth_callback_url: callback_url(oauth_callback_port),
            oauth_callback_port,
            scopes: vec![gmail::READONLY_SCOPE.to_string()],
            converter: ConverterConfig::from_env()?,
        })
    }

    /// Point the OAuth callback at a different local port
    pub fn set_callback_port(&mut self, port: u16) {
        self.oauth_callback_port = port;
        self.oauth_callback_url = callback_url(port);
    }

    /// Get the configuration directory, creating it if necessary
    fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::home_dir()
            .ok_or_else(|| {
                GmailMcpError::Config(ConfigError::DirNotFound {
                    path: "~".to_string(),
                })
            })?
            .join(".gmail-mcp");

        if !config_dir.exists() {
            std::fs::create_dir_all(&config_dir).map_err(|_| {
                GmailMcpError::Config(ConfigError::DirCreationFailed {
                    path: config_dir.display().to_string(),
                })
            })?;
        }

        Ok(config_dir)
    }

    /// Check if OAuth keys file exists
    pub fn oauth_keys_exist(&self) -> bool {
        self.oauth_path.exists()
    }

    /// Check if credentials (tokens) exist
    pub fn credentials_exist(&self) -> bool {
        self.credentials_path.exists()
    }

    /// Try to find OAuth keys in current directory and copy to config dir
    pub fn find_and_copy_oauth_keys(&self) -> Result<bool> {
        let local_oauth = std::env::current_dir()
            .map_err(GmailMcpError::Io)?
            .join("gcp-oauth.keys.json");

        if local_oauth.exists() && !self.oauth_keys_exist() {
            std::fs::copy(&local_oauth, &self.oauth_path).map_err(GmailMcpError::Io)?;
            return Ok(true);
        }

        Ok(false)
    }
}

fn callback_url(port: u16) -> String {
    format!("http://localhost:{}/oauth2callback", port)
}

/// Gmail API constants
pub mod gmail {
    /// Base URL for Gmail API
    pub const API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

    /// User ID for the authenticated user
    pub const USER_ID: &str = "me";

    /// Read-only mailbox access; nothing in this server writes
    pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

    /// Headers requested in metadata format
    pub const METADATA_HEADERS: [&str; 5] = ["From", "To", "Cc", "Subject", "Date"];

    /// Page size used when the caller gives none
    pub const DEFAULT_MAX_RESULTS: u32 = 10;

    /// Largest page size a single search may request
    pub const MAX_RESULTS_LIMIT: u32 = 50;
}
