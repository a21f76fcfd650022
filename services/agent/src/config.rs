use crate::tool_servers::ToolServerKind;
use std::{fmt, net::SocketAddr, path::PathBuf};
use tracing::Level;

/// A custom error type for configuration loading failures.
///
/// Only malformed values fail loading. Unset variables fall back to defaults
/// or leave the feature that needs them switched off.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for the Reddit tool-server. Only built when every value is set.
#[derive(Clone, PartialEq, Eq)]
pub struct RedditCredentials {
    pub server_dir: PathBuf,
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("server_dir", &self.server_dir)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Holds all configuration loaded from the environment at startup.
///
/// Vendor keys stay optional here: they are checked when the components that
/// need them are constructed, so a missing key fails a session, not the host.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub google_api_key: Option<String>,
    pub deepgram_api_key: Option<String>,
    /// Tool-servers to attach when their credentials are present.
    pub tool_servers: Vec<ToolServerKind>,
    pub github_token: Option<String>,
    pub reddit: Option<RedditCredentials>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("log_level", &self.log_level)
            .field("google_api_key_set", &self.google_api_key.is_some())
            .field("deepgram_api_key_set", &self.deepgram_api_key.is_some())
            .field("tool_servers", &self.tool_servers)
            .field("github_token_set", &self.github_token.is_some())
            .field("reddit", &self.reddit)
            .finish()
    }
}

/// Reads a variable, treating an empty value as unset.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8081".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let tool_servers_str =
            std::env::var("AGENT_TOOL_SERVERS").unwrap_or_else(|_| "github".to_string());
        let mut tool_servers = Vec::new();
        for name in tool_servers_str.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let kind = name.parse::<ToolServerKind>().map_err(|e| {
                ConfigError::InvalidValue("AGENT_TOOL_SERVERS".to_string(), e)
            })?;
            if !tool_servers.contains(&kind) {
                tool_servers.push(kind);
            }
        }

        let reddit = match (
            optional_var("REDDIT_MCP_DIR"),
            optional_var("REDDIT_CLIENT_ID"),
            optional_var("REDDIT_CLIENT_SECRET"),
            optional_var("REDDIT_USERNAME"),
            optional_var("REDDIT_PASSWORD"),
        ) {
            (Some(dir), Some(client_id), Some(client_secret), Some(username), Some(password)) => {
                Some(RedditCredentials {
                    server_dir: PathBuf::from(dir),
                    client_id,
                    client_secret,
                    username,
                    password,
                })
            }
            _ => None,
        };

        Ok(Self {
            bind_address,
            log_level,
            google_api_key: optional_var("GOOGLE_API_KEY"),
            deepgram_api_key: optional_var("DEEPGRAM_API_KEY"),
            tool_servers,
            github_token: optional_var("GITHUB_PERSONAL_ACCESS_TOKEN"),
            reddit,
        })
    }
}
